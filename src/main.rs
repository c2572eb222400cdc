// file: src/main.rs
// description: commandline application entry point with command handling
// reference: application bootstrap and orchestration

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use vmrs_classify::utils::logging::{format_error, format_info, format_success, format_warning};
use vmrs_classify::{
    Config, MessagesClient, OutputWriter, PipelineOrchestrator, RulesLoader, load_catalog,
    load_parts,
};

#[derive(Parser)]
#[command(name = "vmrs-classify")]
#[command(version = "0.1.0")]
#[command(about = "Five-stage VMRS parts classification pipeline", long_about = None)]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config/default.toml"
    )]
    config: PathBuf,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    color: bool,

    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a parts list against the customer catalog
    Run {
        /// Input parts CSV (part_code, part_name)
        #[arg(short, long)]
        input: PathBuf,

        /// Customer VMRS catalog CSV
        #[arg(long)]
        catalog: PathBuf,

        /// Where output files are written (overrides the configured dir)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Run the pipeline but write no output files
        #[arg(long)]
        dry_run: bool,

        /// Only classify the first N parts
        #[arg(long, value_name = "NUM")]
        limit: Option<usize>,
    },

    /// Validate inputs and configuration without calling the oracle
    Check {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long)]
        catalog: PathBuf,
    },

    /// Write a scaffold rules file for a system
    InitRules {
        /// System code, e.g. 13
        #[arg(long)]
        system: String,

        /// Human-readable system name, e.g. Brakes
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    vmrs_classify::utils::logging::init_logger(cli.color, cli.verbose);

    info!("VMRS Classification Pipeline");

    let config = if cli.config.exists() {
        Config::load(Some(cli.config.as_path())).context("Failed to load configuration")?
    } else {
        warn!(
            "Config file {} not found, using default configuration",
            cli.config.display()
        );
        Config::load(None).unwrap_or_else(|e| {
            warn!("Falling back to built-in defaults: {}", e);
            Config::default_config()
        })
    };

    match cli.command {
        Commands::Run {
            input,
            catalog,
            output_dir,
            dry_run,
            limit,
        } => {
            cmd_run(&config, input, catalog, output_dir, dry_run, limit).await?;
        }
        Commands::Check { input, catalog } => {
            cmd_check(&config, input, catalog)?;
        }
        Commands::InitRules { system, name } => {
            cmd_init_rules(&config, &system, &name)?;
        }
    }

    Ok(())
}

async fn cmd_run(
    config: &Config,
    input: PathBuf,
    catalog_path: PathBuf,
    output_dir: Option<PathBuf>,
    dry_run: bool,
    limit: Option<usize>,
) -> Result<()> {
    let parts = load_parts(&input).context("Failed to load parts")?;
    let catalog = load_catalog(&catalog_path).context("Failed to load catalog")?;

    let parts = if let Some(limit) = limit {
        info!("Limiting run to the first {} part(s)", limit);
        parts.into_iter().take(limit).collect()
    } else {
        parts
    };

    let oracle = MessagesClient::new(&config.oracle).context("Failed to create oracle client")?;
    let orchestrator = PipelineOrchestrator::new(config.clone(), oracle, catalog)
        .context("Failed to initialize pipeline")?;

    let outcome = orchestrator
        .run(parts)
        .await
        .context("Classification run failed")?;

    println!(
        "{}",
        format_success(&format!(
            "{} of {} part(s) validated ({:.1}%)",
            outcome.summary.validated,
            outcome.summary.total_parts,
            outcome.summary.success_rate()
        ))
    );
    if outcome.summary.needs_review + outcome.summary.flagged > 0 {
        println!(
            "{}",
            format_warning(&format!(
                "{} part(s) need human review, {} validated with a flag",
                outcome.summary.needs_review, outcome.summary.flagged
            ))
        );
    }
    if outcome.summary.failed > 0 {
        println!(
            "{}",
            format_error(&format!("{} part(s) failed", outcome.summary.failed))
        );
    }

    if dry_run {
        println!("{}", format_info("Dry run, no output files written"));
        return Ok(());
    }

    let writer = OutputWriter::new(output_dir.unwrap_or_else(|| config.paths.output_dir.clone()));
    let master = writer.write_master(&outcome.records)?;
    let flagged = writer.write_flagged(&outcome.records)?;
    let report = writer.write_report(&outcome.summary)?;

    println!("{}", format_info(&format!("Results: {}", master.display())));
    println!("{}", format_info(&format!("Flagged: {}", flagged.display())));
    println!("{}", format_info(&format!("Report:  {}", report.display())));

    Ok(())
}

fn cmd_check(config: &Config, input: PathBuf, catalog_path: PathBuf) -> Result<()> {
    let parts = load_parts(&input).context("Parts file failed validation")?;
    let catalog = load_catalog(&catalog_path).context("Catalog file failed validation")?;

    println!(
        "{}",
        format_success(&format!(
            "{} part(s), catalog with {} entr(ies) across {} system(s)",
            parts.len(),
            catalog.len(),
            catalog.system_codes().len()
        ))
    );

    let loader = RulesLoader::new(config.paths.rules_dir.clone());
    for system in catalog.system_codes() {
        let rules = loader.load_system_rules(&system)?;
        if rules.is_empty() {
            println!(
                "{}",
                format_warning(&format!("system {} has no rules file", system))
            );
        } else {
            let sections = RulesLoader::parse_sections(&rules);
            println!(
                "{}",
                format_info(&format!(
                    "system {}: rules on file ({} section(s))",
                    system,
                    sections.len()
                ))
            );
        }
    }

    if config.oracle.api_key.is_none() {
        println!(
            "{}",
            format_warning("no oracle API key configured; `run` will fail")
        );
    }

    Ok(())
}

fn cmd_init_rules(config: &Config, system: &str, name: &str) -> Result<()> {
    vmrs_classify::Validator::validate_system_code(system)
        .context("Invalid system code")?;

    let file_name = format!("rules_system_{}_{}.txt", system, name.to_lowercase());
    let path = config.paths.rules_dir.join(file_name);
    if path.exists() {
        anyhow::bail!("rules file {} already exists", path.display());
    }

    RulesLoader::create_default_rules_file(system, name, &path)
        .context("Failed to write rules file")?;

    println!(
        "{}",
        format_success(&format!("created {}", path.display()))
    );
    Ok(())
}
