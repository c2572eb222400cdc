// file: src/rules/loader.rs
// description: loading and parsing of system-specific rules files and search templates

use crate::error::Result;
use crate::models::Part;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_SEARCH_TEMPLATE: &str = "{part_name} {part_code} specifications";

/// Loads per-system rules text and search-query templates from a rules
/// directory. Rules are free text consumed as oracle context; only the
/// WEB_SEARCH_REQUIRED flag and section boundaries are parsed here.
#[derive(Debug, Clone)]
pub struct RulesLoader {
    rules_dir: PathBuf,
}

impl RulesLoader {
    pub fn new(rules_dir: impl Into<PathBuf>) -> Self {
        Self {
            rules_dir: rules_dir.into(),
        }
    }

    /// Well-known system-name suffixes used in rules file naming.
    fn known_system_name(system_code: &str) -> Option<&'static str> {
        match system_code {
            "10" => Some("lubrication"),
            "13" => Some("brakes"),
            "17" => Some("tires"),
            _ => None,
        }
    }

    /// Rules file content for a system, or empty when no file exists.
    /// Tries `rules_system_{code}_{name}.txt` first, then the generic
    /// `rules_system_{code}.txt`.
    pub fn load_system_rules(&self, system_code: &str) -> Result<String> {
        let mut candidates = Vec::new();
        if let Some(name) = Self::known_system_name(system_code) {
            candidates.push(
                self.rules_dir
                    .join(format!("rules_system_{}_{}.txt", system_code, name)),
            );
        }
        candidates.push(self.rules_dir.join(format!("rules_system_{}.txt", system_code)));

        for candidate in &candidates {
            if candidate.exists() {
                info!("Loading rules from {}", candidate.display());
                return Ok(fs::read_to_string(candidate)?);
            }
        }

        warn!("No rules file found for system {}", system_code);
        Ok(String::new())
    }

    /// Search-query template for a system, falling back to a generic one.
    pub fn load_search_template(&self, system_code: &str) -> Result<String> {
        let template_file = self
            .rules_dir
            .join("search_templates")
            .join(format!("search_template_system_{}.txt", system_code));

        if !template_file.exists() {
            warn!("No search template found for system {}", system_code);
            return Ok(DEFAULT_SEARCH_TEMPLATE.to_string());
        }

        info!("Loading search template from {}", template_file.display());
        Ok(fs::read_to_string(&template_file)?.trim().to_string())
    }

    /// Splits a rules file into named sections. Separator lines of `=` are
    /// skipped; an all-caps line starts a new section.
    pub fn parse_sections(rules_content: &str) -> HashMap<String, String> {
        let title_re = Regex::new(r"^[A-Z][A-Z0-9 _]*$").expect("valid section title regex");

        let mut sections = HashMap::new();
        let mut current_section: Option<String> = None;
        let mut current_content: Vec<&str> = Vec::new();

        let mut flush =
            |section: &Option<String>, content: &mut Vec<&str>, out: &mut HashMap<String, String>| {
                if let Some(name) = section {
                    out.insert(name.clone(), content.join("\n").trim().to_string());
                }
                content.clear();
            };

        for line in rules_content.lines() {
            if line.contains("==========") {
                // Section banners wrap the title line; the section itself
                // stays open so its content (after the closing bar) lands
                // under the right name.
                flush(&current_section, &mut current_content, &mut sections);
                continue;
            }

            let stripped = line.trim();
            if !stripped.is_empty() && title_re.is_match(stripped) {
                flush(&current_section, &mut current_content, &mut sections);
                current_section = Some(stripped.to_string());
            } else if current_section.is_some() {
                current_content.push(line);
            }
        }

        flush(&current_section, &mut current_content, &mut sections);
        sections
    }

    /// Reads the WEB_SEARCH_REQUIRED flag out of a rules file.
    pub fn web_search_required(rules_content: &str) -> bool {
        let flag_re =
            Regex::new(r"(?m)^\s*WEB_SEARCH_REQUIRED\s*:\s*(\S+)").expect("valid flag regex");

        flag_re
            .captures(rules_content)
            .map(|caps| caps[1].eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// Substitutes part fields into a search-query template.
    pub fn fill_template(template: &str, part: &Part) -> String {
        template
            .replace("{part_name}", &part.part_name)
            .replace("{part_code}", &part.part_code)
    }

    /// Writes a scaffold rules file for a system that has none yet.
    pub fn create_default_rules_file(
        system_code: &str,
        system_name: &str,
        output_path: &Path,
    ) -> Result<()> {
        let template = format!(
            "SYSTEM: {code} - {name}\n\
             DESCRIPTION: {name} System Components\n\
             \n\
             ==========================================\n\
             WEB SEARCH CONFIGURATION\n\
             ==========================================\n\
             WEB_SEARCH_REQUIRED: False\n\
             WEB_SEARCH_QUERY_TEMPLATE: \"{{part_name}} {{part_code}} specifications\"\n\
             \n\
             ==========================================\n\
             PATTERN MATCHING RULES\n\
             ==========================================\n\
             \n\
             1. COMPONENT DETECTION:\n\
             \x20  Keywords: [Define keywords for this system]\n\
             \n\
             ==========================================\n\
             CODE ASSIGNMENT RULES\n\
             ==========================================\n\
             \n\
             [Define how to assign VMRS codes based on part attributes]\n\
             \n\
             ==========================================\n\
             VALIDATION RULES\n\
             ==========================================\n\
             \n\
             CRITICAL CHECKS:\n\
             1. [Define validation checks]\n\
             \n\
             COMMON ERROR PATTERNS:\n\
             - [Define common errors to avoid]\n\
             \n\
             ==========================================\n\
             CONFIDENCE SCORING GUIDELINES\n\
             ==========================================\n\
             \n\
             HIGH CONFIDENCE (90-100%):\n\
             - [Define criteria for high confidence]\n\
             \n\
             MEDIUM CONFIDENCE (70-89%):\n\
             - [Define criteria for medium confidence]\n\
             \n\
             LOW CONFIDENCE (<70%):\n\
             - [Define criteria for low confidence]\n",
            code = system_code,
            name = system_name,
        );

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(output_path, template)?;

        info!("Created default rules file at {}", output_path.display());
        Ok(())
    }
}
