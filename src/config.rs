// file: src/config.rs
// description: application configuration management with toml support
// reference: https://docs.rs/config

use crate::error::{PipelineError, Result};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub oracle: OracleConfig,
    pub thresholds: ThresholdConfig,
    pub retry: RetryConfig,
    pub batching: BatchConfig,
    pub pipeline: PipelineConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OracleConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_tokens: StageTokenConfig,
}

/// Per-stage max-tokens pass-through. The core logic never inspects these;
/// they travel with each oracle request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StageTokenConfig {
    pub classification: u32,
    pub pattern_match: u32,
    pub research: u32,
    pub mapping: u32,
    pub validation: u32,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct ThresholdConfig {
    pub auto_approve: u8,
    pub require_web_search: u8,
    pub flag_for_review: u8,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_wait_secs: u64,
    pub backoff_multiplier: u32,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct BatchConfig {
    pub pattern_match_batch_size: usize,
    pub validation_batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    pub max_workers: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathsConfig {
    pub rules_dir: PathBuf,
    pub validated_dir: PathBuf,
    pub enrichment_cache: PathBuf,
    pub output_dir: PathBuf,
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv().ok();

        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        } else {
            builder = builder.add_source(config::File::from(Path::new("config/default.toml")));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("VMRS_CLASSIFY")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        let mut config: Config = settings
            .try_deserialize()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        if config.oracle.api_key.is_none() {
            config.oracle.api_key = std::env::var("ANTHROPIC_API_KEY").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            oracle: OracleConfig {
                api_url: "https://api.anthropic.com/v1/messages".to_string(),
                api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
                model: "claude-3-5-haiku-20241022".to_string(),
                temperature: 0.0,
                timeout_secs: 120,
                max_tokens: StageTokenConfig {
                    classification: 4000,
                    pattern_match: 3000,
                    research: 2000,
                    mapping: 2000,
                    validation: 2000,
                },
            },
            thresholds: ThresholdConfig {
                auto_approve: 90,
                require_web_search: 70,
                flag_for_review: 90,
            },
            retry: RetryConfig {
                max_retries: 3,
                initial_wait_secs: 5,
                backoff_multiplier: 2,
            },
            batching: BatchConfig {
                pattern_match_batch_size: 10,
                validation_batch_size: 10,
            },
            pipeline: PipelineConfig { max_workers: 4 },
            paths: PathsConfig {
                rules_dir: PathBuf::from("rules"),
                validated_dir: PathBuf::from("data/validated"),
                enrichment_cache: PathBuf::from("data/enrichment/web_search_cache.json"),
                output_dir: PathBuf::from("data/output"),
            },
        }
    }

    fn validate(&self) -> Result<()> {
        if self.pipeline.max_workers == 0 {
            return Err(PipelineError::Config(
                "max_workers must be greater than 0".to_string(),
            ));
        }

        if self.batching.pattern_match_batch_size == 0 || self.batching.validation_batch_size == 0 {
            return Err(PipelineError::Config(
                "batch sizes must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("auto_approve", self.thresholds.auto_approve),
            ("require_web_search", self.thresholds.require_web_search),
            ("flag_for_review", self.thresholds.flag_for_review),
        ] {
            if value > 100 {
                return Err(PipelineError::Config(format!(
                    "threshold {} must be within 0-100, got {}",
                    name, value
                )));
            }
        }

        if self.retry.max_retries == 0 {
            return Err(PipelineError::Config(
                "max_retries must be greater than 0".to_string(),
            ));
        }

        if self.retry.backoff_multiplier == 0 {
            return Err(PipelineError::Config(
                "backoff_multiplier must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
