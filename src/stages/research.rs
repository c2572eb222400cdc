// file: src/stages/research.rs
// description: stage 3 - per-part enrichment research with a persistent cache

use crate::error::{PipelineError, Result};
use crate::models::{ClassificationRecord, StageName};
use crate::oracle::OracleError;
use crate::stages::StageSpec;
use crate::stages::schema::{self, ResearchPayload};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Enrichment result worth keeping across runs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CachedEnrichment {
    pub enriched_description: String,
    #[serde(default)]
    pub attributes: std::collections::BTreeMap<String, String>,
}

/// Research results keyed by part code, persisted as JSON between runs so
/// repeat parts never hit the oracle twice.
pub struct EnrichmentCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, CachedEnrichment>>,
}

impl EnrichmentCache {
    /// Loads the cache file if present; a missing file starts empty.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.is_file() {
            let raw = fs::read_to_string(&path).map_err(|source| {
                PipelineError::FileOperation {
                    path: path.clone(),
                    source,
                }
            })?;
            serde_json::from_str(&raw).map_err(|e| {
                PipelineError::Serialization(format!(
                    "enrichment cache {} is not valid JSON: {}",
                    path.display(),
                    e
                ))
            })?
        } else {
            debug!("No enrichment cache at {}, starting empty", path.display());
            HashMap::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn get(&self, part_code: &str) -> Option<CachedEnrichment> {
        self.entries.lock().unwrap().get(part_code).cloned()
    }

    pub fn insert(&self, part_code: impl Into<String>, enrichment: CachedEnrichment) {
        self.entries
            .lock()
            .unwrap()
            .insert(part_code.into(), enrichment);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Writes the cache back to disk. Called once at the end of a run.
    pub fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| PipelineError::FileOperation {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let entries = self.entries.lock().unwrap();
        let json = serde_json::to_string_pretty(&*entries)
            .map_err(|e| PipelineError::Serialization(e.to_string()))?;
        fs::write(&self.path, json).map_err(|source| PipelineError::FileOperation {
            path: self.path.clone(),
            source,
        })?;

        debug!(
            "Persisted {} enrichment entr(ies) to {}",
            entries.len(),
            self.path.display()
        );
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Enriches one part at a time with a fuller description and extracted
/// attributes, caching the result by part code.
pub struct ResearchStage<'a> {
    pub search_query: &'a str,
    pub cache: &'a EnrichmentCache,
    pub max_tokens: u32,
}

impl StageSpec for ResearchStage<'_> {
    type Payload = ResearchPayload;

    fn name(&self) -> StageName {
        StageName::Research
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn build_prompt(&self, batch: &[ClassificationRecord]) -> String {
        let record = &batch[0];
        let mut prompt = format!(
            "TASK: PART RESEARCH\n\
             Research this truck part and produce an enriched description \
             suitable for VMRS code mapping.\n\n\
             PART: {}: {}\n",
            record.part.part_code, record.part.part_name
        );
        let _ = writeln!(prompt, "SEARCH QUERY: {}", self.search_query);

        prompt.push_str(
            "\nRespond with JSON only:\n\
             {\"part_code\", \"enriched_description\", \
             \"attributes\": {\"name\": \"value\"}}\n",
        );

        prompt
    }

    fn parse(&self, content: &str) -> std::result::Result<Self::Payload, OracleError> {
        schema::parse_payload(content)
    }

    fn validate(&self, payload: &Self::Payload, batch: &[ClassificationRecord]) -> Result<()> {
        let expected = &batch[0].part.part_code;
        if !payload.part_code.is_empty() && payload.part_code != *expected {
            return Err(schema::schema_err(
                self.name(),
                format!(
                    "response is for part {} but {} was requested",
                    payload.part_code, expected
                ),
            ));
        }
        if payload.enriched_description.trim().is_empty() {
            return Err(schema::schema_err(
                self.name(),
                format!("empty enriched description for part {}", expected),
            ));
        }
        Ok(())
    }

    fn apply(&self, payload: Self::Payload, batch: &mut [ClassificationRecord]) -> Result<()> {
        let record = &mut batch[0];
        if record.is_terminal() {
            return Ok(());
        }

        let description = payload.enriched_description.trim().to_string();
        record.enriched_description = Some(description.clone());
        record.record_stage(StageName::Research, "enriched", record.confidence);

        self.cache.insert(
            record.part.part_code.clone(),
            CachedEnrichment {
                enriched_description: description,
                attributes: payload.attributes,
            },
        );

        Ok(())
    }
}

/// Applies a cached enrichment without an oracle call.
pub fn apply_cached_enrichment(record: &mut ClassificationRecord, cached: CachedEnrichment) {
    if record.is_terminal() {
        warn!(
            "Skipping cached enrichment for terminal part {}",
            record.part.part_code
        );
        return;
    }
    record.enriched_description = Some(cached.enriched_description);
    record.record_stage(StageName::Research, "cache_hit", record.confidence);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Part;
    use crate::oracle::RetryPolicy;
    use crate::stages::StageExecutor;
    use crate::stages::test_support::ScriptedOracle;
    use std::time::Duration;
    use tempfile::TempDir;

    fn record() -> ClassificationRecord {
        ClassificationRecord::new(Part::new("DEF456", "Mystery Bracket 7in"))
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_millis(1), 2)
    }

    fn response() -> String {
        serde_json::json!({
            "part_code": "DEF456",
            "enriched_description": "7 inch steel mounting bracket for mud flap hangers",
            "attributes": {"material": "steel", "length": "7in"}
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_research_enriches_and_caches() {
        let dir = TempDir::new().unwrap();
        let cache = EnrichmentCache::load(dir.path().join("cache.json")).unwrap();
        let oracle = ScriptedOracle::always(&response());
        let executor = StageExecutor::new(&oracle, policy());
        let stage = ResearchStage {
            search_query: "Mystery Bracket 7in DEF456 specifications",
            cache: &cache,
            max_tokens: 2000,
        };

        let mut batch = vec![record()];
        executor.run_batch(&stage, &mut batch).await.unwrap();

        assert!(
            batch[0]
                .enriched_description
                .as_deref()
                .unwrap()
                .contains("mounting bracket")
        );
        assert!(batch[0].visited_stage(StageName::Research));

        let cached = cache.get("DEF456").unwrap();
        assert_eq!(cached.attributes.get("material").unwrap(), "steel");
    }

    #[tokio::test]
    async fn test_prompt_carries_search_query() {
        let dir = TempDir::new().unwrap();
        let cache = EnrichmentCache::load(dir.path().join("cache.json")).unwrap();
        let oracle = ScriptedOracle::always(&response());
        let executor = StageExecutor::new(&oracle, policy());
        let stage = ResearchStage {
            search_query: "Mystery Bracket 7in DEF456 specifications",
            cache: &cache,
            max_tokens: 2000,
        };

        let mut batch = vec![record()];
        executor.run_batch(&stage, &mut batch).await.unwrap();

        let calls = oracle.calls.lock().unwrap();
        assert!(calls[0].contains("SEARCH QUERY: Mystery Bracket 7in DEF456 specifications"));
    }

    #[tokio::test]
    async fn test_wrong_part_code_rejected() {
        let dir = TempDir::new().unwrap();
        let cache = EnrichmentCache::load(dir.path().join("cache.json")).unwrap();
        let wrong = serde_json::json!({
            "part_code": "OTHER",
            "enriched_description": "something else entirely"
        })
        .to_string();

        let oracle = ScriptedOracle::always(&wrong);
        let executor = StageExecutor::new(&oracle, policy());
        let stage = ResearchStage {
            search_query: "q",
            cache: &cache,
            max_tokens: 2000,
        };

        let mut batch = vec![record()];
        let report = executor.run_batch(&stage, &mut batch).await.unwrap();
        assert_eq!(report.failure_kind, Some("schema_validation"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");

        let cache = EnrichmentCache::load(&path).unwrap();
        cache.insert(
            "DEF456",
            CachedEnrichment {
                enriched_description: "steel bracket".into(),
                attributes: Default::default(),
            },
        );
        cache.persist().unwrap();

        let reloaded = EnrichmentCache::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(
            reloaded.get("DEF456").unwrap().enriched_description,
            "steel bracket"
        );
    }

    #[test]
    fn test_corrupt_cache_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            EnrichmentCache::load(&path),
            Err(PipelineError::Serialization(_))
        ));
    }

    #[test]
    fn test_cached_enrichment_applied_without_oracle() {
        let mut rec = record();
        apply_cached_enrichment(
            &mut rec,
            CachedEnrichment {
                enriched_description: "from cache".into(),
                attributes: Default::default(),
            },
        );
        assert_eq!(rec.enriched_description.as_deref(), Some("from cache"));
        assert!(rec.visited_stage(StageName::Research));
        assert_eq!(rec.stage_history()[0].outcome, "cache_hit");
    }
}
