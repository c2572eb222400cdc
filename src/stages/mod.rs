// file: src/stages/mod.rs
// description: shared stage executor driving the five classification stages
// reference: one polymorphic executor replaces five near-identical agent wrappers

use crate::error::{PipelineError, Result};
use crate::models::{ClassificationRecord, StageName};
use crate::oracle::{Oracle, OracleError, OracleRequest, RetryPolicy, call_with_retry};
use tracing::{debug, warn};

pub mod classify;
pub mod mapping;
pub mod pattern;
pub mod research;
pub mod schema;
pub mod validate;

pub use classify::ClassificationStage;
pub use mapping::MappingStage;
pub use pattern::PatternMatchStage;
pub use research::{CachedEnrichment, EnrichmentCache, ResearchStage, apply_cached_enrichment};
pub use validate::ValidationStage;

/// Stage-specific behavior plugged into the shared executor: how to build
/// the request, parse the structured response, check it against the stage's
/// output contract, and write results back into the records.
pub trait StageSpec {
    type Payload;

    fn name(&self) -> StageName;

    fn max_tokens(&self) -> u32;

    fn build_prompt(&self, batch: &[ClassificationRecord]) -> String;

    /// Parse failures are malformed output and count against the retry
    /// budget; a successfully parsed payload moves on to `validate`.
    fn parse(&self, content: &str) -> std::result::Result<Self::Payload, OracleError>;

    /// Contract checks on a parsed payload (required fields, enum
    /// membership, numeric ranges, part coverage). Violations are schema
    /// failures and are never retried.
    fn validate(&self, payload: &Self::Payload, batch: &[ClassificationRecord]) -> Result<()>;

    /// Writes payload results into the batch records, including status
    /// transitions and stage-history entries. Given an identical payload and
    /// batch this must produce identical records.
    fn apply(&self, payload: Self::Payload, batch: &mut [ClassificationRecord]) -> Result<()>;
}

/// What happened to one batch. Failure marks are already written into the
/// records; the report exists so the caller can bucket failures by kind.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub failure_kind: Option<&'static str>,
}

/// Drives one stage over one batch: call the oracle with retry, parse,
/// schema-validate, apply. Oracle exhaustion and schema violations fail the
/// batch (parts marked FAILED); only fatal oracle errors propagate.
pub struct StageExecutor<'a, O: Oracle> {
    oracle: &'a O,
    retry: RetryPolicy,
}

impl<'a, O: Oracle> StageExecutor<'a, O> {
    pub fn new(oracle: &'a O, retry: RetryPolicy) -> Self {
        Self { oracle, retry }
    }

    pub async fn run_batch<S: StageSpec>(
        &self,
        spec: &S,
        batch: &mut [ClassificationRecord],
    ) -> Result<BatchReport> {
        let stage = spec.name();
        let prompt = spec.build_prompt(batch);
        let request = OracleRequest {
            system_prompt: None,
            prompt,
            max_tokens: spec.max_tokens(),
        };

        debug!(
            "Running stage {} over batch of {} part(s)",
            stage,
            batch.len()
        );

        let outcome = call_with_retry(&self.retry, stage.as_str(), || {
            let request = request.clone();
            async move {
                let response = self.oracle.complete(request).await?;
                spec.parse(&response.content)
            }
        })
        .await;

        let payload = match outcome {
            Ok(payload) => payload,
            Err(OracleError::Fatal(msg)) => {
                return Err(PipelineError::OracleFatal(msg));
            }
            Err(err) => {
                let err: PipelineError = err.into();
                return Ok(Self::fail_batch(stage, batch, &err));
            }
        };

        if let Err(err) = spec.validate(&payload, batch) {
            let err = match err {
                PipelineError::Validation(message) => PipelineError::SchemaValidation {
                    stage: stage.as_str().to_string(),
                    message,
                },
                other => other,
            };
            return Ok(Self::fail_batch(stage, batch, &err));
        }

        spec.apply(payload, batch)?;

        Ok(BatchReport {
            succeeded: batch.len(),
            failed: 0,
            failure_kind: None,
        })
    }

    fn fail_batch(
        stage: StageName,
        batch: &mut [ClassificationRecord],
        err: &PipelineError,
    ) -> BatchReport {
        warn!("Stage {} batch failed: {}", stage, err);

        let mut failed = 0;
        for record in batch.iter_mut() {
            if record.is_terminal() {
                continue;
            }
            record.record_stage(stage, "failed", record.confidence);
            record.mark_failed(format!("stage {} failed: {}", stage, err));
            failed += 1;
        }

        BatchReport {
            succeeded: 0,
            failed,
            failure_kind: Some(err.kind_label()),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::oracle::{Oracle, OracleError, OracleRequest, OracleResponse};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Oracle stub returning scripted responses in order.
    pub struct ScriptedOracle {
        responses: Mutex<VecDeque<std::result::Result<String, OracleError>>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedOracle {
        pub fn new(
            responses: Vec<std::result::Result<String, OracleError>>,
        ) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn always(content: &str) -> Self {
            Self::new(vec![Ok(content.to_string()); 16])
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl Oracle for ScriptedOracle {
        async fn complete(
            &self,
            request: OracleRequest,
        ) -> std::result::Result<OracleResponse, OracleError> {
            self.calls.lock().unwrap().push(request.prompt.clone());
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(OracleError::Transient("script exhausted".into())));

            next.map(|content| OracleResponse {
                content,
                input_tokens: 0,
                output_tokens: 0,
            })
        }
    }
}
