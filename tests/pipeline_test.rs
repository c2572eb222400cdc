// file: tests/pipeline_test.rs
// description: end-to-end pipeline runs against a scripted oracle

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;
use vmrs_classify::models::StageName;
use vmrs_classify::oracle::{Oracle, OracleError, OracleRequest, OracleResponse};
use vmrs_classify::{
    Catalog, CatalogEntry, Config, MatchType, Part, PartStatus, PipelineOrchestrator,
};

/// Routes prompts to canned responses by substring match. An unmatched
/// prompt fails fatally so a misrouted call cannot pass silently.
struct ScriptOracle {
    routes: Vec<Route>,
}

struct Route {
    needles: Vec<String>,
    responses: Mutex<VecDeque<Result<String, OracleError>>>,
}

impl ScriptOracle {
    fn new() -> Self {
        Self { routes: Vec::new() }
    }

    fn route(mut self, needles: &[&str], responses: Vec<Result<String, OracleError>>) -> Self {
        self.routes.push(Route {
            needles: needles.iter().map(|n| n.to_string()).collect(),
            responses: Mutex::new(responses.into_iter().collect()),
        });
        self
    }
}

impl Oracle for ScriptOracle {
    async fn complete(&self, request: OracleRequest) -> Result<OracleResponse, OracleError> {
        for route in &self.routes {
            if route.needles.iter().all(|n| request.prompt.contains(n)) {
                if let Some(next) = route.responses.lock().unwrap().pop_front() {
                    return next.map(|content| OracleResponse {
                        content,
                        input_tokens: 0,
                        output_tokens: 0,
                    });
                }
            }
        }

        Err(OracleError::Fatal(format!(
            "no scripted response for prompt: {}",
            request.prompt.lines().next().unwrap_or("")
        )))
    }
}

fn test_config(dir: &Path) -> Config {
    let mut config = Config::default_config();
    config.retry.max_retries = 1;
    config.retry.initial_wait_secs = 0;
    config.paths.rules_dir = dir.join("rules");
    config.paths.validated_dir = dir.join("validated");
    config.paths.enrichment_cache = dir.join("cache/web_search_cache.json");
    config.paths.output_dir = dir.join("output");
    config
}

fn catalog() -> Catalog {
    Catalog::new(vec![
        CatalogEntry {
            vmrs_code: "13-040".into(),
            system_name: "Brakes".into(),
            description: "Disc Brake Pad Set".into(),
            is_custom: false,
        },
        CatalogEntry {
            vmrs_code: "13-050".into(),
            system_name: "Brakes".into(),
            description: "Brake Shoe Kit".into(),
            is_custom: false,
        },
        CatalogEntry {
            vmrs_code: "17-010".into(),
            system_name: "Tires and Wheels".into(),
            description: "Steer Tire".into(),
            is_custom: false,
        },
    ])
}

fn classification(entries: &[(&str, &str, &str, i64)]) -> String {
    let parts: Vec<_> = entries
        .iter()
        .map(|(code, system, routing, conf)| {
            serde_json::json!({
                "part_code": code,
                "vmrs_system_code": system,
                "routing": routing,
                "confidence": conf
            })
        })
        .collect();
    serde_json::json!({ "classified_parts": parts }).to_string()
}

fn mapping(code: &str, vmrs: &str, conf: i64) -> String {
    serde_json::json!({
        "part_code": code,
        "vmrs_code": vmrs,
        "confidence": conf,
        "is_custom_code": false,
        "reasoning": ""
    })
    .to_string()
}

fn validations(entries: &[(&str, &str, i64)]) -> String {
    let list: Vec<_> = entries
        .iter()
        .map(|(code, status, conf)| {
            serde_json::json!({
                "part_code": code,
                "status": status,
                "confidence": conf,
                "issues": []
            })
        })
        .collect();
    serde_json::json!({ "validations": list }).to_string()
}

#[tokio::test]
async fn test_exact_match_happy_path_skips_rules_and_research() {
    let dir = TempDir::new().unwrap();
    let oracle = ScriptOracle::new()
        .route(
            &["TASK: SYSTEM CLASSIFICATION"],
            vec![Ok(classification(&[("ABC123", "13", "EXACT_MATCH", 95)]))],
        )
        .route(
            &["TASK: VMRS CODE MAPPING", "ABC123"],
            vec![Ok(mapping("ABC123", "13-040", 95))],
        )
        .route(
            &["TASK: QUALITY VALIDATION"],
            vec![Ok(validations(&[("ABC123", "PASS", 95)]))],
        );

    let orchestrator =
        PipelineOrchestrator::new(test_config(dir.path()), oracle, catalog()).unwrap();
    let outcome = orchestrator
        .run(vec![Part::new("ABC123", "Brake Pad Set Front")])
        .await
        .unwrap();

    let record = &outcome.records[0];
    assert_eq!(record.status(), PartStatus::Validated);
    assert_eq!(record.vmrs_code.as_deref(), Some("13-040"));
    assert_eq!(record.match_type, Some(MatchType::ExactMatch));
    assert!(!record.is_custom_code);
    assert!(!record.flagged);

    assert!(record.visited_stage(StageName::Classification));
    assert!(record.visited_stage(StageName::Mapping));
    assert!(record.visited_stage(StageName::Validation));
    assert!(!record.visited_stage(StageName::PatternMatch));
    assert!(!record.visited_stage(StageName::Research));

    assert_eq!(outcome.summary.validated, 1);
    assert!(outcome.summary.is_reconciled());
}

#[tokio::test]
async fn test_malformed_batch_fails_parts_but_run_continues() {
    let dir = TempDir::new().unwrap();
    let oracle = ScriptOracle::new()
        .route(
            &["TASK: SYSTEM CLASSIFICATION"],
            vec![Ok(classification(&[
                ("PAD1", "13", "PATTERN_MATCH_NEEDED", 85),
                ("TIRE1", "17", "EXACT_MATCH", 95),
            ]))],
        )
        // Stage 2 for system 13 never produces valid JSON.
        .route(
            &["TASK: PATTERN MATCHING", "system 13"],
            vec![Ok("not json".into()), Ok("{broken".into()), Ok("nope".into())],
        )
        .route(
            &["TASK: VMRS CODE MAPPING", "TIRE1"],
            vec![Ok(mapping("TIRE1", "17-010", 95))],
        )
        .route(
            &["TASK: QUALITY VALIDATION", "TIRE1"],
            vec![Ok(validations(&[("TIRE1", "PASS", 95)]))],
        );

    let orchestrator =
        PipelineOrchestrator::new(test_config(dir.path()), oracle, catalog()).unwrap();
    let outcome = orchestrator
        .run(vec![
            Part::new("PAD1", "Brake Pad Set"),
            Part::new("TIRE1", "Steer Tire 295/75R22.5"),
        ])
        .await
        .unwrap();

    let pad = &outcome.records[0];
    assert_eq!(pad.status(), PartStatus::Failed);
    assert!(pad.joined_notes().contains("pattern_match"));

    let tire = &outcome.records[1];
    assert_eq!(tire.status(), PartStatus::Validated);

    assert_eq!(outcome.summary.failed, 1);
    assert_eq!(outcome.summary.validated, 1);
    assert_eq!(
        outcome.summary.failure_kinds.get("oracle_malformed"),
        Some(&1)
    );
}

#[tokio::test]
async fn test_unknown_mapping_code_lands_in_review() {
    let dir = TempDir::new().unwrap();
    let oracle = ScriptOracle::new()
        .route(
            &["TASK: SYSTEM CLASSIFICATION"],
            vec![Ok(classification(&[("ABC123", "13", "EXACT_MATCH", 95)]))],
        )
        .route(
            &["TASK: VMRS CODE MAPPING", "ABC123"],
            vec![Ok(mapping("ABC123", "99-999", 95))],
        );

    let orchestrator =
        PipelineOrchestrator::new(test_config(dir.path()), oracle, catalog()).unwrap();
    let outcome = orchestrator
        .run(vec![Part::new("ABC123", "Brake Pad Set Front")])
        .await
        .unwrap();

    let record = &outcome.records[0];
    assert_eq!(record.status(), PartStatus::NeedsReview);
    assert_eq!(record.vmrs_code, None);
    assert!(record.joined_notes().contains("99-999"));
    assert_eq!(outcome.summary.needs_review, 1);
}

#[tokio::test]
async fn test_contradictory_mappings_reviewed_despite_high_confidence() {
    let dir = TempDir::new().unwrap();
    let oracle = ScriptOracle::new()
        .route(
            &["TASK: SYSTEM CLASSIFICATION"],
            vec![Ok(classification(&[
                ("A1", "13", "EXACT_MATCH", 95),
                ("A2", "13", "EXACT_MATCH", 95),
            ]))],
        )
        .route(
            &["TASK: VMRS CODE MAPPING", "A1"],
            vec![Ok(mapping("A1", "13-040", 95))],
        )
        .route(
            &["TASK: VMRS CODE MAPPING", "A2"],
            vec![Ok(mapping("A2", "13-050", 95))],
        )
        .route(
            &["TASK: QUALITY VALIDATION"],
            vec![Ok(validations(&[("A1", "PASS", 95), ("A2", "PASS", 95)]))],
        );

    let orchestrator =
        PipelineOrchestrator::new(test_config(dir.path()), oracle, catalog()).unwrap();
    let outcome = orchestrator
        .run(vec![
            Part::new("A1", "Brake Pad Set"),
            Part::new("A2", "Brake Pad Set"),
        ])
        .await
        .unwrap();

    for record in &outcome.records {
        assert_eq!(record.status(), PartStatus::NeedsReview);
        assert!(record.joined_notes().contains("different VMRS codes"));
    }
    assert_eq!(outcome.summary.needs_review, 2);
}

#[tokio::test]
async fn test_web_search_path_enriches_and_caches_across_runs() {
    let dir = TempDir::new().unwrap();

    let research_response = serde_json::json!({
        "part_code": "BRK7",
        "enriched_description": "7 inch steel mud flap bracket",
        "attributes": {}
    })
    .to_string();

    let make_oracle = |with_research: bool| {
        let mut oracle = ScriptOracle::new()
            .route(
                &["TASK: SYSTEM CLASSIFICATION"],
                vec![Ok(classification(&[("BRK7", "13", "WEB_SEARCH_NEEDED", 80)]))],
            )
            .route(
                &["TASK: VMRS CODE MAPPING", "BRK7"],
                vec![Ok(mapping("BRK7", "13-050", 88))],
            )
            .route(
                &["TASK: QUALITY VALIDATION"],
                vec![Ok(validations(&[("BRK7", "PASS", 88)]))],
            );
        if with_research {
            oracle = oracle.route(
                &["TASK: PART RESEARCH", "BRK7"],
                vec![Ok(research_response.clone())],
            );
        }
        oracle
    };

    let first = PipelineOrchestrator::new(test_config(dir.path()), make_oracle(true), catalog())
        .unwrap();
    let outcome = first
        .run(vec![Part::new("BRK7", "Mystery Bracket 7in")])
        .await
        .unwrap();

    let record = &outcome.records[0];
    // Confidence 88 sits below the review threshold, so validation cannot
    // auto-approve even on PASS.
    assert_eq!(record.status(), PartStatus::NeedsReview);
    assert!(record.visited_stage(StageName::Research));
    assert_eq!(record.match_type, Some(MatchType::WebSearch));
    assert_eq!(outcome.summary.cache_hits, 0);

    // Second run has no scripted research response; the cache must supply it.
    let second = PipelineOrchestrator::new(test_config(dir.path()), make_oracle(false), catalog())
        .unwrap();
    let outcome = second
        .run(vec![Part::new("BRK7", "Mystery Bracket 7in")])
        .await
        .unwrap();

    assert_eq!(outcome.records[0].status(), PartStatus::NeedsReview);
    assert_eq!(outcome.summary.cache_hits, 1);
}

#[tokio::test]
async fn test_pass_at_threshold_validates_flagged() {
    let dir = TempDir::new().unwrap();
    let oracle = ScriptOracle::new()
        .route(
            &["TASK: SYSTEM CLASSIFICATION"],
            vec![Ok(classification(&[("ABC123", "13", "EXACT_MATCH", 95)]))],
        )
        .route(
            &["TASK: VMRS CODE MAPPING", "ABC123"],
            vec![Ok(mapping("ABC123", "13-040", 90))],
        )
        .route(
            &["TASK: QUALITY VALIDATION"],
            vec![Ok(validations(&[("ABC123", "PASS", 90)]))],
        );

    let orchestrator =
        PipelineOrchestrator::new(test_config(dir.path()), oracle, catalog()).unwrap();
    let outcome = orchestrator
        .run(vec![Part::new("ABC123", "Brake Pad Set Front")])
        .await
        .unwrap();

    let record = &outcome.records[0];
    assert_eq!(record.status(), PartStatus::Validated);
    assert!(record.flagged);
    assert_eq!(outcome.summary.flagged, 1);
}

#[tokio::test]
async fn test_every_part_settles_exactly_once_in_input_order() {
    let dir = TempDir::new().unwrap();
    let oracle = ScriptOracle::new()
        .route(
            &["TASK: SYSTEM CLASSIFICATION"],
            vec![Ok(classification(&[
                ("P1", "13", "EXACT_MATCH", 95),
                ("P2", "17", "EXACT_MATCH", 95),
                ("P3", "13", "EXACT_MATCH", 95),
            ]))],
        )
        .route(
            &["TASK: VMRS CODE MAPPING", "P1"],
            vec![Ok(mapping("P1", "13-040", 95))],
        )
        .route(
            &["TASK: VMRS CODE MAPPING", "P2"],
            vec![Ok(mapping("P2", "17-010", 95))],
        )
        .route(
            &["TASK: VMRS CODE MAPPING", "P3"],
            vec![Ok(mapping("P3", "13-050", 95))],
        )
        .route(
            &["TASK: QUALITY VALIDATION", "P1"],
            vec![Ok(validations(&[("P1", "PASS", 95), ("P3", "PASS", 95)]))],
        )
        .route(
            &["TASK: QUALITY VALIDATION", "P2"],
            vec![Ok(validations(&[("P2", "PASS", 95)]))],
        );

    let parts = vec![
        Part::new("P1", "Brake Pad Set"),
        Part::new("P2", "Steer Tire"),
        Part::new("P3", "Brake Shoe Kit"),
    ];

    let orchestrator =
        PipelineOrchestrator::new(test_config(dir.path()), oracle, catalog()).unwrap();
    let outcome = orchestrator.run(parts).await.unwrap();

    let codes: Vec<&str> = outcome
        .records
        .iter()
        .map(|r| r.part.part_code.as_str())
        .collect();
    assert_eq!(codes, vec!["P1", "P2", "P3"]);
    assert!(outcome.records.iter().all(|r| r.is_terminal()));
    assert_eq!(outcome.summary.total_parts, 3);
    assert!(outcome.summary.is_reconciled());
}

#[tokio::test]
async fn test_duplicate_input_codes_rejected_before_any_oracle_call() {
    let dir = TempDir::new().unwrap();
    let oracle = ScriptOracle::new();

    let orchestrator =
        PipelineOrchestrator::new(test_config(dir.path()), oracle, catalog()).unwrap();
    let err = orchestrator
        .run(vec![
            Part::new("DUP", "one"),
            Part::new("DUP", "two"),
        ])
        .await
        .unwrap_err();

    assert!(err.to_string().contains("duplicate part_code DUP"));
}

#[tokio::test]
async fn test_fatal_oracle_error_aborts_run() {
    let dir = TempDir::new().unwrap();
    let oracle = ScriptOracle::new().route(
        &["TASK: SYSTEM CLASSIFICATION"],
        vec![Err(OracleError::Fatal("status 401: bad key".into()))],
    );

    let orchestrator =
        PipelineOrchestrator::new(test_config(dir.path()), oracle, catalog()).unwrap();
    let err = orchestrator
        .run(vec![Part::new("ABC123", "Brake Pad Set")])
        .await
        .unwrap_err();

    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn test_exact_match_at_low_confidence_still_skips_rules_and_research() {
    let dir = TempDir::new().unwrap();
    let oracle = ScriptOracle::new()
        .route(
            &["TASK: SYSTEM CLASSIFICATION"],
            vec![Ok(classification(&[("ABC123", "13", "EXACT_MATCH", 60)]))],
        )
        .route(
            &["TASK: VMRS CODE MAPPING", "ABC123"],
            vec![Ok(mapping("ABC123", "13-040", 60))],
        )
        .route(
            &["TASK: QUALITY VALIDATION"],
            vec![Ok(validations(&[("ABC123", "PASS", 60)]))],
        );

    let orchestrator =
        PipelineOrchestrator::new(test_config(dir.path()), oracle, catalog()).unwrap();
    let outcome = orchestrator
        .run(vec![Part::new("ABC123", "Brake Pad Set Front")])
        .await
        .unwrap();

    // Low confidence forces human review, but the exact-match path itself
    // never detours through pattern matching or research.
    let record = &outcome.records[0];
    assert_eq!(record.status(), PartStatus::NeedsReview);
    assert!(record.visited_stage(StageName::Mapping));
    assert!(!record.visited_stage(StageName::PatternMatch));
    assert!(!record.visited_stage(StageName::Research));
}

#[tokio::test]
async fn test_web_search_required_rules_exempt_exact_matches() {
    let dir = TempDir::new().unwrap();
    let rules_dir = dir.path().join("rules");
    std::fs::create_dir_all(&rules_dir).unwrap();
    std::fs::write(
        rules_dir.join("rules_system_13.txt"),
        "WEB_SEARCH_REQUIRED: True\n",
    )
    .unwrap();

    let research_response = serde_json::json!({
        "part_code": "PM1",
        "enriched_description": "spring brake chamber type 30",
        "attributes": {}
    })
    .to_string();

    let oracle = ScriptOracle::new()
        .route(
            &["TASK: SYSTEM CLASSIFICATION"],
            vec![Ok(classification(&[
                ("EX1", "13", "EXACT_MATCH", 95),
                ("PM1", "13", "PATTERN_MATCH_NEEDED", 85),
            ]))],
        )
        .route(&["TASK: PART RESEARCH", "PM1"], vec![Ok(research_response)])
        .route(
            &["TASK: VMRS CODE MAPPING", "EX1"],
            vec![Ok(mapping("EX1", "13-040", 95))],
        )
        .route(
            &["TASK: VMRS CODE MAPPING", "PM1"],
            vec![Ok(mapping("PM1", "13-050", 95))],
        )
        .route(
            &["TASK: QUALITY VALIDATION"],
            vec![Ok(validations(&[("EX1", "PASS", 95), ("PM1", "PASS", 95)]))],
        );

    let orchestrator =
        PipelineOrchestrator::new(test_config(dir.path()), oracle, catalog()).unwrap();
    let outcome = orchestrator
        .run(vec![
            Part::new("EX1", "Brake Pad Set"),
            Part::new("PM1", "Brake Chamber"),
        ])
        .await
        .unwrap();

    // The rules flag pushes pattern-match parts through research but does
    // not touch the exact-match path.
    let exact = &outcome.records[0];
    assert_eq!(exact.status(), PartStatus::Validated);
    assert!(!exact.visited_stage(StageName::Research));
    assert!(!exact.visited_stage(StageName::PatternMatch));

    let forced = &outcome.records[1];
    assert_eq!(forced.status(), PartStatus::Validated);
    assert!(forced.visited_stage(StageName::Research));
    assert!(!forced.visited_stage(StageName::PatternMatch));

    assert_eq!(outcome.summary.validated, 2);
}

#[tokio::test]
async fn test_pattern_code_from_wrong_system_reviewed() {
    let dir = TempDir::new().unwrap();
    let cross_system = serde_json::json!({
        "mappings": [{
            "part_code": "PAD1",
            "vmrs_code": "17-010",
            "confidence": 92,
            "match_type": "exact",
            "web_search_needed": false
        }]
    })
    .to_string();

    let oracle = ScriptOracle::new()
        .route(
            &["TASK: SYSTEM CLASSIFICATION"],
            vec![Ok(classification(&[("PAD1", "13", "PATTERN_MATCH_NEEDED", 85)]))],
        )
        .route(
            &["TASK: PATTERN MATCHING", "system 13"],
            vec![Ok(cross_system)],
        );

    let orchestrator =
        PipelineOrchestrator::new(test_config(dir.path()), oracle, catalog()).unwrap();
    let outcome = orchestrator
        .run(vec![Part::new("PAD1", "Brake Pad Set")])
        .await
        .unwrap();

    // 17-010 exists in the catalog but belongs to another system; the part
    // never validates with it.
    let record = &outcome.records[0];
    assert_eq!(record.status(), PartStatus::NeedsReview);
    assert_eq!(record.vmrs_code, None);
    assert!(record.joined_notes().contains("different system"));
    assert_eq!(outcome.summary.needs_review, 1);
}
