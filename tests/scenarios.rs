//! End-to-end scenarios across the workspace crates.
//!
//! Offline counterparts of the flows a live session exercises: the Gemini
//! tool round-trip, reranker weighting, image budgets, the composite
//! security check, intent classification, and cascade detection.

use quill_evidence::{
    Evidence, EvidenceMetadata, Intent, LineRange, ProviderKind, RerankConfig, RerankerWeights,
    Signal, SignalSource, SignalType, TurnContext, classify, rerank,
};
use quill_provider_gemini::GeminiTransform;
use quill_sandbox::{
    DangerousCommandDetector, PolicyDecision, PolicyEngine, Severity, security_check,
};
use quill_types::{
    ImageDetail, ImageTokenFamily, Message, ProviderTransform as _, StopReason, ToolSpec,
    TransformConfig, image_tokens,
};
use quill_context::CompactionTracker;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S1 — Gemini tool round-trip
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn gemini_tool_round_trip() {
    let cfg = TransformConfig::for_model("gemini-2.5-flash");
    let messages = vec![Message::system("You are helpful"), Message::user("read foo.txt")];
    let tools = vec![ToolSpec {
        name: "read_file".into(),
        description: "Reads a file".into(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": { "path": { "type": "string", "exclusiveMinimum": 0 } },
            "required": ["path"]
        }),
    }];

    // Request side: system extracted, schema rewritten for Gemini.
    let request = GeminiTransform.transform_messages(&messages, &cfg);
    assert_eq!(
        request.data["systemInstruction"]["parts"][0]["text"],
        "You are helpful"
    );
    assert_eq!(request.data["contents"][0]["role"], "user");

    let tool_payload = GeminiTransform.transform_tools(&tools, &cfg);
    let params = &tool_payload.data[0]["functionDeclarations"][0]["parameters"];
    assert_eq!(params["type"], "OBJECT");
    assert!(params["properties"]["path"].get("exclusiveMinimum").is_none());

    // Response side: the vendor's function call comes back canonical.
    let vendor_response = serde_json::json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [{
                    "functionCall": { "name": "read_file", "args": { "path": "foo.txt" } },
                    "thoughtSignature": "X"
                }]
            },
            "finishReason": "TOOL_CODE"
        }]
    });
    let parsed = GeminiTransform
        .parse_response(&vendor_response, &cfg)
        .unwrap();
    assert_eq!(parsed.data.content, "");
    assert_eq!(parsed.data.stop_reason, StopReason::ToolUse);
    assert_eq!(parsed.data.tool_calls.len(), 1);
    assert_eq!(parsed.data.tool_calls[0].name, "read_file");
    assert_eq!(
        parsed.data.tool_calls[0].input,
        serde_json::json!({ "path": "foo.txt" })
    );
    assert_eq!(parsed.data.tool_calls[0].thought_signature.as_deref(), Some("X"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S2 — Reranker weights
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn reranker_default_weights() {
    let a = Evidence::new("A", ProviderKind::Diff, "src/a.rs", LineRange::default(), "", 10, 10.0);
    let b = Evidence::new("B", ProviderKind::Lsp, "src/b.rs", LineRange::default(), "", 10, 10.0)
        .with_signals(vec![Signal::new(
            SignalType::Symbol,
            "login",
            SignalSource::WorkingSet,
            0.9,
        )])
        .with_metadata(EvidenceMetadata {
            stack_depth: None,
            symbol_kind: Some("function".into()),
        });

    let ranked = rerank(
        vec![a, b],
        &RerankConfig {
            weights: RerankerWeights::default(),
            provider_priority: vec![ProviderKind::Diff, ProviderKind::Lsp, ProviderKind::Search],
            max_score: None,
        },
    );

    assert_eq!(ranked[0].id, "B");
    assert_eq!(ranked[0].final_score, Some(150.0));
    assert_eq!(ranked[1].id, "A");
    assert_eq!(ranked[1].final_score, Some(110.0));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S3 — Image budgets
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn image_budget_per_provider() {
    let (w, h) = (Some(1920.0), Some(1080.0));
    assert_eq!(image_tokens(ImageTokenFamily::Gemini, w, h, ImageDetail::Auto), 258);
    assert_eq!(
        image_tokens(ImageTokenFamily::OpenAi, w, h, ImageDetail::High),
        85 + 170 * 3 * 2
    );
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S4 — Dangerous command
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn dangerous_command_is_denied_under_any_policy() {
    let detector = DangerousCommandDetector::new();

    let matches = detector.detect("sudo rm -rf /");
    let names: Vec<&str> = matches.iter().map(|m| m.pattern.name.as_str()).collect();
    assert!(names.contains(&"sudo"));
    assert!(names.contains(&"rm-root"));
    assert!(names.contains(&"rm-recursive-force"));
    assert!(matches
        .iter()
        .any(|m| m.pattern.name == "rm-root" && m.pattern.severity == Severity::Critical));

    for default in [PolicyDecision::Allow, PolicyDecision::Ask, PolicyDecision::Deny] {
        let engine = PolicyEngine::new(default);
        let verdict = security_check("sudo rm -rf /", &engine, &detector);
        assert_eq!(verdict.decision, PolicyDecision::Deny, "default {default:?}");
        assert!(verdict.reason.contains("rm-root"), "reason: {}", verdict.reason);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S5 — Intent classification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn typeerror_fix_classifies_as_debug() {
    let ctx = TurnContext {
        error_present: true,
        ..Default::default()
    };
    let result = classify("fix the TypeError in auth.ts", &ctx);
    assert_eq!(result.intent, Intent::Debug);
    assert!(result.confidence >= 0.5, "confidence = {}", result.confidence);
    for expected in ["fix", "typeerror", "context:error_present"] {
        assert!(
            result.matched.iter().any(|m| m == expected),
            "missing {expected} in {:?}",
            result.matched
        );
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// S6 — Cascade detection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn cascade_detection_after_tracking() {
    let mut tracker = CompactionTracker::new();
    tracker.track_compacted_messages(&["m1".into(), "m2".into()], "s1");

    let by_id = |id: &str| vec![Message::user("x").with_id(id)];
    assert!(tracker.is_cascade(&by_id("m1")));
    assert!(tracker.is_cascade(&by_id("s1")));
    assert!(!tracker.is_cascade(&by_id("m3")));
}
