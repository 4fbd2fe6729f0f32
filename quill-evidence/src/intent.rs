//! Rule-based intent classification.

use serde::{Deserialize, Serialize};

use crate::signal::TurnContext;

/// What the user is trying to do this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Chasing a failure.
    Debug,
    /// Adding something new.
    Implement,
    /// Restructuring without behavior change.
    Refactor,
    /// Understanding the codebase.
    Explore,
    /// Writing prose about the code.
    Document,
    /// Writing or fixing tests.
    Test,
    /// Evaluating existing changes.
    Review,
    /// Classifier could not tell.
    Unknown,
}

impl Intent {
    /// The classifiable intents, excluding `Unknown`.
    pub const ALL: [Intent; 7] = [
        Intent::Debug,
        Intent::Implement,
        Intent::Refactor,
        Intent::Explore,
        Intent::Document,
        Intent::Test,
        Intent::Review,
    ];

    fn keywords(self) -> &'static [&'static str] {
        match self {
            Intent::Debug => &[
                "fix", "bug", "error", "typeerror", "exception", "crash", "broken", "fails",
                "failing", "debug", "panic", "traceback", "stacktrace",
            ],
            Intent::Implement => &[
                "add", "implement", "create", "build", "feature", "support", "write", "new",
            ],
            Intent::Refactor => &[
                "refactor", "rename", "extract", "cleanup", "simplify", "restructure", "split",
                "dedupe",
            ],
            Intent::Explore => &[
                "how", "where", "what", "why", "find", "search", "show", "look", "browse",
            ],
            Intent::Document => &[
                "document", "docs", "comment", "readme", "describe", "explain", "changelog",
            ],
            Intent::Test => &[
                "test", "tests", "coverage", "assert", "mock", "fixture", "regression",
            ],
            Intent::Review => &["review", "check", "audit", "lint", "verify", "inspect"],
            Intent::Unknown => &[],
        }
    }
}

/// Outcome of classifying one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentClassification {
    /// The winning intent; `Unknown` below the confidence floor.
    pub intent: Intent,
    /// `top_score / max(1, token_count)`, capped at 1.
    pub confidence: f64,
    /// Runner-up intent when its score is over half the winner's.
    pub secondary: Option<Intent>,
    /// Keywords and context boosts that matched, for telemetry.
    pub matched: Vec<String>,
}

/// Below this confidence the classification reports `Unknown`.
const CONFIDENCE_FLOOR: f64 = 0.3;

/// Classify the user's intent for this turn.
///
/// Tokenizes the message (lowercased, punctuation stripped), scores each
/// intent by keyword hits (exact 1.0, containment 0.5), then applies
/// context boosts: a showing error boosts `Debug`, a test file under the
/// cursor or in recent files boosts `Test`.
#[must_use]
pub fn classify(user_message: &str, ctx: &TurnContext) -> IntentClassification {
    let tokens: Vec<String> = user_message
        .split_whitespace()
        .map(|t| {
            t.chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect();

    let mut matched = Vec::new();
    let mut scores: Vec<(Intent, f64)> = Intent::ALL
        .iter()
        .map(|&intent| {
            let mut score = 0.0;
            for keyword in intent.keywords() {
                if tokens.iter().any(|t| t == keyword) {
                    score += 1.0;
                    matched.push((*keyword).to_string());
                } else if tokens.iter().any(|t| t.contains(keyword)) {
                    score += 0.5;
                }
            }
            (intent, score)
        })
        .collect();

    // Context boosts.
    for (intent, score) in &mut scores {
        match intent {
            Intent::Debug if ctx.error_present => {
                *score += 0.3;
                matched.push("context:error_present".to_string());
            }
            Intent::Test => {
                if ctx.current_file.as_deref().is_some_and(is_test_file) {
                    *score += 0.3;
                    matched.push("context:current_test_file".to_string());
                }
                if ctx.recent_files.iter().any(|f| f.contains(".test.")) {
                    *score += 0.2;
                    matched.push("context:recent_test_files".to_string());
                }
            }
            _ => {}
        }
    }

    scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let (top_intent, top_score) = scores[0];
    let (second_intent, second_score) = scores[1];

    let confidence = (top_score / tokens.len().max(1) as f64).min(1.0);
    let intent = if confidence < CONFIDENCE_FLOOR {
        Intent::Unknown
    } else {
        top_intent
    };
    let secondary = (intent != Intent::Unknown
        && top_score > 0.0
        && second_score / top_score > 0.5)
        .then_some(second_intent);

    // Dedupe matched markers while preserving order.
    let mut seen = std::collections::HashSet::new();
    matched.retain(|m| seen.insert(m.clone()));

    IntentClassification {
        intent,
        confidence,
        secondary,
        matched,
    }
}

fn is_test_file(path: &str) -> bool {
    path.contains(".test.")
        || path.contains(".spec.")
        || path.contains("_test.")
        || path.contains("/tests/")
        || path.starts_with("tests/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fix_typeerror_with_error_context_is_debug() {
        let ctx = TurnContext {
            error_present: true,
            ..Default::default()
        };
        let result = classify("fix the TypeError in auth.ts", &ctx);
        assert_eq!(result.intent, Intent::Debug);
        assert!(result.confidence >= 0.5, "confidence = {}", result.confidence);
        assert!(result.matched.iter().any(|m| m == "fix"));
        assert!(result.matched.iter().any(|m| m == "typeerror"));
        assert!(result.matched.iter().any(|m| m == "context:error_present"));
    }

    #[test]
    fn implement_requests_classify_as_implement() {
        let result = classify("add a new feature flag", &TurnContext::default());
        assert_eq!(result.intent, Intent::Implement);
    }

    #[test]
    fn vague_messages_are_unknown() {
        let result = classify(
            "hello there please do something with all of it",
            &TurnContext::default(),
        );
        assert_eq!(result.intent, Intent::Unknown);
        assert!(result.confidence < 0.3);
    }

    #[test]
    fn confidence_is_capped_at_one() {
        let result = classify("fix bug error crash", &TurnContext::default());
        assert!(result.confidence <= 1.0);
        assert_eq!(result.intent, Intent::Debug);
    }

    #[test]
    fn current_test_file_boosts_test_intent() {
        let ctx = TurnContext {
            current_file: Some("src/auth.test.ts".into()),
            recent_files: vec!["src/api.test.ts".into()],
            ..Default::default()
        };
        let result = classify("make this pass", &ctx);
        assert!(result.matched.iter().any(|m| m == "context:current_test_file"));
        assert!(result.matched.iter().any(|m| m == "context:recent_test_files"));
    }

    #[test]
    fn secondary_intent_emitted_when_close() {
        // Debug scores 2 (fix, failing); Test scores 1.5 (tests exact,
        // "test" by containment) — over half the winner.
        let result = classify("fix failing tests today", &TurnContext::default());
        assert_eq!(result.intent, Intent::Debug);
        assert_eq!(result.secondary, Some(Intent::Test));
    }

    #[test]
    fn no_secondary_when_runner_up_is_weak() {
        let result = classify("fix bug error crash broken", &TurnContext::default());
        assert_eq!(result.intent, Intent::Debug);
        assert_eq!(result.secondary, None);
    }

    #[test]
    fn partial_containment_scores_half() {
        // "bugfix" contains "fix" and "bug" but equals neither.
        let a = classify("bugfix needed", &TurnContext::default());
        let b = classify("fix bug needed", &TurnContext::default());
        assert!(b.confidence > a.confidence);
    }

    #[test]
    fn empty_message_is_unknown() {
        let result = classify("", &TurnContext::default());
        assert_eq!(result.intent, Intent::Unknown);
        assert_eq!(result.confidence, 0.0);
    }
}
