//! Signal extraction from the user turn and its context.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{Signal, SignalSource, SignalType};

static CAMEL_CASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]*)+$").expect("camel-case pattern compiles")
});
static SNAKE_CASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9]*(?:_[a-z0-9]+)+$").expect("snake-case pattern compiles")
});
static DOTTED_EXTENSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.[A-Za-z0-9]{1,5}$").expect("extension pattern compiles")
});
static ERROR_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)error|exception|panic|undefined|traceback").expect("error pattern compiles")
});

/// A stack frame handed to the engine as context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StackFrame {
    /// File the frame points at.
    pub path: String,
    /// Enclosing symbol, when known.
    pub symbol: Option<String>,
    /// Frame depth; 0 is the innermost frame.
    pub depth: u32,
}

/// Ambient context for one user turn.
#[derive(Debug, Clone, Default)]
pub struct TurnContext {
    /// Files currently open in the editor.
    pub working_set: Vec<String>,
    /// Recent error output, newest last.
    pub recent_errors: Vec<String>,
    /// Frames of the most recent stack trace, innermost first.
    pub stack_frames: Vec<StackFrame>,
    /// The file the cursor is in, when known.
    pub current_file: Option<String>,
    /// Recently touched files.
    pub recent_files: Vec<String>,
    /// Whether an error is currently showing.
    pub error_present: bool,
}

/// Extract retrieval signals from the user message and turn context.
///
/// Heuristics: path-looking tokens (separator or dotted extension) become
/// `Path` signals; CamelCase and snake_case tokens become `Symbol`
/// signals; error-class fragments become `ErrorToken` signals. The working
/// set, recent errors, and stack frames contribute with their own sources.
#[must_use]
pub fn extract_signals(user_message: &str, ctx: &TurnContext) -> Vec<Signal> {
    let mut signals = Vec::new();

    for raw in user_message.split_whitespace() {
        let token = raw.trim_matches(|c: char| !c.is_ascii_alphanumeric() && !"/\\._-".contains(c));
        if token.len() < 3 {
            continue;
        }
        if looks_like_path(token) {
            signals.push(Signal::new(
                SignalType::Path,
                token,
                SignalSource::UserMessage,
                0.8,
            ));
        } else if ERROR_TOKEN.is_match(token) {
            signals.push(Signal::new(
                SignalType::ErrorToken,
                token,
                SignalSource::ErrorOutput,
                0.7,
            ));
        } else if CAMEL_CASE.is_match(token) || SNAKE_CASE.is_match(token) {
            signals.push(Signal::new(
                SignalType::Symbol,
                token,
                SignalSource::UserMessage,
                0.6,
            ));
        }
    }

    for path in &ctx.working_set {
        signals.push(Signal::new(
            SignalType::Path,
            path,
            SignalSource::WorkingSet,
            0.9,
        ));
    }

    for error in &ctx.recent_errors {
        for m in ERROR_TOKEN.find_iter(error) {
            // Widen the match to the whole word, e.g. "TypeError".
            let start = error[..m.start()]
                .rfind(|c: char| !c.is_ascii_alphanumeric())
                .map_or(0, |i| i + 1);
            let end = error[m.end()..]
                .find(|c: char| !c.is_ascii_alphanumeric())
                .map_or(error.len(), |i| m.end() + i);
            signals.push(Signal::new(
                SignalType::ErrorToken,
                &error[start..end],
                SignalSource::ErrorOutput,
                0.9,
            ));
        }
    }

    for frame in &ctx.stack_frames {
        let confidence = (1.0 - f64::from(frame.depth) * 0.1).max(0.2);
        signals.push(Signal::new(
            SignalType::Path,
            &frame.path,
            SignalSource::StackTrace,
            confidence,
        ));
        if let Some(symbol) = &frame.symbol {
            signals.push(Signal::new(
                SignalType::Symbol,
                symbol,
                SignalSource::StackTrace,
                confidence,
            ));
        }
    }

    dedupe(signals)
}

fn looks_like_path(token: &str) -> bool {
    token.contains('/') || token.contains('\\') || DOTTED_EXTENSION.is_match(token)
}

/// Keep the highest-confidence signal per `(type, value)`.
fn dedupe(signals: Vec<Signal>) -> Vec<Signal> {
    let mut out: Vec<Signal> = Vec::with_capacity(signals.len());
    for signal in signals {
        match out
            .iter_mut()
            .find(|s| s.signal_type == signal.signal_type && s.value == signal.value)
        {
            Some(existing) => {
                if signal.confidence > existing.confidence {
                    *existing = signal;
                }
            }
            None => out.push(signal),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(signals: &[Signal], ty: SignalType) -> Vec<&str> {
        signals
            .iter()
            .filter(|s| s.signal_type == ty)
            .map(|s| s.value.as_str())
            .collect()
    }

    #[test]
    fn extracts_paths_from_the_message() {
        let signals = extract_signals("fix the bug in src/auth.rs please", &TurnContext::default());
        assert_eq!(values(&signals, SignalType::Path), vec!["src/auth.rs"]);
    }

    #[test]
    fn dotted_extension_counts_as_a_path() {
        let signals = extract_signals("look at auth.ts", &TurnContext::default());
        assert_eq!(values(&signals, SignalType::Path), vec!["auth.ts"]);
    }

    #[test]
    fn extracts_camel_and_snake_symbols() {
        let signals = extract_signals(
            "rename HttpClient and parse_config",
            &TurnContext::default(),
        );
        let symbols = values(&signals, SignalType::Symbol);
        assert!(symbols.contains(&"HttpClient"));
        assert!(symbols.contains(&"parse_config"));
    }

    #[test]
    fn error_classes_become_error_tokens() {
        let signals = extract_signals("why do I get a TypeError here", &TurnContext::default());
        assert_eq!(values(&signals, SignalType::ErrorToken), vec!["TypeError"]);
        assert_eq!(
            signals
                .iter()
                .find(|s| s.signal_type == SignalType::ErrorToken)
                .unwrap()
                .source,
            SignalSource::ErrorOutput
        );
    }

    #[test]
    fn plain_words_are_ignored() {
        let signals = extract_signals("please make this nicer", &TurnContext::default());
        assert!(signals.is_empty());
    }

    #[test]
    fn working_set_contributes_path_signals() {
        let ctx = TurnContext {
            working_set: vec!["src/lib.rs".into()],
            ..Default::default()
        };
        let signals = extract_signals("hello", &ctx);
        let ws: Vec<_> = signals
            .iter()
            .filter(|s| s.source == SignalSource::WorkingSet)
            .collect();
        assert_eq!(ws.len(), 1);
        assert_eq!(ws[0].value, "src/lib.rs");
        assert_eq!(ws[0].signal_type, SignalType::Path);
    }

    #[test]
    fn recent_errors_yield_whole_word_error_tokens() {
        let ctx = TurnContext {
            recent_errors: vec!["thread panicked: IndexError at line 3".into()],
            ..Default::default()
        };
        let signals = extract_signals("", &ctx);
        let errors = values(&signals, SignalType::ErrorToken);
        assert!(errors.contains(&"IndexError"), "errors: {errors:?}");
    }

    #[test]
    fn stack_frames_decay_confidence_with_depth() {
        let ctx = TurnContext {
            stack_frames: vec![
                StackFrame {
                    path: "src/inner.rs".into(),
                    symbol: Some("handle_request".into()),
                    depth: 0,
                },
                StackFrame {
                    path: "src/outer.rs".into(),
                    symbol: None,
                    depth: 5,
                },
            ],
            ..Default::default()
        };
        let signals = extract_signals("", &ctx);
        let inner = signals.iter().find(|s| s.value == "src/inner.rs").unwrap();
        let outer = signals.iter().find(|s| s.value == "src/outer.rs").unwrap();
        assert!(inner.confidence > outer.confidence);
        assert!(signals.iter().any(|s| s.value == "handle_request"
            && s.signal_type == SignalType::Symbol
            && s.source == SignalSource::StackTrace));
    }

    #[test]
    fn duplicate_signals_keep_the_highest_confidence() {
        let ctx = TurnContext {
            working_set: vec!["src/auth.rs".into()],
            ..Default::default()
        };
        // The same path appears in the message (0.8) and working set (0.9).
        let signals = extract_signals("fix src/auth.rs", &ctx);
        let matches: Vec<_> = signals.iter().filter(|s| s.value == "src/auth.rs").collect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].confidence, 0.9);
        assert_eq!(matches[0].source, SignalSource::WorkingSet);
    }
}
