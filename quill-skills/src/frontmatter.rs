//! SKILL.md frontmatter parsing and validation.

use serde::{Deserialize, Serialize};

use crate::SkillError;

/// What can activate a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// A keyword in the user's message.
    Keyword,
    /// A file matching a glob in the working set.
    FilePattern,
    /// An explicit slash-command invocation.
    Command,
    /// A predicate over the turn context.
    Context,
    /// Always active.
    Always,
}

/// One activation trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillTrigger {
    /// What kind of trigger this is.
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    /// The pattern; required unless the type is `always`.
    #[serde(default)]
    pub pattern: Option<String>,
}

/// Host-compatibility constraints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillCompatibility {
    /// Semver requirement on the quill host.
    #[serde(default)]
    pub quill: Option<String>,
    /// Tools the skill needs available.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Tools the skill must not be given.
    #[serde(default, rename = "denyTools")]
    pub deny_tools: Vec<String>,
}

fn default_priority() -> u8 {
    50
}

/// Parsed SKILL.md frontmatter.
///
/// Accepted aliases: `desc` for `description`, `when` for `triggers`,
/// `requires` for `dependencies`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillFrontmatter {
    /// Unique kebab-case name.
    pub name: String,
    /// What the skill does, shown to the model for selection.
    #[serde(alias = "desc")]
    pub description: String,
    /// Semantic version.
    #[serde(default)]
    pub version: Option<String>,
    /// Author attribution.
    #[serde(default)]
    pub author: Option<String>,
    /// Selection priority, 1–100.
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Activation triggers.
    #[serde(default, alias = "when")]
    pub triggers: Vec<SkillTrigger>,
    /// Names of skills this one depends on.
    #[serde(default, alias = "requires")]
    pub dependencies: Vec<String>,
    /// Host-compatibility constraints.
    #[serde(default)]
    pub compatibility: Option<SkillCompatibility>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A parsed skill file: frontmatter plus the markdown body.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillFile {
    /// The parsed and validated frontmatter.
    pub frontmatter: SkillFrontmatter,
    /// The markdown content after the frontmatter block.
    pub body: String,
}

/// Parse a SKILL.md document.
///
/// # Errors
///
/// [`SkillError::MissingFrontmatter`] when the leading `---` block is
/// absent, [`SkillError::InvalidFrontmatter`] on YAML errors, and
/// [`SkillError::Validation`] when a constraint fails (name shape,
/// priority range, trigger patterns).
pub fn parse_skill_file(content: &str) -> Result<SkillFile, SkillError> {
    let (raw_frontmatter, body) = split_frontmatter(content)?;
    let frontmatter: SkillFrontmatter = serde_yaml::from_str(raw_frontmatter)
        .map_err(|e| SkillError::InvalidFrontmatter(e.to_string()))?;
    validate(&frontmatter)?;
    Ok(SkillFile {
        frontmatter,
        body: body.trim_start().to_string(),
    })
}

fn split_frontmatter(content: &str) -> Result<(&str, &str), SkillError> {
    let rest = content
        .strip_prefix("---")
        .ok_or(SkillError::MissingFrontmatter)?;
    let rest = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n"))
        .ok_or(SkillError::MissingFrontmatter)?;
    let end = rest
        .find("\n---")
        .ok_or(SkillError::MissingFrontmatter)?;
    let frontmatter = &rest[..end];
    let body = rest[end + 4..].trim_start_matches('-');
    Ok((frontmatter, body))
}

fn validate(frontmatter: &SkillFrontmatter) -> Result<(), SkillError> {
    if frontmatter.name.is_empty() {
        return Err(SkillError::Validation("name is required".into()));
    }
    if !is_kebab_case(&frontmatter.name) {
        return Err(SkillError::Validation(format!(
            "name must be kebab-case: {}",
            frontmatter.name
        )));
    }
    if frontmatter.description.is_empty() {
        return Err(SkillError::Validation("description is required".into()));
    }
    if !(1..=100).contains(&frontmatter.priority) {
        return Err(SkillError::Validation(format!(
            "priority must be in 1..=100, got {}",
            frontmatter.priority
        )));
    }
    for trigger in &frontmatter.triggers {
        if trigger.trigger_type != TriggerType::Always
            && trigger.pattern.as_deref().unwrap_or("").is_empty()
        {
            return Err(SkillError::Validation(format!(
                "{:?} trigger requires a pattern",
                trigger.trigger_type
            )));
        }
    }
    Ok(())
}

fn is_kebab_case(name: &str) -> bool {
    !name.starts_with('-')
        && !name.ends_with('-')
        && !name.contains("--")
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
