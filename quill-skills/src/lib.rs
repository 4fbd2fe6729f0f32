#![deny(missing_docs)]
//! Skill and agent-instruction discovery for quill.
//!
//! Two concerns live here: parsing `SKILL.md` YAML frontmatter (with the
//! accepted field aliases and validation), and discovering instruction
//! files (`AGENTS.md`, `CLAUDE.md`, `.cursorrules`, …) by walking upward
//! from the working directory to a project boundary.

pub mod discovery;
pub mod frontmatter;

pub use discovery::*;
pub use frontmatter::*;

/// Errors from skill parsing and discovery.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SkillError {
    /// The file has no frontmatter block.
    #[error("missing frontmatter")]
    MissingFrontmatter,
    /// The frontmatter YAML failed to parse.
    #[error("invalid frontmatter: {0}")]
    InvalidFrontmatter(String),
    /// The frontmatter parsed but violates a constraint.
    #[error("invalid skill: {0}")]
    Validation(String),
    /// I/O error during discovery.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
