//! Instruction-file discovery.
//!
//! Walks upward from the working directory, collecting agent-instruction
//! files until a project boundary. Within one directory the
//! highest-priority file wins; the inheritance chain comes back
//! lowest-first so callers can apply root instructions before leaf ones.

use std::path::{Path, PathBuf};

/// Files and directories that mark a project boundary.
const STOP_BOUNDARIES: &[&str] = &[
    ".git",
    "package.json",
    "Cargo.toml",
    "go.mod",
    "pyproject.toml",
    "pnpm-workspace.yaml",
];

/// Instruction file names with their priorities. Highest wins within one
/// directory.
const INSTRUCTION_FILES: &[(&str, u8)] = &[
    ("AGENTS.md", 100),
    ("agents.md", 99),
    (".agents.md", 98),
    ("CLAUDE.md", 90),
    ("GEMINI.md", 90),
    (".cursorrules", 80),
    (".clinerules", 75),
    (".roorules", 70),
    (".windsurfrules", 65),
    (".github/copilot-instructions.md", 60),
];

/// One discovered instruction file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionFile {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Priority from the table above.
    pub priority: u8,
    /// How many directories above the start this was found (0 = start).
    pub depth: usize,
}

/// Walk upward from `start` collecting instruction files.
///
/// Each directory on the way up contributes at most one file (its
/// highest-priority candidate). The walk stops at the first directory
/// containing a stop boundary, inclusively. Results are ordered
/// lowest-first: the project root's instructions come before the leaf's.
#[must_use]
pub fn discover_instruction_files(start: &Path) -> Vec<InstructionFile> {
    let mut found = Vec::new();

    for (depth, dir) in start.ancestors().enumerate() {
        if let Some(best) = best_instruction_in(dir) {
            tracing::debug!(path = %best.0.display(), priority = best.1, "instruction file");
            found.push(InstructionFile {
                path: best.0,
                priority: best.1,
                depth,
            });
        }
        if is_boundary(dir) {
            break;
        }
    }

    // Upward walk found leaf-first; inheritance applies root-first.
    found.reverse();
    found
}

fn best_instruction_in(dir: &Path) -> Option<(PathBuf, u8)> {
    INSTRUCTION_FILES
        .iter()
        .map(|(name, priority)| (dir.join(name), *priority))
        .find(|(path, _)| path.is_file())
}

fn is_boundary(dir: &Path) -> bool {
    STOP_BOUNDARIES
        .iter()
        .any(|marker| dir.join(marker).exists())
}

/// Find SKILL.md files under a skills directory, one level deep
/// (`<dir>/<skill-name>/SKILL.md`).
#[must_use]
pub fn discover_skill_files(skills_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(skills_dir) else {
        return Vec::new();
    };
    let mut found: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path().join("SKILL.md"))
        .filter(|path| path.is_file())
        .collect();
    found.sort();
    found
}
