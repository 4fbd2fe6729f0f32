//! Sandbox configuration and trust-preset derivation.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Isolation mechanism for subprocess execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxStrategy {
    /// Plain subprocess with resource limits and a scrubbed environment.
    #[default]
    Subprocess,
    /// OS-level sandboxing (seatbelt, landlock).
    Platform,
    /// Container-based isolation.
    Container,
}

/// Resource ceilings for one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLimits {
    /// CPU time budget in milliseconds.
    pub cpu_time_ms: u64,
    /// Wall-clock budget in milliseconds. Hard: exceeding it kills the
    /// process and reports exit code 124.
    pub wall_time_ms: u64,
    /// Address-space ceiling in bytes.
    pub memory_bytes: u64,
    /// Open file descriptor ceiling.
    pub max_file_descriptors: u64,
    /// Process/thread ceiling.
    pub max_processes: u64,
    /// Captured output ceiling per stream, in bytes.
    pub max_output_bytes: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_time_ms: 60_000,
            wall_time_ms: 120_000,
            memory_bytes: 512 * 1024 * 1024,
            max_file_descriptors: 256,
            max_processes: 32,
            max_output_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Network restrictions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicy {
    /// Whether network access is permitted at all.
    pub allow: bool,
    /// Whether DNS resolution is blocked even when network is denied.
    pub block_dns: bool,
    /// Allow-list of hosts, when restricting rather than denying.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_hosts: Option<Vec<String>>,
}

/// Filesystem visibility.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemPolicy {
    /// Root the execution is confined to.
    pub root_dir: PathBuf,
    /// Paths mounted read-only.
    #[serde(default)]
    pub read_only_paths: Vec<PathBuf>,
    /// Paths mounted read-write.
    #[serde(default)]
    pub read_write_paths: Vec<PathBuf>,
    /// Paths hidden entirely.
    #[serde(default)]
    pub denied_paths: Vec<PathBuf>,
    /// Whether writes go to an overlay instead of the real tree.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_overlay: Option<bool>,
}

/// Syscall filter mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyscallMode {
    /// The list enumerates permitted syscalls.
    Allow,
    /// The list enumerates forbidden syscalls.
    Deny,
}

/// Syscall restrictions, consumed by platform/container strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyscallPolicy {
    /// Whether `syscalls` is an allow list or a deny list.
    pub mode: SyscallMode,
    /// The syscall names.
    pub syscalls: Vec<String>,
    /// Whether `exec*` is permitted.
    pub allow_exec: bool,
    /// Whether `fork`/`clone` is permitted.
    pub allow_fork: bool,
    /// Whether `ptrace` is permitted.
    pub allow_ptrace: bool,
}

/// Full sandbox configuration for one execution context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxConfig {
    /// Identifier for audit logs.
    pub id: String,
    /// Isolation mechanism.
    pub strategy: SandboxStrategy,
    /// Resource ceilings.
    pub resources: ResourceLimits,
    /// Network restrictions.
    pub network: NetworkPolicy,
    /// Filesystem visibility.
    pub filesystem: FilesystemPolicy,
    /// Environment variables the process sees. The parent environment is
    /// never inherited.
    #[serde(default)]
    pub environment: HashMap<String, String>,
    /// Syscall restrictions, when a strategy can enforce them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syscalls: Option<SyscallPolicy>,
    /// Working directory for the process.
    pub working_dir: PathBuf,
    /// Whether executions are recorded to the audit log.
    pub enable_audit: bool,
}

/// Trust level chosen by the user, from most to least restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustPreset {
    /// No network, read-only filesystem, tiny process budget.
    Paranoid,
    /// No network, writable workspace.
    Cautious,
    /// Network on, sensible ceilings.
    Default,
    /// Network on, generous ceilings, no audit.
    Relaxed,
    /// Everything maxed out. You asked for it.
    Yolo,
}

impl SandboxConfig {
    /// Derive a configuration from a trust preset, rooted at `root_dir`.
    ///
    /// Shared defaults across presets: CPU 60 s, wall 120 s, memory 512 MiB.
    #[must_use]
    pub fn from_preset(preset: TrustPreset, root_dir: impl Into<PathBuf>) -> Self {
        let root_dir = root_dir.into();
        let (network, read_only_root, max_processes, max_fds, max_output_mib, enable_audit) =
            match preset {
                TrustPreset::Paranoid => (
                    NetworkPolicy {
                        allow: false,
                        block_dns: true,
                        allowed_hosts: None,
                    },
                    true,
                    4,
                    64,
                    2,
                    true,
                ),
                TrustPreset::Cautious => (
                    NetworkPolicy {
                        allow: false,
                        block_dns: false,
                        allowed_hosts: None,
                    },
                    false,
                    8,
                    128,
                    4,
                    true,
                ),
                TrustPreset::Default => (
                    NetworkPolicy {
                        allow: true,
                        block_dns: false,
                        allowed_hosts: None,
                    },
                    false,
                    32,
                    256,
                    10,
                    true,
                ),
                TrustPreset::Relaxed => (
                    NetworkPolicy {
                        allow: true,
                        block_dns: false,
                        allowed_hosts: None,
                    },
                    false,
                    64,
                    512,
                    25,
                    false,
                ),
                TrustPreset::Yolo => (
                    NetworkPolicy {
                        allow: true,
                        block_dns: false,
                        allowed_hosts: None,
                    },
                    false,
                    128,
                    1024,
                    50,
                    false,
                ),
            };

        let filesystem = if read_only_root {
            FilesystemPolicy {
                root_dir: root_dir.clone(),
                read_only_paths: vec![root_dir.clone()],
                read_write_paths: vec![],
                denied_paths: vec![],
                use_overlay: None,
            }
        } else {
            FilesystemPolicy {
                root_dir: root_dir.clone(),
                read_only_paths: vec![],
                read_write_paths: vec![root_dir.clone()],
                denied_paths: vec![],
                use_overlay: None,
            }
        };

        Self {
            id: format!("{preset:?}").to_ascii_lowercase(),
            strategy: SandboxStrategy::Subprocess,
            resources: ResourceLimits {
                max_processes,
                max_file_descriptors: max_fds,
                max_output_bytes: max_output_mib * 1024 * 1024,
                ..ResourceLimits::default()
            },
            network,
            filesystem,
            environment: HashMap::new(),
            syscalls: None,
            working_dir: root_dir,
            enable_audit,
        }
    }

    /// Apply a partial override.
    ///
    /// Deep merge: the environment map unions (override wins per key),
    /// filesystem path lists union, scalars replace, and `syscalls`
    /// replaces as a whole.
    #[must_use]
    pub fn merged(mut self, over: &SandboxOverride) -> Self {
        if let Some(strategy) = over.strategy {
            self.strategy = strategy;
        }
        if let Some(v) = over.resources.cpu_time_ms {
            self.resources.cpu_time_ms = v;
        }
        if let Some(v) = over.resources.wall_time_ms {
            self.resources.wall_time_ms = v;
        }
        if let Some(v) = over.resources.memory_bytes {
            self.resources.memory_bytes = v;
        }
        if let Some(v) = over.resources.max_file_descriptors {
            self.resources.max_file_descriptors = v;
        }
        if let Some(v) = over.resources.max_processes {
            self.resources.max_processes = v;
        }
        if let Some(v) = over.resources.max_output_bytes {
            self.resources.max_output_bytes = v;
        }
        if let Some(v) = over.network.allow {
            self.network.allow = v;
        }
        if let Some(v) = over.network.block_dns {
            self.network.block_dns = v;
        }
        if let Some(hosts) = &over.network.allowed_hosts {
            self.network.allowed_hosts = Some(hosts.clone());
        }
        if let Some(root) = &over.filesystem.root_dir {
            self.filesystem.root_dir = root.clone();
        }
        union_paths(&mut self.filesystem.read_only_paths, &over.filesystem.read_only_paths);
        union_paths(&mut self.filesystem.read_write_paths, &over.filesystem.read_write_paths);
        union_paths(&mut self.filesystem.denied_paths, &over.filesystem.denied_paths);
        if let Some(v) = over.filesystem.use_overlay {
            self.filesystem.use_overlay = Some(v);
        }
        for (k, v) in &over.environment {
            self.environment.insert(k.clone(), v.clone());
        }
        if let Some(syscalls) = &over.syscalls {
            self.syscalls = Some(syscalls.clone());
        }
        if let Some(dir) = &over.working_dir {
            self.working_dir = dir.clone();
        }
        if let Some(v) = over.enable_audit {
            self.enable_audit = v;
        }
        self
    }
}

fn union_paths(base: &mut Vec<PathBuf>, extra: &[PathBuf]) {
    for path in extra {
        if !base.contains(path) {
            base.push(path.clone());
        }
    }
}

/// Partial resource override.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOverride {
    /// Override for [`ResourceLimits::cpu_time_ms`].
    pub cpu_time_ms: Option<u64>,
    /// Override for [`ResourceLimits::wall_time_ms`].
    pub wall_time_ms: Option<u64>,
    /// Override for [`ResourceLimits::memory_bytes`].
    pub memory_bytes: Option<u64>,
    /// Override for [`ResourceLimits::max_file_descriptors`].
    pub max_file_descriptors: Option<u64>,
    /// Override for [`ResourceLimits::max_processes`].
    pub max_processes: Option<u64>,
    /// Override for [`ResourceLimits::max_output_bytes`].
    pub max_output_bytes: Option<u64>,
}

/// Partial network override.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkOverride {
    /// Override for [`NetworkPolicy::allow`].
    pub allow: Option<bool>,
    /// Override for [`NetworkPolicy::block_dns`].
    pub block_dns: Option<bool>,
    /// Override for [`NetworkPolicy::allowed_hosts`].
    pub allowed_hosts: Option<Vec<String>>,
}

/// Partial filesystem override. Path lists union with the base.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemOverride {
    /// Override for [`FilesystemPolicy::root_dir`].
    pub root_dir: Option<PathBuf>,
    /// Paths to add to [`FilesystemPolicy::read_only_paths`].
    #[serde(default)]
    pub read_only_paths: Vec<PathBuf>,
    /// Paths to add to [`FilesystemPolicy::read_write_paths`].
    #[serde(default)]
    pub read_write_paths: Vec<PathBuf>,
    /// Paths to add to [`FilesystemPolicy::denied_paths`].
    #[serde(default)]
    pub denied_paths: Vec<PathBuf>,
    /// Override for [`FilesystemPolicy::use_overlay`].
    pub use_overlay: Option<bool>,
}

/// A partial override merged onto a preset-derived config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxOverride {
    /// Strategy replacement.
    pub strategy: Option<SandboxStrategy>,
    /// Resource overrides.
    #[serde(default)]
    pub resources: ResourceOverride,
    /// Network overrides.
    #[serde(default)]
    pub network: NetworkOverride,
    /// Filesystem overrides.
    #[serde(default)]
    pub filesystem: FilesystemOverride,
    /// Environment entries to union in (override wins per key).
    #[serde(default)]
    pub environment: HashMap<String, String>,
    /// Syscall policy; replaces the base policy wholesale.
    pub syscalls: Option<SyscallPolicy>,
    /// Working directory replacement.
    pub working_dir: Option<PathBuf>,
    /// Audit flag replacement.
    pub enable_audit: Option<bool>,
}
