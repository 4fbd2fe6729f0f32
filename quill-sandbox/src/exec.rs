//! Restricted subprocess execution.
//!
//! The executor receives `(argv, stdin?, SandboxConfig)` and returns the
//! captured result. The parent environment is never inherited; resource
//! ceilings are applied via rlimits on Unix. Exceeding the wall-clock
//! budget kills the process and reports exit code 124 by convention.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use quill_types::SandboxError;

use crate::config::SandboxConfig;

/// Exit code reported when the wall-clock budget kills the process.
pub const EXIT_CODE_TIMEOUT: i32 = 124;

/// Grace window between SIGTERM and SIGKILL on cancellation.
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Per-stream truncation flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Truncated {
    /// Whether stdout hit the output ceiling.
    pub stdout: bool,
    /// Whether stderr hit the output ceiling.
    pub stderr: bool,
}

/// Captured result of one sandboxed execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Process exit code; 124 on wall-timeout, 128+signal on signal death.
    pub exit_code: i32,
    /// Captured stdout, capped at `max_output_bytes`.
    pub stdout: String,
    /// Captured stderr, capped at `max_output_bytes`.
    pub stderr: String,
    /// Wall-clock duration in milliseconds.
    pub wall_ms: u64,
    /// CPU time consumed in milliseconds, when the platform reports it.
    pub cpu_ms: u64,
    /// Which streams were truncated.
    pub truncated: Truncated,
}

/// Run `argv` under the given sandbox configuration.
///
/// Cancellation sends SIGTERM, waits 500 ms, then SIGKILLs.
///
/// # Errors
///
/// [`SandboxError::SpawnFailed`] when argv is empty or the binary cannot be
/// started; [`SandboxError::ExecutionFailed`] on cancellation; I/O errors
/// while driving the pipes surface as [`SandboxError::Io`].
pub async fn execute(
    argv: &[String],
    stdin: Option<&[u8]>,
    config: &SandboxConfig,
    cancel: CancellationToken,
) -> Result<ExecResult, SandboxError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(SandboxError::SpawnFailed("empty argv".into()));
    };

    if config.enable_audit {
        tracing::info!(sandbox = %config.id, command = %argv.join(" "), "sandboxed execution");
    }

    let mut cmd = Command::new(program);
    cmd.args(args)
        .env_clear()
        .envs(&config.environment)
        .current_dir(&config.working_dir)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    apply_rlimits(&mut cmd, config);

    let cpu_before = children_cpu_ms();
    let started = Instant::now();

    let mut child = cmd
        .spawn()
        .map_err(|e| SandboxError::SpawnFailed(format!("{program}: {e}")))?;

    if let Some(bytes) = stdin
        && let Some(mut handle) = child.stdin.take()
    {
        handle.write_all(bytes).await?;
        handle.shutdown().await?;
    }

    let cap = config.resources.max_output_bytes as usize;
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();
    let stdout_task = tokio::spawn(read_capped(stdout_pipe, cap));
    let stderr_task = tokio::spawn(read_capped(stderr_pipe, cap));

    let wall_budget = Duration::from_millis(config.resources.wall_time_ms);
    let exit_code = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            graceful_kill(&mut child).await;
            return Err(SandboxError::ExecutionFailed("cancelled".into()));
        }
        waited = tokio::time::timeout(wall_budget, child.wait()) => match waited {
            Ok(status) => exit_code_of(status?),
            Err(_elapsed) => {
                child.kill().await.ok();
                EXIT_CODE_TIMEOUT
            }
        },
    };

    let (stdout_bytes, stdout_truncated) = stdout_task
        .await
        .map_err(|e| SandboxError::ExecutionFailed(e.to_string()))??;
    let (stderr_bytes, stderr_truncated) = stderr_task
        .await
        .map_err(|e| SandboxError::ExecutionFailed(e.to_string()))??;

    Ok(ExecResult {
        exit_code,
        stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        wall_ms: started.elapsed().as_millis() as u64,
        cpu_ms: children_cpu_ms().saturating_sub(cpu_before),
        truncated: Truncated {
            stdout: stdout_truncated,
            stderr: stderr_truncated,
        },
    })
}

/// Read a pipe to EOF, keeping at most `cap` bytes.
///
/// The pipe is drained past the cap so the child never blocks on a full
/// buffer; everything past the cap is discarded and flagged.
async fn read_capped<R>(reader: Option<R>, cap: usize) -> Result<(Vec<u8>, bool), SandboxError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok((Vec::new(), false));
    };
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        if kept.len() < cap {
            let take = n.min(cap - kept.len());
            kept.extend_from_slice(&chunk[..take]);
            if take < n {
                truncated = true;
            }
        } else {
            truncated = true;
        }
    }
    Ok((kept, truncated))
}

/// SIGTERM, wait out the grace window, then SIGKILL.
async fn graceful_kill(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // Safety: signalling a pid we own.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
            return;
        }
    }
    child.kill().await.ok();
}

fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    status.code().unwrap_or(-1)
}

/// Apply resource ceilings to the child before exec, on Unix.
#[cfg(unix)]
fn apply_rlimits(cmd: &mut Command, config: &SandboxConfig) {
    let cpu_secs = config.resources.cpu_time_ms.div_ceil(1000);
    let memory = config.resources.memory_bytes;
    let nofile = config.resources.max_file_descriptors;
    let nproc = config.resources.max_processes;
    let lim = |value: u64| libc::rlimit {
        rlim_cur: value as libc::rlim_t,
        rlim_max: value as libc::rlim_t,
    };
    // Safety: pre_exec runs post-fork, pre-exec; setrlimit is async-signal-safe.
    unsafe {
        cmd.pre_exec(move || {
            libc::setrlimit(libc::RLIMIT_CPU, &lim(cpu_secs));
            libc::setrlimit(libc::RLIMIT_AS, &lim(memory));
            libc::setrlimit(libc::RLIMIT_NOFILE, &lim(nofile));
            #[cfg(target_os = "linux")]
            libc::setrlimit(libc::RLIMIT_NPROC, &lim(nproc));
            #[cfg(not(target_os = "linux"))]
            let _ = nproc;
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn apply_rlimits(_cmd: &mut Command, _config: &SandboxConfig) {}

/// Cumulative CPU time of reaped children, in milliseconds.
#[cfg(unix)]
fn children_cpu_ms() -> u64 {
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    // Safety: getrusage writes into the struct we own.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_CHILDREN, &mut usage) };
    if rc != 0 {
        return 0;
    }
    let to_ms = |tv: libc::timeval| tv.tv_sec as u64 * 1000 + tv.tv_usec as u64 / 1000;
    to_ms(usage.ru_utime) + to_ms(usage.ru_stime)
}

#[cfg(not(unix))]
fn children_cpu_ms() -> u64 {
    0
}
