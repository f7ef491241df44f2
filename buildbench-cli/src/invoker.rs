//! Build Invoker
//!
//! Writes the generated source into the build tree and runs the build tool
//! for a target under a wall-clock budget.
//!
//! The build tool runs as a scoped child process:
//! - it gets its own process group, so the compiler it spawns can be signalled
//!   together with it
//! - stdout and stderr are drained on dedicated threads so a chatty build can
//!   never block on a full pipe
//! - on timeout the group receives SIGTERM, then SIGKILL after a grace period
//! - output drains for a bounded time only; a pipe held open by a process
//!   outside the group is abandoned
//! - the child is reaped on every path, including drop

use buildbench_core::{BuildResult, BuildStatus};
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Interval between liveness checks of a running build
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Time a timed-out build gets between SIGTERM and SIGKILL
const TERMINATION_GRACE: Duration = Duration::from_millis(500);

/// Extra drain time after the group was killed for holding a pipe open
const KILL_DRAIN_GRACE: Duration = Duration::from_millis(100);

/// Read size of the drain threads
const DRAIN_CHUNK: usize = 8 * 1024;

/// Something that can build the generated source for a target
///
/// Invocations against the same implementor must be sequential: they share
/// one generated source file.
pub trait BuildInvoker {
    /// Overwrite the generated source file
    fn write_source(&mut self, code: &str) -> std::io::Result<()>;

    /// Build `target` and capture its output. Never blocks past the timeout.
    fn invoke(&mut self, target: &str) -> BuildResult;

    /// Path of the generated source file, for diagnostics
    fn source_path(&self) -> &Path;

    /// Leave the generated source empty once a run is over
    fn reset_source(&mut self) -> std::io::Result<()> {
        self.write_source("")
    }
}

/// [`BuildInvoker`] backed by an external build tool
#[derive(Debug, Clone)]
pub struct CommandInvoker {
    tool: String,
    args: Vec<String>,
    build_dir: PathBuf,
    source_path: PathBuf,
    timeout: Duration,
    env: Vec<(String, String)>,
}

impl CommandInvoker {
    /// Invoker running `cmake --build <build_dir> --target <target>`
    pub fn new(
        tool: impl Into<String>,
        build_dir: impl Into<PathBuf>,
        source_path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            tool: tool.into(),
            args: ["--build", "{build_dir}", "--target", "{target}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            build_dir: build_dir.into(),
            source_path: source_path.into(),
            timeout,
            env: Vec::new(),
        }
    }

    /// Replace the argument template
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Export extra environment variables to the build tool
    pub fn with_env(mut self, vars: Vec<(String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    /// Build directory
    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    /// Per-invocation timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Arguments for `target` with placeholders substituted
    pub fn command_args(&self, target: &str) -> Vec<String> {
        let build_dir = self.build_dir.display().to_string();
        let source = self.source_path.display().to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{build_dir}", &build_dir)
                    .replace("{target}", target)
                    .replace("{source}", &source)
            })
            .collect()
    }
}

impl BuildInvoker for CommandInvoker {
    fn write_source(&mut self, code: &str) -> std::io::Result<()> {
        if let Some(parent) = self.source_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.source_path, code)
    }

    fn invoke(&mut self, target: &str) -> BuildResult {
        let args = self.command_args(target);
        debug!(tool = %self.tool, ?args, "invoking build");

        let mut command = Command::new(&self.tool);
        command
            .args(&args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        if self.build_dir.is_dir() {
            command.current_dir(&self.build_dir);
        }

        let child = match ScopedChild::spawn(command) {
            Ok(child) => child,
            Err(e) => {
                return BuildResult::failure(format!(
                    "buildbench: failed to spawn '{}': {}",
                    self.tool, e
                ));
            }
        };

        let result = child.wait_with_timeout(self.timeout);
        if result.timed_out {
            warn!(build_target = target, timeout = ?self.timeout, "build timed out");
        }
        result.into_build_result(target, self.timeout)
    }

    fn source_path(&self) -> &Path {
        &self.source_path
    }
}

/// Outcome of waiting on a scoped child
#[derive(Debug)]
struct ChildOutput {
    status: Option<ExitStatus>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    timed_out: bool,
    drain_abandoned: bool,
}

impl ChildOutput {
    fn into_build_result(self, target: &str, timeout: Duration) -> BuildResult {
        let stdout = String::from_utf8_lossy(&self.stdout).into_owned();
        let mut stderr = String::from_utf8_lossy(&self.stderr).into_owned();

        let status = match self.status {
            Some(s) if s.success() && !self.timed_out => BuildStatus::Success,
            _ => BuildStatus::Failure,
        };

        if self.timed_out {
            push_note(
                &mut stderr,
                &format!(
                    "buildbench: target '{}' timed out after {:.1}s and was killed",
                    target,
                    timeout.as_secs_f64()
                ),
            );
        }
        if self.drain_abandoned {
            push_note(
                &mut stderr,
                &format!(
                    "buildbench: target '{}' left an output pipe held open; drain abandoned",
                    target
                ),
            );
        }

        BuildResult {
            stdout,
            stderr,
            status,
        }
    }
}

fn push_note(stderr: &mut String, note: &str) {
    if !stderr.is_empty() && !stderr.ends_with('\n') {
        stderr.push('\n');
    }
    stderr.push_str(note);
    stderr.push('\n');
}

/// Bytes gathered from one stream
#[derive(Debug, Default)]
struct Drained {
    bytes: Vec<u8>,
    /// The writer side closed before the deadline
    complete: bool,
}

/// Child process that is always reaped, with its output drained in the background
struct ScopedChild {
    child: Child,
    stdout: Option<Receiver<Vec<u8>>>,
    stderr: Option<Receiver<Vec<u8>>>,
}

impl ScopedChild {
    fn spawn(mut command: Command) -> std::io::Result<Self> {
        let mut child = command.spawn()?;
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);
        Ok(Self {
            child,
            stdout,
            stderr,
        })
    }

    fn wait_with_timeout(mut self, timeout: Duration) -> ChildOutput {
        let deadline = Instant::now() + timeout;

        let mut status = None;
        loop {
            match self.child.try_wait() {
                Ok(Some(s)) => {
                    status = Some(s);
                    break;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "failed to poll build process");
                    break;
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            std::thread::sleep(remaining.min(POLL_INTERVAL));
        }

        let timed_out = status.is_none();
        if timed_out {
            status = self.terminate();
        }

        // Grandchildren may still hold the pipes open after the tool exits.
        let drain_deadline = Instant::now() + TERMINATION_GRACE;
        let stdout = self.collect(StreamKind::Stdout, drain_deadline);
        let stderr = self.collect(StreamKind::Stderr, drain_deadline);
        let drain_abandoned = !(stdout.complete && stderr.complete);
        if drain_abandoned {
            warn!(pid = self.child.id(), "output pipe held open; drain abandoned");
        }

        ChildOutput {
            status,
            stdout: stdout.bytes,
            stderr: stderr.bytes,
            timed_out,
            drain_abandoned,
        }
    }

    /// SIGTERM the group, wait out the grace period, then SIGKILL.
    fn terminate(&mut self) -> Option<ExitStatus> {
        let pid = self.child.id();
        let _ = signal_group(pid, libc::SIGTERM);

        let grace_deadline = Instant::now() + TERMINATION_GRACE;
        while Instant::now() < grace_deadline {
            if let Ok(Some(status)) = self.child.try_wait() {
                let _ = signal_group(pid, libc::SIGKILL);
                return Some(status);
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        let _ = signal_group(pid, libc::SIGKILL);
        let _ = self.child.kill();
        self.child.wait().ok()
    }

    /// Gather chunks until the writer closes or `deadline` passes.
    ///
    /// On the deadline the group is killed and drained briefly once more; a
    /// pipe still open after that belongs to a process outside the group and
    /// is left to its reader thread.
    fn collect(&mut self, kind: StreamKind, deadline: Instant) -> Drained {
        let rx = match kind {
            StreamKind::Stdout => self.stdout.take(),
            StreamKind::Stderr => self.stderr.take(),
        };
        let Some(rx) = rx else {
            return Drained {
                bytes: Vec::new(),
                complete: true,
            };
        };

        let mut drained = Drained::default();
        let mut deadline = deadline;
        let mut killed = false;
        loop {
            let wait = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(wait) {
                Ok(chunk) => drained.bytes.extend_from_slice(&chunk),
                Err(RecvTimeoutError::Disconnected) => {
                    drained.complete = true;
                    return drained;
                }
                Err(RecvTimeoutError::Timeout) if !killed => {
                    let _ = signal_group(self.child.id(), libc::SIGKILL);
                    killed = true;
                    deadline = Instant::now() + KILL_DRAIN_GRACE;
                }
                Err(RecvTimeoutError::Timeout) => {
                    debug!(stream = ?kind, bytes = drained.bytes.len(), "abandoning drain");
                    return drained;
                }
            }
        }
    }
}

impl Drop for ScopedChild {
    fn drop(&mut self) {
        if matches!(self.child.try_wait(), Ok(None)) {
            let _ = signal_group(self.child.id(), libc::SIGKILL);
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum StreamKind {
    Stdout,
    Stderr,
}

/// Forward `reader` in chunks until EOF or until the receiver is gone.
fn drain<R: Read + Send + 'static>(mut reader: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buf = [0u8; DRAIN_CHUNK];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    });
    rx
}

/// Send `signal` to the process group led by `pid`.
fn signal_group(pid: u32, signal: libc::c_int) -> Result<(), std::io::Error> {
    let ret = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
    if ret == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str, timeout: Duration) -> CommandInvoker {
        let dir = std::env::temp_dir();
        CommandInvoker::new("sh", &dir, dir.join("buildbench-unused.cpp"), timeout)
            .with_args(vec!["-c".to_string(), script.to_string()])
    }

    #[test]
    fn test_command_args_substitution() {
        let invoker = CommandInvoker::new(
            "cmake",
            "/tmp/build",
            "/tmp/build/measure.cpp",
            Duration::from_secs(1),
        );
        assert_eq!(
            invoker.command_args("compile.benchmark.measure"),
            vec![
                "--build",
                "/tmp/build",
                "--target",
                "compile.benchmark.measure"
            ]
        );

        let custom = invoker.with_args(vec!["build".to_string(), "{target}:{source}".to_string()]);
        assert_eq!(
            custom.command_args("t"),
            vec!["build", "t:/tmp/build/measure.cpp"]
        );
    }

    #[test]
    fn test_invoke_captures_streams() {
        let mut invoker = sh(
            "echo '[compilation time: 0.25]'; echo 'warning: unused' >&2",
            Duration::from_secs(10),
        );
        let result = invoker.invoke("any");
        assert!(result.is_success());
        assert_eq!(result.stdout.trim(), "[compilation time: 0.25]");
        assert_eq!(result.stderr.trim(), "warning: unused");
    }

    #[test]
    fn test_invoke_reports_failure_status() {
        let mut invoker = sh("echo 'error: boom' >&2; exit 3", Duration::from_secs(10));
        let result = invoker.invoke("any");
        assert_eq!(result.status, BuildStatus::Failure);
        assert!(result.stderr.contains("error: boom"));
    }

    #[test]
    fn test_invoke_substitutes_target_into_script() {
        let dir = std::env::temp_dir();
        let mut invoker = CommandInvoker::new(
            "sh",
            &dir,
            dir.join("unused.cpp"),
            Duration::from_secs(10),
        )
        .with_args(vec!["-c".to_string(), "echo built {target}".to_string()]);
        assert_eq!(invoker.invoke("measure").stdout.trim(), "built measure");
    }

    #[test]
    fn test_invoke_exports_environment() {
        let mut invoker = sh("echo \"$CXX\"", Duration::from_secs(10))
            .with_env(vec![("CXX".to_string(), "clang++".to_string())]);
        assert_eq!(invoker.invoke("any").stdout.trim(), "clang++");
    }

    #[test]
    fn test_invoke_timeout_kills_build() {
        let mut invoker = sh("echo started; sleep 30", Duration::from_secs(1));
        let start = Instant::now();
        let result = invoker.invoke("slow");
        let elapsed = start.elapsed();

        assert_eq!(result.status, BuildStatus::Failure);
        assert!(result.stderr.contains("timed out"), "{}", result.stderr);
        assert!(result.stdout.contains("started"));
        assert!(elapsed < Duration::from_secs(10), "took {:?}", elapsed);
    }

    #[test]
    fn test_invoke_returns_when_detached_process_holds_pipe() {
        let mut invoker = sh(
            "setsid sleep 30 & echo '[compilation time: 0.1]'",
            Duration::from_secs(1),
        );
        let start = Instant::now();
        let result = invoker.invoke("daemonizing");
        let elapsed = start.elapsed();

        assert!(elapsed < Duration::from_secs(5), "took {:?}", elapsed);
        assert!(result.is_success());
        assert!(result.stdout.contains("[compilation time: 0.1]"));
        assert!(result.stderr.contains("drain abandoned"), "{}", result.stderr);
    }

    #[test]
    fn test_invoke_missing_tool_is_failure() {
        let dir = std::env::temp_dir();
        let mut invoker = CommandInvoker::new(
            "buildbench-no-such-tool",
            &dir,
            dir.join("unused.cpp"),
            Duration::from_secs(1),
        );
        let result = invoker.invoke("any");
        assert_eq!(result.status, BuildStatus::Failure);
        assert!(result.stderr.contains("failed to spawn"));
    }

    #[test]
    fn test_write_and_reset_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("nested").join("measure.cpp");
        let mut invoker = CommandInvoker::new("true", dir.path(), &source, Duration::from_secs(1));

        invoker.write_source("int main() {}").unwrap();
        assert_eq!(std::fs::read_to_string(&source).unwrap(), "int main() {}");

        invoker.reset_source().unwrap();
        assert_eq!(std::fs::read_to_string(&source).unwrap(), "");
    }
}
