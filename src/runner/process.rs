//! Direct process execution
//!
//! Programs run as plain child processes in their own process group so that
//! a timeout kills everything they spawned.

use anyhow::Result;
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::memory::{MemorySampler, SAMPLE_INTERVAL};
use super::{CommandSpec, CompileOutcome, RunOutcome, RunStatus, Runner};
use crate::core::utils::strip_carriage_returns;

/// How long output may keep draining once the time budget is spent
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Runner that spawns programs directly on the host
pub struct ProcessRunner {
    sample_interval: Duration,
}

impl ProcessRunner {
    pub fn new(sample_interval: Duration) -> Self {
        Self { sample_interval }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(SAMPLE_INTERVAL)
    }
}

fn build_command(spec: &CommandSpec) -> Command {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args).kill_on_drop(true);
    if let Some(dir) = &spec.work_dir {
        cmd.current_dir(dir);
    }
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

fn exit_status(status: ExitStatus) -> RunStatus {
    if let Some(code) = status.code() {
        return RunStatus::Exited(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return RunStatus::Signaled(signal);
        }
    }
    RunStatus::SystemError(format!("unrecognised exit status: {}", status))
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!("Failed to read program output: {}", e);
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// SIGKILL every process left in the group led by `pid`.
fn kill_group(pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => debug!("killpg({}) failed: {}", pid, e),
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}

/// Kill the whole process group, then the child itself.
async fn kill_tree(child: &mut Child) {
    kill_group(child.id());
    if let Err(e) = child.kill().await {
        debug!("Failed to kill timed out program: {}", e);
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    async fn compile(&self, spec: &CommandSpec) -> Result<CompileOutcome> {
        debug!("Compiling with {:?} {:?}", spec.program, spec.args);

        let started = Instant::now();
        let output = build_command(spec)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;
        let duration_ms = elapsed_ms(started);

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                return Ok(CompileOutcome {
                    duration_ms,
                    error: Some(format!("failed to start {}: {}", spec.program, e)),
                    ..Default::default()
                })
            }
        };

        let error = match exit_status(output.status) {
            RunStatus::Exited(0) => None,
            RunStatus::Exited(code) => Some(format!("compiler exited with code {}", code)),
            RunStatus::Signaled(signal) => Some(format!("compiler killed by signal {}", signal)),
            other => Some(format!("compiler failed: {:?}", other)),
        };

        Ok(CompileOutcome {
            duration_ms,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            error,
        })
    }

    async fn run(&self, spec: &CommandSpec, stdin: &str, timeout: Duration) -> Result<RunOutcome> {
        let input = strip_carriage_returns(stdin);

        let mut cmd = build_command(spec);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let started = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn {}: {}", spec.program, e);
                return Ok(RunOutcome::system_error(format!(
                    "failed to start {}: {}",
                    spec.program, e
                )));
            }
        };
        let pid = child.id();
        let sampler = pid.map(|pid| MemorySampler::spawn(pid, self.sample_interval));

        // Feed stdin concurrently so a program that never reads cannot block us
        let stdin_pipe = child.stdin.take();
        let writer = tokio::spawn(async move {
            if let Some(mut pipe) = stdin_pipe {
                if let Err(e) = pipe.write_all(input.as_bytes()).await {
                    debug!("Program closed stdin early: {}", e);
                }
            }
        });
        let stdout = tokio::spawn(drain(child.stdout.take()));
        let stderr = tokio::spawn(drain(child.stderr.take()));
        let drains = [stdout.abort_handle(), stderr.abort_handle()];

        let mut status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => exit_status(status),
            Ok(Err(e)) => RunStatus::SystemError(format!("failed to wait for program: {}", e)),
            Err(_) => {
                kill_tree(&mut child).await;
                RunStatus::TimedOut
            }
        };
        // Background children outlive the leader and would hold the pipes open
        kill_group(pid);
        let duration_ms = elapsed_ms(started);
        let peak_memory_bytes = sampler.map(MemorySampler::finish).unwrap_or(0);

        writer.abort();
        let budget = timeout.saturating_sub(started.elapsed()).max(DRAIN_GRACE);
        let (stdout, stderr) =
            match tokio::time::timeout(budget, async { (stdout.await, stderr.await) }).await {
                Ok((stdout, stderr)) => (stdout.unwrap_or_default(), stderr.unwrap_or_default()),
                Err(_) => {
                    warn!("Output of {} still open after the run, giving up", spec.program);
                    for handle in &drains {
                        handle.abort();
                    }
                    status = RunStatus::TimedOut;
                    (String::new(), String::new())
                }
            };

        Ok(RunOutcome {
            duration_ms,
            peak_memory_bytes,
            stdout,
            stderr,
            status,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").with_args(["-c", script])
    }

    #[tokio::test]
    async fn test_run_captures_output_and_strips_cr() {
        let runner = ProcessRunner::default();
        let outcome = runner
            .run(&sh("cat"), "1 2\r\n3\r\n", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.stdout, "1 2\n3\n");
    }

    #[tokio::test]
    async fn test_run_non_zero_exit() {
        let runner = ProcessRunner::default();
        let outcome = runner
            .run(&sh("echo oops >&2; exit 3"), "", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(outcome.status, RunStatus::Exited(3));
        assert_eq!(outcome.stderr, "oops\n");
    }

    #[tokio::test]
    async fn test_run_timeout_kills_program() {
        let runner = ProcessRunner::default();
        let started = Instant::now();
        let outcome = runner
            .run(&sh("sleep 10"), "", Duration::from_millis(300))
            .await
            .unwrap();
        assert_eq!(outcome.status, RunStatus::TimedOut);
        assert!(outcome.duration_ms >= 300.0);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_run_background_child_does_not_hold_the_run() {
        let runner = ProcessRunner::default();
        let started = Instant::now();
        let outcome = runner
            .run(&sh("sleep 4 & echo hi"), "", Duration::from_millis(300))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(outcome.status, RunStatus::Exited(0));
        assert_eq!(outcome.stdout, "hi\n");
    }

    #[tokio::test]
    async fn test_run_detached_writer_is_cut_off() {
        let runner = ProcessRunner::default();
        let started = Instant::now();
        // setsid leaves the process group, so only the drain budget stops it
        let outcome = runner
            .run(
                &sh("command -v setsid >/dev/null || exit 99; setsid sleep 4 & echo hi"),
                "",
                Duration::from_millis(300),
            )
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        if outcome.status != RunStatus::Exited(99) {
            assert_eq!(outcome.status, RunStatus::TimedOut);
        }
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let runner = ProcessRunner::default();
        let outcome = runner
            .run(
                &CommandSpec::new("/nonexistent/gavel-program"),
                "",
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert!(matches!(outcome.status, RunStatus::SystemError(_)));
    }

    #[tokio::test]
    async fn test_compile_failure() {
        let runner = ProcessRunner::default();
        let outcome = runner
            .compile(&sh("echo 'syntax error' >&2; exit 1"))
            .await
            .unwrap();
        assert!(!outcome.is_success());
        assert_eq!(outcome.stderr, "syntax error\n");
        assert!(outcome.error.unwrap().contains("code 1"));
    }

    #[tokio::test]
    async fn test_compile_success_in_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.sh"), "echo hi\n").unwrap();
        let runner = ProcessRunner::default();
        let outcome = runner
            .compile(
                &CommandSpec::new("cp")
                    .with_args(["main.sh", "main"])
                    .with_work_dir(dir.path()),
            )
            .await
            .unwrap();
        assert!(outcome.is_success());
        assert!(dir.path().join("main").exists());
    }
}
