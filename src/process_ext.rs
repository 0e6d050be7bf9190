//! Spawn a child process, drain its pipes concurrently, and enforce a
//! wall-clock deadline with graceful-then-forceful termination.
//!
//! Generalizes the teacher's `process_ext.rs` (a blocking thread + poll loop
//! around `std::process::Command`) onto `tokio::process` so an orchestrator
//! can await many of these as cheap tasks instead of pinning an OS thread
//! per child (spec §5: "process slots are heavy and bounded, tasks are
//! cheap and many").

use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Grace period between a graceful stop signal and an unconditional kill
/// (spec §4.1 default of 5s).
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct CapturedOutput {
    pub status: Option<std::process::ExitStatus>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
    /// Set when an external `CancellationToken` triggered termination,
    /// distinct from `timed_out` (spec §5: "parent cancelled" and "deadline
    /// exceeded" are distinct terminal causes).
    pub cancelled: bool,
    pub stdout_truncated: bool,
}

/// Runs `cmd` to completion, capturing stdout/stderr up to `output_limit`
/// bytes each, and enforcing `timeout`. The child is also torn down early if
/// `cancel` fires. Either path kills the child after `kill_grace` (there is
/// no portable graceful-signal API in std/tokio without `libc`, so
/// "graceful" here is the `Child::kill()`-after-grace approach the teacher
/// itself falls back to on platforms without a usable SIGTERM). `semaphore`
/// bounds the number of children spawned this way across the whole process
/// (spec §5's global process ceiling); the permit is held for the child's
/// entire lifetime, not just around spawn.
pub async fn run_with_timeout(
    cmd: Command,
    timeout: Duration,
    output_limit: usize,
    kill_grace: Duration,
    semaphore: &Semaphore,
) -> std::io::Result<CapturedOutput> {
    run_cancellable(cmd, timeout, output_limit, kill_grace, &CancellationToken::new(), semaphore).await
}

/// As [`run_with_timeout`], but also races the child against `cancel`.
pub async fn run_cancellable(
    mut cmd: Command,
    timeout: Duration,
    output_limit: usize,
    kill_grace: Duration,
    cancel: &CancellationToken,
    semaphore: &Semaphore,
) -> std::io::Result<CapturedOutput> {
    cmd.stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());

    let _process_permit = semaphore.acquire().await.expect("process semaphore closed");
    let mut child = cmd.spawn()?;
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();

    let stdout_task = tokio::spawn(async move {
        let Some(mut pipe) = stdout_pipe.take() else {
            return (Vec::new(), false);
        };
        drain_capped(&mut pipe, output_limit).await
    });
    let stderr_task = tokio::spawn(async move {
        let Some(mut pipe) = stderr_pipe.take() else {
            return (Vec::new(), false);
        };
        drain_capped(&mut pipe, output_limit).await
    });

    let deadline = Instant::now() + timeout;

    enum Outcome {
        Finished(std::io::Result<std::process::ExitStatus>),
        TimedOut,
        Cancelled,
    }

    let outcome = tokio::select! {
        status = child.wait() => Outcome::Finished(status),
        _ = tokio::time::sleep_until(deadline) => Outcome::TimedOut,
        _ = cancel.cancelled() => Outcome::Cancelled,
    };

    let (status, timed_out, cancelled) = match outcome {
        Outcome::Finished(status) => (status.ok(), false, false),
        Outcome::TimedOut => {
            let _ = child.start_kill();
            let _ = tokio::time::timeout(kill_grace, child.wait()).await;
            let _ = child.start_kill();
            (child.wait().await.ok(), true, false)
        }
        Outcome::Cancelled => {
            let _ = child.start_kill();
            let _ = tokio::time::timeout(kill_grace, child.wait()).await;
            let _ = child.start_kill();
            (child.wait().await.ok(), false, true)
        }
    };

    let (stdout, stdout_truncated) = stdout_task.await.unwrap_or_default();
    let (stderr, _) = stderr_task.await.unwrap_or_default();

    Ok(CapturedOutput { status, stdout, stderr, timed_out, cancelled, stdout_truncated })
}

async fn drain_capped(
    pipe: &mut (impl tokio::io::AsyncRead + Unpin),
    limit: usize,
) -> (Vec<u8>, bool) {
    let mut buf = [0u8; 8192];
    let mut captured = Vec::new();
    let mut truncated = false;
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if captured.len() < limit {
                    let remaining = limit - captured.len();
                    let take = remaining.min(n);
                    captured.extend_from_slice(&buf[..take]);
                    if take < n {
                        truncated = true;
                    }
                } else {
                    truncated = true;
                }
            }
            Err(_) => break,
        }
    }
    (captured, truncated)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_status() {
        let mut cmd = Command::new("printf");
        cmd.arg("hello");
        let semaphore = Semaphore::new(4);
        let out = run_with_timeout(cmd, Duration::from_secs(5), 1024, DEFAULT_KILL_GRACE, &semaphore)
            .await
            .expect("spawn ok");
        assert!(!out.timed_out);
        assert_eq!(String::from_utf8_lossy(&out.stdout), "hello");
        assert!(out.status.map(|s| s.success()).unwrap_or(false));
    }

    #[tokio::test]
    async fn kills_process_on_timeout() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let semaphore = Semaphore::new(4);
        let out = run_with_timeout(cmd, Duration::from_millis(50), 1024, Duration::from_millis(50), &semaphore)
            .await
            .expect("spawn ok");
        assert!(out.timed_out);
    }

    #[tokio::test]
    async fn cancellation_kills_the_child_and_is_distinct_from_timeout() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });
        let semaphore = Semaphore::new(4);
        let out = run_cancellable(cmd, Duration::from_secs(5), 1024, Duration::from_millis(50), &cancel, &semaphore)
            .await
            .expect("spawn ok");
        assert!(out.cancelled);
        assert!(!out.timed_out);
    }

    #[tokio::test]
    async fn truncates_oversized_stdout() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("head -c 1000 /dev/zero");
        let semaphore = Semaphore::new(4);
        let out = run_with_timeout(cmd, Duration::from_secs(5), 16, DEFAULT_KILL_GRACE, &semaphore)
            .await
            .expect("spawn ok");
        assert!(out.stdout_truncated);
        assert_eq!(out.stdout.len(), 16);
    }

    #[tokio::test]
    async fn global_semaphore_bounds_concurrent_children() {
        let semaphore = Arc::new(Semaphore::new(1));
        let start = Instant::now();
        let mut cmd_a = Command::new("sleep");
        cmd_a.arg("0.1");
        let mut cmd_b = Command::new("sleep");
        cmd_b.arg("0.1");

        let (sem_a, sem_b) = (semaphore.clone(), semaphore.clone());
        let (a, b) = tokio::join!(
            run_with_timeout(cmd_a, Duration::from_secs(5), 1024, DEFAULT_KILL_GRACE, &sem_a),
            run_with_timeout(cmd_b, Duration::from_secs(5), 1024, DEFAULT_KILL_GRACE, &sem_b),
        );
        a.expect("spawn ok");
        b.expect("spawn ok");
        // A single permit forces the two 100ms sleeps to run back to back
        // rather than concurrently.
        assert!(start.elapsed() >= Duration::from_millis(180));
    }
}
