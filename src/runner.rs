//! External qpdf process runner
//!
//! Spawns the decrypt executable per job, drains stderr incrementally, and
//! classifies the outcome from exit status and stderr text. The runner never
//! reads or interprets PDF content itself; correctness of decryption is
//! delegated entirely to qpdf. Its responsibility is process lifecycle and
//! exit-code/stderr triage only.

use crate::error::{Error, Result};
use crate::types::UnlockErrorKind;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

/// Default binary name looked up on the PATH
pub const QPDF_BINARY: &str = "qpdf";

/// Terminal outcome of one unlock process
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// Exit code 0
    Done,
    /// Killed by a termination signal
    Canceled,
    /// Any other failure, classified from stderr and exit code
    Failed {
        /// Machine-readable failure kind
        kind: UnlockErrorKind,
        /// User-facing message stored on the job
        message: String,
    },
}

impl UnlockOutcome {
    /// Convenience constructor for the failed arm
    pub fn failed(kind: UnlockErrorKind, message: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
        }
    }
}

/// Handle to one running unlock process
///
/// Owned by the job's completion task; the store never holds this directly.
/// `wait` is cancel-safe, so the completion task can race it against the
/// job's cancellation token and call it again after [`terminate`].
///
/// [`terminate`]: RunningUnlock::terminate
#[derive(Debug)]
pub struct RunningUnlock {
    child: Child,
    pid: Option<u32>,
    stderr_task: Option<tokio::task::JoinHandle<String>>,
}

impl RunningUnlock {
    fn new(mut child: Child) -> Self {
        let pid = child.id();
        // Drain stderr as it arrives so a chatty tool cannot fill the pipe
        // and deadlock against our wait().
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });
        Self {
            child,
            pid,
            stderr_task,
        }
    }

    /// Wait for the process to exit. Cancel-safe.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Collect everything the process wrote to stderr.
    ///
    /// Call after [`wait`](RunningUnlock::wait) has returned.
    pub async fn stderr_text(&mut self) -> String {
        match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        }
    }

    /// Send a termination signal; a no-op if the process already exited.
    ///
    /// SIGTERM on unix so qpdf can exit cleanly; `start_kill` elsewhere.
    pub fn terminate(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            // Safety: plain signal delivery to a pid we spawned.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
            return;
        }
        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }
    }
}

/// Spawns external decrypt processes for unlock jobs
#[async_trait]
pub trait UnlockRunner: Send + Sync {
    /// Launch the decrypt tool against `input`, writing to `output`.
    ///
    /// Returns immediately with a handle; completion is observed via
    /// [`RunningUnlock::wait`].
    async fn spawn(&self, input: &Path, output: &Path, password: &str) -> Result<RunningUnlock>;

    /// Handler name for logging
    fn name(&self) -> &'static str;
}

/// CLI-based runner invoking the external qpdf binary
///
/// Invocation shape: `qpdf --password=<pw> --decrypt <input> <output>`,
/// exit 0 on success with a non-empty output file.
pub struct QpdfRunner {
    binary_path: PathBuf,
}

impl QpdfRunner {
    /// Create a runner with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find qpdf in PATH
    pub fn from_path() -> Option<Self> {
        which::which(QPDF_BINARY).ok().map(Self::new)
    }

    /// The binary this runner invokes
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }
}

#[async_trait]
impl UnlockRunner for QpdfRunner {
    async fn spawn(&self, input: &Path, output: &Path, password: &str) -> Result<RunningUnlock> {
        let child = Command::new(&self.binary_path)
            .arg(format!("--password={password}"))
            .arg("--decrypt")
            .arg(input)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    Error::ToolMissing("qpdf is not installed on the server.".to_string())
                } else {
                    Error::SpawnFailed(e.to_string())
                }
            })?;

        tracing::debug!(
            binary = %self.binary_path.display(),
            input = %input.display(),
            "spawned unlock process"
        );

        Ok(RunningUnlock::new(child))
    }

    fn name(&self) -> &'static str {
        "cli-qpdf"
    }
}

/// Classify a finished process into a terminal outcome.
///
/// Pure triage over exit status and captured stderr; `cancel_requested`
/// covers platforms where a signaled exit is not observable from the status.
pub fn classify(status: ExitStatus, stderr: &str, cancel_requested: bool) -> UnlockOutcome {
    if status.success() {
        return UnlockOutcome::Done;
    }

    let message = stderr.to_lowercase();
    if message.contains("invalid password") || message.contains("incorrect password") {
        return UnlockOutcome::failed(
            UnlockErrorKind::IncorrectPassword,
            "Incorrect PDF password.",
        );
    }

    if cancel_requested || exited_by_signal(status) {
        return UnlockOutcome::Canceled;
    }

    if message.contains(QPDF_BINARY) && message.contains("not found") {
        return UnlockOutcome::failed(
            UnlockErrorKind::QpdfMissing,
            "qpdf is not installed on the server.",
        );
    }

    UnlockOutcome::failed(UnlockErrorKind::UnlockFailed, "Failed to unlock PDF.")
}

#[cfg(unix)]
fn exited_by_signal(status: ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal().is_some()
}

#[cfg(not(unix))]
fn exited_by_signal(_status: ExitStatus) -> bool {
    false
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_path_returns_none_for_nonexistent_binary() {
        let result = which::which("nonexistent-qpdf-binary-xyz");
        assert!(result.is_err());
    }

    #[cfg(unix)]
    mod unix {
        use super::super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::os::unix::process::ExitStatusExt;

        /// Write an executable shell script standing in for qpdf.
        ///
        /// Scripts receive `--password=<pw> --decrypt <input> <output>`.
        fn fake_tool(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-qpdf");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path
        }

        fn exit_status(code: i32) -> ExitStatus {
            ExitStatus::from_raw(code << 8)
        }

        fn signaled_status() -> ExitStatus {
            ExitStatus::from_raw(libc::SIGTERM)
        }

        #[test]
        fn classify_success_is_done() {
            assert_eq!(classify(exit_status(0), "", false), UnlockOutcome::Done);
        }

        #[test]
        fn classify_password_phrases_case_insensitively() {
            for stderr in [
                "qpdf: input.pdf: invalid password",
                "ERROR: Invalid Password supplied",
                "incorrect password for document",
            ] {
                match classify(exit_status(2), stderr, false) {
                    UnlockOutcome::Failed { kind, .. } => {
                        assert_eq!(kind, UnlockErrorKind::IncorrectPassword, "for {stderr:?}");
                    }
                    other => panic!("expected password failure for {stderr:?}, got {other:?}"),
                }
            }
        }

        #[test]
        fn classify_password_wins_even_when_signaled() {
            // Password triage takes precedence over signal triage.
            let outcome = classify(signaled_status(), "invalid password", true);
            assert!(matches!(
                outcome,
                UnlockOutcome::Failed {
                    kind: UnlockErrorKind::IncorrectPassword,
                    ..
                }
            ));
        }

        #[test]
        fn classify_signal_is_canceled() {
            assert_eq!(
                classify(signaled_status(), "", false),
                UnlockOutcome::Canceled
            );
        }

        #[test]
        fn classify_cancel_request_is_canceled() {
            assert_eq!(classify(exit_status(1), "", true), UnlockOutcome::Canceled);
        }

        #[test]
        fn classify_missing_tool_phrase() {
            match classify(exit_status(127), "sh: qpdf: command not found", false) {
                UnlockOutcome::Failed { kind, .. } => {
                    assert_eq!(kind, UnlockErrorKind::QpdfMissing);
                }
                other => panic!("expected qpdf_missing, got {other:?}"),
            }
        }

        #[test]
        fn classify_other_nonzero_exit_is_generic_failure() {
            match classify(exit_status(3), "operation failed", false) {
                UnlockOutcome::Failed { kind, message } => {
                    assert_eq!(kind, UnlockErrorKind::UnlockFailed);
                    assert_eq!(message, "Failed to unlock PDF.");
                }
                other => panic!("expected unlock_failed, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn spawn_and_wait_captures_stderr() {
            let dir = tempfile::tempdir().unwrap();
            let tool = fake_tool(dir.path(), r#"echo "invalid password" >&2; exit 2"#);

            let runner = QpdfRunner::new(tool);
            let mut running = runner
                .spawn(Path::new("in.pdf"), Path::new("out.pdf"), "pw")
                .await
                .unwrap();

            let status = running.wait().await.unwrap();
            let stderr = running.stderr_text().await;

            assert_eq!(status.code(), Some(2));
            assert!(stderr.contains("invalid password"));
            assert!(matches!(
                classify(status, &stderr, false),
                UnlockOutcome::Failed {
                    kind: UnlockErrorKind::IncorrectPassword,
                    ..
                }
            ));
        }

        #[tokio::test]
        async fn spawn_copies_input_to_output_on_success() {
            let dir = tempfile::tempdir().unwrap();
            let tool = fake_tool(dir.path(), r#"cp "$3" "$4""#);
            let input = dir.path().join("input.pdf");
            let output = dir.path().join("output.pdf");
            std::fs::write(&input, b"%PDF-1.7 test bytes").unwrap();

            let runner = QpdfRunner::new(tool);
            let mut running = runner.spawn(&input, &output, "pw").await.unwrap();
            let status = running.wait().await.unwrap();

            assert_eq!(classify(status, "", false), UnlockOutcome::Done);
            assert_eq!(std::fs::read(&output).unwrap(), b"%PDF-1.7 test bytes");
        }

        #[tokio::test]
        async fn terminate_resolves_a_hung_process_as_canceled() {
            let dir = tempfile::tempdir().unwrap();
            let tool = fake_tool(dir.path(), "sleep 30");

            let runner = QpdfRunner::new(tool);
            let mut running = runner
                .spawn(Path::new("in.pdf"), Path::new("out.pdf"), "pw")
                .await
                .unwrap();

            running.terminate();
            let status = running.wait().await.unwrap();
            let stderr = running.stderr_text().await;

            assert_eq!(classify(status, &stderr, true), UnlockOutcome::Canceled);
        }

        #[tokio::test]
        async fn spawn_of_missing_binary_maps_to_tool_missing() {
            let runner = QpdfRunner::new(PathBuf::from("/nonexistent/qpdf-xyz"));
            let err = runner
                .spawn(Path::new("in.pdf"), Path::new("out.pdf"), "pw")
                .await
                .unwrap_err();

            assert!(matches!(err, Error::ToolMissing(_)), "got {err:?}");
        }
    }
}
