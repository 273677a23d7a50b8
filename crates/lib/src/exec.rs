//! Safe execution layer: run allowlisted binaries under a deadline.
//! No shell is used; arguments are passed as a list to avoid injection.
//!
//! Every failure (rejection, spawn error, non-zero exit, timeout) comes back as a
//! [`CommandResult`] rather than an error, so one bad command never aborts its siblings.

use std::io::{ErrorKind, PipeReader, Read};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::allowlist::AllowList;

/// Deadline applied when a request has no timeout or a non-positive one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Exit code reported when no OS exit code exists (rejected, not spawned, killed).
pub const NO_EXIT_CODE: i32 = -1;

/// One command to run: binary name, argv and optional timeout in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(rename = "command")]
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(rename = "timeout", default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<i64>,
}

impl CommandRequest {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
            timeout_secs: None,
        }
    }

    pub fn with_timeout(mut self, secs: i64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Deadline for this request: its own timeout when positive, else [`DEFAULT_TIMEOUT_SECS`].
    pub fn effective_timeout(&self) -> Duration {
        match self.timeout_secs {
            Some(s) if s > 0 => Duration::from_secs(s as u64),
            _ => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// `name arg1 arg2` for display and logs.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.name, self.args.join(" "))
        }
    }
}

/// Outcome of executing one [`CommandRequest`].
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    pub succeeded: bool,
    /// Combined stdout and stderr, in the order the child wrote them.
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub exit_code: i32,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub completed_at: DateTime<Utc>,
}

fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

impl CommandResult {
    fn failed(start: Instant, message: String, output: String, exit_code: i32) -> Self {
        Self {
            succeeded: false,
            output,
            error_message: Some(message),
            exit_code,
            elapsed: start.elapsed(),
            completed_at: Utc::now(),
        }
    }
}

/// How long to keep reading once the child is gone. A grandchild that inherited the
/// pipe can hold it open; whatever arrived by then is kept.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Runs commands, re-checking every name against its own allowlist.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    allowlist: Arc<AllowList>,
}

impl CommandExecutor {
    pub fn new(allowlist: Arc<AllowList>) -> Self {
        Self { allowlist }
    }

    /// Execute `req` if its name is allowlisted. Never returns an error: rejection, spawn
    /// failure, non-zero exit and deadline expiry are all reported in the result.
    ///
    /// stdout and stderr share one pipe, so `output` keeps the order the child wrote in.
    /// Output written before a deadline kill is kept.
    pub async fn execute(&self, req: &CommandRequest) -> CommandResult {
        let start = Instant::now();

        if !self.allowlist.is_allowed(&req.name) {
            log::warn!("exec: rejected command not in allowlist: {:?}", req.name);
            return CommandResult::failed(
                start,
                format!(
                    "command '{}' is not allowed for security reasons",
                    req.name
                ),
                String::new(),
                NO_EXIT_CODE,
            );
        }

        let timeout = req.effective_timeout();
        log::info!("exec: running `{}` (timeout {}s)", req.display(), timeout.as_secs());

        let pipe = std::io::pipe().and_then(|(reader, writer)| {
            let writer_err = writer.try_clone()?;
            Ok((reader, writer, writer_err))
        });
        let (reader, out, err) = match pipe {
            Ok(p) => p,
            Err(e) => {
                log::warn!("exec: no output pipe for {}: {}", req.name, e);
                return CommandResult::failed(
                    start,
                    format!("failed to start '{}': {}", req.name, e),
                    String::new(),
                    NO_EXIT_CODE,
                );
            }
        };

        let mut cmd = Command::new(&req.name);
        cmd.args(&req.args)
            .stdin(Stdio::null())
            .stdout(out)
            .stderr(err)
            .kill_on_drop(true);
        let spawned = cmd.spawn();
        // Our copies of the write end live in `cmd`; the reader sees EOF only once they close.
        drop(cmd);
        let mut child = match spawned {
            Ok(c) => c,
            Err(e) => {
                log::warn!("exec: failed to start {}: {}", req.name, e);
                return CommandResult::failed(
                    start,
                    format!("failed to start '{}': {}", req.name, e),
                    String::new(),
                    NO_EXIT_CODE,
                );
            }
        };

        let sink = Arc::new(Mutex::new(Vec::new()));
        let drain = {
            let sink = Arc::clone(&sink);
            tokio::task::spawn_blocking(move || drain_pipe(reader, &sink))
        };

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                let output = collect_output(drain, &sink).await;
                let exit_code = status.code().unwrap_or(NO_EXIT_CODE);
                if status.success() {
                    CommandResult {
                        succeeded: true,
                        output,
                        error_message: None,
                        exit_code,
                        elapsed: start.elapsed(),
                        completed_at: Utc::now(),
                    }
                } else {
                    let message = match status.code() {
                        Some(code) => format!("exit status {}", code),
                        None => format!("terminated: {}", status),
                    };
                    log::warn!("exec: `{}` failed: {}", req.display(), message);
                    CommandResult::failed(start, message, output, exit_code)
                }
            }
            Ok(Err(e)) => {
                log::warn!("exec: waiting on {} failed: {}", req.name, e);
                reap(&mut child, req).await;
                let output = collect_output(drain, &sink).await;
                CommandResult::failed(start, format!("wait failed: {}", e), output, NO_EXIT_CODE)
            }
            Err(_) => {
                log::warn!(
                    "exec: `{}` timed out after {}s, killing it",
                    req.display(),
                    timeout.as_secs()
                );
                reap(&mut child, req).await;
                let output = collect_output(drain, &sink).await;
                CommandResult::failed(
                    start,
                    format!("command timed out after {}s", timeout.as_secs()),
                    output,
                    NO_EXIT_CODE,
                )
            }
        }
    }
}

/// Kill the child and wait for it, so no process outlives its result.
async fn reap(child: &mut Child, req: &CommandRequest) {
    if let Err(e) = child.kill().await {
        log::warn!("exec: could not kill {}: {}", req.name, e);
    }
}

fn lock(sink: &Mutex<Vec<u8>>) -> MutexGuard<'_, Vec<u8>> {
    sink.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Copy the pipe into `sink` chunk by chunk until EOF, so a partial read is never lost.
fn drain_pipe(mut reader: PipeReader, sink: &Mutex<Vec<u8>>) {
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => lock(sink).extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                log::debug!("exec: output read stopped: {}", e);
                break;
            }
        }
    }
}

async fn collect_output(drain: JoinHandle<()>, sink: &Mutex<Vec<u8>>) -> String {
    if tokio::time::timeout(OUTPUT_DRAIN_GRACE, drain).await.is_err() {
        log::debug!("exec: output pipe still open after exit, keeping what was read");
    }
    String::from_utf8_lossy(&lock(sink)).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor(names: &[&str]) -> CommandExecutor {
        CommandExecutor::new(Arc::new(AllowList::from_names(names.iter().copied())))
    }

    #[test]
    fn effective_timeout_defaults_for_missing_or_non_positive() {
        let req = CommandRequest::new("ls", vec![]);
        assert_eq!(req.effective_timeout(), Duration::from_secs(30));
        assert_eq!(req.clone().with_timeout(0).effective_timeout(), Duration::from_secs(30));
        assert_eq!(req.clone().with_timeout(-5).effective_timeout(), Duration::from_secs(30));
        assert_eq!(req.with_timeout(7).effective_timeout(), Duration::from_secs(7));
    }

    #[tokio::test]
    async fn echo_succeeds_with_output() {
        let exec = CommandExecutor::new(Arc::new(AllowList::builtin()));
        let res = exec
            .execute(&CommandRequest::new("echo", vec!["hello".to_string()]))
            .await;
        assert!(res.succeeded, "error: {:?}", res.error_message);
        assert_eq!(res.exit_code, 0);
        assert_eq!(res.output, "hello\n");
        assert!(res.error_message.is_none());
    }

    #[tokio::test]
    async fn sudo_is_rejected_before_spawning() {
        let exec = CommandExecutor::new(Arc::new(AllowList::builtin()));
        let res = exec
            .execute(&CommandRequest::new("sudo", vec!["whoami".to_string()]))
            .await;
        assert!(!res.succeeded);
        assert_eq!(res.exit_code, -1);
        let msg = res.error_message.unwrap_or_default();
        assert!(msg.contains("sudo"), "{}", msg);
        assert!(msg.contains("not allowed"), "{}", msg);
        assert!(res.output.is_empty());
    }

    #[tokio::test]
    async fn rejection_ignores_arguments() {
        let exec = CommandExecutor::new(Arc::new(AllowList::builtin()));
        for args in [vec![], vec!["-rf".to_string(), "/".to_string()]] {
            let res = exec.execute(&CommandRequest::new("dd", args)).await;
            assert!(!res.succeeded);
            assert_eq!(res.exit_code, -1);
        }
    }

    #[tokio::test]
    async fn non_zero_exit_reports_code_and_output() {
        let exec = executor(&["sh"]);
        let req = CommandRequest::new(
            "sh",
            vec!["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()],
        );
        let res = exec.execute(&req).await;
        assert!(!res.succeeded);
        assert_eq!(res.exit_code, 3);
        assert_eq!(res.output, "out\nerr\n");
        assert_eq!(res.error_message.as_deref(), Some("exit status 3"));
    }

    #[tokio::test]
    async fn output_keeps_write_order_across_streams() {
        let exec = executor(&["sh"]);
        let req = CommandRequest::new(
            "sh",
            vec![
                "-c".to_string(),
                "echo err1 >&2; sleep 0.2; echo out2; exit 1".to_string(),
            ],
        );
        let res = exec.execute(&req).await;
        assert!(!res.succeeded);
        assert_eq!(res.exit_code, 1);
        assert_eq!(res.output, "err1\nout2\n");
    }

    #[tokio::test]
    async fn missing_binary_is_reported_as_data() {
        let exec = executor(&["definitely-not-a-real-binary-xyz"]);
        let res = exec
            .execute(&CommandRequest::new("definitely-not-a-real-binary-xyz", vec![]))
            .await;
        assert!(!res.succeeded);
        assert_eq!(res.exit_code, -1);
        assert!(res
            .error_message
            .unwrap_or_default()
            .contains("failed to start"));
    }

    #[tokio::test]
    async fn deadline_kills_long_running_command() {
        let exec = executor(&["sleep"]);
        let req = CommandRequest::new("sleep", vec!["5".to_string()]).with_timeout(1);
        let started = Instant::now();
        let res = exec.execute(&req).await;
        assert!(started.elapsed() <= Duration::from_secs(2));
        assert!(!res.succeeded);
        assert_eq!(res.exit_code, -1);
        assert!(res.error_message.unwrap_or_default().contains("timed out"));
    }

    #[tokio::test]
    async fn deadline_keeps_output_written_before_the_kill() {
        let exec = executor(&["sh"]);
        let req = CommandRequest::new(
            "sh",
            vec!["-c".to_string(), "echo partial; exec sleep 5".to_string()],
        )
        .with_timeout(1);
        let started = Instant::now();
        let res = exec.execute(&req).await;
        assert!(started.elapsed() <= Duration::from_secs(2));
        assert!(!res.succeeded);
        assert_eq!(res.exit_code, -1);
        assert_eq!(res.output, "partial\n");
        assert_eq!(res.error_message.as_deref(), Some("command timed out after 1s"));
    }

    #[tokio::test]
    async fn result_carries_timing() {
        let exec = executor(&["true"]);
        let before = Utc::now();
        let res = exec.execute(&CommandRequest::new("true", vec![])).await;
        assert!(res.succeeded);
        assert!(res.completed_at >= before);
        let json = serde_json::to_value(&res).unwrap();
        assert!(json["elapsed_ms"].as_f64().is_some());
        assert!(json["completed_at"].as_str().is_some());
    }
}
