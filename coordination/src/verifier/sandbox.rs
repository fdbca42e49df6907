//! Sandbox validator: runs a candidate's test suite in an isolated process
//!
//! Every call gets its own temporary workspace, so concurrent validations
//! never share files. The test command runs with a wall-clock timeout; on
//! expiry the child's process group is killed and the result reports
//! `"timeout"`.

use crate::verifier::report::{
    truncate_output, GateOutcome, GateResult, ValidationResult, TIMEOUT_ERROR_TEXT,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Placeholder in `args` replaced by the test file name.
pub const TESTS_PLACEHOLDER: &str = "{tests}";
/// Placeholder in `args` replaced by the candidate file name.
pub const CANDIDATE_PLACEHOLDER: &str = "{candidate}";

/// The authority on whether a candidate passes its tests.
#[async_trait]
pub trait CandidateValidator: Send + Sync {
    /// Run `test_suite` against `candidate`. Never errors: every failure
    /// mode (spawn failure, timeout, failing test) is a failing result.
    async fn validate(&self, candidate: &str, test_suite: &str) -> ValidationResult;
}

/// How the sandbox lays out and runs a candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Test runner executable
    pub program: String,
    /// Runner arguments; `{tests}` / `{candidate}` are substituted
    pub args: Vec<String>,
    /// File name the candidate is written to
    pub candidate_file: String,
    /// File name the test suite is written to
    pub tests_file: String,
    /// Wall-clock budget for one run (seconds)
    pub timeout_secs: u64,
    /// Truncate captured output to this many bytes
    pub output_max_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec![
                "-m".to_string(),
                "pytest".to_string(),
                "-q".to_string(),
                "-x".to_string(),
                TESTS_PLACEHOLDER.to_string(),
            ],
            candidate_file: "candidate.py".to_string(),
            tests_file: "test_candidate.py".to_string(),
            timeout_secs: 60,
            output_max_bytes: 4096,
        }
    }
}

/// Why a child process produced no output.
#[derive(Debug)]
pub(crate) enum RunError {
    Spawn(std::io::Error),
    TimedOut,
}

/// Run `cmd` in `dir` under a wall-clock timeout.
///
/// On Unix the child leads its own process group. On timeout the whole group
/// is sent SIGKILL, so nothing the child spawned outlives the run.
pub(crate) async fn run_with_timeout(
    cmd: &mut tokio::process::Command,
    dir: &Path,
    timeout_secs: u64,
) -> Result<std::process::Output, RunError> {
    cmd.current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn().map_err(RunError::Spawn)?;
    let pid = child.id();

    match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(RunError::Spawn(e)),
        Err(_) => {
            if let Some(pid) = pid {
                kill_process_group(pid);
            }
            Err(RunError::TimedOut)
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => warn!(pid, error = %e, "Failed to kill sandbox process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

/// Runs candidates in per-call temporary directories.
#[derive(Debug, Clone)]
pub struct SandboxValidator {
    config: SandboxConfig,
}

impl SandboxValidator {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    fn expanded_args(&self) -> Vec<String> {
        self.config
            .args
            .iter()
            .map(|a| {
                a.replace(TESTS_PLACEHOLDER, &self.config.tests_file)
                    .replace(CANDIDATE_PLACEHOLDER, &self.config.candidate_file)
            })
            .collect()
    }

    fn failed_gate(&self, start: Instant, excerpt: String) -> GateResult {
        GateResult {
            gate: "sandbox".to_string(),
            outcome: GateOutcome::Failed,
            duration_ms: start.elapsed().as_millis() as u64,
            issues_found: 0,
            output_excerpt: Some(excerpt),
        }
    }

    async fn write_workspace(
        &self,
        dir: &Path,
        candidate: &str,
        test_suite: &str,
    ) -> std::io::Result<()> {
        tokio::fs::write(dir.join(&self.config.candidate_file), candidate).await?;
        tokio::fs::write(dir.join(&self.config.tests_file), test_suite).await?;
        Ok(())
    }

    /// Run the sandbox gate and return its detailed result.
    pub async fn run_gate(&self, candidate: &str, test_suite: &str) -> GateResult {
        let start = Instant::now();

        let workspace = match tempfile::Builder::new().prefix("candidate-").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                return self.failed_gate(start, format!("failed to create sandbox workspace: {e}"))
            }
        };
        if let Err(e) = self
            .write_workspace(workspace.path(), candidate, test_suite)
            .await
        {
            return self.failed_gate(start, format!("failed to write sandbox files: {e}"));
        }

        let mut cmd = tokio::process::Command::new(&self.config.program);
        cmd.args(self.expanded_args());
        debug!(
            program = %self.config.program,
            workspace = %workspace.path().display(),
            "Running sandbox validation"
        );

        match run_with_timeout(&mut cmd, workspace.path(), self.config.timeout_secs).await {
            Ok(output) => {
                let passed = output.status.success();
                let excerpt = if passed {
                    None
                } else {
                    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    if !stderr.trim().is_empty() {
                        if !combined.is_empty() && !combined.ends_with('\n') {
                            combined.push('\n');
                        }
                        combined.push_str(&stderr);
                    }
                    if combined.trim().is_empty() {
                        combined = format!("test run exited with {}", output.status);
                    }
                    Some(truncate_output(combined.trim_end(), self.config.output_max_bytes))
                };
                GateResult {
                    gate: "sandbox".to_string(),
                    outcome: if passed {
                        GateOutcome::Passed
                    } else {
                        GateOutcome::Failed
                    },
                    duration_ms: start.elapsed().as_millis() as u64,
                    issues_found: 0,
                    output_excerpt: excerpt,
                }
            }
            Err(RunError::Spawn(e)) => {
                warn!(program = %self.config.program, error = %e, "Sandbox runner failed to start");
                self.failed_gate(
                    start,
                    format!("failed to execute {}: {e}", self.config.program),
                )
            }
            Err(RunError::TimedOut) => {
                warn!(timeout_secs = self.config.timeout_secs, "Sandbox validation timed out");
                self.failed_gate(start, TIMEOUT_ERROR_TEXT.to_string())
            }
        }
    }
}

#[async_trait]
impl CandidateValidator for SandboxValidator {
    async fn validate(&self, candidate: &str, test_suite: &str) -> ValidationResult {
        let gate = self.run_gate(candidate, test_suite).await;
        if gate.outcome.is_passed() {
            ValidationResult::passed(gate.duration_ms)
        } else {
            ValidationResult::failed(gate.output_excerpt.unwrap_or_default(), gate.duration_ms)
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// Shell-based layout: the test file sources the candidate.
    fn sh_config(timeout_secs: u64) -> SandboxConfig {
        SandboxConfig {
            program: "sh".to_string(),
            args: vec![TESTS_PLACEHOLDER.to_string()],
            candidate_file: "candidate.sh".to_string(),
            tests_file: "test.sh".to_string(),
            timeout_secs,
            output_max_bytes: 4096,
        }
    }

    const CANDIDATE: &str = "add() { echo $(($1 + $2)); }";

    #[tokio::test]
    async fn test_passing_suite() {
        let validator = SandboxValidator::new(sh_config(10));
        let tests = ". ./candidate.sh\n[ \"$(add 2 3)\" = \"5\" ] || { echo 'add 2 3 != 5'; exit 1; }";
        let result = validator.validate(CANDIDATE, tests).await;
        assert!(result.passed, "unexpected failure: {}", result.error_text);
        assert!(result.error_text.is_empty());
    }

    #[tokio::test]
    async fn test_failing_suite_captures_output() {
        let validator = SandboxValidator::new(sh_config(10));
        let tests = ". ./candidate.sh\n[ \"$(add 2 2)\" = \"5\" ] || { echo 'AssertionError: add 2 2 != 5' >&2; exit 1; }";
        let result = validator.validate(CANDIDATE, tests).await;
        assert!(!result.passed);
        assert!(result.error_text.contains("AssertionError"));
    }

    #[tokio::test]
    async fn test_timeout_reported_as_failure() {
        let validator = SandboxValidator::new(sh_config(1));
        let result = validator.validate(CANDIDATE, "sleep 5").await;
        assert!(!result.passed);
        assert!(result.is_timeout());
        assert_eq!(result.error_text, "timeout");
    }

    #[tokio::test]
    async fn test_timeout_kills_spawned_descendants() {
        let marker_dir = tempfile::tempdir().unwrap();
        let marker = marker_dir.path().join("survived");
        let validator = SandboxValidator::new(sh_config(1));
        let tests = format!("(sleep 2; touch '{}') &\nwait", marker.display());

        let result = validator.validate(CANDIDATE, &tests).await;
        assert!(result.is_timeout());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!marker.exists(), "background process outlived the timeout");
    }

    #[tokio::test]
    async fn test_missing_program_is_failure() {
        let mut config = sh_config(5);
        config.program = "definitely-not-a-real-runner".to_string();
        let validator = SandboxValidator::new(config);
        let result = validator.validate(CANDIDATE, "true").await;
        assert!(!result.passed);
        assert!(result.error_text.contains("failed to execute"));
    }

    #[tokio::test]
    async fn test_concurrent_validations_isolated() {
        let validator = std::sync::Arc::new(SandboxValidator::new(sh_config(10)));
        let mut handles = Vec::new();
        for i in 0..4 {
            let v = validator.clone();
            handles.push(tokio::spawn(async move {
                let candidate = format!("VALUE={i}");
                let tests = format!(". ./candidate.sh\n[ \"$VALUE\" = \"{i}\" ] || exit 1");
                v.validate(&candidate, &tests).await
            }));
        }
        for h in handles {
            assert!(h.await.unwrap().passed);
        }
    }

    #[test]
    fn test_placeholder_expansion() {
        let mut config = sh_config(1);
        config.args = vec!["--cov={candidate}".to_string(), TESTS_PLACEHOLDER.to_string()];
        let validator = SandboxValidator::new(config);
        assert_eq!(validator.expanded_args(), vec!["--cov=candidate.sh", "test.sh"]);
    }
}
