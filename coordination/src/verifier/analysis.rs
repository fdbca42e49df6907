//! Static-analysis gates
//!
//! External analysis tools share one JSON contract on stdout:
//!
//! ```json
//! {"success": true, "issues_found": 0}
//! ```
//!
//! A non-success report fails the gate and is treated exactly like a failing
//! test run. A tool that cannot be run (missing binary, timeout, garbled
//! output) degrades to `Skipped` instead of blocking the candidate.

use crate::verifier::report::{truncate_output, GateOutcome, GateResult};
use crate::verifier::sandbox::{run_with_timeout, RunError, CANDIDATE_PLACEHOLDER};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

/// The fixed JSON contract analysis tools print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub success: bool,
    #[serde(alias = "issuesFound", default)]
    pub issues_found: u32,
}

/// Parse the last JSON object line of a tool's stdout.
///
/// Tools print progress noise before the verdict; the verdict is last.
pub fn parse_analysis_output(stdout: &str) -> Option<AnalysisReport> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|l| l.starts_with('{'))
        .find_map(|l| serde_json::from_str::<AnalysisReport>(l).ok())
}

/// A post-validation check on a candidate.
#[async_trait]
pub trait AnalysisGate: Send + Sync {
    /// Name reported in [`GateResult::gate`].
    fn name(&self) -> &str;

    /// Analyze the candidate. Never errors; an unusable tool yields `Skipped`.
    async fn analyze(&self, candidate: &str) -> GateResult;
}

/// Configuration for one command-backed analysis gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisGateConfig {
    pub name: String,
    pub program: String,
    /// Arguments; `{candidate}` is replaced by the candidate file name, and the
    /// file name is appended when no argument mentions it.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_candidate_file")]
    pub candidate_file: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_candidate_file() -> String {
    "candidate.py".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

/// Runs an external tool against the candidate written to a temp dir.
#[derive(Debug, Clone)]
pub struct CommandAnalysisGate {
    config: AnalysisGateConfig,
}

impl CommandAnalysisGate {
    pub fn new(config: AnalysisGateConfig) -> Self {
        Self { config }
    }

    fn expanded_args(&self) -> Vec<String> {
        let mut mentioned = false;
        let mut args: Vec<String> = self
            .config
            .args
            .iter()
            .map(|a| {
                if a.contains(CANDIDATE_PLACEHOLDER) {
                    mentioned = true;
                }
                a.replace(CANDIDATE_PLACEHOLDER, &self.config.candidate_file)
            })
            .collect();
        if !mentioned {
            args.push(self.config.candidate_file.clone());
        }
        args
    }

    fn gate(&self, start: Instant, outcome: GateOutcome, issues: u32, excerpt: Option<String>) -> GateResult {
        GateResult {
            gate: self.config.name.clone(),
            outcome,
            duration_ms: start.elapsed().as_millis() as u64,
            issues_found: issues,
            output_excerpt: excerpt,
        }
    }

    fn unavailable(&self, start: Instant, reason: String) -> GateResult {
        warn!(gate = %self.config.name, reason = %reason, "Analysis gate unavailable, skipping");
        self.gate(
            start,
            GateOutcome::Skipped,
            0,
            Some(format!("{} unavailable: {reason}", self.config.name)),
        )
    }
}

#[async_trait]
impl AnalysisGate for CommandAnalysisGate {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn analyze(&self, candidate: &str) -> GateResult {
        let start = Instant::now();

        let workspace = match tempfile::Builder::new().prefix("analysis-").tempdir() {
            Ok(dir) => dir,
            Err(e) => return self.unavailable(start, format!("workspace: {e}")),
        };
        let path = workspace.path().join(&self.config.candidate_file);
        if let Err(e) = tokio::fs::write(&path, candidate).await {
            return self.unavailable(start, format!("write candidate: {e}"));
        }

        let mut cmd = tokio::process::Command::new(&self.config.program);
        cmd.args(self.expanded_args());

        let output = match run_with_timeout(&mut cmd, workspace.path(), self.config.timeout_secs).await {
            Ok(output) => output,
            Err(RunError::Spawn(e)) => return self.unavailable(start, e.to_string()),
            Err(RunError::TimedOut) => {
                return self.unavailable(start, format!("timed out after {}s", self.config.timeout_secs))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let Some(report) = parse_analysis_output(&stdout) else {
            return self.unavailable(start, "no JSON verdict on stdout".to_string());
        };
        debug!(
            gate = %self.config.name,
            success = report.success,
            issues = report.issues_found,
            "Analysis gate finished"
        );

        if report.success {
            self.gate(start, GateOutcome::Passed, report.issues_found, None)
        } else {
            let excerpt = format!(
                "{} reported {} issue(s)\n{}",
                self.config.name,
                report.issues_found,
                truncate_output(stdout.trim_end(), 2048)
            );
            self.gate(start, GateOutcome::Failed, report.issues_found, Some(excerpt))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_contract() {
        let r = parse_analysis_output("{\"success\": false, \"issues_found\": 3}").unwrap();
        assert!(!r.success);
        assert_eq!(r.issues_found, 3);
    }

    #[test]
    fn test_parse_camel_case_and_noise() {
        let out = "scanning 1 file...\n{\"success\": true, \"issuesFound\": 0}\n";
        let r = parse_analysis_output(out).unwrap();
        assert!(r.success);
        assert_eq!(r.issues_found, 0);
    }

    #[test]
    fn test_parse_missing_verdict() {
        assert!(parse_analysis_output("all good").is_none());
        assert!(parse_analysis_output("{not json}").is_none());
    }

    #[test]
    fn test_candidate_file_appended() {
        let gate = CommandAnalysisGate::new(AnalysisGateConfig {
            name: "lint".to_string(),
            program: "lint".to_string(),
            args: vec!["--json".to_string()],
            candidate_file: "c.py".to_string(),
            timeout_secs: 5,
        });
        assert_eq!(gate.expanded_args(), vec!["--json", "c.py"]);
    }

    #[cfg(unix)]
    fn sh_gate(name: &str, script: &str) -> CommandAnalysisGate {
        CommandAnalysisGate::new(AnalysisGateConfig {
            name: name.to_string(),
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            candidate_file: "candidate.py".to_string(),
            timeout_secs: 5,
        })
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_gate_passes() {
        let gate = sh_gate("lint", "echo '{\"success\": true, \"issues_found\": 0}'");
        let result = gate.analyze("x = 1").await;
        assert_eq!(result.outcome, GateOutcome::Passed);
        assert_eq!(result.gate, "lint");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_gate_fails_with_issue_count() {
        let gate = sh_gate("lint", "echo '{\"success\": false, \"issues_found\": 2}'");
        let result = gate.analyze("x = 1").await;
        assert_eq!(result.outcome, GateOutcome::Failed);
        assert_eq!(result.issues_found, 2);
        assert!(result.output_excerpt.unwrap().contains("2 issue(s)"));
    }

    #[tokio::test]
    async fn test_missing_tool_degrades_to_skipped() {
        let gate = CommandAnalysisGate::new(AnalysisGateConfig {
            name: "ghost".to_string(),
            program: "definitely-not-an-analyzer".to_string(),
            args: vec![],
            candidate_file: "candidate.py".to_string(),
            timeout_secs: 5,
        });
        let result = gate.analyze("x = 1").await;
        assert_eq!(result.outcome, GateOutcome::Skipped);
    }
}
