//! Pipeline configuration: tiers, endpoints, run policy, validator.
//!
//! Sources, highest precedence first:
//! 1. `PIPELINE_*` environment variables
//! 2. a TOML file (`--config`)
//! 3. built-in defaults
//!
//! ```toml
//! max_attempts = 3
//! capabilities = ["python3", "pytest"]
//!
//! [tiers.planning]
//! model = "qwen3-8b"
//! endpoints = ["http://localhost:8080/v1"]
//!
//! [validator]
//! command = "python3 -m pytest -q -x {tests}"
//!
//! [[analysis]]
//! name = "ruff"
//! command = "ruff-json {candidate}"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use coordination::drift::DriftConfig;
use coordination::router::{EndpointPool, Tier};
use coordination::verifier::{AnalysisGateConfig, SandboxConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_ENDPOINT: &str = "http://localhost:8080/v1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {message}")]
    Env { var: String, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Model and endpoints for one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Opaque model identifier sent with each request
    pub model: String,
    /// Ordered endpoint addresses (OpenAI-compatible base URLs)
    pub endpoints: Vec<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.2
}

impl TierConfig {
    fn local(model: &str, temperature: f32) -> Self {
        Self {
            model: model.to_string(),
            endpoints: vec![DEFAULT_ENDPOINT.to_string()],
            max_tokens: default_max_tokens(),
            temperature,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TiersConfig {
    pub planning: TierConfig,
    pub generation: TierConfig,
    /// Expected to name a stronger model than `generation`
    pub escalation: TierConfig,
}

impl Default for TiersConfig {
    fn default() -> Self {
        Self {
            planning: TierConfig::local("planner", 0.3),
            generation: TierConfig::local("coder", 0.2),
            escalation: TierConfig::local("coder-large", 0.2),
        }
    }
}

impl TiersConfig {
    pub fn get(&self, tier: Tier) -> &TierConfig {
        match tier {
            Tier::Planning => &self.planning,
            Tier::Generation => &self.generation,
            Tier::Escalation => &self.escalation,
        }
    }

    fn get_mut(&mut self, tier: Tier) -> &mut TierConfig {
        match tier {
            Tier::Planning => &mut self.planning,
            Tier::Generation => &mut self.generation,
            Tier::Escalation => &mut self.escalation,
        }
    }
}

/// How candidates are executed against their tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Test command, shell-quoted; `{tests}` and `{candidate}` are substituted
    pub command: String,
    pub candidate_file: String,
    pub tests_file: String,
    pub timeout_secs: u64,
    pub output_max_bytes: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        let sandbox = SandboxConfig::default();
        Self {
            command: format!("{} {}", sandbox.program, sandbox.args.join(" ")),
            candidate_file: sandbox.candidate_file,
            tests_file: sandbox.tests_file,
            timeout_secs: sandbox.timeout_secs,
            output_max_bytes: sandbox.output_max_bytes,
        }
    }
}

/// One external static-analysis tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub name: String,
    /// Shell-quoted command; prints `{"success": bool, "issues_found": int}`
    pub command: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tiers: TiersConfig,
    /// Escalation budget per run
    pub max_attempts: u32,
    /// Per-call inference timeout
    pub inference_timeout_secs: u64,
    /// Consecutive failures tolerated before an endpoint is skipped
    pub endpoint_failure_threshold: u32,
    /// Capability names shown to the escalation tier
    pub capabilities: Vec<String>,
    /// Bearer token for all endpoints (usually from `PIPELINE_API_KEY`)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub validator: ValidatorConfig,
    pub drift: DriftConfig,
    pub analysis: Vec<AnalysisConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tiers: TiersConfig::default(),
            max_attempts: coordination::DEFAULT_MAX_ATTEMPTS,
            inference_timeout_secs: 120,
            endpoint_failure_threshold: EndpointPool::DEFAULT_FAILURE_THRESHOLD,
            capabilities: vec!["python3".to_string(), "pytest".to_string()],
            api_key: None,
            validator: ValidatorConfig::default(),
            drift: DriftConfig::default(),
            analysis: Vec::new(),
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        var: var.to_string(),
        message: e.to_string(),
    })
}

fn split_command(what: &str, command: &str) -> Result<(String, Vec<String>), ConfigError> {
    let mut parts = shlex::split(command)
        .ok_or_else(|| ConfigError::Invalid(format!("{what}: unbalanced quotes in {command:?}")))?;
    if parts.is_empty() {
        return Err(ConfigError::Invalid(format!("{what}: empty command")));
    }
    let program = parts.remove(0);
    Ok((program, parts))
}

impl PipelineConfig {
    /// Load from an optional TOML file, apply process environment, validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `PIPELINE_*` overrides read through `lookup`.
    ///
    /// Per tier: `PIPELINE_<TIER>_URLS` (comma-separated) and
    /// `PIPELINE_<TIER>_MODEL`. Global: `PIPELINE_API_KEY`,
    /// `PIPELINE_MAX_ATTEMPTS`, `PIPELINE_INFERENCE_TIMEOUT_SECS`,
    /// `PIPELINE_VALIDATOR_COMMAND`, `PIPELINE_DRIFT_WINDOW`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for &tier in Tier::all() {
            let prefix = format!("PIPELINE_{}", tier.as_str().to_ascii_uppercase());
            if let Some(urls) = lookup(&format!("{prefix}_URLS")) {
                self.tiers.get_mut(tier).endpoints = split_list(&urls);
            }
            if let Some(model) = lookup(&format!("{prefix}_MODEL")) {
                self.tiers.get_mut(tier).model = model;
            }
        }
        if let Some(key) = lookup("PIPELINE_API_KEY").filter(|k| !k.is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(v) = lookup("PIPELINE_MAX_ATTEMPTS") {
            self.max_attempts = parse_env("PIPELINE_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("PIPELINE_INFERENCE_TIMEOUT_SECS") {
            self.inference_timeout_secs = parse_env("PIPELINE_INFERENCE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("PIPELINE_VALIDATOR_COMMAND") {
            self.validator.command = v;
        }
        if let Some(v) = lookup("PIPELINE_DRIFT_WINDOW") {
            self.drift.window = parse_env("PIPELINE_DRIFT_WINDOW", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for &tier in Tier::all() {
            let tc = self.tiers.get(tier);
            if tc.endpoints.is_empty() {
                return Err(ConfigError::Invalid(format!("tier {tier} has no endpoints")));
            }
            if tc.model.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("tier {tier} has no model")));
            }
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.inference_timeout_secs == 0 {
            return Err(ConfigError::Invalid("inference_timeout_secs must be > 0".into()));
        }
        if self.validator.timeout_secs == 0 {
            return Err(ConfigError::Invalid("validator.timeout_secs must be > 0".into()));
        }
        if self.drift.window == 0 {
            return Err(ConfigError::Invalid("drift.window must be > 0".into()));
        }
        if !(self.drift.failure_threshold > 0.0 && self.drift.failure_threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "drift.failure_threshold must be in (0, 1], got {}",
                self.drift.failure_threshold
            )));
        }
        split_command("validator.command", &self.validator.command)?;
        for gate in &self.analysis {
            split_command(&format!("analysis.{}", gate.name), &gate.command)?;
        }
        Ok(())
    }

    /// Endpoint lists keyed by tier, as the pool wants them.
    pub fn endpoint_map(&self) -> HashMap<Tier, Vec<String>> {
        Tier::all()
            .iter()
            .map(|&t| (t, self.tiers.get(t).endpoints.clone()))
            .collect()
    }

    pub fn sandbox_config(&self) -> Result<SandboxConfig, ConfigError> {
        let (program, args) = split_command("validator.command", &self.validator.command)?;
        Ok(SandboxConfig {
            program,
            args,
            candidate_file: self.validator.candidate_file.clone(),
            tests_file: self.validator.tests_file.clone(),
            timeout_secs: self.validator.timeout_secs,
            output_max_bytes: self.validator.output_max_bytes,
        })
    }

    pub fn analysis_gate_configs(&self) -> Result<Vec<AnalysisGateConfig>, ConfigError> {
        self.analysis
            .iter()
            .map(|gate| {
                let (program, args) =
                    split_command(&format!("analysis.{}", gate.name), &gate.command)?;
                Ok(AnalysisGateConfig {
                    name: gate.name.clone(),
                    program,
                    args,
                    candidate_file: self.validator.candidate_file.clone(),
                    timeout_secs: gate.timeout_secs.unwrap_or(self.validator.timeout_secs),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults_validate() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.drift.window, 20);
        config.validate().unwrap();
    }

    #[test]
    fn test_toml_partial_override() {
        let config = PipelineConfig::from_toml(
            r#"
            max_attempts = 5

            [tiers.generation]
            model = "qwen-coder"
            endpoints = ["http://a:8080/v1", "http://b:8080/v1"]

            [[analysis]]
            name = "ruff"
            command = "ruff-json --strict"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.tiers.generation.endpoints.len(), 2);
        assert_eq!(config.tiers.generation.max_tokens, 2048);
        assert_eq!(config.tiers.planning.model, "planner");
        assert_eq!(config.analysis[0].name, "ruff");
        config.validate().unwrap();
    }

    #[test]
    fn test_env_beats_file() {
        let mut config =
            PipelineConfig::from_toml("[tiers.planning]\nmodel = \"file-model\"\nendpoints = [\"http://file\"]\n")
                .unwrap();
        config
            .apply_env(env(&[
                ("PIPELINE_PLANNING_URLS", "http://x/v1, http://y/v1"),
                ("PIPELINE_PLANNING_MODEL", "env-model"),
                ("PIPELINE_MAX_ATTEMPTS", "2"),
                ("PIPELINE_API_KEY", "sk-test"),
            ]))
            .unwrap();
        assert_eq!(config.tiers.planning.endpoints, vec!["http://x/v1", "http://y/v1"]);
        assert_eq!(config.tiers.planning.model, "env-model");
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_bad_env_number() {
        let mut config = PipelineConfig::default();
        let err = config
            .apply_env(env(&[("PIPELINE_MAX_ATTEMPTS", "three")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn test_validation_rejects() {
        let mut config = PipelineConfig::default();
        config.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.tiers.escalation.endpoints.clear();
        assert!(config.validate().unwrap_err().to_string().contains("escalation"));

        let mut config = PipelineConfig::default();
        config.drift.failure_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.validator.command = "python3 'unterminated".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sandbox_config_from_command() {
        let mut config = PipelineConfig::default();
        config.validator.command = "python3 -m pytest -q \"{tests}\"".into();
        let sandbox = config.sandbox_config().unwrap();
        assert_eq!(sandbox.program, "python3");
        assert_eq!(sandbox.args, vec!["-m", "pytest", "-q", "{tests}"]);
    }

    #[test]
    fn test_analysis_gate_configs() {
        let mut config = PipelineConfig::default();
        config.analysis.push(AnalysisConfig {
            name: "lint".into(),
            command: "lint --json {candidate}".into(),
            timeout_secs: None,
        });
        let gates = config.analysis_gate_configs().unwrap();
        assert_eq!(gates[0].program, "lint");
        assert_eq!(gates[0].timeout_secs, config.validator.timeout_secs);
    }
}
