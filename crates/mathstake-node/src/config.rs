use anyhow::{bail, Context, Result};
use mathstake_gate::{GateConfig, HttpReviewerConfig};
use mathstake_ledger::LedgerConfig;
use mathstake_sandbox::{ExecutorConfig, ProcessRunnerConfig};
use mathstake_settlement::EvaluatorConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub sweep: SweepSettings,
    pub sandbox: SandboxSettings,
    pub settlement: SettlementSettings,
    pub gate: GateSettings,
    pub storage: StorageSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    pub interval_secs: u64,
    pub claim_lease_secs: i64,
    /// Fixes the range generator's RNG; unset means OS entropy.
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    pub interpreter: String,
    pub interpreter_args: Vec<String>,
    pub timeout_ms: u64,
    pub max_output_bytes: usize,
    pub max_concurrent: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementSettings {
    pub reputation_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    pub max_code_bytes: usize,
    /// Semantic reviewer endpoint. Static checks only when unset.
    pub reviewer_url: Option<String>,
    pub reviewer_api_key: Option<String>,
    pub reviewer_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub state_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty`, `compact` or `json`.
    pub format: String,
    pub file_output: Option<PathBuf>,
    pub module_filters: BTreeMap<String, String>,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            claim_lease_secs: 600,
            rng_seed: None,
        }
    }
}

impl Default for SandboxSettings {
    fn default() -> Self {
        let runner = ProcessRunnerConfig::default();
        let executor = ExecutorConfig::default();
        Self {
            interpreter: runner.interpreter,
            interpreter_args: runner.interpreter_args,
            timeout_ms: executor.timeout.as_millis() as u64,
            max_output_bytes: runner.max_output_bytes,
            max_concurrent: executor.max_concurrent,
        }
    }
}

impl Default for SettlementSettings {
    fn default() -> Self {
        Self {
            reputation_rate: LedgerConfig::default().reputation_rate,
        }
    }
}

impl Default for GateSettings {
    fn default() -> Self {
        let gate = GateConfig::default();
        Self {
            max_code_bytes: gate.max_code_bytes,
            reviewer_url: None,
            reviewer_api_key: None,
            reviewer_timeout_secs: gate.reviewer_timeout.as_secs(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from("./data/market-state.json"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_output: None,
            module_filters: BTreeMap::new(),
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("writing config {}", path.display()))?;
        Ok(())
    }

    /// Applies `MATHSTAKE_*` environment variables over the loaded values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Same as [`Self::apply_env_overrides`] with an explicit lookup.
    /// Unparsable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse_with<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            lookup(key).and_then(|v| v.trim().parse().ok())
        }

        if let Some(v) = parse_with(&lookup, "MATHSTAKE_SWEEP_INTERVAL_SECS") {
            self.sweep.interval_secs = v;
        }
        if let Some(v) = parse_with(&lookup, "MATHSTAKE_CLAIM_LEASE_SECS") {
            self.sweep.claim_lease_secs = v;
        }
        if let Some(v) = parse_with(&lookup, "MATHSTAKE_RNG_SEED") {
            self.sweep.rng_seed = Some(v);
        }

        if let Some(v) = lookup("MATHSTAKE_INTERPRETER").filter(|v| !v.is_empty()) {
            self.sandbox.interpreter = v;
        }
        if let Some(v) = parse_with(&lookup, "MATHSTAKE_SANDBOX_TIMEOUT_MS") {
            self.sandbox.timeout_ms = v;
        }
        if let Some(v) = parse_with(&lookup, "MATHSTAKE_SANDBOX_MAX_CONCURRENT") {
            self.sandbox.max_concurrent = v;
        }

        if let Some(v) = parse_with(&lookup, "MATHSTAKE_REPUTATION_RATE") {
            self.settlement.reputation_rate = v;
        }

        if let Some(v) = lookup("MATHSTAKE_REVIEWER_URL") {
            self.gate.reviewer_url = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = lookup("MATHSTAKE_REVIEWER_API_KEY").filter(|v| !v.is_empty()) {
            self.gate.reviewer_api_key = Some(v);
        }

        if let Some(v) = lookup("MATHSTAKE_STATE_FILE").filter(|v| !v.is_empty()) {
            self.storage.state_file = PathBuf::from(v);
        }

        if let Some(v) = lookup("MATHSTAKE_LOG_LEVEL").filter(|v| !v.is_empty()) {
            self.logging.level = v;
        }
        if let Some(v) = lookup("MATHSTAKE_LOG_FORMAT").filter(|v| !v.is_empty()) {
            self.logging.format = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sweep.interval_secs == 0 {
            bail!("sweep.interval_secs must be positive");
        }
        if self.sweep.claim_lease_secs <= 0 {
            bail!("sweep.claim_lease_secs must be positive");
        }
        if self.sandbox.timeout_ms == 0 {
            bail!("sandbox.timeout_ms must be positive");
        }
        if self.sandbox.max_concurrent == 0 {
            bail!("sandbox.max_concurrent must be positive");
        }
        if self.sandbox.interpreter.trim().is_empty() {
            bail!("sandbox.interpreter must be set");
        }
        if !self.settlement.reputation_rate.is_finite() {
            bail!("settlement.reputation_rate must be a finite number");
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "compact" | "json") {
            bail!(
                "logging.format must be pretty, compact or json, got {}",
                self.logging.format
            );
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep.interval_secs)
    }

    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            claim_lease_secs: self.sweep.claim_lease_secs,
        }
    }

    pub fn runner_config(&self) -> ProcessRunnerConfig {
        ProcessRunnerConfig {
            interpreter: self.sandbox.interpreter.clone(),
            interpreter_args: self.sandbox.interpreter_args.clone(),
            max_output_bytes: self.sandbox.max_output_bytes,
            ..ProcessRunnerConfig::default()
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            timeout: Duration::from_millis(self.sandbox.timeout_ms),
            max_concurrent: self.sandbox.max_concurrent,
        }
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            reputation_rate: self.settlement.reputation_rate,
        }
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            max_code_bytes: self.gate.max_code_bytes,
            reviewer_timeout: Duration::from_secs(self.gate.reviewer_timeout_secs),
        }
    }

    pub fn reviewer_config(&self) -> Option<HttpReviewerConfig> {
        self.gate.reviewer_url.as_ref().map(|endpoint| HttpReviewerConfig {
            endpoint: endpoint.clone(),
            timeout_secs: self.gate.reviewer_timeout_secs,
            api_key: self.gate.reviewer_api_key.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: NodeConfig = toml::from_str(
            r#"
            [sweep]
            interval_secs = 15

            [gate]
            reviewer_url = "http://127.0.0.1:7000/review"
            "#,
        )
        .unwrap();

        assert_eq!(config.sweep.interval_secs, 15);
        assert_eq!(config.sweep.claim_lease_secs, 600);
        assert_eq!(config.sandbox, SandboxSettings::default());
        assert_eq!(config.logging.format, "pretty");
        let reviewer = config.reviewer_config().unwrap();
        assert_eq!(reviewer.endpoint, "http://127.0.0.1:7000/review");
        assert_eq!(reviewer.timeout_secs, 20);
        config.validate().unwrap();
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("MATHSTAKE_SWEEP_INTERVAL_SECS", "5"),
            ("MATHSTAKE_RNG_SEED", "42"),
            ("MATHSTAKE_SANDBOX_TIMEOUT_MS", "250"),
            ("MATHSTAKE_REPUTATION_RATE", "0.25"),
            ("MATHSTAKE_STATE_FILE", "/var/lib/mathstake/state.json"),
            ("MATHSTAKE_LOG_FORMAT", "json"),
            ("MATHSTAKE_CLAIM_LEASE_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = NodeConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.sweep.interval_secs, 5);
        assert_eq!(config.sweep.rng_seed, Some(42));
        assert_eq!(config.sweep.claim_lease_secs, 600);
        assert_eq!(config.executor_config().timeout, Duration::from_millis(250));
        assert_eq!(config.ledger_config().reputation_rate, 0.25);
        assert_eq!(
            config.storage.state_file,
            PathBuf::from("/var/lib/mathstake/state.json")
        );
        assert_eq!(config.logging.format, "json");
        config.validate().unwrap();
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = NodeConfig::default();
        config.sweep.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.logging.format = "xml".into();
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.settlement.reputation_rate = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mathstake.toml");
        let mut config = NodeConfig::default();
        config.sweep.rng_seed = Some(7);
        config
            .logging
            .module_filters
            .insert("mathstake_sandbox".into(), "debug".into());
        config.save_to_file(&path).unwrap();

        assert_eq!(NodeConfig::from_file(&path).unwrap(), config);
    }
}
