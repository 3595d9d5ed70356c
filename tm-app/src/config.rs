//! Taskmate configuration loader.

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskmateConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub reminders: RemindersConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// OpenAI-compatible endpoint; defaults to api.openai.com.
    #[serde(default)]
    pub api_base: Option<String>,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_system_prompt() -> String {
    "You are Taskmate, a concise personal assistant that manages the user's to-dos and \
     reminders. Use the available functions to read and change state; never claim an action \
     you did not perform. Pass times to functions exactly as the user phrased them. If you \
     need the user's time zone, ask for it before calling set_timezone."
        .to_string()
}

fn default_temperature() -> f32 {
    0.2
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            system_prompt: default_system_prompt(),
            temperature: default_temperature(),
            api_base: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeysConfig {
    pub openai_api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_max_calls_per_turn")]
    pub max_calls_per_turn: usize,
    /// Identical consecutive calls that end the turn.
    #[serde(default = "default_max_identical_calls")]
    pub max_identical_calls: usize,
}

fn default_max_calls_per_turn() -> usize {
    5
}

fn default_max_identical_calls() -> usize {
    3
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_calls_per_turn: default_max_calls_per_turn(),
            max_identical_calls: default_max_identical_calls(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    #[serde(default = "default_log_result_chars")]
    pub log_result_chars: usize,
    /// Messages inspected when deciding whether `set_timezone` is warranted.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

fn default_max_rounds() -> usize {
    4
}

fn default_log_result_chars() -> usize {
    200
}

fn default_history_window() -> usize {
    6
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            log_result_chars: default_log_result_chars(),
            history_window: default_history_window(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemindersConfig {
    #[serde(default = "default_job_namespace")]
    pub job_namespace: String,
}

fn default_job_namespace() -> String {
    tm_jobs::DEFAULT_JOB_NAMESPACE.to_string()
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            job_namespace: default_job_namespace(),
        }
    }
}

impl TaskmateConfig {
    /// An explicit path must exist; without one the default path is used
    /// when present and built-in defaults otherwise.
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut cfg = match path {
            Some(path) => Self::read(&path).await?,
            None => {
                let path = default_config_path();
                if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    Self::read(&path).await?
                } else {
                    tracing::debug!(path = %path.display(), "no config file, using defaults");
                    Self::default()
                }
            }
        };

        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    async fn read(path: &Path) -> anyhow::Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("read config {}: {e}", path.display()))?;
        let cfg: TaskmateConfig = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = var("TASKMATE_MODEL") {
            self.general.model = v;
        }
        if let Some(v) = var("OPENAI_API_KEY") {
            self.keys.openai_api_key = Some(v);
        }
        if let Some(v) = var("TASKMATE_API_BASE") {
            self.general.api_base = Some(v);
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.general.model.trim().is_empty() {
            return Err(anyhow::anyhow!("general.model is required"));
        }
        if !(0.0..=2.0).contains(&self.general.temperature) {
            return Err(anyhow::anyhow!(
                "general.temperature must be between 0.0 and 2.0"
            ));
        }
        if self.gate.max_calls_per_turn == 0 {
            return Err(anyhow::anyhow!("gate.max_calls_per_turn must be > 0"));
        }
        if self.gate.max_identical_calls < 2 {
            return Err(anyhow::anyhow!("gate.max_identical_calls must be >= 2"));
        }
        if self.agent.max_rounds == 0 {
            return Err(anyhow::anyhow!("agent.max_rounds must be > 0"));
        }
        if self.reminders.job_namespace.trim().is_empty() {
            return Err(anyhow::anyhow!("reminders.job_namespace must not be empty"));
        }
        Ok(())
    }

    pub fn api_key(&self) -> Option<String> {
        self.keys.openai_api_key.clone().filter(|s| !s.is_empty())
    }
}

pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".taskmate").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    async fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, contents).await.expect("write config");
        (dir, path)
    }

    #[tokio::test]
    async fn partial_file_fills_defaults() {
        let (_dir, path) = write_config(
            r#"
[general]
model = "gpt-4.1-mini"

[gate]
max_calls_per_turn = 8
"#,
        )
        .await;
        let cfg = TaskmateConfig::read(&path).await.expect("load");
        assert_eq!(cfg.general.model, "gpt-4.1-mini");
        assert_eq!(cfg.gate.max_calls_per_turn, 8);
        assert_eq!(cfg.gate.max_identical_calls, 3);
        assert_eq!(cfg.agent.max_rounds, 4);
        assert_eq!(cfg.agent.history_window, 6);
        assert_eq!(cfg.reminders.job_namespace, "reminders");
        cfg.validate().expect("valid");
    }

    #[tokio::test]
    async fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = TaskmateConfig::load(Some(dir.path().join("nope.toml")))
            .await
            .expect_err("missing file");
        assert!(err.to_string().contains("read config"));
    }

    #[tokio::test]
    async fn malformed_toml_names_the_file() {
        let (_dir, path) = write_config("[general\nmodel=").await;
        let err = TaskmateConfig::read(&path).await.expect_err("bad toml");
        assert!(err.to_string().contains("parse config"));
    }

    #[test]
    fn env_overrides_skip_blank_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TASKMATE_MODEL", "gpt-4o"),
            ("OPENAI_API_KEY", "   "),
            ("TASKMATE_API_BASE", "http://localhost:11434/v1"),
        ]);
        let mut cfg = TaskmateConfig::default();
        cfg.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.general.model, "gpt-4o");
        assert_eq!(cfg.api_key(), None);
        assert_eq!(cfg.general.api_base.as_deref(), Some("http://localhost:11434/v1"));
    }

    #[test]
    fn validation_rejects_degenerate_limits() {
        let mut cfg = TaskmateConfig::default();
        cfg.gate.max_identical_calls = 1;
        assert!(cfg.validate().is_err());

        let mut cfg = TaskmateConfig::default();
        cfg.gate.max_calls_per_turn = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = TaskmateConfig::default();
        cfg.general.temperature = 3.5;
        assert!(cfg.validate().is_err());
    }
}
