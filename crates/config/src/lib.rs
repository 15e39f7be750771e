use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use reagent_core::AgentError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    pub working_directory: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "Reagent".to_string(),
            working_directory: ".".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions base URL.
    pub base_url: String,
    /// Environment variable holding the API key.  The key itself never lives
    /// in the config file.
    pub api_key_env: String,
    pub model: String,
    pub temperature: f32,
    /// Temperature ceiling for the tool-use recovery turn.
    pub recovery_temperature: f32,
    pub max_tokens_per_response: u32,
    /// Lower response cap applied on turns where tools are offered.
    pub tool_max_tokens: u32,
    pub rate_limit_rpm: u32,
    pub api_max_retries: u32,
    pub api_retry_delay_seconds: f64,
    pub api_timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key_env: "REAGENT_API_KEY".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            temperature: 0.2,
            recovery_temperature: 0.1,
            max_tokens_per_response: 1024,
            tool_max_tokens: 768,
            rate_limit_rpm: 30,
            api_max_retries: 3,
            api_retry_delay_seconds: 1.0,
            api_timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonerConfig {
    pub max_iterations: u32,
    pub max_context_messages: usize,
    pub max_tokens_per_task: u64,
    pub tool_output_truncate_chars: usize,
    /// Optional hard wall-clock deadline per task, in seconds.  `0` disables.
    pub task_deadline_seconds: u64,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_context_messages: 20,
            max_tokens_per_task: 20_000,
            tool_output_truncate_chars: 500,
            task_deadline_seconds: 0,
        }
    }
}

/// Governs when a tool invocation must be confirmed by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationMode {
    /// Execute everything without asking.
    Yes,
    /// Ask before every tool call.
    No,
    /// Ask only for mutating or privileged calls.
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub confirmation_mode: ConfirmationMode,
    /// Seconds to wait for a confirmation answer before denying.
    pub confirmation_timeout_seconds: u64,
    pub sandbox_mode: bool,
    pub allowed_extensions: BTreeSet<String>,
    pub blocked_paths: BTreeSet<String>,
    pub max_file_size_mb: u64,
    pub command_whitelist: BTreeSet<String>,
    pub superuser_mode: bool,
    pub require_sudo_confirmation: bool,
    pub sudo_whitelist: BTreeSet<String>,
    /// Commands rejected unconditionally, even under superuser mode.
    pub dangerous_commands: BTreeSet<String>,
    pub tool_timeout_seconds: u64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        let set = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            confirmation_mode: ConfirmationMode::Auto,
            confirmation_timeout_seconds: 60,
            sandbox_mode: true,
            allowed_extensions: set(&[
                "txt", "md", "py", "rs", "js", "ts", "html", "css", "json", "yaml", "yml",
                "toml", "sh", "csv", "log",
            ]),
            blocked_paths: set(&["/etc", "/root", "/boot", "/proc", "/sys"]),
            max_file_size_mb: 10,
            command_whitelist: set(&[
                "ls", "cat", "head", "tail", "grep", "find", "wc", "echo", "pwd", "date",
                "whoami", "uname", "curl", "ping", "python3", "pip",
            ]),
            superuser_mode: false,
            require_sudo_confirmation: true,
            sudo_whitelist: set(&["apt", "apt-get", "systemctl", "docker"]),
            dangerous_commands: set(&[
                "rm -rf /", "mkfs", "dd if=", ":(){ :|:& };:", "shutdown", "reboot",
                "chmod -R 777 /",
            ]),
            tool_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Root directory for persisted collections and the rule list.
    pub data_dir: String,
    /// Directory for the append-only error audit log.
    pub error_log_dir: String,
    /// Housekeeper cadence, counted in finished tasks.
    pub hygiene_interval_tasks: u64,
    pub max_age_days: i64,
    /// Per-collection size caps applied by the housekeeper.
    pub max_experiences: usize,
    pub max_lessons: usize,
    pub max_strategies: usize,
    pub max_facts: usize,
    pub max_errors: usize,
    /// Retrieval top-k per semantic collection.
    pub top_facts: usize,
    pub top_experiences: usize,
    pub top_lessons: usize,
    pub top_strategies: usize,
    /// Inputs shorter than this many chars are classified USELESS outright.
    pub min_task_chars: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            data_dir: ".memory".to_string(),
            error_log_dir: ".errors".to_string(),
            hygiene_interval_tasks: 10,
            max_age_days: 30,
            max_experiences: 500,
            max_lessons: 300,
            max_strategies: 200,
            max_facts: 200,
            max_errors: 1000,
            top_facts: 5,
            top_experiences: 3,
            top_lessons: 3,
            top_strategies: 2,
            min_task_chars: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub llm: LlmConfig,
    pub reasoner: ReasonerConfig,
    pub safety: SafetyConfig,
    pub memory: MemoryConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        if let Ok(value) = env::var("REAGENT_BASE_URL") {
            if !value.is_empty() {
                config.llm.base_url = value;
            }
        }
        if let Ok(value) = env::var("REAGENT_MODEL") {
            if !value.is_empty() {
                config.llm.model = value;
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    /// Resolve the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        env::var(&self.llm.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }

    /// Fatal-at-startup validation of the configuration surface.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.llm.model.trim().is_empty() {
            return Err(AgentError::configuration("llm.model must not be empty"));
        }
        if self.llm.base_url.trim().is_empty() {
            return Err(AgentError::configuration("llm.base_url must not be empty"));
        }
        if self.reasoner.max_iterations == 0 {
            return Err(AgentError::configuration("reasoner.max_iterations must be >= 1"));
        }
        if self.reasoner.max_context_messages < 4 {
            return Err(AgentError::configuration(
                "reasoner.max_context_messages must be >= 4 (system, task, one turn)",
            ));
        }
        if self.reasoner.max_tokens_per_task == 0 {
            return Err(AgentError::configuration("reasoner.max_tokens_per_task must be >= 1"));
        }
        if self.llm.max_tokens_per_response == 0 {
            return Err(AgentError::configuration("llm.max_tokens_per_response must be >= 1"));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(AgentError::configuration("llm.temperature must be within [0.0, 2.0]"));
        }
        if self.safety.tool_timeout_seconds == 0 {
            return Err(AgentError::configuration("safety.tool_timeout_seconds must be >= 1"));
        }
        if self.memory.hygiene_interval_tasks == 0 {
            return Err(AgentError::configuration(
                "memory.hygiene_interval_tasks must be >= 1",
            ));
        }
        let workdir = Path::new(&self.agent.working_directory);
        if !workdir.exists() {
            return Err(AgentError::configuration(format!(
                "agent.working_directory does not exist: {}",
                workdir.display()
            ))
            .with_detail("path", self.agent.working_directory.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.reasoner.max_iterations, 10);
        assert_eq!(config.reasoner.max_context_messages, 20);
        assert_eq!(config.reasoner.max_tokens_per_task, 20_000);
        assert_eq!(config.reasoner.tool_output_truncate_chars, 500);
        assert_eq!(config.llm.max_tokens_per_response, 1024);
        assert_eq!(config.llm.tool_max_tokens, 768);
        assert_eq!(config.safety.confirmation_mode, ConfirmationMode::Auto);
        assert_eq!(config.memory.hygiene_interval_tasks, 10);
        assert!(!config.safety.superuser_mode);
        assert!(config.safety.require_sudo_confirmation);
    }

    #[test]
    fn validate_accepts_defaults() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_budget() {
        let mut config = AppConfig::default();
        config.reasoner.max_tokens_per_task = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind, reagent_core::ErrorKind::Configuration);
    }

    #[test]
    fn validate_rejects_empty_model() {
        let mut config = AppConfig::default();
        config.llm.model = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_missing_workdir() {
        let mut config = AppConfig::default();
        config.agent.working_directory = "/definitely/not/here".to_string();
        let err = config.validate().unwrap_err();
        assert_eq!(err.detail("path"), Some("/definitely/not/here"));
    }

    #[test]
    fn toml_roundtrip_preserves_sections() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.agent.name = "Tester".to_string();
        config.llm.rate_limit_rpm = 7;
        config.safety.confirmation_mode = ConfirmationMode::No;
        config.save_to(&path)?;

        let loaded = AppConfig::load_from(&path)?;
        assert_eq!(loaded.agent.name, "Tester");
        assert_eq!(loaded.llm.rate_limit_rpm, 7);
        assert_eq!(loaded.safety.confirmation_mode, ConfirmationMode::No);
        Ok(())
    }

    #[test]
    fn missing_file_yields_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = AppConfig::load_from(dir.path().join("nope.toml"))?;
        assert_eq!(config.agent.name, "Reagent");
        Ok(())
    }

    #[test]
    fn partial_toml_fills_remaining_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("partial.toml");
        fs::write(&path, "[reasoner]\nmax_iterations = 3\n")?;
        let config = AppConfig::load_from(&path)?;
        assert_eq!(config.reasoner.max_iterations, 3);
        assert_eq!(config.reasoner.max_context_messages, 20);
        Ok(())
    }
}
