use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration, mapped from `kestrel.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KestrelConfig {
    pub agent: AgentConfig,
    pub cache: CacheConfig,
    pub mentions: MentionsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub services: ServicesConfig,
}

// ── Agent ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Provider model id, e.g. "gpt-4o-mini".
    pub model: String,
    /// JSON character file describing the agent's persona.
    pub character_file: Option<PathBuf>,
    pub max_tokens: u32,
    /// Temperature (0.0 - 2.0).
    pub temperature: f32,
    /// Model round-trips per turn before the action loop gives up.
    pub max_iterations: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            character_file: None,
            max_tokens: 1024,
            temperature: 0.7,
            max_iterations: 5,
        }
    }
}

// ── Cache ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// SQLite file. Defaults to `~/.kestrel/cache.db`.
    pub path: Option<PathBuf>,
}

impl CacheConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".kestrel")
                .join("cache.db")
        })
    }
}

// ── Mentions ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MentionsConfig {
    pub enabled: bool,
    /// Account handle; also namespaces the cursor in the cache.
    pub username: String,
    /// Numeric account id used by the mentions endpoint.
    pub user_id: String,
    pub poll_interval_secs: u64,
    /// Page size per fetch (the API accepts 5-100).
    pub max_results: u32,
    /// Seen-id ceiling for the dedup log.
    pub dedup_capacity: usize,
    pub api_base: String,
}

impl Default for MentionsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            username: String::new(),
            user_id: String::new(),
            poll_interval_secs: 600,
            max_results: 20,
            dedup_capacity: 1000,
            api_base: "https://api.twitter.com".into(),
        }
    }
}

impl MentionsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

// ── Server ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    /// HTTP listen address.
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: "127.0.0.1:3000".into(),
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Services ───────────────────────────────────────────────────

/// External service credentials. Environment variables fill in any key the
/// file leaves unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// "openai" or "together".
    pub model_provider: String,
    /// Also read from OPENAI_API_KEY.
    pub openai_api_key: Option<String>,
    /// Also read from TOGETHER_API_KEY.
    pub together_api_key: Option<String>,
    /// Also read from TWITTER_BEARER_TOKEN.
    pub twitter_bearer_token: Option<String>,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            model_provider: "openai".into(),
            openai_api_key: None,
            together_api_key: None,
            twitter_bearer_token: None,
        }
    }
}

impl ServicesConfig {
    /// API key for the configured model provider.
    pub fn model_api_key(&self) -> Option<&str> {
        match self.model_provider.as_str() {
            "together" => self.together_api_key.as_deref(),
            _ => self.openai_api_key.as_deref(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "{label}: {}: {}", self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, " ({h})")?;
        }
        Ok(())
    }
}

const PROVIDERS: [&str; 2] = ["openai", "together"];
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 3] = ["pretty", "json", "compact"];

impl KestrelConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();
        let mut push = |field: &str, severity, message: String, hint: Option<&str>| {
            warnings.push(ConfigWarning {
                field: field.into(),
                message,
                severity,
                hint: hint.map(str::to_string),
            });
        };

        // ── Agent ───
        if self.agent.model.trim().is_empty() {
            push(
                "agent.model",
                WarningSeverity::Error,
                "model is empty".into(),
                Some("Set to e.g. 'gpt-4o-mini'"),
            );
        }
        if !(0.0..=2.0).contains(&self.agent.temperature) {
            push(
                "agent.temperature",
                WarningSeverity::Error,
                format!("temperature {} is out of range", self.agent.temperature),
                Some("Temperature must be between 0.0 and 2.0"),
            );
        }
        if self.agent.max_tokens == 0 {
            push(
                "agent.max_tokens",
                WarningSeverity::Error,
                "max_tokens is 0, the model cannot produce output".into(),
                Some("Set to e.g. 1024"),
            );
        }
        if self.agent.max_iterations == 0 {
            push(
                "agent.max_iterations",
                WarningSeverity::Error,
                "max_iterations is 0, no model turn can run".into(),
                None,
            );
        }
        if let Some(ref path) = self.agent.character_file {
            if !path.exists() {
                push(
                    "agent.character_file",
                    WarningSeverity::Warning,
                    format!("{} does not exist", path.display()),
                    Some("The default persona will be used"),
                );
            }
        }

        // ── Services ───
        if !PROVIDERS.contains(&self.services.model_provider.as_str()) {
            push(
                "services.model_provider",
                WarningSeverity::Error,
                format!("unknown provider '{}'", self.services.model_provider),
                Some("Valid values: openai, together"),
            );
        } else if self.services.model_api_key().is_none() {
            push(
                "services.model_provider",
                WarningSeverity::Warning,
                format!("no API key set for '{}'", self.services.model_provider),
                Some("Set it in [services] or via OPENAI_API_KEY / TOGETHER_API_KEY"),
            );
        }

        // ── Mentions ───
        let m = &self.mentions;
        if m.enabled {
            if m.username.trim().is_empty() {
                push(
                    "mentions.username",
                    WarningSeverity::Error,
                    "mentions are enabled but no username is set".into(),
                    None,
                );
            }
            if m.user_id.trim().is_empty() {
                push(
                    "mentions.user_id",
                    WarningSeverity::Error,
                    "mentions are enabled but no user_id is set".into(),
                    Some("The numeric account id, not the handle"),
                );
            }
            if self.services.twitter_bearer_token.is_none() {
                push(
                    "services.twitter_bearer_token",
                    WarningSeverity::Error,
                    "mentions are enabled but no bearer token is set".into(),
                    Some("Set it in [services] or via TWITTER_BEARER_TOKEN"),
                );
            }
        }
        if m.poll_interval_secs == 0 {
            push(
                "mentions.poll_interval_secs",
                WarningSeverity::Error,
                "poll interval must be positive".into(),
                None,
            );
        } else if m.poll_interval_secs < 60 {
            push(
                "mentions.poll_interval_secs",
                WarningSeverity::Warning,
                format!("polling every {}s will hit rate limits", m.poll_interval_secs),
                Some("The default is 600"),
            );
        }
        if !(5..=100).contains(&m.max_results) {
            push(
                "mentions.max_results",
                WarningSeverity::Warning,
                format!("max_results {} will be clamped to 5-100", m.max_results),
                None,
            );
        }
        if m.dedup_capacity == 0 {
            push(
                "mentions.dedup_capacity",
                WarningSeverity::Error,
                "dedup_capacity must be at least 1".into(),
                None,
            );
        }

        // ── Server ───
        if self.server.enabled && self.server.listen.parse::<SocketAddr>().is_err() {
            push(
                "server.listen",
                WarningSeverity::Error,
                format!("'{}' is not a socket address", self.server.listen),
                Some("Use host:port, e.g. 127.0.0.1:3000"),
            );
        }

        // ── Logging ───
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            push(
                "logging.level",
                WarningSeverity::Warning,
                format!("unknown log level '{}'", self.logging.level),
                Some("Valid: trace, debug, info, warn, error"),
            );
        }
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            push(
                "logging.format",
                WarningSeverity::Warning,
                format!("unknown log format '{}'", self.logging.format),
                Some("Valid: pretty, json, compact"),
            );
        }

        // Check for hard errors
        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
