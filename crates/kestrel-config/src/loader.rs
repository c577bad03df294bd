use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use kestrel_core::{KestrelError, Result};

use crate::schema::KestrelConfig;

const FILE_NAME: &str = "kestrel.toml";

/// Loads the Kestrel configuration and keeps a shared copy for reloads.
pub struct ConfigLoader {
    config: Arc<RwLock<KestrelConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > KESTREL_CONFIG env >
    /// ./kestrel.toml (when present) > ~/.kestrel/kestrel.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        Self::resolve_path_with(explicit, |key| std::env::var(key).ok())
    }

    pub fn resolve_path_with(
        explicit: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Some(p) = env("KESTREL_CONFIG") {
            return PathBuf::from(p);
        }
        let local = PathBuf::from(FILE_NAME);
        if local.exists() {
            return local;
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".kestrel")
            .join(FILE_NAME)
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Like [`load`](Self::load) with a custom environment lookup.
    pub fn load_with(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String> + Copy,
    ) -> Result<Self> {
        let config_path = Self::resolve_path_with(path, env);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            read_file(&config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            KestrelConfig::default()
        };

        let config = apply_env_overrides(config, env);

        // Log warnings, fail on errors
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => return Err(KestrelError::Config(e)),
        }

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> KestrelConfig {
        self.config.read().clone()
    }

    pub fn shared(&self) -> Arc<RwLock<KestrelConfig>> {
        Arc::clone(&self.config)
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Re-read the file. The current config is kept if the new one fails to
    /// parse or validate.
    pub fn reload(&self) -> Result<()> {
        if !self.config_path.exists() {
            return Err(KestrelError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let new_config = apply_env_overrides(read_file(&self.config_path)?, |key| {
            std::env::var(key).ok()
        });
        new_config.validate().map_err(KestrelError::Config)?;
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<KestrelConfig> {
    let raw = std::fs::read_to_string(path)?;
    toml::from_str::<KestrelConfig>(&raw).map_err(|e| {
        KestrelError::Config(format!("failed to parse {}: {}", path.display(), e))
    })
}

/// Apply env var overrides (KESTREL_AGENT_MODEL, KESTREL_LOG_LEVEL, ...).
///
/// Plain settings are overridden by the environment. API keys work the
/// other way round: the file wins and the environment only fills gaps.
pub fn apply_env_overrides(
    mut config: KestrelConfig,
    env: impl Fn(&str) -> Option<String>,
) -> KestrelConfig {
    if let Some(v) = env("KESTREL_AGENT_MODEL") {
        config.agent.model = v;
    }
    if let Some(v) = env("KESTREL_LOG_LEVEL") {
        config.logging.level = v;
    }
    if let Some(v) = env("KESTREL_SERVER_LISTEN") {
        config.server.listen = v;
    }
    if let Some(v) = env("KESTREL_MODEL_PROVIDER") {
        config.services.model_provider = v;
    }

    let services = &mut config.services;
    if services.openai_api_key.is_none() {
        services.openai_api_key = env("OPENAI_API_KEY");
    }
    if services.together_api_key.is_none() {
        services.together_api_key = env("TOGETHER_API_KEY");
    }
    if services.twitter_bearer_token.is_none() {
        services.twitter_bearer_token = env("TWITTER_BEARER_TOKEN");
    }
    config
}
