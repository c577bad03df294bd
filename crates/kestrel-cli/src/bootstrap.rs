//! Assemble an [`AgentService`] and its plugins from a [`KestrelConfig`].

use std::sync::Arc;
use tracing::{error, info, warn};

use kestrel_cache::{MemoryCache, SqliteCache};
use kestrel_config::{CacheBackend, CacheConfig, Character, KestrelConfig};
use kestrel_core::{CacheService, KestrelError, Result};
use kestrel_llm::{LlmProvider, ModelClient, OpenAiProvider};
use kestrel_mentions::{HttpMentionSource, MentionsPlugin, MentionsSettings};
use kestrel_plugin::Plugin;
use kestrel_runtime::AgentService;

/// Open the configured cache backend, creating the SQLite directory if needed.
pub fn open_cache(config: &CacheConfig) -> Result<Arc<dyn CacheService>> {
    match config.backend {
        CacheBackend::Memory => Ok(Arc::new(MemoryCache::new())),
        CacheBackend::Sqlite => {
            let path = config.resolved_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Ok(Arc::new(SqliteCache::open(&path)?))
        }
    }
}

/// The character file named in `[agent]`, or the built-in persona.
pub fn load_character(config: &KestrelConfig) -> Result<Character> {
    match &config.agent.character_file {
        Some(path) if path.exists() => Character::load(path),
        Some(path) => {
            warn!(path = %path.display(), "character file not found, using default persona");
            Ok(Character::default())
        }
        None => Ok(Character::default()),
    }
}

/// Build the model client. A character that pins a provider or model wins
/// over `[services]` / `[agent]`.
pub fn build_model(config: &KestrelConfig, character: &Character) -> ModelClient {
    let provider_name = character
        .model_provider
        .as_deref()
        .unwrap_or(&config.services.model_provider);
    let model = character.model().unwrap_or(&config.agent.model);

    let provider: Arc<dyn LlmProvider> = match provider_name {
        "together" => Arc::new(OpenAiProvider::together(
            config.services.together_api_key.clone().unwrap_or_default(),
        )),
        _ => Arc::new(OpenAiProvider::new(
            config.services.openai_api_key.clone().unwrap_or_default(),
        )),
    };
    info!(provider = provider.name(), model, "model client configured");

    ModelClient::new(provider, model)
        .with_max_tokens(config.agent.max_tokens)
        .with_temperature(config.agent.temperature)
}

/// Plugins enabled by the config, in registration order.
pub fn build_plugins(config: &KestrelConfig) -> Result<Vec<Arc<dyn Plugin>>> {
    let mut plugins: Vec<Arc<dyn Plugin>> = Vec::new();

    let m = &config.mentions;
    if m.enabled {
        let token = config
            .services
            .twitter_bearer_token
            .clone()
            .ok_or_else(|| {
                KestrelError::Config("mentions are enabled but no bearer token is set".into())
            })?;
        let source =
            HttpMentionSource::new(token, m.user_id.clone()).with_base_url(m.api_base.clone());
        let settings = MentionsSettings {
            username: m.username.clone(),
            poll_interval: m.poll_interval(),
            max_results: m.max_results,
            dedup_capacity: m.dedup_capacity,
        };
        plugins.push(Arc::new(MentionsPlugin::new(settings, Arc::new(source))));
    }

    Ok(plugins)
}

/// Register `plugins` in order. A plugin whose `initialize` fails is logged
/// and left listed as failed; the others still register. Returns how many
/// registered cleanly.
pub async fn register_plugins(service: &AgentService, plugins: Vec<Arc<dyn Plugin>>) -> usize {
    let mut registered = 0;
    for plugin in plugins {
        let name = plugin.metadata().name.clone();
        match service.register_plugin(plugin).await {
            Ok(()) => registered += 1,
            Err(e) => error!(plugin = %name, error = %e, "plugin failed to register, continuing without it"),
        }
    }
    registered
}

/// A service with cache, model, and persona wired in. Plugins are not yet
/// registered.
pub fn build_service(config: &KestrelConfig) -> Result<AgentService> {
    let character = load_character(config)?;
    let cache = open_cache(&config.cache)?;
    let model = build_model(config, &character);
    Ok(AgentService::new(cache, model)
        .with_system_prompt(character.system_prompt())
        .with_max_iterations(config.agent.max_iterations as usize))
}
