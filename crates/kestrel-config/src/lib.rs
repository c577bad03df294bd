//! # kestrel-config
//!
//! Configuration for the Kestrel runtime. Reads `kestrel.toml`, then applies
//! environment overrides, then validates. Character files (JSON persona
//! descriptions) are loaded separately and turned into a system prompt.

pub mod character;
pub mod loader;
pub mod schema;

pub use character::Character;
pub use loader::ConfigLoader;
pub use schema::{
    AgentConfig, CacheBackend, CacheConfig, ConfigWarning, KestrelConfig, LoggingConfig,
    MentionsConfig, ServerConfig, ServicesConfig, WarningSeverity,
};
