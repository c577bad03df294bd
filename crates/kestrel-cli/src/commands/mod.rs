use clap::{Parser, Subcommand};
use std::path::PathBuf;

use kestrel_config::{ConfigLoader, KestrelConfig, WarningSeverity};
use kestrel_core::{KestrelError, Result};

use crate::logging;

mod cache;
mod plugins;
mod start;

/// Kestrel: a pluggable agent runtime
#[derive(Parser)]
#[command(name = "kestrel", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to kestrel.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the agent: plugins, message bus, and API server
    Start {
        /// Don't start the API server
        #[arg(long)]
        no_server: bool,
    },
    /// Ask a running agent for its health and plugins
    Status,
    /// Show version and build info
    Version,
    /// Show the effective configuration (secrets masked)
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate the configuration and report problems
    Doctor,
    /// List the plugins enabled by the configuration and their actions
    Plugins,
    /// Inspect the plugin state cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached entries with their tags
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the value stored under a key
    Get { key: String },
    /// Remove a key
    Delete { key: String },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        let level = logging::resolve_level(
            self.verbose,
            self.quiet,
            self.log_level.as_deref(),
            &config.logging.level,
        );
        logging::init(level, &config.logging.format);

        match self.command {
            Commands::Start { no_server } => start::cmd_start(config, no_server).await,
            Commands::Status => Self::cmd_status(config).await,
            Commands::Version => Self::cmd_version(),
            Commands::Config { json } => Self::cmd_config(config, json),
            Commands::Doctor => Self::cmd_doctor(config, &config_loader),
            Commands::Plugins => plugins::cmd_plugins(config),
            Commands::Cache { action } => cache::cmd_cache(config, action).await,
        }
    }

    async fn cmd_status(config: KestrelConfig) -> Result<()> {
        let listen = &config.server.listen;
        println!("Checking status at http://{listen}...");

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .unwrap_or_default();

        let health = match fetch_json(&client, &format!("http://{listen}/health")).await {
            Ok(v) => v,
            Err(_) => {
                println!("Agent is not running at {listen}");
                return Ok(());
            }
        };
        println!(
            "  status: {}  uptime: {}s",
            health["status"].as_str().unwrap_or("unknown"),
            health["uptime"].as_u64().unwrap_or(0)
        );

        let plugins = fetch_json(&client, &format!("http://{listen}/api/v1/plugins")).await?;
        for p in plugins.as_array().into_iter().flatten() {
            println!(
                "  {:<20} {:<12} {}",
                p["name"].as_str().unwrap_or("?"),
                p["state"].as_str().unwrap_or("?"),
                p["error"].as_str().unwrap_or("")
            );
        }
        Ok(())
    }

    fn cmd_config(config: KestrelConfig, json: bool) -> Result<()> {
        let config = masked(config);
        let rendered = if json {
            serde_json::to_string_pretty(&config)?
        } else {
            toml::to_string_pretty(&config).map_err(|e| KestrelError::Config(e.to_string()))?
        };
        println!("{rendered}");
        Ok(())
    }

    fn cmd_doctor(config: KestrelConfig, loader: &ConfigLoader) -> Result<()> {
        println!("Kestrel doctor: {}", loader.path().display());
        println!();

        let warnings = match config.validate() {
            Ok(w) => w,
            Err(e) => {
                println!("{e}");
                return Ok(());
            }
        };

        let mut warn_count = 0;
        let mut info_count = 0;
        for w in &warnings {
            println!("  {w}");
            match w.severity {
                WarningSeverity::Warning => warn_count += 1,
                WarningSeverity::Info => info_count += 1,
                WarningSeverity::Error => {}
            }
        }
        if warnings.is_empty() {
            println!("  no problems found");
        }
        println!();
        println!("  {warn_count} warnings, {info_count} notes");
        Ok(())
    }

    fn cmd_version() -> Result<()> {
        println!("Kestrel v{}", env!("CARGO_PKG_VERSION"));
        println!("   Target: {}", std::env::consts::ARCH);
        println!("   OS: {}", std::env::consts::OS);
        #[cfg(debug_assertions)]
        println!("   Profile: debug");
        #[cfg(not(debug_assertions))]
        println!("   Profile: release");
        Ok(())
    }
}

async fn fetch_json(client: &reqwest::Client, url: &str) -> Result<serde_json::Value> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| KestrelError::Other(e.into()))?;
    if !resp.status().is_success() {
        return Err(KestrelError::Other(anyhow::anyhow!(
            "{url} returned {}",
            resp.status()
        )));
    }
    resp.json()
        .await
        .map_err(|e| KestrelError::Other(e.into()))
}

const MASK: &str = "********";

/// Copy of the config with credentials replaced by a mask.
fn masked(mut config: KestrelConfig) -> KestrelConfig {
    let s = &mut config.services;
    for key in [
        &mut s.openai_api_key,
        &mut s.together_api_key,
        &mut s.twitter_bearer_token,
    ] {
        if key.is_some() {
            *key = Some(MASK.into());
        }
    }
    config
}
