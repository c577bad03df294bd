use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use kestrel_config::KestrelConfig;
use kestrel_core::{Message, Result, handler_fn};

use crate::bootstrap;

pub(super) async fn cmd_start(config: KestrelConfig, no_server: bool) -> Result<()> {
    println!("Kestrel v{}", env!("CARGO_PKG_VERSION"));
    println!("   Model: {}", config.agent.model);
    println!("   Cache: {:?}", config.cache.backend);
    println!();

    if config.services.model_api_key().is_none() {
        eprintln!("No API key for '{}'. Model-backed actions will fail.", config.services.model_provider);
        eprintln!("   Set it in [services] in kestrel.toml, or export OPENAI_API_KEY / TOGETHER_API_KEY");
        eprintln!();
    }

    let service = Arc::new(bootstrap::build_service(&config)?);

    // Echo bus traffic so an operator can see what the plugins produce.
    service.bus().subscribe(handler_fn("console", |msg: Arc<Message>| async move {
        match msg.meta_str("author") {
            Some(author) => println!("[{}] @{}: {}", msg.source, author, msg.content),
            None => println!("[{}] {}", msg.source, msg.content),
        }
        Ok(())
    }));

    bootstrap::register_plugins(&service, bootstrap::build_plugins(&config)?).await;
    service.start().await?;

    for status in service.plugin_status() {
        match status.error {
            Some(ref e) => println!("   {} ({}): {}", status.name, status.state, e),
            None => println!("   {} ({})", status.name, status.state),
        }
    }

    let shutdown = CancellationToken::new();
    let server = if config.server.enabled && !no_server {
        let service = Arc::clone(&service);
        let listen = config.server.listen.clone();
        let token = shutdown.clone();
        println!("   API: http://{listen}");
        Some(tokio::spawn(async move {
            if let Err(e) =
                kestrel_server::start_server(service, &listen, async move { token.cancelled().await })
                    .await
            {
                error!(error = %e, "API server failed");
            }
        }))
    } else {
        None
    };

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    shutdown.cancel();
    service.stop().await?;
    if let Some(handle) = server {
        let _ = handle.await;
    }
    Ok(())
}
