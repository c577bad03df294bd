use kestrel_config::KestrelConfig;
use kestrel_core::Result;

use crate::bootstrap;

pub(super) fn cmd_plugins(config: KestrelConfig) -> Result<()> {
    let plugins = bootstrap::build_plugins(&config)?;
    if plugins.is_empty() {
        println!("No plugins enabled. Enable one in kestrel.toml, e.g. [mentions] enabled = true");
        return Ok(());
    }

    for plugin in plugins {
        let meta = plugin.metadata();
        println!("{} v{}: {}", meta.name, meta.version, meta.description);
        for action in plugin.actions() {
            println!(
                "   {:<20} [{}] {}",
                action.name(),
                action.handler.kind(),
                action.spec.description
            );
        }
    }
    Ok(())
}
