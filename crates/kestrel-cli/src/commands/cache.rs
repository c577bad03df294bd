use kestrel_config::KestrelConfig;
use kestrel_core::Result;

use super::CacheAction;
use crate::bootstrap;

pub(super) async fn cmd_cache(config: KestrelConfig, action: CacheAction) -> Result<()> {
    let cache = bootstrap::open_cache(&config.cache)?;

    match action {
        CacheAction::List { json } => {
            let entries = cache.entries().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }
            if entries.is_empty() {
                println!("Cache is empty ({} backend).", cache.backend());
                return Ok(());
            }
            for entry in entries {
                let kind = entry.tag.as_ref().map(|t| t.kind.as_str()).unwrap_or("-");
                println!(
                    "{:<40} {:<20} {}",
                    entry.key,
                    kind,
                    entry.updated_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        CacheAction::Get { key } => match cache.get(&key).await? {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => println!("No entry for '{key}'"),
        },
        CacheAction::Delete { key } => {
            if cache.delete(&key).await? {
                println!("Deleted '{key}'");
            } else {
                println!("No entry for '{key}'");
            }
        }
    }
    Ok(())
}
