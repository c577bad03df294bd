use async_trait::async_trait;
use std::sync::Arc;

use kestrel_core::{Message, MessageHandler, Result};
use kestrel_plugin::Plugin;

/// Subscribes a plugin's `handle_message` to the bus on its behalf.
pub(crate) struct PluginMessageHandler {
    name: String,
    plugin: Arc<dyn Plugin>,
}

impl PluginMessageHandler {
    pub(crate) fn new(plugin: Arc<dyn Plugin>) -> Arc<dyn MessageHandler> {
        Arc::new(Self {
            name: plugin.metadata().name.clone(),
            plugin,
        })
    }
}

#[async_trait]
impl MessageHandler for PluginMessageHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, message: Arc<Message>) -> Result<()> {
        self.plugin.handle_message(message).await
    }
}
