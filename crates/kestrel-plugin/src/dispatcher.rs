use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use kestrel_core::{KestrelError, Result, Tool, ToolCall, ToolResult};

use crate::action::{ActionHandler, ExecutionContext, PluginAction};
use crate::plugin::PluginContext;

/// Joins plugin and action names in model-facing tool names.
pub const TOOL_SEPARATOR: &str = "__";

/// Model-facing name of `plugin`'s `action`.
pub fn tool_name(plugin: &str, action: &str) -> String {
    format!("{plugin}{TOOL_SEPARATOR}{action}")
}

/// An action together with the plugin that owns it.
#[derive(Debug, Clone)]
pub struct ResolvedAction {
    pub plugin: String,
    pub action: PluginAction,
}

/// Result of running a model tool call through the dispatcher.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    /// Owning plugin, when the tool name resolved.
    pub plugin: Option<String>,
    pub result: ToolResult,
}

struct PluginActions {
    plugin: String,
    actions: BTreeMap<String, PluginAction>,
}

/// Dispatch table from `(plugin?, action)` to a [`PluginAction`].
///
/// Built at registration time; every lookup goes through [`resolve`](Self::resolve).
/// Unqualified lookups search plugins in registration order and take the
/// first match.
pub struct ActionDispatcher {
    ctx: PluginContext,
    table: RwLock<Vec<PluginActions>>,
}

impl ActionDispatcher {
    pub fn new(ctx: PluginContext) -> Self {
        Self {
            ctx,
            table: RwLock::new(Vec::new()),
        }
    }

    /// Install `plugin`'s actions. Re-registering a plugin replaces its
    /// table in place, keeping its position in the search order.
    pub fn register(&self, plugin: &str, actions: Vec<PluginAction>) -> usize {
        let mut map = BTreeMap::new();
        for action in actions {
            let name = action.spec.name.clone();
            if map.insert(name.clone(), action).is_some() {
                warn!(plugin, action = %name, "duplicate action name, keeping the last one");
            }
        }
        let count = map.len();

        let mut table = self.table.write();
        match table.iter_mut().find(|e| e.plugin == plugin) {
            Some(entry) => entry.actions = map,
            None => table.push(PluginActions {
                plugin: plugin.to_string(),
                actions: map,
            }),
        }
        debug!(plugin, count, "registered actions");
        count
    }

    pub fn unregister(&self, plugin: &str) -> bool {
        let mut table = self.table.write();
        let before = table.len();
        table.retain(|e| e.plugin != plugin);
        table.len() != before
    }

    pub fn resolve(&self, plugin: Option<&str>, action: &str) -> Result<ResolvedAction> {
        let table = self.table.read();
        let found = match plugin {
            Some(p) => table
                .iter()
                .find(|e| e.plugin == p)
                .and_then(|e| e.actions.get(action).map(|a| (&e.plugin, a))),
            None => table
                .iter()
                .find_map(|e| e.actions.get(action).map(|a| (&e.plugin, a))),
        };
        found
            .map(|(plugin, action)| ResolvedAction {
                plugin: plugin.clone(),
                action: action.clone(),
            })
            .ok_or_else(|| KestrelError::ActionNotFound {
                plugin: plugin.map(str::to_string),
                action: action.to_string(),
            })
    }

    /// Resolve a model-facing name, either `plugin__action` or a bare action.
    ///
    /// Plugin names may themselves contain `_` or `__`, so every separator
    /// position is tried, leftmost first, until one names a registered
    /// action. A name that matches no split falls back to a bare lookup.
    pub fn resolve_tool(&self, name: &str) -> Result<ResolvedAction> {
        let mut first_err = None;
        for (i, _) in name.match_indices('_') {
            if !name[i..].starts_with(TOOL_SEPARATOR) {
                continue;
            }
            let (plugin, action) = (&name[..i], &name[i + TOOL_SEPARATOR.len()..]);
            match self.resolve(Some(plugin), action) {
                Ok(resolved) => return Ok(resolved),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        match (self.resolve(None, name), first_err) {
            (Ok(resolved), _) => Ok(resolved),
            (Err(_), Some(e)) | (Err(e), None) => Err(e),
        }
    }

    /// Every registered action as a model tool, in registration order.
    pub fn tools(&self) -> Vec<Tool> {
        self.table
            .read()
            .iter()
            .flat_map(|entry| {
                entry.actions.values().map(|a| Tool {
                    name: tool_name(&entry.plugin, &a.spec.name),
                    description: a.spec.description.clone(),
                    parameters: a.spec.input_schema.to_json_schema(),
                    provider: Some(entry.plugin.clone()),
                })
            })
            .collect()
    }

    /// Names of `plugin`'s registered actions.
    pub fn actions_of(&self, plugin: &str) -> Vec<String> {
        self.table
            .read()
            .iter()
            .find(|e| e.plugin == plugin)
            .map(|e| e.actions.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn action_count(&self) -> usize {
        self.table.read().iter().map(|e| e.actions.len()).sum()
    }

    /// Resolve, validate, and run an action.
    pub async fn execute(&self, plugin: Option<&str>, action: &str, input: Value) -> Result<Value> {
        let resolved = self.resolve(plugin, action)?;
        self.run(resolved, input, None).await
    }

    /// Run a model-requested tool call. Every failure, including an unknown
    /// tool, comes back as an error result for the model to read.
    pub async fn execute_tool_call(&self, call: &ToolCall) -> ToolOutcome {
        let resolved = match self.resolve_tool(&call.tool_name) {
            Ok(r) => r,
            Err(e) => {
                warn!(tool = %call.tool_name, "model requested unknown tool");
                return ToolOutcome {
                    plugin: None,
                    result: ToolResult::error(&call.id, e.to_string()),
                };
            }
        };
        let plugin = resolved.plugin.clone();
        let result = match self
            .run(resolved, call.arguments.clone(), Some(call.id.clone()))
            .await
        {
            Ok(value) => ToolResult::ok(&call.id, value),
            Err(e) => ToolResult::error(&call.id, e.to_string()),
        };
        ToolOutcome {
            plugin: Some(plugin),
            result,
        }
    }

    async fn run(
        &self,
        resolved: ResolvedAction,
        input: Value,
        call_id: Option<String>,
    ) -> Result<Value> {
        let ResolvedAction { plugin, action } = resolved;
        let qualified = format!("{plugin}.{}", action.spec.name);

        action
            .spec
            .input_schema
            .validate(&input)
            .map_err(|reason| KestrelError::InvalidActionInput {
                action: qualified.clone(),
                reason,
            })?;

        info!(action = %qualified, handler = action.handler.kind(), "executing action");

        let outcome = match &action.handler {
            ActionHandler::Api(executor) => {
                let ctx = ExecutionContext {
                    plugin: plugin.clone(),
                    action: action.spec.name.clone(),
                    call_id,
                    bus: self.ctx.bus.clone(),
                    cache: self.ctx.cache.clone(),
                    model: self.ctx.model.clone(),
                };
                executor.execute(input, ctx).await
            }
            ActionHandler::Prompt(prompt) => {
                let text = prompt.render(&input);
                self.ctx
                    .model
                    .generate_text(prompt.system.as_deref(), &text, prompt.model.as_deref())
                    .await
                    .map(Value::String)
            }
        };

        outcome.map_err(|e| {
            warn!(action = %qualified, error = %e, "action failed");
            match e {
                KestrelError::ActionExecution { .. } => e,
                other => KestrelError::action_failed(&qualified, other),
            }
        })
    }
}
