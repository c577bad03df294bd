//! # kestrel-plugin
//!
//! The contract every plugin implements, the schema-described actions a
//! plugin exposes, and the dispatcher that resolves and runs them.
//!
//! A plugin declares which optional hooks it implements through
//! [`Capabilities`]; the runtime only calls `start`/`stop` on plugins with
//! [`Capability::Lifecycle`] and only subscribes `handle_message` for
//! plugins with [`Capability::Messages`].
//!
//! ```text
//!   Plugin ──actions()──▶ ActionDispatcher ◀── model tool calls
//!     │                        │
//!     └── PluginContext ◀──────┘  (bus, cache, model)
//! ```

pub mod action;
pub mod dispatcher;
pub mod plugin;

pub use action::{
    ActionExample, ActionExecutor, ActionHandler, ActionSpec, ExecutionContext, InputSchema,
    JsonType, PluginAction, PromptAction, PropertySpec, executor_fn,
};
pub use dispatcher::{ActionDispatcher, ResolvedAction, TOOL_SEPARATOR, ToolOutcome, tool_name};
pub use plugin::{Capabilities, Capability, Plugin, PluginContext, PluginMetadata, PluginState};
