//! # kestrel-runtime
//!
//! The agent service: owns the plugin registry, the message bus, the cache,
//! and the model client, drives every plugin through its lifecycle, and runs
//! the model-driven action-selection loop.
//!
//! ```text
//!   register_plugin ──▶ initialize(ctx) ──▶ Initialized ──start()──▶ Started
//!                            │                                          │
//!                            └──────────▶ Failed ◀──────────────────────┤
//!                                                                stop() ▼
//!                                                                    Stopped
//! ```
//!
//! Failures inside one plugin never reach another: a failed `initialize`
//! excludes that plugin from `start`, a failed `start` leaves the rest of the
//! registry running.

mod handler;
pub mod service;
pub mod turn;

pub use service::{AgentService, PluginStatus};
pub use turn::{ActionRecord, ModelTurn};
