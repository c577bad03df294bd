//! # kestrel-core
//!
//! Core types, traits, and primitives for the Kestrel agent runtime.
//! This crate defines the shared vocabulary used by every other crate in the
//! workspace: the error taxonomy, the bus `Message`, the `MessageBus`, the
//! lifecycle `EventBus`, and the `CacheService` contract.

pub mod bus;
pub mod cache;
pub mod error;
pub mod event;
pub mod message;
pub mod tool;

pub use bus::{MessageBus, MessageHandler, SubscriptionId, handler_fn};
pub use cache::{CacheEntryInfo, CacheExt, CacheService, CacheTag, merge_shallow};
pub use error::{KestrelError, Result};
pub use event::{Event, EventBus};
pub use message::{Message, SYSTEM_SOURCE};
pub use tool::{Tool, ToolCall, ToolResult};

/// Unique identifier for a plugin (its metadata name).
pub type PluginId = String;
