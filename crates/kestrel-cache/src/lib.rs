//! # kestrel-cache
//!
//! Backends for the [`CacheService`](kestrel_core::CacheService) contract:
//!
//! - **MemoryCache**: process-local map, lost on restart (default).
//! - **SqliteCache**: single-file SQLite table, survives restarts.
//!
//! Both apply `update` merges atomically under their own lock.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;
