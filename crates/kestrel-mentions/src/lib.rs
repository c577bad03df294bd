//! # kestrel-mentions
//!
//! Reference polling plugin: fetches mentions from a [`MentionSource`] on a
//! timer, drops anything already seen, publishes the rest on the bus, and
//! keeps its cursor in the cache so restarts pick up where they left off.
//!
//! Per cycle:
//!
//! 1. read `last_checked_id` from the cache (absent means no lower bound)
//! 2. fetch one page newer than the cursor
//! 3. for each item, check-and-insert into the bounded [`DedupLog`], advance
//!    the cursor with [`compare_ids`], publish
//! 4. if anything was published, merge `{ last_checked_id, last_poll,
//!    seen_ids }` into the cache entry
//!
//! A failed fetch or cache read costs one cycle and nothing else.

pub mod dedup;
pub mod plugin;
pub mod source;

pub use dedup::{DedupLog, compare_ids, max_id};
pub use plugin::{MentionsPlugin, MentionsSettings, MentionsState, PLUGIN_NAME, PollOutcome};
pub use source::{HttpMentionSource, Mention, MentionSource, TWITTER_API_BASE};
