//! SQLite persistence for Reflex triggers and the action queue.
//!
//! Provides a WAL-mode database with versioned migrations, the list and
//! settings codecs, and the two durable stores: [`TriggerStore`] and
//! [`ActionQueue`].

pub mod codec;
pub mod db;
pub mod migrations;
pub mod queue;
pub mod triggers;

pub use db::Database;
pub use queue::{ActionQueue, QueueError};
pub use triggers::TriggerStore;
