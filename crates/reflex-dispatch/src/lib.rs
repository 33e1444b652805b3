//! Dispatch engine for Reflex.
//!
//! Evaluates stored triggers against hook events, expands matches into
//! actions, and runs them inline through registered handlers or defers
//! them into the durable queue.

pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod notify;

pub use dispatcher::{ConditionEvaluator, DispatchOutcome, Dispatcher};
pub use error::{DispatchError, HandlerError};
pub use handler::{ActionHandler, HandlerRegistry};
pub use notify::NotificationSender;
