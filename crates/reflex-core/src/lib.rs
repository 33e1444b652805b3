//! Core types for the Reflex action dispatcher.
//!
//! Defines the trigger and action entities, behavior flags, the
//! field-change normalization rules, the hook-event context, and the lookup
//! ports through which reference-by-id relations resolve.

pub mod action;
pub mod config;
pub mod error;
pub mod events;
pub mod field_changes;
pub mod flags;
pub mod ports;
pub mod trigger;

pub use action::{validate_transition, Action, ActionState, InvalidTransition};
pub use config::ReflexConfig;
pub use error::{ReflexError, Result};
pub use events::{HookEvent, RunPhase};
pub use field_changes::{FieldChange, FieldChanges};
pub use ports::{ActionLookup, ItemLookup, TriggerLookup, UserLookup};
pub use trigger::{Settings, Trigger};
