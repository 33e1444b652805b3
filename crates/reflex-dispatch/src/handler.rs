//! The handler capability contract and registry.
//!
//! A handler is the pluggable component that performs an action's real
//! side effects. The core only defines the seam: a handler accepts the
//! action (the work order) and the originating hook event, and reports a
//! summary back; the dispatcher records completion onto the action.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use reflex_core::{Action, HookEvent};

use crate::error::HandlerError;

/// Contract every pluggable action module must satisfy.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// The module name triggers refer to this handler by.
    fn name(&self) -> &str;

    /// Perform the action's side effects against the originating event.
    ///
    /// Returns the human-readable summary of what was done; the caller
    /// writes it onto the action together with the completed mark. On
    /// error the action stays uncompleted and remains in the store for
    /// the drain's retry policy.
    ///
    /// A queued action's settings and item list are an immutable
    /// snapshot; any persistent change must go through the queue's
    /// `save`, never by editing the record in place.
    async fn execute(
        &self,
        action: &mut Action,
        event: &HookEvent,
    ) -> Result<String, HandlerError>;
}

/// Registry resolving handler names to instances.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own name; a later registration with
    /// the same name replaces the earlier one.
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Resolve the handler an action's module name refers to.
    pub fn resolve(&self, action: &Action) -> Option<Arc<dyn ActionHandler>> {
        self.get(&action.module_name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
