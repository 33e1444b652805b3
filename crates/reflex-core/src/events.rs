//! Hook-event context handed in by the host event source.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which side of the host operation a dispatch pass covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    /// Before the underlying host operation completes.
    Before,
    /// After the underlying host operation completes.
    After,
}

/// The originating event a trigger evaluation runs against.
///
/// The host supplies the hook name, the ids of the entities the event
/// concerns, an opaque context object for the condition evaluator, and
/// optionally the names of fields the operation changed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HookEvent {
    pub hook: String,
    /// Target-entity ids spawned actions will operate on.
    pub item_ids: Vec<i64>,
    /// Opaque payload passed through to the evaluator and handlers.
    pub context: Value,
    /// Field names the host reports as changed, for field-change
    /// cross-checks. Empty when the host does not track changes.
    pub changed_fields: Vec<String>,
}

impl HookEvent {
    pub fn new(hook: impl Into<String>) -> Self {
        Self {
            hook: hook.into(),
            item_ids: Vec::new(),
            context: Value::Null,
            changed_fields: Vec::new(),
        }
    }

    pub fn with_items(mut self, item_ids: Vec<i64>) -> Self {
        self.item_ids = item_ids;
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_changed_fields(mut self, changed: Vec<String>) -> Self {
        self.changed_fields = changed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chain() {
        let event = HookEvent::new("pages::save_ready")
            .with_items(vec![42, 43])
            .with_context(serde_json::json!({"template": "post"}))
            .with_changed_fields(vec!["title".to_string()]);

        assert_eq!(event.hook, "pages::save_ready");
        assert_eq!(event.item_ids, vec![42, 43]);
        assert_eq!(event.context["template"], "post");
        assert_eq!(event.changed_fields, vec!["title"]);
    }

    #[test]
    fn test_serde_round_trip() {
        let event = HookEvent::new("items::deleted").with_items(vec![7]);
        let json = serde_json::to_string(&event).unwrap();
        let rt: HookEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(rt.hook, "items::deleted");
        assert_eq!(rt.item_ids, vec![7]);
        assert!(rt.changed_fields.is_empty());
    }
}
