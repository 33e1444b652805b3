//! The trigger entity: one stored rule.

use indexmap::IndexMap;
use serde_json::Value;

use crate::field_changes::FieldChanges;
use crate::flags::trigger_flags;

/// Arbitrary key/value bag handed to a handler, ordered by insertion.
pub type Settings = IndexMap<String, Value>;

/// A rule: hook name, condition, ordered handler list, per-handler
/// settings, and behavior flags.
///
/// `id` is the store identity; `0` means the trigger has not been saved.
/// The condition is an opaque selector string — Reflex never interprets
/// it, only hands it to the host's evaluator.
#[derive(Clone, Debug, Default)]
pub struct Trigger {
    pub id: i64,
    /// Description of what the trigger does.
    pub title: String,
    /// Name of the host event this rule listens to.
    pub hook: String,
    /// Selector string passed to the external condition evaluator.
    pub condition: String,
    /// Field-name tokens the condition additionally checks for changes.
    pub field_changes: FieldChanges,
    /// Handler names, one spawned action per entry, in list order.
    pub actions: Vec<String>,
    /// Per-handler settings bags, indexed by handler name.
    pub settings: IndexMap<String, Settings>,
    /// Bitmask of `trigger_flags` values.
    pub flags: u32,
    /// Evaluation/display order.
    pub sort: i64,
}

impl Trigger {
    /// A fresh trigger with the default flags (`ACTIVE | RUN_AFTER`).
    pub fn new() -> Self {
        Self {
            flags: trigger_flags::DEFAULT,
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.flags & trigger_flags::ACTIVE != 0
    }

    pub fn runs_before(&self) -> bool {
        self.flags & trigger_flags::RUN_BEFORE != 0
    }

    pub fn runs_after(&self) -> bool {
        self.flags & trigger_flags::RUN_AFTER != 0
    }

    /// Whether spawned actions are queued rather than run inline.
    pub fn is_deferred(&self) -> bool {
        self.flags & trigger_flags::DEFERRED != 0
    }

    pub fn notify_email(&self) -> bool {
        self.flags & trigger_flags::NOTIFY_EMAIL != 0
    }

    pub fn notify_in_app(&self) -> bool {
        self.flags & trigger_flags::NOTIFY_IN_APP != 0
    }

    /// The settings bag for one handler name, empty when none is stored.
    ///
    /// `actions` entries and `settings` keys need not match 1:1; a handler
    /// with no entry simply receives an empty bag.
    pub fn settings_for(&self, handler: &str) -> Settings {
        self.settings.get(handler).cloned().unwrap_or_default()
    }
}

// Identity is the store id.
impl PartialEq for Trigger {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Trigger {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trigger_defaults() {
        let trigger = Trigger::new();
        assert_eq!(trigger.id, 0);
        assert_eq!(trigger.flags, trigger_flags::ACTIVE | trigger_flags::RUN_AFTER);
        assert!(trigger.is_active());
        assert!(trigger.runs_after());
        assert!(!trigger.runs_before());
        assert!(!trigger.is_deferred());
        assert!(trigger.actions.is_empty());
        assert!(trigger.settings.is_empty());
        assert!(trigger.field_changes.is_empty());
    }

    #[test]
    fn test_flag_accessors() {
        let mut trigger = Trigger::new();
        trigger.flags |= trigger_flags::DEFERRED | trigger_flags::NOTIFY_EMAIL;
        assert!(trigger.is_deferred());
        assert!(trigger.notify_email());
        assert!(!trigger.notify_in_app());
    }

    #[test]
    fn test_equality_is_by_id() {
        let mut a = Trigger::new();
        a.id = 3;
        a.title = "one".to_string();

        let mut b = Trigger::new();
        b.id = 3;
        b.title = "another".to_string();

        assert_eq!(a, b);
        b.id = 4;
        assert_ne!(a, b);
    }

    #[test]
    fn test_settings_for_missing_handler_is_empty() {
        let mut trigger = Trigger::new();
        let mut bag = Settings::new();
        bag.insert("x".to_string(), serde_json::json!(1));
        trigger.settings.insert("mod_a".to_string(), bag);

        assert_eq!(
            trigger.settings_for("mod_a").get("x"),
            Some(&serde_json::json!(1))
        );
        assert!(trigger.settings_for("mod_b").is_empty());
    }
}
