//! Lookup ports for resolving reference-by-id relations.
//!
//! Entities hold ids, never owned references. Whatever constructs them
//! injects these ports, and relations resolve on demand through them.

use crate::action::Action;
use crate::trigger::Trigger;

/// Resolves target-entity ids to the host's item type.
pub trait ItemLookup {
    type Item;

    fn item(&self, id: i64) -> Option<Self::Item>;
}

/// Resolves user ids and supplies the current session user.
pub trait UserLookup: Send + Sync {
    fn display_name(&self, id: i64) -> Option<String>;

    /// Id of the acting session user, used to default an action's
    /// `user_id` at save time.
    fn current_user(&self) -> i64;
}

/// Resolves trigger ids to stored triggers.
pub trait TriggerLookup {
    fn trigger(&self, id: i64) -> Option<Trigger>;

    fn trigger_title(&self, id: i64) -> Option<String> {
        self.trigger(id).map(|t| t.title)
    }
}

/// Resolves action ids to stored actions (parent/root-parent relations).
pub trait ActionLookup {
    fn action(&self, id: i64) -> Option<Action>;
}
