//! The action entity: one unit of work, possibly queued.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::flags::action_flags;
use crate::ports::{ActionLookup, ItemLookup, TriggerLookup, UserLookup};
use crate::trigger::{Settings, Trigger};

/// Lifecycle states of an action.
///
/// `Pending` covers both unsaved and saved-but-undispatched actions. A
/// failed action stays in the store; the drain decides whether to retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionState {
    Pending,
    Dispatched,
    Completed,
    Failed,
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionState::Pending => write!(f, "pending"),
            ActionState::Dispatched => write!(f, "dispatched"),
            ActionState::Completed => write!(f, "completed"),
            ActionState::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid state transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: ActionState,
    pub to: ActionState,
}

/// Validate a lifecycle transition.
///
/// Valid transitions:
/// - Pending -> Dispatched (handler invoked)
/// - Dispatched -> Completed
/// - Dispatched -> Failed
/// - Failed -> Pending (released for retry)
pub fn validate_transition(from: ActionState, to: ActionState) -> Result<(), InvalidTransition> {
    let valid = matches!(
        (from, to),
        (ActionState::Pending, ActionState::Dispatched)
            | (ActionState::Dispatched, ActionState::Completed)
            | (ActionState::Dispatched, ActionState::Failed)
            | (ActionState::Failed, ActionState::Pending)
    );

    if valid {
        Ok(())
    } else {
        Err(InvalidTransition { from, to })
    }
}

/// One unit of work spawned from a trigger or constructed manually.
///
/// `id` is the store identity; `0` means unsaved/transient. Parent links
/// form the action hierarchy: `Some(0)` is the valid "no parent / is the
/// root" value, while `None` means the caller has not set the link yet —
/// the queue refuses to persist an action in that state.
///
/// Relations (`trigger`, `parent`, `root_parent`, `items`, user) are held
/// as ids only and resolve on demand through the lookup ports.
#[derive(Clone, Debug)]
pub struct Action {
    pub id: i64,
    pub title: String,
    pub parent_id: Option<i64>,
    pub root_parent_id: Option<i64>,
    /// Owning trigger id, `0` for manually constructed actions.
    pub trigger_id: i64,
    /// Acting user id; defaults to the session user at save time if zero.
    pub user_id: i64,
    /// Handler name to invoke.
    pub module_name: String,
    /// Target-entity ids this action operates on; must be non-empty to save.
    pub item_ids: Vec<i64>,
    /// Key/value bag for the handler, typically copied from the trigger.
    pub settings: Settings,
    /// Higher runs first.
    pub priority: i64,
    pub created: DateTime<Utc>,
    /// Bitmask of `action_flags` values.
    pub flags: u32,

    // Runtime only, never persisted.
    pub completed: bool,
    pub summary: String,
}

impl Default for Action {
    fn default() -> Self {
        Self {
            id: 0,
            title: String::new(),
            parent_id: None,
            root_parent_id: None,
            trigger_id: 0,
            user_id: 0,
            module_name: String::new(),
            item_ids: Vec::new(),
            settings: Settings::new(),
            priority: 0,
            created: DateTime::UNIX_EPOCH,
            flags: 0,
            completed: false,
            summary: String::new(),
        }
    }
}

impl Action {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_saved(&self) -> bool {
        self.id != 0
    }

    pub fn notify_email(&self) -> bool {
        self.flags & action_flags::NOTIFY_EMAIL != 0
    }

    pub fn notify_in_app(&self) -> bool {
        self.flags & action_flags::NOTIFY_IN_APP != 0
    }

    /// Link to the owning trigger; stores only the id.
    pub fn set_trigger(&mut self, trigger: &Trigger) {
        self.trigger_id = trigger.id;
    }

    /// Set the handler by name.
    pub fn set_module_name(&mut self, name: impl Into<String>) {
        self.module_name = name.into();
    }

    /// Link the parent action; `None` stores the explicit "no parent" value.
    pub fn set_parent(&mut self, parent: Option<&Action>) {
        self.parent_id = Some(parent.map_or(0, |p| p.id));
    }

    /// Link the root parent action; `None` marks this action as the root.
    pub fn set_root_parent(&mut self, root: Option<&Action>) {
        self.root_parent_id = Some(root.map_or(0, |p| p.id));
    }

    /// Record handler completion and its summary.
    pub fn mark_completed(&mut self, summary: impl Into<String>) {
        self.completed = true;
        self.summary = summary.into();
    }

    /// Resolve the owning trigger, if any.
    pub fn trigger(&self, triggers: &dyn TriggerLookup) -> Option<Trigger> {
        if self.trigger_id == 0 {
            return None;
        }
        triggers.trigger(self.trigger_id)
    }

    /// Resolve the parent action, if one is linked.
    pub fn parent(&self, actions: &dyn ActionLookup) -> Option<Action> {
        match self.parent_id {
            Some(id) if id != 0 => actions.action(id),
            _ => None,
        }
    }

    /// Resolve the root parent action, if one is linked.
    pub fn root_parent(&self, actions: &dyn ActionLookup) -> Option<Action> {
        match self.root_parent_id {
            Some(id) if id != 0 => actions.action(id),
            _ => None,
        }
    }

    /// Resolve the target entities through the host's item port. Ids that
    /// no longer resolve are skipped.
    pub fn items<L: ItemLookup>(&self, lookup: &L) -> Vec<L::Item> {
        self.item_ids
            .iter()
            .filter_map(|&id| lookup.item(id))
            .collect()
    }

    /// Display name of the acting user.
    pub fn user_name(&self, users: &dyn UserLookup) -> Option<String> {
        users.display_name(self.user_id)
    }

    /// Fixed-format, human-readable audit block, used as the notification
    /// payload body.
    pub fn summary_text(&self, triggers: &dyn TriggerLookup, users: &dyn UserLookup) -> String {
        let trigger_name = if self.trigger_id == 0 {
            "N/A".to_string()
        } else {
            triggers
                .trigger_title(self.trigger_id)
                .unwrap_or_else(|| "N/A".to_string())
        };

        let status = if self.completed { "Completed" } else { "Pending" };

        let user = self
            .user_name(users)
            .unwrap_or_else(|| "unknown".to_string());

        format!(
            "Title: {}\nID: #{}\nStatus: {}\nItems: {}\nTrigger: {}\nCreated: {}\nModule: {}\nUser: {}",
            self.title,
            self.id,
            status,
            self.item_ids.len(),
            trigger_name,
            self.created.format("%Y/%m/%d %H:%M"),
            self.module_name,
            user,
        )
    }
}
