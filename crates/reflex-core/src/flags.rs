//! Behavior flags for triggers and actions.
//!
//! Both entities persist their flags as an integer bitmask, so the values
//! here are part of the storage contract and must not be renumbered.

/// Trigger behavior flags.
pub mod trigger_flags {
    /// Trigger is enabled for evaluation.
    pub const ACTIVE: u32 = 1 << 1;
    /// Spawned actions run before the host operation completes.
    pub const RUN_BEFORE: u32 = 1 << 2;
    /// Spawned actions run after the host operation completes.
    pub const RUN_AFTER: u32 = 1 << 3;
    /// Spawned actions are queued for a later drain rather than run inline.
    pub const DEFERRED: u32 = 1 << 4;
    /// Notify the acting user by email when an action finishes.
    pub const NOTIFY_EMAIL: u32 = 1 << 9;
    /// Notify the acting user by in-app notice when an action finishes.
    pub const NOTIFY_IN_APP: u32 = 1 << 10;

    /// Flags set on a newly constructed trigger.
    pub const DEFAULT: u32 = ACTIVE | RUN_AFTER;
}

/// Action notification flags.
///
/// Same bit values as the trigger notification flags, but the fields are
/// independent: an action does not inherit its owning trigger's flags.
pub mod action_flags {
    pub const NOTIFY_EMAIL: u32 = 1 << 9;
    pub const NOTIFY_IN_APP: u32 = 1 << 10;
}
