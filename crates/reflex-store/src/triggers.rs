//! Durable trigger repository and the trigger-to-action expansion.

use std::sync::Arc;

use rusqlite::OptionalExtension;
use tracing::error;

use reflex_core::error::ReflexError;
use reflex_core::ports::TriggerLookup;
use reflex_core::{Action, Trigger};

use crate::codec;
use crate::db::Database;
use crate::migrations;

/// Repository for stored triggers.
///
/// Reads never fail the caller: triggers are advisory configuration, and
/// a broken trigger table must not destabilize the host event pipeline,
/// so query failures are logged and surface as an empty result.
pub struct TriggerStore {
    db: Arc<Database>,
}

impl TriggerStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// A fresh zero-valued trigger with default flags.
    pub fn new_trigger(&self) -> Trigger {
        Trigger::new()
    }

    /// All triggers ordered by `sort` ascending.
    ///
    /// The stored `settings` object is decoded and the `fieldChanges`
    /// entry lifted out into the entity's dedicated field.
    pub fn get_all(&self) -> Vec<Trigger> {
        let result = self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, title, flags, sort, hook, condition, actions, settings
                     FROM triggers ORDER BY sort ASC, id ASC",
                )
                .map_err(|e| ReflexError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map([], row_to_trigger)
                .map_err(|e| ReflexError::Storage(e.to_string()))?;

            let mut triggers = Vec::new();
            for row in rows {
                triggers.push(row.map_err(|e| ReflexError::Storage(e.to_string()))?);
            }
            Ok(triggers)
        });

        match result {
            Ok(triggers) => triggers,
            Err(e) => {
                error!("Trigger query failed: {}", e);
                Vec::new()
            }
        }
    }

    /// A single trigger by id.
    pub fn get(&self, id: i64) -> Option<Trigger> {
        let result = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, title, flags, sort, hook, condition, actions, settings
                 FROM triggers WHERE id = ?1",
                rusqlite::params![id],
                row_to_trigger,
            )
            .optional()
            .map_err(|e| ReflexError::Storage(e.to_string()))
        });

        match result {
            Ok(trigger) => trigger,
            Err(e) => {
                error!("Trigger lookup failed for id {}: {}", id, e);
                None
            }
        }
    }

    /// Expand a trigger into one action per configured handler name.
    ///
    /// Result order matches `trigger.actions` order; this is the
    /// execution order when the actions run inline. Each action carries
    /// the trigger's id and the per-handler settings bag (empty when the
    /// trigger stores none for that handler).
    pub fn expand(&self, trigger: &Trigger) -> Vec<Action> {
        trigger
            .actions
            .iter()
            .map(|name| {
                let mut action = Action::new();
                action.set_module_name(name.clone());
                action.set_trigger(trigger);
                action.settings = trigger.settings_for(name);
                action
            })
            .collect()
    }

    /// Upsert a trigger, keyed on id presence.
    ///
    /// Field changes are re-bundled into the stored settings object, the
    /// inverse of the decode-time lift. On insert the generated id is
    /// written back to the entity. Returns the trigger id, or `0` when
    /// the underlying write fails (logged).
    pub fn save(&self, trigger: &mut Trigger) -> i64 {
        let actions = codec::encode_names(&trigger.actions);
        let settings = codec::encode_trigger_settings(&trigger.settings, &trigger.field_changes);

        let result = self.db.with_conn(|conn| {
            if trigger.id != 0 {
                conn.execute(
                    "UPDATE triggers
                     SET title = ?1, flags = ?2, sort = ?3, hook = ?4,
                         condition = ?5, actions = ?6, settings = ?7
                     WHERE id = ?8",
                    rusqlite::params![
                        trigger.title,
                        trigger.flags,
                        trigger.sort,
                        trigger.hook,
                        trigger.condition,
                        actions,
                        settings,
                        trigger.id,
                    ],
                )
                .map_err(|e| ReflexError::Storage(e.to_string()))?;
                Ok(trigger.id)
            } else {
                conn.execute(
                    "INSERT INTO triggers (title, flags, sort, hook, condition, actions, settings)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        trigger.title,
                        trigger.flags,
                        trigger.sort,
                        trigger.hook,
                        trigger.condition,
                        actions,
                        settings,
                    ],
                )
                .map_err(|e| ReflexError::Storage(e.to_string()))?;
                Ok(conn.last_insert_rowid())
            }
        });

        match result {
            Ok(id) => {
                trigger.id = id;
                id
            }
            Err(e) => {
                error!("Failed to save trigger {:?}: {}", trigger.title, e);
                0
            }
        }
    }

    /// Delete a trigger row.
    ///
    /// The in-memory entity's flags are zeroed so any holder of the
    /// reference sees it as deactivated; other fields are left intact.
    pub fn delete(&self, trigger: &mut Trigger) -> bool {
        trigger.flags = 0;

        let result = self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM triggers WHERE id = ?1",
                rusqlite::params![trigger.id],
            )
            .map_err(|e| ReflexError::Storage(e.to_string()))
        });

        match result {
            Ok(affected) => affected > 0,
            Err(e) => {
                error!("Failed to delete trigger {}: {}", trigger.id, e);
                false
            }
        }
    }

    /// Create the schema if absent.
    pub fn install(&self) -> Result<(), ReflexError> {
        self.db.with_conn(migrations::run_migrations)
    }

    /// Apply any pending additive schema changes. Safe on every startup.
    pub fn check_schema(&self) -> Result<(), ReflexError> {
        self.db.with_conn(migrations::run_migrations)
    }

    /// Drop the triggers table.
    pub fn uninstall(&self) -> Result<(), ReflexError> {
        self.db.with_conn(migrations::drop_triggers)
    }
}

impl TriggerLookup for TriggerStore {
    fn trigger(&self, id: i64) -> Option<Trigger> {
        self.get(id)
    }
}

fn row_to_trigger(row: &rusqlite::Row<'_>) -> rusqlite::Result<Trigger> {
    let actions: String = row.get(6)?;
    let raw_settings: String = row.get(7)?;
    let (settings, field_changes) = codec::decode_trigger_settings(&raw_settings);

    Ok(Trigger {
        id: row.get(0)?,
        title: row.get(1)?,
        flags: row.get(2)?,
        sort: row.get(3)?,
        hook: row.get(4)?,
        condition: row.get(5)?,
        field_changes,
        actions: codec::decode_names(&actions),
        settings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflex_core::flags::trigger_flags;
    use reflex_core::{FieldChanges, Settings};

    fn store() -> TriggerStore {
        TriggerStore::new(Arc::new(Database::in_memory().unwrap()))
    }

    fn sample_trigger() -> Trigger {
        let mut trigger = Trigger::new();
        trigger.title = "Notify on publish".to_string();
        trigger.hook = "pages::published".to_string();
        trigger.condition = "template=post".to_string();
        trigger.field_changes = FieldChanges::parse("title +body");
        trigger.actions = vec!["mod_a".to_string(), "mod_b".to_string()];
        let mut bag = Settings::new();
        bag.insert("x".to_string(), serde_json::json!(1));
        trigger.settings.insert("mod_b".to_string(), bag);
        trigger
    }

    #[test]
    fn test_save_and_round_trip() {
        let store = store();
        let mut trigger = sample_trigger();

        let id = store.save(&mut trigger);
        assert!(id > 0);
        assert_eq!(trigger.id, id);

        let loaded = store.get(id).unwrap();
        assert_eq!(loaded.title, trigger.title);
        assert_eq!(loaded.hook, trigger.hook);
        assert_eq!(loaded.condition, trigger.condition);
        assert_eq!(loaded.actions, trigger.actions);
        assert_eq!(loaded.field_changes, trigger.field_changes);
        assert_eq!(loaded.settings, trigger.settings);
        // The lift removed the storage-only key from the runtime bag.
        assert!(!loaded.settings.contains_key("fieldChanges"));
    }

    #[test]
    fn test_save_update_keeps_id() {
        let store = store();
        let mut trigger = sample_trigger();
        let id = store.save(&mut trigger);

        trigger.title = "Renamed".to_string();
        let id2 = store.save(&mut trigger);
        assert_eq!(id, id2);

        let loaded = store.get(id).unwrap();
        assert_eq!(loaded.title, "Renamed");
        assert_eq!(store.get_all().len(), 1);
    }

    #[test]
    fn test_get_all_ordered_by_sort() {
        let store = store();

        let mut a = Trigger::new();
        a.title = "second".to_string();
        a.sort = 5;
        store.save(&mut a);

        let mut b = Trigger::new();
        b.title = "first".to_string();
        b.sort = 1;
        store.save(&mut b);

        let titles: Vec<String> = store.get_all().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["first", "second"]);
    }

    #[test]
    fn test_get_all_survives_broken_table() {
        let store = store();
        store.uninstall().unwrap();
        assert!(store.get_all().is_empty());
        assert!(store.get(1).is_none());
    }

    #[test]
    fn test_expand_order_settings_and_trigger_id() {
        let store = store();
        let mut trigger = sample_trigger();
        store.save(&mut trigger);

        let actions = store.expand(&trigger);
        assert_eq!(actions.len(), 2);

        assert_eq!(actions[0].module_name, "mod_a");
        assert!(actions[0].settings.is_empty());
        assert_eq!(actions[0].trigger_id, trigger.id);

        assert_eq!(actions[1].module_name, "mod_b");
        assert_eq!(actions[1].settings.get("x"), Some(&serde_json::json!(1)));
        assert_eq!(actions[1].trigger_id, trigger.id);
    }

    #[test]
    fn test_delete_zeroes_flags() {
        let store = store();
        let mut trigger = sample_trigger();
        let id = store.save(&mut trigger);
        assert_eq!(trigger.flags, trigger_flags::DEFAULT);

        assert!(store.delete(&mut trigger));
        assert_eq!(trigger.flags, 0);
        assert_eq!(trigger.title, "Notify on publish");
        assert!(store.get(id).is_none());
    }

    #[test]
    fn test_delete_missing_row_returns_false() {
        let store = store();
        let mut trigger = Trigger::new();
        trigger.id = 99;
        assert!(!store.delete(&mut trigger));
    }

    #[test]
    fn test_trigger_lookup_port() {
        let store = store();
        let mut trigger = sample_trigger();
        let id = store.save(&mut trigger);

        let lookup: &dyn TriggerLookup = &store;
        assert_eq!(
            lookup.trigger_title(id),
            Some("Notify on publish".to_string())
        );
        assert!(lookup.trigger(9999).is_none());
    }

    #[test]
    fn test_check_schema_idempotent() {
        let store = store();
        store.check_schema().unwrap();
        store.check_schema().unwrap();
        store.install().unwrap();
    }

    #[test]
    fn test_new_trigger_has_defaults() {
        let store = store();
        let trigger = store.new_trigger();
        assert_eq!(trigger.id, 0);
        assert_eq!(trigger.flags, trigger_flags::DEFAULT);
    }
}
