//! The durable, priority-ordered action queue.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use tracing::error;

use reflex_core::error::ReflexError;
use reflex_core::ports::{ActionLookup, UserLookup};
use reflex_core::Action;

use crate::codec;
use crate::db::Database;
use crate::migrations;

/// Contract violations raised by [`ActionQueue::save`].
///
/// These are caller errors and must be fixed before retrying. They are a
/// separate channel from infrastructure failures, which are logged and
/// reported through the zero-id sentinel instead.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("There are no items in this action")]
    NoItems,
    #[error("Action parent is not set; set it explicitly (0 for no parent) before saving")]
    ParentNotSet,
    #[error("Action root parent is not set; set it explicitly (0 for no parent) before saving")]
    RootParentNotSet,
}

/// Durable repository for queued actions.
///
/// Retrieval order is the queue's execution contract: highest priority
/// first, FIFO among equal priorities.
pub struct ActionQueue {
    db: Arc<Database>,
    session: Arc<dyn UserLookup>,
}

impl ActionQueue {
    pub fn new(db: Arc<Database>, session: Arc<dyn UserLookup>) -> Self {
        Self { db, session }
    }

    /// A fresh zero-valued action.
    pub fn new_action(&self) -> Action {
        Action::new()
    }

    /// Validate and upsert an action, keyed on id presence.
    ///
    /// Returns the persisted id. An underlying write failure is logged
    /// and reported as `Ok(0)`; the `Err` channel is reserved for
    /// contract violations.
    pub fn save(&self, action: &mut Action) -> Result<i64, QueueError> {
        if action.item_ids.is_empty() {
            return Err(QueueError::NoItems);
        }
        if action.parent_id.is_none() {
            return Err(QueueError::ParentNotSet);
        }
        if action.root_parent_id.is_none() {
            return Err(QueueError::RootParentNotSet);
        }

        if action.user_id == 0 {
            action.user_id = self.session.current_user();
        }
        if action.created == DateTime::UNIX_EPOCH {
            action.created = Utc::now();
        }

        let item_ids = codec::encode_ids(&action.item_ids);
        let settings = codec::encode_settings(&action.settings);

        let result = self.db.with_conn(|conn| {
            if action.id != 0 {
                conn.execute(
                    "UPDATE actions
                     SET title = ?1, parent_id = ?2, root_parent_id = ?3, trigger_id = ?4,
                         user_id = ?5, module = ?6, item_ids = ?7, settings = ?8,
                         priority = ?9, created = ?10, flags = ?11
                     WHERE id = ?12",
                    rusqlite::params![
                        action.title,
                        action.parent_id,
                        action.root_parent_id,
                        action.trigger_id,
                        action.user_id,
                        action.module_name,
                        item_ids,
                        settings,
                        action.priority,
                        action.created.timestamp(),
                        action.flags,
                        action.id,
                    ],
                )
                .map_err(|e| ReflexError::Storage(e.to_string()))?;
                Ok(action.id)
            } else {
                conn.execute(
                    "INSERT INTO actions
                         (title, parent_id, root_parent_id, trigger_id, user_id,
                          module, item_ids, settings, priority, created, flags)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    rusqlite::params![
                        action.title,
                        action.parent_id,
                        action.root_parent_id,
                        action.trigger_id,
                        action.user_id,
                        action.module_name,
                        item_ids,
                        settings,
                        action.priority,
                        action.created.timestamp(),
                        action.flags,
                    ],
                )
                .map_err(|e| ReflexError::Storage(e.to_string()))?;
                Ok(conn.last_insert_rowid())
            }
        });

        match result {
            Ok(id) => {
                action.id = id;
                Ok(id)
            }
            Err(e) => {
                error!("Failed to save action {:?}: {}", action.title, e);
                Ok(0)
            }
        }
    }

    /// Remove an action by id; returns whether a row was affected.
    pub fn delete(&self, action: &Action) -> bool {
        let result = self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM actions WHERE id = ?1",
                rusqlite::params![action.id],
            )
            .map_err(|e| ReflexError::Storage(e.to_string()))
        });

        match result {
            Ok(affected) => affected > 0,
            Err(e) => {
                error!("Failed to delete action {}: {}", action.id, e);
                false
            }
        }
    }

    /// All queued actions in execution order: priority descending, then
    /// creation ascending (id breaks same-second ties).
    ///
    /// Claimed actions are included; only [`ActionQueue::claim_next`]
    /// filters them out.
    pub fn get_all(&self) -> Vec<Action> {
        let result = self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, title, parent_id, root_parent_id, trigger_id, user_id,
                            module, item_ids, settings, priority, created, flags
                     FROM actions
                     ORDER BY priority DESC, created ASC, id ASC",
                )
                .map_err(|e| ReflexError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map([], row_to_action)
                .map_err(|e| ReflexError::Storage(e.to_string()))?;

            let mut actions = Vec::new();
            for row in rows {
                actions.push(row.map_err(|e| ReflexError::Storage(e.to_string()))?);
            }
            Ok(actions)
        });

        match result {
            Ok(actions) => actions,
            Err(e) => {
                error!("Action queue query failed: {}", e);
                Vec::new()
            }
        }
    }

    /// A single queued action by id.
    pub fn get(&self, id: i64) -> Option<Action> {
        let result = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, title, parent_id, root_parent_id, trigger_id, user_id,
                        module, item_ids, settings, priority, created, flags
                 FROM actions WHERE id = ?1",
                rusqlite::params![id],
                row_to_action,
            )
            .optional()
            .map_err(|e| ReflexError::Storage(e.to_string()))
        });

        match result {
            Ok(action) => action,
            Err(e) => {
                error!("Action lookup failed for id {}: {}", id, e);
                None
            }
        }
    }

    /// Atomically claim the next unclaimed action in queue order.
    ///
    /// The claim stamp guarantees at most one drain worker executes a
    /// given action: the `UPDATE` selects and stamps in a single
    /// statement, so concurrent claimers get distinct rows. Returns
    /// `None` when the queue holds no unclaimed actions.
    pub fn claim_next(&self) -> Option<Action> {
        let result = self.db.with_conn(|conn| {
            let claimed: Option<i64> = conn
                .query_row(
                    "UPDATE actions
                     SET claimed_at = strftime('%s', 'now')
                     WHERE claimed_at IS NULL
                       AND id = (SELECT id FROM actions
                                 WHERE claimed_at IS NULL
                                 ORDER BY priority DESC, created ASC, id ASC
                                 LIMIT 1)
                     RETURNING id",
                    [],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| ReflexError::Storage(e.to_string()))?;

            match claimed {
                Some(id) => conn
                    .query_row(
                        "SELECT id, title, parent_id, root_parent_id, trigger_id, user_id,
                                module, item_ids, settings, priority, created, flags
                         FROM actions WHERE id = ?1",
                        rusqlite::params![id],
                        row_to_action,
                    )
                    .optional()
                    .map_err(|e| ReflexError::Storage(e.to_string())),
                None => Ok(None),
            }
        });

        match result {
            Ok(action) => action,
            Err(e) => {
                error!("Failed to claim next action: {}", e);
                None
            }
        }
    }

    /// Release a claim so the action becomes claimable again (retry).
    pub fn release(&self, id: i64) -> bool {
        let result = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE actions SET claimed_at = NULL WHERE id = ?1",
                rusqlite::params![id],
            )
            .map_err(|e| ReflexError::Storage(e.to_string()))
        });

        match result {
            Ok(affected) => affected > 0,
            Err(e) => {
                error!("Failed to release claim on action {}: {}", id, e);
                false
            }
        }
    }

    /// Create the schema if absent.
    pub fn install(&self) -> Result<(), ReflexError> {
        self.db.with_conn(migrations::run_migrations)
    }

    /// Apply any pending additive schema changes. Safe on every startup;
    /// the queue never loses pending actions across an upgrade.
    pub fn check_schema(&self) -> Result<(), ReflexError> {
        self.db.with_conn(migrations::run_migrations)
    }

    /// Drop the actions table, discarding pending work.
    pub fn uninstall(&self) -> Result<(), ReflexError> {
        self.db.with_conn(migrations::drop_actions)
    }
}

impl ActionLookup for ActionQueue {
    fn action(&self, id: i64) -> Option<Action> {
        self.get(id)
    }
}

fn row_to_action(row: &rusqlite::Row<'_>) -> rusqlite::Result<Action> {
    let item_ids: String = row.get(7)?;
    let settings: String = row.get(8)?;
    let created: i64 = row.get(10)?;

    Ok(Action {
        id: row.get(0)?,
        title: row.get(1)?,
        parent_id: Some(row.get(2)?),
        root_parent_id: Some(row.get(3)?),
        trigger_id: row.get(4)?,
        user_id: row.get(5)?,
        module_name: row.get(6)?,
        item_ids: codec::decode_ids(&item_ids),
        settings: codec::decode_settings(&settings),
        priority: row.get(9)?,
        created: DateTime::from_timestamp(created, 0).unwrap_or(DateTime::UNIX_EPOCH),
        flags: row.get(11)?,
        completed: false,
        summary: String::new(),
    })
}
