//! Trigger evaluation and action dispatch.
//!
//! One dispatch pass walks the stored triggers for a hook event: active
//! triggers whose hook, run phase, condition, and field-change set all
//! match are expanded into actions. Actions from deferred triggers are
//! written to the durable queue; the rest run inline, in expansion
//! order, within the calling event's control flow.

use std::sync::Arc;

use tracing::{error, warn};

use reflex_core::ports::UserLookup;
use reflex_core::{Action, HookEvent, RunPhase, Trigger};
use reflex_store::{ActionQueue, TriggerStore};

use crate::error::DispatchError;
use crate::handler::HandlerRegistry;
use crate::notify::NotificationSender;

/// External condition evaluator.
///
/// Takes the trigger's opaque selector string and the event context and
/// decides whether the rule matches. Reflex never interprets the
/// selector itself. A blank condition is not passed here; it always
/// matches.
pub trait ConditionEvaluator: Send + Sync {
    fn matches(&self, condition: &str, event: &HookEvent) -> bool;
}

/// Counters describing what one dispatch pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Triggers that matched the event.
    pub matched: usize,
    /// Actions executed inline to completion.
    pub executed: usize,
    /// Actions written to the durable queue.
    pub queued: usize,
    /// Actions whose handler failed or whose queue write failed.
    pub failed: usize,
    /// Actions skipped (no registered handler, or invalid for queueing).
    pub skipped: usize,
}

/// Coordinates trigger evaluation, expansion, and execution.
pub struct Dispatcher {
    triggers: Arc<TriggerStore>,
    queue: Arc<ActionQueue>,
    registry: Arc<HandlerRegistry>,
    evaluator: Arc<dyn ConditionEvaluator>,
    users: Arc<dyn UserLookup>,
    notifier: Option<Arc<dyn NotificationSender>>,
}

impl Dispatcher {
    pub fn new(
        triggers: Arc<TriggerStore>,
        queue: Arc<ActionQueue>,
        registry: Arc<HandlerRegistry>,
        evaluator: Arc<dyn ConditionEvaluator>,
        users: Arc<dyn UserLookup>,
    ) -> Self {
        Self {
            triggers,
            queue,
            registry,
            evaluator,
            users,
            notifier: None,
        }
    }

    /// Attach a notification sender for completed actions.
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSender>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Evaluate all triggers against one hook event for one run phase.
    ///
    /// Actions spawned here operate on the event's target items and are
    /// roots of their own hierarchy. Failures never propagate to the
    /// host: they are logged and counted.
    pub async fn dispatch(&self, event: &HookEvent, phase: RunPhase) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        for trigger in self.triggers.get_all() {
            if !self.trigger_matches(&trigger, event, phase) {
                continue;
            }
            outcome.matched += 1;

            for mut action in self.triggers.expand(&trigger) {
                action.item_ids = event.item_ids.clone();
                action.set_parent(None);
                action.set_root_parent(None);

                if trigger.is_deferred() {
                    match self.queue.save(&mut action) {
                        Ok(0) => outcome.failed += 1,
                        Ok(_) => outcome.queued += 1,
                        Err(e) => {
                            warn!(
                                "Refusing to queue action from trigger {}: {}",
                                trigger.id, e
                            );
                            outcome.skipped += 1;
                        }
                    }
                    continue;
                }

                if action.user_id == 0 {
                    action.user_id = self.users.current_user();
                }

                match self.run_action(&mut action, event).await {
                    Ok(()) => outcome.executed += 1,
                    Err(DispatchError::UnknownHandler(name)) => {
                        warn!("No handler registered for module {}", name);
                        outcome.skipped += 1;
                    }
                    Err(e) => {
                        error!("Action from trigger {} failed: {}", trigger.id, e);
                        outcome.failed += 1;
                    }
                }
            }
        }

        outcome
    }

    /// Execute one previously queued (and claimed) action.
    ///
    /// The originating event is not persisted with the action, so queued
    /// work runs against a synthetic drain event carrying the action's
    /// own items. Completion and summary are written onto the action;
    /// removal from the queue stays with the caller.
    pub async fn run_queued(&self, action: &mut Action) -> Result<(), DispatchError> {
        let event = HookEvent::new("queue::drain").with_items(action.item_ids.clone());
        self.run_action(action, &event).await
    }

    fn trigger_matches(&self, trigger: &Trigger, event: &HookEvent, phase: RunPhase) -> bool {
        if !trigger.is_active() || trigger.hook != event.hook {
            return false;
        }
        let phase_ok = match phase {
            RunPhase::Before => trigger.runs_before(),
            RunPhase::After => trigger.runs_after(),
        };
        if !phase_ok {
            return false;
        }
        if !trigger.condition.is_empty() && !self.evaluator.matches(&trigger.condition, event) {
            return false;
        }
        trigger.field_changes.matches(&event.changed_fields)
    }

    async fn run_action(
        &self,
        action: &mut Action,
        event: &HookEvent,
    ) -> Result<(), DispatchError> {
        let handler = self
            .registry
            .resolve(action)
            .ok_or_else(|| DispatchError::UnknownHandler(action.module_name.clone()))?;

        let summary = handler.execute(action, event).await?;
        action.mark_completed(summary);
        self.notify(action);
        Ok(())
    }

    fn notify(&self, action: &Action) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if !action.notify_email() && !action.notify_in_app() {
            return;
        }

        let body = action.summary_text(self.triggers.as_ref(), self.users.as_ref());
        if action.notify_email() {
            notifier.send_email(action.user_id, &body);
        }
        if action.notify_in_app() {
            notifier.send_in_app(action.user_id, &body);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use reflex_core::flags::{action_flags, trigger_flags};
    use reflex_core::Settings;
    use reflex_store::Database;

    use crate::error::HandlerError;
    use crate::handler::ActionHandler;

    struct StubUsers;

    impl UserLookup for StubUsers {
        fn display_name(&self, id: i64) -> Option<String> {
            (id == 42).then(|| "robot".to_string())
        }

        fn current_user(&self) -> i64 {
            42
        }
    }

    /// Matches any condition except the literal "never".
    struct StubEvaluator;

    impl ConditionEvaluator for StubEvaluator {
        fn matches(&self, condition: &str, _event: &HookEvent) -> bool {
            condition != "never"
        }
    }

    /// Records execution order and the settings each call received.
    struct RecordingHandler {
        name: String,
        log: Arc<Mutex<Vec<(String, Settings)>>>,
    }

    #[async_trait]
    impl ActionHandler for RecordingHandler {
        fn name(&self) -> &str {
            &self.name
        }

        async fn execute(
            &self,
            action: &mut Action,
            _event: &HookEvent,
        ) -> Result<String, HandlerError> {
            self.log
                .lock()
                .unwrap()
                .push((self.name.clone(), action.settings.clone()));
            Ok(format!("{} handled {} items", self.name, action.item_ids.len()))
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl ActionHandler for FailingHandler {
        fn name(&self) -> &str {
            "failing"
        }

        async fn execute(
            &self,
            _action: &mut Action,
            _event: &HookEvent,
        ) -> Result<String, HandlerError> {
            Err(HandlerError::Failed("boom".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        emails: Mutex<Vec<(i64, String)>>,
        notices: Mutex<Vec<(i64, String)>>,
    }

    impl NotificationSender for RecordingNotifier {
        fn send_email(&self, user_id: i64, body: &str) {
            self.emails.lock().unwrap().push((user_id, body.to_string()));
        }

        fn send_in_app(&self, user_id: i64, body: &str) {
            self.notices.lock().unwrap().push((user_id, body.to_string()));
        }
    }

    struct Fixture {
        triggers: Arc<TriggerStore>,
        queue: Arc<ActionQueue>,
        dispatcher: Dispatcher,
        log: Arc<Mutex<Vec<(String, Settings)>>>,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::in_memory().unwrap());
        let users: Arc<dyn UserLookup> = Arc::new(StubUsers);
        let triggers = Arc::new(TriggerStore::new(Arc::clone(&db)));
        let queue = Arc::new(ActionQueue::new(Arc::clone(&db), Arc::clone(&users)));

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        for name in ["mod_a", "mod_b"] {
            registry.register(Arc::new(RecordingHandler {
                name: name.to_string(),
                log: Arc::clone(&log),
            }));
        }
        registry.register(Arc::new(FailingHandler));

        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = Dispatcher::new(
            Arc::clone(&triggers),
            Arc::clone(&queue),
            Arc::new(registry),
            Arc::new(StubEvaluator),
            users,
        )
        .with_notifier(Arc::clone(&notifier) as Arc<dyn NotificationSender>);

        Fixture {
            triggers,
            queue,
            dispatcher,
            log,
            notifier,
        }
    }

    fn saved_trigger(fixture: &Fixture, hook: &str, actions: &[&str], flags: u32) -> Trigger {
        let mut trigger = Trigger::new();
        trigger.title = format!("rule for {}", hook);
        trigger.hook = hook.to_string();
        trigger.actions = actions.iter().map(|s| s.to_string()).collect();
        trigger.flags = flags;
        assert!(fixture.triggers.save(&mut trigger) > 0);
        trigger
    }

    #[tokio::test]
    async fn test_inline_execution_in_expansion_order() {
        let fixture = fixture();
        saved_trigger(
            &fixture,
            "pages::saved",
            &["mod_a", "mod_b"],
            trigger_flags::DEFAULT,
        );

        let event = HookEvent::new("pages::saved").with_items(vec![1, 2]);
        let outcome = fixture.dispatcher.dispatch(&event, RunPhase::After).await;

        assert_eq!(outcome.matched, 1);
        assert_eq!(outcome.executed, 2);
        assert_eq!(outcome.queued, 0);

        let order: Vec<String> = fixture
            .log
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect();
        assert_eq!(order, vec!["mod_a", "mod_b"]);
    }

    #[tokio::test]
    async fn test_per_handler_settings_reach_the_handler() {
        let fixture = fixture();
        let mut trigger = Trigger::new();
        trigger.hook = "pages::saved".to_string();
        trigger.actions = vec!["mod_b".to_string()];
        let mut bag = Settings::new();
        bag.insert("x".to_string(), serde_json::json!(1));
        trigger.settings.insert("mod_b".to_string(), bag.clone());
        fixture.triggers.save(&mut trigger);

        let event = HookEvent::new("pages::saved").with_items(vec![1]);
        fixture.dispatcher.dispatch(&event, RunPhase::After).await;

        let log = fixture.log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].1, bag);
    }

    #[tokio::test]
    async fn test_hook_and_phase_filtering() {
        let fixture = fixture();
        saved_trigger(
            &fixture,
            "pages::saved",
            &["mod_a"],
            trigger_flags::DEFAULT,
        );

        let other = HookEvent::new("pages::deleted").with_items(vec![1]);
        let outcome = fixture.dispatcher.dispatch(&other, RunPhase::After).await;
        assert_eq!(outcome.matched, 0);

        // Default flags run after the host operation, not before.
        let event = HookEvent::new("pages::saved").with_items(vec![1]);
        let outcome = fixture.dispatcher.dispatch(&event, RunPhase::Before).await;
        assert_eq!(outcome.matched, 0);
    }

    #[tokio::test]
    async fn test_inactive_trigger_is_skipped() {
        let fixture = fixture();
        saved_trigger(&fixture, "pages::saved", &["mod_a"], trigger_flags::RUN_AFTER);

        let event = HookEvent::new("pages::saved").with_items(vec![1]);
        let outcome = fixture.dispatcher.dispatch(&event, RunPhase::After).await;
        assert_eq!(outcome.matched, 0);
    }

    #[tokio::test]
    async fn test_condition_evaluator_is_consulted() {
        let fixture = fixture();
        let mut trigger = saved_trigger(
            &fixture,
            "pages::saved",
            &["mod_a"],
            trigger_flags::DEFAULT,
        );
        trigger.condition = "never".to_string();
        fixture.triggers.save(&mut trigger);

        let event = HookEvent::new("pages::saved").with_items(vec![1]);
        let outcome = fixture.dispatcher.dispatch(&event, RunPhase::After).await;
        assert_eq!(outcome.matched, 0);
    }

    #[tokio::test]
    async fn test_field_change_cross_check() {
        let fixture = fixture();
        let mut trigger = saved_trigger(
            &fixture,
            "pages::saved",
            &["mod_a"],
            trigger_flags::DEFAULT,
        );
        trigger.field_changes = reflex_core::FieldChanges::parse("+body title");
        fixture.triggers.save(&mut trigger);

        let without_body = HookEvent::new("pages::saved")
            .with_items(vec![1])
            .with_changed_fields(vec!["title".to_string()]);
        let outcome = fixture
            .dispatcher
            .dispatch(&without_body, RunPhase::After)
            .await;
        assert_eq!(outcome.matched, 0);

        let with_body = HookEvent::new("pages::saved")
            .with_items(vec![1])
            .with_changed_fields(vec!["body".to_string()]);
        let outcome = fixture
            .dispatcher
            .dispatch(&with_body, RunPhase::After)
            .await;
        assert_eq!(outcome.matched, 1);
        assert_eq!(outcome.executed, 1);
    }

    #[tokio::test]
    async fn test_deferred_trigger_queues_instead_of_running() {
        let fixture = fixture();
        saved_trigger(
            &fixture,
            "pages::saved",
            &["mod_a", "mod_b"],
            trigger_flags::DEFAULT | trigger_flags::DEFERRED,
        );

        let event = HookEvent::new("pages::saved").with_items(vec![7, 8]);
        let outcome = fixture.dispatcher.dispatch(&event, RunPhase::After).await;

        assert_eq!(outcome.queued, 2);
        assert_eq!(outcome.executed, 0);
        assert!(fixture.log.lock().unwrap().is_empty());

        let queued = fixture.queue.get_all();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].item_ids, vec![7, 8]);
        assert_eq!(queued[0].user_id, 42);
        assert_eq!(queued[0].parent_id, Some(0));
        assert_eq!(queued[0].root_parent_id, Some(0));
    }

    #[tokio::test]
    async fn test_deferred_without_items_is_refused() {
        let fixture = fixture();
        saved_trigger(
            &fixture,
            "pages::saved",
            &["mod_a"],
            trigger_flags::DEFAULT | trigger_flags::DEFERRED,
        );

        let event = HookEvent::new("pages::saved");
        let outcome = fixture.dispatcher.dispatch(&event, RunPhase::After).await;

        assert_eq!(outcome.skipped, 1);
        assert!(fixture.queue.get_all().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_handler_is_skipped() {
        let fixture = fixture();
        saved_trigger(
            &fixture,
            "pages::saved",
            &["mod_missing", "mod_a"],
            trigger_flags::DEFAULT,
        );

        let event = HookEvent::new("pages::saved").with_items(vec![1]);
        let outcome = fixture.dispatcher.dispatch(&event, RunPhase::After).await;

        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.executed, 1);
    }

    #[tokio::test]
    async fn test_failing_handler_counts_as_failed() {
        let fixture = fixture();
        saved_trigger(
            &fixture,
            "pages::saved",
            &["failing"],
            trigger_flags::DEFAULT,
        );

        let event = HookEvent::new("pages::saved").with_items(vec![1]);
        let outcome = fixture.dispatcher.dispatch(&event, RunPhase::After).await;

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.executed, 0);
    }

    #[tokio::test]
    async fn test_run_queued_completes_and_notifies() {
        let fixture = fixture();

        let mut action = Action::new();
        action.title = "Queued work".to_string();
        action.set_module_name("mod_a");
        action.item_ids = vec![1, 2, 3];
        action.set_parent(None);
        action.set_root_parent(None);
        action.flags = action_flags::NOTIFY_EMAIL;
        fixture.queue.save(&mut action).unwrap();

        let mut claimed = fixture.queue.claim_next().unwrap();
        fixture.dispatcher.run_queued(&mut claimed).await.unwrap();

        assert!(claimed.completed);
        assert_eq!(claimed.summary, "mod_a handled 3 items");

        let emails = fixture.notifier.emails.lock().unwrap();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].0, 42);
        assert!(emails[0].1.contains("Status: Completed"));
        assert!(emails[0].1.contains("User: robot"));
        assert!(fixture.notifier.notices.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_queued_unknown_module_errors() {
        let fixture = fixture();
        let mut action = Action::new();
        action.set_module_name("mod_missing");
        action.item_ids = vec![1];

        let err = fixture.dispatcher.run_queued(&mut action).await.unwrap_err();
        assert!(matches!(err, DispatchError::UnknownHandler(_)));
        assert!(!action.completed);
    }

    #[tokio::test]
    async fn test_inline_actions_without_notify_flags_stay_silent() {
        let fixture = fixture();
        saved_trigger(
            &fixture,
            "pages::saved",
            &["mod_a"],
            trigger_flags::DEFAULT | trigger_flags::NOTIFY_EMAIL,
        );

        let event = HookEvent::new("pages::saved").with_items(vec![1]);
        fixture.dispatcher.dispatch(&event, RunPhase::After).await;

        // The trigger's notify flag does not transfer to the action.
        assert!(fixture.notifier.emails.lock().unwrap().is_empty());
    }
}
