//! Intent lifecycle engine: validated creation, reschedule-aware updates,
//! and the fire recording protocol.
//!
//! A fire moves an intent through `due -> firing -> rescheduled | disabled`.
//! The persistence step is a compare-and-swap on `next_check` inside one
//! transaction together with the execution-history insert, so two pollers
//! racing on the same due intent produce exactly one execution row.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::{Database, IntentRepository};
use crate::domain::{
    FireOutcome, FireReport, FireResult, IntentDraft, IntentExecution, ScheduledIntent,
    TriggerConditionPayload, TriggerSchedulePayload, TriggerType,
};
use crate::error::EngineError;
use crate::events::{MirrorEvent, MirrorSink};
use crate::scheduler::next_check::{initial_next_check, next_check_after_fire};
use crate::scheduler::validate;

/// Partial update for an existing intent. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntentUpdate {
    pub intent_name: Option<String>,
    pub description: Option<String>,
    pub trigger_type: Option<TriggerType>,
    pub trigger_schedule: Option<TriggerSchedulePayload>,
    pub trigger_condition: Option<TriggerConditionPayload>,
    pub action_type: Option<String>,
    pub action_context: Option<String>,
    pub action_priority: Option<String>,
    pub enabled: Option<bool>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_executions: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

impl IntentUpdate {
    fn touches_trigger(&self) -> bool {
        self.trigger_type.is_some()
            || self.trigger_schedule.is_some()
            || self.trigger_condition.is_some()
    }
}

/// Orchestrates intent creation and firing against the repository.
#[derive(Clone)]
pub struct IntentEngine {
    db: Database,
    mirror: MirrorSink,
}

impl std::fmt::Debug for IntentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentEngine").field("db", &self.db).finish()
    }
}

impl IntentEngine {
    pub fn new(db: Database, mirror: MirrorSink) -> Self {
        Self { db, mirror }
    }

    /// Validate and persist a new intent.
    ///
    /// The enabled-trigger count is read best-effort: a failed lookup skips
    /// the cap rule rather than rejecting the request.
    pub async fn create(&self, draft: IntentDraft) -> Result<ScheduledIntent, EngineError> {
        let now = Utc::now();

        let count = match self.db.count_enabled_intents(&draft.user_id).await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(user_id = %draft.user_id, error = %e, "trigger count lookup failed, skipping cap check");
                None
            }
        };

        let report = validate::validate(&draft, count, now);
        if !report.is_valid() {
            return Err(EngineError::Validation(report.errors));
        }

        if !draft.trigger_type.is_known() {
            info!(
                user_id = %draft.user_id,
                trigger_type = %draft.trigger_type,
                "unknown trigger type accepted, will never be polled"
            );
        }

        let schedule = draft.resolved_schedule();
        let next_check = initial_next_check(&draft.trigger_type, schedule.as_ref(), now);
        let intent = draft.into_intent(Uuid::new_v4(), next_check, now);

        self.db.create_intent(&intent).await?;
        info!(
            intent_id = %intent.id,
            user_id = %intent.user_id,
            trigger_type = %intent.trigger_type,
            next_check = ?intent.next_check,
            "intent created"
        );
        Ok(intent)
    }

    /// Apply a partial update, recomputing `next_check` when the trigger
    /// definition changed.
    pub async fn update(
        &self,
        id: Uuid,
        update: IntentUpdate,
    ) -> Result<ScheduledIntent, EngineError> {
        let mut intent = self
            .db
            .get_intent(id)
            .await?
            .ok_or(EngineError::NotFound)?;
        let now = Utc::now();
        let reschedule = update.touches_trigger();

        if let Some(name) = update.intent_name {
            intent.intent_name = Some(name);
        }
        if let Some(description) = update.description {
            intent.description = Some(description);
        }
        if let Some(action_type) = update.action_type {
            intent.action_type = action_type;
        }
        if let Some(action_context) = update.action_context {
            intent.action_context = Some(action_context);
        }
        if let Some(action_priority) = update.action_priority {
            intent.action_priority = action_priority;
        }
        if let Some(enabled) = update.enabled {
            intent.enabled = enabled;
        }
        if let Some(expires_at) = update.expires_at {
            intent.expires_at = Some(expires_at);
        }
        if let Some(max_executions) = update.max_executions {
            intent.max_executions = Some(max_executions);
        }
        if let Some(metadata) = update.metadata {
            intent.metadata = Some(metadata);
        }

        if reschedule {
            // Rebuild the trigger definition through the same validation
            // path a fresh create takes; the cap rule does not re-apply.
            let draft = IntentDraft {
                user_id: intent.user_id.clone(),
                intent_name: intent.intent_name.clone(),
                description: intent.description.clone(),
                trigger_type: update.trigger_type.unwrap_or(intent.trigger_type.clone()),
                trigger_schedule: update.trigger_schedule,
                trigger_condition: update.trigger_condition,
                action_type: intent.action_type.clone(),
                action_context: intent.action_context.clone(),
                action_priority: intent.action_priority.clone(),
                expires_at: intent.expires_at,
                max_executions: intent.max_executions,
                created_by: intent.created_by.clone(),
                metadata: intent.metadata.clone(),
            };

            let report = validate::validate(&draft, None, now);
            if !report.is_valid() {
                return Err(EngineError::Validation(report.errors));
            }

            intent.trigger_type = draft.trigger_type.clone();
            intent.trigger_schedule = draft.resolved_schedule();
            intent.trigger_condition = draft.resolved_condition();
            intent.next_check =
                initial_next_check(&intent.trigger_type, intent.trigger_schedule.as_ref(), now);
        }

        intent.updated_at = now;

        if !self.db.update_intent(&intent).await? {
            return Err(EngineError::NotFound);
        }
        Ok(intent)
    }

    /// Record a fire outcome for an intent.
    pub async fn fire(&self, id: Uuid, report: FireReport) -> Result<FireResult, EngineError> {
        let intent = self
            .db
            .get_intent(id)
            .await?
            .ok_or(EngineError::NotFound)?;
        let now = Utc::now();
        let expected_next_check = intent.next_check;

        let mut updated = intent.clone();
        updated.last_checked = Some(now);
        updated.last_execution_status = Some(report.status);
        updated.last_execution_error = report.error_message.clone();
        if let Some(ref message_id) = report.message_id {
            updated.last_message_id = Some(message_id.clone());
        }

        if report.status == FireOutcome::Success {
            updated.execution_count += 1;
            updated.last_executed = Some(now);
        }

        updated.next_check = next_check_after_fire(
            &updated.trigger_type,
            updated.trigger_schedule.as_ref(),
            report.status,
            now,
        );

        let mut was_disabled_reason = None;
        if updated.trigger_type == TriggerType::Once && report.status == FireOutcome::Success {
            updated.enabled = false;
            updated.next_check = None;
            was_disabled_reason = Some("one-time trigger executed".to_string());
        }
        if let Some(max) = updated.max_executions {
            // next_check stays as computed here; only the enabled flag drops.
            if updated.execution_count >= max {
                updated.enabled = false;
                was_disabled_reason = Some(format!("max_executions reached ({max})"));
            }
        }
        updated.updated_at = now;

        let execution = IntentExecution {
            id: Uuid::new_v4(),
            intent_id: updated.id,
            user_id: updated.user_id.clone(),
            executed_at: now,
            trigger_type: updated.trigger_type.clone(),
            trigger_data: report.trigger_data,
            status: report.status,
            gate_result: report.gate_result,
            message_id: report.message_id,
            message_preview: report.message_preview,
            evaluation_ms: report.evaluation_ms,
            generation_ms: report.generation_ms,
            delivery_ms: report.delivery_ms,
            error_message: report.error_message,
        };

        let swapped = self
            .db
            .record_fire(&updated, expected_next_check, &execution)
            .await?;
        if !swapped {
            warn!(intent_id = %id, "fire lost the next_check race, no writes performed");
            return Err(EngineError::Conflict);
        }

        info!(
            intent_id = %id,
            status = report.status.as_str(),
            execution_count = updated.execution_count,
            enabled = updated.enabled,
            next_check = ?updated.next_check,
            "fire recorded"
        );

        self.mirror.publish(MirrorEvent::IntentFired {
            intent_id: updated.id,
            user_id: updated.user_id.clone(),
            status: report.status.as_str().to_string(),
            enabled: updated.enabled,
        });

        Ok(FireResult {
            intent_id: updated.id,
            status: report.status,
            enabled: updated.enabled,
            execution_count: updated.execution_count,
            next_check: updated.next_check,
            was_disabled_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::IntentRepository;
    use chrono::Duration;

    fn engine() -> IntentEngine {
        IntentEngine::new(Database::in_memory(), MirrorSink::spawn())
    }

    fn interval_draft(minutes: i64) -> IntentDraft {
        IntentDraft {
            user_id: "user-1".to_string(),
            intent_name: Some("check in".to_string()),
            description: None,
            trigger_type: TriggerType::Interval,
            trigger_schedule: Some(TriggerSchedulePayload {
                interval_minutes: Some(minutes),
                ..Default::default()
            }),
            trigger_condition: None,
            action_type: "notify".to_string(),
            action_context: None,
            action_priority: "normal".to_string(),
            expires_at: None,
            max_executions: None,
            created_by: None,
            metadata: None,
        }
    }

    fn success_report() -> FireReport {
        FireReport {
            status: FireOutcome::Success,
            message_id: Some("msg-1".to_string()),
            message_preview: Some("hello".to_string()),
            trigger_data: None,
            gate_result: None,
            evaluation_ms: Some(12),
            generation_ms: Some(340),
            delivery_ms: Some(55),
            error_message: None,
        }
    }

    #[tokio::test]
    async fn create_rejects_invalid_draft_with_all_errors() {
        let engine = engine();
        let err = engine.create(interval_draft(2)).await.unwrap_err();
        let EngineError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors, vec!["Interval too short: 2m. Minimum: 5m".to_string()]);
    }

    #[tokio::test]
    async fn create_schedules_interval_in_the_future() {
        let engine = engine();
        let before = Utc::now();
        let intent = engine.create(interval_draft(30)).await.unwrap();
        let next = intent.next_check.expect("interval intent gets a next_check");
        assert!(next >= before + Duration::minutes(30));
        assert!(next <= Utc::now() + Duration::minutes(30));
        assert!(intent.enabled);
        assert_eq!(intent.execution_count, 0);
    }

    #[tokio::test]
    async fn fire_success_on_interval_increments_and_reschedules() {
        let engine = engine();
        let intent = engine.create(interval_draft(30)).await.unwrap();

        let result = engine.fire(intent.id, success_report()).await.unwrap();
        assert_eq!(result.execution_count, 1);
        assert!(result.enabled);
        assert!(result.next_check.unwrap() > Utc::now());
        assert!(result.was_disabled_reason.is_none());

        let stored = engine.db.get_intent(intent.id).await.unwrap().unwrap();
        assert_eq!(stored.execution_count, 1);
        assert!(stored.last_checked.is_some());
        assert!(stored.last_executed.is_some());
        assert_eq!(stored.last_message_id.as_deref(), Some("msg-1"));
    }

    #[tokio::test]
    async fn fire_failed_does_not_increment_count() {
        let engine = engine();
        let intent = engine.create(interval_draft(30)).await.unwrap();

        let report = FireReport {
            status: FireOutcome::Failed,
            error_message: Some("delivery timeout".to_string()),
            ..success_report()
        };
        let result = engine.fire(intent.id, report).await.unwrap();
        assert_eq!(result.execution_count, 0);
        assert!(result.enabled);

        let stored = engine.db.get_intent(intent.id).await.unwrap().unwrap();
        assert_eq!(stored.last_execution_status, Some(FireOutcome::Failed));
        assert_eq!(
            stored.last_execution_error.as_deref(),
            Some("delivery timeout")
        );
        assert!(stored.last_executed.is_none());
    }

    #[tokio::test]
    async fn fire_success_on_once_disables_permanently() {
        let engine = engine();
        let mut draft = interval_draft(30);
        draft.trigger_type = TriggerType::Once;
        draft.trigger_schedule = Some(TriggerSchedulePayload {
            trigger_at: Some(Utc::now() + Duration::hours(1)),
            ..Default::default()
        });
        let intent = engine.create(draft).await.unwrap();

        let result = engine.fire(intent.id, success_report()).await.unwrap();
        assert!(!result.enabled);
        assert_eq!(result.next_check, None);
        assert_eq!(
            result.was_disabled_reason.as_deref(),
            Some("one-time trigger executed")
        );
    }

    #[tokio::test]
    async fn fire_reaching_max_executions_disables() {
        let engine = engine();
        let mut draft = interval_draft(30);
        draft.max_executions = Some(3);
        let intent = engine.create(draft).await.unwrap();

        // Seed the counter at 2 so the next success reaches the cap.
        let mut seeded = engine.db.get_intent(intent.id).await.unwrap().unwrap();
        seeded.execution_count = 2;
        assert!(engine.db.update_intent(&seeded).await.unwrap());

        let result = engine.fire(intent.id, success_report()).await.unwrap();
        assert_eq!(result.execution_count, 3);
        assert!(!result.enabled);
        assert_eq!(
            result.was_disabled_reason.as_deref(),
            Some("max_executions reached (3)")
        );
        // The cap disables but does not null the schedule.
        assert!(result.next_check.is_some());
    }

    #[tokio::test]
    async fn fire_on_missing_intent_is_not_found_and_writes_nothing() {
        let engine = engine();
        let missing_id = Uuid::new_v4();
        let err = engine.fire(missing_id, success_report()).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound));

        // No execution row and no intent row may appear as a side effect.
        let history = engine.db.list_executions(missing_id, 10, 0).await.unwrap();
        assert!(history.is_empty());
        assert!(engine.db.get_intent(missing_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_fire_loses_cas_and_appends_nothing() {
        let engine = engine();
        let intent = engine.create(interval_draft(30)).await.unwrap();

        // First fire moves next_check; a second fire computed against the
        // stale snapshot would race. Simulate by shifting next_check under
        // the engine between load and swap: easiest is to fire twice and
        // then replay the stale expected value directly.
        engine.fire(intent.id, success_report()).await.unwrap();

        let stale = intent.clone();
        let execution = IntentExecution {
            id: Uuid::new_v4(),
            intent_id: intent.id,
            user_id: intent.user_id.clone(),
            executed_at: Utc::now(),
            trigger_type: intent.trigger_type.clone(),
            trigger_data: None,
            status: FireOutcome::Success,
            gate_result: None,
            message_id: None,
            message_preview: None,
            evaluation_ms: None,
            generation_ms: None,
            delivery_ms: None,
            error_message: None,
        };
        let swapped = engine
            .db
            .record_fire(&stale, intent.next_check, &execution)
            .await
            .unwrap();
        assert!(!swapped, "stale next_check must lose the swap");

        let history = engine.db.list_executions(intent.id, 10, 0).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn update_reschedules_when_trigger_changes() {
        let engine = engine();
        let intent = engine.create(interval_draft(30)).await.unwrap();

        let updated = engine
            .update(
                intent.id,
                IntentUpdate {
                    trigger_schedule: Some(TriggerSchedulePayload {
                        interval_minutes: Some(120),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let next = updated.next_check.unwrap();
        assert!(next > Utc::now() + Duration::minutes(100));
    }

    #[tokio::test]
    async fn update_without_trigger_change_keeps_next_check() {
        let engine = engine();
        let intent = engine.create(interval_draft(30)).await.unwrap();

        let updated = engine
            .update(
                intent.id,
                IntentUpdate {
                    intent_name: Some("renamed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.next_check, intent.next_check);
        assert_eq!(updated.intent_name.as_deref(), Some("renamed"));
    }

    #[tokio::test]
    async fn unknown_trigger_type_creates_unpollable_intent() {
        let engine = engine();
        let mut draft = interval_draft(30);
        draft.trigger_type = TriggerType::Other("weather".to_string());
        draft.trigger_schedule = None;
        let intent = engine.create(draft).await.unwrap();
        assert_eq!(intent.next_check, None);

        let pending = engine
            .db
            .list_pending(Utc::now() + Duration::days(365), None)
            .await
            .unwrap();
        assert!(pending.is_empty());
    }
}
