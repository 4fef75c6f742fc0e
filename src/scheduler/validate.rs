//! Intent creation validation.
//!
//! All checks run before any database mutation and every failure is
//! collected, so a caller gets the complete list of problems in one
//! response instead of fixing them one request at a time.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::domain::{IntentDraft, TriggerType};
use crate::scheduler::cron::CronParser;

/// Maximum enabled triggers a single user may hold.
pub const MAX_TRIGGERS_PER_USER: i64 = 25;

/// Minimum seconds between consecutive cron fires.
pub const CRON_MIN_INTERVAL_SECONDS: i64 = 60;

/// Maximum cron fires in any 24-hour window.
pub const CRON_MAX_FIRES_PER_DAY: usize = 96;

/// Minimum minutes for an interval trigger.
pub const INTERVAL_MIN_MINUTES: i64 = 5;

/// Outcome of validating an [`IntentDraft`].
#[derive(Debug, Clone)]
pub struct ValidationReport {
    /// Human-readable messages, one per failed check. Empty means valid.
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate an intent creation request.
///
/// `enabled_trigger_count` is the user's current enabled-trigger count, or
/// `None` when the count could not be obtained. A missing count skips the
/// limit check rather than failing it: a storage hiccup should not reject
/// an otherwise valid request.
pub fn validate(
    draft: &IntentDraft,
    enabled_trigger_count: Option<i64>,
    now: DateTime<Utc>,
) -> ValidationReport {
    let mut errors: Vec<String> = Vec::new();

    if let Some(count) = enabled_trigger_count {
        if count >= MAX_TRIGGERS_PER_USER {
            errors.push(format!(
                "Limit reached: {MAX_TRIGGERS_PER_USER} active triggers max"
            ));
            info!(
                user_id = %draft.user_id,
                count,
                limit = MAX_TRIGGERS_PER_USER,
                "intent validation: trigger limit exceeded"
            );
        }
    }

    // Required fields run before the type-specific checks so a missing field
    // is reported ahead of derived complaints about it.
    check_required_fields(draft, &mut errors);

    match draft.trigger_type {
        TriggerType::Cron => {
            if let Some(cron) = draft
                .trigger_schedule
                .as_ref()
                .and_then(|s| s.cron.as_deref())
            {
                check_cron_frequency(cron, now, &mut errors);
            }
        }
        TriggerType::Interval => {
            if let Some(interval) = draft
                .trigger_schedule
                .as_ref()
                .and_then(|s| s.interval_minutes)
            {
                if interval < INTERVAL_MIN_MINUTES {
                    errors.push(format!(
                        "Interval too short: {interval}m. Minimum: {INTERVAL_MIN_MINUTES}m"
                    ));
                }
            }
        }
        TriggerType::Once => {
            if let Some(trigger_at) = draft
                .trigger_schedule
                .as_ref()
                .and_then(|s| s.trigger_at)
            {
                if trigger_at <= now {
                    errors.push("One-time trigger must be in the future".to_string());
                }
            }
        }
        _ => {}
    }

    if errors.is_empty() {
        info!(
            user_id = %draft.user_id,
            trigger_type = %draft.trigger_type,
            "intent validation passed"
        );
    } else {
        warn!(
            user_id = %draft.user_id,
            trigger_type = %draft.trigger_type,
            error_count = errors.len(),
            "intent validation failed"
        );
    }

    ValidationReport { errors }
}

/// Required fields per trigger type. Calendar intentionally requires none
/// beyond the condition object itself.
fn required_fields(trigger_type: &TriggerType) -> Option<(&'static str, &'static [&'static str])> {
    match trigger_type {
        TriggerType::Cron => Some(("trigger_schedule", &["cron"])),
        TriggerType::Interval => Some(("trigger_schedule", &["interval_minutes"])),
        TriggerType::Once => Some(("trigger_schedule", &["trigger_at"])),
        TriggerType::Price => Some(("trigger_condition", &["ticker", "operator", "value"])),
        TriggerType::Silence => Some(("trigger_condition", &["threshold_hours"])),
        TriggerType::Event | TriggerType::News => Some(("trigger_condition", &["keywords"])),
        TriggerType::Calendar => Some(("trigger_condition", &[])),
        TriggerType::Other(_) => None,
    }
}

fn check_required_fields(draft: &IntentDraft, errors: &mut Vec<String>) {
    let Some((container, fields)) = required_fields(&draft.trigger_type) else {
        warn!(
            trigger_type = %draft.trigger_type,
            "intent validation: unknown trigger type, skipping required fields"
        );
        return;
    };

    let trigger_type = &draft.trigger_type;
    for field in fields {
        let present = match container {
            "trigger_schedule" => draft.trigger_schedule.as_ref().is_some_and(|s| match *field {
                "cron" => s.cron.is_some(),
                "interval_minutes" => s.interval_minutes.is_some(),
                "trigger_at" => s.trigger_at.is_some(),
                _ => false,
            }),
            _ => draft.trigger_condition.as_ref().is_some_and(|c| match *field {
                "ticker" => c.ticker.is_some(),
                "operator" => c.operator.is_some(),
                "value" => c.value.is_some(),
                "threshold_hours" => c.threshold_hours.is_some(),
                "keywords" => c.keywords.is_some(),
                _ => false,
            }),
        };
        if !present {
            errors.push(format!(
                "{container}.{field} required for type '{trigger_type}'"
            ));
        }
    }
}

/// Frequency checks for cron triggers: the gap between the first two future
/// occurrences must be at least a minute, and a day must hold at most
/// [`CRON_MAX_FIRES_PER_DAY`] fires.
fn check_cron_frequency(cron: &str, now: DateTime<Utc>, errors: &mut Vec<String>) {
    let expr = match CronParser::parse(cron) {
        Ok(expr) => expr,
        Err(e) => {
            errors.push(format!("Invalid cron expression: {e}"));
            warn!(expression = cron, error = %e, "intent validation: cron parse failed");
            return;
        }
    };

    if let Some(gap) = expr.first_gap_seconds(&now) {
        if gap < CRON_MIN_INTERVAL_SECONDS {
            errors.push(format!(
                "Cron too frequent: every {gap}s. Minimum: {CRON_MIN_INTERVAL_SECONDS}s"
            ));
        }
    }

    let fire_count = expr.fires_within_24h(&now);
    if fire_count > CRON_MAX_FIRES_PER_DAY {
        errors.push(format!(
            "Cron would fire {fire_count}x/day. Max: {CRON_MAX_FIRES_PER_DAY}"
        ));
    }
}
