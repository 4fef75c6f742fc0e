//! Scheduled intent domain models.
//!
//! An intent is a user-owned trigger definition: a schedule (cron, fixed
//! interval, one-time) or a watched condition (price, silence, event,
//! calendar, news), paired with an action to perform when it fires. The
//! schedule and condition payloads are tagged unions so each trigger type
//! carries exactly one payload shape.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Classification of a scheduled intent.
///
/// Unknown types are preserved as [`TriggerType::Other`] rather than
/// rejected: they are stored with a null `next_check` and never polled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TriggerType {
    /// Cron-expression schedule.
    Cron,
    /// Fixed repeating interval in minutes.
    Interval,
    /// Single future instant.
    Once,
    /// Price threshold condition.
    Price,
    /// No-user-activity condition.
    Silence,
    /// Keyword-matched event condition.
    Event,
    /// Calendar-driven condition.
    Calendar,
    /// Keyword-matched news condition.
    News,
    /// Unrecognized type, kept verbatim.
    Other(String),
}

impl TriggerType {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Cron => "cron",
            Self::Interval => "interval",
            Self::Once => "once",
            Self::Price => "price",
            Self::Silence => "silence",
            Self::Event => "event",
            Self::Calendar => "calendar",
            Self::News => "news",
            Self::Other(name) => name,
        }
    }

    /// Condition-based types are checked on a polling interval rather than
    /// a fixed schedule.
    pub fn is_condition_based(&self) -> bool {
        matches!(
            self,
            Self::Price | Self::Silence | Self::Event | Self::Calendar | Self::News
        )
    }

    /// Whether this is one of the eight recognized types.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<String> for TriggerType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "cron" => Self::Cron,
            "interval" => Self::Interval,
            "once" => Self::Once,
            "price" => Self::Price,
            "silence" => Self::Silence,
            "event" => Self::Event,
            "calendar" => Self::Calendar,
            "news" => Self::News,
            _ => Self::Other(raw),
        }
    }
}

impl From<TriggerType> for String {
    fn from(value: TriggerType) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default polling interval for condition-based triggers, in minutes.
pub const DEFAULT_CHECK_INTERVAL_MINUTES: i64 = 5;

fn default_check_interval() -> i64 {
    DEFAULT_CHECK_INTERVAL_MINUTES
}

/// Type-dependent schedule payload. Exactly one shape per schedule style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerSchedule {
    /// Cron expression (five fields, optional trailing seconds field).
    Cron {
        /// The cron expression string.
        cron: String,
    },
    /// Repeat every `interval_minutes` minutes.
    Interval {
        /// Minutes between fires.
        interval_minutes: i64,
    },
    /// Fire once at a fixed instant.
    Once {
        /// The instant to fire at. Naive timestamps are read as UTC.
        #[serde(deserialize_with = "de_utc")]
        trigger_at: DateTime<Utc>,
    },
    /// Condition polling cadence.
    Check {
        /// Minutes between condition checks.
        #[serde(default = "default_check_interval")]
        check_interval_minutes: i64,
    },
}

/// Type-dependent condition payload for condition-based triggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerCondition {
    /// Price threshold: fire when `ticker` crosses `value` per `operator`.
    Price {
        /// Instrument symbol.
        ticker: String,
        /// Comparison operator (e.g. "gt", "lt").
        operator: String,
        /// Threshold value.
        value: f64,
    },
    /// Fire after `threshold_hours` without user activity.
    Silence {
        /// Hours of silence before firing.
        threshold_hours: f64,
    },
    /// Fire when any keyword matches (event and news types).
    Keywords {
        /// Keywords to match against.
        keywords: Vec<String>,
    },
    /// No condition fields required (calendar type).
    Unspecified {},
}

/// Outcome of a single fire attempt, reported by the executing caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FireOutcome {
    /// The action ran and was delivered.
    Success,
    /// The watched condition was evaluated and not met.
    ConditionNotMet,
    /// A delivery gate blocked the action.
    GateBlocked,
    /// The attempt errored.
    Failed,
}

impl FireOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ConditionNotMet => "condition_not_met",
            Self::GateBlocked => "gate_blocked",
            Self::Failed => "failed",
        }
    }
}

/// A persisted scheduled intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledIntent {
    /// Unique intent identifier.
    pub id: Uuid,
    /// Owning user.
    pub user_id: String,
    /// Optional display name.
    pub intent_name: Option<String>,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Trigger classification.
    pub trigger_type: TriggerType,
    /// Schedule payload, when the type carries one.
    pub trigger_schedule: Option<TriggerSchedule>,
    /// Condition payload, when the type carries one.
    pub trigger_condition: Option<TriggerCondition>,
    /// Action to perform on fire.
    pub action_type: String,
    /// Free-form context handed to the action.
    pub action_context: Option<String>,
    /// Action priority label.
    pub action_priority: String,
    /// When the poller should next consider this intent. Null means the
    /// intent will never fire again.
    pub next_check: Option<DateTime<Utc>>,
    /// Last time a fire was attempted, regardless of outcome.
    pub last_checked: Option<DateTime<Utc>>,
    /// Last successful execution.
    pub last_executed: Option<DateTime<Utc>>,
    /// Count of successful executions.
    pub execution_count: i64,
    /// Outcome of the most recent fire.
    pub last_execution_status: Option<FireOutcome>,
    /// Error message from the most recent fire, if any.
    pub last_execution_error: Option<String>,
    /// Message id produced by the most recent fire, if any.
    pub last_message_id: Option<String>,
    /// Whether the intent is eligible for polling.
    pub enabled: bool,
    /// Optional expiry instant.
    pub expires_at: Option<DateTime<Utc>>,
    /// Optional cap on successful executions.
    pub max_executions: Option<i64>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Creator identifier.
    pub created_by: Option<String>,
    /// Free-form metadata.
    pub metadata: Option<Value>,
}

/// Immutable execution-history row, appended exactly once per fire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentExecution {
    /// Unique execution identifier.
    pub id: Uuid,
    /// The intent that fired.
    pub intent_id: Uuid,
    /// Owning user, denormalized.
    pub user_id: String,
    /// When the fire was recorded.
    pub executed_at: DateTime<Utc>,
    /// Trigger type at fire time, denormalized.
    pub trigger_type: TriggerType,
    /// Evaluated trigger data (e.g. observed price).
    pub trigger_data: Option<Value>,
    /// Fire outcome.
    pub status: FireOutcome,
    /// Delivery-gate evaluation detail.
    pub gate_result: Option<Value>,
    /// Id of the delivered message, if any.
    pub message_id: Option<String>,
    /// Preview of the delivered message, if any.
    pub message_preview: Option<String>,
    /// Condition-evaluation duration.
    pub evaluation_ms: Option<i64>,
    /// Content-generation duration.
    pub generation_ms: Option<i64>,
    /// Delivery duration.
    pub delivery_ms: Option<i64>,
    /// Error detail for failed fires.
    pub error_message: Option<String>,
}

/// Fire outcome report submitted by the executing caller.
#[derive(Debug, Clone, Deserialize)]
pub struct FireReport {
    /// Outcome of the attempt.
    pub status: FireOutcome,
    /// Id of the delivered message, if any.
    pub message_id: Option<String>,
    /// Preview of the delivered message, if any.
    pub message_preview: Option<String>,
    /// Evaluated trigger data.
    pub trigger_data: Option<Value>,
    /// Delivery-gate evaluation detail.
    pub gate_result: Option<Value>,
    /// Condition-evaluation duration.
    pub evaluation_ms: Option<i64>,
    /// Content-generation duration.
    pub generation_ms: Option<i64>,
    /// Delivery duration.
    pub delivery_ms: Option<i64>,
    /// Error detail for failed attempts.
    pub error_message: Option<String>,
}

/// Updated intent state returned to the fire caller.
#[derive(Debug, Clone, Serialize)]
pub struct FireResult {
    /// The fired intent.
    pub intent_id: Uuid,
    /// The reported outcome, echoed back.
    pub status: FireOutcome,
    /// Whether the intent remains enabled.
    pub enabled: bool,
    /// Successful-execution count after this fire.
    pub execution_count: i64,
    /// Recomputed next check, null if the intent will not fire again.
    pub next_check: Option<DateTime<Utc>>,
    /// Reason the fire disabled the intent, if it did.
    pub was_disabled_reason: Option<String>,
}

/// Loose schedule payload as received on the wire.
///
/// Every field is optional so the validator can name each missing field
/// individually; the typed [`TriggerSchedule`] union is built only after
/// validation passes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerSchedulePayload {
    pub cron: Option<String>,
    pub interval_minutes: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_utc")]
    pub trigger_at: Option<DateTime<Utc>>,
    pub check_interval_minutes: Option<i64>,
}

/// Loose condition payload as received on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerConditionPayload {
    pub ticker: Option<String>,
    pub operator: Option<String>,
    pub value: Option<f64>,
    pub threshold_hours: Option<f64>,
    pub keywords: Option<Vec<String>>,
}

fn default_priority() -> String {
    "normal".to_string()
}

/// Intent creation request, validated before any persistence.
#[derive(Debug, Clone, Deserialize)]
pub struct IntentDraft {
    /// Owning user.
    pub user_id: String,
    /// Optional display name.
    pub intent_name: Option<String>,
    /// Optional description.
    pub description: Option<String>,
    /// Trigger classification.
    pub trigger_type: TriggerType,
    /// Loose schedule payload.
    pub trigger_schedule: Option<TriggerSchedulePayload>,
    /// Loose condition payload.
    pub trigger_condition: Option<TriggerConditionPayload>,
    /// Action to perform on fire.
    pub action_type: String,
    /// Free-form context handed to the action.
    pub action_context: Option<String>,
    /// Action priority label.
    #[serde(default = "default_priority")]
    pub action_priority: String,
    /// Optional expiry instant.
    #[serde(default, deserialize_with = "de_opt_utc")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Optional cap on successful executions.
    pub max_executions: Option<i64>,
    /// Creator identifier.
    pub created_by: Option<String>,
    /// Free-form metadata.
    pub metadata: Option<Value>,
}

impl IntentDraft {
    /// Build the typed schedule union for this draft's trigger type.
    ///
    /// Assumes the draft already passed validation; mismatched or absent
    /// payloads yield `None`.
    pub fn resolved_schedule(&self) -> Option<TriggerSchedule> {
        let payload = self.trigger_schedule.as_ref();
        match self.trigger_type {
            TriggerType::Cron => payload?.cron.clone().map(|cron| TriggerSchedule::Cron { cron }),
            TriggerType::Interval => payload?
                .interval_minutes
                .map(|interval_minutes| TriggerSchedule::Interval { interval_minutes }),
            TriggerType::Once => payload?
                .trigger_at
                .map(|trigger_at| TriggerSchedule::Once { trigger_at }),
            _ if self.trigger_type.is_condition_based() => payload.map(|p| TriggerSchedule::Check {
                check_interval_minutes: p
                    .check_interval_minutes
                    .unwrap_or(DEFAULT_CHECK_INTERVAL_MINUTES),
            }),
            _ => None,
        }
    }

    /// Build the typed condition union for this draft's trigger type.
    pub fn resolved_condition(&self) -> Option<TriggerCondition> {
        let payload = self.trigger_condition.as_ref()?;
        match self.trigger_type {
            TriggerType::Price => match (&payload.ticker, &payload.operator, payload.value) {
                (Some(ticker), Some(operator), Some(value)) => Some(TriggerCondition::Price {
                    ticker: ticker.clone(),
                    operator: operator.clone(),
                    value,
                }),
                _ => None,
            },
            TriggerType::Silence => payload
                .threshold_hours
                .map(|threshold_hours| TriggerCondition::Silence { threshold_hours }),
            TriggerType::Event | TriggerType::News => payload
                .keywords
                .clone()
                .map(|keywords| TriggerCondition::Keywords { keywords }),
            TriggerType::Calendar => Some(TriggerCondition::Unspecified {}),
            _ => None,
        }
    }

    /// Materialize a persisted intent from this draft.
    pub fn into_intent(
        self,
        id: Uuid,
        next_check: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> ScheduledIntent {
        let trigger_schedule = self.resolved_schedule();
        let trigger_condition = self.resolved_condition();
        ScheduledIntent {
            id,
            user_id: self.user_id,
            intent_name: self.intent_name,
            description: self.description,
            trigger_type: self.trigger_type,
            trigger_schedule,
            trigger_condition,
            action_type: self.action_type,
            action_context: self.action_context,
            action_priority: self.action_priority,
            next_check,
            last_checked: None,
            last_executed: None,
            execution_count: 0,
            last_execution_status: None,
            last_execution_error: None,
            last_message_id: None,
            enabled: true,
            expires_at: self.expires_at,
            max_executions: self.max_executions,
            created_at: now,
            updated_at: now,
            created_by: self.created_by,
            metadata: self.metadata,
        }
    }
}

/// Parse an RFC 3339 timestamp, accepting naive forms as UTC.
pub fn parse_flexible_utc(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(format!("unrecognized timestamp '{raw}'"))
}

fn de_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_flexible_utc(&raw).map_err(serde::de::Error::custom)
}

fn de_opt_utc<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| parse_flexible_utc(&s).map_err(serde::de::Error::custom))
        .transpose()
}
