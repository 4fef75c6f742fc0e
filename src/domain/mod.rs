//! Core domain models.

pub mod intent;
pub mod memory;
pub mod portfolio;

pub use intent::{
    FireOutcome, FireReport, FireResult, IntentDraft, IntentExecution, ScheduledIntent,
    TriggerCondition, TriggerConditionPayload, TriggerSchedule, TriggerSchedulePayload,
    TriggerType,
};
pub use memory::{ExtractedMemory, MemoryKind, MemoryLayer, MemoryRecord, Message, MessageRole};
pub use portfolio::{normalize_ticker, Holding, HoldingDraft, OwnershipIntent};
