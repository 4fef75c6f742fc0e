//! Scheduled intent lifecycle engine.
//!
//! - [`cron`]: cron expression parsing and next-occurrence math.
//! - [`validate`]: all-errors-collected creation validation.
//! - [`next_check`]: pure next-wake computation at creation and after fires.
//! - [`fire`]: the engine orchestrating creation, updates, and fire recording.

pub mod cron;
pub mod fire;
pub mod next_check;
pub mod validate;

pub use cron::{CronExpression, CronParser};
pub use fire::{IntentEngine, IntentUpdate};
pub use next_check::{initial_next_check, next_check_after_fire};
pub use validate::{validate, ValidationReport};
