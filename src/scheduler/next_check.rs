//! Next-check computation for scheduled intents.
//!
//! Two pure functions decide when the due-poller should look at an intent
//! again: once at creation, and once after every fire. Both take the current
//! instant as a parameter so they are testable without touching the clock.
//!
//! Invalid cron syntax is handled asymmetrically on purpose: it is a
//! validation error at creation time, but here it degrades to a fallback
//! check time so an existing intent whose expression stopped parsing still
//! gets polled instead of going quiet.

use chrono::{DateTime, Duration, Utc};

use crate::domain::intent::DEFAULT_CHECK_INTERVAL_MINUTES;
use crate::domain::{FireOutcome, TriggerSchedule, TriggerType};
use crate::scheduler::cron::CronParser;

/// Backoff after a failed fire, in minutes. Applies to every trigger type.
pub const FAILURE_BACKOFF_MINUTES: i64 = 15;

/// Recheck delay after `condition_not_met` and `gate_blocked` outcomes, and
/// the fallback for unparsable cron expressions after a successful fire.
pub const RETRY_BACKOFF_MINUTES: i64 = 5;

/// Next check time for a newly created intent.
///
/// Returns `None` when the intent should never be polled: unknown trigger
/// types, or a schedule-requiring type without a usable schedule.
pub fn initial_next_check(
    trigger_type: &TriggerType,
    schedule: Option<&TriggerSchedule>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match trigger_type {
        TriggerType::Cron => match schedule {
            Some(TriggerSchedule::Cron { cron }) => {
                // Unparsable or horizon-exhausted expressions fall back to an
                // immediate check rather than erroring.
                Some(
                    CronParser::parse(cron)
                        .ok()
                        .and_then(|expr| expr.next_after(&now))
                        .unwrap_or(now),
                )
            }
            _ => None,
        },
        TriggerType::Interval => match schedule {
            Some(TriggerSchedule::Interval { interval_minutes }) => {
                Some(now + Duration::minutes(*interval_minutes))
            }
            _ => None,
        },
        TriggerType::Once => match schedule {
            // Taken verbatim, even if in the past: validation is responsible
            // for rejecting past instants at creation.
            Some(TriggerSchedule::Once { trigger_at }) => Some(*trigger_at),
            _ => None,
        },
        t if t.is_condition_based() => Some(now), // immediate first check
        _ => None,
    }
}

/// Next check time after a fire with the given outcome.
///
/// `failed` and the soft outcomes apply a uniform backoff regardless of
/// trigger type; only `success` consults the schedule. A successful one-time
/// trigger returns `None` and will never be polled again.
pub fn next_check_after_fire(
    trigger_type: &TriggerType,
    schedule: Option<&TriggerSchedule>,
    outcome: FireOutcome,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match outcome {
        FireOutcome::Failed => return Some(now + Duration::minutes(FAILURE_BACKOFF_MINUTES)),
        FireOutcome::ConditionNotMet | FireOutcome::GateBlocked => {
            return Some(now + Duration::minutes(RETRY_BACKOFF_MINUTES));
        }
        FireOutcome::Success => {}
    }

    match trigger_type {
        TriggerType::Cron => {
            let next = match schedule {
                Some(TriggerSchedule::Cron { cron }) => CronParser::parse(cron)
                    .ok()
                    .and_then(|expr| expr.next_after(&now)),
                _ => None,
            };
            // Same bucket as condition_not_met, not an error.
            Some(next.unwrap_or_else(|| now + Duration::minutes(RETRY_BACKOFF_MINUTES)))
        }
        TriggerType::Interval => match schedule {
            Some(TriggerSchedule::Interval { interval_minutes }) => {
                Some(now + Duration::minutes(*interval_minutes))
            }
            _ => None,
        },
        TriggerType::Once => None,
        t if t.is_condition_based() => {
            let minutes = match schedule {
                Some(TriggerSchedule::Check {
                    check_interval_minutes,
                }) => *check_interval_minutes,
                _ => DEFAULT_CHECK_INTERVAL_MINUTES,
            };
            Some(now + Duration::minutes(minutes))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 10, 0, 0).unwrap()
    }

    #[test]
    fn initial_cron_next_occurrence() {
        let schedule = TriggerSchedule::Cron {
            cron: "0 9 * * *".to_string(),
        };
        let result = initial_next_check(&TriggerType::Cron, Some(&schedule), fixed_now());
        assert_eq!(
            result,
            Some(Utc.with_ymd_and_hms(2025, 6, 16, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn initial_cron_invalid_expression_falls_back_to_now() {
        let schedule = TriggerSchedule::Cron {
            cron: "invalid cron".to_string(),
        };
        let result = initial_next_check(&TriggerType::Cron, Some(&schedule), fixed_now());
        assert_eq!(result, Some(fixed_now()));
    }

    #[test]
    fn initial_interval_adds_minutes() {
        for minutes in [5, 15, 30, 60, 120, 1440] {
            let schedule = TriggerSchedule::Interval {
                interval_minutes: minutes,
            };
            let result = initial_next_check(&TriggerType::Interval, Some(&schedule), fixed_now());
            assert_eq!(result, Some(fixed_now() + Duration::minutes(minutes)));
        }
    }

    #[test]
    fn initial_once_returns_trigger_at_verbatim() {
        let future = fixed_now() + Duration::hours(24);
        let schedule = TriggerSchedule::Once { trigger_at: future };
        assert_eq!(
            initial_next_check(&TriggerType::Once, Some(&schedule), fixed_now()),
            Some(future)
        );

        // Even a past instant is returned; validation prevents it upstream.
        let past = fixed_now() - Duration::hours(1);
        let schedule = TriggerSchedule::Once { trigger_at: past };
        assert_eq!(
            initial_next_check(&TriggerType::Once, Some(&schedule), fixed_now()),
            Some(past)
        );
    }

    #[test]
    fn initial_condition_types_check_immediately() {
        for t in [
            TriggerType::Price,
            TriggerType::Silence,
            TriggerType::Event,
            TriggerType::Calendar,
            TriggerType::News,
        ] {
            assert_eq!(initial_next_check(&t, None, fixed_now()), Some(fixed_now()));
        }
    }

    #[test]
    fn initial_missing_schedule_returns_none() {
        assert_eq!(initial_next_check(&TriggerType::Cron, None, fixed_now()), None);
        assert_eq!(
            initial_next_check(&TriggerType::Interval, None, fixed_now()),
            None
        );
        assert_eq!(initial_next_check(&TriggerType::Once, None, fixed_now()), None);
    }

    #[test]
    fn initial_unknown_type_returns_none() {
        let t = TriggerType::Other("weather".to_string());
        assert_eq!(initial_next_check(&t, None, fixed_now()), None);
    }

    #[test]
    fn initial_mismatched_schedule_counts_as_missing() {
        let schedule = TriggerSchedule::Interval {
            interval_minutes: 30,
        };
        assert_eq!(
            initial_next_check(&TriggerType::Cron, Some(&schedule), fixed_now()),
            None
        );
    }

    #[test]
    fn after_fire_failed_is_uniform_backoff() {
        let schedules: [Option<TriggerSchedule>; 2] = [
            None,
            Some(TriggerSchedule::Interval {
                interval_minutes: 30,
            }),
        ];
        for t in [
            TriggerType::Cron,
            TriggerType::Interval,
            TriggerType::Once,
            TriggerType::Price,
            TriggerType::Silence,
        ] {
            for schedule in &schedules {
                assert_eq!(
                    next_check_after_fire(&t, schedule.as_ref(), FireOutcome::Failed, fixed_now()),
                    Some(fixed_now() + Duration::minutes(15)),
                    "failed backoff for {t}"
                );
            }
        }
    }

    #[test]
    fn after_fire_soft_outcomes_are_five_minutes() {
        let schedule = TriggerSchedule::Interval {
            interval_minutes: 60,
        };
        assert_eq!(
            next_check_after_fire(
                &TriggerType::Interval,
                Some(&schedule),
                FireOutcome::ConditionNotMet,
                fixed_now()
            ),
            Some(fixed_now() + Duration::minutes(5))
        );

        let schedule = TriggerSchedule::Cron {
            cron: "0 * * * *".to_string(),
        };
        assert_eq!(
            next_check_after_fire(
                &TriggerType::Cron,
                Some(&schedule),
                FireOutcome::GateBlocked,
                fixed_now()
            ),
            Some(fixed_now() + Duration::minutes(5))
        );
    }

    #[test]
    fn after_fire_success_cron_uses_next_occurrence() {
        let schedule = TriggerSchedule::Cron {
            cron: "0 9 * * *".to_string(),
        };
        let result = next_check_after_fire(
            &TriggerType::Cron,
            Some(&schedule),
            FireOutcome::Success,
            fixed_now(),
        );
        assert_eq!(
            result,
            Some(Utc.with_ymd_and_hms(2025, 6, 16, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn after_fire_success_cron_invalid_falls_back_five_minutes() {
        let schedule = TriggerSchedule::Cron {
            cron: "not a cron".to_string(),
        };
        let result = next_check_after_fire(
            &TriggerType::Cron,
            Some(&schedule),
            FireOutcome::Success,
            fixed_now(),
        );
        assert_eq!(result, Some(fixed_now() + Duration::minutes(5)));
    }

    #[test]
    fn after_fire_success_interval_adds_minutes() {
        let schedule = TriggerSchedule::Interval {
            interval_minutes: 45,
        };
        let result = next_check_after_fire(
            &TriggerType::Interval,
            Some(&schedule),
            FireOutcome::Success,
            fixed_now(),
        );
        assert_eq!(result, Some(fixed_now() + Duration::minutes(45)));
    }

    #[test]
    fn after_fire_success_once_never_reschedules() {
        let schedule = TriggerSchedule::Once {
            trigger_at: fixed_now(),
        };
        assert_eq!(
            next_check_after_fire(
                &TriggerType::Once,
                Some(&schedule),
                FireOutcome::Success,
                fixed_now()
            ),
            None
        );
    }

    #[test]
    fn after_fire_success_condition_types_use_check_interval() {
        let schedule = TriggerSchedule::Check {
            check_interval_minutes: 20,
        };
        for t in [
            TriggerType::Price,
            TriggerType::Silence,
            TriggerType::Event,
            TriggerType::Calendar,
            TriggerType::News,
        ] {
            assert_eq!(
                next_check_after_fire(&t, Some(&schedule), FireOutcome::Success, fixed_now()),
                Some(fixed_now() + Duration::minutes(20)),
                "check interval for {t}"
            );
        }
    }

    #[test]
    fn after_fire_success_condition_default_interval_is_five_minutes() {
        assert_eq!(
            next_check_after_fire(&TriggerType::Price, None, FireOutcome::Success, fixed_now()),
            Some(fixed_now() + Duration::minutes(5))
        );
    }

    #[test]
    fn after_fire_end_of_month_cron() {
        let schedule = TriggerSchedule::Cron {
            cron: "0 12 L * *".to_string(),
        };
        let now = Utc.with_ymd_and_hms(2025, 1, 30, 10, 0, 0).unwrap();
        let result =
            next_check_after_fire(&TriggerType::Cron, Some(&schedule), FireOutcome::Success, now);
        assert_eq!(result, Some(Utc.with_ymd_and_hms(2025, 1, 31, 12, 0, 0).unwrap()));
    }
}
