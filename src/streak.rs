use crate::models::{ChallengeRecord, CheckInOutcome, DuplicateHitPolicy, Hit, WeekSummary};
use chrono::{DateTime, Duration, Utc};

const WEEK_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Applies one check-in to `record` in place.
///
/// Only the first hit of a week moves the streak. `long_streak` is raised to
/// `streak` when exceeded and never lowered.
pub fn apply_check_in(record: &mut ChallengeRecord, now: DateTime<Utc>, policy: DuplicateHitPolicy) -> CheckInOutcome {
    if !record.active {
        return CheckInOutcome::NotActive;
    }

    if !record.hits.is_empty() {
        return match policy {
            DuplicateHitPolicy::Reject => CheckInOutcome::AlreadyCheckedIn,
            DuplicateHitPolicy::Accumulate => {
                let count = u32::try_from(record.hits.len() + 1).unwrap_or(u32::MAX);
                record.hits.push(Hit { count, at: now });
                CheckInOutcome::Accumulated {
                    hits_this_week: record.hits.len(),
                }
            }
        };
    }

    record.hits.push(Hit { count: 1, at: now });
    record.streak = record.streak.saturating_add(1);
    let new_best = record.streak > record.long_streak;
    if new_best {
        record.long_streak = record.streak;
    }

    CheckInOutcome::Recorded {
        streak: record.streak,
        long_streak: record.long_streak,
        new_best,
    }
}

/// Closes every full week that has elapsed since `started`.
///
/// A missed target, or a whole week skipped without any check-in, resets the
/// streak. `hits` is cleared and `started` moves forward by whole weeks.
pub fn roll_over(record: &mut ChallengeRecord, now: DateTime<Utc>) -> Option<WeekSummary> {
    if !record.active {
        return None;
    }
    let started = record.started?;

    let weeks_elapsed = (now - started).num_seconds().max(0) / WEEK_SECONDS;
    if weeks_elapsed < 1 {
        return None;
    }

    let hits = record.hits.len();
    let met = record.target_met();
    if !met || weeks_elapsed > 1 {
        record.streak = 0;
    }

    record.hits.clear();
    record.started = Some(started + Duration::seconds(weeks_elapsed * WEEK_SECONDS));

    Some(WeekSummary {
        user_id: record.id.clone(),
        hits,
        target: record.days,
        met,
        streak: record.streak,
        weeks_elapsed,
    })
}
