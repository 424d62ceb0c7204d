use crate::db::Database;
use crate::models::{ChallengeRecord, CheckInOutcome, DuplicateHitPolicy, WeekSummary};
use crate::redaction::Redactor;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub const NO_STATS_MESSAGE: &str = "There are no stats for your user.";

/// Boundary between the command handlers and SQLite.
///
/// Storage failures stop here: they are logged and turned into `false`,
/// `None` or a placeholder so handlers only choose which reply to send.
#[derive(Clone)]
pub struct RecordStore {
    db: Arc<Database>,
    duplicate_policy: DuplicateHitPolicy,
    redactor: Arc<Redactor>,
}

impl RecordStore {
    pub fn new(db: Arc<Database>, duplicate_policy: DuplicateHitPolicy, redactor: Arc<Redactor>) -> Self {
        Self {
            db,
            duplicate_policy,
            redactor,
        }
    }

    pub fn duplicate_policy(&self) -> DuplicateHitPolicy {
        self.duplicate_policy
    }

    pub fn create_user(&self, id: &str) -> bool {
        match self.db.insert_user(id) {
            Ok(()) => {
                tracing::info!(user_id = %id, "challenge record created");
                true
            }
            Err(error) => {
                self.log_failure("create_user", id, &error);
                false
            }
        }
    }

    /// Like `create_user`, but an existing row counts as success.
    pub fn ensure_user(&self, id: &str) -> bool {
        match self.db.insert_user_if_absent(id) {
            Ok(inserted) => {
                if inserted {
                    tracing::info!(user_id = %id, "challenge record created on demand");
                }
                true
            }
            Err(error) => {
                self.log_failure("ensure_user", id, &error);
                false
            }
        }
    }

    pub fn delete_user(&self, id: &str) -> bool {
        match self.db.delete_user(id) {
            Ok(removed) => {
                tracing::info!(user_id = %id, removed, "challenge record deleted");
                true
            }
            Err(error) => {
                self.log_failure("delete_user", id, &error);
                false
            }
        }
    }

    pub fn stop_user(&self, id: &str) {
        match self.db.stop_user(id) {
            Ok(true) => tracing::info!(user_id = %id, "challenge stopped"),
            Ok(false) => tracing::debug!(user_id = %id, "stop requested for unknown user"),
            Err(error) => self.log_failure("stop_user", id, &error),
        }
    }

    pub fn update_user_days(&self, id: &str, days: u8) -> bool {
        match self.db.update_user_days(id, days, Utc::now()) {
            Ok(updated) => {
                if updated {
                    tracing::info!(user_id = %id, days, "weekly target set");
                }
                updated
            }
            Err(error) => {
                self.log_failure("update_user_days", id, &error);
                false
            }
        }
    }

    pub fn record_hit(&self, id: &str) -> CheckInOutcome {
        self.record_hit_at(id, Utc::now())
    }

    pub fn record_hit_at(&self, id: &str, now: DateTime<Utc>) -> CheckInOutcome {
        match self.db.record_hit(id, now, self.duplicate_policy) {
            Ok(outcome) => {
                tracing::info!(user_id = %id, outcome = ?outcome, policy = self.duplicate_policy.as_str(), "check-in processed");
                outcome
            }
            Err(error) => {
                self.log_failure("record_hit", id, &error);
                CheckInOutcome::Failed
            }
        }
    }

    pub fn is_active(&self, id: &str) -> bool {
        match self.db.is_active(id) {
            Ok(active) => active.unwrap_or(false),
            Err(error) => {
                self.log_failure("is_active", id, &error);
                false
            }
        }
    }

    pub fn get_user(&self, id: &str) -> Option<ChallengeRecord> {
        match self.db.get_user(id) {
            Ok(record) => record,
            Err(error) => {
                self.log_failure("get_user", id, &error);
                None
            }
        }
    }

    pub fn get_user_stats(&self, id: &str) -> String {
        self.get_user(id)
            .map(|record| format_stats(&record))
            .unwrap_or_else(|| NO_STATS_MESSAGE.to_string())
    }

    /// Closes elapsed weeks for every active user. A failing row is logged
    /// and skipped so one bad record cannot stall the rest.
    pub fn roll_over_all(&self, now: DateTime<Utc>) -> Vec<WeekSummary> {
        let ids = match self.db.list_active_users() {
            Ok(ids) => ids,
            Err(error) => {
                tracing::error!(error = %self.redactor.scrub(&error), "failed to list active users for rollover");
                return Vec::new();
            }
        };

        let mut summaries = Vec::new();
        for id in ids {
            match self.db.roll_over_week(&id, now) {
                Ok(Some(summary)) => {
                    tracing::info!(
                        user_id = %summary.user_id,
                        hits = summary.hits,
                        target = summary.target,
                        met = summary.met,
                        streak = summary.streak,
                        weeks = summary.weeks_elapsed,
                        "week closed"
                    );
                    summaries.push(summary);
                }
                Ok(None) => {}
                Err(error) => self.log_failure("roll_over_week", &id, &error),
            }
        }
        summaries
    }

    fn log_failure(&self, operation: &'static str, id: &str, error: &crate::errors::AppError) {
        tracing::error!(operation, user_id = %id, error = %self.redactor.scrub(error), "store operation failed");
    }
}

pub fn format_stats(record: &ChallengeRecord) -> String {
    let target = if record.days > 0 {
        format!(" of {}", record.days)
    } else {
        String::new()
    };
    let status = if record.active {
        "Your challenge is running."
    } else {
        "Your challenge is stopped."
    };

    format!(
        "You have done {}{} workouts this week.\n\
         Your current streak is {} {}.\n\
         Your longest streak is {} {}.\n\
         {}",
        record.hits_this_week(),
        target,
        record.streak,
        weeks(record.streak),
        record.long_streak,
        weeks(record.long_streak),
        status
    )
}

fn weeks(count: u32) -> &'static str {
    if count == 1 {
        "week"
    } else {
        "weeks"
    }
}
