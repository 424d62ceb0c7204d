use crate::models::WeekSummary;
use crate::session::UserLocks;
use crate::store::RecordStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Duration;

/// Background task that closes elapsed challenge weeks.
///
/// Ticks once at start, then every `interval` or whenever `tick_now` is
/// called.
#[derive(Clone)]
pub struct RolloverScheduler {
    store: RecordStore,
    locks: UserLocks,
    notify: Arc<Notify>,
    interval: Duration,
}

impl RolloverScheduler {
    pub fn new(store: RecordStore, locks: UserLocks, interval: Duration) -> Self {
        Self {
            store,
            locks,
            notify: Arc::new(Notify::new()),
            interval,
        }
    }

    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.run_loop().await;
        })
    }

    pub fn tick_now(&self) {
        self.notify.notify_one();
    }

    async fn run_loop(self) {
        loop {
            self.run_once(Utc::now()).await;
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.notify.notified() => {}
            }
        }
    }

    /// Runs one rollover pass as of `now`.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Vec<WeekSummary> {
        let store = self.store.clone();
        let summaries = match tokio::task::spawn_blocking(move || store.roll_over_all(now)).await {
            Ok(summaries) => summaries,
            Err(error) => {
                tracing::error!(error = %error, "rollover task panicked");
                Vec::new()
            }
        };

        let pruned = self.locks.prune_idle().await;
        tracing::debug!(closed = summaries.len(), pruned_locks = pruned, "rollover pass finished");
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::RolloverScheduler;
    use crate::db::Database;
    use crate::models::DuplicateHitPolicy;
    use crate::redaction::Redactor;
    use crate::session::UserLocks;
    use crate::store::RecordStore;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn scheduler() -> (tempfile::TempDir, RecordStore, RolloverScheduler) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("gymbros.db")).expect("db");
        let store = RecordStore::new(Arc::new(db), DuplicateHitPolicy::Reject, Arc::new(Redactor::default()));
        let scheduler = RolloverScheduler::new(store.clone(), UserLocks::new(), std::time::Duration::from_secs(3600));
        (dir, store, scheduler)
    }

    #[tokio::test]
    async fn run_once_closes_only_finished_weeks() {
        let (_dir, store, scheduler) = scheduler();
        store.create_user("42");
        store.update_user_days("42", 1);
        store.record_hit("42");

        assert!(scheduler.run_once(Utc::now()).await.is_empty());

        let summaries = scheduler.run_once(Utc::now() + Duration::days(7)).await;
        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].met);
        assert_eq!(summaries[0].streak, 1);

        let record = store.get_user("42").expect("record");
        assert!(record.hits.is_empty());
        assert_eq!(record.streak, 1);
    }

    #[tokio::test]
    async fn stopped_users_are_skipped() {
        let (_dir, store, scheduler) = scheduler();
        store.create_user("42");
        store.update_user_days("42", 2);
        store.stop_user("42");

        assert!(scheduler.run_once(Utc::now() + Duration::days(30)).await.is_empty());
    }

    #[tokio::test]
    async fn started_scheduler_can_be_nudged() {
        let (_dir, _store, scheduler) = scheduler();
        let handle = scheduler.start();
        scheduler.tick_now();
        tokio::task::yield_now().await;
        assert!(!handle.is_finished());
        handle.abort();
    }
}
