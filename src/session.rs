use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes command handling per user id. Different users never contend.
#[derive(Clone, Default)]
pub struct UserLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other command for `user_id` is in flight.
    pub async fn acquire(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Drops entries nobody holds or waits on.
    pub async fn prune_idle(&self) -> usize {
        let mut locks = self.locks.lock().await;
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    pub async fn tracked_users(&self) -> usize {
        let locks = self.locks.lock().await;
        locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::UserLocks;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::{sleep, Duration};

    #[tokio::test]
    async fn same_user_commands_do_not_overlap() {
        let locks = UserLocks::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let locks = locks.clone();
            let in_flight = in_flight.clone();
            let max_seen = max_seen.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = locks.acquire("42").await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.expect("task");
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_users_hold_locks_concurrently() {
        let locks = UserLocks::new();
        let _first = locks.acquire("1").await;
        let second = tokio::time::timeout(Duration::from_millis(50), locks.acquire("2")).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn prune_keeps_held_locks() {
        let locks = UserLocks::new();
        let held = locks.acquire("1").await;
        drop(locks.acquire("2").await);

        assert_eq!(locks.prune_idle().await, 1);
        assert_eq!(locks.tracked_users().await, 1);
        drop(held);
        assert_eq!(locks.prune_idle().await, 1);
        assert_eq!(locks.tracked_users().await, 0);
    }
}
