use crate::commands::CommandHandler;
use crate::errors::AppResult;
use crate::redaction::Redactor;
use crate::session::UserLocks;
use crate::transport::{InboundMessage, InboundUpdate, Transport};
use std::future::Future;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::Instrument;
use uuid::Uuid;

const BASE_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 60_000;
const MAX_JITTER_MS: u64 = 250;

/// Polls the transport, runs each command under its user's lock and sends
/// the reply back.
#[derive(Clone)]
pub struct BotRunner {
    handler: CommandHandler,
    locks: UserLocks,
    transport: Arc<dyn Transport>,
    redactor: Arc<Redactor>,
}

impl BotRunner {
    pub fn new(
        handler: CommandHandler,
        locks: UserLocks,
        transport: Arc<dyn Transport>,
        redactor: Arc<Redactor>,
    ) -> Self {
        Self {
            handler,
            locks,
            transport,
            redactor,
        }
    }

    /// Polls until `shutdown` resolves. An in-flight batch is finished first.
    pub async fn run_until<F>(&self, shutdown: F) -> AppResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut offset: Option<i64> = None;
        let mut failures = 0u32;

        loop {
            let updates = tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested, leaving poll loop");
                    return Ok(());
                }
                polled = self.transport.poll(offset) => polled,
            };

            match updates {
                Ok(updates) => {
                    failures = 0;
                    if let Some(next) = next_offset(&updates) {
                        offset = Some(next);
                    }
                    self.process_batch(updates).await;
                }
                Err(error) => {
                    failures = failures.saturating_add(1);
                    let delay = backoff_delay(failures);
                    tracing::warn!(
                        error = %self.redactor.scrub(&error),
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        "poll failed, backing off"
                    );
                    tokio::select! {
                        _ = &mut shutdown => return Ok(()),
                        _ = sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Handles one batch. Commands from different users run concurrently;
    /// each user's commands run one after another in arrival order.
    pub async fn process_batch(&self, updates: Vec<InboundUpdate>) {
        let mut tasks = Vec::new();
        for (user_id, messages) in group_by_user(updates) {
            let runner = self.clone();
            tasks.push(tokio::spawn(async move {
                for (update_id, message) in messages {
                    let span = tracing::info_span!(
                        "command",
                        request_id = %Uuid::new_v4(),
                        update_id,
                        user_id = %user_id
                    );
                    runner.process_message(message).instrument(span).await;
                }
            }));
        }

        for task in tasks {
            if let Err(error) = task.await {
                tracing::error!(error = %error, "command task panicked");
            }
        }
    }

    pub async fn process_message(&self, message: InboundMessage) -> Option<String> {
        let reply = {
            let _guard = self.locks.acquire(&message.user_id).await;
            let handler = self.handler.clone();
            let user_id = message.user_id.clone();
            let text = message.text.clone();
            let span = tracing::Span::current();
            let handled = tokio::task::spawn_blocking(move || {
                let _entered = span.enter();
                handler.handle_text(&user_id, &text)
            })
            .await;
            match handled {
                Ok(reply) => reply,
                Err(error) => {
                    tracing::error!(error = %error, "command handler panicked");
                    None
                }
            }
        }?;

        tracing::info!(has_photo = message.has_photo, "command handled");
        if let Err(error) = self.transport.send(message.chat_id, &reply).await {
            tracing::warn!(chat_id = message.chat_id, error = %self.redactor.scrub(&error), "failed to send reply");
        }
        Some(reply)
    }
}

/// Splits a batch into per-user queues, keeping arrival order inside each.
fn group_by_user(updates: Vec<InboundUpdate>) -> Vec<(String, Vec<(i64, InboundMessage)>)> {
    let mut groups: Vec<(String, Vec<(i64, InboundMessage)>)> = Vec::new();
    for update in updates {
        let Some(message) = update.message else {
            continue;
        };
        match groups.iter_mut().find(|(user_id, _)| *user_id == message.user_id) {
            Some((_, queue)) => queue.push((update.update_id, message)),
            None => groups.push((message.user_id.clone(), vec![(update.update_id, message)])),
        }
    }
    groups
}

fn next_offset(updates: &[InboundUpdate]) -> Option<i64> {
    updates.iter().map(|update| update.update_id).max().map(|id| id + 1)
}

fn backoff_delay(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    let base = BASE_BACKOFF_MS.saturating_mul(1u64 << exponent).min(MAX_BACKOFF_MS);
    let jitter = rand::random_range(0..=MAX_JITTER_MS);
    Duration::from_millis(base + jitter)
}

#[cfg(test)]
mod tests {
    use super::{backoff_delay, group_by_user, next_offset, MAX_BACKOFF_MS, MAX_JITTER_MS};
    use crate::transport::{InboundMessage, InboundUpdate};

    fn update(update_id: i64, user_id: &str, text: &str) -> InboundUpdate {
        InboundUpdate {
            update_id,
            message: Some(InboundMessage {
                chat_id: update_id,
                user_id: user_id.to_string(),
                text: text.to_string(),
                has_photo: false,
            }),
        }
    }

    #[test]
    fn batch_is_grouped_per_user_in_arrival_order() {
        let groups = group_by_user(vec![
            update(1, "a", "/set_weekly 2"),
            update(2, "b", "/help"),
            InboundUpdate {
                update_id: 3,
                message: None,
            },
            update(4, "a", "/post"),
            update(5, "a", "/stop"),
        ]);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "a");
        let texts: Vec<&str> = groups[0].1.iter().map(|(_, message)| message.text.as_str()).collect();
        assert_eq!(texts, vec!["/set_weekly 2", "/post", "/stop"]);
        let ids: Vec<i64> = groups[0].1.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 4, 5]);
        assert_eq!(groups[1].0, "b");
        assert_eq!(groups[1].1.len(), 1);
    }

    #[test]
    fn offset_moves_past_the_newest_update() {
        let updates = vec![
            InboundUpdate {
                update_id: 7,
                message: None,
            },
            InboundUpdate {
                update_id: 9,
                message: None,
            },
        ];
        assert_eq!(next_offset(&updates), Some(10));
        assert_eq!(next_offset(&[]), None);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let first = backoff_delay(1).as_millis() as u64;
        assert!((500..=500 + MAX_JITTER_MS).contains(&first));
        let third = backoff_delay(3).as_millis() as u64;
        assert!((2_000..=2_000 + MAX_JITTER_MS).contains(&third));
        let capped = backoff_delay(40).as_millis() as u64;
        assert!(capped <= MAX_BACKOFF_MS + MAX_JITTER_MS);
    }
}
