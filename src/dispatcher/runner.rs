//! Update poller.
//!
//! The poller loops over `getUpdates`:
//! 1. Fetch the next batch after the current offset (long polling)
//! 2. Advance the offset past every update in the batch
//! 3. Hand each recognized update to the event handler in its own task
//! 4. On a fetch error, wait and try again
//!
//! A shutdown message interrupts the loop at any point; in-flight tasks are
//! drained and the final offset is confirmed before `run` returns.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::commands::{EventHandler, Incoming};
use crate::telegram::types::Update;
use crate::telegram::{PlatformErrorKind, UpdateSource};

/// Messages that can be sent to the poller.
#[derive(Debug, Clone)]
pub enum PollerMessage {
    /// Stop polling and drain in-flight events.
    Shutdown,
}

/// Long-polling update loop.
pub struct UpdatePoller {
    source: Arc<dyn UpdateSource>,

    handler: Arc<EventHandler>,

    /// Our own username, for `/cmd@name` addressing.
    bot_username: Option<String>,

    poll_timeout: Duration,

    /// Delay before retrying after a failed fetch.
    retry_delay: Duration,
}

impl UpdatePoller {
    /// Creates a new update poller.
    #[must_use]
    pub fn new(
        source: Arc<dyn UpdateSource>,
        handler: Arc<EventHandler>,
        bot_username: Option<String>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            source,
            handler,
            bot_username,
            poll_timeout,
            retry_delay: Duration::from_secs(5),
        }
    }

    /// Sets the delay before retrying after a failed fetch.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Runs the polling loop until a shutdown message arrives or the channel closes.
    pub async fn run(&self, mut rx: mpsc::Receiver<PollerMessage>) {
        info!("Update poller started");

        let mut offset = 0_i64;
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(PollerMessage::Shutdown) | None => {
                            info!("Update poller shutting down");
                            break;
                        }
                    }
                }
                result = self.source.get_updates(offset, self.poll_timeout) => {
                    match result {
                        Ok(updates) => {
                            for update in updates {
                                offset = offset.max(update.update_id + 1);
                                self.dispatch(&mut tasks, &update);
                            }
                        }
                        Err(e) => {
                            let delay = match e.kind {
                                PlatformErrorKind::FloodWait(secs) => Duration::from_secs(u64::from(secs)),
                                _ => self.retry_delay,
                            };
                            warn!("Failed to fetch updates: {}. Retrying in {:?}", e, delay);

                            tokio::select! {
                                () = tokio::time::sleep(delay) => {}
                                _ = rx.recv() => {
                                    info!("Update poller shutting down");
                                    break;
                                }
                            }
                        }
                    }
                }
            }

            reap_finished(&mut tasks);
        }

        if !tasks.is_empty() {
            info!("Waiting for {} in-flight event(s)", tasks.len());
        }
        while let Some(result) = tasks.join_next().await {
            log_task_result(result);
        }

        self.confirm_offset(offset).await;
        info!("Update poller stopped");
    }

    /// Spawns a handler task for a recognized update.
    fn dispatch(&self, tasks: &mut JoinSet<()>, update: &Update) {
        let Some(incoming) = Incoming::from_update(update, self.bot_username.as_deref()) else {
            debug!("Ignoring update {}", update.update_id);
            return;
        };

        let handler = Arc::clone(&self.handler);
        tasks.spawn(async move {
            handler.handle(incoming).await;
        });
    }

    /// Tells Telegram the processed updates need not be redelivered.
    async fn confirm_offset(&self, offset: i64) {
        if offset == 0 {
            return;
        }
        // Updates returned here are at or past `offset`, so they stay queued.
        if let Err(e) = self.source.get_updates(offset, Duration::ZERO).await {
            warn!("Failed to confirm update offset {}: {}", offset, e);
        }
    }
}

fn reap_finished(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.try_join_next() {
        log_task_result(result);
    }
}

fn log_task_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!("Event task failed: {}", e);
    }
}

impl std::fmt::Debug for UpdatePoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdatePoller")
            .field("bot_username", &self.bot_username)
            .field("poll_timeout", &self.poll_timeout)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::config::{Channel, ReferralConfig};
    use crate::referral::ReferralEngine;
    use crate::registry::{UserId, UserRegistry};
    use crate::telegram::fake::FakePlatform;
    use crate::telegram::{Platform, PlatformError};

    /// Replays scripted batches, then idles until the timeout.
    #[derive(Default)]
    struct ScriptedUpdates {
        batches: Mutex<VecDeque<Result<Vec<Update>, PlatformError>>>,
        offsets: Mutex<Vec<i64>>,
    }

    impl ScriptedUpdates {
        fn push(&self, batch: Result<Vec<Update>, PlatformError>) {
            self.batches.lock().unwrap().push_back(batch);
        }

        fn offsets(&self) -> Vec<i64> {
            self.offsets.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UpdateSource for ScriptedUpdates {
        async fn get_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>, PlatformError> {
            self.offsets.lock().unwrap().push(offset);
            let next = self.batches.lock().unwrap().pop_front();
            match next {
                Some(batch) => batch,
                None => {
                    tokio::time::sleep(timeout).await;
                    Ok(Vec::new())
                }
            }
        }
    }

    fn start_update(update_id: i64, user: i64) -> Update {
        serde_json::from_value(serde_json::json!({
            "update_id": update_id,
            "message": {
                "message_id": 1,
                "chat": { "id": user, "type": "private" },
                "from": { "id": user, "is_bot": false, "first_name": "Ann" },
                "text": "/start"
            }
        }))
        .unwrap()
    }

    fn poller(source: Arc<ScriptedUpdates>) -> (UpdatePoller, Arc<FakePlatform>, Arc<UserRegistry>) {
        let platform = Arc::new(FakePlatform::new());
        let registry = Arc::new(UserRegistry::in_memory());
        let config = ReferralConfig {
            required_channels: vec![Channel::new("@english_avenue")],
            required_invites: 5,
            unlock_channel_link: "https://t.me/+secret".to_owned(),
            bot_entrypoint: Some("https://t.me/test_bot".to_owned()),
        };
        let engine = Arc::new(
            ReferralEngine::new(
                config,
                Arc::clone(&registry),
                Arc::clone(&platform) as Arc<dyn Platform>,
            )
            .unwrap(),
        );
        let handler = Arc::new(EventHandler::new(engine, Arc::clone(&platform) as Arc<dyn Platform>));
        let poller = UpdatePoller::new(source, handler, Some("test_bot".to_owned()), Duration::from_millis(20))
            .with_retry_delay(Duration::from_millis(10));
        (poller, platform, registry)
    }

    async fn wait_for_replies(platform: &FakePlatform, count: usize) {
        for _ in 0..200 {
            if platform.outbound().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {count} replies, got {:?}", platform.outbound());
    }

    #[tokio::test]
    async fn test_dispatches_updates_and_confirms_offset() {
        let source = Arc::new(ScriptedUpdates::default());
        source.push(Ok(vec![start_update(40, 7), start_update(41, 8)]));
        let (poller, platform, registry) = poller(Arc::clone(&source));

        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(async move { poller.run(rx).await });

        wait_for_replies(&platform, 2).await;
        tx.send(PollerMessage::Shutdown).await.unwrap();
        handle.await.unwrap();

        assert!(registry.get(UserId(7)).await.is_some());
        assert!(registry.get(UserId(8)).await.is_some());

        let offsets = source.offsets();
        assert_eq!(offsets[0], 0);
        assert_eq!(offsets[1], 42);
        assert_eq!(offsets.last(), Some(&42));
    }

    #[tokio::test]
    async fn test_retries_after_fetch_error() {
        let source = Arc::new(ScriptedUpdates::default());
        source.push(Err(PlatformError::new(PlatformErrorKind::Network, "connection reset")));
        source.push(Ok(vec![start_update(5, 9)]));
        let (poller, platform, registry) = poller(Arc::clone(&source));

        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(async move { poller.run(rx).await });

        wait_for_replies(&platform, 1).await;
        tx.send(PollerMessage::Shutdown).await.unwrap();
        handle.await.unwrap();

        assert!(registry.get(UserId(9)).await.is_some());
        assert_eq!(&source.offsets()[..2], &[0, 0]);
    }

    #[tokio::test]
    async fn test_ignores_unrecognized_updates() {
        let source = Arc::new(ScriptedUpdates::default());
        let group_message: Update = serde_json::from_value(serde_json::json!({
            "update_id": 3,
            "message": {
                "message_id": 1,
                "chat": { "id": -100, "type": "supergroup" },
                "from": { "id": 7, "is_bot": false, "first_name": "Ann" },
                "text": "/start"
            }
        }))
        .unwrap();
        source.push(Ok(vec![group_message]));
        let (poller, platform, _registry) = poller(Arc::clone(&source));

        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(async move { poller.run(rx).await });

        for _ in 0..50 {
            if source.offsets().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tx.send(PollerMessage::Shutdown).await.unwrap();
        handle.await.unwrap();

        assert!(platform.outbound().is_empty());
        assert_eq!(source.offsets().last(), Some(&4));
    }

    #[tokio::test]
    async fn test_shutdown_without_updates_skips_confirmation() {
        let source = Arc::new(ScriptedUpdates::default());
        let (poller, _platform, _registry) = poller(Arc::clone(&source));

        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        poller.run(rx).await;

        assert!(source.offsets().iter().all(|&offset| offset == 0));
    }
}
