// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

pub(crate) mod in_flight;

use std::{fmt::Display, sync::Arc};

use futures::future::join_all;
use rand::seq::SliceRandom;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use self::in_flight::InFlight;
use crate::{
    config,
    delivery::{Delivery, Photo},
    model::{Safety, Wallpaper},
    selector,
    store::{SampleQuery, Store},
};

/// Result of a single delivery attempt to a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Delivered,
    /// another delivery to the same chat was in progress
    Skipped,
    NoCandidate,
    Failed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Summary {
    pub(crate) delivered: usize,
    pub(crate) skipped: usize,
    pub(crate) failed: usize,
}

impl Summary {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Delivered => self.delivered += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::NoCandidate | Outcome::Failed => self.failed += 1,
        }
    }
}

impl Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} delivered, {} skipped, {} failed",
            self.delivered, self.skipped, self.failed
        )
    }
}

/// Delivers wallpapers to chats, at most one delivery per chat at a time.
#[derive(Clone)]
pub(crate) struct Broadcaster {
    store: Arc<dyn Store>,
    delivery: Arc<dyn Delivery>,
    in_flight: Arc<InFlight>,
    settings: config::Broadcast,
}

impl Broadcaster {
    pub(crate) fn new(
        store: Arc<dyn Store>,
        delivery: Arc<dyn Delivery>,
        settings: config::Broadcast,
    ) -> Self {
        Self {
            store,
            delivery,
            in_flight: Arc::default(),
            settings,
        }
    }

    /// Shares the chats in flight with `self`, so that deliveries started
    /// before a reload still exclude new ones.
    pub(crate) fn reconfigure(
        &self,
        delivery: Arc<dyn Delivery>,
        settings: config::Broadcast,
    ) -> Self {
        Self {
            store: self.store.clone(),
            delivery,
            in_flight: self.in_flight.clone(),
            settings,
        }
    }

    pub(crate) fn settings(&self) -> &config::Broadcast {
        &self.settings
    }

    fn query(&self, safety: Safety) -> SampleQuery {
        SampleQuery::new(
            1,
            self.settings.max_size,
            self.settings.max_width,
            self.settings.max_height,
            safety,
        )
    }

    /// Sends one wallpaper matching `safety` to `chat_id`.
    pub(crate) async fn send_wallpaper(&self, chat_id: i64, safety: Safety) -> Outcome {
        let Some(_slot) = self.in_flight.try_acquire(chat_id) else {
            log::warn!("a delivery to chat {chat_id} is already in progress, skipping");
            return Outcome::Skipped;
        };

        let Some(wallpaper) = selector::candidate(self.store.as_ref(), &self.query(safety)).await
        else {
            log::error!("no wallpaper to deliver to chat {chat_id} matches {safety:?}");
            return Outcome::NoCandidate;
        };

        self.deliver(chat_id, wallpaper).await
    }

    async fn deliver(&self, chat_id: i64, mut wallpaper: Wallpaper) -> Outcome {
        let caption = self.delivery.caption(&wallpaper);
        let attempts = self.settings.attempts.max(1);

        for attempt in 1..=attempts {
            let photo = match wallpaper.file_id.as_deref() {
                Some(handle) => Photo::Handle(handle),
                None => Photo::Url(&wallpaper.src),
            };

            match self
                .delivery
                .send_photo(chat_id, photo, &caption, !wallpaper.sfw)
                .await
            {
                Ok(handle) => {
                    log::info!("delivered wallpaper {} to chat {chat_id}", wallpaper.id);

                    if wallpaper.file_id.is_none() {
                        wallpaper.file_id = Some(handle);
                        if !self.store.upsert_wallpaper(&wallpaper).await {
                            log::warn!("failed to remember the handle of wallpaper {}", wallpaper.id);
                        }
                    }

                    return Outcome::Delivered;
                }
                Err(err) if attempt < attempts => {
                    log::warn!(
                        "attempt {attempt}/{attempts} to deliver wallpaper {} to chat {chat_id} failed: {err:#}",
                        wallpaper.id
                    );
                    sleep(self.settings.backoff).await;
                }
                Err(err) => {
                    log::error!(
                        "failed to deliver wallpaper {} to chat {chat_id}: {err:#}",
                        wallpaper.id
                    );
                }
            }
        }

        Outcome::Failed
    }

    /// Delivers a wallpaper to every active subscription, `fan_out` chats at
    /// a time. No new batch is started once `cancel` fires; the batch in
    /// progress is waited for.
    pub(crate) async fn broadcast(&self, cancel: &CancellationToken) -> Summary {
        let mut summary = Summary::default();
        let mut subscriptions = self.store.active_subscriptions().await;
        if subscriptions.is_empty() {
            log::info!("no active subscriptions");
            return summary;
        }

        subscriptions.shuffle(&mut rand::thread_rng());
        let safety = self.settings.safety;

        for (index, batch) in subscriptions.chunks(self.settings.fan_out.max(1)).enumerate() {
            if cancel.is_cancelled() {
                log::info!(
                    "broadcast cancelled, leaving out {} chats",
                    subscriptions.len() - index * self.settings.fan_out.max(1)
                );
                break;
            }

            let chats: Vec<i64> = batch.iter().map(|subscription| subscription.chat_id).collect();
            let tasks = chats.iter().map(|&chat_id| {
                let broadcaster = self.clone();
                tokio::spawn(async move { broadcaster.send_wallpaper(chat_id, safety).await })
            });

            for (chat_id, result) in chats.iter().zip(join_all(tasks).await) {
                match result {
                    Ok(outcome) => summary.record(outcome),
                    Err(err) => {
                        log::error!("delivery to chat {chat_id} crashed: {err}");
                        summary.record(Outcome::Failed);
                    }
                }
            }
        }

        summary
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::{
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use test_log::test;
    use tokio::{
        sync::{Notify, Semaphore},
        time::{sleep, timeout},
    };
    use tokio_util::sync::CancellationToken;

    use super::{Broadcaster, Outcome, Summary};
    use crate::{
        config,
        delivery::{Delivery, Photo},
        model::{Safety, Subscription, SubscriptionUpdate, Wallpaper},
        store::{SampleQuery, Store, contract, sqlite::{SqliteStore, test::temporary}},
    };

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) struct Call {
        pub(crate) chat_id: i64,
        pub(crate) photo: String,
        pub(crate) sensitive: bool,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Event {
        Started(i64),
        Finished(i64),
    }

    /// Records every send and succeeds after the configured number of failures.
    #[derive(Default)]
    pub(crate) struct Recorder {
        calls: Mutex<Vec<Call>>,
        events: Mutex<Vec<Event>>,
        failures: AtomicUsize,
        entered: Notify,
        gate: Option<Semaphore>,
        delay: Duration,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Recorder {
        pub(crate) fn failing(failures: usize) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                ..Default::default()
            }
        }

        pub(crate) fn gated() -> Self {
            Self {
                gate: Some(Semaphore::new(0)),
                ..Default::default()
            }
        }

        pub(crate) fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }

        pub(crate) fn calls(&self) -> Vec<Call> {
            self.calls.lock().expect("not poisoned").clone()
        }

        pub(crate) fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }

        pub(crate) fn events(&self) -> Vec<Event> {
            self.events.lock().expect("not poisoned").clone()
        }

        /// Lets `sends` gated sends through.
        pub(crate) fn open(&self, sends: usize) {
            self.gate.as_ref().expect("gated").add_permits(sends);
        }

        async fn wait_for(&self, sends: usize) {
            timeout(Duration::from_secs(5), async {
                while self.calls().len() < sends {
                    sleep(Duration::from_millis(2)).await;
                }
            })
            .await
            .expect("sends arrive");
        }
    }

    #[async_trait]
    impl Delivery for Recorder {
        fn caption(&self, wallpaper: &Wallpaper) -> String {
            wallpaper.id.clone()
        }

        async fn send_photo(
            &self,
            chat_id: i64,
            photo: Photo<'_>,
            _caption: &str,
            sensitive: bool,
        ) -> Result<String> {
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            self.events.lock().expect("not poisoned").push(Event::Started(chat_id));
            self.calls.lock().expect("not poisoned").push(Call {
                chat_id,
                photo: match photo {
                    Photo::Handle(handle) => format!("handle:{handle}"),
                    Photo::Url(url) => format!("url:{url}"),
                },
                sensitive,
            });
            self.entered.notify_one();

            if let Some(gate) = &self.gate {
                gate.acquire().await.expect("gate is never closed").forget();
            }
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.events.lock().expect("not poisoned").push(Event::Finished(chat_id));

            let failures = self.failures.load(Ordering::SeqCst);
            if failures > 0 {
                self.failures.store(failures - 1, Ordering::SeqCst);
                bail!("platform unavailable");
            }

            Ok(format!("handle-{chat_id}"))
        }
    }

    /// A store that forgets every wallpaper written to it.
    struct Forgetful(SqliteStore);

    #[async_trait]
    impl Store for Forgetful {
        async fn upsert_wallpaper(&self, _wallpaper: &Wallpaper) -> bool {
            false
        }

        async fn wallpaper(&self, id: &str) -> Option<Wallpaper> {
            self.0.wallpaper(id).await
        }

        async fn wallpapers_by_src(&self, src: &str) -> Vec<Wallpaper> {
            self.0.wallpapers_by_src(src).await
        }

        async fn sample_wallpapers(&self, query: &SampleQuery) -> Vec<Wallpaper> {
            self.0.sample_wallpapers(query).await
        }

        async fn upsert_subscription(&self, subscription: &Subscription) -> bool {
            self.0.upsert_subscription(subscription).await
        }

        async fn update_subscription(&self, chat_id: i64, update: &SubscriptionUpdate) -> bool {
            self.0.update_subscription(chat_id, update).await
        }

        async fn subscription(&self, chat_id: i64) -> Option<Subscription> {
            self.0.subscription(chat_id).await
        }

        async fn active_subscriptions(&self) -> Vec<Subscription> {
            self.0.active_subscriptions().await
        }
    }

    pub(crate) fn settings() -> config::Broadcast {
        config::Broadcast {
            backoff: Duration::from_millis(1),
            ..Default::default()
        }
    }

    pub(crate) fn hd(src: &str, sfw: bool) -> Wallpaper {
        contract::wallpaper(src, 1920, 1080, 1000, sfw)
    }

    #[test(tokio::test)]
    async fn handle_is_cached_after_the_first_delivery() {
        let (_directory, store) = temporary();
        let store = Arc::new(store);
        let recorder = Arc::new(Recorder::default());
        let broadcaster = Broadcaster::new(store.clone(), recorder.clone(), settings());

        let wallpaper = hd("https://example.org/e2e.jpg", true);
        assert!(store.upsert_wallpaper(&wallpaper).await);
        let query = SampleQuery::new(1, 5_000_000, 10_000, 10_000, Safety::Safe);
        let sampled = store.sample_wallpapers(&query).await;
        assert_eq!(sampled.len(), 1);
        assert_eq!(sampled[0].id, wallpaper.id);
        assert_eq!(sampled[0].file_id, None);

        assert_eq!(broadcaster.send_wallpaper(1, Safety::Safe).await, Outcome::Delivered);
        let sampled = store.sample_wallpapers(&query).await;
        assert_eq!(sampled.len(), 1);
        assert_eq!(sampled[0].id, wallpaper.id);
        assert_eq!(sampled[0].file_id.as_deref(), Some("handle-1"));

        assert_eq!(broadcaster.send_wallpaper(2, Safety::Safe).await, Outcome::Delivered);
        assert_eq!(
            recorder.calls(),
            vec![
                Call {
                    chat_id: 1,
                    photo: format!("url:{}", wallpaper.src),
                    sensitive: false,
                },
                Call {
                    chat_id: 2,
                    photo: "handle:handle-1".to_string(),
                    sensitive: false,
                },
            ]
        );
        assert_eq!(
            store.wallpaper(&wallpaper.id).await.and_then(|stored| stored.file_id),
            Some("handle-1".to_string())
        );
    }

    #[test(tokio::test)]
    async fn unsafe_wallpapers_are_marked_sensitive() {
        let (_directory, store) = temporary();
        let recorder = Arc::new(Recorder::default());
        assert!(store.upsert_wallpaper(&hd("https://example.org/nsfw.jpg", false)).await);
        let broadcaster = Broadcaster::new(Arc::new(store), recorder.clone(), settings());

        assert_eq!(broadcaster.send_wallpaper(5, Safety::Safe).await, Outcome::NoCandidate);
        assert_eq!(broadcaster.send_wallpaper(5, Safety::Unsafe).await, Outcome::Delivered);
        assert!(recorder.calls()[0].sensitive);
    }

    #[test(tokio::test)]
    async fn concurrent_sends_to_one_chat_are_skipped() {
        let (_directory, store) = temporary();
        assert!(store.upsert_wallpaper(&hd("https://example.org/single.jpg", true)).await);
        let recorder = Arc::new(Recorder::gated());
        let broadcaster = Broadcaster::new(Arc::new(store), recorder.clone(), settings());

        let first = tokio::spawn({
            let broadcaster = broadcaster.clone();
            async move { broadcaster.send_wallpaper(1, Safety::Any).await }
        });
        recorder.entered.notified().await;

        assert_eq!(broadcaster.send_wallpaper(1, Safety::Any).await, Outcome::Skipped);
        assert_eq!(recorder.calls().len(), 1);

        recorder.open(1);
        assert_eq!(first.await.expect("no panic"), Outcome::Delivered);
        assert_eq!(recorder.calls().len(), 1);
        assert!(!broadcaster.in_flight.contains(1));
    }

    #[test(tokio::test)]
    async fn chat_is_released_after_failing_every_attempt() {
        let (_directory, store) = temporary();
        assert!(store.upsert_wallpaper(&hd("https://example.org/flaky.jpg", true)).await);
        let recorder = Arc::new(Recorder::failing(usize::MAX));
        let broadcaster = Broadcaster::new(Arc::new(store), recorder.clone(), settings());

        assert_eq!(broadcaster.send_wallpaper(9, Safety::Any).await, Outcome::Failed);
        assert_eq!(recorder.calls().len(), 3);
        assert!(!broadcaster.in_flight.contains(9));

        assert_eq!(broadcaster.send_wallpaper(9, Safety::Any).await, Outcome::Failed);
        assert_eq!(recorder.calls().len(), 6);
    }

    #[test(tokio::test)]
    async fn transient_failures_are_retried() {
        let (_directory, store) = temporary();
        let store = Arc::new(store);
        let wallpaper = hd("https://example.org/retry.jpg", true);
        assert!(store.upsert_wallpaper(&wallpaper).await);
        let recorder = Arc::new(Recorder::failing(2));
        let broadcaster = Broadcaster::new(store.clone(), recorder.clone(), settings());

        assert_eq!(broadcaster.send_wallpaper(3, Safety::Any).await, Outcome::Delivered);
        let calls = recorder.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|call| call.photo.starts_with("url:")));
        assert_eq!(
            store.wallpaper(&wallpaper.id).await.and_then(|stored| stored.file_id),
            Some("handle-3".to_string())
        );
    }

    #[test(tokio::test)]
    async fn nothing_to_deliver() {
        let (_directory, store) = temporary();
        let recorder = Arc::new(Recorder::default());
        let broadcaster = Broadcaster::new(Arc::new(store), recorder.clone(), settings());

        assert_eq!(broadcaster.send_wallpaper(4, Safety::Any).await, Outcome::NoCandidate);
        assert!(recorder.calls().is_empty());
        assert!(!broadcaster.in_flight.contains(4));
    }

    #[test(tokio::test)]
    async fn losing_the_handle_does_not_fail_the_delivery() {
        let (_directory, store) = temporary();
        assert!(store.upsert_wallpaper(&hd("https://example.org/forgotten.jpg", true)).await);
        let recorder = Arc::new(Recorder::default());
        let broadcaster = Broadcaster::new(Arc::new(Forgetful(store)), recorder.clone(), settings());

        assert_eq!(broadcaster.send_wallpaper(1, Safety::Any).await, Outcome::Delivered);
        assert_eq!(broadcaster.send_wallpaper(1, Safety::Any).await, Outcome::Delivered);
        assert!(recorder.calls().iter().all(|call| call.photo.starts_with("url:")));
    }

    #[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
    async fn broadcast_reaches_active_subscriptions_in_bounded_batches() {
        let (_directory, store) = temporary();
        assert!(store.upsert_wallpaper(&hd("https://example.org/everyone.jpg", true)).await);
        for chat_id in 1..=8 {
            assert!(store.upsert_subscription(&contract::subscription(chat_id)).await);
        }
        assert!(store.deactivate_subscription(8).await);

        let recorder = Arc::new(Recorder::slow(Duration::from_millis(20)));
        let broadcaster = Broadcaster::new(Arc::new(store), recorder.clone(), settings());

        let summary = broadcaster.broadcast(&CancellationToken::new()).await;
        assert_eq!(
            summary,
            Summary {
                delivered: 7,
                skipped: 0,
                failed: 0
            }
        );

        let mut chats: Vec<_> = recorder.calls().into_iter().map(|call| call.chat_id).collect();
        chats.sort();
        assert_eq!(chats, (1..=7).collect::<Vec<_>>());
        assert!(recorder.peak() <= 3);
        assert!(recorder.peak() >= 1);
    }

    #[test(tokio::test)]
    async fn reconfigured_broadcaster_shares_the_chats_in_flight() {
        let (_directory, store) = temporary();
        assert!(store.upsert_wallpaper(&hd("https://example.org/reload.jpg", true)).await);
        let recorder = Arc::new(Recorder::gated());
        let broadcaster = Broadcaster::new(Arc::new(store), recorder.clone(), settings());

        let first = tokio::spawn({
            let broadcaster = broadcaster.clone();
            async move { broadcaster.send_wallpaper(1, Safety::Any).await }
        });
        recorder.entered.notified().await;

        let other = Arc::new(Recorder::default());
        let reloaded = broadcaster.reconfigure(other.clone(), settings());
        assert_eq!(reloaded.send_wallpaper(1, Safety::Any).await, Outcome::Skipped);
        assert_eq!(reloaded.send_wallpaper(2, Safety::Any).await, Outcome::Delivered);
        assert_eq!(other.calls().len(), 1);

        recorder.open(1);
        assert_eq!(first.await.expect("no panic"), Outcome::Delivered);
    }

    #[test(tokio::test)]
    async fn cancelled_broadcast_starts_no_batch() {
        let (_directory, store) = temporary();
        assert!(store.upsert_wallpaper(&hd("https://example.org/cancelled.jpg", true)).await);
        assert!(store.upsert_subscription(&contract::subscription(1)).await);
        let recorder = Arc::new(Recorder::default());
        let broadcaster = Broadcaster::new(Arc::new(store), recorder.clone(), settings());

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(broadcaster.broadcast(&cancel).await, Summary::default());
        assert!(recorder.calls().is_empty());
    }

    async fn subscribed(chats: i64) -> (tempfile::TempDir, SqliteStore) {
        let (directory, store) = temporary();
        assert!(store.upsert_wallpaper(&hd("https://example.org/batched.jpg", true)).await);
        for chat_id in 1..=chats {
            assert!(store.upsert_subscription(&contract::subscription(chat_id)).await);
        }
        (directory, store)
    }

    #[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
    async fn next_batch_waits_for_the_previous_one() {
        let (_directory, store) = subscribed(7).await;
        let recorder = Arc::new(Recorder::slow(Duration::from_millis(20)));
        let settings = config::Broadcast {
            fan_out: 3,
            ..settings()
        };
        let broadcaster = Broadcaster::new(Arc::new(store), recorder.clone(), settings);

        assert_eq!(broadcaster.broadcast(&CancellationToken::new()).await.delivered, 7);

        // the n-th send may only start once every earlier batch has finished
        let mut started = 0;
        let mut finished = 0;
        for event in recorder.events() {
            match event {
                Event::Started(chat_id) => {
                    assert!(
                        finished >= started / 3 * 3,
                        "chat {chat_id} started after only {finished} sends finished"
                    );
                    started += 1;
                }
                Event::Finished(_) => finished += 1,
            }
        }
        assert_eq!((started, finished), (7, 7));
    }

    #[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
    async fn cancelling_mid_batch_finishes_only_that_batch() {
        let (_directory, store) = subscribed(7).await;
        let recorder = Arc::new(Recorder::gated());
        let settings = config::Broadcast {
            fan_out: 3,
            ..settings()
        };
        let broadcaster = Broadcaster::new(Arc::new(store), recorder.clone(), settings);

        let cancel = CancellationToken::new();
        let broadcast = tokio::spawn({
            let cancel = cancel.clone();
            async move { broadcaster.broadcast(&cancel).await }
        });
        recorder.wait_for(3).await;
        cancel.cancel();
        recorder.open(3);

        let summary = timeout(Duration::from_secs(5), broadcast)
            .await
            .expect("broadcast stops")
            .expect("no panic");
        assert_eq!(summary.delivered, 3);
        assert_eq!(recorder.calls().len(), 3);
    }
}
