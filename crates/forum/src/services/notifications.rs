//! The notification queue and its dispatcher.
//!
//! Producers (request handlers) enqueue [`Notification`]s onto a bounded
//! multi-producer/single-consumer channel; one long-lived dispatcher task
//! drains it and appends each notification to the recipient's persisted
//! list. Delivery is best-effort: a failure is logged and the notification
//! dropped, invisible to the request that produced it.
//!
//! # Backpressure
//!
//! `enqueue` is a suspending send: when the queue is at capacity the
//! producer waits until the dispatcher drains a slot. Notification volume
//! therefore pushes back directly on the request paths that generate it.
//!
//! # Concurrent mutation
//!
//! A user's notification list is mutated from three independent call
//! paths: the dispatcher's append, mark-all-read, and delete. All three go
//! through the [`NotificationStore`] contract, whose operations are
//! atomic at the storage layer (single-statement row-level SQL in the
//! Postgres implementation), so concurrent writers interleave without one
//! overwriting the other's change.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

use madrona_core::{NotificationId, UserId};

use crate::db::RepositoryError;
use crate::models::Notification;

/// Storage contract for per-user notification state.
///
/// Every operation must be atomic with respect to the others: the
/// Postgres implementation uses single-statement row-level SQL, the
/// in-memory test implementation a single lock per operation. Nothing
/// outside this contract may touch notification state.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Append a notification to its recipient's list.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the recipient does not
    /// exist, `RepositoryError::Database` on other failures.
    async fn append(&self, notification: &Notification) -> Result<(), RepositoryError>;

    /// All notifications for a user, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Notification>, RepositoryError>;

    /// Mark every unread notification read as of `read_at`.
    ///
    /// Returns how many notifications were newly marked.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    async fn mark_all_read(
        &self,
        user_id: UserId,
        read_at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;

    /// Delete one notification by id.
    ///
    /// Returns `false` when no such notification exists for this user -
    /// callers report that distinctly from success.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    async fn delete(
        &self,
        user_id: UserId,
        notification_id: NotificationId,
    ) -> Result<bool, RepositoryError>;
}

/// Periodic upkeep performed by the dispatcher's maintenance tick.
#[async_trait]
pub trait TokenSweeper: Send + Sync {
    /// Remove session tokens that expired at or before `now`.
    ///
    /// Returns how many rows were removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

/// Error returned when enqueueing after the dispatcher has stopped.
#[derive(Debug, Error)]
#[error("notification queue is closed")]
pub struct EnqueueError;

/// Producer handle for the notification queue.
///
/// Cheap to clone; all clones feed the same dispatcher.
#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<Notification>,
}

impl NotificationQueue {
    /// Enqueue a notification for asynchronous delivery.
    ///
    /// Suspends while the queue is at capacity. FIFO order is preserved
    /// across all producers.
    ///
    /// # Errors
    ///
    /// Returns [`EnqueueError`] if the dispatcher is gone.
    pub async fn enqueue(&self, notification: Notification) -> Result<(), EnqueueError> {
        self.tx.send(notification).await.map_err(|_| EnqueueError)
    }
}

/// Stop signal for the dispatcher.
///
/// Triggering (or dropping) the handle ends the dispatcher loop at the
/// next iteration boundary; a delivery already in progress always
/// completes first.
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Ask the dispatcher to stop.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// The single long-lived consumer of the notification queue.
pub struct NotificationDispatcher<S, M> {
    rx: mpsc::Receiver<Notification>,
    store: S,
    maintenance: M,
    tick_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

/// Build a connected queue/dispatcher/shutdown triple.
///
/// The dispatcher must be driven (usually via `tokio::spawn`) for
/// enqueued notifications to go anywhere.
pub fn pipeline<S, M>(
    store: S,
    maintenance: M,
    capacity: usize,
    tick_interval: Duration,
) -> (NotificationQueue, NotificationDispatcher<S, M>, ShutdownHandle)
where
    S: NotificationStore,
    M: TokenSweeper,
{
    let (tx, rx) = mpsc::channel(capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    (
        NotificationQueue { tx },
        NotificationDispatcher {
            rx,
            store,
            maintenance,
            tick_interval,
            shutdown: shutdown_rx,
        },
        ShutdownHandle { tx: shutdown_tx },
    )
}

impl<S, M> NotificationDispatcher<S, M>
where
    S: NotificationStore,
    M: TokenSweeper,
{
    /// Run the dispatcher until shutdown or queue closure.
    ///
    /// Each iteration performs exactly one of: deliver one notification,
    /// run one maintenance sweep, or observe shutdown. The wait is a fair
    /// multiplexed select; cancellation is only observed between
    /// iterations, never mid-delivery.
    pub async fn run(mut self) {
        let mut ticker = interval_at(
            Instant::now() + self.tick_interval,
            self.tick_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            tick_interval_secs = self.tick_interval.as_secs(),
            "notification dispatcher started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    info!("notification dispatcher shutting down");
                    break;
                }
                received = self.rx.recv() => match received {
                    Some(notification) => self.deliver(notification).await,
                    None => {
                        info!("notification queue closed, dispatcher stopping");
                        break;
                    }
                },
                _ = ticker.tick() => self.maintain().await,
            }
        }
    }

    /// Deliver one notification. Failures are logged and dropped; a
    /// single bad record must never take the dispatcher down.
    async fn deliver(&self, notification: Notification) {
        if notification.recipient.is_nil() {
            warn!(
                notification_id = %notification.id,
                "discarding notification without a recipient"
            );
            return;
        }

        match self.store.append(&notification).await {
            Ok(()) => {
                debug!(
                    notification_id = %notification.id,
                    recipient = %notification.recipient,
                    "notification delivered"
                );
            }
            Err(e) => {
                error!(
                    error = %e,
                    notification_id = %notification.id,
                    recipient = %notification.recipient,
                    "failed to deliver notification, dropping"
                );
            }
        }
    }

    /// One maintenance pass: sweep expired session tokens.
    async fn maintain(&self) {
        match self.maintenance.sweep_expired(Utc::now()).await {
            Ok(0) => debug!("maintenance tick: no expired tokens"),
            Ok(swept) => info!(swept, "maintenance tick: removed expired session tokens"),
            Err(e) => error!(error = %e, "maintenance sweep failed"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    use tokio::sync::Notify;
    use tokio::time::timeout;

    use super::*;

    // =========================================================================
    // Test doubles
    // =========================================================================

    /// In-memory `NotificationStore` with the same atomicity contract as
    /// the Postgres implementation: one lock acquisition per operation.
    #[derive(Clone, Default)]
    struct InMemoryNotifications {
        lists: Arc<Mutex<HashMap<UserId, Vec<Notification>>>>,
    }

    impl InMemoryNotifications {
        fn notifications_for(&self, user_id: UserId) -> Vec<Notification> {
            self.lists
                .lock()
                .unwrap()
                .get(&user_id)
                .cloned()
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl NotificationStore for InMemoryNotifications {
        async fn append(&self, notification: &Notification) -> Result<(), RepositoryError> {
            self.lists
                .lock()
                .unwrap()
                .entry(notification.recipient)
                .or_default()
                .push(notification.clone());
            Ok(())
        }

        async fn list_for_user(
            &self,
            user_id: UserId,
        ) -> Result<Vec<Notification>, RepositoryError> {
            Ok(self.notifications_for(user_id))
        }

        async fn mark_all_read(
            &self,
            user_id: UserId,
            read_at: DateTime<Utc>,
        ) -> Result<u64, RepositoryError> {
            let mut lists = self.lists.lock().unwrap();
            let mut marked = 0;
            if let Some(list) = lists.get_mut(&user_id) {
                for n in list.iter_mut().filter(|n| n.read_at.is_none()) {
                    n.read_at = Some(read_at);
                    marked += 1;
                }
            }
            Ok(marked)
        }

        async fn delete(
            &self,
            user_id: UserId,
            notification_id: NotificationId,
        ) -> Result<bool, RepositoryError> {
            let mut lists = self.lists.lock().unwrap();
            let Some(list) = lists.get_mut(&user_id) else {
                return Ok(false);
            };
            let before = list.len();
            list.retain(|n| n.id != notification_id);
            Ok(list.len() < before)
        }
    }

    /// Store that fails appends for one recipient, for loop-survival tests.
    #[derive(Clone)]
    struct FailingStore {
        inner: InMemoryNotifications,
        fail_recipient: UserId,
    }

    #[async_trait]
    impl NotificationStore for FailingStore {
        async fn append(&self, notification: &Notification) -> Result<(), RepositoryError> {
            if notification.recipient == self.fail_recipient {
                return Err(RepositoryError::NotFound);
            }
            self.inner.append(notification).await
        }

        async fn list_for_user(
            &self,
            user_id: UserId,
        ) -> Result<Vec<Notification>, RepositoryError> {
            self.inner.list_for_user(user_id).await
        }

        async fn mark_all_read(
            &self,
            user_id: UserId,
            read_at: DateTime<Utc>,
        ) -> Result<u64, RepositoryError> {
            self.inner.mark_all_read(user_id, read_at).await
        }

        async fn delete(
            &self,
            user_id: UserId,
            notification_id: NotificationId,
        ) -> Result<bool, RepositoryError> {
            self.inner.delete(user_id, notification_id).await
        }
    }

    /// Store whose appends rendezvous with the test, for shutdown-timing
    /// tests.
    #[derive(Clone)]
    struct GatedStore {
        inner: InMemoryNotifications,
        started: Arc<Notify>,
        proceed: Arc<Notify>,
    }

    #[async_trait]
    impl NotificationStore for GatedStore {
        async fn append(&self, notification: &Notification) -> Result<(), RepositoryError> {
            self.started.notify_one();
            self.proceed.notified().await;
            self.inner.append(notification).await
        }

        async fn list_for_user(
            &self,
            user_id: UserId,
        ) -> Result<Vec<Notification>, RepositoryError> {
            self.inner.list_for_user(user_id).await
        }

        async fn mark_all_read(
            &self,
            user_id: UserId,
            read_at: DateTime<Utc>,
        ) -> Result<u64, RepositoryError> {
            self.inner.mark_all_read(user_id, read_at).await
        }

        async fn delete(
            &self,
            user_id: UserId,
            notification_id: NotificationId,
        ) -> Result<bool, RepositoryError> {
            self.inner.delete(user_id, notification_id).await
        }
    }

    #[derive(Clone, Default)]
    struct CountingSweeper {
        sweeps: Arc<AtomicU64>,
    }

    #[async_trait]
    impl TokenSweeper for CountingSweeper {
        async fn sweep_expired(&self, _now: DateTime<Utc>) -> Result<u64, RepositoryError> {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }
    }

    fn notification_for(recipient: UserId, message: &str) -> Notification {
        Notification::new(
            "poster".to_string(),
            recipient,
            message.to_string(),
            "/topics/abc".to_string(),
        )
    }

    // =========================================================================
    // Delivery
    // =========================================================================

    #[tokio::test]
    async fn delivers_in_fifo_order() {
        let store = InMemoryNotifications::default();
        let (queue, dispatcher, _shutdown) =
            pipeline(store.clone(), CountingSweeper::default(), 10, Duration::from_secs(60));

        let recipient = UserId::generate();
        queue
            .enqueue(notification_for(recipient, "first"))
            .await
            .unwrap();
        queue
            .enqueue(notification_for(recipient, "second"))
            .await
            .unwrap();
        queue
            .enqueue(notification_for(recipient, "third"))
            .await
            .unwrap();

        // Closing the queue lets the dispatcher drain and stop.
        drop(queue);
        dispatcher.run().await;

        let delivered = store.notifications_for(recipient);
        let messages: Vec<&str> = delivered.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn discards_notifications_without_a_recipient() {
        let store = InMemoryNotifications::default();
        let (queue, dispatcher, _shutdown) =
            pipeline(store.clone(), CountingSweeper::default(), 10, Duration::from_secs(60));

        let recipient = UserId::generate();
        queue
            .enqueue(notification_for(
                UserId::new(uuid::Uuid::nil()),
                "unroutable",
            ))
            .await
            .unwrap();
        queue
            .enqueue(notification_for(recipient, "routable"))
            .await
            .unwrap();

        drop(queue);
        dispatcher.run().await;

        let delivered = store.notifications_for(recipient);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered.first().unwrap().message, "routable");
    }

    #[tokio::test]
    async fn delivery_failure_does_not_stop_the_dispatcher() {
        let missing_user = UserId::generate();
        let good_user = UserId::generate();
        let store = FailingStore {
            inner: InMemoryNotifications::default(),
            fail_recipient: missing_user,
        };
        let (queue, dispatcher, _shutdown) = pipeline(
            store.clone(),
            CountingSweeper::default(),
            10,
            Duration::from_secs(60),
        );

        queue
            .enqueue(notification_for(missing_user, "dropped"))
            .await
            .unwrap();
        queue
            .enqueue(notification_for(good_user, "delivered"))
            .await
            .unwrap();

        drop(queue);
        // The failed delivery is dropped and the loop continues to the
        // next notification instead of terminating.
        dispatcher.run().await;

        assert!(store.inner.notifications_for(missing_user).is_empty());
        assert_eq!(store.inner.notifications_for(good_user).len(), 1);
    }

    // =========================================================================
    // Backpressure
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn full_queue_blocks_producer_until_drained() {
        let store = InMemoryNotifications::default();
        let (queue, dispatcher, shutdown) =
            pipeline(store.clone(), CountingSweeper::default(), 2, Duration::from_secs(3600));

        let recipient = UserId::generate();
        queue
            .enqueue(notification_for(recipient, "one"))
            .await
            .unwrap();
        queue
            .enqueue(notification_for(recipient, "two"))
            .await
            .unwrap();

        // No consumer yet: the third enqueue must stall.
        let blocked = timeout(
            Duration::from_millis(100),
            queue.enqueue(notification_for(recipient, "three")),
        )
        .await;
        assert!(blocked.is_err(), "enqueue into a full queue must suspend");

        // Start the consumer; the same send now goes through.
        let task = tokio::spawn(dispatcher.run());
        queue
            .enqueue(notification_for(recipient, "three"))
            .await
            .unwrap();

        drop(queue);
        task.await.unwrap();
        drop(shutdown);

        assert_eq!(store.notifications_for(recipient).len(), 3);
    }

    #[tokio::test]
    async fn enqueue_after_dispatcher_gone_errors() {
        let (queue, dispatcher, _shutdown) = pipeline(
            InMemoryNotifications::default(),
            CountingSweeper::default(),
            4,
            Duration::from_secs(60),
        );

        drop(dispatcher);

        let result = queue
            .enqueue(notification_for(UserId::generate(), "nowhere to go"))
            .await;
        assert!(result.is_err());
    }

    // =========================================================================
    // Maintenance tick
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn maintenance_ticks_fire_while_queue_is_idle() {
        let sweeper = CountingSweeper::default();
        let (queue, dispatcher, shutdown) = pipeline(
            InMemoryNotifications::default(),
            sweeper.clone(),
            10,
            Duration::from_secs(60),
        );

        let task = tokio::spawn(dispatcher.run());

        // No notification is ever enqueued; three intervals pass.
        tokio::time::sleep(Duration::from_secs(185)).await;
        assert_eq!(sweeper.sweeps.load(Ordering::SeqCst), 3);

        shutdown.shutdown();
        task.await.unwrap();
        drop(queue);
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    #[tokio::test]
    async fn shutdown_stops_an_idle_dispatcher() {
        let (_queue, dispatcher, shutdown) = pipeline(
            InMemoryNotifications::default(),
            CountingSweeper::default(),
            10,
            Duration::from_secs(3600),
        );

        let task = tokio::spawn(dispatcher.run());
        shutdown.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_waits_for_inflight_delivery() {
        let started = Arc::new(Notify::new());
        let proceed = Arc::new(Notify::new());
        let store = GatedStore {
            inner: InMemoryNotifications::default(),
            started: Arc::clone(&started),
            proceed: Arc::clone(&proceed),
        };
        let (queue, dispatcher, shutdown) = pipeline(
            store.clone(),
            CountingSweeper::default(),
            10,
            Duration::from_secs(3600),
        );

        let recipient = UserId::generate();
        let task = tokio::spawn(dispatcher.run());
        queue
            .enqueue(notification_for(recipient, "inflight"))
            .await
            .unwrap();

        // Wait until the append is underway, then signal shutdown while
        // it is still blocked mid-delivery.
        started.notified().await;
        shutdown.shutdown();
        proceed.notify_one();

        task.await.unwrap();

        // Cancellation was only observed at the iteration boundary: the
        // pulled notification was persisted, not dropped.
        assert_eq!(store.inner.notifications_for(recipient).len(), 1);
    }

    // =========================================================================
    // Concurrent mutation of one user's list
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_and_mark_all_read_lose_nothing() {
        let store = InMemoryNotifications::default();
        let user = UserId::generate();

        // Seed three already-read notifications.
        for i in 0..3 {
            store
                .append(&notification_for(user, &format!("seed-{i}")))
                .await
                .unwrap();
        }
        store.mark_all_read(user, Utc::now()).await.unwrap();

        // Race eight appends against eight mark-all-read passes.
        let mut tasks = Vec::new();
        for i in 0..8 {
            let appender = store.clone();
            tasks.push(tokio::spawn(async move {
                appender
                    .append(&notification_for(user, &format!("racer-{i}")))
                    .await
                    .unwrap();
            }));
            let marker = store.clone();
            tasks.push(tokio::spawn(async move {
                marker.mark_all_read(user, Utc::now()).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let after = store.notifications_for(user);
        // Every append survived every concurrent mark-all-read.
        assert_eq!(after.len(), 3 + 8);
        // No previously-set read flag was lost.
        let seeded_read = after
            .iter()
            .filter(|n| n.message.starts_with("seed-") && n.is_read())
            .count();
        assert_eq!(seeded_read, 3);
    }

    #[tokio::test]
    async fn whole_record_overwrite_loses_updates_row_level_store_does_not() {
        // A store that keeps a user's notifications as one record, with
        // every path doing fetch -> mutate -> save, permits this
        // interleaving to lose an update.
        let user = UserId::generate();
        let naive: Mutex<HashMap<UserId, Vec<Notification>>> = Mutex::new(HashMap::new());
        naive
            .lock()
            .unwrap()
            .insert(user, vec![notification_for(user, "existing")]);

        // Path A (dispatcher append) and path B (mark-all-read) each
        // fetch their own copy...
        let mut copy_a = naive.lock().unwrap().get(&user).cloned().unwrap();
        let mut copy_b = naive.lock().unwrap().get(&user).cloned().unwrap();

        // ...A appends and saves...
        copy_a.push(notification_for(user, "appended"));
        naive.lock().unwrap().insert(user, copy_a);

        // ...then B marks read and saves, silently discarding A's append.
        for n in &mut copy_b {
            n.read_at = Some(Utc::now());
        }
        naive.lock().unwrap().insert(user, copy_b);

        let lost = naive.lock().unwrap().get(&user).cloned().unwrap();
        assert_eq!(lost.len(), 1, "whole-record overwrite lost the append");

        // The same interleaving through the row-level store keeps both
        // effects: the append survives and the pre-existing notification
        // is marked read.
        let store = InMemoryNotifications::default();
        store
            .append(&notification_for(user, "existing"))
            .await
            .unwrap();
        store
            .append(&notification_for(user, "appended"))
            .await
            .unwrap();
        store.mark_all_read(user, Utc::now()).await.unwrap();

        let kept = store.notifications_for(user);
        assert_eq!(kept.len(), 2);
        assert!(
            kept.iter().all(Notification::is_read),
            "mark-all-read applied to everything present at the time"
        );
    }

    #[tokio::test]
    async fn delete_reports_not_found_distinctly() {
        let store = InMemoryNotifications::default();
        let user = UserId::generate();
        let n = notification_for(user, "deletable");
        store.append(&n).await.unwrap();

        assert!(store.delete(user, n.id).await.unwrap());
        // A second delete of the same id is not-found, not success.
        assert!(!store.delete(user, n.id).await.unwrap());
        assert!(!store.delete(user, NotificationId::generate()).await.unwrap());
    }
}
