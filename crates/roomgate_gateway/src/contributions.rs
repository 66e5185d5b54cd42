//! Per-room contribution tracking.
//!
//! Each open room has a tracker holding the users who changed the document
//! since the last flush, and a timer task that flushes it every window.
//! Closing the room flushes once more before the timer is cancelled.

use crate::context::{ConnectionContext, ContextAccess, ContextField};
use crate::extension::{Extension, Hook, HookSet};
use async_trait::async_trait;
use parking_lot::Mutex;
use roomgate_protocol::UserIdentity;
use roomgate_rpc::{IntegrationClient, RpcResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error};

/// Destination of flushed contributor snapshots.
#[async_trait]
pub trait ContributionReporter: Send + Sync {
    /// Delivers the users who contributed to `room` during the last window.
    async fn report(&self, room: &str, users: Vec<UserIdentity>) -> RpcResult<()>;
}

#[async_trait]
impl ContributionReporter for IntegrationClient {
    async fn report(&self, room: &str, users: Vec<UserIdentity>) -> RpcResult<()> {
        self.report_contributions(room, users).await
    }
}

type Contributors = Arc<Mutex<HashMap<String, UserIdentity>>>;

struct Tracker {
    contributors: Contributors,
    cancel: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Aggregates contributors per room and reports them every window.
pub struct ContributionAggregator {
    window: Duration,
    reporter: Arc<dyn ContributionReporter>,
    trackers: Mutex<HashMap<String, Tracker>>,
}

impl ContributionAggregator {
    /// Extension name.
    pub const NAME: &'static str = "contributions";

    /// Creates an aggregator flushing every `window` (at least 1ms).
    pub fn new(window: Duration, reporter: Arc<dyn ContributionReporter>) -> Self {
        Self {
            window: window.max(Duration::from_millis(1)),
            reporter,
            trackers: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the flush interval.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Starts tracking a room.
    ///
    /// Returns false and leaves the existing tracker untouched if the room
    /// is already tracked. Must be called from within a tokio runtime.
    pub fn start(&self, room: &str) -> bool {
        let mut trackers = self.trackers.lock();
        if trackers.contains_key(room) {
            error!(room, "contribution tracker already running");
            return false;
        }

        let contributors: Contributors = Arc::default();
        let (cancel, cancelled) = oneshot::channel();
        let task = tokio::spawn(run_timer(
            room.to_string(),
            self.window,
            contributors.clone(),
            self.reporter.clone(),
            cancelled,
        ));
        trackers.insert(
            room.to_string(),
            Tracker {
                contributors,
                cancel,
                task,
            },
        );
        debug!(room, window_secs = self.window.as_secs(), "contribution tracker started");
        true
    }

    /// Records a contribution. A no-op for untracked rooms and empty user IDs.
    pub fn record(&self, room: &str, identity: &UserIdentity) {
        if identity.id.is_empty() {
            return;
        }
        let contributors = match self.trackers.lock().get(room) {
            Some(tracker) => tracker.contributors.clone(),
            None => return,
        };
        contributors
            .lock()
            .insert(identity.id.clone(), identity.clone());
    }

    /// Flushes pending contributions, then stops tracking the room.
    ///
    /// Returns false if the room was not tracked.
    pub async fn stop(&self, room: &str) -> bool {
        let removed = self.trackers.lock().remove(room);
        let Some(tracker) = removed else {
            return false;
        };

        flush(room, &tracker.contributors, self.reporter.as_ref()).await;
        // the timer task may already be gone
        let _ = tracker.cancel.send(());
        if let Err(err) = tracker.task.await {
            if !err.is_cancelled() {
                error!(room, error = %err, "contribution timer task failed");
            }
        }
        debug!(room, "contribution tracker stopped");
        true
    }

    /// Stops every tracker.
    pub async fn stop_all(&self) {
        let rooms: Vec<String> = self.trackers.lock().keys().cloned().collect();
        for room in rooms {
            self.stop(&room).await;
        }
    }

    /// Returns true if the room is tracked.
    pub fn is_tracking(&self, room: &str) -> bool {
        self.trackers.lock().contains_key(room)
    }

    /// Contributors recorded since the last flush.
    pub fn pending(&self, room: &str) -> Vec<UserIdentity> {
        let contributors = match self.trackers.lock().get(room) {
            Some(tracker) => tracker.contributors.clone(),
            None => return Vec::new(),
        };
        let mut users: Vec<UserIdentity> = contributors.lock().values().cloned().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        users
    }
}

impl std::fmt::Debug for ContributionAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContributionAggregator")
            .field("window", &self.window)
            .field("rooms", &self.trackers.lock().len())
            .finish_non_exhaustive()
    }
}

async fn run_timer(
    room: String,
    window: Duration,
    contributors: Contributors,
    reporter: Arc<dyn ContributionReporter>,
    mut cancelled: oneshot::Receiver<()>,
) {
    let mut ticker = interval_at(Instant::now() + window, window);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = &mut cancelled => break,
            _ = ticker.tick() => flush(&room, &contributors, reporter.as_ref()).await,
        }
    }
}

async fn flush(room: &str, contributors: &Contributors, reporter: &dyn ContributionReporter) {
    let snapshot = std::mem::take(&mut *contributors.lock());
    if snapshot.is_empty() {
        debug!(room, "no contributions in window");
        return;
    }

    let users: Vec<UserIdentity> = snapshot.into_values().collect();
    let count = users.len();
    match reporter.report(room, users).await {
        Ok(()) => debug!(room, users = count, "contributions reported"),
        Err(err) => error!(room, users = count, error = %err, "failed to report contributions"),
    }
}

#[async_trait]
impl Extension for ContributionAggregator {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn hooks(&self) -> HookSet {
        HookSet::of(&[Hook::OnChange, Hook::OnRoomOpen, Hook::OnRoomClose])
    }

    fn context_access(&self) -> ContextAccess {
        ContextAccess {
            reads: &[ContextField::Identity],
            writes: &[],
        }
    }

    fn on_change(&self, room: &str, context: &ConnectionContext) {
        if let Some(identity) = context.identity() {
            self.record(room, identity);
        }
    }

    async fn on_room_open(&self, room: &str) {
        self.start(room);
    }

    async fn on_room_close(&self, room: &str) {
        self.stop(room).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use roomgate_rpc::RpcError;
    use roomgate_testkit::identity_strategy;
    use std::collections::BTreeSet;

    #[derive(Default)]
    struct Collecting {
        reports: Mutex<Vec<(String, Vec<String>)>>,
        failing: std::sync::atomic::AtomicBool,
    }

    impl Collecting {
        fn reports(&self) -> Vec<(String, Vec<String>)> {
            self.reports.lock().clone()
        }
    }

    #[async_trait]
    impl ContributionReporter for Collecting {
        async fn report(&self, room: &str, users: Vec<UserIdentity>) -> RpcResult<()> {
            if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(RpcError::NotConnected);
            }
            let mut ids: Vec<String> = users.into_iter().map(|u| u.id).collect();
            ids.sort();
            self.reports.lock().push((room.to_string(), ids));
            Ok(())
        }
    }

    fn user(id: &str) -> UserIdentity {
        UserIdentity::new(id, format!("{id}@example.com"))
    }

    fn aggregator(reporter: &Arc<Collecting>) -> ContributionAggregator {
        ContributionAggregator::new(Duration::from_secs(60), reporter.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_every_window() {
        let reporter = Arc::new(Collecting::default());
        let aggregator = aggregator(&reporter);
        assert!(aggregator.start("doc"));

        aggregator.record("doc", &user("u1"));
        aggregator.record("doc", &user("u2"));
        aggregator.record("doc", &user("u1"));
        assert_eq!(aggregator.pending("doc").len(), 2);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(
            reporter.reports(),
            vec![("doc".to_string(), vec!["u1".to_string(), "u2".to_string()])]
        );
        assert!(aggregator.pending("doc").is_empty());

        // empty windows report nothing
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(reporter.reports().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_start_keeps_the_first_tracker() {
        let reporter = Arc::new(Collecting::default());
        let aggregator = aggregator(&reporter);
        assert!(aggregator.start("doc"));
        aggregator.record("doc", &user("u1"));

        assert!(!aggregator.start("doc"));
        assert_eq!(aggregator.pending("doc"), vec![user("u1")]);
    }

    #[tokio::test(start_paused = true)]
    async fn untracked_rooms_and_empty_ids_are_ignored() {
        let reporter = Arc::new(Collecting::default());
        let aggregator = aggregator(&reporter);

        aggregator.record("missing", &user("u1"));
        assert!(aggregator.pending("missing").is_empty());

        aggregator.start("doc");
        aggregator.record("doc", &user(""));
        assert!(aggregator.pending("doc").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_flushes_before_teardown() {
        let reporter = Arc::new(Collecting::default());
        let aggregator = aggregator(&reporter);
        aggregator.start("doc");
        aggregator.record("doc", &user("u1"));

        assert!(aggregator.stop("doc").await);
        assert_eq!(reporter.reports(), vec![("doc".to_string(), vec!["u1".to_string()])]);
        assert!(!aggregator.is_tracking("doc"));
        assert!(!aggregator.stop("doc").await);

        // no timer survives the room
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(reporter.reports().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delivery_failures_do_not_stop_the_timer() {
        let reporter = Arc::new(Collecting::default());
        let aggregator = aggregator(&reporter);
        aggregator.start("doc");

        reporter
            .failing
            .store(true, std::sync::atomic::Ordering::SeqCst);
        aggregator.record("doc", &user("u1"));
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(reporter.reports().is_empty());

        reporter
            .failing
            .store(false, std::sync::atomic::Ordering::SeqCst);
        aggregator.record("doc", &user("u2"));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(reporter.reports(), vec![("doc".to_string(), vec!["u2".to_string()])]);
    }

    #[tokio::test(start_paused = true)]
    async fn rooms_are_independent() {
        let reporter = Arc::new(Collecting::default());
        let aggregator = aggregator(&reporter);
        aggregator.start("a");
        aggregator.start("b");
        aggregator.record("a", &user("u1"));

        aggregator.stop("b").await;
        assert!(reporter.reports().is_empty());
        assert_eq!(aggregator.pending("a"), vec![user("u1")]);

        aggregator.stop_all().await;
        assert_eq!(reporter.reports().len(), 1);
    }

    proptest! {
        #[test]
        fn each_contributor_is_reported_once(
            identities in prop::collection::vec(identity_strategy(), 1..16)
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .start_paused(true)
                .build()
                .unwrap();
            let reporter = Arc::new(Collecting::default());
            let aggregator = aggregator(&reporter);

            runtime.block_on(async {
                aggregator.start("doc");
                for identity in &identities {
                    aggregator.record("doc", identity);
                }
                aggregator.stop("doc").await;
            });

            let ids: Vec<String> = identities
                .iter()
                .map(|u| u.id.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            prop_assert_eq!(reporter.reports(), vec![("doc".to_string(), ids)]);
        }
    }
}
