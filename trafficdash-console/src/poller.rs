//! Periodic snapshot poller with skip-if-busy semantics.
//!
//! A poller owns one tokio task driving an explicit state machine:
//!
//! - `Idle` -- a timer tick dispatches a fetch and moves to `Requesting`;
//! - `Requesting` -- ticks are skipped (and counted); when the fetch settles
//!   the subscriber is called *inside the task*, then the phase returns to
//!   `Idle`.
//!
//! Because the subscriber runs before the next dispatch, snapshot N is fully
//! handled before snapshot N+1 is requested. Stopping the poller lets an
//! in-flight request finish but its result never reaches the subscriber.

use crate::client::FetchError;
use crate::state::{new_state, Shared};
use futures::future::BoxFuture;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Anything the poller can fetch a `T` from.
pub trait SnapshotSource<T>: Send + Sync + 'static {
    fn fetch(&self) -> BoxFuture<'static, Result<T, FetchError>>;

    /// Human readable target, used in logs.
    fn describe(&self) -> String {
        "snapshot source".to_string()
    }
}

/// Receives every settled poll, in order, on the poller task.
pub trait PollSubscriber<T>: Send + 'static {
    fn on_snapshot(&mut self, snapshot: Arc<T>);
    fn on_error(&mut self, error: FetchError);
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollStats {
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped_ticks: u64,
}

/// Observable state of one poller.
#[derive(Debug)]
pub struct PollStatus<T> {
    pub latest: Option<Arc<T>>,
    /// True until the first poll settles.
    pub loading: bool,
    /// Cleared by the next successful poll.
    pub last_error: Option<FetchError>,
    pub last_success_at: Option<OffsetDateTime>,
    pub stats: PollStats,
}

impl<T> PollStatus<T> {
    fn new() -> Self {
        Self { latest: None, loading: true, last_error: None, last_success_at: None, stats: PollStats::default() }
    }
}

impl<T> Clone for PollStatus<T> {
    fn clone(&self) -> Self {
        Self {
            latest: self.latest.clone(),
            loading: self.loading,
            last_error: self.last_error.clone(),
            last_success_at: self.last_success_at,
            stats: self.stats.clone(),
        }
    }
}

/// Résumé sérialisable pour /system/health
#[derive(Debug, Clone, Serialize)]
pub struct PollerReport {
    pub name: String,
    pub target: String,
    pub interval_ms: u64,
    pub active: bool,
    pub loading: bool,
    pub last_error: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_success_at: Option<OffsetDateTime>,
    pub stats: PollStats,
}

enum PollPhase<T> {
    Idle,
    Requesting(BoxFuture<'static, Result<T, FetchError>>),
}

impl<T> PollPhase<T> {
    fn is_requesting(&self) -> bool {
        matches!(self, PollPhase::Requesting(_))
    }
}

async fn settle<T>(phase: &mut PollPhase<T>) -> Result<T, FetchError> {
    match phase {
        PollPhase::Requesting(fut) => fut.await,
        PollPhase::Idle => std::future::pending().await,
    }
}

/// Vue en lecture seule d'un poller (health, API HTTP)
pub struct PollerMonitor<T> {
    name: String,
    target: String,
    interval: Duration,
    active: Arc<AtomicBool>,
    status: Shared<PollStatus<T>>,
}

impl<T> Clone for PollerMonitor<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            target: self.target.clone(),
            interval: self.interval,
            active: self.active.clone(),
            status: self.status.clone(),
        }
    }
}

impl<T> PollerMonitor<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn status(&self) -> PollStatus<T> {
        self.status.lock().clone()
    }

    pub fn report(&self) -> PollerReport {
        let st = self.status.lock();
        PollerReport {
            name: self.name.clone(),
            target: self.target.clone(),
            interval_ms: self.interval.as_millis() as u64,
            active: self.is_active(),
            loading: st.loading,
            last_error: st.last_error.as_ref().map(|e| e.to_string()),
            last_success_at: st.last_success_at,
            stats: st.stats.clone(),
        }
    }
}

/// Effacement du type de snapshot pour agréger plusieurs pollers
pub trait PollerProbe: Send + Sync {
    fn report(&self) -> PollerReport;
}

impl<T: Send + Sync> PollerProbe for PollerMonitor<T> {
    fn report(&self) -> PollerReport {
        PollerMonitor::report(self)
    }
}

pub struct PollerHandle<T> {
    monitor: PollerMonitor<T>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl<T> PollerHandle<T> {
    pub fn monitor(&self) -> PollerMonitor<T> {
        self.monitor.clone()
    }

    pub fn is_active(&self) -> bool {
        self.monitor.is_active()
    }

    pub fn status(&self) -> PollStatus<T> {
        self.monitor.status()
    }

    pub fn report(&self) -> PollerReport {
        self.monitor.report()
    }

    /// Arrête les ticks; une requête en vol termine mais son résultat est jeté.
    pub fn stop(&self) {
        if self.monitor.active.swap(false, Ordering::AcqRel) {
            info!(poller = %self.monitor.name, "stopping poller");
        }
        let _ = self.stop_tx.send(true);
    }

    /// Stoppe puis attend la fin de la tâche (drain de la requête en vol inclus).
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.task.await {
            warn!(poller = %self.monitor.name, "poller task ended abnormally: {e}");
        }
    }
}

/// Démarre un poller sur `source`, toutes les `interval`, vers `subscriber`.
pub fn start<T, S, H>(name: &str, source: S, interval: Duration, subscriber: H) -> PollerHandle<T>
where
    T: Send + Sync + 'static,
    S: SnapshotSource<T>,
    H: PollSubscriber<T>,
{
    let active = Arc::new(AtomicBool::new(true));
    let status = new_state(PollStatus::new());
    let (stop_tx, stop_rx) = watch::channel(false);
    let target = source.describe();

    info!(poller = name, %target, interval_ms = interval.as_millis() as u64, "starting poller");

    let task = tokio::spawn(run(
        name.to_string(),
        source,
        interval,
        subscriber,
        active.clone(),
        status.clone(),
        stop_rx,
    ));

    let monitor = PollerMonitor { name: name.to_string(), target, interval, active, status };
    PollerHandle { monitor, stop_tx, task }
}

async fn run<T, S, H>(
    name: String,
    source: S,
    interval: Duration,
    mut subscriber: H,
    active: Arc<AtomicBool>,
    status: Shared<PollStatus<T>>,
    mut stop_rx: watch::Receiver<bool>,
) where
    T: Send + Sync + 'static,
    S: SnapshotSource<T>,
    H: PollSubscriber<T>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut phase: PollPhase<T> = PollPhase::Idle;

    loop {
        let requesting = phase.is_requesting();
        tokio::select! {
            biased;

            _ = stop_rx.changed() => break,

            result = settle(&mut phase), if requesting => {
                phase = PollPhase::Idle;
                if !active.load(Ordering::Acquire) {
                    debug!(poller = %name, "response arrived after stop, discarded");
                    break;
                }
                deliver(&name, result, &status, &mut subscriber);
            }

            _ = ticker.tick() => {
                if phase.is_requesting() {
                    status.lock().stats.skipped_ticks += 1;
                    debug!(poller = %name, "previous fetch still outstanding, tick skipped");
                    continue;
                }
                phase = PollPhase::Requesting(source.fetch());
                status.lock().stats.dispatched += 1;
            }
        }
    }

    if let PollPhase::Requesting(fut) = phase {
        let _ = fut.await;
        debug!(poller = %name, "in-flight response drained after stop");
    }
    debug!(poller = %name, "poller task finished");
}

fn deliver<T, H>(name: &str, result: Result<T, FetchError>, status: &Shared<PollStatus<T>>, subscriber: &mut H)
where
    H: PollSubscriber<T>,
{
    match result {
        Ok(snapshot) => {
            let snapshot = Arc::new(snapshot);
            let recovered = {
                let mut st = status.lock();
                let recovered = st.last_error.take().is_some();
                st.latest = Some(snapshot.clone());
                st.loading = false;
                st.last_success_at = Some(OffsetDateTime::now_utc());
                st.stats.succeeded += 1;
                recovered
            };
            if recovered {
                info!(poller = name, "backend reachable again");
            }
            subscriber.on_snapshot(snapshot);
        }
        Err(e) => {
            let first_failure = {
                let mut st = status.lock();
                let first = st.last_error.is_none();
                st.last_error = Some(e.clone());
                st.loading = false;
                st.stats.failed += 1;
                first
            };
            if first_failure {
                warn!(poller = name, "poll failed: {e}");
            } else {
                debug!(poller = name, "poll still failing: {e}");
            }
            subscriber.on_error(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    /// Source scriptée: chaque fetch prend `delay` et consomme la prochaine réponse.
    #[derive(Clone)]
    struct ScriptedSource {
        replies: Arc<Mutex<VecDeque<Result<u32, FetchError>>>>,
        delay: Duration,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(replies: Vec<Result<u32, FetchError>>, delay: Duration) -> Self {
            Self {
                replies: Arc::new(Mutex::new(replies.into())),
                delay,
                in_flight: Arc::new(AtomicUsize::new(0)),
                max_in_flight: Arc::new(AtomicUsize::new(0)),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl SnapshotSource<u32> for ScriptedSource {
        fn fetch(&self) -> BoxFuture<'static, Result<u32, FetchError>> {
            let this = self.clone();
            Box::pin(async move {
                this.calls.fetch_add(1, Ordering::SeqCst);
                let now = this.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                this.max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(this.delay).await;
                this.in_flight.fetch_sub(1, Ordering::SeqCst);
                this.replies.lock().pop_front().unwrap_or(Ok(0))
            })
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Seen {
        Snap(u32),
        Err,
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Seen>>>);

    impl PollSubscriber<u32> for Recorder {
        fn on_snapshot(&mut self, snapshot: Arc<u32>) {
            self.0.lock().push(Seen::Snap(*snapshot));
        }
        fn on_error(&mut self, _error: FetchError) {
            self.0.lock().push(Seen::Err);
        }
    }

    fn http_500() -> FetchError {
        FetchError::Status { url: "http://backend/api/all-stats".into(), status: 500 }
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_tick_is_skipped() {
        let source = ScriptedSource::new(vec![], Duration::from_millis(350));
        let recorder = Recorder::default();
        let handle = start("test", source.clone(), Duration::from_millis(100), recorder.clone());

        tokio::time::sleep(Duration::from_millis(1_000)).await;

        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
        let st = handle.status();
        assert!(st.stats.skipped_ticks > 0);
        assert_eq!(st.stats.dispatched as usize, source.calls.load(Ordering::SeqCst));
        assert!(st.stats.dispatched < 10);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshots_delivered_in_order() {
        let source = ScriptedSource::new(vec![Ok(1), Ok(2), Ok(3)], Duration::from_millis(10));
        let recorder = Recorder::default();
        let handle = start("test", source, Duration::from_millis(100), recorder.clone());

        tokio::time::sleep(Duration::from_millis(250)).await;
        handle.shutdown().await;

        assert_eq!(*recorder.0.lock(), vec![Seen::Snap(1), Seen::Snap(2), Seen::Snap(3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_is_a_state_and_clears_on_success() {
        let source = ScriptedSource::new(vec![Ok(7), Err(http_500()), Ok(8)], Duration::from_millis(10));
        let recorder = Recorder::default();
        let handle = start("test", source, Duration::from_millis(100), recorder.clone());

        tokio::time::sleep(Duration::from_millis(150)).await;
        let st = handle.status();
        assert!(!st.loading);
        assert_eq!(st.last_error, Some(http_500()));
        assert_eq!(st.latest.as_deref(), Some(&7));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let st = handle.status();
        assert_eq!(st.last_error, None);
        assert_eq!(st.latest.as_deref(), Some(&8));
        assert_eq!(st.stats.failed, 1);

        handle.shutdown().await;
        assert_eq!(*recorder.0.lock(), vec![Seen::Snap(7), Seen::Err, Seen::Snap(8)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_discarded_after_stop() {
        let source = ScriptedSource::new(vec![Ok(1)], Duration::from_millis(500));
        let recorder = Recorder::default();
        let handle = start("test", source.clone(), Duration::from_millis(100), recorder.clone());

        // premier fetch en vol, on stoppe avant qu'il ne réponde
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        handle.stop();
        assert!(!handle.is_active());

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert!(recorder.0.lock().is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(handle.status().latest.is_none());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_reflects_counters() {
        let source = ScriptedSource::new(vec![Err(http_500())], Duration::from_millis(1));
        let handle = start("stats", source, Duration::from_millis(3_000), Recorder::default());
        tokio::time::sleep(Duration::from_millis(10)).await;

        let report = handle.report();
        assert_eq!(report.name, "stats");
        assert_eq!(report.interval_ms, 3_000);
        assert!(report.active);
        assert_eq!(report.stats.failed, 1);
        assert!(report.last_error.unwrap().contains("500"));
        handle.shutdown().await;
    }
}
