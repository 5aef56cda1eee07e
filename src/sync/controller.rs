use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{clamp_refresh_rate, SyncConfig};
use crate::metrics::MetricsCollector;
use crate::models::{ConnectionStatus, Snapshot};
use crate::notifications::NotificationDispatcher;
use crate::subscriptions::{SubscriberList, Subscription};

use super::backoff::BackoffPolicy;
use super::loop_worker::{run_attempt, sync_loop};
use super::source::ReadingSource;
use super::state::{EngineState, EngineStats, FetchOutcome};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

pub(super) struct EngineInner {
    pub(super) config: SyncConfig,
    pub(super) source: Arc<dyn ReadingSource>,
    pub(super) dispatcher: Option<Arc<NotificationDispatcher>>,
    pub(super) metrics: MetricsCollector,
    pub(super) fetching: AtomicBool,
    pub(super) wake: Notify,
    state: Mutex<EngineState>,
    /// Last live snapshot; the baseline for the next diff.
    last_good: Mutex<Option<Snapshot>>,
    snapshots: SubscriberList<Snapshot>,
    statuses: SubscriberList<ConnectionStatus>,
    snapshot_tx: watch::Sender<Option<Snapshot>>,
    /// Replaced on every stop so later attempts get a fresh token.
    cancel_token: Mutex<CancellationToken>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl EngineInner {
    pub(super) fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        lock(&self.state)
    }

    pub(super) fn lock_last_good(&self) -> MutexGuard<'_, Option<Snapshot>> {
        lock(&self.last_good)
    }

    pub(super) fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.lock_state().refresh_rate_ms)
    }

    pub(super) fn publish_snapshot(&self, snapshot: Snapshot) {
        self.snapshot_tx.send_replace(Some(snapshot.clone()));
        self.snapshots.publish(snapshot);
    }

    pub(super) fn publish_status(&self, status: ConnectionStatus) {
        if self.statuses.publish_if_changed(status) {
            log_info!("connection status -> {}", status.as_str());
        }
    }

    fn current_token(&self) -> CancellationToken {
        lock(&self.cancel_token).clone()
    }
}

/// Owns the poll loop and everything it publishes.
///
/// Cheap to clone; clones share one engine.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn ReadingSource>,
        dispatcher: Option<Arc<NotificationDispatcher>>,
    ) -> Self {
        let refresh_rate_ms = clamp_refresh_rate(config.refresh_rate_ms);
        let policy = BackoffPolicy::from_config(&config);
        let (snapshot_tx, _) = watch::channel(None);

        Self {
            inner: Arc::new(EngineInner {
                config,
                source,
                dispatcher,
                metrics: MetricsCollector::new(),
                fetching: AtomicBool::new(false),
                wake: Notify::new(),
                state: Mutex::new(EngineState::new(refresh_rate_ms, policy)),
                last_good: Mutex::new(None),
                snapshots: SubscriberList::new("snapshot"),
                statuses: SubscriberList::new("connection-status"),
                snapshot_tx,
                cancel_token: Mutex::new(CancellationToken::new()),
                handle: Mutex::new(None),
            }),
        }
    }

    /// Spawns the poll loop. The first attempt fires immediately.
    pub fn start(&self) -> Result<()> {
        let runtime =
            Handle::try_current().context("sync engine must be started inside a tokio runtime")?;

        let mut handle = lock(&self.inner.handle);
        if handle.is_some() {
            bail!("sync engine already running");
        }

        let cancel_token = self.inner.current_token();
        self.inner.lock_state().begin();
        *handle = Some(runtime.spawn(sync_loop(Arc::clone(&self.inner), cancel_token)));

        log_info!("sync engine started");
        Ok(())
    }

    /// Cancels the loop and any in-flight fetch. Publishes `disconnected` if
    /// the engine was running.
    pub fn stop(&self) {
        // The cancelled task winds down on its own.
        drop(self.halt());
    }

    /// Stop that also forgets failure history and metrics.
    pub async fn manual_stop(&self) {
        self.stop();
        {
            let mut state = self.inner.lock_state();
            state.backoff.reset();
            state.last_error = None;
        }
        self.inner.metrics.reset().await;
        log_info!("sync engine stopped manually, counters reset");
    }

    /// Stops the engine and waits for the loop task to exit.
    pub async fn shutdown(&self) -> Result<()> {
        match self.halt() {
            Some(handle) => handle.await.context("sync loop task failed to join"),
            None => Ok(()),
        }
    }

    fn halt(&self) -> Option<JoinHandle<()>> {
        let handle = lock(&self.inner.handle).take();

        let previous = std::mem::replace(
            &mut *lock(&self.inner.cancel_token),
            CancellationToken::new(),
        );
        previous.cancel();

        let was_running = {
            let mut state = self.inner.lock_state();
            let running = state.is_running();
            state.halt();
            running
        };

        if handle.is_some() || was_running {
            self.inner.publish_status(ConnectionStatus::Disconnected);
            log_info!("sync engine stopped");
        }
        handle
    }

    /// Fetches now, outside the regular schedule. Also works while stopped;
    /// the result is published as usual but the loop is not restarted.
    pub async fn force_update(&self) -> FetchOutcome {
        let cancel_token = self.inner.current_token();
        run_attempt(&self.inner, true, &cancel_token).await.outcome
    }

    /// Clamps `ms` to the supported range, applies it and returns it.
    pub fn set_refresh_rate(&self, ms: u64) -> u64 {
        let applied = clamp_refresh_rate(ms);
        self.inner.lock_state().refresh_rate_ms = applied;
        self.inner.wake.notify_waiters();
        log_info!("refresh rate set to {applied}ms");
        applied
    }

    pub fn on_snapshot_update<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        let subscription = self.inner.snapshots.subscribe(callback);
        self.auto_start();
        subscription
    }

    pub fn on_connection_status<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        let subscription = self.inner.statuses.subscribe(callback);
        self.auto_start();
        subscription
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<Option<Snapshot>> {
        let receiver = self.inner.snapshot_tx.subscribe();
        self.auto_start();
        receiver
    }

    pub fn latest_snapshot(&self) -> Option<Snapshot> {
        self.inner.snapshots.latest()
    }

    pub fn connection_status(&self) -> Option<ConnectionStatus> {
        self.inner.statuses.latest()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock_state().is_running()
    }

    pub async fn get_stats(&self) -> EngineStats {
        let metrics = self.inner.metrics.get_snapshot().await;
        let state = self.inner.lock_state().clone();

        EngineStats {
            status: state.status,
            phase: state.phase,
            connection_status: self.connection_status(),
            refresh_rate_ms: state.refresh_rate_ms,
            retry_count: state.backoff.retry_count(),
            consecutive_errors: state.backoff.consecutive_errors(),
            last_success_at: state.last_success_at,
            last_error: state.last_error,
            has_snapshot: self.inner.lock_last_good().is_some(),
            snapshot_subscribers: self.inner.snapshots.len(),
            status_subscribers: self.inner.statuses.len(),
            metrics,
        }
    }

    fn auto_start(&self) {
        if !self.inner.config.auto_start_on_subscribe || self.inner.lock_state().ever_started {
            return;
        }
        if let Err(err) = self.start() {
            log_debug!("auto-start on subscribe skipped: {err:#}");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
