use crate::application::ports::BackendApi;
use crate::application::services::{ConnectivityMonitor, LocalReadCache, OutboxEngine, PullSummary};
use crate::domain::entities::FlushReport;
use crate::domain::value_objects::{DispatchLane, EntityType};
use crate::shared::clock::Clock;
use crate::shared::config::SyncConfig;
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Why a sync cycle was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Startup,
    Foreground,
    ConnectivityRestored,
    Periodic,
    Enqueued,
    RetryDue,
    Manual,
}

impl SyncTrigger {
    /// Enqueue and retry wake-ups only need to push.
    pub fn pulls(&self) -> bool {
        !matches!(self, SyncTrigger::Enqueued | SyncTrigger::RetryDue)
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub offline_first: bool,
    pub pull_path: String,
    pub entity_type: EntityType,
    pub entity_id_field: String,
    pub foreground_interval: Duration,
    pub background_interval: Duration,
}

impl SyncOptions {
    pub fn from_config(config: &SyncConfig) -> Result<Self, AppError> {
        Ok(Self {
            offline_first: config.offline_first,
            pull_path: config.pull_path.clone(),
            entity_type: EntityType::new(config.entity_type.clone())
                .map_err(AppError::ConfigurationError)?,
            entity_id_field: config.entity_id_field.clone(),
            foreground_interval: Duration::from_secs(config.foreground_interval.max(1)),
            background_interval: Duration::from_secs(config.background_interval.max(1)),
        })
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            offline_first: true,
            pull_path: "/driver/jobs".to_string(),
            entity_type: EntityType::job(),
            entity_id_field: "id".to_string(),
            foreground_interval: Duration::from_secs(300),
            background_interval: Duration::from_secs(900),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub trigger: SyncTrigger,
    pub pull: Option<PullSummary>,
    pub pull_error: Option<String>,
    pub mutations: FlushReport,
    pub attachments: FlushReport,
    pub scans: FlushReport,
    pub purged: u32,
    /// Earliest retry deadline left after the cycle.
    pub next_retry_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    pub fn totals(&self) -> FlushReport {
        let mut total = self.mutations.clone();
        total.merge(&self.attachments);
        total.merge(&self.scans);
        total
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another cycle was already running; this trigger folded into it.
    Coalesced,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_syncing: bool,
    pub online: bool,
    pub pending_count: u64,
    pub failed_count: u64,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct SyncState {
    is_syncing: bool,
    last_sync_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Sequences pull, outbox lanes and cache cleanup; owns the sync triggers.
pub struct SyncOrchestrator {
    engine: Arc<OutboxEngine>,
    cache: Arc<LocalReadCache>,
    api: Arc<dyn BackendApi>,
    connectivity: Arc<ConnectivityMonitor>,
    clock: Arc<dyn Clock>,
    options: SyncOptions,
    cycle_gate: Mutex<()>,
    state: RwLock<SyncState>,
}

impl SyncOrchestrator {
    pub fn new(
        engine: Arc<OutboxEngine>,
        cache: Arc<LocalReadCache>,
        api: Arc<dyn BackendApi>,
        connectivity: Arc<ConnectivityMonitor>,
        clock: Arc<dyn Clock>,
        options: SyncOptions,
    ) -> Self {
        Self {
            engine,
            cache,
            api,
            connectivity,
            clock,
            options,
            cycle_gate: Mutex::new(()),
            state: RwLock::new(SyncState::default()),
        }
    }

    /// Run one cycle now unless one is already running or we are offline.
    pub async fn sync_now(&self, trigger: SyncTrigger) -> Result<SyncOutcome, AppError> {
        let Ok(_cycle) = self.cycle_gate.try_lock() else {
            debug!(?trigger, "sync already running; trigger coalesced");
            return Ok(SyncOutcome::Coalesced);
        };
        if self.options.offline_first && !self.connectivity.is_online() {
            debug!(?trigger, "offline; sync skipped");
            return Ok(SyncOutcome::Offline);
        }

        self.state.write().await.is_syncing = true;
        let result = self.run_cycle(trigger).await;

        let mut state = self.state.write().await;
        state.is_syncing = false;
        match &result {
            Ok(report) => {
                state.last_sync_at = Some(report.finished_at);
                state.last_error = report.pull_error.clone();
            }
            Err(err) => {
                error!(?trigger, error = %err, "sync cycle aborted");
                state.last_error = Some(err.to_string());
            }
        }
        result.map(SyncOutcome::Completed)
    }

    async fn run_cycle(&self, trigger: SyncTrigger) -> Result<SyncReport, AppError> {
        let mut pull = None;
        let mut pull_error = None;
        if trigger.pulls() {
            match self.pull().await {
                Ok(summary) => pull = Some(summary),
                Err(err) => {
                    warn!(error = %err, "pull failed; cache stays stale this cycle");
                    pull_error = Some(err.to_string());
                }
            }
        }

        let mut mutations = FlushReport::default();
        let mut attachments = FlushReport::default();
        let mut scans = FlushReport::default();
        loop {
            mutations.merge(&self.engine.flush(&[DispatchLane::Mutations]).await?);
            let delivered_attachments = self.engine.flush(&[DispatchLane::Attachments]).await?;
            let delivered_scans = self.engine.flush(&[DispatchLane::Scans]).await?;
            attachments.merge(&delivered_attachments);
            scans.merge(&delivered_scans);
            // a delivered attachment or scan may have been the head of a queued mutation
            if delivered_attachments.completed + delivered_scans.completed == 0 {
                break;
            }
            debug!("later lanes delivered work; draining the lanes again");
        }

        let mut purged = 0;
        if trigger.pulls() {
            match self.cache.purge_expired().await {
                Ok(count) => purged = count,
                Err(err) => warn!(error = %err, "cache purge failed"),
            }
        }

        let report = SyncReport {
            trigger,
            pull,
            pull_error,
            mutations,
            attachments,
            scans,
            purged,
            next_retry_at: self.engine.scheduled_retry(),
            finished_at: self.clock.now(),
        };
        let totals = report.totals();
        info!(
            ?trigger,
            completed = totals.completed,
            retried = totals.retried,
            failed = totals.failed,
            purged,
            "sync cycle finished"
        );
        Ok(report)
    }

    async fn pull(&self) -> Result<PullSummary, AppError> {
        let items = self
            .api
            .fetch_entities(&self.options.pull_path)
            .await
            .map_err(|err| AppError::Network(err.to_string()))?;
        self.cache
            .merge_pulled(
                &self.options.entity_type,
                items,
                &self.options.entity_id_field,
                self.options.offline_first,
            )
            .await
    }

    pub async fn status(&self) -> Result<SyncStatus, AppError> {
        let pending_count = self.engine.pending_count().await?;
        let failed_count = self.engine.failed_count().await?;
        let state = self.state.read().await;
        Ok(SyncStatus {
            is_syncing: state.is_syncing,
            online: self.connectivity.is_online(),
            pending_count,
            failed_count,
            last_sync_at: state.last_sync_at,
            next_retry_at: self.engine.scheduled_retry(),
            last_error: state.last_error.clone(),
        })
    }

    /// Spawn the trigger loop. It runs a startup cycle, then reacts to
    /// connectivity, foreground, enqueue, retry deadlines and the interval.
    pub fn start(self: &Arc<Self>) -> SyncHandle {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let orchestrator = Arc::clone(self);
        let task = tokio::spawn(async move {
            orchestrator.run_loop(control_rx, shutdown_rx).await;
        });
        SyncHandle {
            control: control_tx,
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run_loop(
        self: Arc<Self>,
        mut control: mpsc::UnboundedReceiver<SyncControl>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut online = self.connectivity.subscribe();
        let mut period = self.options.foreground_interval;
        let mut ticker = interval_from_now(period);
        let mut retry_schedule = self.engine.retry_schedule();
        let mut retry_deadline = self.retry_deadline(*retry_schedule.borrow_and_update());
        let _ = self.sync_now(SyncTrigger::Startup).await;

        loop {
            let trigger = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => SyncTrigger::Periodic,
                message = control.recv() => match message {
                    Some(SyncControl::Trigger(trigger)) => {
                        if trigger == SyncTrigger::Foreground
                            && period != self.options.foreground_interval
                        {
                            period = self.options.foreground_interval;
                            ticker = interval_from_now(period);
                        }
                        trigger
                    }
                    Some(SyncControl::Background) => {
                        if period != self.options.background_interval {
                            period = self.options.background_interval;
                            ticker = interval_from_now(period);
                            debug!(interval_secs = period.as_secs(), "switched to background interval");
                        }
                        continue;
                    }
                    None => break,
                },
                changed = online.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if *online.borrow_and_update() {
                        SyncTrigger::ConnectivityRestored
                    } else {
                        continue;
                    }
                }
                _ = self.engine.wait_enqueued() => SyncTrigger::Enqueued,
                changed = retry_schedule.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    retry_deadline = self.retry_deadline(*retry_schedule.borrow_and_update());
                    continue;
                }
                _ = sleep_until_deadline(retry_deadline) => {
                    retry_deadline = None;
                    SyncTrigger::RetryDue
                }
            };

            // failures are logged and recorded in the state by sync_now
            let _ = self.sync_now(trigger).await;
        }
        debug!("sync loop stopped");
    }

    /// Timer instant for a retry deadline; overdue ones still wait the minimum delay.
    fn retry_deadline(&self, at: Option<DateTime<Utc>>) -> Option<Instant> {
        at.map(|at| {
            let delay = (at - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
            Instant::now() + delay.max(MIN_RETRY_DELAY)
        })
    }
}

/// Floor for the retry timer so an overdue deadline cannot spin the loop.
const MIN_RETRY_DELAY: Duration = Duration::from_secs(1);

fn interval_from_now(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

#[derive(Debug)]
enum SyncControl {
    Trigger(SyncTrigger),
    Background,
}

/// Handle to the running sync loop.
pub struct SyncHandle {
    control: mpsc::UnboundedSender<SyncControl>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// App came to the foreground: sync now and use the short interval.
    pub fn notify_foreground(&self) {
        self.send(SyncControl::Trigger(SyncTrigger::Foreground));
    }

    pub fn notify_background(&self) {
        self.send(SyncControl::Background);
    }

    pub fn request_sync(&self) {
        self.send(SyncControl::Trigger(SyncTrigger::Manual));
    }

    /// Receiver that flips to `true` when the loop is asked to stop.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            warn!(error = %err, "sync loop ended abnormally");
        }
    }

    fn send(&self, message: SyncControl) {
        if self.control.send(message).is_err() {
            warn!("sync loop is not running");
        }
    }
}
