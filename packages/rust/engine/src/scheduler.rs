//! Interval scheduling for the pipeline and maintenance sweeps.
//!
//! Three tokio tasks: the pipeline on its harvest interval, the expire
//! sweep, and the unassign sweep. Different jobs may overlap; the pipeline
//! never overlaps itself. Both the scheduled tick and a manual trigger go
//! through the same try-lock gate, and a trigger that loses reports
//! `Skipped` instead of queueing. A failed run logs and leaves the
//! schedule intact. Shutdown signals every task, then waits a bounded
//! grace for in-flight work before aborting.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use dragnet_shared::{AppConfig, RunOutcome, SchedulerStatus};

use crate::pipeline::{HarvestPipeline, SilentProgress};
use crate::sweeps::Sweeps;

// ---------------------------------------------------------------------------
// SchedulerConfig
// ---------------------------------------------------------------------------

/// Intervals and shutdown budget for the scheduler's tasks.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub pipeline_interval: Duration,
    pub expire_sweep_interval: Duration,
    pub unassign_sweep_interval: Duration,
    /// How long shutdown waits for in-flight work before aborting it.
    pub shutdown_grace: Duration,
    /// The harvest interval as configured, echoed in status output.
    pub interval_hours: u64,
}

impl SchedulerConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            pipeline_interval: Duration::from_secs(config.harvest.interval_hours * 3600),
            expire_sweep_interval: Duration::from_secs(config.lifecycle.expire_sweep_hours * 3600),
            unassign_sweep_interval: Duration::from_secs(
                config.lifecycle.unassign_sweep_hours * 3600,
            ),
            shutdown_grace: Duration::from_secs(config.lifecycle.shutdown_grace_secs),
            interval_hours: config.harvest.interval_hours,
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
struct SchedulerState {
    running: bool,
    job_in_flight: bool,
    last_run_at: Option<chrono::DateTime<Utc>>,
    next_run_at: Option<chrono::DateTime<Utc>>,
}

/// Owns the scheduled tasks and the pipeline exclusivity lock.
pub struct Scheduler {
    config: SchedulerConfig,
    pipeline: Arc<HarvestPipeline>,
    sweeps: Arc<Sweeps>,
    run_lock: Arc<tokio::sync::Mutex<()>>,
    state: Arc<RwLock<SchedulerState>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, pipeline: Arc<HarvestPipeline>, sweeps: Arc<Sweeps>) -> Self {
        Self {
            config,
            pipeline,
            sweeps,
            run_lock: Arc::new(tokio::sync::Mutex::new(())),
            state: Arc::new(RwLock::new(SchedulerState::default())),
            shutdown_tx: None,
            tasks: Vec::new(),
        }
    }

    /// Spawn the three scheduled tasks. First runs fire one full interval
    /// from now, not immediately.
    pub fn start(&mut self) {
        if self.shutdown_tx.is_some() {
            debug!("scheduler already started");
            return;
        }

        let (tx, rx) = watch::channel(false);
        self.shutdown_tx = Some(tx);
        update_state(&self.state, |s| {
            s.running = true;
            s.next_run_at = Some(Utc::now() + interval_delta(self.config.pipeline_interval));
        });

        self.tasks.push(self.spawn_pipeline_task(rx.clone()));
        self.tasks.push(self.spawn_expire_task(rx.clone()));
        self.tasks.push(self.spawn_unassign_task(rx));

        info!(
            interval_hours = self.config.interval_hours,
            "scheduler started"
        );
    }

    /// Run the pipeline now, competing with the schedule for the same lock.
    pub async fn trigger_now(&self) -> RunOutcome {
        if !snapshot_state(&self.state).running {
            return RunOutcome::Skipped {
                reason: "scheduler stopped".into(),
            };
        }
        run_guarded(&self.pipeline, &self.run_lock, &self.state).await
    }

    /// Current scheduler state, for status output.
    pub fn status(&self) -> SchedulerStatus {
        let state = snapshot_state(&self.state);
        SchedulerStatus {
            running: state.running,
            job_in_flight: state.job_in_flight,
            last_run_at: state.last_run_at,
            next_run_at: state.next_run_at,
            interval_hours: self.config.interval_hours,
        }
    }

    /// Stop scheduling, wait a bounded grace for in-flight work, then abort
    /// whatever is left. New triggers are refused from the signal onward.
    pub async fn shutdown(&mut self) {
        let Some(tx) = self.shutdown_tx.take() else {
            return;
        };
        info!("scheduler shutting down");
        let _ = tx.send(true);
        update_state(&self.state, |s| {
            s.running = false;
            s.next_run_at = None;
        });

        let deadline = Instant::now() + self.config.shutdown_grace;
        for mut task in std::mem::take(&mut self.tasks) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if tokio::time::timeout(remaining, &mut task).await.is_err() {
                warn!(
                    grace_secs = self.config.shutdown_grace.as_secs(),
                    "in-flight work outlasted the shutdown grace, aborting"
                );
                task.abort();
            }
        }
        info!("scheduler stopped");
    }

    fn spawn_pipeline_task(&self, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        let pipeline = self.pipeline.clone();
        let run_lock = self.run_lock.clone();
        let state = self.state.clone();
        let period = self.config.pipeline_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let outcome = run_guarded(&pipeline, &run_lock, &state).await;
                        if outcome.is_skipped() {
                            debug!("scheduled pipeline run skipped");
                        }
                        // A failed run advances the schedule like any other.
                        update_state(&state, |s| {
                            s.next_run_at = Some(Utc::now() + interval_delta(period));
                        });
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("pipeline task stopping");
                        break;
                    }
                }
            }
        })
    }

    fn spawn_expire_task(&self, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        let sweeps = self.sweeps.clone();
        let period = self.config.expire_sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = sweeps.expire_stale_pending().await {
                            error!(error = %e, "expire sweep failed");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("expire sweep task stopping");
                        break;
                    }
                }
            }
        })
    }

    fn spawn_unassign_task(&self, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        let sweeps = self.sweeps.clone();
        let period = self.config.unassign_sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = sweeps.unassign_stale_assigned().await {
                            error!(error = %e, "unassign sweep failed");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("unassign sweep task stopping");
                        break;
                    }
                }
            }
        })
    }
}

/// One guarded pipeline pass, shared by the scheduled tick and `trigger_now`.
async fn run_guarded(
    pipeline: &HarvestPipeline,
    run_lock: &tokio::sync::Mutex<()>,
    state: &RwLock<SchedulerState>,
) -> RunOutcome {
    let _permit = match run_lock.try_lock() {
        Ok(permit) => permit,
        Err(_) => {
            info!("pipeline run already in flight, skipping");
            return RunOutcome::Skipped {
                reason: "pipeline already running".into(),
            };
        }
    };

    update_state(state, |s| {
        s.job_in_flight = true;
        s.last_run_at = Some(Utc::now());
    });

    let outcome = match pipeline.run(&SilentProgress).await {
        Ok(summary) => RunOutcome::Completed { summary },
        Err(e) => {
            error!(error = %e, "pipeline run failed");
            RunOutcome::Failed {
                error: e.to_string(),
            }
        }
    };

    update_state(state, |s| s.job_in_flight = false);
    outcome
}

fn interval_delta(period: Duration) -> chrono::Duration {
    chrono::Duration::seconds(period.as_secs() as i64)
}

fn update_state(state: &RwLock<SchedulerState>, f: impl FnOnce(&mut SchedulerState)) {
    let mut guard = state.write().unwrap_or_else(|e| e.into_inner());
    f(&mut guard);
}

fn snapshot_state(state: &RwLock<SchedulerState>) -> SchedulerState {
    state.read().unwrap_or_else(|e| e.into_inner()).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    use dragnet_shared::{DragnetError, Post, PostId, PostStatus, Result, SYSTEM_ACTOR};
    use dragnet_source::{FetchBatch, Fetcher};
    use dragnet_storage::Store;

    use crate::keywords::SetMatcher;
    use crate::lifecycle::{LifecycleEngine, REASON_HARVESTED};

    async fn test_store() -> Arc<Store> {
        let tmp = std::env::temp_dir().join(format!("dragnet_test_{}.db", Uuid::now_v7()));
        Arc::new(Store::open(&tmp).await.expect("open test db"))
    }

    struct CountingFetcher {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl CountingFetcher {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                fail: false,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay,
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                fail: true,
            }
        }
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        async fn fetch_all(&self, _sources: &[String]) -> Result<FetchBatch> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(DragnetError::Network("listing service down".into()));
            }
            Ok(FetchBatch::default())
        }
    }

    fn short_config() -> SchedulerConfig {
        SchedulerConfig {
            pipeline_interval: Duration::from_secs(3600),
            expire_sweep_interval: Duration::from_secs(3600),
            unassign_sweep_interval: Duration::from_secs(3600),
            shutdown_grace: Duration::from_secs(5),
            interval_hours: 1,
        }
    }

    async fn build_scheduler(
        store: Arc<Store>,
        fetcher: Arc<CountingFetcher>,
        config: SchedulerConfig,
    ) -> Scheduler {
        let mut app = dragnet_shared::AppConfig::default();
        app.harvest.sources = vec!["rust".into()];

        let matcher = Arc::new(SetMatcher::new(store.clone(), "default"));
        let pipeline = Arc::new(
            HarvestPipeline::new(&app, store.clone(), fetcher, matcher).expect("pipeline"),
        );
        let lifecycle = Arc::new(LifecycleEngine::new(store.clone()));
        let sweeps = Arc::new(Sweeps::new(&app, store, lifecycle));
        Scheduler::new(config, pipeline, sweeps)
    }

    #[tokio::test]
    async fn manual_trigger_runs_the_pipeline() {
        let store = test_store().await;
        let fetcher = Arc::new(CountingFetcher::new());
        let mut scheduler = build_scheduler(store, fetcher.clone(), short_config()).await;

        scheduler.start();
        let outcome = scheduler.trigger_now().await;
        assert!(matches!(outcome, RunOutcome::Completed { .. }));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        let status = scheduler.status();
        assert!(status.running);
        assert!(status.last_run_at.is_some());
        assert!(status.next_run_at.is_some());

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn overlapping_triggers_skip_instead_of_queueing() {
        let store = test_store().await;
        let fetcher = Arc::new(CountingFetcher::slow(Duration::from_millis(300)));
        let mut scheduler = build_scheduler(store, fetcher.clone(), short_config()).await;
        scheduler.start();

        let (first, second) = tokio::join!(scheduler.trigger_now(), scheduler.trigger_now());
        let skipped = [&first, &second]
            .iter()
            .filter(|o| o.is_skipped())
            .count();
        assert_eq!(skipped, 1, "exactly one trigger loses the lock");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1, "loser never ran");

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn scheduled_runs_fire_on_the_interval() {
        let store = test_store().await;
        let fetcher = Arc::new(CountingFetcher::new());
        let mut config = short_config();
        config.pipeline_interval = Duration::from_millis(50);
        let mut scheduler = build_scheduler(store, fetcher.clone(), config).await;

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(180)).await;
        scheduler.shutdown().await;

        assert!(
            fetcher.calls.load(Ordering::SeqCst) >= 2,
            "at least two scheduled runs"
        );
        assert!(scheduler.status().last_run_at.is_some());
    }

    #[tokio::test]
    async fn failed_runs_keep_the_schedule_alive() {
        let store = test_store().await;
        let fetcher = Arc::new(CountingFetcher::failing());
        let mut config = short_config();
        config.pipeline_interval = Duration::from_millis(50);
        let mut scheduler = build_scheduler(store, fetcher.clone(), config).await;

        scheduler.start();
        let outcome = scheduler.trigger_now().await;
        assert!(matches!(outcome, RunOutcome::Failed { .. }));

        tokio::time::sleep(Duration::from_millis(140)).await;
        scheduler.shutdown().await;

        assert!(
            fetcher.calls.load(Ordering::SeqCst) >= 3,
            "schedule kept firing after failures"
        );
    }

    #[tokio::test]
    async fn stopped_scheduler_refuses_triggers() {
        let store = test_store().await;
        let fetcher = Arc::new(CountingFetcher::new());
        let mut scheduler = build_scheduler(store, fetcher.clone(), short_config()).await;

        // Never started: same refusal as after shutdown.
        let outcome = scheduler.trigger_now().await;
        match &outcome {
            RunOutcome::Skipped { reason } => assert!(reason.contains("stopped")),
            other => panic!("expected skip, got {other:?}"),
        }

        scheduler.start();
        scheduler.shutdown().await;

        let outcome = scheduler.trigger_now().await;
        assert!(outcome.is_skipped());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert!(!scheduler.status().running);
    }

    #[tokio::test]
    async fn sweep_tasks_fire_alongside_the_pipeline() {
        let store = test_store().await;
        let lifecycle = LifecycleEngine::new(store.clone());

        // A pending post fetched long ago, ripe for the expire sweep.
        let mut post = Post {
            id: PostId::new(),
            source_id: Some("t3_stale".into()),
            permalink: None,
            channel: "rust".into(),
            title: "old post".into(),
            body: String::new(),
            author: "alice".into(),
            upvotes: 0,
            comment_count: 0,
            status: PostStatus::Intake,
            assigned_to: None,
            posted_at: Utc::now(),
            fetched_at: Utc::now(),
            created_at: Utc::now(),
        };
        post.fetched_at = Utc::now() - ChronoDuration::days(10);
        store.create_post(&post).await.unwrap();
        lifecycle
            .transition(&post, PostStatus::Pending, SYSTEM_ACTOR, REASON_HARVESTED)
            .await
            .unwrap();

        let fetcher = Arc::new(CountingFetcher::new());
        let mut config = short_config();
        config.expire_sweep_interval = Duration::from_millis(50);
        let mut scheduler = build_scheduler(store.clone(), fetcher, config).await;

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(130)).await;
        scheduler.shutdown().await;

        let swept = store.get_post(post.id).await.unwrap().unwrap();
        assert_eq!(swept.status, PostStatus::Archived);
    }
}
