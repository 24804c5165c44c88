//! Sweep lifecycle: periodic and manual sweeps behind a single guard.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::alerts::{AlertDispatcher, DispatchOutcome};
use super::evaluator::Evaluator;
use super::history::{ExportFilter, HistoryStore};
use super::prober::Prober;
use super::registry::Registry;
use super::types::{Alert, CheckResult, HealthStatus, Outcome, UptimeRecord};
use crate::error::SchedulerError;

pub type StatusSnapshot = Arc<HashMap<String, HealthStatus>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Sweeping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepTrigger {
    Startup,
    Periodic,
    Manual,
}

/// Answer to a manual trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    AlreadyInProgress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    Completed(SweepReport),
    AlreadyInProgress,
}

/// Summary of one finished sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub trigger: SweepTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub probes: usize,
    pub successes: usize,
    pub degraded: usize,
    pub failures: usize,
    pub probe_errors: usize,
    pub alerts_dispatched: usize,
    pub alerts_suppressed: usize,
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub interval: Duration,
    pub timeout: Duration,
    pub concurrency: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self { interval: Duration::from_secs(60), timeout: Duration::from_secs(10), concurrency: 8 }
    }
}

/// Holds the `Sweeping` state; dropping it returns the scheduler to `Idle`
struct SweepGuard {
    state: Arc<watch::Sender<SchedulerState>>,
}

impl SweepGuard {
    fn acquire(state: &Arc<watch::Sender<SchedulerState>>) -> Option<Self> {
        let acquired = state.send_if_modified(|current| {
            if *current == SchedulerState::Idle {
                *current = SchedulerState::Sweeping;
                true
            } else {
                false
            }
        });
        acquired.then(|| Self { state: Arc::clone(state) })
    }
}

impl Drop for SweepGuard {
    fn drop(&mut self) {
        self.state.send_replace(SchedulerState::Idle);
    }
}

/// Owner of the sweep lifecycle and entry point for everything the
/// monitoring engine exposes.
pub struct Scheduler {
    registry: Arc<Registry>,
    prober: Arc<dyn Prober>,
    evaluator: Evaluator,
    history: Arc<HistoryStore>,
    dispatcher: Arc<AlertDispatcher>,
    options: SchedulerOptions,
    state: Arc<watch::Sender<SchedulerState>>,
    statuses: watch::Sender<StatusSnapshot>,
    skipped_ticks: AtomicU64,
    last_sweep: Mutex<Option<SweepReport>>,
    periodic: Mutex<Option<JoinHandle<()>>>,
    maintenance: Mutex<Option<JoinHandle<()>>>,
    /// Sweeps run here, whichever runtime triggered them
    runtime: Handle,
}

impl Scheduler {
    /// Must be called inside a tokio runtime. Background sweeps are spawned
    /// on that runtime, so they outlive the HTTP workers that trigger them.
    pub fn new(
        registry: Arc<Registry>,
        prober: Arc<dyn Prober>,
        evaluator: Evaluator,
        history: Arc<HistoryStore>,
        dispatcher: Arc<AlertDispatcher>,
        options: SchedulerOptions,
    ) -> Self {
        let initial: HashMap<String, HealthStatus> =
            registry.ids().map(|id| (id.to_string(), HealthStatus::unknown(id))).collect();

        Self {
            registry,
            prober,
            evaluator,
            history,
            dispatcher,
            options,
            state: Arc::new(watch::Sender::new(SchedulerState::Idle)),
            statuses: watch::Sender::new(Arc::new(initial)),
            skipped_ticks: AtomicU64::new(0),
            last_sweep: Mutex::new(None),
            periodic: Mutex::new(None),
            maintenance: Mutex::new(None),
            runtime: Handle::current(),
        }
    }

    /// Run a sweep and wait for it, unless one is already running
    pub async fn sweep(&self, trigger: SweepTrigger) -> SweepOutcome {
        match SweepGuard::acquire(&self.state) {
            Some(guard) => SweepOutcome::Completed(self.run_sweep(trigger, guard).await),
            None => SweepOutcome::AlreadyInProgress,
        }
    }

    /// Start a sweep in the background.
    /// The guard is taken before returning, so a second call sees the sweep.
    pub fn trigger_manual(self: &Arc<Self>) -> TriggerOutcome {
        let Some(guard) = SweepGuard::acquire(&self.state) else {
            info!("manual sweep rejected, a sweep is already in progress");
            return TriggerOutcome::AlreadyInProgress;
        };

        let this = Arc::clone(self);
        self.runtime.spawn(async move {
            this.run_sweep(SweepTrigger::Manual, guard).await;
        });
        TriggerOutcome::Started
    }

    /// Sweep every `interval`. A tick that finds a sweep in progress is
    /// skipped and counted.
    pub fn start_periodic(self: &Arc<Self>, interval: Duration) -> Result<(), SchedulerError> {
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }
        if interval < self.options.timeout {
            return Err(SchedulerError::IntervalBelowTimeout { interval, timeout: self.options.timeout });
        }

        let mut slot = lock(&self.periodic);
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let this = Arc::clone(self);
        *slot = Some(self.runtime.spawn(async move {
            let mut timer = interval_at(Instant::now() + interval, interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                timer.tick().await;
                match SweepGuard::acquire(&this.state) {
                    Some(guard) => {
                        let sweeper = Arc::clone(&this);
                        this.runtime.spawn(async move {
                            sweeper.run_sweep(SweepTrigger::Periodic, guard).await;
                        });
                    }
                    None => {
                        let skipped = this.skipped_ticks.fetch_add(1, Ordering::Relaxed) + 1;
                        warn!(skipped_ticks = skipped, "periodic tick skipped, previous sweep still running");
                    }
                }
            }
        }));

        info!(interval_secs = interval.as_secs(), "periodic sweeps started");
        Ok(())
    }

    /// Rotate uptime windows and trim the log every `cadence`
    pub fn start_maintenance(self: &Arc<Self>, cadence: Duration) -> Result<(), SchedulerError> {
        if cadence.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }

        let mut slot = lock(&self.maintenance);
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let history = Arc::clone(&self.history);
        *slot = Some(self.runtime.spawn(async move {
            let mut timer = interval_at(Instant::now() + cadence, cadence);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                timer.tick().await;
                for record in history.maintain(Utc::now()) {
                    info!(
                        endpoint = %record.endpoint_id,
                        window_start = %record.window_start,
                        total = record.total_checks,
                        uptime_pct = record.uptime_percentage(),
                        "uptime window closed"
                    );
                }
            }
        }));

        Ok(())
    }

    /// Stop the timers. A sweep already running is left to finish.
    pub fn stop(&self) {
        for slot in [&self.periodic, &self.maintenance] {
            if let Some(handle) = lock(slot).take() {
                handle.abort();
            }
        }
    }

    /// Resolves once no sweep is running
    pub async fn wait_idle(&self) {
        let mut state = self.state.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = state.wait_for(|state| *state == SchedulerState::Idle).await;
    }

    async fn run_sweep(&self, trigger: SweepTrigger, _guard: SweepGuard) -> SweepReport {
        let started_at = Utc::now();
        let timeout = self.options.timeout;
        debug!(?trigger, endpoints = self.registry.len(), "sweep started");

        // Collect first so result handling never delays a probe still in flight
        let results: Vec<_> = stream::iter(self.registry.list().to_vec())
            .map(|endpoint| {
                let prober = Arc::clone(&self.prober);
                async move {
                    let probed = prober.probe(&endpoint, timeout).await;
                    (endpoint, probed)
                }
            })
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;

        let mut report = SweepReport {
            trigger,
            started_at,
            finished_at: started_at,
            probes: results.len(),
            successes: 0,
            degraded: 0,
            failures: 0,
            probe_errors: 0,
            alerts_dispatched: 0,
            alerts_suppressed: 0,
        };

        let mut statuses: HashMap<String, HealthStatus> = self.statuses.borrow().as_ref().clone();
        let mut alerts = Vec::new();

        for (endpoint, probed) in results {
            let result = match probed {
                Ok(result) => result,
                Err(e) => {
                    error!(endpoint = %endpoint.id, error = %e, "probe could not run");
                    report.probe_errors += 1;
                    continue;
                }
            };

            match result.outcome {
                Outcome::Success => report.successes += 1,
                Outcome::Degraded => report.degraded += 1,
                Outcome::Failure => report.failures += 1,
            }

            let previous = statuses.get(&endpoint.id).cloned().unwrap_or_else(|| HealthStatus::unknown(&endpoint.id));
            let evaluation = self.evaluator.evaluate(&previous, &result, &endpoint);

            if evaluation.status.state != previous.state {
                info!(endpoint = %endpoint.id, from = %previous.state, to = %evaluation.status.state, "status changed");
            }

            self.history.record(result).await;
            statuses.insert(endpoint.id.clone(), evaluation.status);

            if let Some(signal) = evaluation.alert {
                alerts.push(Alert::from_signal(signal));
            }
        }

        self.statuses.send_replace(Arc::new(statuses));

        // Alerts are delivered concurrently
        let outcomes = join_all(alerts.into_iter().map(|alert| self.dispatcher.dispatch(alert))).await;
        for outcome in outcomes {
            match outcome {
                DispatchOutcome::Dispatched(_) => report.alerts_dispatched += 1,
                DispatchOutcome::Suppressed { .. } => report.alerts_suppressed += 1,
            }
        }
        report.finished_at = Utc::now();

        info!(
            ?trigger,
            probes = report.probes,
            failures = report.failures,
            degraded = report.degraded,
            alerts = report.alerts_dispatched,
            duration_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "sweep completed"
        );

        *lock(&self.last_sweep) = Some(report.clone());
        report
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn skipped_ticks(&self) -> u64 {
        self.skipped_ticks.load(Ordering::Relaxed)
    }

    pub fn last_sweep(&self) -> Option<SweepReport> {
        lock(&self.last_sweep).clone()
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Status of every endpoint as of the last completed sweep
    pub fn current_statuses(&self) -> StatusSnapshot {
        Arc::clone(&self.statuses.borrow())
    }

    pub fn recent_alerts(&self, limit: usize) -> Vec<Alert> {
        self.dispatcher.recent(limit)
    }

    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.dispatcher
    }

    pub async fn acknowledge_alert(&self, alert_id: Uuid) -> bool {
        self.dispatcher.acknowledge(alert_id).await
    }

    pub fn query_recent_logs(
        &self,
        endpoint_id: Option<&str>,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> Vec<CheckResult> {
        self.history.query_recent(endpoint_id, limit, since)
    }

    pub fn export_logs(&self, filter: &ExportFilter) -> Vec<u8> {
        self.history.export_delimited(filter)
    }

    pub fn uptime_summary(&self) -> Vec<UptimeRecord> {
        self.history.uptime_summary()
    }

    pub fn uptime_history(&self, endpoint_id: &str) -> Vec<UptimeRecord> {
        self.history.uptime_history(endpoint_id)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::testing::{self, RecordingNotifier, ScriptedProber, Step};
    use crate::monitoring::types::HealthState;

    fn scheduler_with(
        prober: Arc<ScriptedProber>,
        endpoints: &[(&str, bool)],
        options: SchedulerOptions,
    ) -> Arc<Scheduler> {
        testing::scheduler_with(prober, endpoints, Arc::new(RecordingNotifier::default()), options)
    }

    #[tokio::test]
    async fn test_statuses_start_unknown() {
        let scheduler = scheduler_with(Arc::new(ScriptedProber::default()), &[("a", false), ("b", true)], Default::default());
        let statuses = scheduler.current_statuses();
        assert_eq!(statuses.len(), 2);
        assert!(statuses.values().all(|s| s.state == HealthState::Unknown));
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert!(scheduler.last_sweep().is_none());
    }

    #[tokio::test]
    async fn test_sweep_reports_and_returns_to_idle() {
        let prober = Arc::new(ScriptedProber::default());
        prober.script("b", [Step::Failure]);
        prober.script("c", [Step::Degraded]);
        let scheduler = scheduler_with(prober.clone(), &[("a", false), ("b", true), ("c", false)], Default::default());

        let SweepOutcome::Completed(report) = scheduler.sweep(SweepTrigger::Manual).await else {
            panic!("sweep did not run");
        };
        assert_eq!((report.probes, report.successes, report.degraded, report.failures), (3, 1, 1, 1));
        assert_eq!(report.alerts_dispatched, 2);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.last_sweep(), Some(report));

        let statuses = scheduler.current_statuses();
        assert_eq!(statuses["a"].state, HealthState::Healthy);
        assert_eq!(statuses["b"].state, HealthState::Error);
        assert_eq!(statuses["c"].state, HealthState::Warning);
    }

    #[tokio::test]
    async fn test_sweep_concurrency_is_bounded() {
        let prober = Arc::new(ScriptedProber::with_delay(Duration::from_millis(30)));
        let endpoints: Vec<(String, bool)> = (0..10).map(|i| (format!("ep{i}"), false)).collect();
        let endpoints: Vec<(&str, bool)> = endpoints.iter().map(|(id, c)| (id.as_str(), *c)).collect();
        let options = SchedulerOptions { concurrency: 3, ..Default::default() };
        let scheduler = scheduler_with(prober.clone(), &endpoints, options);

        scheduler.sweep(SweepTrigger::Manual).await;

        assert!(prober.max_in_flight() <= 3);
        assert!(prober.max_in_flight() >= 2);
        for (id, _) in &endpoints {
            assert_eq!(prober.calls(id), 1);
        }
    }

    #[tokio::test]
    async fn test_periodic_rejects_bad_intervals() {
        let scheduler = scheduler_with(Arc::new(ScriptedProber::default()), &[("a", false)], Default::default());
        assert_eq!(scheduler.start_periodic(Duration::ZERO), Err(SchedulerError::ZeroInterval));
        assert!(matches!(
            scheduler.start_periodic(Duration::from_secs(5)),
            Err(SchedulerError::IntervalBelowTimeout { .. })
        ));
        assert_eq!(scheduler.start_periodic(Duration::from_secs(60)), Ok(()));
        assert_eq!(scheduler.start_periodic(Duration::from_secs(60)), Err(SchedulerError::AlreadyRunning));
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_ticks_during_sweep_are_skipped() {
        let prober = Arc::new(ScriptedProber::default());
        prober.hold("a");
        let options = SchedulerOptions { timeout: Duration::from_secs(1), ..Default::default() };
        let scheduler = scheduler_with(prober.clone(), &[("a", false)], options);

        assert_eq!(scheduler.trigger_manual(), TriggerOutcome::Started);
        prober.wait_until_held().await;

        scheduler.start_periodic(Duration::from_secs(1)).unwrap();
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(scheduler.skipped_ticks() >= 3);
        assert_eq!(prober.calls("a"), 1);

        scheduler.stop();
        prober.release();
        scheduler.wait_idle().await;
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sweeps_run() {
        let prober = Arc::new(ScriptedProber::default());
        let options = SchedulerOptions { timeout: Duration::from_secs(1), ..Default::default() };
        let scheduler = scheduler_with(prober.clone(), &[("a", false)], options);

        scheduler.start_periodic(Duration::from_secs(10)).unwrap();
        tokio::time::sleep(Duration::from_secs(35)).await;
        scheduler.wait_idle().await;
        scheduler.stop();

        assert_eq!(prober.calls("a"), 3);
        assert_eq!(scheduler.last_sweep().map(|r| r.trigger), Some(SweepTrigger::Periodic));
    }

    #[tokio::test]
    async fn test_awaitable_sweep_respects_guard() {
        let prober = Arc::new(ScriptedProber::default());
        prober.hold("a");
        let scheduler = scheduler_with(prober.clone(), &[("a", false)], Default::default());

        assert_eq!(scheduler.trigger_manual(), TriggerOutcome::Started);
        prober.wait_until_held().await;
        assert_eq!(scheduler.sweep(SweepTrigger::Manual).await, SweepOutcome::AlreadyInProgress);

        prober.release();
        scheduler.wait_idle().await;
        assert!(matches!(scheduler.sweep(SweepTrigger::Manual).await, SweepOutcome::Completed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_notifier_delays_sweep_once() {
        let prober = Arc::new(ScriptedProber::default());
        for id in ["a", "b", "c"] {
            prober.script(id, [Step::Failure]);
        }
        let notifier = Arc::new(RecordingNotifier::with_delay(Duration::from_secs(5)));
        let scheduler =
            testing::scheduler_with(prober, &[("a", true), ("b", true), ("c", true)], notifier.clone(), Default::default());

        let started = Instant::now();
        let SweepOutcome::Completed(report) = scheduler.sweep(SweepTrigger::Manual).await else {
            panic!("sweep did not run");
        };

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(report.alerts_dispatched, 3);
        assert_eq!(notifier.delivered().len(), 3);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }
}
