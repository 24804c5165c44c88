//! End-to-end behaviour of the engine with scripted probes.

use std::sync::Arc;
use std::time::Duration;

use super::alerts::AlertDispatcher;
use super::evaluator::{Evaluator, Thresholds};
use super::history::{HistoryOptions, HistoryStore};
use super::scheduler::{Scheduler, SchedulerOptions, SweepOutcome, SweepReport, SweepTrigger, TriggerOutcome};
use super::testing::{RecordingNotifier, RecordingPersistence, ScriptedProber, Step, epoch, registry};
use super::types::{AlertSeverity, HealthState};

const INTERVAL: Duration = Duration::from_secs(60);

struct Harness {
    scheduler: Arc<Scheduler>,
    prober: Arc<ScriptedProber>,
    notifier: Arc<RecordingNotifier>,
    persistence: Arc<RecordingPersistence>,
    history: Arc<HistoryStore>,
}

impl Harness {
    fn new(endpoints: &[(&str, bool)]) -> Self {
        let registry = Arc::new(registry(endpoints));
        let prober = Arc::new(ScriptedProber::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let persistence = Arc::new(RecordingPersistence::default());
        let history = Arc::new(HistoryStore::new(&registry, HistoryOptions::default(), persistence.clone(), epoch()));
        let dispatcher = Arc::new(AlertDispatcher::new(50, notifier.clone(), persistence.clone()));
        let thresholds = Thresholds { performance_debounce: INTERVAL, ..Default::default() };

        let scheduler = Arc::new(Scheduler::new(
            registry,
            prober.clone(),
            Evaluator::new(thresholds),
            history.clone(),
            dispatcher,
            SchedulerOptions { interval: INTERVAL, ..Default::default() },
        ));

        Self { scheduler, prober, notifier, persistence, history }
    }

    /// Run one sweep, then move the scripted clock one interval ahead
    async fn sweep(&self) -> SweepReport {
        let SweepOutcome::Completed(report) = self.scheduler.sweep(SweepTrigger::Periodic).await else {
            panic!("a sweep was already running");
        };
        self.prober.advance(INTERVAL);
        report
    }

    fn delivered(&self, severity: AlertSeverity) -> usize {
        self.notifier.delivered().iter().filter(|a| a.severity == severity).count()
    }
}

#[tokio::test]
async fn test_persistent_failure_raises_one_critical_alert() {
    let harness = Harness::new(&[("payments", true)]);
    harness.prober.script("payments", [Step::Failure, Step::Failure]);

    harness.sweep().await;
    harness.sweep().await;

    assert_eq!(harness.delivered(AlertSeverity::Critical), 1);
    assert_eq!(harness.notifier.delivered().len(), 1);
    assert_eq!(harness.scheduler.current_statuses()["payments"].state, HealthState::Error);
}

#[tokio::test]
async fn test_slow_success_raises_performance_alert() {
    let harness = Harness::new(&[("whatsapp", false)]);
    harness.prober.script("whatsapp", [Step::Success(6000), Step::Success(6000)]);

    let first = harness.sweep().await;
    let status = harness.scheduler.current_statuses()["whatsapp"].clone();
    assert_eq!(status.state, HealthState::Healthy);
    assert_eq!(status.last_latency_ms, Some(6000));
    assert_eq!(first.alerts_dispatched, 1);

    let alerts = harness.scheduler.recent_alerts(10);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, AlertSeverity::Performance);
    assert!(alerts[0].message.contains("6000ms"));

    // Still slow next sweep: raised again by the evaluator, held back while unacknowledged
    let second = harness.sweep().await;
    assert_eq!(second.alerts_suppressed, 1);
    assert_eq!(harness.delivered(AlertSeverity::Performance), 1);
}

#[tokio::test]
async fn test_recovery_then_acknowledgement_allows_fresh_alert() {
    let harness = Harness::new(&[("stripe", true)]);
    harness.prober.script("stripe", [Step::Failure, Step::Success(80), Step::Failure]);

    harness.sweep().await;
    let critical = harness.scheduler.recent_alerts(1)[0].clone();
    assert_eq!(critical.severity, AlertSeverity::Critical);

    harness.sweep().await;
    assert_eq!(harness.scheduler.current_statuses()["stripe"].state, HealthState::Healthy);
    assert_eq!(harness.scheduler.dispatcher().active().len(), 1);

    assert!(harness.scheduler.acknowledge_alert(critical.id).await);

    let report = harness.sweep().await;
    assert_eq!(report.alerts_dispatched, 1);
    let fresh = harness.scheduler.recent_alerts(1)[0].clone();
    assert_eq!(fresh.severity, AlertSeverity::Critical);
    assert_ne!(fresh.id, critical.id);
    assert_eq!(harness.delivered(AlertSeverity::Critical), 2);
}

#[tokio::test]
async fn test_refailure_without_acknowledgement_is_suppressed() {
    let harness = Harness::new(&[("stripe", true)]);
    harness.prober.script("stripe", [Step::Failure, Step::Success(80), Step::Failure]);

    harness.sweep().await;
    harness.sweep().await;
    let report = harness.sweep().await;

    assert_eq!(report.alerts_suppressed, 1);
    assert_eq!(harness.delivered(AlertSeverity::Critical), 1);
}

#[tokio::test]
async fn test_manual_trigger_during_sweep_is_rejected() {
    let harness = Harness::new(&[("slow", false), ("fast", false)]);
    harness.prober.hold("slow");

    assert_eq!(harness.scheduler.trigger_manual(), TriggerOutcome::Started);
    harness.prober.wait_until_held().await;
    assert_eq!(harness.scheduler.trigger_manual(), TriggerOutcome::AlreadyInProgress);

    harness.prober.release();
    harness.scheduler.wait_idle().await;

    assert_eq!(harness.prober.calls("slow"), 1);
    assert_eq!(harness.prober.calls("fast"), 1);
    assert_eq!(harness.history.len(), 2);
    assert_eq!(harness.persistence.saved_results().len(), 2);
    assert_eq!(harness.scheduler.last_sweep().map(|r| r.trigger), Some(SweepTrigger::Manual));
}

#[tokio::test]
async fn test_persistence_failure_leaves_engine_correct() {
    let harness = Harness::new(&[("gemini", true), ("mcp", false)]);
    harness.persistence.fail(true);
    harness.prober.script("gemini", [Step::Failure]);

    let report = harness.sweep().await;

    assert_eq!(report.alerts_dispatched, 1);
    assert_eq!(harness.delivered(AlertSeverity::Critical), 1);
    assert_eq!(harness.scheduler.current_statuses()["gemini"].state, HealthState::Error);
    assert_eq!(harness.scheduler.current_statuses()["mcp"].state, HealthState::Healthy);
    assert_eq!(harness.history.len(), 2);
}

#[tokio::test]
async fn test_uptime_counts_grow_by_one_per_sweep() {
    let harness = Harness::new(&[("apifast", false)]);
    harness.prober.script("apifast", [Step::Success(10), Step::Failure, Step::Degraded, Step::Success(10)]);

    let mut last_total = 0;
    for _ in 0..4 {
        harness.sweep().await;
        let record = harness.history.current_uptime("apifast").unwrap();
        assert_eq!(record.total_checks, last_total + 1);
        assert!(record.successful_checks <= record.total_checks);
        last_total = record.total_checks;
    }

    let summary = harness.scheduler.uptime_summary();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].uptime_percentage(), 75.0);
}

#[tokio::test]
async fn test_exported_logs_cover_every_sweep() {
    let harness = Harness::new(&[("gemini", false), ("paypal", true)]);
    harness.sweep().await;
    harness.sweep().await;

    let csv = String::from_utf8(harness.scheduler.export_logs(&Default::default())).unwrap();
    assert_eq!(csv.lines().count(), 5);
    assert_eq!(harness.scheduler.query_recent_logs(Some("paypal"), 10, None).len(), 2);
}
