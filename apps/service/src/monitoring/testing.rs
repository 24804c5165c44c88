//! Scripted prober and recording collaborators for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{Notify, Semaphore};

use super::alerts::AlertDispatcher;
use super::evaluator::Evaluator;
use super::history::{HistoryOptions, HistoryStore, WindowId};
use super::prober::Prober;
use super::registry::{Category, Endpoint, ProbeDescriptor, Registry};
use super::scheduler::{Scheduler, SchedulerOptions};
use super::types::{Alert, CheckResult, UptimeRecord};
use crate::database::{NoopPersistence, Persistence};
use crate::error::ProbeError;
use crate::notify::Notifier;

pub fn endpoint(id: &str, critical: bool) -> Endpoint {
    Endpoint::new(id, id, Category::Service, critical, ProbeDescriptor::Tcp { address: format!("{id}.test:443") })
}

pub fn registry(endpoints: &[(&str, bool)]) -> Registry {
    Registry::new(endpoints.iter().map(|(id, critical)| endpoint(id, *critical)).collect()).unwrap()
}

/// Scheduler over in-memory collaborators with default options
pub fn scheduler(prober: Arc<ScriptedProber>, endpoints: &[(&str, bool)]) -> Arc<Scheduler> {
    scheduler_with(prober, endpoints, Arc::new(RecordingNotifier::default()), SchedulerOptions::default())
}

pub fn scheduler_with(
    prober: Arc<ScriptedProber>,
    endpoints: &[(&str, bool)],
    notifier: Arc<RecordingNotifier>,
    options: SchedulerOptions,
) -> Arc<Scheduler> {
    let registry = Arc::new(registry(endpoints));
    let persistence = Arc::new(NoopPersistence);
    let history = Arc::new(HistoryStore::new(&registry, HistoryOptions::default(), persistence.clone(), epoch()));
    let dispatcher = Arc::new(AlertDispatcher::new(50, notifier, persistence));
    Arc::new(Scheduler::new(registry, prober, Evaluator::default(), history, dispatcher, options))
}

/// Start of the scripted clock
pub fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_006_400, 0).unwrap()
}

/// One scripted probe answer
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Success(u64),
    Degraded,
    Failure,
}

/// Prober that answers from per-endpoint scripts and a manual clock
pub struct ScriptedProber {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    now: Mutex<DateTime<Utc>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Duration,
    held: Mutex<Vec<String>>,
    gate: Semaphore,
    started: Notify,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for ScriptedProber {
    fn default() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            now: Mutex::new(epoch()),
            calls: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            held: Mutex::new(Vec::new()),
            gate: Semaphore::new(0),
            started: Notify::new(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl ScriptedProber {
    /// Every probe sleeps this long before answering
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay, ..Self::default() }
    }

    /// Scripted clock starts at `now` instead of [`epoch`]
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now), ..Self::default() }
    }

    /// Queue answers for an endpoint. Unscripted probes succeed in 50ms.
    pub fn script(&self, endpoint_id: &str, steps: impl IntoIterator<Item = Step>) {
        self.scripts.lock().unwrap().entry(endpoint_id.to_string()).or_default().extend(steps);
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap();
    }

    /// Probes of this endpoint block until [`ScriptedProber::release`]
    pub fn hold(&self, endpoint_id: &str) {
        self.held.lock().unwrap().push(endpoint_id.to_string());
    }

    pub fn release(&self) {
        self.gate.add_permits(1024);
    }

    /// Resolves once a held probe is waiting on the gate
    pub async fn wait_until_held(&self) {
        self.started.notified().await;
    }

    pub fn calls(&self, endpoint_id: &str) -> usize {
        self.calls.lock().unwrap().get(endpoint_id).copied().unwrap_or(0)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, endpoint: &Endpoint, timeout: Duration) -> Result<CheckResult, ProbeError> {
        if timeout.is_zero() {
            return Err(ProbeError::ZeroTimeout);
        }

        *self.calls.lock().unwrap().entry(endpoint.id.clone()).or_default() += 1;
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let held = self.held.lock().unwrap().contains(&endpoint.id);
        if held {
            self.started.notify_one();
            let _permit = self.gate.acquire().await.unwrap();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let timestamp = *self.now.lock().unwrap();
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&endpoint.id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::Success(50));

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(match step {
            Step::Success(latency) => CheckResult::success(&endpoint.id, timestamp, latency, Some(200)),
            Step::Degraded => CheckResult::degraded(&endpoint.id, timestamp, 120, Some(429), "rate limited"),
            Step::Failure => CheckResult::failure(&endpoint.id, timestamp, None, None, "connection refused"),
        })
    }
}

/// Persistence that keeps everything in memory and can be told to fail
#[derive(Default)]
pub struct RecordingPersistence {
    results: Mutex<Vec<CheckResult>>,
    alerts: Mutex<Vec<Alert>>,
    windows: Mutex<HashMap<String, (u64, u64)>>,
    failing: AtomicBool,
}

impl RecordingPersistence {
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn seed_window(&self, endpoint_id: &str, total: u64, successful: u64) {
        self.windows.lock().unwrap().insert(endpoint_id.to_string(), (total, successful));
    }

    pub fn saved_results(&self) -> Vec<CheckResult> {
        self.results.lock().unwrap().clone()
    }

    pub fn saved_alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("database is locked");
        }
        Ok(())
    }
}

#[async_trait]
impl Persistence for RecordingPersistence {
    async fn save_check_result(&self, result: &CheckResult) -> Result<()> {
        self.check()?;
        self.results.lock().unwrap().push(result.clone());
        Ok(())
    }

    async fn save_alert(&self, alert: &Alert) -> Result<()> {
        self.check()?;
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }

    async fn load_uptime_window(&self, endpoint_id: &str, window: WindowId) -> Result<Option<UptimeRecord>> {
        self.check()?;
        Ok(self.windows.lock().unwrap().get(endpoint_id).map(|&(total_checks, successful_checks)| {
            UptimeRecord { endpoint_id: endpoint_id.to_string(), window_start: window.start, total_checks, successful_checks }
        }))
    }
}

/// Notifier that records deliveries
#[derive(Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<Alert>>,
    attempts: AtomicUsize,
    failing: AtomicBool,
    delay: Duration,
}

impl RecordingNotifier {
    /// Every delivery sleeps this long first
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay, ..Self::default() }
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn delivered(&self) -> Vec<Alert> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            bail!("smtp relay unreachable");
        }
        self.delivered.lock().unwrap().push(alert.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
