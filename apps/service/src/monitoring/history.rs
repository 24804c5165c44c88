//! Append-only check log and rolling uptime aggregates.
//!
//! The hot path (`append`, `update_uptime`) never rotates or trims. Window
//! rotation and log trimming happen in [`HistoryStore::maintain`], which the
//! scheduler runs on its own cadence.

use std::borrow::Cow;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::registry::Registry;
use super::types::{CheckResult, Outcome, UptimeRecord};
use crate::database::Persistence;

/// Column header of exported logs
pub const EXPORT_HEADER: &str = "timestamp,endpoint_id,outcome,latency_ms,detail";

/// Total checks live in the high half of the packed counter, successful
/// checks in the low half, so both move in a single atomic operation.
const TOTAL_ONE: u64 = 1 << 32;
const HALF_MASK: u64 = 0xFFFF_FFFF;

fn pack(total: u64, successful: u64) -> u64 {
    let total = total.min(HALF_MASK);
    (total << 32) | successful.min(total)
}

fn unpack(packed: u64) -> (u64, u64) {
    (packed >> 32, packed & HALF_MASK)
}

/// Identifies one uptime window of one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowId {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug)]
struct UptimeWindow {
    counts: AtomicU64,
    start_ms: AtomicI64,
}

impl UptimeWindow {
    fn snapshot(&self, endpoint_id: &str) -> UptimeRecord {
        let (total_checks, successful_checks) = unpack(self.counts.load(Ordering::Acquire));
        UptimeRecord {
            endpoint_id: endpoint_id.to_string(),
            window_start: millis_to_datetime(self.start_ms.load(Ordering::Acquire)),
            total_checks,
            successful_checks,
        }
    }
}

/// Sizing of the store
#[derive(Debug, Clone)]
pub struct HistoryOptions {
    pub window: Duration,
    pub max_entries: usize,
    pub archived_windows: usize,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self { window: Duration::from_secs(24 * 3600), max_entries: 10_000, archived_windows: 30 }
    }
}

/// Selects records for export
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExportFilter {
    #[serde(alias = "endpoint")]
    pub endpoint_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub outcome: Option<Outcome>,
}

impl ExportFilter {
    fn matches(&self, result: &CheckResult) -> bool {
        self.endpoint_id.as_deref().is_none_or(|id| id == result.endpoint_id)
            && self.since.is_none_or(|since| result.timestamp >= since)
            && self.until.is_none_or(|until| result.timestamp < until)
            && self.outcome.is_none_or(|outcome| outcome == result.outcome)
    }
}

/// Owner of check results and uptime aggregates
pub struct HistoryStore {
    log: Mutex<VecDeque<CheckResult>>,
    /// Endpoint ids in registry order
    order: Vec<String>,
    uptime: HashMap<String, UptimeWindow>,
    archive: Mutex<HashMap<String, VecDeque<UptimeRecord>>>,
    options: HistoryOptions,
    persistence: Arc<dyn Persistence>,
}

impl HistoryStore {
    pub fn new(
        registry: &Registry,
        options: HistoryOptions,
        persistence: Arc<dyn Persistence>,
        now: DateTime<Utc>,
    ) -> Self {
        let start_ms = window_start_ms(now, options.window);
        let order: Vec<String> = registry.ids().map(str::to_string).collect();
        let uptime = order
            .iter()
            .map(|id| {
                (id.clone(), UptimeWindow { counts: AtomicU64::new(0), start_ms: AtomicI64::new(start_ms) })
            })
            .collect();

        Self {
            log: Mutex::new(VecDeque::new()),
            order,
            uptime,
            archive: Mutex::new(HashMap::new()),
            options,
            persistence,
        }
    }

    fn log(&self) -> MutexGuard<'_, VecDeque<CheckResult>> {
        // A panic while holding the lock cannot leave the deque half-written
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append one result. Never touches earlier entries.
    pub fn append(&self, result: CheckResult) {
        self.log().push_back(result);
    }

    /// Count one check towards the endpoint's current window.
    /// Returns false for endpoints the store does not know.
    pub fn update_uptime(&self, endpoint_id: &str, outcome: Outcome) -> bool {
        let Some(window) = self.uptime.get(endpoint_id) else {
            warn!(endpoint = endpoint_id, "uptime update for unknown endpoint ignored");
            return false;
        };
        let delta = TOTAL_ONE + u64::from(outcome.is_available());
        window.counts.fetch_add(delta, Ordering::AcqRel);
        true
    }

    /// Append, count and hand the result to persistence.
    /// Persistence failures are logged and do not affect in-memory state.
    pub async fn record(&self, result: CheckResult) {
        self.update_uptime(&result.endpoint_id, result.outcome);
        self.append(result.clone());

        if let Err(e) = self.persistence.save_check_result(&result).await {
            warn!(endpoint = %result.endpoint_id, error = %e, "failed to persist check result");
        }
    }

    /// Most recent results first
    pub fn query_recent(
        &self,
        endpoint_id: Option<&str>,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> Vec<CheckResult> {
        self.log()
            .iter()
            .rev()
            .filter(|r| endpoint_id.is_none_or(|id| id == r.endpoint_id))
            .filter(|r| since.is_none_or(|since| r.timestamp >= since))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.log().len()
    }

    /// Serialize matching results as CSV, oldest first.
    ///
    /// Works on a snapshot taken under the lock, so concurrent appends are
    /// neither blocked during serialisation nor partially included.
    pub fn export_delimited(&self, filter: &ExportFilter) -> Vec<u8> {
        let snapshot: Vec<CheckResult> = self.log().iter().filter(|r| filter.matches(r)).cloned().collect();

        let mut out = String::with_capacity(EXPORT_HEADER.len() + 1 + snapshot.len() * 64);
        out.push_str(EXPORT_HEADER);
        out.push('\n');
        for result in &snapshot {
            let latency = result.latency_ms.map(|l| l.to_string()).unwrap_or_default();
            out.push_str(&result.timestamp.to_rfc3339());
            out.push(',');
            out.push_str(&csv_field(&result.endpoint_id));
            out.push(',');
            out.push_str(result.outcome.as_str());
            out.push(',');
            out.push_str(&latency);
            out.push(',');
            out.push_str(&csv_field(&result.detail));
            out.push('\n');
        }
        out.into_bytes()
    }

    /// Current window of one endpoint
    pub fn current_uptime(&self, endpoint_id: &str) -> Option<UptimeRecord> {
        self.uptime.get(endpoint_id).map(|window| window.snapshot(endpoint_id))
    }

    /// Current window of every endpoint, in registry order
    pub fn uptime_summary(&self) -> Vec<UptimeRecord> {
        self.order.iter().filter_map(|id| self.current_uptime(id)).collect()
    }

    /// Closed windows of one endpoint, newest first
    pub fn uptime_history(&self, endpoint_id: &str) -> Vec<UptimeRecord> {
        let archive = self.archive.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        archive
            .get(endpoint_id)
            .map(|records| records.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    /// Seed the current windows from persistence after a restart
    pub async fn restore(&self, now: DateTime<Utc>) {
        let window = self.window_id(now);
        let mut restored = 0usize;

        for id in &self.order {
            match self.persistence.load_uptime_window(id, window).await {
                Ok(Some(record)) => {
                    if let Some(slot) = self.uptime.get(id) {
                        slot.start_ms.store(window.start.timestamp_millis(), Ordering::Release);
                        slot.counts
                            .store(pack(record.total_checks, record.successful_checks), Ordering::Release);
                        restored += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(endpoint = %id, error = %e, "failed to load uptime window"),
            }
        }

        info!(restored, window_start = %window.start, "uptime windows restored");
    }

    /// Rotate expired windows and trim the log. Returns the windows closed.
    pub fn maintain(&self, now: DateTime<Utc>) -> Vec<UptimeRecord> {
        let closed = self.rotate_windows(now);
        let trimmed = self.trim_log();
        if !closed.is_empty() || trimmed > 0 {
            debug!(closed = closed.len(), trimmed, "history maintenance completed");
        }
        closed
    }

    fn rotate_windows(&self, now: DateTime<Utc>) -> Vec<UptimeRecord> {
        let window_ms = self.options.window.as_millis() as i64;
        let new_start = window_start_ms(now, self.options.window);
        let mut closed = Vec::new();

        for id in &self.order {
            let Some(slot) = self.uptime.get(id) else { continue };
            let start = slot.start_ms.load(Ordering::Acquire);
            if now.timestamp_millis() < start + window_ms {
                continue;
            }

            let (total_checks, successful_checks) = unpack(slot.counts.swap(0, Ordering::AcqRel));
            slot.start_ms.store(new_start, Ordering::Release);
            closed.push(UptimeRecord {
                endpoint_id: id.clone(),
                window_start: millis_to_datetime(start),
                total_checks,
                successful_checks,
            });
        }

        if !closed.is_empty() {
            let mut archive = self.archive.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            for record in &closed {
                let records = archive.entry(record.endpoint_id.clone()).or_default();
                records.push_back(record.clone());
                while records.len() > self.options.archived_windows {
                    records.pop_front();
                }
            }
        }

        closed
    }

    fn trim_log(&self) -> usize {
        let mut log = self.log();
        let excess = log.len().saturating_sub(self.options.max_entries);
        log.drain(..excess);
        excess
    }

    fn window_id(&self, now: DateTime<Utc>) -> WindowId {
        let start = millis_to_datetime(window_start_ms(now, self.options.window));
        let end = start + chrono::Duration::milliseconds(self.options.window.as_millis() as i64);
        WindowId { start, end }
    }
}

/// Windows are aligned to multiples of their length since the epoch
fn window_start_ms(now: DateTime<Utc>, window: Duration) -> i64 {
    let window_ms = (window.as_millis() as i64).max(1);
    now.timestamp_millis().div_euclid(window_ms) * window_ms
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}
