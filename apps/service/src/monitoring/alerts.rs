//! Alert deduplication, recent-alert buffer and delivery.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{Alert, AlertSeverity};
use crate::database::Persistence;
use crate::notify::Notifier;

/// Result of handing an alert to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// New alert: notified, buffered and persisted
    Dispatched(Alert),
    /// An unacknowledged alert with the same endpoint and severity exists
    Suppressed { existing: Uuid },
}

/// An unacknowledged alert plus how often it was seen again since
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveAlert {
    #[serde(flatten)]
    pub alert: Alert,
    pub last_seen: DateTime<Utc>,
    pub occurrences: u64,
}

#[derive(Default)]
struct DispatcherState {
    active: HashMap<(String, AlertSeverity), ActiveAlert>,
    /// Newest first
    recent: VecDeque<Alert>,
}

pub struct AlertDispatcher {
    state: Mutex<DispatcherState>,
    recent_capacity: usize,
    notifier: Arc<dyn Notifier>,
    persistence: Arc<dyn Persistence>,
}

impl AlertDispatcher {
    pub fn new(recent_capacity: usize, notifier: Arc<dyn Notifier>, persistence: Arc<dyn Persistence>) -> Self {
        Self { state: Mutex::new(DispatcherState::default()), recent_capacity, notifier, persistence }
    }

    fn state(&self) -> MutexGuard<'_, DispatcherState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Deliver `alert` unless an equivalent one is still unacknowledged.
    ///
    /// The dedup decision is atomic. Notification and persistence run after
    /// the lock is released and their failures are only logged.
    pub async fn dispatch(&self, alert: Alert) -> DispatchOutcome {
        {
            let mut state = self.state();
            let key = (alert.endpoint_id.clone(), alert.severity);

            if let Some(existing) = state.active.get_mut(&key) {
                existing.last_seen = alert.raised_at;
                existing.occurrences += 1;
                debug!(
                    endpoint = %alert.endpoint_id,
                    severity = %alert.severity,
                    existing = %existing.alert.id,
                    occurrences = existing.occurrences,
                    "alert suppressed"
                );
                return DispatchOutcome::Suppressed { existing: existing.alert.id };
            }

            state.active.insert(
                key,
                ActiveAlert { alert: alert.clone(), last_seen: alert.raised_at, occurrences: 1 },
            );
            state.recent.push_front(alert.clone());
            state.recent.truncate(self.recent_capacity);
        }

        info!(alert_id = %alert.id, endpoint = %alert.endpoint_id, severity = %alert.severity, "alert raised");

        if let Err(e) = self.notifier.notify(&alert).await {
            warn!(alert_id = %alert.id, error = %e, "failed to deliver alert notification");
        }
        if let Err(e) = self.persistence.save_alert(&alert).await {
            warn!(alert_id = %alert.id, error = %e, "failed to persist alert");
        }

        DispatchOutcome::Dispatched(alert)
    }

    /// Acknowledge an active alert so the condition can alert again.
    /// Returns false when no active alert has this id.
    pub async fn acknowledge(&self, alert_id: Uuid) -> bool {
        let acknowledged = {
            let mut state = self.state();
            let key = state
                .active
                .iter()
                .find(|(_, active)| active.alert.id == alert_id)
                .map(|(key, _)| key.clone());

            let Some(mut active) = key.and_then(|key| state.active.remove(&key)) else {
                return false;
            };

            if let Some(recent) = state.recent.iter_mut().find(|alert| alert.id == alert_id) {
                recent.acknowledged = true;
            }
            active.alert.acknowledged = true;
            active.alert
        };

        info!(alert_id = %alert_id, endpoint = %acknowledged.endpoint_id, "alert acknowledged");

        if let Err(e) = self.persistence.save_alert(&acknowledged).await {
            warn!(alert_id = %alert_id, error = %e, "failed to persist alert acknowledgement");
        }
        true
    }

    /// Up to `limit` alerts, newest first
    pub fn recent(&self, limit: usize) -> Vec<Alert> {
        self.state().recent.iter().take(limit).cloned().collect()
    }

    /// Unacknowledged alerts, newest first
    pub fn active(&self) -> Vec<ActiveAlert> {
        let mut active: Vec<ActiveAlert> = self.state().active.values().cloned().collect();
        active.sort_by(|a, b| b.alert.raised_at.cmp(&a.alert.raised_at));
        active
    }
}
