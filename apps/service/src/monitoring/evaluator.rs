//! Classification of probe results and alert decisions.
//!
//! Availability and performance are two separate axes. Availability is a
//! state machine (`Unknown → {Healthy, Warning, Error}`) that only alerts on
//! transitions, so a flapping or persistently failing dependency does not
//! produce an alert per check. Performance is a threshold rule that may fire
//! on every slow check, debounced in time instead.

use std::time::Duration;

use super::registry::Endpoint;
use super::types::{AlertSeverity, AlertSignal, CheckResult, HealthState, HealthStatus, Outcome};

/// Global thresholds applied to every endpoint
#[derive(Debug, Clone)]
pub struct Thresholds {
    /// Successful checks slower than this raise a performance alert
    pub performance_threshold_ms: u64,
    /// Also classify slow successful checks as `Warning`
    pub escalate_slow_to_warning: bool,
    /// Minimum time between two performance alerts for one endpoint
    pub performance_debounce: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            performance_threshold_ms: 5000,
            escalate_slow_to_warning: false,
            performance_debounce: Duration::from_secs(60),
        }
    }
}

/// New status for the endpoint plus the alert to raise, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub status: HealthStatus,
    pub alert: Option<AlertSignal>,
}

#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    thresholds: Thresholds,
}

impl Evaluator {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Classify `result` given the endpoint's previous status.
    ///
    /// Pure: the same previous status and result always give the same
    /// evaluation. Time only enters through `result.timestamp`.
    pub fn evaluate(&self, previous: &HealthStatus, result: &CheckResult, endpoint: &Endpoint) -> Evaluation {
        let slow = self.is_slow(result);

        let (state, reason) = match result.outcome {
            Outcome::Failure => (HealthState::Error, Some(result.detail.clone())),
            Outcome::Success if slow && self.thresholds.escalate_slow_to_warning => {
                (HealthState::Warning, Some("high latency".to_string()))
            }
            Outcome::Degraded => (HealthState::Warning, Some(result.detail.clone())),
            Outcome::Success => (HealthState::Healthy, None),
        };

        let transitioned = previous.state != state;
        let mut last_performance_alert_at = previous.last_performance_alert_at;

        let alert = if transitioned && state == HealthState::Error && endpoint.critical {
            Some(AlertSeverity::Critical)
        } else if transitioned && state == HealthState::Warning {
            Some(AlertSeverity::Warning)
        } else if slow && self.performance_debounce_elapsed(previous, result) {
            last_performance_alert_at = Some(result.timestamp);
            Some(AlertSeverity::Performance)
        } else {
            None
        }
        .map(|severity| AlertSignal {
            endpoint_id: endpoint.id.clone(),
            severity,
            message: alert_message(severity, endpoint, result, reason.as_deref()),
            raised_at: result.timestamp,
        });

        Evaluation {
            status: HealthStatus {
                endpoint_id: endpoint.id.clone(),
                state,
                last_checked: Some(result.timestamp),
                last_latency_ms: result.latency_ms,
                reason,
                last_performance_alert_at,
            },
            alert,
        }
    }

    fn is_slow(&self, result: &CheckResult) -> bool {
        result.outcome == Outcome::Success
            && result.latency_ms.is_some_and(|latency| latency > self.thresholds.performance_threshold_ms)
    }

    fn performance_debounce_elapsed(&self, previous: &HealthStatus, result: &CheckResult) -> bool {
        let Some(last) = previous.last_performance_alert_at else {
            return true;
        };
        // Probes inside a sweep start a little late when they queue for a
        // worker slot, so consecutive sweeps can be slightly closer than
        // one interval apart. Allow 10% slack.
        let min_gap_ms = (self.thresholds.performance_debounce.as_millis() * 9 / 10) as i64;
        (result.timestamp - last).num_milliseconds() >= min_gap_ms
    }
}

fn alert_message(
    severity: AlertSeverity,
    endpoint: &Endpoint,
    result: &CheckResult,
    reason: Option<&str>,
) -> String {
    match severity {
        AlertSeverity::Critical => {
            format!("Critical API {} is unavailable: {}", endpoint.display_name, result.detail)
        }
        AlertSeverity::Warning => format!(
            "API {} has performance problems: {}",
            endpoint.display_name,
            reason.unwrap_or("degraded")
        ),
        AlertSeverity::Performance => format!(
            "API {} has a high response time ({}ms)",
            endpoint.display_name,
            result.latency_ms.unwrap_or_default()
        ),
    }
}
