use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Degraded,
    Failure,
}

impl Outcome {
    /// Whether the dependency answered with a well-formed response.
    /// Degraded answers count towards uptime, failures do not.
    pub fn is_available(self) -> bool {
        !matches!(self, Outcome::Failure)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Degraded => "degraded",
            Outcome::Failure => "failure",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one probe of one endpoint at one instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Registry id of the endpoint that was probed
    pub endpoint_id: String,

    /// When the probe started
    pub timestamp: DateTime<Utc>,

    /// Round trip in milliseconds, `None` when no response arrived
    pub latency_ms: Option<u64>,

    pub outcome: Outcome,

    /// HTTP status code (if applicable)
    pub status_code: Option<u16>,

    /// Free-text diagnostic
    pub detail: String,
}

impl CheckResult {
    /// The dependency answered as expected
    pub fn success(
        endpoint_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        latency_ms: u64,
        status_code: Option<u16>,
    ) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            timestamp,
            latency_ms: Some(latency_ms),
            outcome: Outcome::Success,
            status_code,
            detail: "ok".to_string(),
        }
    }

    /// The dependency answered but signalled it is unhealthy
    pub fn degraded(
        endpoint_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        latency_ms: u64,
        status_code: Option<u16>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            timestamp,
            latency_ms: Some(latency_ms),
            outcome: Outcome::Degraded,
            status_code,
            detail: detail.into(),
        }
    }

    /// The probe failed. `latency_ms` is only set when a (bad) response
    /// actually came back.
    pub fn failure(
        endpoint_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        latency_ms: Option<u64>,
        status_code: Option<u16>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            timestamp,
            latency_ms,
            outcome: Outcome::Failure,
            status_code,
            detail: detail.into(),
        }
    }
}

/// Availability classification of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Warning,
    Error,
    Unknown,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Healthy => write!(f, "healthy"),
            HealthState::Warning => write!(f, "warning"),
            HealthState::Error => write!(f, "error"),
            HealthState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Current classification of an endpoint, recomputed after every check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub endpoint_id: String,
    pub state: HealthState,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_latency_ms: Option<u64>,
    /// Why the endpoint is not healthy, e.g. "high latency"
    pub reason: Option<String>,
    /// Last time a performance alert was raised for this endpoint
    pub last_performance_alert_at: Option<DateTime<Utc>>,
}

impl HealthStatus {
    /// Status before the first check completes
    pub fn unknown(endpoint_id: impl Into<String>) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            state: HealthState::Unknown,
            last_checked: None,
            last_latency_ms: None,
            reason: None,
            last_performance_alert_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Critical,
    Warning,
    Performance,
}

impl AlertSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertSeverity::Critical => "critical",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Performance => "performance",
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the evaluator wants raised. The dispatcher turns it into an [`Alert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertSignal {
    pub endpoint_id: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

/// A notable transition or threshold breach
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub endpoint_id: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub raised_at: DateTime<Utc>,
    pub acknowledged: bool,
}

impl Alert {
    pub fn from_signal(signal: AlertSignal) -> Self {
        Self {
            id: Uuid::new_v4(),
            endpoint_id: signal.endpoint_id,
            severity: signal.severity,
            message: signal.message,
            raised_at: signal.raised_at,
            acknowledged: false,
        }
    }
}

/// Rolling uptime aggregate for one endpoint and one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UptimeRecord {
    pub endpoint_id: String,
    pub window_start: DateTime<Utc>,
    pub total_checks: u64,
    pub successful_checks: u64,
}

impl UptimeRecord {
    /// Uptime in percent. An empty window reports 100.
    pub fn uptime_percentage(&self) -> f64 {
        if self.total_checks == 0 {
            return 100.0;
        }
        let ratio = self.successful_checks.min(self.total_checks) as f64 / self.total_checks as f64;
        ratio * 100.0
    }
}
