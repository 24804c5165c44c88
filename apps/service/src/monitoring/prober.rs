use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use tokio::time::timeout;

use super::checker::{Checker, HttpChecker, TcpChecker, Verdict};
use super::registry::{Endpoint, ProbeDescriptor};
use super::types::CheckResult;
use crate::error::ProbeError;

/// Performs a single health check against a single endpoint.
///
/// Implementations make exactly one attempt and report every expected
/// failure mode as a `Failure` outcome. Retrying is left to the next sweep.
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, endpoint: &Endpoint, timeout: Duration) -> Result<CheckResult, ProbeError>;
}

/// Prober that talks to the real dependencies over the network
pub struct NetworkProber {
    http_checker: HttpChecker,
    tcp_checker: TcpChecker,
}

impl NetworkProber {
    pub fn new() -> Result<Self> {
        Ok(Self { http_checker: HttpChecker::new()?, tcp_checker: TcpChecker })
    }
}

#[async_trait::async_trait]
impl Prober for NetworkProber {
    async fn probe(&self, endpoint: &Endpoint, limit: Duration) -> Result<CheckResult, ProbeError> {
        if limit.is_zero() {
            return Err(ProbeError::ZeroTimeout);
        }

        let checker: &dyn Checker = match endpoint.probe {
            ProbeDescriptor::Http { .. } => &self.http_checker,
            ProbeDescriptor::Tcp { .. } => &self.tcp_checker,
        };

        let timestamp = Utc::now();
        let start = Instant::now();

        let result = match timeout(limit, checker.check(&endpoint.probe)).await {
            Err(_) => CheckResult::failure(
                &endpoint.id,
                timestamp,
                None,
                None,
                format!("timed out after {} ms", limit.as_millis()),
            ),
            Ok(Err(e)) => CheckResult::failure(&endpoint.id, timestamp, None, None, format!("{e:#}")),
            Ok(Ok(observation)) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                match observation.verdict {
                    Verdict::Healthy => {
                        CheckResult::success(&endpoint.id, timestamp, latency_ms, observation.status_code)
                    }
                    Verdict::Degraded(detail) => CheckResult::degraded(
                        &endpoint.id,
                        timestamp,
                        latency_ms,
                        observation.status_code,
                        detail,
                    ),
                    Verdict::Unhealthy(detail) => CheckResult::failure(
                        &endpoint.id,
                        timestamp,
                        Some(latency_ms),
                        observation.status_code,
                        detail,
                    ),
                }
            }
        };

        Ok(result)
    }
}
