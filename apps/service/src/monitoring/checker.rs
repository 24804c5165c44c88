use anyhow::{Result, anyhow};

use super::registry::ProbeDescriptor;

/// How the dependency answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Healthy,
    /// Well-formed answer carrying an explicit degraded signal
    Degraded(String),
    /// An answer arrived, but not one we accept
    Unhealthy(String),
}

/// What a checker saw when the dependency responded at all
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub status_code: Option<u16>,
    pub verdict: Verdict,
}

/// Checker trait for different kinds of probes.
///
/// `Err` means no usable response arrived (connect error, transport error,
/// malformed response). Timeouts are applied by the caller.
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    async fn check(&self, probe: &ProbeDescriptor) -> Result<Observation>;
}

/// HTTP/HTTPS checker
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("vigil/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

/// Classify an HTTP status against the descriptor's expectations
pub fn classify_status(status: u16, expected: &[u16], degraded: &[u16]) -> Verdict {
    let accepted = if expected.is_empty() {
        (200..300).contains(&status)
    } else {
        expected.contains(&status)
    };

    if accepted {
        Verdict::Healthy
    } else if degraded.contains(&status) {
        Verdict::Degraded(format!("dependency reported degraded status {status}"))
    } else {
        Verdict::Unhealthy(format!("HTTP check failed with status code: {status}"))
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, probe: &ProbeDescriptor) -> Result<Observation> {
        let ProbeDescriptor::Http { url, expected_statuses, degraded_statuses } = probe else {
            return Err(anyhow!("HTTP checker cannot handle probe {}", probe.target()));
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| anyhow!("HTTP request failed: {}", e))?;

        let status_code = response.status().as_u16();

        // Read the body so truncated or malformed responses surface as failures
        response.bytes().await.map_err(|e| anyhow!("malformed HTTP response: {}", e))?;

        Ok(Observation {
            status_code: Some(status_code),
            verdict: classify_status(status_code, expected_statuses, degraded_statuses),
        })
    }
}

/// TCP port checker
#[derive(Default)]
pub struct TcpChecker;

#[async_trait::async_trait]
impl Checker for TcpChecker {
    async fn check(&self, probe: &ProbeDescriptor) -> Result<Observation> {
        let ProbeDescriptor::Tcp { address } = probe else {
            return Err(anyhow!("TCP checker cannot handle probe {}", probe.target()));
        };

        tokio::net::TcpStream::connect(address.as_str())
            .await
            .map_err(|e| anyhow!("TCP connection failed: {}", e))?;

        Ok(Observation { status_code: None, verdict: Verdict::Healthy })
    }
}
