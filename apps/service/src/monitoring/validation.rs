//! Probe descriptor validation.
//!
//! Turns the raw `kind`/`target` pair from the configuration into a
//! [`ProbeDescriptor`], rejecting anything a prober could not act on.

use url::Url;

use super::registry::ProbeDescriptor;
use crate::config::ProbeConfig;

/// Validates a probe entry based on its kind
pub fn validate_probe(probe: &ProbeConfig) -> Result<ProbeDescriptor, String> {
    match probe.kind.trim().to_ascii_lowercase().as_str() {
        "http" | "https" => {
            let url = validate_http_target(&probe.target)?;
            validate_status_lists(&probe.expected_statuses, &probe.degraded_statuses)?;
            Ok(ProbeDescriptor::Http {
                url,
                expected_statuses: probe.expected_statuses.clone(),
                degraded_statuses: probe.degraded_statuses.clone(),
            })
        }
        "tcp" => {
            validate_tcp_target(&probe.target)?;
            Ok(ProbeDescriptor::Tcp { address: probe.target.trim().to_string() })
        }
        "" => Err("missing probe kind".to_string()),
        other => Err(format!("unsupported probe kind: {other}")),
    }
}

/// Validate HTTP/HTTPS target
fn validate_http_target(target: &str) -> Result<Url, String> {
    let url = Url::parse(target.trim()).map_err(|e| format!("invalid URL '{target}': {e}"))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("invalid scheme for HTTP probe: {other}")),
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(format!("URL '{target}' has no host"));
    }

    if let Some(port) = url.port() {
        validate_port(port)?;
    }

    Ok(url)
}

/// Validate TCP target, expected format: host:port
fn validate_tcp_target(target: &str) -> Result<(), String> {
    let (host, port) = target
        .trim()
        .rsplit_once(':')
        .ok_or_else(|| "TCP target must be in format host:port".to_string())?;

    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err("TCP target has an empty host".to_string());
    }

    let port: u16 = port.parse().map_err(|_| format!("invalid port number '{port}'"))?;
    validate_port(port)
}

fn validate_port(port: u16) -> Result<(), String> {
    if port == 0 {
        return Err("port 0 is not a valid probe port".to_string());
    }
    Ok(())
}

fn validate_status_lists(expected: &[u16], degraded: &[u16]) -> Result<(), String> {
    for code in expected.iter().chain(degraded) {
        if !(100..=599).contains(code) {
            return Err(format!("invalid HTTP status code {code}"));
        }
    }
    if let Some(code) = expected.iter().find(|code| degraded.contains(code)) {
        return Err(format!("status {code} is listed as both expected and degraded"));
    }
    Ok(())
}
