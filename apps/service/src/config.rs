use std::time::Duration;
use std::{env, fmt, fs, io, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: io::Error },

    #[error("failed to write config {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: io::Error },

    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("no config path available, set XDG_CONFIG_HOME or HOME")]
    ConfigPathUnavailable,

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub evaluator: EvaluatorConfig,
    pub history: HistoryConfig,
    pub alerts: AlertsConfig,
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
    pub endpoints: Vec<EndpointConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
    /// Maximum number of probes in flight during a sweep
    pub concurrency: usize,
    /// Cadence of uptime window rotation and log trimming
    pub maintenance_interval_seconds: u64,
    /// Run one sweep immediately at startup
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
            timeout_seconds: 10,
            concurrency: 8,
            maintenance_interval_seconds: 300,
            run_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub performance_threshold_ms: u64,
    /// Classify slow successful checks as `warning` instead of `healthy`
    pub escalate_slow_to_warning: bool,
    /// Minimum gap between two performance alerts for the same endpoint.
    /// Defaults to the sweep interval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_debounce_seconds: Option<u64>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            performance_threshold_ms: 5000,
            escalate_slow_to_warning: false,
            performance_debounce_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub uptime_window_hours: u64,
    /// In-memory check log capacity, trimmed by maintenance
    pub max_entries: usize,
    /// Closed uptime windows kept per endpoint
    pub archived_windows: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { uptime_window_hours: 24, max_entries: 10_000, archived_windows: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub recent_capacity: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    pub webhook_timeout_seconds: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self { recent_capacity: 50, webhook_url: None, webhook_timeout_seconds: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub enabled: bool,
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { enabled: true, path: "vigil.db".into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { enabled: true, bind: "127.0.0.1".into(), port: 8080 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into(), format: "compact".into() }
    }
}

/// Raw endpoint entry. Checked by `Registry::load`, not here, so that a bad
/// category or a missing id is reported as a registry error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub id: String,
    pub name: String,
    pub category: String,
    pub critical: bool,
    pub description: String,
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// `http` or `tcp`
    pub kind: String,
    /// URL for http probes, `host:port` for tcp probes
    pub target: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub expected_statuses: Vec<u16>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degraded_statuses: Vec<u16>,
}

impl EndpointConfig {
    fn http(id: &str, name: &str, category: &str, critical: bool, description: &str, url: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            critical,
            description: description.into(),
            probe: ProbeConfig {
                kind: "http".into(),
                target: url.into(),
                expected_statuses: REACHABLE_STATUSES.to_vec(),
                degraded_statuses: DEGRADED_STATUSES.to_vec(),
            },
        }
    }
}

/// Statuses a provider's API root answers with while the provider is up.
/// Roots without a public page reply 404 and authenticated APIs reply 401/403.
const REACHABLE_STATUSES: [u16; 8] = [200, 204, 301, 302, 400, 401, 403, 404];

const DEGRADED_STATUSES: [u16; 2] = [429, 503];

/// The dependency catalogue the service ships with
pub fn default_endpoints() -> Vec<EndpointConfig> {
    vec![
        EndpointConfig::http(
            "gemini",
            "Google Gemini AI",
            "AI",
            true,
            "AI service for legal queries",
            "https://generativelanguage.googleapis.com",
        ),
        EndpointConfig::http(
            "mcp",
            "Model Context Protocol",
            "Protocol",
            true,
            "Context protocol for models",
            "https://api.mcp.dev",
        ),
        EndpointConfig::http(
            "apifast",
            "APIFast Service",
            "Service",
            false,
            "Fast external services",
            "https://api.apifast.com",
        ),
        EndpointConfig::http(
            "whatsapp",
            "WhatsApp Business API",
            "Messaging",
            false,
            "WhatsApp messaging API",
            "https://graph.facebook.com",
        ),
        EndpointConfig::http(
            "stripe",
            "Stripe Payments",
            "Payment",
            true,
            "Payment processing",
            "https://api.stripe.com",
        ),
        EndpointConfig::http(
            "paypal",
            "PayPal API",
            "Payment",
            true,
            "PayPal payments",
            "https://api.paypal.com",
        ),
    ]
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/vigil/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("vigil/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Scheduler")?;
        write_1(f, "Interval (s)", &self.scheduler.interval_seconds)?;
        write_1(f, "Probe Timeout (s)", &self.scheduler.timeout_seconds)?;
        write_1(f, "Concurrency", &self.scheduler.concurrency)?;
        write_1(f, "Maintenance Interval (s)", &self.scheduler.maintenance_interval_seconds)?;
        write_title_1(f, "Evaluator")?;
        write_1(f, "Performance Threshold (ms)", &self.evaluator.performance_threshold_ms)?;
        write_1(f, "Escalate Slow To Warning", &self.evaluator.escalate_slow_to_warning)?;
        write_1(f, "Performance Debounce (s)", &self.performance_debounce().as_secs())?;
        write_title_1(f, "History")?;
        write_1(f, "Uptime Window (h)", &self.history.uptime_window_hours)?;
        write_1(f, "Max Entries", &self.history.max_entries)?;
        write_title_1(f, "Alerts")?;
        write_1(f, "Recent Capacity", &self.alerts.recent_capacity)?;
        write_1(f, "Webhook", &self.alerts.webhook_url.as_deref().unwrap_or("disabled"))?;
        write_title_1(f, "Database")?;
        write_1(f, "Enabled", &self.database.enabled)?;
        write_1(f, "Path", &self.database.path)?;
        write_title_1(f, "HTTP")?;
        write_1(f, "Enabled", &self.http.enabled)?;
        write_1(f, "Address", &format!("{}:{}", self.http.bind, self.http.port))?;
        write_title_1(f, "Endpoints")?;
        for endpoint in &self.endpoints {
            let critical = if endpoint.critical { " (critical)" } else { "" };
            write_1(f, &endpoint.id, &format!("{} {}{}", endpoint.probe.kind, endpoint.probe.target, critical))?;
        }

        Ok(())
    }
}

impl Config {
    /// Default configuration including the built-in endpoint catalogue
    pub fn with_default_endpoints() -> Self {
        Self { endpoints: default_endpoints(), ..Default::default() }
    }

    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/vigil/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```ignore
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            Self::from_toml_str(&raw_string)?
        } else {
            let config = Self::with_default_endpoints();
            config.write_config(&config_path)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })
    }

    /// Check cross-field constraints. Endpoint entries are checked by the registry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scheduler = &self.scheduler;
        if scheduler.timeout_seconds == 0 {
            return Err(ConfigError::Invalid("scheduler.timeout_seconds must be > 0".into()));
        }
        if scheduler.interval_seconds < scheduler.timeout_seconds {
            return Err(ConfigError::Invalid(format!(
                "scheduler.interval_seconds ({}) must be >= scheduler.timeout_seconds ({})",
                scheduler.interval_seconds, scheduler.timeout_seconds
            )));
        }
        if scheduler.concurrency == 0 {
            return Err(ConfigError::Invalid("scheduler.concurrency must be > 0".into()));
        }
        if scheduler.maintenance_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.maintenance_interval_seconds must be > 0".into(),
            ));
        }
        if self.history.uptime_window_hours == 0 {
            return Err(ConfigError::Invalid("history.uptime_window_hours must be > 0".into()));
        }
        if self.alerts.recent_capacity == 0 {
            return Err(ConfigError::Invalid("alerts.recent_capacity must be > 0".into()));
        }
        self.log_options()?;
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.interval_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.scheduler.timeout_seconds)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.maintenance_interval_seconds)
    }

    pub fn performance_debounce(&self) -> Duration {
        self.evaluator
            .performance_debounce_seconds
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.sweep_interval())
    }

    pub fn uptime_window(&self) -> Duration {
        Duration::from_secs(self.history.uptime_window_hours * 3600)
    }

    pub fn log_options(&self) -> Result<logger::LogOptions, ConfigError> {
        let level = self
            .logging
            .level
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", self.logging.level)))?;
        let format = self
            .logging
            .format
            .parse()
            .map_err(|e: logger::ParseLogFormatError| ConfigError::Invalid(e.to_string()))?;
        Ok(logger::LogOptions { level, format })
    }
}
