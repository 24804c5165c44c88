//! Orchestrator module - coordinates all components
//!
//! Builds the engine from configuration, runs the optional startup sweep,
//! starts the timers and the status API, and shuts everything down in order.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};
use url::Url;

use crate::config::{Config, DatabaseConfig};
use crate::database::{DatabaseImpl, NoopPersistence, Persistence, initialize_database};
use crate::http;
use crate::monitoring::{
    AlertDispatcher, Evaluator, HistoryOptions, HistoryStore, NetworkProber, Prober, Registry, Scheduler,
    SchedulerOptions, SweepOutcome, SweepTrigger, Thresholds,
};
use crate::notify::{LogNotifier, Notifier, NotifierSet, WebhookNotifier};
use crate::pool::open_pool;

/// Main orchestrator for the vigil service
pub struct Orchestrator {
    config: Arc<Config>,
    scheduler: Arc<Scheduler>,
}

impl Orchestrator {
    /// Create and run until Ctrl-C
    pub async fn start(config: Config) -> Result<()> {
        let orchestrator = Self::new(config).await?;
        orchestrator.run().await
    }

    /// Wire the engine with the network prober
    pub async fn new(config: Config) -> Result<Self> {
        let prober: Arc<dyn Prober> = Arc::new(NetworkProber::new()?);
        Self::with_prober(config, prober).await
    }

    pub async fn with_prober(config: Config, prober: Arc<dyn Prober>) -> Result<Self> {
        let config = Arc::new(config);

        let registry = Arc::new(Registry::load(&config.endpoints)?);
        info!("Loaded {} endpoints", registry.len());

        let persistence = open_persistence(&config.database).await?;

        let now = Utc::now();
        let history = Arc::new(HistoryStore::new(
            &registry,
            HistoryOptions {
                window: config.uptime_window(),
                max_entries: config.history.max_entries,
                archived_windows: config.history.archived_windows,
            },
            persistence.clone(),
            now,
        ));
        history.restore(now).await;

        let notifier = build_notifier(&config)?;
        let dispatcher = Arc::new(AlertDispatcher::new(config.alerts.recent_capacity, notifier, persistence));

        let evaluator = Evaluator::new(Thresholds {
            performance_threshold_ms: config.evaluator.performance_threshold_ms,
            escalate_slow_to_warning: config.evaluator.escalate_slow_to_warning,
            performance_debounce: config.performance_debounce(),
        });

        let scheduler = Arc::new(Scheduler::new(
            registry,
            prober,
            evaluator,
            history,
            dispatcher,
            SchedulerOptions {
                interval: config.sweep_interval(),
                timeout: config.probe_timeout(),
                concurrency: config.scheduler.concurrency,
            },
        ));

        Ok(Self { config, scheduler })
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Run until Ctrl-C
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until `shutdown` resolves, then stop timers and the API and wait
    /// for a sweep in flight to finish.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        info!("Starting vigil orchestrator...");

        if self.config.scheduler.run_on_start {
            if let SweepOutcome::Completed(report) = self.scheduler.sweep(SweepTrigger::Startup).await {
                info!(
                    "Startup sweep finished: {} probes, {} failures, {} alerts",
                    report.probes, report.failures, report.alerts_dispatched
                );
            }
        }

        self.scheduler.start_periodic(self.scheduler.options().interval)?;
        self.scheduler.start_maintenance(self.config.maintenance_interval())?;

        let server = if self.config.http.enabled {
            let ip: IpAddr = self.config.http.bind.parse()?;
            let server = http::serve(self.scheduler.clone(), SocketAddr::new(ip, self.config.http.port))?;
            let handle = server.handle();
            actix_web::rt::spawn(server);
            Some(handle)
        } else {
            None
        };

        shutdown.await;
        info!("Shutting down...");

        self.scheduler.stop();
        if let Some(handle) = server {
            handle.stop(true).await;
        }
        self.scheduler.wait_idle().await;

        info!("Shutdown complete");
        Ok(())
    }
}

async fn open_persistence(config: &DatabaseConfig) -> Result<Arc<dyn Persistence>> {
    if !config.enabled {
        info!("Database disabled, results are kept in memory only");
        return Ok(Arc::new(NoopPersistence));
    }

    let pool = open_pool(&config.path)
        .await
        .with_context(|| format!("failed to open database at {}", config.path))?;

    let conn = pool.get().await?;
    info!("Initializing database schema...");
    initialize_database(&conn).await?;
    drop(conn);

    Ok(Arc::new(DatabaseImpl::new_from_pool(pool)))
}

fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>> {
    let mut notifiers = NotifierSet::new().with(LogNotifier);

    if let Some(raw) = &config.alerts.webhook_url {
        let url = Url::parse(raw).with_context(|| format!("invalid alerts.webhook_url '{raw}'"))?;
        info!("Alert webhook enabled: {}", url);
        notifiers = notifiers.with(WebhookNotifier::new(
            url,
            std::time::Duration::from_secs(config.alerts.webhook_timeout_seconds),
        )?);
    }

    info!(channels = notifiers.len(), "Alert notifications ready");
    Ok(Arc::new(notifiers))
}
