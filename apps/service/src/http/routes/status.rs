use actix_web::{HttpResponse, Responder, get, web};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::http::ApiError;
use crate::monitoring::Scheduler;
use crate::monitoring::registry::Category;
use crate::monitoring::scheduler::{SchedulerState, SweepReport};
use crate::monitoring::types::{HealthStatus, UptimeRecord};

#[derive(Serialize)]
struct EndpointStatus<'a> {
    id: &'a str,
    name: &'a str,
    category: Category,
    critical: bool,
    description: &'a str,
    target: &'a str,
    #[serde(flatten)]
    status: HealthStatus,
}

#[derive(Serialize)]
struct StatusResponse<'a> {
    state: SchedulerState,
    skipped_ticks: u64,
    last_sweep: Option<SweepReport>,
    endpoints: Vec<EndpointStatus<'a>>,
}

#[derive(Serialize)]
pub struct UptimeView {
    endpoint_id: String,
    window_start: DateTime<Utc>,
    total_checks: u64,
    successful_checks: u64,
    uptime_percentage: f64,
}

impl From<UptimeRecord> for UptimeView {
    fn from(record: UptimeRecord) -> Self {
        Self {
            uptime_percentage: record.uptime_percentage(),
            endpoint_id: record.endpoint_id,
            window_start: record.window_start,
            total_checks: record.total_checks,
            successful_checks: record.successful_checks,
        }
    }
}

/// Every endpoint with its current status, in catalogue order
#[get("/api/status")]
pub async fn status_route(scheduler: web::Data<Scheduler>) -> impl Responder {
    let statuses = scheduler.current_statuses();

    let endpoints = scheduler
        .registry()
        .list()
        .iter()
        .map(|endpoint| EndpointStatus {
            id: &endpoint.id,
            name: &endpoint.display_name,
            category: endpoint.category,
            critical: endpoint.critical,
            description: &endpoint.description,
            target: endpoint.probe.target(),
            status: statuses.get(&endpoint.id).cloned().unwrap_or_else(|| HealthStatus::unknown(&endpoint.id)),
        })
        .collect();

    HttpResponse::Ok().json(StatusResponse {
        state: scheduler.state(),
        skipped_ticks: scheduler.skipped_ticks(),
        last_sweep: scheduler.last_sweep(),
        endpoints,
    })
}

/// Current uptime window of every endpoint
#[get("/api/uptime")]
pub async fn uptime_route(scheduler: web::Data<Scheduler>) -> impl Responder {
    let summary: Vec<UptimeView> = scheduler.uptime_summary().into_iter().map(UptimeView::from).collect();
    HttpResponse::Ok().json(summary)
}

/// Closed uptime windows of one endpoint, newest first
#[get("/api/uptime/{endpoint_id}/history")]
pub async fn uptime_history_route(
    scheduler: web::Data<Scheduler>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let endpoint_id = path.into_inner();
    if scheduler.registry().get(&endpoint_id).is_none() {
        return Err(ApiError::UnknownEndpoint(endpoint_id));
    }

    let history: Vec<UptimeView> =
        scheduler.uptime_history(&endpoint_id).into_iter().map(UptimeView::from).collect();
    Ok(HttpResponse::Ok().json(history))
}
