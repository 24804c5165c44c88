use actix_web::{HttpResponse, Responder, get, post, web};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::http::ApiError;
use crate::monitoring::{Scheduler, TriggerOutcome};

const DEFAULT_ALERT_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    limit: Option<usize>,
}

/// Recent alerts, newest first
#[get("/api/alerts")]
pub async fn alerts_route(scheduler: web::Data<Scheduler>, query: web::Query<AlertsQuery>) -> impl Responder {
    let limit = query.limit.unwrap_or(DEFAULT_ALERT_LIMIT);
    HttpResponse::Ok().json(scheduler.recent_alerts(limit))
}

/// Unacknowledged alerts with their repeat counts
#[get("/api/alerts/active")]
pub async fn active_alerts_route(scheduler: web::Data<Scheduler>) -> impl Responder {
    HttpResponse::Ok().json(scheduler.dispatcher().active())
}

#[post("/api/alerts/{id}/ack")]
pub async fn acknowledge_route(
    scheduler: web::Data<Scheduler>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    if !scheduler.acknowledge_alert(id).await {
        return Err(ApiError::AlertNotFound(id));
    }
    Ok(HttpResponse::Ok().json(json!({ "id": id, "acknowledged": true })))
}

/// Start a sweep now. Answers before the sweep finishes.
#[post("/api/sweep")]
pub async fn sweep_route(scheduler: web::Data<Scheduler>) -> Result<HttpResponse, ApiError> {
    match scheduler.trigger_manual() {
        TriggerOutcome::Started => Ok(HttpResponse::Accepted().json(json!({ "status": "started" }))),
        TriggerOutcome::AlreadyInProgress => Err(ApiError::SweepInProgress),
    }
}
