use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{HttpResponse, Responder, get, web};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::monitoring::{ExportFilter, Scheduler};

const DEFAULT_LOG_LIMIT: usize = 100;
const MAX_LOG_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    endpoint: Option<String>,
    limit: Option<usize>,
    since: Option<DateTime<Utc>>,
}

/// Most recent check results, newest first
#[get("/api/logs")]
pub async fn logs_route(scheduler: web::Data<Scheduler>, query: web::Query<LogsQuery>) -> impl Responder {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).min(MAX_LOG_LIMIT);
    HttpResponse::Ok().json(scheduler.query_recent_logs(query.endpoint.as_deref(), limit, query.since))
}

/// Download the check log as CSV
#[get("/api/logs/export")]
pub async fn export_route(scheduler: web::Data<Scheduler>, filter: web::Query<ExportFilter>) -> impl Responder {
    let body = scheduler.export_logs(&filter);
    let filename = format!("api_logs_{}.csv", Utc::now().format("%Y-%m-%d"));

    HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename)],
        })
        .body(body)
}
