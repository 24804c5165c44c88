use actix_web::web::ServiceConfig;

pub mod alerts;
pub mod health;
pub mod logs;
pub mod status;

pub fn routes(cfg: &mut ServiceConfig) {
    cfg.service(health::health_route)
        .service(status::status_route)
        .service(status::uptime_route)
        .service(status::uptime_history_route)
        .service(alerts::alerts_route)
        .service(alerts::active_alerts_route)
        .service(alerts::acknowledge_route)
        .service(alerts::sweep_route)
        .service(logs::export_route)
        .service(logs::logs_route);
}
