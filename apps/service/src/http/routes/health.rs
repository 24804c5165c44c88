use actix_web::{HttpResponse, Responder, get};

/// Liveness probe. The status code is the whole answer.
#[get("/health")]
pub async fn health_route() -> impl Responder {
    HttpResponse::Ok()
}
