//! Read-mostly HTTP interface over the monitoring engine.

use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::{App, HttpServer, web};

mod error;
pub mod routes;

pub use error::ApiError;

use crate::monitoring::Scheduler;

/// Bind the status API. The returned server must be awaited or spawned.
pub fn serve(scheduler: Arc<Scheduler>, addr: SocketAddr) -> std::io::Result<Server> {
    let data = web::Data::from(scheduler);

    let server = HttpServer::new(move || App::new().app_data(data.clone()).configure(routes::routes))
        .bind(addr)?
        .disable_signals()
        .run();

    tracing::info!(%addr, "status API listening");
    Ok(server)
}

#[cfg(test)]
mod tests {
    use std::net::{SocketAddr, TcpListener};
    use std::sync::Arc;

    use anyhow::Result;

    use super::serve;
    use crate::monitoring::scheduler::SchedulerState;
    use crate::monitoring::testing::{ScriptedProber, scheduler};

    fn free_addr() -> std::io::Result<SocketAddr> {
        TcpListener::bind("127.0.0.1:0")?.local_addr()
    }

    #[actix_web::test]
    async fn test_sweep_triggered_over_http_outlives_server_stop() -> Result<()> {
        let prober = Arc::new(ScriptedProber::default());
        prober.hold("whatsapp");
        let scheduler = scheduler(prober.clone(), &[("stripe", true), ("whatsapp", false)]);

        let addr = free_addr()?;
        let server = serve(scheduler.clone(), addr)?;
        let handle = server.handle();
        actix_web::rt::spawn(server);

        let response = reqwest::Client::new().post(format!("http://{addr}/api/sweep")).send().await?;
        assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
        prober.wait_until_held().await;

        handle.stop(true).await;
        assert_eq!(scheduler.state(), SchedulerState::Sweeping);

        prober.release();
        scheduler.wait_idle().await;

        let report = scheduler.last_sweep().expect("sweep ran to completion");
        assert_eq!(report.probes, 2);
        assert_eq!(prober.calls("whatsapp"), 1);
        Ok(())
    }
}
