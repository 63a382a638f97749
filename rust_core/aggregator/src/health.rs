use std::future::Future;

use axum::routing::get;
use axum::Router;
use log::info;
use tokio::net::TcpListener;

async fn ok() -> &'static str {
    "OK"
}

/// Liveness route: `GET /` answers `OK` while the process is up.
pub fn router() -> Router {
    Router::new().route("/", get(ok))
}

/// Serves the health route on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("health check listening on {}", addr);
    }
    axum::serve(listener, router()).with_graceful_shutdown(shutdown).await
}
