use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::http::connection::Connection;
use crate::router::Router;

/// Binds `addr` and serves until `shutdown` resolves.
pub async fn run(
    addr: SocketAddr,
    router: Arc<Router>,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(listen_addr = %addr, "listening");
    serve(listener, router, shutdown).await
}

/// Accepts connections on `listener` until `shutdown` resolves.
///
/// Each connection runs on its own task. Connections already accepted are
/// left to finish on their own.
pub async fn serve(
    listener: TcpListener,
    router: Arc<Router>,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    tokio::pin!(shutdown);

    loop {
        let (socket, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = &mut shutdown => {
                info!("listener stopped accepting connections");
                return Ok(());
            }
        };
        debug!("accepted connection from {}", peer);

        let router = router.clone();
        tokio::spawn(async move {
            let mut conn = Connection::new(socket, router);
            if let Err(e) = conn.run().await {
                error!("connection error from {}: {}", peer, e);
            }
        });
    }
}
