use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::http::connection::Connection;
use crate::http::service::Service;

pub async fn run(cfg: &Config, service: Arc<dyn Service>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    info!(
        addr = %cfg.listen_addr,
        idle_timeout_secs = cfg.idle_timeout_secs,
        chunking = ?cfg.chunking,
        "Listening"
    );

    loop {
        let (socket, peer) = listener.accept().await?;
        info!("Accepted connection from {}", peer);

        if let Err(e) = socket.set_nodelay(true) {
            tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
        }

        let mut conn = Connection::new(socket, cfg, service.clone());
        tokio::spawn(async move {
            if let Err(e) = conn.run().await {
                tracing::error!("Connection error from {}: {}", peer, e);
            }
        });
    }
}
