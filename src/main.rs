use std::sync::Arc;

use courier::config::Config;
use courier::http::service::Hello;
use courier::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::load(),
    };

    tokio::select! {
        res = server::listener::run(&cfg, Arc::new(Hello)) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
