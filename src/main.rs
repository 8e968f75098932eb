// main.rs
// Axum server wiring: connects to MongoDB, seeds the demo sandbox when
// empty, builds the router, and serves on :8080.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::{env, net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;

use nirman::{app, state};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let state = Arc::new(state::init_state().await?);
    let app = app(state);

    let addr: SocketAddr = env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()
        .context("invalid BIND_ADDR")?;
    tracing::info!("listening on http://{addr}");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
