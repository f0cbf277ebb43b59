use std::env;
use std::path::PathBuf;

use anyhow::Result;
use leafcare_api::build_app;
use leafcare_observability::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("leafcare_api");

    let config_path = env::var("LEAFCARE_CONFIG").ok().map(PathBuf::from);
    let kb_path = env::var("LEAFCARE_KB").unwrap_or_else(|_| "kb".to_string());
    let bind = env::var("LEAFCARE_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let app = build_app(config_path.clone(), &kb_path).await?;

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(
        bind = %bind,
        kb = %kb_path,
        config = ?config_path,
        "leafcare api started"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
