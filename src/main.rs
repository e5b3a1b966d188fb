use anyhow::{Context, Result};
use clap::Parser;
use sfmock::{Catalog, MockConfig, MockOrg, build_router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sfmock=info,tower_http=info".into()),
        )
        .init();

    let config = MockConfig::parse();
    let catalog = Catalog::load_dir(&config.schema_dir)
        .with_context(|| format!("loading schemas from {}", config.schema_dir.display()))?;
    info!(objects = catalog.len(), dir = %config.schema_dir.display(), "schemas loaded");

    let org = Arc::new(MockOrg::with_settings(catalog, config.org_settings()));
    let app = build_router(org);

    let address = config.address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {}", address))?;
    info!(%address, "sfmock listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
