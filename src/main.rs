//! Multi-party chat server

use anyhow::anyhow;
use axum::http::{HeaderValue, Method};
use chat_core::api;
use chat_core::config::Settings;
use chat_core::infrastructure::database::DatabaseConnection;
use di::ServiceProvider;
use di_axum::RouterServiceProviderExtensions;
use log::info;
use tokio::runtime::{Builder, Runtime};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let provider = chat_core::services()
        .build_provider()
        .map_err(|e| anyhow!("invalid service registrations: {e:?}"))?;

    let runtime: Runtime = Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(web_server_task(provider))
}

async fn web_server_task(provider: ServiceProvider) -> anyhow::Result<()> {
    let settings = provider.get_required::<Settings>();
    provider.get_required::<DatabaseConnection>().migrate().await?;

    let origins = settings
        .allowed_origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;

    let app = api::router()
        .layer(
            CorsLayer::new()
                .allow_headers(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                ])
                .allow_origin(AllowOrigin::list(origins)),
        )
        .with_provider(provider);

    let listener = tokio::net::TcpListener::bind(&settings.bind_address).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    info!("Shutting down...");

    Ok(())
}
