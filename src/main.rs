//! Request dispatcher between a chat/moderation bot and its LLM backend

use llm_dispatch_bot::api;
use llm_dispatch_bot::core::services::QueuedLlmService;
use llm_dispatch_bot::infrastructure::backend::LlmBackend;
use llm_dispatch_bot::infrastructure::config::AppConfig;

use anyhow::anyhow;
use axum::Router;
use di::{Injectable, ServiceCollection, existing_as_self};
use di_axum::RouterServiceProviderExtensions;
use log::info;
use tokio::runtime::{Builder, Runtime};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

fn main() -> anyhow::Result<()> {
    // initialize tracing
    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env()?;
    info!(
        "LLM backend {} (queue capacity {}, {} policy)",
        config.llm_base_url, config.dispatcher.capacity, config.dispatcher.policy
    );

    let runtime: Runtime = Builder::new_multi_thread().enable_all().build()?;

    runtime.block_on(web_server_task(config))
}

async fn web_server_task(config: AppConfig) -> anyhow::Result<()> {
    // Every request shares this one dispatcher.
    let backend = LlmBackend::from_config(&config)?;
    let provider = ServiceCollection::new()
        .add(existing_as_self(backend))
        .add(QueuedLlmService::scoped())
        .build_provider()
        .map_err(|e| anyhow!("invalid service registrations: {e:?}"))?;
    let backend = provider.get_required::<LlmBackend>();

    let app = Router::new()
        .nest("/llm", api::llm::router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_provider(provider);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Shutting down...");
    backend.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
