use std::sync::Arc;

use tenuki_bot::config::Config;
use tenuki_bot::services::katago::LocalEngine;
use tenuki_bot::services::llm::OpenAiCommentator;
use tenuki_bot::services::messaging::LineMessenger;
use tenuki_bot::services::storage::{BlobStore, GcsStore};
use tenuki_bot::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tenuki_bot=debug,tower_http=info".into()),
        )
        .init();

    // .env is honoured but never overrides real environment variables.
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    let store: Arc<dyn BlobStore> = Arc::new(GcsStore::new(
        &config.bucket,
        config.storage_endpoint.as_deref(),
        config.storage_token.as_deref(),
    )?);
    let auth_store: Arc<dyn BlobStore> = if config.auth_bucket == config.bucket {
        Arc::clone(&store)
    } else {
        Arc::new(GcsStore::new(
            &config.auth_bucket,
            config.storage_endpoint.as_deref(),
            config.storage_token.as_deref(),
        )?)
    };
    let messenger = Arc::new(LineMessenger::new(&config.channel_token)?);
    let engine = Arc::new(LocalEngine::new(Arc::clone(&store), config.clone())?);
    let commentator = Arc::new(OpenAiCommentator::new(
        &config.llm_endpoint,
        &config.llm_api_key,
        &config.llm_model,
    )?);

    let port = config.port;
    let webhook_path = config.webhook_path.clone();
    let state = AppState::new(config, store, auth_store, messenger, engine, commentator);
    let app = build_router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(%addr, %webhook_path, "starting tenuki-bot");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install signal handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
