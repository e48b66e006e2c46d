mod auth;
mod config;
mod credentials;
mod css;
mod error;
mod handler;
mod prompt;
mod render;
mod resolve;
mod state;
mod template;

use anyhow::Context;
use axum::{Router, extract::DefaultBodyLimit, http::StatusCode, routing::{get, post}};
use clap::Parser;
use config::{Args, ServerConfig};
use credentials::CredentialStore;
use render::PageRenderer;
use state::AppState;
use std::{path::Path, sync::Arc};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Largest document body accepted by a save.
const MAX_SAVE_BYTES: usize = 16 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "editdocs=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load .env file if present (silently ignored if absent).
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let users_path = args.users_path();

    if args.adduser {
        return add_user(&users_path);
    }

    let config = ServerConfig::from_args(&args)?;
    tracing::info!("document root: {}", config.docs_root.display());
    tracing::info!("editor root: {}", config.editor_root.display());

    let credentials = CredentialStore::load_or_default(&users_path)
        .with_context(|| format!("Cannot load users file {}", users_path.display()))?;
    if credentials.is_empty() {
        tracing::warn!(
            "no users in {}; editing is unavailable until one is added with --adduser",
            users_path.display()
        );
    } else {
        tracing::info!("loaded {} user(s) from {}", credentials.len(), users_path.display());
    }

    let state = AppState {
        config: Arc::new(config),
        credentials: Arc::new(credentials),
        renderer: Arc::new(PageRenderer::new().context("Invalid title pattern")?),
    };

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Cannot bind to {addr}"))?;

    tracing::info!("Listening on http://{addr}");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

pub fn app(state: AppState) -> Router {
    let editor = Router::new()
        .route("/preview", post(handler::preview))
        .fallback_service(ServeDir::new(&state.config.editor_root));

    // CatchPanicLayer is outermost so it recovers from panics anywhere in the stack.
    Router::new()
        .route("/healthz", get(|| async { StatusCode::OK }))
        .nest("/editor", editor)
        .fallback(handler::handle)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_SAVE_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
}

fn add_user(users_path: &Path) -> anyhow::Result<()> {
    let mut store = CredentialStore::load_or_default(users_path)
        .with_context(|| format!("Cannot load users file {}", users_path.display()))?;

    let prompt::NewUser { username, password } = prompt::read_new_user()?;
    let replaced = store.add_user(&username, &password)?;
    store
        .save(users_path)
        .with_context(|| format!("Cannot write users file {}", users_path.display()))?;

    if replaced {
        tracing::info!("Replaced an existing user's password in {}", users_path.display());
    } else {
        tracing::info!("Added a user to {}", users_path.display());
    }
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result { tracing::error!("ctrl-c error: {}", e); }
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
    tracing::info!("Shutting down gracefully");
}
