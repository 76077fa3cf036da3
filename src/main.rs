use std::{str::FromStr, sync::Arc};

use anyhow::Context;
use axum::{
    http::StatusCode,
    middleware,
    response::Response,
    routing::{get, post},
    Router,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tower_http::trace::TraceLayer;
use tracing::info;

mod auth;
mod chat_view;
mod config;
mod logging;
mod login_view;
mod manager;
mod response;
mod utils;

use config::Config;

pub struct AppState {
    pub pool: sqlx::SqlitePool,
    pub config: Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    logging::init_tracing();
    if let Err(e) = dotenv {
        info!("no .env file loaded: {}", e);
    }

    let config = Config::from_env()?;
    let options = SqliteConnectOptions::from_str(&config.database_url)
        .with_context(|| format!("invalid DATABASE_URL {:?}", config.database_url))?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
        .context("failed to connect to the database")?;
    sqlx::migrate!()
        .run(&pool)
        .await
        .context("failed to apply migrations")?;

    let addr = config.bind_addr;
    let app = app(Arc::new(AppState { pool, config }));

    info!(%addr, "duo-chat listening");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

fn app(state: Arc<AppState>) -> Router {
    let authenticated = Router::new()
        .route("/auth/validate", get(login_view::validate))
        .route("/auth/logout", post(login_view::logout))
        .route("/users", get(chat_view::list_users))
        .route("/chat/send", post(chat_view::send_by_email))
        .route("/chat/:room_id/send", post(chat_view::send_by_room))
        .route("/chat/get", get(chat_view::get_history))
        .route("/chat/rooms", get(chat_view::list_rooms))
        .route("/chat/rooms/:room_id", get(chat_view::get_room))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    Router::new()
        .route("/ping", get(ping))
        .route("/auth/register", post(login_view::try_register))
        .route("/auth/login", post(login_view::try_login))
        .merge(authenticated)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ping() -> Response {
    response::message("pong")
}

async fn not_found() -> response::ApiError {
    response::ApiError::new(StatusCode::NOT_FOUND, "route not found")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for Ctrl+C: {}", e);
        return;
    }
    info!("received Ctrl+C, shutting down");
}
