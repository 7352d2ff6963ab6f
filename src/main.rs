mod app;
mod auth;
mod config;
mod db;
mod error;
mod flash;
mod middleware;
mod routes;
mod state;
mod users;
mod views;

use crate::config::Settings;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "movielist=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let settings = Settings::load()?;
    let port = settings.port;
    let state = AppState::init(settings).await?;

    app::serve(app::build_app(state, None), port).await
}
