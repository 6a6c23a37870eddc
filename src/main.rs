use std::net::SocketAddr;

use strangerchat::{admin, chat, config::Config, db, session::{self, Hub}, AdminKey, AppState};
use axum::{
    debug_handler, response::IntoResponse, routing::get, Json, Router
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let db_pool = db::connect(&config.database_url).await?;
    let reports = db::load_reports(&db_pool).await?;
    let bans = db::load_bans(&db_pool).await?;
    tracing::info!("loaded {} reports and {} bans", reports.len(), bans.len());

    let writer = db::spawn_writer(db_pool);
    let hub = session::spawn(Hub::new(config.limits.clone(), reports, bans, writer));

    let app_state = AppState {
        hub,
        admin_key: AdminKey(config.admin_key.clone()),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))

        .merge(chat::router())
        .nest("/admin", admin::router())

        .with_state(app_state)
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!("listening on http://localhost:{}", config.port);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

#[debug_handler]
async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}
