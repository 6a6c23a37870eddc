mod ws;

use axum::{routing::get, Router};

use crate::AppState;

pub use ws::{client_ip, parse_event};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::chat_ws))
}
