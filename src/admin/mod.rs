//! Token protected moderation API.
//!
//! - `GET  /admin/api/reports`  list reports, newest first
//! - `POST /admin/api/resolve`  drop a report by id
//! - `GET  /admin/api/bans`     list banned IPs
//! - `POST /admin/api/ban`      ban an IP
//! - `POST /admin/api/unban`    lift a ban

mod auth;
mod bans;
mod reports;

use axum::{extract::rejection::JsonRejection, routing::{get, post}, Json, Router};

use crate::{AppError, AppResult, AppState};

pub use auth::{authorize, Admin};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/reports", get(reports::list))
        .route("/api/resolve", post(reports::resolve))
        .route("/api/bans", get(bans::list))
        .route("/api/ban", post(bans::ban))
        .route("/api/unban", post(bans::unban))
}

/// Unreadable bodies answer in the same `{error}` shape as every other failure.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    body.map(|Json(body)| body)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

#[cfg(test)]
pub(crate) mod tests {
    use axum::{
        body::{to_bytes, Body},
        extract::{rejection::JsonRejection, FromRequest},
        http::{header::CONTENT_TYPE, Request, StatusCode},
        response::IntoResponse,
        Json,
    };
    use serde::de::DeserializeOwned;

    use crate::config::Limits;
    use crate::db::Writer;
    use crate::session::{self, Hub, HubHandle};
    use crate::AppError;

    /// Hub whose persistence always succeeds.
    pub(crate) fn acking_hub() -> HubHandle {
        let (writer, mut jobs) = Writer::channel();
        tokio::spawn(async move {
            while let Some(batch) = jobs.recv().await {
                for job in batch {
                    job.finish(Ok(()));
                }
            }
        });
        session::spawn(Hub::new(Limits::default(), Vec::new(), Vec::new(), writer))
    }

    /// Runs the real `Json` extractor over `body`.
    pub(crate) async fn extract<T: DeserializeOwned>(content_type: &str, body: &'static str) -> Result<Json<T>, JsonRejection> {
        let request = Request::builder()
            .method("POST")
            .header(CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        Json::<T>::from_request(request, &()).await
    }

    /// Status and decoded JSON body of an error response.
    pub(crate) async fn error_response(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }
}
