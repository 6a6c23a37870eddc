pub mod admin;
pub mod chat;
pub mod config;
pub mod db;
pub mod session;

use axum::{extract::FromRef, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

use session::HubHandle;

/// Shared secret for the admin API.
#[derive(Clone)]
pub struct AdminKey(pub String);

#[derive(Clone, FromRef)]
pub struct AppState {
    pub hub: HubHandle,
    pub admin_key: AdminKey,
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    Unauthorized,
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_owned()),
            AppError::BadRequest(error) => (StatusCode::BAD_REQUEST, error),
            AppError::Internal(err) => {
                tracing::error!("{err:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };
        (status, Json(json!({ "error": error }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Internal(err.into())
    }
}
