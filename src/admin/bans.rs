use axum::{debug_handler, extract::{rejection::JsonRejection, State}, Json};
use serde::{Deserialize, Serialize};

use crate::{session::HubHandle, AppError, AppResult};

use super::{json_body, Admin};

#[derive(Debug, Serialize)]
pub(crate) struct BansResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    ok: Option<bool>,
    banned: Vec<String>,
}

#[derive(Deserialize)]
pub(crate) struct IpBody {
    ip: Option<String>,
}

/// An unreadable body carries no ip either.
fn required_ip(body: Result<Json<IpBody>, JsonRejection>) -> AppResult<String> {
    let ip = json_body(body).ok().and_then(|body| body.ip);
    match ip.as_deref().map(str::trim) {
        Some(ip) if !ip.is_empty() => Ok(ip.to_owned()),
        _ => Err(AppError::BadRequest("ip required".to_owned())),
    }
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn list(
    _: Admin,
    State(hub): State<HubHandle>,
) -> AppResult<Json<BansResponse>> {
    Ok(Json(BansResponse { ok: None, banned: hub.bans().await? }))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn ban(
    _: Admin,
    State(hub): State<HubHandle>,
    body: Result<Json<IpBody>, JsonRejection>,
) -> AppResult<Json<BansResponse>> {
    let banned = hub.ban(required_ip(body)?).await?;
    Ok(Json(BansResponse { ok: Some(true), banned }))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn unban(
    _: Admin,
    State(hub): State<HubHandle>,
    body: Result<Json<IpBody>, JsonRejection>,
) -> AppResult<Json<BansResponse>> {
    let banned = hub.unban(required_ip(body)?).await?;
    Ok(Json(BansResponse { ok: Some(true), banned }))
}
