use axum::{debug_handler, extract::{rejection::JsonRejection, State}, Json};
use serde::{Deserialize, Serialize};

use crate::{session::{HubHandle, Report}, AppResult};

use super::{json_body, Admin};

#[derive(Debug, Serialize)]
pub(crate) struct ReportsResponse {
    reports: Vec<Report>,
}

#[derive(Deserialize)]
pub(crate) struct ResolveBody {
    id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Done {
    ok: bool,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn list(
    _: Admin,
    State(hub): State<HubHandle>,
) -> AppResult<Json<ReportsResponse>> {
    Ok(Json(ReportsResponse { reports: hub.reports().await? }))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn resolve(
    _: Admin,
    State(hub): State<HubHandle>,
    body: Result<Json<ResolveBody>, JsonRejection>,
) -> AppResult<Json<Done>> {
    let ResolveBody { id } = json_body(body)?;
    hub.resolve(id.unwrap_or_default()).await?;
    Ok(Json(Done { ok: true }))
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use axum::http::StatusCode;

    use super::*;
    use crate::admin::tests::{acking_hub, error_response, extract};
    use crate::session::{ClientEvent, OUTBOX_CAPACITY};

    #[tokio::test]
    async fn lists_and_resolves_reports() {
        let hub = acking_hub();
        let (tx, _rx) = mpsc::channel(OUTBOX_CAPACITY);
        let id = hub.connect("10.0.0.1".into(), tx).await.unwrap().unwrap();
        hub.event(id, ClientEvent::Report { reason: "spam".into(), block_next: false });

        let Json(resp) = list(Admin, State(hub.clone())).await.unwrap();
        assert_eq!(resp.reports.len(), 1);
        assert_eq!(resp.reports[0].reason, "spam");
        assert_eq!(resp.reports[0].reporter_id, id);

        let report_id = resp.reports[0].id.clone();
        let Json(done) = resolve(Admin, State(hub.clone()), Ok(Json(ResolveBody { id: Some(report_id) }))).await.unwrap();
        assert!(done.ok);
        assert!(hub.reports().await.unwrap().is_empty());

        // unknown ids are fine
        let Json(done) = resolve(Admin, State(hub.clone()), Ok(Json(ResolveBody { id: None }))).await.unwrap();
        assert!(done.ok);
    }

    #[tokio::test]
    async fn reports_serialize_with_camel_case_keys() {
        let hub = acking_hub();
        let (tx, _rx) = mpsc::channel(OUTBOX_CAPACITY);
        let id = hub.connect("10.0.0.1".into(), tx).await.unwrap().unwrap();
        hub.event(id, ClientEvent::Report { reason: "spam".into(), block_next: false });

        let Json(resp) = list(Admin, State(hub)).await.unwrap();
        let json = serde_json::to_value(&resp).unwrap();
        let report = &json["reports"][0];
        assert_eq!(report["reporterIp"], "10.0.0.1");
        assert_eq!(report["reportedIp"], "unknown");
        assert!(report["roomId"].is_null());
        assert!(report["transcript"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreadable_resolve_body_is_a_json_bad_request() {
        let hub = acking_hub();
        let body = extract::<ResolveBody>("application/json", "{\"id\":").await;
        let err = resolve(Admin, State(hub), body).await.unwrap_err();

        let (status, json) = error_response(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().is_some_and(|e| !e.is_empty()));
    }
}
