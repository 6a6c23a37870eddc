use std::net::SocketAddr;

use axum::{
    debug_handler,
    extract::{ws::{Message, WebSocket}, ConnectInfo, State, WebSocketUpgrade},
    http::HeaderMap,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::session::{ClientEvent, HubHandle, Rejection, ServerEvent, OUTBOX_CAPACITY};

const MAX_EVENT_BYTES: usize = 16 * 1024;

/// First `X-Forwarded-For` hop, else the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_owned(),
        (None, Some(peer)) => peer.ip().to_string(),
        (None, None) => "unknown".to_owned(),
    }
}

pub fn parse_event(text: &str) -> Result<ClientEvent, Rejection> {
    if text.len() > MAX_EVENT_BYTES {
        return Err(Rejection::Validation("event too large".to_owned()));
    }
    serde_json::from_str(text).map_err(|e| {
        tracing::debug!("bad event: {e}");
        Rejection::Validation("unrecognized event".to_owned())
    })
}

fn frame(event: &ServerEvent) -> Option<Message> {
    serde_json::to_string(event).ok().map(|text| Message::Text(text.into()))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn chat_ws(
    State(hub): State<HubHandle>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let ip = client_ip(&headers, Some(peer));

    ws.max_message_size(4 * MAX_EVENT_BYTES)
        .on_upgrade(move |socket| serve(socket, hub, ip))
}

async fn serve(socket: WebSocket, hub: HubHandle, ip: String) {
    let (mut sender, mut receiver) = socket.split();
    let (outbox, mut inbox) = mpsc::channel::<ServerEvent>(OUTBOX_CAPACITY);

    let id = match hub.connect(ip, outbox).await {
        Ok(Ok(id)) => id,
        Ok(Err(rejection)) => {
            if let Some(msg) = frame(&ServerEvent::system(rejection.to_string())) {
                let _ = sender.send(msg).await;
            }
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
        Err(e) => {
            tracing::error!("dropping connection: {e:#}");
            return;
        }
    };

    let mut forward_task = tokio::spawn(async move {
        while let Some(event) = inbox.recv().await {
            let Some(msg) = frame(&event) else {
                continue;
            };
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let events = hub.clone();
    let mut receive_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match parse_event(text.as_str()) {
                    Ok(event) => events.event(id, event),
                    Err(rejection) => events.reject(id, rejection),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut forward_task => receive_task.abort(),
        _ = &mut receive_task => forward_task.abort(),
    };

    hub.disconnect(id);
}
