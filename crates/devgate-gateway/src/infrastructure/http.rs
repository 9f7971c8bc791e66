//! The HTTP front door: route parsing and dispatch.
//!
//! Three URL shapes reach the gateway:
//!
//! 1. `GET /devices` — the discovery registry's liveness-filtered snapshot.
//! 2. `GET|POST /proxy/{host}/v{api}/{operation}` — one-shot forwarding via
//!    the proxy router.
//! 3. `GET /proxy/{host}/v{api}/ws` (WebSocket upgrade) — a relay session
//!    against the relay manager.
//!
//! Proxy failures come back as `200 {"error": "..."}`; the gateway never
//! maps a device problem onto its own status code.  Upgrade requests with
//! an invalid host or version segment, or on a path that matches no route,
//! are refused by severing the connection: an empty response carrying
//! `Connection: close`, with no structured error.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket},
        Path, Request, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use reqwest::Method;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use devgate_core::host::is_valid_host;
use devgate_core::stream::Frame;

use crate::application::proxy::parse_api_version;
use crate::application::{DeviceRegistry, ProxyError, ProxyReply, ProxyRouter};
use crate::infrastructure::relay::RelayManager;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<DeviceRegistry>,
    pub relay: Arc<RelayManager>,
    pub proxy: Arc<ProxyRouter>,
}

/// Builds the gateway router.
///
/// The static `ws` segment takes priority over the `:operation` capture,
/// so stream upgrades and proxied operations share the `/proxy` prefix.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/devices", get(list_devices))
        .route("/proxy/:host/:version/ws", get(stream_upgrade))
        .route(
            "/proxy/:host/:version/:operation",
            get(proxy_get).post(proxy_post),
        )
        .fallback(fallback)
        .with_state(state)
}

// ── Discovery ─────────────────────────────────────────────────────────────────

async fn list_devices(State(state): State<AppState>) -> Json<serde_json::Value> {
    let devices = state.registry.snapshot().await;
    Json(json!({ "data": devices }))
}

// ── Proxy ─────────────────────────────────────────────────────────────────────

async fn proxy_get(
    State(state): State<AppState>,
    Path((host, version, operation)): Path<(String, String, String)>,
) -> Response {
    let result = state
        .proxy
        .forward(&host, &version, &operation, Method::GET, None)
        .await;
    proxy_response(result)
}

async fn proxy_post(
    State(state): State<AppState>,
    Path((host, version, operation)): Path<(String, String, String)>,
    body: String,
) -> Response {
    let result = state
        .proxy
        .forward(&host, &version, &operation, Method::POST, Some(body))
        .await;
    proxy_response(result)
}

/// Renders a proxy outcome; success and structured error share the status
/// code.
fn proxy_response(result: Result<ProxyReply, ProxyError>) -> Response {
    match result {
        Ok(ProxyReply::Json(value)) => Json(value).into_response(),
        Ok(ProxyReply::Text(text)) => text.into_response(),
        Err(e) => Json(json!({ "error": e.to_string() })).into_response(),
    }
}

// ── Stream relay ──────────────────────────────────────────────────────────────

async fn stream_upgrade(
    State(state): State<AppState>,
    Path((host, version)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> Response {
    if !is_valid_host(&host) {
        warn!("severing upgrade for invalid host '{host}'");
        return sever();
    }
    let api_version = match parse_api_version(&version) {
        Ok(token) => token.to_string(),
        Err(_) => {
            warn!("severing upgrade for invalid version segment '{version}'");
            return sever();
        }
    };
    ws.on_upgrade(move |socket| relay_session(state, socket, host, api_version))
}

/// One browser-side relay session: register with the manager, pump frames
/// both ways, deregister on the way out.
///
/// Forwarding browser→device traffic happens here, not in the manager —
/// the session owns the upstream handle it was given at `open`.
async fn relay_session(state: AppState, socket: WebSocket, host: String, api_version: String) {
    let client = Uuid::new_v4();
    let (fan_tx, mut fan_rx) = mpsc::unbounded_channel();
    let upstream = state.relay.open(client, fan_tx, &host, &api_version);
    debug!(
        "session {client}: relaying {host} via connection {}",
        upstream.id()
    );

    let (mut browser_sink, mut browser_stream) = socket.split();

    loop {
        tokio::select! {
            fanned = fan_rx.recv() => match fanned {
                Some(frame) => {
                    if browser_sink.send(frame_into_ws(frame)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },

            inbound = browser_stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if !upstream.send(Frame::Text(text)) {
                        // Connection mid-teardown; drop, never queue.
                        debug!("session {client}: upstream gone, frame dropped");
                    }
                }
                Some(Ok(Message::Binary(bytes))) => {
                    if !upstream.send(Frame::Binary(bytes)) {
                        debug!("session {client}: upstream gone, frame dropped");
                    }
                }
                // axum answers protocol-level pings itself.
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!("session {client}: browser socket error: {e}");
                    break;
                }
            },
        }
    }

    state.relay.close(client, &host);
    debug!("session {client}: closed");
}

/// Converts a relayed frame into a browser-side WebSocket message.
fn frame_into_ws(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text),
        Frame::Binary(bytes) => Message::Binary(bytes),
    }
}

// ── Rejections ────────────────────────────────────────────────────────────────

/// Non-matching paths: plain 404, except upgrade attempts, which are
/// severed outright (there is no structured-error channel mid-handshake).
async fn fallback(request: Request) -> Response {
    if is_websocket_upgrade(request.headers()) {
        warn!(
            "severing upgrade for non-matching path '{}'",
            request.uri().path()
        );
        sever()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
}

/// An empty-bodied refusal that closes the underlying connection instead
/// of completing the upgrade.
fn sever() -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

// ── Tests ─────────────────────────────────────────────────────────────────────
