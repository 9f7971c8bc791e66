//! Lifecycle of one upstream device stream connection.
//!
//! [`run`] is spawned by the relay manager the first time a client opens a
//! host.  It dials the device's stream endpoint, then pumps in both
//! directions until the device disconnects, an error occurs, or the manager
//! cancels it (last client left).  Whatever the exit reason, the task's
//! last act is to clear its connection entry so the next `open` for the
//! host re-establishes; the client group is never touched from here.
//!
//! Connection loss is not an error the browser sees: it is logged, and the
//! relationship heals lazily on the next client action.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use devgate_core::stream::Frame;

use crate::infrastructure::relay::{RelayManager, UpstreamHandle};

/// Dials `ws://{key}/v{api_version}/ws` and pumps frames until teardown.
///
/// `key` is the validated `host:port` relay key; `handle` is the shared
/// handle already recorded in the manager's table for this connection.
pub(crate) async fn run(
    manager: Arc<RelayManager>,
    key: String,
    api_version: String,
    handle: UpstreamHandle,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    connect_timeout: Duration,
) {
    let url = format!("ws://{key}/v{api_version}/ws");

    let ws = tokio::select! {
        // The last client can leave while the dial is still in flight.
        _ = handle.cancelled() => {
            debug!("relay {key}: cancelled while connecting");
            manager.clear_connection(&key, handle.id());
            return;
        }
        result = timeout(connect_timeout, connect_async(url.as_str())) => match result {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                warn!("relay {key}: upstream connect to {url} failed: {e}");
                manager.clear_connection(&key, handle.id());
                return;
            }
            Err(_) => {
                warn!("relay {key}: upstream connect to {url} timed out after {connect_timeout:?}");
                manager.clear_connection(&key, handle.id());
                return;
            }
        },
    };

    handle.mark_open();
    info!("relay {key}: upstream connection {} open", handle.id());

    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            _ = handle.cancelled() => {
                debug!("relay {key}: teardown requested");
                let _ = sink.send(Message::Close(None)).await;
                break;
            }

            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = sink.send(frame_into_message(frame)).await {
                        warn!("relay {key}: upstream write failed: {e}");
                        break;
                    }
                }
                // Every handle clone is gone; nothing can send here again.
                None => break,
            },

            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    manager.fan_out(&key, Frame::Text(text));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    manager.fan_out(&key, Frame::Binary(bytes));
                }
                Some(Ok(Message::Ping(payload))) => {
                    // Protocol-level keepalive; answered here, not relayed.
                    let _ = sink.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) => {
                    debug!("relay {key}: upstream sent close");
                    break;
                }
                Some(Err(e)) => {
                    warn!("relay {key}: upstream read error: {e}");
                    break;
                }
                None => {
                    debug!("relay {key}: upstream stream ended");
                    break;
                }
            },
        }
    }

    handle.mark_closed();
    manager.clear_connection(&key, handle.id());
    info!("relay {key}: upstream connection {} closed", handle.id());
}

/// Converts a relay frame into its WebSocket message, framing preserved.
fn frame_into_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text),
        Frame::Binary(bytes) => Message::Binary(bytes),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
