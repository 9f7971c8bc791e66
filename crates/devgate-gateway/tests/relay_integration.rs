//! Integration tests for the relay manager against a real stub device.
//!
//! # Purpose
//!
//! These tests exercise the `RelayManager` through its public API the same
//! way browser sessions use it, with a real WebSocket device on loopback.
//! They verify the relay's core guarantees:
//!
//! - N concurrently-open clients for one host share exactly one upstream
//!   connection, and an inbound device frame reaches all of them.
//! - Clients that closed receive nothing further.
//! - Closing the last client tears the upstream down and removes the key,
//!   and a later open dials a brand-new connection.
//! - Browser→device frames sent through the shared handle are fanned back
//!   out when the device answers.
//!
//! # The stub device
//!
//! The stub accepts WebSocket connections on port 0, counts accepts (the
//! sharing assertions hinge on this), echoes every text frame back as
//! `echo:{frame}`, and can push server-initiated frames to all of its
//! connections via a broadcast channel.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use devgate_core::stream::Frame;
use devgate_gateway::domain::GatewayConfig;
use devgate_gateway::infrastructure::RelayManager;

// ── Stub device ───────────────────────────────────────────────────────────────

struct StubDevice {
    /// `host:port` string to open relays against.
    host: String,
    /// Number of WebSocket connections the device has accepted.
    accepts: Arc<AtomicUsize>,
    /// Frames pushed to every currently-connected client.
    push: broadcast::Sender<String>,
}

async fn spawn_stub_device() -> StubDevice {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
    let host = listener.local_addr().expect("addr").to_string();
    let accepts = Arc::new(AtomicUsize::new(0));
    let (push, _) = broadcast::channel::<String>(16);

    let accepts_counter = Arc::clone(&accepts);
    let push_source = push.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            accepts_counter.fetch_add(1, Ordering::SeqCst);
            let mut pushes = push_source.subscribe();
            tokio::spawn(async move {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                let (mut sink, mut stream) = ws.split();
                loop {
                    tokio::select! {
                        pushed = pushes.recv() => match pushed {
                            Ok(text) => {
                                if sink.send(Message::Text(text)).await.is_err() {
                                    break;
                                }
                            }
                            Err(_) => break,
                        },
                        incoming = stream.next() => match incoming {
                            Some(Ok(Message::Text(text))) => {
                                if sink.send(Message::Text(format!("echo:{text}"))).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(_)) => break,
                        },
                    }
                }
            });
        }
    });

    StubDevice {
        host,
        accepts,
        push,
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn manager() -> Arc<RelayManager> {
    Arc::new(RelayManager::new(&GatewayConfig::default()))
}

fn client() -> (Uuid, devgate_gateway::infrastructure::relay::FanoutSender, mpsc::UnboundedReceiver<Frame>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Uuid::new_v4(), tx, rx)
}

/// Polls `cond` until it holds or `millis` elapse.
async fn wait_until(millis: u64, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(millis);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    cond()
}

async fn recv_text(rx: &mut mpsc::UnboundedReceiver<Frame>) -> String {
    let frame = timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("frame within deadline")
        .expect("channel open");
    match frame {
        Frame::Text(text) => text,
        Frame::Binary(b) => panic!("expected text frame, got {} binary bytes", b.len()),
    }
}

// ── Sharing and fan-out ───────────────────────────────────────────────────────

/// Three clients opening the same host must produce one device connection,
/// and a device push must reach all three.
#[tokio::test]
async fn test_three_clients_share_one_connection_and_all_receive_fan_out() {
    let device = spawn_stub_device().await;
    let manager = manager();

    let (a, a_tx, mut a_rx) = client();
    let (b, b_tx, mut b_rx) = client();
    let (c, c_tx, mut c_rx) = client();

    let first = manager.open(a, a_tx, &device.host, "1");
    let second = manager.open(b, b_tx, &device.host, "1");
    let third = manager.open(c, c_tx, &device.host, "1");

    assert_eq!(first.id(), second.id());
    assert_eq!(second.id(), third.id());

    assert!(
        wait_until(2000, || first.is_open()).await,
        "upstream must reach the open state"
    );
    assert_eq!(device.accepts.load(Ordering::SeqCst), 1);

    let status = r#"{"type":"status","payload":{"status":"running"}}"#;
    device.push.send(status.to_string()).expect("push");

    assert_eq!(recv_text(&mut a_rx).await, status);
    assert_eq!(recv_text(&mut b_rx).await, status);
    assert_eq!(recv_text(&mut c_rx).await, status);

    manager.close(a, &device.host);
    manager.close(b, &device.host);
    manager.close(c, &device.host);
}

/// A frame sent through the shared handle reaches the device, and the
/// device's reply fans out to every open client — including ones that
/// never sent anything.
#[tokio::test]
async fn test_client_frames_reach_device_and_replies_fan_out() {
    let device = spawn_stub_device().await;
    let manager = manager();

    let (a, a_tx, mut a_rx) = client();
    let (b, b_tx, mut b_rx) = client();

    let handle = manager.open(a, a_tx, &device.host, "1");
    manager.open(b, b_tx, &device.host, "1");
    assert!(wait_until(2000, || handle.is_open()).await);

    assert!(handle.send(Frame::Text("hello".to_string())));

    assert_eq!(recv_text(&mut a_rx).await, "echo:hello");
    assert_eq!(recv_text(&mut b_rx).await, "echo:hello");

    manager.close(a, &device.host);
    manager.close(b, &device.host);
}

/// A closed client must receive nothing pushed after its close, while the
/// remaining client keeps receiving.
#[tokio::test]
async fn test_closed_client_receives_nothing_further() {
    let device = spawn_stub_device().await;
    let manager = manager();

    let (a, a_tx, mut a_rx) = client();
    let (b, b_tx, mut b_rx) = client();

    let handle = manager.open(a, a_tx, &device.host, "1");
    manager.open(b, b_tx, &device.host, "1");
    assert!(wait_until(2000, || handle.is_open()).await);

    manager.close(b, &device.host);

    device
        .push
        .send(r#"{"type":"logs","payload":{"message":"tick","timestamp":1}}"#.to_string())
        .expect("push");

    assert!(recv_text(&mut a_rx).await.contains("tick"));
    // B's fan-out channel was dropped at close; the closed end sees the
    // disconnect, never a frame.
    assert!(
        timeout(Duration::from_millis(300), b_rx.recv())
            .await
            .expect("channel settles")
            .is_none(),
        "closed client must not receive frames"
    );

    manager.close(a, &device.host);
}

// ── Teardown and re-establishment ─────────────────────────────────────────────

/// Closing every client closes the device connection and removes the key;
/// the next open dials a fresh connection with a new identity.
#[tokio::test]
async fn test_last_close_tears_down_and_next_open_redials() {
    let device = spawn_stub_device().await;
    let manager = manager();

    let (a, a_tx, _a_rx) = client();
    let (b, b_tx, _b_rx) = client();

    let first = manager.open(a, a_tx, &device.host, "1");
    manager.open(b, b_tx, &device.host, "1");
    assert!(wait_until(2000, || first.is_open()).await);
    assert_eq!(device.accepts.load(Ordering::SeqCst), 1);

    manager.close(a, &device.host);
    assert!(
        manager.connection_id(&device.host).is_some(),
        "one client remains; the connection must survive"
    );

    manager.close(b, &device.host);
    assert!(manager.connection_id(&device.host).is_none());
    assert!(
        wait_until(2000, || !first.is_open()).await,
        "cancelled connection must leave the open state"
    );

    let (c, c_tx, _c_rx) = client();
    let second = manager.open(c, c_tx, &device.host, "1");
    assert_ne!(first.id(), second.id(), "re-establishment gets a new identity");
    assert!(wait_until(2000, || second.is_open()).await);
    assert_eq!(device.accepts.load(Ordering::SeqCst), 2);

    manager.close(c, &device.host);
}

/// Double-closing and closing unknown clients must not disturb a later
/// relay lifecycle for the same host.
#[tokio::test]
async fn test_redundant_closes_do_not_break_future_opens() {
    let device = spawn_stub_device().await;
    let manager = manager();

    let (a, a_tx, _a_rx) = client();
    manager.open(a, a_tx, &device.host, "1");
    manager.close(a, &device.host);
    manager.close(a, &device.host);
    manager.close(Uuid::new_v4(), &device.host);
    manager.close(a, "10.255.255.1:1");

    let (b, b_tx, mut b_rx) = client();
    let handle = manager.open(b, b_tx, &device.host, "1");
    assert!(wait_until(2000, || handle.is_open()).await);

    device.push.send("still alive".to_string()).expect("push");
    assert_eq!(recv_text(&mut b_rx).await, "still alive");

    manager.close(b, &device.host);
}

/// An unreachable device leaves clients registered with no connection
/// entry once the dial fails, so the next open retries the dial.
#[tokio::test]
async fn test_failed_dial_clears_connection_but_keeps_group() {
    let manager = manager();
    // Port 9 (discard) on loopback refuses connections on test machines.
    let host = "127.0.0.1:9";

    let (a, a_tx, _a_rx) = client();
    let first = manager.open(a, a_tx, host, "1");

    assert!(
        wait_until(2000, || manager.connection_id(host).is_none()).await,
        "failed dial must clear the connection entry"
    );
    assert_eq!(
        manager.client_count(host),
        1,
        "the client group must survive a failed dial"
    );

    let (b, b_tx, _b_rx) = client();
    let second = manager.open(b, b_tx, host, "1");
    assert_ne!(first.id(), second.id(), "next open re-dials");

    manager.close(a, host);
    manager.close(b, host);
}
