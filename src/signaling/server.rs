use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::tungstenite::{Bytes, Error as WsError, Message, Utf8Bytes};
use tracing::{debug, error, info, warn};

use super::actor::{RoomCommand, RoomRegistryHandle, room_registry_actor};
use super::messages::{Envelope, MessageKind};
use super::types::{ConnId, OutboundMessage};

pub const DEFAULT_SIGNALING_PORT: u16 = 9443;
const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SignalingServer {
    handle: RoomRegistryHandle,
}

impl Default for SignalingServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalingServer {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel::<RoomCommand>(1024);
        tokio::spawn(room_registry_actor(rx));

        Self {
            handle: RoomRegistryHandle { tx },
        }
    }

    /// Handle onto the shared room registry (cloneable).
    pub fn handle(&self) -> RoomRegistryHandle {
        self.handle.clone()
    }

    pub async fn run(&self, addr: &str, acceptor: TlsAcceptor) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("Signaling relay listening on wss://{}", addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            let handle = self.handle.clone();
            let acceptor = acceptor.clone();

            // one bad connection must never take the relay down
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, acceptor, handle).await {
                    error!("Connection error from {}: {}", addr, e);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    acceptor: TlsAcceptor,
    handle: RoomRegistryHandle,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let tls_stream = acceptor.accept(stream).await?;
    let ws_stream = tokio_tungstenite::accept_async(tls_stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let conn = ConnId::generate();
    info!("WebSocket connection from {} as {}", addr, conn);
    handle.register(conn).await;

    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<Message>();

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    let mut waiting_for_pong = false;
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(msg) = rx.recv() => {
                    let ws_msg = Message::Text(msg.into_inner());
                    if ws_tx.send(ws_msg).await.is_err() {
                        break;
                    }
                }
                Some(ctrl_msg) = ctrl_rx.recv() => {
                    if ws_tx.send(ctrl_msg).await.is_err() {
                        break;
                    }
                }
                else => break,
            }
        }
    });

    loop {
        let pong_timeout = async {
            match pong_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = ping_interval.tick() => {
                if waiting_for_pong {
                    warn!("No Pong received, disconnecting {}", conn);
                    break;
                }
                if ctrl_tx.send(Message::Ping(Bytes::new())).is_err() {
                    break;
                }
                waiting_for_pong = true;
                pong_deadline = Some(tokio::time::Instant::now() + PONG_TIMEOUT);
                debug!("Ping sent to {}", conn);
            }

            _ = pong_timeout => {
                warn!("Pong timeout, disconnecting {}", conn);
                break;
            }

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        // only the transport's own close ends the session;
                        // non-terminal protocol errors are logged and skipped
                        if is_terminal(&e) {
                            warn!("WebSocket transport error from {}: {}", conn, e);
                            break;
                        }
                        warn!("WebSocket error from {}: {}", conn, e);
                        continue;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => {
                        handle_frame(&text, conn, &tx, &handle).await;
                    }
                    Message::Pong(_) => {
                        waiting_for_pong = false;
                        pong_deadline = None;
                        debug!("Pong received from {}", conn);
                    }
                    Message::Close(_) => {
                        info!("Close received from {}", conn);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    // sole teardown path: runs exactly once however the loop was left
    handle.disconnect(conn).await;

    send_task.abort();
    info!("WebSocket disconnected: {} ({})", conn, addr);

    Ok(())
}

/// Errors after which the stream is not worth polling again.
fn is_terminal(e: &WsError) -> bool {
    matches!(
        e,
        WsError::ConnectionClosed | WsError::AlreadyClosed | WsError::Io(_)
    )
}

/// Dispatch one inbound text frame. Never fails: a malformed frame is logged
/// and discarded with the connection left open.
async fn handle_frame(
    text: &Utf8Bytes,
    conn: ConnId,
    tx: &mpsc::UnboundedSender<OutboundMessage>,
    handle: &RoomRegistryHandle,
) {
    let envelope: Envelope = match serde_json::from_str(text.as_str()) {
        Ok(env) => env,
        Err(e) => {
            warn!("Discarding malformed frame from {}: {}", conn, e);
            return;
        }
    };

    match envelope.kind {
        MessageKind::Join => match envelope.room {
            Some(room) => handle.join(room, conn, tx.clone()).await,
            None => warn!("Discarding join without room from {}", conn),
        },
        MessageKind::Offer | MessageKind::Answer | MessageKind::Candidate => {
            // forward the exact original bytes, never a re-serialization
            if let Some(room) = envelope.room {
                handle
                    .relay(room, conn, OutboundMessage::new(text.clone()))
                    .await;
            }
        }
        MessageKind::Unrecognized => {
            // unknown types fall through silently, not an error
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::types::RoomId;

    fn test_server() -> SignalingServer {
        SignalingServer::new()
    }

    #[tokio::test]
    async fn malformed_frame_leaves_state_untouched() {
        let server = test_server();
        let handle = server.handle();
        let conn = ConnId::generate();
        let (tx, mut rx) = mpsc::unbounded_channel();

        handle.register(conn).await;
        handle_frame(&Utf8Bytes::from_static("{not json"), conn, &tx, &handle).await;

        assert_eq!(handle.connection_count().await, 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn join_frame_reaches_the_registry() {
        let server = test_server();
        let handle = server.handle();
        let conn = ConnId::generate();
        let (tx, mut rx) = mpsc::unbounded_channel();

        handle.register(conn).await;
        handle_frame(
            &Utf8Bytes::from_static(r#"{"type":"join","room":"r1"}"#),
            conn,
            &tx,
            &handle,
        )
        .await;

        assert_eq!(
            rx.recv().await.unwrap().as_str(),
            r#"{"type":"room_joined","room":"r1"}"#
        );
        assert_eq!(handle.members(RoomId::from("r1")).await.unwrap(), vec![conn]);
    }

    #[tokio::test]
    async fn join_without_room_is_discarded() {
        let server = test_server();
        let handle = server.handle();
        let conn = ConnId::generate();
        let (tx, mut rx) = mpsc::unbounded_channel();

        handle.register(conn).await;
        handle_frame(&Utf8Bytes::from_static(r#"{"type":"join"}"#), conn, &tx, &handle).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn relay_frame_is_forwarded_verbatim() {
        let server = test_server();
        let handle = server.handle();

        let a = ConnId::generate();
        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let b = ConnId::generate();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();

        handle.register(a).await;
        handle.join(RoomId::from("r1"), a, a_tx.clone()).await;
        handle.register(b).await;
        handle.join(RoomId::from("r1"), b, b_tx.clone()).await;
        handle.members(RoomId::from("r1")).await;
        while a_rx.try_recv().is_ok() {}
        while b_rx.try_recv().is_ok() {}

        let raw = r#"{"type": "offer", "room": "r1", "sdp": "v=0", "weird  spacing": true}"#;
        handle_frame(&Utf8Bytes::from(raw.to_string()), a, &a_tx, &handle).await;

        assert_eq!(b_rx.recv().await.unwrap().as_str(), raw);
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unrecognized_type_is_a_noop() {
        let server = test_server();
        let handle = server.handle();
        let conn = ConnId::generate();
        let (tx, mut rx) = mpsc::unbounded_channel();

        handle.register(conn).await;
        handle_frame(
            &Utf8Bytes::from_static(r#"{"type":"chat","room":"r1","text":"hi"}"#),
            conn,
            &tx,
            &handle,
        )
        .await;

        assert!(rx.try_recv().is_err());
        assert!(handle.members(RoomId::from("r1")).await.is_none());
    }
}
