use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::messages::ServerMessage;
use super::types::{ConnId, Member, OutboundMessage, Room, RoomId};

/// Commands sent to the room registry actor
pub(crate) enum RoomCommand {
    Register {
        conn: ConnId,
    },
    Join {
        room: RoomId,
        conn: ConnId,
        tx: mpsc::UnboundedSender<OutboundMessage>,
    },
    Relay {
        room: RoomId,
        sender: ConnId,
        frame: OutboundMessage,
    },
    Disconnect {
        conn: ConnId,
    },
    Members {
        room: RoomId,
        reply: oneshot::Sender<Option<Vec<ConnId>>>,
    },
    ConnectionCount {
        reply: oneshot::Sender<usize>,
    },
}

/// Owns the room table and the connection registry. Commands arrive over one
/// mpsc channel, so every mutation and every fan-out is serialized: a join
/// and a disconnect on the same room can never interleave, and broadcast
/// iteration can never observe a half-applied membership change.
pub(crate) async fn room_registry_actor(mut rx: mpsc::Receiver<RoomCommand>) {
    let mut rooms: HashMap<RoomId, Room> = HashMap::new();
    // every live connection, with its room once `join` has been seen
    let mut connections: HashMap<ConnId, Option<RoomId>> = HashMap::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            RoomCommand::Register { conn } => {
                connections.insert(conn, None);
                debug!("Registered {}", conn);
            }

            RoomCommand::Join { room, conn, tx } => {
                // a connection's room is never reassigned while it is open
                if let Some(Some(current)) = connections.get(&conn) {
                    if *current != room {
                        debug!(
                            "Ignoring join to {} from {}: already in {}",
                            room, conn, current
                        );
                        continue;
                    }
                }

                let entry = rooms.entry(room.clone()).or_insert_with(|| {
                    info!("Room created: {}", room);
                    Room::default()
                });
                entry
                    .members
                    .entry(conn)
                    .or_insert_with(|| Member { tx: tx.clone() });
                connections.insert(conn, Some(room.clone()));
                info!("{} joined room {}", conn, room);

                let ack = ServerMessage::RoomJoined { room: room.clone() };
                let ack = serde_json::to_string(&ack)
                    .expect("ServerMessage serialization should never fail");
                let _ = tx.send(OutboundMessage::from(ack));

                let ready = ServerMessage::Ready { room };
                let ready = serde_json::to_string(&ready)
                    .expect("ServerMessage serialization should never fail");
                let ready = OutboundMessage::from(ready);
                for (id, member) in &entry.members {
                    if *id != conn && !member.tx.is_closed() {
                        let _ = member.tx.send(ready.clone());
                    }
                }
            }

            RoomCommand::Relay { room, sender, frame } => {
                // unknown room: the frame is dropped, nothing to tell anyone
                let Some(entry) = rooms.get(&room) else {
                    debug!("Dropping relay frame from {}: no room {}", sender, room);
                    continue;
                };
                for (id, member) in &entry.members {
                    // skip the sender and anyone whose socket task is gone;
                    // one dead recipient never affects the rest
                    if *id != sender && !member.tx.is_closed() {
                        let _ = member.tx.send(frame.clone());
                    }
                }
            }

            RoomCommand::Disconnect { conn } => {
                let Some(room) = connections.remove(&conn) else {
                    continue;
                };
                if let Some(room) = room {
                    if let Some(entry) = rooms.get_mut(&room) {
                        entry.members.remove(&conn);
                        if entry.members.is_empty() {
                            rooms.remove(&room);
                            info!("Room {} removed (empty)", room);
                        }
                    }
                    info!("{} left room {}", conn, room);
                }
            }

            RoomCommand::Members { room, reply } => {
                let members = rooms
                    .get(&room)
                    .map(|r| r.members.keys().copied().collect());
                let _ = reply.send(members);
            }

            RoomCommand::ConnectionCount { reply } => {
                let _ = reply.send(connections.len());
            }
        }
    }
}

/// Handle to communicate with the room registry actor
#[derive(Clone)]
pub struct RoomRegistryHandle {
    pub(crate) tx: mpsc::Sender<RoomCommand>,
}

impl RoomRegistryHandle {
    /// Record a newly accepted connection, not yet in any room
    pub async fn register(&self, conn: ConnId) {
        let _ = self.tx.send(RoomCommand::Register { conn }).await;
    }

    /// Add a connection to a room, creating the room if needed. The joiner
    /// gets a `room_joined` confirmation; every other member gets `ready`.
    pub async fn join(
        &self,
        room: RoomId,
        conn: ConnId,
        tx: mpsc::UnboundedSender<OutboundMessage>,
    ) {
        let _ = self.tx.send(RoomCommand::Join { room, conn, tx }).await;
    }

    /// Forward a frame verbatim to every other member of the room.
    /// A room that does not exist swallows the frame silently.
    pub async fn relay(&self, room: RoomId, sender: ConnId, frame: OutboundMessage) {
        let _ = self
            .tx
            .send(RoomCommand::Relay {
                room,
                sender,
                frame,
            })
            .await;
    }

    /// Remove the connection from the registry and from its room, deleting
    /// the room if it becomes empty. Safe to call for unknown connections.
    pub async fn disconnect(&self, conn: ConnId) {
        let _ = self.tx.send(RoomCommand::Disconnect { conn }).await;
    }

    /// Current members of a room, `None` if the room does not exist.
    pub async fn members(&self, room: RoomId) -> Option<Vec<ConnId>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(RoomCommand::Members {
                room,
                reply: reply_tx,
            })
            .await;
        reply_rx.await.ok().flatten()
    }

    /// Number of live registered connections.
    pub async fn connection_count(&self) -> usize {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(RoomCommand::ConnectionCount { reply: reply_tx })
            .await;
        reply_rx.await.unwrap_or(0)
    }
}
