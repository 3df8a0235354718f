use serde::{Deserialize, Deserializer, Serialize};

use super::types::RoomId;

/// Recognized values of the `type` field on inbound frames.
///
/// `offer`, `answer` and `candidate` share one dispatch branch on purpose:
/// the relay never looks inside negotiation payloads, so the three kinds are
/// routed identically. Anything else falls through to `Unrecognized`, which
/// makes the silent no-op for unknown types an explicit branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Join,
    Offer,
    Answer,
    Candidate,
    Unrecognized,
}

impl MessageKind {
    fn from_type_tag(tag: &str) -> Self {
        match tag {
            "join" => Self::Join,
            "offer" => Self::Offer,
            "answer" => Self::Answer,
            "candidate" => Self::Candidate,
            _ => Self::Unrecognized,
        }
    }

    /// Whether this kind is forwarded verbatim to the rest of the room.
    pub fn is_relay(self) -> bool {
        matches!(self, Self::Offer | Self::Answer | Self::Candidate)
    }
}

impl<'de> Deserialize<'de> for MessageKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from_type_tag(&tag))
    }
}

/// Minimal view of an inbound frame: the dispatch tag and the target room.
/// Every other field is opaque relay cargo and is never deserialized; the
/// original frame bytes are what get forwarded.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub room: Option<RoomId>,
}

/// Messages the server originates (everything else it sends is a verbatim
/// copy of a client frame).
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Confirmation to the joining connection itself
    #[serde(rename = "room_joined")]
    RoomJoined { room: RoomId },

    /// Notification to the peers already in the room
    #[serde(rename = "ready")]
    Ready { room: RoomId },
}
