//! Payloads fanned out to connected sessions

use crate::core::models::{MessageEntry, ReadReceipt};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    MessageCreated {
        message: MessageEntry,
    },
    ReadReceipts {
        room_id: Uuid,
        reader_id: Uuid,
        receipts: Vec<ReadReceipt>,
    },
    UnreadTotal {
        total: i64,
    },
    RoomJoined {
        room_id: Uuid,
    },
    MembersChanged {
        room_id: Uuid,
        member_count: i64,
    },
    RoomLeft {
        room_id: Uuid,
    },
}

impl ChatEvent {
    /// Event name used on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::MessageCreated { .. } => "message_created",
            ChatEvent::ReadReceipts { .. } => "read_receipts",
            ChatEvent::UnreadTotal { .. } => "unread_total",
            ChatEvent::RoomJoined { .. } => "room_joined",
            ChatEvent::MembersChanged { .. } => "members_changed",
            ChatEvent::RoomLeft { .. } => "room_left",
        }
    }
}

/// An event together with the participants it is meant for.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub recipients: Arc<[Uuid]>,
    pub event: Arc<ChatEvent>,
}

impl Envelope {
    pub fn new(recipients: Vec<Uuid>, event: ChatEvent) -> Envelope {
        Envelope {
            recipients: recipients.into(),
            event: Arc::new(event),
        }
    }

    pub fn is_for(&self, participant_id: Uuid) -> bool {
        self.recipients.contains(&participant_id)
    }
}
