//! Read models handed out by the core and pushed to clients

use crate::infrastructure::entities::{self, MessageType, MessageView, RoomListRow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Label shown for system-authored messages.
pub const SYSTEM_AUTHOR: &str = "SYSTEM";

/// Label shown when an identity no longer exists.
pub const UNKNOWN_PARTICIPANT: &str = "unknown";

/// Owner type under which message attachments are stored in the file service.
pub const MESSAGE_ATTACHMENT_OWNER_TYPE: i64 = 3;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    User,
    System,
}

impl From<MessageType> for MessageKind {
    fn from(kind: MessageType) -> Self {
        match kind {
            MessageType::User => MessageKind::User,
            MessageType::System => MessageKind::System,
        }
    }
}

impl From<MessageKind> for MessageType {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::User => MessageType::User,
            MessageKind::System => MessageType::System,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: Uuid,
    pub name: String,
}

impl From<entities::Participant> for Participant {
    fn from(participant: entities::Participant) -> Self {
        Participant {
            id: participant.id,
            name: participant.name,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct Membership {
    pub room_id: Uuid,
    pub participant_id: Option<Uuid>,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
    pub is_left: bool,
    pub is_notify: bool,
    pub last_read_message_id: Option<Uuid>,
}

impl From<entities::Membership> for Membership {
    fn from(membership: entities::Membership) -> Self {
        Membership {
            room_id: membership.room_id,
            participant_id: membership.participant_id,
            display_name: membership.display_name,
            joined_at: membership.joined_at.to_datetime(),
            is_left: membership.is_left,
            is_notify: membership.is_notify,
            last_read_message_id: membership.last_read_message_id,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub size: i64,
}

impl From<entities::StoredFile> for FileInfo {
    fn from(file: entities::StoredFile) -> Self {
        FileInfo {
            id: file.id,
            file_name: file.file_name,
            content_type: file.content_type,
            size: file.size,
        }
    }
}

/// A binary payload to hand to the file service.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Serialize, Debug, Clone)]
pub struct MessageEntry {
    pub id: Uuid,
    pub room_id: Uuid,
    pub kind: MessageKind,
    pub author_id: Option<Uuid>,
    pub author_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Active members who have not read this message yet.
    pub unread_count: i64,
    pub attachments: Vec<FileInfo>,
}

impl MessageEntry {
    pub fn from_view(view: MessageView, attachments: Vec<FileInfo>) -> MessageEntry {
        let author_name = match (view.message_type, view.author_name) {
            (MessageType::System, _) => SYSTEM_AUTHOR.to_owned(),
            (MessageType::User, Some(name)) if view.author_id.is_some() => name,
            (MessageType::User, _) => UNKNOWN_PARTICIPANT.to_owned(),
        };

        MessageEntry {
            id: view.id,
            room_id: view.room_id,
            kind: view.message_type.into(),
            author_id: view.author_id,
            author_name,
            content: view.content,
            created_at: view.created_at.to_datetime(),
            unread_count: view.unread_count,
            attachments,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct MessagePreview {
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// One entry of a participant's room list.
#[derive(Serialize, Debug, Clone)]
pub struct RoomSummary {
    pub id: Uuid,
    pub is_team: bool,
    /// Team name, or the other participant's name for a direct room.
    pub display_name: String,
    pub counterpart_id: Option<Uuid>,
    pub unread_count: i64,
    pub last_message: Option<MessagePreview>,
    pub last_activity_at: DateTime<Utc>,
    pub member_count: i64,
}

impl RoomSummary {
    pub fn from_row(row: RoomListRow, last_message: Option<MessagePreview>) -> RoomSummary {
        let (display_name, counterpart_id) = if row.is_team {
            (row.name, None)
        } else {
            match row.counterpart_id {
                Some(id) => (
                    row.counterpart_name
                        .unwrap_or_else(|| UNKNOWN_PARTICIPANT.to_owned()),
                    Some(id),
                ),
                None => (UNKNOWN_PARTICIPANT.to_owned(), None),
            }
        };

        RoomSummary {
            id: row.room_id,
            is_team: row.is_team,
            display_name,
            counterpart_id,
            unread_count: row.unread_count,
            last_message,
            last_activity_at: row.last_activity_at.to_datetime(),
            member_count: row.member_count,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ReadReceipt {
    pub message_id: Uuid,
    pub unread_count: i64,
}

impl From<entities::ReadReceiptRow> for ReadReceipt {
    fn from(row: entities::ReadReceiptRow) -> Self {
        ReadReceipt {
            message_id: row.message_id,
            unread_count: row.unread_count,
        }
    }
}

/// Outcome of moving a read pointer.
#[derive(Serialize, Debug, Clone)]
pub struct ReadAdvance {
    pub room_id: Uuid,
    pub participant_id: Uuid,
    pub last_read_message_id: Option<Uuid>,
    /// `false` when the pointer already was at the target.
    pub advanced: bool,
    /// Fresh unread-by counts for every message the pointer moved over.
    pub receipts: Vec<ReadReceipt>,
}

/// Owner-side changes to a membership; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct MembershipUpdate {
    pub display_name: Option<String>,
    pub is_notify: Option<bool>,
}
