//! Database entities

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Microseconds since the Unix epoch.
///
/// Stored as an integer so range comparisons in SQL are exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type)]
#[sqlx(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Timestamp {
        Timestamp(Utc::now().timestamp_micros())
    }

    /// The instant just before this one, used as an exclusive lower bound.
    pub fn pred(self) -> Timestamp {
        Timestamp(self.0 - 1)
    }

    pub fn to_datetime(self) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(self.0).unwrap_or_default()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Timestamp(value.timestamp_micros())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Participant {
    pub id: Uuid,
    pub name: String,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, FromRow)]
pub struct Room {
    pub id: Uuid,
    pub is_team: bool,
    pub name: String,
    pub direct_key: Option<String>,
    pub created_at: Timestamp,
    pub is_deleted: bool,
}

impl Room {
    /// Unique key of the direct room between two participants, independent of order.
    pub fn direct_key(a: Uuid, b: Uuid) -> String {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        format!("{low}:{high}")
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Membership {
    pub id: Uuid,
    pub room_id: Uuid,
    /// `None` once the participant's identity has been removed.
    pub participant_id: Option<Uuid>,
    pub display_name: String,
    /// Visibility floor: messages created before this are hidden from the member.
    pub joined_at: Timestamp,
    pub is_left: bool,
    pub is_notify: bool,
    pub last_read_message_id: Option<Uuid>,
}

impl Membership {
    pub fn is_active(&self) -> bool {
        !self.is_left && self.participant_id.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[repr(u8)]
pub enum MessageType {
    User = 1,
    System = 2,
}

#[derive(Debug, Clone, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub message_type: MessageType,
    pub author_id: Option<Uuid>,
    pub content: String,
    pub created_at: Timestamp,
    pub is_deleted: bool,
}

/// A message that has not been persisted yet.
///
/// `not_before` is only a lower bound; the store assigns the final `created_at`.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: Uuid,
    pub room_id: Uuid,
    pub message_type: MessageType,
    pub author_id: Option<Uuid>,
    pub content: String,
    pub not_before: Timestamp,
}

/// Rejected construction of a [`NewMessage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingAuthor;

impl NewMessage {
    pub fn new(
        room_id: Uuid,
        message_type: MessageType,
        author_id: Option<Uuid>,
        content: String,
    ) -> Result<NewMessage, MissingAuthor> {
        if message_type == MessageType::User && author_id.is_none() {
            return Err(MissingAuthor);
        }

        Ok(NewMessage {
            id: Uuid::new_v4(),
            room_id,
            message_type,
            // system messages never carry an author
            author_id: match message_type {
                MessageType::User => author_id,
                MessageType::System => None,
            },
            content,
            not_before: Timestamp::now(),
        })
    }

    pub fn system(room_id: Uuid, content: String) -> NewMessage {
        NewMessage {
            id: Uuid::new_v4(),
            room_id,
            message_type: MessageType::System,
            author_id: None,
            content,
            not_before: Timestamp::now(),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> NewMessage {
        self.id = id;
        self
    }

    pub fn not_before(mut self, at: Timestamp) -> NewMessage {
        self.not_before = self.not_before.max(at);
        self
    }
}

/// A message joined with its author's name and live unread-by count.
#[derive(Debug, Clone, FromRow)]
pub struct MessageView {
    pub id: Uuid,
    pub room_id: Uuid,
    pub message_type: MessageType,
    pub author_id: Option<Uuid>,
    pub author_name: Option<String>,
    pub content: String,
    pub created_at: Timestamp,
    pub unread_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ReadReceiptRow {
    pub message_id: Uuid,
    pub unread_count: i64,
}

/// One line of a participant's room list.
#[derive(Debug, Clone, FromRow)]
pub struct RoomListRow {
    pub room_id: Uuid,
    pub is_team: bool,
    pub name: String,
    pub room_created_at: Timestamp,
    pub joined_at: Timestamp,
    pub member_count: i64,
    pub counterpart_id: Option<Uuid>,
    pub counterpart_name: Option<String>,
    pub unread_count: i64,
    pub last_activity_at: Timestamp,
}

#[derive(Debug, Clone, FromRow)]
pub struct StoredFile {
    pub id: Uuid,
    pub owner_type_id: i64,
    pub owner_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub size: i64,
    pub created_at: Timestamp,
}
