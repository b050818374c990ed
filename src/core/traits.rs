//! DI "Interfaces"

use crate::core::error::ChatResult;
use crate::core::events::{ChatEvent, Envelope};
use crate::core::models::{
    FileInfo, Membership, MembershipUpdate, MessageEntry, MessageKind, Participant, ReadAdvance,
    RoomSummary, UploadFile,
};
use crate::infrastructure::entities::{Message, Room, Timestamp};
use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

#[async_trait]
pub trait ParticipantDirectory: Send + Sync {
    /// Creates the participant or renames an existing one.
    async fn register(&self, participant_id: Uuid, name: String) -> ChatResult<Participant>;

    async fn find(&self, participant_id: Uuid) -> ChatResult<Participant>;

    /// Deletes the identity. Memberships and authored messages survive with a null
    /// reference.
    async fn remove(&self, participant_id: Uuid) -> ChatResult<()>;
}

#[async_trait]
pub trait RoomDirectory: Send + Sync {
    /// Lists the caller's active rooms, most recently active first.
    async fn list_rooms(&self, caller_id: Uuid) -> ChatResult<Vec<RoomSummary>>;

    /// Returns `Forbidden` unless the caller is an active member.
    async fn room_summary(&self, caller_id: Uuid, room_id: Uuid) -> ChatResult<RoomSummary>;

    /// Creates a team room holding the creator and every invitee.
    ///
    /// All initial read pointers sit on the room's first system message, so nobody
    /// starts with unread messages.
    async fn create_team_room(
        &self,
        creator_id: Uuid,
        name: String,
        invitee_ids: Vec<Uuid>,
    ) -> ChatResult<Room>;

    /// Returns the direct room between the two participants, creating it if needed and
    /// reactivating memberships that have left.
    async fn create_or_reuse_direct_room(&self, a_id: Uuid, b_id: Uuid) -> ChatResult<Room>;

    /// Adds participants to a room. A room reaching more than two members becomes a team
    /// room for good.
    async fn invite(&self, room_id: Uuid, inviter_id: Uuid, invitee_ids: Vec<Uuid>)
    -> ChatResult<()>;

    async fn leave(&self, room_id: Uuid, participant_id: Uuid) -> ChatResult<()>;

    /// Changes the caller's own display name or notification toggle for a room.
    async fn update_membership(
        &self,
        room_id: Uuid,
        participant_id: Uuid,
        update: MembershipUpdate,
    ) -> ChatResult<Membership>;
}

#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Appends a message. `created_at` is assigned by the store at commit.
    ///
    /// Returns `InvalidArgument` for a user message without author, `NotFound` for a
    /// missing room and `Forbidden` if the author is not an active member.
    async fn append(
        &self,
        room_id: Uuid,
        author_id: Option<Uuid>,
        kind: MessageKind,
        content: String,
        attachments: Vec<UploadFile>,
    ) -> ChatResult<MessageEntry>;

    /// Newest-first page of the messages visible to the participant, older than the
    /// `before` cursor (a message id).
    async fn list(
        &self,
        room_id: Uuid,
        participant_id: Uuid,
        before: Option<String>,
        page_size: Option<u32>,
    ) -> ChatResult<Vec<MessageEntry>>;

    /// Most recent message at or after `since`.
    async fn latest_since(&self, room_id: Uuid, since: Timestamp) -> ChatResult<Option<Message>>;
}

/// Unread accounting. Every figure is derived from read pointers and timestamps on
/// demand; implementations may cache behind this interface as long as the contract holds.
#[async_trait]
pub trait ReadTracker: Send + Sync {
    /// Active members other than `exclude_id` who have not seen a message created at `at`.
    async fn unread_for(&self, room_id: Uuid, exclude_id: Uuid, at: Timestamp) -> ChatResult<i64>;

    async fn unread_for_all_participants(&self, room_id: Uuid, at: Timestamp) -> ChatResult<i64>;

    /// Moves the participant's read pointer forward to `upto_message_id`, or to the
    /// latest message when `None`. Moving backward is a `Conflict`.
    async fn advance_read_pointer(
        &self,
        room_id: Uuid,
        participant_id: Uuid,
        upto_message_id: Option<Uuid>,
    ) -> ChatResult<ReadAdvance>;

    async fn total_unread_for_participant(&self, participant_id: Uuid) -> ChatResult<i64>;
}

/// Delivery to currently connected sessions. Fire-and-forget: offline recipients miss
/// the push and catch up on their next fetch.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    fn publish(&self, recipient_ids: Vec<Uuid>, event: ChatEvent);

    async fn publish_to_room(&self, room_id: Uuid, event: ChatEvent);

    fn subscribe(&self) -> broadcast::Receiver<Envelope>;
}

/// Attachment storage, keyed by owner type and owner id.
#[async_trait]
pub trait FileService: Send + Sync {
    async fn upload_files(
        &self,
        files: Vec<UploadFile>,
        owner_type_id: i64,
        owner_id: Uuid,
    ) -> anyhow::Result<Vec<FileInfo>>;

    async fn list_files(&self, owner_type_id: i64, owner_id: Uuid) -> anyhow::Result<Vec<FileInfo>>;
}
