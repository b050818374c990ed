//! Infrastructure traits, used for DI on higher levels
//!
//! Every method takes the connection to run on, so a service can compose several
//! repositories inside one [`UnitOfWork`](crate::infrastructure::database::UnitOfWork).

use crate::infrastructure::entities::{
    Membership, Message, MessageView, NewMessage, Participant, ReadReceiptRow, Room, RoomListRow,
    Timestamp,
};
use async_trait::async_trait;
use sqlx::SqliteConnection;
use uuid::Uuid;

pub type RepoResult<T> = Result<T, sqlx::Error>;

#[async_trait]
pub trait ParticipantRepository: Send + Sync {
    async fn upsert(
        &self,
        conn: &mut SqliteConnection,
        participant_id: Uuid,
        name: &str,
    ) -> RepoResult<Participant>;

    async fn find(
        &self,
        conn: &mut SqliteConnection,
        participant_id: Uuid,
    ) -> RepoResult<Option<Participant>>;

    /// Returns `false` if there was nothing to delete.
    async fn delete(&self, conn: &mut SqliteConnection, participant_id: Uuid) -> RepoResult<bool>;
}

#[async_trait]
pub trait RoomRepository: Send + Sync {
    async fn find(&self, conn: &mut SqliteConnection, room_id: Uuid) -> RepoResult<Option<Room>>;

    /// The room holding `direct_key`, deleted or not.
    async fn find_direct(
        &self,
        conn: &mut SqliteConnection,
        direct_key: &str,
    ) -> RepoResult<Option<Room>>;

    async fn insert_team(
        &self,
        conn: &mut SqliteConnection,
        name: &str,
        created_at: Timestamp,
    ) -> RepoResult<Room>;

    /// Inserts a direct room unless one already holds `direct_key`.
    ///
    /// Returns `None` when another writer won the key.
    async fn insert_direct(
        &self,
        conn: &mut SqliteConnection,
        direct_key: &str,
        created_at: Timestamp,
    ) -> RepoResult<Option<Room>>;

    /// Turns a direct room into a team room and frees its pair key. Returns `false` if
    /// the room already was a team room.
    async fn promote_to_team(
        &self,
        conn: &mut SqliteConnection,
        room_id: Uuid,
        fallback_name: &str,
    ) -> RepoResult<bool>;

    async fn release_direct_key(&self, conn: &mut SqliteConnection, room_id: Uuid)
    -> RepoResult<()>;

    /// Room list lines for an active participant; `room_id` narrows it to one room.
    async fn list_for_participant(
        &self,
        conn: &mut SqliteConnection,
        participant_id: Uuid,
        room_id: Option<Uuid>,
    ) -> RepoResult<Vec<RoomListRow>>;
}

#[async_trait]
pub trait MembershipRepository: Send + Sync {
    async fn find(
        &self,
        conn: &mut SqliteConnection,
        room_id: Uuid,
        participant_id: Uuid,
    ) -> RepoResult<Option<Membership>>;

    async fn list_for_room(
        &self,
        conn: &mut SqliteConnection,
        room_id: Uuid,
    ) -> RepoResult<Vec<Membership>>;

    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        room_id: Uuid,
        participant_id: Uuid,
        display_name: &str,
        joined_at: Timestamp,
    ) -> RepoResult<Membership>;

    /// Clears `is_left` and moves the visibility floor past everything already in the
    /// room. The stale read pointer is dropped.
    async fn reactivate(
        &self,
        conn: &mut SqliteConnection,
        membership_id: Uuid,
        now: Timestamp,
    ) -> RepoResult<Membership>;

    async fn mark_left(&self, conn: &mut SqliteConnection, membership_id: Uuid) -> RepoResult<()>;

    async fn update_settings(
        &self,
        conn: &mut SqliteConnection,
        membership_id: Uuid,
        display_name: Option<&str>,
        is_notify: Option<bool>,
    ) -> RepoResult<Membership>;

    /// Points the read pointer at `message_id` unconditionally.
    async fn set_read_pointer(
        &self,
        conn: &mut SqliteConnection,
        membership_id: Uuid,
        message_id: Uuid,
    ) -> RepoResult<()>;

    /// Compare-and-set: moves the read pointer to `message_id` only if the current
    /// pointer is unset or older than `created_at`.
    async fn advance_read_pointer(
        &self,
        conn: &mut SqliteConnection,
        membership_id: Uuid,
        message_id: Uuid,
        created_at: Timestamp,
    ) -> RepoResult<bool>;

    async fn count_active(&self, conn: &mut SqliteConnection, room_id: Uuid) -> RepoResult<i64>;

    async fn active_participants(
        &self,
        conn: &mut SqliteConnection,
        room_id: Uuid,
    ) -> RepoResult<Vec<Uuid>>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, conn: &mut SqliteConnection, message: NewMessage)
    -> RepoResult<Message>;

    async fn find(&self, conn: &mut SqliteConnection, message_id: Uuid)
    -> RepoResult<Option<Message>>;

    async fn find_view(
        &self,
        conn: &mut SqliteConnection,
        message_id: Uuid,
    ) -> RepoResult<Option<MessageView>>;

    /// Most recent non-deleted message created at or after `since`.
    async fn latest_since(
        &self,
        conn: &mut SqliteConnection,
        room_id: Uuid,
        since: Timestamp,
    ) -> RepoResult<Option<Message>>;

    /// Newest-first page of messages with `since <= created_at < before`.
    async fn page(
        &self,
        conn: &mut SqliteConnection,
        room_id: Uuid,
        since: Timestamp,
        before: Option<Timestamp>,
        limit: u32,
    ) -> RepoResult<Vec<MessageView>>;
}

/// Derived read state. Nothing here is stored; every figure is recomputed from
/// memberships, read pointers and message timestamps.
#[async_trait]
pub trait ReadStateRepository: Send + Sync {
    /// Active members (other than `exclude`) who joined by `at` and whose read pointer
    /// is older than `at`.
    async fn unread_count(
        &self,
        conn: &mut SqliteConnection,
        room_id: Uuid,
        exclude: Option<Uuid>,
        at: Timestamp,
    ) -> RepoResult<i64>;

    /// Unread-by counts for every message with `after < created_at <= upto`.
    async fn receipts_between(
        &self,
        conn: &mut SqliteConnection,
        room_id: Uuid,
        after: Timestamp,
        upto: Timestamp,
    ) -> RepoResult<Vec<ReadReceiptRow>>;

    /// Unseen user messages by others, summed over all of the participant's active rooms.
    async fn total_unread(&self, conn: &mut SqliteConnection, participant_id: Uuid)
    -> RepoResult<i64>;
}
