//! DB Repository abstractions

use crate::infrastructure::entities::{
    Membership, Message, MessageView, NewMessage, Participant, ReadReceiptRow, Room, RoomListRow,
    Timestamp,
};
use crate::infrastructure::traits::{
    MembershipRepository, MessageRepository, ParticipantRepository, ReadStateRepository,
    RepoResult, RoomRepository,
};
use async_trait::async_trait;
use di::{inject, injectable};
use sqlx::SqliteConnection;
use uuid::Uuid;

const MEMBERSHIP_COLUMNS: &str = "id, room_id, participant_id, display_name, joined_at, is_left, is_notify, last_read_message_id";

const MESSAGE_COLUMNS: &str = "id, room_id, message_type, author_id, content, created_at, is_deleted";

/// Number of active members who have not read message `m` yet.
///
/// Correlated on an outer `messages m`.
const UNREAD_BY: &str = "(SELECT COUNT(*) FROM memberships mb \
    WHERE mb.room_id = m.room_id AND mb.is_left = 0 AND mb.participant_id IS NOT NULL \
    AND mb.joined_at <= m.created_at \
    AND (mb.last_read_message_id IS NULL \
        OR (SELECT lr.created_at FROM messages lr WHERE lr.id = mb.last_read_message_id) < m.created_at))";

fn message_view_query(filter: &str) -> String {
    format!(
        "SELECT m.id, m.room_id, m.message_type, m.author_id, \
            CASE WHEN m.author_id IS NULL THEN NULL ELSE COALESCE( \
                (SELECT am.display_name FROM memberships am \
                    WHERE am.room_id = m.room_id AND am.participant_id = m.author_id), \
                (SELECT p.name FROM participants p WHERE p.id = m.author_id)) END AS author_name, \
            m.content, m.created_at, {UNREAD_BY} AS unread_count \
        FROM messages m {filter}"
    )
}

pub struct DbParticipantRepository;

#[injectable(ParticipantRepository)]
impl DbParticipantRepository {
    #[inject]
    pub fn create() -> DbParticipantRepository {
        DbParticipantRepository
    }
}

#[async_trait]
impl ParticipantRepository for DbParticipantRepository {
    async fn upsert(
        &self,
        conn: &mut SqliteConnection,
        participant_id: Uuid,
        name: &str,
    ) -> RepoResult<Participant> {
        sqlx::query_as(
            "INSERT INTO participants (id, name, created_at) VALUES (?, ?, ?) \
            ON CONFLICT (id) DO UPDATE SET name = excluded.name RETURNING id, name, created_at",
        )
        .bind(participant_id)
        .bind(name)
        .bind(Timestamp::now())
        .fetch_one(&mut *conn)
        .await
    }

    async fn find(
        &self,
        conn: &mut SqliteConnection,
        participant_id: Uuid,
    ) -> RepoResult<Option<Participant>> {
        sqlx::query_as("SELECT id, name, created_at FROM participants WHERE id = ?")
            .bind(participant_id)
            .fetch_optional(&mut *conn)
            .await
    }

    async fn delete(&self, conn: &mut SqliteConnection, participant_id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM participants WHERE id = ?")
            .bind(participant_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

pub struct DbRoomRepository;

#[injectable(RoomRepository)]
impl DbRoomRepository {
    #[inject]
    pub fn create() -> DbRoomRepository {
        DbRoomRepository
    }
}

#[async_trait]
impl RoomRepository for DbRoomRepository {
    async fn find(&self, conn: &mut SqliteConnection, room_id: Uuid) -> RepoResult<Option<Room>> {
        sqlx::query_as("SELECT * FROM rooms WHERE id = ?")
            .bind(room_id)
            .fetch_optional(&mut *conn)
            .await
    }

    async fn find_direct(
        &self,
        conn: &mut SqliteConnection,
        direct_key: &str,
    ) -> RepoResult<Option<Room>> {
        sqlx::query_as("SELECT * FROM rooms WHERE direct_key = ? AND is_team = 0")
            .bind(direct_key)
            .fetch_optional(&mut *conn)
            .await
    }

    async fn insert_team(
        &self,
        conn: &mut SqliteConnection,
        name: &str,
        created_at: Timestamp,
    ) -> RepoResult<Room> {
        sqlx::query_as(
            "INSERT INTO rooms (id, is_team, name, direct_key, created_at, is_deleted) \
            VALUES (?, 1, ?, NULL, ?, 0) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(created_at)
        .fetch_one(&mut *conn)
        .await
    }

    async fn insert_direct(
        &self,
        conn: &mut SqliteConnection,
        direct_key: &str,
        created_at: Timestamp,
    ) -> RepoResult<Option<Room>> {
        sqlx::query_as(
            "INSERT INTO rooms (id, is_team, name, direct_key, created_at, is_deleted) \
            VALUES (?, 0, '', ?, ?, 0) ON CONFLICT (direct_key) DO NOTHING RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(direct_key)
        .bind(created_at)
        .fetch_optional(&mut *conn)
        .await
    }

    async fn promote_to_team(
        &self,
        conn: &mut SqliteConnection,
        room_id: Uuid,
        fallback_name: &str,
    ) -> RepoResult<bool> {
        let result = sqlx::query(
            "UPDATE rooms SET is_team = 1, direct_key = NULL, \
                name = CASE WHEN name = '' THEN ? ELSE name END \
            WHERE id = ? AND is_team = 0",
        )
        .bind(fallback_name)
        .bind(room_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn release_direct_key(
        &self,
        conn: &mut SqliteConnection,
        room_id: Uuid,
    ) -> RepoResult<()> {
        sqlx::query("UPDATE rooms SET direct_key = NULL WHERE id = ?")
            .bind(room_id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    async fn list_for_participant(
        &self,
        conn: &mut SqliteConnection,
        participant_id: Uuid,
        room_id: Option<Uuid>,
    ) -> RepoResult<Vec<RoomListRow>> {
        sqlx::query_as(
            "SELECT r.id AS room_id, r.is_team, r.name, r.created_at AS room_created_at, mb.joined_at, \
                (SELECT COUNT(*) FROM memberships a \
                    WHERE a.room_id = r.id AND a.is_left = 0 AND a.participant_id IS NOT NULL) AS member_count, \
                (SELECT o.participant_id FROM memberships o \
                    WHERE o.room_id = r.id AND o.id <> mb.id ORDER BY o.joined_at LIMIT 1) AS counterpart_id, \
                (SELECT o.display_name FROM memberships o \
                    WHERE o.room_id = r.id AND o.id <> mb.id ORDER BY o.joined_at LIMIT 1) AS counterpart_name, \
                (SELECT COUNT(*) FROM messages m \
                    WHERE m.room_id = r.id AND m.is_deleted = 0 AND m.message_type = 1 \
                    AND m.author_id IS NOT NULL AND m.author_id <> mb.participant_id \
                    AND m.created_at >= mb.joined_at \
                    AND (mb.last_read_message_id IS NULL \
                        OR m.created_at > (SELECT lr.created_at FROM messages lr WHERE lr.id = mb.last_read_message_id))) AS unread_count, \
                COALESCE((SELECT MAX(m.created_at) FROM messages m \
                    WHERE m.room_id = r.id AND m.is_deleted = 0 AND m.created_at >= mb.joined_at), r.created_at) AS last_activity_at \
            FROM memberships mb \
            INNER JOIN rooms r ON r.id = mb.room_id \
            WHERE mb.participant_id = ?1 AND mb.is_left = 0 AND r.is_deleted = 0 \
                AND (?2 IS NULL OR r.id = ?2) \
            ORDER BY last_activity_at DESC",
        )
        .bind(participant_id)
        .bind(room_id)
        .fetch_all(&mut *conn)
        .await
    }
}

pub struct DbMembershipRepository;

#[injectable(MembershipRepository)]
impl DbMembershipRepository {
    #[inject]
    pub fn create() -> DbMembershipRepository {
        DbMembershipRepository
    }
}

#[async_trait]
impl MembershipRepository for DbMembershipRepository {
    async fn find(
        &self,
        conn: &mut SqliteConnection,
        room_id: Uuid,
        participant_id: Uuid,
    ) -> RepoResult<Option<Membership>> {
        sqlx::query_as(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE room_id = ? AND participant_id = ?"
        ))
        .bind(room_id)
        .bind(participant_id)
        .fetch_optional(&mut *conn)
        .await
    }

    async fn list_for_room(
        &self,
        conn: &mut SqliteConnection,
        room_id: Uuid,
    ) -> RepoResult<Vec<Membership>> {
        sqlx::query_as(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE room_id = ? ORDER BY joined_at ASC, rowid ASC"
        ))
        .bind(room_id)
        .fetch_all(&mut *conn)
        .await
    }

    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        room_id: Uuid,
        participant_id: Uuid,
        display_name: &str,
        joined_at: Timestamp,
    ) -> RepoResult<Membership> {
        sqlx::query_as(&format!(
            "INSERT INTO memberships (id, room_id, participant_id, display_name, joined_at, is_left, is_notify) \
            VALUES (?, ?, ?, ?, ?, 0, 1) RETURNING {MEMBERSHIP_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(room_id)
        .bind(participant_id)
        .bind(display_name)
        .bind(joined_at)
        .fetch_one(&mut *conn)
        .await
    }

    async fn reactivate(
        &self,
        conn: &mut SqliteConnection,
        membership_id: Uuid,
        now: Timestamp,
    ) -> RepoResult<Membership> {
        sqlx::query_as(&format!(
            "UPDATE memberships SET is_left = 0, last_read_message_id = NULL, \
                joined_at = MAX(?1, joined_at + 1, \
                    COALESCE((SELECT MAX(m.created_at) FROM messages m WHERE m.room_id = memberships.room_id), 0) + 1) \
            WHERE id = ?2 RETURNING {MEMBERSHIP_COLUMNS}"
        ))
        .bind(now)
        .bind(membership_id)
        .fetch_one(&mut *conn)
        .await
    }

    async fn mark_left(&self, conn: &mut SqliteConnection, membership_id: Uuid) -> RepoResult<()> {
        sqlx::query("UPDATE memberships SET is_left = 1 WHERE id = ?")
            .bind(membership_id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    async fn update_settings(
        &self,
        conn: &mut SqliteConnection,
        membership_id: Uuid,
        display_name: Option<&str>,
        is_notify: Option<bool>,
    ) -> RepoResult<Membership> {
        sqlx::query_as(&format!(
            "UPDATE memberships SET display_name = COALESCE(?1, display_name), \
                is_notify = COALESCE(?2, is_notify) \
            WHERE id = ?3 RETURNING {MEMBERSHIP_COLUMNS}"
        ))
        .bind(display_name)
        .bind(is_notify)
        .bind(membership_id)
        .fetch_one(&mut *conn)
        .await
    }

    async fn set_read_pointer(
        &self,
        conn: &mut SqliteConnection,
        membership_id: Uuid,
        message_id: Uuid,
    ) -> RepoResult<()> {
        sqlx::query("UPDATE memberships SET last_read_message_id = ? WHERE id = ?")
            .bind(message_id)
            .bind(membership_id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    async fn advance_read_pointer(
        &self,
        conn: &mut SqliteConnection,
        membership_id: Uuid,
        message_id: Uuid,
        created_at: Timestamp,
    ) -> RepoResult<bool> {
        let result = sqlx::query(
            "UPDATE memberships SET last_read_message_id = ?1 \
            WHERE id = ?2 AND is_left = 0 \
                AND (last_read_message_id IS NULL \
                    OR (SELECT lr.created_at FROM messages lr WHERE lr.id = memberships.last_read_message_id) < ?3)",
        )
        .bind(message_id)
        .bind(membership_id)
        .bind(created_at)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn count_active(&self, conn: &mut SqliteConnection, room_id: Uuid) -> RepoResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM memberships \
            WHERE room_id = ? AND is_left = 0 AND participant_id IS NOT NULL",
        )
        .bind(room_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(count)
    }

    async fn active_participants(
        &self,
        conn: &mut SqliteConnection,
        room_id: Uuid,
    ) -> RepoResult<Vec<Uuid>> {
        sqlx::query_scalar(
            "SELECT participant_id FROM memberships \
            WHERE room_id = ? AND is_left = 0 AND participant_id IS NOT NULL",
        )
        .bind(room_id)
        .fetch_all(&mut *conn)
        .await
    }
}

pub struct DbMessageRepository;

#[injectable(MessageRepository)]
impl DbMessageRepository {
    #[inject]
    pub fn create() -> DbMessageRepository {
        DbMessageRepository
    }
}

#[async_trait]
impl MessageRepository for DbMessageRepository {
    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        message: NewMessage,
    ) -> RepoResult<Message> {
        // created_at is strictly increasing within a room, whatever the clock says
        sqlx::query_as(&format!(
            "INSERT INTO messages (id, room_id, message_type, author_id, content, created_at, is_deleted) \
            VALUES (?1, ?2, ?3, ?4, ?5, \
                MAX(?6, COALESCE((SELECT MAX(created_at) FROM messages WHERE room_id = ?2), 0) + 1), 0) \
            RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(message.id)
        .bind(message.room_id)
        .bind(message.message_type)
        .bind(message.author_id)
        .bind(message.content)
        .bind(message.not_before)
        .fetch_one(&mut *conn)
        .await
    }

    async fn find(
        &self,
        conn: &mut SqliteConnection,
        message_id: Uuid,
    ) -> RepoResult<Option<Message>> {
        sqlx::query_as(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"))
            .bind(message_id)
            .fetch_optional(&mut *conn)
            .await
    }

    async fn find_view(
        &self,
        conn: &mut SqliteConnection,
        message_id: Uuid,
    ) -> RepoResult<Option<MessageView>> {
        sqlx::query_as(&message_view_query("WHERE m.id = ?"))
            .bind(message_id)
            .fetch_optional(&mut *conn)
            .await
    }

    async fn latest_since(
        &self,
        conn: &mut SqliteConnection,
        room_id: Uuid,
        since: Timestamp,
    ) -> RepoResult<Option<Message>> {
        sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
            WHERE room_id = ? AND is_deleted = 0 AND created_at >= ? \
            ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(room_id)
        .bind(since)
        .fetch_optional(&mut *conn)
        .await
    }

    async fn page(
        &self,
        conn: &mut SqliteConnection,
        room_id: Uuid,
        since: Timestamp,
        before: Option<Timestamp>,
        limit: u32,
    ) -> RepoResult<Vec<MessageView>> {
        sqlx::query_as(&message_view_query(
            "WHERE m.room_id = ?1 AND m.is_deleted = 0 AND m.created_at >= ?2 \
                AND (?3 IS NULL OR m.created_at < ?3) \
            ORDER BY m.created_at DESC LIMIT ?4",
        ))
        .bind(room_id)
        .bind(since)
        .bind(before)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await
    }
}

pub struct DbReadStateRepository;

#[injectable(ReadStateRepository)]
impl DbReadStateRepository {
    #[inject]
    pub fn create() -> DbReadStateRepository {
        DbReadStateRepository
    }
}

#[async_trait]
impl ReadStateRepository for DbReadStateRepository {
    async fn unread_count(
        &self,
        conn: &mut SqliteConnection,
        room_id: Uuid,
        exclude: Option<Uuid>,
        at: Timestamp,
    ) -> RepoResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM memberships mb \
            WHERE mb.room_id = ?1 AND mb.is_left = 0 AND mb.participant_id IS NOT NULL \
                AND (?2 IS NULL OR mb.participant_id <> ?2) \
                AND mb.joined_at <= ?3 \
                AND (mb.last_read_message_id IS NULL \
                    OR (SELECT lr.created_at FROM messages lr WHERE lr.id = mb.last_read_message_id) < ?3)",
        )
        .bind(room_id)
        .bind(exclude)
        .bind(at)
        .fetch_one(&mut *conn)
        .await?;

        Ok(count)
    }

    async fn receipts_between(
        &self,
        conn: &mut SqliteConnection,
        room_id: Uuid,
        after: Timestamp,
        upto: Timestamp,
    ) -> RepoResult<Vec<ReadReceiptRow>> {
        sqlx::query_as(&format!(
            "SELECT m.id AS message_id, {UNREAD_BY} AS unread_count FROM messages m \
            WHERE m.room_id = ? AND m.is_deleted = 0 AND m.created_at > ? AND m.created_at <= ? \
            ORDER BY m.created_at ASC"
        ))
        .bind(room_id)
        .bind(after)
        .bind(upto)
        .fetch_all(&mut *conn)
        .await
    }

    async fn total_unread(
        &self,
        conn: &mut SqliteConnection,
        participant_id: Uuid,
    ) -> RepoResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM memberships mb \
            INNER JOIN rooms r ON r.id = mb.room_id \
            INNER JOIN messages m ON m.room_id = mb.room_id \
            WHERE mb.participant_id = ?1 AND mb.is_left = 0 AND r.is_deleted = 0 \
                AND m.is_deleted = 0 AND m.message_type = 1 \
                AND m.author_id IS NOT NULL AND m.author_id <> ?1 \
                AND m.created_at >= mb.joined_at \
                AND (mb.last_read_message_id IS NULL \
                    OR m.created_at > (SELECT lr.created_at FROM messages lr WHERE lr.id = mb.last_read_message_id))",
        )
        .bind(participant_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(count)
    }
}
