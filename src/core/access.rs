//! Lookups shared by the services that turn missing rows into typed errors.

use crate::core::error::{ChatError, ChatResult};
use crate::infrastructure::entities::{Membership, Participant, Room};
use crate::infrastructure::traits::{MembershipRepository, ParticipantRepository, RoomRepository};
use sqlx::SqliteConnection;
use uuid::Uuid;

/// The room, unless it is missing or soft-deleted.
pub(crate) async fn require_room(
    rooms: &dyn RoomRepository,
    conn: &mut SqliteConnection,
    room_id: Uuid,
) -> ChatResult<Room> {
    rooms
        .find(conn, room_id)
        .await?
        .filter(|room| !room.is_deleted)
        .ok_or(ChatError::NotFound("room"))
}

pub(crate) async fn require_active_membership(
    memberships: &dyn MembershipRepository,
    conn: &mut SqliteConnection,
    room_id: Uuid,
    participant_id: Uuid,
) -> ChatResult<Membership> {
    memberships
        .find(conn, room_id, participant_id)
        .await?
        .filter(Membership::is_active)
        .ok_or_else(ChatError::not_a_member)
}

pub(crate) async fn require_participant(
    participants: &dyn ParticipantRepository,
    conn: &mut SqliteConnection,
    participant_id: Uuid,
) -> ChatResult<Participant> {
    participants
        .find(conn, participant_id)
        .await?
        .ok_or(ChatError::NotFound("participant"))
}

/// Drops duplicates and `exclude`, keeping first-seen order.
pub(crate) fn distinct_others(ids: Vec<Uuid>, exclude: Uuid) -> Vec<Uuid> {
    let mut seen = Vec::with_capacity(ids.len());
    for id in ids {
        if id != exclude && !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}
