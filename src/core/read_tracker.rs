//! Read pointers and the unread figures derived from them.

use crate::core::access::{require_active_membership, require_room};
use crate::core::error::{ChatError, ChatResult};
use crate::core::events::ChatEvent;
use crate::core::models::{ReadAdvance, ReadReceipt};
use crate::core::traits::{Broadcaster, ReadTracker};
use crate::infrastructure::database::DatabaseConnection;
use crate::infrastructure::entities::{Membership, Timestamp};
use crate::infrastructure::traits::{
    MembershipRepository, MessageRepository, ReadStateRepository, RoomRepository,
};
use async_trait::async_trait;
use di::{Ref, injectable};
use log::{debug, warn};
use uuid::Uuid;

#[injectable(ReadTracker)]
pub struct ChatReadTracker {
    db: Ref<DatabaseConnection>,
    rooms: Ref<dyn RoomRepository>,
    memberships: Ref<dyn MembershipRepository>,
    messages: Ref<dyn MessageRepository>,
    read_state: Ref<dyn ReadStateRepository>,
    broadcaster: Ref<dyn Broadcaster>,
}

fn unchanged(membership: &Membership, participant_id: Uuid) -> ReadAdvance {
    ReadAdvance {
        room_id: membership.room_id,
        participant_id,
        last_read_message_id: membership.last_read_message_id,
        advanced: false,
        receipts: Vec::new(),
    }
}

#[async_trait]
impl ReadTracker for ChatReadTracker {
    async fn unread_for(&self, room_id: Uuid, exclude_id: Uuid, at: Timestamp) -> ChatResult<i64> {
        let mut conn = self.db.acquire().await?;
        Ok(self
            .read_state
            .unread_count(&mut conn, room_id, Some(exclude_id), at)
            .await?)
    }

    async fn unread_for_all_participants(&self, room_id: Uuid, at: Timestamp) -> ChatResult<i64> {
        let mut conn = self.db.acquire().await?;
        Ok(self
            .read_state
            .unread_count(&mut conn, room_id, None, at)
            .await?)
    }

    async fn advance_read_pointer(
        &self,
        room_id: Uuid,
        participant_id: Uuid,
        upto_message_id: Option<Uuid>,
    ) -> ChatResult<ReadAdvance> {
        let mut uow = self.db.begin().await?;
        require_room(&*self.rooms, &mut uow, room_id).await?;
        let membership =
            require_active_membership(&*self.memberships, &mut uow, room_id, participant_id)
                .await?;

        let target = match upto_message_id {
            Some(message_id) => self
                .messages
                .find(&mut uow, message_id)
                .await?
                .filter(|m| m.room_id == room_id && !m.is_deleted)
                .filter(|m| m.created_at >= membership.joined_at)
                .ok_or(ChatError::NotFound("message"))?,
            None => match self
                .messages
                .latest_since(&mut uow, room_id, membership.joined_at)
                .await?
            {
                Some(latest) => latest,
                None => return Ok(unchanged(&membership, participant_id)),
            },
        };

        let current = match membership.last_read_message_id {
            Some(current_id) => self.messages.find(&mut uow, current_id).await?,
            None => None,
        };
        if let Some(current) = &current {
            if current.id == target.id {
                return Ok(unchanged(&membership, participant_id));
            }
            if current.created_at > target.created_at {
                return Err(ChatError::Conflict(
                    "read pointer cannot move backward".to_owned(),
                ));
            }
        }

        if !self
            .memberships
            .advance_read_pointer(&mut uow, membership.id, target.id, target.created_at)
            .await?
        {
            return Err(ChatError::Conflict(
                "read pointer moved concurrently".to_owned(),
            ));
        }

        let after = match &current {
            Some(current) => current.created_at.max(membership.joined_at.pred()),
            None => membership.joined_at.pred(),
        };
        let receipts: Vec<ReadReceipt> = self
            .read_state
            .receipts_between(&mut uow, room_id, after, target.created_at)
            .await?
            .into_iter()
            .map(ReadReceipt::from)
            .collect();
        uow.commit().await?;

        debug!(
            "{participant_id} read room {room_id} up to {} ({} receipts)",
            target.id,
            receipts.len()
        );
        self.broadcaster
            .publish_to_room(
                room_id,
                ChatEvent::ReadReceipts {
                    room_id,
                    reader_id: participant_id,
                    receipts: receipts.clone(),
                },
            )
            .await;
        match self.total_unread_for_participant(participant_id).await {
            Ok(total) => self
                .broadcaster
                .publish(vec![participant_id], ChatEvent::UnreadTotal { total }),
            Err(e) => warn!("could not refresh unread total for {participant_id}: {e}"),
        }

        Ok(ReadAdvance {
            room_id,
            participant_id,
            last_read_message_id: Some(target.id),
            advanced: true,
            receipts,
        })
    }

    async fn total_unread_for_participant(&self, participant_id: Uuid) -> ChatResult<i64> {
        let mut conn = self.db.acquire().await?;
        Ok(self.read_state.total_unread(&mut conn, participant_id).await?)
    }
}
