//! Room lifecycle: team and direct rooms, invitations, leaving, room lists.

use crate::core::access::{distinct_others, require_active_membership, require_participant, require_room};
use crate::core::error::{ChatError, ChatResult};
use crate::core::events::ChatEvent;
use crate::core::models::{Membership, MembershipUpdate, MessageEntry, MessagePreview, RoomSummary};
use crate::core::traits::{Broadcaster, RoomDirectory};
use crate::infrastructure::database::DatabaseConnection;
use crate::infrastructure::entities::{self, NewMessage, Participant, Room, Timestamp};
use crate::infrastructure::traits::{
    MembershipRepository, MessageRepository, ParticipantRepository, RoomRepository,
};
use async_trait::async_trait;
use di::{Ref, injectable};
use log::{debug, info, warn};
use sqlx::SqliteConnection;
use uuid::Uuid;

#[injectable(RoomDirectory)]
pub struct ChatRoomDirectory {
    db: Ref<DatabaseConnection>,
    participants: Ref<dyn ParticipantRepository>,
    rooms: Ref<dyn RoomRepository>,
    memberships: Ref<dyn MembershipRepository>,
    messages: Ref<dyn MessageRepository>,
    broadcaster: Ref<dyn Broadcaster>,
}

impl ChatRoomDirectory {
    async fn insert_direct_room(
        &self,
        conn: &mut SqliteConnection,
        direct_key: &str,
        a: &Participant,
        b: &Participant,
    ) -> ChatResult<Room> {
        let now = Timestamp::now();
        let Some(room) = self.rooms.insert_direct(&mut *conn, direct_key, now).await? else {
            // another writer committed the pair first; its room is the answer
            debug!("direct room {direct_key} already exists, reusing it");
            return self
                .rooms
                .find_direct(&mut *conn, direct_key)
                .await?
                .ok_or_else(|| ChatError::Conflict(format!("direct room {direct_key} vanished")));
        };

        for participant in [a, b] {
            self.memberships
                .insert(&mut *conn, room.id, participant.id, &participant.name, now)
                .await?;
        }

        Ok(room)
    }

    /// Pushes a freshly committed system message to the room.
    async fn announce(&self, message_id: Uuid) {
        let view = match self.db.acquire().await {
            Ok(mut conn) => self.messages.find_view(&mut conn, message_id).await,
            Err(e) => Err(e),
        };

        match view {
            Ok(Some(view)) => {
                let room_id = view.room_id;
                let message = MessageEntry::from_view(view, Vec::new());
                self.broadcaster
                    .publish_to_room(room_id, ChatEvent::MessageCreated { message })
                    .await;
            }
            Ok(None) => warn!("system message {message_id} disappeared before broadcast"),
            Err(e) => warn!("could not load system message {message_id} for broadcast: {e}"),
        }
    }
}

#[async_trait]
impl RoomDirectory for ChatRoomDirectory {
    async fn list_rooms(&self, caller_id: Uuid) -> ChatResult<Vec<RoomSummary>> {
        let mut conn = self.db.acquire().await?;
        let rows = self
            .rooms
            .list_for_participant(&mut conn, caller_id, None)
            .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let preview = self
                .messages
                .latest_since(&mut conn, row.room_id, row.joined_at)
                .await?
                .map(|message| MessagePreview {
                    content: message.content,
                    created_at: message.created_at.to_datetime(),
                });
            summaries.push(RoomSummary::from_row(row, preview));
        }

        Ok(summaries)
    }

    async fn room_summary(&self, caller_id: Uuid, room_id: Uuid) -> ChatResult<RoomSummary> {
        let mut conn = self.db.acquire().await?;
        require_room(&*self.rooms, &mut conn, room_id).await?;

        let row = self
            .rooms
            .list_for_participant(&mut conn, caller_id, Some(room_id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(ChatError::not_a_member)?;
        let preview = self
            .messages
            .latest_since(&mut conn, room_id, row.joined_at)
            .await?
            .map(|message| MessagePreview {
                content: message.content,
                created_at: message.created_at.to_datetime(),
            });

        Ok(RoomSummary::from_row(row, preview))
    }

    async fn create_team_room(
        &self,
        creator_id: Uuid,
        name: String,
        invitee_ids: Vec<Uuid>,
    ) -> ChatResult<Room> {
        let invitee_ids = distinct_others(invitee_ids, creator_id);
        if invitee_ids.is_empty() {
            return Err(ChatError::InvalidArgument(
                "a team room needs at least one invitee".to_owned(),
            ));
        }

        let mut uow = self.db.begin().await?;
        let mut members = vec![require_participant(&*self.participants, &mut uow, creator_id).await?];
        for invitee_id in &invitee_ids {
            members.push(require_participant(&*self.participants, &mut uow, *invitee_id).await?);
        }

        let names: Vec<&str> = members.iter().map(|p| p.name.as_str()).collect();
        let name = match name.trim() {
            "" => names.join(", "),
            given => given.to_owned(),
        };

        let now = Timestamp::now();
        let room = self.rooms.insert_team(&mut uow, &name, now).await?;
        let mut memberships = Vec::with_capacity(members.len());
        for member in &members {
            memberships.push(
                self.memberships
                    .insert(&mut uow, room.id, member.id, &member.name, now)
                    .await?,
            );
        }

        let greeting = NewMessage::system(
            room.id,
            format!("{} created the room and invited {}", names[0], names[1..].join(", ")),
        )
        .not_before(now);
        let greeting = self.messages.insert(&mut uow, greeting).await?;
        for membership in &memberships {
            self.memberships
                .set_read_pointer(&mut uow, membership.id, greeting.id)
                .await?;
        }
        uow.commit().await?;

        info!("team room {} created by {creator_id} with {} members", room.id, members.len());
        self.broadcaster.publish(
            members.iter().map(|p| p.id).collect(),
            ChatEvent::RoomJoined { room_id: room.id },
        );

        Ok(room)
    }

    async fn create_or_reuse_direct_room(&self, a_id: Uuid, b_id: Uuid) -> ChatResult<Room> {
        if a_id == b_id {
            return Err(ChatError::InvalidArgument(
                "a direct room needs two different participants".to_owned(),
            ));
        }

        let direct_key = Room::direct_key(a_id, b_id);
        let mut uow = self.db.begin().await?;
        let a = require_participant(&*self.participants, &mut uow, a_id).await?;
        let b = require_participant(&*self.participants, &mut uow, b_id).await?;

        let mut joined = Vec::new();
        let existing = match self.rooms.find_direct(&mut uow, &direct_key).await? {
            Some(room) if room.is_deleted => {
                debug!("direct room {} was deleted, releasing its key", room.id);
                self.rooms.release_direct_key(&mut uow, room.id).await?;
                None
            }
            Some(room) => {
                let memberships = self.memberships.list_for_room(&mut uow, room.id).await?;
                let find = |id: Uuid| memberships.iter().find(|m| m.participant_id == Some(id));

                match (find(a_id), find(b_id)) {
                    (Some(ma), Some(mb)) => {
                        for membership in [ma, mb] {
                            if membership.is_left {
                                self.memberships
                                    .reactivate(&mut uow, membership.id, Timestamp::now())
                                    .await?;
                                joined.extend(membership.participant_id);
                            }
                        }
                        Some(room)
                    }
                    _ => {
                        // one side's identity was removed; the pair gets a fresh room
                        warn!("direct room {} lost a member, releasing its key", room.id);
                        self.rooms.release_direct_key(&mut uow, room.id).await?;
                        None
                    }
                }
            }
            None => None,
        };

        let room = match existing {
            Some(room) => room,
            None => {
                joined = vec![a_id, b_id];
                self.insert_direct_room(&mut uow, &direct_key, &a, &b).await?
            }
        };
        uow.commit().await?;

        debug!("direct room {} serves {a_id} and {b_id}", room.id);
        self.broadcaster
            .publish(joined, ChatEvent::RoomJoined { room_id: room.id });

        Ok(room)
    }

    async fn invite(
        &self,
        room_id: Uuid,
        inviter_id: Uuid,
        invitee_ids: Vec<Uuid>,
    ) -> ChatResult<()> {
        let invitee_ids = distinct_others(invitee_ids, inviter_id);
        if invitee_ids.is_empty() {
            return Err(ChatError::InvalidArgument("no one to invite".to_owned()));
        }

        let mut uow = self.db.begin().await?;
        let room = require_room(&*self.rooms, &mut uow, room_id).await?;
        let inviter =
            require_active_membership(&*self.memberships, &mut uow, room_id, inviter_id).await?;
        let existing = self.memberships.list_for_room(&mut uow, room_id).await?;

        let mut returning: Vec<&entities::Membership> = Vec::new();
        let mut newcomers: Vec<Participant> = Vec::new();
        for invitee_id in invitee_ids {
            let participant =
                require_participant(&*self.participants, &mut uow, invitee_id).await?;
            match existing
                .iter()
                .find(|m| m.participant_id == Some(invitee_id))
            {
                Some(membership) if !membership.is_left => {}
                Some(membership) => returning.push(membership),
                None => newcomers.push(participant),
            }
        }
        if returning.is_empty() && newcomers.is_empty() {
            debug!("every invitee is already in room {room_id}");
            return Ok(());
        }

        let active_before = existing.iter().filter(|m| m.is_active()).count();
        let active_after = active_before + returning.len() + newcomers.len();
        // a direct room never gets a third membership row
        if !room.is_team && (active_after > 2 || !newcomers.is_empty()) {
            let mut names: Vec<&str> = existing
                .iter()
                .filter(|m| m.is_active())
                .map(|m| m.display_name.as_str())
                .collect();
            names.extend(returning.iter().map(|m| m.display_name.as_str()));
            names.extend(newcomers.iter().map(|p| p.name.as_str()));
            self.rooms
                .promote_to_team(&mut uow, room_id, &names.join(", "))
                .await?;
            info!("room {room_id} promoted to a team room");
        }

        let now = Timestamp::now();
        let mut joined = Vec::with_capacity(returning.len() + newcomers.len());
        for membership in &returning {
            joined.push(self.memberships.reactivate(&mut uow, membership.id, now).await?);
        }
        for participant in &newcomers {
            joined.push(
                self.memberships
                    .insert(&mut uow, room_id, participant.id, &participant.name, now)
                    .await?,
            );
        }

        let invited_names: Vec<&str> = joined.iter().map(|m| m.display_name.as_str()).collect();
        let floor = joined.iter().map(|m| m.joined_at).max().unwrap_or(now);
        let notice = NewMessage::system(
            room_id,
            format!("{} invited {}", inviter.display_name, invited_names.join(", ")),
        )
        .not_before(floor);
        let notice = self.messages.insert(&mut uow, notice).await?;
        for membership in &joined {
            self.memberships
                .set_read_pointer(&mut uow, membership.id, notice.id)
                .await?;
        }
        let member_count = self.memberships.count_active(&mut uow, room_id).await?;
        uow.commit().await?;

        info!("{inviter_id} invited {} participants to room {room_id}", joined.len());
        self.announce(notice.id).await;
        self.broadcaster
            .publish_to_room(room_id, ChatEvent::MembersChanged { room_id, member_count })
            .await;
        self.broadcaster.publish(
            joined.iter().filter_map(|m| m.participant_id).collect(),
            ChatEvent::RoomJoined { room_id },
        );

        Ok(())
    }

    async fn leave(&self, room_id: Uuid, participant_id: Uuid) -> ChatResult<()> {
        let mut uow = self.db.begin().await?;
        let room = require_room(&*self.rooms, &mut uow, room_id).await?;
        let membership =
            require_active_membership(&*self.memberships, &mut uow, room_id, participant_id)
                .await?;

        self.memberships.mark_left(&mut uow, membership.id).await?;
        let member_count = self.memberships.count_active(&mut uow, room_id).await?;
        let notice = if room.is_team && member_count > 0 {
            let notice =
                NewMessage::system(room_id, format!("{} left the room", membership.display_name));
            Some(self.messages.insert(&mut uow, notice).await?)
        } else {
            None
        };
        uow.commit().await?;

        info!("{participant_id} left room {room_id}");
        self.broadcaster
            .publish(vec![participant_id], ChatEvent::RoomLeft { room_id });
        if let Some(notice) = notice {
            self.announce(notice.id).await;
        }
        self.broadcaster
            .publish_to_room(room_id, ChatEvent::MembersChanged { room_id, member_count })
            .await;

        Ok(())
    }

    async fn update_membership(
        &self,
        room_id: Uuid,
        participant_id: Uuid,
        update: MembershipUpdate,
    ) -> ChatResult<Membership> {
        let display_name = match update.display_name.as_deref().map(str::trim) {
            Some("") => {
                return Err(ChatError::InvalidArgument(
                    "display name must not be blank".to_owned(),
                ));
            }
            other => other,
        };

        let mut uow = self.db.begin().await?;
        require_room(&*self.rooms, &mut uow, room_id).await?;
        let membership =
            require_active_membership(&*self.memberships, &mut uow, room_id, participant_id)
                .await?;
        let membership = self
            .memberships
            .update_settings(&mut uow, membership.id, display_name, update.is_notify)
            .await?;
        uow.commit().await?;

        Ok(membership.into())
    }
}
