//! Append-only message history of a room.

use crate::config::Settings;
use crate::core::access::{require_active_membership, require_room};
use crate::core::error::{ChatError, ChatResult};
use crate::core::events::ChatEvent;
use crate::core::models::{MESSAGE_ATTACHMENT_OWNER_TYPE, MessageEntry, MessageKind, UploadFile};
use crate::core::traits::{Broadcaster, FileService, MessageLog, ReadTracker};
use crate::infrastructure::database::DatabaseConnection;
use crate::infrastructure::entities::{Message, NewMessage, Timestamp};
use crate::infrastructure::traits::{MembershipRepository, MessageRepository, RoomRepository};
use async_trait::async_trait;
use di::{Ref, injectable};
use log::{debug, warn};
use uuid::Uuid;

#[injectable(MessageLog)]
pub struct ChatMessageLog {
    settings: Ref<Settings>,
    db: Ref<DatabaseConnection>,
    rooms: Ref<dyn RoomRepository>,
    memberships: Ref<dyn MembershipRepository>,
    messages: Ref<dyn MessageRepository>,
    files: Ref<dyn FileService>,
    read_tracker: Ref<dyn ReadTracker>,
    broadcaster: Ref<dyn Broadcaster>,
}

impl ChatMessageLog {
    fn validate(&self, message: &NewMessage, attachments: &[UploadFile]) -> ChatResult<()> {
        if message.content.trim().is_empty() && attachments.is_empty() {
            return Err(ChatError::InvalidArgument(
                "message must have content or attachments".to_owned(),
            ));
        }

        let limit = self.settings.max_message_length;
        if message.content.chars().count() > limit {
            return Err(ChatError::InvalidArgument(format!(
                "message is longer than {limit} characters"
            )));
        }

        Ok(())
    }

    async fn check_access(&self, room_id: Uuid, author_id: Option<Uuid>) -> ChatResult<()> {
        let mut conn = self.db.acquire().await?;
        require_room(&*self.rooms, &mut conn, room_id).await?;
        if let Some(author_id) = author_id {
            require_active_membership(&*self.memberships, &mut conn, room_id, author_id).await?;
        }

        Ok(())
    }

    /// Inserts the message and moves its author's read pointer onto it.
    async fn store(&self, message: NewMessage) -> ChatResult<Message> {
        let mut uow = self.db.begin().await?;
        // membership may have changed while attachments were uploading
        require_room(&*self.rooms, &mut uow, message.room_id).await?;
        let author = match message.author_id {
            Some(author_id) => Some(
                require_active_membership(&*self.memberships, &mut uow, message.room_id, author_id)
                    .await?,
            ),
            None => None,
        };

        let stored = self.messages.insert(&mut uow, message).await?;
        if let Some(author) = author {
            self.memberships
                .advance_read_pointer(&mut uow, author.id, stored.id, stored.created_at)
                .await?;
        }
        uow.commit().await?;

        Ok(stored)
    }
}

#[async_trait]
impl MessageLog for ChatMessageLog {
    async fn append(
        &self,
        room_id: Uuid,
        author_id: Option<Uuid>,
        kind: MessageKind,
        content: String,
        attachments: Vec<UploadFile>,
    ) -> ChatResult<MessageEntry> {
        let message = NewMessage::new(room_id, kind.into(), author_id, content)?;
        self.validate(&message, &attachments)?;
        self.check_access(room_id, message.author_id).await?;

        let message_id = message.id;
        let uploaded = self
            .files
            .upload_files(attachments, MESSAGE_ATTACHMENT_OWNER_TYPE, message_id)
            .await
            .map_err(ChatError::Attachments)?;

        let stored = match self.store(message).await {
            Ok(stored) => stored,
            Err(e) => {
                if !uploaded.is_empty() {
                    warn!(
                        "message {message_id} was not stored, {} attachments are orphaned",
                        uploaded.len()
                    );
                }
                return Err(e);
            }
        };

        let unread_count = match stored.author_id {
            Some(author_id) => {
                self.read_tracker
                    .unread_for(room_id, author_id, stored.created_at)
                    .await?
            }
            None => {
                self.read_tracker
                    .unread_for_all_participants(room_id, stored.created_at)
                    .await?
            }
        };

        let mut conn = self.db.acquire().await?;
        let view = self
            .messages
            .find_view(&mut conn, stored.id)
            .await?
            .ok_or(ChatError::NotFound("message"))?;
        drop(conn);

        let mut entry = MessageEntry::from_view(view, uploaded);
        entry.unread_count = unread_count;

        debug!("message {} appended to room {room_id}", entry.id);
        self.broadcaster
            .publish_to_room(
                room_id,
                ChatEvent::MessageCreated {
                    message: entry.clone(),
                },
            )
            .await;

        Ok(entry)
    }

    async fn list(
        &self,
        room_id: Uuid,
        participant_id: Uuid,
        before: Option<String>,
        page_size: Option<u32>,
    ) -> ChatResult<Vec<MessageEntry>> {
        let page_size = page_size.unwrap_or(self.settings.default_page_size);
        if page_size == 0 || page_size > self.settings.max_page_size {
            return Err(ChatError::InvalidArgument(format!(
                "page size must be between 1 and {}",
                self.settings.max_page_size
            )));
        }

        let mut conn = self.db.acquire().await?;
        require_room(&*self.rooms, &mut conn, room_id).await?;
        let membership =
            require_active_membership(&*self.memberships, &mut conn, room_id, participant_id)
                .await?;

        let before = match before.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(cursor) => {
                let cursor_id = Uuid::parse_str(cursor).map_err(|_| {
                    ChatError::InvalidArgument(format!("invalid page cursor {cursor}"))
                })?;
                let cursor = self
                    .messages
                    .find(&mut conn, cursor_id)
                    .await?
                    .filter(|m| m.room_id == room_id)
                    .ok_or(ChatError::NotFound("message"))?;
                Some(cursor.created_at)
            }
            None => None,
        };

        let views = self
            .messages
            .page(&mut conn, room_id, membership.joined_at, before, page_size)
            .await?;
        drop(conn);

        let mut entries = Vec::with_capacity(views.len());
        for view in views {
            let attachments = self
                .files
                .list_files(MESSAGE_ATTACHMENT_OWNER_TYPE, view.id)
                .await
                .map_err(ChatError::Attachments)?;
            entries.push(MessageEntry::from_view(view, attachments));
        }

        Ok(entries)
    }

    async fn latest_since(&self, room_id: Uuid, since: Timestamp) -> ChatResult<Option<Message>> {
        let mut conn = self.db.acquire().await?;
        Ok(self.messages.latest_since(&mut conn, room_id, since).await?)
    }
}
