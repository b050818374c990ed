//! Room, message and read-state endpoints

use crate::api::ExtractUser;
use crate::api::rooms::schemas::{
    Attachment, CreateDirectRoom, CreateMessage, CreateTeamRoom, InviteParticipants,
    MarkRead, MessagesList, PageQuery, RoomList, UpdateMembership,
};
use crate::core::error::ChatError;
use crate::core::models::{
    Membership, MembershipUpdate, MessageEntry, MessageKind, ReadAdvance, RoomSummary, UploadFile,
};
use crate::core::traits::{MessageLog, ReadTracker, RoomDirectory};
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use di_axum::Inject;
use uuid::Uuid;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_rooms).post(create_team_room))
        .route("/direct", post(open_direct_room))
        .route("/:id", get(room_summary))
        .route("/:id/invite", post(invite))
        .route("/:id/leave", post(leave))
        .route("/:id/membership", patch(update_membership))
        .route("/:id/messages", get(list_messages).post(post_message))
        .route("/:id/read", post(mark_read))
}

async fn list_rooms(
    Inject(rooms): Inject<dyn RoomDirectory>,
    ExtractUser(current_user): ExtractUser,
) -> Result<Json<RoomList>, ChatError> {
    let rooms = rooms.list_rooms(current_user).await?;

    Ok(Json(RoomList { rooms }))
}

async fn create_team_room(
    Inject(rooms): Inject<dyn RoomDirectory>,
    ExtractUser(current_user): ExtractUser,
    Json(body): Json<CreateTeamRoom>,
) -> Result<(StatusCode, Json<RoomSummary>), ChatError> {
    let room = rooms
        .create_team_room(
            current_user,
            body.name.unwrap_or_default(),
            body.participant_ids,
        )
        .await?;
    let summary = rooms.room_summary(current_user, room.id).await?;

    Ok((StatusCode::CREATED, Json(summary)))
}

async fn open_direct_room(
    Inject(rooms): Inject<dyn RoomDirectory>,
    ExtractUser(current_user): ExtractUser,
    Json(body): Json<CreateDirectRoom>,
) -> Result<Json<RoomSummary>, ChatError> {
    let room = rooms
        .create_or_reuse_direct_room(current_user, body.participant_id)
        .await?;

    Ok(Json(rooms.room_summary(current_user, room.id).await?))
}

async fn room_summary(
    Inject(rooms): Inject<dyn RoomDirectory>,
    ExtractUser(current_user): ExtractUser,
    Path(room_id): Path<Uuid>,
) -> Result<Json<RoomSummary>, ChatError> {
    Ok(Json(rooms.room_summary(current_user, room_id).await?))
}

async fn invite(
    Inject(rooms): Inject<dyn RoomDirectory>,
    ExtractUser(current_user): ExtractUser,
    Path(room_id): Path<Uuid>,
    Json(body): Json<InviteParticipants>,
) -> Result<StatusCode, ChatError> {
    rooms
        .invite(room_id, current_user, body.participant_ids)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn leave(
    Inject(rooms): Inject<dyn RoomDirectory>,
    ExtractUser(current_user): ExtractUser,
    Path(room_id): Path<Uuid>,
) -> Result<StatusCode, ChatError> {
    rooms.leave(room_id, current_user).await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn update_membership(
    Inject(rooms): Inject<dyn RoomDirectory>,
    ExtractUser(current_user): ExtractUser,
    Path(room_id): Path<Uuid>,
    Json(body): Json<UpdateMembership>,
) -> Result<Json<Membership>, ChatError> {
    let update = MembershipUpdate {
        display_name: body.display_name,
        is_notify: body.is_notify,
    };

    Ok(Json(
        rooms
            .update_membership(room_id, current_user, update)
            .await?,
    ))
}

async fn list_messages(
    Inject(messages): Inject<dyn MessageLog>,
    ExtractUser(current_user): ExtractUser,
    Path(room_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> Result<Json<MessagesList>, ChatError> {
    let messages = messages
        .list(room_id, current_user, page.before, page.limit)
        .await?;

    Ok(Json(MessagesList { messages }))
}

async fn post_message(
    Inject(messages): Inject<dyn MessageLog>,
    ExtractUser(current_user): ExtractUser,
    Path(room_id): Path<Uuid>,
    Json(body): Json<CreateMessage>,
) -> Result<(StatusCode, Json<MessageEntry>), ChatError> {
    let attachments = body
        .attachments
        .into_iter()
        .map(decode_attachment)
        .collect::<Result<Vec<_>, _>>()?;

    let message = messages
        .append(
            room_id,
            Some(current_user),
            MessageKind::User,
            body.content,
            attachments,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

async fn mark_read(
    Inject(read_tracker): Inject<dyn ReadTracker>,
    ExtractUser(current_user): ExtractUser,
    Path(room_id): Path<Uuid>,
    body: Option<Json<MarkRead>>,
) -> Result<Json<ReadAdvance>, ChatError> {
    let upto_message_id = body.and_then(|Json(body)| body.upto_message_id);

    Ok(Json(
        read_tracker
            .advance_read_pointer(room_id, current_user, upto_message_id)
            .await?,
    ))
}

fn decode_attachment(attachment: Attachment) -> Result<UploadFile, ChatError> {
    let data = STANDARD.decode(attachment.data.as_bytes()).map_err(|e| {
        ChatError::InvalidArgument(format!(
            "attachment {} is not valid base64: {e}",
            attachment.file_name
        ))
    })?;

    Ok(UploadFile {
        file_name: attachment.file_name,
        content_type: attachment
            .content_type
            .unwrap_or_else(|| "application/octet-stream".to_owned()),
        data,
    })
}

pub mod schemas {
    use crate::core::models::{MessageEntry, RoomSummary};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Serialize, Debug)]
    pub struct RoomList {
        pub rooms: Vec<RoomSummary>,
    }

    #[derive(Deserialize, Debug)]
    pub struct CreateTeamRoom {
        pub name: Option<String>,
        pub participant_ids: Vec<Uuid>,
    }

    #[derive(Deserialize, Debug)]
    pub struct CreateDirectRoom {
        pub participant_id: Uuid,
    }

    #[derive(Deserialize, Debug)]
    pub struct InviteParticipants {
        pub participant_ids: Vec<Uuid>,
    }

    #[derive(Deserialize, Debug)]
    pub struct UpdateMembership {
        pub display_name: Option<String>,
        pub is_notify: Option<bool>,
    }

    #[derive(Deserialize, Debug, Default)]
    pub struct PageQuery {
        pub before: Option<String>,
        pub limit: Option<u32>,
    }

    #[derive(Serialize, Debug, Default)]
    pub struct MessagesList {
        pub messages: Vec<MessageEntry>,
    }

    /// An attachment sent inline, `data` holding base64.
    #[derive(Deserialize, Debug)]
    pub struct Attachment {
        pub file_name: String,
        pub content_type: Option<String>,
        pub data: String,
    }

    #[derive(Deserialize, Debug)]
    pub struct CreateMessage {
        #[serde(default)]
        pub content: String,
        #[serde(default)]
        pub attachments: Vec<Attachment>,
    }

    #[derive(Deserialize, Debug, Default)]
    pub struct MarkRead {
        pub upto_message_id: Option<Uuid>,
    }
}
