//! Participant identity endpoints

use crate::api::ExtractUser;
use crate::api::participants::schemas::RegisterParticipant;
use crate::core::error::ChatError;
use crate::core::models::Participant;
use crate::core::traits::ParticipantDirectory;
use axum::http::StatusCode;
use axum::routing::put;
use axum::{Json, Router};
use di_axum::Inject;

pub fn router() -> Router {
    Router::new().route("/me", put(register).delete(remove).get(me))
}

async fn register(
    Inject(participants): Inject<dyn ParticipantDirectory>,
    ExtractUser(current_user): ExtractUser,
    Json(body): Json<RegisterParticipant>,
) -> Result<(StatusCode, Json<Participant>), ChatError> {
    let participant = participants.register(current_user, body.name).await?;

    Ok((StatusCode::OK, Json(participant)))
}

async fn me(
    Inject(participants): Inject<dyn ParticipantDirectory>,
    ExtractUser(current_user): ExtractUser,
) -> Result<Json<Participant>, ChatError> {
    Ok(Json(participants.find(current_user).await?))
}

async fn remove(
    Inject(participants): Inject<dyn ParticipantDirectory>,
    ExtractUser(current_user): ExtractUser,
) -> Result<StatusCode, ChatError> {
    participants.remove(current_user).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub mod schemas {
    use serde::Deserialize;

    #[derive(Deserialize, Debug)]
    pub struct RegisterParticipant {
        pub name: String,
    }
}
