//! Local directory of participant identities and their display names.

use crate::core::access::require_participant;
use crate::core::error::{ChatError, ChatResult};
use crate::core::models::Participant;
use crate::core::traits::ParticipantDirectory;
use crate::infrastructure::database::DatabaseConnection;
use crate::infrastructure::traits::ParticipantRepository;
use async_trait::async_trait;
use di::{Ref, injectable};
use log::info;
use uuid::Uuid;

#[injectable(ParticipantDirectory)]
pub struct ChatParticipantDirectory {
    db: Ref<DatabaseConnection>,
    participants: Ref<dyn ParticipantRepository>,
}

#[async_trait]
impl ParticipantDirectory for ChatParticipantDirectory {
    async fn register(&self, participant_id: Uuid, name: String) -> ChatResult<Participant> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::InvalidArgument(
                "participant name must not be blank".to_owned(),
            ));
        }

        let mut uow = self.db.begin().await?;
        let participant = self.participants.upsert(&mut uow, participant_id, name).await?;
        uow.commit().await?;

        info!("registered participant {participant_id}");
        Ok(participant.into())
    }

    async fn find(&self, participant_id: Uuid) -> ChatResult<Participant> {
        let mut conn = self.db.acquire().await?;
        let participant = require_participant(&*self.participants, &mut conn, participant_id).await?;

        Ok(participant.into())
    }

    async fn remove(&self, participant_id: Uuid) -> ChatResult<()> {
        let mut uow = self.db.begin().await?;
        if !self.participants.delete(&mut uow, participant_id).await? {
            return Err(ChatError::NotFound("participant"));
        }
        uow.commit().await?;

        info!("removed participant {participant_id}");
        Ok(())
    }
}
