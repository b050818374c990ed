//! In-process fan-out to connected sessions.
//!
//! Every published event goes through one broadcast channel; each session keeps only
//! the envelopes addressed to its participant.

use crate::config::Settings;
use crate::core::events::{ChatEvent, Envelope};
use crate::core::traits::Broadcaster;
use crate::infrastructure::database::DatabaseConnection;
use crate::infrastructure::traits::MembershipRepository;
use async_trait::async_trait;
use di::{Ref, inject, injectable};
use log::{debug, warn};
use tokio::sync::broadcast;
use uuid::Uuid;

pub struct SessionHub {
    sender: broadcast::Sender<Envelope>,
    db: Ref<DatabaseConnection>,
    memberships: Ref<dyn MembershipRepository>,
}

#[injectable(Broadcaster)]
impl SessionHub {
    #[inject]
    pub fn create(
        settings: Ref<Settings>,
        db: Ref<DatabaseConnection>,
        memberships: Ref<dyn MembershipRepository>,
    ) -> SessionHub {
        SessionHub::new(settings.event_buffer, db, memberships)
    }
}

impl SessionHub {
    pub fn new(
        capacity: usize,
        db: Ref<DatabaseConnection>,
        memberships: Ref<dyn MembershipRepository>,
    ) -> SessionHub {
        let (sender, _) = broadcast::channel(capacity.max(1));

        SessionHub {
            sender,
            db,
            memberships,
        }
    }

    async fn room_audience(&self, room_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        let mut conn = self.db.acquire().await?;
        self.memberships.active_participants(&mut conn, room_id).await
    }
}

#[async_trait]
impl Broadcaster for SessionHub {
    fn publish(&self, recipient_ids: Vec<Uuid>, event: ChatEvent) {
        if recipient_ids.is_empty() {
            return;
        }

        let name = event.name();
        if self.sender.send(Envelope::new(recipient_ids, event)).is_err() {
            debug!("no connected sessions for {name}");
        }
    }

    async fn publish_to_room(&self, room_id: Uuid, event: ChatEvent) {
        // resolved at publish time so the audience reflects committed membership
        match self.room_audience(room_id).await {
            Ok(recipients) => self.publish(recipients, event),
            Err(e) => warn!("dropping {} for room {room_id}: {e}", event.name()),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }
}
