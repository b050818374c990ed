//! Live event stream and unread badge

use crate::api::ExtractUser;
use crate::api::events::schemas::UnreadTotal;
use crate::core::error::ChatError;
use crate::core::events::ChatEvent;
use crate::core::traits::{Broadcaster, ReadTracker};
use async_stream::stream;
use axum::response::Sse;
use axum::response::sse::{Event, KeepAlive};
use axum::routing::get;
use axum::{Json, Router};
use di_axum::Inject;
use futures_util::Stream;
use log::{debug, warn};
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;

pub fn router() -> Router {
    Router::new()
        .route("/events", get(subscribe))
        .route("/unread", get(total_unread))
}

async fn total_unread(
    Inject(read_tracker): Inject<dyn ReadTracker>,
    ExtractUser(current_user): ExtractUser,
) -> Result<Json<UnreadTotal>, ChatError> {
    let total = read_tracker
        .total_unread_for_participant(current_user)
        .await?;

    Ok(Json(UnreadTotal { total }))
}

/// Streams the caller's events; the first one is always the current unread total.
async fn subscribe(
    Inject(broadcaster): Inject<dyn Broadcaster>,
    Inject(read_tracker): Inject<dyn ReadTracker>,
    ExtractUser(current_user): ExtractUser,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ChatError> {
    // subscribe first so nothing published after the snapshot is missed
    let mut receiver = broadcaster.subscribe();
    let total = read_tracker
        .total_unread_for_participant(current_user)
        .await?;
    debug!("session opened for {current_user}");

    let stream = stream! {
        if let Some(event) = to_sse(&ChatEvent::UnreadTotal { total }) {
            yield Ok(event);
        }

        loop {
            match receiver.recv().await {
                Ok(envelope) if envelope.is_for(current_user) => {
                    if let Some(event) = to_sse(&envelope.event) {
                        yield Ok(event);
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("session of {current_user} lagged, {skipped} events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse(event: &ChatEvent) -> Option<Event> {
    match Event::default().event(event.name()).json_data(event) {
        Ok(sse) => Some(sse),
        Err(e) => {
            warn!("could not encode {} event: {e}", event.name());
            None
        }
    }
}

pub mod schemas {
    use serde::Serialize;

    #[derive(Serialize, Debug)]
    pub struct UnreadTotal {
        pub total: i64,
    }
}
