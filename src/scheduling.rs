use crate::{
    backend::{AvailabilityBackend, StoreError},
    types::{Event, NewEvent, NewParticipant, Participant, ValidationError},
};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CreateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Creates an event together with the participant who organizes it.
pub async fn create_event<B: AvailabilityBackend>(
    backend: &B,
    creator_name: &str,
    new_event: NewEvent,
) -> Result<(Event, Participant), CreateError> {
    // The creator's name is checked first so nothing is stored on bad input.
    let mut creator = NewParticipant::new(Uuid::nil(), creator_name, true)?;
    let new_event = new_event.normalized()?;

    let event = backend.create_event(new_event).await?;
    creator.event_id = event.id;
    let creator = backend.create_participant(creator).await?;
    info!(event_id = %event.id, creator_id = %creator.id, "Event created");
    Ok((event, creator))
}

/// "Add yourself" to an existing event.
pub async fn join_event<B: AvailabilityBackend>(
    backend: &B,
    event_id: Uuid,
    name: &str,
) -> Result<Participant, CreateError> {
    let new_participant = NewParticipant::new(event_id, name, false)?;
    let participant = backend.create_participant(new_participant).await?;
    info!(%event_id, participant_id = %participant.id, "Participant joined event");
    Ok(participant)
}
