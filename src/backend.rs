use crate::{
    live::Subscription,
    types::{Event, NewEvent, NewParticipant, Participant, PresenceEntry, SlotCoordinate},
};
use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Event {0} does not exist")]
    EventNotFound(Uuid),
    #[error("Participant {0} does not exist in this event")]
    ParticipantNotFound(Uuid),
    #[error("Storage failure: {0}")]
    Storage(String),
}

/// Keyed record store for events, participants and presence markers.
///
/// Writes that change stored presence must signal the event's subscribers.
#[async_trait]
pub trait AvailabilityBackend: Clone + Send + Sync + 'static {
    async fn create_event(&self, new_event: NewEvent) -> Result<Event, StoreError>;
    async fn create_participant(
        &self,
        new_participant: NewParticipant,
    ) -> Result<Participant, StoreError>;

    async fn event(&self, event_id: Uuid) -> Result<Event, StoreError>;
    async fn participant(&self, participant_id: Uuid) -> Result<Participant, StoreError>;
    /// Roster in joining order.
    async fn participants(&self, event_id: Uuid) -> Result<Vec<Participant>, StoreError>;

    async fn count_participants(&self, event_id: Uuid) -> Result<usize, StoreError> {
        Ok(self.participants(event_id).await?.len())
    }

    /// Idempotent.
    async fn record_presence(
        &self,
        event_id: Uuid,
        participant_id: Uuid,
        coordinate: SlotCoordinate,
    ) -> Result<(), StoreError>;
    /// Removing an absent marker is not an error.
    async fn clear_presence(
        &self,
        event_id: Uuid,
        participant_id: Uuid,
        coordinate: SlotCoordinate,
    ) -> Result<(), StoreError>;

    async fn presence_for_participant(
        &self,
        event_id: Uuid,
        participant_id: Uuid,
    ) -> Result<HashSet<SlotCoordinate>, StoreError>;
    async fn presence_for_event(&self, event_id: Uuid) -> Result<Vec<PresenceEntry>, StoreError>;

    async fn verify_password(&self, event_id: Uuid, candidate: &str) -> Result<bool, StoreError> {
        Ok(self.event(event_id).await?.verify_password(candidate))
    }

    fn subscribe(&self, event_id: Uuid) -> Subscription;
}
