use crate::{
    backend::{AvailabilityBackend, StoreError},
    live::{ChangeNotifier, Subscription},
    types::{
        Event, NewEvent, NewParticipant, Participant, PresenceEntry, SlotCoordinate,
    },
};
use async_trait::async_trait;
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};
use tracing::{debug, error};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
struct PresenceRecord {
    event_id: Uuid,
    participant_id: Uuid,
    coordinate: SlotCoordinate,
}

#[derive(Debug, Default)]
struct Records {
    events: HashMap<Uuid, Event>,
    participants: Vec<Participant>,
    presence: Vec<PresenceRecord>,
}

impl Records {
    fn check_membership(&self, event_id: Uuid, participant_id: Uuid) -> Result<(), StoreError> {
        if !self.events.contains_key(&event_id) {
            return Err(StoreError::EventNotFound(event_id));
        }
        let member = self
            .participants
            .iter()
            .any(|participant| participant.id == participant_id && participant.event_id == event_id);
        if !member {
            return Err(StoreError::ParticipantNotFound(participant_id));
        }
        Ok(())
    }
}

/// Impersistent store, used when no database is configured.
#[derive(Debug, Clone, Default)]
pub struct LocalAvailability {
    records: Arc<Mutex<Records>>,
    notifier: ChangeNotifier,
}

impl LocalAvailability {
    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }
}

#[async_trait]
impl AvailabilityBackend for LocalAvailability {
    async fn create_event(&self, new_event: NewEvent) -> Result<Event, StoreError> {
        let event = new_event.into_event();
        self.records
            .lock()
            .unwrap()
            .events
            .insert(event.id, event.clone());
        debug!(event_id = %event.id, name = %event.name, "Event created");
        Ok(event)
    }

    async fn create_participant(
        &self,
        new_participant: NewParticipant,
    ) -> Result<Participant, StoreError> {
        let mut records = self.records.lock().unwrap();
        if !records.events.contains_key(&new_participant.event_id) {
            let err = StoreError::EventNotFound(new_participant.event_id);
            error!(%err, "Participant can't be added");
            return Err(err);
        }
        let has_creator = records.participants.iter().any(|participant| {
            participant.event_id == new_participant.event_id && participant.creator
        });
        if new_participant.creator && has_creator {
            let err = StoreError::Storage(format!(
                "Event {} already has a creator",
                new_participant.event_id
            ));
            error!(%err, "Participant can't be added");
            return Err(err);
        }
        let participant = new_participant.into_participant();
        records.participants.push(participant.clone());
        debug!(participant_id = %participant.id, event_id = %participant.event_id, "Participant joined");
        Ok(participant)
    }

    async fn event(&self, event_id: Uuid) -> Result<Event, StoreError> {
        self.records
            .lock()
            .unwrap()
            .events
            .get(&event_id)
            .cloned()
            .ok_or(StoreError::EventNotFound(event_id))
    }

    async fn participant(&self, participant_id: Uuid) -> Result<Participant, StoreError> {
        self.records
            .lock()
            .unwrap()
            .participants
            .iter()
            .find(|participant| participant.id == participant_id)
            .cloned()
            .ok_or(StoreError::ParticipantNotFound(participant_id))
    }

    async fn participants(&self, event_id: Uuid) -> Result<Vec<Participant>, StoreError> {
        let records = self.records.lock().unwrap();
        if !records.events.contains_key(&event_id) {
            return Err(StoreError::EventNotFound(event_id));
        }
        Ok(records
            .participants
            .iter()
            .filter(|participant| participant.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn record_presence(
        &self,
        event_id: Uuid,
        participant_id: Uuid,
        coordinate: SlotCoordinate,
    ) -> Result<(), StoreError> {
        let record = PresenceRecord {
            event_id,
            participant_id,
            coordinate,
        };
        let inserted = {
            let mut records = self.records.lock().unwrap();
            records.check_membership(event_id, participant_id)?;
            if records.presence.contains(&record) {
                false
            } else {
                records.presence.push(record);
                true
            }
        };
        if inserted {
            self.notifier.notify(event_id);
        }
        Ok(())
    }

    async fn clear_presence(
        &self,
        event_id: Uuid,
        participant_id: Uuid,
        coordinate: SlotCoordinate,
    ) -> Result<(), StoreError> {
        let removed = {
            let mut records = self.records.lock().unwrap();
            records.check_membership(event_id, participant_id)?;
            let before = records.presence.len();
            records.presence.retain(|record| {
                !(record.event_id == event_id
                    && record.participant_id == participant_id
                    && record.coordinate == coordinate)
            });
            records.presence.len() != before
        };
        if removed {
            self.notifier.notify(event_id);
        }
        Ok(())
    }

    async fn presence_for_participant(
        &self,
        event_id: Uuid,
        participant_id: Uuid,
    ) -> Result<HashSet<SlotCoordinate>, StoreError> {
        let records = self.records.lock().unwrap();
        records.check_membership(event_id, participant_id)?;
        Ok(records
            .presence
            .iter()
            .filter(|record| record.event_id == event_id && record.participant_id == participant_id)
            .map(|record| record.coordinate)
            .collect())
    }

    async fn presence_for_event(&self, event_id: Uuid) -> Result<Vec<PresenceEntry>, StoreError> {
        let records = self.records.lock().unwrap();
        if !records.events.contains_key(&event_id) {
            return Err(StoreError::EventNotFound(event_id));
        }
        let entries = records
            .presence
            .iter()
            .filter(|record| record.event_id == event_id)
            .filter_map(|record| {
                records
                    .participants
                    .iter()
                    .find(|participant| participant.id == record.participant_id)
                    .map(|participant| PresenceEntry {
                        coordinate: record.coordinate,
                        participant: participant.to_ref(),
                    })
            })
            .collect();
        Ok(entries)
    }

    fn subscribe(&self, event_id: Uuid) -> Subscription {
        self.notifier.subscribe(event_id)
    }
}
