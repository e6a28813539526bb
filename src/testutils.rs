use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::StreamExt;
use tokio::{sync::Notify, time::timeout};
use uuid::Uuid;

use crate::{
    backend::{AvailabilityBackend, StoreError},
    live::{ChangeNotifier, Subscription},
    scheduling,
    types::{
        parse_time, Event, NewEvent, NewParticipant, Participant, PresenceEntry, SlotCoordinate,
    },
};

pub fn coordinate(day: u32, time: &str) -> SlotCoordinate {
    SlotCoordinate::new(
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
        parse_time(time).unwrap(),
    )
}

/// 2024-01-01 until 2024-01-03, 09:00 until 12:00.
pub fn sample_event() -> NewEvent {
    NewEvent {
        name: "Team Offsite".into(),
        password: None,
        start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
        start_time: parse_time("09:00").unwrap(),
        end_time: parse_time("12:00").unwrap(),
    }
}

pub async fn create_event_with<B: AvailabilityBackend>(
    backend: &B,
    creator_name: &str,
) -> (Event, Participant) {
    scheduling::create_event(backend, creator_name, sample_event())
        .await
        .unwrap()
}

pub async fn next_signal(subscription: &mut Subscription) {
    timeout(Duration::from_secs(1), subscription.next())
        .await
        .expect("no change signal received")
        .expect("subscription closed");
}

pub struct MockAvailabilityBackendInner {
    pub success: AtomicBool,
    /// While set, presence writes wait for [`MockAvailabilityBackend::release_writes`].
    pub hold_writes: AtomicBool,
    pub write_gate: Notify,
    pub calls_to_create_event: AtomicU64,
    pub calls_to_create_participant: AtomicU64,
    pub calls_to_record_presence: AtomicU64,
    pub calls_to_clear_presence: AtomicU64,
    pub calls_to_presence_for_participant: AtomicU64,
    pub calls_to_presence_for_event: AtomicU64,
    pub selected: Mutex<HashSet<SlotCoordinate>>,
    pub entries: Mutex<Vec<PresenceEntry>>,
    pub roster: Mutex<Vec<Participant>>,
    pub notifier: ChangeNotifier,
}

#[derive(Clone)]
pub struct MockAvailabilityBackend(pub Arc<MockAvailabilityBackendInner>);

impl MockAvailabilityBackendInner {
    fn new() -> Self {
        Self {
            success: AtomicBool::new(true),
            hold_writes: AtomicBool::new(false),
            write_gate: Notify::new(),
            calls_to_create_event: AtomicU64::default(),
            calls_to_create_participant: AtomicU64::default(),
            calls_to_record_presence: AtomicU64::default(),
            calls_to_clear_presence: AtomicU64::default(),
            calls_to_presence_for_participant: AtomicU64::default(),
            calls_to_presence_for_event: AtomicU64::default(),
            selected: Mutex::default(),
            entries: Mutex::default(),
            roster: Mutex::default(),
            notifier: ChangeNotifier::default(),
        }
    }
}

impl MockAvailabilityBackend {
    pub fn new() -> Self {
        Self(Arc::new(MockAvailabilityBackendInner::new()))
    }

    pub fn fail(&self, fail: bool) {
        self.0.success.store(!fail, Ordering::SeqCst);
    }

    pub fn hold_writes(&self) {
        self.0.hold_writes.store(true, Ordering::SeqCst);
    }

    pub fn release_writes(&self) {
        self.0.hold_writes.store(false, Ordering::SeqCst);
        self.0.write_gate.notify_waiters();
    }

    pub fn writes(&self) -> u64 {
        self.0.calls_to_record_presence.load(Ordering::SeqCst)
            + self.0.calls_to_clear_presence.load(Ordering::SeqCst)
    }

    fn result(&self) -> Result<(), StoreError> {
        match self.0.success.load(Ordering::SeqCst) {
            true => Ok(()),
            false => Err(StoreError::Storage("Supposed to fail".into())),
        }
    }

    async fn wait_for_gate(&self) {
        let released = self.0.write_gate.notified();
        if self.0.hold_writes.load(Ordering::SeqCst) {
            released.await;
        }
    }
}

#[async_trait]
impl AvailabilityBackend for MockAvailabilityBackend {
    async fn create_event(&self, new_event: NewEvent) -> Result<Event, StoreError> {
        self.0.calls_to_create_event.fetch_add(1, Ordering::SeqCst);
        self.result()?;
        Ok(new_event.into_event())
    }

    async fn create_participant(
        &self,
        new_participant: NewParticipant,
    ) -> Result<Participant, StoreError> {
        self.0
            .calls_to_create_participant
            .fetch_add(1, Ordering::SeqCst);
        self.result()?;
        Ok(new_participant.into_participant())
    }

    async fn event(&self, event_id: Uuid) -> Result<Event, StoreError> {
        Err(StoreError::EventNotFound(event_id))
    }

    async fn participant(&self, participant_id: Uuid) -> Result<Participant, StoreError> {
        Err(StoreError::ParticipantNotFound(participant_id))
    }

    async fn participants(&self, _event_id: Uuid) -> Result<Vec<Participant>, StoreError> {
        self.result()?;
        Ok(self.0.roster.lock().unwrap().clone())
    }

    async fn record_presence(
        &self,
        _event_id: Uuid,
        _participant_id: Uuid,
        _coordinate: SlotCoordinate,
    ) -> Result<(), StoreError> {
        self.0
            .calls_to_record_presence
            .fetch_add(1, Ordering::SeqCst);
        self.wait_for_gate().await;
        self.result()
    }

    async fn clear_presence(
        &self,
        _event_id: Uuid,
        _participant_id: Uuid,
        _coordinate: SlotCoordinate,
    ) -> Result<(), StoreError> {
        self.0.calls_to_clear_presence.fetch_add(1, Ordering::SeqCst);
        self.wait_for_gate().await;
        self.result()
    }

    async fn presence_for_participant(
        &self,
        _event_id: Uuid,
        _participant_id: Uuid,
    ) -> Result<HashSet<SlotCoordinate>, StoreError> {
        self.0
            .calls_to_presence_for_participant
            .fetch_add(1, Ordering::SeqCst);
        self.result()?;
        Ok(self.0.selected.lock().unwrap().clone())
    }

    async fn presence_for_event(&self, _event_id: Uuid) -> Result<Vec<PresenceEntry>, StoreError> {
        self.0
            .calls_to_presence_for_event
            .fetch_add(1, Ordering::SeqCst);
        self.result()?;
        Ok(self.0.entries.lock().unwrap().clone())
    }

    fn subscribe(&self, event_id: Uuid) -> Subscription {
        self.0.notifier.subscribe(event_id)
    }
}
