//! One participant's slot selection with optimistic writes.

use crate::{backend::AvailabilityBackend, types::SlotCoordinate};
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// How long `Saved` stays visible before falling back to `Idle`.
pub const SAVED_DISPLAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Idle,
    Saving,
    Saved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragMode {
    Select,
    Deselect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragState {
    Idle,
    Painting(DragMode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// A write for this slot is still in flight.
    Ignored,
    Applied { selected: bool },
    RolledBack,
}

#[derive(Debug)]
struct ControllerState {
    selected: HashSet<SlotCoordinate>,
    in_flight: HashSet<SlotCoordinate>,
    save_status: SaveStatus,
    // Bumped on every status change so a stale `Saved` timer can't reset a newer state.
    status_version: u64,
    drag: DragState,
}

impl ControllerState {
    fn set_status(&mut self, status: SaveStatus) -> u64 {
        self.save_status = status;
        self.status_version += 1;
        self.status_version
    }

    fn restore(&mut self, coordinate: SlotCoordinate, was_selected: bool) {
        self.in_flight.remove(&coordinate);
        if was_selected {
            self.selected.insert(coordinate);
        } else {
            self.selected.remove(&coordinate);
        }
        self.set_status(SaveStatus::Idle);
    }
}

/// Undoes an optimistic flip if the toggle is dropped before the store answered.
struct PendingWrite {
    state: Arc<Mutex<ControllerState>>,
    coordinate: SlotCoordinate,
    was_selected: bool,
    armed: bool,
}

impl PendingWrite {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingWrite {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut state) = self.state.lock() {
            state.restore(self.coordinate, self.was_selected);
            warn!(coordinate = %self.coordinate, "Availability write cancelled, selection restored");
        }
    }
}

pub struct AvailabilityController<B: AvailabilityBackend> {
    backend: B,
    event_id: Uuid,
    participant_id: Uuid,
    state: Arc<Mutex<ControllerState>>,
    saved_display: Duration,
}

impl<B: AvailabilityBackend> Clone for AvailabilityController<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            event_id: self.event_id,
            participant_id: self.participant_id,
            state: self.state.clone(),
            saved_display: self.saved_display,
        }
    }
}

impl<B: AvailabilityBackend> AvailabilityController<B> {
    /// Loads the participant's stored selection. A failed read starts empty.
    pub async fn load(backend: B, event_id: Uuid, participant_id: Uuid) -> Self {
        let selected = backend
            .presence_for_participant(event_id, participant_id)
            .await
            .unwrap_or_else(|err| {
                warn!(%event_id, %participant_id, %err, "Failed to load availability, starting empty");
                HashSet::new()
            });

        Self {
            backend,
            event_id,
            participant_id,
            state: Arc::new(Mutex::new(ControllerState {
                selected,
                in_flight: HashSet::new(),
                save_status: SaveStatus::Idle,
                status_version: 0,
                drag: DragState::Idle,
            })),
            saved_display: SAVED_DISPLAY,
        }
    }

    pub fn with_saved_display(mut self, saved_display: Duration) -> Self {
        self.saved_display = saved_display;
        self
    }

    pub fn selected(&self) -> HashSet<SlotCoordinate> {
        self.state.lock().unwrap().selected.clone()
    }

    pub fn is_selected(&self, coordinate: &SlotCoordinate) -> bool {
        self.state.lock().unwrap().selected.contains(coordinate)
    }

    pub fn is_in_flight(&self, coordinate: &SlotCoordinate) -> bool {
        self.state.lock().unwrap().in_flight.contains(coordinate)
    }

    pub fn save_status(&self) -> SaveStatus {
        self.state.lock().unwrap().save_status
    }

    pub fn drag_state(&self) -> DragState {
        self.state.lock().unwrap().drag
    }

    /// Flips the slot locally, then writes it through to the store.
    ///
    /// A failed write restores the slot's previous membership.
    pub async fn toggle_slot(&self, coordinate: SlotCoordinate) -> ToggleOutcome {
        let was_selected = {
            let mut state = self.state.lock().unwrap();
            if !state.in_flight.insert(coordinate) {
                debug!(%coordinate, "Write already in flight, toggle ignored");
                return ToggleOutcome::Ignored;
            }
            let was_selected = !state.selected.insert(coordinate);
            if was_selected {
                state.selected.remove(&coordinate);
            }
            state.set_status(SaveStatus::Saving);
            was_selected
        };

        let pending = PendingWrite {
            state: self.state.clone(),
            coordinate,
            was_selected,
            armed: true,
        };
        let result = if was_selected {
            self.backend
                .clear_presence(self.event_id, self.participant_id, coordinate)
                .await
        } else {
            self.backend
                .record_presence(self.event_id, self.participant_id, coordinate)
                .await
        };
        pending.disarm();

        let mut state = self.state.lock().unwrap();
        match result {
            Ok(()) => {
                state.in_flight.remove(&coordinate);
                let version = state.set_status(SaveStatus::Saved);
                self.schedule_idle(version);
                ToggleOutcome::Applied {
                    selected: !was_selected,
                }
            }
            Err(err) => {
                error!(%coordinate, %err, "Failed to save availability");
                state.restore(coordinate, was_selected);
                ToggleOutcome::RolledBack
            }
        }
    }

    fn schedule_idle(&self, version: u64) {
        let state = self.state.clone();
        let delay = self.saved_display;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = state.lock().unwrap();
            if state.status_version == version {
                state.set_status(SaveStatus::Idle);
            }
        });
    }

    /// Starts a paint gesture on `coordinate` and toggles it.
    ///
    /// Pressing a selected slot erases for the rest of the gesture, any other
    /// slot paints.
    pub async fn begin_drag(&self, coordinate: SlotCoordinate) -> ToggleOutcome {
        {
            let mut state = self.state.lock().unwrap();
            let mode = if state.selected.contains(&coordinate) {
                DragMode::Deselect
            } else {
                DragMode::Select
            };
            state.drag = DragState::Painting(mode);
        }
        self.toggle_slot(coordinate).await
    }

    /// The gesture entered `coordinate`. Returns `None` if nothing had to change.
    pub async fn drag_over(&self, coordinate: SlotCoordinate) -> Option<ToggleOutcome> {
        let needs_toggle = {
            let state = self.state.lock().unwrap();
            let selected = state.selected.contains(&coordinate);
            match state.drag {
                DragState::Painting(DragMode::Select) => !selected,
                DragState::Painting(DragMode::Deselect) => selected,
                DragState::Idle => false,
            }
        };
        if needs_toggle {
            Some(self.toggle_slot(coordinate).await)
        } else {
            None
        }
    }

    pub fn end_drag(&self) {
        self.state.lock().unwrap().drag = DragState::Idle;
    }
}
