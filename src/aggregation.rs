//! Per-slot tallies across all participants of an event, or a chosen subset.

use crate::{
    backend::{AvailabilityBackend, StoreError},
    types::{Participant, ParticipantRef, PresenceEntry, SlotCoordinate},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SlotTally {
    pub count: usize,
    pub contributors: Vec<ParticipantRef>,
}

impl SlotTally {
    pub fn contributor_ids(&self) -> HashSet<Uuid> {
        self.contributors.iter().map(|contributor| contributor.id).collect()
    }
}

/// Heat-map shade of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intensity {
    Empty,
    Lowest,
    Low,
    Medium,
    High,
    Highest,
}

impl Intensity {
    pub fn of(count: usize, max_count: usize) -> Self {
        if count == 0 || max_count == 0 {
            return Intensity::Empty;
        }
        let percentage = count as f64 / max_count as f64;
        match percentage {
            p if p >= 0.8 => Intensity::Highest,
            p if p >= 0.6 => Intensity::High,
            p if p >= 0.4 => Intensity::Medium,
            p if p >= 0.2 => Intensity::Low,
            _ => Intensity::Lowest,
        }
    }
}

/// Participants the view is narrowed to. Empty means everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantFilter(HashSet<Uuid>);

impl ParticipantFilter {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, participant_id: &Uuid) -> bool {
        self.0.contains(participant_id)
    }

    /// Adds the participant or removes them if already selected.
    pub fn toggle(&mut self, participant_id: Uuid) {
        if !self.0.remove(&participant_id) {
            self.0.insert(participant_id);
        }
    }

    pub fn reset(&mut self) {
        self.0.clear();
    }
}

impl FromIterator<Uuid> for ParticipantFilter {
    fn from_iter<I: IntoIterator<Item = Uuid>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Raw per-slot contributors plus the roster they were counted against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregation {
    slots: BTreeMap<SlotCoordinate, Vec<ParticipantRef>>,
    roster: Vec<Participant>,
}

impl Aggregation {
    pub fn new(entries: Vec<PresenceEntry>, roster: Vec<Participant>) -> Self {
        let mut slots: BTreeMap<SlotCoordinate, Vec<ParticipantRef>> = BTreeMap::new();
        for entry in entries {
            let contributors = slots.entry(entry.coordinate).or_default();
            if !contributors.contains(&entry.participant) {
                contributors.push(entry.participant);
            }
        }
        Self { slots, roster }
    }

    /// Pulls a consistent pair of presence list and roster from the store.
    pub async fn fetch<B: AvailabilityBackend>(
        backend: &B,
        event_id: Uuid,
    ) -> Result<Self, StoreError> {
        let (entries, roster) = futures::try_join!(
            backend.presence_for_event(event_id),
            backend.participants(event_id)
        )?;
        Ok(Self::new(entries, roster))
    }

    pub fn roster(&self) -> &[Participant] {
        &self.roster
    }

    pub fn total_participants(&self) -> usize {
        self.roster.len()
    }

    /// True when nobody marked any slot.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn raw_count(&self, coordinate: &SlotCoordinate) -> usize {
        self.slots.get(coordinate).map_or(0, Vec::len)
    }

    /// Missing slots count as zero.
    pub fn tally(&self, coordinate: &SlotCoordinate, filter: &ParticipantFilter) -> SlotTally {
        let Some(contributors) = self.slots.get(coordinate) else {
            return SlotTally::default();
        };
        let contributors: Vec<ParticipantRef> = contributors
            .iter()
            .filter(|contributor| filter.is_empty() || filter.contains(&contributor.id))
            .cloned()
            .collect();
        SlotTally {
            count: contributors.len(),
            contributors,
        }
    }

    /// Slots with at least one counted contributor.
    pub fn tallies(&self, filter: &ParticipantFilter) -> BTreeMap<SlotCoordinate, SlotTally> {
        self.slots
            .keys()
            .map(|coordinate| (*coordinate, self.tally(coordinate, filter)))
            .filter(|(_, tally)| tally.count > 0)
            .collect()
    }

    pub fn max_count(&self, filter: &ParticipantFilter) -> usize {
        if filter.is_empty() {
            self.total_participants()
        } else {
            filter.len()
        }
    }

    pub fn intensity(&self, coordinate: &SlotCoordinate, filter: &ParticipantFilter) -> Intensity {
        Intensity::of(self.tally(coordinate, filter).count, self.max_count(filter))
    }

    pub fn heading(&self, filter: &ParticipantFilter) -> String {
        match filter.len() {
            0 => "Group Availability".to_string(),
            1 => {
                let name = self
                    .roster
                    .iter()
                    .find(|participant| filter.contains(&participant.id))
                    .map_or("Unknown", |participant| participant.name.as_str());
                format!("{name}'s Availability")
            }
            n => format!("{n} Users' Availability"),
        }
    }

    pub fn summary(&self, filter: &ParticipantFilter) -> String {
        if !filter.is_empty() {
            return "Showing filtered availability".to_string();
        }
        match self.total_participants() {
            1 => "1 person responded".to_string(),
            n => format!("{n} people responded"),
        }
    }
}
