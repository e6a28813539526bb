use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt, str::FromStr};
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

/// Grid cadence in minutes.
pub const SLOT_MINUTES: u32 = 30;

/// Longest allowed distance between the first and the last day of an event.
pub const MAX_EVENT_DAYS: i64 = 7;

lazy_static! {
    static ref SLOT_KEY: Regex =
        Regex::new(r"^(\d{4}-\d{2}-\d{2})-(\d{2}:\d{2})$").expect("valid slot key pattern");
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(with = "hh_mm")]
    pub start_time: NaiveTime,
    #[serde(with = "hh_mm")]
    pub end_time: NaiveTime,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Plain string comparison. Events without a password let everyone in.
    pub fn verify_password(&self, candidate: &str) -> bool {
        match &self.password {
            Some(password) => password == candidate,
            None => true,
        }
    }

    pub fn password_protected(&self) -> bool {
        self.password.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub creator: bool,
    pub created_at: DateTime<Utc>,
}

impl Participant {
    pub fn to_ref(&self) -> ParticipantRef {
        ParticipantRef {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

/// Identity of whoever contributed a presence record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantRef {
    pub id: Uuid,
    pub name: String,
}

/// A (date, time-of-day) cell of an event's grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotCoordinate {
    pub date: NaiveDate,
    #[serde(with = "hh_mm")]
    pub time: NaiveTime,
}

impl SlotCoordinate {
    pub fn new(date: NaiveDate, time: NaiveTime) -> Self {
        Self { date, time }
    }

    /// Stable `YYYY-MM-DD-HH:MM` key used for set membership and map lookups.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SlotCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.date.format("%Y-%m-%d"),
            self.time.format("%H:%M")
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("`{0}` is not a slot key of the form YYYY-MM-DD-HH:MM")]
pub struct SlotKeyError(pub String);

impl FromStr for SlotCoordinate {
    type Err = SlotKeyError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let captures = SLOT_KEY
            .captures(key)
            .ok_or_else(|| SlotKeyError(key.to_string()))?;
        let date = NaiveDate::parse_from_str(&captures[1], "%Y-%m-%d")
            .map_err(|_| SlotKeyError(key.to_string()))?;
        let time = parse_time(&captures[2]).map_err(|_| SlotKeyError(key.to_string()))?;
        Ok(Self { date, time })
    }
}

/// One stored presence marker annotated with who set it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub coordinate: SlotCoordinate,
    pub participant: ParticipantRef,
}

/// Accepts `HH:MM` as well as the `HH:MM:SS` form databases hand back.
pub fn parse_time(raw: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(raw, "%H:%M").or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
}

/// Serde adapter for 24-hour, zero padded `HH:MM` times.
pub mod hh_mm {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_time(&raw).map_err(de::Error::custom)
    }
}

/// Human readable rejection of event or participant input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl From<validator::ValidationErrors> for ValidationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ValidationError(errors.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Validate)]
#[validate(schema(function = "validate_window"))]
pub struct NewEvent {
    #[validate(length(min = 1, message = "Event name is required"))]
    pub name: String,
    pub password: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(with = "hh_mm")]
    pub start_time: NaiveTime,
    #[serde(with = "hh_mm")]
    pub end_time: NaiveTime,
}

impl NewEvent {
    /// Trims the name, turns a blank password into none, then validates.
    pub fn normalized(mut self) -> Result<Self, ValidationError> {
        self.name = self.name.trim().to_string();
        self.password = self
            .password
            .map(|password| password.trim().to_string())
            .filter(|password| !password.is_empty());
        self.validate()?;
        Ok(self)
    }

    pub fn into_event(self) -> Event {
        Event {
            id: Uuid::new_v4(),
            name: self.name,
            password: self.password,
            start_date: self.start_date,
            end_date: self.end_date,
            start_time: self.start_time,
            end_time: self.end_time,
            created_at: Utc::now(),
        }
    }
}

fn window_error(code: &'static str, message: &'static str) -> validator::ValidationError {
    validator::ValidationError::new(code).with_message(Cow::Borrowed(message))
}

fn validate_window(event: &NewEvent) -> Result<(), validator::ValidationError> {
    if event.end_date < event.start_date {
        return Err(window_error(
            "date_range",
            "End date must not be before the start date",
        ));
    }
    if event.end_date > event.start_date + Duration::days(MAX_EVENT_DAYS) {
        return Err(window_error(
            "date_range",
            "An event can span at most 7 days after its start date",
        ));
    }
    if event.end_time <= event.start_time {
        return Err(window_error(
            "time_range",
            "End time must be after the start time",
        ));
    }
    let minutes = (event.end_time - event.start_time).num_minutes();
    if minutes % i64::from(SLOT_MINUTES) != 0 {
        return Err(window_error(
            "time_range",
            "The time window must be a multiple of 30 minutes",
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Validate)]
pub struct NewParticipant {
    pub event_id: Uuid,
    #[validate(length(min = 1, message = "Your name is required"))]
    pub name: String,
    #[serde(default)]
    pub creator: bool,
}

impl NewParticipant {
    pub fn new(event_id: Uuid, name: &str, creator: bool) -> Result<Self, ValidationError> {
        let participant = Self {
            event_id,
            name: name.trim().to_string(),
            creator,
        };
        participant.validate()?;
        Ok(participant)
    }

    pub fn into_participant(self) -> Participant {
        Participant {
            id: Uuid::new_v4(),
            event_id: self.event_id,
            name: self.name,
            creator: self.creator,
            created_at: Utc::now(),
        }
    }
}
