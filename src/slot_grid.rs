use crate::types::{Event, SlotCoordinate, SLOT_MINUTES};
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use serde::Serialize;

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Every calendar date from `start` to `end`, both included.
pub fn generate_dates(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|date| *date <= end).collect()
}

/// Half-hour steps from `start`, stopping strictly before `end`.
pub fn generate_time_slots(start: NaiveTime, end: NaiveTime) -> Vec<NaiveTime> {
    let end_minutes = minutes_since_midnight(end);
    (minutes_since_midnight(start)..end_minutes)
        .step_by(SLOT_MINUTES as usize)
        .filter_map(|minutes| NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0))
        .collect()
}

fn minutes_since_midnight(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

/// The selectable cells of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotGrid {
    pub dates: Vec<NaiveDate>,
    pub times: Vec<NaiveTime>,
    /// Rendered below the last row, never selectable.
    pub trailing_time: NaiveTime,
}

impl SlotGrid {
    pub fn new(
        start_date: NaiveDate,
        end_date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Self {
        Self {
            dates: generate_dates(start_date, end_date),
            times: generate_time_slots(start_time, end_time),
            trailing_time: end_time,
        }
    }

    pub fn for_event(event: &Event) -> Self {
        Self::new(
            event.start_date,
            event.end_date,
            event.start_time,
            event.end_time,
        )
    }

    pub fn cell_count(&self) -> usize {
        self.dates.len() * self.times.len()
    }

    pub fn contains(&self, coordinate: &SlotCoordinate) -> bool {
        self.dates.contains(&coordinate.date) && self.times.contains(&coordinate.time)
    }

    /// Row-major: one row per time of day, one column per date.
    pub fn cells(&self) -> impl Iterator<Item = SlotCoordinate> + '_ {
        self.times.iter().flat_map(move |time| {
            self.dates
                .iter()
                .map(move |date| SlotCoordinate::new(*date, *time))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateLabel {
    pub weekday: &'static str,
    pub day: u32,
    pub month: &'static str,
    pub full: String,
}

pub fn date_label(date: NaiveDate) -> DateLabel {
    let month = MONTHS[date.month0() as usize];
    DateLabel {
        weekday: WEEKDAYS[date.weekday().num_days_from_monday() as usize],
        day: date.day(),
        month,
        full: format!("{} {}, {}", month, date.day(), date.year()),
    }
}

/// 12-hour clock label, e.g. `9:00 AM` or `12:30 PM`.
pub fn time_label(time: NaiveTime) -> String {
    let (pm, hour) = time.hour12();
    let suffix = if pm { "PM" } else { "AM" };
    format!("{}:{:02} {}", hour, time.minute(), suffix)
}
