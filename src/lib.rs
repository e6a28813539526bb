//! Group availability scheduling: events with a fixed slot grid, per-participant
//! presence, group aggregation and live change signals.

pub mod aggregation;
pub mod backend;
pub mod configuration;
pub mod configuration_handler;
pub mod controller;
#[cfg(feature = "postgres")]
pub mod database_interface;
pub mod http;
pub mod live;
pub mod local_availability;
pub mod scheduling;
#[cfg(feature = "postgres")]
mod schema;
pub mod slot_grid;
#[cfg(test)]
mod testutils;
pub mod types;
