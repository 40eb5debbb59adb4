#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]
#![deny(clippy::use_self, rust_2018_idioms)]
#![allow(clippy::multiple_crate_versions, clippy::module_name_repetitions)]

//! A scheduler that plays sounds at set times of the day.
//!
//! Alarms live in an [`AlarmStore`]. Once a second the [`Coordinator`] samples
//! the clock, asks the [matcher](matcher::due_alarms) which alarms are due and
//! hands them to the [`Arbiter`], which makes sure only one of them is ever
//! audible.

pub mod alarm;
pub mod arbiter;
pub mod backup;
pub mod clock;
pub mod communication;
pub mod config;
pub mod coordinator;
pub mod library;
pub mod matcher;
pub mod notify;
pub mod sound;
pub mod store;

pub use alarm::{Alarm, AlarmBuilder, AlarmId, Meridiem, SoundSpec, TimeOfDay, Volume, Weekdays};
pub use arbiter::Arbiter;
pub use config::Config;
pub use coordinator::Coordinator;
pub use store::AlarmStore;
