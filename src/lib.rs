//! `sandgrid` coordinates the NFC sample reader and the LED grid of a sand sample journal.
//!
//! Tag placements are debounced into scan events by [scan::ScanState], and the LED grid is
//! driven by [leds::LedModeManager], which switches between mirroring the dashboard and an
//! autonomous visualization. [coordinator::Coordinator] ties both to the outside world.

#[macro_use]
extern crate tracing;

pub mod api;
pub mod color;
pub mod coordinator;
pub mod grid;
pub mod leds;
pub mod models;
pub mod scan;
