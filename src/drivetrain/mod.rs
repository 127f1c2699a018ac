// src/drivetrain/mod.rs
//
// Engine curves and the automatic gearbox. Everything here is pure state and
// math; the vehicle module owns the rapier side.

pub mod engine;
pub mod gearbox;

pub use engine::{mps_to_mph, MS_TO_MPH};
pub use gearbox::{Gear, Gearbox, ShiftEvent};
