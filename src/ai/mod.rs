// src/ai/mod.rs
//
// Waypoint-following opponent: PID loops, wall/opponent avoidance, and the
// driver that ties them to a waypoint loop.

pub mod avoidance;
pub mod driver;
pub mod pid;

pub use driver::AiDriver;
pub use pid::{PidController, PidGains};
