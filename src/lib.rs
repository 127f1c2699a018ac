//! Headless racing core: raycast vehicles on rapier, a waypoint-following AI
//! driver, and race progress / lap tracking.
//!
//! Per fixed step the session samples every car's `ControlSource`, applies
//! the inputs through `Vehicle::update`, steps the physics world, reads the
//! vehicle states back and feeds them to the `RaceProgressTracker`.

pub mod ai;
pub mod config;
pub mod control;
pub mod debug;
pub mod drivetrain;
pub mod error;
pub mod physics;
pub mod race;
pub mod session;
pub mod state;
pub mod track;
pub mod vehicle;

pub use ai::{AiDriver, PidController, PidGains};
pub use config::{AiDriverConfig, Difficulty, RaceConfig, SessionConfig, VehicleConfig};
pub use control::{ControlContext, ControlInput, ControlSource};
pub use error::ConfigError;
pub use physics::{FixedStepper, PhysicsWorld, RayProbe};
pub use race::{CarId, RaceProgressTracker};
pub use session::{RaceEvent, RacePhase, RaceSession, Role, Standing};
pub use state::{RaceSnapshot, SnapshotFeed};
pub use track::WaypointLoop;
pub use vehicle::{SpawnPose, Vehicle, VehicleState};
