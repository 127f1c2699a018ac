// src/error.rs

use std::fmt;

/// Setup errors. These are raised once, at construction, and never from a
/// running simulation tick.
#[derive(Debug)]
pub enum ConfigError {
    TooFewWaypoints { count: usize },
    NonFiniteWaypoint { index: usize },
    DegenerateLoop,
    NoWheels,
    NoDriveWheels,
    EmptyGearTable,
    InvalidRpmRange { idle: f32, max: f32 },
    InvalidShiftPoints { down: f32, up: f32 },
    NonPositive { field: &'static str, value: f32 },
    OutOfRange { field: &'static str, value: f32 },
    FinishIndexOutOfRange { index: usize, len: usize },
    NoCars,
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::TooFewWaypoints { count } => {
                write!(f, "waypoint loop needs at least 2 points, got {count}")
            }
            ConfigError::NonFiniteWaypoint { index } => {
                write!(f, "waypoint {index} has a non-finite coordinate")
            }
            ConfigError::DegenerateLoop => write!(f, "waypoint loop has zero total length"),
            ConfigError::NoWheels => write!(f, "vehicle has no wheels"),
            ConfigError::NoDriveWheels => write!(f, "vehicle has no drive wheels"),
            ConfigError::EmptyGearTable => write!(f, "gearbox has no forward gears"),
            ConfigError::InvalidRpmRange { idle, max } => {
                write!(f, "idle rpm {idle} must be positive and below max rpm {max}")
            }
            ConfigError::InvalidShiftPoints { down, up } => {
                write!(f, "shift-down rpm {down} must be below shift-up rpm {up}")
            }
            ConfigError::NonPositive { field, value } => {
                write!(f, "{field} must be positive, got {value}")
            }
            ConfigError::OutOfRange { field, value } => {
                write!(f, "{field} is out of range: {value}")
            }
            ConfigError::FinishIndexOutOfRange { index, len } => {
                write!(f, "finish index {index} is outside a loop of {len} waypoints")
            }
            ConfigError::NoCars => write!(f, "race has no cars"),
            ConfigError::Io(e) => write!(f, "config io: {e}"),
            ConfigError::Json(e) => write!(f, "config json: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Json(e)
    }
}

/// Fails with `NonPositive` unless `value` is finite and > 0.
pub(crate) fn ensure_positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

/// Fails with `OutOfRange` unless `lo <= value <= hi`.
pub(crate) fn ensure_range(field: &'static str, value: f32, lo: f32, hi: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= lo && value <= hi {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value })
    }
}
