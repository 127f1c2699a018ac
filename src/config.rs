// src/config.rs
//
// Tuning tables. Every struct is built once (preset or JSON), validated, and
// then treated as immutable for the lifetime of whatever it configures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ai::pid::PidGains;
use crate::error::{ensure_positive, ensure_range, ConfigError};

// --------------------------------------------------
// Vehicle
// --------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChassisConfig {
    pub half_extents: [f32; 3],    // [hx, hy, hz] meters
    pub collider_offset: [f32; 3], // lowered collider = lower COM, less flipping
    pub density: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub friction: f32,
}

impl Default for ChassisConfig {
    fn default() -> Self {
        Self {
            half_extents: [1.0, 0.35, 2.0],
            collider_offset: [0.0, -0.25, 0.0],
            density: 1.0,
            linear_damping: 0.1,
            angular_damping: 0.5,
            friction: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WheelConfig {
    pub position: [f32; 3], // hard point in chassis space
    pub steering: bool,
    pub drive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspensionConfig {
    pub rest_length: f32,
    pub wheel_radius: f32,
    pub stiffness: f32,
    pub compression: f32, // damping while compressing
    pub relaxation: f32,  // damping while extending
    pub max_force: f32,
    pub max_travel: f32,
    pub friction_slip: f32,
    pub side_friction_stiffness: f32,
}

impl Default for SuspensionConfig {
    fn default() -> Self {
        Self {
            rest_length: 0.35,
            wheel_radius: 0.5,
            stiffness: 40.0,
            compression: 4.0,
            relaxation: 6.0,
            max_force: 1500.0,
            max_travel: 0.4,
            friction_slip: 6.0,
            side_friction_stiffness: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_engine_force: f32, // per drive wheel, first gear, full torque
    pub max_brake_force: f32,  // per wheel
    pub max_steer_angle: f32,  // radians
    pub idle_rpm: f32,
    pub max_rpm: f32,
    pub min_torque_factor: f32,      // torque floor at max rpm
    pub launch_speed_mph: f32,       // full force from here on
    pub launch_min_scale: f32,       // force scale at standstill
    pub throttle_response_time: f32, // seconds to ~63% of a throttle step
    pub rpm_smoothing: f32,          // lerp rate toward target rpm, 1/s
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_engine_force: 40.0,
            max_brake_force: 40.0,
            max_steer_angle: 0.7,
            idle_rpm: 900.0,
            max_rpm: 7000.0,
            min_torque_factor: 0.35,
            launch_speed_mph: 15.0,
            launch_min_scale: 0.45,
            throttle_response_time: 0.2,
            rpm_smoothing: 12.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GearboxConfig {
    pub ratios: Vec<f32>, // forward gears, index 0 = first gear
    pub reverse_ratio: f32,
    pub final_drive: f32,
    pub shift_up_rpm: f32,
    pub shift_down_rpm: f32,
    pub min_shift_interval: f32, // s between shifts (debounce)
    pub shift_duration: f32,     // s of clutch-in, no engine force
    pub stationary_speed: f32,   // m/s under which reverse may engage
    pub throttle_deadzone: f32,
}

impl Default for GearboxConfig {
    fn default() -> Self {
        Self {
            ratios: vec![3.6, 2.5, 1.9, 1.5, 1.2],
            reverse_ratio: 3.4,
            final_drive: 5.0,
            shift_up_rpm: 6200.0,
            shift_down_rpm: 2500.0,
            min_shift_interval: 0.6,
            shift_duration: 0.25,
            stationary_speed: 0.5,
            throttle_deadzone: 0.05,
        }
    }
}

impl GearboxConfig {
    pub fn gear_count(&self) -> u8 {
        self.ratios.len().min(u8::MAX as usize) as u8
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SleepConfig {
    pub speed_threshold: f32, // m/s
    pub input_threshold: f32, // on |engine|, |steer|, brake
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self { speed_threshold: 0.05, input_threshold: 0.01 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub chassis: ChassisConfig,
    pub wheels: Vec<WheelConfig>,
    pub suspension: SuspensionConfig,
    pub engine: EngineConfig,
    pub gearbox: GearboxConfig,
    pub sleep: SleepConfig,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self::roadster()
    }
}

impl VehicleConfig {
    /// Rear-drive, front-steer four wheeler. Wheels sit just outside the
    /// chassis box, 0.2 m in from each end.
    pub fn roadster() -> Self {
        let chassis = ChassisConfig::default();
        let [hx, _, hz] = chassis.half_extents;
        let y = -0.1;
        let x = hx + 0.25;
        let z = hz - 0.2;

        Self {
            chassis,
            wheels: vec![
                WheelConfig { position: [ x, y,  z], steering: true,  drive: false }, // FL
                WheelConfig { position: [-x, y,  z], steering: true,  drive: false }, // FR
                WheelConfig { position: [ x, y, -z], steering: false, drive: true  }, // RL
                WheelConfig { position: [-x, y, -z], steering: false, drive: true  }, // RR
            ],
            suspension: SuspensionConfig::default(),
            engine: EngineConfig::default(),
            gearbox: GearboxConfig::default(),
            sleep: SleepConfig::default(),
        }
    }

    pub fn drive_wheel_count(&self) -> usize {
        self.wheels.iter().filter(|w| w.drive).count()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.chassis;
        for (field, v) in [
            ("chassis.half_extents.x", c.half_extents[0]),
            ("chassis.half_extents.y", c.half_extents[1]),
            ("chassis.half_extents.z", c.half_extents[2]),
            ("chassis.density", c.density),
        ] {
            ensure_positive(field, v)?;
        }

        if self.wheels.is_empty() {
            return Err(ConfigError::NoWheels);
        }
        if self.drive_wheel_count() == 0 {
            return Err(ConfigError::NoDriveWheels);
        }

        let s = &self.suspension;
        for (field, v) in [
            ("suspension.rest_length", s.rest_length),
            ("suspension.wheel_radius", s.wheel_radius),
            ("suspension.stiffness", s.stiffness),
            ("suspension.max_force", s.max_force),
            ("suspension.max_travel", s.max_travel),
        ] {
            ensure_positive(field, v)?;
        }

        let e = &self.engine;
        if !(e.idle_rpm > 0.0 && e.idle_rpm < e.max_rpm && e.max_rpm.is_finite()) {
            return Err(ConfigError::InvalidRpmRange { idle: e.idle_rpm, max: e.max_rpm });
        }
        ensure_positive("engine.max_engine_force", e.max_engine_force)?;
        ensure_positive("engine.launch_speed_mph", e.launch_speed_mph)?;
        ensure_positive("engine.throttle_response_time", e.throttle_response_time)?;
        ensure_positive("engine.rpm_smoothing", e.rpm_smoothing)?;
        ensure_range("engine.max_brake_force", e.max_brake_force, 0.0, f32::MAX)?;
        ensure_range("engine.max_steer_angle", e.max_steer_angle, 0.0, std::f32::consts::FRAC_PI_2)?;
        ensure_range("engine.min_torque_factor", e.min_torque_factor, 0.0, 1.0)?;
        ensure_range("engine.launch_min_scale", e.launch_min_scale, 0.0, 1.0)?;

        let g = &self.gearbox;
        if g.ratios.is_empty() || g.ratios.len() > u8::MAX as usize {
            return Err(ConfigError::EmptyGearTable);
        }
        for &r in &g.ratios {
            ensure_positive("gearbox.ratios", r)?;
        }
        ensure_positive("gearbox.reverse_ratio", g.reverse_ratio)?;
        ensure_positive("gearbox.final_drive", g.final_drive)?;
        if !(g.shift_down_rpm < g.shift_up_rpm) {
            return Err(ConfigError::InvalidShiftPoints { down: g.shift_down_rpm, up: g.shift_up_rpm });
        }
        ensure_range("gearbox.min_shift_interval", g.min_shift_interval, 0.0, f32::MAX)?;
        ensure_range("gearbox.shift_duration", g.shift_duration, 0.0, f32::MAX)?;
        ensure_range("gearbox.stationary_speed", g.stationary_speed, 0.0, f32::MAX)?;
        ensure_range("gearbox.throttle_deadzone", g.throttle_deadzone, 0.0, 1.0)?;

        ensure_range("sleep.speed_threshold", self.sleep.speed_threshold, 0.0, f32::MAX)?;
        ensure_range("sleep.input_threshold", self.sleep.input_threshold, 0.0, 1.0)?;

        Ok(())
    }
}

// --------------------------------------------------
// AI
// --------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::Medium
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiDriverConfig {
    pub waypoint_advance_distance: f32,
    pub look_ahead_distance: f32,
    pub target_speed_mph: f32,
    pub steer_pid: PidGains,
    pub speed_pid: PidGains,

    // target acquisition (dot products against the heading)
    pub ahead_alignment: f32,     // waypoint counts as "ahead" above this
    pub reacquire_alignment: f32, // rescan when the target drops below this

    // walls
    pub wall_detection_distance: f32,
    pub wall_ray_angle: f32,      // radians either side of center
    pub wall_ray_height: f32,     // above chassis origin
    pub wall_side_weight: f32,
    pub wall_center_weight: f32,
    pub wall_blend: f32,

    // opponents
    pub avoidance_distance: f32,
    pub avoidance_strength: f32,

    // speed shaping
    pub straight_heading: f32,    // |error| below this counts as a straight
    pub straight_boost: f32,
    pub turn_heading_span: f32,   // |error| at which the turn factor bottoms out
    pub min_turn_factor: f32,
    pub close_look_ahead_factor: f32,
    pub opponent_slowdown: f32,
}

impl Default for AiDriverConfig {
    fn default() -> Self {
        Self::for_difficulty(Difficulty::Medium)
    }
}

impl AiDriverConfig {
    pub fn for_difficulty(difficulty: Difficulty) -> Self {
        let (target_speed_mph, look_ahead_distance, avoidance_distance, avoidance_strength) =
            match difficulty {
                Difficulty::Easy => (60.0, 22.0, 14.0, 0.7),
                Difficulty::Medium => (75.0, 26.0, 12.0, 0.5),
                Difficulty::Hard => (95.0, 30.0, 10.0, 0.3),
            };

        Self {
            waypoint_advance_distance: 10.0,
            look_ahead_distance,
            target_speed_mph,
            steer_pid: PidGains::new(1.2, 0.0, 0.35, 0.5),
            speed_pid: PidGains::new(0.6, 0.15, 0.0, 1.0),

            ahead_alignment: 0.2,
            reacquire_alignment: -0.2,

            wall_detection_distance: 8.0,
            wall_ray_angle: 0.5,
            wall_ray_height: 0.3,
            wall_side_weight: 0.6,
            wall_center_weight: 1.0,
            wall_blend: 0.8,

            avoidance_distance,
            avoidance_strength,

            straight_heading: 0.1,
            straight_boost: 1.15,
            turn_heading_span: 1.2,
            min_turn_factor: 0.4,
            close_look_ahead_factor: 0.5,
            opponent_slowdown: 0.7,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("ai.waypoint_advance_distance", self.waypoint_advance_distance)?;
        ensure_positive("ai.look_ahead_distance", self.look_ahead_distance)?;
        ensure_range("ai.target_speed_mph", self.target_speed_mph, 0.0, f32::MAX)?;
        ensure_range("ai.ahead_alignment", self.ahead_alignment, -1.0, 1.0)?;
        ensure_range("ai.reacquire_alignment", self.reacquire_alignment, -1.0, 1.0)?;
        ensure_range("ai.wall_detection_distance", self.wall_detection_distance, 0.0, f32::MAX)?;
        ensure_range("ai.avoidance_distance", self.avoidance_distance, 0.0, f32::MAX)?;
        ensure_positive("ai.turn_heading_span", self.turn_heading_span)?;
        ensure_range("ai.min_turn_factor", self.min_turn_factor, 0.0, 1.0)?;
        ensure_range("ai.close_look_ahead_factor", self.close_look_ahead_factor, 0.0, 1.0)?;
        ensure_range("ai.opponent_slowdown", self.opponent_slowdown, 0.0, 1.0)?;
        Ok(())
    }
}

// --------------------------------------------------
// Race / session
// --------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    pub total_laps: u32,
    pub countdown_seconds: f32,
    pub fixed_dt: f32,
    pub max_substeps: u32,
    pub finish_index: Option<usize>,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            total_laps: 3,
            countdown_seconds: 3.0,
            fixed_dt: 1.0 / 60.0,
            max_substeps: 3,
            finish_index: None,
        }
    }
}

impl RaceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_laps == 0 {
            return Err(ConfigError::NonPositive { field: "race.total_laps", value: 0.0 });
        }
        ensure_range("race.countdown_seconds", self.countdown_seconds, 0.0, f32::MAX)?;
        ensure_positive("race.fixed_dt", self.fixed_dt)?;
        if self.max_substeps == 0 {
            return Err(ConfigError::NonPositive { field: "race.max_substeps", value: 0.0 });
        }
        Ok(())
    }
}

/// Top-level document the host loads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub race: RaceConfig,
    pub difficulty: Difficulty,
    pub vehicle: VehicleConfig,
    pub waypoints: Option<Vec<[f32; 3]>>,
}

impl SessionConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let cfg: SessionConfig = serde_json::from_str(text)?;
        cfg.race.validate()?;
        cfg.vehicle.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}
