// ==============================================================================
// driver.rs — WAYPOINT-FOLLOWING AI DRIVER
// ------------------------------------------------------------------------------
// Per tick:
//   1) target acquisition  : forward scan on first tick / when facing away
//   2) advance             : within advance distance and next waypoint ahead
//   3) look-ahead point    : pure pursuit along the loop
//   4) heading error       : asin(cross(forward, desired).y)  (XZ plane)
//   5) steering            : steer PID + wall probes + opponent avoidance
//   6) speed shaping       : straights / turns / close look-ahead / traffic
//   7) speed PID (mph)     : + -> engine, - -> brake
//
// Degenerate geometry (flat heading, look-ahead on top of the car) yields
// COAST_AND_BRAKE for that tick; nothing here can produce NaN output.
// ==============================================================================

use std::sync::Arc;

use rapier3d::na::{Point3, Vector3};

use crate::ai::avoidance::{
    cast_wall_probes, flat_unit, nearest_opponent_ahead, opponent_correction, wall_correction,
};
use crate::ai::pid::PidController;
use crate::config::AiDriverConfig;
use crate::control::{ControlContext, ControlInput, ControlSource};
use crate::debug::AiDebug;
use crate::drivetrain::mps_to_mph;
use crate::error::ConfigError;
use crate::physics::RayProbe;
use crate::track::WaypointLoop;
use crate::vehicle::VehicleState;

const EPS: f32 = 1e-6;

/// Score bonus for nearby waypoints during the forward scan.
const SCAN_PROXIMITY_WEIGHT: f32 = 10.0;

pub struct AiDriver {
    track: Arc<WaypointLoop>,
    config: AiDriverConfig,
    steer_pid: PidController,
    speed_pid: PidController,
    target: Option<usize>, // None until the first scan
    advance_count: u64,
    debug: AiDebug,
}

impl AiDriver {
    pub fn new(track: Arc<WaypointLoop>, config: AiDriverConfig) -> Result<Self, ConfigError> {
        if track.len() < 2 {
            return Err(ConfigError::TooFewWaypoints { count: track.len() });
        }
        config.validate()?;

        Ok(Self {
            steer_pid: PidController::new(config.steer_pid),
            speed_pid: PidController::new(config.speed_pid),
            track,
            config,
            target: None,
            advance_count: 0,
            debug: AiDebug::default(),
        })
    }

    pub fn config(&self) -> &AiDriverConfig {
        &self.config
    }

    pub fn target_index(&self) -> Option<usize> {
        self.target
    }

    pub fn set_target_index(&mut self, index: usize) {
        self.target = Some(index % self.track.len());
    }

    /// Number of times the target moved on by proximity (rescans excluded).
    pub fn advance_count(&self) -> u64 {
        self.advance_count
    }

    pub fn debug(&self) -> &AiDebug {
        &self.debug
    }

    /// Clear both controllers and force a fresh scan on the next update.
    pub fn reset(&mut self) {
        self.steer_pid.reset();
        self.speed_pid.reset();
        self.target = None;
        self.debug.clear();
    }

    /// Pick the best waypoint in front of the car and make it the target.
    pub fn initialize_waypoint_index(&mut self, position: &Point3<f32>, forward: &Vector3<f32>) -> usize {
        let index = match flat_unit(forward) {
            Some(fwd) => self.scan_forward(position, &fwd),
            None => self.track.next_index(self.track.nearest_index(position).0),
        };
        self.target = Some(index);
        index
    }

    fn scan_forward(&self, position: &Point3<f32>, forward: &Vector3<f32>) -> usize {
        let mut best: Option<(usize, f32)> = None;

        for (i, p) in self.track.points().iter().enumerate() {
            let to = Vector3::new(p.x - position.x, 0.0, p.z - position.z);
            let dist = to.norm();
            if dist < EPS {
                continue;
            }
            let alignment = forward.dot(&(to / dist));
            if alignment <= self.config.ahead_alignment {
                continue;
            }
            let score = alignment + SCAN_PROXIMITY_WEIGHT / dist.max(1.0);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((i, score));
            }
        }

        best.map(|(i, _)| i)
            .unwrap_or_else(|| self.track.next_index(self.track.nearest_index(position).0))
    }

    /// `None` when the waypoint sits on top of the car.
    fn alignment_to(&self, index: usize, position: &Point3<f32>, forward: &Vector3<f32>) -> Option<f32> {
        let p = self.track.point(index);
        flat_unit(&(p - position)).map(|dir| forward.dot(&dir))
    }

    fn flat_distance(a: &Point3<f32>, b: &Point3<f32>) -> f32 {
        Vector3::new(a.x - b.x, 0.0, a.z - b.z).norm()
    }

    pub fn update(
        &mut self,
        state: &VehicleState,
        opponents: &[Point3<f32>],
        probe: Option<&dyn RayProbe>,
        dt: f32,
    ) -> ControlInput {
        self.debug.clear();

        let pos = state.position;
        let Some(forward) = flat_unit(&state.forward) else {
            return ControlInput::COAST_AND_BRAKE;
        };
        if !pos.coords.iter().all(|c| c.is_finite()) {
            return ControlInput::COAST_AND_BRAKE;
        }

        // ---------------------------------------------
        // 1) acquire / reacquire
        // ---------------------------------------------
        let mut target = match self.target {
            Some(t) => t,
            None => self.initialize_waypoint_index(&pos, &forward),
        };

        if let Some(alignment) = self.alignment_to(target, &pos, &forward) {
            if alignment < self.config.reacquire_alignment {
                let fresh = self.scan_forward(&pos, &forward);
                log::debug!("ai reacquired waypoint {} -> {} (alignment {:.2})", target, fresh, alignment);
                target = fresh;
            }
        }

        // ---------------------------------------------
        // 2) advance
        // ---------------------------------------------
        let target_point = self.track.point(target);
        if Self::flat_distance(&pos, &target_point) <= self.config.waypoint_advance_distance {
            let next = self.track.next_index(target);
            let next_ahead = self
                .alignment_to(next, &pos, &forward)
                .map_or(true, |a| a > self.config.ahead_alignment);
            if next_ahead {
                target = next;
                self.advance_count += 1;
            }
        }
        self.target = Some(target);

        // ---------------------------------------------
        // 3) look-ahead + 4) heading error
        // ---------------------------------------------
        let look_ahead = self.track.look_ahead_point(target, &pos, self.config.look_ahead_distance);
        self.debug.target_index = Some(target);
        self.debug.target = Some(self.track.point(target).into());
        self.debug.look_ahead = Some(look_ahead.into());

        let Some(desired) = flat_unit(&(look_ahead - pos)) else {
            return ControlInput::COAST_AND_BRAKE;
        };
        let heading_error = forward.cross(&desired).y.clamp(-1.0, 1.0).asin();

        // ---------------------------------------------
        // 5) steering
        // ---------------------------------------------
        let steer_pid = self.steer_pid.update(heading_error, dt);

        let wall = match probe {
            Some(probe) => {
                let (hits, rays) = cast_wall_probes(probe, &pos, &forward, &self.config);
                self.debug.probes = rays;
                wall_correction(&hits, heading_error, &self.config)
            }
            None => 0.0,
        };

        let opponent = nearest_opponent_ahead(&pos, &forward, opponents, self.config.avoidance_distance);
        let opp_steer = opponent_correction(
            opponent.as_ref(),
            self.config.avoidance_distance,
            self.config.avoidance_strength,
        );

        let steer = (steer_pid + wall + opp_steer).clamp(-1.0, 1.0);

        // ---------------------------------------------
        // 6) speed shaping
        // ---------------------------------------------
        let cfg = &self.config;
        let abs_err = heading_error.abs();
        let mut target_speed = cfg.target_speed_mph;

        if abs_err < cfg.straight_heading {
            target_speed *= cfg.straight_boost;
        } else {
            target_speed *= (1.0 - abs_err / cfg.turn_heading_span).max(cfg.min_turn_factor);
        }

        let close_range = cfg.look_ahead_distance * cfg.close_look_ahead_factor;
        let to_look_ahead = Self::flat_distance(&pos, &look_ahead);
        if close_range > EPS && to_look_ahead < close_range {
            target_speed *= (to_look_ahead / close_range).max(cfg.min_turn_factor);
        }

        if let Some(o) = opponent {
            if o.distance < cfg.avoidance_distance * 0.5 {
                target_speed *= cfg.opponent_slowdown;
            }
        }

        // ---------------------------------------------
        // 7) speed PID
        // ---------------------------------------------
        let speed_error = target_speed - mps_to_mph(state.forward_speed);
        let accel = self.speed_pid.update(speed_error, dt);

        self.debug.heading_error = heading_error;
        self.debug.steer_pid = steer_pid;
        self.debug.wall_correction = wall;
        self.debug.opponent_correction = opp_steer;
        self.debug.target_speed_mph = target_speed;

        ControlInput {
            engine: accel.max(0.0).clamp(0.0, 1.0),
            steer,
            brake: (-accel).max(0.0).clamp(0.0, 1.0),
        }
        .clamped()
    }
}

impl ControlSource for AiDriver {
    fn poll(&mut self, ctx: &ControlContext<'_>, dt: f32) -> ControlInput {
        self.update(ctx.vehicle, ctx.opponents, ctx.probe, dt)
    }

    fn reset(&mut self) {
        AiDriver::reset(self);
    }

    fn debug(&self) -> Option<&AiDebug> {
        Some(&self.debug)
    }
}
