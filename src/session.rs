// ==============================================================================
// session.rs — RACE SESSION (PER-TICK ORCHESTRATION)
// ------------------------------------------------------------------------------
// One fixed step, strictly in this order:
//   1) phase clock      : countdown -> racing
//   2) input sampling   : neutral during countdown, drivers while racing
//   3) physics apply    : Vehicle::update for every car
//   4) physics step
//   5) read-back        : VehicleState per car
//   6) progress         : tracker samples, lap timing, finish order
//
// The host calls `update(frame_dt)`; the FixedStepper turns wall-clock time
// into a bounded number of fixed steps.
// ==============================================================================

use std::cmp::Ordering;
use std::sync::Arc;

use rapier3d::na::{Point3, Vector3};
use serde::Serialize;

use crate::ai::AiDriver;
use crate::config::{AiDriverConfig, RaceConfig, SessionConfig, VehicleConfig};
use crate::control::{ControlContext, ControlInput, ControlSource};
use crate::drivetrain::Gear;
use crate::error::ConfigError;
use crate::physics::{FixedStepper, PhysicsWorld, RayProbe};
use crate::race::{CarId, RaceProgressTracker};
use crate::state::{CarSnapshot, RaceSnapshot, WheelSnapshot};
use crate::track::WaypointLoop;
use crate::vehicle::{SpawnPose, Vehicle, VehicleState};

/// Chassis origin height above the track centerline at spawn.
const SPAWN_HEIGHT: f32 = 1.0;
const GRID_FIRST_ROW: f32 = 4.0; // meters behind the start waypoint
const GRID_ROW_SPACING: f32 = 6.0;
const GRID_HALF_WIDTH: f32 = 2.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Player,
    Ai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RacePhase {
    Countdown,
    Racing,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RaceEvent {
    CountdownTick { remaining: u32 },
    RaceStarted,
    GearShift { car: CarId, from: Gear, to: Gear },
    LapCompleted { car: CarId, lap: u32, lap_time: f32, best_lap: f32 },
    CarFinished { car: CarId, place: usize, race_time: f32 },
    RaceFinished,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LapTimes {
    pub current: f32,
    pub last: Option<f32>,
    pub best: Option<f32>,
    pub laps: Vec<f32>,
}

impl LapTimes {
    fn tick(&mut self, dt: f32) {
        self.current += dt;
    }

    /// Close the running lap. Returns (lap time, best lap).
    fn complete(&mut self) -> (f32, f32) {
        let lap = self.current;
        let best = self.best.map_or(lap, |b| b.min(lap));
        self.laps.push(lap);
        self.last = Some(lap);
        self.best = Some(best);
        self.current = 0.0;
        (lap, best)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Standing {
    pub car: CarId,
    pub name: String,
    pub place: usize,
    pub laps_completed: u32,
    pub progress: f32,
    pub finished: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Finish {
    place: usize,
    race_time: f32,
}

struct Participant {
    name: String,
    role: Role,
    vehicle: Vehicle,
    controls: Box<dyn ControlSource>,
    state: VehicleState,
    laps: LapTimes,
    finish: Option<Finish>,
}

pub struct RaceSession {
    config: RaceConfig,
    vehicle_config: VehicleConfig,
    physics: PhysicsWorld,
    track: Arc<WaypointLoop>,
    tracker: Option<RaceProgressTracker>, // built by start()
    participants: Vec<Participant>,
    stepper: FixedStepper,
    phase: RacePhase,
    countdown_left: f32,
    last_announced: Option<u32>,
    race_time: f32,
    tick: u64,
    finished_count: usize,
}

impl RaceSession {
    pub fn new(config: RaceConfig, vehicle_config: VehicleConfig, track: Arc<WaypointLoop>) -> Result<Self, ConfigError> {
        config.validate()?;
        vehicle_config.validate()?;
        if let Some(index) = config.finish_index {
            if index >= track.len() {
                return Err(ConfigError::FinishIndexOutOfRange { index, len: track.len() });
            }
        }

        log::info!(
            "race session: {} waypoints, loop {:.1} m, {} laps",
            track.len(),
            track.loop_length(),
            config.total_laps
        );

        Ok(Self {
            stepper: FixedStepper::new(config.fixed_dt, config.max_substeps),
            countdown_left: config.countdown_seconds,
            config,
            vehicle_config,
            physics: PhysicsWorld::new(),
            track,
            tracker: None,
            participants: Vec::new(),
            phase: RacePhase::Countdown,
            last_announced: None,
            race_time: 0.0,
            tick: 0,
            finished_count: 0,
        })
    }

    /// Session from a host document. Without waypoints the fallback ellipse
    /// is used.
    pub fn from_config(cfg: &SessionConfig) -> Result<Self, ConfigError> {
        let track = match &cfg.waypoints {
            Some(points) => WaypointLoop::from_arrays(points)?,
            None => WaypointLoop::fallback()?,
        };
        Self::new(cfg.race.clone(), cfg.vehicle.clone(), Arc::new(track))
    }

    pub fn track(&self) -> &Arc<WaypointLoop> {
        &self.track
    }

    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    pub fn physics_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.physics
    }

    pub fn phase(&self) -> RacePhase {
        self.phase
    }

    pub fn race_time(&self) -> f32 {
        self.race_time
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn car_count(&self) -> usize {
        self.participants.len()
    }

    pub fn vehicle(&self, car: CarId) -> Option<&Vehicle> {
        self.participants.get(car).map(|p| &p.vehicle)
    }

    pub fn car_state(&self, car: CarId) -> Option<&VehicleState> {
        self.participants.get(car).map(|p| &p.state)
    }

    pub fn lap_times(&self, car: CarId) -> Option<&LapTimes> {
        self.participants.get(car).map(|p| &p.laps)
    }

    pub fn tracker(&self) -> Option<&RaceProgressTracker> {
        self.tracker.as_ref()
    }

    /// Grid slot behind waypoint 0, two cars per row, facing waypoint 1.
    pub fn grid_pose(&self, slot: usize) -> SpawnPose {
        let start = self.track.point(0);
        let ahead = self.track.point(1);
        let fwd = Vector3::new(ahead.x - start.x, 0.0, ahead.z - start.z)
            .try_normalize(1e-6)
            .unwrap_or_else(Vector3::z);
        let left = Vector3::new(fwd.z, 0.0, -fwd.x);

        let back = GRID_FIRST_ROW + GRID_ROW_SPACING * (slot / 2) as f32;
        let side = if slot % 2 == 0 { GRID_HALF_WIDTH } else { -GRID_HALF_WIDTH };
        let p = start - fwd * back + left * side;

        SpawnPose::facing([p.x, start.y + SPAWN_HEIGHT, p.z], start, ahead)
    }

    pub fn add_car(
        &mut self,
        name: impl Into<String>,
        role: Role,
        pose: SpawnPose,
        controls: Box<dyn ControlSource>,
    ) -> Result<CarId, ConfigError> {
        let vehicle = Vehicle::spawn(&mut self.physics, &self.vehicle_config, pose)?;
        let [x, y, z] = pose.position;
        let state = vehicle
            .state(&self.physics)
            .unwrap_or_else(|| VehicleState::at_rest(Point3::new(x, y, z)));

        let id = self.participants.len();
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.add_car();
        }
        self.participants.push(Participant {
            name: name.into(),
            role,
            vehicle,
            controls,
            state,
            laps: LapTimes::default(),
            finish: None,
        });
        Ok(id)
    }

    /// Convenience: an AI-driven car on the next free grid slot.
    pub fn add_ai_car(
        &mut self,
        name: impl Into<String>,
        role: Role,
        config: AiDriverConfig,
    ) -> Result<CarId, ConfigError> {
        let driver = AiDriver::new(self.track.clone(), config)?;
        let pose = self.grid_pose(self.participants.len());
        self.add_car(name, role, pose, Box::new(driver))
    }

    /// Fix the finish line and arm the countdown.
    pub fn start(&mut self) -> Result<(), ConfigError> {
        if self.participants.is_empty() {
            return Err(ConfigError::NoCars);
        }

        let finish_index = match self.config.finish_index {
            Some(i) => i,
            None => {
                let anchor = self
                    .participants
                    .iter()
                    .find(|p| p.role == Role::Player)
                    .unwrap_or(&self.participants[0]);
                self.track.nearest_index(&anchor.state.position).0
            }
        };

        let mut tracker = RaceProgressTracker::new(self.track.clone(), finish_index)?;
        for (id, p) in self.participants.iter_mut().enumerate() {
            let car = tracker.add_car();
            debug_assert_eq!(car, id);
            tracker.update(car, &p.state.position);
            p.controls.reset();
        }
        self.tracker = Some(tracker);

        self.phase = RacePhase::Countdown;
        self.countdown_left = self.config.countdown_seconds;
        self.last_announced = None;
        self.race_time = 0.0;
        self.finished_count = 0;

        log::info!(
            "race armed: {} cars, finish at waypoint {}, countdown {:.1}s",
            self.participants.len(),
            finish_index,
            self.config.countdown_seconds
        );
        Ok(())
    }

    /// Advance by one rendered frame. Nothing happens before `start()`.
    pub fn update(&mut self, frame_dt: f32) -> Vec<RaceEvent> {
        let mut events = Vec::new();
        if self.tracker.is_none() {
            return events;
        }
        let steps = self.stepper.advance(frame_dt);
        for _ in 0..steps {
            self.fixed_step(&mut events);
        }
        events
    }

    /// Run exactly one fixed step regardless of the frame accumulator.
    pub fn step_once(&mut self) -> Vec<RaceEvent> {
        let mut events = Vec::new();
        if self.tracker.is_some() {
            self.fixed_step(&mut events);
        }
        events
    }

    fn fixed_step(&mut self, events: &mut Vec<RaceEvent>) {
        let dt = self.stepper.step();
        self.tick += 1;

        // ---------------------------------------------
        // 1) phase clock
        // ---------------------------------------------
        match self.phase {
            RacePhase::Countdown => {
                let whole = self.countdown_left.ceil().max(0.0) as u32;
                if whole > 0 && self.last_announced != Some(whole) {
                    self.last_announced = Some(whole);
                    events.push(RaceEvent::CountdownTick { remaining: whole });
                }
                self.countdown_left -= dt;
                if self.countdown_left <= 0.0 {
                    self.phase = RacePhase::Racing;
                    events.push(RaceEvent::RaceStarted);
                    log::info!("race started");
                }
            }
            RacePhase::Racing => self.race_time += dt,
            RacePhase::Finished => {}
        }

        // ---------------------------------------------
        // 2) input sampling
        // ---------------------------------------------
        let phase = self.phase;
        let positions: Vec<Point3<f32>> = self.participants.iter().map(|p| p.state.position).collect();
        let probe: &dyn RayProbe = &self.physics;

        let mut inputs = Vec::with_capacity(self.participants.len());
        for (i, p) in self.participants.iter_mut().enumerate() {
            let input = match phase {
                RacePhase::Countdown => ControlInput::NEUTRAL,
                RacePhase::Finished => ControlInput::COAST_AND_BRAKE,
                RacePhase::Racing if p.finish.is_some() => ControlInput::COAST_AND_BRAKE,
                RacePhase::Racing => {
                    let opponents: Vec<Point3<f32>> = positions
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| *j != i)
                        .map(|(_, pos)| *pos)
                        .collect();
                    let ctx = ControlContext { vehicle: &p.state, opponents: &opponents, probe: Some(probe) };
                    p.controls.poll(&ctx, dt)
                }
            };
            inputs.push(input);
        }

        // ---------------------------------------------
        // 3) apply, 4) step, 5) read back
        // ---------------------------------------------
        for (id, (p, input)) in self.participants.iter_mut().zip(inputs).enumerate() {
            if let Some(shift) = p.vehicle.update(&mut self.physics, dt, input) {
                events.push(RaceEvent::GearShift { car: id, from: shift.from, to: shift.to });
            }
        }

        self.physics.step(dt);

        for p in &mut self.participants {
            if let Some(state) = p.vehicle.state(&self.physics) {
                p.state = state;
            }
        }

        // ---------------------------------------------
        // 6) progress
        // ---------------------------------------------
        let Some(tracker) = self.tracker.as_mut() else {
            return;
        };

        let mut player_finished = false;
        for (id, p) in self.participants.iter_mut().enumerate() {
            let completed = tracker.update(id, &p.state.position);
            if phase != RacePhase::Racing || p.finish.is_some() {
                continue;
            }

            p.laps.tick(dt);
            let Some(lap) = completed else {
                continue;
            };

            let (lap_time, best_lap) = p.laps.complete();
            log::info!("{} completed lap {} in {:.2}s (best {:.2}s)", p.name, lap, lap_time, best_lap);
            events.push(RaceEvent::LapCompleted { car: id, lap, lap_time, best_lap });

            if lap >= self.config.total_laps {
                self.finished_count += 1;
                let place = self.finished_count;
                p.finish = Some(Finish { place, race_time: self.race_time });
                log::info!("{} finished P{} at {:.2}s", p.name, place, self.race_time);
                events.push(RaceEvent::CarFinished { car: id, place, race_time: self.race_time });
                player_finished |= p.role == Role::Player;
            }
        }

        if phase == RacePhase::Racing {
            let has_player = self.participants.iter().any(|p| p.role == Role::Player);
            let all_finished = self.participants.iter().all(|p| p.finish.is_some());
            if player_finished || (!has_player && all_finished) {
                self.phase = RacePhase::Finished;
                events.push(RaceEvent::RaceFinished);
                log::info!("race finished at {:.2}s", self.race_time);
            }
        }
    }

    fn compare_cars(&self, a: CarId, b: CarId) -> Ordering {
        let fa = self.participants.get(a).and_then(|p| p.finish);
        let fb = self.participants.get(b).and_then(|p| p.finish);
        match (fa, fb) {
            (Some(x), Some(y)) => x.place.cmp(&y.place),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => match &self.tracker {
                Some(t) => t.compare(a, b),
                None => a.cmp(&b),
            },
        }
    }

    /// Leader first. Finished cars keep their finishing order.
    pub fn standings(&self) -> Vec<Standing> {
        let mut ids: Vec<CarId> = (0..self.participants.len()).collect();
        ids.sort_by(|&a, &b| self.compare_cars(a, b));

        ids.into_iter()
            .enumerate()
            .map(|(i, id)| {
                let p = &self.participants[id];
                let progress = self.tracker.as_ref().and_then(|t| t.car(id));
                Standing {
                    car: id,
                    name: p.name.clone(),
                    place: i + 1,
                    laps_completed: progress.map_or(0, |c| c.laps_completed),
                    progress: progress.map_or(0.0, |c| c.metric),
                    finished: p.finish.is_some(),
                }
            })
            .collect()
    }

    pub fn snapshot(&self) -> RaceSnapshot {
        let standings = self.standings();
        let place_of = |id: CarId| standings.iter().find(|s| s.car == id).map_or(0, |s| s.place);

        let cars = self
            .participants
            .iter()
            .enumerate()
            .map(|(id, p)| {
                let s = &p.state;
                let laps_completed = self.tracker.as_ref().and_then(|t| t.car(id)).map_or(0, |c| c.laps_completed);
                let q = s.rotation.coords;
                CarSnapshot {
                    id,
                    name: p.name.clone(),
                    role: p.role,
                    position: s.position.into(),
                    rotation: [q.x, q.y, q.z, q.w],
                    speed_mph: s.speed_mph,
                    rpm: s.rpm,
                    gear: s.gear,
                    lap: (laps_completed + 1).min(self.config.total_laps),
                    laps_completed,
                    place: place_of(id),
                    finished: p.finish.is_some(),
                    lap_times: p.laps.clone(),
                    wheels: s
                        .wheels
                        .iter()
                        .map(|w| WheelSnapshot {
                            hard_point: w.hard_point,
                            contact_point: w.contact_point,
                            in_contact: w.in_contact,
                            suspension_length: w.suspension_length,
                        })
                        .collect(),
                    ai: p.controls.debug().cloned(),
                }
            })
            .collect();

        RaceSnapshot { tick: self.tick, phase: self.phase, race_time: self.race_time, cars }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ConstantControls;

    fn square() -> Arc<WaypointLoop> {
        Arc::new(
            WaypointLoop::from_arrays(&[
                [0.0, 0.5, 0.0],
                [0.0, 0.5, 100.0],
                [100.0, 0.5, 100.0],
                [100.0, 0.5, 0.0],
            ])
            .unwrap(),
        )
    }

    fn session(countdown: f32) -> RaceSession {
        let race = RaceConfig { countdown_seconds: countdown, ..RaceConfig::default() };
        RaceSession::new(race, VehicleConfig::roadster(), square()).unwrap()
    }

    #[test]
    fn start_requires_cars() {
        let mut s = session(1.0);
        assert!(matches!(s.start(), Err(ConfigError::NoCars)));
        assert!(s.update(1.0).is_empty());
    }

    #[test]
    fn rejects_finish_index_outside_loop() {
        let race = RaceConfig { finish_index: Some(9), ..RaceConfig::default() };
        assert!(RaceSession::new(race, VehicleConfig::roadster(), square()).is_err());
    }

    #[test]
    fn grid_sits_behind_start_facing_first_leg() {
        let s = session(1.0);
        let p0 = s.grid_pose(0);
        let p1 = s.grid_pose(1);
        let p2 = s.grid_pose(2);
        assert!(p0.yaw.abs() < 1e-5);
        assert!((p0.position[2] + 4.0).abs() < 1e-4);
        assert!(p0.position[0] > 0.0 && p1.position[0] < 0.0);
        assert!((p2.position[2] + 10.0).abs() < 1e-4);
    }

    #[test]
    fn countdown_announces_each_second_then_starts() {
        let mut s = session(2.0);
        s.add_car("p1", Role::Player, s.grid_pose(0), Box::new(ConstantControls(ControlInput::new(1.0, 0.0, 0.0))))
            .unwrap();
        s.start().unwrap();

        let mut events = Vec::new();
        for _ in 0..130 {
            events.extend(s.step_once());
        }
        let ticks: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                RaceEvent::CountdownTick { remaining } => Some(*remaining),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, vec![2, 1]);
        assert!(events.contains(&RaceEvent::RaceStarted));
        assert_eq!(s.phase(), RacePhase::Racing);
    }

    #[test]
    fn cars_hold_still_during_countdown() {
        let mut s = session(3.0);
        let id = s
            .add_car("p1", Role::Player, s.grid_pose(0), Box::new(ConstantControls(ControlInput::new(1.0, 0.0, 0.0))))
            .unwrap();
        s.start().unwrap();
        let z0 = s.car_state(id).unwrap().position.z;
        for _ in 0..120 {
            s.step_once();
        }
        assert_eq!(s.phase(), RacePhase::Countdown);
        assert!((s.car_state(id).unwrap().position.z - z0).abs() < 0.2);
    }

    #[test]
    fn finish_defaults_to_waypoint_nearest_player() {
        let mut s = session(0.0);
        s.add_car("ai", Role::Ai, SpawnPose { position: [98.0, 1.5, 60.0], yaw: 0.0 }, Box::new(ConstantControls(ControlInput::NEUTRAL)))
            .unwrap();
        s.add_car("p1", Role::Player, SpawnPose { position: [2.0, 1.5, 95.0], yaw: 0.0 }, Box::new(ConstantControls(ControlInput::NEUTRAL)))
            .unwrap();
        s.start().unwrap();
        assert_eq!(s.tracker().unwrap().finish_index(), 1);
    }

    #[test]
    fn lap_times_track_best() {
        let mut laps = LapTimes::default();
        laps.tick(30.0);
        assert_eq!(laps.complete(), (30.0, 30.0));
        laps.tick(25.0);
        assert_eq!(laps.complete(), (25.0, 25.0));
        laps.tick(28.0);
        assert_eq!(laps.complete(), (28.0, 25.0));
        assert_eq!(laps.laps.len(), 3);
        assert_eq!(laps.last, Some(28.0));
    }

    #[test]
    fn standings_put_leader_first() {
        let mut s = session(0.0);
        let back = s
            .add_car("back", Role::Ai, SpawnPose { position: [0.0, 1.5, 20.0], yaw: 0.0 }, Box::new(ConstantControls(ControlInput::NEUTRAL)))
            .unwrap();
        let front = s
            .add_car("front", Role::Ai, SpawnPose { position: [0.0, 1.5, 50.0], yaw: 0.0 }, Box::new(ConstantControls(ControlInput::NEUTRAL)))
            .unwrap();
        s.start().unwrap();
        s.step_once();

        let standings = s.standings();
        assert_eq!(standings[0].car, front);
        assert_eq!(standings[1].car, back);
        assert_eq!(standings[0].place, 1);

        let snap = s.snapshot();
        assert_eq!(snap.cars.len(), 2);
        assert_eq!(snap.cars[front].place, 1);
        assert!(snap.cars[back].ai.is_none());
        assert!(snap.to_json().unwrap().contains("\"phase\":\"racing\""));
    }
}
