// Headless scenarios against a real rapier world.

use std::sync::Arc;

use rapier3d::na::{Point3, Vector3};
use rapier3d::prelude::*;

use race_core::config::{AiDriverConfig, RaceConfig, VehicleConfig};
use race_core::control::{ConstantControls, ControlInput};
use race_core::session::{RaceEvent, RacePhase, RaceSession, Role};
use race_core::{AiDriver, PhysicsWorld, PidController, SpawnPose, Vehicle, WaypointLoop};

const DT: f32 = 1.0 / 60.0;

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

/// Teleport the car to `d` meters along the loop and run one fixed step.
fn place_and_step(session: &mut RaceSession, body: RigidBodyHandle, track: &WaypointLoop, d: f32) -> Vec<RaceEvent> {
    let p = track.point_at_distance(d);
    if let Some(rb) = session.physics_mut().bodies.get_mut(body) {
        rb.set_translation(vector![p.x, p.y + 0.5, p.z], true);
        rb.set_linvel(vector![0.0, 0.0, 0.0], true);
    }
    session.step_once()
}

#[test]
fn full_throttle_down_the_first_straight() {
    let track = square();
    let mut physics = PhysicsWorld::new();
    let pose = SpawnPose::facing([0.0, 1.2, 0.0], track.point(0), track.point(1));
    let mut car = Vehicle::spawn(&mut physics, &VehicleConfig::roadster(), pose).unwrap();

    let mut ai = AiDriver::new(track.clone(), AiDriverConfig::default()).unwrap();
    ai.set_target_index(0);

    let start = car.state(&physics).unwrap().position;
    let throttle = ControlInput::new(1.0, 0.0, 0.0);

    for _ in 0..300 {
        let state = car.state(&physics).unwrap();
        ai.update(&state, &[], Some(&physics), DT);
        car.update(&mut physics, DT, throttle);
        physics.step(DT);
    }

    let end = car.state(&physics).unwrap();
    let displacement = end.position - start;
    assert!(displacement.dot(&Vector3::z()) > 0.0, "moved {displacement:?}");
    assert!(end.position.coords.iter().all(|c| c.is_finite()));
    assert!(ai.advance_count() >= 1);
    assert_ne!(ai.target_index(), Some(0));
}

#[test]
fn open_track_steering_is_pid_only() {
    let track = square();
    let physics = PhysicsWorld::new(); // ground only, no walls
    let cfg = AiDriverConfig::default();
    let mut ai = AiDriver::new(track, cfg.clone()).unwrap();
    let mut reference = PidController::new(cfg.steer_pid);

    let mut state = race_core::VehicleState::at_rest(Point3::new(4.0, 0.9, 30.0));
    state.forward = Vector3::new(-0.3, 0.0, 1.0).normalize();

    for _ in 0..10 {
        let out = ai.update(&state, &[], Some(&physics), DT);
        let debug = ai.debug();
        assert_eq!(debug.wall_correction, 0.0);
        assert_eq!(debug.opponent_correction, 0.0);
        assert_eq!(debug.probes.len(), 3);
        assert!(debug.probes.iter().all(|r| r.hit.is_none()));

        let pid = reference.update(debug.heading_error, DT);
        assert_eq!(out.steer, pid.clamp(-1.0, 1.0));
    }
}

#[test]
fn wall_ahead_bends_the_steering() {
    let track = square();
    let mut physics = PhysicsWorld::new();
    physics.add_wall([0.0, 1.0, 15.0], [20.0, 2.0, 0.5], 0.0);

    let mut ai = AiDriver::new(track, AiDriverConfig::default()).unwrap();
    let state = race_core::VehicleState::at_rest(Point3::new(0.0, 0.9, 10.0));

    ai.update(&state, &[], Some(&physics), DT);
    let debug = ai.debug();
    assert!(debug.probes.iter().all(|r| r.hit.is_some()));
    assert!(debug.wall_correction > 0.0);
}

#[test]
fn session_counts_a_lap_and_finishes_the_player() {
    let race = RaceConfig { total_laps: 1, countdown_seconds: 0.0, ..RaceConfig::default() };
    let mut session = RaceSession::new(race, VehicleConfig::roadster(), square()).unwrap();

    let pose = session.grid_pose(0);
    let player = session
        .add_car("player", Role::Player, pose, Box::new(ConstantControls(ControlInput::NEUTRAL)))
        .unwrap();
    session.start().unwrap();
    assert_eq!(session.tracker().unwrap().finish_index(), 0);

    let body = session.vehicle(player).unwrap().body();
    let track = session.track().clone();

    // carry the car around the loop, 2 m per step
    let mut events = Vec::new();
    let mut d = 398.0;
    while d <= 806.0 && session.phase() != RacePhase::Finished {
        events.extend(place_and_step(&mut session, body, &track, d));
        d += 2.0;
    }

    let laps: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, RaceEvent::LapCompleted { .. }))
        .collect();
    assert_eq!(laps.len(), 1);
    assert!(events.contains(&RaceEvent::CarFinished {
        car: player,
        place: 1,
        race_time: session.race_time()
    }));
    assert_eq!(events.last(), Some(&RaceEvent::RaceFinished));
    assert_eq!(session.phase(), RacePhase::Finished);

    let times = session.lap_times(player).unwrap();
    assert_eq!(times.laps.len(), 1);
    assert!(times.best.unwrap() > 0.0);

    let standings = session.standings();
    assert!(standings[0].finished);
    assert_eq!(standings[0].laps_completed, 1);
}

#[test]
fn rocking_over_the_line_is_one_lap() {
    let race = RaceConfig { total_laps: 3, countdown_seconds: 0.0, ..RaceConfig::default() };
    let mut session = RaceSession::new(race, VehicleConfig::roadster(), square()).unwrap();

    let pose = session.grid_pose(0);
    let player = session
        .add_car("player", Role::Player, pose, Box::new(ConstantControls(ControlInput::NEUTRAL)))
        .unwrap();
    session.start().unwrap();

    let body = session.vehicle(player).unwrap().body();
    let track = session.track().clone();

    let mut events = Vec::new();
    let mut d = 398.0;
    while d <= 790.0 {
        events.extend(place_and_step(&mut session, body, &track, d));
        d += 2.0;
    }
    for _ in 0..4 {
        events.extend(place_and_step(&mut session, body, &track, 799.7));
        events.extend(place_and_step(&mut session, body, &track, 800.3));
    }
    // back out past the wrap and drive through it again
    for d in [770.0, 740.0, 760.0, 780.0, 810.0] {
        events.extend(place_and_step(&mut session, body, &track, d));
    }

    let laps: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            RaceEvent::LapCompleted { lap, .. } => Some(*lap),
            _ => None,
        })
        .collect();
    assert_eq!(laps, vec![1]);
    assert_eq!(session.lap_times(player).unwrap().laps.len(), 1);
    assert_eq!(session.phase(), RacePhase::Racing);
    assert_eq!(session.standings()[0].laps_completed, 1);
}
