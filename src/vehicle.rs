// src/vehicle.rs
//
// ==============================================================================
// VEHICLE — chassis rigid body + rapier raycast vehicle controller
// ------------------------------------------------------------------------------
// Per fixed step (`update`):
//   1) clamp input, smooth throttle
//   2) auto-sleep / wake
//   3) rpm from wheel speed through the current ratio, smoothed
//   4) gearbox transition
//   5) engine force = max * pedal * torque(rpm) * launch(speed) * ratio/first
//      (zero in neutral or while shifting)
//   6) write per-wheel engine / steering / brake and let rapier cast the wheels
//
// Chassis frame: +Z forward, +Y up, +X left. Positive steering turns toward +X.
// ==============================================================================

use rapier3d::control::{DynamicRayCastVehicleController, WheelTuning};
use rapier3d::na::{Point3, UnitQuaternion, Vector3};
use rapier3d::prelude::*;

use crate::config::VehicleConfig;
use crate::control::ControlInput;
use crate::drivetrain::engine::{
    free_rev_rpm, launch_scale, smooth_rpm, smooth_throttle, target_rpm, torque_factor,
};
use crate::drivetrain::{mps_to_mph, Gear, Gearbox, ShiftEvent};
use crate::error::ConfigError;
use crate::physics::{p3, PhysicsWorld, GROUP_CHASSIS, GROUP_GROUND, GROUP_WALL};

const FORWARD_AXIS: usize = 2;
const UP_AXIS: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnPose {
    pub position: [f32; 3],
    pub yaw: f32, // radians about +Y, 0 = facing +Z
}

impl SpawnPose {
    /// Facing from `from` toward `to` in the XZ plane.
    pub fn facing(position: [f32; 3], from: Point3<f32>, to: Point3<f32>) -> Self {
        let d = to - from;
        let yaw = if d.x.abs() + d.z.abs() > 1e-6 { d.x.atan2(d.z) } else { 0.0 };
        Self { position, yaw }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelState {
    pub hard_point: [f32; 3],
    pub contact_point: [f32; 3],
    pub in_contact: bool,
    pub suspension_length: f32,
    pub steering: f32,     // radians
    pub engine_force: f32,
    pub brake: f32,
}

/// Read-back after a physics step. Everything a driver or HUD needs.
#[derive(Debug, Clone)]
pub struct VehicleState {
    pub position: Point3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub forward: Vector3<f32>, // unit, chassis +Z in world space
    pub linvel: Vector3<f32>,
    pub speed: f32,            // m/s
    pub speed_mph: f32,
    pub forward_speed: f32,    // signed, m/s
    pub rpm: f32,
    pub gear: Gear,
    pub shifting: bool,
    pub asleep: bool,
    pub wheels: Vec<WheelState>,
}

impl VehicleState {
    /// Stationary, facing +Z, no wheel data.
    pub fn at_rest(position: Point3<f32>) -> Self {
        Self {
            position,
            rotation: UnitQuaternion::identity(),
            forward: Vector3::z(),
            linvel: Vector3::zeros(),
            speed: 0.0,
            speed_mph: 0.0,
            forward_speed: 0.0,
            rpm: 0.0,
            gear: Gear::Neutral,
            shifting: false,
            asleep: false,
            wheels: Vec::new(),
        }
    }

    pub fn all_wheels_in_contact(&self) -> bool {
        !self.wheels.is_empty() && self.wheels.iter().all(|w| w.in_contact)
    }
}

pub struct Vehicle {
    body: RigidBodyHandle,                       // the chassis body
    controller: DynamicRayCastVehicleController, // rapier wheel rays
    config: VehicleConfig,                       // immutable after spawn
    throttle: f32,                               // smoothed engine pedal
    rpm: f32,
    gearbox: Gearbox,
    asleep: bool,
    last_input: ControlInput,
}

impl Vehicle {
    /// Create the chassis and its wheels. Fails only on invalid config.
    pub fn spawn(physics: &mut PhysicsWorld, config: &VehicleConfig, pose: SpawnPose) -> Result<Self, ConfigError> {
        config.validate()?;

        let [x, y, z] = pose.position;
        let chassis = &config.chassis;

        let rb = RigidBodyBuilder::dynamic()
            .translation(vector![x, y, z])
            .rotation(vector![0.0, pose.yaw, 0.0])
            .linear_damping(chassis.linear_damping)
            .angular_damping(chassis.angular_damping)
            .ccd_enabled(true)
            .build();

        let [hx, hy, hz] = chassis.half_extents;
        let [cx, cy, cz] = chassis.collider_offset;
        let collider = ColliderBuilder::cuboid(hx, hy, hz)
            .translation(vector![cx, cy, cz]) // lowered collider = lower COM
            .collision_groups(InteractionGroups::new(
                GROUP_CHASSIS,
                GROUP_GROUND | GROUP_WALL | GROUP_CHASSIS,
            ))
            .density(chassis.density)
            .friction(chassis.friction)
            .restitution(0.0)
            .build();

        let body = physics.bodies.insert(rb);
        physics.colliders.insert_with_parent(collider, body, &mut physics.bodies);

        let s = &config.suspension;
        let tuning = WheelTuning {
            suspension_stiffness: s.stiffness,
            suspension_compression: s.compression,
            suspension_damping: s.relaxation,
            max_suspension_travel: s.max_travel,
            side_friction_stiffness: s.side_friction_stiffness,
            friction_slip: s.friction_slip,
            max_suspension_force: s.max_force,
        };

        let mut controller = DynamicRayCastVehicleController::new(body);
        controller.index_up_axis = UP_AXIS;
        controller.index_forward_axis = FORWARD_AXIS;

        // axle -X with the ray pointing down gives a +Z rolling direction
        for w in &config.wheels {
            let [wx, wy, wz] = w.position;
            controller.add_wheel(
                point![wx, wy, wz],
                -Vector::y(),
                -Vector::x(),
                s.rest_length,
                s.wheel_radius,
                &tuning,
            );
        }

        log::info!(
            "spawned vehicle body {:?} at {:?} yaw {:.2} with {} wheels",
            body,
            pose.position,
            pose.yaw,
            config.wheels.len()
        );

        Ok(Self {
            body,
            controller,
            config: config.clone(),
            throttle: 0.0,
            rpm: config.engine.idle_rpm,
            gearbox: Gearbox::new(),
            asleep: false,
            last_input: ControlInput::NEUTRAL,
        })
    }

    pub fn body(&self) -> RigidBodyHandle {
        self.body
    }

    pub fn config(&self) -> &VehicleConfig {
        &self.config
    }

    pub fn rpm(&self) -> f32 {
        self.rpm
    }

    pub fn gear(&self) -> Gear {
        self.gearbox.gear()
    }

    pub fn throttle(&self) -> f32 {
        self.throttle
    }

    pub fn is_asleep(&self) -> bool {
        self.asleep
    }

    pub fn last_input(&self) -> ControlInput {
        self.last_input
    }

    /// Apply one fixed step of input. Call before `PhysicsWorld::step`.
    pub fn update(&mut self, physics: &mut PhysicsWorld, dt: f32, input: ControlInput) -> Option<ShiftEvent> {
        let input = input.clamped();
        self.last_input = input;

        if !(dt > 0.0) {
            return None;
        }

        let (linvel, forward, resting) = {
            let body = physics.bodies.get(self.body)?;
            (*body.linvel(), body.rotation() * Vector::z(), body.is_sleeping())
        };
        let speed = if linvel.norm().is_finite() { linvel.norm() } else { 0.0 };
        let forward_speed = if speed > 0.0 { linvel.dot(&forward) } else { 0.0 };

        let engine_cfg = &self.config.engine;
        self.throttle = smooth_throttle(self.throttle, input.engine, engine_cfg.throttle_response_time, dt);

        // ---------------------------------------------
        // Auto-sleep
        // ---------------------------------------------
        let th = self.config.sleep.input_threshold;
        let idle_input = input.engine.abs() < th && input.steer.abs() < th && input.brake < th;

        if !idle_input {
            if self.asleep {
                log::debug!("vehicle {:?} woke up", self.body);
                self.asleep = false;
            }
            if let Some(body) = physics.bodies.get_mut(self.body) {
                body.wake_up(true);
            }
        } else if self.asleep {
            if resting {
                return None;
            }
            // knocked awake by a contact: wheels take the load again
            log::debug!("vehicle {:?} disturbed while asleep", self.body);
            self.asleep = false;
        } else if resting || (speed < self.config.sleep.speed_threshold && self.all_wheels_grounded()) {
            self.put_to_sleep(physics);
            return None;
        }

        // ---------------------------------------------
        // RPM + gearbox
        // ---------------------------------------------
        let gb_cfg = &self.config.gearbox;
        let wheel_omega = forward_speed / self.config.suspension.wheel_radius;
        let target = match self.gearbox.overall_ratio(gb_cfg) {
            Some(ratio) => target_rpm(engine_cfg, wheel_omega, ratio),
            None => free_rev_rpm(engine_cfg, self.throttle),
        };
        self.rpm = smooth_rpm(engine_cfg, self.rpm, target, dt);

        let shift = self.gearbox.update(gb_cfg, dt, input.engine, forward_speed, self.rpm);
        if let Some(ev) = shift {
            log::debug!(
                "vehicle {:?} shift {:?} -> {:?} at {:.0} rpm",
                self.body,
                ev.from,
                ev.to,
                self.rpm
            );
        }

        // ---------------------------------------------
        // Wheel forces
        // ---------------------------------------------
        let gear = self.gearbox.gear();
        let pedal = match gear {
            Gear::Forward(_) => self.throttle.max(0.0),
            Gear::Reverse => (-self.throttle).max(0.0),
            Gear::Neutral => 0.0,
        };

        let drive_force = if self.gearbox.is_shifting(gb_cfg) {
            0.0
        } else {
            engine_cfg.max_engine_force
                * pedal
                * torque_factor(engine_cfg, self.rpm)
                * launch_scale(engine_cfg, mps_to_mph(speed))
                * self.gearbox.force_multiplier(gb_cfg)
        };
        let drive_force = if drive_force.is_finite() { drive_force } else { 0.0 };

        // Pedal against the direction of travel brakes before reverse engages.
        let opposing = match gear {
            Gear::Forward(_) => (-input.engine).max(0.0),
            Gear::Reverse => input.engine.max(0.0),
            Gear::Neutral => 0.0,
        };
        let brake = input.brake.max(opposing) * engine_cfg.max_brake_force;
        let steer = input.steer * engine_cfg.max_steer_angle;

        for (wheel, wc) in self.controller.wheels_mut().iter_mut().zip(&self.config.wheels) {
            wheel.engine_force = if wc.drive { drive_force } else { 0.0 };
            wheel.steering = if wc.steering { steer } else { 0.0 };
            wheel.brake = brake;
        }

        self.controller.update_vehicle(
            dt,
            &mut physics.bodies,
            &physics.colliders,
            &physics.query_pipeline,
            QueryFilter::exclude_dynamic().exclude_rigid_body(self.body),
        );

        shift
    }

    fn all_wheels_grounded(&self) -> bool {
        let wheels = self.controller.wheels();
        !wheels.is_empty() && wheels.iter().all(|w| w.raycast_info().is_in_contact)
    }

    fn put_to_sleep(&mut self, physics: &mut PhysicsWorld) {
        for wheel in self.controller.wheels_mut() {
            wheel.engine_force = 0.0;
            wheel.steering = 0.0;
            wheel.brake = 0.0;
        }
        self.throttle = 0.0;
        self.rpm = self.config.engine.idle_rpm;

        if let Some(body) = physics.bodies.get_mut(self.body) {
            body.set_linvel(vector![0.0, 0.0, 0.0], false);
            body.set_angvel(vector![0.0, 0.0, 0.0], false);
            body.sleep();
        }
        self.asleep = true;
        log::debug!("vehicle {:?} asleep", self.body);
    }

    pub fn state(&self, physics: &PhysicsWorld) -> Option<VehicleState> {
        let body = physics.bodies.get(self.body)?;
        let pos = body.position();
        let rotation = pos.rotation;
        let forward = rotation * Vector3::z();
        let linvel = *body.linvel();
        let speed = linvel.norm();

        let wheels = self
            .controller
            .wheels()
            .iter()
            .map(|w| {
                let info = w.raycast_info();
                WheelState {
                    hard_point: p3(info.hard_point_ws),
                    contact_point: p3(info.contact_point_ws),
                    in_contact: info.is_in_contact,
                    suspension_length: info.suspension_length,
                    steering: w.steering,
                    engine_force: w.engine_force,
                    brake: w.brake,
                }
            })
            .collect();

        Some(VehicleState {
            position: Point3::from(pos.translation.vector),
            rotation,
            forward,
            linvel,
            speed,
            speed_mph: mps_to_mph(speed),
            forward_speed: linvel.dot(&forward),
            rpm: self.rpm,
            gear: self.gearbox.gear(),
            shifting: self.gearbox.is_shifting(&self.config.gearbox),
            asleep: self.asleep,
            wheels,
        })
    }
}
