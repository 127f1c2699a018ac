// src/physics.rs
//
// ==============================================================================
// PHYSICS WORLD — the only owner of the rapier sets
// ------------------------------------------------------------------------------
// - static ground (top face at y = 0) and optional wall barriers
// - fixed-step pipeline stepping + exploding-body guard
// - wall-only ray probe used by the AI
// - FixedStepper: frame dt -> bounded number of fixed steps
// ==============================================================================

use rapier3d::na::{Point3, Vector3};
use rapier3d::prelude::*;

pub const GROUP_GROUND: Group  = Group::from_bits_truncate(0b0001);
pub const GROUP_CHASSIS: Group = Group::from_bits_truncate(0b0010);
pub const GROUP_WALL: Group    = Group::from_bits_truncate(0b0100);

/// Anything farther than this from the origin is considered blown up.
const EXPLODED_LIMIT: f32 = 5_000.0;
const RESET_POSITION: [f32; 3] = [0.0, 2.0, 0.0];

#[inline] pub fn v3(v: Vector<Real>) -> [f32; 3] { [v.x, v.y, v.z] }
#[inline] pub fn p3(p: Point<Real>)  -> [f32; 3] { [p.x, p.y, p.z] }

/// Obstacle ray casting as seen by the AI. Returns the hit distance.
pub trait RayProbe {
    fn cast(&self, origin: Point3<f32>, dir: Vector3<f32>, max_toi: f32) -> Option<f32>;
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,               // gravity vector
    pub pipeline: PhysicsPipeline,           // physics pipeline
    pub island_manager: IslandManager,       // manages islands of bodies
    pub broad_phase: DefaultBroadPhase,      // broad-phase collision detection
    pub narrow_phase: NarrowPhase,           // collision detection
    pub bodies: RigidBodySet,                // for rigid bodies
    pub colliders: ColliderSet,              // for collision shapes
    pub joints: ImpulseJointSet,             // unused by cars, required by step
    pub multibody_joints: MultibodyJointSet, // unused by cars, required by step
    pub ccd: CCDSolver,                      // continuous collision detection
    pub query_pipeline: QueryPipeline,       // for raycasting
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsWorld {
    pub fn new() -> Self {
        let gravity = vector![0.0, -9.81, 0.0];

        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();

        // 1000 x 2 x 1000 box centered at (0, -1, 0): top surface at y = 0.
        let ground_rb = RigidBodyBuilder::fixed()
            .translation(vector![0.0, -1.0, 0.0])
            .build();
        let ground_handle = bodies.insert(ground_rb);

        let ground_collider = ColliderBuilder::cuboid(500.0, 1.0, 500.0)
            .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_CHASSIS))
            .friction(1.2)
            .restitution(0.0)
            .build();
        colliders.insert_with_parent(ground_collider, ground_handle, &mut bodies);

        log::info!(
            "ground inserted: bodies = {}, colliders = {}",
            bodies.len(),
            colliders.len()
        );

        Self {
            gravity,
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies,
            colliders,
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
        }
    }

    /// Static barrier rotated `yaw` radians about +Y. Visible to AI probes.
    pub fn add_wall(&mut self, center: [f32; 3], half_extents: [f32; 3], yaw: f32) -> ColliderHandle {
        let rb = RigidBodyBuilder::fixed()
            .translation(vector![center[0], center[1], center[2]])
            .rotation(vector![0.0, yaw, 0.0])
            .build();
        let handle = self.bodies.insert(rb);

        let [hx, hy, hz] = half_extents;
        let collider = ColliderBuilder::cuboid(hx, hy, hz)
            .collision_groups(InteractionGroups::new(GROUP_WALL, GROUP_CHASSIS))
            .friction(0.3)
            .restitution(0.1)
            .build();
        let collider = self.colliders.insert_with_parent(collider, handle, &mut self.bodies);

        // Probes must see the wall before the next step refreshes the pipeline.
        self.query_pipeline.update(&self.colliders);
        collider
    }

    pub fn step(&mut self, dt: Real) {
        if !(dt > 0.0) {
            return;
        }

        self.pipeline.step(
            &self.gravity,
            &IntegrationParameters {
                dt,
                ..IntegrationParameters::default()
            },
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );

        self.reset_exploded_bodies();
    }

    /// Safety: put bodies that left the world (or went NaN) back above the origin.
    fn reset_exploded_bodies(&mut self) {
        for (handle, body) in self.bodies.iter_mut() {
            if !body.is_dynamic() {
                continue;
            }
            let pos = *body.translation();
            let bad = !pos.iter().all(|c| c.is_finite() && c.abs() <= EXPLODED_LIMIT);

            if bad {
                let [x, y, z] = RESET_POSITION;
                body.set_translation(vector![x, y, z], true);
                body.set_linvel(vector![0.0, 0.0, 0.0], true);
                body.set_angvel(vector![0.0, 0.0, 0.0], true);
                log::warn!("reset exploding body {:?} (was at {:?})", handle, v3(pos));
            }
        }
    }

    /// Closest hit against everything except `exclude`, or `None`.
    pub fn cast_ray(
        &self,
        origin: Point<Real>,
        dir: Vector<Real>,
        max_toi: Real,
        filter: QueryFilter,
    ) -> Option<(ColliderHandle, Real)> {
        let ray = Ray::new(origin, dir);
        self.query_pipeline
            .cast_ray(&self.bodies, &self.colliders, &ray, max_toi, true, filter)
    }
}

impl RayProbe for PhysicsWorld {
    fn cast(&self, origin: Point3<f32>, dir: Vector3<f32>, max_toi: f32) -> Option<f32> {
        let filter = QueryFilter::default()
            .groups(InteractionGroups::new(GROUP_CHASSIS, GROUP_WALL));
        self.cast_ray(origin, dir, max_toi, filter).map(|(_, toi)| toi)
    }
}

// ------------------------------------------------------------------------------
// Fixed-step accumulator
// ------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FixedStepper {
    step: f32,
    max_steps: u32,
    accumulator: f32,
}

impl FixedStepper {
    pub fn new(step: f32, max_steps: u32) -> Self {
        let step = if step > 0.0 && step.is_finite() { step } else { 1.0 / 60.0 };
        Self { step, max_steps: max_steps.max(1), accumulator: 0.0 }
    }

    pub fn step(&self) -> f32 {
        self.step
    }

    pub fn accumulator(&self) -> f32 {
        self.accumulator
    }

    /// Number of fixed steps owed for this frame. Backlog beyond
    /// `max_steps` is dropped.
    pub fn advance(&mut self, frame_dt: f32) -> u32 {
        if frame_dt.is_finite() && frame_dt > 0.0 {
            self.accumulator += frame_dt;
        }

        let mut steps = 0;
        while self.accumulator >= self.step && steps < self.max_steps {
            self.accumulator -= self.step;
            steps += 1;
        }

        if self.accumulator >= self.step {
            self.accumulator %= self.step;
        }
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stepper_carries_remainder() {
        let mut s = FixedStepper::new(0.01, 5);
        assert_eq!(s.advance(0.025), 2);
        assert!((s.accumulator() - 0.005).abs() < 1e-5);
        assert_eq!(s.advance(0.006), 1);
    }

    #[test]
    fn stepper_drops_backlog_after_hitch() {
        let mut s = FixedStepper::new(1.0 / 60.0, 3);
        assert_eq!(s.advance(1.0), 3);
        assert!(s.accumulator() < s.step());
        assert!(s.advance(0.0) <= 1);
    }

    #[test]
    fn stepper_ignores_bad_frame_dt() {
        let mut s = FixedStepper::new(1.0 / 60.0, 3);
        assert_eq!(s.advance(-1.0), 0);
        assert_eq!(s.advance(f32::NAN), 0);
        assert_eq!(s.advance(f32::INFINITY), 0);
        assert_eq!(s.accumulator(), 0.0);
    }

    #[test]
    fn ground_is_static_and_below_origin() {
        let world = PhysicsWorld::new();
        assert_eq!(world.bodies.len(), 1);
        assert_eq!(world.colliders.len(), 1);
        let (_, ground) = world.bodies.iter().next().unwrap();
        assert!(ground.is_fixed());
    }

    #[test]
    fn probe_sees_walls_not_ground() {
        let mut world = PhysicsWorld::new();
        world.add_wall([0.0, 1.0, 10.0], [5.0, 1.0, 0.5], 0.0);

        let origin = Point3::new(0.0, 0.5, 0.0);
        let hit = world.cast(origin, Vector3::z(), 20.0).unwrap();
        assert!((hit - 9.5).abs() < 1e-3);

        // straight down hits only the ground, which probes ignore
        assert!(world.cast(origin, -Vector3::y(), 5.0).is_none());
    }

    #[test]
    fn exploded_body_is_put_back() {
        let mut world = PhysicsWorld::new();
        let h = world.bodies.insert(
            RigidBodyBuilder::dynamic()
                .translation(vector![9_000.0, 0.0, 0.0])
                .build(),
        );
        world.colliders.insert_with_parent(
            ColliderBuilder::ball(0.5).build(),
            h,
            &mut world.bodies,
        );
        world.step(1.0 / 60.0);
        let t = world.bodies[h].translation();
        assert!(t.x.abs() < 1.0);
        assert!(world.bodies[h].linvel().norm() < 1e-6);
    }
}
