// src/control.rs
//
// ==============================================================================
// CONTROL INPUT BOUNDARY
// ------------------------------------------------------------------------------
// Every driver (keyboard, AI, replay) produces the same normalized triple:
//   engine ∈ [-1, 1]   (negative = reverse request)
//   steer  ∈ [-1, 1]   (positive = toward the chassis' left)
//   brake  ∈ [ 0, 1]
// The vehicle never reads input state itself; the session polls a
// `ControlSource` once per fixed step and hands the result to `Vehicle::update`.
// ==============================================================================

use rapier3d::na::Point3;
use serde::{Deserialize, Serialize};

use crate::debug::AiDebug;
use crate::physics::RayProbe;
use crate::vehicle::VehicleState;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlInput {
    pub engine: f32,
    pub steer: f32,
    pub brake: f32,
}

impl ControlInput {
    pub const NEUTRAL: ControlInput = ControlInput { engine: 0.0, steer: 0.0, brake: 0.0 };

    /// Safe output for states the AI cannot resolve this tick.
    pub const COAST_AND_BRAKE: ControlInput = ControlInput { engine: 0.0, steer: 0.0, brake: 1.0 };

    pub const fn new(engine: f32, steer: f32, brake: f32) -> Self {
        Self { engine, steer, brake }
    }

    /// Clamp to the valid ranges; NaN becomes 0.
    pub fn clamped(self) -> Self {
        fn clean(v: f32, lo: f32, hi: f32) -> f32 {
            if v.is_nan() { 0.0 } else { v.clamp(lo, hi) }
        }
        Self {
            engine: clean(self.engine, -1.0, 1.0),
            steer: clean(self.steer, -1.0, 1.0),
            brake: clean(self.brake, 0.0, 1.0),
        }
    }
}

/// What a driver may look at when deciding its next input.
pub struct ControlContext<'a> {
    pub vehicle: &'a VehicleState,
    pub opponents: &'a [Point3<f32>],
    pub probe: Option<&'a dyn RayProbe>,
}

pub trait ControlSource {
    fn poll(&mut self, ctx: &ControlContext<'_>, dt: f32) -> ControlInput;

    /// Forget accumulated state (controller integrals, replay clock, ...).
    fn reset(&mut self) {}

    /// What the driver looked at on its last poll, if it keeps such a record.
    fn debug(&self) -> Option<&AiDebug> {
        None
    }
}

// --------------------------------------------------
// Keyboard-style digital input
// --------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalControls {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub brake: bool,
}

#[derive(Debug, Clone)]
pub struct HumanInput {
    keys: DigitalControls,
    engine: f32,
    ramp_rate: Option<f32>, // engine change per second, None = instant
}

impl Default for HumanInput {
    fn default() -> Self {
        Self::new(Some(0.75))
    }
}

impl HumanInput {
    pub fn new(ramp_rate: Option<f32>) -> Self {
        Self {
            keys: DigitalControls::default(),
            engine: 0.0,
            ramp_rate: ramp_rate.filter(|r| *r > 0.0 && r.is_finite()),
        }
    }

    pub fn set_keys(&mut self, keys: DigitalControls) {
        self.keys = keys;
    }

    pub fn keys(&self) -> DigitalControls {
        self.keys
    }
}

fn axis(pos: bool, neg: bool) -> f32 {
    (pos as i8 - neg as i8) as f32
}

impl ControlSource for HumanInput {
    fn poll(&mut self, _ctx: &ControlContext<'_>, dt: f32) -> ControlInput {
        let target = axis(self.keys.forward, self.keys.backward);
        self.engine = match self.ramp_rate {
            Some(rate) if dt > 0.0 => {
                let step = rate * dt;
                self.engine + (target - self.engine).clamp(-step, step)
            }
            Some(_) => self.engine,
            None => target,
        };

        ControlInput {
            engine: self.engine,
            steer: axis(self.keys.left, self.keys.right),
            brake: if self.keys.brake { 1.0 } else { 0.0 },
        }
        .clamped()
    }

    fn reset(&mut self) {
        self.engine = 0.0;
    }
}

// --------------------------------------------------
// Fixed and replayed inputs
// --------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct ConstantControls(pub ControlInput);

impl ControlSource for ConstantControls {
    fn poll(&mut self, _ctx: &ControlContext<'_>, _dt: f32) -> ControlInput {
        self.0.clamped()
    }
}

/// Replays `(time, input)` keyframes; each input holds until the next one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptedControls {
    frames: Vec<(f32, ControlInput)>,
    #[serde(skip)]
    clock: f32,
}

impl ScriptedControls {
    pub fn new(mut frames: Vec<(f32, ControlInput)>) -> Self {
        frames.retain(|(t, _)| t.is_finite());
        frames.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { frames, clock: 0.0 }
    }

    pub fn clock(&self) -> f32 {
        self.clock
    }

    fn current(&self) -> ControlInput {
        let i = self.frames.partition_point(|(t, _)| *t <= self.clock);
        match i {
            0 => ControlInput::NEUTRAL,
            i => self.frames[i - 1].1,
        }
    }
}

impl ControlSource for ScriptedControls {
    fn poll(&mut self, _ctx: &ControlContext<'_>, dt: f32) -> ControlInput {
        if dt > 0.0 {
            self.clock += dt;
        }
        self.current().clamped()
    }

    fn reset(&mut self) {
        self.clock = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_state() -> VehicleState {
        VehicleState::at_rest(Point3::origin())
    }

    fn poll(src: &mut dyn ControlSource, dt: f32) -> ControlInput {
        let state = ctx_state();
        let ctx = ControlContext { vehicle: &state, opponents: &[], probe: None };
        src.poll(&ctx, dt)
    }

    #[test]
    fn clamped_scrubs_nan_and_range() {
        let c = ControlInput::new(f32::NAN, 3.0, -1.0).clamped();
        assert_eq!(c, ControlInput::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn human_input_ramps_throttle() {
        let mut h = HumanInput::new(Some(0.75));
        h.set_keys(DigitalControls { forward: true, left: true, ..Default::default() });

        let first = poll(&mut h, 0.1);
        assert!((first.engine - 0.075).abs() < 1e-6);
        assert_eq!(first.steer, 1.0);

        for _ in 0..20 {
            poll(&mut h, 0.1);
        }
        assert_eq!(poll(&mut h, 0.1).engine, 1.0);
    }

    #[test]
    fn human_input_instant_without_ramp() {
        let mut h = HumanInput::new(None);
        h.set_keys(DigitalControls { backward: true, right: true, brake: true, ..Default::default() });
        assert_eq!(poll(&mut h, 1.0 / 60.0), ControlInput::new(-1.0, -1.0, 1.0));
    }

    #[test]
    fn script_holds_last_keyframe() {
        let mut s = ScriptedControls::new(vec![
            (1.0, ControlInput::new(0.0, 0.5, 0.0)),
            (0.0, ControlInput::new(1.0, 0.0, 0.0)),
        ]);
        assert_eq!(poll(&mut s, 0.5).engine, 1.0);
        assert_eq!(poll(&mut s, 0.6).steer, 0.5);
        s.reset();
        assert_eq!(s.clock(), 0.0);
    }
}
