// ==============================================================================
// pid.rs — PROPORTIONAL / INTEGRAL / DERIVATIVE CORRECTION
// ------------------------------------------------------------------------------
// output = kp * e + ki * ∫e dt + kd * de/dt
//
// - The integral is clamped to ±integral_clamp every update (anti-windup).
// - dt <= 0 (or NaN) falls back to one 60 Hz frame so the derivative never
//   divides by zero.
// - reset() must be called whenever the owner stops driving the loop, so a
//   later engagement does not inherit stale integral / derivative state.
// ==============================================================================

use serde::{Deserialize, Serialize};

const FALLBACK_DT: f32 = 1.0 / 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub integral_clamp: f32, // |∫e dt| never exceeds this
}

impl PidGains {
    pub const fn new(kp: f32, ki: f32, kd: f32, integral_clamp: f32) -> Self {
        Self { kp, ki, kd, integral_clamp }
    }
}

impl Default for PidGains {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }
}

#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,
    integral: f32,
    prev_error: f32,
}

impl PidController {
    pub fn new(gains: PidGains) -> Self {
        let integral_clamp = if gains.integral_clamp.is_finite() {
            gains.integral_clamp.max(0.0)
        } else {
            0.0
        };

        Self {
            gains: PidGains { integral_clamp, ..gains },
            integral: 0.0,
            prev_error: 0.0,
        }
    }

    pub fn gains(&self) -> &PidGains {
        &self.gains
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
    }

    pub fn update(&mut self, error: f32, dt: f32) -> f32 {
        let dt = if dt > 0.0 { dt } else { FALLBACK_DT };
        let clamp = self.gains.integral_clamp;

        self.integral = (self.integral + error * dt).clamp(-clamp, clamp);

        let derivative = (error - self.prev_error) / dt;
        self.prev_error = error;

        self.gains.kp * error + self.gains.ki * self.integral + self.gains.kd * derivative
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn proportional_only() {
        let mut pid = PidController::new(PidGains::new(2.0, 0.0, 0.0, 1.0));
        assert!((pid.update(0.25, 0.1) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn integral_accumulates_then_clamps() {
        let mut pid = PidController::new(PidGains::new(0.0, 1.0, 0.0, 0.3));
        let first = pid.update(1.0, 0.1);
        assert!((first - 0.1).abs() < 1e-6);

        for _ in 0..20 {
            pid.update(1.0, 0.1);
        }
        assert!((pid.integral() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn zero_dt_uses_frame_fallback() {
        let mut pid = PidController::new(PidGains::new(0.0, 0.0, 1.0, 1.0));
        let out = pid.update(1.0, 0.0);
        assert!(out.is_finite());
        assert!((out - 60.0).abs() < 1e-3);

        let out = pid.update(1.0, -5.0);
        assert!(out.abs() < 1e-6);
    }

    #[test]
    fn negative_clamp_is_treated_as_zero() {
        let mut pid = PidController::new(PidGains::new(0.0, 1.0, 0.0, -4.0));
        pid.update(10.0, 1.0);
        assert_eq!(pid.integral(), 0.0);
    }

    #[test]
    fn reset_forgets_history() {
        let gains = PidGains::new(1.2, 0.4, 0.35, 0.5);
        let mut used = PidController::new(gains);
        for i in 0..50 {
            used.update((i as f32 * 0.7).sin() * 3.0, 1.0 / 60.0);
        }
        used.reset();

        let mut fresh = PidController::new(gains);
        let a = used.update(0.42, 0.02);
        let b = fresh.update(0.42, 0.02);
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn integral_never_exceeds_clamp(
            clamp in 0.0f32..5.0,
            samples in prop::collection::vec((-100.0f32..100.0, -0.1f32..0.5), 1..200),
        ) {
            let mut pid = PidController::new(PidGains::new(1.0, 1.0, 1.0, clamp));
            for (error, dt) in samples {
                pid.update(error, dt);
                prop_assert!(pid.integral().abs() <= clamp + 1e-6);
            }
        }
    }
}
