// ==============================================================================
// engine.rs — ENGINE CURVES (PURE FUNCTIONS)
// ------------------------------------------------------------------------------
// - throttle smoothing : exponential blend, time constant = response time
// - target rpm         : |ω_wheel| * gear ratio * final drive, in [idle, max]
// - rpm smoothing      : linear interpolation toward target, result in [idle, max]
// - free rev           : neutral rpm from pedal position alone
// - torque factor      : 1.0 at idle falling linearly to min_torque_factor at max
// - launch scale       : launch_min_scale at 0 mph ramping to 1.0 at launch speed
//
// None of these functions return NaN for finite config; non-finite inputs
// degrade to the idle / neutral value.
// ==============================================================================

use std::f32::consts::PI;

use crate::config::EngineConfig;

pub const MS_TO_MPH: f32 = 2.236_936;

const RAD_PER_SEC_TO_RPM: f32 = 60.0 / (2.0 * PI);

#[inline]
pub fn mps_to_mph(speed: f32) -> f32 {
    speed * MS_TO_MPH
}

/// One step of the exponential throttle filter. `dt <= 0` leaves the value as is.
pub fn smooth_throttle(current: f32, target: f32, response_time: f32, dt: f32) -> f32 {
    if !(dt > 0.0) || !target.is_finite() {
        return current;
    }
    let tau = response_time.max(1e-3);
    let alpha = 1.0 - (-dt / tau).exp();
    current + (target - current) * alpha
}

/// Engine rpm implied by the wheel spin through the current overall ratio.
pub fn target_rpm(cfg: &EngineConfig, wheel_omega: f32, overall_ratio: f32) -> f32 {
    let rpm = wheel_omega.abs() * RAD_PER_SEC_TO_RPM * overall_ratio.abs();
    clamp_rpm(cfg, rpm)
}

/// Out of gear the engine revs with the pedal alone.
pub fn free_rev_rpm(cfg: &EngineConfig, throttle: f32) -> f32 {
    let t = if throttle.is_finite() { throttle.abs().min(1.0) } else { 0.0 };
    clamp_rpm(cfg, cfg.idle_rpm + (cfg.max_rpm - cfg.idle_rpm) * t)
}

pub fn smooth_rpm(cfg: &EngineConfig, current: f32, target: f32, dt: f32) -> f32 {
    if !(dt > 0.0) {
        return clamp_rpm(cfg, current);
    }
    let t = (cfg.rpm_smoothing * dt).clamp(0.0, 1.0);
    clamp_rpm(cfg, current + (target - current) * t)
}

pub fn clamp_rpm(cfg: &EngineConfig, rpm: f32) -> f32 {
    if rpm.is_finite() {
        rpm.clamp(cfg.idle_rpm, cfg.max_rpm)
    } else {
        cfg.idle_rpm
    }
}

/// 0 at idle, 1 at the limiter.
pub fn normalized_rpm(cfg: &EngineConfig, rpm: f32) -> f32 {
    let span = (cfg.max_rpm - cfg.idle_rpm).max(1.0);
    ((clamp_rpm(cfg, rpm) - cfg.idle_rpm) / span).clamp(0.0, 1.0)
}

pub fn torque_factor(cfg: &EngineConfig, rpm: f32) -> f32 {
    (1.0 - normalized_rpm(cfg, rpm)).max(cfg.min_torque_factor)
}

pub fn launch_scale(cfg: &EngineConfig, speed_mph: f32) -> f32 {
    let speed = if speed_mph.is_finite() { speed_mph.abs() } else { 0.0 };
    let t = (speed / cfg.launch_speed_mph.max(1e-3)).clamp(0.0, 1.0);
    cfg.launch_min_scale + (1.0 - cfg.launch_min_scale) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cfg() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn stationary_wheels_idle() {
        assert_eq!(target_rpm(&cfg(), 0.0, 18.0), cfg().idle_rpm);
        assert_eq!(target_rpm(&cfg(), f32::NAN, 18.0), cfg().idle_rpm);
    }

    #[test]
    fn torque_tapers_with_rpm() {
        let c = cfg();
        assert_eq!(torque_factor(&c, c.idle_rpm), 1.0);
        let mid = torque_factor(&c, (c.idle_rpm + c.max_rpm) * 0.5);
        assert!(mid < 1.0 && mid > c.min_torque_factor);
        assert_eq!(torque_factor(&c, c.max_rpm), c.min_torque_factor);
    }

    #[test]
    fn launch_ramps_to_full() {
        let c = cfg();
        assert_eq!(launch_scale(&c, 0.0), c.launch_min_scale);
        assert_eq!(launch_scale(&c, c.launch_speed_mph), 1.0);
        assert_eq!(launch_scale(&c, 200.0), 1.0);
        let half = launch_scale(&c, c.launch_speed_mph * 0.5);
        assert!((half - (c.launch_min_scale + 1.0) * 0.5).abs() < 1e-5);
    }

    #[test]
    fn throttle_blend_is_gradual() {
        let c = cfg();
        let one = smooth_throttle(0.0, 1.0, c.throttle_response_time, 1.0 / 60.0);
        assert!(one > 0.0 && one < 0.2);

        let mut t = 0.0;
        for _ in 0..120 {
            t = smooth_throttle(t, 1.0, c.throttle_response_time, 1.0 / 60.0);
        }
        assert!(t > 0.99);
        assert_eq!(smooth_throttle(0.3, 1.0, c.throttle_response_time, 0.0), 0.3);
    }

    #[test]
    fn free_rev_follows_pedal() {
        let c = cfg();
        assert_eq!(free_rev_rpm(&c, 0.0), c.idle_rpm);
        assert_eq!(free_rev_rpm(&c, -1.0), c.max_rpm);
        assert_eq!(free_rev_rpm(&c, f32::NAN), c.idle_rpm);
    }

    #[test]
    fn rpm_lerps_instead_of_stepping() {
        let c = cfg();
        let next = smooth_rpm(&c, 1000.0, 5000.0, 1.0 / 60.0);
        assert!(next > 1000.0 && next < 5000.0);
    }

    proptest! {
        #[test]
        fn rpm_always_within_engine_range(
            omega in -500.0f32..500.0,
            ratio in 0.0f32..25.0,
            current in -10_000.0f32..20_000.0,
            dt in -0.1f32..0.2,
        ) {
            let c = cfg();
            let target = target_rpm(&c, omega, ratio);
            prop_assert!(target >= c.idle_rpm && target <= c.max_rpm);
            let smoothed = smooth_rpm(&c, current, target, dt);
            prop_assert!(smoothed >= c.idle_rpm && smoothed <= c.max_rpm);
        }
    }
}
