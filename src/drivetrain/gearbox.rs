// ==============================================================================
// gearbox.rs — AUTOMATIC GEARBOX STATE MACHINE
// ------------------------------------------------------------------------------
// States: Reverse, Neutral, Forward(1..=N)
//
//   Reverse      <- stationary && throttle < -deadzone && not already Reverse
//   Forward(1)   <- throttle > +deadzone && gear in {Reverse, Neutral}
//   Forward(n+1) <- rpm > shift_up   && debounce elapsed && n < N
//   Forward(n-1) <- rpm < shift_down && debounce elapsed && n > 1
//
// Every transition starts a shift window of `shift_duration` seconds. While
// the window is open no transition is evaluated and the engine delivers no
// force (clutch in).
// ==============================================================================

use serde::Serialize;

use crate::config::GearboxConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "gear", rename_all = "lowercase")]
pub enum Gear {
    Reverse,
    Neutral,
    Forward(u8),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftEvent {
    pub from: Gear,
    pub to: Gear,
}

#[derive(Debug, Clone)]
pub struct Gearbox {
    gear: Gear,
    since_shift: Option<f32>, // saturates once both windows have passed
}

impl Default for Gearbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Gearbox {
    pub fn new() -> Self {
        Self { gear: Gear::Neutral, since_shift: None }
    }

    pub fn gear(&self) -> Gear {
        self.gear
    }

    pub fn is_shifting(&self, cfg: &GearboxConfig) -> bool {
        self.since_shift
            .map(|t| t < cfg.shift_duration)
            .unwrap_or(false)
    }

    fn debounce_elapsed(&self, cfg: &GearboxConfig) -> bool {
        self.since_shift
            .map(|t| t >= cfg.min_shift_interval)
            .unwrap_or(true)
    }

    /// Overall ratio (gear * final drive). Negative in reverse, `None` in neutral.
    pub fn overall_ratio(&self, cfg: &GearboxConfig) -> Option<f32> {
        match self.gear {
            Gear::Neutral => None,
            Gear::Reverse => Some(-cfg.reverse_ratio * cfg.final_drive),
            Gear::Forward(n) => cfg
                .ratios
                .get(n as usize - 1)
                .map(|r| r * cfg.final_drive),
        }
    }

    /// Ratio of the current gear relative to first gear; scales wheel force.
    pub fn force_multiplier(&self, cfg: &GearboxConfig) -> f32 {
        let first = cfg.ratios.first().copied().unwrap_or(1.0) * cfg.final_drive;
        match self.overall_ratio(cfg) {
            Some(r) if first > 0.0 => r / first,
            _ => 0.0,
        }
    }

    /// Advance the shift timer and evaluate one transition. `speed` is the signed
    /// forward speed in m/s.
    pub fn update(
        &mut self,
        cfg: &GearboxConfig,
        dt: f32,
        throttle: f32,
        speed: f32,
        rpm: f32,
    ) -> Option<ShiftEvent> {
        if !(dt > 0.0) {
            return None;
        }
        if let Some(t) = self.since_shift.as_mut() {
            *t = (*t + dt).min(cfg.shift_duration.max(cfg.min_shift_interval));
        }

        if self.is_shifting(cfg) {
            return None;
        }

        let stationary = speed.abs() < cfg.stationary_speed;
        let top = cfg.gear_count();

        let next = match self.gear {
            g if g != Gear::Reverse && stationary && throttle < -cfg.throttle_deadzone => {
                Some(Gear::Reverse)
            }
            Gear::Reverse | Gear::Neutral if throttle > cfg.throttle_deadzone => {
                Some(Gear::Forward(1))
            }
            Gear::Forward(n) if self.debounce_elapsed(cfg) => {
                if rpm > cfg.shift_up_rpm && n < top {
                    Some(Gear::Forward(n + 1))
                } else if rpm < cfg.shift_down_rpm && n > 1 {
                    Some(Gear::Forward(n - 1))
                } else {
                    None
                }
            }
            _ => None,
        };

        next.map(|to| self.shift_to(to))
    }

    fn shift_to(&mut self, to: Gear) -> ShiftEvent {
        let event = ShiftEvent { from: self.gear, to };
        self.gear = to;
        self.since_shift = Some(0.0);
        event
    }
}
