// ==============================================================================
// debug.rs — AI DEBUG PRIMITIVES (SIM -> HOST)
// ------------------------------------------------------------------------------
// Serializable records of what the AI looked at on its last tick:
// - DebugRay: one wall probe (origin, direction, length, optional hit)
// - AiDebug: target waypoint, look-ahead point, and the steering terms
//
// Purely visualization scaffolding: nothing here feeds back into control.
// ==============================================================================

use rapier3d::na::{Point3, Vector3};
use serde::Serialize;

pub const COLOR_CLEAR: [f32; 3] = [0.0, 1.0, 0.0]; // probe missed
pub const COLOR_HIT: [f32; 3] = [1.0, 0.0, 0.0];   // probe hit a wall

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugRay {
    pub origin: [f32; 3],
    pub direction: [f32; 3],
    pub length: f32,
    pub hit: Option<[f32; 3]>,
    pub color: [f32; 3],
}

impl DebugRay {
    pub fn probe(origin: Point3<f32>, dir: Vector3<f32>, length: f32, toi: Option<f32>) -> Self {
        Self {
            origin: origin.into(),
            direction: dir.into(),
            length,
            hit: toi.map(|t| (origin + dir * t).into()),
            color: if toi.is_some() { COLOR_HIT } else { COLOR_CLEAR },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AiDebug {
    pub target_index: Option<usize>,
    pub target: Option<[f32; 3]>,
    pub look_ahead: Option<[f32; 3]>,
    pub heading_error: f32,
    pub steer_pid: f32,         // steering PID output before avoidance
    pub wall_correction: f32,
    pub opponent_correction: f32,
    pub target_speed_mph: f32,
    pub probes: Vec<DebugRay>,
}

impl AiDebug {
    pub fn clear(&mut self) {
        *self = AiDebug::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_hit_point_lies_on_ray() {
        let ray = DebugRay::probe(Point3::new(1.0, 0.5, 0.0), Vector3::z(), 8.0, Some(3.0));
        assert_eq!(ray.hit, Some([1.0, 0.5, 3.0]));
        assert_eq!(ray.color, COLOR_HIT);

        let miss = DebugRay::probe(Point3::origin(), Vector3::x(), 8.0, None);
        assert!(miss.hit.is_none());
        assert_eq!(miss.color, COLOR_CLEAR);
    }
}
