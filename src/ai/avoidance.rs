// src/ai/avoidance.rs
//
// Steering corrections layered on top of the steering PID. Both terms are
// exactly 0.0 when nothing is detected.
//
// Sign convention: positive steer turns toward the chassis' left (+X when
// facing +Z).

use rapier3d::na::{Point3, Rotation3, Vector3};

use crate::config::AiDriverConfig;
use crate::debug::DebugRay;
use crate::physics::RayProbe;

const EPS: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeSide {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeHit {
    pub side: ProbeSide,
    pub toi: f32,
    pub length: f32,
}

impl ProbeHit {
    /// 1 at the bumper, 0 at the end of the ray.
    pub fn danger(&self) -> f32 {
        if self.length <= EPS {
            return 0.0;
        }
        (1.0 - self.toi / self.length).clamp(0.0, 1.0)
    }
}

/// Heading projected on the ground plane, or `None` when pointing straight up/down.
pub fn flat_unit(v: &Vector3<f32>) -> Option<Vector3<f32>> {
    Vector3::new(v.x, 0.0, v.z).try_normalize(EPS)
}

/// Cast the three wall probes. Returns the hits and one debug ray per probe.
pub fn cast_wall_probes(
    probe: &dyn RayProbe,
    position: &Point3<f32>,
    forward: &Vector3<f32>,
    cfg: &AiDriverConfig,
) -> (Vec<ProbeHit>, Vec<DebugRay>) {
    let len = cfg.wall_detection_distance;
    let mut hits = Vec::new();
    let mut rays = Vec::with_capacity(3);

    if len <= EPS {
        return (hits, rays);
    }

    let origin = position + Vector3::y() * cfg.wall_ray_height;
    let sides = [
        (ProbeSide::Left, cfg.wall_ray_angle),
        (ProbeSide::Center, 0.0),
        (ProbeSide::Right, -cfg.wall_ray_angle),
    ];

    for (side, angle) in sides {
        let dir = Rotation3::from_axis_angle(&Vector3::y_axis(), angle) * forward;
        let toi = probe.cast(origin, dir, len).filter(|t| t.is_finite() && *t <= len);
        if let Some(toi) = toi {
            hits.push(ProbeHit { side, toi, length: len });
        }
        rays.push(DebugRay::probe(origin, dir, len, toi));
    }
    (hits, rays)
}

/// Steer away from side hits; a center hit pushes further toward the way the
/// track is turning. Clamped to [-1, 1] and scaled by the wall blend.
pub fn wall_correction(hits: &[ProbeHit], heading_error: f32, cfg: &AiDriverConfig) -> f32 {
    if hits.is_empty() {
        return 0.0;
    }

    let toward_track = if heading_error >= 0.0 { 1.0 } else { -1.0 };
    let sum: f32 = hits
        .iter()
        .map(|h| match h.side {
            ProbeSide::Left => -h.danger() * cfg.wall_side_weight,
            ProbeSide::Right => h.danger() * cfg.wall_side_weight,
            ProbeSide::Center => toward_track * h.danger() * cfg.wall_center_weight,
        })
        .sum();

    sum.clamp(-1.0, 1.0) * cfg.wall_blend
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpponentAhead {
    pub distance: f32,
    pub alignment: f32, // forward · direction to opponent, > 0
    pub cross_y: f32,   // > 0 when the opponent is on our left
}

/// Nearest opponent inside `radius` and in front of the car.
pub fn nearest_opponent_ahead(
    position: &Point3<f32>,
    forward: &Vector3<f32>,
    opponents: &[Point3<f32>],
    radius: f32,
) -> Option<OpponentAhead> {
    opponents
        .iter()
        .filter_map(|o| {
            let to = Vector3::new(o.x - position.x, 0.0, o.z - position.z);
            let distance = to.norm();
            if !(distance > EPS && distance < radius) {
                return None;
            }
            let dir = to / distance;
            let alignment = forward.dot(&dir);
            (alignment > 0.0).then(|| OpponentAhead { distance, alignment, cross_y: forward.cross(&dir).y })
        })
        .min_by(|a, b| a.distance.total_cmp(&b.distance))
}

/// Steer to the side away from the opponent, stronger when close and dead ahead.
pub fn opponent_correction(opp: Option<&OpponentAhead>, radius: f32, strength: f32) -> f32 {
    let Some(o) = opp else {
        return 0.0;
    };
    if radius <= EPS {
        return 0.0;
    }
    let proximity = (1.0 - o.distance / radius).clamp(0.0, 1.0);
    let away = if o.cross_y > 0.0 { -1.0 } else { 1.0 };
    away * proximity * o.alignment * strength
}

#[cfg(test)]
mod tests {
    use super::*;

    struct WallAt {
        z: f32,
    }

    // Infinite wall across the track at `z`.
    impl RayProbe for WallAt {
        fn cast(&self, origin: Point3<f32>, dir: Vector3<f32>, max_toi: f32) -> Option<f32> {
            if dir.z <= 0.0 {
                return None;
            }
            let t = (self.z - origin.z) / dir.z;
            (t >= 0.0 && t <= max_toi).then_some(t)
        }
    }

    struct Nothing;

    impl RayProbe for Nothing {
        fn cast(&self, _: Point3<f32>, _: Vector3<f32>, _: f32) -> Option<f32> {
            None
        }
    }

    fn cfg() -> AiDriverConfig {
        AiDriverConfig::default()
    }

    #[test]
    fn no_hits_no_correction() {
        let (hits, rays) = cast_wall_probes(&Nothing, &Point3::origin(), &Vector3::z(), &cfg());
        assert!(hits.is_empty());
        assert_eq!(rays.len(), 3);
        assert_eq!(wall_correction(&hits, 0.3, &cfg()), 0.0);
    }

    #[test]
    fn left_hit_steers_right() {
        let hit = [ProbeHit { side: ProbeSide::Left, toi: 2.0, length: 8.0 }];
        let c = wall_correction(&hit, 0.0, &cfg());
        assert!((c - (-0.75 * 0.6 * 0.8)).abs() < 1e-6);

        let hit = [ProbeHit { side: ProbeSide::Right, toi: 2.0, length: 8.0 }];
        assert!(wall_correction(&hit, 0.0, &cfg()) > 0.0);
    }

    #[test]
    fn center_hit_follows_heading_error() {
        let hit = [ProbeHit { side: ProbeSide::Center, toi: 4.0, length: 8.0 }];
        assert!(wall_correction(&hit, -0.2, &cfg()) < 0.0);
        assert!(wall_correction(&hit, 0.2, &cfg()) > 0.0);
    }

    #[test]
    fn wall_ahead_hits_all_three_probes() {
        let (hits, _) = cast_wall_probes(&WallAt { z: 5.0 }, &Point3::origin(), &Vector3::z(), &cfg());
        assert_eq!(hits.len(), 3);
        let center = hits.iter().find(|h| h.side == ProbeSide::Center).unwrap();
        assert!((center.toi - 5.0).abs() < 1e-5);
    }

    #[test]
    fn correction_is_clamped_before_blend() {
        let hits = [
            ProbeHit { side: ProbeSide::Right, toi: 0.0, length: 8.0 },
            ProbeHit { side: ProbeSide::Center, toi: 0.0, length: 8.0 },
        ];
        let c = wall_correction(&hits, 1.0, &cfg());
        assert!((c - cfg().wall_blend).abs() < 1e-6);
    }

    #[test]
    fn opponent_on_left_pushes_right() {
        let pos = Point3::origin();
        let fwd = Vector3::z();
        let opp = [Point3::new(2.0, 0.0, 6.0)];
        let o = nearest_opponent_ahead(&pos, &fwd, &opp, 12.0).unwrap();
        assert!(o.cross_y > 0.0);
        assert!(opponent_correction(Some(&o), 12.0, 0.5) < 0.0);

        let opp = [Point3::new(-2.0, 0.0, 6.0)];
        let o = nearest_opponent_ahead(&pos, &fwd, &opp, 12.0).unwrap();
        assert!(opponent_correction(Some(&o), 12.0, 0.5) > 0.0);
    }

    #[test]
    fn opponents_behind_or_far_are_ignored() {
        let pos = Point3::origin();
        let fwd = Vector3::z();
        let opp = [Point3::new(0.0, 0.0, -3.0), Point3::new(0.0, 0.0, 50.0)];
        assert!(nearest_opponent_ahead(&pos, &fwd, &opp, 12.0).is_none());
        assert_eq!(opponent_correction(None, 12.0, 0.5), 0.0);
    }
}
