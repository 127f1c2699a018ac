// src/track.rs
//
// ==============================================================================
// WAYPOINT LOOP — closed track centerline
// ------------------------------------------------------------------------------
// points[i] -> points[i + 1] is segment i; the last segment closes the loop.
// prefix[i] = distance along the loop from points[0] to points[i].
//
// All queries are total: degenerate segments and non-finite positions fall
// back to the nearest waypoint instead of producing NaN.
// ==============================================================================

use std::f32::consts::TAU;

use rapier3d::na::{Point3, Vector3};

use crate::error::ConfigError;

const SEGMENT_EPS: f32 = 1e-6;

const FALLBACK_RADIUS_X: f32 = 70.0;
const FALLBACK_RADIUS_Z: f32 = 120.0;
const FALLBACK_SEGMENTS: usize = 24;
const FALLBACK_HEIGHT: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct WaypointLoop {
    points: Vec<Point3<f32>>,
    segment_lengths: Vec<f32>,
    prefix: Vec<f32>,
    length: f32,
}

impl WaypointLoop {
    pub fn new(points: Vec<Point3<f32>>) -> Result<Self, ConfigError> {
        if points.len() < 2 {
            return Err(ConfigError::TooFewWaypoints { count: points.len() });
        }
        if let Some(index) = points.iter().position(|p| !p.coords.iter().all(|c| c.is_finite())) {
            return Err(ConfigError::NonFiniteWaypoint { index });
        }

        let n = points.len();
        let segment_lengths: Vec<f32> = (0..n)
            .map(|i| (points[(i + 1) % n] - points[i]).norm())
            .collect();

        let mut prefix = Vec::with_capacity(n);
        let mut acc = 0.0;
        for len in &segment_lengths {
            prefix.push(acc);
            acc += len;
        }

        if !(acc > SEGMENT_EPS) {
            return Err(ConfigError::DegenerateLoop);
        }

        Ok(Self { points, segment_lengths, prefix, length: acc })
    }

    pub fn from_arrays(points: &[[f32; 3]]) -> Result<Self, ConfigError> {
        Self::new(points.iter().map(|p| Point3::new(p[0], p[1], p[2])).collect())
    }

    /// Procedural fallback track: an ellipse in the XZ plane at height `y`,
    /// driven counter-clockwise seen from above.
    pub fn default_ellipse(radius_x: f32, radius_z: f32, segments: usize, y: f32) -> Result<Self, ConfigError> {
        let segments = segments.max(3);
        let points = (0..segments)
            .map(|i| {
                let a = i as f32 / segments as f32 * TAU;
                Point3::new(a.cos() * radius_x, y, a.sin() * radius_z)
            })
            .collect();
        Self::new(points)
    }

    /// The ellipse used when a track ships without waypoints.
    pub fn fallback() -> Result<Self, ConfigError> {
        Self::default_ellipse(FALLBACK_RADIUS_X, FALLBACK_RADIUS_Z, FALLBACK_SEGMENTS, FALLBACK_HEIGHT)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point3<f32>] {
        &self.points
    }

    pub fn point(&self, index: usize) -> Point3<f32> {
        self.points[index % self.points.len()]
    }

    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.points.len()
    }

    pub fn prev_index(&self, index: usize) -> usize {
        (index + self.points.len() - 1) % self.points.len()
    }

    /// Length of the segment leaving `index`.
    pub fn segment_length(&self, index: usize) -> f32 {
        self.segment_lengths[index % self.points.len()]
    }

    pub fn loop_length(&self) -> f32 {
        self.length
    }

    /// Distance along the loop from waypoint 0 to waypoint `index`.
    pub fn prefix_distance(&self, index: usize) -> f32 {
        self.prefix[index % self.points.len()]
    }

    /// Linear scan. Returns the index and squared distance.
    pub fn nearest_index(&self, pos: &Point3<f32>) -> (usize, f32) {
        let mut best = (0, f32::INFINITY);
        for (i, p) in self.points.iter().enumerate() {
            let d = (p - pos).norm_squared();
            if d < best.1 {
                best = (i, d);
            }
        }
        best
    }

    /// Segment parameter of `pos` projected onto `from -> from + 1`, unclamped.
    /// `None` for a zero-length segment.
    fn project_param(&self, from: usize, pos: &Point3<f32>) -> Option<f32> {
        let a = self.point(from);
        let ab = self.point(self.next_index(from)) - a;
        let len_sq = ab.norm_squared();
        if len_sq < SEGMENT_EPS {
            return None;
        }
        let t = (pos - a).dot(&ab) / len_sq;
        t.is_finite().then_some(t)
    }

    /// Distance from waypoint 0 along the loop, in `[0, loop_length)`.
    ///
    /// The position is projected onto the two segments touching the nearest
    /// waypoint and the closer foot point wins; ties go to the arriving
    /// segment.
    pub fn distance_along(&self, pos: &Point3<f32>) -> f32 {
        let (nearest, _) = self.nearest_index(pos);

        let best = [self.prev_index(nearest), nearest]
            .into_iter()
            .filter_map(|seg| {
                let t = self.project_param(seg, pos)?.clamp(0.0, 1.0);
                let a = self.point(seg);
                let foot = a + (self.point(self.next_index(seg)) - a) * t;
                Some((seg, t, (pos - foot).norm_squared()))
            })
            .min_by(|x, y| x.2.total_cmp(&y.2));

        let d = match best {
            Some((seg, t, _)) => self.prefix_distance(seg) + t * self.segment_length(seg),
            None => self.prefix_distance(nearest),
        };
        d.rem_euclid(self.length)
    }

    /// Point on the centerline `d` meters past waypoint 0 (wraps).
    pub fn point_at_distance(&self, d: f32) -> Point3<f32> {
        let d = if d.is_finite() { d.rem_euclid(self.length) } else { 0.0 };
        let seg = match self.prefix.partition_point(|&p| p <= d) {
            0 => 0,
            i => i - 1,
        };
        let len = self.segment_length(seg);
        if len < SEGMENT_EPS {
            return self.point(seg);
        }
        let a = self.point(seg);
        let b = self.point(self.next_index(seg));
        a + (b - a) * ((d - self.prefix[seg]) / len).clamp(0.0, 1.0)
    }

    /// Pure-pursuit target: project `pos` onto the segment arriving at
    /// `target`, then walk `distance` meters forward along the loop. The
    /// walk covers at most one full lap.
    pub fn look_ahead_point(&self, target: usize, pos: &Point3<f32>, distance: f32) -> Point3<f32> {
        let target = target % self.points.len();
        let from = self.prev_index(target);

        let t = self.project_param(from, pos).unwrap_or(1.0).clamp(0.0, 1.0);
        let a = self.point(from);
        let start = a + (self.point(target) - a) * t;

        let mut remaining = distance.max(0.0);
        let mut cursor = start;
        let mut next = target;

        for _ in 0..self.points.len() {
            let goal = self.point(next);
            let leg: Vector3<f32> = goal - cursor;
            let leg_len = leg.norm();
            if leg_len >= remaining {
                return if leg_len > SEGMENT_EPS { cursor + leg * (remaining / leg_len) } else { goal };
            }
            remaining -= leg_len;
            cursor = goal;
            next = self.next_index(next);
        }
        cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> WaypointLoop {
        WaypointLoop::from_arrays(&[
            [0.0, 0.5, 0.0],
            [0.0, 0.5, 100.0],
            [100.0, 0.5, 100.0],
            [100.0, 0.5, 0.0],
        ])
        .unwrap()
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn rejects_bad_loops() {
        assert!(matches!(
            WaypointLoop::from_arrays(&[[0.0, 0.0, 0.0]]),
            Err(ConfigError::TooFewWaypoints { count: 1 })
        ));
        assert!(matches!(
            WaypointLoop::from_arrays(&[[0.0; 3], [0.0; 3]]),
            Err(ConfigError::DegenerateLoop)
        ));
        assert!(matches!(
            WaypointLoop::from_arrays(&[[0.0; 3], [f32::NAN, 0.0, 0.0]]),
            Err(ConfigError::NonFiniteWaypoint { index: 1 })
        ));
    }

    #[test]
    fn prefix_sums_close_the_loop() {
        let sq = square();
        assert!(close(sq.loop_length(), 400.0));
        assert!(close(sq.prefix_distance(3), 300.0));
        assert!(close(sq.segment_length(3), 100.0));
        assert_eq!(sq.next_index(3), 0);
        assert_eq!(sq.prev_index(0), 3);
    }

    #[test]
    fn nearest_and_distance_along() {
        let sq = square();
        let p = Point3::new(2.0, 0.5, 30.0);
        assert_eq!(sq.nearest_index(&p).0, 0);
        assert!(close(sq.distance_along(&p), 30.0));

        // short of waypoint 1 but nearest to it: projected on the arriving segment
        let p = Point3::new(-3.0, 0.5, 90.0);
        assert_eq!(sq.nearest_index(&p).0, 1);
        assert!(close(sq.distance_along(&p), 90.0));

        // on the second leg, nearest to waypoint 2, square to the third leg
        let p = Point3::new(60.0, 0.5, 100.0);
        assert_eq!(sq.nearest_index(&p).0, 2);
        assert!(close(sq.distance_along(&p), 160.0));

        // just before the closing waypoint
        let p = Point3::new(5.0, 0.5, -3.0);
        assert!(close(sq.distance_along(&p), 395.0));
    }

    #[test]
    fn point_at_distance_wraps() {
        let sq = square();
        let p = sq.point_at_distance(150.0);
        assert!(close(p.x, 50.0) && close(p.z, 100.0));
        let q = sq.point_at_distance(550.0);
        assert!(close(q.x, 50.0) && close(q.z, 100.0));
        let r = sq.point_at_distance(-10.0);
        assert!(close(r.x, 10.0) && close(r.z, 0.0));
    }

    #[test]
    fn look_ahead_walks_past_corners() {
        let sq = square();
        let pos = Point3::new(0.0, 0.5, 80.0);
        let p = sq.look_ahead_point(1, &pos, 30.0);
        assert!(close(p.x, 10.0) && close(p.z, 100.0));

        let far = sq.look_ahead_point(1, &pos, 10_000.0);
        assert!(far.coords.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn ellipse_has_requested_shape() {
        let e = WaypointLoop::fallback().unwrap();
        assert_eq!(e.len(), 24);
        assert!(close(e.point(0).x, 70.0));
        assert!(close(e.point(6).z, 120.0));
        assert!(e.points().iter().all(|p| p.y == 0.5));
    }
}
