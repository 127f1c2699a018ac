// ==============================================================================
// race.rs — RACE PROGRESS TRACKER
// ------------------------------------------------------------------------------
// Converts raw car positions into lap counts and standings.
//
// Per car and per sample:
//   raw_relative = distance_along(pos) - prefix(finish)     in [0, L)
//   relative_index = (nearest - finish) mod n
//   lap_count += 1 on a high-quarter -> low-quarter index wrap
//   lap_count -= 1 on the reverse wrap
//   laps_completed = highest lap_count seen, never negative
//   metric = raw_relative shifted by whole loops until it lies within L/2
//            of the previous metric
//
// Lap events come from the index wrap only, and only when lap_count climbs
// past laps_completed, so rocking across the line or reversing out of a lap
// and re-crossing never pays twice. A car whose first sample sits in the high
// quarter starts at lap_count -1: its first wrap is the start, not a lap.
//
// The metric is for ranking. The first sample of a car parked just behind the
// line maps to a small negative metric instead of ~L.
// ==============================================================================

use std::cmp::Ordering;
use std::sync::Arc;

use rapier3d::na::Point3;

use crate::error::ConfigError;
use crate::track::WaypointLoop;

pub type CarId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LapCrossing {
    Forward,
    Backward,
    None,
}

/// Index-based finish-line check on relative indices. Quarter bounds are
/// inclusive on the high side so a 4-point loop still registers 3 -> 0.
pub fn detect_lap_crossing(prev_relative: usize, new_relative: usize, n: usize) -> LapCrossing {
    if n == 0 {
        return LapCrossing::None;
    }
    let high = |i: usize| i * 4 >= 3 * n;
    let low = |i: usize| i * 4 < n;

    if high(prev_relative) && low(new_relative) {
        LapCrossing::Forward
    } else if low(prev_relative) && high(new_relative) {
        LapCrossing::Backward
    } else {
        LapCrossing::None
    }
}

/// Higher metric first; equal metrics fall back to raw relative distance.
pub fn compare_progress(a: (f32, f32), b: (f32, f32)) -> Ordering {
    b.0.total_cmp(&a.0).then_with(|| b.1.total_cmp(&a.1))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CarProgress {
    pub nearest_index: usize,
    pub relative_index: usize,
    pub lap_count: i32,
    pub raw_relative: f32,
    pub metric: f32,
    pub laps_completed: u32,
    initialized: bool,
}

pub struct RaceProgressTracker {
    track: Arc<WaypointLoop>,
    finish_index: usize,
    cars: Vec<CarProgress>,
}

impl RaceProgressTracker {
    pub fn new(track: Arc<WaypointLoop>, finish_index: usize) -> Result<Self, ConfigError> {
        if finish_index >= track.len() {
            return Err(ConfigError::FinishIndexOutOfRange { index: finish_index, len: track.len() });
        }
        Ok(Self { track, finish_index, cars: Vec::new() })
    }

    pub fn track(&self) -> &Arc<WaypointLoop> {
        &self.track
    }

    pub fn finish_index(&self) -> usize {
        self.finish_index
    }

    pub fn add_car(&mut self) -> CarId {
        self.cars.push(CarProgress::default());
        self.cars.len() - 1
    }

    pub fn car(&self, id: CarId) -> Option<&CarProgress> {
        self.cars.get(id)
    }

    pub fn car_count(&self) -> usize {
        self.cars.len()
    }

    pub fn nearest_waypoint_index(&self, pos: &Point3<f32>) -> usize {
        self.track.nearest_index(pos).0
    }

    /// Distance past the finish line along the loop, in `[0, L)`.
    pub fn relative_distance(&self, pos: &Point3<f32>) -> f32 {
        let finish = self.track.prefix_distance(self.finish_index);
        (self.track.distance_along(pos) - finish).rem_euclid(self.track.loop_length())
    }

    /// Feed one position sample. Returns the new completed-lap count when a
    /// forward wrap took the car past its best lap so far.
    pub fn update(&mut self, id: CarId, pos: &Point3<f32>) -> Option<u32> {
        if !pos.coords.iter().all(|c| c.is_finite()) {
            return None;
        }

        let n = self.track.len();
        let length = self.track.loop_length();
        let nearest = self.nearest_waypoint_index(pos);
        let relative_index = (nearest + n - self.finish_index) % n;
        let raw = self.relative_distance(pos);

        let car = self.cars.get_mut(id)?;

        if !car.initialized {
            let rel = if raw > length * 0.5 { raw - length } else { raw };
            let behind = detect_lap_crossing(relative_index, 0, n) == LapCrossing::Forward;
            *car = CarProgress {
                nearest_index: nearest,
                relative_index,
                lap_count: if behind { -1 } else { 0 },
                raw_relative: raw,
                metric: rel,
                laps_completed: 0,
                initialized: true,
            };
            return None;
        }

        match detect_lap_crossing(car.relative_index, relative_index, n) {
            LapCrossing::Forward => car.lap_count += 1,
            LapCrossing::Backward => car.lap_count -= 1,
            LapCrossing::None => {}
        }

        let shift = ((car.metric - raw) / length).round();

        car.nearest_index = nearest;
        car.relative_index = relative_index;
        car.raw_relative = raw;
        car.metric = raw + shift * length;

        if car.lap_count > car.laps_completed as i32 {
            car.laps_completed = car.lap_count as u32;
            Some(car.laps_completed)
        } else {
            None
        }
    }

    pub fn metric(&self, id: CarId) -> Option<f32> {
        self.cars.get(id).map(|c| c.metric)
    }

    pub fn compare(&self, a: CarId, b: CarId) -> Ordering {
        match (self.cars.get(a), self.cars.get(b)) {
            (Some(x), Some(y)) => compare_progress((x.metric, x.raw_relative), (y.metric, y.raw_relative)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    /// Car ids, leader first.
    pub fn standings(&self) -> Vec<CarId> {
        let mut ids: Vec<CarId> = (0..self.cars.len()).collect();
        ids.sort_by(|&a, &b| self.compare(a, b));
        ids
    }
}
