use serde::Serialize;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::debug::AiDebug;
use crate::drivetrain::Gear;
use crate::race::CarId;
use crate::session::{LapTimes, RacePhase, Role};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WheelSnapshot {
    pub hard_point: [f32; 3],
    pub contact_point: [f32; 3],
    pub in_contact: bool,
    pub suspension_length: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CarSnapshot {
    pub id: CarId,
    pub name: String,
    pub role: Role,
    pub position: [f32; 3],
    pub rotation: [f32; 4], // quaternion x, y, z, w
    pub speed_mph: f32,
    pub rpm: f32,
    pub gear: Gear,
    pub lap: u32, // lap being driven, 1-based
    pub laps_completed: u32,
    pub place: usize,
    pub finished: bool,
    pub lap_times: LapTimes,
    pub wheels: Vec<WheelSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai: Option<AiDebug>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RaceSnapshot {
    pub tick: u64,
    pub phase: RacePhase,
    pub race_time: f32,
    pub cars: Vec<CarSnapshot>,
}

impl RaceSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Fans serialized snapshots out to any number of listeners.
#[derive(Default)]
pub struct SnapshotFeed {
    subscribers: Vec<UnboundedSender<String>>,
}

impl SnapshotFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> UnboundedReceiver<String> {
        let (tx, rx) = unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Serialize once and send to every live subscriber. Closed channels are
    /// dropped.
    pub fn publish(&mut self, snapshot: &RaceSnapshot) -> Result<(), serde_json::Error> {
        if self.subscribers.is_empty() {
            return Ok(());
        }
        let json = snapshot.to_json()?;
        self.subscribers.retain(|tx| tx.send(json.clone()).is_ok());
        Ok(())
    }
}
