use std::env;

use anyhow::{Context, Result};
use tokio::time::{interval, Duration, Instant};

use race_core::{AiDriverConfig, Difficulty, RaceEvent, RacePhase, RaceSession, Role, SessionConfig, SnapshotFeed};

/// Frames between standings / snapshot dumps (~1 s at 60 Hz).
const REPORT_EVERY: u64 = 60;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("starting race server");

    let config = match env::args().nth(1) {
        Some(path) => SessionConfig::load(&path).with_context(|| format!("loading session config {path}"))?,
        None => SessionConfig::default(),
    };

    let mut session = RaceSession::from_config(&config).context("building race session")?;

    // The player seat runs on an easy autopilot until a human input source is wired in.
    session.add_ai_car("player", Role::Player, AiDriverConfig::for_difficulty(Difficulty::Easy))?;
    session.add_ai_car("rival", Role::Ai, AiDriverConfig::for_difficulty(config.difficulty))?;
    session.start()?;

    let mut feed = SnapshotFeed::new();
    let mut snapshots = feed.subscribe();
    tokio::spawn(async move {
        while let Some(json) = snapshots.recv().await {
            log::debug!("snapshot {json}");
        }
    });

    // Fixed timestep: ~60 Hz frames, fixed physics steps inside the session
    let mut ticker = interval(Duration::from_millis(16));
    let mut last = Instant::now();
    let mut frames: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                log::info!("interrupted");
                break;
            }
        }

        let now = Instant::now();
        let frame_dt = now.duration_since(last).as_secs_f32();
        last = now;

        for event in session.update(frame_dt) {
            match event {
                RaceEvent::GearShift { .. } => log::debug!("{event:?}"),
                RaceEvent::CountdownTick { remaining } => log::info!("{remaining}..."),
                _ => log::info!("{event:?}"),
            }
        }

        frames += 1;
        if frames % REPORT_EVERY == 0 {
            for s in session.standings() {
                log::info!(
                    "P{} {:<8} laps {} progress {:.1} m{}",
                    s.place,
                    s.name,
                    s.laps_completed,
                    s.progress,
                    if s.finished { " (finished)" } else { "" }
                );
            }
            feed.publish(&session.snapshot())?;
        }

        if session.phase() == RacePhase::Finished {
            break;
        }
    }

    for s in session.standings() {
        log::info!("final P{} {}", s.place, s.name);
    }
    Ok(())
}
