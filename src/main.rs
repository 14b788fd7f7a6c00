//! Pipe Cascade headless entry point
//!
//! Runs an autoplay session against the simulation and logs the event stream
//! a rendering shell would consume.
//!
//! Usage: `pipe-cascade [SEED] [PRESET | SETTINGS.json]`
//!
//! `PRESET` is a board name (`compact`, `standard`, `large`); anything else is
//! read as a settings file.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use pipe_cascade::{BoardPreset, Settings};
use pipe_cascade::consts::{FRAME_MS, MAX_FRAMES};
use pipe_cascade::sim::{CyclePhase, GameEvent, GameState, TickInput, tick};

/// Game instance holding all state
struct Session {
    state: GameState,
    input: TickInput,
    frames: u64,
    events_seen: u64,
}

impl Session {
    fn new(settings: Settings, seed: u64) -> Self {
        Self {
            state: GameState::new(settings, seed),
            input: TickInput {
                idle_mode: true,
                ..Default::default()
            },
            frames: 0,
            events_seen: 0,
        }
    }

    /// Run one frame of simulation
    fn update(&mut self) {
        tick(&mut self.state, &self.input, Duration::from_millis(FRAME_MS));
        self.frames += 1;

        // Clear one-shot inputs after processing
        self.input.tap = None;
        self.input.reset = false;
        self.input.new_game = false;

        for event in self.state.drain_events() {
            self.events_seen += 1;
            self.log_event(&event);
        }
    }

    fn log_event(&self, event: &GameEvent) {
        match event {
            GameEvent::Banner(text) => log::info!("[{}] {}", self.frames, text),
            GameEvent::MoveBudgetChanged(moves) => log::info!("[{}] moves left: {}", self.frames, moves),
            _ => {
                if log::log_enabled!(log::Level::Trace) {
                    match serde_json::to_string(event) {
                        Ok(json) => log::trace!("{}", json),
                        Err(e) => log::warn!("Unserializable event {:?}: {}", event, e),
                    }
                }
            }
        }
    }

    /// Out of moves, nothing in flight and nothing on offer
    fn finished(&self) -> bool {
        self.state.moves == 0
            && self.state.phase == CyclePhase::Idle
            && self.state.last_chance.is_none()
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    log::info!("Pipe Cascade (headless) starting...");

    let mut args = std::env::args().skip(1);
    let seed = args
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0)
        });
    let settings = match args.next() {
        Some(arg) => match BoardPreset::from_str(&arg) {
            Some(preset) => Settings::from_preset(preset),
            None => Settings::load(Path::new(&arg)),
        },
        None => Settings::default(),
    };
    log::info!(
        "Game initialized with seed: {} ({} board {}x{})",
        seed,
        settings.board.as_str(),
        settings.rows(),
        settings.cols()
    );

    let mut session = Session::new(settings, seed);
    while !session.finished() && session.frames < MAX_FRAMES {
        session.update();
    }
    if !session.finished() {
        log::warn!("Stopped after {} frames without finishing", session.frames);
    }

    log::info!(
        "Session over: score {}, {} events over {} frames",
        session.state.score,
        session.events_seen,
        session.frames
    );
    match serde_json::to_string_pretty(&session.state.stats) {
        Ok(json) => println!("{}", json),
        Err(e) => log::error!("Could not serialize stats: {}", e),
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // The simulation is driven by the embedding shell on the web
}
