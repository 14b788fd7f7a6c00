//! Pipe Cascade - a rotating elbow-pipe grid puzzle
//!
//! Core modules:
//! - `sim`: Deterministic simulation (board, chain reactions, formations, timers)
//! - `settings`: Data-driven game tuning

pub mod settings;
pub mod sim;

pub use settings::{BoardPreset, Settings, SpawnPrecedence};

/// Game configuration constants
pub mod consts {
    /// Headless driver frame length (ms) and frame cap
    pub const FRAME_MS: u64 = 16;
    pub const MAX_FRAMES: u64 = 1_000_000;

    /// Duration of one visual rotation step (ms)
    pub const STEP_DURATION_MS: u64 = 300;
    /// Extra pause before a step that pops a square or flower open (ms)
    pub const POP_DELAY_MS: u64 = 250;

    /// Moves granted at the start of a game
    pub const STARTING_MOVES: u32 = 30;

    /// Square click window: random arm delay bounds and expiry timeout (ms)
    pub const SQUARE_ARM_MIN_MS: u64 = 600;
    pub const SQUARE_ARM_MAX_MS: u64 = 2_400;
    pub const SQUARE_EXPIRE_MS: u64 = 1_800;
    pub const SQUARE_CLICK_BONUS: u32 = 5;
    pub const SQUAREFORMER_BONUS: u32 = 3;

    /// Flower bloom
    pub const FLOWER_CHANCE: f64 = 0.04;
    pub const FLOWER_TIMEOUT_MS: u64 = 3_000;
    pub const FLOWER_POP_BONUS: u32 = 8;

    /// Wild card spinner
    pub const WILD_CARD_CHANCE: f64 = 0.03;
    pub const WILD_CARD_SPIN_TURNS: i32 = 4;
    pub const WILD_CARD_SPIN_MS: u64 = 2_000;
    pub const WILD_CARD_BUDGET: u32 = 7;

    /// Last-chance reprieve
    pub const LAST_CHANCE_CHANCE: f64 = 0.15;
    pub const LAST_CHANCE_MOVE_THRESHOLD: u32 = 2;
    pub const LAST_CHANCE_TIMEOUT_MS: u64 = 5_000;
    pub const LAST_CHANCE_POINTS: u32 = 10;
    pub const LAST_CHANCE_RADIUS_FACTOR: f32 = 0.75;

    /// Forced cycle end after this many steps
    pub const MAX_STEPS_PER_CYCLE: u32 = 500;
}

/// Decode an unbounded rotation counter to a quarter-turn index in [0, 4)
#[inline]
pub fn quarter_turns(counter: i32) -> u8 {
    counter.rem_euclid(4) as u8
}

/// Manhattan distance between two (row, col) positions
#[inline]
pub fn manhattan(a: (usize, usize), b: (usize, usize)) -> usize {
    a.0.abs_diff(b.0) + a.1.abs_diff(b.1)
}
