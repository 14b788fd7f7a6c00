//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Virtual clock only (timers advance with `tick`)
//! - Randomness only through `Randomizer`
//! - Stable iteration order (ordered sets keyed by cell position)
//! - No rendering or platform dependencies

pub mod formation;
pub mod grid;
pub mod interaction;
pub mod propagation;
pub mod random;
pub mod scheduler;
pub mod state;
pub mod tick;

pub use formation::{
    FLOWER_PATTERN, FLOWER_SIZE, FlowerArea, SQUARE_PATTERN, Square, diff_new_squares, find_free_area,
    scan_squares, squareformer,
};
pub use grid::{Board, CellPos, Compass, Orientation, nearest_counter, orientation_of, pointing_directions};
pub use propagation::expand_chain;
pub use random::{Randomizer, ScriptedRandom, SeededRandom};
pub use scheduler::{Scheduler, TimerHandle, TimerTag};
pub use state::{
    CyclePhase, GameEvent, GameState, Highlight, SessionStats, WildCard,
};
pub use tick::{
    TickInput, autoplay_tap, dispatch, new_game, notify_rotations_complete, reset_board, reset_with_board,
    submit_tap, tick,
};
