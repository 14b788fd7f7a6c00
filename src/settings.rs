//! Game settings and tuning
//!
//! Every timing, probability and bonus the simulation reads lives here so a
//! shell can ship alternative balance files without touching the core.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::consts::*;

/// Board size presets (rows x cols)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BoardPreset {
    /// 10 x 8
    Compact,
    /// 12 x 8
    #[default]
    Standard,
    /// 12 x 10
    Large,
}

impl BoardPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoardPreset::Compact => "Compact",
            BoardPreset::Standard => "Standard",
            BoardPreset::Large => "Large",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "compact" | "small" => Some(BoardPreset::Compact),
            "standard" | "medium" => Some(BoardPreset::Standard),
            "large" | "big" => Some(BoardPreset::Large),
            _ => None,
        }
    }

    pub fn rows(&self) -> usize {
        match self {
            BoardPreset::Compact => 10,
            BoardPreset::Standard | BoardPreset::Large => 12,
        }
    }

    pub fn cols(&self) -> usize {
        match self {
            BoardPreset::Compact | BoardPreset::Standard => 8,
            BoardPreset::Large => 10,
        }
    }
}

/// Which spawn die is rolled first when both a flower and a wild card could appear
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SpawnPrecedence {
    #[default]
    FlowerFirst,
    WildCardFirst,
}

/// Game tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub board: BoardPreset,
    pub starting_moves: u32,

    // === Pacing ===
    pub step_duration_ms: u64,
    pub pop_delay_ms: u64,
    /// Keep a cycle alive while a click window is open
    pub hold_cycle_for_open_windows: bool,
    pub max_steps_per_cycle: u32,

    // === Squares ===
    pub square_arm_min_ms: u64,
    pub square_arm_max_ms: u64,
    pub square_expire_ms: u64,
    pub square_click_bonus: u32,
    pub squareformer_bonus: u32,

    // === Flower ===
    pub flower_chance: f64,
    pub flower_timeout_ms: u64,
    pub flower_pop_bonus: u32,

    // === Wild card ===
    pub wild_card_chance: f64,
    pub wild_card_spin_turns: i32,
    pub wild_card_spin_ms: u64,
    pub wild_card_budget: u32,

    // === Last chance ===
    pub last_chance_chance: f64,
    pub last_chance_move_threshold: u32,
    pub last_chance_timeout_ms: u64,
    pub last_chance_points: u32,
    pub last_chance_radius_factor: f32,

    pub spawn_precedence: SpawnPrecedence,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            board: BoardPreset::Standard,
            starting_moves: STARTING_MOVES,

            step_duration_ms: STEP_DURATION_MS,
            pop_delay_ms: POP_DELAY_MS,
            hold_cycle_for_open_windows: true,
            max_steps_per_cycle: MAX_STEPS_PER_CYCLE,

            square_arm_min_ms: SQUARE_ARM_MIN_MS,
            square_arm_max_ms: SQUARE_ARM_MAX_MS,
            square_expire_ms: SQUARE_EXPIRE_MS,
            square_click_bonus: SQUARE_CLICK_BONUS,
            squareformer_bonus: SQUAREFORMER_BONUS,

            flower_chance: FLOWER_CHANCE,
            flower_timeout_ms: FLOWER_TIMEOUT_MS,
            flower_pop_bonus: FLOWER_POP_BONUS,

            wild_card_chance: WILD_CARD_CHANCE,
            wild_card_spin_turns: WILD_CARD_SPIN_TURNS,
            wild_card_spin_ms: WILD_CARD_SPIN_MS,
            wild_card_budget: WILD_CARD_BUDGET,

            last_chance_chance: LAST_CHANCE_CHANCE,
            last_chance_move_threshold: LAST_CHANCE_MOVE_THRESHOLD,
            last_chance_timeout_ms: LAST_CHANCE_TIMEOUT_MS,
            last_chance_points: LAST_CHANCE_POINTS,
            last_chance_radius_factor: LAST_CHANCE_RADIUS_FACTOR,

            spawn_precedence: SpawnPrecedence::FlowerFirst,
        }
    }
}

impl Settings {
    /// Defaults on the given board
    pub fn from_preset(preset: BoardPreset) -> Self {
        Self {
            board: preset,
            ..Self::default()
        }
    }

    /// Settings with every random spawn disabled (scripted play and tests)
    pub fn without_spawns() -> Self {
        Self {
            flower_chance: 0.0,
            wild_card_chance: 0.0,
            last_chance_chance: 0.0,
            ..Self::default()
        }
    }

    pub fn rows(&self) -> usize {
        self.board.rows()
    }

    pub fn cols(&self) -> usize {
        self.board.cols()
    }

    /// At least 1ms: a held cycle polls at this interval
    pub fn step_duration(&self) -> Duration {
        Duration::from_millis(self.step_duration_ms.max(1))
    }

    pub fn pop_delay(&self) -> Duration {
        Duration::from_millis(self.pop_delay_ms)
    }

    pub fn square_expire(&self) -> Duration {
        Duration::from_millis(self.square_expire_ms)
    }

    pub fn flower_timeout(&self) -> Duration {
        Duration::from_millis(self.flower_timeout_ms)
    }

    pub fn wild_card_spin(&self) -> Duration {
        Duration::from_millis(self.wild_card_spin_ms)
    }

    pub fn last_chance_timeout(&self) -> Duration {
        Duration::from_millis(self.last_chance_timeout_ms)
    }

    /// Manhattan radius of the last-chance reroll
    pub fn last_chance_radius(&self) -> usize {
        let short_side = self.rows().min(self.cols()) as f32;
        (short_side * self.last_chance_radius_factor).floor() as usize
    }

    /// Load settings from a JSON file, falling back to defaults
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    log::warn!("Ignoring malformed settings {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Could not read settings {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}
