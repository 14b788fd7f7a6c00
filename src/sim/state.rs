//! Game state and core simulation types
//!
//! One owned aggregate holds the board, every formation record, the timer
//! queue and the outbound event queue. The other sim modules operate on it
//! through `&mut GameState`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::formation::{FlowerArea, Square};
use super::grid::{Board, CellPos};
use super::random::{Randomizer, SeededRandom};
use super::scheduler::{Scheduler, TimerHandle};
use crate::Settings;

/// Where the rotation cycle state machine is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CyclePhase {
    /// Waiting for a player tap
    Idle,
    /// Rotation steps in flight
    Propagating,
    /// Tearing down per-cycle state
    CycleEnd,
}

/// How the presentation layer should colour a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Highlight {
    #[default]
    Normal,
    Rotating,
    SquareArmed,
    SquareExpired,
    SquareClicked,
    FlowerClickable,
    LastChanceOffered,
    WildCardSpinning,
    WildCardActive,
}

impl Highlight {
    /// Cells carrying a live mechanic are drawn raised
    pub fn raised(self) -> bool {
        matches!(
            self,
            Highlight::SquareArmed
                | Highlight::FlowerClickable
                | Highlight::LastChanceOffered
                | Highlight::WildCardSpinning
                | Highlight::WildCardActive
        )
    }
}

/// Outbound notifications for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    CellRotationTargetChanged { cell: CellPos, counter: i32 },
    CellHighlightChanged { cell: CellPos, highlight: Highlight },
    CellHeightHintChanged { cell: CellPos, raised: bool },
    ScoreDelta(u32),
    Banner(String),
    MoveBudgetChanged(u32),
    RotationCycleStateChanged(bool),
}

/// Square click windows
#[derive(Debug, Clone, Default)]
pub struct SquareWindows {
    /// Squares waiting for their random arm delay
    pub pending: BTreeMap<Square, TimerHandle>,
    /// Clickable squares and their expiry timers
    pub armed: BTreeMap<Square, TimerHandle>,
    pub clicked_cells: BTreeSet<CellPos>,
    /// Dead until the next board reset
    pub expired_cells: BTreeSet<CellPos>,
}

impl SquareWindows {
    pub fn armed_square_at(&self, cell: CellPos) -> Option<Square> {
        self.armed.keys().find(|sq| sq.contains(cell)).copied()
    }

    pub fn armed_cells(&self) -> BTreeSet<CellPos> {
        self.armed.keys().flat_map(|sq| sq.cells()).collect()
    }

    pub fn is_expired(&self, cell: CellPos) -> bool {
        self.expired_cells.contains(&cell)
    }
}

/// A bloomed flower awaiting a click
#[derive(Debug, Clone)]
pub struct Flower {
    pub area: FlowerArea,
    pub petals: BTreeSet<CellPos>,
    pub timer: TimerHandle,
}

/// Wild-card spinner lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WildCard {
    #[default]
    Idle,
    /// Free spin running; a click before the timer fires activates it
    Spinning { cell: CellPos, timer: TimerHandle },
    /// Auto-rotates once per step until the budget runs out
    Active { cell: CellPos, budget: u32 },
}

impl WildCard {
    pub fn cell(&self) -> Option<CellPos> {
        match *self {
            WildCard::Idle => None,
            WildCard::Spinning { cell, .. } | WildCard::Active { cell, .. } => Some(cell),
        }
    }
}

/// Single-cell bonus offer at cycle end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastChance {
    pub cell: CellPos,
    pub timer: TimerHandle,
}

/// Per-cycle bookkeeping, reset when a cycle ends
#[derive(Debug, Clone, Default)]
pub struct CycleState {
    /// Cells the player tapped to start this cycle
    pub starters: BTreeSet<CellPos>,
    pub steps: u32,
    /// Cells turned in the most recent step
    pub last_rotated: BTreeSet<CellPos>,
    /// Chain targets for the next step
    pub pending_chain: BTreeSet<CellPos>,
    /// Half-turn pops (clicked squares, Squareformers, flower) for the next step
    pub expansions: BTreeSet<CellPos>,
    pub previous_squares: Vec<Square>,
    pub delay_next_step: bool,
    pub continuation: Option<TimerHandle>,
}

/// Totals for the session summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub cycles_completed: u32,
    pub longest_cycle_steps: u32,
    pub squares_popped: u32,
    pub squareformers: u32,
    pub flowers_popped: u32,
    pub wild_cards_activated: u32,
    pub last_chances_claimed: u32,
}

/// Complete game state
#[derive(Debug)]
pub struct GameState {
    pub settings: Settings,
    pub board: Board,
    pub score: u64,
    /// Remaining player moves
    pub moves: u32,
    pub phase: CyclePhase,
    pub squares: SquareWindows,
    pub flower: Option<Flower>,
    pub wild_card: WildCard,
    pub last_chance: Option<LastChance>,
    pub cycle: CycleState,
    pub stats: SessionStats,
    pub scheduler: Scheduler,
    pub(crate) rng: Box<dyn Randomizer>,
    /// Highlight last reported per cell (absent = Normal)
    highlights: BTreeMap<CellPos, Highlight>,
    events: Vec<GameEvent>,
}

impl GameState {
    /// Create a new game with a random board from `seed`
    pub fn new(settings: Settings, seed: u64) -> Self {
        let mut rng = SeededRandom::new(seed);
        let board = Board::random(settings.rows(), settings.cols(), &mut rng);
        Self::with_board(settings, board, Box::new(rng))
    }

    /// Create a game over a prepared board and randomizer
    pub fn with_board(settings: Settings, board: Board, rng: Box<dyn Randomizer>) -> Self {
        let moves = settings.starting_moves;
        Self {
            settings,
            board,
            score: 0,
            moves,
            phase: CyclePhase::Idle,
            squares: SquareWindows::default(),
            flower: None,
            wild_card: WildCard::Idle,
            last_chance: None,
            cycle: CycleState::default(),
            stats: SessionStats::default(),
            scheduler: Scheduler::new(),
            rng,
            highlights: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    pub fn is_rotating(&self) -> bool {
        self.phase != CyclePhase::Idle
    }

    pub fn emit(&mut self, event: GameEvent) {
        self.events.push(event);
    }

    /// Take every event emitted since the last drain
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[GameEvent] {
        &self.events
    }

    pub fn set_counter(&mut self, cell: CellPos, counter: i32) {
        self.board.set(cell, counter);
        self.emit(GameEvent::CellRotationTargetChanged { cell, counter });
    }

    pub fn turn(&mut self, cell: CellPos, delta: i32) {
        let counter = self.board.turn(cell, delta);
        self.emit(GameEvent::CellRotationTargetChanged { cell, counter });
    }

    pub fn award(&mut self, points: u32) {
        if points == 0 {
            return;
        }
        self.score += points as u64;
        self.emit(GameEvent::ScoreDelta(points));
    }

    pub fn banner(&mut self, text: &str) {
        log::debug!("Banner: {}", text);
        self.emit(GameEvent::Banner(text.to_string()));
    }

    pub fn set_moves(&mut self, moves: u32) {
        self.moves = moves;
        self.emit(GameEvent::MoveBudgetChanged(moves));
    }

    pub fn highlight(&self, cell: CellPos) -> Highlight {
        self.highlights.get(&cell).copied().unwrap_or_default()
    }

    /// Report a highlight change (and the height hint if it flips); no-op if unchanged
    pub fn set_highlight(&mut self, cell: CellPos, highlight: Highlight) {
        let old = self.highlight(cell);
        if old == highlight {
            return;
        }
        if highlight == Highlight::Normal {
            self.highlights.remove(&cell);
        } else {
            self.highlights.insert(cell, highlight);
        }
        self.emit(GameEvent::CellHighlightChanged { cell, highlight });
        if old.raised() != highlight.raised() {
            self.emit(GameEvent::CellHeightHintChanged {
                cell,
                raised: highlight.raised(),
            });
        }
    }

    /// Return every highlighted cell to normal
    pub fn clear_highlights(&mut self) {
        let cells: Vec<CellPos> = self.highlights.keys().copied().collect();
        for cell in cells {
            self.set_highlight(cell, Highlight::Normal);
        }
    }

    /// Cells no square may form on: flower petals, the wild card, expired cells
    pub fn square_blocked_cells(&self) -> BTreeSet<CellPos> {
        let mut blocked = self.squares.expired_cells.clone();
        if let Some(flower) = &self.flower {
            blocked.extend(flower.petals.iter().copied());
        }
        blocked.extend(self.wild_card.cell());
        blocked
    }

    /// A spinning or active wild card is driven by its own timer, not by neighbours
    pub fn chain_excluded_cells(&self) -> BTreeSet<CellPos> {
        self.wild_card.cell().into_iter().collect()
    }

    /// Is any click window open, or a square still waiting to arm?
    pub fn has_open_window(&self) -> bool {
        !self.squares.pending.is_empty()
            || !self.squares.armed.is_empty()
            || self.flower.is_some()
            || matches!(self.wild_card, WildCard::Spinning { .. })
    }
}
