//! Rotation-cycle orchestration
//!
//! A player tap starts a cycle; each rotation step applies the pending
//! turns, recomputes chains and formations, rolls the spawn dice and then
//! waits one step duration on the scheduler before deciding to loop or end.

use std::collections::BTreeSet;
use std::time::Duration;

use super::formation::{diff_new_squares, scan_squares, squareformer};
use super::grid::{Board, CellPos};
use super::interaction::{
    arm_square, claim_last_chance, click_flower, click_square, click_wild_card, close_cycle_windows,
    disarm_broken_squares, expire_square, maybe_offer_last_chance, queue_squareformer,
    schedule_square_windows, settle_wild_card, try_bloom_flower, try_spawn_wild_card, wild_card_auto_step,
    wilt_flower, withdraw_last_chance,
};
use super::propagation::expand_chain;
use super::scheduler::TimerTag;
use super::state::{CycleState, CyclePhase, GameEvent, GameState, Highlight, SessionStats, WildCard};
use crate::SpawnPrecedence;

/// Input commands for a single tick
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// Cell the player tapped (already resolved from screen space)
    pub tap: Option<CellPos>,
    /// Re-randomize the board
    pub reset: bool,
    /// Reset the board, score and move budget
    pub new_game: bool,
    /// Idle/demo mode - autoplay taps for the player
    pub idle_mode: bool,
}

/// Advance the game clock by `dt`, firing due timers, then apply input
pub fn tick(state: &mut GameState, input: &TickInput, dt: Duration) {
    if input.new_game {
        new_game(state);
    } else if input.reset {
        reset_board(state);
    }

    let until = state.scheduler.now() + dt;
    while let Some((_, tag)) = state.scheduler.pop_due(until) {
        dispatch(state, tag);
    }
    state.scheduler.advance_to(until);

    let tap = match input.tap {
        Some(cell) => Some(cell),
        None if input.idle_mode => autoplay_tap(state),
        None => None,
    };
    if let Some(cell) = tap {
        submit_tap(state, cell);
    }
}

/// Route a fired timer to its handler
pub fn dispatch(state: &mut GameState, tag: TimerTag) {
    match tag {
        TimerTag::ArmSquare(square) => arm_square(state, square),
        TimerTag::ExpireSquare(square) => expire_square(state, square),
        TimerTag::FlowerTimeout => wilt_flower(state),
        TimerTag::WildCardSpin => settle_wild_card(state),
        TimerTag::LastChance => withdraw_last_chance(state),
        TimerTag::StepContinuation => continue_cycle(state),
    }
}

/// Handle a tap. Returns true if it did anything.
///
/// Special cells are checked first, in fixed order: expired, armed square,
/// last chance, spinning wild card, flower petal. Anything else starts a new
/// cycle, which needs an idle board and a move left.
pub fn submit_tap(state: &mut GameState, cell: CellPos) -> bool {
    if !state.board.contains(cell) {
        log::debug!("Tap outside board at {:?}", cell);
        return false;
    }
    if state.squares.is_expired(cell) {
        return false;
    }
    if click_square(state, cell)
        || claim_last_chance(state, cell)
        || click_wild_card(state, cell)
        || click_flower(state, cell)
    {
        return true;
    }
    if state.phase != CyclePhase::Idle {
        log::debug!("Tap at {:?} ignored: cycle in flight", cell);
        return false;
    }
    if state.moves == 0 {
        log::debug!("Tap at {:?} ignored: no moves left", cell);
        return false;
    }
    start_cycle(state, cell);
    true
}

fn start_cycle(state: &mut GameState, cell: CellPos) {
    state.set_moves(state.moves - 1);
    state.phase = CyclePhase::Propagating;
    state.emit(GameEvent::RotationCycleStateChanged(true));
    log::info!("Cycle started at {:?} ({} moves left)", cell, state.moves);

    state.cycle = CycleState::default();
    state.cycle.starters.insert(cell);
    let squares = scan_squares(&state.board, &state.square_blocked_cells());
    schedule_square_windows(state, &squares);
    state.cycle.previous_squares = squares;

    run_step(state, BTreeSet::from([cell]), BTreeSet::new());
}

/// One rotation step: half-turn pops, then quarter turns, then derived state
fn run_step(state: &mut GameState, seeds: BTreeSet<CellPos>, expansions: BTreeSet<CellPos>) {
    state.cycle.steps += 1;
    for cell in std::mem::take(&mut state.cycle.last_rotated) {
        if state.highlight(cell) == Highlight::Rotating {
            state.set_highlight(cell, Highlight::Normal);
        }
    }

    for &cell in &expansions {
        state.turn(cell, 2);
    }
    let quarter: BTreeSet<CellPos> = seeds.difference(&expansions).copied().collect();
    for &cell in &quarter {
        state.turn(cell, -1);
        if state.highlight(cell) == Highlight::Normal {
            state.set_highlight(cell, Highlight::Rotating);
        }
    }
    state.award(quarter.len() as u32);

    let rotated: BTreeSet<CellPos> = quarter.union(&expansions).copied().collect();
    let chain = expand_chain(&state.board, &rotated, &state.chain_excluded_cells());

    disarm_broken_squares(state);
    let squares = scan_squares(&state.board, &state.square_blocked_cells());
    let fresh = diff_new_squares(&squares, &state.cycle.previous_squares);
    state.cycle.previous_squares = squares;
    if let Some(square) = squareformer(&fresh, &rotated) {
        queue_squareformer(state, square);
    }

    roll_spawns(state, &rotated, &chain);

    log::debug!(
        "Step {}: {} turned, {} chained",
        state.cycle.steps,
        rotated.len(),
        chain.len()
    );
    state.cycle.last_rotated = rotated;
    state.cycle.pending_chain = chain;
    let wait = state.settings.step_duration();
    schedule_continuation(state, wait);
}

/// Roll the flower and wild-card dice in precedence order, away from the action
fn roll_spawns(state: &mut GameState, rotated: &BTreeSet<CellPos>, chain: &BTreeSet<CellPos>) {
    let (rows, cols) = (state.board.rows(), state.board.cols());
    let mut occupied: BTreeSet<CellPos> = rotated.iter().chain(chain).copied().collect();
    for cell in rotated.iter().chain(chain) {
        occupied.extend(cell.neighbors(rows, cols));
    }
    occupied.extend(state.squares.armed_cells());
    occupied.extend(state.squares.pending.keys().flat_map(|sq| sq.cells()));
    occupied.extend(state.squares.expired_cells.iter().copied());
    occupied.extend(state.squares.clicked_cells.iter().copied());
    occupied.extend(state.cycle.expansions.iter().copied());
    occupied.extend(state.wild_card.cell());
    occupied.extend(state.last_chance.map(|o| o.cell));
    if let Some(flower) = &state.flower {
        occupied.extend(flower.area.cells());
    }

    match state.settings.spawn_precedence {
        SpawnPrecedence::FlowerFirst => {
            try_bloom_flower(state, &mut occupied);
            try_spawn_wild_card(state, &mut occupied);
        }
        SpawnPrecedence::WildCardFirst => {
            try_spawn_wild_card(state, &mut occupied);
            try_bloom_flower(state, &mut occupied);
        }
    }
}

fn schedule_continuation(state: &mut GameState, after: Duration) {
    if let Some(old) = state.cycle.continuation.take() {
        state.scheduler.cancel(old);
    }
    let handle = state.scheduler.schedule(after, TimerTag::StepContinuation);
    state.cycle.continuation = Some(handle);
}

/// Step animation finished: loop with everything pending, or end the cycle
fn continue_cycle(state: &mut GameState) {
    state.cycle.continuation = None;
    if state.phase != CyclePhase::Propagating {
        return;
    }
    if state.cycle.delay_next_step {
        state.cycle.delay_next_step = false;
        let wait = state.settings.pop_delay();
        schedule_continuation(state, wait);
        return;
    }
    if state.cycle.steps >= state.settings.max_steps_per_cycle {
        log::warn!("Cycle hit the {} step cap; forcing end", state.cycle.steps);
        end_cycle(state);
        return;
    }

    let mut seeds = std::mem::take(&mut state.cycle.pending_chain);
    seeds.extend(wild_card_auto_step(state));
    let expansions = std::mem::take(&mut state.cycle.expansions);

    if seeds.is_empty() && expansions.is_empty() {
        if state.settings.hold_cycle_for_open_windows && state.has_open_window() {
            let wait = state.settings.step_duration();
            schedule_continuation(state, wait);
            return;
        }
        end_cycle(state);
        return;
    }
    run_step(state, seeds, expansions);
}

/// The presentation layer finished animating early; continue without waiting
pub fn notify_rotations_complete(state: &mut GameState) {
    if let Some(handle) = state.cycle.continuation {
        if state.scheduler.cancel(handle) {
            continue_cycle(state);
        }
    }
}

fn end_cycle(state: &mut GameState) {
    state.phase = CyclePhase::CycleEnd;
    if let Some(handle) = state.cycle.continuation.take() {
        state.scheduler.cancel(handle);
    }
    close_cycle_windows(state);
    for cell in std::mem::take(&mut state.cycle.last_rotated) {
        if state.highlight(cell) == Highlight::Rotating {
            state.set_highlight(cell, Highlight::Normal);
        }
    }

    let steps = state.cycle.steps;
    state.stats.cycles_completed += 1;
    state.stats.longest_cycle_steps = state.stats.longest_cycle_steps.max(steps);
    state.cycle = CycleState::default();
    log::info!("Cycle ended after {} steps (score {})", steps, state.score);

    maybe_offer_last_chance(state);
    state.phase = CyclePhase::Idle;
    state.emit(GameEvent::RotationCycleStateChanged(false));
}

/// Cancel every timer and drop every transient record
fn cancel_everything(state: &mut GameState) {
    let dropped = state.scheduler.cancel_all();
    if dropped > 0 {
        log::debug!("Cancelled {} pending timers", dropped);
    }
    let was_rotating = state.is_rotating();
    state.squares = Default::default();
    state.flower = None;
    state.wild_card = Default::default();
    state.last_chance = None;
    state.cycle = CycleState::default();
    state.phase = CyclePhase::Idle;
    state.clear_highlights();
    if was_rotating {
        state.emit(GameEvent::RotationCycleStateChanged(false));
    }
}

/// Fresh random counters; score and moves are kept
pub fn reset_board(state: &mut GameState) {
    let board = Board::random(state.board.rows(), state.board.cols(), state.rng.as_mut());
    reset_with_board(state, board);
}

/// Replace the board wholesale, cancelling everything in flight
pub fn reset_with_board(state: &mut GameState, board: Board) {
    cancel_everything(state);
    state.board = board;
    for cell in state.board.positions() {
        let counter = state.board.get(cell);
        state.emit(GameEvent::CellRotationTargetChanged { cell, counter });
    }
    log::info!("Board reset ({}x{})", state.board.rows(), state.board.cols());
}

/// Board reset plus zeroed score and a full move budget
pub fn new_game(state: &mut GameState) {
    reset_board(state);
    state.score = 0;
    state.stats = SessionStats::default();
    let moves = state.settings.starting_moves;
    state.set_moves(moves);
    log::info!("New game: {} moves", moves);
}

/// Pick a tap for demo mode: grab any offered bonus, else start a cycle when idle
pub fn autoplay_tap(state: &mut GameState) -> Option<CellPos> {
    if let Some(offer) = state.last_chance {
        return Some(offer.cell);
    }
    if let WildCard::Spinning { cell, .. } = state.wild_card {
        return Some(cell);
    }
    if let Some(square) = state.squares.armed.keys().next() {
        return Some(square.top_left());
    }
    if let Some(flower) = &state.flower {
        return flower.petals.iter().next().copied();
    }
    if state.phase != CyclePhase::Idle || state.moves == 0 {
        return None;
    }
    let open: Vec<CellPos> = state
        .board
        .positions()
        .filter(|c| !state.squares.is_expired(*c))
        .collect();
    if open.is_empty() {
        return None;
    }
    Some(open[state.rng.pick(0..open.len())])
}
