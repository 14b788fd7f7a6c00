//! Timed interactions
//!
//! Four small state machines layered on the cascade: square click windows
//! (and the automatic Squareformer pop), the flower bloom, the wild-card
//! spinner and the last-chance reprieve. Clicks inside a window queue board
//! mutations for the next rotation step; expiries apply their own.

use std::collections::BTreeSet;
use std::time::Duration;

use super::formation::{FlowerArea, Square, find_free_area};
use super::grid::{CellPos, Orientation, nearest_counter};
use super::scheduler::TimerTag;
use super::state::{Flower, GameState, Highlight, LastChance, WildCard};
use crate::manhattan;

// === Squares ===

/// Give every square present at cycle start its own random arm delay.
/// Squares holding a starter cell are never armed.
pub fn schedule_square_windows(state: &mut GameState, squares: &[Square]) {
    let (min, max) = (state.settings.square_arm_min_ms, state.settings.square_arm_max_ms);
    for &square in squares {
        if square.overlaps(&state.cycle.starters)
            || square.overlaps(&state.squares.expired_cells)
            || state.squares.pending.contains_key(&square)
            || state.squares.armed.contains_key(&square)
        {
            continue;
        }
        let delay = state.rng.pick(min as usize..max.max(min) as usize + 1) as u64;
        let timer = state
            .scheduler
            .schedule(Duration::from_millis(delay), TimerTag::ArmSquare(square));
        state.squares.pending.insert(square, timer);
    }
}

/// Arm delay elapsed: make the square clickable if it still stands
pub fn arm_square(state: &mut GameState, square: Square) {
    state.squares.pending.remove(&square);
    let stale = !square.matches(&state.board)
        || square.overlaps(&state.cycle.starters)
        || square.overlaps(&state.square_blocked_cells())
        || square.overlaps(&state.squares.clicked_cells)
        || state.squares.armed_cells().iter().any(|c| square.contains(*c));
    if stale {
        log::debug!("Square at {:?} no longer armable", square.top_left());
        return;
    }
    let timeout = state.settings.square_expire();
    let timer = state.scheduler.schedule(timeout, TimerTag::ExpireSquare(square));
    state.squares.armed.insert(square, timer);
    for cell in square.cells() {
        state.set_highlight(cell, Highlight::SquareArmed);
    }
}

/// Armed square ran out of time: its cells are dead until the next reset
pub fn expire_square(state: &mut GameState, square: Square) {
    if state.squares.armed.remove(&square).is_none() {
        return;
    }
    for cell in square.cells() {
        state.squares.expired_cells.insert(cell);
        state.set_highlight(cell, Highlight::SquareExpired);
    }
    log::debug!("Square at {:?} expired", square.top_left());
}

/// Player clicked an armed square cell
pub fn click_square(state: &mut GameState, cell: CellPos) -> bool {
    let Some(square) = state.squares.armed_square_at(cell) else {
        return false;
    };
    if let Some(timer) = state.squares.armed.remove(&square) {
        state.scheduler.cancel(timer);
    }
    for c in square.cells() {
        state.squares.clicked_cells.insert(c);
        state.set_highlight(c, Highlight::SquareClicked);
    }
    let bonus = state.settings.square_click_bonus;
    state.award(bonus);
    state.banner("Square!");
    queue_pop(state, square.cells());
    state.stats.squares_popped += 1;
    true
}

/// A square that newly closed during the cascade pops by itself
pub fn queue_squareformer(state: &mut GameState, square: Square) {
    if square.overlaps(&state.cycle.expansions) {
        return;
    }
    if let Some(timer) = state.squares.armed.remove(&square) {
        state.scheduler.cancel(timer);
    }
    if let Some(timer) = state.squares.pending.remove(&square) {
        state.scheduler.cancel(timer);
    }
    let bonus = state.settings.squareformer_bonus;
    state.award(bonus);
    state.banner("Squareformer!");
    queue_pop(state, square.cells());
    state.stats.squareformers += 1;
}

/// Armed squares the cascade has since broken lose their window
pub fn disarm_broken_squares(state: &mut GameState) {
    let broken: Vec<Square> = state
        .squares
        .armed
        .keys()
        .filter(|sq| !sq.matches(&state.board))
        .copied()
        .collect();
    for square in broken {
        if let Some(timer) = state.squares.armed.remove(&square) {
            state.scheduler.cancel(timer);
        }
        for cell in square.cells() {
            state.set_highlight(cell, Highlight::Normal);
        }
    }
}

/// Half-turn the given cells on the next step, after an extra pause
fn queue_pop(state: &mut GameState, cells: impl IntoIterator<Item = CellPos>) {
    state.cycle.expansions.extend(cells);
    state.cycle.delay_next_step = true;
}

// === Flower ===

/// Roll for a flower bloom in a 4x4 area clear of `occupied`
pub fn try_bloom_flower(state: &mut GameState, occupied: &mut BTreeSet<CellPos>) -> bool {
    if state.flower.is_some() {
        return false;
    }
    if !state.rng.chance(state.settings.flower_chance) {
        return false;
    }
    let Some(anchor) = find_free_area(&state.board, occupied, state.rng.as_mut()) else {
        return false;
    };

    let area = FlowerArea::snapshot(&state.board, anchor);
    for (cell, counter) in area.bloom_targets(&state.board) {
        state.set_counter(cell, counter);
    }
    let petals = area.petals();
    for &cell in &petals {
        state.set_highlight(cell, Highlight::FlowerClickable);
    }
    occupied.extend(area.cells());
    let timer = state
        .scheduler
        .schedule(state.settings.flower_timeout(), TimerTag::FlowerTimeout);
    state.flower = Some(Flower { area, petals, timer });
    state.banner("Flower!");
    log::info!("Flower bloomed at {:?}", anchor);
    true
}

/// Player clicked a petal: pop all 16 cells open on the next step
pub fn click_flower(state: &mut GameState, cell: CellPos) -> bool {
    let hit = state.flower.as_ref().is_some_and(|f| f.petals.contains(&cell));
    if !hit {
        return false;
    }
    let Some(flower) = state.flower.take() else {
        return false;
    };
    state.scheduler.cancel(flower.timer);
    for &petal in &flower.petals {
        state.set_highlight(petal, Highlight::Normal);
    }
    let bonus = state.settings.flower_pop_bonus;
    state.award(bonus);
    state.banner("Flower Power!");
    queue_pop(state, flower.area.cells());
    state.stats.flowers_popped += 1;
    true
}

/// Flower was not clicked in time: restore the counters it replaced
pub fn wilt_flower(state: &mut GameState) {
    let Some(flower) = state.flower.take() else {
        return;
    };
    state.scheduler.cancel(flower.timer);
    for (cell, counter) in flower.area.rollback_targets() {
        state.set_counter(cell, counter);
    }
    for &petal in &flower.petals {
        state.set_highlight(petal, Highlight::Normal);
    }
    log::debug!("Flower at {:?} wilted", flower.area.anchor());
}

// === Wild card ===

/// Roll for a wild card on an interior cell clear of `occupied`
pub fn try_spawn_wild_card(state: &mut GameState, occupied: &mut BTreeSet<CellPos>) -> bool {
    if state.wild_card != WildCard::Idle {
        return false;
    }
    if !state.rng.chance(state.settings.wild_card_chance) {
        return false;
    }
    let eligible: Vec<CellPos> = state
        .board
        .positions()
        .filter(|&c| state.board.is_interior(c) && !occupied.contains(&c))
        .collect();
    if eligible.is_empty() {
        return false;
    }
    let cell = eligible[state.rng.pick(0..eligible.len())];

    let turns = state.settings.wild_card_spin_turns;
    state.turn(cell, -turns);
    state.set_highlight(cell, Highlight::WildCardSpinning);
    let timer = state
        .scheduler
        .schedule(state.settings.wild_card_spin(), TimerTag::WildCardSpin);
    state.wild_card = WildCard::Spinning { cell, timer };
    occupied.insert(cell);
    state.banner("Wild Card!");
    log::info!("Wild card spinning at {:?}", cell);
    true
}

/// Player caught the spinning wild card
pub fn click_wild_card(state: &mut GameState, cell: CellPos) -> bool {
    let WildCard::Spinning { cell: spinning, timer } = state.wild_card else {
        return false;
    };
    if spinning != cell {
        return false;
    }
    state.scheduler.cancel(timer);
    state.wild_card = WildCard::Active {
        cell,
        budget: state.settings.wild_card_budget,
    };
    state.set_highlight(cell, Highlight::WildCardActive);
    state.banner("Wild Card Activated!");
    state.stats.wild_cards_activated += 1;
    true
}

/// Spin finished without a click
pub fn settle_wild_card(state: &mut GameState) {
    if let WildCard::Spinning { cell, timer } = state.wild_card {
        state.scheduler.cancel(timer);
        state.wild_card = WildCard::Idle;
        state.set_highlight(cell, Highlight::Normal);
    }
}

/// Spend one unit of an active wild card's budget; returns the cell to turn
pub fn wild_card_auto_step(state: &mut GameState) -> Option<CellPos> {
    let WildCard::Active { cell, budget } = state.wild_card else {
        return None;
    };
    let budget = budget.saturating_sub(1);
    if budget == 0 {
        state.wild_card = WildCard::Idle;
        state.set_highlight(cell, Highlight::Normal);
    } else {
        state.wild_card = WildCard::Active { cell, budget };
    }
    Some(cell)
}

// === Last chance ===

/// End-of-cycle roll for a bonus cell while the move budget runs low
pub fn maybe_offer_last_chance(state: &mut GameState) -> bool {
    if state.last_chance.is_some() || state.moves > state.settings.last_chance_move_threshold {
        return false;
    }
    if !state.rng.chance(state.settings.last_chance_chance) {
        return false;
    }
    let wild = state.wild_card.cell();
    let eligible: Vec<CellPos> = state
        .board
        .positions()
        .filter(|&c| state.board.is_interior(c) && !state.squares.is_expired(c) && Some(c) != wild)
        .collect();
    if eligible.is_empty() {
        return false;
    }
    let cell = eligible[state.rng.pick(0..eligible.len())];
    let timer = state
        .scheduler
        .schedule(state.settings.last_chance_timeout(), TimerTag::LastChance);
    state.last_chance = Some(LastChance { cell, timer });
    state.set_highlight(cell, Highlight::LastChanceOffered);
    state.banner("Last Chance!");
    log::info!("Last chance offered at {:?}", cell);
    true
}

/// Player took the offer: points, maybe a move back, and a wide reroll
pub fn claim_last_chance(state: &mut GameState, cell: CellPos) -> bool {
    let Some(offer) = state.last_chance.filter(|o| o.cell == cell) else {
        return false;
    };
    state.scheduler.cancel(offer.timer);
    state.last_chance = None;
    state.set_highlight(cell, Highlight::Normal);

    let points = state.settings.last_chance_points;
    state.award(points);
    if state.moves == 0 {
        state.set_moves(1);
        state.banner("Extra Move!");
    }
    reroll_around(state, cell);
    state.stats.last_chances_claimed += 1;
    true
}

/// Offer timed out; no penalty
pub fn withdraw_last_chance(state: &mut GameState) {
    if let Some(offer) = state.last_chance.take() {
        state.scheduler.cancel(offer.timer);
        state.set_highlight(offer.cell, Highlight::Normal);
    }
}

/// Cells within the reroll radius of `center`, nearest diagonal first
pub fn reroll_order(rows: usize, cols: usize, center: CellPos, radius: usize) -> Vec<CellPos> {
    let mut cells: Vec<CellPos> = (0..rows)
        .flat_map(|row| (0..cols).map(move |col| CellPos::new(row, col)))
        .filter(|c| manhattan(c.as_tuple(), center.as_tuple()) <= radius)
        .collect();
    cells.sort_by_key(|c| (manhattan(c.as_tuple(), center.as_tuple()), c.row, c.col));
    cells
}

fn reroll_around(state: &mut GameState, center: CellPos) {
    let radius = state.settings.last_chance_radius();
    let wild = state.wild_card.cell();
    let order = reroll_order(state.board.rows(), state.board.cols(), center, radius);
    for cell in order {
        if state.squares.is_expired(cell) || Some(cell) == wild {
            continue;
        }
        let target = Orientation::from_index(state.rng.pick(0..4) as u8);
        let counter = nearest_counter(state.board.get(cell), target);
        state.set_counter(cell, counter);
    }
}

// === Teardown ===

/// Close every per-cycle window. Expired cells and an active wild card survive.
pub fn close_cycle_windows(state: &mut GameState) {
    let pending = std::mem::take(&mut state.squares.pending);
    for timer in pending.into_values() {
        state.scheduler.cancel(timer);
    }
    let armed = std::mem::take(&mut state.squares.armed);
    for (square, timer) in armed {
        state.scheduler.cancel(timer);
        for cell in square.cells() {
            state.set_highlight(cell, Highlight::Normal);
        }
    }
    let clicked = std::mem::take(&mut state.squares.clicked_cells);
    for cell in clicked {
        if !state.squares.is_expired(cell) {
            state.set_highlight(cell, Highlight::Normal);
        }
    }
    wilt_flower(state);
    settle_wild_card(state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Settings;
    use crate::sim::formation::SQUARE_PATTERN;
    use crate::sim::grid::Board;
    use crate::sim::random::ScriptedRandom;
    use crate::sim::state::GameEvent;

    fn state_with(board: Board, rng: ScriptedRandom) -> GameState {
        GameState::with_board(Settings::default(), board, Box::new(rng))
    }

    fn square_board(top_left: CellPos) -> Board {
        let mut board = Board::new(6, 6);
        for (cell, o) in Square::at(top_left).cells().into_iter().zip(SQUARE_PATTERN) {
            board.set(cell, o.index() as i32);
        }
        board
    }

    #[test]
    fn test_square_arm_click_queues_half_turn() {
        let square = Square::at(CellPos::new(2, 2));
        let mut state = state_with(square_board(CellPos::new(2, 2)), ScriptedRandom::new());
        schedule_square_windows(&mut state, &[square]);
        assert!(state.squares.pending.contains_key(&square));

        arm_square(&mut state, square);
        assert!(state.squares.armed.contains_key(&square));
        assert_eq!(state.highlight(CellPos::new(3, 3)), Highlight::SquareArmed);

        assert!(click_square(&mut state, CellPos::new(3, 3)));
        assert!(state.squares.armed.is_empty());
        assert_eq!(state.score, state.settings.square_click_bonus as u64);
        assert!(state.cycle.delay_next_step);
        assert_eq!(state.cycle.expansions, square.cells().into_iter().collect());
        assert!(!click_square(&mut state, CellPos::new(3, 3)));
    }

    #[test]
    fn test_starter_square_never_armed() {
        let square = Square::at(CellPos::new(0, 0));
        let mut state = state_with(square_board(CellPos::new(0, 0)), ScriptedRandom::new());
        state.cycle.starters.insert(CellPos::new(1, 0));
        schedule_square_windows(&mut state, &[square]);
        assert!(state.squares.pending.is_empty());
    }

    #[test]
    fn test_square_expiry_is_permanent() {
        let square = Square::at(CellPos::new(1, 1));
        let mut state = state_with(square_board(CellPos::new(1, 1)), ScriptedRandom::new());
        arm_square(&mut state, square);
        expire_square(&mut state, square);
        assert!(state.squares.is_expired(CellPos::new(2, 2)));
        assert_eq!(state.highlight(CellPos::new(2, 2)), Highlight::SquareExpired);

        // Never re-armed
        arm_square(&mut state, square);
        assert!(state.squares.armed.is_empty());
        close_cycle_windows(&mut state);
        assert!(state.squares.is_expired(CellPos::new(1, 1)));
    }

    #[test]
    fn test_broken_square_is_disarmed() {
        let square = Square::at(CellPos::new(1, 1));
        let mut state = state_with(square_board(CellPos::new(1, 1)), ScriptedRandom::new());
        arm_square(&mut state, square);
        state.board.turn(CellPos::new(1, 1), -1);
        disarm_broken_squares(&mut state);
        assert!(state.squares.armed.is_empty());
        assert!(state.scheduler.is_empty());
    }

    #[test]
    fn test_flower_click_pops_sixteen_cells() {
        // chance yes, first free anchor
        let rng = ScriptedRandom::new().with_chances([true]).with_picks([0]);
        let mut state = state_with(Board::new(6, 6), rng);
        let mut occupied = BTreeSet::new();
        assert!(try_bloom_flower(&mut state, &mut occupied));
        assert_eq!(occupied.len(), 16);
        assert!(Square::at(CellPos::new(1, 1)).matches(&state.board));

        // Corners are not clickable
        assert!(!click_flower(&mut state, CellPos::new(0, 0)));
        assert!(click_flower(&mut state, CellPos::new(0, 1)));
        assert!(state.flower.is_none());
        assert_eq!(state.cycle.expansions.len(), 16);
        assert!(state.scheduler.is_empty());
    }

    #[test]
    fn test_flower_wilt_restores_board() {
        let rng = ScriptedRandom::new().with_chances([true]).with_picks([3]);
        let mut state = state_with(Board::new(6, 6), rng);
        let before = state.board.clone();
        assert!(try_bloom_flower(&mut state, &mut BTreeSet::new()));
        assert_ne!(state.board, before);
        wilt_flower(&mut state);
        assert_eq!(state.board, before);
        assert!(state.flower.is_none());
    }

    #[test]
    fn test_wild_card_lifecycle() {
        let rng = ScriptedRandom::new().with_chances([true]).with_picks([0]);
        let mut state = state_with(Board::new(5, 5), rng);
        assert!(try_spawn_wild_card(&mut state, &mut BTreeSet::new()));
        let cell = CellPos::new(1, 1);
        assert!(matches!(state.wild_card, WildCard::Spinning { cell: c, .. } if c == cell));
        assert_eq!(state.board.get(cell), -state.settings.wild_card_spin_turns);

        assert!(!click_wild_card(&mut state, CellPos::new(2, 2)));
        assert!(click_wild_card(&mut state, cell));
        assert!(state.scheduler.is_empty());

        let budget = state.settings.wild_card_budget;
        for _ in 0..budget {
            assert_eq!(wild_card_auto_step(&mut state), Some(cell));
        }
        assert_eq!(state.wild_card, WildCard::Idle);
        assert_eq!(wild_card_auto_step(&mut state), None);
    }

    #[test]
    fn test_unclicked_wild_card_settles() {
        let rng = ScriptedRandom::new().with_chances([true]).with_picks([4]);
        let mut state = state_with(Board::new(5, 5), rng);
        assert!(try_spawn_wild_card(&mut state, &mut BTreeSet::new()));
        settle_wild_card(&mut state);
        assert_eq!(state.wild_card, WildCard::Idle);
        assert_eq!(state.stats.wild_cards_activated, 0);
    }

    #[test]
    fn test_last_chance_refunds_exhausted_move() {
        let rng = ScriptedRandom::new().with_chances([true]).with_picks([0]);
        let mut state = state_with(Board::new(8, 8), rng);
        state.moves = 0;
        assert!(maybe_offer_last_chance(&mut state));
        let cell = CellPos::new(1, 1);
        assert_eq!(state.last_chance.map(|o| o.cell), Some(cell));
        state.drain_events();

        assert!(claim_last_chance(&mut state, cell));
        assert_eq!(state.moves, 1);
        assert_eq!(state.score, 10);
        let events = state.drain_events();
        assert!(events.contains(&GameEvent::MoveBudgetChanged(1)));
        assert!(state.last_chance.is_none());
        assert!(state.scheduler.is_empty());
    }

    #[test]
    fn test_last_chance_not_offered_with_moves_left() {
        let rng = ScriptedRandom::new().with_chances([true]);
        let mut state = state_with(Board::new(8, 8), rng);
        state.moves = 10;
        assert!(!maybe_offer_last_chance(&mut state));
    }

    #[test]
    fn test_reroll_stays_in_radius_and_skips_dead_cells() {
        let settings = Settings {
            last_chance_radius_factor: 0.25,
            ..Settings::default()
        };
        // Every reroll targets left + down, two quarter turns from zero
        let rng = ScriptedRandom::new().with_picks(std::iter::repeat_n(2, 64));
        let mut state = GameState::with_board(settings, Board::new(8, 8), Box::new(rng));
        assert_eq!(state.settings.last_chance_radius(), 2);

        let center = CellPos::new(4, 4);
        let expired = CellPos::new(3, 4);
        let wild = CellPos::new(5, 4);
        state.squares.expired_cells.insert(expired);
        state.wild_card = WildCard::Active { cell: wild, budget: 3 };

        reroll_around(&mut state, center);
        for cell in state.board.positions() {
            let in_reach = manhattan(cell.as_tuple(), center.as_tuple()) <= 2;
            let expected = if in_reach && cell != expired && cell != wild { 2 } else { 0 };
            assert_eq!(state.board.get(cell), expected, "cell {:?}", cell);
        }
    }

    #[test]
    fn test_reroll_order_is_diagonal() {
        let order = reroll_order(5, 5, CellPos::new(2, 2), 1);
        assert_eq!(
            order,
            vec![
                CellPos::new(2, 2),
                CellPos::new(1, 2),
                CellPos::new(2, 1),
                CellPos::new(2, 3),
                CellPos::new(3, 2),
            ]
        );
        assert_eq!(reroll_order(3, 3, CellPos::new(0, 0), 10).len(), 9);
    }
}
