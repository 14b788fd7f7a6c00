//! Formation detection: 2x2 squares and the 4x4 flower area

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::grid::{Board, CellPos, Orientation, nearest_counter};
use super::random::Randomizer;

/// Orientations of a closed 2x2 loop: top-left, top-right, bottom-left, bottom-right
pub const SQUARE_PATTERN: [Orientation; 4] = [Orientation::B, Orientation::C, Orientation::A, Orientation::D];

/// A 2x2 square formation, cells ordered top-left, top-right, bottom-left, bottom-right.
///
/// Always built from its top-left corner, so two squares over the same four
/// cells compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Square {
    cells: [CellPos; 4],
}

impl Square {
    pub fn at(top_left: CellPos) -> Self {
        let CellPos { row, col } = top_left;
        Self {
            cells: [
                top_left,
                CellPos::new(row, col + 1),
                CellPos::new(row + 1, col),
                CellPos::new(row + 1, col + 1),
            ],
        }
    }

    pub fn cells(&self) -> [CellPos; 4] {
        self.cells
    }

    pub fn top_left(&self) -> CellPos {
        self.cells[0]
    }

    pub fn contains(&self, pos: CellPos) -> bool {
        self.cells.contains(&pos)
    }

    pub fn overlaps(&self, cells: &BTreeSet<CellPos>) -> bool {
        self.cells.iter().any(|c| cells.contains(c))
    }

    /// Same four cells, regardless of order
    pub fn same_cells(&self, other: &Square) -> bool {
        let mut a = self.cells;
        let mut b = other.cells;
        a.sort();
        b.sort();
        a == b
    }

    /// Does the board currently show the closed-loop pattern here?
    pub fn matches(&self, board: &Board) -> bool {
        self.cells
            .iter()
            .zip(SQUARE_PATTERN)
            .all(|(&cell, want)| board.contains(cell) && board.orientation(cell) == want)
    }
}

/// Every 2x2 window showing the square pattern, in row-major order of the
/// top-left corner. Windows touching a `blocked` cell are skipped.
pub fn scan_squares(board: &Board, blocked: &BTreeSet<CellPos>) -> Vec<Square> {
    let mut found = Vec::new();
    if board.rows() < 2 || board.cols() < 2 {
        return found;
    }
    for row in 0..board.rows() - 1 {
        for col in 0..board.cols() - 1 {
            let square = Square::at(CellPos::new(row, col));
            if square.matches(board) && !square.overlaps(blocked) {
                found.push(square);
            }
        }
    }
    found
}

/// Squares in `current` with no counterpart in `previous`
pub fn diff_new_squares(current: &[Square], previous: &[Square]) -> Vec<Square> {
    current
        .iter()
        .filter(|sq| !previous.iter().any(|prev| prev.same_cells(sq)))
        .copied()
        .collect()
}

/// The one new square surfaced as a Squareformer this step: the first new
/// square touching a cell that just rotated. Any others are skipped.
pub fn squareformer(new_squares: &[Square], last_rotated: &BTreeSet<CellPos>) -> Option<Square> {
    new_squares.iter().find(|sq| sq.overlaps(last_rotated)).copied()
}

/// Side length of the flower area
pub const FLOWER_SIZE: usize = 4;

/// Bloom targets relative to the anchor; corners are left alone
pub const FLOWER_PATTERN: [[Option<Orientation>; FLOWER_SIZE]; FLOWER_SIZE] = {
    use Orientation::*;
    [
        [None, Some(C), Some(B), None],
        [Some(A), Some(B), Some(C), Some(D)],
        [Some(B), Some(A), Some(D), Some(C)],
        [None, Some(A), Some(D), None],
    ]
};

/// A bloomed 4x4 flower with the counters it replaced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowerArea {
    anchor: CellPos,
    snapshot: Vec<i32>,
}

impl FlowerArea {
    /// Record the current counters of the area anchored at `anchor`
    pub fn snapshot(board: &Board, anchor: CellPos) -> Self {
        let snapshot = Self::area(anchor).map(|cell| board.get(cell)).collect();
        Self { anchor, snapshot }
    }

    pub fn anchor(&self) -> CellPos {
        self.anchor
    }

    /// All 16 cells, row-major
    pub fn area(anchor: CellPos) -> impl Iterator<Item = CellPos> {
        (0..FLOWER_SIZE * FLOWER_SIZE).map(move |i| {
            CellPos::new(anchor.row + i / FLOWER_SIZE, anchor.col + i % FLOWER_SIZE)
        })
    }

    pub fn cells(&self) -> impl Iterator<Item = CellPos> + use<> {
        Self::area(self.anchor)
    }

    /// The 12 clickable non-corner cells
    pub fn petals(&self) -> BTreeSet<CellPos> {
        let anchor = self.anchor;
        self.cells()
            .filter(|c| FLOWER_PATTERN[c.row - anchor.row][c.col - anchor.col].is_some())
            .collect()
    }

    pub fn contains(&self, pos: CellPos) -> bool {
        pos.row >= self.anchor.row
            && pos.col >= self.anchor.col
            && pos.row < self.anchor.row + FLOWER_SIZE
            && pos.col < self.anchor.col + FLOWER_SIZE
    }

    /// New counters for the petals, each nudged the short way to its target
    pub fn bloom_targets(&self, board: &Board) -> Vec<(CellPos, i32)> {
        let anchor = self.anchor;
        self.cells()
            .filter_map(|cell| {
                FLOWER_PATTERN[cell.row - anchor.row][cell.col - anchor.col]
                    .map(|target| (cell, nearest_counter(board.get(cell), target)))
            })
            .collect()
    }

    /// Counters that undo the bloom exactly
    pub fn rollback_targets(&self) -> Vec<(CellPos, i32)> {
        self.cells().zip(self.snapshot.iter().copied()).collect()
    }
}

/// Pick a random 4x4 anchor whose area avoids every `occupied` cell
pub fn find_free_area(
    board: &Board,
    occupied: &BTreeSet<CellPos>,
    rng: &mut dyn Randomizer,
) -> Option<CellPos> {
    if board.rows() < FLOWER_SIZE || board.cols() < FLOWER_SIZE {
        return None;
    }
    let candidates: Vec<CellPos> = (0..=board.rows() - FLOWER_SIZE)
        .flat_map(|row| (0..=board.cols() - FLOWER_SIZE).map(move |col| CellPos::new(row, col)))
        .filter(|&anchor| FlowerArea::area(anchor).all(|cell| !occupied.contains(&cell)))
        .collect();
    if candidates.is_empty() {
        return None;
    }
    Some(candidates[rng.pick(0..candidates.len())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::random::ScriptedRandom;

    fn square_board(rows: usize, cols: usize, top_left: CellPos) -> Board {
        let mut board = Board::new(rows, cols);
        for (cell, o) in Square::at(top_left).cells().into_iter().zip(SQUARE_PATTERN) {
            board.set(cell, o.index() as i32);
        }
        board
    }

    #[test]
    fn test_scan_finds_single_square() {
        let board = square_board(5, 5, CellPos::new(1, 1));
        let squares = scan_squares(&board, &BTreeSet::new());
        assert_eq!(squares, vec![Square::at(CellPos::new(1, 1))]);
        assert_eq!(
            squares[0].cells(),
            [CellPos::new(1, 1), CellPos::new(1, 2), CellPos::new(2, 1), CellPos::new(2, 2)]
        );
    }

    #[test]
    fn test_scan_accepts_any_equivalent_counter() {
        let mut board = square_board(3, 3, CellPos::new(0, 0));
        board.turn(CellPos::new(0, 0), 8);
        board.turn(CellPos::new(1, 1), -12);
        assert_eq!(scan_squares(&board, &BTreeSet::new()).len(), 1);
    }

    #[test]
    fn test_pattern_exactness_all_256_combinations() {
        let top_left = CellPos::new(0, 0);
        let mut hits = 0;
        for code in 0..256u32 {
            let mut board = Board::new(2, 2);
            for (i, cell) in Square::at(top_left).cells().into_iter().enumerate() {
                board.set(cell, ((code >> (2 * i)) & 3) as i32);
            }
            let found = !scan_squares(&board, &BTreeSet::new()).is_empty();
            let expected = (0..4).all(|i| ((code >> (2 * i)) & 3) as u8 == SQUARE_PATTERN[i].index());
            assert_eq!(found, expected, "code {code}");
            hits += found as u32;
        }
        assert_eq!(hits, 1);
    }

    #[test]
    fn test_blocked_cells_suppress_square() {
        let board = square_board(4, 4, CellPos::new(1, 1));
        let blocked = BTreeSet::from([CellPos::new(2, 2)]);
        assert!(scan_squares(&board, &blocked).is_empty());
    }

    #[test]
    fn test_diff_new_squares() {
        let x = Square::at(CellPos::new(0, 0));
        let y = Square::at(CellPos::new(3, 3));
        let new = diff_new_squares(&[x, y], &[x]);
        assert_eq!(new, vec![y]);

        let rotated = BTreeSet::from([CellPos::new(4, 4)]);
        assert_eq!(squareformer(&new, &rotated), Some(y));
        let elsewhere = BTreeSet::from([CellPos::new(0, 0)]);
        assert_eq!(squareformer(&new, &elsewhere), None);
    }

    #[test]
    fn test_squareformer_takes_first_only() {
        let a = Square::at(CellPos::new(0, 0));
        let b = Square::at(CellPos::new(0, 2));
        let rotated = BTreeSet::from([CellPos::new(0, 1), CellPos::new(0, 2)]);
        assert_eq!(squareformer(&[a, b], &rotated), Some(a));
    }

    #[test]
    fn test_flower_petals_exclude_corners() {
        let board = Board::new(6, 6);
        let flower = FlowerArea::snapshot(&board, CellPos::new(1, 2));
        let petals = flower.petals();
        assert_eq!(petals.len(), 12);
        for corner in [(1, 2), (1, 5), (4, 2), (4, 5)] {
            assert!(!petals.contains(&CellPos::new(corner.0, corner.1)));
            assert!(flower.contains(CellPos::new(corner.0, corner.1)));
        }
        assert!(!flower.contains(CellPos::new(5, 5)));
    }

    #[test]
    fn test_bloom_then_rollback_restores_counters() {
        let mut rng = ScriptedRandom::new();
        let mut board = Board::random(4, 4, &mut rng);
        board.set(CellPos::new(1, 1), -7);
        board.set(CellPos::new(2, 2), 13);
        let before = board.clone();

        let flower = FlowerArea::snapshot(&board, CellPos::new(0, 0));
        for (cell, counter) in flower.bloom_targets(&board) {
            assert!((counter - board.get(cell)).abs() <= 2);
            board.set(cell, counter);
        }
        // The bloom's centre is a closed square
        assert!(Square::at(CellPos::new(1, 1)).matches(&board));

        for (cell, counter) in flower.rollback_targets() {
            board.set(cell, counter);
        }
        assert_eq!(board, before);
    }

    #[test]
    fn test_find_free_area() {
        let board = Board::new(5, 4);
        // Anchors (0,0) and (1,0) exist; block row 0
        let occupied = BTreeSet::from([CellPos::new(0, 3)]);
        let mut rng = ScriptedRandom::new();
        assert_eq!(find_free_area(&board, &occupied, &mut rng), Some(CellPos::new(1, 0)));

        let occupied = BTreeSet::from([CellPos::new(2, 2)]);
        assert_eq!(find_free_area(&board, &occupied, &mut rng), None);
        assert_eq!(find_free_area(&Board::new(3, 8), &BTreeSet::new(), &mut rng), None);
    }
}
