//! Board topology and pipe orientation
//!
//! Each cell stores an unbounded rotation counter. The facing of the elbow
//! pipe is derived from it (`counter mod 4`) and never stored, so turn
//! history survives across cascades.

use glam::IVec2;
use serde::{Deserialize, Serialize};

use super::random::Randomizer;
use crate::quarter_turns;

/// A board position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellPos {
    pub row: usize,
    pub col: usize,
}

impl CellPos {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Step one cell along `offset` (x = col, y = row); `None` when it leaves a `rows x cols` board
    pub fn step(self, offset: IVec2, rows: usize, cols: usize) -> Option<CellPos> {
        let row = self.row as i64 + offset.y as i64;
        let col = self.col as i64 + offset.x as i64;
        if row < 0 || col < 0 || row >= rows as i64 || col >= cols as i64 {
            return None;
        }
        Some(CellPos::new(row as usize, col as usize))
    }

    /// In-bounds orthogonal neighbours
    pub fn neighbors(self, rows: usize, cols: usize) -> impl Iterator<Item = CellPos> {
        Compass::ALL
            .into_iter()
            .filter_map(move |dir| self.step(dir.offset(), rows, cols))
    }

    pub fn as_tuple(self) -> (usize, usize) {
        (self.row, self.col)
    }
}

/// The four compass directions a pipe arm can face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compass {
    Up,
    Right,
    Down,
    Left,
}

impl Compass {
    pub const ALL: [Compass; 4] = [Compass::Up, Compass::Right, Compass::Down, Compass::Left];

    /// Grid offset (x = column delta, y = row delta)
    pub fn offset(self) -> IVec2 {
        match self {
            Compass::Up => IVec2::new(0, -1),
            Compass::Right => IVec2::new(1, 0),
            Compass::Down => IVec2::new(0, 1),
            Compass::Left => IVec2::new(-1, 0),
        }
    }

    pub fn opposite(self) -> Compass {
        match self {
            Compass::Up => Compass::Down,
            Compass::Right => Compass::Left,
            Compass::Down => Compass::Up,
            Compass::Left => Compass::Right,
        }
    }
}

/// Pipe facing, decoded from a rotation counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    /// Up + right
    A = 0,
    /// Right + down
    B = 1,
    /// Left + down
    C = 2,
    /// Up + left
    D = 3,
}

impl Orientation {
    pub const ALL: [Orientation; 4] = [Orientation::A, Orientation::B, Orientation::C, Orientation::D];

    pub fn from_counter(counter: i32) -> Self {
        Self::from_index(quarter_turns(counter))
    }

    pub fn from_index(index: u8) -> Self {
        Self::ALL[(index % 4) as usize]
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    /// The two arms of the elbow. Always 90 degrees apart.
    pub fn arms(self) -> [Compass; 2] {
        match self {
            Orientation::A => [Compass::Up, Compass::Right],
            Orientation::B => [Compass::Right, Compass::Down],
            Orientation::C => [Compass::Left, Compass::Down],
            Orientation::D => [Compass::Up, Compass::Left],
        }
    }

    pub fn points(self, dir: Compass) -> bool {
        self.arms().contains(&dir)
    }
}

/// Orientation of an unbounded counter (negative-safe)
#[inline]
pub fn orientation_of(counter: i32) -> Orientation {
    Orientation::from_counter(counter)
}

/// Grid offsets of the two arms of `orientation`
pub fn pointing_directions(orientation: Orientation) -> [IVec2; 2] {
    let [a, b] = orientation.arms();
    [a.offset(), b.offset()]
}

/// Counter closest to `current` whose orientation is `target`.
///
/// Moves at most two quarter turns. An exact half turn goes forward when the
/// raw difference is +2 and backward when it is -2.
pub fn nearest_counter(current: i32, target: Orientation) -> i32 {
    let mut diff = target.index() as i32 - quarter_turns(current) as i32;
    if diff > 2 {
        diff -= 4;
    } else if diff < -2 {
        diff += 4;
    }
    current + diff
}

/// Fixed-size board of rotation counters, stored row-major
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    rows: usize,
    cols: usize,
    counters: Vec<i32>,
}

impl Board {
    /// Board with every counter at zero (all pipes facing up + right)
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            counters: vec![0; rows * cols],
        }
    }

    /// Board from row-major counters; `None` if the length does not match
    pub fn from_counters(rows: usize, cols: usize, counters: Vec<i32>) -> Option<Self> {
        if counters.len() != rows * cols {
            return None;
        }
        Some(Self { rows, cols, counters })
    }

    /// Board with a uniformly random orientation in every cell
    pub fn random(rows: usize, cols: usize, rng: &mut dyn Randomizer) -> Self {
        let counters = (0..rows * cols).map(|_| rng.pick(0..4) as i32).collect();
        Self { rows, cols, counters }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    fn idx(&self, pos: CellPos) -> usize {
        pos.row * self.cols + pos.col
    }

    pub fn contains(&self, pos: CellPos) -> bool {
        pos.row < self.rows && pos.col < self.cols
    }

    /// Not on the outer ring
    pub fn is_interior(&self, pos: CellPos) -> bool {
        pos.row > 0 && pos.col > 0 && pos.row + 1 < self.rows && pos.col + 1 < self.cols
    }

    pub fn get(&self, pos: CellPos) -> i32 {
        self.counters[self.idx(pos)]
    }

    pub fn set(&mut self, pos: CellPos, counter: i32) {
        let i = self.idx(pos);
        self.counters[i] = counter;
    }

    /// Add `delta` quarter turns and return the new counter
    pub fn turn(&mut self, pos: CellPos, delta: i32) -> i32 {
        let i = self.idx(pos);
        self.counters[i] += delta;
        self.counters[i]
    }

    pub fn orientation(&self, pos: CellPos) -> Orientation {
        orientation_of(self.get(pos))
    }

    pub fn step(&self, pos: CellPos, dir: Compass) -> Option<CellPos> {
        pos.step(dir.offset(), self.rows, self.cols)
    }

    /// All positions in row-major order
    pub fn positions(&self) -> impl Iterator<Item = CellPos> + use<> {
        let cols = self.cols;
        (0..self.rows * self.cols).map(move |i| CellPos::new(i / cols, i % cols))
    }

    /// True iff `from` has an arm facing `dir` and the neighbour there faces back
    pub fn connected(&self, from: CellPos, dir: Compass) -> bool {
        match self.step(from, dir) {
            Some(to) => self.orientation(from).points(dir) && self.orientation(to).points(dir.opposite()),
            None => false,
        }
    }
}
