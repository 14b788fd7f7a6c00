//! Chain-reaction propagation
//!
//! A pure query over the board: which cells must turn next because a pipe
//! that just turned now points at a neighbour that points back.

use std::collections::BTreeSet;

use super::grid::{Board, CellPos};

/// Cells to rotate on the next step.
///
/// For every cell in `rotated`, each arm is followed to its neighbour; when the
/// neighbour's arm faces back, both cells are collected. Cells in `excluded`
/// (a spinning or active wild card) are never collected and never drag a
/// partner in. The board is not mutated.
pub fn expand_chain(
    board: &Board,
    rotated: &BTreeSet<CellPos>,
    excluded: &BTreeSet<CellPos>,
) -> BTreeSet<CellPos> {
    let mut next = BTreeSet::new();
    for &cell in rotated {
        for dir in board.orientation(cell).arms() {
            let Some(neighbor) = board.step(cell, dir) else {
                continue;
            };
            if excluded.contains(&neighbor) {
                continue;
            }
            if board.orientation(neighbor).points(dir.opposite()) {
                if !excluded.contains(&cell) {
                    next.insert(cell);
                }
                next.insert(neighbor);
            }
        }
    }
    next
}
