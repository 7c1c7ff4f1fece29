//! Full-board detection for tic-tac-toe.

use super::super::{Board, Cell};
use tracing::instrument;

/// Checks if the board is full (all cells claimed).
#[instrument(skip(board))]
pub fn is_full(board: &Board) -> bool {
    board.cells().iter().all(|c| *c != Cell::Empty)
}
