//! Win detection logic for tic-tac-toe.

use super::super::{Board, Cell, Position, Seat};
use tracing::instrument;

/// The eight winning lines: rows, columns, diagonals.
pub const LINES: [[Position; 3]; 8] = [
    // Rows
    [Position::TopLeft, Position::TopCenter, Position::TopRight],
    [
        Position::MiddleLeft,
        Position::Center,
        Position::MiddleRight,
    ],
    [
        Position::BottomLeft,
        Position::BottomCenter,
        Position::BottomRight,
    ],
    // Columns
    [
        Position::TopLeft,
        Position::MiddleLeft,
        Position::BottomLeft,
    ],
    [
        Position::TopCenter,
        Position::Center,
        Position::BottomCenter,
    ],
    [
        Position::TopRight,
        Position::MiddleRight,
        Position::BottomRight,
    ],
    // Diagonals
    [Position::TopLeft, Position::Center, Position::BottomRight],
    [Position::TopRight, Position::Center, Position::BottomLeft],
];

/// Checks whether `seat` owns all three cells of any line.
#[instrument(skip(board))]
pub fn check_win(board: &Board, seat: Seat) -> bool {
    let mark = Cell::Taken(seat);
    LINES
        .iter()
        .any(|line| line.iter().all(|pos| board.get(*pos) == mark))
}

/// Returns the seat holding a complete line, if any.
#[instrument(skip(board))]
pub fn winner(board: &Board) -> Option<Seat> {
    [Seat::One, Seat::Two]
        .into_iter()
        .find(|seat| check_win(board, *seat))
}
