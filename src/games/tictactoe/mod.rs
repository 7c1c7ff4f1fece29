mod position;
mod rules;
mod types;

pub use position::Position;
pub use rules::{LINES, check_win, is_full, winner};
pub use types::{Board, Cell, GameStatus, Seat};
