//! Game rules for tic-tac-toe.
//!
//! Pure functions over a [`Board`](super::Board); the authoritative state
//! machine composes them after every accepted move.

pub mod draw;
pub mod win;

pub use draw::is_full;
pub use win::{LINES, check_win, winner};
