//! Game rules hosted by the arena.

pub mod tictactoe;
