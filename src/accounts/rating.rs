//! Elo rating adjustment applied after every recorded match.

use tracing::instrument;

/// Sensitivity of a single result.
pub const K_FACTOR: f64 = 32.0;

/// Rating given to new accounts.
pub const INITIAL_RATING: i32 = 1000;

/// Result of a match from player 1's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    /// Player 1 won.
    Player1,
    /// Player 2 won.
    Player2,
    /// Nobody won.
    Draw,
}

impl MatchResult {
    /// Score credited to player 1 and player 2.
    fn scores(self) -> (f64, f64) {
        match self {
            MatchResult::Player1 => (1.0, 0.0),
            MatchResult::Player2 => (0.0, 1.0),
            MatchResult::Draw => (0.5, 0.5),
        }
    }
}

/// Probability that a player rated `own` beats one rated `opponent`.
pub fn expected_score(own: i32, opponent: i32) -> f64 {
    1.0 / (1.0 + 10f64.powf(f64::from(opponent - own) / 400.0))
}

/// New ratings for player 1 and player 2.
///
/// Each delta is truncated toward zero and the result is floored at zero.
#[instrument]
pub fn rate(player1: i32, player2: i32, result: MatchResult) -> (i32, i32) {
    let (actual1, actual2) = result.scores();
    let delta1 = (K_FACTOR * (actual1 - expected_score(player1, player2))) as i32;
    let delta2 = (K_FACTOR * (actual2 - expected_score(player2, player1))) as i32;
    ((player1 + delta1).max(0), (player2 + delta2).max(0))
}
