//! The account backend contract and its wire types.

use derive_getters::Getters;
use derive_new::new;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::rating::MatchResult;
use crate::db::DbError;
use crate::state::ParticipantProfile;

/// Number of entries returned by [`AccountBackend::leaderboard`].
pub const LEADERBOARD_SIZE: usize = 10;

/// Username length bounds, in characters.
pub const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=50;

/// Minimum password length, in characters.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Username and password as sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, new)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Checks the bounds required for a new account.
    #[instrument(skip(self), fields(username = %self.username))]
    pub fn validate_for_registration(&self) -> Result<(), AccountError> {
        let name_len = self.username.chars().count();
        if !USERNAME_LEN.contains(&name_len) {
            return Err(AccountError::InvalidRequest {
                reason: format!(
                    "Username must be {} to {} characters",
                    USERNAME_LEN.start(),
                    USERNAME_LEN.end()
                ),
            });
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AccountError::InvalidRequest {
                reason: format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
            });
        }
        Ok(())
    }
}

/// A player account as returned by register and login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, new)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    player_id: i32,
    username: String,
    #[serde(rename = "eloRating")]
    rating: i32,
}

impl Account {
    /// Profile used to enter a session with this account.
    pub fn profile(&self) -> ParticipantProfile {
        ParticipantProfile::new(self.username.clone(), self.rating, Some(self.player_id))
    }
}

/// A finished game to be recorded. `winner_id` is `None` for a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Getters, new)]
#[serde(rename_all = "camelCase")]
pub struct MatchReport {
    player1_id: i32,
    player2_id: i32,
    winner_id: Option<i32>,
}

impl MatchReport {
    /// Resolves the winner id against the two players.
    ///
    /// A winner id naming neither player is refused rather than scored.
    pub fn result(&self) -> Result<MatchResult, AccountError> {
        if self.player1_id == self.player2_id {
            return Err(AccountError::InvalidRequest {
                reason: "A player cannot play against themselves".to_string(),
            });
        }
        match self.winner_id {
            None => Ok(MatchResult::Draw),
            Some(id) if id == self.player1_id => Ok(MatchResult::Player1),
            Some(id) if id == self.player2_id => Ok(MatchResult::Player2),
            Some(id) => Err(AccountError::InvalidRequest {
                reason: format!("Winner {} did not play in this match", id),
            }),
        }
    }
}

/// New ratings after a recorded match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, new)]
#[serde(rename_all = "camelCase")]
pub struct MatchSaved {
    player1_new_rating: i32,
    player2_new_rating: i32,
}

/// One row of the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, new)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    rank: usize,
    username: String,
    #[serde(rename = "eloRating")]
    rating: i32,
    games_played: i32,
}

/// Account backend failures.
#[derive(Debug, Clone, derive_more::Display, derive_more::From)]
pub enum AccountError {
    /// Registration with a name already in use.
    #[display("Username already taken")]
    UsernameTaken,
    /// Unknown user or wrong password. The two are not distinguished.
    #[display("Invalid username or password")]
    InvalidCredentials,
    /// The request failed validation.
    #[display("Invalid request: {reason}")]
    InvalidRequest {
        /// What was wrong.
        reason: String,
    },
    /// The backend could not be reached or failed internally.
    #[display("Account backend unavailable: {reason}")]
    Unavailable {
        /// Transport or server detail.
        reason: String,
    },
    /// Persistence failure.
    #[display("{_0}")]
    #[from]
    Storage(DbError),
}

impl std::error::Error for AccountError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AccountError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

/// Registration, login, match recording and rankings.
#[async_trait::async_trait]
pub trait AccountBackend: Send + Sync + std::fmt::Debug {
    /// Creates an account with the starting rating.
    async fn register(&self, credentials: Credentials) -> Result<Account, AccountError>;

    /// Authenticates an existing account.
    async fn login(&self, credentials: Credentials) -> Result<Account, AccountError>;

    /// Records a finished game and updates both ratings.
    async fn save_match(&self, report: MatchReport) -> Result<MatchSaved, AccountError>;

    /// Top players by rating, ranked from 1.
    async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, AccountError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_bounds() {
        let ok = Credentials::new("bob".into(), "secret".into());
        assert!(ok.validate_for_registration().is_ok());

        let short_name = Credentials::new("bo".into(), "secret".into());
        assert!(matches!(
            short_name.validate_for_registration(),
            Err(AccountError::InvalidRequest { .. })
        ));

        let long_name = Credentials::new("x".repeat(51), "secret".into());
        assert!(long_name.validate_for_registration().is_err());

        let short_password = Credentials::new("bob".into(), "12345".into());
        assert!(short_password.validate_for_registration().is_err());
    }

    #[test]
    fn test_match_result_resolution() {
        assert_eq!(MatchReport::new(1, 2, None).result().unwrap(), MatchResult::Draw);
        assert_eq!(MatchReport::new(1, 2, Some(1)).result().unwrap(), MatchResult::Player1);
        assert_eq!(MatchReport::new(1, 2, Some(2)).result().unwrap(), MatchResult::Player2);
        assert!(MatchReport::new(1, 2, Some(3)).result().is_err());
        assert!(MatchReport::new(1, 1, None).result().is_err());
    }

    #[test]
    fn test_wire_names_match_existing_clients() {
        let json = serde_json::to_value(Account::new(7, "ann".into(), 1016)).unwrap();
        assert_eq!(json["playerId"], 7);
        assert_eq!(json["eloRating"], 1016);

        let report: MatchReport =
            serde_json::from_str(r#"{"player1Id":1,"player2Id":2,"winnerId":null}"#).unwrap();
        assert_eq!(report, MatchReport::new(1, 2, None));
    }
}
