//! Process-local account backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::backend::{
    Account, AccountBackend, AccountError, Credentials, LEADERBOARD_SIZE, LeaderboardEntry,
    MatchReport, MatchSaved,
};
use super::password::{hash_password, verify_password};
use super::rating::{INITIAL_RATING, rate};

#[derive(Debug, Clone)]
struct StoredPlayer {
    id: i32,
    username: String,
    password_hash: String,
    rating: i32,
    games_played: i32,
}

impl StoredPlayer {
    fn account(&self) -> Account {
        Account::new(self.id, self.username.clone(), self.rating)
    }
}

#[derive(Debug, Default)]
struct Ledger {
    players: Vec<StoredPlayer>,
    matches: Vec<MatchReport>,
}

/// Account backend kept in memory, with the same rules as the database one.
///
/// Used by the local `play` command and by tests. Can be switched offline to
/// simulate an unreachable backend.
#[derive(Debug, Default)]
pub struct InMemoryAccounts {
    ledger: Mutex<Ledger>,
    offline: AtomicBool,
}

impl InMemoryAccounts {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn ledger(&self) -> Result<MutexGuard<'_, Ledger>, AccountError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AccountError::Unavailable {
                reason: "backend offline".to_string(),
            });
        }
        Ok(self.ledger.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Makes every call fail with [`AccountError::Unavailable`] while `true`.
    pub fn set_offline(&self, offline: bool) {
        warn!(offline, "Toggling in-memory account backend availability");
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Current state of an account, if it exists.
    pub fn account(&self, username: &str) -> Option<Account> {
        let ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
        ledger
            .players
            .iter()
            .find(|p| p.username == username)
            .map(StoredPlayer::account)
    }

    /// Every match recorded so far, oldest first.
    pub fn matches(&self) -> Vec<MatchReport> {
        self.ledger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .matches
            .clone()
    }
}

#[async_trait]
impl AccountBackend for InMemoryAccounts {
    #[instrument(skip(self, credentials), fields(username = %credentials.username()))]
    async fn register(&self, credentials: Credentials) -> Result<Account, AccountError> {
        credentials.validate_for_registration()?;
        let password_hash = hash_password(credentials.password())?;

        let mut ledger = self.ledger()?;
        if ledger.players.iter().any(|p| &p.username == credentials.username()) {
            return Err(AccountError::UsernameTaken);
        }
        let id = ledger.players.iter().map(|p| p.id).max().unwrap_or(0) + 1;
        let player = StoredPlayer {
            id,
            username: credentials.username().clone(),
            password_hash,
            rating: INITIAL_RATING,
            games_played: 0,
        };
        let account = player.account();
        ledger.players.push(player);
        info!(player_id = id, "Account registered");
        Ok(account)
    }

    #[instrument(skip(self, credentials), fields(username = %credentials.username()))]
    async fn login(&self, credentials: Credentials) -> Result<Account, AccountError> {
        let ledger = self.ledger()?;
        let player = ledger
            .players
            .iter()
            .find(|p| &p.username == credentials.username())
            .ok_or(AccountError::InvalidCredentials)?;
        if !verify_password(credentials.password(), &player.password_hash) {
            return Err(AccountError::InvalidCredentials);
        }
        debug!(player_id = player.id, "Login succeeded");
        Ok(player.account())
    }

    #[instrument(skip(self))]
    async fn save_match(&self, report: MatchReport) -> Result<MatchSaved, AccountError> {
        let result = report.result()?;
        let mut ledger = self.ledger()?;

        let index_of = |id: i32, players: &[StoredPlayer]| players.iter().position(|p| p.id == id);
        let (Some(i1), Some(i2)) = (
            index_of(*report.player1_id(), &ledger.players),
            index_of(*report.player2_id(), &ledger.players),
        ) else {
            return Err(AccountError::InvalidRequest {
                reason: "Invalid player IDs".to_string(),
            });
        };

        let (r1, r2) = rate(ledger.players[i1].rating, ledger.players[i2].rating, result);
        for (index, rating) in [(i1, r1), (i2, r2)] {
            let player = &mut ledger.players[index];
            player.rating = rating;
            player.games_played += 1;
        }
        ledger.matches.push(report);
        info!(player1_rating = r1, player2_rating = r2, "Match recorded");
        Ok(MatchSaved::new(r1, r2))
    }

    #[instrument(skip(self))]
    async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, AccountError> {
        let ledger = self.ledger()?;
        let mut ranked: Vec<_> = ledger.players.iter().collect();
        ranked.sort_by(|a, b| b.rating.cmp(&a.rating).then(a.id.cmp(&b.id)));
        Ok(ranked
            .into_iter()
            .take(LEADERBOARD_SIZE)
            .enumerate()
            .map(|(i, p)| LeaderboardEntry::new(i + 1, p.username.clone(), p.rating, p.games_played))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(name: &str) -> Credentials {
        Credentials::new(name.to_string(), "password".to_string())
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let accounts = InMemoryAccounts::new();
        let ann = accounts.register(creds("ann")).await.unwrap();
        assert_eq!(*ann.rating(), 1000);

        let again = accounts.login(creds("ann")).await.unwrap();
        assert_eq!(again, ann);

        let wrong = Credentials::new("ann".into(), "nope-nope".into());
        assert!(matches!(accounts.login(wrong).await, Err(AccountError::InvalidCredentials)));
        assert!(matches!(accounts.login(creds("zed")).await, Err(AccountError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_duplicate_username() {
        let accounts = InMemoryAccounts::new();
        accounts.register(creds("ann")).await.unwrap();
        assert!(matches!(accounts.register(creds("ann")).await, Err(AccountError::UsernameTaken)));
    }

    #[tokio::test]
    async fn test_save_match_updates_ratings_and_board() {
        let accounts = InMemoryAccounts::new();
        let ann = accounts.register(creds("ann")).await.unwrap();
        let bob = accounts.register(creds("bob")).await.unwrap();

        let saved = accounts
            .save_match(MatchReport::new(*ann.player_id(), *bob.player_id(), Some(*ann.player_id())))
            .await
            .unwrap();
        assert_eq!(saved, MatchSaved::new(1016, 984));

        let board = accounts.leaderboard().await.unwrap();
        assert_eq!(board[0], LeaderboardEntry::new(1, "ann".into(), 1016, 1));
        assert_eq!(board[1], LeaderboardEntry::new(2, "bob".into(), 984, 1));
    }

    #[tokio::test]
    async fn test_unknown_player_rejected() {
        let accounts = InMemoryAccounts::new();
        let ann = accounts.register(creds("ann")).await.unwrap();
        let result = accounts
            .save_match(MatchReport::new(*ann.player_id(), 99, None))
            .await;
        assert!(matches!(result, Err(AccountError::InvalidRequest { .. })));
        assert!(accounts.matches().is_empty());
    }

    #[tokio::test]
    async fn test_offline_backend_fails() {
        let accounts = InMemoryAccounts::new();
        accounts.set_offline(true);
        assert!(matches!(accounts.leaderboard().await, Err(AccountError::Unavailable { .. })));
    }
}
