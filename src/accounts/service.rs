//! Account backend over the SQLite repository.

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use super::backend::{
    Account, AccountBackend, AccountError, Credentials, LEADERBOARD_SIZE, LeaderboardEntry,
    MatchReport, MatchSaved,
};
use super::password::{hash_password, verify_password};
use super::rating::rate;
use crate::db::{AccountRepository, DbError, NewMatchRecord, NewPlayerRecord, PlayerRecord};

/// Service layer for account operations.
///
/// Wraps [`AccountRepository`] with validation, password hashing and rating
/// updates. Blocking database work runs on the blocking thread pool.
#[derive(Debug, Clone)]
pub struct AccountService {
    repository: AccountRepository,
}

impl AccountService {
    /// Creates a new account service backed by the given repository.
    #[instrument(skip(repository))]
    pub fn new(repository: AccountRepository) -> Self {
        info!("Creating AccountService");
        Self { repository }
    }

    /// Returns the underlying repository.
    pub fn repository(&self) -> &AccountRepository {
        &self.repository
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T, AccountError>
    where
        T: Send + 'static,
        F: FnOnce(AccountRepository) -> Result<T, AccountError> + Send + 'static,
    {
        let repository = self.repository.clone();
        tokio::task::spawn_blocking(move || work(repository))
            .await
            .map_err(DbError::from)?
    }
}

fn to_account(record: &PlayerRecord) -> Account {
    Account::new(*record.id(), record.username().clone(), *record.rating())
}

#[async_trait]
impl AccountBackend for AccountService {
    #[instrument(skip(self, credentials), fields(username = %credentials.username()))]
    async fn register(&self, credentials: Credentials) -> Result<Account, AccountError> {
        credentials.validate_for_registration()?;
        self.blocking(move |repo| {
            if repo.player_by_username(credentials.username())?.is_some() {
                return Err(AccountError::UsernameTaken);
            }
            let hash = hash_password(credentials.password())?;
            let record = repo
                .create_player(NewPlayerRecord::new(credentials.username().clone(), hash))
                .map_err(|e| {
                    if e.is_duplicate() {
                        debug!("Lost a concurrent registration for the same username");
                        AccountError::UsernameTaken
                    } else {
                        AccountError::from(e)
                    }
                })?;
            Ok(to_account(&record))
        })
        .await
    }

    #[instrument(skip(self, credentials), fields(username = %credentials.username()))]
    async fn login(&self, credentials: Credentials) -> Result<Account, AccountError> {
        self.blocking(move |repo| {
            let record = repo
                .player_by_username(credentials.username())?
                .ok_or(AccountError::InvalidCredentials)?;
            if !verify_password(credentials.password(), record.password_hash()) {
                debug!("Password mismatch");
                return Err(AccountError::InvalidCredentials);
            }
            Ok(to_account(&record))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn save_match(&self, report: MatchReport) -> Result<MatchSaved, AccountError> {
        let result = report.result()?;
        self.blocking(move |repo| {
            let new_match = NewMatchRecord::new(
                *report.player1_id(),
                *report.player2_id(),
                *report.winner_id(),
            );
            let (p1, p2) = repo
                .record_match(new_match, |r1, r2| rate(r1, r2, result))?
                .ok_or_else(|| AccountError::InvalidRequest {
                    reason: "Invalid player IDs".to_string(),
                })?;
            Ok(MatchSaved::new(*p1.rating(), *p2.rating()))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, AccountError> {
        self.blocking(|repo| {
            let top = repo.top_players(LEADERBOARD_SIZE as i64)?;
            Ok(top
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    LeaderboardEntry::new(i + 1, p.username().clone(), *p.rating(), *p.games_played())
                })
                .collect())
        })
        .await
    }
}
