//! Player accounts, ratings and match history.

mod api;
mod backend;
mod client;
mod memory;
mod password;
mod rating;
mod service;

pub use api::{SharedBackend, router};
pub use backend::{
    Account, AccountBackend, AccountError, Credentials, LEADERBOARD_SIZE, LeaderboardEntry,
    MatchReport, MatchSaved,
};
pub use client::HttpAccountClient;
pub use memory::InMemoryAccounts;
pub use password::{hash_password, verify_password};
pub use rating::{INITIAL_RATING, K_FACTOR, MatchResult, expected_score, rate};
pub use service::AccountService;
