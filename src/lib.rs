//! Strictly Arena - authoritative two-player tic-tac-toe sessions.
//!
//! Participants find each other through a [`SessionDirectory`], the first
//! member of a session becomes its authority and owns the game state, and
//! everybody else mirrors that state from broadcasts.
//!
//! # Architecture
//!
//! - **Directory**: session registry, membership and authority designation
//! - **Matchmaker**: joins an open session or creates a new one
//! - **Coordinator**: state construction, registration and migration
//! - **Machine**: move validation and win/draw detection
//! - **Accounts**: registration, login, ratings and the leaderboard
//!
//! # Example
//!
//! ```no_run
//! use strictly_arena::{
//!     ArenaConfig, AuthorityCoordinator, Matchmaker, Participant, ParticipantProfile,
//!     SessionDirectory,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ArenaConfig::default();
//! let directory = SessionDirectory::new(*config.event_capacity());
//! let matchmaker = Matchmaker::new(directory.clone(), config.clone());
//! let coordinator = AuthorityCoordinator::new(directory, config, None);
//!
//! let alice = Participant::connect(&matchmaker, &coordinator, ParticipantProfile::guest("alice")).await?;
//! alice.request_move(4).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod accounts;
mod channel;
mod config;
mod coordinator;
mod db;
mod directory;
mod error;
mod games;
mod machine;
mod matchmaker;
mod participant;
mod state;

// Crate-level exports - Accounts
pub use accounts::{
    Account, AccountBackend, AccountError, AccountService, Credentials, HttpAccountClient,
    INITIAL_RATING, InMemoryAccounts, K_FACTOR, LEADERBOARD_SIZE, LeaderboardEntry, MatchReport,
    MatchResult, MatchSaved, SharedBackend, expected_score, hash_password, rate, router,
    verify_password,
};

// Crate-level exports - Remote call channel
pub use channel::{CallError, RemoteCall, Replica, Reply, SessionEvent};

// Crate-level exports - Configuration
pub use config::{ArenaConfig, ConfigError};

// Crate-level exports - Authority coordination
pub use coordinator::{AuthorityCoordinator, CoordinatorError, Reconstruction};

// Crate-level exports - Persistence
pub use db::{AccountRepository, DbError, DbErrorKind, MatchRecord, NewMatchRecord, NewPlayerRecord, PlayerRecord};

// Crate-level exports - Session directory
pub use directory::{
    AuthorityToken, DirectoryError, InstallError, SESSION_CAPACITY, SessionDirectory, SessionHub,
    SessionInfo, SessionName,
};

// Crate-level exports - Errors
pub use error::ArenaError;

// Crate-level exports - Game types (tic-tac-toe)
pub use games::tictactoe::{
    Board, Cell, GameStatus, LINES, Position, Seat, check_win, is_full, winner,
};

// Crate-level exports - Move validation
pub use machine::{MoveOutcome, MoveRejection, MoveStateMachine, Phase};

// Crate-level exports - Matchmaking
pub use matchmaker::{Matchmaker, MatchmakingError, SessionHandle};

// Crate-level exports - Participants
pub use participant::Participant;

// Crate-level exports - Replicated state
pub use state::{
    ParticipantId, ParticipantProfile, RegistrationRejection, ReplicatedGameState, SeatHolder,
};
