//! Top-level error for participant operations.

use crate::channel::CallError;
use crate::coordinator::CoordinatorError;
use crate::directory::DirectoryError;
use crate::machine::MoveRejection;
use crate::matchmaker::MatchmakingError;

/// Anything that can go wrong for a participant.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::From)]
pub enum ArenaError {
    /// No session could be found or created.
    #[display("{_0}")]
    #[from]
    Matchmaking(MatchmakingError),
    /// State construction or registration failed.
    #[display("{_0}")]
    #[from]
    Coordinator(CoordinatorError),
    /// The call did not reach the authority.
    #[display("{_0}")]
    #[from]
    Call(CallError),
    /// The authority refused the move.
    #[display("Move rejected: {_0}")]
    #[from]
    Rejected(MoveRejection),
    /// The directory refused the operation.
    #[display("{_0}")]
    #[from]
    Directory(DirectoryError),
    /// The awaited condition did not hold in time.
    #[display("Timed out waiting for session state")]
    WaitTimedOut,
}

impl std::error::Error for ArenaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArenaError::Matchmaking(e) => Some(e),
            ArenaError::Coordinator(e) => Some(e),
            ArenaError::Call(e) => Some(e),
            ArenaError::Rejected(e) => Some(e),
            ArenaError::Directory(e) => Some(e),
            ArenaError::WaitTimedOut => None,
        }
    }
}
