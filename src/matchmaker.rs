//! Finds a session with a free seat, or creates one.

use std::sync::Arc;

use derive_getters::Getters;
use tracing::{debug, info, instrument, warn};

use crate::config::ArenaConfig;
use crate::directory::{SessionDirectory, SessionHub, SessionName};
use crate::state::ParticipantId;

/// A participant's membership in a session.
#[derive(Debug, Clone, Getters)]
pub struct SessionHandle {
    /// Unique session name.
    session: SessionName,
    /// The member this handle belongs to.
    participant: ParticipantId,
    /// Relay for calls and broadcasts.
    hub: Arc<SessionHub>,
    /// True when this participant created the session.
    created: bool,
}

/// Matchmaking failed; nothing was joined or created.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum MatchmakingError {
    /// The directory could not be queried or refused the join.
    #[display("Connection failed: {reason}")]
    ConnectionFailed {
        /// Human-readable cause.
        reason: String,
    },
}

impl std::error::Error for MatchmakingError {}

fn connection_failed(err: impl std::fmt::Display) -> MatchmakingError {
    MatchmakingError::ConnectionFailed {
        reason: err.to_string(),
    }
}

/// Joins the first open session in the directory, or creates a new one.
#[derive(Debug, Clone)]
pub struct Matchmaker {
    directory: SessionDirectory,
    config: ArenaConfig,
}

impl Matchmaker {
    /// Creates a matchmaker over `directory`.
    pub fn new(directory: SessionDirectory, config: ArenaConfig) -> Self {
        Self { directory, config }
    }

    /// The directory this matchmaker queries.
    pub fn directory(&self) -> &SessionDirectory {
        &self.directory
    }

    /// Joins the first joinable session, waiting one refresh cycle before
    /// falling back to creating a uniquely named session.
    ///
    /// # Errors
    ///
    /// Returns [`MatchmakingError::ConnectionFailed`] if the directory is
    /// unreachable or the join is refused. There is no further retry.
    #[instrument(skip(self))]
    pub async fn find_or_create_session(
        &self,
        participant: ParticipantId,
    ) -> Result<SessionHandle, MatchmakingError> {
        if let Some(handle) = self.try_join(participant)? {
            return Ok(handle);
        }

        debug!(wait_ms = *self.config.directory_refresh_ms(), "No open sessions, waiting for refresh");
        tokio::time::sleep(self.config.directory_refresh()).await;

        if let Some(handle) = self.try_join(participant)? {
            return Ok(handle);
        }

        let session = format!("arena-{}", uuid::Uuid::new_v4().simple());
        let hub = self
            .directory
            .create(&session, participant)
            .inspect_err(|e| warn!(error = %e, "Failed to create session"))
            .map_err(connection_failed)?;
        info!(%session, %participant, "Created new session");
        Ok(SessionHandle {
            session,
            participant,
            hub,
            created: true,
        })
    }

    fn try_join(&self, participant: ParticipantId) -> Result<Option<SessionHandle>, MatchmakingError> {
        let open = self
            .directory
            .joinable()
            .inspect_err(|e| warn!(error = %e, "Directory query failed"))
            .map_err(connection_failed)?;
        let Some(target) = open.into_iter().next() else {
            return Ok(None);
        };

        let session = target.name().clone();
        let hub = self
            .directory
            .join(&session, participant)
            .inspect_err(|e| warn!(error = %e, %session, "Join rejected"))
            .map_err(connection_failed)?;
        info!(%session, %participant, "Joined existing session");
        Ok(Some(SessionHandle {
            session,
            participant,
            hub,
            created: false,
        }))
    }
}
