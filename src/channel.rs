//! Remote call channel between participants and the session authority.
//!
//! Requests travel to the authority over an mpsc queue, each carrying a
//! oneshot for its reply. Results fan out to every member through a
//! broadcast channel of [`SessionEvent`]s.

use crate::games::tictactoe::Seat;
use crate::machine::{MoveOutcome, MoveRejection};
use crate::state::{ParticipantId, ParticipantProfile, RegistrationRejection, ReplicatedGameState};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::debug;

/// Reply half of a remote call.
pub type Reply<T> = oneshot::Sender<T>;

/// A request executed by the authority.
#[derive(Debug)]
pub enum RemoteCall {
    /// Claim a cell.
    RequestMove {
        /// Requester.
        participant: ParticipantId,
        /// Cell index as sent on the wire.
        position: i32,
        /// Accepted outcome or the rejection reason.
        reply: Reply<Result<MoveOutcome, MoveRejection>>,
    },
    /// Start over with a fresh board.
    RequestReset {
        /// Requester.
        participant: ParticipantId,
        /// Acknowledged once the reset is applied.
        reply: Reply<()>,
    },
    /// Take the next free seat.
    RegisterParticipant {
        /// Requester.
        participant: ParticipantId,
        /// Name, rating and backend id.
        profile: ParticipantProfile,
        /// Seat taken, or why not.
        reply: Reply<Result<Seat, RegistrationRejection>>,
    },
}

impl RemoteCall {
    /// Name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            RemoteCall::RequestMove { .. } => "RequestMove",
            RemoteCall::RequestReset { .. } => "RequestReset",
            RemoteCall::RegisterParticipant { .. } => "RegisterParticipant",
        }
    }

    /// Who sent the call.
    pub fn participant(&self) -> ParticipantId {
        match self {
            RemoteCall::RequestMove { participant, .. }
            | RemoteCall::RequestReset { participant, .. }
            | RemoteCall::RegisterParticipant { participant, .. } => *participant,
        }
    }
}

/// Broadcast from the session to all members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Authoritative snapshot after any change.
    StateUpdated {
        /// Authority epoch that produced the snapshot.
        epoch: u64,
        /// The snapshot.
        state: ReplicatedGameState,
    },
    /// A request from `participant` was refused. Only that participant acts on it.
    MoveRejected {
        /// Requester whose move was refused.
        participant: ParticipantId,
        /// Human-readable reason.
        reason: String,
    },
    /// The game ended; `winner` is `None` for a draw.
    GameOver {
        /// Winning seat.
        winner: Option<Seat>,
    },
    /// Someone entered the session.
    ParticipantJoined(ParticipantId),
    /// Someone left the session.
    ParticipantLeft(ParticipantId),
    /// The directory designated a new authority.
    AuthorityMigrated {
        /// New authority.
        authority: ParticipantId,
        /// Designation counter, bumped on every migration.
        epoch: u64,
    },
    /// Last member left; nothing further is accepted.
    SessionClosed,
}

/// Failure to get a call through to the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum CallError {
    /// No live game state exists for the session yet.
    #[display("Game state is not available yet")]
    StateUnavailable,
    /// The authority went away before answering.
    #[display("Authority disconnected before replying")]
    AuthorityGone,
    /// The session has been torn down.
    #[display("Session is closed")]
    SessionClosed,
}

impl std::error::Error for CallError {}

/// Read-only mirror of the session held by each participant.
#[derive(Debug, Clone, Default, Getters)]
pub struct Replica {
    /// Last authoritative snapshot; `None` while the authority rebuilds.
    state: Option<ReplicatedGameState>,
    /// Most recent rejection addressed to the local participant.
    last_rejection: Option<String>,
    /// Result of the last finished game: `Some(None)` is a draw.
    last_result: Option<Option<Seat>>,
    /// Current authority as last announced.
    authority: Option<ParticipantId>,
    /// Authority epoch as last announced.
    epoch: u64,
    /// The session was torn down.
    closed: bool,
}

impl Replica {
    /// Empty mirror that knows the current authority designation.
    pub fn with_authority(authority: ParticipantId, epoch: u64) -> Self {
        Self {
            authority: Some(authority),
            epoch,
            ..Self::default()
        }
    }

    /// Folds an event into the mirror from `me`'s point of view.
    pub fn apply(&mut self, me: ParticipantId, event: &SessionEvent) {
        match event {
            SessionEvent::StateUpdated { epoch, state } => {
                if *epoch < self.epoch {
                    debug!(%me, epoch, current = self.epoch, "Ignoring snapshot from a retired authority");
                    return;
                }
                self.epoch = *epoch;
                if !state.game_over() {
                    self.last_result = None;
                }
                self.state = Some(state.clone());
            }
            SessionEvent::MoveRejected {
                participant,
                reason,
            } => {
                if *participant == me {
                    self.last_rejection = Some(reason.clone());
                }
            }
            SessionEvent::GameOver { winner } => self.last_result = Some(*winner),
            SessionEvent::AuthorityMigrated { authority, epoch } => {
                self.authority = Some(*authority);
                self.epoch = *epoch;
                self.state = None;
            }
            SessionEvent::SessionClosed => self.closed = true,
            SessionEvent::ParticipantJoined(who) | SessionEvent::ParticipantLeft(who) => {
                debug!(%me, participant = %who, "Membership changed");
            }
        }
    }

    /// Seat held by `me` in the last snapshot.
    pub fn seat_of(&self, me: ParticipantId) -> Option<Seat> {
        self.state.as_ref().and_then(|s| s.seat_of(me))
    }
}
