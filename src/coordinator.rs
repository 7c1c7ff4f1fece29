//! Authority coordination: state construction, registration and migration.
//!
//! Every participant runs a coordinator. The one designated authority by the
//! directory spawns the task that owns the [`MoveStateMachine`]; everybody
//! (authority included) then registers through the remote call channel.

use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::accounts::{AccountBackend, MatchReport};
use crate::channel::{CallError, RemoteCall, SessionEvent};
use crate::config::ArenaConfig;
use crate::directory::{DirectoryError, InstallError, SessionDirectory, SessionHub};
use crate::games::tictactoe::Seat;
use crate::machine::MoveStateMachine;
use crate::matchmaker::SessionHandle;
use crate::state::{ParticipantId, ParticipantProfile, RegistrationRejection, ReplicatedGameState};

/// What [`AuthorityCoordinator::ensure_state`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconstruction {
    /// A fresh state was constructed for this authority epoch.
    Created {
        /// Epoch the state belongs to.
        epoch: u64,
    },
    /// A state for this epoch was already live; nothing was constructed.
    AlreadyLive {
        /// Epoch of the live state.
        epoch: u64,
    },
    /// Someone else holds authority.
    NotAuthority {
        /// Current authority.
        authority: ParticipantId,
    },
}

/// Coordinator failures.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::From)]
pub enum CoordinatorError {
    /// The directory refused or could not answer.
    #[display("{_0}")]
    #[from]
    Directory(DirectoryError),
    /// The state never became available within the retry bound.
    #[display("Registration timed out after {attempts} attempts")]
    RegistrationTimeout {
        /// Attempts made.
        attempts: u32,
    },
    /// Both seats are held by other participants.
    #[display("Registration rejected: both player slots are full")]
    SlotsFull,
    /// The session was torn down.
    #[display("Session is closed")]
    SessionClosed,
}

impl std::error::Error for CoordinatorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoordinatorError::Directory(e) => Some(e),
            _ => None,
        }
    }
}

/// Builds the authoritative state when this participant is designated
/// authority, and seats participants with bounded retry.
#[derive(Debug, Clone)]
pub struct AuthorityCoordinator {
    directory: SessionDirectory,
    config: ArenaConfig,
    accounts: Option<Arc<dyn AccountBackend>>,
}

impl AuthorityCoordinator {
    /// Creates a coordinator. Without `accounts`, finished games are not reported.
    pub fn new(
        directory: SessionDirectory,
        config: ArenaConfig,
        accounts: Option<Arc<dyn AccountBackend>>,
    ) -> Self {
        Self {
            directory,
            config,
            accounts,
        }
    }

    /// Directory used to resolve authority.
    pub fn directory(&self) -> &SessionDirectory {
        &self.directory
    }

    /// Active configuration.
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// Constructs a fresh state if the directory designates `handle`'s
    /// participant as authority and none exists for the current epoch.
    ///
    /// Safe to call from any number of tasks: at most one construction
    /// happens per epoch.
    #[instrument(skip(self, handle), fields(session = %handle.session(), participant = %handle.participant()))]
    pub fn ensure_state(&self, handle: &SessionHandle) -> Result<Reconstruction, CoordinatorError> {
        let token = self.directory.authority_of(handle.session())?;
        if token.holder() != handle.participant() {
            debug!(authority = %token.holder(), "Not the authority");
            return Ok(Reconstruction::NotAuthority {
                authority: *token.holder(),
            });
        }

        let epoch = *token.epoch();
        let hub = Arc::downgrade(handle.hub());
        let accounts = self.accounts.clone();
        match handle
            .hub()
            .install_state(token, |queue| tokio::spawn(run_authority(hub, epoch, queue, accounts)))
        {
            Ok(()) => Ok(Reconstruction::Created { epoch }),
            Err(InstallError::AlreadyLive) => {
                info!(epoch, "Game state already live, skipping construction");
                Ok(Reconstruction::AlreadyLive { epoch })
            }
            Err(InstallError::Stale) => {
                let current = self.directory.authority_of(handle.session())?;
                Ok(Reconstruction::NotAuthority {
                    authority: *current.holder(),
                })
            }
            Err(InstallError::Closed) => Err(CoordinatorError::SessionClosed),
        }
    }

    /// Seats the participant, retrying while the state is not live.
    ///
    /// Waits one registration interval between attempts, or less if the
    /// state goes live sooner. Each attempt first re-derives authority, so a
    /// participant promoted mid-wait builds the state itself.
    #[instrument(skip(self, handle, profile), fields(session = %handle.session(), participant = %handle.participant()))]
    pub async fn register(
        &self,
        handle: &SessionHandle,
        profile: ParticipantProfile,
    ) -> Result<Seat, CoordinatorError> {
        let attempts = *self.config.registration_attempts();
        let interval = self.config.registration_interval();
        let mut ready = handle.hub().live_epoch();

        for attempt in 1..=attempts {
            match handle
                .hub()
                .register_participant(*handle.participant(), profile.clone())
                .await
            {
                Ok(Ok(seat)) => {
                    info!(%seat, attempt, "Registered");
                    return Ok(seat);
                }
                Ok(Err(RegistrationRejection::SlotsFull)) => {
                    warn!("Registration rejected, slots full");
                    return Err(CoordinatorError::SlotsFull);
                }
                Err(CallError::SessionClosed) => return Err(CoordinatorError::SessionClosed),
                Err(e) => {
                    debug!(attempt, error = %e, "Game state not ready");
                    if let Err(e) = self.ensure_state(handle) {
                        debug!(error = %e, "Could not re-derive authority");
                    }
                }
            }

            if attempt < attempts {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    Ok(()) = ready.changed() => {}
                }
            }
        }

        warn!(attempts, "Registration timed out");
        Err(CoordinatorError::RegistrationTimeout { attempts })
    }

    /// Session entry: construct the state if authority, then register.
    #[instrument(skip(self, handle, profile), fields(session = %handle.session()))]
    pub async fn enter(
        &self,
        handle: &SessionHandle,
        profile: ParticipantProfile,
    ) -> Result<Seat, CoordinatorError> {
        let reconstruction = self.ensure_state(handle)?;
        debug!(?reconstruction, "Entered session");
        self.register(handle, profile).await
    }

    /// Reacts to a new authority designation.
    ///
    /// The new authority builds a fresh state; every survivor registers again
    /// because seats do not carry over.
    #[instrument(skip(self, handle, profile), fields(session = %handle.session(), participant = %handle.participant()))]
    pub async fn on_authority_migrated(
        &self,
        handle: &SessionHandle,
        profile: ParticipantProfile,
        epoch: u64,
    ) -> Result<Seat, CoordinatorError> {
        info!(epoch, "Authority migrated, re-entering");
        self.enter(handle, profile).await
    }
}

/// Owns the state machine for one authority epoch and serves requests in
/// arrival order.
#[instrument(skip(hub, queue, accounts))]
async fn run_authority(
    hub: Weak<SessionHub>,
    epoch: u64,
    mut queue: mpsc::Receiver<RemoteCall>,
    accounts: Option<Arc<dyn AccountBackend>>,
) {
    let mut machine = MoveStateMachine::new();
    if let Some(hub) = hub.upgrade() {
        publish_state(&hub, epoch, &machine);
    }
    info!("Authority serving fresh game state");

    while let Some(call) = queue.recv().await {
        let Some(hub) = hub.upgrade() else {
            break;
        };
        if !hub.is_live(epoch) {
            warn!(call = call.name(), "Authority epoch retired, dropping request");
            break;
        }

        match call {
            RemoteCall::RequestMove {
                participant,
                position,
                reply,
            } => {
                let result = machine.request_move(position, participant);
                match &result {
                    Ok(outcome) => {
                        publish_state(&hub, epoch, &machine);
                        if outcome.is_terminal() {
                            let winner = machine.state().winner();
                            hub.publish(SessionEvent::GameOver { winner });
                            report_result(machine.state(), accounts.clone());
                        }
                    }
                    Err(reason) => hub.publish(SessionEvent::MoveRejected {
                        participant,
                        reason: reason.to_string(),
                    }),
                }
                if reply.send(result).is_err() {
                    debug!(%participant, "Requester went away before the reply");
                }
            }
            RemoteCall::RequestReset { participant, reply } => {
                machine.request_reset();
                publish_state(&hub, epoch, &machine);
                if reply.send(()).is_err() {
                    debug!(%participant, "Requester went away before the reply");
                }
            }
            RemoteCall::RegisterParticipant {
                participant,
                profile,
                reply,
            } => {
                let result = machine.register(participant, profile);
                if result.is_ok() {
                    publish_state(&hub, epoch, &machine);
                }
                if reply.send(result).is_err() {
                    debug!(%participant, "Requester went away before the reply");
                }
            }
        }
    }
    debug!("Authority task finished");
}

fn publish_state(hub: &SessionHub, epoch: u64, machine: &MoveStateMachine) {
    hub.publish(SessionEvent::StateUpdated {
        epoch,
        state: machine.state().clone(),
    });
}

/// Sends the finished game to the account backend on a detached task.
fn report_result(state: &ReplicatedGameState, accounts: Option<Arc<dyn AccountBackend>>) {
    let Some(accounts) = accounts else {
        debug!("No account backend, result not reported");
        return;
    };
    let backend_id = |seat| {
        state
            .holder(seat)
            .and_then(|holder| *holder.profile().backend_id())
    };
    let (Some(player1), Some(player2)) = (backend_id(Seat::One), backend_id(Seat::Two)) else {
        info!("Skipping result report, a player has no backend account");
        return;
    };
    let winner = state.winner().map(|seat| match seat {
        Seat::One => player1,
        Seat::Two => player2,
    });

    let report = MatchReport::new(player1, player2, winner);
    tokio::spawn(async move {
        match accounts.save_match(report).await {
            Ok(saved) => info!(
                player1_rating = saved.player1_new_rating(),
                player2_rating = saved.player2_new_rating(),
                "Match result reported"
            ),
            Err(e) => warn!(error = %e, "Failed to report match result"),
        }
    });
}
