//! A connected participant: session membership, a live replica and the calls
//! it can make.

use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, instrument, warn};

use crate::channel::{Replica, SessionEvent};
use crate::coordinator::AuthorityCoordinator;
use crate::directory::DirectoryError;
use crate::error::ArenaError;
use crate::games::tictactoe::Seat;
use crate::machine::MoveOutcome;
use crate::matchmaker::{Matchmaker, SessionHandle};
use crate::state::{ParticipantId, ParticipantProfile};

/// One player in a session.
///
/// Keeps its [`Replica`] current from session broadcasts and re-enters the
/// session when authority migrates. Dropping it is a lost connection: the
/// participant leaves the directory and, if it held authority, the next
/// member takes over.
#[derive(Debug)]
pub struct Participant {
    handle: SessionHandle,
    profile: ParticipantProfile,
    coordinator: AuthorityCoordinator,
    replica: watch::Receiver<Replica>,
    listener: JoinHandle<()>,
    departed: bool,
}

impl Participant {
    /// Matchmakes, starts listening and enters the session.
    ///
    /// # Errors
    ///
    /// Fails if matchmaking fails or the participant cannot be seated; in
    /// the latter case the session is left again.
    #[instrument(skip(matchmaker, coordinator, profile), fields(name = %profile.name()))]
    pub async fn connect(
        matchmaker: &Matchmaker,
        coordinator: &AuthorityCoordinator,
        profile: ParticipantProfile,
    ) -> Result<Self, ArenaError> {
        let me = ParticipantId::random();
        let handle = matchmaker.find_or_create_session(me).await?;
        let events = handle.hub().subscribe();

        let initial = coordinator
            .directory()
            .authority_of(handle.session())
            .map(|token| Replica::with_authority(*token.holder(), *token.epoch()))
            .unwrap_or_default();
        let (replica_tx, replica) = watch::channel(initial);
        let listener = tokio::spawn(listen(
            events,
            replica_tx,
            handle.clone(),
            coordinator.clone(),
            profile.clone(),
        ));

        let participant = Self {
            handle,
            profile,
            coordinator: coordinator.clone(),
            replica,
            listener,
            departed: false,
        };

        match coordinator
            .enter(&participant.handle, participant.profile.clone())
            .await
        {
            Ok(seat) => {
                info!(participant = %me, session = %participant.handle.session(), %seat, "Connected");
                Ok(participant)
            }
            Err(e) => {
                warn!(error = %e, "Could not enter session, leaving");
                if let Err(leave) = participant.leave() {
                    debug!(error = %leave, "Leave after failed entry also failed");
                }
                Err(e.into())
            }
        }
    }

    /// Connection identity.
    pub fn id(&self) -> ParticipantId {
        *self.handle.participant()
    }

    /// Session name.
    pub fn session(&self) -> &str {
        self.handle.session()
    }

    /// Session membership.
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Name, rating and backend id.
    pub fn profile(&self) -> &ParticipantProfile {
        &self.profile
    }

    /// Snapshot of the local replica.
    pub fn replica(&self) -> Replica {
        self.replica.borrow().clone()
    }

    /// Seat held in the latest snapshot.
    pub fn seat(&self) -> Option<Seat> {
        self.replica.borrow().seat_of(self.id())
    }

    /// True while the directory designates this participant as authority.
    pub fn is_authority(&self) -> bool {
        self.coordinator
            .directory()
            .authority_of(self.session())
            .is_ok_and(|token| *token.holder() == self.id())
    }

    /// Raw session broadcasts from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.handle.hub().subscribe()
    }

    /// Asks the authority to claim `position` (0-8, row-major).
    #[instrument(skip(self), fields(participant = %self.id()))]
    pub async fn request_move(&self, position: i32) -> Result<MoveOutcome, ArenaError> {
        let outcome = self
            .handle
            .hub()
            .request_move(self.id(), position)
            .await??;
        Ok(outcome)
    }

    /// Asks the authority for a fresh board.
    #[instrument(skip(self), fields(participant = %self.id()))]
    pub async fn request_reset(&self) -> Result<(), ArenaError> {
        self.handle.hub().request_reset(self.id()).await?;
        Ok(())
    }

    /// Waits until the replica satisfies `condition`, up to `timeout`.
    pub async fn wait_until<F>(&self, timeout: Duration, condition: F) -> Result<Replica, ArenaError>
    where
        F: FnMut(&Replica) -> bool,
    {
        let mut replica = self.replica.clone();
        match tokio::time::timeout(timeout, replica.wait_for(condition)).await {
            Ok(Ok(seen)) => Ok(seen.clone()),
            Ok(Err(_)) => Err(ArenaError::Call(crate::channel::CallError::SessionClosed)),
            Err(_) => Err(ArenaError::WaitTimedOut),
        }
    }

    /// Leaves the session. If this participant was authority, the directory
    /// designates the next member.
    #[instrument(skip(self), fields(participant = %self.id(), session = %self.session()))]
    pub fn leave(mut self) -> Result<(), ArenaError> {
        self.depart()?;
        info!("Left session");
        Ok(())
    }

    /// Stops listening and gives up membership, at most once.
    fn depart(&mut self) -> Result<(), DirectoryError> {
        self.listener.abort();
        if std::mem::replace(&mut self.departed, true) {
            return Ok(());
        }
        self.coordinator
            .directory()
            .leave(self.handle.session(), self.id())
    }
}

impl Drop for Participant {
    fn drop(&mut self) {
        match self.depart() {
            Ok(()) => {}
            Err(DirectoryError::NotAMember { .. } | DirectoryError::NotFound { .. }) => {}
            Err(e) => debug!(participant = %self.id(), error = %e, "Could not leave on drop"),
        }
    }
}

/// Folds broadcasts into the replica and re-enters after a migration.
async fn listen(
    mut events: broadcast::Receiver<SessionEvent>,
    replica: watch::Sender<Replica>,
    handle: SessionHandle,
    coordinator: AuthorityCoordinator,
    profile: ParticipantProfile,
) {
    let me = *handle.participant();
    let mut reentry = JoinSet::new();

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(%me, skipped, "Replica lagged behind session events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        replica.send_modify(|r| r.apply(me, &event));

        match event {
            SessionEvent::AuthorityMigrated { epoch, .. } => {
                reentry.abort_all();
                let coordinator = coordinator.clone();
                let handle = handle.clone();
                let profile = profile.clone();
                reentry.spawn(async move {
                    if let Err(e) = coordinator.on_authority_migrated(&handle, profile, epoch).await {
                        warn!(error = %e, epoch, "Re-entry after migration failed");
                    }
                });
            }
            SessionEvent::SessionClosed => break,
            _ => {}
        }
        while reentry.try_join_next().is_some() {}
    }
    debug!(%me, "Listener stopped");
}
