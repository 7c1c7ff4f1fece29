//! Session directory: the registry of sessions and the single source of
//! truth for which member holds authority.

use crate::channel::{CallError, RemoteCall, Reply, SessionEvent};
use crate::games::tictactoe::Seat;
use crate::machine::{MoveOutcome, MoveRejection};
use crate::state::{ParticipantId, ParticipantProfile, RegistrationRejection};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Seats per session.
pub const SESSION_CAPACITY: usize = 2;

/// Pending requests the authority may queue before senders wait.
const REQUEST_QUEUE: usize = 32;

/// Unique session name.
pub type SessionName = String;

/// Public view of a session as listed by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct SessionInfo {
    name: SessionName,
    capacity: usize,
    participant_count: usize,
    open: bool,
}

impl SessionInfo {
    /// Open with a free seat.
    pub fn is_joinable(&self) -> bool {
        self.open && self.participant_count < self.capacity
    }
}

/// The directory's designation of a session's authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Getters)]
pub struct AuthorityToken {
    holder: ParticipantId,
    epoch: u64,
}

/// Directory failures.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum DirectoryError {
    /// The directory is not answering.
    #[display("Session directory is unreachable")]
    Unreachable,
    /// No session with that name.
    #[display("Session '{session}' not found")]
    NotFound {
        /// Requested session.
        session: SessionName,
    },
    /// The session is full or no longer open.
    #[display("Session '{session}' is full")]
    SessionFull {
        /// Requested session.
        session: SessionName,
    },
    /// A session with that name exists already.
    #[display("Session '{session}' already exists")]
    DuplicateSession {
        /// Requested session.
        session: SessionName,
    },
    /// The participant is not in the session.
    #[display("Participant {participant} is not in session '{session}'")]
    NotAMember {
        /// Requested session.
        session: SessionName,
        /// Offending participant.
        participant: ParticipantId,
    },
}

impl std::error::Error for DirectoryError {}

/// Why a live state could not be installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum InstallError {
    /// A state for this authority epoch already exists.
    #[display("Game state already live for this authority")]
    AlreadyLive,
    /// The token no longer matches the directory's designation.
    #[display("Authority designation changed")]
    Stale,
    /// The session has been torn down.
    #[display("Session is closed")]
    Closed,
}

impl std::error::Error for InstallError {}

#[derive(Debug)]
struct LiveState {
    epoch: u64,
    requests: mpsc::Sender<RemoteCall>,
    task: JoinHandle<()>,
}

#[derive(Debug)]
struct HubInner {
    members: Vec<ParticipantId>,
    open: bool,
    closed: bool,
    epoch: u64,
    live: Option<LiveState>,
}

impl HubInner {
    fn authority(&self) -> Option<AuthorityToken> {
        self.members.first().map(|holder| AuthorityToken {
            holder: *holder,
            epoch: self.epoch,
        })
    }

    fn retire_live_state(&mut self) {
        if let Some(live) = self.live.take() {
            debug!(epoch = live.epoch, "Retiring live game state");
            live.task.abort();
        }
    }
}

/// Outcome of removing a member from a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Departure {
    pub(crate) migrated_to: Option<AuthorityToken>,
    pub(crate) emptied: bool,
}

/// Per-session relay: membership, authority designation, the live state's
/// request queue and the broadcast fan-out.
#[derive(Debug)]
pub struct SessionHub {
    name: SessionName,
    inner: Mutex<HubInner>,
    events: broadcast::Sender<SessionEvent>,
    live_epoch: watch::Sender<Option<u64>>,
}

impl SessionHub {
    fn new(name: SessionName, creator: ParticipantId, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        let (live_epoch, _) = watch::channel(None);
        Self {
            name,
            inner: Mutex::new(HubInner {
                members: vec![creator],
                open: true,
                closed: false,
                epoch: 1,
                live: None,
            }),
            events,
            live_epoch,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Session name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory listing for this session.
    pub fn info(&self) -> SessionInfo {
        let inner = self.lock();
        SessionInfo {
            name: self.name.clone(),
            capacity: SESSION_CAPACITY,
            participant_count: inner.members.len(),
            open: inner.open && !inner.closed,
        }
    }

    /// Members in entry order.
    pub fn members(&self) -> Vec<ParticipantId> {
        self.lock().members.clone()
    }

    /// Current authority designation.
    pub fn authority(&self) -> Option<AuthorityToken> {
        self.lock().authority()
    }

    /// True once the last member has left.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// True while a state for `epoch` is installed.
    pub fn is_live(&self, epoch: u64) -> bool {
        let inner = self.lock();
        !inner.closed && inner.live.as_ref().is_some_and(|l| l.epoch == epoch)
    }

    /// Subscribes to session broadcasts.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Readiness signal: the epoch of the live state, or `None` while absent.
    pub fn live_epoch(&self) -> watch::Receiver<Option<u64>> {
        self.live_epoch.subscribe()
    }

    /// Publishes an event to every subscriber.
    pub fn publish(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!(session = %self.name, "No subscribers for session event");
        }
    }

    /// Atomically checks for a live state and, if none exists for the
    /// token's epoch, spawns the authority task that will own one.
    ///
    /// `spawn` runs under the hub lock, so two concurrent callers can never
    /// both construct a state.
    #[instrument(skip(self, spawn), fields(session = %self.name))]
    pub(crate) fn install_state<F>(&self, token: AuthorityToken, spawn: F) -> Result<(), InstallError>
    where
        F: FnOnce(mpsc::Receiver<RemoteCall>) -> JoinHandle<()>,
    {
        let mut inner = self.lock();
        if inner.closed {
            return Err(InstallError::Closed);
        }
        if inner.authority() != Some(token) {
            warn!(?token, current = ?inner.authority(), "Stale authority token");
            return Err(InstallError::Stale);
        }
        if inner.live.as_ref().is_some_and(|l| l.epoch == token.epoch) {
            return Err(InstallError::AlreadyLive);
        }
        inner.retire_live_state();

        let (requests, queue) = mpsc::channel(REQUEST_QUEUE);
        let task = spawn(queue);
        inner.live = Some(LiveState {
            epoch: token.epoch,
            requests,
            task,
        });
        self.live_epoch.send_replace(Some(token.epoch));
        info!(holder = %token.holder, epoch = token.epoch, "Game state installed");
        Ok(())
    }

    pub(crate) fn add_member(&self, participant: ParticipantId) -> Result<(), DirectoryError> {
        {
            let mut inner = self.lock();
            if inner.closed || !inner.open || inner.members.len() >= SESSION_CAPACITY {
                return Err(DirectoryError::SessionFull {
                    session: self.name.clone(),
                });
            }
            inner.members.push(participant);
            if inner.members.len() >= SESSION_CAPACITY {
                inner.open = false;
                debug!(session = %self.name, "Session reached capacity and closed to joins");
            }
        }
        self.publish(SessionEvent::ParticipantJoined(participant));
        Ok(())
    }

    pub(crate) fn remove_member(&self, participant: ParticipantId) -> Result<Departure, DirectoryError> {
        let departure = {
            let mut inner = self.lock();
            let index = inner
                .members
                .iter()
                .position(|m| *m == participant)
                .ok_or_else(|| DirectoryError::NotAMember {
                    session: self.name.clone(),
                    participant,
                })?;
            inner.members.remove(index);

            if inner.members.is_empty() {
                inner.closed = true;
                inner.retire_live_state();
                Departure {
                    migrated_to: None,
                    emptied: true,
                }
            } else if index == 0 {
                inner.epoch += 1;
                inner.retire_live_state();
                Departure {
                    migrated_to: inner.authority(),
                    emptied: false,
                }
            } else {
                Departure {
                    migrated_to: None,
                    emptied: false,
                }
            }
        };
        if departure.emptied || departure.migrated_to.is_some() {
            self.live_epoch.send_replace(None);
        }

        self.publish(SessionEvent::ParticipantLeft(participant));
        if let Some(token) = departure.migrated_to {
            info!(session = %self.name, new_authority = %token.holder, epoch = token.epoch, "Authority migrated");
            self.publish(SessionEvent::AuthorityMigrated {
                authority: token.holder,
                epoch: token.epoch,
            });
        }
        if departure.emptied {
            info!(session = %self.name, "Session closed");
            self.publish(SessionEvent::SessionClosed);
        }
        Ok(departure)
    }

    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> RemoteCall) -> Result<T, CallError> {
        let requests = {
            let inner = self.lock();
            if inner.closed {
                return Err(CallError::SessionClosed);
            }
            inner
                .live
                .as_ref()
                .map(|l| l.requests.clone())
                .ok_or(CallError::StateUnavailable)?
        };

        let (reply, response) = oneshot::channel();
        let call = build(reply);
        debug!(session = %self.name, call = call.name(), participant = %call.participant(), "Sending remote call");
        requests
            .send(call)
            .await
            .map_err(|_| CallError::StateUnavailable)?;
        response.await.map_err(|_| CallError::AuthorityGone)
    }

    /// Asks the authority to claim `position` for `participant`.
    pub async fn request_move(
        &self,
        participant: ParticipantId,
        position: i32,
    ) -> Result<Result<MoveOutcome, MoveRejection>, CallError> {
        self.call(|reply| RemoteCall::RequestMove {
            participant,
            position,
            reply,
        })
        .await
    }

    /// Asks the authority to start over.
    pub async fn request_reset(&self, participant: ParticipantId) -> Result<(), CallError> {
        self.call(|reply| RemoteCall::RequestReset { participant, reply })
            .await
    }

    /// Asks the authority to seat `participant`.
    pub async fn register_participant(
        &self,
        participant: ParticipantId,
        profile: ParticipantProfile,
    ) -> Result<Result<Seat, RegistrationRejection>, CallError> {
        self.call(|reply| RemoteCall::RegisterParticipant {
            participant,
            profile,
            reply,
        })
        .await
    }
}

#[derive(Debug)]
struct DirectoryInner {
    reachable: bool,
    sessions: Vec<Arc<SessionHub>>,
}

/// Process-wide registry of sessions.
///
/// Cheap to clone; all clones share one registry. Constructed explicitly and
/// handed to whoever needs it.
#[derive(Debug, Clone)]
pub struct SessionDirectory {
    inner: Arc<Mutex<DirectoryInner>>,
    event_capacity: usize,
}

impl SessionDirectory {
    /// Creates an empty directory whose sessions buffer `event_capacity`
    /// broadcasts per subscriber.
    #[instrument]
    pub fn new(event_capacity: usize) -> Self {
        info!("Creating session directory");
        Self {
            inner: Arc::new(Mutex::new(DirectoryInner {
                reachable: true,
                sessions: Vec::new(),
            })),
            event_capacity,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, DirectoryInner>, DirectoryError> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.reachable {
            Ok(inner)
        } else {
            Err(DirectoryError::Unreachable)
        }
    }

    fn find(inner: &DirectoryInner, session: &str) -> Result<Arc<SessionHub>, DirectoryError> {
        inner
            .sessions
            .iter()
            .find(|hub| hub.name() == session)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound {
                session: session.to_string(),
            })
    }

    /// Sessions with a free seat, in creation order.
    #[instrument(skip(self))]
    pub fn joinable(&self) -> Result<Vec<SessionInfo>, DirectoryError> {
        let inner = self.lock()?;
        let joinable: Vec<_> = inner
            .sessions
            .iter()
            .map(|hub| hub.info())
            .filter(SessionInfo::is_joinable)
            .collect();
        debug!(count = joinable.len(), "Listed joinable sessions");
        Ok(joinable)
    }

    /// Every listed session.
    pub fn sessions(&self) -> Result<Vec<SessionInfo>, DirectoryError> {
        Ok(self.lock()?.sessions.iter().map(|hub| hub.info()).collect())
    }

    /// Creates a session with `creator` as its first member and authority.
    #[instrument(skip(self))]
    pub fn create(&self, session: &str, creator: ParticipantId) -> Result<Arc<SessionHub>, DirectoryError> {
        let mut inner = self.lock()?;
        if inner.sessions.iter().any(|hub| hub.name() == session) {
            warn!(session, "Session already exists");
            return Err(DirectoryError::DuplicateSession {
                session: session.to_string(),
            });
        }
        let hub = Arc::new(SessionHub::new(session.to_string(), creator, self.event_capacity));
        inner.sessions.push(Arc::clone(&hub));
        info!(session, %creator, "Created session");
        Ok(hub)
    }

    /// Adds `participant` to an open session.
    #[instrument(skip(self))]
    pub fn join(&self, session: &str, participant: ParticipantId) -> Result<Arc<SessionHub>, DirectoryError> {
        let inner = self.lock()?;
        let hub = Self::find(&inner, session)?;
        hub.add_member(participant)?;
        info!(session, %participant, "Joined session");
        Ok(hub)
    }

    /// Removes `participant`; re-designates authority or tears the session
    /// down as needed.
    #[instrument(skip(self))]
    pub fn leave(&self, session: &str, participant: ParticipantId) -> Result<(), DirectoryError> {
        let mut inner = self.lock()?;
        let hub = Self::find(&inner, session)?;
        let departure = hub.remove_member(participant)?;
        if departure.emptied {
            inner.sessions.retain(|h| h.name() != session);
            info!(session, "Session removed from directory");
        }
        Ok(())
    }

    /// Current authority designation of a session.
    pub fn authority_of(&self, session: &str) -> Result<AuthorityToken, DirectoryError> {
        let inner = self.lock()?;
        Self::find(&inner, session)?
            .authority()
            .ok_or_else(|| DirectoryError::NotFound {
                session: session.to_string(),
            })
    }

    /// Listing for one session.
    pub fn info(&self, session: &str) -> Result<SessionInfo, DirectoryError> {
        let inner = self.lock()?;
        Ok(Self::find(&inner, session)?.info())
    }

    /// Hub of a listed session.
    pub fn hub(&self, session: &str) -> Result<Arc<SessionHub>, DirectoryError> {
        let inner = self.lock()?;
        Self::find(&inner, session)
    }

    /// Stops answering. Every later call fails with [`DirectoryError::Unreachable`].
    #[instrument(skip(self))]
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.reachable = false;
        warn!("Session directory shut down");
    }
}

impl Default for SessionDirectory {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_then_join_fills_and_closes() {
        let directory = SessionDirectory::default();
        let a = ParticipantId::random();
        let b = ParticipantId::random();

        directory.create("room", a).unwrap();
        assert_eq!(directory.joinable().unwrap().len(), 1);

        directory.join("room", b).unwrap();
        let info = directory.info("room").unwrap();
        assert_eq!(*info.participant_count(), 2);
        assert!(!info.open());
        assert!(directory.joinable().unwrap().is_empty());

        let c = ParticipantId::random();
        assert_eq!(
            directory.join("room", c).unwrap_err(),
            DirectoryError::SessionFull {
                session: "room".into()
            }
        );
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let directory = SessionDirectory::default();
        directory.create("room", ParticipantId::random()).unwrap();
        assert!(matches!(
            directory.create("room", ParticipantId::random()),
            Err(DirectoryError::DuplicateSession { .. })
        ));
    }

    #[test]
    fn test_authority_follows_entry_order() {
        let directory = SessionDirectory::default();
        let a = ParticipantId::random();
        let b = ParticipantId::random();
        directory.create("room", a).unwrap();
        directory.join("room", b).unwrap();

        let token = directory.authority_of("room").unwrap();
        assert_eq!(*token.holder(), a);
        assert_eq!(*token.epoch(), 1);

        directory.leave("room", a).unwrap();
        let token = directory.authority_of("room").unwrap();
        assert_eq!(*token.holder(), b);
        assert_eq!(*token.epoch(), 2);
    }

    #[test]
    fn test_non_authority_leaving_keeps_epoch() {
        let directory = SessionDirectory::default();
        let a = ParticipantId::random();
        let b = ParticipantId::random();
        directory.create("room", a).unwrap();
        directory.join("room", b).unwrap();
        directory.leave("room", b).unwrap();
        assert_eq!(*directory.authority_of("room").unwrap().epoch(), 1);
    }

    #[test]
    fn test_last_leave_tears_down() {
        let directory = SessionDirectory::default();
        let a = ParticipantId::random();
        let hub = directory.create("room", a).unwrap();
        directory.leave("room", a).unwrap();
        assert!(hub.is_closed());
        assert!(matches!(directory.info("room"), Err(DirectoryError::NotFound { .. })));
    }

    #[test]
    fn test_shutdown_makes_directory_unreachable() {
        let directory = SessionDirectory::default();
        directory.shutdown();
        assert_eq!(directory.joinable().unwrap_err(), DirectoryError::Unreachable);
    }

    #[tokio::test]
    async fn test_call_without_state_is_unavailable() {
        let directory = SessionDirectory::default();
        let a = ParticipantId::random();
        let hub = directory.create("room", a).unwrap();
        assert_eq!(hub.request_reset(a).await, Err(CallError::StateUnavailable));
    }

    #[tokio::test]
    async fn test_install_is_check_and_create() {
        let directory = SessionDirectory::default();
        let a = ParticipantId::random();
        let hub = directory.create("room", a).unwrap();
        let token = directory.authority_of("room").unwrap();

        let spawn = |mut queue: mpsc::Receiver<RemoteCall>| {
            tokio::spawn(async move { while queue.recv().await.is_some() {} })
        };
        assert_eq!(hub.install_state(token, spawn), Ok(()));
        assert_eq!(hub.install_state(token, spawn), Err(InstallError::AlreadyLive));
        assert!(hub.is_live(1));
        assert_eq!(*hub.live_epoch().borrow(), Some(1));
    }
}
