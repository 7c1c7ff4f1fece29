//! The replicated game state owned by the session authority.

use crate::games::tictactoe::{Board, Cell, GameStatus, Position, Seat};
use derive_getters::Getters;
use derive_new::new;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Opaque connection identity of a participant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display,
)]
#[display("{_0}")]
pub struct ParticipantId(Uuid);

impl ParticipantId {
    /// Generates a fresh identity.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

/// What a participant brings to the table, as reported by the account backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, new)]
pub struct ParticipantProfile {
    /// Display name.
    name: String,
    /// Rating at the time of joining.
    rating: i32,
    /// Backend player id, used only for result reporting.
    backend_id: Option<i32>,
}

impl ParticipantProfile {
    /// A profile with no backend account behind it.
    pub fn guest(name: impl Into<String>) -> Self {
        Self::new(name.into(), 1000, None)
    }
}

/// Occupant of one of the two seats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct SeatHolder {
    participant: ParticipantId,
    profile: ParticipantProfile,
}

/// Why a registration was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum RegistrationRejection {
    /// Both seats are already taken by other participants.
    #[display("Both player slots are full")]
    SlotsFull,
}

impl std::error::Error for RegistrationRejection {}

/// Board, turn, result and seats of one game.
///
/// Only the authority task mutates this value; every other participant sees
/// clones of it delivered by broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicatedGameState {
    board: Board,
    current_player: Seat,
    status: GameStatus,
    player1: Option<SeatHolder>,
    player2: Option<SeatHolder>,
}

impl ReplicatedGameState {
    /// Fresh state: empty board, player 1 to move, no result, no seats.
    pub fn new() -> Self {
        Self {
            board: Board::new(),
            current_player: Seat::One,
            status: GameStatus::InProgress,
            player1: None,
            player2: None,
        }
    }

    /// Returns the board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Seat whose turn it is.
    pub fn current_player(&self) -> Seat {
        self.current_player
    }

    /// Game status.
    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// Winning seat, if the game was won.
    pub fn winner(&self) -> Option<Seat> {
        match self.status {
            GameStatus::Won(seat) => Some(seat),
            _ => None,
        }
    }

    /// True once the game has been won or drawn.
    pub fn game_over(&self) -> bool {
        self.status.is_over()
    }

    /// Occupant of seat one.
    pub fn player1(&self) -> Option<&SeatHolder> {
        self.player1.as_ref()
    }

    /// Occupant of seat two.
    pub fn player2(&self) -> Option<&SeatHolder> {
        self.player2.as_ref()
    }

    /// Occupant of the given seat.
    pub fn holder(&self, seat: Seat) -> Option<&SeatHolder> {
        match seat {
            Seat::One => self.player1(),
            Seat::Two => self.player2(),
        }
    }

    /// Seat held by the participant, if registered.
    pub fn seat_of(&self, participant: ParticipantId) -> Option<Seat> {
        if self.player1.as_ref().map(|h| h.participant) == Some(participant) {
            Some(Seat::One)
        } else if self.player2.as_ref().map(|h| h.participant) == Some(participant) {
            Some(Seat::Two)
        } else {
            None
        }
    }

    /// Player number of the participant: 1, 2, or 0 when unregistered.
    pub fn player_number(&self, participant: ParticipantId) -> u8 {
        self.seat_of(participant).map_or(0, Seat::number)
    }

    /// Number of filled seats.
    pub fn registered_count(&self) -> usize {
        usize::from(self.player1.is_some()) + usize::from(self.player2.is_some())
    }

    /// Seats the participant in the first empty slot.
    ///
    /// A participant that already holds a seat keeps it. A third distinct
    /// participant is rejected without touching either seat.
    #[instrument(skip(self, profile), fields(name = %profile.name()))]
    pub(crate) fn register(
        &mut self,
        participant: ParticipantId,
        profile: ParticipantProfile,
    ) -> Result<Seat, RegistrationRejection> {
        if let Some(seat) = self.seat_of(participant) {
            info!(%participant, %seat, "Participant already seated");
            return Ok(seat);
        }

        let holder = SeatHolder {
            participant,
            profile,
        };
        if self.player1.is_none() {
            info!(%participant, seat = 1, "Registering participant");
            self.player1 = Some(holder);
            Ok(Seat::One)
        } else if self.player2.is_none() {
            info!(%participant, seat = 2, "Registering participant");
            self.player2 = Some(holder);
            Ok(Seat::Two)
        } else {
            warn!(%participant, "Both player slots full");
            Err(RegistrationRejection::SlotsFull)
        }
    }

    /// Claims a cell for the seat. Validation happens in the state machine.
    pub(crate) fn place(&mut self, pos: Position, seat: Seat) {
        self.board.set(pos, Cell::Taken(seat));
    }

    pub(crate) fn set_status(&mut self, status: GameStatus) {
        self.status = status;
    }

    pub(crate) fn pass_turn(&mut self) {
        self.current_player = self.current_player.opponent();
    }

    /// Clears board, turn and result. Seats are kept.
    pub(crate) fn reset_board(&mut self) {
        self.board = Board::new();
        self.current_player = Seat::One;
        self.status = GameStatus::InProgress;
    }
}

impl Default for ReplicatedGameState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_state() {
        let state = ReplicatedGameState::new();
        assert!(state.board().cells().iter().all(|c| *c == Cell::Empty));
        assert_eq!(state.current_player(), Seat::One);
        assert_eq!(state.winner(), None);
        assert!(!state.game_over());
        assert_eq!(state.registered_count(), 0);
    }

    #[test]
    fn test_registration_fills_slots_in_arrival_order() {
        let mut state = ReplicatedGameState::new();
        let alice = ParticipantId::random();
        let bob = ParticipantId::random();

        assert_eq!(state.register(alice, ParticipantProfile::guest("alice")), Ok(Seat::One));
        assert_eq!(state.register(bob, ParticipantProfile::guest("bob")), Ok(Seat::Two));
        assert_eq!(state.player_number(alice), 1);
        assert_eq!(state.player_number(bob), 2);
    }

    #[test]
    fn test_third_registrant_rejected_without_mutation() {
        let mut state = ReplicatedGameState::new();
        let alice = ParticipantId::random();
        let bob = ParticipantId::random();
        state.register(alice, ParticipantProfile::guest("alice")).unwrap();
        state.register(bob, ParticipantProfile::guest("bob")).unwrap();
        let before = state.clone();

        let carol = ParticipantId::random();
        let result = state.register(carol, ParticipantProfile::guest("carol"));

        assert_eq!(result, Err(RegistrationRejection::SlotsFull));
        assert_eq!(state, before);
        assert_eq!(state.player_number(carol), 0);
    }

    #[test]
    fn test_repeat_registration_keeps_seat() {
        let mut state = ReplicatedGameState::new();
        let alice = ParticipantId::random();
        state.register(alice, ParticipantProfile::guest("alice")).unwrap();
        assert_eq!(state.register(alice, ParticipantProfile::guest("alice")), Ok(Seat::One));
        assert_eq!(state.registered_count(), 1);
    }

    #[test]
    fn test_reset_keeps_seats() {
        let mut state = ReplicatedGameState::new();
        let alice = ParticipantId::random();
        state.register(alice, ParticipantProfile::guest("alice")).unwrap();
        state.place(Position::Center, Seat::One);
        state.pass_turn();
        state.set_status(GameStatus::Won(Seat::One));

        state.reset_board();

        assert_eq!(state.board(), &Board::new());
        assert_eq!(state.current_player(), Seat::One);
        assert!(!state.game_over());
        assert_eq!(state.seat_of(alice), Some(Seat::One));
    }
}
