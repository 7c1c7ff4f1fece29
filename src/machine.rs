//! Authoritative move validation.
//!
//! The [`MoveStateMachine`] is only ever driven by the authority task. Every
//! request is validated against the current state before anything is
//! written, so a rejected request leaves the state exactly as it was.

use crate::games::tictactoe::{GameStatus, Position, Seat, check_win, is_full};
use crate::state::{ParticipantId, ParticipantProfile, RegistrationRejection, ReplicatedGameState};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Lifecycle phase derived from the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
pub enum Phase {
    /// Fewer than two seats filled.
    #[display("waiting for players")]
    WaitingForPlayers,
    /// Both seats filled, game running.
    #[display("in progress")]
    InProgress,
    /// Won or drawn.
    #[display("over")]
    Over,
}

/// Reason a move request was refused.
///
/// Variants are listed in validation order; the first failing check wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
pub enum MoveRejection {
    /// The game has already ended.
    #[display("Game is already over")]
    GameOver,
    /// The position is not on the board.
    #[display("Position {position} is out of range (must be 0-8)")]
    PositionOutOfRange {
        /// Requested position.
        position: i32,
    },
    /// The cell is already claimed.
    #[display("Cell {} is already occupied", position.to_index())]
    CellOccupied {
        /// Requested position.
        position: Position,
    },
    /// The requester does not hold the seat to move.
    #[display("Not your turn: waiting for player {expected}")]
    NotYourTurn {
        /// Seat that is due to move.
        expected: Seat,
    },
    /// The requester holds no seat.
    #[display("Player is not registered in this game")]
    NotRegistered,
}

impl std::error::Error for MoveRejection {}

/// Result of an accepted move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveOutcome {
    /// The game goes on with `next` to move.
    Continued {
        /// Seat to move next.
        next: Seat,
    },
    /// The mover completed a line.
    Won(Seat),
    /// The board filled up with no line.
    Draw,
}

impl MoveOutcome {
    /// True for a win or a draw.
    pub fn is_terminal(self) -> bool {
        !matches!(self, MoveOutcome::Continued { .. })
    }
}

/// Owns the authoritative [`ReplicatedGameState`] and applies requests to it.
#[derive(Debug, Clone, Default)]
pub struct MoveStateMachine {
    state: ReplicatedGameState,
}

impl MoveStateMachine {
    /// Starts from a freshly initialised state.
    #[instrument]
    pub fn new() -> Self {
        Self {
            state: ReplicatedGameState::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> &ReplicatedGameState {
        &self.state
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        if self.state.game_over() {
            Phase::Over
        } else if self.state.registered_count() < 2 {
            Phase::WaitingForPlayers
        } else {
            Phase::InProgress
        }
    }

    /// Seats a participant; see [`ReplicatedGameState`] for slot rules.
    #[instrument(skip(self, profile))]
    pub fn register(
        &mut self,
        participant: ParticipantId,
        profile: ParticipantProfile,
    ) -> Result<Seat, RegistrationRejection> {
        self.state.register(participant, profile)
    }

    /// Checks a move request without applying it.
    #[instrument(skip(self))]
    pub fn validate(
        &self,
        position: i32,
        participant: ParticipantId,
    ) -> Result<(Position, Seat), MoveRejection> {
        if self.state.game_over() {
            return Err(MoveRejection::GameOver);
        }

        let pos = Position::from_wire(position)
            .ok_or(MoveRejection::PositionOutOfRange { position })?;

        if !self.state.board().is_empty(pos) {
            return Err(MoveRejection::CellOccupied { position: pos });
        }

        let number = self.state.player_number(participant);
        let current = self.state.current_player();
        if number != current.number() {
            return Err(MoveRejection::NotYourTurn { expected: current });
        }

        // Unreachable while check 4 compares against a real seat number, but
        // kept so an unseated requester can never be turned into a mover.
        let seat = Seat::from_number(number).ok_or(MoveRejection::NotRegistered)?;

        Ok((pos, seat))
    }

    /// Validates and applies a move.
    #[instrument(skip(self))]
    pub fn request_move(
        &mut self,
        position: i32,
        participant: ParticipantId,
    ) -> Result<MoveOutcome, MoveRejection> {
        let (pos, seat) = self.validate(position, participant).inspect_err(|reason| {
            warn!(%participant, position, %reason, "Move rejected");
        })?;

        self.state.place(pos, seat);
        debug!(%participant, %seat, position = pos.to_index(), "Move applied");

        let outcome = if check_win(self.state.board(), seat) {
            self.state.set_status(GameStatus::Won(seat));
            info!(%seat, "Player wins");
            MoveOutcome::Won(seat)
        } else if is_full(self.state.board()) {
            self.state.set_status(GameStatus::Draw);
            info!("Game drawn");
            MoveOutcome::Draw
        } else {
            self.state.pass_turn();
            MoveOutcome::Continued {
                next: self.state.current_player(),
            }
        };

        Ok(outcome)
    }

    /// Restores board, turn and result to the initial values. Seats stay.
    ///
    /// Honoured for any requester.
    #[instrument(skip(self))]
    pub fn request_reset(&mut self) {
        self.state.reset_board();
        info!(phase = %self.phase(), "Game reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::tictactoe::{Board, Cell};

    struct Table {
        machine: MoveStateMachine,
        one: ParticipantId,
        two: ParticipantId,
    }

    fn seated_table() -> Table {
        let mut machine = MoveStateMachine::new();
        let one = ParticipantId::random();
        let two = ParticipantId::random();
        machine
            .register(one, ParticipantProfile::guest("one"))
            .unwrap();
        machine
            .register(two, ParticipantProfile::guest("two"))
            .unwrap();
        Table { machine, one, two }
    }

    impl Table {
        fn mover(&self) -> ParticipantId {
            match self.machine.state().current_player() {
                Seat::One => self.one,
                Seat::Two => self.two,
            }
        }

        fn play(&mut self, positions: &[i32]) -> MoveOutcome {
            let mut last = None;
            for pos in positions {
                let mover = self.mover();
                last = Some(self.machine.request_move(*pos, mover).unwrap());
            }
            last.unwrap()
        }
    }

    fn assert_rejected_unchanged(table: &mut Table, position: i32, who: ParticipantId, expected: MoveRejection) {
        let before = table.machine.state().clone();
        assert_eq!(table.machine.request_move(position, who), Err(expected));
        assert_eq!(table.machine.state(), &before);
    }

    #[test]
    fn test_phases() {
        let mut machine = MoveStateMachine::new();
        assert_eq!(machine.phase(), Phase::WaitingForPlayers);
        machine
            .register(ParticipantId::random(), ParticipantProfile::guest("a"))
            .unwrap();
        assert_eq!(machine.phase(), Phase::WaitingForPlayers);
        machine
            .register(ParticipantId::random(), ParticipantProfile::guest("b"))
            .unwrap();
        assert_eq!(machine.phase(), Phase::InProgress);
    }

    #[test]
    fn test_accepted_move_claims_cell() {
        let mut table = seated_table();
        let one = table.one;
        let outcome = table.machine.request_move(4, one).unwrap();
        assert_eq!(outcome, MoveOutcome::Continued { next: Seat::Two });
        assert_eq!(
            table.machine.state().board().get(Position::Center),
            Cell::Taken(Seat::One)
        );
    }

    #[test]
    fn test_reject_after_game_over() {
        let mut table = seated_table();
        table.play(&[0, 3, 1, 4, 2]);
        let who = table.two;
        assert_rejected_unchanged(&mut table, 8, who, MoveRejection::GameOver);
    }

    #[test]
    fn test_reject_out_of_range() {
        let mut table = seated_table();
        let one = table.one;
        assert_rejected_unchanged(&mut table, 9, one, MoveRejection::PositionOutOfRange { position: 9 });
        assert_rejected_unchanged(&mut table, -1, one, MoveRejection::PositionOutOfRange { position: -1 });
    }

    #[test]
    fn test_reject_occupied_cell() {
        let mut table = seated_table();
        table.play(&[4]);
        let two = table.two;
        assert_rejected_unchanged(
            &mut table,
            4,
            two,
            MoveRejection::CellOccupied {
                position: Position::Center,
            },
        );
    }

    #[test]
    fn test_reject_wrong_turn() {
        let mut table = seated_table();
        let two = table.two;
        assert_rejected_unchanged(&mut table, 0, two, MoveRejection::NotYourTurn { expected: Seat::One });
    }

    #[test]
    fn test_reject_unregistered_participant() {
        let mut table = seated_table();
        let stranger = ParticipantId::random();
        let before = table.machine.state().clone();
        assert!(table.machine.request_move(0, stranger).is_err());
        assert_eq!(table.machine.state(), &before);
    }

    #[test]
    fn test_validation_order_game_over_first() {
        let mut table = seated_table();
        table.play(&[0, 3, 1, 4, 2]);
        // Out of range and occupied, but the game is over.
        assert_eq!(
            table.machine.validate(42, ParticipantId::random()),
            Err(MoveRejection::GameOver)
        );
    }

    #[test]
    fn test_turn_alternates_strictly() {
        let mut table = seated_table();
        let sequence = [0, 1, 2, 4, 3, 5, 7, 6];
        for (n, pos) in sequence.iter().enumerate() {
            let expected = if n % 2 == 0 { Seat::One } else { Seat::Two };
            assert_eq!(table.machine.state().current_player(), expected);
            let outcome = table.play(&[*pos]);
            assert!(!outcome.is_terminal(), "move {n} ended the game");
        }
        assert_eq!(table.machine.state().current_player(), Seat::One);
    }

    #[test]
    fn test_win_sets_winner_and_keeps_turn() {
        let mut table = seated_table();
        let outcome = table.play(&[4, 0, 1, 3, 7]);
        assert_eq!(outcome, MoveOutcome::Won(Seat::One));
        let state = table.machine.state();
        assert!(state.game_over());
        assert_eq!(state.winner(), Some(Seat::One));
        assert_eq!(table.machine.phase(), Phase::Over);
    }

    #[test]
    fn test_draw() {
        let mut table = seated_table();
        // X O X / X O O / O X X
        let outcome = table.play(&[0, 1, 2, 4, 3, 5, 7, 6, 8]);
        assert_eq!(outcome, MoveOutcome::Draw);
        assert_eq!(table.machine.state().status(), GameStatus::Draw);
        assert_eq!(table.machine.state().winner(), None);
        assert!(table.machine.state().game_over());
    }

    #[test]
    fn test_reset_from_any_phase() {
        let mut table = seated_table();
        table.play(&[4, 0]);
        table.machine.request_reset();
        assert_eq!(table.machine.state().board(), &Board::new());
        assert_eq!(table.machine.state().current_player(), Seat::One);
        assert!(!table.machine.state().game_over());
        assert_eq!(table.machine.phase(), Phase::InProgress);

        table.play(&[0, 3, 1, 4, 2]);
        assert_eq!(table.machine.phase(), Phase::Over);
        table.machine.request_reset();
        assert_eq!(table.machine.state().winner(), None);
        assert_eq!(table.machine.phase(), Phase::InProgress);

        let mut empty = MoveStateMachine::new();
        empty.request_reset();
        assert_eq!(empty.phase(), Phase::WaitingForPlayers);
    }
}
