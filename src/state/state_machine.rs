use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle of a single game within a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GameState {
    /// Created but not yet dealt.
    Waiting,
    /// Turns are being played.
    Playing,
    /// All turns played; scores are final.
    Finished,
    /// Stopped early without a winner.
    Abandoned,
}

impl GameState {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, GameState::Finished | GameState::Abandoned)
    }
}

/// Events that can be applied to a game's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    /// Teams, describer and first word are set.
    Started,
    /// A turn ended and another one begins.
    TurnPassed,
    /// The last turn ended.
    TurnsExhausted,
    /// The room can no longer sustain the game.
    Interrupted,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The state the game was in when the invalid event was received.
    pub from: GameState,
    /// The event that cannot be applied from this state.
    pub event: GameEvent,
}

/// Compute the state reached by applying `event` in `from`.
pub fn compute_transition(from: GameState, event: GameEvent) -> Result<GameState, InvalidTransition> {
    let next = match (from, event) {
        (GameState::Waiting, GameEvent::Started) => GameState::Playing,
        (GameState::Playing, GameEvent::TurnPassed) => GameState::Playing,
        (GameState::Playing, GameEvent::TurnsExhausted) => GameState::Finished,
        (GameState::Waiting | GameState::Playing, GameEvent::Interrupted) => GameState::Abandoned,
        (from, event) => return Err(InvalidTransition { from, event }),
    };
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(state: GameState, event: GameEvent) -> GameState {
        compute_transition(state, event).unwrap()
    }

    #[test]
    fn full_happy_path_through_game() {
        let mut state = GameState::Waiting;
        state = apply(state, GameEvent::Started);
        assert_eq!(state, GameState::Playing);
        state = apply(state, GameEvent::TurnPassed);
        assert_eq!(state, GameState::Playing);
        state = apply(state, GameEvent::TurnsExhausted);
        assert_eq!(state, GameState::Finished);
        assert!(state.is_terminal());
    }

    #[test]
    fn interruption_abandons_live_games() {
        assert_eq!(
            apply(GameState::Playing, GameEvent::Interrupted),
            GameState::Abandoned
        );
        assert_eq!(
            apply(GameState::Waiting, GameEvent::Interrupted),
            GameState::Abandoned
        );
    }

    #[test]
    fn terminal_states_reject_every_event() {
        for from in [GameState::Finished, GameState::Abandoned] {
            for event in [
                GameEvent::Started,
                GameEvent::TurnPassed,
                GameEvent::TurnsExhausted,
                GameEvent::Interrupted,
            ] {
                let err = compute_transition(from, event).unwrap_err();
                assert_eq!(err, InvalidTransition { from, event });
            }
        }
    }

    #[test]
    fn turns_cannot_pass_before_start() {
        assert!(compute_transition(GameState::Waiting, GameEvent::TurnPassed).is_err());
    }
}
