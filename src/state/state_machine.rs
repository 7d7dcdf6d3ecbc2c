use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Phases of one board session.
///
/// The machine cycles for the life of the session: there is no terminal
/// phase. Falling below full instance registration forces any phase back to
/// [`GamePhase::Setup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    /// Waiting for all twelve display instances to register.
    Setup,
    /// Board is complete; players can be arranged on their cells.
    PlayerSelection,
    /// Pre-game countdown is running.
    Countdown,
    /// Cards are up and the buzz-in race is open.
    Live,
    /// A player won the race and is still holding the buzzer down.
    BuzzHeld,
    /// Buzzer released; short pause before card selection opens.
    Buzzed,
    /// The buzzed-in player is picking cards against the selection timer.
    Selecting,
    /// A completed triple was just evaluated and its result is on display.
    Validating,
    /// Selection window expired; result pause before play resumes.
    Cooldown,
}

/// Events that can be applied against the phase table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    /// The twelfth display instance registered.
    BoardFilled,
    /// An instance dropped out and the board is no longer complete.
    BoardBroken,
    /// The start command captured a countdown start time.
    CountdownStarted,
    /// The countdown window elapsed.
    CountdownElapsed,
    /// A player pressed their buzzer while the race was open.
    BuzzPressed,
    /// The buzzed-in player released their buzzer in time.
    BuzzReleased,
    /// The buzzer was held past the configured hold window.
    BuzzHoldExpired,
    /// The post-buzz pause ended and the selection timer started.
    SelectionStarted,
    /// A third distinct card completed the triple and it was evaluated.
    TripleResolved,
    /// The selection window elapsed without a completed triple.
    SelectionExpired,
    /// The fixed result-display pause ended.
    ResolutionElapsed,
}

/// Error returned when an event cannot be applied from the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the machine was in when the event was received.
    pub from: GamePhase,
    /// The event that cannot be applied from this phase.
    pub event: GameEvent,
}

/// Compute the phase an event leads to, if the transition is legal.
///
/// This is the single source of truth for transition legality; every inbound
/// action and timer callback funnels through it before mutating state.
pub fn transition(from: GamePhase, event: GameEvent) -> Result<GamePhase, InvalidTransition> {
    let next = match (from, event) {
        // Losing an instance resets game progress from anywhere.
        (_, GameEvent::BoardBroken) => GamePhase::Setup,
        (GamePhase::Setup, GameEvent::BoardFilled) => GamePhase::PlayerSelection,
        (GamePhase::PlayerSelection, GameEvent::CountdownStarted) => GamePhase::Countdown,
        (GamePhase::Countdown, GameEvent::CountdownElapsed) => GamePhase::Live,
        (GamePhase::Live, GameEvent::BuzzPressed) => GamePhase::BuzzHeld,
        (GamePhase::BuzzHeld, GameEvent::BuzzReleased) => GamePhase::Buzzed,
        (GamePhase::BuzzHeld, GameEvent::BuzzHoldExpired) => GamePhase::Live,
        (GamePhase::Buzzed, GameEvent::SelectionStarted) => GamePhase::Selecting,
        (GamePhase::Selecting, GameEvent::TripleResolved) => GamePhase::Validating,
        (GamePhase::Selecting, GameEvent::SelectionExpired) => GamePhase::Cooldown,
        (GamePhase::Validating | GamePhase::Cooldown, GameEvent::ResolutionElapsed) => {
            GamePhase::Live
        }
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}
