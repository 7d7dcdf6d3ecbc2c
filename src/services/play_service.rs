//! Buzz arbitration, card selection, and the timer-driven transitions.
//!
//! Inbound press/release events and the external poll loop all funnel
//! through here. Every handler re-validates the phase (and, for timed
//! windows, the elapsed time) inside the state lock, so stale deferred
//! callbacks and repeated polls collapse into no-ops.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info};

use crate::deck;
use crate::state::SharedEngine;
use crate::state::game::{GameState, TRIPLE_SIZE};
use crate::state::state_machine::{GameEvent, GamePhase, transition};

/// Pause between the buzzer release and the selection window opening, giving
/// the board a moment to show who buzzed.
pub const BUZZED_PAUSE: Duration = Duration::from_millis(1_000);
/// Pause the match result (or timeout) stays on display before play resumes.
pub const RESOLUTION_PAUSE: Duration = Duration::from_millis(2_000);

/// Outcome of a card toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    /// The card was added to or removed from the selection.
    Toggled,
    /// A third distinct card completed the triple; `true` for a valid match.
    Resolved(bool),
}

/// Capture the countdown start time and schedule the automatic advance.
pub async fn start_countdown(engine: &SharedEngine) {
    let now = engine.now_ms();
    let started = engine
        .mutate(|state| {
            let next = match transition(state.phase, GameEvent::CountdownStarted) {
                Ok(next) => next,
                Err(invalid) => {
                    debug!(%invalid, "countdown start rejected");
                    return None;
                }
            };
            state.phase = next;
            state.countdown_start = Some(now);
            Some(state.timer_settings.countdown_ms)
        })
        .await;

    if let Some(countdown_ms) = started {
        info!(countdown_ms, "countdown started");
        schedule_phase_advance(
            engine.clone(),
            GamePhase::Countdown,
            Duration::from_millis(countdown_ms),
            |engine| async move {
                handle_countdown_elapsed(&engine).await;
            },
        );
    }
}

/// Advance `Countdown -> Live` once the countdown window has elapsed.
///
/// Safe to call from both the deferred task and the poll loop; whichever
/// fires first wins and the other becomes a no-op.
pub async fn handle_countdown_elapsed(engine: &SharedEngine) {
    let now = engine.now_ms();
    engine
        .mutate(|state| {
            if state.phase != GamePhase::Countdown {
                return None;
            }
            let started = state.countdown_start?;
            if now.saturating_sub(started) < state.timer_settings.countdown_ms {
                return None;
            }

            let next = transition(state.phase, GameEvent::CountdownElapsed).ok()?;
            state.phase = next;
            state.countdown_start = None;
            info!("board is live");
            Some(())
        })
        .await;
}

/// First-come buzz-in race entry.
///
/// Returns `true` when the player won the race. Any buzz while the phase is
/// not live (including a second buzz racing the winner) is rejected without
/// touching state.
pub async fn buzz_in(engine: &SharedEngine, player_id: u8) -> bool {
    let now = engine.now_ms();
    engine
        .mutate(|state| {
            if state.player(player_id).is_none() {
                debug!(player_id, "buzz from unknown player; ignoring");
                return None;
            }
            let next = match transition(state.phase, GameEvent::BuzzPressed) {
                Ok(next) => next,
                Err(invalid) => {
                    debug!(player_id, %invalid, "buzz rejected");
                    return None;
                }
            };

            state.phase = next;
            state.buzzed_in_player = Some(player_id);
            state.buzz_press_time = Some(now);
            info!(player_id, "buzz-in won");
            Some(())
        })
        .await
        .is_some()
}

/// Release edge of the winning buzz press.
///
/// Only the buzzed-in player's release counts; it clears the press timestamp
/// and schedules the pause that opens the selection window.
pub async fn buzz_released(engine: &SharedEngine, player_id: u8) {
    let released = engine
        .mutate(|state| {
            if state.buzzed_in_player != Some(player_id) {
                debug!(player_id, "release from a player who is not buzzed in; ignoring");
                return None;
            }
            let next = match transition(state.phase, GameEvent::BuzzReleased) {
                Ok(next) => next,
                Err(invalid) => {
                    debug!(player_id, %invalid, "buzz release rejected");
                    return None;
                }
            };

            state.phase = next;
            state.buzz_press_time = None;
            Some(())
        })
        .await;

    if released.is_some() {
        schedule_phase_advance(
            engine.clone(),
            GamePhase::Buzzed,
            BUZZED_PAUSE,
            |engine| async move {
                start_selection_timer(&engine).await;
            },
        );
    }
}

/// Open the selection window, capturing its start time.
pub async fn start_selection_timer(engine: &SharedEngine) {
    let now = engine.now_ms();
    engine
        .mutate(|state| {
            let next = match transition(state.phase, GameEvent::SelectionStarted) {
                Ok(next) => next,
                Err(invalid) => {
                    debug!(%invalid, "selection start rejected");
                    return None;
                }
            };
            state.phase = next;
            state.selection_timer = Some(now);
            Some(())
        })
        .await;
}

/// Forfeit a buzz held past the configured hold window.
///
/// Attributes an unsuccessful attempt to the holding player and reopens the
/// race. No-op unless the phase is `BuzzHeld` and the window has elapsed.
pub async fn handle_buzz_hold_timeout(engine: &SharedEngine) {
    let now = engine.now_ms();
    engine
        .mutate(|state| {
            if state.phase != GamePhase::BuzzHeld {
                return None;
            }
            let pressed = state.buzz_press_time?;
            if now.saturating_sub(pressed) < state.timer_settings.buzz_hold_ms {
                return None;
            }

            let next = transition(state.phase, GameEvent::BuzzHoldExpired).ok()?;
            let player_id = state.attributed_player();
            if let Some(player) = state.player_mut(player_id) {
                player.unsuccessful_sets += 1;
            }
            info!(player_id, "buzz held too long; forfeited");

            state.phase = next;
            state.buzzed_in_player = None;
            state.buzz_press_time = None;
            Some(())
        })
        .await;
}

/// Expire the selection window, sending the round through cooldown.
///
/// No-op unless the phase is `Selecting` and the window has elapsed;
/// repeated polls after firing are no-ops because the phase moved on.
pub async fn handle_timeout(engine: &SharedEngine) {
    let now = engine.now_ms();
    let expired = engine
        .mutate(|state| {
            if state.phase != GamePhase::Selecting {
                return None;
            }
            let started = state.selection_timer?;
            if now.saturating_sub(started) < state.timer_settings.selection_ms {
                return None;
            }

            let next = transition(state.phase, GameEvent::SelectionExpired).ok()?;
            let player_id = state.attributed_player();
            if let Some(player) = state.player_mut(player_id) {
                player.unsuccessful_sets += 1;
            }
            info!(player_id, "selection window expired");

            state.phase = next;
            Some(())
        })
        .await;

    if expired.is_some() {
        schedule_resolution_return(engine.clone(), GamePhase::Cooldown);
    }
}

/// Toggle the card at a board cell in or out of the current selection.
///
/// Adding a third distinct card synchronously resolves the triple: the score
/// updates, valid matches are replaced from the draw pile in place, and the
/// result pause is scheduled. There is no confirm step.
pub async fn select_card(engine: &SharedEngine, position: usize) -> Option<SelectOutcome> {
    let outcome = engine
        .mutate(|state| {
            if state.phase != GamePhase::Selecting {
                debug!(position, phase = ?state.phase, "card toggle outside selection; ignoring");
                return None;
            }
            if state.is_player_position(position) {
                debug!(position, "card toggle on a player cell; ignoring");
                return None;
            }
            let Some(card_id) = state.card_at(position).map(|card| card.id) else {
                debug!(position, "no card at position; ignoring");
                return None;
            };

            if let Some(index) = state
                .selected_cards
                .iter()
                .position(|&selected| selected == card_id)
            {
                state.selected_cards.remove(index);
                return Some(SelectOutcome::Toggled);
            }

            state.selected_cards.push(card_id);
            if state.selected_cards.len() < TRIPLE_SIZE {
                return Some(SelectOutcome::Toggled);
            }

            Some(SelectOutcome::Resolved(resolve_triple(state)))
        })
        .await;

    if let Some(SelectOutcome::Resolved(valid)) = outcome {
        debug!(valid, "triple resolved");
        schedule_resolution_return(engine.clone(), GamePhase::Validating);
    }
    outcome
}

/// Close the result pause: clear the round state and go back to live.
pub async fn finish_resolution(engine: &SharedEngine) {
    engine
        .mutate(|state| {
            let next = match transition(state.phase, GameEvent::ResolutionElapsed) {
                Ok(next) => next,
                Err(invalid) => {
                    debug!(%invalid, "stale resolution callback; ignoring");
                    return None;
                }
            };
            state.phase = next;
            state.selected_cards.clear();
            state.buzzed_in_player = None;
            state.buzz_press_time = None;
            state.selection_timer = None;
            Some(())
        })
        .await;
}

/// One polling pass from the external input driver.
///
/// Checks whichever timed window the current phase is running and fires its
/// timeout handler; the handlers themselves decide whether the window has
/// actually elapsed.
pub async fn poll(engine: &SharedEngine) {
    match engine.phase().await {
        GamePhase::Countdown => handle_countdown_elapsed(engine).await,
        GamePhase::BuzzHeld => handle_buzz_hold_timeout(engine).await,
        GamePhase::Selecting => handle_timeout(engine).await,
        _ => {}
    }
}

/// Evaluate the completed triple and apply its effects. Returns validity.
///
/// Valid matches are consumed in place: each freed cell receives the next
/// undrawn deck card, keeping every other cell's card where it was. When the
/// draw pile runs dry the freed cells are dropped and the board shrinks.
fn resolve_triple(state: &mut GameState) -> bool {
    let selected: Vec<u32> = state.selected_cards.clone();
    let cards: Vec<_> = selected
        .iter()
        .filter_map(|&card_id| state.active_card(card_id).copied())
        .collect();

    let valid =
        cards.len() == TRIPLE_SIZE && deck::is_valid_match(&cards[0], &cards[1], &cards[2]);
    let player_id = state.attributed_player();

    if valid {
        if let Some(player) = state.player_mut(player_id) {
            player.successful_sets += 1;
        }
        for card_id in selected {
            let Some(cell) = state
                .active_cards
                .iter()
                .position(|card| card.id == card_id)
            else {
                continue;
            };
            if state.deck_cursor < state.deck.len() {
                state.active_cards[cell] = state.deck[state.deck_cursor];
                state.deck_cursor += 1;
            } else {
                state.active_cards.remove(cell);
            }
        }
        info!(player_id, "valid match");
    } else {
        if let Some(player) = state.player_mut(player_id) {
            player.unsuccessful_sets += 1;
        }
        info!(player_id, "invalid match");
    }

    // Infallible: resolve_triple only runs from Selecting.
    if let Ok(next) = transition(state.phase, GameEvent::TripleResolved) {
        state.phase = next;
    }
    valid
}

/// Schedule the fixed result-pause return to live for `expected` phase.
fn schedule_resolution_return(engine: SharedEngine, expected: GamePhase) {
    schedule_phase_advance(engine, expected, RESOLUTION_PAUSE, |engine| async move {
        finish_resolution(&engine).await;
    });
}

/// Run `action` after `delay` if the phase is still `expected`.
///
/// The pre-check here only skips obviously stale callbacks; the action's own
/// guard inside the state lock is what actually protects against a
/// superseding transition racing the wake-up.
fn schedule_phase_advance<F, Fut>(
    engine: SharedEngine,
    expected: GamePhase,
    delay: Duration,
    action: F,
) where
    F: FnOnce(SharedEngine) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if engine.phase().await != expected {
            debug!(?expected, "deferred transition superseded; skipping");
            return;
        }
        action(engine).await;
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::dao::game_store::memory::MemoryStore;
    use crate::deck::{Card, Theme};
    use crate::state::GameEngine;
    use crate::state::game::TimerSettings;

    fn card(id: u32, properties: [u8; 4]) -> Card {
        Card { id, properties }
    }

    /// Engine in the `Live` phase with a crafted board:
    /// cells 1-3 hold (0,0,0,0), (1,1,1,0), (2,2,0,0); cell 4 holds
    /// (2,2,2,0). Cards A, B, (2,2,2,0) form a valid match; A, B, (2,2,0,0)
    /// break on slot 2.
    async fn live_engine(player_count: u8) -> (SharedEngine, Arc<ManualClock>) {
        let config = EngineConfig::default();
        let mut state = GameEngine::fresh_state(&config);

        let mut deck = crate::deck::generate_deck(&Theme::classic());
        // Put the worked-example cards at known board cells (players anchor
        // at cells 0, 3, 8, 11; cells 1, 2, 4 stay card cells for <=2 players).
        for (cell, properties) in [
            (1, [0, 0, 0, 0]),
            (2, [1, 1, 1, 0]),
            (4, [2, 2, 0, 0]),
            (5, [2, 2, 2, 0]),
        ] {
            let from = deck
                .iter()
                .position(|card| card.properties == properties)
                .unwrap();
            deck.swap(cell, from);
        }

        state.player_count = player_count;
        state.players.truncate(player_count as usize);
        state.player_positions = state
            .players
            .iter()
            .map(|player| {
                (
                    player.id,
                    crate::state::game::PLAYER_ANCHOR_POSITIONS[(player.id - 1) as usize],
                )
            })
            .collect();
        state.deck = deck.clone();
        state.active_cards = deck[..12].to_vec();
        state.deck_cursor = 12;
        for index in 0..12 {
            state
                .instance_positions
                .insert(format!("instance-{index}"), index);
        }
        state.phase = GamePhase::Live;

        let clock = Arc::new(ManualClock::new(100_000));
        let engine = GameEngine::from_snapshot(
            state,
            Arc::new(MemoryStore::new()),
            config,
            clock.clone(),
        );
        (engine, clock)
    }

    async fn enter_selecting(engine: &SharedEngine, player_id: u8) {
        assert!(buzz_in(engine, player_id).await);
        buzz_released(engine, player_id).await;
        // Skip the display pause; the one-shot task is guarded and will no-op.
        start_selection_timer(engine).await;
        assert_eq!(engine.phase().await, GamePhase::Selecting);
    }

    #[tokio::test]
    async fn buzz_race_has_exactly_one_winner() {
        let (engine, _clock) = live_engine(2).await;

        assert!(buzz_in(&engine, 1).await);
        assert!(!buzz_in(&engine, 2).await);

        let buzzed = engine.read(|state| state.buzzed_in_player).await;
        assert_eq!(buzzed, Some(1));
        assert_eq!(engine.phase().await, GamePhase::BuzzHeld);
    }

    #[tokio::test]
    async fn release_by_a_non_winner_is_ignored() {
        let (engine, _clock) = live_engine(2).await;
        assert!(buzz_in(&engine, 1).await);

        buzz_released(&engine, 2).await;
        assert_eq!(engine.phase().await, GamePhase::BuzzHeld);

        buzz_released(&engine, 1).await;
        assert_eq!(engine.phase().await, GamePhase::Buzzed);
        assert_eq!(engine.read(|state| state.buzz_press_time).await, None);
    }

    #[tokio::test]
    async fn holding_past_the_window_forfeits_the_buzz() {
        let (engine, clock) = live_engine(2).await;
        assert!(buzz_in(&engine, 1).await);

        clock.advance(3_999);
        handle_buzz_hold_timeout(&engine).await;
        assert_eq!(engine.phase().await, GamePhase::BuzzHeld);

        clock.advance(2);
        handle_buzz_hold_timeout(&engine).await;
        assert_eq!(engine.phase().await, GamePhase::Live);

        let state = engine.read(|state| state.clone()).await;
        assert_eq!(state.player(1).unwrap().unsuccessful_sets, 1);
        assert_eq!(state.buzzed_in_player, None);
        assert_eq!(state.buzz_press_time, None);
    }

    #[tokio::test]
    async fn valid_triple_scores_and_refills_in_place() {
        let (engine, _clock) = live_engine(1).await;
        enter_selecting(&engine, 1).await;

        assert_eq!(select_card(&engine, 1).await, Some(SelectOutcome::Toggled));
        assert_eq!(select_card(&engine, 2).await, Some(SelectOutcome::Toggled));
        assert_eq!(
            select_card(&engine, 5).await,
            Some(SelectOutcome::Resolved(true))
        );

        let state = engine.read(|state| state.clone()).await;
        assert_eq!(state.phase, GamePhase::Validating);
        assert_eq!(state.player(1).unwrap().successful_sets, 1);
        assert_eq!(state.player(1).unwrap().unsuccessful_sets, 0);
        assert_eq!(state.active_cards.len(), 12);
        assert_eq!(state.deck_cursor, 15);
        // The three freed cells received the next undrawn cards.
        assert_eq!(state.active_cards[1], state.deck[12]);
        assert_eq!(state.active_cards[2], state.deck[13]);
        assert_eq!(state.active_cards[5], state.deck[14]);
        // Other cells kept their cards.
        assert_eq!(state.active_cards[4], state.deck[4]);

        finish_resolution(&engine).await;
        let state = engine.read(|state| state.clone()).await;
        assert_eq!(state.phase, GamePhase::Live);
        assert!(state.selected_cards.is_empty());
        assert_eq!(state.buzzed_in_player, None);
    }

    #[tokio::test]
    async fn invalid_triple_counts_against_the_player_and_keeps_the_board() {
        let (engine, _clock) = live_engine(1).await;
        enter_selecting(&engine, 1).await;

        let board_before = engine.read(|state| state.active_cards.clone()).await;

        select_card(&engine, 1).await;
        select_card(&engine, 2).await;
        assert_eq!(
            select_card(&engine, 4).await,
            Some(SelectOutcome::Resolved(false))
        );

        let state = engine.read(|state| state.clone()).await;
        assert_eq!(state.phase, GamePhase::Validating);
        assert_eq!(state.player(1).unwrap().unsuccessful_sets, 1);
        assert_eq!(state.player(1).unwrap().successful_sets, 0);
        assert_eq!(state.active_cards, board_before);
        assert_eq!(state.deck_cursor, 12);
    }

    #[tokio::test]
    async fn toggling_a_selected_card_removes_it_without_validation() {
        let (engine, _clock) = live_engine(1).await;
        enter_selecting(&engine, 1).await;

        select_card(&engine, 1).await;
        select_card(&engine, 2).await;
        assert_eq!(select_card(&engine, 2).await, Some(SelectOutcome::Toggled));

        let selected = engine.read(|state| state.selected_cards.clone()).await;
        assert_eq!(selected.len(), 1);
        assert_eq!(engine.phase().await, GamePhase::Selecting);
    }

    #[tokio::test]
    async fn player_cells_cannot_be_selected() {
        let (engine, _clock) = live_engine(1).await;
        enter_selecting(&engine, 1).await;

        // Cell 0 is player 1's anchor.
        assert_eq!(select_card(&engine, 0).await, None);
        assert!(engine.read(|state| state.selected_cards.is_empty()).await);
    }

    #[tokio::test]
    async fn selection_window_boundary_fires_exactly_once() {
        let (engine, clock) = live_engine(2).await;
        crate::services::board_service::update_timer_settings(
            &engine,
            crate::state::game::TimerSettingsUpdate {
                selection_ms: Some(4_000),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        enter_selecting(&engine, 2).await;

        clock.advance(3_900);
        poll(&engine).await;
        assert_eq!(engine.phase().await, GamePhase::Selecting);

        clock.advance(200);
        poll(&engine).await;
        assert_eq!(engine.phase().await, GamePhase::Cooldown);
        assert_eq!(
            engine
                .read(|state| state.player(2).unwrap().unsuccessful_sets)
                .await,
            1
        );

        // Repeated polls after firing stay no-ops.
        poll(&engine).await;
        poll(&engine).await;
        assert_eq!(engine.phase().await, GamePhase::Cooldown);
        assert_eq!(
            engine
                .read(|state| state.player(2).unwrap().unsuccessful_sets)
                .await,
            1
        );

        finish_resolution(&engine).await;
        assert_eq!(engine.phase().await, GamePhase::Live);
    }

    #[tokio::test]
    async fn countdown_elapses_via_polling() {
        let config = EngineConfig::default();
        let mut state = GameEngine::fresh_state(&config);
        for index in 0..12 {
            state
                .instance_positions
                .insert(format!("instance-{index}"), index);
        }
        state.phase = GamePhase::PlayerSelection;
        let clock = Arc::new(ManualClock::new(50_000));
        let engine = GameEngine::from_snapshot(
            state,
            Arc::new(MemoryStore::new()),
            config,
            clock.clone(),
        );

        start_countdown(&engine).await;
        assert_eq!(engine.phase().await, GamePhase::Countdown);

        clock.advance(TimerSettings::default().countdown_ms - 1);
        poll(&engine).await;
        assert_eq!(engine.phase().await, GamePhase::Countdown);

        clock.advance(2);
        poll(&engine).await;
        assert_eq!(engine.phase().await, GamePhase::Live);
        assert_eq!(engine.read(|state| state.countdown_start).await, None);
    }

    #[tokio::test]
    async fn deck_exhaustion_shrinks_the_board() {
        let (engine, _clock) = live_engine(1).await;
        // Leave a single undrawn card.
        engine
            .mutate(|state| {
                state.deck_cursor = state.deck.len() - 1;
                Some(())
            })
            .await;
        enter_selecting(&engine, 1).await;

        select_card(&engine, 1).await;
        select_card(&engine, 2).await;
        assert_eq!(
            select_card(&engine, 5).await,
            Some(SelectOutcome::Resolved(true))
        );

        let state = engine.read(|state| state.clone()).await;
        // One freed cell was refilled, the other two were dropped.
        assert_eq!(state.active_cards.len(), 10);
        assert_eq!(state.deck_cursor, state.deck.len());
    }

    #[tokio::test]
    async fn stale_deferred_callbacks_are_neutralized() {
        let (engine, _clock) = live_engine(2).await;

        // A result-pause callback firing while live must not apply.
        finish_resolution(&engine).await;
        assert_eq!(engine.phase().await, GamePhase::Live);

        // A selection-start callback firing after a reset must not apply.
        assert!(buzz_in(&engine, 1).await);
        crate::services::board_service::unregister_instance(&engine, "instance-0").await;
        assert_eq!(engine.phase().await, GamePhase::Setup);
        start_selection_timer(&engine).await;
        assert_eq!(engine.phase().await, GamePhase::Setup);
        assert_eq!(engine.read(|state| state.selection_timer).await, None);
    }

    #[test]
    fn crafted_cards_match_the_worked_examples() {
        let a = card(0, [0, 0, 0, 0]);
        let b = card(1, [1, 1, 1, 0]);
        let c = card(2, [2, 2, 2, 0]);
        let d = card(3, [2, 2, 0, 0]);
        assert!(deck::is_valid_match(&a, &b, &c));
        assert!(!deck::is_valid_match(&a, &b, &d));
    }
}
