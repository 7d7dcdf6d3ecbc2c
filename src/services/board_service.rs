//! Session bootstrap, display-instance registry, and player layout.
//!
//! Phase-illegal actions (a layout click outside player selection, a
//! duplicate registration) are traced and dropped without touching state,
//! matching the button hardware's fire-and-forget semantics.

use tracing::{debug, info, warn};

use crate::deck::Theme;
use crate::error::EngineError;
use crate::state::SharedEngine;
use crate::state::game::{BOARD_SIZE, GameState, MAX_PLAYERS, TimerSettingsUpdate};
use crate::state::state_machine::{GameEvent, GamePhase, transition};

/// Start a fresh game: new shuffled deck, zeroed scores, players re-anchored.
///
/// Registered instances and the current timer settings survive the reset; if
/// the board is already complete the new session opens directly in player
/// selection.
pub async fn new_game(
    engine: &SharedEngine,
    player_count: u8,
    theme_id: &str,
) -> Result<(), EngineError> {
    if player_count == 0 || player_count > MAX_PLAYERS {
        return Err(EngineError::InvalidInput(format!(
            "player count must be between 1 and {MAX_PLAYERS}, got {player_count}"
        )));
    }
    let theme = Theme::by_id(theme_id)
        .ok_or_else(|| EngineError::NotFound(format!("theme `{theme_id}` not found")))?;

    let colors = engine.config().player_colors.clone();
    engine
        .mutate(move |state| {
            let mut fresh =
                GameState::new(player_count, &theme, &colors, state.timer_settings.clone());
            fresh.instance_positions = std::mem::take(&mut state.instance_positions);
            if fresh.instance_positions.len() == BOARD_SIZE {
                fresh.phase = GamePhase::PlayerSelection;
            }
            fresh.rebind_buzzers();
            *state = fresh;
            Some(())
        })
        .await;

    info!(player_count, theme_id, "started new game");
    Ok(())
}

/// Register a display instance, assigning it the lowest unused board cell.
///
/// The twelfth registration completes the board and opens player selection.
/// Re-registrations are no-ops; registrants beyond a full board are rejected.
pub async fn register_instance(engine: &SharedEngine, instance_id: &str) {
    engine
        .mutate(|state| {
            if state.instance_positions.contains_key(instance_id) {
                debug!(instance_id, "instance already registered; ignoring");
                return None;
            }
            let Some(position) = state.lowest_free_position() else {
                warn!(instance_id, "board is full; rejecting registration");
                return None;
            };

            state
                .instance_positions
                .insert(instance_id.to_string(), position);
            let count = state.instance_positions.len();
            info!(instance_id, position, count, "instance registered");

            if count == BOARD_SIZE {
                match transition(state.phase, GameEvent::BoardFilled) {
                    Ok(next) => state.phase = next,
                    Err(invalid) => debug!(%invalid, "board filled outside setup; ignoring"),
                }
            }
            state.rebind_buzzers();
            Some(())
        })
        .await;
}

/// Unregister a display instance, freeing its board cell.
///
/// Dropping below a complete board hard-resets the session phase to setup
/// from wherever it was; scores, the deck, and the remaining registrations
/// are kept.
pub async fn unregister_instance(engine: &SharedEngine, instance_id: &str) {
    engine
        .mutate(|state| {
            if state.instance_positions.shift_remove(instance_id).is_none() {
                debug!(instance_id, "instance not registered; ignoring");
                return None;
            }
            let count = state.instance_positions.len();
            info!(instance_id, count, "instance unregistered");

            if count < BOARD_SIZE && state.phase != GamePhase::Setup {
                // Infallible: BoardBroken is legal from every phase.
                if let Ok(next) = transition(state.phase, GameEvent::BoardBroken) {
                    warn!(from = ?state.phase, "board incomplete; resetting game progress");
                    state.phase = next;
                    state.clear_round_state();
                }
            }
            state.rebind_buzzers();
            Some(())
        })
        .await;
}

/// Mark a player as the pending swap target, or complete a swap.
///
/// Selecting the pending player again clears the mark; selecting a second,
/// distinct player swaps the two players' board cells.
pub async fn select_player_for_swap(engine: &SharedEngine, player_id: u8) {
    engine
        .mutate(|state| {
            if state.phase != GamePhase::PlayerSelection {
                debug!(player_id, phase = ?state.phase, "player swap outside selection; ignoring");
                return None;
            }
            if state.player(player_id).is_none() {
                debug!(player_id, "unknown player for swap; ignoring");
                return None;
            }

            match state.selected_player_for_swap {
                Some(pending) if pending == player_id => {
                    state.selected_player_for_swap = None;
                }
                Some(pending) => {
                    let first = state.player_positions.get(&pending).copied();
                    let second = state.player_positions.get(&player_id).copied();
                    if let (Some(first), Some(second)) = (first, second) {
                        state.player_positions.insert(pending, second);
                        state.player_positions.insert(player_id, first);
                    }
                    state.selected_player_for_swap = None;
                }
                None => {
                    state.selected_player_for_swap = Some(player_id);
                }
            }
            state.rebind_buzzers();
            Some(())
        })
        .await;
}

/// Move the pending swap player to a clicked board cell.
///
/// When another player already occupies the cell the two swap; otherwise the
/// pending player simply moves. The pending mark is cleared either way.
pub async fn assign_player_position(engine: &SharedEngine, position: usize) {
    engine
        .mutate(|state| {
            if state.phase != GamePhase::PlayerSelection {
                debug!(position, phase = ?state.phase, "position assign outside selection; ignoring");
                return None;
            }
            if position >= BOARD_SIZE {
                debug!(position, "position out of range; ignoring");
                return None;
            }
            let Some(pending) = state.selected_player_for_swap else {
                debug!(position, "no pending swap player; ignoring");
                return None;
            };

            let previous = state.player_positions.get(&pending).copied();
            let occupant = state
                .player_positions
                .iter()
                .find(|&(_, &cell)| cell == position)
                .map(|(&player_id, _)| player_id);

            match occupant {
                Some(player_id) if player_id != pending => {
                    if let Some(previous) = previous {
                        state.player_positions.insert(player_id, previous);
                    }
                    state.player_positions.insert(pending, position);
                }
                Some(_) => {} // clicked the pending player's own cell
                None => {
                    state.player_positions.insert(pending, position);
                }
            }
            state.selected_player_for_swap = None;
            state.rebind_buzzers();
            Some(())
        })
        .await;
}

/// Apply a partial timer-settings update; absent fields keep their value.
pub async fn update_timer_settings(
    engine: &SharedEngine,
    update: TimerSettingsUpdate,
) -> Result<(), EngineError> {
    let zeroed = [
        update.countdown_ms,
        update.buzz_hold_ms,
        update.selection_ms,
    ]
    .iter()
    .any(|value| *value == Some(0));
    if zeroed {
        return Err(EngineError::InvalidInput(
            "timer durations must be strictly positive".to_string(),
        ));
    }

    engine
        .mutate(move |state| {
            state.timer_settings.apply(update);
            Some(())
        })
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::dao::game_store::memory::MemoryStore;
    use crate::state::GameEngine;

    async fn engine() -> SharedEngine {
        let config = EngineConfig::default();
        let state = GameEngine::fresh_state(&config);
        GameEngine::from_snapshot(
            state,
            Arc::new(MemoryStore::new()),
            config,
            Arc::new(ManualClock::new(1_000)),
        )
    }

    async fn fill_board(engine: &SharedEngine) {
        for index in 0..BOARD_SIZE {
            register_instance(engine, &format!("instance-{index}")).await;
        }
    }

    #[tokio::test]
    async fn twelfth_registration_opens_player_selection() {
        let engine = engine().await;

        for index in 0..BOARD_SIZE - 1 {
            register_instance(&engine, &format!("instance-{index}")).await;
        }
        assert_eq!(engine.phase().await, GamePhase::Setup);

        register_instance(&engine, "instance-11").await;
        assert_eq!(engine.phase().await, GamePhase::PlayerSelection);
    }

    #[tokio::test]
    async fn instances_get_lowest_unused_position_and_keep_it() {
        let engine = engine().await;
        register_instance(&engine, "a").await;
        register_instance(&engine, "b").await;
        // Duplicate registration keeps the original cell.
        register_instance(&engine, "a").await;

        let positions = engine
            .read(|state| state.instance_positions.clone())
            .await;
        assert_eq!(positions.get("a"), Some(&0));
        assert_eq!(positions.get("b"), Some(&1));
    }

    #[tokio::test]
    async fn thirteenth_instance_is_rejected() {
        let engine = engine().await;
        fill_board(&engine).await;
        register_instance(&engine, "extra").await;

        let count = engine.read(|state| state.instance_positions.len()).await;
        assert_eq!(count, BOARD_SIZE);
        assert!(
            !engine
                .read(|state| state.instance_positions.contains_key("extra"))
                .await
        );
    }

    #[tokio::test]
    async fn unregistering_resets_phase_and_frees_the_cell() {
        let engine = engine().await;
        fill_board(&engine).await;
        assert_eq!(engine.phase().await, GamePhase::PlayerSelection);

        unregister_instance(&engine, "instance-4").await;
        assert_eq!(engine.phase().await, GamePhase::Setup);

        register_instance(&engine, "replacement").await;
        let position = engine
            .read(|state| state.instance_positions.get("replacement").copied())
            .await;
        assert_eq!(position, Some(4));
        assert_eq!(engine.phase().await, GamePhase::PlayerSelection);
    }

    #[tokio::test]
    async fn selecting_two_players_swaps_their_cells() {
        let engine = engine().await;
        fill_board(&engine).await;

        select_player_for_swap(&engine, 1).await;
        select_player_for_swap(&engine, 2).await;

        let positions = engine.read(|state| state.player_positions.clone()).await;
        assert_eq!(positions.get(&1), Some(&3));
        assert_eq!(positions.get(&2), Some(&0));
    }

    #[tokio::test]
    async fn reselecting_the_pending_player_clears_the_mark() {
        let engine = engine().await;
        fill_board(&engine).await;

        select_player_for_swap(&engine, 1).await;
        select_player_for_swap(&engine, 1).await;

        let pending = engine.read(|state| state.selected_player_for_swap).await;
        assert_eq!(pending, None);
    }

    #[tokio::test]
    async fn assigning_a_free_cell_moves_the_pending_player() {
        let engine = engine().await;
        fill_board(&engine).await;

        select_player_for_swap(&engine, 1).await;
        assign_player_position(&engine, 5).await;

        let positions = engine.read(|state| state.player_positions.clone()).await;
        assert_eq!(positions.get(&1), Some(&5));
        assert_eq!(
            engine.read(|state| state.selected_player_for_swap).await,
            None
        );
    }

    #[tokio::test]
    async fn assigning_an_occupied_cell_swaps_occupants() {
        let engine = engine().await;
        fill_board(&engine).await;

        select_player_for_swap(&engine, 1).await;
        assign_player_position(&engine, 3).await;

        let positions = engine.read(|state| state.player_positions.clone()).await;
        assert_eq!(positions.get(&1), Some(&3));
        assert_eq!(positions.get(&2), Some(&0));
    }

    #[tokio::test]
    async fn players_bind_to_the_buzzer_at_their_cell() {
        let engine = engine().await;
        fill_board(&engine).await;

        let state = engine.read(|state| state.clone()).await;
        assert_eq!(
            state.player(1).unwrap().buzzer_instance.as_deref(),
            Some("instance-0")
        );
        assert_eq!(
            state.player(2).unwrap().buzzer_instance.as_deref(),
            Some("instance-3")
        );

        // Bindings follow the players when they swap cells.
        select_player_for_swap(&engine, 1).await;
        select_player_for_swap(&engine, 2).await;
        let state = engine.read(|state| state.clone()).await;
        assert_eq!(
            state.player(1).unwrap().buzzer_instance.as_deref(),
            Some("instance-3")
        );
        assert_eq!(
            state.player(2).unwrap().buzzer_instance.as_deref(),
            Some("instance-0")
        );

        // Losing the instance under a player clears that player's binding.
        unregister_instance(&engine, "instance-3").await;
        let state = engine.read(|state| state.clone()).await;
        assert_eq!(state.player(1).unwrap().buzzer_instance, None);
        assert_eq!(
            state.player(2).unwrap().buzzer_instance.as_deref(),
            Some("instance-0")
        );
    }

    #[tokio::test]
    async fn new_game_resets_scores_but_keeps_registry_and_timers() {
        let engine = engine().await;
        fill_board(&engine).await;
        update_timer_settings(
            &engine,
            TimerSettingsUpdate {
                selection_ms: Some(4_000),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        engine
            .mutate(|state| {
                state.player_mut(1).unwrap().successful_sets = 7;
                Some(())
            })
            .await;

        new_game(&engine, 4, "classic").await.unwrap();

        let state = engine.read(|state| state.clone()).await;
        assert_eq!(state.player_count, 4);
        assert_eq!(state.players[0].successful_sets, 0);
        assert_eq!(state.instance_positions.len(), BOARD_SIZE);
        assert_eq!(state.timer_settings.selection_ms, 4_000);
        assert_eq!(state.phase, GamePhase::PlayerSelection);
    }

    #[tokio::test]
    async fn new_game_rejects_bad_inputs() {
        let engine = engine().await;
        assert!(matches!(
            new_game(&engine, 0, "classic").await,
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            new_game(&engine, 2, "missing-theme").await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn zero_timer_durations_are_rejected() {
        let engine = engine().await;
        let err = update_timer_settings(
            &engine,
            TimerSettingsUpdate {
                buzz_hold_ms: Some(0),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }
}
