//! Read-only projections of the shared state.
//!
//! Display instances render exclusively from these accessors (or from bus
//! snapshots, which carry the same data); none of them mutate or broadcast.

use crate::deck::Card;
use crate::state::SharedEngine;
use crate::state::game::{GameState, Player};
use crate::state::state_machine::GamePhase;

/// Full snapshot of the current state.
pub async fn get_state(engine: &SharedEngine) -> GameState {
    engine.read(|state| state.clone()).await
}

/// Card shown at a board cell. `None` for player cells and cells past the
/// end of a shrunken board.
pub async fn get_card(engine: &SharedEngine, position: usize) -> Option<Card> {
    engine.read(|state| state.card_at(position).copied()).await
}

/// Whether the card at a board cell is part of the in-progress triple.
/// `false` for player cells and empty cells.
pub async fn is_card_selected(engine: &SharedEngine, position: usize) -> bool {
    engine
        .read(|state| {
            state
                .card_at(position)
                .is_some_and(|card| state.selected_cards.contains(&card.id))
        })
        .await
}

/// Player by id.
pub async fn get_player(engine: &SharedEngine, player_id: u8) -> Option<Player> {
    engine.read(|state| state.player(player_id).cloned()).await
}

/// Player occupying a board cell, if any.
pub async fn get_player_at_position(
    engine: &SharedEngine,
    position: usize,
) -> Option<Player> {
    engine
        .read(|state| state.player_at_position(position).cloned())
        .await
}

/// Whether a board cell shows a player instead of a card.
pub async fn is_player_position(engine: &SharedEngine, position: usize) -> bool {
    engine.read(|state| state.is_player_position(position)).await
}

/// Milliseconds left on the pre-game countdown, while it runs.
pub async fn get_countdown_remaining(engine: &SharedEngine) -> Option<u64> {
    let now = engine.now_ms();
    engine
        .read(|state| {
            if state.phase != GamePhase::Countdown {
                return None;
            }
            let started = state.countdown_start?;
            Some(remaining(started, state.timer_settings.countdown_ms, now))
        })
        .await
}

/// Milliseconds left before a held buzz is forfeited, while one is held.
pub async fn get_buzz_hold_time_remaining(engine: &SharedEngine) -> Option<u64> {
    let now = engine.now_ms();
    engine
        .read(|state| {
            if state.phase != GamePhase::BuzzHeld {
                return None;
            }
            let pressed = state.buzz_press_time?;
            Some(remaining(pressed, state.timer_settings.buzz_hold_ms, now))
        })
        .await
}

/// Milliseconds left in the selection window, while it runs.
pub async fn get_selection_time_remaining(engine: &SharedEngine) -> Option<u64> {
    let now = engine.now_ms();
    engine
        .read(|state| {
            if state.phase != GamePhase::Selecting {
                return None;
            }
            let started = state.selection_timer?;
            Some(remaining(started, state.timer_settings.selection_ms, now))
        })
        .await
}

/// Number of registered display instances.
pub async fn get_instance_count(engine: &SharedEngine) -> usize {
    engine.read(|state| state.instance_positions.len()).await
}

/// Board position a registered instance should render a card from, or `None`
/// when the instance is unregistered or its cell shows a player.
pub async fn get_card_index_for_instance(
    engine: &SharedEngine,
    instance_id: &str,
) -> Option<usize> {
    engine
        .read(|state| {
            let position = state.instance_positions.get(instance_id).copied()?;
            if state.is_player_position(position) {
                return None;
            }
            Some(position)
        })
        .await
}

fn remaining(started: u64, duration_ms: u64, now: u64) -> u64 {
    (started + duration_ms).saturating_sub(now)
}
