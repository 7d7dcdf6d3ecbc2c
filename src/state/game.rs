use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::deck::{self, Card, Theme};
use crate::state::state_machine::GamePhase;

/// Number of display cells on the board.
pub const BOARD_SIZE: usize = 12;
/// Maximum number of players a session supports.
pub const MAX_PLAYERS: u8 = 4;
/// Default board cells players are anchored to, by player index.
pub const PLAYER_ANCHOR_POSITIONS: [usize; MAX_PLAYERS as usize] = [0, 3, 8, 11];
/// A completed triple always has this many cards.
pub const TRIPLE_SIZE: usize = 3;

/// Configured durations for the three real-time windows, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSettings {
    /// Pre-game countdown before the board goes live.
    pub countdown_ms: u64,
    /// How long a buzzer may be held before the buzz is forfeited.
    pub buzz_hold_ms: u64,
    /// How long the buzzed-in player has to complete a triple.
    pub selection_ms: u64,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            countdown_ms: 5_000,
            buzz_hold_ms: 4_000,
            selection_ms: 10_000,
        }
    }
}

/// Partial update applied over existing [`TimerSettings`]; absent fields keep
/// their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSettingsUpdate {
    /// New countdown duration, if changing.
    pub countdown_ms: Option<u64>,
    /// New buzz-hold duration, if changing.
    pub buzz_hold_ms: Option<u64>,
    /// New selection duration, if changing.
    pub selection_ms: Option<u64>,
}

impl TimerSettings {
    /// Merge a partial update into the current settings.
    pub fn apply(&mut self, update: TimerSettingsUpdate) {
        if let Some(countdown_ms) = update.countdown_ms {
            self.countdown_ms = countdown_ms;
        }
        if let Some(buzz_hold_ms) = update.buzz_hold_ms {
            self.buzz_hold_ms = buzz_hold_ms;
        }
        if let Some(selection_ms) = update.selection_ms {
            self.selection_ms = selection_ms;
        }
    }
}

/// Player info tracked during a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Numeric id, 1-based and dense.
    pub id: u8,
    /// Display name.
    pub name: String,
    /// Color token shown on the player's cell.
    pub color: String,
    /// Instance occupying this player's board cell; the button that acts as
    /// this player's buzzer. Rebound whenever the registry or layout changes.
    pub buzzer_instance: Option<String>,
    /// Cumulative valid triples found; only resets with a new game.
    pub successful_sets: u32,
    /// Cumulative failed attempts (invalid triples, forfeits, timeouts).
    pub unsuccessful_sets: u32,
}

/// The single mutable game root, persisted wholesale on every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    /// Identifier of the active card theme.
    pub theme_id: String,
    /// Number of participating players (1-4).
    pub player_count: u8,
    /// Participating players and their scores.
    pub players: Vec<Player>,
    /// Full shuffled deck; order is fixed for the session.
    pub deck: Vec<Card>,
    /// Number of deck cards drawn so far. Drawn cards are always a deck
    /// prefix, so `deck[..deck_cursor]` is the union of the active board and
    /// the consumed discard pile.
    pub deck_cursor: usize,
    /// Cards currently on the board, indexed by board position.
    pub active_cards: Vec<Card>,
    /// Registered display instances and the board position each occupies.
    pub instance_positions: IndexMap<String, usize>,
    /// Board position occupied by each player.
    pub player_positions: IndexMap<u8, usize>,
    /// Player marked as the pending swap target during player selection.
    pub selected_player_for_swap: Option<u8>,
    /// Card ids chosen toward the current triple, in selection order.
    pub selected_cards: Vec<u32>,
    /// Current phase of the session.
    pub phase: GamePhase,
    /// Player holding the exclusive right to attempt the next match.
    pub buzzed_in_player: Option<u8>,
    /// Epoch milliseconds of the winning buzz press, while held.
    pub buzz_press_time: Option<u64>,
    /// Epoch milliseconds the pre-game countdown started.
    pub countdown_start: Option<u64>,
    /// Epoch milliseconds the selection window opened.
    pub selection_timer: Option<u64>,
    /// Configured timer durations.
    pub timer_settings: TimerSettings,
}

impl GameState {
    /// Build a fresh session: new shuffled deck, first twelve cards on the
    /// board, players at their default anchor cells, empty registry, phase
    /// [`GamePhase::Setup`].
    pub fn new(
        player_count: u8,
        theme: &Theme,
        player_colors: &[String],
        timer_settings: TimerSettings,
    ) -> Self {
        let deck = deck::shuffle(&deck::generate_deck(theme));
        let active_cards = deck[..BOARD_SIZE.min(deck.len())].to_vec();
        let deck_cursor = active_cards.len();

        let players: Vec<Player> = (1..=player_count)
            .map(|id| Player {
                id,
                name: format!("Player {id}"),
                color: player_colors
                    .get((id - 1) as usize)
                    .cloned()
                    .unwrap_or_else(|| "white".to_string()),
                buzzer_instance: None,
                successful_sets: 0,
                unsuccessful_sets: 0,
            })
            .collect();

        let player_positions = players
            .iter()
            .map(|player| {
                (
                    player.id,
                    PLAYER_ANCHOR_POSITIONS[(player.id - 1) as usize],
                )
            })
            .collect();

        Self {
            theme_id: theme.id.clone(),
            player_count,
            players,
            deck,
            deck_cursor,
            active_cards,
            instance_positions: IndexMap::new(),
            player_positions,
            selected_player_for_swap: None,
            selected_cards: Vec::new(),
            phase: GamePhase::Setup,
            buzzed_in_player: None,
            buzz_press_time: None,
            countdown_start: None,
            selection_timer: None,
            timer_settings,
        }
    }

    /// Look up a player by id.
    pub fn player(&self, player_id: u8) -> Option<&Player> {
        self.players.iter().find(|player| player.id == player_id)
    }

    /// Mutable lookup of a player by id.
    pub fn player_mut(&mut self, player_id: u8) -> Option<&mut Player> {
        self.players
            .iter_mut()
            .find(|player| player.id == player_id)
    }

    /// Player occupying a board cell, if any. Value-scan over the small
    /// fixed-size position map.
    pub fn player_at_position(&self, position: usize) -> Option<&Player> {
        self.player_positions
            .iter()
            .find(|&(_, &occupied)| occupied == position)
            .and_then(|(&player_id, _)| self.player(player_id))
    }

    /// Whether a board cell currently shows a player instead of a card.
    pub fn is_player_position(&self, position: usize) -> bool {
        self.player_positions
            .values()
            .any(|&occupied| occupied == position)
    }

    /// Card displayed at a board cell, or `None` for player cells and (after
    /// deck exhaustion) cells past the shrunken board.
    pub fn card_at(&self, position: usize) -> Option<&Card> {
        if self.is_player_position(position) {
            return None;
        }
        self.active_cards.get(position)
    }

    /// Active card with the given id, if it is on the board.
    pub fn active_card(&self, card_id: u32) -> Option<&Card> {
        self.active_cards.iter().find(|card| card.id == card_id)
    }

    /// Lowest board position not yet assigned to a registered instance.
    pub fn lowest_free_position(&self) -> Option<usize> {
        (0..BOARD_SIZE).find(|position| {
            !self
                .instance_positions
                .values()
                .any(|&occupied| occupied == *position)
        })
    }

    /// Cards not yet drawn from the deck, in draw order.
    pub fn undrawn(&self) -> &[Card] {
        &self.deck[self.deck_cursor..]
    }

    /// Player a match attempt is attributed to: the buzzed-in player, or
    /// player 1 when none is recorded (solo play has no buzz step).
    pub fn attributed_player(&self) -> u8 {
        self.buzzed_in_player.unwrap_or(1)
    }

    /// Re-derive every player's buzzer binding from the instance occupying
    /// the player's board cell. Called after any registry or layout change.
    pub fn rebind_buzzers(&mut self) {
        let bindings: Vec<Option<String>> = self
            .players
            .iter()
            .map(|player| {
                let cell = self.player_positions.get(&player.id).copied()?;
                self.instance_positions
                    .iter()
                    .find(|&(_, &occupied)| occupied == cell)
                    .map(|(instance_id, _)| instance_id.clone())
            })
            .collect();
        for (player, binding) in self.players.iter_mut().zip(bindings) {
            player.buzzer_instance = binding;
        }
    }

    /// Drop all in-round transient state (selection, buzz, timers, pending
    /// swap) without touching scores, the deck, or the registry.
    pub fn clear_round_state(&mut self) {
        self.selected_cards.clear();
        self.selected_player_for_swap = None;
        self.buzzed_in_player = None;
        self.buzz_press_time = None;
        self.countdown_start = None;
        self.selection_timer = None;
    }

    /// Structurally validate a snapshot loaded from persistence.
    ///
    /// Returns a human readable reason on the first inconsistency found; the
    /// caller discards the snapshot and starts fresh.
    pub fn validate(&self) -> Result<(), String> {
        if self.player_count == 0 || self.player_count > MAX_PLAYERS {
            return Err(format!("player count {} out of range", self.player_count));
        }
        if self.players.len() != self.player_count as usize {
            return Err("players list does not match player count".to_string());
        }
        for (index, player) in self.players.iter().enumerate() {
            if player.id as usize != index + 1 {
                return Err(format!("player ids are not dense at index {index}"));
            }
        }

        if self.deck.is_empty() {
            return Err("deck is empty".to_string());
        }
        let mut deck_ids = std::collections::HashSet::new();
        for card in &self.deck {
            if !deck_ids.insert(card.id) {
                return Err(format!("duplicate card id {} in deck", card.id));
            }
        }
        if self.deck_cursor > self.deck.len() {
            return Err("deck cursor past the end of the deck".to_string());
        }

        let mut active_ids = std::collections::HashSet::new();
        for card in &self.active_cards {
            if !deck_ids.contains(&card.id) {
                return Err(format!("active card {} is not in the deck", card.id));
            }
            if !active_ids.insert(card.id) {
                return Err(format!("card {} appears twice on the board", card.id));
            }
        }
        if self.active_cards.len() > BOARD_SIZE {
            return Err("more active cards than board cells".to_string());
        }

        let mut seen_positions = std::collections::HashSet::new();
        for (instance_id, &position) in &self.instance_positions {
            if position >= BOARD_SIZE {
                return Err(format!(
                    "instance `{instance_id}` holds out-of-range position {position}"
                ));
            }
            if !seen_positions.insert(position) {
                return Err(format!("two instances occupy position {position}"));
            }
        }

        let mut player_cells = std::collections::HashSet::new();
        for (&player_id, &position) in &self.player_positions {
            if self.player(player_id).is_none() {
                return Err(format!("position map references unknown player {player_id}"));
            }
            if position >= BOARD_SIZE {
                return Err(format!(
                    "player {player_id} holds out-of-range position {position}"
                ));
            }
            if !player_cells.insert(position) {
                return Err(format!("two players occupy position {position}"));
            }
        }

        if self.selected_cards.len() > TRIPLE_SIZE {
            return Err("more than three cards selected".to_string());
        }
        for &card_id in &self.selected_cards {
            if !active_ids.contains(&card_id) {
                return Err(format!("selected card {card_id} is not on the board"));
            }
        }

        if let Some(player_id) = self.buzzed_in_player
            && self.player(player_id).is_none()
        {
            return Err(format!("buzzed-in player {player_id} does not exist"));
        }

        Ok(())
    }
}
