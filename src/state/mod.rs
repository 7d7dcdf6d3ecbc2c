/// Change-notification fan-out for display instances.
pub mod bus;
/// Persisted game state models.
pub mod game;
/// Phase transition table.
pub mod state_machine;

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::dao::game_store::GameStore;
use crate::dao::game_store::json_file::JsonFileStore;
use crate::deck::Theme;
use crate::state::bus::{ChangeBus, Subscription};
use crate::state::game::GameState;
use crate::state::state_machine::GamePhase;

/// Shared handle to the engine, cloned into every consumer and timer task.
pub type SharedEngine = Arc<GameEngine>;

/// Single-writer owner of the shared [`GameState`].
///
/// Every mutating operation takes the write lock, runs to completion, then
/// persists the whole snapshot (fire-and-forget) and fans it out on the
/// change bus. The in-memory state stays authoritative even when a persist
/// write fails.
pub struct GameEngine {
    state: RwLock<GameState>,
    store: Arc<dyn GameStore>,
    bus: ChangeBus,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl GameEngine {
    /// Load the engine with the JSON file store at the configured state path.
    pub async fn load_from_config(config: EngineConfig) -> SharedEngine {
        let store = Arc::new(JsonFileStore::new(config.state_path.clone()));
        Self::load(store, config).await
    }

    /// Load the persisted snapshot through `store`, falling back to a fresh
    /// default session when nothing usable is found.
    pub async fn load(store: Arc<dyn GameStore>, config: EngineConfig) -> SharedEngine {
        Self::load_with_clock(store, config, Arc::new(SystemClock)).await
    }

    /// [`GameEngine::load`] with an explicit clock, for tests and simulation.
    pub async fn load_with_clock(
        store: Arc<dyn GameStore>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> SharedEngine {
        let state = match store.load().await {
            Ok(Some(snapshot)) => match snapshot.validate() {
                Ok(()) => {
                    info!(phase = ?snapshot.phase, "restored persisted game snapshot");
                    snapshot
                }
                Err(reason) => {
                    warn!(%reason, "persisted snapshot is inconsistent; starting fresh");
                    Self::fresh_state(&config)
                }
            },
            Ok(None) => {
                info!("no persisted snapshot found; starting fresh");
                Self::fresh_state(&config)
            }
            Err(err) => {
                warn!(error = %err, "failed to load persisted snapshot; starting fresh");
                Self::fresh_state(&config)
            }
        };

        Self::from_snapshot(state, store, config, clock)
    }

    /// Wrap an explicit snapshot, skipping the load-or-default step. Used by
    /// tests and embedders that construct state themselves.
    pub fn from_snapshot(
        state: GameState,
        store: Arc<dyn GameStore>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> SharedEngine {
        Arc::new(Self {
            state: RwLock::new(state),
            store,
            bus: ChangeBus::new(),
            clock,
            config,
        })
    }

    /// Build the default fresh session described by the configuration.
    pub fn fresh_state(config: &EngineConfig) -> GameState {
        let theme = Theme::by_id(&config.default_theme).unwrap_or_else(Theme::classic);
        GameState::new(
            config.default_player_count,
            &theme,
            &config.player_colors,
            config.default_timers.clone(),
        )
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current time in epoch milliseconds from the injected clock.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Current phase of the session.
    pub async fn phase(&self) -> GamePhase {
        self.state.read().await.phase
    }

    /// Run a read-only closure against the shared state.
    pub async fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&GameState) -> R,
    {
        let guard = self.state.read().await;
        f(&*guard)
    }

    /// Run a mutating closure against the shared state.
    ///
    /// The closure returns `None` to signal a rejected/no-op action: nothing
    /// is persisted or broadcast. On `Some`, the whole snapshot is persisted
    /// fire-and-forget and pushed to every subscriber before returning, so
    /// guard checks and effects are atomic with respect to other mutations.
    pub async fn mutate<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut GameState) -> Option<R>,
    {
        let (result, snapshot) = {
            let mut guard = self.state.write().await;
            let result = f(&mut *guard)?;
            (result, Arc::new(guard.clone()))
        };

        self.persist(Arc::clone(&snapshot));
        self.bus.publish(snapshot);
        Some(result)
    }

    /// Register a change-bus subscriber.
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    /// Queue a snapshot write without blocking the mutation path. Failures
    /// are logged and dropped; the next successful write catches up.
    fn persist(&self, snapshot: Arc<GameState>) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(err) = store.save((*snapshot).clone()).await {
                warn!(error = %err, "failed to persist game snapshot");
            }
        });
    }
}
