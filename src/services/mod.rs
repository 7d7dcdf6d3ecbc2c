/// Game bootstrap, instance registry, and player layout operations.
pub mod board_service;
/// Buzz, selection, and timer-driven gameplay operations.
pub mod play_service;
/// Read-only projections consumed by the rendering layer.
pub mod query_service;
