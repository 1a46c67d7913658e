use axum::Router;

use crate::state::SharedState;

pub mod health;

/// Compose all route trees, wiring in shared state.
pub fn router(state: SharedState) -> Router<()> {
    health::router().with_state(state)
}
