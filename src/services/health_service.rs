use tracing::debug;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report the session phase, registration status and player count.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let response = HealthResponse::new(
        state.phase(),
        state.is_registered(),
        state.population().len(),
    );
    if response.status != "ok" {
        debug!(phase = response.phase, "health check while session is not active");
    }
    response
}
