use tracing::{debug, info, warn};

use crate::{
    dto::webhook::WebhookMessage,
    state::{SharedState, actor::ActorId},
};

/// Emit an action's message: log it and post it to the webhook, if one is configured.
///
/// Delivery runs in its own task; failures are logged and never reach the caller.
pub fn emit_message(state: &SharedState, badge_id: &ActorId, message: &str) {
    info!(badge_id = %badge_id, text = message, "action message emitted");

    let Some(url) = state.config().webhook_url.clone() else {
        return;
    };
    let client = state.http().clone();
    let body = WebhookMessage {
        text: message.to_string(),
    };

    tokio::spawn(async move {
        let result = client
            .post(url.clone())
            .json(&body)
            .send()
            .await
            .and_then(|response| response.error_for_status());
        match result {
            Ok(response) => debug!(%url, status = %response.status(), "webhook delivered"),
            Err(err) => warn!(%url, error = %err, "webhook delivery failed"),
        }
    });
}
