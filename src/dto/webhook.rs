use serde::Serialize;

/// Body posted to the configured webhook when an action emits its message.
#[derive(Debug, Serialize)]
pub struct WebhookMessage {
    pub text: String,
}
