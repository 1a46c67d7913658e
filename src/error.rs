use thiserror::Error;

use crate::bus::BusError;

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No live actor is tracked under this id.
    #[error("unknown actor `{0}`")]
    UnknownActor(String),
    /// No station is configured under this name.
    #[error("unknown station `{0}`")]
    UnknownStation(String),
    /// An event or call carried arguments that could not be decoded.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    /// The directory service rejected the game registration.
    #[error("registration rejected: {0}")]
    Registration(String),
    /// The bus is not connected or a bus operation failed.
    #[error("bus failure")]
    Bus(#[from] BusError),
    /// Some subscriptions of a leaving actor could not be released.
    #[error("failed to release {} subscription(s) of `{badge_id}`", .failures.len())]
    Release {
        badge_id: String,
        failures: Vec<BusError>,
    },
}

impl ServiceError {
    /// Error URI reported to remote callers.
    pub fn uri(&self) -> &'static str {
        match self {
            ServiceError::UnknownActor(_) => "game.error.unknown_actor",
            ServiceError::UnknownStation(_) => "game.error.unknown_station",
            ServiceError::InvalidPayload(_) => "wamp.error.invalid_argument",
            ServiceError::Registration(_) => "game.error.registration",
            ServiceError::Bus(_) | ServiceError::Release { .. } => "game.error.unavailable",
        }
    }
}

impl From<ServiceError> for BusError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Bus(inner) => inner,
            other => BusError::Remote {
                error: other.uri().to_string(),
                args: vec![other.to_string().into()],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_remote_uris() {
        let err: BusError = ServiceError::UnknownStation("bar".into()).into();
        match err {
            BusError::Remote { error, args } => {
                assert_eq!(error, "game.error.unknown_station");
                assert_eq!(args, vec![serde_json::json!("unknown station `bar`")]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn bus_errors_pass_through() {
        let err: BusError = ServiceError::Bus(BusError::Closed).into();
        assert!(matches!(err, BusError::Closed));
    }
}
