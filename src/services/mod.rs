/// Button press/release dispatch for both game variants.
pub mod button_service;
/// Health check service.
pub mod health_service;
/// Badge light/text commands and feedback sequences.
pub mod lights_service;
/// Connection, registration, joins and leaves.
pub mod session_service;
/// Remote procedures of the station game.
pub mod station_service;
/// Topic and procedure names.
pub mod topics;
/// Best-effort webhook delivery of action messages.
pub mod webhook_service;
