pub mod bus;
pub mod health;
pub mod station;
pub mod webhook;
