//! Library crate for badge-games, exposing modules for the binary and integration tests.

pub mod bus;
pub mod config;
pub mod dto;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
