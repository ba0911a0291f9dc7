// Library crate: the binary in main.rs and the integration tests both build on it.

pub mod bus;
pub mod calculation;
pub mod collaborators;
pub mod config;
pub mod coverage;
pub mod error;
pub mod report;
pub mod routes;
pub mod server;
pub mod state;
