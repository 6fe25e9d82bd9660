//! # RelayPost Gateway
//! HTTP API for intake and queue operations.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
