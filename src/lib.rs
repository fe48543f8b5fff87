//! Approval Gateway — library crate shared by the binary and integration tests.
//!
//! A hook process drops `<id>.request.json` into a queue directory and waits
//! for `<id>.response.json`. This crate lists what is pending, lets a human
//! decide from a browser or the terminal, and writes the decision back.

use std::sync::Arc;

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod liveness;
pub mod models;
pub mod service;
pub mod store;

use service::ApprovalService;

/// Shared application state passed to handlers.
pub struct AppState {
    pub service: Arc<ApprovalService>,
}

impl AppState {
    pub fn new(service: Arc<ApprovalService>) -> Self {
        Self { service }
    }
}
