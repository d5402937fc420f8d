//! labelsync-api - Reference implementation of the template service.
//!
//! Keeps an append-only version history per template in memory, answers
//! sync requests with a conflict verdict, and serves a short-lived change
//! feed.

pub mod config;
pub mod error;
pub mod repository;
pub mod routes;

pub use config::AppConfig;
pub use routes::{app_router, AppState};
