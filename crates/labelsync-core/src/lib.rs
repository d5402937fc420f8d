//! labelsync-core - Versioning and sync engine for shared label templates
//!
//! This crate persists snapshots of a template, detects when two editing
//! sessions have diverged, and keeps a long-lived local session informed of
//! remote changes by polling. The remote service is reached through the
//! [`api::TemplateApi`] trait.

pub mod api;
pub mod autosave;
pub mod config;
pub mod conflict;
pub mod coordinator;
pub mod device;
pub mod error;
pub mod models;
pub mod poller;
pub mod session;
pub mod state;
pub mod store;

pub use api::{HttpTemplateClient, TemplateApi};
pub use config::ClientConfig;
pub use device::DeviceId;
pub use error::{Error, Result};
pub use models::{
    ChangeNotification, ChangeType, RemoteSyncStatus, TemplateId, TemplatePayload, Version,
};
pub use session::SyncSession;
pub use state::{SharedSyncState, SyncState};
