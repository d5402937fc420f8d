//! Session-scoped device identity used to attribute saves, syncs and
//! change notifications.
//!
//! The token carries no authentication weight. It is either supplied by the
//! caller or generated once and held for the lifetime of the owning session.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::non_blank;

const GENERATED_PREFIX: &str = "device-";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Generate a fresh pseudo-random token.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("{GENERATED_PREFIX}{}", Uuid::now_v7().simple()))
    }

    /// Use the supplied token when it is non-blank, otherwise generate one.
    #[must_use]
    pub fn resolve(supplied: Option<String>) -> Self {
        non_blank(supplied).map_or_else(Self::generate, Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
