//! Shared sync state for one (template, session) pair.
//!
//! `SyncState` is the record the presentation layer reads. It lives in a
//! `watch` channel so observers can subscribe to changes. Writers go through
//! [`SharedSyncState`], which also owns the operation gate that serializes
//! save/sync/restore and the epoch counter that keeps late completions from
//! touching a torn-down session.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, MutexGuard};

use crate::error::{Error, Result};

/// Snapshot of the session's sync status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    /// A save, sync or restore is in flight
    pub is_syncing: bool,
    /// Time of the last successful save, sync or restore
    pub last_sync_time: Option<DateTime<Utc>>,
    /// User-facing message for the last failure
    pub sync_error: Option<String>,
    /// Local edits exist that have not been pushed
    pub needs_sync: bool,
    pub has_conflict: bool,
    pub conflict_message: Option<String>,
}

/// Cloneable handle to the single mutable record of a session.
#[derive(Clone)]
pub struct SharedSyncState {
    inner: Arc<Inner>,
}

struct Inner {
    state: watch::Sender<SyncState>,
    gate: Mutex<()>,
    epoch: AtomicU64,
    closed: AtomicBool,
}

impl Default for SharedSyncState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedSyncState {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self {
            inner: Arc::new(Inner {
                state,
                gate: Mutex::new(()),
                epoch: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Current state.
    pub fn snapshot(&self) -> SyncState {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    pub fn is_syncing(&self) -> bool {
        self.inner.state.borrow().is_syncing
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Record that local edits exist which have not been pushed yet.
    pub fn mark_dirty(&self) {
        self.update_if_current(self.epoch(), |state| state.needs_sync = true);
    }

    /// Acknowledge a reported conflict after the user reviewed it.
    pub fn clear_conflict(&self) {
        self.update_if_current(self.epoch(), |state| {
            state.has_conflict = false;
            state.conflict_message = None;
        });
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::Acquire)
    }

    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        !self.is_closed() && self.epoch() == epoch
    }

    /// Apply `update` only while `epoch` is still the live epoch.
    ///
    /// Returns whether the update was applied.
    pub(crate) fn update_if_current(
        &self,
        epoch: u64,
        update: impl FnOnce(&mut SyncState),
    ) -> bool {
        if !self.is_current(epoch) {
            tracing::debug!(epoch, "Ignoring stale sync state update");
            return false;
        }
        self.inner.state.send_modify(update);
        true
    }

    /// Record a failure message for the live epoch.
    pub(crate) fn record_error(&self, epoch: u64, error: &Error) {
        let message = error.user_message();
        self.update_if_current(epoch, |state| state.sync_error = Some(message));
    }

    /// Retire the state when its session ends.
    ///
    /// Updates carrying an earlier epoch are ignored from here on, and new
    /// operations fail with `Error::SessionClosed`.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        self.inner.state.send_modify(|state| state.is_syncing = false);
    }

    /// Wait for the operation gate and mark an operation in flight.
    pub(crate) async fn begin_flight(&self) -> Result<Flight<'_>> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        let permit = self.inner.gate.lock().await;
        self.open_flight(permit)
    }

    /// Mark an operation in flight unless another one already is.
    pub(crate) fn try_begin_flight(&self) -> Option<Flight<'_>> {
        if self.is_closed() || self.is_syncing() {
            return None;
        }
        let permit = self.inner.gate.try_lock().ok()?;
        self.open_flight(permit).ok()
    }

    fn open_flight<'a>(&'a self, permit: MutexGuard<'a, ()>) -> Result<Flight<'a>> {
        let epoch = self.epoch();
        if !self.update_if_current(epoch, |state| state.is_syncing = true) {
            return Err(Error::SessionClosed);
        }
        Ok(Flight {
            state: self,
            epoch,
            _permit: permit,
        })
    }
}

/// One save/sync/restore in flight. Dropping it clears `is_syncing`.
pub(crate) struct Flight<'a> {
    state: &'a SharedSyncState,
    epoch: u64,
    _permit: MutexGuard<'a, ()>,
}

impl Flight<'_> {
    pub(crate) const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Stamp a successful round-trip, then apply `update`.
    pub(crate) fn succeed(&self, update: impl FnOnce(&mut SyncState)) -> bool {
        self.state.update_if_current(self.epoch, |state| {
            state.last_sync_time = Some(Utc::now());
            state.needs_sync = false;
            state.sync_error = None;
            update(state);
        })
    }

    pub(crate) fn fail(&self, error: &Error) {
        self.state.record_error(self.epoch, error);
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        self.state
            .update_if_current(self.epoch, |state| state.is_syncing = false);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn starts_with_all_defaults() {
        let shared = SharedSyncState::new();
        assert_eq!(shared.snapshot(), SyncState::default());
        assert!(!shared.is_closed());
    }

    #[tokio::test]
    async fn flight_toggles_is_syncing() {
        let shared = SharedSyncState::new();
        {
            let flight = shared.begin_flight().await.unwrap();
            assert!(shared.is_syncing());
            flight.succeed(|_| {});
        }
        let state = shared.snapshot();
        assert!(!state.is_syncing);
        assert!(state.last_sync_time.is_some());
    }

    #[tokio::test]
    async fn try_begin_is_refused_while_in_flight() {
        let shared = SharedSyncState::new();
        let flight = shared.begin_flight().await.unwrap();
        assert!(shared.try_begin_flight().is_none());
        drop(flight);
        assert!(shared.try_begin_flight().is_some());
    }

    #[tokio::test]
    async fn close_discards_late_completion() {
        let shared = SharedSyncState::new();
        let flight = shared.begin_flight().await.unwrap();
        shared.close();

        assert!(!flight.succeed(|state| state.has_conflict = true));
        flight.fail(&Error::Transport("late".to_string()));
        drop(flight);

        let state = shared.snapshot();
        assert!(!state.is_syncing);
        assert!(!state.has_conflict);
        assert_eq!(state.sync_error, None);
        assert_eq!(state.last_sync_time, None);
    }

    #[tokio::test]
    async fn begin_after_close_is_rejected() {
        let shared = SharedSyncState::new();
        shared.close();
        assert!(matches!(shared.begin_flight().await, Err(Error::SessionClosed)));
        assert!(shared.try_begin_flight().is_none());
    }

    #[test]
    fn mark_dirty_and_clear_conflict() {
        let shared = SharedSyncState::new();
        shared.mark_dirty();
        shared.update_if_current(shared.epoch(), |state| {
            state.has_conflict = true;
            state.conflict_message = Some("review".to_string());
        });
        shared.clear_conflict();

        let state = shared.snapshot();
        assert!(state.needs_sync);
        assert!(!state.has_conflict);
        assert_eq!(state.conflict_message, None);
    }

    #[tokio::test]
    async fn subscribers_observe_changes() {
        let shared = SharedSyncState::new();
        let mut receiver = shared.subscribe();
        shared.mark_dirty();
        receiver.changed().await.unwrap();
        assert!(receiver.borrow().needs_sync);
    }
}
