//! Callback trait decoupling the player session loop from the host
//! application's notification mechanism.

use super::SessionState;
use crate::error::Error;
use crate::protocol::messages::MetadataState;

/// Trait implemented by a host application embedding the player.
///
/// The session loop calls these directly; it has no knowledge of how (or
/// whether) the host surfaces them to a UI.
pub trait PlayerCallbacks: Send + Sync {
    /// A non-fatal error occurred (decode failure, output write error,
    /// dropped chunk). The session continues unless the transport itself
    /// has failed.
    fn on_error(&self, err: &Error);

    /// The session's lifecycle state changed.
    fn on_state_change(&self, state: SessionState);

    /// New track metadata arrived via `server/state`.
    fn on_metadata(&self, metadata: &MetadataState);
}

/// Discards every callback. Used when a host has no notification needs.
pub struct NoopPlayerCallbacks;

impl PlayerCallbacks for NoopPlayerCallbacks {
    fn on_error(&self, _err: &Error) {}
    fn on_state_change(&self, _state: SessionState) {}
    fn on_metadata(&self, _metadata: &MetadataState) {}
}

/// Logs every callback at a level matching its severity. Useful for a
/// headless CLI host or during development.
pub struct LoggingPlayerCallbacks;

impl PlayerCallbacks for LoggingPlayerCallbacks {
    fn on_error(&self, err: &Error) {
        log::warn!("[Player] error: {err}");
    }

    fn on_state_change(&self, state: SessionState) {
        log::info!("[Player] state -> {state:?}");
    }

    fn on_metadata(&self, metadata: &MetadataState) {
        log::debug!(
            "[Player] metadata: title={:?} artist={:?}",
            metadata.title,
            metadata.artist
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCallbacks {
        errors: AtomicUsize,
        state_changes: AtomicUsize,
    }

    impl PlayerCallbacks for CountingCallbacks {
        fn on_error(&self, _err: &Error) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
        fn on_state_change(&self, _state: SessionState) {
            self.state_changes.fetch_add(1, Ordering::SeqCst);
        }
        fn on_metadata(&self, _metadata: &MetadataState) {}
    }

    #[test]
    fn counting_callbacks_tracks_invocations() {
        let callbacks = CountingCallbacks {
            errors: AtomicUsize::new(0),
            state_changes: AtomicUsize::new(0),
        };
        callbacks.on_state_change(SessionState::Buffering);
        callbacks.on_state_change(SessionState::Playing);
        assert_eq!(callbacks.state_changes.load(Ordering::SeqCst), 2);
        assert_eq!(callbacks.errors.load(Ordering::SeqCst), 0);
    }
}
