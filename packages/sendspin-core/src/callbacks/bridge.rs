//! Fans a single callback invocation out to every registered listener.

use std::sync::Arc;

use parking_lot::RwLock;

use super::{PlayerCallbacks, SessionState};
use crate::error::Error;
use crate::protocol::messages::MetadataState;

/// Combines zero or more [`PlayerCallbacks`] implementations behind one
/// handle, so the session loop always calls exactly one object regardless of
/// how many listeners the host has attached.
#[derive(Clone, Default)]
pub struct CallbackBridge {
    listeners: Arc<RwLock<Vec<Arc<dyn PlayerCallbacks>>>>,
}

impl CallbackBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an additional listener. Can be called after construction,
    /// e.g. once a host's UI handle becomes available.
    pub fn register(&self, callbacks: Arc<dyn PlayerCallbacks>) {
        self.listeners.write().push(callbacks);
    }
}

macro_rules! impl_forward {
    ($method:ident($($arg:ident: $ty:ty),*)) => {
        fn $method(&self, $($arg: $ty),*) {
            for listener in self.listeners.read().iter() {
                listener.$method($($arg),*);
            }
        }
    };
}

impl PlayerCallbacks for CallbackBridge {
    impl_forward!(on_error(err: &Error));
    impl_forward!(on_state_change(state: SessionState));
    impl_forward!(on_metadata(metadata: &MetadataState));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);
    impl PlayerCallbacks for Counter {
        fn on_error(&self, _err: &Error) {}
        fn on_state_change(&self, _state: SessionState) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn on_metadata(&self, _metadata: &MetadataState) {}
    }

    #[test]
    fn forwards_to_every_registered_listener() {
        let bridge = CallbackBridge::new();
        let a = Arc::new(Counter(AtomicUsize::new(0)));
        let b = Arc::new(Counter(AtomicUsize::new(0)));
        bridge.register(a.clone());
        bridge.register(b.clone());

        bridge.on_state_change(SessionState::Playing);

        assert_eq!(a.0.load(Ordering::SeqCst), 1);
        assert_eq!(b.0.load(Ordering::SeqCst), 1);
    }
}
