//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! server-side services are instantiated and wired together. This pattern
//! provides:
//!
//! - **Clarity**: all dependency relationships are visible in one place
//! - **Testability**: easy to swap implementations for testing
//! - **Maintainability**: service creation logic is isolated from usage

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::protocol::AudioFormat;
use crate::server::{ClientRegistry, LoopClock, MonotonicClock};

/// Container for all bootstrapped server-side services.
///
/// Consumed by the standalone server binary to build its router and tick
/// loop; every field is wired here rather than constructed ad hoc at each
/// call site.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Tracks connected clients and their outbound queues.
    pub registry: Arc<ClientRegistry>,
    /// Monotonic clock the streaming pipeline stamps chunks with.
    pub clock: Arc<dyn LoopClock>,
    /// Cancellation token for graceful shutdown; cancelling it stops the
    /// tick loop and every connection handler.
    pub cancel_token: CancellationToken,
    /// Native format of the configured `AudioSource`, used by the connection
    /// handler to negotiate each client's codec at registration time.
    pub source_format: AudioFormat,
}

impl BootstrappedServices {
    /// Initiates graceful shutdown: cancels the root token, which cascades
    /// to every connection's child token and the streaming pipeline's tick
    /// loop.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] beginning graceful shutdown");
        self.cancel_token.cancel();
        let closed = self.registry.close_all();
        log::info!("[Bootstrap] closed {closed} connection(s)");
    }
}

/// Bootstraps all server-side services.
///
/// Wiring order:
/// 1. Cancellation token (root for the process lifetime).
/// 2. Client registry (holds per-client queues and negotiated encoders).
/// 3. Loop clock (shared reference the pipeline and registry agree on).
pub fn bootstrap_services(source_format: AudioFormat) -> BootstrappedServices {
    let cancel_token = CancellationToken::new();
    let registry = Arc::new(ClientRegistry::new());
    let clock: Arc<dyn LoopClock> = Arc::new(MonotonicClock::new());

    BootstrappedServices {
        registry,
        clock,
        cancel_token,
        source_format,
    }
}
