//! Application lifecycle abstraction.
//!
//! This module provides a [`Lifecycle`] trait for controlling process-level
//! lifecycle operations like restart and shutdown, decoupled from the concrete
//! mechanism (signal handling, orchestrator restart policy, or a no-op for
//! embedding in tests).

/// Trait for process-level lifecycle operations.
///
/// Services that need to trigger application-level actions (like shutting
/// down after a fatal configuration error) use this trait rather than calling
/// `std::process::exit` directly, so tests can observe the request instead of
/// tearing down the test process.
pub trait Lifecycle: Send + Sync {
    /// Requests a process restart.
    ///
    /// The standalone server does not restart itself; it logs and expects an
    /// external orchestrator (systemd, a container runtime) to restart it.
    fn request_restart(&self);

    /// Requests a graceful shutdown.
    fn request_shutdown(&self);
}

/// Lifecycle implementation for the standalone server process.
pub struct ServerLifecycle;

impl Lifecycle for ServerLifecycle {
    fn request_restart(&self) {
        log::info!("[Lifecycle] restart requested - server requires an external orchestrator restart");
    }

    fn request_shutdown(&self) {
        log::info!("[Lifecycle] shutdown requested");
        std::process::exit(0);
    }
}

/// No-op lifecycle for tests or embedding.
pub struct NoopLifecycle;

impl Lifecycle for NoopLifecycle {
    fn request_restart(&self) {
        log::debug!("[Lifecycle] restart requested (no-op)");
    }

    fn request_shutdown(&self) {
        log::debug!("[Lifecycle] shutdown requested (no-op)");
    }
}
