//! Graceful shutdown handling.
//!
//! Signal handlers (Ctrl+C, SIGTERM, SIGHUP) flip a watch channel that
//! every transport loop selects on. The server then releases its database
//! connection within a bounded time.

use crate::server::EpicorMcpServer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Receiving half handed to each transport loop.
#[derive(Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolve once shutdown starts; pends forever if the controller is
    /// dropped without signalling.
    pub async fn recv(&mut self) {
        if self.receiver.wait_for(|&v| v).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// Owns the shutdown flag and the bound on closing the database.
pub struct ShutdownController {
    sender: watch::Sender<bool>,
    shutting_down: AtomicBool,
    close_timeout: Duration,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_CLOSE_TIMEOUT)
    }

    pub fn with_timeout(close_timeout: Duration) -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender,
            shutting_down: AtomicBool::new(false),
            close_timeout,
        }
    }

    /// A new receiver for one transport loop.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// True once a signal (or a transport ending) started shutdown.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Signal every listener. Repeated calls are no-ops.
    pub fn shutdown(&self) {
        if self
            .shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Shutting down");
            self.sender.send_replace(true);
        }
    }

    /// Signal shutdown and release the server's database connection.
    pub async fn graceful_shutdown(&self, server: &EpicorMcpServer) {
        self.shutdown();
        if tokio::time::timeout(self.close_timeout, server.shutdown())
            .await
            .is_err()
        {
            warn!(
                "Closing the database connection exceeded {:?}, exiting anyway",
                self.close_timeout
            );
        }
        info!("Graceful shutdown complete");
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn one listener per termination signal, each tripping `controller`.
pub fn install_signal_handlers(controller: Arc<ShutdownController>) {
    let on_interrupt = Arc::clone(&controller);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("SIGINT received");
                on_interrupt.shutdown();
            }
            Err(e) => error!("Cannot listen for SIGINT: {}", e),
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        for (kind, label) in [
            (SignalKind::terminate(), "SIGTERM"),
            (SignalKind::hangup(), "SIGHUP"),
        ] {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move {
                match signal(kind) {
                    Ok(mut stream) => {
                        stream.recv().await;
                        info!("{} received", label);
                        controller.shutdown();
                    }
                    Err(e) => error!("Cannot listen for {}: {}", label, e),
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::RelationshipIndex;

    #[test]
    fn test_shutdown_signal() {
        let controller = ShutdownController::new();
        let signal = controller.signal();
        assert!(!signal.is_shutdown());
        controller.shutdown();
        assert!(signal.is_shutdown());
        assert!(controller.is_shutting_down());
    }

    #[test]
    fn test_shutdown_idempotent() {
        let controller = ShutdownController::new();
        controller.shutdown();
        controller.shutdown();
        assert!(controller.is_shutting_down());
    }

    #[tokio::test]
    async fn test_recv_after_signal() {
        let controller = ShutdownController::new();
        let mut signal = controller.signal();
        controller.shutdown();
        tokio::time::timeout(Duration::from_secs(1), signal.recv())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_graceful_shutdown_without_database() {
        let controller = ShutdownController::with_timeout(Duration::from_secs(1));
        let server = EpicorMcpServer::new(Arc::new(RelationshipIndex::default()), None);
        controller.graceful_shutdown(&server).await;
        assert!(controller.is_shutting_down());
    }
}
