//! Process-wide shutdown signal
//!
//! Anything may request shutdown (OS signals, the connection manager after a
//! failure, startup errors); only the first request is recorded. The process
//! exits non-zero on a fatal request so the external supervisor restarts it.

use tokio::sync::watch;

/// Why the process is shutting down
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReason {
    pub message: String,
    /// Fatal requests end the process with a failure exit code
    pub fatal: bool,
}

impl ShutdownReason {
    pub fn fatal<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            fatal: true,
        }
    }

    pub fn graceful<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            fatal: false,
        }
    }
}

/// Latching shutdown request shared across tasks
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: watch::Sender<Option<ShutdownReason>>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Request shutdown. Returns `true` if this was the first request.
    pub fn request(&self, reason: ShutdownReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    /// The recorded request, if any
    pub fn requested(&self) -> Option<ShutdownReason> {
        self.tx.borrow().clone()
    }

    pub fn is_requested(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Wait until shutdown is requested
    pub async fn wait(&self) -> ShutdownReason {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(reason) = rx.borrow_and_update().clone() {
                return reason;
            }
            if rx.changed().await.is_err() {
                return ShutdownReason::graceful("shutdown signal dropped");
            }
        }
    }
}
