//! Deep-link listener
//!
//! Feeds URLs that re-enter the client while it runs into the manager, one at
//! a time and in arrival order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::SessionError;
use crate::manager::{Outcome, SessionManager};
use crate::Result;

/// Registration handle. Dropping it stops the listener after the URL being
/// handled, if any, has finished.
pub struct DeepLinkListener {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

/// Held by the listener task; frees the manager's listener slot when the
/// task ends, however it ends.
struct Registration(Arc<AtomicBool>);

impl Drop for Registration {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SessionManager {
    /// Start routing `urls` to [`SessionManager::handle_incoming_url`].
    ///
    /// Only one listener may be registered per manager. Must be called within
    /// a Tokio runtime.
    pub fn listen(&self, mut urls: mpsc::Receiver<String>) -> Result<DeepLinkListener> {
        if self
            .listener_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::ListenerAlreadyRegistered);
        }

        let registration = Registration(Arc::clone(&self.listener_active));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let manager = self.clone();

        let handle = tokio::spawn(async move {
            let _registration = registration;
            tracing::debug!("Deep-link listener started");
            loop {
                let url = tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    url = urls.recv() => match url {
                        Some(url) => url,
                        None => break,
                    },
                };

                match manager.handle_incoming_url(&url).await {
                    Outcome::Authenticated(user) => {
                        tracing::debug!(user_id = %user.id, "Deep link signed in")
                    }
                    Outcome::Guest => tracing::debug!("Deep link left client as guest"),
                    Outcome::Ignored => tracing::trace!("Deep link ignored"),
                }
            }
            tracing::debug!("Deep-link listener stopped");
        });

        Ok(DeepLinkListener {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }
}

impl DeepLinkListener {
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop and wait for the URL in progress to finish
    pub async fn close(mut self) {
        self.signal();
        self.wait().await;
    }

    /// Wait for the listener to run dry. Returns once every sender has been
    /// dropped and the queued URLs have been handled.
    pub async fn join(mut self) {
        self.wait().await;
    }

    async fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Deep-link listener ended abnormally");
            }
        }
    }

    fn signal(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            // Task already gone when the receiver is closed
            let _ = tx.send(());
        }
    }
}

impl Drop for DeepLinkListener {
    fn drop(&mut self) {
        self.signal();
    }
}
