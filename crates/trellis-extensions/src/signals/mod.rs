//! Synchronous, best-effort lifecycle notifications.
//!
//! Other parts of the host subscribe to the [`SignalHub`] to observe
//! enable/disable/initialize/uninitialize transitions and settings saves.
//! Delivery follows send-robust semantics: a failing receiver is logged and
//! skipped, never disturbing the sender or the remaining receivers.

use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::warn;

/// Tracing target for signal dispatch.
const SIGNALS_TARGET: &str = "trellis_extensions::signals";

/// Lifecycle notifications emitted by the extension manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionEvent {
    /// An extension finished enabling.
    Enabled {
        /// Extension id.
        id: String,
    },
    /// An extension finished disabling.
    Disabled {
        /// Extension id.
        id: String,
    },
    /// An extension instance completed initialization in this process.
    Initialized {
        /// Extension id.
        id: String,
    },
    /// An extension instance was torn down in this process.
    Uninitialized {
        /// Extension id.
        id: String,
    },
    /// An extension's settings were persisted.
    SettingsSaved {
        /// Extension id.
        id: String,
    },
    /// Caches indexing template tags/modules must be rebuilt because an
    /// extension's contributions changed.
    TemplateCachesStale {
        /// Extension id.
        id: String,
    },
}

impl ExtensionEvent {
    /// Returns the extension id the event refers to.
    #[must_use]
    pub const fn extension_id(&self) -> &str {
        match self {
            Self::Enabled { id }
            | Self::Disabled { id }
            | Self::Initialized { id }
            | Self::Uninitialized { id }
            | Self::SettingsSaved { id }
            | Self::TemplateCachesStale { id } => id.as_str(),
        }
    }
}

/// Error a receiver may report; dispatch logs it and continues.
#[derive(Debug, Error)]
#[error("signal receiver failed: {message}")]
pub struct SignalError {
    /// Description of the receiver failure.
    message: String,
}

impl SignalError {
    /// Creates a receiver error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A subscribed receiver callback.
type Receiver = Box<dyn Fn(&ExtensionEvent) -> Result<(), SignalError> + Send + Sync>;

/// Handle identifying a subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// Dispatches extension lifecycle events to subscribed receivers.
#[derive(Default)]
pub struct SignalHub {
    receivers: Mutex<Vec<(u64, Receiver)>>,
    next_id: Mutex<u64>,
}

impl std::fmt::Debug for SignalHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let receivers = self
            .receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("SignalHub")
            .field("receivers", &receivers.len())
            .finish()
    }
}

impl SignalHub {
    /// Creates a hub with no receivers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a receiver, returning a handle for unsubscription.
    pub fn subscribe<F>(&self, receiver: F) -> SubscriptionId
    where
        F: Fn(&ExtensionEvent) -> Result<(), SignalError> + Send + Sync + 'static,
    {
        let mut next_id = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
        let id = *next_id;
        *next_id += 1;
        drop(next_id);

        let mut receivers = self
            .receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        receivers.push((id, Box::new(receiver)));
        SubscriptionId(id)
    }

    /// Removes a subscription; unknown handles are ignored.
    pub fn unsubscribe(&self, subscription: SubscriptionId) {
        let mut receivers = self
            .receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        receivers.retain(|(id, _)| *id != subscription.0);
    }

    /// Delivers an event to every receiver, logging and skipping failures.
    pub fn emit(&self, event: &ExtensionEvent) {
        let receivers = self
            .receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for (id, receiver) in receivers.iter() {
            if let Err(error) = receiver(event) {
                warn!(
                    target: SIGNALS_TARGET,
                    receiver = id,
                    extension = event.extension_id(),
                    error = %error,
                    "signal receiver failed"
                );
            }
        }
    }
}
