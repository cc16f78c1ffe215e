//! One-shot fan-out of the first failure inside a pipe.
//!
//! Every stage of a pipe subscribes to the pipe's [`CancellationBus`] under its own id. The
//! first stage that fails broadcasts its error, which is delivered to every other
//! subscriber, and the bus closes for good. Stages poll their [`CancellationRx`] at the
//! points where they can stop cleanly.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, EtlError, EtlResult};

/// What a subscriber observed on its cancellation channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Cancellation {
    /// Another participant failed with this error.
    Error(EtlError),
    /// The channel was closed without an error, by `close` or `unsubscribe`.
    Closed,
}

impl Cancellation {
    pub fn error(&self) -> Option<&EtlError> {
        match self {
            Cancellation::Error(err) => Some(err),
            Cancellation::Closed => None,
        }
    }
}

/// Receive-only cancellation handle of one subscriber.
#[derive(Debug)]
pub struct CancellationRx {
    id: String,
    rx: mpsc::Receiver<EtlError>,
    observed: Option<Cancellation>,
}

impl CancellationRx {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the pending cancellation without waiting, if any.
    ///
    /// The first observation is cached and returned by every later call.
    pub fn poll(&mut self) -> Option<&Cancellation> {
        if self.observed.is_none() {
            match self.rx.try_recv() {
                Ok(err) => self.observed = Some(Cancellation::Error(err)),
                Err(TryRecvError::Disconnected) => self.observed = Some(Cancellation::Closed),
                Err(TryRecvError::Empty) => {}
            }
        }

        self.observed.as_ref()
    }

    pub fn is_cancelled(&mut self) -> bool {
        self.poll().is_some()
    }

    /// Waits until a cancellation is pending.
    pub async fn cancelled(&mut self) -> &Cancellation {
        if self.observed.is_none() {
            let observed = match self.rx.recv().await {
                Some(err) => Cancellation::Error(err),
                None => Cancellation::Closed,
            };
            self.observed = Some(observed);
        }

        self.observed.get_or_insert(Cancellation::Closed)
    }
}

#[derive(Debug, Default)]
struct Registry {
    /// Senders are dropped once the bus closes; the ids stay known so that late
    /// unsubscribes are accepted.
    subscribers: HashMap<String, Option<mpsc::Sender<EtlError>>>,
    closed: bool,
}

/// Registry of cancellation subscribers, shared by reference between the stages of a pipe.
#[derive(Debug, Default)]
pub struct CancellationBus {
    registry: Mutex<Registry>,
}

impl CancellationBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // The registry is consistent after every operation, so a panic while holding the lock
        // leaves nothing half-updated.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `id` and returns its cancellation handle.
    pub fn subscribe(&self, id: impl Into<String>) -> EtlResult<CancellationRx> {
        let id = id.into();
        let mut registry = self.lock();

        if registry.closed {
            bail!(
                ErrorKind::AlreadyClosed,
                "Cannot subscribe to a closed cancellation bus",
                format!("subscriber '{id}'")
            );
        }

        if registry.subscribers.contains_key(&id) {
            bail!(
                ErrorKind::DuplicateSubscriber,
                "Subscriber already registered",
                format!("subscriber '{id}'")
            );
        }

        // A single error is ever delivered per channel.
        let (tx, rx) = mpsc::channel(1);
        registry.subscribers.insert(id.clone(), Some(tx));

        Ok(CancellationRx {
            id,
            rx,
            observed: None,
        })
    }

    /// Removes `id` and closes its channel.
    ///
    /// On a closed bus the channel is already closed and this is a no-op for known ids.
    pub fn unsubscribe(&self, id: &str) -> EtlResult<()> {
        let mut registry = self.lock();

        if registry.closed {
            if registry.subscribers.contains_key(id) {
                return Ok(());
            }
        } else if registry.subscribers.remove(id).is_some() {
            return Ok(());
        }

        bail!(
            ErrorKind::UnknownSubscriber,
            "Subscriber is not registered",
            format!("subscriber '{id}'")
        );
    }

    /// Delivers `err` to every subscriber other than `source` and closes the bus.
    ///
    /// Returns `false` when the bus was already closed, in which case nothing is delivered.
    pub fn broadcast(&self, source: &str, err: EtlError) -> bool {
        let mut registry = self.lock();

        if registry.closed {
            debug!(source, "cancellation bus already closed, dropping broadcast");
            return false;
        }

        for (id, sender) in registry.subscribers.iter_mut() {
            let Some(sender) = sender.take() else {
                continue;
            };

            if id != source {
                // Capacity is one and nothing else is ever sent, so this cannot be full.
                let _ = sender.try_send(err.clone());
            }
        }
        registry.closed = true;

        debug!(source, %err, "cancellation broadcast");

        true
    }

    /// Closes every remaining channel without delivering a value.
    pub fn close(&self) {
        let mut registry = self.lock();

        for sender in registry.subscribers.values_mut() {
            sender.take();
        }
        registry.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
