//! Deferred gas resolution.
//!
//! A workflow that needs a gas value from a human opens a request, then awaits it. The value
//! arrives later through [`GasNegotiator::supply`] from whatever handles inbound commands. At most
//! one request is outstanding per negotiator, a request resolves at most once, and a cancelled
//! request makes the waiter fail instead of hanging.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;
use tracing::{debug, trace};

/// Identifies one gas request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
#[display("gas-request#{_0}")]
pub struct GasHandle(u64);

/// Errors raised by [`GasNegotiator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NegotiationError {
    /// Another request is still waiting for a value
    #[error("a gas request is already pending")]
    RequestAlreadyPending,

    /// The request was cancelled before a value arrived
    #[error("gas request cancelled")]
    GasRequestCancelled,

    /// The handle does not refer to the current request
    #[error("unknown or stale {0}")]
    UnknownRequest(GasHandle),
}

#[derive(Debug)]
struct Pending {
    handle: GasHandle,
    /// `None` once the request was resolved or cancelled.
    sender: Option<oneshot::Sender<u64>>,
    /// `None` once a waiter took it.
    receiver: Option<oneshot::Receiver<u64>>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    pending: Option<Pending>,
}

/// Single-flight, cancellable rendezvous between a workflow and a gas supplier.
#[derive(Debug, Default)]
pub struct GasNegotiator {
    inner: Mutex<Inner>,
}

impl GasNegotiator {
    /// Creates a negotiator with no outstanding request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new request.
    ///
    /// Fails with [`NegotiationError::RequestAlreadyPending`] while a previous request is neither
    /// resolved nor cancelled.
    pub fn request_gas(&self) -> Result<GasHandle, NegotiationError> {
        let mut inner = self.lock();
        if inner.pending.as_ref().is_some_and(|pending| pending.sender.is_some()) {
            return Err(NegotiationError::RequestAlreadyPending);
        }

        inner.next_id += 1;
        let handle = GasHandle(inner.next_id);
        let (sender, receiver) = oneshot::channel();
        inner.pending = Some(Pending { handle, sender: Some(sender), receiver: Some(receiver) });
        debug!(%handle, "Gas request opened");
        Ok(handle)
    }

    /// Waits for the value of `handle`.
    ///
    /// Yields to the runtime until [`Self::supply`] or [`Self::cancel`] is called for the handle.
    /// Only one waiter per request is allowed.
    pub async fn wait(&self, handle: GasHandle) -> Result<u64, NegotiationError> {
        let receiver = {
            let mut inner = self.lock();
            inner
                .pending
                .as_mut()
                .filter(|pending| pending.handle == handle)
                .and_then(|pending| pending.receiver.take())
                .ok_or(NegotiationError::UnknownRequest(handle))?
        };

        let result = receiver.await.map_err(|_| NegotiationError::GasRequestCancelled);

        let mut inner = self.lock();
        if inner.pending.as_ref().is_some_and(|pending| pending.handle == handle) {
            inner.pending = None;
        }
        trace!(%handle, ?result, "Gas request settled");
        result
    }

    /// Resolves `handle` with `gas`.
    ///
    /// Returns whether the value was delivered. Supplying an already resolved, cancelled or
    /// unknown handle does nothing.
    pub fn supply(&self, handle: GasHandle, gas: u64) -> bool {
        let mut inner = self.lock();
        let Some(sender) = inner
            .pending
            .as_mut()
            .filter(|pending| pending.handle == handle)
            .and_then(|pending| pending.sender.take())
        else {
            trace!(%handle, gas, "Ignoring gas for settled request");
            return false;
        };

        debug!(%handle, gas, "Gas supplied");
        sender.send(gas).is_ok()
    }

    /// Cancels `handle` without resolving it. A pending or later [`Self::wait`] fails with
    /// [`NegotiationError::GasRequestCancelled`].
    pub fn cancel(&self, handle: GasHandle) -> bool {
        let mut inner = self.lock();
        let Some(pending) = inner.pending.as_mut().filter(|pending| pending.handle == handle)
        else {
            return false;
        };

        let cancelled = pending.sender.take().is_some();
        if cancelled {
            debug!(%handle, "Gas request cancelled");
        }
        cancelled
    }

    /// The request still waiting for a value, if any.
    pub fn pending(&self) -> Option<GasHandle> {
        self.lock()
            .pending
            .as_ref()
            .filter(|pending| pending.sender.is_some())
            .map(|pending| pending.handle)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // The state stays consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
