//! Port registry
//!
//! Transports are registered once and addressed afterwards by a
//! [`PortHandle`]. Each entry is a [`ProtectedPort`]: a mutex around the
//! transport so that one request/response exchange completes before the next
//! one starts, plus a single slot for a background operation.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{ProtocolError, SerialTransport};

/// Index of a registered port. Handles are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortHandle(usize);

impl PortHandle {
    /// Rebuild a handle from a stored index; validity is checked on use
    pub fn from_index(index: usize) -> Self {
        Self(index)
    }

    /// Position in the registry
    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for PortHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "port#{}", self.0)
    }
}

/// Clears the in-flight flag when the background closure ends
struct InFlightSlot<'a>(&'a AtomicBool);

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A transport behind a mutex
pub struct ProtectedPort {
    transport: Mutex<SerialTransport>,
    in_flight: AtomicBool,
}

impl ProtectedPort {
    /// Wrap a transport
    pub fn new(transport: SerialTransport) -> Self {
        Self {
            transport: Mutex::new(transport),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Exclusive access to the transport.
    ///
    /// A panic while another holder had the lock does not leave the port unusable.
    pub fn lock(&self) -> MutexGuard<'_, SerialTransport> {
        self.transport
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether a background operation is running
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn spawn<T, F>(self: &Arc<Self>, op: F) -> Result<AsyncOperation<T>, ProtocolError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SerialTransport, &CancellationToken) -> Result<T, ProtocolError>
            + Send
            + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ProtocolError::SerialError(format!("no async runtime: {}", e)))?;

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ProtocolError::OperationInFlight);
        }

        let token = CancellationToken::new();
        let child = token.clone();
        let port = Arc::clone(self);
        let handle = runtime.spawn_blocking(move || {
            let _slot = InFlightSlot(&port.in_flight);
            let mut transport = port.lock();
            op(&mut transport, &child)
        });

        Ok(AsyncOperation { handle, token })
    }

    /// Background [`SerialTransport::read_string`]
    pub fn async_read_string(
        self: &Arc<Self>,
        max_len: usize,
    ) -> Result<AsyncOperation<String>, ProtocolError> {
        self.spawn(move |t, cancel| t.read_string_cancellable(max_len, Some(cancel)))
    }

    /// Background [`SerialTransport::read_until`]
    pub fn async_read_until(
        self: &Arc<Self>,
        terminator: impl Into<String>,
        max_len: usize,
    ) -> Result<AsyncOperation<String>, ProtocolError> {
        let terminator = terminator.into();
        self.spawn(move |t, cancel| t.read_until_cancellable(&terminator, max_len, Some(cancel)))
    }

    /// Background [`SerialTransport::write_string`]
    pub fn async_write_string(
        self: &Arc<Self>,
        data: impl Into<String>,
    ) -> Result<AsyncOperation<usize>, ProtocolError> {
        let data = data.into();
        self.spawn(move |t, cancel| t.write_string_cancellable(&data, Some(cancel)))
    }
}

/// A transport call running on the blocking thread pool
pub struct AsyncOperation<T> {
    handle: JoinHandle<Result<T, ProtocolError>>,
    token: CancellationToken,
}

impl<T> AsyncOperation<T> {
    /// Ask the operation to stop at its next poll; `join` then yields [`ProtocolError::Cancelled`]
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the blocking task has returned
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the result
    pub async fn join(self) -> Result<T, ProtocolError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(ProtocolError::SerialError(format!(
                "background operation failed: {}",
                e
            ))),
        }
    }
}

/// Append-only table of ports, shared through `Arc`
#[derive(Default)]
pub struct PortRegistry {
    ports: RwLock<Vec<Arc<ProtectedPort>>>,
}

impl PortRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transport and return its handle
    pub fn register(&self, transport: SerialTransport) -> PortHandle {
        let mut ports = self.ports.write().unwrap_or_else(|p| p.into_inner());
        tracing::debug!("Registering {} as port#{}", transport.port_name(), ports.len());
        ports.push(Arc::new(ProtectedPort::new(transport)));
        PortHandle(ports.len() - 1)
    }

    /// Look up a port
    pub fn get(&self, handle: PortHandle) -> Result<Arc<ProtectedPort>, ProtocolError> {
        let ports = self.ports.read().unwrap_or_else(|p| p.into_inner());
        ports
            .get(handle.0)
            .cloned()
            .ok_or(ProtocolError::InvalidPortHandle {
                index: handle.0,
                len: ports.len(),
            })
    }

    /// Run `f` with the port locked
    pub fn with_port<R>(
        &self,
        handle: PortHandle,
        f: impl FnOnce(&mut SerialTransport) -> R,
    ) -> Result<R, ProtocolError> {
        let port = self.get(handle)?;
        let mut transport = port.lock();
        Ok(f(&mut transport))
    }

    /// Number of registered ports
    pub fn len(&self) -> usize {
        self.ports.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Whether no port is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every handle issued so far
    pub fn handles(&self) -> Vec<PortHandle> {
        (0..self.len()).map(PortHandle).collect()
    }
}
