//! Byte transport between host and device
//!
//! The extractor talks to the device through the [`Transport`] trait:
//! - [`SerialTransport`] for real hardware
//! - [`SimulatedDevice`](crate::core::simulator::SimulatedDevice) for tests

mod serial;

pub use serial::{list_ports, SerialConfig, SerialTransport};

use std::ops::{Deref, DerefMut};
use thiserror::Error;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Port could not be opened or configured
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Device went away mid-transfer
    #[error("Disconnected")]
    Disconnected,
}

/// Polling byte transport.
///
/// All calls block the calling thread; none may block longer than the
/// transport's per-read poll timeout.
pub trait Transport {
    /// Read whatever is available into `buf`.
    ///
    /// Returns `Ok(0)` when the poll timeout expires with no data.
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Write all of `data`
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Push buffered output to the device
    fn flush(&mut self) -> Result<(), TransportError>;

    /// Drop anything pending in both the input and output buffers
    fn discard_buffers(&mut self) -> Result<(), TransportError>;

    /// Release the underlying connection. Must be safe to call more than once.
    fn close(&mut self);

    /// Human readable connection description
    fn describe(&self) -> String;
}

/// Owns a transport for one run and closes it when dropped
pub struct TransportGuard<T: Transport> {
    inner: T,
}

impl<T: Transport> TransportGuard<T> {
    /// Take ownership of an open transport
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<T: Transport> Deref for TransportGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: Transport> DerefMut for TransportGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: Transport> Drop for TransportGuard<T> {
    fn drop(&mut self) {
        tracing::debug!("Closing {}", self.inner.describe());
        self.inner.close();
    }
}
