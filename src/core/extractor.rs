//! Stream extractor
//!
//! Pulls the log dump off the device:
//! 1. reset both transport buffers and let the device settle
//! 2. send the trigger byte
//! 3. poll the transport, accumulating bytes until the begin marker shows up
//! 4. keep accumulating until the end marker shows up, or until the line has
//!    been quiet for the quiet period
//! 5. write the payload to the destination in one atomic step
//!
//! Marker search always runs against the whole accumulator, so markers split
//! across reads are found as soon as their last byte arrives.

use super::clock::{Clock, SystemClock};
use super::framing::{self, MarkerScanner, BEGIN_MARKER, END_MARKER, TRIGGER_BYTE};
use super::payload;
use super::transport::{SerialConfig, SerialTransport, Transport, TransportError, TransportGuard};
use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Extraction state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtractionState {
    /// Trigger sent, begin marker not seen yet
    WaitingForBegin,
    /// Inside the payload, end marker not seen yet
    Streaming,
    /// Payload captured
    Done,
    /// Run aborted
    Failed,
}

impl ExtractionState {
    /// Check if state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Timing knobs for one extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    /// How long to wait for the begin marker
    #[serde(with = "crate::config::duration_ms")]
    pub overall_timeout: Duration,
    /// Continuous silence after which a dump without end marker is accepted
    #[serde(with = "crate::config::duration_ms")]
    pub quiet_period: Duration,
    /// Pause between resetting the buffers and sending the trigger
    #[serde(with = "crate::config::duration_ms")]
    pub settle_delay: Duration,
    /// Maximum bytes requested per read
    pub read_chunk_size: usize,
}

impl ExtractOptions {
    /// Default wait for the begin marker
    pub const DEFAULT_OVERALL_TIMEOUT: Duration = Duration::from_secs(10);
    /// Default quiet period
    pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(2);
    /// Default settle delay
    pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);
    /// Default read size
    pub const DEFAULT_READ_CHUNK_SIZE: usize = 256;

    /// Set the begin marker timeout
    #[must_use]
    pub fn overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = timeout;
        self
    }

    /// Set the quiet period
    #[must_use]
    pub fn quiet_period(mut self, period: Duration) -> Self {
        self.quiet_period = period;
        self
    }

    /// Set the settle delay
    #[must_use]
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the read size
    #[must_use]
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            overall_timeout: Self::DEFAULT_OVERALL_TIMEOUT,
            quiet_period: Self::DEFAULT_QUIET_PERIOD,
            settle_delay: Self::DEFAULT_SETTLE_DELAY,
            read_chunk_size: Self::DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

/// Extraction error types
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// Port could not be opened; the loop never ran
    #[error("Cannot open transport: {0}")]
    TransportOpen(#[source] TransportError),

    /// Begin marker never arrived
    #[error("Timed out after {:.1}s waiting for the device to start the dump", .0.as_secs_f64())]
    DeviceTimeout(Duration),

    /// Begin marker arrived, then nothing at all before the line went quiet
    #[error("Device started the dump but sent no data")]
    NoPayload,

    /// Read, write or flush failed after the port was opened
    #[error("Transport failed during transfer: {0}")]
    Transport(#[source] TransportError),

    /// Destination could not be written
    #[error("Cannot write payload to {}: {source}", path.display())]
    PayloadWrite {
        /// Destination path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Cancel flag was raised
    #[error("Extraction cancelled")]
    Cancelled,
}

/// Non-fatal conditions attached to a successful run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionWarning {
    /// End marker never seen; the payload is everything after the begin
    /// marker and may be truncated
    IncompleteTransfer,
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncompleteTransfer => write!(f, "no end marker found, data may be truncated"),
        }
    }
}

/// Result of a successful extraction
#[derive(Debug, Clone, Serialize)]
pub struct ExtractReport {
    /// Where the payload was written
    pub path: PathBuf,
    /// Payload size
    pub bytes_written: usize,
    /// Set when the fallback path produced the payload
    pub warning: Option<ExtractionWarning>,
    /// Error line the firmware sent instead of log data
    pub device_error: Option<String>,
    /// Time from trigger to payload
    #[serde(serialize_with = "crate::config::duration_ms::serialize")]
    pub elapsed: Duration,
}

impl ExtractReport {
    /// True when the end marker was seen
    pub fn is_complete(&self) -> bool {
        self.warning.is_none()
    }
}

/// How the receive loop ended
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Complete(Bytes),
    Incomplete(Bytes),
}

/// State of a single run: accumulator, scanners and deadlines
struct Extraction {
    state: ExtractionState,
    buffer: BytesMut,
    begin: MarkerScanner,
    end: MarkerScanner,
    begin_deadline: Option<Instant>,
    quiet_deadline: Option<Instant>,
    quiet_period: Duration,
}

impl Extraction {
    fn new(now: Instant, options: &ExtractOptions) -> Self {
        Self {
            state: ExtractionState::WaitingForBegin,
            buffer: BytesMut::with_capacity(options.read_chunk_size * 4),
            begin: MarkerScanner::new(BEGIN_MARKER),
            end: MarkerScanner::new(END_MARKER),
            // A timeout too large to represent means no deadline
            begin_deadline: now.checked_add(options.overall_timeout),
            quiet_deadline: None,
            quiet_period: options.quiet_period,
        }
    }

    fn on_data(&mut self, data: &[u8]) -> Option<Outcome> {
        if self.state.is_terminal() {
            return None;
        }

        self.quiet_deadline = None;
        self.buffer.extend_from_slice(data);

        if self.state == ExtractionState::WaitingForBegin {
            match self.begin.scan(&self.buffer) {
                Some(pos) => {
                    self.buffer.advance(pos + BEGIN_MARKER.len());
                    self.state = ExtractionState::Streaming;
                    self.begin_deadline = None;
                    tracing::info!("Begin marker received, streaming");
                }
                None => {
                    // Only a marker prefix can matter here
                    let keep = BEGIN_MARKER.len() - 1;
                    if self.buffer.len() > keep {
                        self.buffer.advance(self.buffer.len() - keep);
                        self.begin.reset();
                    }
                    return None;
                }
            }
        }

        let pos = self.end.scan(&self.buffer)?;
        let payload = self.buffer.split_to(pos).freeze();
        self.buffer.clear();
        self.state = ExtractionState::Done;
        Some(Outcome::Complete(payload))
    }

    fn on_silence(&mut self, now: Instant) -> Option<Outcome> {
        if self.state != ExtractionState::Streaming {
            return None;
        }

        match self.quiet_deadline {
            None => {
                self.quiet_deadline = now.checked_add(self.quiet_period);
                None
            }
            Some(deadline) if now >= deadline => {
                self.state = ExtractionState::Done;
                Some(Outcome::Incomplete(self.buffer.split().freeze()))
            }
            Some(_) => None,
        }
    }

    fn begin_timed_out(&mut self, now: Instant) -> bool {
        let expired = self.state == ExtractionState::WaitingForBegin
            && self.begin_deadline.is_some_and(|deadline| now >= deadline);
        if expired {
            self.state = ExtractionState::Failed;
        }
        expired
    }
}

/// Drives one dump from trigger to saved file
pub struct StreamExtractor<C: Clock = SystemClock> {
    options: ExtractOptions,
    clock: C,
    cancel: Option<Arc<AtomicBool>>,
}

impl StreamExtractor<SystemClock> {
    /// Create an extractor using the wall clock
    pub fn new(options: ExtractOptions) -> Self {
        Self::with_clock(options, SystemClock)
    }
}

impl<C: Clock> StreamExtractor<C> {
    /// Create an extractor reading time from `clock`
    pub fn with_clock(options: ExtractOptions, clock: C) -> Self {
        Self {
            options,
            clock,
            cancel: None,
        }
    }

    /// Abort the run with [`ExtractionError::Cancelled`] once `flag` is set
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Options in effect
    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Open the serial port described by `config` and extract to `destination`
    pub fn extract(
        &self,
        config: &SerialConfig,
        destination: &Path,
    ) -> Result<ExtractReport, ExtractionError> {
        let transport =
            SerialTransport::open(config.clone()).map_err(ExtractionError::TransportOpen)?;
        self.extract_from(transport, destination)
    }

    /// Extract over an already open transport. The transport is closed
    /// before this returns, whatever the outcome.
    pub fn extract_from<T: Transport>(
        &self,
        transport: T,
        destination: &Path,
    ) -> Result<ExtractReport, ExtractionError> {
        let started = self.clock.now();

        let outcome = {
            let mut transport = TransportGuard::new(transport);
            self.request_dump(&mut *transport)
                .map_err(ExtractionError::Transport)?;
            self.receive(&mut *transport)?
        };

        let (payload, warning) = match outcome {
            Outcome::Complete(payload) => (payload, None),
            Outcome::Incomplete(payload) if payload.is_empty() => {
                tracing::warn!("Begin marker seen but no data followed");
                return Err(ExtractionError::NoPayload);
            }
            Outcome::Incomplete(payload) => {
                tracing::warn!(
                    "No end marker after {:?} of silence, keeping {} bytes",
                    self.options.quiet_period,
                    payload.len()
                );
                (payload, Some(ExtractionWarning::IncompleteTransfer))
            }
        };

        let device_error = framing::device_error(&payload);
        if let Some(ref message) = device_error {
            tracing::warn!("Device reported: {}", message);
        }

        payload::write_atomic(destination, &payload).map_err(|source| {
            ExtractionError::PayloadWrite {
                path: destination.to_path_buf(),
                source,
            }
        })?;

        tracing::info!("Saved {} bytes to {}", payload.len(), destination.display());

        Ok(ExtractReport {
            path: destination.to_path_buf(),
            bytes_written: payload.len(),
            warning,
            device_error,
            elapsed: self.clock.now().saturating_duration_since(started),
        })
    }

    fn request_dump<T: Transport>(&self, transport: &mut T) -> Result<(), TransportError> {
        tracing::info!("Requesting dump from {}", transport.describe());

        transport.discard_buffers()?;
        self.clock.sleep(self.options.settle_delay);
        transport.write_all(&[TRIGGER_BYTE])?;
        transport.flush()
    }

    fn receive<T: Transport>(&self, transport: &mut T) -> Result<Outcome, ExtractionError> {
        let mut run = Extraction::new(self.clock.now(), &self.options);
        let mut chunk = vec![0u8; self.options.read_chunk_size.max(1)];

        loop {
            if self.is_cancelled() {
                tracing::warn!("Extraction cancelled in state {:?}", run.state);
                return Err(ExtractionError::Cancelled);
            }

            if run.begin_timed_out(self.clock.now()) {
                tracing::warn!("Timed out waiting for device to respond");
                return Err(ExtractionError::DeviceTimeout(self.options.overall_timeout));
            }

            let n = transport
                .read_chunk(&mut chunk)
                .map_err(ExtractionError::Transport)?;

            let outcome = if n == 0 {
                run.on_silence(self.clock.now())
            } else {
                tracing::debug!("Received {} bytes", n);
                run.on_data(&chunk[..n])
            };

            if let Some(outcome) = outcome {
                return Ok(outcome);
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

/// Extract from the serial port in `config` to `destination` with the
/// given timeouts and default settle delay and read size.
pub fn extract(
    config: &SerialConfig,
    destination: &Path,
    overall_timeout: Duration,
    quiet_period: Duration,
) -> Result<ExtractReport, ExtractionError> {
    let options = ExtractOptions::default()
        .overall_timeout(overall_timeout)
        .quiet_period(quiet_period);
    StreamExtractor::new(options).extract(config, destination)
}
