//! Virtual Device Simulator
//!
//! A scriptable stand-in for the sensor node's serial port. The device
//! holds a script of replies that is released into the input queue when the
//! host writes the trigger byte, and it records everything the host does to
//! it so tests can assert on writes, flushes, buffer resets and closes.

use super::clock::{Clock, ManualClock};
use super::framing::{BEGIN_MARKER, END_MARKER, TRIGGER_BYTE};
use super::transport::{Transport, TransportError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// One step of the device's output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Bytes delivered by the next read (split if larger than the read buffer)
    Data(Vec<u8>),
    /// Number of consecutive reads that time out empty
    Silence(u32),
    /// Every following read fails with [`TransportError::Disconnected`]
    Disconnect,
}

/// What the host did to the device
#[derive(Debug, Clone, Default)]
pub struct DeviceLog {
    /// All bytes written by the host, in order
    pub written: Vec<u8>,
    /// Number of trigger bytes seen
    pub triggers: usize,
    /// Number of flush calls
    pub flushes: usize,
    /// Number of buffer discards
    pub discards: usize,
    /// Number of close calls
    pub closes: usize,
}

/// Shared view of a [`SimulatedDevice`]'s log that outlives the device
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    log: Arc<Mutex<DeviceLog>>,
}

impl DeviceHandle {
    /// Snapshot of the log
    pub fn log(&self) -> DeviceLog {
        self.log.lock().clone()
    }

    /// Whether the host closed the device at least once
    pub fn is_closed(&self) -> bool {
        self.log.lock().closes > 0
    }
}

/// Scripted in-memory device
pub struct SimulatedDevice<C: Clock = ManualClock> {
    clock: C,
    poll_timeout: Duration,
    inbox: VecDeque<Reply>,
    script: Vec<Reply>,
    closed: bool,
    log: Arc<Mutex<DeviceLog>>,
}

impl<C: Clock> SimulatedDevice<C> {
    /// Create a silent device. Empty reads sleep `clock` for the poll timeout.
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            poll_timeout: Duration::from_secs(1),
            inbox: VecDeque::new(),
            script: Vec::new(),
            closed: false,
            log: Arc::new(Mutex::new(DeviceLog::default())),
        }
    }

    /// Set how long an empty read takes
    #[must_use]
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Bytes already waiting in the input buffer before the host connects
    #[must_use]
    pub fn stale_input(mut self, bytes: &[u8]) -> Self {
        self.inbox.push_back(Reply::Data(bytes.to_vec()));
        self
    }

    /// Replies released every time the trigger byte is written
    #[must_use]
    pub fn on_trigger(mut self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.script.extend(replies);
        self
    }

    /// Reply to the trigger with `stream`, delivered `chunk_size` bytes per read
    #[must_use]
    pub fn respond_chunked(self, stream: &[u8], chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        self.on_trigger(stream.chunks(chunk_size).map(|c| Reply::Data(c.to_vec())))
    }

    /// Handle for inspecting the device after it has been moved into a run
    pub fn handle(&self) -> DeviceHandle {
        DeviceHandle {
            log: Arc::clone(&self.log),
        }
    }
}

impl<C: Clock> Transport for SimulatedDevice<C> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::Disconnected);
        }

        match self.inbox.pop_front() {
            Some(Reply::Data(mut bytes)) if !bytes.is_empty() => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.inbox.push_front(Reply::Data(bytes.split_off(n)));
                }
                Ok(n)
            }
            Some(Reply::Silence(n)) if n > 1 => {
                self.inbox.push_front(Reply::Silence(n - 1));
                self.clock.sleep(self.poll_timeout);
                Ok(0)
            }
            Some(Reply::Disconnect) => {
                self.inbox.push_front(Reply::Disconnect);
                Err(TransportError::Disconnected)
            }
            _ => {
                self.clock.sleep(self.poll_timeout);
                Ok(0)
            }
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Disconnected);
        }

        let mut log = self.log.lock();
        log.written.extend_from_slice(data);
        for _ in data.iter().filter(|&&b| b == TRIGGER_BYTE) {
            log.triggers += 1;
            self.inbox.extend(self.script.iter().cloned());
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.log.lock().flushes += 1;
        Ok(())
    }

    fn discard_buffers(&mut self) -> Result<(), TransportError> {
        self.inbox.clear();
        self.log.lock().discards += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
        self.log.lock().closes += 1;
    }

    fn describe(&self) -> String {
        "simulated device".to_string()
    }
}

/// Wrap `payload` in the dump markers the firmware prints
pub fn framed(payload: &[u8]) -> Vec<u8> {
    let mut stream = Vec::with_capacity(BEGIN_MARKER.len() + payload.len() + END_MARKER.len());
    stream.extend_from_slice(BEGIN_MARKER);
    stream.extend_from_slice(payload);
    stream.extend_from_slice(END_MARKER);
    stream
}
