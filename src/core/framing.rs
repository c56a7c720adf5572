//! Dump framing
//!
//! The firmware answers a single trigger byte by printing the log file
//! between two ASCII marker lines:
//!
//! ```text
//! ===BEGIN_LOGS===
//! ...file contents...
//! ===END_LOGS===
//! ```

/// Byte that asks the device to start the dump ('D')
pub const TRIGGER_BYTE: u8 = b'D';

/// Line printed by the device before the payload
pub const BEGIN_MARKER: &[u8] = b"===BEGIN_LOGS===\n";

/// Line printed by the device after the payload
pub const END_MARKER: &[u8] = b"===END_LOGS===\n";

/// Prefix the firmware uses when it cannot open the log file
pub const DEVICE_ERROR_PREFIX: &[u8] = b"ERROR:";

/// Literal substring search
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Incremental search for one marker in a growing buffer.
///
/// Each call resumes `marker.len() - 1` bytes before the point where the
/// previous call stopped, so a marker straddling two reads is still found
/// while bytes that were already ruled out are not scanned again.
#[derive(Debug, Clone)]
pub struct MarkerScanner {
    marker: &'static [u8],
    scanned: usize,
}

impl MarkerScanner {
    /// Create a scanner for `marker`
    pub fn new(marker: &'static [u8]) -> Self {
        Self { marker, scanned: 0 }
    }

    /// The marker being searched for
    pub fn marker(&self) -> &'static [u8] {
        self.marker
    }

    /// Search `buffer` for the marker, returning its start offset.
    ///
    /// `buffer` must be the same accumulator as in previous calls, only
    /// grown at the end. Call [`reset`](Self::reset) after consuming bytes
    /// from its front.
    pub fn scan(&mut self, buffer: &[u8]) -> Option<usize> {
        let overlap = self.marker.len().saturating_sub(1);
        let start = self.scanned.saturating_sub(overlap).min(buffer.len());

        match find(&buffer[start..], self.marker) {
            Some(offset) => Some(start + offset),
            None => {
                self.scanned = buffer.len();
                None
            }
        }
    }

    /// Forget scan progress
    pub fn reset(&mut self) {
        self.scanned = 0;
    }
}

/// Returns the device's error line if the payload is an `ERROR:` report
pub fn device_error(payload: &[u8]) -> Option<String> {
    if !payload.starts_with(DEVICE_ERROR_PREFIX) {
        return None;
    }
    let line = payload
        .split(|&b| b == b'\n')
        .next()
        .unwrap_or(payload);
    Some(String::from_utf8_lossy(line).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_literal() {
        assert_eq!(find(b"abc===END_LOGS===\nxyz", END_MARKER), Some(3));
        assert_eq!(find(b"===END_LOGS===", END_MARKER), None);
        assert_eq!(find(b"", END_MARKER), None);
    }

    #[test]
    fn test_scanner_finds_marker_split_across_appends() {
        let stream = b"{\"a\":1}\n===END_LOGS===\ntrailing";
        for split in 1..stream.len() {
            let mut scanner = MarkerScanner::new(END_MARKER);
            let mut buffer = Vec::new();

            buffer.extend_from_slice(&stream[..split]);
            let first = scanner.scan(&buffer);
            let found = first.or_else(|| {
                buffer.extend_from_slice(&stream[split..]);
                scanner.scan(&buffer)
            });

            assert_eq!(found, Some(8), "split at {split}");
        }
    }

    #[test]
    fn test_scanner_one_byte_at_a_time() {
        let stream = b"noise ===BEGIN_LOGS===\n";
        let mut scanner = MarkerScanner::new(BEGIN_MARKER);
        let mut buffer = Vec::new();
        let mut found = None;

        for &b in stream.iter() {
            buffer.push(b);
            if let Some(pos) = scanner.scan(&buffer) {
                found = Some(pos);
                break;
            }
        }

        assert_eq!(found, Some(6));
    }

    #[test]
    fn test_scanner_reset_after_consume() {
        let mut scanner = MarkerScanner::new(END_MARKER);
        let mut buffer = b"0123456789abcdef".to_vec();
        assert_eq!(scanner.scan(&buffer), None);

        buffer.drain(..10);
        scanner.reset();
        buffer.extend_from_slice(END_MARKER);
        assert_eq!(scanner.scan(&buffer), Some(6));
    }

    #[test]
    fn test_device_error_line() {
        assert_eq!(
            device_error(b"ERROR: /logs.jsonl not found\r\n\r\n"),
            Some("ERROR: /logs.jsonl not found".to_string())
        );
        assert_eq!(device_error(b"{\"a\":1}\n"), None);
    }
}
