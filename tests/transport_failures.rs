//! Transport failure paths, checked against a mocked transport

use logdump_core::{
    ExtractOptions, ExtractionError, ManualClock, StreamExtractor, Transport, TransportError,
};
use mockall::mock;
use mockall::predicate::eq;
use mockall::Sequence;

mock! {
    pub Port {}

    impl Transport for Port {
        fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
        fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError>;
        fn flush(&mut self) -> Result<(), TransportError>;
        fn discard_buffers(&mut self) -> Result<(), TransportError>;
        fn close(&mut self);
        fn describe(&self) -> String;
    }
}

fn extractor() -> StreamExtractor<ManualClock> {
    StreamExtractor::with_clock(ExtractOptions::default(), ManualClock::new())
}

fn port() -> MockPort {
    let mut port = MockPort::new();
    port.expect_describe().returning(|| "mock".to_string());
    port
}

#[test]
fn test_trigger_sequence_order() {
    let mut port = port();
    let mut seq = Sequence::new();

    port.expect_discard_buffers()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Ok(()));
    port.expect_write_all()
        .with(eq(b"D".to_vec()))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    port.expect_flush()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Ok(()));
    port.expect_read_chunk()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Err(TransportError::Disconnected));
    port.expect_close().times(1).in_sequence(&mut seq).return_const(());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs.jsonl");
    let err = extractor().extract_from(port, &path).unwrap_err();

    assert!(matches!(err, ExtractionError::Transport(TransportError::Disconnected)));
    assert!(!path.exists());
}

#[test]
fn test_trigger_write_failure_closes_transport() {
    let mut port = port();
    port.expect_discard_buffers().returning(|| Ok(()));
    port.expect_write_all().returning(|_| {
        Err(TransportError::IoError(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "unplugged",
        )))
    });
    port.expect_flush().never();
    port.expect_read_chunk().never();
    port.expect_close().times(1).return_const(());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs.jsonl");
    let err = extractor().extract_from(port, &path).unwrap_err();

    assert!(matches!(err, ExtractionError::Transport(TransportError::IoError(_))));
}

#[test]
fn test_read_delivers_into_caller_buffer() {
    let mut port = port();
    port.expect_discard_buffers().returning(|| Ok(()));
    port.expect_write_all().returning(|_| Ok(()));
    port.expect_flush().returning(|| Ok(()));
    port.expect_read_chunk().times(1).returning(|buf| {
        let stream = b"===BEGIN_LOGS===\n{\"n\":1}\n===END_LOGS===\n";
        buf[..stream.len()].copy_from_slice(stream);
        Ok(stream.len())
    });
    port.expect_close().times(1).return_const(());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs.jsonl");
    let report = extractor().extract_from(port, &path).unwrap();

    assert_eq!(report.bytes_written, 8);
    assert_eq!(std::fs::read(&path).unwrap(), b"{\"n\":1}\n");
}
