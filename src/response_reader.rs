//! Accumulate a carriage return terminated reply one byte at a time.

use std::time::Duration;

use crate::{
    error::{DomeError, DomeResult},
    transport::Transport,
};

/// Reply buffer of the classic controller, terminator included.
pub const SERIAL_BUFFER_SIZE: usize = 20;
/// Per byte read budget.
pub const MAX_TIMEOUT: Duration = Duration::from_millis(5000);

const CR: u8 = 0x0D;

#[derive(Debug)]
pub struct ResponseReader {
    buffer: Vec<u8>,
    capacity: usize,
    timeout: Duration,
}

impl Default for ResponseReader {
    fn default() -> ResponseReader {
        ResponseReader::new(SERIAL_BUFFER_SIZE, MAX_TIMEOUT)
    }
}

impl ResponseReader {
    pub fn new(capacity: usize, timeout: Duration) -> ResponseReader {
        ResponseReader {
            buffer: Vec::with_capacity(capacity),
            capacity,
            timeout,
        }
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Bytes accumulated by the last read. Always empty after a failure.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Read one line with the terminator stripped.
    pub fn read_line(&mut self, transport: &mut dyn Transport) -> DomeResult<String> {
        self.buffer.clear();
        let line = self.accumulate(transport);
        if line.is_err() {
            self.buffer.clear();
        }
        line
    }

    fn accumulate(&mut self, transport: &mut dyn Transport) -> DomeResult<String> {
        let mut byte = [0u8; 1];
        loop {
            match transport.read(&mut byte, self.timeout)? {
                0 => {
                    log::debug!("Read timed out after {} bytes.", self.buffer.len());
                    return Err(DomeError::Timeout);
                }
                1 => {}
                n_bytes => {
                    return Err(DomeError::TransportFailure(format!(
                        "Read returned {n_bytes} bytes; expected 1."
                    )))
                }
            }

            if byte[0] == CR {
                return String::from_utf8(self.buffer.clone()).map_err(|error| {
                    DomeError::ParseFailure(format!("Reply is not ASCII: {error}"))
                });
            }

            self.buffer.push(byte[0]);
            if self.buffer.len() >= self.capacity {
                log::debug!("Reply exceeds {} bytes: {:?}", self.capacity, self.buffer);
                return Err(DomeError::ResponseTooLong);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{scripted::ScriptedTransport, LinkSettings};

    /// Link whose every read claims to fill more than one byte.
    struct OverfullTransport;

    impl Transport for OverfullTransport {
        fn open(&mut self, _port: &str, _settings: &LinkSettings) -> DomeResult<()> {
            Ok(())
        }

        fn close(&mut self) {}

        fn is_open(&self) -> bool {
            true
        }

        fn purge(&mut self) -> DomeResult<()> {
            Ok(())
        }

        fn read(&mut self, buffer: &mut [u8], _timeout: Duration) -> DomeResult<usize> {
            buffer.fill(b'1');
            Ok(2)
        }

        fn write(&mut self, bytes: &[u8]) -> DomeResult<usize> {
            Ok(bytes.len())
        }

        fn flush(&mut self) -> DomeResult<()> {
            Ok(())
        }
    }

    fn open_transport() -> ScriptedTransport {
        let mut transport = ScriptedTransport::new();
        transport.open("scripted", &LinkSettings::default()).unwrap();
        transport
    }

    #[test]
    fn test_read_line() {
        let mut transport = open_transport();
        transport.inject_stale(b"123.4\r");

        let mut reader = ResponseReader::default();

        assert_eq!(reader.read_line(&mut transport).unwrap(), "123.4");
    }

    #[test]
    fn test_read_line_timeout_clears_buffer() {
        let mut transport = open_transport();
        transport.inject_stale(b"12");

        let mut reader = ResponseReader::default();

        assert_eq!(reader.read_line(&mut transport), Err(DomeError::Timeout));
        assert!(reader.buffered().is_empty());
    }

    #[test]
    fn test_read_line_nothing_received() {
        let mut transport = open_transport();

        let mut reader = ResponseReader::default();

        assert_eq!(reader.read_line(&mut transport), Err(DomeError::Timeout));
        assert!(reader.buffered().is_empty());
    }

    #[test]
    fn test_read_line_too_long() {
        let mut transport = open_transport();
        transport.inject_stale(b"0123456789012345678901234\r");

        let mut reader = ResponseReader::default();

        assert_eq!(
            reader.read_line(&mut transport),
            Err(DomeError::ResponseTooLong)
        );
        assert!(reader.buffered().is_empty());
    }

    #[test]
    fn test_read_line_unexpected_byte_count() {
        let mut transport = OverfullTransport;

        let mut reader = ResponseReader::default();

        assert!(matches!(
            reader.read_line(&mut transport),
            Err(DomeError::TransportFailure(_))
        ));
        assert!(reader.buffered().is_empty());
    }

    #[test]
    fn test_read_line_fills_buffer_exactly() {
        let mut transport = open_transport();
        transport.inject_stale(b"0123456789012345678\r");

        let mut reader = ResponseReader::default();

        assert_eq!(
            reader.read_line(&mut transport).unwrap(),
            "0123456789012345678"
        );
    }

    #[test]
    fn test_read_line_one_byte_over_capacity() {
        let mut transport = open_transport();
        transport.inject_stale(b"01234567890123456789\r");

        let mut reader = ResponseReader::default();

        assert_eq!(
            reader.read_line(&mut transport),
            Err(DomeError::ResponseTooLong)
        );
        assert!(reader.buffered().is_empty());
    }

    #[test]
    fn test_read_line_does_not_carry_over() {
        let mut transport = open_transport();
        transport.inject_stale(b"A\r1\r");

        let mut reader = ResponseReader::default();

        assert_eq!(reader.read_line(&mut transport).unwrap(), "A");
        assert_eq!(reader.read_line(&mut transport).unwrap(), "1");
        assert_eq!(reader.buffered(), b"1");
    }
}
