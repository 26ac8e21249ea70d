//! TCP link, used to talk to the simulated controller or a serial server.

use std::{
    io::{self, Read, Write},
    net::TcpStream,
    time::Duration,
};

use crate::{
    error::{DomeError, DomeResult},
    transport::{LinkSettings, Transport},
};

#[derive(Debug, Default)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new() -> TcpTransport {
        TcpTransport::default()
    }

    fn stream(&mut self) -> DomeResult<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| DomeError::TransportFailure("TCP link is not open.".to_string()))
    }
}

impl Transport for TcpTransport {
    /// `port` is a `host:port` address; line settings do not apply.
    fn open(&mut self, port: &str, _settings: &LinkSettings) -> DomeResult<()> {
        let stream = TcpStream::connect(port)?;
        stream.set_nodelay(true)?;
        log::debug!("Connected to {port}.");
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(error) = stream.shutdown(std::net::Shutdown::Both) {
                log::debug!("Ignoring shutdown failure on close: {error}");
            }
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn purge(&mut self) -> DomeResult<()> {
        let stream = self.stream()?;
        stream.set_nonblocking(true)?;
        let mut scratch = [0u8; 256];
        let drained = loop {
            match stream.read(&mut scratch) {
                Ok(0) => break Err(DomeError::TransportFailure("Connection closed.".to_string())),
                Ok(n_bytes) => log::trace!("Purged {n_bytes} stale bytes."),
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(error) => break Err(DomeError::TransportFailure(error.to_string())),
            }
        };
        stream.set_nonblocking(false)?;
        drained
    }

    fn read(&mut self, buffer: &mut [u8], timeout: Duration) -> DomeResult<usize> {
        let stream = self.stream()?;
        stream.set_read_timeout(Some(timeout))?;
        match stream.read(buffer) {
            // A zero length read on a socket is end of stream, not a timeout.
            Ok(0) if !buffer.is_empty() => {
                Err(DomeError::TransportFailure("Connection closed.".to_string()))
            }
            Ok(n_bytes) => Ok(n_bytes),
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                ) =>
            {
                Ok(0)
            }
            Err(error) => Err(DomeError::TransportFailure(error.to_string())),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> DomeResult<usize> {
        let stream = self.stream()?;
        stream
            .write_all(bytes)
            .map_err(|error| DomeError::TransportFailure(error.to_string()))?;
        Ok(bytes.len())
    }

    fn flush(&mut self) -> DomeResult<()> {
        self.stream()?
            .flush()
            .map_err(|error| DomeError::TransportFailure(error.to_string()))
    }
}
