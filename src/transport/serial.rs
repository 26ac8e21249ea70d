//! Serial port link to the dome controller.

use std::{
    io::{self, Read, Write},
    time::Duration,
};

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::{
    error::{DomeError, DomeResult},
    transport::{LinkSettings, Transport},
};

#[derive(Default)]
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    pub fn new() -> SerialTransport {
        SerialTransport::default()
    }

    fn port(&mut self) -> DomeResult<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| DomeError::TransportFailure("Serial port is not open.".to_string()))
    }
}

impl Transport for SerialTransport {
    fn open(&mut self, port: &str, settings: &LinkSettings) -> DomeResult<()> {
        let mut serial_port = serialport::new(port, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .flow_control(FlowControl::None)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(Duration::from_millis(100))
            .open()?;
        serial_port.write_data_terminal_ready(settings.dtr)?;
        log::debug!("Opened {port} at {} baud.", settings.baud_rate);
        self.port = Some(serial_port);
        Ok(())
    }

    fn close(&mut self) {
        self.port = None;
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn purge(&mut self) -> DomeResult<()> {
        self.port()?.clear(ClearBuffer::All)?;
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8], timeout: Duration) -> DomeResult<usize> {
        let port = self.port()?;
        port.set_timeout(timeout)?;
        match port.read(buffer) {
            Ok(n_bytes) => Ok(n_bytes),
            Err(error) if error.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(error) => Err(error.into()),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> DomeResult<usize> {
        let port = self.port()?;
        port.write_all(bytes)?;
        Ok(bytes.len())
    }

    fn flush(&mut self) -> DomeResult<()> {
        self.port()?.flush()?;
        Ok(())
    }
}
