//! Byte channels the dome conversation runs over.
//!
//! The session only needs purge, single byte reads with a timeout and
//! writes, so every concrete link hides behind the [`Transport`] trait.

pub mod scripted;
pub mod serial;
pub mod tcp;

use std::time::Duration;

use serde::Deserialize;

use crate::error::DomeResult;

pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Line settings used when opening a link. The controller runs 8-N-1 with
/// DTR asserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    pub baud_rate: u32,
    pub dtr: bool,
}

impl Default for LinkSettings {
    fn default() -> LinkSettings {
        LinkSettings {
            baud_rate: DEFAULT_BAUD_RATE,
            dtr: true,
        }
    }
}

/// Which link a configured port names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Serial,
    /// `port` is a `host:port` address.
    Tcp,
}

impl TransportKind {
    pub fn build(&self) -> Box<dyn Transport> {
        match self {
            TransportKind::Serial => Box::new(serial::SerialTransport::new()),
            TransportKind::Tcp => Box::new(tcp::TcpTransport::new()),
        }
    }
}

pub trait Transport: Send {
    fn open(&mut self, port: &str, settings: &LinkSettings) -> DomeResult<()>;

    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Drop any unread input and pending output.
    fn purge(&mut self) -> DomeResult<()>;

    /// Block for at most `timeout`; `Ok(0)` means nothing arrived in time.
    fn read(&mut self, buffer: &mut [u8], timeout: Duration) -> DomeResult<usize>;

    fn write(&mut self, bytes: &[u8]) -> DomeResult<usize>;

    fn flush(&mut self) -> DomeResult<()>;
}
