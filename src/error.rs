//! Define the DomeError enumeration used across the crate.

use regex::Error as RegexError;
use std::{io, result};
use thiserror::Error;

pub type DomeResult<T> = result::Result<T, DomeError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomeError {
    #[error("DomeError::NotConnected")]
    NotConnected,

    #[error("DomeError::TransportFailure: {0}")]
    TransportFailure(String),

    #[error("DomeError::Timeout")]
    Timeout,

    #[error("DomeError::ResponseTooLong")]
    ResponseTooLong,

    #[error("DomeError::BadCommandResponse: {0}")]
    BadCommandResponse(String),

    #[error("DomeError::CommandFailed: {0}")]
    CommandFailed(String),

    #[error("DomeError::ParseFailure: {0}")]
    ParseFailure(String),

    #[error("DomeError::Config: {0}")]
    Config(String),
}

impl DomeError {
    /// Byte channel errors end the session; everything else leaves it usable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DomeError::TransportFailure(_))
    }

    pub fn parse(err_msg: &str) -> DomeError {
        DomeError::ParseFailure(String::from(err_msg))
    }

    pub fn command_failed(err_msg: &str) -> DomeError {
        DomeError::CommandFailed(String::from(err_msg))
    }
}

impl From<io::Error> for DomeError {
    fn from(item: io::Error) -> DomeError {
        match item.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => DomeError::Timeout,
            _ => DomeError::TransportFailure(item.to_string()),
        }
    }
}

impl From<serialport::Error> for DomeError {
    fn from(item: serialport::Error) -> DomeError {
        DomeError::TransportFailure(item.to_string())
    }
}

impl From<RegexError> for DomeError {
    fn from(item: RegexError) -> DomeError {
        DomeError::ParseFailure(item.to_string())
    }
}

impl From<toml::de::Error> for DomeError {
    fn from(item: toml::de::Error) -> DomeError {
        DomeError::Config(item.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_timeout_is_recoverable() {
        let error = DomeError::from(io::Error::new(io::ErrorKind::TimedOut, "read"));

        assert_eq!(error, DomeError::Timeout);
        assert!(!error.is_fatal());
    }

    #[test]
    fn test_io_broken_pipe_is_fatal() {
        let error = DomeError::from(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));

        assert!(matches!(error, DomeError::TransportFailure(_)));
        assert!(error.is_fatal());
    }
}
