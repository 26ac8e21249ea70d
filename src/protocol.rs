//! Command vocabulary of the dome controller and its protocol variants.
//!
//! Firmware revisions differ in reply framing, line length and in which
//! queries they answer. The session talks to one [`DomeProtocol`] picked at
//! construction and chooses its completion checks by what it supports.

use std::fmt::Debug;

use serde::Deserialize;

use crate::{
    error::{DomeError, DomeResult},
    reply_parser::format_azimuth,
    response_reader::SERIAL_BUFFER_SIZE,
};

const EXTENDED_LINE_LENGTH: usize = 64;
const EXTENDED_PROMPT: u8 = b'>';

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DomeCommand {
    FirmwareVersion,
    Position,
    HomeAzimuth,
    ParkAzimuth,
    ShutterState,
    MotorState,
    HomeSwitch,
    AtPark,
    StepsPerRevolution,
    Battery,
    Status,
    Sync(f64),
    Goto(f64),
    GoHome,
    Park,
    Calibrate,
    OpenShutter,
    CloseShutter,
    Stop,
    SetHomeAzimuth(f64),
    SetParkAzimuth(f64),
}

/// How a reply line is framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// The payload is the whole line.
    Raw,
    /// Every reply starts with this byte, which is not part of the payload.
    Prompt(u8),
}

impl Framing {
    pub fn strip(&self, line: &str) -> DomeResult<String> {
        match self {
            Framing::Raw => Ok(line.to_string()),
            Framing::Prompt(prompt) => line
                .strip_prefix(char::from(*prompt))
                .map(str::to_string)
                .ok_or_else(|| {
                    DomeError::ParseFailure(format!(
                        "Reply {line:?} does not start with {:?}.",
                        char::from(*prompt)
                    ))
                }),
        }
    }
}

pub trait DomeProtocol: Debug + Send {
    fn name(&self) -> &'static str;

    /// Wire text for `command`, terminator included, or `None` when this
    /// variant has no such command.
    fn encode(&self, command: &DomeCommand) -> Option<String>;

    fn framing(&self) -> Framing;

    fn max_line_length(&self) -> usize;

    fn ack_token(&self) -> &str {
        "A"
    }

    fn is_ack(&self, reply: &str) -> bool {
        reply.starts_with(self.ack_token())
    }

    fn supports(&self, command: &DomeCommand) -> bool {
        self.encode(command).is_some()
    }
}

/// Tokens shared by every firmware revision.
fn base_command(command: &DomeCommand) -> Option<String> {
    let text = match command {
        DomeCommand::FirmwareVersion => "VER".to_string(),
        DomeCommand::Position => "ANGLE".to_string(),
        DomeCommand::HomeAzimuth => "HOME".to_string(),
        DomeCommand::ParkAzimuth => "PARK".to_string(),
        DomeCommand::ShutterState => "SHUTTER".to_string(),
        DomeCommand::MotorState => "MSTATE".to_string(),
        DomeCommand::HomeSwitch => "HOME ?".to_string(),
        DomeCommand::StepsPerRevolution => "ENCREV".to_string(),
        DomeCommand::Battery => "BAT".to_string(),
        DomeCommand::Sync(az) => format!("ANGLE K {}", format_azimuth(*az)),
        DomeCommand::Goto(az) => format!("GO {}", format_azimuth(*az)),
        DomeCommand::GoHome => "GO H".to_string(),
        DomeCommand::Park => "GO P".to_string(),
        DomeCommand::Calibrate => "CALIBRATE".to_string(),
        DomeCommand::OpenShutter => "OPEN".to_string(),
        DomeCommand::CloseShutter => "CLOSE".to_string(),
        DomeCommand::Stop => "STOP".to_string(),
        DomeCommand::SetHomeAzimuth(az) => format!("HOME {}", format_azimuth(*az)),
        DomeCommand::SetParkAzimuth(az) => format!("PARK {}", format_azimuth(*az)),
        DomeCommand::AtPark | DomeCommand::Status => return None,
    };
    Some(text + "\r")
}

/// Original firmware: raw replies in a 20 byte buffer.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClassicProtocol;

impl DomeProtocol for ClassicProtocol {
    fn name(&self) -> &'static str {
        "classic"
    }

    fn encode(&self, command: &DomeCommand) -> Option<String> {
        base_command(command)
    }

    fn framing(&self) -> Framing {
        Framing::Raw
    }

    fn max_line_length(&self) -> usize {
        SERIAL_BUFFER_SIZE
    }
}

/// Later firmware: prompt-prefixed replies, an at-park query and a composite
/// status line.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtendedProtocol;

impl DomeProtocol for ExtendedProtocol {
    fn name(&self) -> &'static str {
        "extended"
    }

    fn encode(&self, command: &DomeCommand) -> Option<String> {
        match command {
            DomeCommand::AtPark => Some("PARK ?\r".to_string()),
            DomeCommand::Status => Some("INFO\r".to_string()),
            _ => base_command(command),
        }
    }

    fn framing(&self) -> Framing {
        Framing::Prompt(EXTENDED_PROMPT)
    }

    fn max_line_length(&self) -> usize {
        EXTENDED_LINE_LENGTH
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVariant {
    #[default]
    Classic,
    Extended,
}

impl ProtocolVariant {
    pub fn build(&self) -> Box<dyn DomeProtocol> {
        match self {
            ProtocolVariant::Classic => Box::new(ClassicProtocol),
            ProtocolVariant::Extended => Box::new(ExtendedProtocol),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classic_encode() {
        let protocol = ClassicProtocol;

        assert_eq!(
            protocol.encode(&DomeCommand::Goto(90.0)).unwrap(),
            "GO 90.0\r"
        );
        assert_eq!(
            protocol.encode(&DomeCommand::Sync(123.46)).unwrap(),
            "ANGLE K 123.5\r"
        );
        assert_eq!(
            protocol.encode(&DomeCommand::SetParkAzimuth(-5.0)).unwrap(),
            "PARK 355.0\r"
        );
        assert!(!protocol.supports(&DomeCommand::Status));
        assert!(!protocol.supports(&DomeCommand::AtPark));
    }

    #[test]
    fn test_extended_encode() {
        let protocol = ExtendedProtocol;

        assert_eq!(protocol.encode(&DomeCommand::Status).unwrap(), "INFO\r");
        assert_eq!(protocol.encode(&DomeCommand::AtPark).unwrap(), "PARK ?\r");
        assert_eq!(protocol.encode(&DomeCommand::Stop).unwrap(), "STOP\r");
        assert_eq!(protocol.framing(), Framing::Prompt(b'>'));
    }

    #[test]
    fn test_is_ack() {
        let protocol = ClassicProtocol;

        assert!(protocol.is_ack("A"));
        assert!(!protocol.is_ack("E"));
        assert!(!protocol.is_ack(""));
    }
}
