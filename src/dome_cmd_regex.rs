use regex::{Regex, RegexSet};

use crate::{error::DomeResult, protocol::DomeCommand};

const FIRMWARE_VERSION_REGEX: &str = r"^VER$";
const POSITION_REGEX: &str = r"^ANGLE$";
const SYNC_REGEX: &str = r"^ANGLE K (?P<az>\d+(?:\.\d+)?)$";
const HOME_AZIMUTH_REGEX: &str = r"^HOME$";
const HOME_SWITCH_REGEX: &str = r"^HOME \?$";
const SET_HOME_AZIMUTH_REGEX: &str = r"^HOME (?P<az>\d+(?:\.\d+)?)$";
const PARK_AZIMUTH_REGEX: &str = r"^PARK$";
const AT_PARK_REGEX: &str = r"^PARK \?$";
const SET_PARK_AZIMUTH_REGEX: &str = r"^PARK (?P<az>\d+(?:\.\d+)?)$";
const SHUTTER_STATE_REGEX: &str = r"^SHUTTER$";
const MOTOR_STATE_REGEX: &str = r"^MSTATE$";
const STEPS_PER_REVOLUTION_REGEX: &str = r"^ENCREV$";
const BATTERY_REGEX: &str = r"^BAT$";
const STATUS_REGEX: &str = r"^INFO$";
const GO_HOME_REGEX: &str = r"^GO H$";
const PARK_REGEX: &str = r"^GO P$";
const GOTO_REGEX: &str = r"^GO (?P<az>\d+(?:\.\d+)?)$";
const CALIBRATE_REGEX: &str = r"^CALIBRATE$";
const OPEN_SHUTTER_REGEX: &str = r"^OPEN$";
const CLOSE_SHUTTER_REGEX: &str = r"^CLOSE$";
const STOP_REGEX: &str = r"^STOP$";

/// Recognize the wire commands a dome controller receives.
pub struct DomeCmdRegex {
    regex_set: RegexSet,
    regex: Vec<Regex>,
}

impl DomeCmdRegex {
    pub fn new() -> DomeResult<DomeCmdRegex> {
        let regex_set = RegexSet::new([
            FIRMWARE_VERSION_REGEX,
            POSITION_REGEX,
            SYNC_REGEX,
            HOME_AZIMUTH_REGEX,
            HOME_SWITCH_REGEX,
            SET_HOME_AZIMUTH_REGEX,
            PARK_AZIMUTH_REGEX,
            AT_PARK_REGEX,
            SET_PARK_AZIMUTH_REGEX,
            SHUTTER_STATE_REGEX,
            MOTOR_STATE_REGEX,
            STEPS_PER_REVOLUTION_REGEX,
            BATTERY_REGEX,
            STATUS_REGEX,
            GO_HOME_REGEX,
            PARK_REGEX,
            GOTO_REGEX,
            CALIBRATE_REGEX,
            OPEN_SHUTTER_REGEX,
            CLOSE_SHUTTER_REGEX,
            STOP_REGEX,
        ])?;

        let regex = regex_set
            .patterns()
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<Regex>, _>>()?;

        Ok(DomeCmdRegex { regex_set, regex })
    }

    fn get_match_index(&self, text: &str) -> Option<usize> {
        self.regex_set.matches(text).into_iter().next()
    }

    fn azimuth(&self, match_index: usize, text: &str) -> Option<f64> {
        self.regex[match_index]
            .captures(text)
            .and_then(|capture| capture["az"].parse().ok())
    }

    pub fn into_dome_cmd(&self, text: &str) -> Option<DomeCommand> {
        let match_index = self.get_match_index(text)?;
        match match_index {
            0 => Some(DomeCommand::FirmwareVersion),
            1 => Some(DomeCommand::Position),
            2 => self.azimuth(match_index, text).map(DomeCommand::Sync),
            3 => Some(DomeCommand::HomeAzimuth),
            4 => Some(DomeCommand::HomeSwitch),
            5 => self
                .azimuth(match_index, text)
                .map(DomeCommand::SetHomeAzimuth),
            6 => Some(DomeCommand::ParkAzimuth),
            7 => Some(DomeCommand::AtPark),
            8 => self
                .azimuth(match_index, text)
                .map(DomeCommand::SetParkAzimuth),
            9 => Some(DomeCommand::ShutterState),
            10 => Some(DomeCommand::MotorState),
            11 => Some(DomeCommand::StepsPerRevolution),
            12 => Some(DomeCommand::Battery),
            13 => Some(DomeCommand::Status),
            14 => Some(DomeCommand::GoHome),
            15 => Some(DomeCommand::Park),
            16 => self.azimuth(match_index, text).map(DomeCommand::Goto),
            17 => Some(DomeCommand::Calibrate),
            18 => Some(DomeCommand::OpenShutter),
            19 => Some(DomeCommand::CloseShutter),
            20 => Some(DomeCommand::Stop),
            _ => None,
        }
    }
}
