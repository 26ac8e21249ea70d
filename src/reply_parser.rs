//! Turn reply lines from the dome controller into typed values.

use std::str::FromStr;

use regex::Regex;

use crate::{
    error::{DomeError, DomeResult},
    motor_state::MotorState,
    status::{BatteryLevel, ExtendedStatus, ShutterState, EXTENDED_STATUS_FIELDS},
};

const FLOAT: &str = r"^\s*([-+]?\d*\.?\d+)\s*$";
const INT: &str = r"^\s*([-+]?\d+)\s*$";
const BATTERY: &str = r"^\s*(\d*\.?\d+)\s+(\d*\.?\d+)\s*$";

#[derive(Debug, Clone)]
pub struct ReplyParser {
    pub float: Regex,
    pub int: Regex,
    pub battery: Regex,
}

impl ReplyParser {
    pub fn new() -> DomeResult<ReplyParser> {
        let float = Regex::new(FLOAT)?;
        let int = Regex::new(INT)?;
        let battery = Regex::new(BATTERY)?;
        Ok(ReplyParser {
            float,
            int,
            battery,
        })
    }

    pub fn parse_float(&self, line: &str) -> DomeResult<f64> {
        ReplyParser::unwrap_capture(line, &self.float, 1)
    }

    pub fn parse_int(&self, line: &str) -> DomeResult<i64> {
        ReplyParser::unwrap_capture(line, &self.int, 1)
    }

    pub fn parse_flag(&self, line: &str) -> DomeResult<bool> {
        Ok(self.parse_int(line)? != 0)
    }

    pub fn parse_shutter_state(&self, line: &str) -> DomeResult<ShutterState> {
        let code = self.parse_int(line)?;
        i32::try_from(code)
            .ok()
            .and_then(ShutterState::from_code)
            .ok_or_else(|| DomeError::ParseFailure(format!("Unknown shutter state code {code}")))
    }

    /// A reply that does not carry both fields means the shutter link did not
    /// answer properly, which is reported as a failed command.
    pub fn parse_battery(&self, line: &str) -> DomeResult<BatteryLevel> {
        let percent: f64 = ReplyParser::unwrap_capture(line, &self.battery, 1)
            .map_err(|_| DomeError::CommandFailed(format!("Malformed battery reply: {line}")))?;
        let millivolts: f64 = ReplyParser::unwrap_capture(line, &self.battery, 2)
            .map_err(|_| DomeError::CommandFailed(format!("Malformed battery reply: {line}")))?;
        Ok(BatteryLevel {
            percent,
            volts: millivolts / 1000.0,
        })
    }

    pub fn parse_extended_status(&self, line: &str) -> DomeResult<ExtendedStatus> {
        let fields: Vec<&str> = line.split('\t').collect();
        let length = fields.len();
        if length < EXTENDED_STATUS_FIELDS {
            return Err(DomeError::ParseFailure(format!(
                "Got {length} status fields; expected {EXTENDED_STATUS_FIELDS}."
            )));
        }
        let azimuth = self.parse_float(fields[0])?;
        let motor_code = i32::try_from(self.parse_int(fields[1])?)
            .map_err(|_| DomeError::parse(fields[1]))?;
        let at_home = self.parse_flag(fields[2])?;
        let at_park = self.parse_flag(fields[3])?;
        let steps_per_revolution = self.parse_int(fields[4])?;
        let shutter_state = self.parse_shutter_state(fields[5])?;

        Ok(ExtendedStatus {
            azimuth,
            motor_state: MotorState::from_code(motor_code),
            motor_code,
            at_home,
            at_park,
            steps_per_revolution,
            shutter_state,
        })
    }

    fn unwrap_capture<T: FromStr>(line: &str, regex: &Regex, extract_group: usize) -> DomeResult<T> {
        if let Some(capture) = regex.captures(line) {
            if let Some(group) = capture.get(extract_group) {
                group.as_str().parse::<T>().map_err(|_| {
                    DomeError::ParseFailure(format!(
                        "Cannot convert string to return type: {}",
                        group.as_str()
                    ))
                })
            } else {
                Err(DomeError::ParseFailure(format!(
                    "Could not find expected group {extract_group} in captured group: {capture:?}"
                )))
            }
        } else {
            Err(DomeError::ParseFailure(format!("Failed to match {line}")))
        }
    }
}

/// Format an azimuth the way the controller expects it in set/goto/sync commands.
pub fn format_azimuth(azimuth: f64) -> String {
    let rounded = (normalize_azimuth(azimuth) * 10.0).round() / 10.0;
    format!("{:.1}", normalize_azimuth(rounded))
}

/// Wrap any azimuth into [0, 360).
pub fn normalize_azimuth(azimuth: f64) -> f64 {
    let wrapped = azimuth.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs.
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Normalized azimuth for a command, refusing NaN and infinities.
pub fn checked_azimuth(azimuth: f64) -> DomeResult<f64> {
    if azimuth.is_finite() {
        Ok(normalize_azimuth(azimuth))
    } else {
        Err(DomeError::ParseFailure(format!(
            "Azimuth {azimuth} is not a finite number."
        )))
    }
}

/// Compare two azimuths on whole degrees, allowing one degree of encoder
/// quantization either side and wrapping at 360.
pub fn within_tolerance(target: f64, current: f64) -> bool {
    let delta = (target.floor() - current.floor()).abs().rem_euclid(360.0);
    delta <= 1.0 || delta >= 359.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_reply_parser_new() {
        let reply_parser = ReplyParser::new();

        assert!(reply_parser.is_ok())
    }

    #[test]
    fn test_parse_float() {
        let reply_parser = ReplyParser::new().unwrap();

        assert_eq!(reply_parser.parse_float("123.4").unwrap(), 123.4);
        assert_eq!(reply_parser.parse_float(" 7 ").unwrap(), 7.0);
        assert!(matches!(
            reply_parser.parse_float("12.3.4"),
            Err(DomeError::ParseFailure(_))
        ));
        assert!(reply_parser.parse_float("").is_err());
    }

    #[test]
    fn test_parse_shutter_not_fitted() {
        let reply_parser = ReplyParser::new().unwrap();

        assert_eq!(
            reply_parser.parse_shutter_state("6").unwrap(),
            ShutterState::NotFitted
        );
        assert!(reply_parser.parse_shutter_state("9").is_err());
    }

    #[test]
    fn test_parse_battery() {
        let reply_parser = ReplyParser::new().unwrap();

        let battery = reply_parser.parse_battery("85 12400").unwrap();

        assert_eq!(battery.percent, 85.0);
        assert_eq!(battery.volts, 12.4);
    }

    #[test]
    fn test_parse_battery_wrong_input() {
        let reply_parser = ReplyParser::new().unwrap();

        assert!(matches!(
            reply_parser.parse_battery("85"),
            Err(DomeError::CommandFailed(_))
        ));
        assert!(matches!(
            reply_parser.parse_battery("low battery"),
            Err(DomeError::CommandFailed(_))
        ));
    }

    #[test]
    fn test_parse_extended_status() {
        let reply_parser = ReplyParser::new().unwrap();

        let status = reply_parser
            .parse_extended_status("262.9\t6\t0\t1\t10240\t1")
            .unwrap();

        assert_eq!(status.azimuth, 262.9);
        assert_eq!(status.motor_state, Some(MotorState::Calibrating));
        assert!(!status.at_home);
        assert!(status.at_park);
        assert_eq!(status.steps_per_revolution, 10240);
        assert_eq!(status.shutter_state, ShutterState::Closed);
    }

    #[test]
    fn test_parse_extended_status_wrong_input() {
        let reply_parser = ReplyParser::new().unwrap();

        let status = reply_parser.parse_extended_status("262.9\t6\t0\t1\t10240");

        assert!(matches!(status, Err(DomeError::ParseFailure(_))));
    }

    #[test]
    fn test_within_tolerance() {
        assert!(within_tolerance(90.0, 89.6));
        assert!(within_tolerance(90.0, 91.9));
        assert!(!within_tolerance(90.0, 70.0));
        assert!(!within_tolerance(90.0, 88.9));
        assert!(within_tolerance(0.2, 359.5));
    }

    #[test]
    fn test_checked_azimuth() {
        assert_eq!(checked_azimuth(370.0).unwrap(), 10.0);
        assert!(matches!(
            checked_azimuth(f64::NAN),
            Err(DomeError::ParseFailure(_))
        ));
        assert!(checked_azimuth(f64::INFINITY).is_err());
        assert!(checked_azimuth(f64::NEG_INFINITY).is_err());
    }

    #[test]
    fn test_format_azimuth() {
        assert_eq!(format_azimuth(90.0), "90.0");
        assert_eq!(format_azimuth(360.0), "0.0");
        assert_eq!(format_azimuth(-10.0), "350.0");
    }

    proptest! {
        #[test]
        fn formatted_azimuth_parses_back(azimuth in 0.0f64..360.0) {
            let reply_parser = ReplyParser::new().unwrap();
            let parsed = reply_parser.parse_float(&format_azimuth(azimuth)).unwrap();
            let delta = (parsed - azimuth).abs();
            prop_assert!(delta <= 0.05 + 1e-9 || (360.0 - delta) <= 0.05 + 1e-9,
                "{} formatted as {}", azimuth, parsed);
        }

        #[test]
        fn tolerance_matches_floor_distance(target in 2.0f64..358.0, current in 2.0f64..358.0) {
            let expected = (target.floor() - current.floor()).abs() <= 1.0;
            prop_assert_eq!(within_tolerance(target, current), expected);
        }
    }
}
