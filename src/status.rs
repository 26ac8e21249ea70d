//! Define the status types reported by the dome controller.

use crate::motor_state::MotorState;

/// Number of tab-separated fields in the extended status line.
pub const EXTENDED_STATUS_FIELDS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutterState {
    Open,
    Closed,
    Opening,
    Closing,
    Error,
    #[default]
    Unknown,
    NotFitted,
}

impl ShutterState {
    pub fn from_code(code: i32) -> Option<ShutterState> {
        match code {
            0 => Some(ShutterState::Open),
            1 => Some(ShutterState::Closed),
            2 => Some(ShutterState::Opening),
            3 => Some(ShutterState::Closing),
            4 => Some(ShutterState::Error),
            5 => Some(ShutterState::Unknown),
            6 => Some(ShutterState::NotFitted),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            ShutterState::Open => 0,
            ShutterState::Closed => 1,
            ShutterState::Opening => 2,
            ShutterState::Closing => 3,
            ShutterState::Error => 4,
            ShutterState::Unknown => 5,
            ShutterState::NotFitted => 6,
        }
    }

    pub fn is_moving(&self) -> bool {
        matches!(self, ShutterState::Opening | ShutterState::Closing)
    }
}

/// Shutter battery charge, scaled from the `<percent> <millivolts>` reply.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BatteryLevel {
    pub percent: f64,
    pub volts: f64,
}

/// Composite status line of the extended protocol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtendedStatus {
    pub azimuth: f64,
    pub motor_state: Option<MotorState>,
    pub motor_code: i32,
    pub at_home: bool,
    pub at_park: bool,
    pub steps_per_revolution: i64,
    pub shutter_state: ShutterState,
}

impl ExtendedStatus {
    /// Render the status the way the controller sends it, without the prompt.
    pub fn as_string(&self) -> String {
        format!(
            "{:.1}\t{}\t{}\t{}\t{}\t{}",
            self.azimuth,
            self.motor_code,
            u8::from(self.at_home),
            u8::from(self.at_park),
            self.steps_per_revolution,
            self.shutter_state.code(),
        )
    }
}

/// Coarse view of what the session is doing, derived from cached data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomeState {
    Disconnected,
    Idle,
    Moving,
    Calibrating,
    ShutterMoving,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutter_codes() {
        assert_eq!(ShutterState::from_code(6), Some(ShutterState::NotFitted));
        assert_eq!(ShutterState::from_code(0), Some(ShutterState::Open));
        assert_eq!(ShutterState::from_code(7), None);
        assert!(ShutterState::Closing.is_moving());
        assert!(!ShutterState::Closed.is_moving());
    }

    #[test]
    fn test_extended_status_as_string() {
        let status = ExtendedStatus {
            azimuth: 12.34,
            motor_state: Some(MotorState::Idle),
            motor_code: 0,
            at_home: false,
            at_park: true,
            steps_per_revolution: 10240,
            shutter_state: ShutterState::Closed,
        };

        assert_eq!(status.as_string(), "12.3\t0\t0\t1\t10240\t1");
    }
}
