//! Define the MotorState enumeration.
//!
//! This enumeration contains the codes reported by the motion-state query and
//! by the second field of the extended status line.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorState {
    Idle,
    MovingToTarget,
    MovingToVelocity,
    MovingSidereal,
    MovingCCW,
    MovingCW,
    Calibrating,
    GoingHome,
}

impl MotorState {
    pub fn from_code(code: i32) -> Option<MotorState> {
        match code {
            0 => Some(MotorState::Idle),
            1 => Some(MotorState::MovingToTarget),
            2 => Some(MotorState::MovingToVelocity),
            3 => Some(MotorState::MovingSidereal),
            4 => Some(MotorState::MovingCCW),
            5 => Some(MotorState::MovingCW),
            6 => Some(MotorState::Calibrating),
            7 => Some(MotorState::GoingHome),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            MotorState::Idle => 0,
            MotorState::MovingToTarget => 1,
            MotorState::MovingToVelocity => 2,
            MotorState::MovingSidereal => 3,
            MotorState::MovingCCW => 4,
            MotorState::MovingCW => 5,
            MotorState::Calibrating => 6,
            MotorState::GoingHome => 7,
        }
    }

    pub fn is_moving(&self) -> bool {
        is_moving_code(self.code())
    }
}

/// Idle codes are exactly {0, 3}; anything else, including codes this crate
/// does not know, means the rotator is in motion.
pub fn is_moving_code(code: i32) -> bool {
    code != 0 && code != 3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_codes() {
        assert!(!is_moving_code(0));
        assert!(!is_moving_code(3));
        assert!(is_moving_code(1));
        assert!(is_moving_code(6));
        assert!(is_moving_code(42));
    }

    #[test]
    fn test_from_code() {
        assert_eq!(MotorState::from_code(6), Some(MotorState::Calibrating));
        assert_eq!(MotorState::from_code(8), None);
        assert!(!MotorState::MovingSidereal.is_moving());
        assert!(MotorState::GoingHome.is_moving());
    }
}
