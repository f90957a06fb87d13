//! Normalized player input, independent of the device that produced it.

use crate::physics::Vec3;
use serde::{Deserialize, Serialize};

/// Held state of the W/A/S/D movement keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MoveKeys {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
}

impl MoveKeys {
    pub fn any(&self) -> bool {
        self.forward || self.back || self.left || self.right
    }

    /// Yaw of the combined key direction, `None` when nothing is held or
    /// opposite keys cancel out.
    pub fn angle(&self) -> Option<f32> {
        let mut x = 0.0f32;
        let mut z = 0.0f32;
        if self.forward {
            z -= 1.0;
        }
        if self.back {
            z += 1.0;
        }
        if self.left {
            x -= 1.0;
        }
        if self.right {
            x += 1.0;
        }

        if x == 0.0 && z == 0.0 {
            None
        } else {
            Some(x.atan2(z))
        }
    }
}

/// On-screen joystick with its named action buttons.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JoystickState {
    pub pressed: bool,
    pub angle: Option<f32>,
    pub fire: bool,
    pub quit: bool,
}

/// Everything a controller needs from one frame of input.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InputSnapshot {
    pub keys: MoveKeys,
    pub space: bool,
    pub joystick: JoystickState,
}

impl InputSnapshot {
    /// Movement yaw for this frame. An active joystick wins over the keys.
    pub fn movement_angle(&self) -> Option<f32> {
        if self.joystick.pressed {
            if let Some(angle) = self.joystick.angle {
                return Some(angle);
            }
        }
        self.keys.angle()
    }

    /// Unit movement vector on the floor plane, zero when stationary.
    pub fn movement_vector(&self) -> Vec3 {
        self.movement_angle().map(Vec3::from_yaw).unwrap_or(Vec3::ZERO)
    }

    pub fn fire_intent(&self) -> bool {
        self.joystick.fire || self.space
    }

    pub fn quit_requested(&self) -> bool {
        self.joystick.quit
    }
}

/// Turns a held level into a one-shot rising edge.
#[derive(Debug, Clone, Default)]
pub struct EdgeDetector {
    previous: bool,
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// True only on the first frame `level` is held after being released.
    pub fn rising(&mut self, level: bool) -> bool {
        let edge = level && !self.previous;
        self.previous = level;
        edge
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f32::consts::{FRAC_PI_2, PI};

    fn keys(forward: bool, back: bool, left: bool, right: bool) -> MoveKeys {
        MoveKeys {
            forward,
            back,
            left,
            right,
        }
    }

    #[test]
    fn test_key_angles() {
        assert_approx_eq!(keys(false, true, false, false).angle().unwrap(), 0.0, 1e-6);
        assert_approx_eq!(keys(true, false, false, false).angle().unwrap(), PI, 1e-6);
        assert_approx_eq!(keys(false, false, false, true).angle().unwrap(), FRAC_PI_2, 1e-6);
        assert_approx_eq!(keys(false, false, true, false).angle().unwrap(), -FRAC_PI_2, 1e-6);
    }

    #[test]
    fn test_opposite_keys_cancel() {
        let held = keys(true, true, false, false);
        assert!(held.any());
        assert_eq!(held.angle(), None);
    }

    #[test]
    fn test_joystick_wins_over_keys() {
        let input = InputSnapshot {
            keys: keys(false, false, true, false),
            space: false,
            joystick: JoystickState {
                pressed: true,
                angle: Some(1.0),
                fire: false,
                quit: false,
            },
        };
        assert_eq!(input.movement_angle(), Some(1.0));
    }

    #[test]
    fn test_released_joystick_falls_back_to_keys() {
        let input = InputSnapshot {
            keys: keys(false, false, false, true),
            space: false,
            joystick: JoystickState {
                pressed: false,
                angle: Some(1.0),
                fire: false,
                quit: false,
            },
        };
        assert_approx_eq!(input.movement_angle().unwrap(), FRAC_PI_2, 1e-6);
    }

    #[test]
    fn test_idle_input_is_stationary() {
        let input = InputSnapshot::default();
        assert_eq!(input.movement_angle(), None);
        assert_eq!(input.movement_vector(), Vec3::ZERO);
        assert!(!input.fire_intent());
    }

    #[test]
    fn test_fire_intent_is_either_button() {
        let mut input = InputSnapshot::default();
        input.space = true;
        assert!(input.fire_intent());

        input.space = false;
        input.joystick.fire = true;
        assert!(input.fire_intent());
    }

    #[test]
    fn test_movement_vector_is_normalized() {
        let input = InputSnapshot {
            keys: keys(true, false, false, true),
            ..InputSnapshot::default()
        };
        assert_approx_eq!(input.movement_vector().magnitude(), 1.0, 1e-6);
    }

    #[test]
    fn test_edge_detector_fires_once_per_press() {
        let mut edge = EdgeDetector::new();
        assert!(edge.rising(true));
        assert!(!edge.rising(true));
        assert!(!edge.rising(true));
        assert!(!edge.rising(false));
        assert!(edge.rising(true));
    }
}
