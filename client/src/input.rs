//! Client input management with sequencing and change detection
//!
//! Keyboard and mouse are read once per frame into a [`RawInput`], which the
//! [`InputManager`] turns into the shared [`InputSnapshot`] plus the local
//! UI actions. The left mouse button acts as the on-screen joystick: while
//! held, the direction from the window centre to the cursor is the movement
//! direction.

use macroquad::prelude::*;
use shared::{EdgeDetector, InputSnapshot, JoystickState, MoveKeys};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Cursor distance from the centre, in pixels, below which the joystick
/// has no direction.
const JOYSTICK_DEAD_ZONE: f32 = 12.0;

/// Keep-alive interval for unchanged input.
const RESEND_INTERVAL: Duration = Duration::from_millis(16);

/// One frame of device state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawInput {
    pub keys: MoveKeys,
    pub space: bool,
    pub mouse_left: bool,
    pub mouse_right: bool,
    pub cursor: (f32, f32),
    pub window_center: (f32, f32),
    pub quit_key: bool,
    pub shop_key: bool,
    pub prev_page_key: bool,
    pub next_page_key: bool,
    /// Highest digit key held, 1 to 9.
    pub digit: Option<usize>,
}

impl RawInput {
    /// Reads the current keyboard and mouse state.
    pub fn sample() -> Self {
        const DIGITS: [KeyCode; 9] = [
            KeyCode::Key1,
            KeyCode::Key2,
            KeyCode::Key3,
            KeyCode::Key4,
            KeyCode::Key5,
            KeyCode::Key6,
            KeyCode::Key7,
            KeyCode::Key8,
            KeyCode::Key9,
        ];

        Self {
            keys: MoveKeys {
                forward: is_key_down(KeyCode::W),
                back: is_key_down(KeyCode::S),
                left: is_key_down(KeyCode::A),
                right: is_key_down(KeyCode::D),
            },
            space: is_key_down(KeyCode::Space),
            mouse_left: is_mouse_button_down(MouseButton::Left),
            mouse_right: is_mouse_button_down(MouseButton::Right),
            cursor: mouse_position(),
            window_center: (screen_width() / 2.0, screen_height() / 2.0),
            quit_key: is_key_down(KeyCode::Q) || is_key_down(KeyCode::Escape),
            shop_key: is_key_down(KeyCode::Tab),
            prev_page_key: is_key_down(KeyCode::Left),
            next_page_key: is_key_down(KeyCode::Right),
            digit: DIGITS.iter().rposition(|key| is_key_down(*key)).map(|i| i + 1),
        }
    }

    /// Joystick as seen from the cursor. Screen right is +x, screen down is
    /// +z, matching the W/A/S/D layout.
    pub fn joystick(&self) -> JoystickState {
        let dx = self.cursor.0 - self.window_center.0;
        let dz = self.cursor.1 - self.window_center.1;
        let angle = if self.mouse_left && (dx * dx + dz * dz).sqrt() > JOYSTICK_DEAD_ZONE {
            Some(dx.atan2(dz))
        } else {
            None
        };

        JoystickState {
            pressed: self.mouse_left,
            angle,
            fire: self.mouse_right,
            quit: self.quit_key,
        }
    }

    pub fn snapshot(&self) -> InputSnapshot {
        InputSnapshot {
            keys: self.keys,
            space: self.space,
            joystick: self.joystick(),
        }
    }
}

/// One-shot UI actions detected this frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UiActions {
    pub toggle_shop: bool,
    pub prev_page: bool,
    pub next_page: bool,
    /// Shop slot picked with a digit key, 1 to 9.
    pub pick: Option<usize>,
}

/// Input ready to go on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequencedInput {
    pub sequence: u32,
    pub timestamp: u64,
    pub input: InputSnapshot,
}

/// Manages user input collection and transformation into networked game inputs
pub struct InputManager {
    next_sequence: u32,
    current_input: InputSnapshot,
    last_input_sent: Option<Instant>,

    // Edge detection for the UI keys
    shop_edge: EdgeDetector,
    prev_page_edge: EdgeDetector,
    next_page_edge: EdgeDetector,
    last_digit: Option<usize>,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            next_sequence: 1,
            current_input: InputSnapshot::default(),
            last_input_sent: None,
            shop_edge: EdgeDetector::new(),
            prev_page_edge: EdgeDetector::new(),
            next_page_edge: EdgeDetector::new(),
            last_digit: None,
        }
    }

    /// Updates input state and returns UI actions and optional network input
    pub fn update(&mut self, raw: &RawInput) -> (UiActions, Option<SequencedInput>) {
        let pick = match raw.digit {
            Some(digit) if self.last_digit != Some(digit) => Some(digit),
            _ => None,
        };
        self.last_digit = raw.digit;

        let actions = UiActions {
            toggle_shop: self.shop_edge.rising(raw.shop_key),
            prev_page: self.prev_page_edge.rising(raw.prev_page_key),
            next_page: self.next_page_edge.rising(raw.next_page_key),
            pick,
        };

        let input = raw.snapshot();
        let input_changed = input != self.current_input;
        let time_to_send = self
            .last_input_sent
            .map_or(true, |sent| sent.elapsed() >= RESEND_INTERVAL);

        self.current_input = input;
        if !(input_changed || time_to_send) {
            return (actions, None);
        }

        let sequenced = SequencedInput {
            sequence: self.next_sequence,
            timestamp: Self::get_timestamp(),
            input,
        };
        self.next_sequence += 1;
        self.last_input_sent = Some(Instant::now());

        (actions, Some(sequenced))
    }

    /// Returns the current input state
    pub fn current_input(&self) -> &InputSnapshot {
        &self.current_input
    }

    fn get_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_millis() as u64
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn centered() -> RawInput {
        RawInput {
            cursor: (400.0, 300.0),
            window_center: (400.0, 300.0),
            ..RawInput::default()
        }
    }

    #[test]
    fn test_input_manager_creation() {
        let input_manager = InputManager::new();
        assert_eq!(input_manager.next_sequence, 1);
        assert_eq!(*input_manager.current_input(), InputSnapshot::default());
    }

    #[test]
    fn test_joystick_angle_from_cursor() {
        let mut raw = centered();
        raw.mouse_left = true;
        raw.cursor = (500.0, 300.0);

        let joystick = raw.joystick();
        assert!(joystick.pressed);
        assert_approx_eq!(joystick.angle.unwrap(), std::f32::consts::FRAC_PI_2, 1e-6);

        // Cursor below the centre points the same way as S.
        raw.cursor = (400.0, 400.0);
        assert_approx_eq!(raw.joystick().angle.unwrap(), 0.0, 1e-6);
    }

    #[test]
    fn test_joystick_dead_zone_and_release() {
        let mut raw = centered();
        raw.mouse_left = true;
        raw.cursor = (405.0, 300.0);
        assert_eq!(raw.joystick().angle, None);

        raw.mouse_left = false;
        raw.cursor = (600.0, 300.0);
        assert!(!raw.joystick().pressed);
        assert_eq!(raw.joystick().angle, None);
    }

    #[test]
    fn test_buttons_map_to_actions() {
        let mut raw = centered();
        raw.mouse_right = true;
        raw.quit_key = true;

        let snapshot = raw.snapshot();
        assert!(snapshot.fire_intent());
        assert!(snapshot.quit_requested());
    }

    #[test]
    fn test_first_update_always_sends() {
        let mut manager = InputManager::new();
        let (_, sent) = manager.update(&centered());
        assert_eq!(sent.map(|s| s.sequence), Some(1));
    }

    #[test]
    fn test_change_sends_immediately_with_next_sequence() {
        let mut manager = InputManager::new();
        manager.update(&centered());

        let mut raw = centered();
        raw.keys.forward = true;
        let (_, sent) = manager.update(&raw);

        let sent = sent.unwrap();
        assert_eq!(sent.sequence, 2);
        assert!(sent.input.keys.forward);
    }

    #[test]
    fn test_unchanged_input_waits_for_keep_alive() {
        let mut manager = InputManager::new();
        manager.update(&centered());
        let (_, sent) = manager.update(&centered());
        assert!(sent.is_none());

        std::thread::sleep(RESEND_INTERVAL + Duration::from_millis(2));
        let (_, sent) = manager.update(&centered());
        assert!(sent.is_some());
    }

    #[test]
    fn test_ui_keys_fire_once_per_press() {
        let mut manager = InputManager::new();
        let mut raw = centered();
        raw.shop_key = true;
        raw.digit = Some(3);

        let (first, _) = manager.update(&raw);
        let (held, _) = manager.update(&raw);

        assert!(first.toggle_shop);
        assert_eq!(first.pick, Some(3));
        assert!(!held.toggle_shop);
        assert_eq!(held.pick, None);

        raw.digit = None;
        manager.update(&raw);
        raw.digit = Some(3);
        let (again, _) = manager.update(&raw);
        assert_eq!(again.pick, Some(3));
    }

    #[test]
    fn test_get_timestamp() {
        let timestamp1 = InputManager::get_timestamp();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let timestamp2 = InputManager::get_timestamp();
        assert!(timestamp2 > timestamp1);
    }
}
