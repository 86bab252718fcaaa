//! Platform abstraction layer
//!
//! Maps host keyboard events onto joystick controls. Browsers report both a
//! `code` string and a legacy numeric key code; either is accepted.

use crate::sim::direction::Heading;
use crate::sim::input::{Button, Control};

/// Map a `KeyboardEvent.code` (or `key`) string
pub fn key_control(code: &str) -> Option<Control> {
    let control = match code {
        "ArrowUp" => Control::Move(Heading::Up),
        "ArrowDown" => Control::Move(Heading::Down),
        "ArrowLeft" => Control::Move(Heading::Left),
        "ArrowRight" => Control::Move(Heading::Right),
        "Space" | " " => Control::Press(Button::Action),
        "Enter" | "NumpadEnter" => Control::Press(Button::Start),
        _ => return None,
    };
    Some(control)
}

/// Map a legacy `KeyboardEvent.keyCode`
pub fn key_code_control(key_code: u32) -> Option<Control> {
    let control = match key_code {
        37 => Control::Move(Heading::Left),
        38 => Control::Move(Heading::Up),
        39 => Control::Move(Heading::Right),
        40 => Control::Move(Heading::Down),
        32 => Control::Press(Button::Action),
        13 => Control::Press(Button::Start),
        _ => return None,
    };
    Some(control)
}

/// Resolve a keyboard event, preferring the layout-independent code
#[cfg(target_arch = "wasm32")]
pub fn event_control(event: &web_sys::KeyboardEvent) -> Option<Control> {
    key_control(&event.code()).or_else(|| key_code_control(event.key_code()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arrows_and_buttons() {
        assert_eq!(key_control("ArrowLeft"), Some(Control::Move(Heading::Left)));
        assert_eq!(key_control("Space"), Some(Control::Press(Button::Action)));
        assert_eq!(key_control("Enter"), Some(Control::Press(Button::Start)));
        assert_eq!(key_control("KeyW"), None);
    }

    #[test]
    fn test_codes_agree_with_names() {
        for (name, code) in [
            ("ArrowLeft", 37),
            ("ArrowUp", 38),
            ("ArrowRight", 39),
            ("ArrowDown", 40),
            ("Space", 32),
            ("Enter", 13),
        ] {
            assert_eq!(key_control(name), key_code_control(code));
        }
        assert_eq!(key_code_control(65), None);
    }
}
