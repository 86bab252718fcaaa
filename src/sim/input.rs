//! Logical game input
//!
//! The joystick holds the currently pressed directions, in press order and
//! at most two of them, plus a queue of button presses waiting to be consumed.

use std::collections::VecDeque;

use super::direction::{Direction, Heading};

/// Maximum simultaneously held directions
pub const MAX_DIRECTIONS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    /// Fire the player's weapon
    Action,
    /// Toggle pause
    Start,
}

/// A logical control a host key maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Move(Heading),
    Press(Button),
}

#[derive(Debug, Clone, Default)]
pub struct Joystick {
    directions: Vec<Heading>,
    buttons: VecDeque<Button>,
}

impl Joystick {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key went down. Directions register immediately.
    pub fn key_down(&mut self, control: Control) {
        if let Control::Move(heading) = control {
            if !self.directions.contains(&heading) && self.directions.len() < MAX_DIRECTIONS {
                self.directions.push(heading);
            }
        }
    }

    /// Key went up. Buttons count as pressed on release.
    pub fn key_up(&mut self, control: Control) {
        match control {
            Control::Move(heading) => self.directions.retain(|&h| h != heading),
            Control::Press(button) => self.buttons.push_back(button),
        }
    }

    /// Held directions in press order
    pub fn directions(&self) -> &[Heading] {
        &self.directions
    }

    /// Combined held direction
    pub fn direction(&self) -> Direction {
        Direction::from_headings(&self.directions)
    }

    /// Consume one queued press of `button`
    pub fn take(&mut self, button: Button) -> bool {
        match self.buttons.iter().position(|&b| b == button) {
            Some(pos) => {
                self.buttons.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn pending(&self, button: Button) -> usize {
        self.buttons.iter().filter(|&&b| b == button).count()
    }

    pub fn clear_buttons(&mut self) {
        self.buttons.clear();
    }

    /// Release everything, e.g. when the host window loses focus
    pub fn reset(&mut self) {
        self.directions.clear();
        self.buttons.clear();
    }
}
