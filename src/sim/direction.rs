//! Multi-directional headings
//!
//! A `Direction` is a set of the four cardinal flags. It is ambiguous when both
//! flags of one axis are set (e.g. up and down held together), and
//! `disambiguate` resolves that to one flag per axis.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single cardinal direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Heading {
    Up,
    Left,
    Down,
    Right,
}

impl Heading {
    pub const ALL: [Heading; 4] = [Heading::Up, Heading::Left, Heading::Down, Heading::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Heading::Up => "up",
            Heading::Left => "left",
            Heading::Down => "down",
            Heading::Right => "right",
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Heading::Up => Heading::Down,
            Heading::Left => Heading::Right,
            Heading::Down => Heading::Up,
            Heading::Right => Heading::Left,
        }
    }

    pub fn is_vertical(self) -> bool {
        matches!(self, Heading::Up | Heading::Down)
    }

    /// Unit offset in screen space (y grows downward)
    pub fn offset(self) -> (f32, f32) {
        match self {
            Heading::Up => (0.0, -1.0),
            Heading::Left => (-1.0, 0.0),
            Heading::Down => (0.0, 1.0),
            Heading::Right => (1.0, 0.0),
        }
    }
}

/// Axes on which a direction holds conflicting flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AmbiguousAxes {
    pub y: bool,
    pub x: bool,
}

impl AmbiguousAxes {
    pub fn any(&self) -> bool {
        self.x || self.y
    }
}

/// Set of cardinal flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Direction {
    up: bool,
    left: bool,
    down: bool,
    right: bool,
}

impl Direction {
    pub const NONE: Direction = Direction::flags(false, false, false, false);
    pub const UP: Direction = Direction::flags(true, false, false, false);
    pub const LEFT: Direction = Direction::flags(false, true, false, false);
    pub const DOWN: Direction = Direction::flags(false, false, true, false);
    pub const RIGHT: Direction = Direction::flags(false, false, false, true);
    pub const UP_LEFT: Direction = Direction::flags(true, true, false, false);
    pub const UP_RIGHT: Direction = Direction::flags(true, false, false, true);
    pub const DOWN_LEFT: Direction = Direction::flags(false, true, true, false);
    pub const DOWN_RIGHT: Direction = Direction::flags(false, false, true, true);

    const fn flags(up: bool, left: bool, down: bool, right: bool) -> Self {
        Self {
            up,
            left,
            down,
            right,
        }
    }

    pub fn from_headings(headings: &[Heading]) -> Self {
        headings
            .iter()
            .fold(Direction::NONE, |dir, &heading| dir.with(heading))
    }

    /// Parse the concatenated form used by sprite classes, e.g. `"upleft"`.
    /// Unknown text contributes nothing.
    pub fn parse(text: &str) -> Self {
        let text = text.to_ascii_lowercase();
        let mut dir = Direction::NONE;
        for heading in Heading::ALL {
            if text.contains(heading.as_str()) {
                dir = dir.with(heading);
            }
        }
        dir
    }

    pub fn with(mut self, heading: Heading) -> Self {
        match heading {
            Heading::Up => self.up = true,
            Heading::Left => self.left = true,
            Heading::Down => self.down = true,
            Heading::Right => self.right = true,
        }
        self
    }

    pub fn contains(&self, heading: Heading) -> bool {
        match heading {
            Heading::Up => self.up,
            Heading::Left => self.left,
            Heading::Down => self.down,
            Heading::Right => self.right,
        }
    }

    /// Set flags in up, left, down, right order
    pub fn headings(&self) -> Vec<Heading> {
        Heading::ALL
            .into_iter()
            .filter(|&heading| self.contains(heading))
            .collect()
    }

    pub fn count(&self) -> usize {
        [self.up, self.left, self.down, self.right]
            .iter()
            .filter(|&&flag| flag)
            .count()
    }

    pub fn is_none(&self) -> bool {
        self.count() == 0
    }

    pub fn is_multiple(&self) -> bool {
        self.count() > 1
    }

    pub fn ambiguous_axes(&self) -> AmbiguousAxes {
        AmbiguousAxes {
            y: self.up && self.down,
            x: self.left && self.right,
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        self.ambiguous_axes().any()
    }

    pub fn has_y(&self) -> bool {
        self.up || self.down
    }

    pub fn has_x(&self) -> bool {
        self.left || self.right
    }

    /// Vertical component, preferring up when ambiguous
    pub fn y(&self) -> Option<Heading> {
        if self.up {
            Some(Heading::Up)
        } else if self.down {
            Some(Heading::Down)
        } else {
            None
        }
    }

    /// Horizontal component, preferring left when ambiguous
    pub fn x(&self) -> Option<Heading> {
        if self.left {
            Some(Heading::Left)
        } else if self.right {
            Some(Heading::Right)
        } else {
            None
        }
    }

    pub fn opposite(&self) -> Self {
        Self {
            up: self.down,
            left: self.right,
            down: self.up,
            right: self.left,
        }
    }

    /// Resolve conflicting axes to a single flag each.
    ///
    /// The winner depends on the starting reference and the winding order:
    ///
    /// | winding | start | vertical | horizontal |
    /// |---------|-------|----------|------------|
    /// | cw      | up    | up       | right      |
    /// | cw      | right | down     | right      |
    /// | cw      | down  | down     | left       |
    /// | cw      | left  | up       | left       |
    /// | ccw     | up    | up       | left       |
    /// | ccw     | left  | down     | left       |
    /// | ccw     | down  | down     | right      |
    /// | ccw     | right | up       | right      |
    ///
    /// Axes that are not in conflict are carried over unchanged.
    pub fn disambiguate(&self, starting: Heading, clockwise: bool) -> Self {
        let axes = self.ambiguous_axes();
        if !axes.any() {
            return *self;
        }

        let (vertical, horizontal) = match (clockwise, starting) {
            (true, Heading::Up) => (Heading::Up, Heading::Right),
            (true, Heading::Right) => (Heading::Down, Heading::Right),
            (true, Heading::Down) => (Heading::Down, Heading::Left),
            (true, Heading::Left) => (Heading::Up, Heading::Left),
            (false, Heading::Up) => (Heading::Up, Heading::Left),
            (false, Heading::Left) => (Heading::Down, Heading::Left),
            (false, Heading::Down) => (Heading::Down, Heading::Right),
            (false, Heading::Right) => (Heading::Up, Heading::Right),
        };

        let mut resolved = *self;
        if axes.y {
            resolved.up = vertical == Heading::Up;
            resolved.down = vertical == Heading::Down;
        }
        if axes.x {
            resolved.left = horizontal == Heading::Left;
            resolved.right = horizontal == Heading::Right;
        }
        resolved
    }

    /// `disambiguate` starting from up, counter-clockwise
    pub fn disambiguate_default(&self) -> Self {
        self.disambiguate(Heading::Up, false)
    }
}

impl From<Heading> for Direction {
    fn from(heading: Heading) -> Self {
        Direction::NONE.with(heading)
    }
}

impl fmt::Display for Direction {
    /// Sprite-class form: up, down, left, right in that order
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, name) in [
            (self.up, "up"),
            (self.down, "down"),
            (self.left, "left"),
            (self.right, "right"),
        ] {
            if flag {
                f.write_str(name)?;
            }
        }
        Ok(())
    }
}

/// A direction with a magnitude, used for knockback
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VectorDirection {
    pub direction: Direction,
    pub magnitude: f32,
}

impl VectorDirection {
    pub fn new(direction: Direction, magnitude: f32) -> Self {
        Self {
            direction,
            magnitude,
        }
    }
}
