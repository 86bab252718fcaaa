//! Zombie Raid - a top-down arcade shooter
//!
//! Core modules:
//! - `sim`: Tick scheduler, scene graph, motion, collisions and fleet AI
//! - `game`: Bootstrap wiring the player, engine and raid together
//! - `renderer`: Render sink trait and the DOM renderer
//! - `platform`: Keyboard mapping
//! - `config`: Data-driven game balance

pub mod config;
pub mod error;
pub mod game;
pub mod platform;
pub mod renderer;
pub mod sim;

pub use config::GameConfig;
pub use error::{Result, SimError};
pub use game::Game;

/// Game configuration constants
pub mod consts {
    /// Viewport dimensions in CSS pixels
    pub const VIEWPORT_WIDTH: f32 = 480.0;
    pub const VIEWPORT_HEIGHT: f32 = 270.0;

    /// Vertical slack before two characters count as touching
    pub const COLLISION_THRESHOLD: f32 = 10.0;

    /// Host frame interval used by the headless runner
    pub const FRAME_MS: f64 = 16.0;
}
