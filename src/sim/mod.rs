//! Game core
//!
//! Everything here runs without a display or a browser:
//! - `scheduler`: frame-driven ticks, deferred calls and timers
//! - `scene`: the node arena and containment tree
//! - `motion` and `pacing`: timed movement built on ticks
//! - `collision`: the per-tick engine and its response strategies
//! - `ai`: the enemy fleet
//!
//! `Sim` ties them together and is passed explicitly to every callback.

pub mod ai;
pub mod characters;
pub mod collision;
pub mod direction;
pub mod entity;
pub mod events;
pub mod geom;
pub mod input;
pub mod motion;
pub mod pacing;
pub mod scene;
pub mod scheduler;
pub mod volumes;
pub mod weapon;
pub mod world;

pub use ai::{Ai, EnemyFleet, ZombieRaid};
pub use collision::{Engine, Watch};
pub use direction::{Direction, Heading, VectorDirection};
pub use entity::{
    Bullet, BulletPreset, BulletStrategy, Character, Collidable, Directional, Entity, EntityKind,
    LifeBearing, LifeGauge, Role, SwordPreset, VolumeKind, Weapon, WeaponKind, Weaponized,
};
pub use events::{NodeEvent, NodeEventKind, Propagation};
pub use geom::{Bounds, Rect, Side};
pub use input::{Button, Control, Joystick};
pub use motion::{CrossOptions, CrossPhase, SharedSpeed, SpeedSource};
pub use pacing::{PaceEvent, PaceKind, PacerId};
pub use scene::{Node, NodeId, Scene};
pub use scheduler::{TickId, TimerId};
pub use world::Sim;
