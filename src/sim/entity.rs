//! Entity payloads and capability traits
//!
//! Entities are scene nodes carrying an `Entity` payload. Behavior is split
//! into small capabilities instead of a class chain:
//! - `LifeBearing`: characters with a life gauge
//! - `Directional`: every entity has a heading
//! - `Weaponized`: characters that can hold a weapon
//! - `Collidable`: eligibility to collide with another entity
//!
//! Concrete variants live in `EntityKind` and are dispatched with `match`.

use serde::{Deserialize, Serialize};

use super::direction::{Direction, VectorDirection};
use super::scene::NodeId;
use super::scheduler::TickId;

/// Current and maximum life points; life is clamped to `[0, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifeGauge {
    life: i32,
    max: i32,
}

impl LifeGauge {
    pub fn new(life: i32, max: i32) -> Self {
        let max = max.max(0);
        Self {
            life: life.clamp(0, max),
            max,
        }
    }

    pub fn life(&self) -> i32 {
        self.life
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn set_life(&mut self, life: i32) {
        self.life = life.clamp(0, self.max);
    }

    pub fn set_max(&mut self, max: i32) {
        self.max = max.max(0);
        self.life = self.life.min(self.max);
    }

    /// Apply a signed change and return the new life
    pub fn update(&mut self, delta: i32) -> i32 {
        self.set_life(self.life.saturating_add(delta));
        self.life
    }

    pub fn is_depleted(&self) -> bool {
        self.life <= 0
    }

    /// Remaining life as a fraction of max
    pub fn ratio(&self) -> f32 {
        if self.max == 0 {
            0.0
        } else {
            self.life as f32 / self.max as f32
        }
    }
}

/// What kind of character a node is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Player,
    Enemy,
    /// Scripted non-hostile character
    Actor,
}

/// Moving, optionally mortal entity
#[derive(Debug, Clone, PartialEq)]
pub struct Character {
    pub role: Role,
    pub in_motion: bool,
    /// Uncollidable with other characters while set
    pub ghost: bool,
    pub life: Option<LifeGauge>,
    pub weapon: Option<NodeId>,
    /// Meter node of an attached life bar
    pub life_bar: Option<NodeId>,
}

impl Character {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            in_motion: false,
            ghost: false,
            life: None,
            weapon: None,
            life_bar: None,
        }
    }

    pub fn with_life(mut self, life: i32, max: i32) -> Self {
        self.life = Some(LifeGauge::new(life, max));
        self
    }
}

/// Static obstacles and their collision behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolumeKind {
    /// No collision response
    Plain,
    /// Pushes colliding characters and volumes out
    Boundary,
    /// Crumbles when hit by a bullet or an enemy
    Brick,
    /// Swept away by the player
    Dust,
    /// Shoved by the player
    Pushable,
}

/// How a bullet picks its flight direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BulletStrategy {
    /// The attacker's current heading
    PlayerDirection,
    /// The heading set on the bullet before firing
    StaticDirection,
    /// Target seeking; not supported, flies like `StaticDirection`
    DynamicDirection,
}

/// Bullet archetypes a gun can load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BulletPreset {
    /// Small fast bullet following the attacker's heading
    Tiny,
    /// Slow bullet flying up for the player side, down otherwise
    UpOrDown,
}

/// Physical properties of a bullet preset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BulletSpec {
    pub width: f32,
    pub height: f32,
    pub speed: f32,
    pub life_impact: i32,
    pub strategy: BulletStrategy,
}

impl BulletPreset {
    pub fn spec(&self) -> BulletSpec {
        match self {
            BulletPreset::Tiny => BulletSpec {
                width: 5.0,
                height: 5.0,
                speed: 5.0,
                life_impact: -5,
                strategy: BulletStrategy::PlayerDirection,
            },
            BulletPreset::UpOrDown => BulletSpec {
                width: 5.0,
                height: 5.0,
                speed: 1.0,
                life_impact: -5,
                strategy: BulletStrategy::StaticDirection,
            },
        }
    }

    pub fn group(&self) -> &'static str {
        match self {
            BulletPreset::Tiny => "tinybullet",
            BulletPreset::UpOrDown => "upordownbullet",
        }
    }
}

/// Melee weapons drawn for a short time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwordPreset {
    ExCalibur,
    RedBane,
}

impl SwordPreset {
    /// Drawn size (width, height)
    pub fn size(&self) -> (f32, f32) {
        match self {
            SwordPreset::ExCalibur => (21.0, 35.0),
            SwordPreset::RedBane => (48.0, 24.0),
        }
    }

    /// How long the sword stays drawn
    pub fn draw_ms(&self) -> f64 {
        match self {
            SwordPreset::ExCalibur => 250.0,
            SwordPreset::RedBane => 400.0,
        }
    }

    pub fn group(&self) -> &'static str {
        match self {
            SwordPreset::ExCalibur => "excalibur",
            SwordPreset::RedBane => "redbane",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WeaponKind {
    /// `ammo: None` is unlimited
    Gun {
        ammo: Option<u32>,
        bullet: BulletPreset,
    },
    Sword {
        preset: SwordPreset,
        drawn: bool,
    },
}

/// A weapon held by an attacker
#[derive(Debug, Clone, PartialEq)]
pub struct Weapon {
    pub kind: WeaponKind,
    pub attacker: Option<NodeId>,
    pub on_player_side: bool,
}

impl Weapon {
    pub fn gun(bullet: BulletPreset) -> Self {
        Self {
            kind: WeaponKind::Gun { ammo: None, bullet },
            attacker: None,
            on_player_side: false,
        }
    }

    pub fn sword(preset: SwordPreset) -> Self {
        Self {
            kind: WeaponKind::Sword {
                preset,
                drawn: false,
            },
            attacker: None,
            on_player_side: false,
        }
    }
}

/// A projectile in flight
#[derive(Debug, Clone, PartialEq)]
pub struct Bullet {
    pub weapon: Option<NodeId>,
    pub on_player_side: bool,
    pub strategy: BulletStrategy,
    pub speed: f32,
    /// Degrees; 0 flies along the heading's axes
    pub angle: f32,
    /// Gap between the attacker and the spawn position
    pub initial_pad: f32,
    pub tick: Option<TickId>,
}

impl Bullet {
    pub fn new(weapon: Option<NodeId>, spec: &BulletSpec) -> Self {
        Self {
            weapon,
            on_player_side: false,
            strategy: spec.strategy,
            speed: spec.speed,
            angle: 0.0,
            initial_pad: 0.0,
            tick: None,
        }
    }
}

/// Entity variants
#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    Character(Character),
    Volume(VolumeKind),
    Weapon(Weapon),
    Bullet(Bullet),
}

/// Payload turning a scene node into a collidable entity
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Applied to a character's life on collision; negative is harmful
    pub life_impact: i32,
    pub heading: VectorDirection,
    pub kind: EntityKind,
}

impl Entity {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            life_impact: 0,
            heading: VectorDirection::default(),
            kind,
        }
    }

    pub fn with_life_impact(mut self, life_impact: i32) -> Self {
        self.life_impact = life_impact;
        self
    }

    pub fn is_harmful(&self) -> bool {
        self.life_impact < 0
    }

    pub fn is_helpful(&self) -> bool {
        self.life_impact > 0
    }

    pub fn is_neutral(&self) -> bool {
        self.life_impact == 0
    }

    pub fn character(&self) -> Option<&Character> {
        match &self.kind {
            EntityKind::Character(character) => Some(character),
            _ => None,
        }
    }

    pub fn character_mut(&mut self) -> Option<&mut Character> {
        match &mut self.kind {
            EntityKind::Character(character) => Some(character),
            _ => None,
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.character().map(|c| c.role)
    }

    pub fn is_character(&self) -> bool {
        self.character().is_some()
    }

    pub fn is_player(&self) -> bool {
        self.role() == Some(Role::Player)
    }

    pub fn is_enemy(&self) -> bool {
        self.role() == Some(Role::Enemy)
    }

    pub fn is_bullet(&self) -> bool {
        matches!(self.kind, EntityKind::Bullet(_))
    }

    pub fn is_volume(&self) -> bool {
        matches!(self.kind, EntityKind::Volume(_))
    }

    pub fn volume(&self) -> Option<VolumeKind> {
        match self.kind {
            EntityKind::Volume(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn bullet(&self) -> Option<&Bullet> {
        match &self.kind {
            EntityKind::Bullet(bullet) => Some(bullet),
            _ => None,
        }
    }

    pub fn bullet_mut(&mut self) -> Option<&mut Bullet> {
        match &mut self.kind {
            EntityKind::Bullet(bullet) => Some(bullet),
            _ => None,
        }
    }

    pub fn weapon(&self) -> Option<&Weapon> {
        match &self.kind {
            EntityKind::Weapon(weapon) => Some(weapon),
            _ => None,
        }
    }

    pub fn weapon_mut(&mut self) -> Option<&mut Weapon> {
        match &mut self.kind {
            EntityKind::Weapon(weapon) => Some(weapon),
            _ => None,
        }
    }

    /// Side of a weapon or bullet; `None` for everything else
    pub fn weaponry_side(&self) -> Option<bool> {
        match &self.kind {
            EntityKind::Weapon(weapon) => Some(weapon.on_player_side),
            EntityKind::Bullet(bullet) => Some(bullet.on_player_side),
            _ => None,
        }
    }

    pub fn is_weaponry(&self) -> bool {
        self.weaponry_side().is_some()
    }
}

pub trait LifeBearing {
    fn gauge(&self) -> Option<&LifeGauge>;
    fn gauge_mut(&mut self) -> Option<&mut LifeGauge>;

    /// Has a gauge with life left
    fn is_alive(&self) -> bool {
        self.gauge().is_some_and(|gauge| gauge.life() > 0)
    }
}

impl LifeBearing for Character {
    fn gauge(&self) -> Option<&LifeGauge> {
        self.life.as_ref()
    }

    fn gauge_mut(&mut self) -> Option<&mut LifeGauge> {
        self.life.as_mut()
    }
}

impl LifeBearing for Entity {
    fn gauge(&self) -> Option<&LifeGauge> {
        self.character().and_then(|c| c.gauge())
    }

    fn gauge_mut(&mut self) -> Option<&mut LifeGauge> {
        self.character_mut().and_then(|c| c.gauge_mut())
    }
}

pub trait Directional {
    fn heading(&self) -> VectorDirection;
    fn set_direction(&mut self, direction: Direction);

    fn direction(&self) -> Direction {
        self.heading().direction
    }
}

impl Directional for Entity {
    fn heading(&self) -> VectorDirection {
        self.heading
    }

    fn set_direction(&mut self, direction: Direction) {
        self.heading.direction = direction;
    }
}

pub trait Weaponized {
    fn weapon(&self) -> Option<NodeId>;
    fn set_weapon(&mut self, weapon: Option<NodeId>);
}

impl Weaponized for Character {
    fn weapon(&self) -> Option<NodeId> {
        self.weapon
    }

    fn set_weapon(&mut self, weapon: Option<NodeId>) {
        self.weapon = weapon;
    }
}

/// Global collision switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CollisionRules {
    pub bullets_hit_bullets: bool,
}

pub trait Collidable {
    /// Whether this entity reacts to touching `other`. Evaluated from one
    /// side only; the other entity decides for itself.
    fn is_collidable_with(&self, other: &Entity, rules: &CollisionRules) -> bool;
}

impl Collidable for Entity {
    fn is_collidable_with(&self, other: &Entity, rules: &CollisionRules) -> bool {
        match &self.kind {
            EntityKind::Character(character) => {
                if character.ghost && other.is_character() {
                    return false;
                }
                match character.role {
                    Role::Player => other.weaponry_side() != Some(true),
                    Role::Enemy => other.weaponry_side() != Some(false),
                    Role::Actor => true,
                }
            }
            EntityKind::Bullet(bullet) => {
                if other.is_bullet() && !rules.bullets_hit_bullets {
                    return false;
                }
                match other.role() {
                    Some(Role::Player) => !bullet.on_player_side,
                    Some(Role::Enemy) => bullet.on_player_side,
                    _ => true,
                }
            }
            EntityKind::Volume(_) | EntityKind::Weapon(_) => true,
        }
    }
}
