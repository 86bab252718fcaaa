//! Enemy AI
//!
//! The fleet is a grid of enemies sharing one live speed. Every member fires
//! at random intervals and paces its row's lane, sliding down a notch at each
//! turn. Destroyed members make the survivors faster.

use serde_json::Value;

use super::characters::character_node;
use super::entity::{Role, Weapon};
use super::events::{NodeEventKind, Propagation};
use super::geom::Rect;
use super::motion::{CrossOptions, SharedSpeed, SpeedSource};
use super::pacing::{PaceEvent, PaceKind};
use super::scene::{NodeId, Scene};
use super::world::Sim;
use crate::config::FleetConfig;
use crate::error::Result;

/// Metadata key holding a fleet member's row
pub const FLEET_ROW_KEY: &str = "fleetRow";

pub trait Ai {
    /// Populate the stage and set the characters in motion
    fn start(&mut self, sim: &mut Sim) -> Result<()>;

    /// Every character this AI has spawned, dead or alive
    fn characters(&self) -> &[NodeId];

    /// First live character whose rectangle overlaps `rect`
    fn hits_character(&self, scene: &Scene, rect: &Rect) -> Option<NodeId> {
        self.characters().iter().copied().find(|&id| {
            scene.exists(id)
                && scene.get(id).and_then(|n| n.container()).is_some()
                && scene.rect(id).is_some_and(|r| r.intersects(rect))
        })
    }
}

pub struct EnemyFleet {
    config: FleetConfig,
    speed: SharedSpeed,
    enemies: Vec<NodeId>,
}

impl EnemyFleet {
    pub fn new(config: FleetConfig) -> Self {
        let speed = SharedSpeed::new(config.initial_step);
        Self {
            config,
            speed,
            enemies: Vec::new(),
        }
    }

    /// Live pacing speed of every member
    pub fn speed(&self) -> &SharedSpeed {
        &self.speed
    }

    fn spawn_enemy(&mut self, sim: &mut Sim, row: u32, col: u32) -> Result<NodeId> {
        let c = &self.config;
        let pitch = c.enemy_size + c.spacing;
        let (x, y) = (c.origin_x + pitch * col as f32, c.origin_y + pitch * row as f32);

        let enemy = sim.scene.spawn(
            character_node(Role::Enemy, x, y, c.enemy_size, c.enemy_size, c.enemy_life, c.enemy_life)
                .with_group("darkforce"),
        );
        if let Some(entity) = sim.scene.entity_mut(enemy) {
            entity.life_impact = c.contact_impact;
        }
        sim.scene.set_meta(enemy, FLEET_ROW_KEY, Value::from(row));
        let stage = sim.stage();
        sim.add_child(stage, enemy)?;

        let gun = sim.spawn_weapon(Weapon::gun(c.bullet));
        sim.arm(enemy, gun);

        let (speed, increment) = (self.speed.clone(), c.speed_increment);
        sim.add_listener_once(enemy, NodeEventKind::Removed, move |_: &mut Sim, _| {
            speed.add(increment);
            Propagation::Continue
        });

        self.enemies.push(enemy);
        Ok(enemy)
    }
}

impl Ai for EnemyFleet {
    fn start(&mut self, sim: &mut Sim) -> Result<()> {
        for row in 0..self.config.rows {
            for col in 0..self.config.cols {
                let enemy = self.spawn_enemy(sim, row, col)?;
                schedule_fire(sim, enemy);

                let speed = self.speed.clone();
                let delay = row as f64 * self.config.row_start_delay_ms;
                sim.set_timeout(delay, move |sim: &mut Sim| start_pacing(sim, enemy, row, speed));
            }
        }
        log::info!(
            "Fleet of {}x{} enemies deployed",
            self.config.rows,
            self.config.cols
        );
        Ok(())
    }

    fn characters(&self) -> &[NodeId] {
        &self.enemies
    }
}

fn schedule_fire(sim: &mut Sim, enemy: NodeId) {
    let fleet = &sim.config().fleet;
    let (min, max) = (fleet.min_fire_ms, fleet.max_fire_ms);
    let delay = sim.random_ms(min, max);
    sim.set_timeout(delay, move |sim: &mut Sim| {
        if sim.is_character_alive(enemy) {
            sim.attack(enemy);
            schedule_fire(sim, enemy);
        } else {
            dispose(sim, enemy);
        }
    });
}

fn start_pacing(sim: &mut Sim, enemy: NodeId, row: u32, speed: SharedSpeed) {
    if !sim.is_character_alive(enemy) {
        return;
    }
    let span = sim.config().fleet.pace_span;
    let slide_speed = speed.clone();
    sim.pace(
        enemy,
        PaceKind::Straight {
            size: span,
            vertical: false,
        },
        SpeedSource::Shared(speed),
        move |sim: &mut Sim, node: NodeId, event: PaceEvent| {
            if !sim.is_character_alive(node) {
                return false;
            }
            if matches!(event, PaceEvent::Reverse | PaceEvent::Lap) {
                slide_down(sim, node, row, slide_speed.clone());
            }
            true
        },
    );
}

/// Drop one notch after a delay that grows with the distance from the
/// bottom row, so the fleet folds down from the front
fn slide_down(sim: &mut Sim, enemy: NodeId, row: u32, speed: SharedSpeed) {
    let fleet = &sim.config().fleet;
    let last_row = fleet.rows.saturating_sub(1);
    let delay = f64::from(row.abs_diff(last_row)) * fleet.slide_delay_ms;
    let distance = fleet.slide_distance;

    sim.set_timeout(delay, move |sim: &mut Sim| {
        if !sim.is_character_alive(enemy) {
            return;
        }
        let options = CrossOptions::new()
            .speed(SpeedSource::Shared(speed))
            .on_complete(|sim: &mut Sim, node: NodeId, _forced: bool| {
                let stage = sim.stage();
                let Some(bounds) = sim.scene.to_bounds(stage, true) else {
                    return;
                };
                if sim.scene.is_out_of_bounds(node, Some(&bounds)) {
                    dispose(sim, node);
                }
            });
        sim.cross(enemy, 0.0, distance, options);
    });
}

/// Take a member and its gun out of the game for good
fn dispose(sim: &mut Sim, enemy: NodeId) {
    let gun = sim
        .scene
        .entity(enemy)
        .and_then(|e| e.character())
        .and_then(|c| c.weapon);
    if let Some(gun) = gun {
        sim.finalize(gun);
    }
    if sim.finalize(enemy) {
        log::debug!("Fleet member {:?} disposed", enemy);
    }
}

/// The zombie raid: one fleet descending on the player
pub struct ZombieRaid {
    fleet: EnemyFleet,
}

impl ZombieRaid {
    pub fn new(config: FleetConfig) -> Self {
        Self {
            fleet: EnemyFleet::new(config),
        }
    }

    pub fn fleet(&self) -> &EnemyFleet {
        &self.fleet
    }
}

impl Ai for ZombieRaid {
    fn start(&mut self, sim: &mut Sim) -> Result<()> {
        log::info!("Zombie raid starting");
        self.fleet.start(sim)
    }

    fn characters(&self) -> &[NodeId] {
        self.fleet.characters()
    }
}
