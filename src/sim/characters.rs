//! Character construction, life bars and the player controller

use super::direction::Direction;
use super::entity::{BulletPreset, Character, Directional, Entity, EntityKind, LifeBearing, Role, Weapon};
use super::geom::Bounds;
use super::input::Button;
use super::scene::{Node, NodeId};
use super::scheduler::TickId;
use super::world::Sim;
use crate::error::{Result, SimError};

pub const LIFE_BAR_WIDTH: f32 = 15.0;
pub const LIFE_BAR_HEIGHT: f32 = 2.0;
/// Gap between the top of the life bar and the character
const LIFE_BAR_OFFSET: f32 = 4.0;

impl Role {
    pub fn group(&self) -> &'static str {
        match self {
            Role::Player => "player",
            Role::Enemy => "enemy",
            Role::Actor => "actor",
        }
    }
}

/// Detached character node. Characters are containers so that drawn swords
/// and life bars can ride along.
pub fn character_node(role: Role, x: f32, y: f32, width: f32, height: f32, life: i32, max: i32) -> Node {
    Node::new(x, y, width, height)
        .into_container()
        .with_group("character")
        .with_group(role.group())
        .with_entity(Entity::new(EntityKind::Character(
            Character::new(role).with_life(life, max),
        )))
}

impl Sim {
    /// Build the player at the bottom centre of the stage, armed and facing
    /// up, confined to a band one player-height tall
    pub fn spawn_player(&mut self) -> Result<NodeId> {
        let player_config = self.config().player.clone();
        let (vw, vh) = (self.config().viewport_width, self.config().viewport_height);
        let (pw, ph) = (player_config.width, player_config.height);

        let player = self.scene.spawn(
            character_node(Role::Player, 0.0, 0.0, pw, ph, player_config.life, player_config.max_life)
                .with_group("hero")
                .with_step_size(player_config.step_size),
        );
        let stage = self.stage();
        self.add_child(stage, player)?;
        self.scene
            .set_bounds(player, Some(Bounds::new(vh - 2.0 * ph, vw - pw, vh - ph, 0.0)));

        let gun = self.spawn_weapon(Weapon::gun(BulletPreset::Tiny));
        self.arm(player, gun);
        self.scene.move_to(player, vw / 2.0 - pw / 2.0, vh - ph);
        if let Some(entity) = self.scene.entity_mut(player) {
            entity.set_direction(Direction::UP);
        }

        self.player = Some(player);
        log::debug!("Player spawned as {:?}", player);
        Ok(player)
    }

    /// Register the per-tick joystick handler for the player
    pub fn start_player_control(&mut self) -> Result<TickId> {
        self.scheduler
            .register(|sim: &mut Sim| sim.control_player())
    }

    fn control_player(&mut self) {
        let Some(player) = self.player.filter(|&p| self.scene.exists(p)) else {
            return;
        };
        while self.joystick.take(Button::Action) {
            self.attack(player);
        }

        let headings = self.joystick.directions().to_vec();
        let direction = self.joystick.direction();
        let Some(entity) = self.scene.entity_mut(player) else {
            return;
        };
        if let Some(character) = entity.character_mut() {
            character.in_motion = !headings.is_empty();
        }
        if headings.is_empty() {
            return;
        }
        entity.set_direction(direction);
        for heading in headings {
            self.step(player, heading, None);
        }
    }

    /// Hang a life bar above a character: a frame holding a meter whose
    /// width follows the life ratio
    pub fn attach_life_bar(&mut self, character: NodeId) -> Result<NodeId> {
        let rect = self
            .scene
            .rect(character)
            .ok_or(SimError::NodeNotFound(character))?;
        if self.scene.entity(character).and_then(|e| e.character()).is_none() {
            return Err(SimError::NodeNotFound(character));
        }

        let frame = self.scene.spawn(
            Node::new(
                rect.width / 2.0 - LIFE_BAR_WIDTH / 2.0,
                -LIFE_BAR_OFFSET,
                LIFE_BAR_WIDTH,
                LIFE_BAR_HEIGHT,
            )
            .into_container()
            .with_group("lifebar"),
        );
        let meter = self.scene.spawn(
            Node::new(0.0, 0.0, LIFE_BAR_WIDTH, LIFE_BAR_HEIGHT).with_group("lifebar-meter"),
        );
        self.add_child(frame, meter)?;
        self.add_child(character, frame)?;

        if let Some(c) = self.scene.entity_mut(character).and_then(|e| e.character_mut()) {
            c.life_bar = Some(meter);
        }
        self.refresh_life_bar(character);
        Ok(frame)
    }

    pub fn refresh_life_bar(&mut self, character: NodeId) {
        let Some(c) = self.scene.entity(character).and_then(|e| e.character()) else {
            return;
        };
        let (Some(meter), Some(gauge)) = (c.life_bar, c.gauge().copied()) else {
            return;
        };
        if self.scene.exists(meter) {
            self.scene
                .set_size(meter, gauge.ratio() * LIFE_BAR_WIDTH, LIFE_BAR_HEIGHT);
        }
    }

    /// Apply a signed life change; returns the new life
    pub fn update_life(&mut self, character: NodeId, delta: i32) -> Option<i32> {
        let life = self
            .scene
            .entity_mut(character)?
            .gauge_mut()
            .map(|gauge| gauge.update(delta))?;
        self.refresh_life_bar(character);
        Some(life)
    }

    /// Alive and still in the scene
    pub fn is_character_alive(&self, character: NodeId) -> bool {
        self.scene.exists(character)
            && self.scene.entity(character).is_some_and(|e| e.is_alive())
            && self.scene.get(character).and_then(|n| n.container()).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::sim::direction::Heading;
    use crate::sim::input::Control;

    fn sim() -> Sim {
        Sim::new(GameConfig::default()).unwrap()
    }

    #[test]
    fn test_spawn_player_places_and_arms() {
        let mut sim = sim();
        let player = sim.spawn_player().unwrap();
        let rect = sim.scene.rect(player).unwrap();
        assert_eq!((rect.x, rect.y), (232.0, 254.0));
        assert_eq!(sim.player(), Some(player));

        let entity = sim.scene.entity(player).unwrap();
        assert_eq!(entity.direction(), Direction::UP);
        let gun = entity.character().unwrap().weapon.unwrap();
        assert_eq!(sim.scene.entity(gun).unwrap().weaponry_side(), Some(true));
        assert!(sim.scene.get(player).unwrap().has_group("hero"));
    }

    #[test]
    fn test_player_follows_joystick_inside_its_band() {
        let mut sim = sim();
        let player = sim.spawn_player().unwrap();
        sim.start_player_control().unwrap();

        sim.joystick.key_down(Control::Move(Heading::Left));
        sim.joystick.key_down(Control::Move(Heading::Up));
        sim.tick();
        let rect = sim.scene.rect(player).unwrap();
        assert_eq!((rect.x, rect.y), (229.0, 251.0));
        let entity = sim.scene.entity(player).unwrap();
        assert_eq!(entity.direction(), Direction::UP_LEFT);
        assert!(entity.character().unwrap().in_motion);

        for _ in 0..10 {
            sim.tick();
        }
        assert_eq!(sim.scene.rect(player).unwrap().y, 238.0);

        sim.joystick.reset();
        sim.tick();
        assert!(!sim.scene.entity(player).unwrap().character().unwrap().in_motion);
    }

    #[test]
    fn test_action_button_fires() {
        let mut sim = sim();
        sim.spawn_player().unwrap();
        sim.start_player_control().unwrap();
        sim.joystick.key_up(Control::Press(Button::Action));
        sim.tick();
        let stage = sim.stage();
        assert_eq!(
            sim.scene
                .children_where(stage, |_, n| n.has_group("bullet"))
                .len(),
            1
        );
    }

    #[test]
    fn test_life_bar_tracks_ratio() {
        let mut sim = sim();
        let stage = sim.stage();
        let enemy = sim
            .scene
            .spawn(character_node(Role::Enemy, 10.0, 10.0, 16.0, 16.0, 4, 4));
        sim.add_child(stage, enemy).unwrap();
        let frame = sim.attach_life_bar(enemy).unwrap();
        assert_eq!(sim.scene.rect(frame).unwrap().x, 0.5);

        assert_eq!(sim.update_life(enemy, -1), Some(3));
        let meter = sim.scene.entity(enemy).unwrap().character().unwrap().life_bar.unwrap();
        assert_eq!(sim.scene.rect(meter).unwrap().width, 11.25);

        assert_eq!(sim.update_life(enemy, -10), Some(0));
        assert!(!sim.is_character_alive(enemy));
    }
}
