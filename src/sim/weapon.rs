//! Weapons and projectiles
//!
//! A weapon is a scene node carrying a `Weapon` payload. Guns stay out of the
//! scene and spawn bullets into the attacker's container; swords are added to
//! the attacker while drawn and sheathed again by a timer.

use super::direction::{Direction, Heading, VectorDirection};
use super::entity::{
    Bullet, BulletPreset, BulletStrategy, Directional, Entity, EntityKind, Weapon, WeaponKind,
    Weaponized,
};
use super::scene::{Node, NodeId};
use super::world::Sim;

/// Life impact of a drawn sword
pub const SWORD_IMPACT: i32 = -5;

impl Sim {
    /// Spawn a detached weapon node
    pub fn spawn_weapon(&mut self, weapon: Weapon) -> NodeId {
        let mut node = Node::new(0.0, 0.0, 0.0, 0.0).with_group("weapon");
        let mut impact = 0;
        match &weapon.kind {
            WeaponKind::Gun { .. } => node = node.with_group("gun"),
            WeaponKind::Sword { preset, .. } => {
                node = node.with_group("sword").with_group(preset.group());
                impact = SWORD_IMPACT;
            }
        }
        let entity = Entity::new(EntityKind::Weapon(weapon)).with_life_impact(impact);
        self.scene.spawn(node.with_entity(entity))
    }

    /// Hand `weapon` to `attacker`. The weapon takes the attacker's side and
    /// a previously held weapon is released.
    pub fn arm(&mut self, attacker: NodeId, weapon: NodeId) -> bool {
        let Some(character) = self.scene.entity(attacker).and_then(|e| e.character()) else {
            return false;
        };
        let on_player_side = self.scene.entity(attacker).is_some_and(|e| e.is_player());
        let previous = character.weapon();
        if previous == Some(weapon) {
            return true;
        }
        if let Some(previous) = previous {
            self.release_weapon(previous);
        }

        let Some(held) = self.scene.entity_mut(weapon).and_then(|e| e.weapon_mut()) else {
            return false;
        };
        held.attacker = Some(attacker);
        held.on_player_side = on_player_side;
        if let Some(character) = self.scene.entity_mut(attacker).and_then(|e| e.character_mut()) {
            character.set_weapon(Some(weapon));
        }
        true
    }

    /// Drop the attacker's weapon, if any
    pub fn disarm(&mut self, attacker: NodeId) {
        let Some(weapon) = self
            .scene
            .entity(attacker)
            .and_then(|e| e.character())
            .and_then(|c| c.weapon())
        else {
            return;
        };
        self.release_weapon(weapon);
        if let Some(character) = self.scene.entity_mut(attacker).and_then(|e| e.character_mut()) {
            character.set_weapon(None);
        }
    }

    fn release_weapon(&mut self, weapon: NodeId) {
        if !self.scene.exists(weapon) {
            return;
        }
        if let Some(held) = self.scene.entity_mut(weapon).and_then(|e| e.weapon_mut()) {
            held.attacker = None;
        }
    }

    /// Attack with whatever the node holds. Returns whether anything happened.
    pub fn attack(&mut self, attacker: NodeId) -> bool {
        let Some(weapon) = self
            .scene
            .entity(attacker)
            .and_then(|e| e.character())
            .and_then(|c| c.weapon())
        else {
            return false;
        };
        let Some(kind) = self
            .scene
            .entity(weapon)
            .and_then(|e| e.weapon())
            .map(|w| w.kind.clone())
        else {
            return false;
        };

        match kind {
            WeaponKind::Gun { ammo, bullet } => self.fire_gun(weapon, attacker, ammo, bullet),
            WeaponKind::Sword { drawn, .. } => !drawn && self.draw_sword(weapon, attacker),
        }
    }

    fn fire_gun(
        &mut self,
        weapon: NodeId,
        attacker: NodeId,
        ammo: Option<u32>,
        preset: BulletPreset,
    ) -> bool {
        if ammo == Some(0) {
            return false;
        }
        let Some(container) = self.scene.get(attacker).and_then(|n| n.container()) else {
            return false;
        };
        let on_player_side = self
            .scene
            .entity(weapon)
            .and_then(|e| e.weapon())
            .is_some_and(|w| w.on_player_side);

        let bullet = self.spawn_bullet(Some(weapon), preset, on_player_side);
        if let Err(e) = self.add_child(container, bullet) {
            log::error!("Bullet could not enter {:?}: {}", container, e);
            self.finalize(bullet);
            return false;
        }
        self.fire_bullet(bullet);

        if let Some(WeaponKind::Gun { ammo: Some(left), .. }) = self
            .scene
            .entity_mut(weapon)
            .and_then(|e| e.weapon_mut())
            .map(|w| &mut w.kind)
        {
            *left = left.saturating_sub(1);
        }
        true
    }

    /// Spawn a detached bullet of the given preset
    pub fn spawn_bullet(
        &mut self,
        weapon: Option<NodeId>,
        preset: BulletPreset,
        on_player_side: bool,
    ) -> NodeId {
        let spec = preset.spec();
        let mut bullet = Bullet::new(weapon, &spec);
        bullet.on_player_side = on_player_side;

        let mut entity = Entity::new(EntityKind::Bullet(bullet)).with_life_impact(spec.life_impact);
        if preset == BulletPreset::UpOrDown {
            entity.set_direction(if on_player_side {
                Direction::UP
            } else {
                Direction::DOWN
            });
        }

        self.scene.spawn(
            Node::new(0.0, 0.0, spec.width, spec.height)
                .with_group("bullet")
                .with_group(preset.group())
                .with_entity(entity),
        )
    }

    /// Launch a bullet from its weapon's attacker. The bullet must already
    /// share the attacker's container. A bullet with no attacker or no
    /// direction to fly in is finalized.
    pub fn fire_bullet(&mut self, bullet: NodeId) -> bool {
        let Some(state) = self.scene.entity(bullet).and_then(|e| e.bullet()) else {
            return false;
        };
        let (strategy, pad, own) = (
            state.strategy,
            state.initial_pad,
            self.scene.entity(bullet).map(|e| e.direction()),
        );
        let attacker = state
            .weapon
            .and_then(|w| self.scene.entity(w))
            .and_then(|e| e.weapon())
            .and_then(|w| w.attacker)
            .filter(|&a| self.scene.exists(a));

        let Some(attacker) = attacker else {
            log::debug!("Bullet {:?} has no attacker", bullet);
            self.finalize(bullet);
            return false;
        };

        let direction = match strategy {
            BulletStrategy::PlayerDirection => self.scene.entity(attacker).map(|e| e.direction()),
            BulletStrategy::StaticDirection => own,
            BulletStrategy::DynamicDirection => {
                log::warn!("Target seeking bullets are not supported, flying straight");
                own
            }
        }
        .unwrap_or(Direction::NONE)
        .disambiguate_default();

        if direction.is_none() {
            self.finalize(bullet);
            return false;
        }

        let step = self.scene.get(attacker).map_or(0.0, |n| n.step_size());
        let knockback = self.config().knockback;
        if let Some(entity) = self.scene.entity_mut(bullet) {
            entity.heading = VectorDirection::new(direction, knockback);
            if let Some(state) = entity.bullet_mut() {
                state.speed += step;
            }
        }

        let container = self.scene.get(bullet).and_then(|n| n.container());
        let bounds = container.and_then(|c| self.scene.to_bounds(c, true));
        self.scene.set_bounds(bullet, bounds);

        let (Some(a), Some(b)) = (self.scene.rect(attacker), self.scene.rect(bullet)) else {
            return false;
        };
        let x = match direction.x() {
            Some(Heading::Left) => a.x - (b.width + pad),
            Some(_) => a.right() + pad,
            None => a.x + a.width / 2.0 - b.width / 2.0,
        };
        let y = match direction.y() {
            Some(Heading::Up) => a.y - (b.height + pad),
            Some(_) => a.bottom() + pad,
            None => a.y + a.height / 2.0 - b.height / 2.0,
        };
        self.scene.set_position(bullet, x, y);

        match self.scheduler.register(move |sim: &mut Sim| sim.fly_bullet(bullet)) {
            Ok(tick) => {
                if let Some(state) = self.scene.entity_mut(bullet).and_then(|e| e.bullet_mut()) {
                    state.tick = Some(tick);
                }
                true
            }
            Err(e) => {
                log::error!("Bullet {:?} could not be fired: {}", bullet, e);
                self.finalize(bullet);
                false
            }
        }
    }

    fn fly_bullet(&mut self, bullet: NodeId) {
        if !self.scene.exists(bullet) {
            return;
        }
        let Some(entity) = self.scene.entity(bullet) else {
            return;
        };
        let Some(state) = entity.bullet() else {
            return;
        };
        let direction = entity.direction();
        let speed = state.speed;
        let (dx, dy) = if state.angle == 0.0 {
            let dx = match direction.x() {
                Some(Heading::Left) => -speed,
                Some(_) => speed,
                None => 0.0,
            };
            let dy = match direction.y() {
                Some(Heading::Up) => -speed,
                Some(_) => speed,
                None => 0.0,
            };
            (dx, dy)
        } else {
            // Angled shots move along both axes; up or left flips the sign
            let radians = state.angle.to_radians();
            let (x_factor, y_factor) = (radians.sin() * speed, radians.cos() * speed);
            let mut delta = (0.0, 0.0);
            if direction.contains(Heading::Down) || direction.contains(Heading::Right) {
                delta.0 += x_factor;
                delta.1 += y_factor;
            }
            if direction.contains(Heading::Up) || direction.contains(Heading::Left) {
                delta.0 -= x_factor;
                delta.1 -= y_factor;
            }
            delta
        };

        let Some(rect) = self.scene.rect(bullet) else {
            return;
        };
        let (x, y) = (rect.x + dx, rect.y + dy);
        if self
            .scene
            .bounds(bullet)
            .is_some_and(|bounds| bounds.excludes(x, y))
        {
            self.finalize(bullet);
        } else {
            self.scene.set_position(bullet, x, y);
        }
    }

    fn draw_sword(&mut self, sword: NodeId, attacker: NodeId) -> bool {
        let Some(WeaponKind::Sword { preset, drawn }) = self
            .scene
            .entity_mut(sword)
            .and_then(|e| e.weapon_mut())
            .map(|w| &mut w.kind)
        else {
            return false;
        };
        *drawn = true;
        let preset = *preset;

        let (width, height) = preset.size();
        self.scene.set_size(sword, width, height);
        if let Err(e) = self.add_child(attacker, sword) {
            log::warn!("Sword could not be drawn on {:?}: {}", attacker, e);
            self.sheathe(sword);
            return false;
        }

        self.set_timeout(preset.draw_ms(), move |sim: &mut Sim| {
            if sim.scene.exists(sword) {
                sim.remove(sword);
                sim.sheathe(sword);
            }
        });
        true
    }

    fn sheathe(&mut self, sword: NodeId) {
        if let Some(WeaponKind::Sword { drawn, .. }) = self
            .scene
            .entity_mut(sword)
            .and_then(|e| e.weapon_mut())
            .map(|w| &mut w.kind)
        {
            *drawn = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::sim::entity::{Character, Role, SwordPreset};

    fn sim() -> Sim {
        Sim::new(GameConfig::default()).unwrap()
    }

    fn character(sim: &mut Sim, role: Role, x: f32, y: f32) -> NodeId {
        let node = sim.scene.spawn(
            Node::new(x, y, 16.0, 16.0)
                .into_container()
                .with_step_size(3.0)
                .with_entity(Entity::new(EntityKind::Character(
                    Character::new(role).with_life(1, 1),
                ))),
        );
        let stage = sim.stage();
        sim.add_child(stage, node).unwrap();
        node
    }

    fn bullets(sim: &Sim) -> Vec<NodeId> {
        sim.scene
            .children_where(sim.stage(), |_, n| n.has_group("bullet"))
    }

    #[test]
    fn test_arm_takes_attacker_side() {
        let mut sim = sim();
        let player = character(&mut sim, Role::Player, 0.0, 0.0);
        let enemy = character(&mut sim, Role::Enemy, 40.0, 0.0);
        let gun = sim.spawn_weapon(Weapon::gun(BulletPreset::Tiny));

        assert!(sim.arm(player, gun));
        assert_eq!(sim.scene.entity(gun).unwrap().weaponry_side(), Some(true));

        let other = sim.spawn_weapon(Weapon::gun(BulletPreset::Tiny));
        assert!(sim.arm(player, other));
        assert_eq!(sim.scene.entity(gun).unwrap().weapon().unwrap().attacker, None);

        assert!(sim.arm(enemy, gun));
        assert_eq!(sim.scene.entity(gun).unwrap().weaponry_side(), Some(false));
    }

    #[test]
    fn test_bullet_leaves_stage_and_is_finalized() {
        let mut sim = sim();
        let player = character(&mut sim, Role::Player, 460.0, 100.0);
        sim.scene.entity_mut(player).unwrap().set_direction(Direction::RIGHT);
        let gun = sim.spawn_weapon(Weapon::gun(BulletPreset::Tiny));
        sim.arm(player, gun);

        assert!(sim.attack(player));
        let fired = bullets(&sim);
        assert_eq!(fired.len(), 1);
        let bullet = fired[0];
        assert_eq!(sim.scene.rect(bullet).unwrap().x, 476.0);
        assert_eq!(sim.scene.entity(bullet).unwrap().bullet().unwrap().speed, 8.0);

        sim.tick();
        assert!(sim.scene.get(bullet).is_none());
        assert!(bullets(&sim).is_empty());
    }

    #[test]
    fn test_bullet_flies_along_heading() {
        let mut sim = sim();
        let player = character(&mut sim, Role::Player, 100.0, 100.0);
        sim.scene.entity_mut(player).unwrap().set_direction(Direction::UP);
        let gun = sim.spawn_weapon(Weapon::gun(BulletPreset::Tiny));
        sim.arm(player, gun);
        sim.attack(player);

        let bullet = bullets(&sim)[0];
        let start = sim.scene.rect(bullet).unwrap();
        assert_eq!((start.x, start.y), (105.5, 95.0));
        sim.tick();
        sim.tick();
        assert_eq!(sim.scene.rect(bullet).unwrap().y, 79.0);
        assert_eq!(sim.scene.entity(bullet).unwrap().heading.magnitude, 8.0);
    }

    #[test]
    fn test_straight_bullet_crosses_stage_in_ceil_width_over_speed_ticks() {
        let mut sim = sim();
        let stage = sim.stage();
        let player = character(&mut sim, Role::Player, -12.0, 100.0);
        sim.scene.set_step_size(player, 0.0);
        sim.scene.entity_mut(player).unwrap().set_direction(Direction::RIGHT);
        let gun = sim.spawn_weapon(Weapon::gun(BulletPreset::Tiny));
        sim.arm(player, gun);
        sim.attack(player);

        let bullet = bullets(&sim)[0];
        assert_eq!(sim.scene.rect(bullet).unwrap().x, 4.0);
        assert_eq!(sim.scene.entity(bullet).unwrap().bullet().unwrap().speed, 5.0);

        let ticks = (480.0_f32 / 5.0).ceil() as u32;
        for _ in 1..ticks {
            sim.tick();
        }
        assert_eq!(sim.scene.rect(bullet).unwrap().x, 479.0);
        assert!(sim.scene.contains(stage, bullet));

        // Last flight step, without the end-of-tick reap
        sim.fly_bullet(bullet);
        assert!(sim.scene.is_finalized(bullet));
        assert_eq!(sim.scene.get(bullet).unwrap().container(), None);
        assert!(bullets(&sim).is_empty());
    }

    #[test]
    fn test_angled_bullet_moves_on_both_axes() {
        let mut sim = sim();
        let player = character(&mut sim, Role::Player, 100.0, 100.0);
        sim.scene.entity_mut(player).unwrap().set_direction(Direction::UP);
        let gun = sim.spawn_weapon(Weapon::gun(BulletPreset::Tiny));
        sim.arm(player, gun);
        sim.attack(player);

        let bullet = bullets(&sim)[0];
        sim.scene.entity_mut(bullet).unwrap().bullet_mut().unwrap().angle = 30.0;
        sim.tick();

        let rect = sim.scene.rect(bullet).unwrap();
        assert!((rect.x - 101.5).abs() < 1e-4);
        assert!((rect.y - (95.0 - 8.0 * 30f32.to_radians().cos())).abs() < 1e-4);

        sim.scene.entity_mut(bullet).unwrap().set_direction(Direction::DOWN);
        sim.tick();
        let back = sim.scene.rect(bullet).unwrap();
        assert!((back.x - 105.5).abs() < 1e-4);
        assert!((back.y - 95.0).abs() < 1e-4);
    }

    #[test]
    fn test_up_or_down_follows_side() {
        let mut sim = sim();
        let enemy = character(&mut sim, Role::Enemy, 100.0, 100.0);
        let gun = sim.spawn_weapon(Weapon::gun(BulletPreset::UpOrDown));
        sim.arm(enemy, gun);
        sim.attack(enemy);

        let bullet = bullets(&sim)[0];
        assert_eq!(sim.scene.entity(bullet).unwrap().direction(), Direction::DOWN);
        assert_eq!(sim.scene.rect(bullet).unwrap().y, 116.0);
        assert!(sim.scene.get(bullet).unwrap().has_group("upordownbullet"));
    }

    #[test]
    fn test_no_direction_finalizes_bullet() {
        let mut sim = sim();
        let player = character(&mut sim, Role::Player, 100.0, 100.0);
        let gun = sim.spawn_weapon(Weapon::gun(BulletPreset::Tiny));
        sim.arm(player, gun);
        assert!(sim.attack(player));
        assert!(bullets(&sim).is_empty());
    }

    #[test]
    fn test_ammo_runs_out() {
        let mut sim = sim();
        let player = character(&mut sim, Role::Player, 100.0, 100.0);
        sim.scene.entity_mut(player).unwrap().set_direction(Direction::LEFT);
        let mut weapon = Weapon::gun(BulletPreset::Tiny);
        weapon.kind = WeaponKind::Gun {
            ammo: Some(1),
            bullet: BulletPreset::Tiny,
        };
        let gun = sim.spawn_weapon(weapon);
        sim.arm(player, gun);
        assert!(sim.attack(player));
        assert!(!sim.attack(player));
    }

    #[test]
    fn test_sword_draws_and_sheathes() {
        let mut sim = sim();
        let player = character(&mut sim, Role::Player, 100.0, 100.0);
        let sword = sim.spawn_weapon(Weapon::sword(SwordPreset::ExCalibur));
        sim.arm(player, sword);

        assert!(sim.attack(player));
        assert!(!sim.attack(player));
        assert!(sim.scene.contains(player, sword));
        assert_eq!(sim.scene.rect(sword).unwrap().width, 21.0);
        assert_eq!(sim.scene.entity(sword).unwrap().life_impact, SWORD_IMPACT);

        sim.frame(300.0);
        assert!(!sim.scene.contains(player, sword));
        assert!(sim.attack(player));
    }
}
