//! Collision detection and response between stage entities
//!
//! The engine is one scheduler callback. Each tick it recenters the stage on
//! the player, then tests every ordered pair of stage entities: when `i` may
//! collide with `j` and their rectangles overlap, `i` resolves the contact
//! from its own side. `j` gets its say in the `(j, i)` pass, so resolution is
//! not symmetric within a tick.

use glam::Vec2;

use super::entity::{Collidable, Directional, EntityKind, LifeBearing, Role, VolumeKind};
use super::geom::{Rect, Side};
use super::scene::NodeId;
use super::scheduler::TickId;
use super::world::Sim;
use crate::error::Result;

/// Engine work a caller can switch on and off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Watch {
    /// Master switch for the other three
    All,
    /// Camera following the player
    Stage,
    /// Collisions between entities
    Sentient,
    /// Reserved; does nothing yet
    Insentient,
}

/// Per-tick watcher state
#[derive(Debug, Clone)]
pub struct Engine {
    tick: Option<TickId>,
    all: bool,
    stage: bool,
    sentient: bool,
    insentient: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            tick: None,
            all: true,
            stage: true,
            sentient: true,
            insentient: true,
        }
    }
}

impl Engine {
    fn flag_mut(&mut self, watch: Watch) -> &mut bool {
        match watch {
            Watch::All => &mut self.all,
            Watch::Stage => &mut self.stage,
            Watch::Sentient => &mut self.sentient,
            Watch::Insentient => &mut self.insentient,
        }
    }

    pub fn is_watching(&self, watch: Watch) -> bool {
        match watch {
            Watch::All => self.all,
            Watch::Stage => self.stage,
            Watch::Sentient => self.sentient,
            Watch::Insentient => self.insentient,
        }
    }

    pub fn is_running(&self) -> bool {
        self.tick.is_some()
    }
}

impl Sim {
    /// Register the engine watcher. Registration order matters: movers
    /// registered earlier are seen at their new position this tick, later
    /// ones a tick late. Starting twice does nothing.
    pub fn start_engine(&mut self) -> Result<()> {
        if self.engine.is_running() {
            return Ok(());
        }
        let tick = self.scheduler.register(|sim: &mut Sim| sim.run_engine())?;
        self.engine.tick = Some(tick);
        log::debug!("Engine started");
        Ok(())
    }

    pub fn watch(&mut self, watch: Watch) {
        *self.engine.flag_mut(watch) = true;
    }

    pub fn stop_watching(&mut self, watch: Watch) {
        *self.engine.flag_mut(watch) = false;
    }

    pub fn is_watching(&self, watch: Watch) -> bool {
        self.engine.is_watching(watch)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    fn run_engine(&mut self) {
        if !self.engine.all {
            return;
        }
        if self.engine.stage {
            self.watch_stage();
        }
        if self.engine.sentient {
            self.watch_sentient();
        }
    }

    /// Scroll the stage so the player sits at the viewport centre
    fn watch_stage(&mut self) {
        let Some(player) = self.player.and_then(|p| self.scene.rect(p)) else {
            return;
        };
        let Some(viewport) = self.scene.rect(self.viewport()) else {
            return;
        };
        let x = -(player.x - (viewport.width / 2.0 - player.width / 2.0));
        let y = -(player.y - (viewport.height / 2.0 - player.height / 2.0));
        let stage = self.stage();
        self.scene.move_to(stage, x, y);
    }

    fn watch_sentient(&mut self) {
        let stage = self.stage();
        let entities = self
            .scene
            .descendants_where(stage, |_, node| node.entity.is_some());

        for &i in &entities {
            for &j in &entities {
                if i == j || self.scene.is_finalized(i) {
                    continue;
                }
                let eligible = match (self.scene.entity(i), self.scene.entity(j)) {
                    (Some(a), Some(b)) => a.is_collidable_with(b, &self.rules),
                    _ => false,
                };
                if eligible && self.overlaps(i, j) {
                    self.handle_collision(i, j);
                }
            }
        }
    }

    fn overlaps(&self, a: NodeId, b: NodeId) -> bool {
        let stage = self.stage();
        match (self.scene.rect_in(a, stage), self.scene.rect_in(b, stage)) {
            (Some(ra), Some(rb)) => ra.intersects(&rb),
            _ => false,
        }
    }

    /// Resolve a contact from the receiver's side
    pub fn handle_collision(&mut self, receiver: NodeId, other: NodeId) {
        let Some(kind) = self.scene.entity(receiver).map(|e| match &e.kind {
            EntityKind::Character(c) => Receiver::Character(c.role),
            EntityKind::Volume(kind) => Receiver::Volume(*kind),
            EntityKind::Weapon(_) => Receiver::Weapon,
            EntityKind::Bullet(_) => Receiver::Bullet,
        }) else {
            return;
        };

        match kind {
            Receiver::Bullet => self.entity_with_bullet(receiver),
            Receiver::Weapon => {}
            Receiver::Character(Role::Player) => self.player_collision(receiver, other),
            Receiver::Character(Role::Enemy) => self.enemy_collision(receiver, other),
            Receiver::Character(Role::Actor) => self.entity_update_index(receiver, other),
            Receiver::Volume(volume) => self.volume_collision(volume, receiver, other),
        }
    }

    fn player_collision(&mut self, player: NodeId, other: NodeId) {
        self.entity_update_index(player, other);

        let other_is_character = self.scene.entity(other).is_some_and(|e| e.is_character());
        if other_is_character && !self.within_collision_threshold(player, other) {
            return;
        }

        let old = self.life_of(player);
        self.character_update_life(player, other);
        let new = self.life_of(player);
        if new < old {
            self.character_with_harmful_entity(player, other);
        }

        if !self.scene.entity(player).is_some_and(|e| e.is_alive()) {
            self.scene.set_locked(player, true);
            self.uncross_all(player);
            self.remove(player);
            log::info!("Player {:?} is down", player);
        }
    }

    fn enemy_collision(&mut self, enemy: NodeId, other: NodeId) {
        self.entity_update_index(enemy, other);

        if self.scene.entity(other).is_some_and(|e| e.is_enemy()) {
            if self.within_collision_threshold(enemy, other) {
                self.entity_with_boundary(enemy, other);
            }
        } else {
            self.character_update_life(enemy, other);
        }

        if !self.scene.entity(enemy).is_some_and(|e| e.is_alive()) {
            self.uncross_all(enemy);
            self.remove(enemy);
        }
    }

    fn volume_collision(&mut self, volume: VolumeKind, receiver: NodeId, other: NodeId) {
        let Some(entity) = self.scene.entity(other) else {
            return;
        };
        let (is_player, crumbles) = (entity.is_player(), entity.is_bullet() || entity.is_enemy());
        match volume {
            VolumeKind::Plain => {}
            VolumeKind::Boundary => self.entity_with_boundary(receiver, other),
            VolumeKind::Brick if crumbles => {
                self.finalize(receiver);
            }
            VolumeKind::Dust if is_player => {
                self.finalize(receiver);
            }
            VolumeKind::Pushable if is_player => self.entity_with_pushable(receiver, other),
            VolumeKind::Brick | VolumeKind::Dust | VolumeKind::Pushable => {
                self.entity_with_boundary(receiver, other)
            }
        }
    }

    fn life_of(&self, character: NodeId) -> i32 {
        self.scene
            .entity(character)
            .and_then(|e| e.gauge())
            .map_or(0, |g| g.life())
    }

    /// Characters only touch when their tops are close; sprites overlap a lot
    /// more than their feet do
    pub fn within_collision_threshold(&self, a: NodeId, b: NodeId) -> bool {
        let stage = self.stage();
        match (self.scene.rect_in(a, stage), self.scene.rect_in(b, stage)) {
            (Some(ra), Some(rb)) => {
                (ra.y.abs() - rb.y.abs()).abs() <= self.config().collision_threshold
            }
            _ => false,
        }
    }

    /// Stage-space rectangle and the offset back to the node's local space
    fn placement(&self, id: NodeId) -> Option<(Rect, Vec2)> {
        let local = self.scene.rect(id)?;
        let abs = self.scene.rect_in(id, self.stage())?;
        Some((abs, local.position() - abs.position()))
    }

    /// The bullet receiver is spent
    pub fn entity_with_bullet(&mut self, bullet: NodeId) {
        self.finalize(bullet);
    }

    /// Push `other` out of `boundary` through the side it touches. Only
    /// characters and volumes are pushed.
    pub fn entity_with_boundary(&mut self, boundary: NodeId, other: NodeId) {
        if !self.scene.exists(other)
            || !self
                .scene
                .entity(other)
                .is_some_and(|e| e.is_character() || e.is_volume())
        {
            return;
        }
        let (Some((b, _)), Some((o, offset))) = (self.placement(boundary), self.placement(other))
        else {
            return;
        };
        let target = match o.intersects_at(&b) {
            Some(Side::Bottom) => Vec2::new(o.x, b.bottom()),
            Some(Side::Left) => Vec2::new(b.x - o.width, o.y),
            Some(Side::Right) => Vec2::new(b.right(), o.y),
            Some(Side::Top) => Vec2::new(o.x, b.y - o.height),
            None => return,
        } + offset;
        self.scene.move_to(other, target.x, target.y);
    }

    /// Shove `pushable` one extent away from `pusher`, which stops at the
    /// edge it pushed
    pub fn entity_with_pushable(&mut self, pushable: NodeId, pusher: NodeId) {
        if !self.scene.exists(pusher) {
            return;
        }
        let (Some((p, p_offset)), Some((e, e_offset))) =
            (self.placement(pushable), self.placement(pusher))
        else {
            return;
        };
        let (shoved, stopped) = match e.intersects_at(&p) {
            Some(Side::Left) => (Vec2::new(p.x + p.width, p.y), Vec2::new(p.x - e.width, e.y)),
            Some(Side::Right) => (Vec2::new(p.x - p.width, p.y), Vec2::new(p.right(), e.y)),
            Some(Side::Top) => (Vec2::new(p.x, p.y + p.height), Vec2::new(e.x, p.y - e.height)),
            Some(Side::Bottom) => (Vec2::new(p.x, p.y - p.height), Vec2::new(e.x, p.bottom())),
            None => return,
        };
        let (shoved, stopped) = (shoved + p_offset, stopped + e_offset);
        self.scene.move_to(pushable, shoved.x, shoved.y);
        self.scene.move_to(pusher, stopped.x, stopped.y);
    }

    /// Keep the lower of two siblings drawn on top
    pub fn entity_update_index(&mut self, a: NodeId, b: NodeId) {
        let (Some(na), Some(nb)) = (self.scene.get(a), self.scene.get(b)) else {
            return;
        };
        let Some(container) = na.container().filter(|&c| nb.container() == Some(c)) else {
            return;
        };
        if na.y() <= nb.y() {
            return;
        }
        if let (Some(ia), Some(ib)) = (
            self.scene.child_index(container, a),
            self.scene.child_index(container, b),
        ) {
            if ia < ib {
                if let Err(e) = self.scene.swap_children(container, a, b) {
                    log::error!("Z reorder of {:?} and {:?} failed: {}", a, b, e);
                }
            }
        }
    }

    /// Apply `other`'s life impact to `character`
    pub fn character_update_life(&mut self, character: NodeId, other: NodeId) {
        let impact = self.scene.entity(other).map_or(0, |e| e.life_impact);
        if impact != 0 {
            self.update_life(character, impact);
        }
    }

    /// Knock the character back along the hit's heading, freeze it briefly
    /// and make it a translucent ghost for a while
    pub fn character_with_harmful_entity(&mut self, character: NodeId, other: NodeId) {
        let Some(heading) = self.scene.entity(other).map(|e| e.heading()) else {
            return;
        };
        // A zero magnitude still counts as a hit but does not push
        self.steps(
            character,
            heading.direction.x(),
            heading.direction.y(),
            Some(heading.magnitude),
        );

        self.scene.set_locked(character, true);
        let lock_ms = self.config().hit_lock_ms;
        self.set_timeout(lock_ms, move |sim: &mut Sim| {
            if sim.scene.exists(character) {
                sim.scene.set_locked(character, false);
            }
        });

        self.set_ghost(character, true);
        let ghost_ms = self.config().invulnerable_ms;
        self.set_timeout(ghost_ms, move |sim: &mut Sim| {
            if sim.scene.exists(character) {
                sim.set_ghost(character, false);
            }
        });
    }

    fn set_ghost(&mut self, character: NodeId, ghost: bool) {
        if let Some(c) = self.scene.entity_mut(character).and_then(|e| e.character_mut()) {
            c.ghost = ghost;
        }
        let alpha = if ghost { self.config().ghost_alpha } else { 1.0 };
        self.scene.set_alpha(character, alpha);
    }
}

#[derive(Debug, Clone, Copy)]
enum Receiver {
    Character(Role),
    Volume(VolumeKind),
    Weapon,
    Bullet,
}
