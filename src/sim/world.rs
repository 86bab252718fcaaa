//! The simulation context
//!
//! `Sim` owns every subsystem: the scene, the scheduler, the event bus, the
//! motion and pacing registries, the collision engine, input and the RNG.
//! Callbacks receive `&mut Sim`, so there is exactly one of each per context.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::collision::Engine;
use super::entity::CollisionRules;
use super::events::{
    self, Dispatching, EventBus, ListenerId, NodeEvent, NodeEventKind, Propagation,
};
use super::geom::Bounds;
use super::input::Joystick;
use super::motion::Motion;
use super::pacing::Pacing;
use super::scene::{Node, NodeId, Scene};
use super::scheduler::{self, Scheduled, Scheduler, TickId, TimerId};
use crate::config::GameConfig;
use crate::error::Result;
use crate::renderer::{NodeView, RenderSink};

pub struct Sim {
    pub scene: Scene,
    pub joystick: Joystick,
    pub(crate) scheduler: Scheduler<Sim>,
    pub(crate) events: EventBus<Sim>,
    pub(crate) motion: Motion,
    pub(crate) pacing: Pacing,
    pub(crate) engine: Engine,
    pub(crate) rules: CollisionRules,
    pub(crate) player: Option<NodeId>,
    config: GameConfig,
    rng: Pcg32,
    viewport: NodeId,
    stage: NodeId,
}

impl Sim {
    /// Build an empty world: a viewport holding a stage of the same size
    pub fn new(config: GameConfig) -> Result<Self> {
        config.validate()?;

        let (width, height) = (config.viewport_width, config.viewport_height);
        let mut scene = Scene::new();
        let viewport = scene.spawn(
            Node::new(0.0, 0.0, width, height)
                .into_container()
                .with_name("viewport"),
        );
        let stage = scene.spawn(
            Node::new(0.0, 0.0, width, height)
                .into_container()
                .with_name("stage"),
        );
        scene.add_child(viewport, stage)?;
        scene.take_events();

        let mut sim = Self {
            scene,
            joystick: Joystick::new(),
            scheduler: Scheduler::new(config.scheduler_capacity),
            events: EventBus::new(),
            motion: Motion::default(),
            pacing: Pacing::default(),
            engine: Engine::default(),
            rules: CollisionRules {
                bullets_hit_bullets: config.bullets_hit_bullets,
            },
            player: None,
            rng: Pcg32::seed_from_u64(config.seed),
            config,
            viewport,
            stage,
        };
        sim.update_stage_bounds();

        log::info!(
            "World created: viewport {}x{}, seed {}",
            width,
            height,
            sim.config.seed
        );
        Ok(sim)
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn rules(&self) -> &CollisionRules {
        &self.rules
    }

    pub fn viewport(&self) -> NodeId {
        self.viewport
    }

    pub fn stage(&self) -> NodeId {
        self.stage
    }

    pub fn player(&self) -> Option<NodeId> {
        self.player
    }

    /// Camera bounds of the stage: it may scroll until its far edges meet the
    /// viewport's
    pub fn update_stage_bounds(&mut self) {
        let (Some(stage), Some(viewport)) = (self.scene.rect(self.stage), self.scene.rect(self.viewport))
        else {
            return;
        };
        let bounds = Bounds::new(
            -(stage.height - viewport.height).max(0.0),
            0.0,
            0.0,
            -(stage.width - viewport.width).max(0.0),
        );
        self.scene.set_bounds(self.stage, Some(bounds));
    }

    // ---- time ----

    /// Advance one host frame: fire due timers, reap what they finalized,
    /// then run a tick unless paused
    pub fn frame(&mut self, now_ms: f64) {
        scheduler::fire_timers(self, now_ms);
        self.reap();
        scheduler::run_tick(self);
    }

    /// Run a single tick without touching the clock
    pub fn tick(&mut self) {
        scheduler::run_tick(self);
    }

    pub fn ticks(&self) -> u64 {
        self.scheduler.ticks()
    }

    pub fn now_ms(&self) -> f64 {
        self.scheduler.now_ms()
    }

    pub fn pause(&mut self) {
        self.scheduler.pause();
        log::info!("Paused");
    }

    pub fn resume(&mut self) {
        self.scheduler.resume();
        log::info!("Resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.scheduler.is_paused()
    }

    pub fn toggle_pause(&mut self) {
        if self.is_paused() {
            self.resume();
        } else {
            self.pause();
        }
    }

    /// Run `callback` on every tick, starting with the next pass
    pub fn register_tick(&mut self, callback: impl FnMut(&mut Sim) + 'static) -> Result<TickId> {
        self.scheduler.register(callback)
    }

    pub fn register_tick_once(&mut self, callback: impl FnOnce(&mut Sim) + 'static) -> Result<TickId> {
        self.scheduler.register_once(callback)
    }

    pub fn unregister_tick(&mut self, id: TickId) -> bool {
        self.scheduler.unregister(id)
    }

    /// Run `callback` after the callback pass of the next tick
    pub fn defer(&mut self, callback: impl FnOnce(&mut Sim) + 'static) {
        self.scheduler.defer(callback);
    }

    pub fn set_timeout(&mut self, delay_ms: f64, callback: impl FnOnce(&mut Sim) + 'static) -> TimerId {
        self.scheduler.set_timeout(delay_ms, callback)
    }

    pub fn clear_timeout(&mut self, id: TimerId) -> bool {
        self.scheduler.clear_timeout(id)
    }

    /// Uniform integer-valued draw in `[min, max]` milliseconds
    pub fn random_ms(&mut self, min: f64, max: f64) -> f64 {
        if max <= min {
            return min;
        }
        self.rng.random_range(min.round() as i64..=max.round() as i64) as f64
    }

    // ---- containment ----

    pub fn add_child(&mut self, container: NodeId, child: NodeId) -> Result<()> {
        let result = self.scene.add_child(container, child);
        self.flush_events();
        result
    }

    pub fn add_child_at(
        &mut self,
        container: NodeId,
        child: NodeId,
        index: usize,
    ) -> Result<Option<NodeId>> {
        let result = self.scene.add_child_at(container, child, index);
        self.flush_events();
        result
    }

    pub fn remove_child(&mut self, container: NodeId, child: NodeId) -> bool {
        let removed = self.scene.remove_child(container, child);
        self.flush_events();
        removed
    }

    pub fn remove_children(
        &mut self,
        container: NodeId,
        begin: usize,
        end: Option<usize>,
    ) -> Result<()> {
        let result = self.scene.remove_children(container, begin, end);
        self.flush_events();
        result
    }

    /// Detach a node from its container
    pub fn remove(&mut self, id: NodeId) -> bool {
        let removed = self.scene.remove(id);
        self.flush_events();
        removed
    }

    /// Tear a node and everything under it down for good: cancel tick
    /// registrations, crosses and pacers, then finalize them in the scene.
    /// Idempotent.
    pub fn finalize(&mut self, id: NodeId) -> bool {
        if self.scene.is_finalized(id) {
            return false;
        }
        let mut doomed = vec![id];
        doomed.extend(self.scene.descendants_where(id, |_, node| !node.is_finalized()));
        for node in doomed {
            self.cancel_activity(node);
        }

        let finalized = self.scene.finalize(id);
        self.flush_events();
        finalized
    }

    fn cancel_activity(&mut self, id: NodeId) {
        if let Some(tick) = self
            .scene
            .entity(id)
            .and_then(|e| e.bullet())
            .and_then(|b| b.tick)
        {
            self.scheduler.unregister(tick);
        }
        self.uncross_all(id);
        self.stop_pacing_node(id);
    }

    /// Free the slots of finalized nodes and drop everything keyed by them
    pub fn reap(&mut self) {
        for id in self.scene.reap() {
            self.events.clear(id);
            self.motion.forget(id);
        }
    }

    // ---- events ----

    pub fn add_listener(
        &mut self,
        node: NodeId,
        kind: NodeEventKind,
        callback: impl FnMut(&mut Sim, &NodeEvent) -> Propagation + 'static,
    ) -> ListenerId {
        self.events.add_listener(node, kind, callback)
    }

    pub fn add_listener_once(
        &mut self,
        node: NodeId,
        kind: NodeEventKind,
        callback: impl FnOnce(&mut Sim, &NodeEvent) -> Propagation + 'static,
    ) -> ListenerId {
        self.events.add_listener_once(node, kind, callback)
    }

    pub fn remove_listener(&mut self, node: NodeId, id: ListenerId) -> bool {
        self.events.remove_listener(node, id)
    }

    /// Dispatch every containment event the scene has queued
    pub fn flush_events(&mut self) {
        loop {
            let queued = self.scene.take_events();
            if queued.is_empty() {
                break;
            }
            for event in &queued {
                events::dispatch(self, event);
            }
        }
    }

    // ---- rendering ----

    /// Push dirty and released nodes to the render collaborator
    pub fn flush_render(&mut self, sink: &mut dyn RenderSink) {
        let changes = self.scene.take_render_changes();
        for id in changes.updated {
            if self.scene.is_finalized(id) {
                continue;
            }
            if let Some(node) = self.scene.get(id) {
                sink.update(id, &NodeView::of(node));
            }
        }
        for id in changes.released {
            sink.release(id);
        }
    }
}

impl Scheduled for Sim {
    fn scheduler(&mut self) -> &mut Scheduler<Self> {
        &mut self.scheduler
    }

    fn after_callback(&mut self) {
        self.flush_events();
    }

    fn after_tick(&mut self) {
        self.reap();
    }
}

impl Dispatching for Sim {
    fn event_bus(&mut self) -> &mut EventBus<Self> {
        &mut self.events
    }
}
