//! Cross and step motion primitives
//!
//! A cross moves a node by a relative offset over several ticks. Each tick
//! both unfinished axes advance by `min(speed, remaining)`, so the node lands
//! exactly on the requested offset unless its bounds clamp it. Completion is
//! never synchronous: the stepper unregisters and `on_complete` goes through
//! the scheduler's pending-completions queue.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use super::direction::{Direction, Heading};
use super::entity::Directional;
use super::scene::NodeId;
use super::scheduler::TickId;
use super::world::Sim;

/// Speed shared by several movers and read fresh every tick
#[derive(Debug, Clone, Default)]
pub struct SharedSpeed(Rc<Cell<f32>>);

impl SharedSpeed {
    pub fn new(speed: f32) -> Self {
        Self(Rc::new(Cell::new(speed)))
    }

    pub fn get(&self) -> f32 {
        self.0.get()
    }

    pub fn set(&self, speed: f32) {
        self.0.set(speed);
    }

    pub fn add(&self, delta: f32) {
        self.0.set(self.0.get() + delta);
    }
}

/// Where a cross reads its per-tick step from
#[derive(Debug, Clone, Default)]
pub enum SpeedSource {
    /// The node's own step size, read every tick
    #[default]
    Node,
    /// Captured once
    Fixed(f32),
    Shared(SharedSpeed),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CrossId(u64);

/// Cancellation handle returned by `Sim::cross`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CrossHandle {
    pub node: NodeId,
    pub id: CrossId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossPhase {
    Stepping,
    /// Finished; `on_complete(false)` is queued
    Completing,
    /// Cancelled; `on_complete(true)` is queued
    ForceStopped,
}

pub type CompleteFn = Box<dyn FnOnce(&mut Sim, NodeId, bool)>;
pub type DirectionFn = Box<dyn FnMut(&mut Sim, NodeId, Direction)>;
pub type StepFn = Box<dyn FnMut(&mut Sim, NodeId, bool)>;

/// Optional callbacks and speed source of a cross
#[derive(Default)]
pub struct CrossOptions {
    speed: SpeedSource,
    on_complete: Option<CompleteFn>,
    on_direction: Option<DirectionFn>,
    on_step: Option<StepFn>,
}

impl CrossOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn speed(mut self, speed: SpeedSource) -> Self {
        self.speed = speed;
        self
    }

    /// Called with `forced` once the cross is over
    pub fn on_complete(mut self, callback: impl FnOnce(&mut Sim, NodeId, bool) + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Called whenever the still-pending heading changes
    pub fn on_direction(
        mut self,
        callback: impl FnMut(&mut Sim, NodeId, Direction) + 'static,
    ) -> Self {
        self.on_direction = Some(Box::new(callback));
        self
    }

    /// Called after every tick's movement with `is_last`
    pub fn on_step(mut self, callback: impl FnMut(&mut Sim, NodeId, bool) + 'static) -> Self {
        self.on_step = Some(Box::new(callback));
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Axis {
    remaining: f32,
    forward: bool,
}

impl Axis {
    fn new(delta: f32) -> Self {
        Self {
            remaining: delta.abs(),
            forward: delta > 0.0,
        }
    }

    fn is_done(&self) -> bool {
        self.remaining <= 0.0
    }

    /// Signed move for this tick
    fn advance(&mut self, step: f32) -> f32 {
        if self.is_done() {
            return 0.0;
        }
        let moved = step.min(self.remaining);
        self.remaining -= moved;
        if self.forward { moved } else { -moved }
    }
}

struct CrossState {
    node: NodeId,
    phase: CrossPhase,
    tick: Option<TickId>,
    x: Axis,
    y: Axis,
    speed: SpeedSource,
    direction: Direction,
    on_complete: Option<CompleteFn>,
    on_direction: Option<DirectionFn>,
    on_step: Option<StepFn>,
}

impl CrossState {
    fn pending_direction(&self) -> Direction {
        let mut direction = Direction::NONE;
        if !self.y.is_done() {
            direction = direction.with(if self.y.forward { Heading::Down } else { Heading::Up });
        }
        if !self.x.is_done() {
            direction = direction.with(if self.x.forward { Heading::Right } else { Heading::Left });
        }
        direction
    }
}

/// Registry of running crosses
#[derive(Default)]
pub struct Motion {
    crosses: HashMap<CrossId, CrossState>,
    next_id: u64,
}

impl Motion {
    /// Crosses that have not delivered their completion yet
    pub fn len(&self) -> usize {
        self.crosses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crosses.is_empty()
    }

    fn ids_of(&self, node: NodeId) -> Vec<CrossId> {
        let mut ids: Vec<CrossId> = self
            .crosses
            .iter()
            .filter(|(_, state)| state.node == node)
            .map(|(&id, _)| id)
            .collect();
        ids.sort();
        ids
    }

    /// Drop leftover state of a reaped node
    pub(crate) fn forget(&mut self, node: NodeId) {
        self.crosses.retain(|_, state| state.node != node);
    }
}

impl Sim {
    /// Move `node` by `(dx, dy)` over as many ticks as its speed requires.
    /// Several crosses may run on one node at once.
    pub fn cross(&mut self, node: NodeId, dx: f32, dy: f32, options: CrossOptions) -> CrossHandle {
        let id = CrossId(self.motion.next_id);
        self.motion.next_id += 1;
        let handle = CrossHandle { node, id };

        let state = CrossState {
            node,
            phase: CrossPhase::Stepping,
            tick: None,
            x: Axis::new(dx),
            y: Axis::new(dy),
            speed: options.speed,
            direction: Direction::NONE,
            on_complete: options.on_complete,
            on_direction: options.on_direction,
            on_step: options.on_step,
        };
        self.motion.crosses.insert(id, state);
        self.report_direction(id);

        match self.scheduler.register(move |sim: &mut Sim| sim.step_cross(id)) {
            Ok(tick) => {
                if let Some(state) = self.motion.crosses.get_mut(&id) {
                    state.tick = Some(tick);
                }
            }
            Err(e) => {
                log::error!("Cross on {:?} could not start: {}", node, e);
                self.stop_cross(id, true);
            }
        }
        handle
    }

    /// Cross to an absolute position; negative targets are floored to zero
    pub fn cross_to(&mut self, node: NodeId, x: f32, y: f32, options: CrossOptions) -> CrossHandle {
        let (x, y) = (x.max(0.0), y.max(0.0));
        let current = self.scene.rect(node).map(|r| r.position()).unwrap_or_default();
        self.cross(node, x - current.x, y - current.y, options)
    }

    /// Single-cross variant: force-cancel every running cross on the node first
    pub fn cross_exclusive(
        &mut self,
        node: NodeId,
        dx: f32,
        dy: f32,
        options: CrossOptions,
    ) -> CrossHandle {
        self.uncross_all(node);
        self.cross(node, dx, dy, options)
    }

    /// Force-stop one cross. Stopping a finished cross does nothing.
    pub fn uncross(&mut self, handle: CrossHandle) {
        self.stop_cross(handle.id, true);
    }

    pub fn uncross_all(&mut self, node: NodeId) {
        for id in self.motion.ids_of(node) {
            self.stop_cross(id, true);
        }
    }

    /// `None` once the completion has been delivered
    pub fn cross_phase(&self, handle: CrossHandle) -> Option<CrossPhase> {
        self.motion.crosses.get(&handle.id).map(|state| state.phase)
    }

    /// Crosses on `node` still stepping
    pub fn is_crossing(&self, node: NodeId) -> bool {
        self.motion
            .crosses
            .values()
            .any(|state| state.node == node && state.phase == CrossPhase::Stepping)
    }

    /// Immediate one-tick move along up to one heading per axis
    pub fn steps(&mut self, node: NodeId, x: Option<Heading>, y: Option<Heading>, size: Option<f32>) {
        let Some(step) = size.or_else(|| self.scene.get(node).map(|n| n.step_size())) else {
            return;
        };
        let dx = match x {
            Some(Heading::Left) => -step,
            Some(Heading::Right) => step,
            _ => 0.0,
        };
        let dy = match y {
            Some(Heading::Up) => -step,
            Some(Heading::Down) => step,
            _ => 0.0,
        };
        self.scene.move_by(node, dx, dy);
    }

    pub fn step(&mut self, node: NodeId, heading: Heading, size: Option<f32>) {
        if heading.is_vertical() {
            self.steps(node, None, Some(heading), size);
        } else {
            self.steps(node, Some(heading), None, size);
        }
    }

    fn step_cross(&mut self, id: CrossId) {
        let Some(state) = self.motion.crosses.get(&id) else {
            return;
        };
        if state.phase != CrossPhase::Stepping {
            return;
        }
        let node = state.node;
        if !self.scene.exists(node) {
            self.stop_cross(id, true);
            return;
        }

        let step = match &state.speed {
            SpeedSource::Node => self.scene.get(node).map_or(0.0, |n| n.step_size()),
            SpeedSource::Fixed(step) => *step,
            SpeedSource::Shared(shared) => shared.get(),
        };
        if step <= 0.0 {
            log::warn!("Cross on {:?} has non-positive speed {}", node, step);
            return;
        }

        let Some(state) = self.motion.crosses.get_mut(&id) else {
            return;
        };
        let dx = state.x.advance(step);
        let dy = state.y.advance(step);
        let finished = state.x.is_done() && state.y.is_done();
        self.scene.move_by(node, dx, dy);

        if let Some(character) = self.scene.entity_mut(node).and_then(|e| e.character_mut()) {
            character.in_motion = true;
        }
        self.report_direction(id);
        self.call_on_step(id, node, finished);

        if finished {
            self.stop_cross(id, false);
        }
    }

    fn call_on_step(&mut self, id: CrossId, node: NodeId, is_last: bool) {
        let Some(mut callback) = self
            .motion
            .crosses
            .get_mut(&id)
            .and_then(|state| state.on_step.take())
        else {
            return;
        };
        callback(self, node, is_last);
        if let Some(state) = self.motion.crosses.get_mut(&id) {
            state.on_step.get_or_insert(callback);
        }
    }

    /// Notify the pending heading if it changed since the last report
    fn report_direction(&mut self, id: CrossId) {
        let Some(state) = self.motion.crosses.get_mut(&id) else {
            return;
        };
        let direction = if state.phase == CrossPhase::Stepping {
            state.pending_direction()
        } else {
            Direction::NONE
        };
        let first = state.tick.is_none() && state.direction.is_none();
        if direction == state.direction && !first {
            return;
        }
        state.direction = direction;
        let node = state.node;

        if self.scene.exists(node) {
            if let Some(entity) = self.scene.entity_mut(node) {
                if entity.is_character() {
                    entity.set_direction(direction);
                }
            }
        }

        let Some(mut callback) = self
            .motion
            .crosses
            .get_mut(&id)
            .and_then(|state| state.on_direction.take())
        else {
            return;
        };
        callback(self, node, direction);
        if let Some(state) = self.motion.crosses.get_mut(&id) {
            state.on_direction.get_or_insert(callback);
        }
    }

    fn stop_cross(&mut self, id: CrossId, forced: bool) {
        let Some(state) = self.motion.crosses.get_mut(&id) else {
            return;
        };
        if state.phase != CrossPhase::Stepping {
            return;
        }
        state.phase = if forced {
            CrossPhase::ForceStopped
        } else {
            CrossPhase::Completing
        };
        if let Some(tick) = state.tick {
            self.scheduler.unregister(tick);
        }
        self.report_direction(id);

        self.scheduler.defer(move |sim: &mut Sim| {
            let Some(state) = sim.motion.crosses.remove(&id) else {
                return;
            };
            let node = state.node;
            if sim.scene.exists(node) {
                if let Some(character) = sim.scene.entity_mut(node).and_then(|e| e.character_mut()) {
                    character.in_motion = false;
                }
            }
            if let Some(on_complete) = state.on_complete {
                on_complete(sim, node, forced);
            }
        });
    }
}
