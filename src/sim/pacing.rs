//! Repeating patrol patterns
//!
//! A pacer walks a node through a lap of legs forever. Each leg is a cross;
//! one scheduler registration per pacer advances an explicit state machine:
//!
//! ```text
//! Starting -> Moving -> LegDone -> Moving -> ... -> Stopped
//! ```
//!
//! The hook sees every leg transition and returns `false` to stop. A forced
//! leg completion (the cross was cancelled) stops the pacer as well.

use std::collections::HashMap;

use super::geom::Side;
use super::motion::{CrossHandle, CrossOptions, SpeedSource};
use super::scene::NodeId;
use super::scheduler::TickId;
use super::world::Sim;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaceKind {
    /// Forth and back along one axis
    Straight { size: f32, vertical: bool },
    /// Down, left, up, right
    Square { size: f32 },
    /// Polygon through points of a circle, starting at angle 0
    Circle { radius: f32, angle_step: f32 },
}

/// Leg transitions reported to the hook
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaceEvent {
    /// The straight pattern turns back
    Reverse,
    /// A full lap is done
    Lap,
    /// The square pattern starts a side
    NewSide(Side),
    /// The circle pattern heads for the point at this angle
    NewAngle(f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Leg {
    dx: f32,
    dy: f32,
    enter: Option<PaceEvent>,
}

impl Leg {
    fn new(dx: f32, dy: f32, enter: Option<PaceEvent>) -> Self {
        Self { dx, dy, enter }
    }
}

impl PaceKind {
    fn legs(&self) -> Vec<Leg> {
        match *self {
            PaceKind::Straight { size, vertical } => {
                let (dx, dy) = if vertical { (0.0, size) } else { (size, 0.0) };
                vec![
                    Leg::new(dx, dy, None),
                    Leg::new(-dx, -dy, Some(PaceEvent::Reverse)),
                ]
            }
            PaceKind::Square { size } => vec![
                Leg::new(0.0, size, Some(PaceEvent::NewSide(Side::Bottom))),
                Leg::new(-size, 0.0, Some(PaceEvent::NewSide(Side::Left))),
                Leg::new(0.0, -size, Some(PaceEvent::NewSide(Side::Top))),
                Leg::new(size, 0.0, Some(PaceEvent::NewSide(Side::Right))),
            ],
            PaceKind::Circle { radius, angle_step } => {
                let step = if angle_step > 0.0 { angle_step } else { 45.0 };
                let mut points = Vec::new();
                let mut angle = 0.0f32;
                while angle < 360.0 {
                    let rad = angle.to_radians();
                    points.push((angle, (radius * rad.cos()).round(), (radius * rad.sin()).round()));
                    angle += step;
                }
                (1..=points.len())
                    .map(|i| {
                        let (_, px, py) = points[i - 1];
                        let (angle, x, y) = points[i % points.len()];
                        Leg::new(x - px, y - py, Some(PaceEvent::NewAngle(angle)))
                    })
                    .collect()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PacerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacerState {
    /// The current leg has not started yet
    Starting,
    Moving(CrossHandle),
    LegDone { forced: bool },
    Stopped,
}

pub type PaceHook = Box<dyn FnMut(&mut Sim, NodeId, PaceEvent) -> bool>;

struct Pacer {
    node: NodeId,
    legs: Vec<Leg>,
    leg: usize,
    speed: SpeedSource,
    state: PacerState,
    tick: Option<TickId>,
    /// `None` while running
    hook: Option<PaceHook>,
}

/// Registry of pacers
#[derive(Default)]
pub struct Pacing {
    pacers: HashMap<PacerId, Pacer>,
    next_id: u64,
}

impl Pacing {
    pub fn len(&self) -> usize {
        self.pacers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pacers.is_empty()
    }

    fn ids_of(&self, node: NodeId) -> Vec<PacerId> {
        let mut ids: Vec<PacerId> = self
            .pacers
            .iter()
            .filter(|(_, pacer)| pacer.node == node)
            .map(|(&id, _)| id)
            .collect();
        ids.sort();
        ids
    }

}

impl Sim {
    /// Start pacing `node`. The hook may return `false` to stop.
    pub fn pace(
        &mut self,
        node: NodeId,
        kind: PaceKind,
        speed: SpeedSource,
        hook: impl FnMut(&mut Sim, NodeId, PaceEvent) -> bool + 'static,
    ) -> PacerId {
        let id = PacerId(self.pacing.next_id);
        self.pacing.next_id += 1;
        self.pacing.pacers.insert(
            id,
            Pacer {
                node,
                legs: kind.legs(),
                leg: 0,
                speed,
                state: PacerState::Starting,
                tick: None,
                hook: Some(Box::new(hook)),
            },
        );

        match self.scheduler.register(move |sim: &mut Sim| sim.advance_pacer(id)) {
            Ok(tick) => {
                if let Some(pacer) = self.pacing.pacers.get_mut(&id) {
                    pacer.tick = Some(tick);
                }
                log::debug!("Pacer {:?} started on {:?} ({:?})", id, node, kind);
            }
            Err(e) => {
                log::error!("Pacer on {:?} could not start: {}", node, e);
                self.stop_pacing(id);
            }
        }
        id
    }

    /// Stop a pacer, cancel its current leg and drop it from the registry
    pub fn stop_pacing(&mut self, id: PacerId) {
        let Some(pacer) = self.pacing.pacers.remove(&id) else {
            return;
        };
        if let Some(tick) = pacer.tick {
            self.scheduler.unregister(tick);
        }
        if let PacerState::Moving(handle) = pacer.state {
            self.uncross(handle);
        }
        log::debug!("Pacer {:?} on {:?} stopped", id, pacer.node);
    }

    pub(crate) fn stop_pacing_node(&mut self, node: NodeId) {
        for id in self.pacing.ids_of(node) {
            self.stop_pacing(id);
        }
    }

    /// Stopped pacers are no longer held but still report `Stopped`. `None`
    /// for ids this sim never handed out.
    pub fn pacer_state(&self, id: PacerId) -> Option<PacerState> {
        match self.pacing.pacers.get(&id) {
            Some(pacer) => Some(pacer.state),
            None if id.0 < self.pacing.next_id => Some(PacerState::Stopped),
            None => None,
        }
    }

    fn advance_pacer(&mut self, id: PacerId) {
        let Some(pacer) = self.pacing.pacers.get_mut(&id) else {
            return;
        };
        let node = pacer.node;
        let state = pacer.state;
        match state {
            PacerState::Moving(_) | PacerState::Stopped => return,
            PacerState::LegDone { forced: true } => {
                self.stop_pacing(id);
                return;
            }
            PacerState::LegDone { forced: false } => {
                pacer.leg += 1;
                if pacer.leg >= pacer.legs.len() {
                    pacer.leg = 0;
                    if !self.call_hook(id, node, PaceEvent::Lap) {
                        self.stop_pacing(id);
                        return;
                    }
                }
            }
            PacerState::Starting => {}
        }

        if !self.scene.exists(node) {
            self.stop_pacing(id);
            return;
        }
        let Some(pacer) = self.pacing.pacers.get(&id) else {
            return;
        };
        let Some(leg) = pacer.legs.get(pacer.leg).copied() else {
            self.stop_pacing(id);
            return;
        };
        if let Some(event) = leg.enter {
            if !self.call_hook(id, node, event) {
                self.stop_pacing(id);
                return;
            }
        }

        let Some(speed) = self.pacing.pacers.get(&id).map(|p| p.speed.clone()) else {
            return;
        };
        let options = CrossOptions::new()
            .speed(speed)
            .on_complete(move |sim: &mut Sim, _, forced| {
                if let Some(pacer) = sim.pacing.pacers.get_mut(&id) {
                    if matches!(pacer.state, PacerState::Moving(_)) {
                        pacer.state = PacerState::LegDone { forced };
                    }
                }
            });
        let handle = self.cross(node, leg.dx, leg.dy, options);
        match self.pacing.pacers.get_mut(&id) {
            Some(pacer) => pacer.state = PacerState::Moving(handle),
            None => self.uncross(handle),
        }
    }

    fn call_hook(&mut self, id: PacerId, node: NodeId, event: PaceEvent) -> bool {
        let Some(mut hook) = self
            .pacing
            .pacers
            .get_mut(&id)
            .and_then(|pacer| pacer.hook.take())
        else {
            return true;
        };
        let keep = hook(self, node, event);
        if let Some(pacer) = self.pacing.pacers.get_mut(&id) {
            pacer.hook.get_or_insert(hook);
        }
        keep && self.pacing.pacers.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::sim::scene::Node;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn setup() -> (Sim, NodeId) {
        let mut sim = Sim::new(GameConfig::default()).unwrap();
        let stage = sim.stage();
        let node = sim.scene.spawn(Node::new(100.0, 100.0, 8.0, 8.0));
        sim.add_child(stage, node).unwrap();
        (sim, node)
    }

    fn run(sim: &mut Sim, ticks: usize) {
        for _ in 0..ticks {
            sim.tick();
        }
    }

    fn recorder() -> (Rc<RefCell<Vec<PaceEvent>>>, impl FnMut(&mut Sim, NodeId, PaceEvent) -> bool) {
        let events = Rc::new(RefCell::new(Vec::new()));
        let log = events.clone();
        (events, move |_: &mut Sim, _, event| {
            log.borrow_mut().push(event);
            true
        })
    }

    #[test]
    fn test_straight_goes_forth_and_back() {
        let (mut sim, node) = setup();
        let (events, hook) = recorder();
        let id = sim.pace(
            node,
            PaceKind::Straight { size: 10.0, vertical: false },
            SpeedSource::Fixed(5.0),
            hook,
        );

        run(&mut sim, 1);
        assert!(matches!(sim.pacer_state(id), Some(PacerState::Moving(_))));
        run(&mut sim, 2);
        assert_eq!(sim.scene.rect(node).unwrap().x, 110.0);
        run(&mut sim, 30);
        assert!(events.borrow().starts_with(&[PaceEvent::Reverse, PaceEvent::Lap, PaceEvent::Reverse]));
        let x = sim.scene.rect(node).unwrap().x;
        assert!((100.0..=110.0).contains(&x));
    }

    #[test]
    fn test_square_reports_sides() {
        let (mut sim, node) = setup();
        let (events, hook) = recorder();
        sim.pace(node, PaceKind::Square { size: 4.0 }, SpeedSource::Fixed(4.0), hook);
        run(&mut sim, 14);
        assert_eq!(
            events.borrow()[..5],
            [
                PaceEvent::NewSide(Side::Bottom),
                PaceEvent::NewSide(Side::Left),
                PaceEvent::NewSide(Side::Top),
                PaceEvent::NewSide(Side::Right),
                PaceEvent::Lap,
            ]
        );
        let rect = sim.scene.rect(node).unwrap();
        assert_eq!((rect.x, rect.y), (100.0, 104.0));
    }

    #[test]
    fn test_circle_closes_the_polygon() {
        let legs = PaceKind::Circle { radius: 10.0, angle_step: 90.0 }.legs();
        assert_eq!(legs.len(), 4);
        let (dx, dy) = legs.iter().fold((0.0, 0.0), |(x, y), leg| (x + leg.dx, y + leg.dy));
        assert_eq!((dx, dy), (0.0, 0.0));
        assert_eq!(legs[0].enter, Some(PaceEvent::NewAngle(90.0)));
        assert_eq!((legs[0].dx, legs[0].dy), (-10.0, 10.0));
    }

    #[test]
    fn test_hook_false_stops() {
        let (mut sim, node) = setup();
        let id = sim.pace(
            node,
            PaceKind::Straight { size: 4.0, vertical: true },
            SpeedSource::Fixed(4.0),
            |_: &mut Sim, _, event| event != PaceEvent::Reverse,
        );
        run(&mut sim, 10);
        assert_eq!(sim.pacer_state(id), Some(PacerState::Stopped));
        assert_eq!(sim.scene.rect(node).unwrap().y, 104.0);
    }

    #[test]
    fn test_stop_pacing_cancels_current_leg() {
        let (mut sim, node) = setup();
        let id = sim.pace(
            node,
            PaceKind::Straight { size: 50.0, vertical: false },
            SpeedSource::Fixed(1.0),
            |_: &mut Sim, _, _| true,
        );
        run(&mut sim, 3);
        sim.stop_pacing(id);
        let x = sim.scene.rect(node).unwrap().x;
        run(&mut sim, 5);
        assert_eq!(sim.scene.rect(node).unwrap().x, x);
        assert_eq!(sim.pacer_state(id), Some(PacerState::Stopped));
        assert!(!sim.is_crossing(node));
    }

    #[test]
    fn test_forced_leg_stops_pacer() {
        let (mut sim, node) = setup();
        let id = sim.pace(
            node,
            PaceKind::Square { size: 40.0 },
            SpeedSource::Fixed(1.0),
            |_: &mut Sim, _, _| true,
        );
        run(&mut sim, 2);
        sim.uncross_all(node);
        run(&mut sim, 3);
        assert_eq!(sim.pacer_state(id), Some(PacerState::Stopped));
    }

    #[test]
    fn test_finalize_drops_pacers() {
        let (mut sim, node) = setup();
        let id = sim.pace(
            node,
            PaceKind::Square { size: 40.0 },
            SpeedSource::Node,
            |_: &mut Sim, _, _| true,
        );
        run(&mut sim, 2);
        sim.finalize(node);
        assert_eq!(sim.pacer_state(id), Some(PacerState::Stopped));
        assert!(sim.pacing.is_empty());
    }

    #[test]
    fn test_stopped_pacers_leave_the_registry() {
        let (mut sim, node) = setup();
        let first = sim.pace(
            node,
            PaceKind::Straight { size: 4.0, vertical: false },
            SpeedSource::Fixed(1.0),
            |_: &mut Sim, _, event| event != PaceEvent::Reverse,
        );
        assert_eq!(sim.pacing.len(), 1);

        // The node stays on the stage; only the pacer ends
        run(&mut sim, 10);
        assert_eq!(sim.pacer_state(first), Some(PacerState::Stopped));
        assert!(sim.pacing.is_empty());
        assert!(sim.scene.exists(node));

        let (_, hook) = recorder();
        let second = sim.pace(node, PaceKind::Square { size: 8.0 }, SpeedSource::Fixed(1.0), hook);
        run(&mut sim, 2);
        assert_eq!(sim.pacing.len(), 1);
        sim.stop_pacing(second);
        assert!(sim.pacing.is_empty());
        assert_eq!(sim.pacer_state(PacerId(99)), None);
    }
}
