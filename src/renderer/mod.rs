//! Render collaborator
//!
//! The simulation never touches a display. After each frame it hands a
//! `NodeView` of every changed node to a `RenderSink`, and tells it which
//! nodes are gone for good. The browser build draws with positioned `div`s.

#[cfg(target_arch = "wasm32")]
mod dom;

#[cfg(target_arch = "wasm32")]
pub use dom::DomRenderer;

use crate::sim::direction::Direction;
use crate::sim::entity::Directional;
use crate::sim::scene::{Node, NodeId};

/// Everything a renderer needs to draw one node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeView {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub alpha: f32,
    pub visible: bool,
    /// Style groups, in the order they were added
    pub groups: Vec<String>,
    pub parent: Option<NodeId>,
    /// Render-order hint among the parent's children
    pub z_index: Option<usize>,
    pub name: Option<String>,
    pub direction: Option<Direction>,
    pub in_motion: bool,
}

impl NodeView {
    pub fn of(node: &Node) -> Self {
        let entity = node.entity.as_ref();
        Self {
            x: node.x(),
            y: node.y(),
            width: node.width(),
            height: node.height(),
            alpha: node.alpha(),
            visible: node.is_visible(),
            groups: node.groups().to_vec(),
            parent: node.container(),
            z_index: node.z_index(),
            name: node.name().map(str::to_owned),
            direction: entity.map(|e| e.direction()),
            in_motion: entity
                .and_then(|e| e.character())
                .is_some_and(|c| c.in_motion),
        }
    }

    /// Space separated class list, with the heading and motion state
    /// appended for characters
    pub fn class_name(&self) -> String {
        let mut classes = self.groups.clone();
        if let Some(direction) = self.direction.filter(|d| !d.is_none()) {
            classes.push(format!("dir-{}", direction));
        }
        if self.in_motion {
            classes.push("in-motion".to_owned());
        }
        classes.join(" ")
    }

    /// CSS transform placing the node inside its parent
    pub fn transform(&self) -> String {
        format!("translate({}px, {}px)", self.x, self.y)
    }
}

pub trait RenderSink {
    /// The node was created or changed since the last flush
    fn update(&mut self, id: NodeId, view: &NodeView);

    /// The node has been reaped; its id will never be reported again
    fn release(&mut self, id: NodeId);
}

#[cfg(test)]
pub(crate) mod recording {
    use std::collections::HashMap;

    use super::*;

    /// Sink that keeps the latest view of every node
    #[derive(Debug, Default)]
    pub struct RecordingSink {
        pub views: HashMap<NodeId, NodeView>,
        pub released: Vec<NodeId>,
        pub updates: usize,
    }

    impl RenderSink for RecordingSink {
        fn update(&mut self, id: NodeId, view: &NodeView) {
            self.updates += 1;
            self.views.insert(id, view.clone());
        }

        fn release(&mut self, id: NodeId) {
            self.views.remove(&id);
            self.released.push(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::recording::RecordingSink;
    use super::*;
    use crate::config::GameConfig;
    use crate::sim::Sim;

    #[test]
    fn test_flush_reports_changed_nodes_once() {
        let mut sim = Sim::new(GameConfig::default()).unwrap();
        let player = sim.spawn_player().unwrap();
        let mut sink = RecordingSink::default();

        sim.flush_render(&mut sink);
        let view = &sink.views[&player];
        assert_eq!((view.x, view.y), (232.0, 254.0));
        assert_eq!(view.parent, Some(sim.stage()));
        assert!(view.groups.iter().any(|g| g == "hero"));
        assert_eq!(view.direction, Some(Direction::UP));

        let updates = sink.updates;
        sim.flush_render(&mut sink);
        assert_eq!(sink.updates, updates);

        sim.scene.move_by(player, -3.0, 0.0);
        sim.flush_render(&mut sink);
        assert_eq!(sink.updates, updates + 1);
        assert_eq!(sink.views[&player].x, 229.0);
    }

    #[test]
    fn test_reaped_nodes_are_released() {
        let mut sim = Sim::new(GameConfig::default()).unwrap();
        let stage = sim.stage();
        let node = sim.scene.spawn(Node::new(0.0, 0.0, 4.0, 4.0));
        sim.add_child(stage, node).unwrap();
        let mut sink = RecordingSink::default();
        sim.flush_render(&mut sink);
        assert!(sink.views.contains_key(&node));

        sim.finalize(node);
        sim.tick();
        sim.flush_render(&mut sink);
        assert_eq!(sink.released, vec![node]);
        assert!(!sink.views.contains_key(&node));
    }

    #[test]
    fn test_class_name_carries_heading_and_motion() {
        let mut view = NodeView::of(&Node::new(1.0, 2.0, 3.0, 4.0).with_group("box"));
        assert_eq!(view.class_name(), "box");
        assert_eq!(view.transform(), "translate(1px, 2px)");

        view.direction = Some(Direction::UP_LEFT);
        view.in_motion = true;
        assert_eq!(
            view.class_name(),
            format!("box dir-{} in-motion", Direction::UP_LEFT)
        );
    }
}
