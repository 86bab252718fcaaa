//! Retained scene graph
//!
//! Nodes live in an arena and are addressed by generational `NodeId`s. A node
//! with a child slot list is a container. Child slots are sparse: removing a
//! child leaves a hole, and the slot index doubles as the node's z-order hint.
//!
//! - Containment changes queue `NodeEvent`s for the context to dispatch
//! - Visual changes mark nodes dirty for the render collaborator
//! - Finalized nodes stay readable until `reap` frees their slot

use std::collections::HashMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entity::Entity;
use super::events::NodeEvent;
use super::geom::{Bounds, Rect};
use crate::error::{Result, SimError};

/// Handle to a node; stale once the node has been reaped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// Anything with a rectangle in its container's space
pub trait Positioned {
    fn rect(&self) -> Rect;

    fn position(&self) -> Vec2 {
        self.rect().position()
    }
}

/// Anything whose movement can be constrained
pub trait Bounded: Positioned {
    fn bounds(&self) -> Option<Bounds>;

    /// Tests the position only, not the full extent. `bounds` overrides the
    /// node's own bounds; with neither, nothing is out of bounds.
    fn is_out_of_bounds(&self, bounds: Option<&Bounds>) -> bool {
        let own = self.bounds();
        match bounds.or(own.as_ref()) {
            Some(b) => {
                let pos = self.position();
                b.excludes(pos.x, pos.y)
            }
            None => false,
        }
    }
}

/// A scene graph node
#[derive(Debug, Clone)]
pub struct Node {
    rect: Rect,
    visible: bool,
    locked: bool,
    alpha: f32,
    bounds: Option<Bounds>,
    name: Option<String>,
    metadata: HashMap<String, Value>,
    groups: Vec<String>,
    step_size: f32,
    finalized: bool,
    container: Option<NodeId>,
    children: Option<Vec<Option<NodeId>>>,
    child_count: usize,
    z_index: Option<usize>,
    dirty: bool,
    pub entity: Option<Entity>,
}

impl Node {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            rect: Rect::new(x, y, width.max(0.0), height.max(0.0)),
            visible: true,
            locked: false,
            alpha: 1.0,
            bounds: None,
            name: None,
            metadata: HashMap::new(),
            groups: Vec::new(),
            step_size: 1.0,
            finalized: false,
            container: None,
            children: None,
            child_count: 0,
            z_index: None,
            dirty: false,
            entity: None,
        }
    }

    /// Give the node a child slot list
    pub fn into_container(mut self) -> Self {
        if self.children.is_none() {
            self.children = Some(Vec::new());
        }
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        let group = group.into();
        if !self.groups.contains(&group) {
            self.groups.push(group);
        }
        self
    }

    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn with_step_size(mut self, step_size: f32) -> Self {
        self.step_size = step_size;
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn x(&self) -> f32 {
        self.rect.x
    }

    pub fn y(&self) -> f32 {
        self.rect.y
    }

    pub fn width(&self) -> f32 {
        self.rect.width
    }

    pub fn height(&self) -> f32 {
        self.rect.height
    }

    /// Horizontal center in local space
    pub fn center_x(&self) -> f32 {
        self.rect.width / 2.0
    }

    /// Vertical center in local space
    pub fn center_y(&self) -> f32 {
        self.rect.height / 2.0
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }

    pub fn step_size(&self) -> f32 {
        self.step_size
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn container(&self) -> Option<NodeId> {
        self.container
    }

    pub fn is_container(&self) -> bool {
        self.children.is_some()
    }

    pub fn child_count(&self) -> usize {
        self.child_count
    }

    /// Render-order hint, equal to the slot index in the container
    pub fn z_index(&self) -> Option<usize> {
        self.z_index
    }

    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn has_meta(&self, key: &str) -> bool {
        self.metadata.contains_key(key)
    }

    /// Current bounds as edges of this node's own rectangle
    pub fn to_bounds(&self, absolute: bool) -> Bounds {
        Bounds::from_rect(&self.rect, absolute)
    }
}

impl Positioned for Node {
    fn rect(&self) -> Rect {
        self.rect
    }
}

impl Bounded for Node {
    fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Changes the render collaborator has not seen yet
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RenderChanges {
    pub updated: Vec<NodeId>,
    pub released: Vec<NodeId>,
}

/// Arena of nodes and the containment tree between them
#[derive(Debug, Default)]
pub struct Scene {
    slots: Vec<Slot>,
    free: Vec<u32>,
    graveyard: Vec<NodeId>,
    events: Vec<NodeEvent>,
    dirty: Vec<NodeId>,
    released: Vec<NodeId>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the arena. It starts as a root.
    pub fn spawn(&mut self, mut node: Node) -> NodeId {
        node.finalized = false;
        node.container = None;
        node.z_index = None;
        node.child_count = 0;
        if let Some(children) = node.children.as_mut() {
            children.clear();
        }
        node.dirty = true;

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId {
                    index,
                    generation: 0,
                }
            }
        };
        self.dirty.push(id);
        id
    }

    /// Node data, including finalized nodes not yet reaped
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    /// Mutable access to a live node. Touching a finalized node is a bug.
    fn live_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let node = self.slot_mut(id)?;
        if node.finalized {
            log::error!("Mutation of finalized node {:?}", id);
            debug_assert!(false, "mutation of finalized node {id:?}");
            return None;
        }
        Some(node)
    }

    /// Present and not finalized
    pub fn exists(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(|node| !node.finalized)
    }

    /// Finalized, or already reaped
    pub fn is_finalized(&self, id: NodeId) -> bool {
        self.get(id).is_none_or(|node| node.finalized)
    }

    /// Number of nodes in the arena, finalized ones included until reaped
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entity(&self, id: NodeId) -> Option<&Entity> {
        self.get(id)?.entity.as_ref()
    }

    /// Mutable payload access; marks the node dirty for the renderer
    pub fn entity_mut(&mut self, id: NodeId) -> Option<&mut Entity> {
        if self.exists(id) {
            self.mark_dirty(id);
        }
        self.live_mut(id)?.entity.as_mut()
    }

    pub fn rect(&self, id: NodeId) -> Option<Rect> {
        self.get(id).map(|node| node.rect)
    }

    fn mark_dirty(&mut self, id: NodeId) {
        if let Some(node) = self.slot_mut(id) {
            if !node.dirty {
                node.dirty = true;
                self.dirty.push(id);
            }
        }
    }

    // ---- node state ----

    /// Raw position update: no clamping, ignores the lock
    pub fn set_position(&mut self, id: NodeId, x: f32, y: f32) {
        if let Some(node) = self.live_mut(id) {
            node.rect.x = x;
            node.rect.y = y;
            self.mark_dirty(id);
        }
    }

    /// Move to `(x, y)` clamped to the node's bounds. No-op when locked.
    pub fn move_to(&mut self, id: NodeId, x: f32, y: f32) {
        let Some(node) = self.live_mut(id) else {
            return;
        };
        if node.locked {
            return;
        }
        let (x, y) = match node.bounds {
            Some(bounds) => bounds.clamp(x, y),
            None => (x, y),
        };
        node.rect.x = x;
        node.rect.y = y;
        self.mark_dirty(id);
    }

    /// Relative move from the current logical position
    pub fn move_by(&mut self, id: NodeId, dx: f32, dy: f32) {
        if let Some(rect) = self.rect(id) {
            self.move_to(id, rect.x + dx, rect.y + dy);
        }
    }

    pub fn set_size(&mut self, id: NodeId, width: f32, height: f32) {
        if let Some(node) = self.live_mut(id) {
            node.rect.width = width.max(0.0);
            node.rect.height = height.max(0.0);
            self.mark_dirty(id);
        }
    }

    pub fn set_alpha(&mut self, id: NodeId, alpha: f32) {
        if let Some(node) = self.live_mut(id) {
            node.alpha = alpha.clamp(0.0, 1.0);
            self.mark_dirty(id);
        }
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        if let Some(node) = self.live_mut(id) {
            node.visible = visible;
            self.mark_dirty(id);
        }
    }

    pub fn set_locked(&mut self, id: NodeId, locked: bool) {
        if let Some(node) = self.live_mut(id) {
            node.locked = locked;
        }
    }

    pub fn set_step_size(&mut self, id: NodeId, step_size: f32) {
        if let Some(node) = self.live_mut(id) {
            node.step_size = step_size;
        }
    }

    pub fn set_name(&mut self, id: NodeId, name: Option<String>) {
        if let Some(node) = self.live_mut(id) {
            node.name = name;
        }
    }

    pub fn set_bounds(&mut self, id: NodeId, bounds: Option<Bounds>) {
        if let Some(node) = self.live_mut(id) {
            node.bounds = bounds;
        }
    }

    pub fn bounds(&self, id: NodeId) -> Option<Bounds> {
        self.get(id)?.bounds
    }

    /// Derive bounds from the container's size, either keeping the node
    /// inside it or in a band one node-size wide just outside it
    pub fn bound_to_container(&mut self, id: NodeId, outside: bool) -> Result<()> {
        let node = self.get(id).ok_or(SimError::NodeNotFound(id))?;
        let container = node.container.ok_or(SimError::NoContainer(id))?;
        let parent = self.get(container).ok_or(SimError::NodeNotFound(container))?;
        let (w, h) = (node.rect.width, node.rect.height);
        let (cw, ch) = (parent.rect.width, parent.rect.height);

        let bounds = if outside {
            Bounds::new(-h, cw + w, ch + h, -w)
        } else {
            Bounds::new(0.0, cw - w, ch - h, 0.0)
        };
        self.set_bounds(id, Some(bounds));
        Ok(())
    }

    pub fn to_bounds(&self, id: NodeId, absolute: bool) -> Option<Bounds> {
        self.get(id).map(|node| node.to_bounds(absolute))
    }

    pub fn is_out_of_bounds(&self, id: NodeId, bounds: Option<&Bounds>) -> bool {
        self.get(id)
            .is_some_and(|node| node.is_out_of_bounds(bounds))
    }

    pub fn set_meta(&mut self, id: NodeId, key: impl Into<String>, value: Value) {
        if let Some(node) = self.live_mut(id) {
            node.metadata.insert(key.into(), value);
        }
    }

    pub fn meta(&self, id: NodeId, key: &str) -> Option<&Value> {
        self.get(id)?.meta(key)
    }

    pub fn has_meta(&self, id: NodeId, key: &str) -> bool {
        self.get(id).is_some_and(|node| node.has_meta(key))
    }

    pub fn remove_meta(&mut self, id: NodeId, key: &str) -> Option<Value> {
        self.live_mut(id)?.metadata.remove(key)
    }

    pub fn add_group(&mut self, id: NodeId, group: &str) {
        if let Some(node) = self.live_mut(id) {
            if !node.has_group(group) {
                node.groups.push(group.to_string());
                self.mark_dirty(id);
            }
        }
    }

    pub fn remove_group(&mut self, id: NodeId, group: &str) {
        if let Some(node) = self.live_mut(id) {
            let before = node.groups.len();
            node.groups.retain(|g| g != group);
            if node.groups.len() != before {
                self.mark_dirty(id);
            }
        }
    }

    // ---- containment ----

    fn slots_of(&self, container: NodeId) -> Result<&Vec<Option<NodeId>>> {
        let node = self
            .get(container)
            .ok_or(SimError::NodeNotFound(container))?;
        node.children
            .as_ref()
            .ok_or(SimError::NotAContainer(container))
    }

    fn slots_of_mut(&mut self, container: NodeId) -> Result<&mut Vec<Option<NodeId>>> {
        let node = self
            .slot_mut(container)
            .ok_or(SimError::NodeNotFound(container))?;
        node.children
            .as_mut()
            .ok_or(SimError::NotAContainer(container))
    }

    /// Whether `ancestor` is `id` or one of its containers
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.get(node).and_then(|n| n.container);
        }
        false
    }

    fn check_insertable(&self, container: NodeId, child: NodeId) -> Result<()> {
        if !self.exists(child) {
            return Err(SimError::NodeNotFound(child));
        }
        if !self.exists(container) {
            return Err(SimError::NodeNotFound(container));
        }
        if self.is_ancestor(child, container) {
            return Err(SimError::NotAChild {
                node: child,
                container,
            });
        }
        Ok(())
    }

    fn attach(&mut self, container: NodeId, child: NodeId, index: usize) {
        if let Some(node) = self.slot_mut(child) {
            node.container = Some(container);
            node.z_index = Some(index);
        }
        if let Some(parent) = self.slot_mut(container) {
            parent.child_count += 1;
        }
        self.mark_dirty(child);
        self.events.push(NodeEvent::Added {
            node: child,
            container,
            index,
        });
    }

    fn detach(&mut self, container: NodeId, child: NodeId) {
        if let Some(node) = self.slot_mut(child) {
            debug_assert_eq!(node.container, Some(container), "container back-reference mismatch");
            node.container = None;
            node.z_index = None;
        }
        if let Some(parent) = self.slot_mut(container) {
            parent.child_count = parent.child_count.saturating_sub(1);
        }
        self.mark_dirty(child);
        self.events.push(NodeEvent::Removed {
            node: child,
            container,
        });
    }

    /// Append `child` to the end of the slot list. Holes are not reused.
    /// A child already in `container` stays where it is; a child of another
    /// container is moved.
    pub fn add_child(&mut self, container: NodeId, child: NodeId) -> Result<()> {
        self.slots_of(container)?;
        self.check_insertable(container, child)?;

        match self.get(child).and_then(|n| n.container) {
            Some(current) if current == container => return Ok(()),
            Some(current) => {
                self.remove_child(current, child);
            }
            None => {}
        }

        let slots = self.slots_of_mut(container)?;
        slots.push(Some(child));
        let index = slots.len() - 1;
        self.attach(container, child, index);
        Ok(())
    }

    /// Put `child` in slot `index`, replacing (and detaching) the previous
    /// occupant, which is returned. Valid for index 0 or any existing slot.
    pub fn add_child_at(
        &mut self,
        container: NodeId,
        child: NodeId,
        index: usize,
    ) -> Result<Option<NodeId>> {
        let len = self.slots_of(container)?.len();
        if !(index == 0 || index < len) {
            return Err(SimError::IndexOutOfRange { index, len });
        }
        self.check_insertable(container, child)?;

        if let Some(current) = self.get(child).and_then(|n| n.container) {
            self.remove_child(current, child);
        }

        let previous = self.slots_of(container)?.get(index).copied().flatten();
        if let Some(previous) = previous {
            self.detach(container, previous);
        }

        let slots = self.slots_of_mut(container)?;
        if index < slots.len() {
            slots[index] = Some(child);
        } else {
            slots.push(Some(child));
        }
        self.attach(container, child, index);
        Ok(previous)
    }

    /// Slot of a direct child, trusting the z-order hint when it is accurate
    fn locate(&self, container: NodeId, child: NodeId) -> Option<usize> {
        let node = self.get(child)?;
        if node.container != Some(container) {
            return None;
        }
        let slots = self.slots_of(container).ok()?;
        if let Some(hint) = node.z_index {
            if slots.get(hint).copied().flatten() == Some(child) {
                return Some(hint);
            }
        }
        let found = slots.iter().position(|slot| *slot == Some(child));
        debug_assert!(found.is_some(), "child {child:?} missing from {container:?}");
        found
    }

    /// Detach `child`. Silently ignored when it is not a child of `container`.
    pub fn remove_child(&mut self, container: NodeId, child: NodeId) -> bool {
        let Some(pos) = self.locate(container, child) else {
            return false;
        };
        if let Ok(slots) = self.slots_of_mut(container) {
            slots[pos] = None;
        }
        self.detach(container, child);
        true
    }

    pub fn remove_child_at(&mut self, container: NodeId, index: usize) -> Option<NodeId> {
        let child = self.child_at(container, index)?;
        self.remove_child(container, child);
        Some(child)
    }

    /// Remove the children in slots `begin..end` (`end` defaults to the slot count)
    pub fn remove_children(
        &mut self,
        container: NodeId,
        begin: usize,
        end: Option<usize>,
    ) -> Result<()> {
        let len = self.slots_of(container)?.len();
        let end = end.unwrap_or(len);
        if begin > end || end > len {
            return Err(SimError::IndexOutOfRange {
                index: begin.max(end),
                len,
            });
        }
        for index in begin..end {
            self.remove_child_at(container, index);
        }
        Ok(())
    }

    /// Detach a node from whatever container holds it
    pub fn remove(&mut self, id: NodeId) -> bool {
        match self.get(id).and_then(|n| n.container) {
            Some(container) => self.remove_child(container, id),
            None => false,
        }
    }

    /// Number of child slots including holes
    pub fn slot_len(&self, container: NodeId) -> usize {
        self.slots_of(container).map_or(0, |slots| slots.len())
    }

    pub fn child_at(&self, container: NodeId, index: usize) -> Option<NodeId> {
        self.slots_of(container).ok()?.get(index).copied().flatten()
    }

    pub fn child_by_name(&self, container: NodeId, name: &str) -> Option<NodeId> {
        self.slots_of(container)
            .ok()?
            .iter()
            .flatten()
            .copied()
            .find(|&id| self.get(id).and_then(|n| n.name()) == Some(name))
    }

    pub fn child_index(&self, container: NodeId, child: NodeId) -> Option<usize> {
        self.locate(container, child)
    }

    /// `node` is the container itself or one of its direct children
    pub fn contains(&self, container: NodeId, node: NodeId) -> bool {
        node == container || self.locate(container, node).is_some()
    }

    pub fn children(&self, container: NodeId) -> Vec<NodeId> {
        self.children_where(container, |_, _| true)
    }

    pub fn children_where(
        &self,
        container: NodeId,
        filter: impl Fn(NodeId, &Node) -> bool,
    ) -> Vec<NodeId> {
        let Ok(slots) = self.slots_of(container) else {
            return Vec::new();
        };
        slots
            .iter()
            .flatten()
            .copied()
            .filter(|&id| self.get(id).is_some_and(|node| filter(id, node)))
            .collect()
    }

    /// Depth-first pre-order. Only children passing `filter` are listed and
    /// descended into.
    pub fn descendants_where(
        &self,
        container: NodeId,
        filter: impl Fn(NodeId, &Node) -> bool,
    ) -> Vec<NodeId> {
        let mut found = Vec::new();
        self.collect_descendants(container, &filter, &mut found);
        found
    }

    fn collect_descendants(
        &self,
        container: NodeId,
        filter: &dyn Fn(NodeId, &Node) -> bool,
        found: &mut Vec<NodeId>,
    ) {
        for id in self.children_where(container, filter) {
            found.push(id);
            if self.get(id).is_some_and(Node::is_container) {
                self.collect_descendants(id, filter, found);
            }
        }
    }

    pub fn descendants(&self, container: NodeId) -> Vec<NodeId> {
        self.descendants_where(container, |_, _| true)
    }

    /// Direct children whose rectangle contains `point` (container space)
    pub fn children_under_point(&self, container: NodeId, point: Vec2) -> Vec<NodeId> {
        self.children_where(container, |_, node| node.rect.contains_point(point))
    }

    /// Descendants under `point`; the point is carried into each child's own
    /// space before descending
    pub fn descendants_under_point(&self, container: NodeId, point: Vec2) -> Vec<NodeId> {
        let mut found = Vec::new();
        for id in self.children_under_point(container, point) {
            found.push(id);
            if let Some(node) = self.get(id) {
                if node.is_container() {
                    let local = point - node.rect.position();
                    found.extend(self.descendants_under_point(id, local));
                }
            }
        }
        found
    }

    /// Rectangle of `id` expressed in the space of `ancestor`
    pub fn rect_in(&self, id: NodeId, ancestor: NodeId) -> Option<Rect> {
        let node = self.get(id)?;
        let mut rect = node.rect;
        let mut current = node.container;
        while let Some(parent) = current {
            if parent == ancestor {
                return Some(rect);
            }
            let parent_node = self.get(parent)?;
            rect = rect.translated(parent_node.rect.position());
            current = parent_node.container;
        }
        // Detached or finalized nodes keep their last local rectangle
        Some(node.rect)
    }

    /// Move `child` to slot `index`, shifting the siblings in between by one
    pub fn set_child_index(&mut self, container: NodeId, child: NodeId, index: usize) -> Result<()> {
        let len = self.slots_of(container)?.len();
        let old = self.locate(container, child).ok_or(SimError::NotAChild {
            node: child,
            container,
        })?;
        if index >= len {
            return Err(SimError::IndexOutOfRange { index, len });
        }
        if index == old {
            return Ok(());
        }

        let mut slots = self.slots_of(container)?.clone();
        let mut carried = Some(child);
        let range: Box<dyn Iterator<Item = usize>> = if index < old {
            Box::new(index..=old)
        } else {
            Box::new((old..=index).rev())
        };
        for pos in range {
            let previous = slots[pos];
            slots[pos] = carried;
            carried = previous;
        }

        let (low, high) = (index.min(old), index.max(old));
        *self.slots_of_mut(container)? = slots.clone();
        for (pos, slot) in slots.iter().enumerate().take(high + 1).skip(low) {
            if let Some(id) = slot {
                self.apply_z_index(*id, pos);
            }
        }
        Ok(())
    }

    fn apply_z_index(&mut self, id: NodeId, index: usize) {
        if let Some(node) = self.slot_mut(id) {
            node.z_index = Some(index);
        }
        self.mark_dirty(id);
    }

    /// Exchange two direct children's slots
    pub fn swap_children(&mut self, container: NodeId, a: NodeId, b: NodeId) -> Result<()> {
        let not_child = |node| SimError::NotAChild { node, container };
        let ia = self.locate(container, a).ok_or_else(|| not_child(a))?;
        let ib = self.locate(container, b).ok_or_else(|| not_child(b))?;
        self.swap_children_at(container, ia, ib)
    }

    /// Exchange two occupied slots
    pub fn swap_children_at(&mut self, container: NodeId, i: usize, j: usize) -> Result<()> {
        let slots = self.slots_of(container)?;
        let len = slots.len();
        let a = slots
            .get(i)
            .copied()
            .flatten()
            .ok_or(SimError::IndexOutOfRange { index: i, len })?;
        let b = slots
            .get(j)
            .copied()
            .flatten()
            .ok_or(SimError::IndexOutOfRange { index: j, len })?;

        let slots = self.slots_of_mut(container)?;
        slots.swap(i, j);
        self.apply_z_index(a, j);
        self.apply_z_index(b, i);
        Ok(())
    }

    // ---- lifecycle ----

    /// Irreversibly tear a node down: detach it, finalize everything below it
    /// and schedule the slots for reaping. Repeated calls do nothing.
    pub fn finalize(&mut self, id: NodeId) -> bool {
        match self.get(id) {
            Some(node) if !node.finalized => {}
            _ => return false,
        }

        let descendants = self.descendants_where(id, |_, node| !node.finalized);
        self.remove(id);
        self.bury(id);
        for descendant in &descendants {
            self.bury(*descendant);
        }
        log::debug!("Finalized node {:?} and {} descendants", id, descendants.len());
        true
    }

    fn bury(&mut self, id: NodeId) {
        let children = self
            .slot_mut(id)
            .and_then(|node| node.children.take())
            .unwrap_or_default();
        for child in children.into_iter().flatten() {
            self.detach(id, child);
        }

        if let Some(node) = self.slot_mut(id) {
            node.finalized = true;
            node.child_count = 0;
        }
        self.graveyard.push(id);
    }

    /// Free the slots of finalized nodes. Returns the reaped ids.
    pub fn reap(&mut self) -> Vec<NodeId> {
        let reaped = std::mem::take(&mut self.graveyard);
        for id in &reaped {
            if let Some(slot) = self.slots.get_mut(id.index as usize) {
                if slot.generation == id.generation {
                    slot.node = None;
                    slot.generation = slot.generation.wrapping_add(1);
                    self.free.push(id.index);
                }
            }
        }
        self.released.extend(reaped.iter().copied());
        reaped
    }

    pub(crate) fn take_events(&mut self) -> Vec<NodeEvent> {
        std::mem::take(&mut self.events)
    }

    /// Drain the dirty and released lists
    pub fn take_render_changes(&mut self) -> RenderChanges {
        let updated: Vec<NodeId> = std::mem::take(&mut self.dirty)
            .into_iter()
            .filter(|&id| {
                self.slot_mut(id).is_some_and(|node| {
                    node.dirty = false;
                    true
                })
            })
            .collect();
        RenderChanges {
            updated,
            released: std::mem::take(&mut self.released),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scene_with_children(count: usize) -> (Scene, NodeId, Vec<NodeId>) {
        let mut scene = Scene::new();
        let root = scene.spawn(Node::new(0.0, 0.0, 100.0, 100.0).into_container());
        let children = (0..count)
            .map(|i| {
                let child = scene.spawn(Node::new(i as f32 * 10.0, 0.0, 10.0, 10.0));
                scene.add_child(root, child).unwrap();
                child
            })
            .collect();
        scene.take_events();
        (scene, root, children)
    }

    #[test]
    fn test_add_child_assigns_ownership() {
        let (scene, root, children) = scene_with_children(2);
        let node = scene.get(children[1]).unwrap();
        assert_eq!(node.container(), Some(root));
        assert_eq!(node.z_index(), Some(1));
        assert_eq!(scene.get(root).unwrap().child_count(), 2);
        assert!(scene.contains(root, children[0]));
        assert!(scene.contains(root, root));
    }

    #[test]
    fn test_add_child_emits_added() {
        let mut scene = Scene::new();
        let root = scene.spawn(Node::new(0.0, 0.0, 10.0, 10.0).into_container());
        let child = scene.spawn(Node::new(0.0, 0.0, 1.0, 1.0));
        scene.add_child(root, child).unwrap();
        assert_eq!(
            scene.take_events(),
            vec![NodeEvent::Added {
                node: child,
                container: root,
                index: 0
            }]
        );
        // Adding again is a no-op
        scene.add_child(root, child).unwrap();
        assert!(scene.take_events().is_empty());
    }

    #[test]
    fn test_add_child_to_leaf_fails() {
        let mut scene = Scene::new();
        let leaf = scene.spawn(Node::new(0.0, 0.0, 1.0, 1.0));
        let child = scene.spawn(Node::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(scene.add_child(leaf, child), Err(SimError::NotAContainer(leaf)));
    }

    #[test]
    fn test_add_child_rejects_cycles() {
        let mut scene = Scene::new();
        let outer = scene.spawn(Node::new(0.0, 0.0, 10.0, 10.0).into_container());
        let inner = scene.spawn(Node::new(0.0, 0.0, 5.0, 5.0).into_container());
        scene.add_child(outer, inner).unwrap();
        assert!(scene.add_child(inner, outer).is_err());
    }

    #[test]
    fn test_add_child_at_replaces_slot() {
        let (mut scene, root, children) = scene_with_children(3);
        let newcomer = scene.spawn(Node::new(0.0, 0.0, 1.0, 1.0));
        let previous = scene.add_child_at(root, newcomer, 1).unwrap();
        assert_eq!(previous, Some(children[1]));
        assert_eq!(scene.get(children[1]).unwrap().container(), None);
        assert_eq!(scene.child_at(root, 1), Some(newcomer));
        assert_eq!(scene.get(root).unwrap().child_count(), 3);
    }

    #[test]
    fn test_add_child_at_out_of_range() {
        let (mut scene, root, _) = scene_with_children(2);
        let newcomer = scene.spawn(Node::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(
            scene.add_child_at(root, newcomer, 2),
            Err(SimError::IndexOutOfRange { index: 2, len: 2 })
        );

        let mut empty = Scene::new();
        let root = empty.spawn(Node::new(0.0, 0.0, 1.0, 1.0).into_container());
        let child = empty.spawn(Node::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(empty.add_child_at(root, child, 0), Ok(None));
        assert_eq!(empty.child_at(root, 0), Some(child));
    }

    #[test]
    fn test_remove_child_leaves_hole() {
        let (mut scene, root, children) = scene_with_children(3);
        assert!(scene.remove_child(root, children[1]));
        assert_eq!(scene.child_at(root, 1), None);
        assert_eq!(scene.slot_len(root), 3);
        assert_eq!(scene.children(root), vec![children[0], children[2]]);
        assert_eq!(
            scene.take_events(),
            vec![NodeEvent::Removed {
                node: children[1],
                container: root
            }]
        );

        // Second removal is a silent no-op
        assert!(!scene.remove_child(root, children[1]));
        assert!(scene.take_events().is_empty());
        assert_eq!(scene.get(root).unwrap().child_count(), 2);
    }

    #[test]
    fn test_set_child_index_shifts_siblings() {
        let (mut scene, root, c) = scene_with_children(3);
        scene.set_child_index(root, c[0], 2).unwrap();
        assert_eq!(scene.children(root), vec![c[1], c[2], c[0]]);
        for (expected, id) in [c[1], c[2], c[0]].iter().enumerate() {
            assert_eq!(scene.get(*id).unwrap().z_index(), Some(expected));
        }

        scene.set_child_index(root, c[0], 0).unwrap();
        assert_eq!(scene.children(root), vec![c[0], c[1], c[2]]);
    }

    #[test]
    fn test_set_child_index_errors() {
        let (mut scene, root, c) = scene_with_children(2);
        let stranger = scene.spawn(Node::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(
            scene.set_child_index(root, stranger, 0),
            Err(SimError::NotAChild {
                node: stranger,
                container: root
            })
        );
        assert_eq!(
            scene.set_child_index(root, c[0], 5),
            Err(SimError::IndexOutOfRange { index: 5, len: 2 })
        );
    }

    #[test]
    fn test_swap_children() {
        let (mut scene, root, c) = scene_with_children(3);
        scene.swap_children(root, c[0], c[2]).unwrap();
        assert_eq!(scene.children(root), vec![c[2], c[1], c[0]]);
        assert_eq!(scene.get(c[0]).unwrap().z_index(), Some(2));

        scene.remove_child(root, c[1]);
        assert!(scene.swap_children_at(root, 0, 1).is_err());
    }

    #[test]
    fn test_child_by_name_first_match() {
        let mut scene = Scene::new();
        let root = scene.spawn(Node::new(0.0, 0.0, 10.0, 10.0).into_container());
        let a = scene.spawn(Node::new(0.0, 0.0, 1.0, 1.0).with_name("crate"));
        let b = scene.spawn(Node::new(0.0, 0.0, 1.0, 1.0).with_name("crate"));
        scene.add_child(root, a).unwrap();
        scene.add_child(root, b).unwrap();
        assert_eq!(scene.child_by_name(root, "crate"), Some(a));
        assert_eq!(scene.child_by_name(root, "barrel"), None);
    }

    #[test]
    fn test_descendants_pre_order_with_filter() {
        let mut scene = Scene::new();
        let root = scene.spawn(Node::new(0.0, 0.0, 100.0, 100.0).into_container());
        let group = scene.spawn(Node::new(10.0, 10.0, 50.0, 50.0).into_container().with_group("keep"));
        let inner = scene.spawn(Node::new(5.0, 5.0, 5.0, 5.0).with_group("keep"));
        let skipped = scene.spawn(Node::new(0.0, 0.0, 50.0, 50.0).into_container());
        let hidden = scene.spawn(Node::new(0.0, 0.0, 5.0, 5.0).with_group("keep"));
        scene.add_child(root, group).unwrap();
        scene.add_child(group, inner).unwrap();
        scene.add_child(root, skipped).unwrap();
        scene.add_child(skipped, hidden).unwrap();

        assert_eq!(scene.descendants(root), vec![group, inner, skipped, hidden]);
        let kept = scene.descendants_where(root, |_, n| n.has_group("keep"));
        assert_eq!(kept, vec![group, inner]);
    }

    #[test]
    fn test_descendants_under_point() {
        let mut scene = Scene::new();
        let root = scene.spawn(Node::new(0.0, 0.0, 100.0, 100.0).into_container());
        let panel = scene.spawn(Node::new(10.0, 10.0, 50.0, 50.0).into_container());
        let button = scene.spawn(Node::new(5.0, 5.0, 10.0, 10.0));
        scene.add_child(root, panel).unwrap();
        scene.add_child(panel, button).unwrap();

        assert_eq!(scene.descendants_under_point(root, Vec2::new(17.0, 17.0)), vec![panel, button]);
        assert_eq!(scene.descendants_under_point(root, Vec2::new(40.0, 40.0)), vec![panel]);
        assert_eq!(scene.children_under_point(root, Vec2::new(90.0, 90.0)), Vec::<NodeId>::new());
        assert_eq!(scene.rect_in(button, root), Some(Rect::new(15.0, 15.0, 10.0, 10.0)));
    }

    #[test]
    fn test_move_to_respects_lock_and_bounds() {
        let mut scene = Scene::new();
        let id = scene.spawn(Node::new(5.0, 5.0, 10.0, 10.0).with_bounds(Bounds::new(0.0, 50.0, 50.0, 0.0)));
        scene.move_to(id, 80.0, -3.0);
        assert_eq!(scene.rect(id).unwrap().position(), Vec2::new(50.0, 0.0));

        scene.set_locked(id, true);
        scene.move_to(id, 10.0, 10.0);
        assert_eq!(scene.rect(id).unwrap().position(), Vec2::new(50.0, 0.0));

        // Raw positioning ignores lock and bounds
        scene.set_position(id, 90.0, 90.0);
        assert_eq!(scene.rect(id).unwrap().position(), Vec2::new(90.0, 90.0));
    }

    #[test]
    fn test_bound_to_container() {
        let mut scene = Scene::new();
        let root = scene.spawn(Node::new(0.0, 0.0, 480.0, 270.0).into_container());
        let id = scene.spawn(Node::new(0.0, 0.0, 16.0, 16.0));
        assert_eq!(scene.bound_to_container(id, false), Err(SimError::NoContainer(id)));

        scene.add_child(root, id).unwrap();
        scene.bound_to_container(id, false).unwrap();
        assert_eq!(scene.bounds(id), Some(Bounds::new(0.0, 464.0, 254.0, 0.0)));
        scene.bound_to_container(id, true).unwrap();
        assert_eq!(scene.bounds(id), Some(Bounds::new(-16.0, 496.0, 286.0, -16.0)));
    }

    #[test]
    fn test_finalize_is_idempotent_and_reaped() {
        let (mut scene, root, c) = scene_with_children(2);
        assert!(scene.finalize(c[0]));
        assert!(!scene.finalize(c[0]));
        assert!(scene.is_finalized(c[0]));
        assert!(scene.get(c[0]).is_some());
        assert_eq!(scene.child_at(root, 0), None);

        let reaped = scene.reap();
        assert_eq!(reaped, vec![c[0]]);
        assert!(scene.get(c[0]).is_none());
        assert!(!scene.finalize(c[0]));

        // The freed slot gets a new generation
        let fresh = scene.spawn(Node::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(fresh.index(), c[0].index());
        assert_ne!(fresh, c[0]);
        assert!(scene.is_finalized(c[0]));
    }

    #[test]
    fn test_finalize_releases_children() {
        let mut scene = Scene::new();
        let root = scene.spawn(Node::new(0.0, 0.0, 10.0, 10.0).into_container());
        let child = scene.spawn(Node::new(0.0, 0.0, 1.0, 1.0));
        scene.add_child(root, child).unwrap();
        scene.finalize(root);
        assert_eq!(scene.get(child).unwrap().container(), None);
        assert!(scene.is_finalized(child));
    }

    #[test]
    fn test_finalize_reaps_whole_subtree() {
        let mut scene = Scene::new();
        let root = scene.spawn(Node::new(0.0, 0.0, 10.0, 10.0).into_container());
        let inner = scene.spawn(Node::new(0.0, 0.0, 5.0, 5.0).into_container());
        let leaf = scene.spawn(Node::new(0.0, 0.0, 1.0, 1.0));
        scene.add_child(root, inner).unwrap();
        scene.add_child(inner, leaf).unwrap();

        assert!(scene.finalize(root));
        assert!(scene.is_finalized(inner));
        assert!(scene.is_finalized(leaf));
        assert!(!scene.finalize(leaf));

        let reaped = scene.reap();
        assert_eq!(reaped, vec![root, inner, leaf]);
        assert!(scene.is_empty());
    }

    #[test]
    fn test_render_changes_deduplicate() {
        let mut scene = Scene::new();
        let id = scene.spawn(Node::new(0.0, 0.0, 1.0, 1.0));
        scene.set_position(id, 1.0, 1.0);
        scene.set_alpha(id, 0.5);
        let changes = scene.take_render_changes();
        assert_eq!(changes.updated, vec![id]);
        assert!(scene.take_render_changes().updated.is_empty());
    }

    proptest! {
        #[test]
        fn test_move_to_clamps_into_bounds(
            x in -1000.0f32..1000.0,
            y in -1000.0f32..1000.0,
        ) {
            let bounds = Bounds::new(10.0, 300.0, 200.0, -20.0);
            let mut scene = Scene::new();
            let id = scene.spawn(Node::new(0.0, 10.0, 4.0, 4.0).with_bounds(bounds));
            scene.move_to(id, x, y);
            let pos = scene.rect(id).unwrap().position();
            prop_assert!(pos.x >= bounds.left && pos.x <= bounds.right);
            prop_assert!(pos.y >= bounds.top && pos.y <= bounds.bottom);
            if !bounds.excludes(x, y) {
                prop_assert_eq!(pos, Vec2::new(x, y));
            }
        }

        #[test]
        fn test_double_removal_changes_nothing(count in 1usize..6, pick in 0usize..6) {
            let (mut scene, root, children) = scene_with_children(count);
            let victim = children[pick % count];
            scene.remove_child(root, victim);
            let before = scene.children(root);
            scene.take_events();
            prop_assert!(!scene.remove_child(root, victim));
            prop_assert_eq!(scene.children(root), before);
            prop_assert!(scene.take_events().is_empty());
        }
    }
}
