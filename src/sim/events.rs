//! Containment notifications
//!
//! The scene queues `NodeEvent`s as children are added and removed; the
//! owning context dispatches them synchronously to per-node listeners right
//! after the operation that produced them. Listeners can be one-shot and can
//! stop propagation to the listeners registered after them.

use std::collections::HashMap;

use super::scene::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeEventKind {
    Added,
    Removed,
}

/// A containment change, delivered to listeners of `node`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEvent {
    Added {
        node: NodeId,
        container: NodeId,
        index: usize,
    },
    Removed {
        node: NodeId,
        container: NodeId,
    },
}

impl NodeEvent {
    pub fn kind(&self) -> NodeEventKind {
        match self {
            NodeEvent::Added { .. } => NodeEventKind::Added,
            NodeEvent::Removed { .. } => NodeEventKind::Removed,
        }
    }

    pub fn node(&self) -> NodeId {
        match *self {
            NodeEvent::Added { node, .. } | NodeEvent::Removed { node, .. } => node,
        }
    }

    pub fn container(&self) -> NodeId {
        match *self {
            NodeEvent::Added { container, .. } | NodeEvent::Removed { container, .. } => container,
        }
    }
}

/// Returned by listeners to keep or halt delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

pub type ListenerFn<C> = Box<dyn FnMut(&mut C, &NodeEvent) -> Propagation>;

struct Listener<C> {
    id: ListenerId,
    kind: NodeEventKind,
    once: bool,
    /// `None` while running
    callback: Option<ListenerFn<C>>,
}

/// Per-node listener registry
pub struct EventBus<C> {
    listeners: HashMap<NodeId, Vec<Listener<C>>>,
    next_id: u64,
}

impl<C> Default for EventBus<C> {
    fn default() -> Self {
        Self {
            listeners: HashMap::new(),
            next_id: 0,
        }
    }
}

impl<C> EventBus<C> {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(
        &mut self,
        node: NodeId,
        kind: NodeEventKind,
        once: bool,
        callback: ListenerFn<C>,
    ) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.entry(node).or_default().push(Listener {
            id,
            kind,
            once,
            callback: Some(callback),
        });
        id
    }

    pub fn add_listener(
        &mut self,
        node: NodeId,
        kind: NodeEventKind,
        callback: impl FnMut(&mut C, &NodeEvent) -> Propagation + 'static,
    ) -> ListenerId {
        self.insert(node, kind, false, Box::new(callback))
    }

    /// Listener removed before its first delivery runs
    pub fn add_listener_once(
        &mut self,
        node: NodeId,
        kind: NodeEventKind,
        callback: impl FnOnce(&mut C, &NodeEvent) -> Propagation + 'static,
    ) -> ListenerId {
        let mut callback = Some(callback);
        self.insert(
            node,
            kind,
            true,
            Box::new(move |ctx: &mut C, event: &NodeEvent| match callback.take() {
                Some(callback) => callback(ctx, event),
                None => Propagation::Continue,
            }),
        )
    }

    pub fn remove_listener(&mut self, node: NodeId, id: ListenerId) -> bool {
        let Some(list) = self.listeners.get_mut(&node) else {
            return false;
        };
        let before = list.len();
        list.retain(|l| l.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.listeners.remove(&node);
        }
        removed
    }

    /// Drop every listener of a node
    pub fn clear(&mut self, node: NodeId) {
        self.listeners.remove(&node);
    }

    pub fn listener_count(&self, node: NodeId) -> usize {
        self.listeners.get(&node).map_or(0, Vec::len)
    }

    fn matching(&self, event: &NodeEvent) -> Vec<ListenerId> {
        self.listeners
            .get(&event.node())
            .map(|list| {
                list.iter()
                    .filter(|l| l.kind == event.kind())
                    .map(|l| l.id)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn take(&mut self, node: NodeId, id: ListenerId) -> Option<(bool, ListenerFn<C>)> {
        let listener = self
            .listeners
            .get_mut(&node)?
            .iter_mut()
            .find(|l| l.id == id)?;
        let callback = listener.callback.take()?;
        Some((listener.once, callback))
    }

    fn restore(&mut self, node: NodeId, id: ListenerId, callback: ListenerFn<C>) {
        if let Some(listener) = self
            .listeners
            .get_mut(&node)
            .and_then(|list| list.iter_mut().find(|l| l.id == id))
        {
            listener.callback = Some(callback);
        }
    }
}

/// A context that owns an event bus of itself
pub trait Dispatching: Sized {
    fn event_bus(&mut self) -> &mut EventBus<Self>;
}

/// Deliver `event` to the node's listeners in registration order
pub fn dispatch<C: Dispatching>(ctx: &mut C, event: &NodeEvent) {
    let node = event.node();
    for id in ctx.event_bus().matching(event) {
        let Some((once, mut callback)) = ctx.event_bus().take(node, id) else {
            continue;
        };
        if once {
            ctx.event_bus().remove_listener(node, id);
        }
        let flow = callback(ctx, event);
        if !once {
            ctx.event_bus().restore(node, id, callback);
        }
        if flow == Propagation::Stop {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::scene::{Node, Scene};

    struct Ctx {
        bus: EventBus<Ctx>,
        log: Vec<&'static str>,
    }

    impl Dispatching for Ctx {
        fn event_bus(&mut self) -> &mut EventBus<Self> {
            &mut self.bus
        }
    }

    fn ids() -> (NodeId, NodeId) {
        let mut scene = Scene::new();
        let a = scene.spawn(Node::new(0.0, 0.0, 1.0, 1.0));
        let b = scene.spawn(Node::new(0.0, 0.0, 1.0, 1.0));
        (a, b)
    }

    #[test]
    fn test_once_listener_fires_once() {
        let (node, container) = ids();
        let mut ctx = Ctx { bus: EventBus::new(), log: Vec::new() };
        ctx.bus.add_listener_once(node, NodeEventKind::Removed, |ctx: &mut Ctx, _| {
            ctx.log.push("removed");
            Propagation::Continue
        });
        let event = NodeEvent::Removed { node, container };
        dispatch(&mut ctx, &event);
        dispatch(&mut ctx, &event);
        assert_eq!(ctx.log, vec!["removed"]);
        assert_eq!(ctx.bus.listener_count(node), 0);
    }

    #[test]
    fn test_stop_propagation_and_kind_filter() {
        let (node, container) = ids();
        let mut ctx = Ctx { bus: EventBus::new(), log: Vec::new() };
        ctx.bus.add_listener(node, NodeEventKind::Added, |ctx: &mut Ctx, _| {
            ctx.log.push("first");
            Propagation::Stop
        });
        ctx.bus.add_listener(node, NodeEventKind::Added, |ctx: &mut Ctx, _| {
            ctx.log.push("second");
            Propagation::Continue
        });
        ctx.bus.add_listener(node, NodeEventKind::Removed, |ctx: &mut Ctx, _| {
            ctx.log.push("removed");
            Propagation::Continue
        });

        dispatch(&mut ctx, &NodeEvent::Added { node, container, index: 0 });
        assert_eq!(ctx.log, vec!["first"]);
        assert_eq!(ctx.bus.listener_count(node), 3);
    }

    #[test]
    fn test_listener_can_remove_itself() {
        let (node, container) = ids();
        let mut ctx = Ctx { bus: EventBus::new(), log: Vec::new() };
        let id = std::rc::Rc::new(std::cell::Cell::new(None));
        let own = id.clone();
        let registered = ctx.bus.add_listener(node, NodeEventKind::Added, move |ctx: &mut Ctx, e| {
            ctx.log.push("added");
            if let Some(own) = own.get() {
                ctx.bus.remove_listener(e.node(), own);
            }
            Propagation::Continue
        });
        id.set(Some(registered));
        let event = NodeEvent::Added { node, container, index: 0 };
        dispatch(&mut ctx, &event);
        dispatch(&mut ctx, &event);
        assert_eq!(ctx.log, vec!["added"]);
    }
}
