//! DOM renderer: one absolutely positioned `div` per node

use std::collections::HashMap;

use wasm_bindgen::JsCast;
use web_sys::{Document, HtmlElement};

use super::{NodeView, RenderSink};
use crate::sim::scene::NodeId;

struct Mounted {
    element: HtmlElement,
    parent: Option<NodeId>,
}

pub struct DomRenderer {
    document: Document,
    root: HtmlElement,
    /// The only node that hangs directly off `root`
    viewport: NodeId,
    mounted: HashMap<NodeId, Mounted>,
}

impl DomRenderer {
    /// Render the tree rooted at `viewport` under the element with id
    /// `root_id`
    pub fn new(root_id: &str, viewport: NodeId) -> Option<Self> {
        let document = web_sys::window()?.document()?;
        let root = document
            .get_element_by_id(root_id)?
            .dyn_into::<HtmlElement>()
            .ok()?;
        Some(Self {
            document,
            root,
            viewport,
            mounted: HashMap::new(),
        })
    }

    fn element(&mut self, id: NodeId) -> Option<HtmlElement> {
        if let Some(mounted) = self.mounted.get(&id) {
            return Some(mounted.element.clone());
        }
        let element = self
            .document
            .create_element("div")
            .ok()?
            .dyn_into::<HtmlElement>()
            .ok()?;
        let _ = element.style().set_property("position", "absolute");
        self.mounted.insert(
            id,
            Mounted {
                element: element.clone(),
                parent: None,
            },
        );
        Some(element)
    }

    /// Move the element under its parent's element, creating that one
    /// early if the parent has not been reported yet. Detached nodes leave
    /// the document until they are added somewhere again.
    fn attach(&mut self, id: NodeId, element: &HtmlElement, parent: Option<NodeId>) {
        let attached = self.mounted.get(&id).and_then(|m| m.parent);
        if attached == parent && element.parent_node().is_some() {
            return;
        }
        let host = match parent {
            Some(parent) => self.element(parent),
            None if id == self.viewport => Some(self.root.clone()),
            None => {
                element.remove();
                if let Some(mounted) = self.mounted.get_mut(&id) {
                    mounted.parent = None;
                }
                return;
            }
        };
        let Some(host) = host else {
            return;
        };
        if let Err(e) = host.append_child(element) {
            log::warn!("Failed to attach {:?}: {:?}", id, e);
            return;
        }
        if let Some(mounted) = self.mounted.get_mut(&id) {
            mounted.parent = parent;
        }
    }
}

impl RenderSink for DomRenderer {
    fn update(&mut self, id: NodeId, view: &NodeView) {
        let Some(element) = self.element(id) else {
            log::warn!("Could not create an element for {:?}", id);
            return;
        };
        element.set_class_name(&view.class_name());
        if let Some(name) = &view.name {
            element.set_id(name);
        }

        let style = element.style();
        let _ = style.set_property("transform", &view.transform());
        let _ = style.set_property("width", &format!("{}px", view.width));
        let _ = style.set_property("height", &format!("{}px", view.height));
        let _ = style.set_property("opacity", &view.alpha.to_string());
        let _ = style.set_property("display", if view.visible { "block" } else { "none" });
        match view.z_index {
            Some(z) => {
                let _ = style.set_property("z-index", &z.to_string());
            }
            None => {
                let _ = style.remove_property("z-index");
            }
        }

        self.attach(id, &element, view.parent);
    }

    fn release(&mut self, id: NodeId) {
        if let Some(mounted) = self.mounted.remove(&id) {
            mounted.element.remove();
        }
    }
}
