//! Vertex registry, children index, and observer dispatch.
//!
//! The teacher's `crdt::tree_state::TreeState` only kept a flat vertex map
//! with no children index and no observer dispatch. Both are added here:
//! an ordered children index (spec.md invariant 6 requires deterministic
//! child order, so a `Vec` is used rather than the `HashSet` the pack's
//! `maidsafe-crdt_tree::Tree.children` index uses) and the per-vertex +
//! global observer registry described in spec.md §4.2.

use crate::types::{OpId, PropertyValue, VertexId};
use std::collections::HashMap;

/// Per-vertex record: parent, ordered children, durable + transient props.
#[derive(Debug, Clone)]
pub struct VertexState {
    pub id: VertexId,
    pub parent: Option<VertexId>,
    pub children: Vec<VertexId>,
    pub durable_props: HashMap<String, (PropertyValue, OpId)>,
    pub transient_props: HashMap<String, (PropertyValue, OpId)>,
}

impl VertexState {
    fn new(id: VertexId) -> Self {
        Self {
            id,
            parent: None,
            children: Vec::new(),
            durable_props: HashMap::new(),
            transient_props: HashMap::new(),
        }
    }
}

/// Snapshot of a vertex's parent immediately before a move, used by the
/// move engine's undo/redo log. `VertexAbsent` and `NoParent` both restore
/// to a parentless (but still existing) vertex on undo; they are kept
/// distinct only so `is_new` (see `observe_move`) can be computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriorParent {
    VertexAbsent,
    NoParent,
    Parent(VertexId),
}

/// Events fired synchronously after the mutation that caused them.
#[derive(Debug, Clone)]
pub enum Event {
    PropertyChanged {
        vertex: VertexId,
        key: String,
        old: Option<PropertyValue>,
        new: PropertyValue,
    },
    TransientChanged {
        vertex: VertexId,
        key: String,
        old: Option<PropertyValue>,
        new: Option<PropertyValue>,
    },
    Move {
        vertex: VertexId,
        old_parent: Option<VertexId>,
        new_parent: Option<VertexId>,
    },
    ChildrenChanged {
        vertex: VertexId,
    },
}

/// Opaque handle returned by `observe`; pass to `unobserve` to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle(u64);

type Callback = Box<dyn FnMut(&Event)>;

#[derive(Default)]
pub struct TreeState {
    vertices: HashMap<VertexId, VertexState>,
    vertex_observers: HashMap<VertexId, Vec<(u64, Callback)>>,
    global_observers: Vec<(u64, Callback)>,
    next_handle: u64,
}

impl TreeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&VertexState> {
        self.vertices.get(id)
    }

    pub fn children(&self, id: &str) -> &[VertexId] {
        self.vertices
            .get(id)
            .map(|v| v.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn all_vertices(&self) -> impl Iterator<Item = &VertexState> {
        self.vertices.values()
    }

    pub fn vertex_exists(&self, id: &str) -> bool {
        self.vertices.contains_key(id)
    }

    /// Snapshot of `id`'s parent, for recording in the move log before a
    /// mutation is applied.
    pub fn prior_parent_snapshot(&self, id: &str) -> PriorParent {
        match self.vertices.get(id) {
            None => PriorParent::VertexAbsent,
            Some(v) => match &v.parent {
                None => PriorParent::NoParent,
                Some(p) => PriorParent::Parent(p.clone()),
            },
        }
    }

    /// Walks parent pointers from `child` upward looking for `ancestor`.
    /// Terminates even on a malformed (cyclic) parent graph via a
    /// visited-set guard — this is a defensive check the move engine
    /// relies on for cycle prevention.
    pub fn is_ancestor(&self, child: &str, ancestor: &str) -> bool {
        let mut visited = std::collections::HashSet::new();
        let mut current = child.to_string();
        loop {
            if !visited.insert(current.clone()) {
                return false;
            }
            match self.vertices.get(&current).and_then(|v| v.parent.clone()) {
                Some(parent) => {
                    if parent == ancestor {
                        return true;
                    }
                    current = parent;
                }
                None => return false,
            }
        }
    }

    /// Creates `id` if absent (with no parent, no properties). Fires
    /// `Move` and `ChildrenChanged` events when the parent actually changes.
    pub fn set_parent(&mut self, id: &str, new_parent: Option<VertexId>) {
        let old_parent = match self.vertices.get(id) {
            Some(v) => v.parent.clone(),
            None => {
                self.vertices
                    .insert(id.to_string(), VertexState::new(id.to_string()));
                None
            }
        };

        if old_parent == new_parent {
            return;
        }

        if let Some(old) = &old_parent {
            if let Some(old_vertex) = self.vertices.get_mut(old) {
                old_vertex.children.retain(|c| c != id);
            }
        }

        if let Some(new) = &new_parent {
            if let Some(new_vertex) = self.vertices.get_mut(new) {
                new_vertex.children.push(id.to_string());
            }
        }

        self.vertices.get_mut(id).unwrap().parent = new_parent.clone();

        self.dispatch(
            id,
            Event::Move {
                vertex: id.to_string(),
                old_parent: old_parent.clone(),
                new_parent,
            },
        );
        if let Some(old) = old_parent {
            self.dispatch(&old.clone(), Event::ChildrenChanged { vertex: old });
        }
        if let Some(new) = self.vertices.get(id).and_then(|v| v.parent.clone()) {
            self.dispatch(&new.clone(), Event::ChildrenChanged { vertex: new });
        }
    }

    pub fn set_durable_prop(&mut self, id: &str, key: &str, value: PropertyValue, op_id: OpId) {
        let vertex = self.ensure_mut(id);
        let old = vertex
            .durable_props
            .insert(key.to_string(), (value.clone(), op_id))
            .map(|(v, _)| v);
        self.dispatch(
            id,
            Event::PropertyChanged {
                vertex: id.to_string(),
                key: key.to_string(),
                old,
                new: value,
            },
        );
    }

    pub fn set_transient_prop(&mut self, id: &str, key: &str, value: PropertyValue, op_id: OpId) {
        let vertex = self.ensure_mut(id);
        let old = vertex
            .transient_props
            .insert(key.to_string(), (value.clone(), op_id))
            .map(|(v, _)| v);
        self.dispatch(
            id,
            Event::TransientChanged {
                vertex: id.to_string(),
                key: key.to_string(),
                old,
                new: Some(value),
            },
        );
    }

    pub fn remove_transient(&mut self, id: &str, key: &str) {
        if let Some(vertex) = self.vertices.get_mut(id) {
            if let Some((old, _)) = vertex.transient_props.remove(key) {
                self.dispatch(
                    id,
                    Event::TransientChanged {
                        vertex: id.to_string(),
                        key: key.to_string(),
                        old: Some(old),
                        new: None,
                    },
                );
            }
        }
    }

    fn ensure_mut(&mut self, id: &str) -> &mut VertexState {
        self.vertices
            .entry(id.to_string())
            .or_insert_with(|| VertexState::new(id.to_string()))
    }

    pub fn observe(&mut self, vertex_id: &str, f: impl FnMut(&Event) + 'static) -> ObserverHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.vertex_observers
            .entry(vertex_id.to_string())
            .or_default()
            .push((handle, Box::new(f)));
        ObserverHandle(handle)
    }

    pub fn observe_all(&mut self, f: impl FnMut(&Event) + 'static) -> ObserverHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.global_observers.push((handle, Box::new(f)));
        ObserverHandle(handle)
    }

    pub fn unobserve(&mut self, handle: ObserverHandle) {
        for callbacks in self.vertex_observers.values_mut() {
            callbacks.retain(|(h, _)| *h != handle.0);
        }
        self.global_observers.retain(|(h, _)| *h != handle.0);
    }

    fn dispatch(&mut self, vertex_id: &str, event: Event) {
        if let Some(callbacks) = self.vertex_observers.get_mut(vertex_id) {
            for (_, cb) in callbacks.iter_mut() {
                cb(&event);
            }
        }
        for (_, cb) in self.global_observers.iter_mut() {
            cb(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_parent_creates_and_tracks_children() {
        let mut tree = TreeState::new();
        tree.set_parent("root", None);
        tree.set_parent("child", Some("root".to_string()));
        assert_eq!(tree.children("root"), &["child".to_string()]);
        assert_eq!(tree.get("child").unwrap().parent, Some("root".to_string()));
    }

    #[test]
    fn is_ancestor_terminates_on_cycle() {
        let mut tree = TreeState::new();
        tree.set_parent("a", Some("b".to_string()));
        tree.set_parent("b", Some("a".to_string()));
        assert!(!tree.is_ancestor("a", "z"));
        assert!(tree.is_ancestor("a", "b"));
    }

    #[test]
    fn observers_fire_on_move_and_children_changed() {
        let mut tree = TreeState::new();
        let events = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let events2 = events.clone();
        tree.observe_all(move |e| events2.borrow_mut().push(format!("{e:?}")));
        tree.set_parent("root", None);
        tree.set_parent("child", Some("root".to_string()));
        assert!(events.borrow().iter().any(|e| e.contains("Move")));
        assert!(events.borrow().iter().any(|e| e.contains("ChildrenChanged")));
    }
}
