//! Instance registry.
//!
//! Per-node descriptors keyed by host-object identity. A descriptor records
//! everything the reconciler and event engine need that the engine itself
//! does not track: the owning root, declarative parent/children, the handler
//! map, the attach descriptor with its restore value, and reactive-prop stop
//! closures.
//!
//! The registry is an explicit instance (no ambient globals), so several
//! independent trees can coexist in one process.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::events::SyntheticEvent;
use crate::host::{HostObject, Value};
use crate::root::WeakRoot;
use crate::types::{EventName, HandlerMask};

use super::attach::AttachSpec;

// =============================================================================
// Handler
// =============================================================================

/// Pointer event handler stored in a descriptor's handler map.
pub type Handler = Rc<dyn Fn(&mut SyntheticEvent)>;

// =============================================================================
// Parent Edge
// =============================================================================

/// How an instance is linked to its declarative parent. A node is
/// scene-graph-parented XOR attach-parented for any one relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParentEdge {
    /// Not linked yet (or removed).
    #[default]
    None,
    /// Native scene-graph child.
    Graph,
    /// Assigned into a named parent slot.
    Attached,
}

/// Value a parent slot held before an attach, kept for restoration.
/// `Missing` (the key never existed) must restore to a deleted key, not to
/// a null value, or a stale default leaks.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PreviousAttach {
    /// Nothing attached yet.
    #[default]
    None,
    /// The slot did not exist before the attach.
    Missing,
    /// The slot held this value before the attach.
    Value(Value),
}

// =============================================================================
// Instance
// =============================================================================

pub(crate) struct InstanceState {
    pub object: HostObject,
    pub root: WeakRoot,
    pub parent: Weak<RefCell<InstanceState>>,
    pub children: Vec<Instance>,
    pub edge: ParentEdge,
    pub attach: Option<AttachSpec>,
    pub previous_attach: PreviousAttach,
    pub handlers: HashMap<EventName, Handler>,
    pub mask: HandlerMask,
    pub effects: Vec<Box<dyn FnOnce()>>,
    pub disposed: bool,
    pub auto_dispose: bool,
}

/// Descriptor handle for one mounted node. Clones share state; equality is
/// identity.
#[derive(Clone)]
pub struct Instance {
    inner: Rc<RefCell<InstanceState>>,
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Instance({:?})", self.inner.borrow().object)
    }
}

impl Instance {
    fn new(object: HostObject) -> Self {
        Self {
            inner: Rc::new(RefCell::new(InstanceState {
                object,
                root: WeakRoot::new(),
                parent: Weak::new(),
                children: Vec::new(),
                edge: ParentEdge::None,
                attach: None,
                previous_attach: PreviousAttach::None,
                handlers: HashMap::new(),
                mask: HandlerMask::empty(),
                effects: Vec::new(),
                disposed: false,
                auto_dispose: true,
            })),
        }
    }

    pub(crate) fn state(&self) -> Ref<'_, InstanceState> {
        self.inner.borrow()
    }

    pub(crate) fn state_mut(&self) -> RefMut<'_, InstanceState> {
        self.inner.borrow_mut()
    }

    pub fn object(&self) -> HostObject {
        self.inner.borrow().object.clone()
    }

    pub fn root(&self) -> Option<crate::root::Root> {
        self.inner.borrow().root.upgrade()
    }

    pub(crate) fn set_root(&self, root: WeakRoot) {
        self.inner.borrow_mut().root = root;
    }

    pub fn parent(&self) -> Option<Instance> {
        self.inner
            .borrow()
            .parent
            .upgrade()
            .map(|inner| Instance { inner })
    }

    pub(crate) fn set_parent(&self, parent: Option<&Instance>) {
        self.inner.borrow_mut().parent = match parent {
            Some(p) => Rc::downgrade(&p.inner),
            None => Weak::new(),
        };
    }

    /// Declarative child list, independent of engine traversal.
    pub fn children(&self) -> Vec<Instance> {
        self.inner.borrow().children.clone()
    }

    // =========================================================================
    // Handlers
    // =========================================================================

    /// Install or remove one handler. Returns the (before, after) emptiness
    /// of the handler map so the caller can maintain the interaction list.
    pub fn set_handler(&self, name: EventName, handler: Option<Handler>) -> (bool, bool) {
        let mut state = self.inner.borrow_mut();
        let was_empty = state.handlers.is_empty();
        match handler {
            Some(h) => {
                state.handlers.insert(name, h);
                state.mask |= name.mask();
            }
            None => {
                state.handlers.remove(&name);
                state.mask &= !name.mask();
            }
        }
        let is_empty = state.handlers.is_empty();
        (was_empty, is_empty)
    }

    pub fn handler(&self, name: EventName) -> Option<Handler> {
        self.inner.borrow().handlers.get(&name).cloned()
    }

    pub fn handler_count(&self) -> usize {
        self.inner.borrow().handlers.len()
    }

    pub fn mask(&self) -> HandlerMask {
        self.inner.borrow().mask
    }

    // =========================================================================
    // Reactive effects
    // =========================================================================

    /// Hold a stop closure for a reactive prop binding; drained on unmount.
    pub fn hold_effect(&self, stop: Box<dyn FnOnce()>) {
        self.inner.borrow_mut().effects.push(stop);
    }

    pub(crate) fn take_effects(&self) -> Vec<Box<dyn FnOnce()>> {
        std::mem::take(&mut self.inner.borrow_mut().effects)
    }

    // =========================================================================
    // Flags
    // =========================================================================

    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().disposed
    }

    pub(crate) fn mark_disposed(&self) {
        self.inner.borrow_mut().disposed = true;
    }

    pub fn auto_dispose(&self) -> bool {
        self.inner.borrow().auto_dispose
    }

    pub fn set_auto_dispose(&self, auto: bool) {
        self.inner.borrow_mut().auto_dispose = auto;
    }
}

// =============================================================================
// Registry
// =============================================================================

struct RegistryState {
    instances: HashMap<u64, Instance>,
}

/// Explicit instance registry. Cheap to clone; clones share the map.
#[derive(Clone)]
pub struct Registry {
    inner: Rc<RefCell<RegistryState>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(RegistryState {
                instances: HashMap::new(),
            })),
        }
    }

    /// Idempotent descriptor install keyed by object identity.
    ///
    /// Re-invocation returns the existing descriptor unless `force` is set,
    /// which re-initializes it (used when swapping backing objects).
    pub fn prepare(&self, object: &HostObject, force: bool) -> Instance {
        let mut state = self.inner.borrow_mut();
        if !force {
            if let Some(existing) = state.instances.get(&object.id()) {
                return existing.clone();
            }
        }
        let instance = Instance::new(object.clone());
        state.instances.insert(object.id(), instance.clone());
        instance
    }

    pub fn get(&self, object: &HostObject) -> Option<Instance> {
        self.inner.borrow().instances.get(&object.id()).cloned()
    }

    pub(crate) fn remove(&self, object: &HostObject) -> Option<Instance> {
        self.inner.borrow_mut().instances.remove(&object.id())
    }

    /// Move a descriptor to a new backing object's identity.
    pub(crate) fn rekey(&self, old: &HostObject, new: &HostObject, instance: &Instance) {
        let mut state = self.inner.borrow_mut();
        state.instances.remove(&old.id());
        state.instances.insert(new.id(), instance.clone());
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().instances.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_is_idempotent() {
        let registry = Registry::new();
        let mesh = HostObject::new("Mesh");

        let a = registry.prepare(&mesh, false);
        let b = registry.prepare(&mesh, false);
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_prepare_force_reinitializes() {
        let registry = Registry::new();
        let mesh = HostObject::new("Mesh");

        let a = registry.prepare(&mesh, false);
        a.set_handler(EventName::Click, Some(Rc::new(|_| {})));

        let b = registry.prepare(&mesh, true);
        assert_ne!(a, b);
        assert_eq!(b.handler_count(), 0);
        assert_eq!(registry.get(&mesh), Some(b));
    }

    #[test]
    fn test_handler_map_transitions() {
        let registry = Registry::new();
        let mesh = HostObject::new("Mesh");
        let instance = registry.prepare(&mesh, false);

        let (was_empty, is_empty) = instance.set_handler(EventName::Click, Some(Rc::new(|_| {})));
        assert!(was_empty);
        assert!(!is_empty);
        assert!(instance.mask().contains(HandlerMask::CLICK));

        let (was_empty, is_empty) =
            instance.set_handler(EventName::PointerMove, Some(Rc::new(|_| {})));
        assert!(!was_empty);
        assert!(!is_empty);

        instance.set_handler(EventName::Click, None);
        let (was_empty, is_empty) = instance.set_handler(EventName::PointerMove, None);
        assert!(!was_empty);
        assert!(is_empty);
        assert_eq!(instance.mask(), HandlerMask::empty());
    }

    #[test]
    fn test_effects_drain_once() {
        use std::cell::Cell;

        let registry = Registry::new();
        let mesh = HostObject::new("Mesh");
        let instance = registry.prepare(&mesh, false);

        let stopped = Rc::new(Cell::new(0));
        let stopped_clone = stopped.clone();
        instance.hold_effect(Box::new(move || {
            stopped_clone.set(stopped_clone.get() + 1);
        }));

        for stop in instance.take_effects() {
            stop();
        }
        assert_eq!(stopped.get(), 1);
        assert!(instance.take_effects().is_empty());
    }
}
