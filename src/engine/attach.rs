//! Attach resolver and parent-child linking.
//!
//! A child either enters the parent's native scene graph or is assigned into
//! a named parent slot ("attach"). Attach descriptors are dot/dash paths
//! (terminal numeric segments index into an auto-created list) or an
//! explicit attach/detach function pair. Detaching restores exactly what was
//! there before — including "the slot never existed", which restores to a
//! deleted key rather than a null value.

use std::rc::Rc;

use crate::host::{HostObject, Value};

use super::registry::{Instance, ParentEdge, PreviousAttach, Registry};

// =============================================================================
// Attach Spec
// =============================================================================

/// How a child binds to a parent slot.
#[derive(Clone)]
pub enum AttachSpec {
    /// Dot/dash path into the parent object. A terminal numeric segment
    /// indexes into a list slot, created on demand.
    Path(String),
    /// Explicit attach/detach pair for slots paths cannot express.
    Fn {
        attach: Rc<dyn Fn(&HostObject, &HostObject)>,
        detach: Rc<dyn Fn(&HostObject, &HostObject)>,
    },
}

impl std::fmt::Debug for AttachSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttachSpec::Path(path) => write!(f, "AttachSpec::Path({path:?})"),
            AttachSpec::Fn { .. } => write!(f, "AttachSpec::Fn"),
        }
    }
}

/// Split an attach or prop path into segments. Dots and dashes are
/// interchangeable separators.
pub fn split_path(path: &str) -> Vec<String> {
    path.split(['-', '.'])
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Classification
// =============================================================================

/// Decides the default attach slot for non-graph kinds. Returning `None`
/// means the object has no default slot and must be attached explicitly.
pub type Classifier = Rc<dyn Fn(&HostObject) -> Option<String>>;

/// Material/geometry/fog-like kinds attach under the slot named after them.
pub fn default_classifier() -> Classifier {
    Rc::new(|object| {
        let kind = object.kind();
        if kind.ends_with("Material") {
            Some("material".to_string())
        } else if kind.ends_with("Geometry") {
            Some("geometry".to_string())
        } else if kind == "Fog" {
            Some("fog".to_string())
        } else {
            None
        }
    })
}

// =============================================================================
// Path Resolution
// =============================================================================

/// Where a resolved attach path lands on the parent.
enum ResolvedAttach {
    /// Plain slot on `target`.
    Slot(HostObject, String),
    /// Index into a list slot on `target`.
    Index(HostObject, String, usize),
}

/// Walk intermediate segments through nested objects. `None` when an
/// intermediate slot is absent or not an object (partially-defined host).
fn resolve(object: &HostObject, segments: &[String]) -> Option<ResolvedAttach> {
    let (leaf, intermediate) = segments.split_last()?;
    // A numeric terminal indexes into the slot named by the previous segment.
    if let Ok(index) = leaf.parse::<usize>() {
        let (slot, intermediate) = intermediate.split_last()?;
        let target = descend(object, intermediate)?;
        return Some(ResolvedAttach::Index(target, slot.clone(), index));
    }
    let target = descend(object, intermediate)?;
    Some(ResolvedAttach::Slot(target, leaf.clone()))
}

fn descend(object: &HostObject, segments: &[String]) -> Option<HostObject> {
    let mut current = object.clone();
    for segment in segments {
        match current.get(segment) {
            Some(Value::Object(next)) => current = next,
            _ => return None,
        }
    }
    Some(current)
}

// =============================================================================
// Attach / Detach
// =============================================================================

/// Assign `child` into the slot `spec` names on `parent`, recording the
/// prior value for restoration. A missing attach target is logged and
/// skipped rather than treated as fatal.
pub fn attach(parent: &Instance, child: &Instance, spec: &AttachSpec) {
    let parent_object = parent.object();
    let child_object = child.object();

    match spec {
        AttachSpec::Fn { attach, .. } => {
            attach(&parent_object, &child_object);
            let mut state = child.state_mut();
            state.attach = Some(spec.clone());
            state.previous_attach = PreviousAttach::None;
            state.edge = ParentEdge::Attached;
        }
        AttachSpec::Path(path) => {
            let segments = split_path(path);
            let Some(resolved) = resolve(&parent_object, &segments) else {
                log::warn!(
                    "attach target `{path}` not found on {parent_object:?}; skipping attach"
                );
                return;
            };
            let previous = match resolved {
                ResolvedAttach::Slot(target, slot) => {
                    let previous = match target.get(&slot) {
                        Some(value) => PreviousAttach::Value(value),
                        None => PreviousAttach::Missing,
                    };
                    target.set(&slot, Value::Object(child_object));
                    previous
                }
                ResolvedAttach::Index(target, slot, index) => {
                    let mut list = match target.get(&slot) {
                        Some(Value::List(list)) => list,
                        // Auto-create (or atomically replace) the list slot.
                        _ => Vec::new(),
                    };
                    let previous = if index < list.len() {
                        PreviousAttach::Value(list[index].clone())
                    } else {
                        PreviousAttach::Missing
                    };
                    while list.len() <= index {
                        list.push(Value::Null);
                    }
                    list[index] = Value::Object(child_object);
                    target.set(&slot, Value::List(list));
                    previous
                }
            };
            let mut state = child.state_mut();
            state.attach = Some(spec.clone());
            state.previous_attach = previous;
            state.edge = ParentEdge::Attached;
        }
    }
}

/// Undo an attach, restoring the prior value — or deleting the key if it
/// never existed.
pub fn detach(parent: &Instance, child: &Instance) {
    let (spec, previous) = {
        let state = child.state();
        (state.attach.clone(), state.previous_attach.clone())
    };
    let Some(spec) = spec else { return };
    let parent_object = parent.object();
    let child_object = child.object();

    match &spec {
        AttachSpec::Fn { detach, .. } => detach(&parent_object, &child_object),
        AttachSpec::Path(path) => {
            let segments = split_path(path);
            if let Some(resolved) = resolve(&parent_object, &segments) {
                match resolved {
                    ResolvedAttach::Slot(target, slot) => match previous {
                        PreviousAttach::Value(value) => target.set(&slot, value),
                        PreviousAttach::Missing => {
                            target.delete(&slot);
                        }
                        PreviousAttach::None => {}
                    },
                    ResolvedAttach::Index(target, slot, index) => {
                        if let Some(Value::List(mut list)) = target.get(&slot) {
                            if index < list.len() {
                                list[index] = match previous {
                                    PreviousAttach::Value(value) => value,
                                    _ => Value::Null,
                                };
                                target.set(&slot, Value::List(list));
                            }
                        }
                    }
                }
            }
        }
    }

    let mut state = child.state_mut();
    state.previous_attach = PreviousAttach::None;
    state.edge = ParentEdge::None;
}

// =============================================================================
// Parent-Child Linking
// =============================================================================

/// Link `child` under `parent`: native scene-graph insertion for graph pairs,
/// attach-slot assignment otherwise. Always records the child in the
/// descriptor child list, which logic independent of engine traversal uses.
pub fn append_child(parent: &Instance, child: &Instance, classifier: &Classifier) {
    let requested = child.state().attach.clone();
    let spec = match requested {
        Some(spec) => Some(spec),
        None => {
            if parent.object().is_graph_kind() && child.object().is_graph_kind() {
                None
            } else {
                classifier(&child.object()).map(AttachSpec::Path)
            }
        }
    };

    match spec {
        Some(spec) => attach(parent, child, &spec),
        None if parent.object().is_graph_kind() && child.object().is_graph_kind() => {
            parent.object().add(&child.object());
            child.state_mut().edge = ParentEdge::Graph;
        }
        None => {
            log::warn!(
                "no attach slot for {:?} under {:?}; child not linked",
                child.object(),
                parent.object()
            );
        }
    }

    child.set_parent(Some(parent));
    child.set_root(match parent.root() {
        Some(root) => root.downgrade(),
        None => crate::root::WeakRoot::new(),
    });
    parent.state_mut().children.push(child.clone());
}

/// Unlink `child` from `parent`, reversing whichever edge kind it holds.
pub fn remove_child(parent: &Instance, child: &Instance) {
    let edge = child.state().edge;
    match edge {
        ParentEdge::Graph => {
            parent.object().remove(&child.object());
            child.state_mut().edge = ParentEdge::None;
        }
        ParentEdge::Attached => detach(parent, child),
        ParentEdge::None => {}
    }
    parent.state_mut().children.retain(|c| c != child);
    child.set_parent(None);
}

// =============================================================================
// Re-parenting
// =============================================================================

/// Swap the backing object of an instance while keeping its declarative
/// identity: sibling order is preserved, attach slots are rebound, graph
/// children move over in order, and the replaced object is disposed exactly
/// once.
pub fn replace_object(registry: &Registry, instance: &Instance, new_object: &HostObject) {
    let old_object = instance.object();
    if old_object == *new_object {
        return;
    }

    let parent = instance.parent();
    let edge = instance.state().edge;
    match (&parent, edge) {
        (Some(parent), ParentEdge::Graph) => {
            parent.object().replace_child(&old_object, new_object);
        }
        (Some(parent), ParentEdge::Attached) => {
            detach(parent, instance);
            instance.state_mut().object = new_object.clone();
            let spec = instance.state().attach.clone();
            if let Some(spec) = spec {
                attach(parent, instance, &spec);
            }
        }
        _ => {}
    }
    instance.state_mut().object = new_object.clone();

    // Graph children follow the new backing object in order; attached
    // children rebind against it.
    for child in instance.children() {
        let edge = child.state().edge;
        match edge {
            ParentEdge::Graph => {
                old_object.remove(&child.object());
                new_object.add(&child.object());
            }
            ParentEdge::Attached => {
                let spec = child.state().attach.clone();
                if let Some(spec) = spec {
                    attach(instance, &child, &spec);
                }
            }
            ParentEdge::None => {}
        }
    }

    registry.rekey(&old_object, new_object, instance);

    if instance.auto_dispose() && old_object.is_disposable() && old_object.dispose_count() == 0 {
        old_object.dispose();
    }
}
