//! Reconciler core.
//!
//! The instance registry keeps per-node descriptors, the attach resolver
//! handles non-scene-graph parenting, and [`unmount`] tears a subtree down:
//! reactive bindings stop, pointer bookkeeping clears, edges unlink, and the
//! backing host object is queued for deferred disposal.

pub mod attach;
pub mod registry;

pub use attach::{append_child, default_classifier, remove_child, replace_object, AttachSpec, Classifier};
pub use registry::{Instance, ParentEdge, Registry};

use crate::root::Root;

/// Tear down an instance and its declarative subtree, children first.
///
/// Registry and event bookkeeping clear synchronously; host-resource
/// disposal is deferred through the root's settle delay so native
/// disconnect signals can land first. Nodes opted out via `dispose: null`
/// (and scene roots) are never disposed.
pub fn unmount(root: &Root, instance: &Instance) {
    if instance.is_disposed() {
        return;
    }
    for child in instance.children() {
        unmount(root, &child);
    }

    for stop in instance.take_effects() {
        stop();
    }
    crate::events::remove_interactivity(root, instance);

    if let Some(parent) = instance.parent() {
        attach::remove_child(&parent, instance);
    }

    instance.mark_disposed();
    let object = instance.object();
    root.registry().remove(&object);

    if instance.auto_dispose() && object.is_disposable() {
        root.schedule_dispose(object);
    }
}
