//! Prop application.
//!
//! Each key applies through a strict rule order:
//! 1. handler key — stored in the descriptor's handler map, never written
//!    to the host; interaction-list membership follows handler-map
//!    emptiness transitions
//! 2. dash/dot path — walk segments; a non-descendable intermediate
//!    retargets the assignment one level up (atomic replace)
//! 3. same-kind object target — `copy` into the existing object
//! 4. settable target + array value — bulk `from_array`
//! 5. settable target + scalar number — `set_scalar`
//! 6. anything else — direct slot assignment
//!
//! Two host quirks live here as well: the needs-update allow-list (toggling
//! presence of a texture/morph/skin slot raises the owner's `needsUpdate`
//! flag) and the shim mapping the deprecated numeric `encoding` enum onto
//! the `colorSpace` string tag.

use spark_signals::effect;

use crate::engine::attach::split_path;
use crate::engine::registry::Instance;
use crate::host::{HostObject, Value};
use crate::root::Root;
use crate::types::EventName;

use super::{Prop, PropKey, PropValue, Props};

/// Slots whose presence toggle forces the owner's `needsUpdate` flag.
const NEEDS_UPDATE_SLOTS: &[&str] = &[
    "map",
    "alphaMap",
    "aoMap",
    "bumpMap",
    "envMap",
    "normalMap",
    "roughnessMap",
    "metalnessMap",
    "morphTargetInfluences",
    "skinning",
];

// =============================================================================
// Entry point
// =============================================================================

/// Apply a prop bag to an instance.
///
/// Static values land immediately. Reactive values are bound to their own
/// effect, re-applied each time only their upstream changes; the stop
/// closure is held on the instance and drained on unmount.
pub fn apply_props(root: &Root, instance: &Instance, props: &Props) {
    for (key, prop) in props.iter() {
        if let PropKey::Handler(name) = PropKey::parse(key) {
            apply_handler(root, instance, name, prop);
            continue;
        }
        if key == "dispose" {
            // `dispose: null` opts the node out of auto-disposal on unmount.
            let opt_out = matches!(
                prop,
                Prop::Value(PropValue::Static(Value::Null))
            );
            instance.set_auto_dispose(!opt_out);
            continue;
        }
        match prop {
            Prop::Value(PropValue::Static(value)) => {
                apply_value(&instance.object(), key, value.clone());
            }
            Prop::Value(PropValue::Reactive(read)) => {
                let object = instance.object();
                let key = key.to_string();
                let read = read.clone();
                let stop = effect(move || {
                    apply_value(&object, &key, read());
                });
                instance.hold_effect(Box::new(stop));
            }
            Prop::Handler(_) => {
                // Handler under a non-handler key: adapter bug, skip it.
                log::warn!("handler prop under non-handler key `{key}`; ignored");
            }
            Prop::Removed => remove_value(&instance.object(), key),
        }
    }
}

fn apply_handler(root: &Root, instance: &Instance, name: EventName, prop: &Prop) {
    match prop {
        Prop::Handler(handler) => {
            let (was_empty, is_empty) = instance.set_handler(name, Some(handler.clone()));
            if was_empty && !is_empty {
                root.add_interaction(instance);
            }
        }
        Prop::Removed => {
            let (was_empty, is_empty) = instance.set_handler(name, None);
            if !was_empty && is_empty {
                root.remove_interaction(instance);
            }
        }
        _ => {
            log::warn!("non-handler value under handler key `{}`; ignored", name.key());
        }
    }
}

// =============================================================================
// Path Resolution
// =============================================================================

/// Where a prop path lands.
enum PropTarget {
    /// A slot on `object`; the copy/from_array/set_scalar rules apply to
    /// its current value.
    Slot { object: HostObject, slot: String },
    /// One component of a vector slot. Writing replaces the whole vector
    /// (the assignment is re-rooted one level up).
    Component {
        object: HostObject,
        slot: String,
        index: usize,
    },
}

fn resolve_prop_target(object: &HostObject, segments: &[String]) -> PropTarget {
    let mut current = object.clone();
    for (i, segment) in segments[..segments.len() - 1].iter().enumerate() {
        match current.get(segment) {
            Some(Value::Object(next)) => current = next,
            Some(Value::Vector(_)) if i == segments.len() - 2 => {
                if let Some(index) = Value::component_index(&segments[i + 1]) {
                    return PropTarget::Component {
                        object: current,
                        slot: segment.clone(),
                        index,
                    };
                }
                // Unknown component name: atomic replace of the vector slot.
                return PropTarget::Slot {
                    object: current,
                    slot: segment.clone(),
                };
            }
            // Intermediate lacks a settable surface: retarget the
            // assignment to this segment itself (atomic replace).
            _ => {
                return PropTarget::Slot {
                    object: current,
                    slot: segment.clone(),
                }
            }
        }
    }
    PropTarget::Slot {
        object: current,
        slot: segments[segments.len() - 1].clone(),
    }
}

// =============================================================================
// Value Application
// =============================================================================

/// Write one value through the rule order. Exposed to the reconciler for
/// constructor-arg style writes.
pub fn apply_value(object: &HostObject, key: &str, value: Value) {
    let segments = split_path(key);
    if segments.is_empty() {
        return;
    }
    match resolve_prop_target(object, &segments) {
        PropTarget::Component {
            object,
            slot,
            index,
        } => {
            let Some(n) = value.as_number() else {
                log::warn!("non-numeric value for vector component `{key}`; ignored");
                return;
            };
            let mut vector = match object.get(&slot) {
                Some(Value::Vector(v)) => v,
                _ => Vec::new(),
            };
            while vector.len() <= index {
                vector.push(0.0);
            }
            vector[index] = n;
            object.set(&slot, Value::Vector(vector));
        }
        PropTarget::Slot { object, slot } => {
            write_slot(&object, &slot, value);
        }
    }
}

fn write_slot(object: &HostObject, slot: &str, value: Value) {
    let existing = object.get(slot);
    let was_present = matches!(&existing, Some(v) if *v != Value::Null);

    match (&existing, &value) {
        // Same-kind object target: copy, keep the target's identity.
        (Some(Value::Object(target)), Value::Object(incoming))
            if target.kind() == incoming.kind() =>
        {
            target.copy_from(incoming);
        }
        // Settable target + array: bulk from_array, keeping target arity.
        (Some(Value::Vector(target)), Value::Vector(incoming)) => {
            let mut next = target.clone();
            for (i, n) in incoming.iter().enumerate().take(next.len()) {
                next[i] = *n;
            }
            object.set(slot, Value::Vector(next));
        }
        // Settable target + scalar: set_scalar fills every component.
        (Some(Value::Vector(target)), Value::Number(n)) => {
            object.set(slot, Value::Vector(vec![*n; target.len()]));
        }
        // Deprecated numeric encoding enum maps onto the colorSpace tag.
        _ if slot == "encoding" && value.as_number().is_some() => {
            let tag = if value.as_number() == Some(3001.0) {
                "srgb"
            } else {
                "srgb-linear"
            };
            object.set("colorSpace", Value::Text(tag.to_string()));
            return;
        }
        _ => {
            object.set(slot, value.clone());
        }
    }

    let now_present = value != Value::Null;
    if NEEDS_UPDATE_SLOTS.contains(&slot) && was_present != now_present {
        object.set("needsUpdate", Value::Bool(true));
    }
}

/// Undo a removed prop key: the resolved slot is deleted outright.
fn remove_value(object: &HostObject, key: &str) {
    let segments = split_path(key);
    if segments.is_empty() {
        return;
    }
    if let PropTarget::Slot { object, slot } = resolve_prop_target(object, &segments) {
        object.delete(&slot);
    }
}

// Borrow note: `existing` above holds cloned values, never a live borrow of
// the object's slot map, so `copy_from` and `set` re-borrow safely.

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Camera, NullRenderer};
    use crate::types::EventName;

    fn setup() -> (Root, Instance) {
        let root = Root::new(Box::new(NullRenderer), Camera::default(), 800.0, 600.0);
        let mesh = root.registry().prepare(&HostObject::new("Mesh"), false);
        (root, mesh)
    }

    #[test]
    fn test_handler_prop_never_touches_host() {
        let (root, mesh) = setup();
        let props = Props::new().on(EventName::Click, |_| {});

        apply_props(&root, &mesh, &props);
        assert!(mesh.handler(EventName::Click).is_some());
        assert!(!mesh.object().has("onClick"));
        assert_eq!(root.interaction_len(), 1);
    }

    #[test]
    fn test_handler_removal_follows_emptiness_transition() {
        let (root, mesh) = setup();
        apply_props(
            &root,
            &mesh,
            &Props::new()
                .on(EventName::Click, |_| {})
                .on(EventName::PointerMove, |_| {}),
        );
        assert_eq!(root.interaction_len(), 1);

        // One handler left: still interactive
        let diff = diff_with_removed(&mesh, "onClick");
        apply_props(&root, &mesh, &diff);
        assert_eq!(root.interaction_len(), 1);

        let diff = diff_with_removed(&mesh, "onPointerMove");
        apply_props(&root, &mesh, &diff);
        assert_eq!(root.interaction_len(), 0);
    }

    fn diff_with_removed(_instance: &Instance, key: &str) -> Props {
        let mut props = Props::new();
        props.entries.push((key.to_string(), Prop::Removed));
        props
    }

    #[test]
    fn test_component_path_writes_one_component() {
        let (root, mesh) = setup();
        apply_props(&root, &mesh, &Props::new().set("position-x", 2.5));
        assert_eq!(mesh.object().get("position"), Some(Value::vec3(2.5, 0.0, 0.0)));
    }

    #[test]
    fn test_scalar_on_settable_fills_all_components() {
        let (root, mesh) = setup();
        apply_props(&root, &mesh, &Props::new().set("position", 3.0));
        assert_eq!(mesh.object().get("position"), Some(Value::vec3(3.0, 3.0, 3.0)));
    }

    #[test]
    fn test_array_on_settable_keeps_target_arity() {
        let (root, mesh) = setup();
        apply_props(
            &root,
            &mesh,
            &Props::new().set("position", Value::Vector(vec![1.0, 2.0, 3.0, 4.0])),
        );
        // Target is a vec3: the extra component is dropped
        assert_eq!(mesh.object().get("position"), Some(Value::vec3(1.0, 2.0, 3.0)));
    }

    #[test]
    fn test_same_kind_object_copies_in_place() {
        let (root, mesh) = setup();
        let material = HostObject::new("MeshBasicMaterial");
        mesh.object().set("material", Value::Object(material.clone()));

        let incoming = HostObject::new("MeshBasicMaterial");
        incoming.set("color", Value::Vector(vec![1.0, 0.0, 0.0]));
        apply_props(
            &root,
            &mesh,
            &Props::new().set("material", incoming),
        );

        // Identity preserved, slots copied
        assert_eq!(
            mesh.object().get("material"),
            Some(Value::Object(material.clone()))
        );
        assert_eq!(material.get("color"), Some(Value::Vector(vec![1.0, 0.0, 0.0])));
    }

    #[test]
    fn test_nested_path_resolves_to_settable_target() {
        let (root, mesh) = setup();
        let material = HostObject::new("MeshBasicMaterial");
        let texture = HostObject::new("Texture");
        material.set("map", Value::Object(texture.clone()));
        mesh.object().set("material", Value::Object(material));

        apply_props(
            &root,
            &mesh,
            &Props::new().set("material-map-needsUpdate", true),
        );
        assert_eq!(texture.get("needsUpdate"), Some(Value::Bool(true)));
    }

    #[test]
    fn test_broken_intermediate_retargets_atomically() {
        let (root, mesh) = setup();
        // `shadow` does not exist: assignment re-roots to the `shadow`
        // segment itself instead of the leaf.
        apply_props(&root, &mesh, &Props::new().set("shadow-bias", 0.5));
        assert_eq!(mesh.object().get("shadow"), Some(Value::Number(0.5)));
        assert!(!mesh.object().has("bias"));
    }

    #[test]
    fn test_needs_update_fires_on_presence_toggle() {
        let (root, mesh) = setup();
        let material = HostObject::new("MeshBasicMaterial");
        mesh.object().set("material", Value::Object(material.clone()));

        apply_props(
            &root,
            &mesh,
            &Props::new().set("material-map", HostObject::new("Texture")),
        );
        assert_eq!(material.get("needsUpdate"), Some(Value::Bool(true)));

        // Same-presence rewrite never re-raises the flag
        material.delete("needsUpdate");
        apply_props(
            &root,
            &mesh,
            &Props::new().set("material-map", HostObject::new("Texture")),
        );
        assert!(!material.has("needsUpdate"));

        // Toggling back off raises it again
        apply_props(
            &root,
            &mesh,
            &Props::new().set("material-map", Value::Null),
        );
        assert_eq!(material.get("needsUpdate"), Some(Value::Bool(true)));
    }

    #[test]
    fn test_encoding_shim_maps_to_color_space() {
        let (root, mesh) = setup();
        let texture = HostObject::new("Texture");
        mesh.object().set("map", Value::Object(texture.clone()));

        apply_props(&root, &mesh, &Props::new().set("map-encoding", 3001.0));
        assert_eq!(texture.get("colorSpace"), Some(Value::Text("srgb".into())));
        assert!(!texture.has("encoding"));

        apply_props(&root, &mesh, &Props::new().set("map-encoding", 3000.0));
        assert_eq!(
            texture.get("colorSpace"),
            Some(Value::Text("srgb-linear".into()))
        );
    }

    #[test]
    fn test_dispose_null_opts_out_of_auto_disposal() {
        let (root, mesh) = setup();
        assert!(mesh.auto_dispose());

        apply_props(&root, &mesh, &Props::new().set("dispose", Value::Null));
        assert!(!mesh.auto_dispose());
        assert!(!mesh.object().has("dispose"));

        apply_props(&root, &mesh, &Props::new().set("dispose", true));
        assert!(mesh.auto_dispose());
    }

    #[test]
    fn test_reactive_prop_reapplies_per_upstream_change() {
        use spark_signals::signal;

        let (root, mesh) = setup();
        let x = signal(1.0f64);
        let x_read = x.clone();
        apply_props(
            &root,
            &mesh,
            &Props::new().reactive("position-x", move || Value::Number(x_read.get())),
        );
        assert_eq!(mesh.object().get("position"), Some(Value::vec3(1.0, 0.0, 0.0)));

        x.set(4.0);
        assert_eq!(mesh.object().get("position"), Some(Value::vec3(4.0, 0.0, 0.0)));
    }

    #[test]
    fn test_reactive_prop_stops_after_effects_drain() {
        use spark_signals::signal;

        let (root, mesh) = setup();
        let x = signal(1.0f64);
        let x_read = x.clone();
        apply_props(
            &root,
            &mesh,
            &Props::new().reactive("position-x", move || Value::Number(x_read.get())),
        );

        for stop in mesh.take_effects() {
            stop();
        }
        x.set(9.0);
        assert_eq!(mesh.object().get("position"), Some(Value::vec3(1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_removed_key_deletes_slot() {
        let (root, mesh) = setup();
        apply_props(&root, &mesh, &Props::new().set("name", "box"));
        assert!(mesh.object().has("name"));

        let old = Props::new().set("name", "box");
        let diff = super::super::diff_props(&old, &Props::new());
        apply_props(&root, &mesh, &diff);
        assert!(!mesh.object().has("name"));
    }
}
