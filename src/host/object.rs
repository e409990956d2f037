//! Host object handles.
//!
//! `HostObject` is a cheap cloneable handle (`Rc<RefCell<..>>`) over one
//! imperative scene-graph object: a kind tag, a dynamic slot map, the native
//! child list, and an optional hit shape for ray intersection. It stands in
//! for the engine handle the reconciler and prop applier mutate.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use glam::Vec3;

use crate::error::Error;
use super::value::Value;

// =============================================================================
// Hit Shapes
// =============================================================================

/// Geometry used for ray intersection, in object-local space.
#[derive(Debug, Clone, PartialEq)]
pub enum HitShape {
    /// A single sphere around the object's world position.
    Sphere { radius: f32 },
    /// Instanced geometry: one sphere per instance offset. Each ray hit
    /// reports the instance index it belongs to.
    Instanced { radius: f32, offsets: Vec<Vec3> },
}

// =============================================================================
// Object State
// =============================================================================

struct ObjectState {
    id: u64,
    kind: String,
    slots: HashMap<String, Value>,
    children: Vec<HostObject>,
    parent: Weak<RefCell<ObjectState>>,
    hit_shape: Option<HitShape>,
    dispose_count: u32,
}

thread_local! {
    static NEXT_OBJECT_ID: Cell<u64> = const { Cell::new(1) };
}

fn next_object_id() -> u64 {
    NEXT_OBJECT_ID.with(|c| {
        let id = c.get();
        c.set(id + 1);
        id
    })
}

/// Handle to one host object. Clones share the same underlying object;
/// equality is identity.
#[derive(Clone)]
pub struct HostObject {
    inner: Rc<RefCell<ObjectState>>,
}

impl PartialEq for HostObject {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for HostObject {}

impl std::fmt::Debug for HostObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.borrow();
        write!(f, "HostObject({}#{})", state.kind, state.id)
    }
}

/// Kinds that participate in native scene-graph parenting. Everything else
/// (materials, geometries, fog...) parents via attach slots.
const GRAPH_KINDS: &[&str] = &["Scene", "Group", "Mesh", "Points", "Line", "InstancedMesh"];

const KNOWN_KINDS: &[&str] = &[
    "Scene",
    "Group",
    "Mesh",
    "Points",
    "Line",
    "InstancedMesh",
    "MeshBasicMaterial",
    "MeshStandardMaterial",
    "BufferGeometry",
    "BoxGeometry",
    "SphereGeometry",
    "Texture",
    "Fog",
];

impl HostObject {
    /// Create an object of a known kind without constructor args.
    /// Infallible variant used where the kind is statically known.
    pub fn new(kind: &str) -> Self {
        let mut slots = HashMap::new();
        if GRAPH_KINDS.contains(&kind) {
            slots.insert("position".to_string(), Value::vec3(0.0, 0.0, 0.0));
            slots.insert("visible".to_string(), Value::Bool(true));
        }
        if kind.ends_with("Material") {
            slots.insert("color".to_string(), Value::Vector(vec![1.0, 1.0, 1.0]));
            slots.insert("transparent".to_string(), Value::Bool(false));
        }
        Self {
            inner: Rc::new(RefCell::new(ObjectState {
                id: next_object_id(),
                kind: kind.to_string(),
                slots,
                children: Vec::new(),
                parent: Weak::new(),
                hit_shape: None,
                dispose_count: 0,
            })),
        }
    }

    /// Construct an object from the adapter path. Unknown kinds and bad
    /// constructor args are logged and returned as a construction error so
    /// the adapter can surface them per node.
    pub fn create(kind: &str, args: &[Value]) -> Result<Self, Error> {
        if !KNOWN_KINDS.contains(&kind) {
            log::error!("construction failed: unknown host kind `{kind}`");
            return Err(Error::Construction {
                kind: kind.to_string(),
                reason: "unknown kind".to_string(),
            });
        }
        let object = Self::new(kind);
        match kind {
            "Mesh" | "Points" | "Line" | "InstancedMesh" => {
                // Optional (geometry, material) constructor args.
                for (i, arg) in args.iter().enumerate() {
                    let (slot, expected) = if i == 0 {
                        ("geometry", "Geometry")
                    } else {
                        ("material", "Material")
                    };
                    match arg {
                        Value::Object(o) if o.kind().ends_with(expected) => {
                            object.set(slot, arg.clone());
                        }
                        _ => {
                            log::error!(
                                "construction failed for `{kind}`: arg {i} is not a {expected}"
                            );
                            return Err(Error::Construction {
                                kind: kind.to_string(),
                                reason: format!("constructor arg {i} is not a {expected}"),
                            });
                        }
                    }
                }
            }
            _ if !args.is_empty() => {
                log::error!("construction failed for `{kind}`: unexpected constructor args");
                return Err(Error::Construction {
                    kind: kind.to_string(),
                    reason: "unexpected constructor args".to_string(),
                });
            }
            _ => {}
        }
        Ok(object)
    }

    pub fn id(&self) -> u64 {
        self.inner.borrow().id
    }

    pub fn kind(&self) -> String {
        self.inner.borrow().kind.clone()
    }

    /// Whether this kind participates in native scene-graph parenting.
    pub fn is_graph_kind(&self) -> bool {
        GRAPH_KINDS.contains(&self.inner.borrow().kind.as_str())
    }

    // =========================================================================
    // Slots
    // =========================================================================

    pub fn get(&self, slot: &str) -> Option<Value> {
        self.inner.borrow().slots.get(slot).cloned()
    }

    pub fn has(&self, slot: &str) -> bool {
        self.inner.borrow().slots.contains_key(slot)
    }

    pub fn set(&self, slot: &str, value: Value) {
        self.inner.borrow_mut().slots.insert(slot.to_string(), value);
    }

    /// Remove a slot entirely. Distinct from setting `Value::Null`: a
    /// deleted key reads back as "never set".
    pub fn delete(&self, slot: &str) -> Option<Value> {
        self.inner.borrow_mut().slots.remove(slot)
    }

    /// Copy all slots from another object of the same kind.
    pub fn copy_from(&self, other: &HostObject) {
        let slots = other.inner.borrow().slots.clone();
        self.inner.borrow_mut().slots = slots;
    }

    // =========================================================================
    // Native scene graph
    // =========================================================================

    pub fn add(&self, child: &HostObject) {
        child.inner.borrow_mut().parent = Rc::downgrade(&self.inner);
        self.inner.borrow_mut().children.push(child.clone());
    }

    pub fn remove(&self, child: &HostObject) {
        self.inner.borrow_mut().children.retain(|c| c != child);
        let mut state = child.inner.borrow_mut();
        if state.parent.ptr_eq(&Rc::downgrade(&self.inner)) {
            state.parent = Weak::new();
        }
    }

    /// Swap `old` for `new` keeping its position in the child list.
    pub fn replace_child(&self, old: &HostObject, new: &HostObject) {
        let mut state = self.inner.borrow_mut();
        if let Some(pos) = state.children.iter().position(|c| c == old) {
            state.children[pos] = new.clone();
            drop(state);
            old.inner.borrow_mut().parent = Weak::new();
            new.inner.borrow_mut().parent = Rc::downgrade(&self.inner);
        }
    }

    pub fn children(&self) -> Vec<HostObject> {
        self.inner.borrow().children.clone()
    }

    pub fn parent(&self) -> Option<HostObject> {
        self.inner
            .borrow()
            .parent
            .upgrade()
            .map(|inner| HostObject { inner })
    }

    // =========================================================================
    // Transform & hit testing
    // =========================================================================

    /// Local position from the `position` slot.
    pub fn position(&self) -> Vec3 {
        match self.get("position") {
            Some(Value::Vector(v)) if v.len() >= 3 => {
                Vec3::new(v[0] as f32, v[1] as f32, v[2] as f32)
            }
            _ => Vec3::ZERO,
        }
    }

    /// World position accumulated along the native parent chain.
    pub fn world_position(&self) -> Vec3 {
        let mut pos = self.position();
        let mut current = self.parent();
        while let Some(p) = current {
            pos += p.position();
            current = p.parent();
        }
        pos
    }

    pub fn set_hit_shape(&self, shape: Option<HitShape>) {
        self.inner.borrow_mut().hit_shape = shape;
    }

    pub fn hit_shape(&self) -> Option<HitShape> {
        self.inner.borrow().hit_shape.clone()
    }

    // =========================================================================
    // Disposal
    // =========================================================================

    /// Release engine resources. Scenes have nothing to release; everything
    /// else counts calls so teardown invariants are observable.
    pub fn dispose(&self) {
        self.inner.borrow_mut().dispose_count += 1;
    }

    pub fn dispose_count(&self) -> u32 {
        self.inner.borrow().dispose_count
    }

    /// Scene roots are never auto-disposed.
    pub fn is_disposable(&self) -> bool {
        self.inner.borrow().kind != "Scene"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_equality() {
        let a = HostObject::new("Mesh");
        let b = a.clone();
        let c = HostObject::new("Mesh");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_slot_delete_vs_null() {
        let mesh = HostObject::new("Mesh");
        mesh.set("frustumCulled", Value::Null);
        assert!(mesh.has("frustumCulled"));
        mesh.delete("frustumCulled");
        assert!(!mesh.has("frustumCulled"));
        assert_eq!(mesh.get("frustumCulled"), None);
    }

    #[test]
    fn test_graph_parenting() {
        let scene = HostObject::new("Scene");
        let group = HostObject::new("Group");
        let mesh = HostObject::new("Mesh");

        scene.add(&group);
        group.add(&mesh);

        assert_eq!(mesh.parent(), Some(group.clone()));
        assert_eq!(scene.children(), vec![group.clone()]);

        group.remove(&mesh);
        assert_eq!(mesh.parent(), None);
        assert!(group.children().is_empty());
    }

    #[test]
    fn test_replace_child_preserves_index() {
        let scene = HostObject::new("Scene");
        let a = HostObject::new("Mesh");
        let b = HostObject::new("Mesh");
        let c = HostObject::new("Mesh");
        scene.add(&a);
        scene.add(&b);
        scene.add(&c);

        let swapped = HostObject::new("Points");
        scene.replace_child(&b, &swapped);

        assert_eq!(scene.children(), vec![a, swapped.clone(), c]);
        assert_eq!(swapped.parent(), Some(scene));
        assert_eq!(b.parent(), None);
    }

    #[test]
    fn test_world_position_accumulates() {
        let scene = HostObject::new("Scene");
        let group = HostObject::new("Group");
        let mesh = HostObject::new("Mesh");
        scene.add(&group);
        group.add(&mesh);

        group.set("position", Value::vec3(1.0, 0.0, 0.0));
        mesh.set("position", Value::vec3(0.0, 2.0, 0.0));

        assert_eq!(mesh.world_position(), Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_create_unknown_kind_errors() {
        let result = HostObject::create("Widget", &[]);
        assert!(matches!(result, Err(Error::Construction { .. })));
    }

    #[test]
    fn test_create_mesh_with_args() {
        let geometry = HostObject::new("BoxGeometry");
        let material = HostObject::new("MeshBasicMaterial");
        let mesh = HostObject::create(
            "Mesh",
            &[Value::Object(geometry.clone()), Value::Object(material)],
        )
        .unwrap();
        assert_eq!(mesh.get("geometry"), Some(Value::Object(geometry)));

        // Material where geometry belongs
        let bad = HostObject::create(
            "Mesh",
            &[Value::Object(HostObject::new("MeshBasicMaterial"))],
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_dispose_counting() {
        let material = HostObject::new("MeshBasicMaterial");
        assert_eq!(material.dispose_count(), 0);
        material.dispose();
        assert_eq!(material.dispose_count(), 1);
        assert!(material.is_disposable());
        assert!(!HostObject::new("Scene").is_disposable());
    }
}
