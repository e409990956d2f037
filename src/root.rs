//! Per-mount root state.
//!
//! One `Root` exists per mount target. It owns the renderer seam, the scene
//! instance, the active camera, raycaster configuration, viewport size, the
//! priority-sorted subscriber list, and all pointer bookkeeping (interaction
//! list, hover map, capture map). Everything is mutated on one logical
//! thread; `Root` is a cheap cloneable handle.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use glam::Vec2;

use crate::engine::registry::{Instance, Registry};
use crate::events::{CaptureMap, HitKey, StoredHit};
use crate::host::{Camera, HostObject, Renderer};
use crate::types::{Frameloop, PointerId, XrFrame};

// =============================================================================
// Subscriptions
// =============================================================================

/// Per-frame subscriber callback: `(root, delta seconds, xr frame)`.
pub type FrameCallback = Rc<dyn Fn(&Root, f64, Option<&XrFrame>)>;

pub(crate) struct SubEntry {
    pub id: u64,
    pub priority: i32,
    pub callback: FrameCallback,
}

// =============================================================================
// Configuration
// =============================================================================

/// Raycaster configuration for a root. Disabling short-circuits intersection
/// to an empty result (globally disables picking) rather than erroring.
pub struct RaycastConfig {
    pub enabled: bool,
    pub near: f32,
    pub far: f32,
    /// Optional user sort/filter applied to the de-duplicated intersection
    /// list. Default ordering is nearest-first.
    pub filter: Option<Rc<dyn Fn(&mut Vec<crate::events::Intersection>)>>,
}

impl Default for RaycastConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            near: 0.0,
            far: f32::INFINITY,
            filter: None,
        }
    }
}

/// Tunable pointer constants. The defaults mirror the reference behavior
/// but are deliberately plain fields; see DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerConfig {
    /// Press-to-release distance beyond which a click-class gesture is a
    /// drag and click handling is suppressed.
    pub drag_threshold_px: f32,
    /// How long unmounted host resources wait before `dispose()`, letting
    /// native disconnect signals settle. Bookkeeping cleanup never waits.
    pub dispose_delay_ms: f64,
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            drag_threshold_px: 2.0,
            dispose_delay_ms: 500.0,
        }
    }
}

// =============================================================================
// Root State
// =============================================================================

pub(crate) struct RootState {
    pub registry: Registry,
    pub scene: Instance,
    pub camera: Camera,
    pub renderer: Box<dyn Renderer>,
    pub raycaster: RaycastConfig,
    pub size: Vec2,
    pub frameloop: Frameloop,
    /// Frames remaining before an on-demand root goes idle.
    pub frames: u32,
    pub subscribers: Vec<SubEntry>,
    /// Nodes currently holding at least one pointer handler.
    pub interaction: Vec<Instance>,
    pub hover: HashMap<HitKey, StoredHit>,
    pub captures: CaptureMap,
    /// Press position and hit set recorded on pointer down, for click
    /// gating and missed notification. `None` until the first press: a
    /// click-class event with no recorded press is never a drag.
    pub initial_click: Option<Vec2>,
    pub initial_hits: Vec<u64>,
    pub pending_dispose: Vec<(HostObject, f64)>,
    /// Monotonic milliseconds maintained by the scheduler.
    pub clock_ms: f64,
    /// Timestamp of the last external `advance` for this root. Externally
    /// driven roots run on their own clocks, so delta derivation is per
    /// root, never scheduler-wide.
    pub last_advance_ms: Option<f64>,
    pub pointer: PointerConfig,
    pub xr_presenting: bool,
    /// Hook the input shim installs so an emptied capture set can release
    /// the underlying native capture.
    pub native_release: Option<Rc<dyn Fn(PointerId)>>,
}

/// Handle to one mount's state. Clones share state; equality is identity.
#[derive(Clone)]
pub struct Root {
    inner: Rc<RefCell<RootState>>,
}

impl PartialEq for Root {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Root({:p})", Rc::as_ptr(&self.inner))
    }
}

/// Weak handle stored on instances so descriptors never keep a root alive.
#[derive(Clone)]
pub struct WeakRoot {
    inner: Weak<RefCell<RootState>>,
}

impl WeakRoot {
    pub fn new() -> Self {
        Self { inner: Weak::new() }
    }

    pub fn upgrade(&self) -> Option<Root> {
        self.inner.upgrade().map(|inner| Root { inner })
    }
}

impl Default for WeakRoot {
    fn default() -> Self {
        Self::new()
    }
}

impl Root {
    /// Create a root over a renderer and camera for a viewport of
    /// `width x height` pixels. The scene object and its instance are
    /// prepared immediately.
    pub fn new(renderer: Box<dyn Renderer>, camera: Camera, width: f32, height: f32) -> Self {
        let registry = Registry::new();
        let scene_object = HostObject::new("Scene");
        let scene = registry.prepare(&scene_object, false);

        let root = Self {
            inner: Rc::new(RefCell::new(RootState {
                registry,
                scene: scene.clone(),
                camera,
                renderer,
                raycaster: RaycastConfig::default(),
                size: Vec2::new(width, height),
                frameloop: Frameloop::default(),
                frames: 0,
                subscribers: Vec::new(),
                interaction: Vec::new(),
                hover: HashMap::new(),
                captures: HashMap::new(),
                initial_click: None,
                initial_hits: Vec::new(),
                pending_dispose: Vec::new(),
                clock_ms: 0.0,
                last_advance_ms: None,
                pointer: PointerConfig::default(),
                xr_presenting: false,
                native_release: None,
            })),
        };
        scene.set_root(root.downgrade());
        root
    }

    pub fn downgrade(&self) -> WeakRoot {
        WeakRoot {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub(crate) fn state(&self) -> Ref<'_, RootState> {
        self.inner.borrow()
    }

    pub(crate) fn state_mut(&self) -> RefMut<'_, RootState> {
        self.inner.borrow_mut()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn scene(&self) -> Instance {
        self.inner.borrow().scene.clone()
    }

    pub fn registry(&self) -> Registry {
        self.inner.borrow().registry.clone()
    }

    pub fn camera(&self) -> Camera {
        self.inner.borrow().camera.clone()
    }

    pub fn set_camera(&self, camera: Camera) {
        self.inner.borrow_mut().camera = camera;
    }

    pub fn size(&self) -> Vec2 {
        self.inner.borrow().size
    }

    pub fn set_size(&self, width: f32, height: f32) {
        self.inner.borrow_mut().size = Vec2::new(width, height);
    }

    pub fn frameloop(&self) -> Frameloop {
        self.inner.borrow().frameloop
    }

    pub fn set_frameloop(&self, mode: Frameloop) {
        self.inner.borrow_mut().frameloop = mode;
    }

    pub fn frames_remaining(&self) -> u32 {
        self.inner.borrow().frames
    }

    pub fn set_xr_presenting(&self, presenting: bool) {
        self.inner.borrow_mut().xr_presenting = presenting;
    }

    pub fn is_xr_presenting(&self) -> bool {
        self.inner.borrow().xr_presenting
    }

    pub fn pointer_config(&self) -> PointerConfig {
        self.inner.borrow().pointer
    }

    pub fn set_pointer_config(&self, config: PointerConfig) {
        self.inner.borrow_mut().pointer = config;
    }

    pub fn set_raycaster_enabled(&self, enabled: bool) {
        self.inner.borrow_mut().raycaster.enabled = enabled;
    }

    pub fn set_raycast_filter(
        &self,
        filter: Option<Rc<dyn Fn(&mut Vec<crate::events::Intersection>)>>,
    ) {
        self.inner.borrow_mut().raycaster.filter = filter;
    }

    /// Install the input shim's native-capture release hook.
    pub fn on_native_capture_release(&self, hook: Rc<dyn Fn(PointerId)>) {
        self.inner.borrow_mut().native_release = Some(hook);
    }

    // =========================================================================
    // Interaction bookkeeping (crate-internal)
    // =========================================================================

    pub(crate) fn add_interaction(&self, instance: &Instance) {
        let mut state = self.inner.borrow_mut();
        if !state.interaction.contains(instance) {
            state.interaction.push(instance.clone());
        }
    }

    pub(crate) fn remove_interaction(&self, instance: &Instance) {
        self.inner.borrow_mut().interaction.retain(|i| i != instance);
    }

    pub(crate) fn interaction_snapshot(&self) -> Vec<Instance> {
        self.inner.borrow().interaction.clone()
    }

    pub fn interaction_len(&self) -> usize {
        self.inner.borrow().interaction.len()
    }

    // =========================================================================
    // Deferred disposal
    // =========================================================================

    /// Queue a host object for disposal after the settle delay.
    pub(crate) fn schedule_dispose(&self, object: HostObject) {
        let mut state = self.inner.borrow_mut();
        let due = state.clock_ms + state.pointer.dispose_delay_ms;
        state.pending_dispose.push((object, due));
    }

    /// Dispose queued objects whose settle delay has elapsed.
    pub(crate) fn drain_disposals(&self, now_ms: f64) {
        let due: Vec<HostObject> = {
            let mut state = self.inner.borrow_mut();
            state.clock_ms = now_ms;
            let (ready, pending): (Vec<_>, Vec<_>) = state
                .pending_dispose
                .drain(..)
                .partition(|(_, due)| *due <= now_ms);
            state.pending_dispose = pending;
            ready.into_iter().map(|(object, _)| object).collect()
        };
        for object in due {
            if object.dispose_count() == 0 {
                object.dispose();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullRenderer;

    fn root() -> Root {
        Root::new(Box::new(NullRenderer), Camera::default(), 800.0, 600.0)
    }

    #[test]
    fn test_scene_is_prepared_and_rooted() {
        let root = root();
        let scene = root.scene();
        assert_eq!(scene.object().kind(), "Scene");
        assert_eq!(scene.root(), Some(root.clone()));
        assert_eq!(root.registry().get(&scene.object()), Some(scene));
    }

    #[test]
    fn test_interaction_list_dedupes() {
        let root = root();
        let mesh = root.registry().prepare(&HostObject::new("Mesh"), false);

        root.add_interaction(&mesh);
        root.add_interaction(&mesh);
        assert_eq!(root.interaction_len(), 1);

        root.remove_interaction(&mesh);
        assert_eq!(root.interaction_len(), 0);
    }

    #[test]
    fn test_deferred_dispose_waits_for_settle_delay() {
        let root = root();
        let material = HostObject::new("MeshBasicMaterial");

        root.schedule_dispose(material.clone());
        root.drain_disposals(100.0);
        assert_eq!(material.dispose_count(), 0);

        root.drain_disposals(600.0);
        assert_eq!(material.dispose_count(), 1);
    }

    #[test]
    fn test_drain_never_double_disposes() {
        let root = root();
        let material = HostObject::new("MeshBasicMaterial");
        material.dispose();

        root.schedule_dispose(material.clone());
        root.drain_disposals(1000.0);
        assert_eq!(material.dispose_count(), 1);
    }
}
