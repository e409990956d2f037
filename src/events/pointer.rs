//! Pointer dispatch.
//!
//! One native event flows through: NDC conversion, raycast over the
//! interaction list (pre-filtered for hover-class events), de-duplication by
//! composite hit identity, optional user sort/filter, ancestor bubble-list
//! construction, capture override, then dispatch with deferred
//! stop-propagation. The hover state machine runs on move passes,
//! independent of click dispatch.
//!
//! Handlers run against snapshots; a handler may freely add or remove
//! handlers (its own included) without corrupting the in-progress pass.

use std::collections::HashSet;

use glam::{Vec2, Vec3};

use crate::engine::registry::Instance;
use crate::host::{Camera, HostObject, Ray};
use crate::root::Root;
use crate::types::{EventName, HandlerMask, PointerId};

use super::{CaptureEntry, HitKey, StoredHit};

// =============================================================================
// Native Event
// =============================================================================

/// Fields forwarded from the real input target by the input shim.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeEvent {
    pub pointer_id: PointerId,
    pub offset_x: f32,
    pub offset_y: f32,
    pub button: i32,
    /// Wheel scroll amount; zero for non-wheel events.
    pub delta_y: f32,
}

impl NativeEvent {
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            pointer_id: 1,
            offset_x: x,
            offset_y: y,
            button: 0,
            delta_y: 0.0,
        }
    }

    pub fn pointer(pointer_id: PointerId, x: f32, y: f32) -> Self {
        Self {
            pointer_id,
            ..Self::at(x, y)
        }
    }
}

// =============================================================================
// Intersection
// =============================================================================

/// One logical ray hit.
#[derive(Clone)]
pub struct Intersection {
    pub object: HostObject,
    pub distance: f32,
    pub point: Vec3,
    /// Instance index for instanced/batched geometry.
    pub instance_id: Option<u32>,
}

impl Intersection {
    /// Composite identity used for de-duplication and hover tracking.
    pub fn key(&self) -> HitKey {
        (self.object.id(), self.instance_id)
    }
}

/// An intersection paired with the handler-bearing node it dispatches to.
/// The hit object and the bubble target can differ.
#[derive(Clone)]
struct DispatchHit {
    intersection: Intersection,
    target: Instance,
}

// =============================================================================
// Synthetic Event
// =============================================================================

/// Event handed to handlers. Built per dispatch step and discarded; the
/// hover map only ever stores structural copies.
pub struct SyntheticEvent {
    pub native: NativeEvent,
    /// Normalized device coordinates.
    pub space_x: f32,
    pub space_y: f32,
    pub ray: Ray,
    pub camera: Camera,
    /// Full de-duplicated intersection list for this pass.
    pub intersections: Vec<Intersection>,
    /// The intersection this dispatch step is for.
    pub hit: Intersection,
    pub unprojected_point: Vec3,
    /// Press-to-current pixel distance for click-class events, else 0.
    pub delta: f32,
    current_target: Instance,
    root: Root,
    stopped: bool,
}

impl SyntheticEvent {
    /// The object the ray actually hit.
    pub fn target(&self) -> HostObject {
        self.hit.object.clone()
    }

    /// The handler-bearing node this step dispatches to.
    pub fn current_target(&self) -> Instance {
        self.current_target.clone()
    }

    /// Halt remaining bubble iteration after this handler returns. Deferred:
    /// hover records above this node in the current hit list are cancelled
    /// so a child stopping propagation invalidates ancestor hover state.
    pub fn stop_propagation(&mut self) {
        self.stopped = true;
    }

    pub fn propagation_stopped(&self) -> bool {
        self.stopped
    }

    /// Bind this pointer id to the current target, storing the intersection
    /// at capture time. Later moves reuse it regardless of hit-testing.
    pub fn set_pointer_capture(&mut self, pointer_id: PointerId) {
        let entry = CaptureEntry {
            target: self.current_target.clone(),
            intersection: self.hit.clone(),
        };
        let mut state = self.root.state_mut();
        let entries = state.captures.entry(pointer_id).or_default();
        entries.retain(|e| e.target != entry.target);
        entries.push(entry);
    }

    /// Release this target's capture of the pointer id.
    pub fn release_pointer_capture(&mut self, pointer_id: PointerId) {
        release_capture(&self.root, pointer_id, Some(&self.current_target));
    }

    pub fn has_pointer_capture(&self, pointer_id: PointerId) -> bool {
        self.root
            .state()
            .captures
            .get(&pointer_id)
            .is_some_and(|entries| entries.iter().any(|e| e.target == self.current_target))
    }
}

// =============================================================================
// Capture bookkeeping
// =============================================================================

/// Explicit capture release. With no target, every capture for the pointer
/// id goes. An emptied capture set releases the underlying native capture
/// through the shim's hook.
pub fn release_capture(root: &Root, pointer_id: PointerId, target: Option<&Instance>) {
    let hook = {
        let mut state = root.state_mut();
        let emptied = match state.captures.get_mut(&pointer_id) {
            Some(entries) => {
                match target {
                    Some(target) => entries.retain(|e| e.target != *target),
                    None => entries.clear(),
                }
                entries.is_empty()
            }
            None => return,
        };
        if emptied {
            state.captures.remove(&pointer_id);
            state.native_release.clone()
        } else {
            None
        }
    };
    if let Some(hook) = hook {
        hook(pointer_id);
    }
}

fn is_captured(root: &Root, target: &Instance) -> bool {
    root.state()
        .captures
        .values()
        .any(|entries| entries.iter().any(|e| e.target == *target))
}

/// Remove an unmounting node from interaction, hover, and capture
/// bookkeeping in one synchronous step.
pub fn remove_interactivity(root: &Root, instance: &Instance) {
    root.remove_interaction(instance);
    let released: Vec<PointerId> = {
        let mut state = root.state_mut();
        state.hover.retain(|_, stored| stored.target != *instance);
        let mut released = Vec::new();
        state.captures.retain(|pointer_id, entries| {
            entries.retain(|e| e.target != *instance);
            if entries.is_empty() {
                released.push(*pointer_id);
                false
            } else {
                true
            }
        });
        released
    };
    if let Some(hook) = root.state().native_release.clone() {
        for pointer_id in released {
            hook(pointer_id);
        }
    }
}

// =============================================================================
// Dispatch context
// =============================================================================

struct DispatchCtx {
    root: Root,
    native: NativeEvent,
    ndc: Vec2,
    ray: Ray,
    camera: Camera,
    intersections: Vec<Intersection>,
    unprojected: Vec3,
    delta_px: f32,
}

impl DispatchCtx {
    fn event(&self, hit: &DispatchHit) -> SyntheticEvent {
        SyntheticEvent {
            native: self.native.clone(),
            space_x: self.ndc.x,
            space_y: self.ndc.y,
            ray: self.ray,
            camera: self.camera.clone(),
            intersections: self.intersections.clone(),
            hit: hit.intersection.clone(),
            unprojected_point: self.unprojected,
            delta: self.delta_px,
            current_target: hit.target.clone(),
            root: self.root.clone(),
            stopped: false,
        }
    }
}

/// Invoke `name` on a target if it holds that handler. Returns the event's
/// stopped flag (false when no handler ran).
fn fire(ctx: &DispatchCtx, target: &Instance, name: EventName, intersection: &Intersection) -> bool {
    let Some(handler) = target.handler(name) else {
        return false;
    };
    let mut event = ctx.event(&DispatchHit {
        intersection: intersection.clone(),
        target: target.clone(),
    });
    handler(&mut event);
    event.propagation_stopped()
}

// =============================================================================
// Raycast
// =============================================================================

fn raycast(root: &Root, name: EventName, ray: &Ray) -> Vec<Intersection> {
    let (enabled, near, far, filter) = {
        let state = root.state();
        (
            state.raycaster.enabled,
            state.raycaster.near,
            state.raycaster.far,
            state.raycaster.filter.clone(),
        )
    };
    // A disabled raycaster globally disables picking.
    if !enabled {
        return Vec::new();
    }

    let mut candidates = root.interaction_snapshot();
    if name.is_hover_class() {
        candidates.retain(|c| c.mask().intersects(HandlerMask::HOVER));
    }

    let mut intersections = Vec::new();
    for candidate in candidates {
        let object = candidate.object();
        for (distance, instance_id) in ray.intersect_object(&object) {
            if distance < near || distance > far {
                continue;
            }
            intersections.push(Intersection {
                object: object.clone(),
                distance,
                point: ray.origin + ray.direction * distance,
                instance_id,
            });
        }
    }

    // Nearest-first, then drop duplicate logical hits on the same identity
    // (instanced geometry reports entry and exit per instance).
    intersections.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    let mut seen: HashSet<HitKey> = HashSet::new();
    intersections.retain(|i| seen.insert(i.key()));

    if let Some(filter) = filter {
        filter(&mut intersections);
    }
    intersections
}

/// For each intersection, walk ancestors collecting every node with a
/// non-zero handler count, producing the bubble-ordered dispatch list.
fn bubble_hits(root: &Root, intersections: &[Intersection]) -> Vec<DispatchHit> {
    let registry = root.registry();
    let mut hits = Vec::new();
    for intersection in intersections {
        let mut current = registry.get(&intersection.object);
        while let Some(instance) = current {
            if instance.handler_count() > 0 {
                hits.push(DispatchHit {
                    intersection: intersection.clone(),
                    target: instance.clone(),
                });
            }
            current = instance.parent();
        }
    }
    hits
}

// =============================================================================
// Hover state machine
// =============================================================================

/// Out/leave for departed identities first, then over/enter for new ones.
/// A captured target's leave is suppressed until its capture releases.
fn process_hover(ctx: &DispatchCtx, hits: &[DispatchHit]) {
    let root = &ctx.root;
    let current: HashSet<HitKey> = hits.iter().map(|h| h.intersection.key()).collect();

    let departed: Vec<StoredHit> = {
        let state = root.state();
        state
            .hover
            .iter()
            .filter(|(key, _)| !current.contains(*key))
            .map(|(_, stored)| stored.clone())
            .collect()
    };
    for stored in departed {
        if is_captured(root, &stored.target) {
            continue;
        }
        root.state_mut().hover.remove(&stored.intersection.key());
        fire(ctx, &stored.target, EventName::PointerOut, &stored.intersection);
        fire(ctx, &stored.target, EventName::PointerLeave, &stored.intersection);
    }

    for hit in hits {
        let key = hit.intersection.key();
        let fresh = {
            let mut state = root.state_mut();
            match state.hover.get_mut(&key) {
                // Ancestors bubbling the same intersection share its key.
                // The node that entered keeps the record; only the
                // intersection refreshes, so the eventual leave fires on
                // the same node the enter did.
                Some(stored) => {
                    stored.intersection = hit.intersection.clone();
                    false
                }
                None => {
                    state.hover.insert(
                        key,
                        StoredHit {
                            target: hit.target.clone(),
                            intersection: hit.intersection.clone(),
                        },
                    );
                    true
                }
            }
        };
        if fresh {
            fire(ctx, &hit.target, EventName::PointerOver, &hit.intersection);
            fire(ctx, &hit.target, EventName::PointerEnter, &hit.intersection);
        }
    }
}

/// Forced unhover: out/leave for every hover record, captured or not.
fn cancel_all_hover(ctx: &DispatchCtx) {
    let stored: Vec<StoredHit> = ctx.root.state().hover.values().cloned().collect();
    ctx.root.state_mut().hover.clear();
    for hit in stored {
        fire(ctx, &hit.target, EventName::PointerOut, &hit.intersection);
        fire(ctx, &hit.target, EventName::PointerLeave, &hit.intersection);
    }
}

// =============================================================================
// Bubble dispatch
// =============================================================================

/// Dispatch in bubble order. Returns whether any handler for `name` ran.
fn dispatch_hits(ctx: &DispatchCtx, name: EventName, hits: &[DispatchHit]) -> bool {
    let mut handled = false;
    for (index, hit) in hits.iter().enumerate() {
        let Some(handler) = hit.target.handler(name) else {
            continue;
        };
        let mut event = ctx.event(hit);
        handler(&mut event);
        handled = true;
        if event.propagation_stopped() {
            cancel_hovers_above(ctx, hits, index);
            break;
        }
    }
    handled
}

/// When a handler stops propagation and its identity is currently hovered,
/// every hover record positioned above it in the hit list is cancelled so
/// ancestors do not stay "still hovering" past the stop point.
fn cancel_hovers_above(ctx: &DispatchCtx, hits: &[DispatchHit], index: usize) {
    let root = &ctx.root;
    let stop_key = hits[index].intersection.key();
    if !root.state().hover.contains_key(&stop_key) {
        return;
    }
    for hit in &hits[index + 1..] {
        let key = hit.intersection.key();
        // Ancestors bubbling the same intersection share the stop key;
        // the stopping identity itself stays hovered.
        if key == stop_key {
            continue;
        }
        let stored = root.state_mut().hover.remove(&key);
        if let Some(stored) = stored {
            fire(ctx, &stored.target, EventName::PointerOut, &stored.intersection);
            fire(ctx, &stored.target, EventName::PointerLeave, &stored.intersection);
        }
    }
}

// =============================================================================
// Missed notification
// =============================================================================

/// Fire `onPointerMissed` on interactive objects, excluding the given ids.
fn fire_missed(ctx: &DispatchCtx, exclude: &HashSet<u64>) {
    let miss = Intersection {
        object: ctx.root.scene().object(),
        distance: 0.0,
        point: ctx.unprojected,
        instance_id: None,
    };
    for instance in ctx.root.interaction_snapshot() {
        if exclude.contains(&instance.object().id()) {
            continue;
        }
        fire(ctx, &instance, EventName::PointerMissed, &miss);
    }
}

// =============================================================================
// Entry point
// =============================================================================

/// Feed one native event into the engine. The input shim calls this per
/// event name it forwards.
pub fn dispatch(root: &Root, name: EventName, native: &NativeEvent) {
    let size = root.size();
    let ndc = Vec2::new(
        (native.offset_x / size.x) * 2.0 - 1.0,
        1.0 - (native.offset_y / size.y) * 2.0,
    );
    let camera = root.camera();
    let ray = camera.ray_from_ndc(ndc);
    let unprojected = camera.unproject(Vec3::new(ndc.x, ndc.y, 0.5));

    let intersections = raycast(root, name, &ray);
    let mut hits = bubble_hits(root, &intersections);

    // Capture overrides hit-testing: every capturing target joins the
    // dispatch list with its stored intersection.
    let captured: Vec<CaptureEntry> = root
        .state()
        .captures
        .get(&native.pointer_id)
        .cloned()
        .unwrap_or_default();
    for entry in &captured {
        hits.push(DispatchHit {
            intersection: entry.intersection.clone(),
            target: entry.target.clone(),
        });
    }

    let delta_px = match root.state().initial_click {
        Some(press) if name.is_click_class() => {
            (Vec2::new(native.offset_x, native.offset_y) - press).length()
        }
        _ => 0.0,
    };

    let ctx = DispatchCtx {
        root: root.clone(),
        native: native.clone(),
        ndc,
        ray,
        camera,
        intersections,
        unprojected,
        delta_px,
    };

    log::trace!("pointer {:?}: {} bubble target(s)", name, hits.len());

    match name {
        EventName::PointerDown => {
            let mut state = root.state_mut();
            state.initial_click = Some(Vec2::new(native.offset_x, native.offset_y));
            state.initial_hits = hits.iter().map(|h| h.intersection.object.id()).collect();
            drop(state);
            dispatch_hits(&ctx, name, &hits);
        }
        name if name.is_hover_class() => {
            process_hover(&ctx, &hits);
            if name == EventName::PointerMove {
                dispatch_hits(&ctx, name, &hits);
            }
        }
        name if name.is_click_class() => {
            let dragged = delta_px > root.state().pointer.drag_threshold_px;
            if hits.is_empty() && !dragged {
                // Click into empty space: everyone interactive missed.
                fire_missed(&ctx, &HashSet::new());
            } else {
                let handled = if dragged {
                    false
                } else {
                    dispatch_hits(&ctx, name, &hits)
                };
                if dragged || !handled {
                    // Something was hit but no handler for this event name
                    // ran (or the gesture was a drag): missed fires for
                    // interactive objects outside the original press's set.
                    let exclude: HashSet<u64> = root.state().initial_hits.iter().copied().collect();
                    fire_missed(&ctx, &exclude);
                }
            }
        }
        EventName::PointerCancel => {
            release_capture(root, native.pointer_id, None);
            cancel_all_hover(&ctx);
        }
        EventName::LostPointerCapture => {
            // Native capture is already gone; drop entries and notify the
            // targets that held it.
            let entries = root.state_mut().captures.remove(&native.pointer_id);
            for entry in entries.unwrap_or_default() {
                fire(
                    &ctx,
                    &entry.target,
                    EventName::LostPointerCapture,
                    &entry.intersection,
                );
            }
        }
        _ => {
            dispatch_hits(&ctx, name, &hits);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
