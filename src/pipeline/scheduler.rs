//! Render loop and invalidation.
//!
//! The scheduler is an explicit instance owning its root registry — no
//! ambient globals — so independent schedulers coexist under test. It has
//! two states, stopped and running: `invalidate` wakes it, and a tick with
//! no remaining work fires tail effects and stops it again.
//!
//! The host drives the loop by calling [`Scheduler::step`] with a monotonic
//! timestamp while [`Scheduler::is_running`] holds; `manual` roots and
//! XR-presenting roots are driven externally through
//! [`Scheduler::advance`] instead.
//!
//! # Example
//! ```ignore
//! let scheduler = Scheduler::new();
//! scheduler.add_root(&root);
//! let stop = scheduler.subscribe(&root, 0, Rc::new(|root, delta, _| {
//!     // per-frame work
//! }));
//! while scheduler.is_running() {
//!     scheduler.step(now_ms());
//! }
//! stop();
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use crate::root::{FrameCallback, Root, SubEntry};
use crate::types::{Frameloop, XrFrame};

/// On-demand invalidations accumulate up to this many pending frames.
const MAX_PENDING_FRAMES: u32 = 60;

/// Global effect run before/after the per-root flush each tick. Returning
/// `true` requests at least one more tick.
pub type GlobalEffect = Rc<dyn Fn(f64) -> bool>;

/// Effect run once when the loop goes idle.
pub type TailEffect = Rc<dyn Fn(f64)>;

// =============================================================================
// Scheduler
// =============================================================================

struct SchedulerState {
    roots: Vec<Root>,
    running: bool,
    /// Positive-priority subscribers across all roots. Non-zero suppresses
    /// the implicit render call (a subscriber is rendering manually).
    priority_subs: u32,
    before: Vec<(u64, GlobalEffect)>,
    after: Vec<(u64, GlobalEffect)>,
    tail: Vec<(u64, TailEffect)>,
    /// Configured lifecycle stage names, in execution order.
    stages: Vec<String>,
    next_id: u64,
    last_step_ms: Option<f64>,
}

/// Explicit scheduler instance. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerState>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_stages(&["early", "update", "late"])
    }

    /// Scheduler with a custom lifecycle stage list. Stages run before all
    /// zero-priority subscribers, in list order.
    pub fn with_stages(stages: &[&str]) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedulerState {
                roots: Vec::new(),
                running: false,
                priority_subs: 0,
                before: Vec::new(),
                after: Vec::new(),
                tail: Vec::new(),
                stages: stages.iter().map(|s| s.to_string()).collect(),
                next_id: 1,
                last_step_ms: None,
            })),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.borrow().running
    }

    fn next_id(&self) -> u64 {
        let mut state = self.inner.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        id
    }

    // =========================================================================
    // Roots
    // =========================================================================

    /// Register a root and schedule its first frame.
    pub fn add_root(&self, root: &Root) {
        {
            let mut state = self.inner.borrow_mut();
            if state.roots.contains(root) {
                return;
            }
            state.roots.push(root.clone());
        }
        self.invalidate(root);
        // Always-mode roots render regardless of the frame counter.
        self.inner.borrow_mut().running = true;
    }

    /// Deregister a root: its subscribers go, its positive-priority
    /// contribution is subtracted, and the loop keeps serving other roots.
    pub fn remove_root(&self, root: &Root) {
        let positive = {
            let mut state = root.state_mut();
            let positive = state.subscribers.iter().filter(|s| s.priority > 0).count() as u32;
            state.subscribers.clear();
            positive
        };
        let mut state = self.inner.borrow_mut();
        state.priority_subs = state.priority_subs.saturating_sub(positive);
        state.roots.retain(|r| r != root);
    }

    /// Request at least one more frame for a root. Capped pending frames;
    /// ignored for `manual` roots, which never self-schedule.
    pub fn invalidate(&self, root: &Root) {
        if root.frameloop() == Frameloop::Manual {
            return;
        }
        {
            let mut state = root.state_mut();
            state.frames = (state.frames + 1).min(MAX_PENDING_FRAMES);
        }
        self.inner.borrow_mut().running = true;
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Register a per-frame subscriber at a numeric priority. Within one
    /// tick, subscribers run strictly ascending by priority, stable on
    /// ties. A positive priority additionally takes over rendering: while
    /// any positive-priority subscriber exists, the implicit render call is
    /// suppressed.
    ///
    /// Returns a disposer removing exactly this entry.
    pub fn subscribe(&self, root: &Root, priority: i32, callback: FrameCallback) -> impl FnOnce() {
        let id = self.next_id();
        {
            let mut state = root.state_mut();
            let pos = state
                .subscribers
                .iter()
                .rposition(|s| s.priority <= priority)
                .map_or(0, |p| p + 1);
            state.subscribers.insert(
                pos,
                SubEntry {
                    id,
                    priority,
                    callback,
                },
            );
        }
        if priority > 0 {
            self.inner.borrow_mut().priority_subs += 1;
        }

        let scheduler = self.clone();
        let root = root.clone();
        move || {
            let removed = {
                let mut state = root.state_mut();
                let before = state.subscribers.len();
                state.subscribers.retain(|s| s.id != id);
                state.subscribers.len() != before
            };
            if removed && priority > 0 {
                scheduler.inner.borrow_mut().priority_subs -= 1;
            }
        }
    }

    /// Register a subscriber into a named lifecycle stage. Stages map to
    /// negative priorities, so they run before all zero-priority
    /// subscribers and never suppress the implicit render.
    ///
    /// # Panics
    /// Naming a stage absent from the configured stage list is a
    /// programmer error and panics immediately.
    pub fn subscribe_stage(
        &self,
        root: &Root,
        stage: &str,
        callback: FrameCallback,
    ) -> impl FnOnce() {
        let priority = {
            let state = self.inner.borrow();
            match state.stages.iter().position(|s| s == stage) {
                Some(index) => index as i32 - state.stages.len() as i32,
                None => panic!(
                    "unknown lifecycle stage `{stage}` (configured stages: {:?})",
                    state.stages
                ),
            }
        };
        self.subscribe(root, priority, callback)
    }

    // =========================================================================
    // Global effects
    // =========================================================================

    /// Effect run at the top of every tick, before any root flushes.
    pub fn add_effect(&self, effect: GlobalEffect) -> impl FnOnce() {
        let id = self.next_id();
        self.inner.borrow_mut().before.push((id, effect));
        let scheduler = self.clone();
        move || scheduler.inner.borrow_mut().before.retain(|(i, _)| *i != id)
    }

    /// Effect run at the end of every tick, after all root flushes.
    pub fn add_after_effect(&self, effect: GlobalEffect) -> impl FnOnce() {
        let id = self.next_id();
        self.inner.borrow_mut().after.push((id, effect));
        let scheduler = self.clone();
        move || scheduler.inner.borrow_mut().after.retain(|(i, _)| *i != id)
    }

    /// Effect run once whenever the loop transitions running → stopped.
    pub fn add_tail(&self, effect: TailEffect) -> impl FnOnce() {
        let id = self.next_id();
        self.inner.borrow_mut().tail.push((id, effect));
        let scheduler = self.clone();
        move || scheduler.inner.borrow_mut().tail.retain(|(i, _)| *i != id)
    }

    // =========================================================================
    // Ticking
    // =========================================================================

    /// Run one tick at a monotonic timestamp (milliseconds). Returns
    /// whether the loop is still running afterwards.
    pub fn step(&self, now_ms: f64) -> bool {
        if !self.inner.borrow().running {
            return false;
        }
        let delta_ms = {
            let mut state = self.inner.borrow_mut();
            let delta = now_ms - state.last_step_ms.unwrap_or(now_ms);
            state.last_step_ms = Some(now_ms);
            delta
        };

        let mut more = false;

        let before: Vec<GlobalEffect> = self
            .inner
            .borrow()
            .before
            .iter()
            .map(|(_, e)| e.clone())
            .collect();
        for effect in before {
            more |= effect(now_ms);
        }

        let roots = self.inner.borrow().roots.clone();
        for root in &roots {
            // Presenting XR sessions are driven by the host frame callback.
            if root.is_xr_presenting() {
                continue;
            }
            match root.frameloop() {
                Frameloop::Manual => {}
                Frameloop::Always => {
                    self.flush(root, delta_ms / 1000.0, None);
                    more = true;
                }
                Frameloop::OnDemand => {
                    if root.frames_remaining() > 0 {
                        self.flush(root, delta_ms / 1000.0, None);
                        let mut state = root.state_mut();
                        state.frames = state.frames.saturating_sub(1);
                    }
                    if root.frames_remaining() > 0 {
                        more = true;
                    }
                }
            }
        }

        let after: Vec<GlobalEffect> = self
            .inner
            .borrow()
            .after
            .iter()
            .map(|(_, e)| e.clone())
            .collect();
        for effect in after {
            more |= effect(now_ms);
        }

        for root in &roots {
            root.drain_disposals(now_ms);
            if !root.state().pending_dispose.is_empty() {
                more = true;
            }
        }

        if !more {
            log::debug!("scheduler idle at {now_ms}ms");
            {
                let mut state = self.inner.borrow_mut();
                state.running = false;
                state.last_step_ms = None;
            }
            // A tail effect may invalidate and restart the loop.
            let tail: Vec<TailEffect> = self
                .inner
                .borrow()
                .tail
                .iter()
                .map(|(_, e)| e.clone())
                .collect();
            for effect in tail {
                effect(now_ms);
            }
        }
        self.inner.borrow().running
    }

    /// Drive one root directly, outside the loop. Used by external drivers
    /// for `manual` roots and by XR session frame callbacks; delta derives
    /// from the supplied timestamps, never from a wall clock. Each root
    /// keeps its own last-advance timestamp, so independently clocked
    /// drivers never corrupt each other's deltas.
    pub fn advance(&self, now_ms: f64, root: &Root, frame: Option<&XrFrame>) {
        let delta_ms = {
            let mut state = root.state_mut();
            let delta = now_ms - state.last_advance_ms.unwrap_or(now_ms);
            state.last_advance_ms = Some(now_ms);
            delta
        };
        self.flush(root, delta_ms / 1000.0, frame);
        root.drain_disposals(now_ms);
    }

    /// One root's frame: subscribers ascending by priority, then the
    /// implicit render unless a positive-priority subscriber owns it.
    fn flush(&self, root: &Root, delta_s: f64, frame: Option<&XrFrame>) {
        let callbacks: Vec<FrameCallback> = root
            .state()
            .subscribers
            .iter()
            .map(|s| s.callback.clone())
            .collect();
        for callback in callbacks {
            callback(root, delta_s, frame);
        }

        if self.inner.borrow().priority_subs == 0 {
            let scene = root.scene().object();
            let camera = root.camera();
            root.state_mut().renderer.render(&scene, &camera);
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::host::{Camera, CountingRenderer, HostObject};

    fn setup() -> (Scheduler, Root, Rc<Cell<u32>>) {
        let (renderer, frames) = CountingRenderer::new();
        let root = Root::new(Box::new(renderer), Camera::default(), 800.0, 600.0);
        let scheduler = Scheduler::new();
        scheduler.add_root(&root);
        (scheduler, root, frames)
    }

    #[test]
    fn test_subscribers_run_ascending_and_stable() {
        let (scheduler, root, _) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));
        for (tag, priority) in [("a", 0), ("b", 2), ("c", 0), ("d", 1)] {
            let log = log.clone();
            // Dropping the disposer without calling it keeps the entry.
            let _stop = scheduler.subscribe(
                &root,
                priority,
                Rc::new(move |_, _, _| log.borrow_mut().push(tag)),
            );
        }

        scheduler.step(16.0);
        assert_eq!(*log.borrow(), vec!["a", "c", "d", "b"]);
    }

    #[test]
    fn test_on_demand_quiescence_and_invalidate() {
        let (scheduler, root, frames) = setup();
        root.set_frameloop(Frameloop::OnDemand);

        // add_root granted exactly one frame
        scheduler.step(0.0);
        assert_eq!(frames.get(), 1);
        assert!(!scheduler.is_running());

        // No pending invalidations: no renders, no matter how often stepped
        for t in 1..4 {
            scheduler.step(t as f64 * 16.0);
        }
        assert_eq!(frames.get(), 1);

        // One invalidate: exactly one more render pass, then quiescence
        scheduler.invalidate(&root);
        assert!(scheduler.is_running());
        scheduler.step(100.0);
        assert_eq!(frames.get(), 2);
        scheduler.step(116.0);
        assert_eq!(frames.get(), 2);
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_always_mode_renders_every_tick() {
        let (scheduler, _root, frames) = setup();
        for t in 0..3 {
            assert!(scheduler.step(t as f64 * 16.0));
        }
        assert_eq!(frames.get(), 3);
    }

    #[test]
    fn test_invalidations_cap_at_sixty() {
        let (scheduler, root, _) = setup();
        root.set_frameloop(Frameloop::OnDemand);
        for _ in 0..200 {
            scheduler.invalidate(&root);
        }
        assert_eq!(root.frames_remaining(), 60);
    }

    #[test]
    fn test_positive_priority_suppresses_implicit_render() {
        let (scheduler, root, frames) = setup();

        scheduler.step(0.0);
        assert_eq!(frames.get(), 1);

        let stop = scheduler.subscribe(&root, 1, Rc::new(|_, _, _| {}));
        scheduler.step(16.0);
        assert_eq!(frames.get(), 1);

        stop();
        scheduler.step(32.0);
        assert_eq!(frames.get(), 2);
    }

    #[test]
    fn test_stage_subscribers_precede_zero_priority() {
        let (scheduler, root, frames) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = log.clone();
        let _zero = scheduler.subscribe(
            &root,
            0,
            Rc::new(move |_, _, _| l.borrow_mut().push("zero")),
        );
        let l = log.clone();
        let _update = scheduler.subscribe_stage(
            &root,
            "update",
            Rc::new(move |_, _, _| l.borrow_mut().push("update")),
        );
        let l = log.clone();
        let _early = scheduler.subscribe_stage(
            &root,
            "early",
            Rc::new(move |_, _, _| l.borrow_mut().push("early")),
        );

        scheduler.step(16.0);
        assert_eq!(*log.borrow(), vec!["early", "update", "zero"]);
        // Stages never take over rendering
        assert_eq!(frames.get(), 1);
    }

    #[test]
    #[should_panic(expected = "unknown lifecycle stage")]
    fn test_unknown_stage_is_fatal() {
        let (scheduler, root, _) = setup();
        let _ = scheduler.subscribe_stage(&root, "physics", Rc::new(|_, _, _| {}));
    }

    #[test]
    fn test_disposer_removes_exactly_its_entry() {
        let (scheduler, root, _) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = log.clone();
        let stop_a = scheduler.subscribe(&root, 0, Rc::new(move |_, _, _| l.borrow_mut().push("a")));
        let l = log.clone();
        let _stop_b = scheduler.subscribe(
            &root,
            0,
            Rc::new(move |_, _, _| l.borrow_mut().push("b")),
        );

        stop_a();
        scheduler.step(16.0);
        assert_eq!(*log.borrow(), vec!["b"]);
    }

    #[test]
    fn test_manual_mode_only_advances_externally() {
        let (scheduler, root, frames) = setup();
        root.set_frameloop(Frameloop::Manual);

        scheduler.invalidate(&root);
        scheduler.step(16.0);
        assert_eq!(frames.get(), 0);

        // Delta derives from the supplied timestamps, not a wall clock
        let seen = Rc::new(Cell::new(0.0));
        let s = seen.clone();
        let _stop = scheduler.subscribe(
            &root,
            0,
            Rc::new(move |_, delta, _| s.set(delta)),
        );
        scheduler.advance(1000.0, &root, None);
        scheduler.advance(1500.0, &root, None);
        assert_eq!(frames.get(), 2);
        assert!((seen.get() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_advance_delta_is_per_root() {
        let (scheduler, root_a, _) = setup();
        root_a.set_frameloop(Frameloop::Manual);
        let (renderer, _) = CountingRenderer::new();
        let root_b = Root::new(Box::new(renderer), Camera::default(), 800.0, 600.0);
        root_b.set_frameloop(Frameloop::Manual);
        scheduler.add_root(&root_b);

        let seen = Rc::new(Cell::new(0.0));
        let s = seen.clone();
        let _stop = scheduler.subscribe(&root_a, 0, Rc::new(move |_, delta, _| s.set(delta)));

        // Root B runs on its own clock; interleaving it must not bleed
        // into root A's delta.
        scheduler.advance(0.0, &root_a, None);
        scheduler.advance(5000.0, &root_b, None);
        scheduler.advance(100.0, &root_a, None);
        assert!((seen.get() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_advance_passes_xr_frame_through() {
        let (scheduler, root, _) = setup();
        root.set_xr_presenting(true);

        let seen = Rc::new(Cell::new(None));
        let s = seen.clone();
        let _stop = scheduler.subscribe(
            &root,
            0,
            Rc::new(move |_, _, frame| s.set(frame.copied())),
        );

        // The loop skips presenting roots entirely
        scheduler.step(16.0);
        assert_eq!(seen.get(), None);

        let frame = XrFrame {
            predicted_display_time: 42.0,
        };
        scheduler.advance(16.0, &root, Some(&frame));
        assert_eq!(seen.get(), Some(frame));
    }

    #[test]
    fn test_effects_run_and_tail_fires_on_stop() {
        let (scheduler, root, _) = setup();
        root.set_frameloop(Frameloop::OnDemand);

        let before = Rc::new(Cell::new(0));
        let after = Rc::new(Cell::new(0));
        let tail = Rc::new(Cell::new(0));
        let b = before.clone();
        let _stop_b = scheduler.add_effect(Rc::new(move |_| {
            b.set(b.get() + 1);
            false
        }));
        let a = after.clone();
        let _stop_a = scheduler.add_after_effect(Rc::new(move |_| {
            a.set(a.get() + 1);
            false
        }));
        let t = tail.clone();
        let _stop_t = scheduler.add_tail(Rc::new(move |_| {
            t.set(t.get() + 1);
        }));

        scheduler.step(0.0);
        assert_eq!((before.get(), after.get(), tail.get()), (1, 1, 1));
        assert!(!scheduler.is_running());

        // Stopped loop: no effects at all
        scheduler.step(16.0);
        assert_eq!((before.get(), after.get(), tail.get()), (1, 1, 1));
    }

    #[test]
    fn test_effect_requesting_work_keeps_loop_alive() {
        let (scheduler, root, _) = setup();
        root.set_frameloop(Frameloop::OnDemand);

        let remaining = Rc::new(Cell::new(2));
        let r = remaining.clone();
        let _stop = scheduler.add_effect(Rc::new(move |_| {
            if r.get() > 0 {
                r.set(r.get() - 1);
                true
            } else {
                false
            }
        }));

        assert!(scheduler.step(0.0));
        assert!(scheduler.step(16.0));
        assert!(!scheduler.step(32.0));
    }

    #[test]
    fn test_remove_root_keeps_loop_for_others() {
        let (scheduler, root_a, frames_a) = setup();
        let (renderer, frames_b) = CountingRenderer::new();
        let root_b = Root::new(Box::new(renderer), Camera::default(), 800.0, 600.0);
        scheduler.add_root(&root_b);

        // A positive-priority subscriber on the removed root must not
        // suppress rendering forever.
        let _stop = scheduler.subscribe(&root_a, 1, Rc::new(|_, _, _| {}));
        scheduler.remove_root(&root_a);

        scheduler.step(16.0);
        assert_eq!(frames_a.get(), 0);
        assert_eq!(frames_b.get(), 1);
    }

    #[test]
    fn test_pending_disposals_keep_loop_alive_until_settled() {
        let (scheduler, root, _) = setup();
        root.set_frameloop(Frameloop::OnDemand);
        let material = HostObject::new("MeshBasicMaterial");

        scheduler.step(0.0);
        assert!(!scheduler.is_running());

        root.schedule_dispose(material.clone());
        scheduler.invalidate(&root);
        assert!(scheduler.step(10.0));
        assert_eq!(material.dispose_count(), 0);

        // Still alive purely for the pending disposal
        assert!(scheduler.step(300.0));
        assert!(!scheduler.step(600.0));
        assert_eq!(material.dispose_count(), 1);
    }
}
