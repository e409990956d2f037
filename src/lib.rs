//! # trellis
//!
//! Reactive scene-graph binding with synthetic pointer events.
//!
//! Built on [spark-signals](https://github.com/RLabs-Inc/spark-signals) for
//! fine-grained reactivity.
//!
//! ## Architecture
//!
//! trellis mediates between a reactively-updated declarative tree and an
//! imperative 3D scene graph. The adapter mounts nodes through the instance
//! registry, props flow through the differ/applier as typed host mutations,
//! an explicit scheduler drives per-frame subscribers across all roots, and
//! native input enters the pointer engine, which ray-tests the interaction
//! list and dispatches synthetic events with DOM-like bubbling, hover, and
//! capture semantics the scene graph itself lacks.
//!
//! ```text
//! Declarative tree → Registry/Attach → Props → Host objects
//!                                         ↓
//!        Scheduler → subscribers → implicit render
//!                                         ↑
//!    Native input → Pointer engine → handlers (interaction list)
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Core types (EventName, HandlerMask, Frameloop)
//! - [`host`] - Host object handles, camera/ray math, renderer seam
//! - [`engine`] - Instance registry, attach resolver, unmount
//! - [`props`] - Prop bags, differ, six-rule applier
//! - [`root`] - Per-mount root state
//! - [`pipeline`] - Scheduler: invalidation, priorities, global effects
//! - [`events`] - Raycast hit testing, hover/capture, synthetic dispatch

pub mod engine;
pub mod error;
pub mod events;
pub mod host;
pub mod pipeline;
pub mod props;
pub mod root;
pub mod types;

// Re-export commonly used items
pub use types::*;

pub use error::{Error, Result};

pub use host::{
    Camera, CountingRenderer, HitShape, HostObject, NullRenderer, Ray, Renderer, Value,
};

pub use engine::{
    append_child, default_classifier, remove_child, replace_object, unmount, AttachSpec,
    Classifier, Instance, ParentEdge, Registry,
};

pub use props::{apply_props, diff_props, Prop, PropKey, PropValue, Props};

pub use root::{FrameCallback, PointerConfig, RaycastConfig, Root, WeakRoot};

pub use pipeline::{GlobalEffect, Scheduler, TailEffect};

pub use events::{
    dispatch, release_capture, remove_interactivity, CaptureEntry, Intersection, NativeEvent,
    SyntheticEvent,
};
