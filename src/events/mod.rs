//! Pointer event engine.
//!
//! Raycast-based hit testing, hover/capture state machines, and synthetic
//! bubbling over the declarative ancestor chain. Native events arrive from
//! the input shim through [`pointer::dispatch`].

pub mod pointer;

pub use pointer::{
    dispatch, release_capture, remove_interactivity, Intersection, NativeEvent, SyntheticEvent,
};

use crate::engine::registry::Instance;
use crate::types::PointerId;

/// Composite hit identity: object id plus submesh/instance index. One
/// physical ray hit on instanced geometry can report several logical
/// intersections; identity keeps them apart.
pub type HitKey = (u64, Option<u32>);

/// A captured pointer's stored state: the target keeps receiving events with
/// the intersection recorded at capture time.
#[derive(Clone)]
pub struct CaptureEntry {
    pub target: Instance,
    pub intersection: Intersection,
}

/// Structural copy of the last hit kept per hovered identity. Never the live
/// synthetic event.
#[derive(Clone)]
pub(crate) struct StoredHit {
    pub target: Instance,
    pub intersection: Intersection,
}

/// Native pointer id plus capture bookkeeping helpers live on the root; this
/// module only defines the shared shapes.
pub type CaptureMap = std::collections::HashMap<PointerId, Vec<CaptureEntry>>;
