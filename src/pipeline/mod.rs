//! Frame pipeline.
//!
//! One explicit [`Scheduler`] drives every mounted root: invalidation,
//! priority-ordered subscriber flushes, the implicit render call, global
//! effect hooks, and deferred host disposal.

pub mod scheduler;

pub use scheduler::{GlobalEffect, Scheduler, TailEffect};
