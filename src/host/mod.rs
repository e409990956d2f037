//! Host object model.
//!
//! The in-process stand-in for the imperative 3D engine: dynamically-slotted
//! objects, a perspective camera with NDC unprojection, ray/sphere hit
//! testing, and the renderer seam the scheduler renders through.

pub mod camera;
pub mod object;
pub mod renderer;
pub mod value;

pub use camera::{Camera, Ray};
pub use object::{HitShape, HostObject};
pub use renderer::{CountingRenderer, NullRenderer, Renderer};
pub use value::Value;
