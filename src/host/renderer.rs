//! Renderer seam.
//!
//! The scheduler performs the implicit render call through this trait; the
//! real engine backend lives behind it. `CountingRenderer` exists for
//! embedders (and tests) that only need to observe render passes.

use std::cell::Cell;
use std::rc::Rc;

use super::camera::Camera;
use super::object::HostObject;

/// Backend render seam. Called once per active frame unless a
/// positive-priority subscriber has taken over rendering.
pub trait Renderer {
    fn render(&mut self, scene: &HostObject, camera: &Camera);
}

/// Renderer that does nothing.
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render(&mut self, _scene: &HostObject, _camera: &Camera) {}
}

/// Renderer that counts render passes through a shared cell.
pub struct CountingRenderer {
    pub frames: Rc<Cell<u32>>,
}

impl CountingRenderer {
    pub fn new() -> (Self, Rc<Cell<u32>>) {
        let frames = Rc::new(Cell::new(0));
        (Self { frames: frames.clone() }, frames)
    }
}

impl Renderer for CountingRenderer {
    fn render(&mut self, _scene: &HostObject, _camera: &Camera) {
        self.frames.set(self.frames.get() + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting_renderer() {
        let (mut renderer, frames) = CountingRenderer::new();
        let scene = HostObject::new("Scene");
        let camera = Camera::default();

        renderer.render(&scene, &camera);
        renderer.render(&scene, &camera);
        assert_eq!(frames.get(), 2);
    }
}
