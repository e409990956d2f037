//! Camera and ray math.
//!
//! A perspective camera unprojects normalized device coordinates into world
//! rays; spheres (and per-instance sphere sets) intersect against those rays.
//! Intersections report both entry and exit points, which is why the event
//! engine de-duplicates hits by composite identity.

use glam::{Mat4, Vec2, Vec3};

use super::object::{HitShape, HostObject};

// =============================================================================
// Camera
// =============================================================================

/// Active camera for a root. Plain data; the adapter swaps it freely.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub projection: Mat4,
    pub view: Mat4,
}

impl Camera {
    /// Perspective camera at `position`, looking at the origin.
    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32, position: Vec3) -> Self {
        Self {
            position,
            projection: Mat4::perspective_rh_gl(fov_y_degrees.to_radians(), aspect, near, far),
            view: Mat4::look_at_rh(position, Vec3::ZERO, Vec3::Y),
        }
    }

    /// Default camera: 75 degree fov at `(0, 0, 5)`.
    pub fn default_perspective(aspect: f32) -> Self {
        Self::perspective(75.0, aspect, 0.1, 1000.0, Vec3::new(0.0, 0.0, 5.0))
    }

    /// Unproject a point in normalized device coordinates (z in `-1..1`)
    /// into world space.
    pub fn unproject(&self, ndc: Vec3) -> Vec3 {
        (self.projection * self.view).inverse().project_point3(ndc)
    }

    /// World-space ray through an NDC coordinate.
    pub fn ray_from_ndc(&self, ndc: Vec2) -> Ray {
        let near = self.unproject(Vec3::new(ndc.x, ndc.y, -1.0));
        let far = self.unproject(Vec3::new(ndc.x, ndc.y, 1.0));
        Ray {
            origin: near,
            direction: (far - near).normalize(),
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::default_perspective(1.0)
    }
}

// =============================================================================
// Ray
// =============================================================================

/// World-space ray used for hit testing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Distances along the ray where it enters and exits a sphere.
    /// Empty when the ray misses or the sphere is behind the origin.
    pub fn intersect_sphere(&self, center: Vec3, radius: f32) -> Vec<f32> {
        let oc = self.origin - center;
        let b = oc.dot(self.direction);
        let c = oc.length_squared() - radius * radius;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return Vec::new();
        }
        let sqrt_d = discriminant.sqrt();
        [-b - sqrt_d, -b + sqrt_d]
            .into_iter()
            .filter(|&t| t > 0.0)
            .collect()
    }

    /// Raw hits against an object's hit shape at its world position.
    /// Each hit is `(distance, instance index)`; instanced shapes report the
    /// instance a hit belongs to.
    pub fn intersect_object(&self, object: &HostObject) -> Vec<(f32, Option<u32>)> {
        let Some(shape) = object.hit_shape() else {
            return Vec::new();
        };
        let base = object.world_position();
        match shape {
            HitShape::Sphere { radius } => self
                .intersect_sphere(base, radius)
                .into_iter()
                .map(|t| (t, None))
                .collect(),
            HitShape::Instanced { radius, offsets } => {
                let mut hits = Vec::new();
                for (index, offset) in offsets.iter().enumerate() {
                    for t in self.intersect_sphere(base + *offset, radius) {
                        hits.push((t, Some(index as u32)));
                    }
                }
                hits
            }
        }
    }
}
