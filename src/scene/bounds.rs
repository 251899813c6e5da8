use glam::{Affine3A, Vec3};

/// Axis-aligned bounding box in world or local space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Vec3::ZERO)
    }
}

impl BoundingBox {
    #[must_use]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Box large enough to be treated as unbounded (skyboxes, directional lights).
    #[must_use]
    pub fn infinite() -> Self {
        let l = crate::renderer::collector::z_range::LARGE_VALUE;
        Self::new(Vec3::splat(-l), Vec3::splat(l))
    }

    pub fn center(&self) -> Vec3 { (self.min + self.max) * 0.5 }
    pub fn size(&self) -> Vec3 { self.max - self.min }
    pub fn half_size(&self) -> Vec3 { self.size() * 0.5 }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// World-space box enclosing this box transformed by `matrix`.
    pub fn transform(&self, matrix: &Affine3A) -> Self {
        let center = matrix.transform_point3(self.center());
        let half = self.half_size();
        let m = matrix.matrix3;
        let extent = Vec3::from(m.x_axis.abs()) * half.x
            + Vec3::from(m.y_axis.abs()) * half.y
            + Vec3::from(m.z_axis.abs()) * half.z;

        Self::from_center_half_extents(center, extent)
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    /// Squared distance from `point` to the box; zero inside.
    pub fn distance_squared_to_point(&self, point: Vec3) -> f32 {
        let clamped = point.clamp(self.min, self.max);
        clamped.distance_squared(point)
    }

    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.distance_squared_to_point(point).sqrt()
    }

    /// Distance from an interior point to the nearest face.
    pub fn inner_distance_to_boundary(&self, point: Vec3) -> f32 {
        let to_min = point - self.min;
        let to_max = self.max - point;
        to_min.min(to_max).min_element().max(0.0)
    }

    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.distance_squared_to_point(center) <= radius * radius
    }
}
