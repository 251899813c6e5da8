use std::sync::Arc;

use glam::{Affine3A, Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::bounds::BoundingBox;
use super::camera::Frustum;
use super::drawable::{Drawable, DrawableBase, DrawableFlags, DrawableId, FrameInfo};
use crate::renderer::shadow_utils;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LightType {
    Directional,
    Point,
    Spot,
}

impl LightType {
    /// Shader define selecting the light model.
    #[must_use]
    pub fn define(self) -> &'static str {
        match self {
            Self::Directional => "DIRLIGHT",
            Self::Point => "POINTLIGHT",
            Self::Spot => "SPOTLIGHT",
        }
    }
}

/// How strongly a light claims per-pixel slots on the geometries it lights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LightImportance {
    /// Pixel or vertex light, decided by the per-drawable budget.
    #[default]
    Auto,
    /// Always a pixel light, even over the budget.
    Important,
    /// Vertex light only; never casts shadows.
    NotImportant,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadowConfig {
    pub bias: f32,
    pub normal_bias: f32,
    /// Resolution of one shadow split in texels.
    pub map_size: u32,
    /// Cascade count of a directional light, 1 to 4.
    pub cascade_count: u32,
    /// Blend between uniform (`0.0`) and logarithmic (`1.0`) cascade splits.
    pub cascade_split_lambda: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            bias: 0.005,
            normal_bias: 0.02,
            map_size: 1024,
            cascade_count: 4,
            cascade_split_lambda: 0.5,
        }
    }
}

/// Light drawable.
///
/// Directional lights shine along the transform's `-Z` axis; spot lights
/// point the same way. `intensity_divisor` is an inverse importance weight:
/// the lower it is, the more a light competes for per-pixel slots.
#[derive(Debug)]
pub struct Light {
    base: DrawableBase,
    pub light_type: LightType,
    pub color: Vec3,
    /// Negative brightness makes a subtractive light.
    pub brightness: f32,
    pub range: f32,
    /// Full spot cone angle in degrees.
    pub fov: f32,
    pub intensity_divisor: f32,
    pub importance: LightImportance,
    pub specular_intensity: f32,
    /// Zero is full shadow, one is no shadow.
    pub shadow_intensity: f32,
    /// Max distance from the camera at which the light casts shadows; zero means unlimited.
    pub shadow_distance: f32,
    pub shadow: ShadowConfig,
    /// Contribution already baked into lightmaps.
    pub baked: bool,
}

impl Light {
    fn with_type(light_type: LightType, color: Vec3, brightness: f32, range: f32) -> Self {
        let bounds = Self::local_bounds_for(light_type, range);
        Self {
            base: DrawableBase::new(DrawableFlags::LIGHT, bounds),
            light_type,
            color,
            brightness,
            range,
            fov: 30.0,
            intensity_divisor: 1.0,
            importance: LightImportance::Auto,
            specular_intensity: 1.0,
            shadow_intensity: 0.0,
            shadow_distance: 0.0,
            shadow: ShadowConfig::default(),
            baked: false,
        }
    }

    #[must_use]
    pub fn new_directional(color: Vec3, brightness: f32) -> Self {
        Self::with_type(LightType::Directional, color, brightness, 0.0)
    }

    #[must_use]
    pub fn new_point(color: Vec3, brightness: f32, range: f32) -> Self {
        Self::with_type(LightType::Point, color, brightness, range)
    }

    #[must_use]
    pub fn new_spot(color: Vec3, brightness: f32, range: f32, fov: f32) -> Self {
        let mut light = Self::with_type(LightType::Spot, color, brightness, range);
        light.fov = fov;
        light
    }

    fn local_bounds_for(light_type: LightType, range: f32) -> BoundingBox {
        match light_type {
            LightType::Directional => BoundingBox::infinite(),
            LightType::Point | LightType::Spot => {
                BoundingBox::from_center_half_extents(Vec3::ZERO, Vec3::splat(range))
            }
        }
    }

    // ─── Builders ──────────────────────────────────────────────────────

    #[must_use]
    pub fn with_transform(self, transform: Affine3A) -> Self {
        self.base.set_transform(transform);
        self
    }

    #[must_use]
    pub fn with_position(self, position: Vec3) -> Self {
        let rotation = Quat::from_affine3a(&self.base.transform());
        self.with_transform(Affine3A::from_rotation_translation(rotation, position))
    }

    /// Orients the light so that it shines along `direction`.
    #[must_use]
    pub fn with_direction(self, direction: Vec3) -> Self {
        let position = self.base.position();
        let rotation = Quat::from_rotation_arc(Vec3::NEG_Z, direction.normalize_or(Vec3::NEG_Z));
        self.with_transform(Affine3A::from_rotation_translation(rotation, position))
    }

    #[must_use]
    pub fn with_range(mut self, range: f32) -> Self {
        self.range = range;
        self.base.set_local_bounding_box(Self::local_bounds_for(self.light_type, range));
        self
    }

    #[must_use]
    pub fn with_intensity_divisor(mut self, divisor: f32) -> Self {
        self.intensity_divisor = divisor;
        self
    }

    #[must_use]
    pub fn with_importance(mut self, importance: LightImportance) -> Self {
        self.importance = importance;
        self
    }

    #[must_use]
    pub fn with_light_mask(mut self, light_mask: u32) -> Self {
        self.base.light_mask = light_mask;
        self
    }

    #[must_use]
    pub fn with_cast_shadows(mut self, cast_shadows: bool) -> Self {
        self.base.cast_shadows = cast_shadows;
        self
    }

    #[must_use]
    pub fn with_shadow(mut self, shadow: ShadowConfig) -> Self {
        self.shadow = shadow;
        self
    }

    #[must_use]
    pub fn with_shadow_intensity(mut self, shadow_intensity: f32) -> Self {
        self.shadow_intensity = shadow_intensity;
        self
    }

    #[must_use]
    pub fn with_shadow_distance(mut self, shadow_distance: f32) -> Self {
        self.shadow_distance = shadow_distance;
        self
    }

    #[must_use]
    pub fn with_draw_distance(mut self, draw_distance: f32) -> Self {
        self.base.draw_distance = draw_distance;
        self
    }

    #[must_use]
    pub fn with_baked(mut self, baked: bool) -> Self {
        self.baked = baked;
        self
    }

    // ─── Queries ───────────────────────────────────────────────────────

    #[inline]
    pub fn id(&self) -> DrawableId {
        self.base.id()
    }

    pub fn position(&self) -> Vec3 {
        self.base.position()
    }

    pub fn direction(&self) -> Vec3 {
        self.base
            .transform()
            .transform_vector3(Vec3::NEG_Z)
            .normalize_or(Vec3::NEG_Z)
    }

    pub fn cast_shadows(&self) -> bool {
        self.base.cast_shadows
    }

    pub fn is_negative(&self) -> bool {
        self.brightness < 0.0
    }

    pub fn effective_color(&self) -> Vec3 {
        self.color * self.brightness
    }

    /// Light mask used for lighting; zero for baked lights.
    pub fn light_mask_effective(&self) -> u32 {
        if self.baked { 0 } else { self.base.light_mask }
    }

    /// Distance from the light to a geometry; zero for directional lights.
    pub fn distance_to(&self, geometry: &dyn Drawable) -> f32 {
        match self.light_type {
            LightType::Directional => 0.0,
            LightType::Point | LightType::Spot => geometry
                .base()
                .world_bounding_box()
                .distance_to_point(self.position()),
        }
    }

    /// Spot light volume as a culling frustum.
    pub fn spot_frustum(&self) -> Frustum {
        let vp = shadow_utils::build_spot_vp(self.position(), self.direction(), self.fov, self.range);
        Frustum::from_matrix(vp)
    }

    /// Whether the light's volume touches `bounds`.
    pub fn affects(&self, bounds: &BoundingBox) -> bool {
        match self.light_type {
            LightType::Directional => true,
            LightType::Point => bounds.intersects_sphere(self.position(), self.range),
            LightType::Spot => {
                bounds.intersects_sphere(self.position(), self.range)
                    && self.spot_frustum().intersects_box(bounds)
            }
        }
    }

    /// Whether the camera position lies inside the light volume.
    pub fn contains_point(&self, point: Vec3) -> bool {
        match self.light_type {
            LightType::Directional => true,
            LightType::Point => self.position().distance_squared(point) <= self.range * self.range,
            LightType::Spot => {
                self.position().distance_squared(point) <= self.range * self.range
                    && self.spot_frustum().intersects_sphere(point, 0.0)
            }
        }
    }
}

impl Drawable for Light {
    fn base(&self) -> &DrawableBase {
        &self.base
    }

    fn update_batches(&self, frame: &FrameInfo) {
        let distance = match self.light_type {
            LightType::Directional => 0.0,
            LightType::Point | LightType::Spot => frame.camera.distance(self.position()),
        };
        self.base.set_distance(distance);
    }

    fn into_light(self: Arc<Self>) -> Option<Arc<Light>> {
        Some(self)
    }
}
