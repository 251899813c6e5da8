//! Per-frame light state.
//!
//! A [`SceneLight`] wraps one visible [`Light`] for the duration of a frame:
//! the geometries it lights, its shadow splits with their casters, the
//! assigned shadow map region and the finalized shader parameters.
//!
//! Instances are cached by the collector across frames and reset with
//! [`SceneLight::begin_frame`], so the internal vectors keep their capacity.

use std::sync::Arc;

use glam::{IVec2, Mat4, Vec2, Vec3, Vec4};
use log::trace;
use smallvec::SmallVec;
use xxhash_rust::xxh3::Xxh3;

use super::drawable_data::{DrawableTraits, SceneDrawableData};
use super::z_range::DrawableZRange;
use crate::renderer::shadow_map::ShadowMapRegion;
use crate::renderer::shadow_utils::{self, MAX_CASCADES, POINT_LIGHT_FACES};
use crate::renderer::work_queue::ThreadedVector;
use crate::scene::{Camera, Drawable, DrawableFlags, FrameInfo, Frustum, Light, LightType, SpatialIndex};

/// Max number of shadow splits of one light (point light cube faces).
pub const MAX_SHADOW_SPLITS: usize = POINT_LIGHT_FACES;

/// Shared inputs of the per-light update.
pub struct SceneLightProcessContext<'a> {
    pub frame: &'a FrameInfo,
    pub index: &'a dyn SpatialIndex,
    pub scene_z_range: DrawableZRange,
    pub visible_geometries: &'a [Arc<dyn Drawable>],
    pub drawable_data: &'a SceneDrawableData,
    /// Shadow casters not yet updated this frame.
    pub casters_to_update: &'a ThreadedVector<Arc<dyn Drawable>>,
}

/// One cascade, cone or cube face of a light's shadow.
#[derive(Debug, Clone)]
pub struct ShadowSplit {
    pub view_projection: Mat4,
    /// Caster culling volume.
    pub frustum: Frustum,
    /// View depth interval covered by the split.
    pub z_near: f32,
    pub z_far: f32,
    pub casters: Vec<Arc<dyn Drawable>>,
    /// Viewport inside the light's shadow map.
    pub region: Option<ShadowMapRegion>,
    /// World to shadow map texture space.
    pub shadow_matrix: Mat4,
}

impl ShadowSplit {
    fn new(view_projection: Mat4, frustum: Frustum, z_near: f32, z_far: f32) -> Self {
        Self {
            view_projection,
            frustum,
            z_near,
            z_far,
            casters: Vec::new(),
            region: None,
            shadow_matrix: Mat4::IDENTITY,
        }
    }
}

/// Uniform values of a light, computed once per frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightShaderParameters {
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub inv_range: f32,
    /// `(cos(fov / 2), 1 / (1 - cos(fov / 2)))` for spot lights.
    pub spot_cutoff: Vec2,
    pub shadow_matrices: SmallVec<[Mat4; MAX_SHADOW_SPLITS]>,
    /// Far depth of each cascade divided by the camera far plane.
    pub cascade_splits: Vec4,
    /// `(depth bias, normal bias)`.
    pub shadow_bias: Vec2,
    pub shadow_intensity: f32,
    pub specular_intensity: f32,
}

#[derive(Debug)]
pub struct SceneLight {
    light: Arc<Light>,
    has_shadow: bool,
    lit_geometries: Vec<Arc<dyn Drawable>>,
    splits: SmallVec<[ShadowSplit; MAX_SHADOW_SPLITS]>,
    shadow_map_size: IVec2,
    shadow_map: Option<ShadowMapRegion>,
    shader_params: LightShaderParameters,
    pipeline_hash: u32,
}

impl SceneLight {
    #[must_use]
    pub fn new(light: Arc<Light>) -> Self {
        Self {
            light,
            has_shadow: false,
            lit_geometries: Vec::new(),
            splits: SmallVec::new(),
            shadow_map_size: IVec2::ZERO,
            shadow_map: None,
            shader_params: LightShaderParameters::default(),
            pipeline_hash: 0,
        }
    }

    /// Drops the previous frame's results.
    pub fn begin_frame(&mut self, has_shadow: bool) {
        self.has_shadow = has_shadow;
        self.release_frame_results();
    }

    /// Releases the drawables referenced by the last frame while keeping
    /// vector capacity.
    pub fn release_frame_results(&mut self) {
        self.lit_geometries.clear();
        self.splits.clear();
        self.shadow_map_size = IVec2::ZERO;
        self.shadow_map = None;
    }

    /// Finds lit geometries and, if the light is shadowed, shadow casters
    /// per split. Casters not updated yet this frame are queued for update.
    pub fn update_lit_geometries_and_shadow_casters(
        &mut self,
        thread_index: usize,
        ctx: &SceneLightProcessContext<'_>,
    ) {
        self.collect_lit_geometries(ctx);
        if self.has_shadow {
            self.build_splits(ctx);
            self.collect_shadow_casters(thread_index, ctx);
        }
        trace!(
            "Light {} lights {} geometries, {} shadow splits",
            self.light.id(),
            self.lit_geometries.len(),
            self.splits.len()
        );
    }

    fn collect_lit_geometries(&mut self, ctx: &SceneLightProcessContext<'_>) {
        let light = &*self.light;
        let light_mask = light.light_mask_effective();
        self.lit_geometries.extend(
            ctx.visible_geometries
                .iter()
                .filter(|geometry| {
                    let base = geometry.base();
                    let traits = ctx.drawable_data.traits(base.index() as usize);
                    traits.contains(DrawableTraits::FORWARD_LIT)
                        && light_mask & base.light_mask != 0
                        && light.affects(&base.world_bounding_box())
                })
                .cloned(),
        );
    }

    fn build_splits(&mut self, ctx: &SceneLightProcessContext<'_>) {
        let light = &*self.light;
        let camera = &ctx.frame.camera;
        match light.light_type {
            LightType::Directional => {
                let Some((near, far)) =
                    shadow_utils::focus_shadow_range(camera, light.shadow_distance, ctx.scene_z_range)
                else {
                    return;
                };
                let count = light.shadow.cascade_count.clamp(1, MAX_CASCADES);
                let splits =
                    shadow_utils::compute_cascade_splits(count, near, far, light.shadow.cascade_split_lambda);
                let mut split_near = near;
                for &split_far in splits.iter().take(count as usize) {
                    let corners = shadow_utils::compute_frustum_corners_world(camera, split_near, split_far);
                    let vp = shadow_utils::build_cascade_vp(
                        light.direction(),
                        &corners,
                        light.shadow.map_size,
                        camera.far,
                    );
                    let frustum = Frustum::from_matrix_shadow_caster(vp);
                    self.splits.push(ShadowSplit::new(vp, frustum, split_near, split_far));
                    split_near = split_far;
                }
            }
            LightType::Spot => {
                let vp = shadow_utils::build_spot_vp(light.position(), light.direction(), light.fov, light.range);
                self.splits
                    .push(ShadowSplit::new(vp, Frustum::from_matrix(vp), 0.0, light.range));
            }
            LightType::Point => {
                for vp in shadow_utils::build_point_face_vps(light.position(), light.range) {
                    self.splits
                        .push(ShadowSplit::new(vp, Frustum::from_matrix(vp), 0.0, light.range));
                }
            }
        }
    }

    fn collect_shadow_casters(&mut self, thread_index: usize, ctx: &SceneLightProcessContext<'_>) {
        let light = &*self.light;
        let light_mask = light.light_mask_effective();
        let is_directional = light.light_type == LightType::Directional;
        let view_mask = ctx.frame.camera.view_mask;

        let mut candidates = Vec::new();
        for split in &mut self.splits {
            candidates.clear();
            ctx.index
                .collect_drawables(&split.frustum, DrawableFlags::GEOMETRY, view_mask, &mut candidates);

            for caster in candidates.drain(..) {
                let base = caster.base();
                if !base.cast_shadows || base.shadow_mask & light_mask == 0 {
                    continue;
                }
                let Some(index) = ctx.drawable_data.check_index(base.index()) else {
                    continue;
                };

                // Visible casters outside of the cascade depth can't shadow it
                let traits = ctx.drawable_data.traits(index);
                if is_directional
                    && traits.contains(DrawableTraits::VISIBLE_GEOMETRY)
                    && !ctx.drawable_data.z_range(index).intersects(split.z_near, split.z_far)
                {
                    continue;
                }

                if !ctx.drawable_data.mark_updated(index) {
                    ctx.casters_to_update.push(thread_index, caster.clone());
                }
                split.casters.push(caster);
            }
        }
    }

    /// Computes the shadow map size from the split layout. A light without
    /// casters in any split loses its splits and gets size zero.
    pub fn finalize_shadow_map(&mut self) {
        let has_casters = self.splits.iter().any(|split| !split.casters.is_empty());
        if !self.has_shadow || !has_casters {
            self.splits.clear();
            self.shadow_map_size = IVec2::ZERO;
            return;
        }

        let s = self.light.shadow.map_size.max(1) as i32;
        self.shadow_map_size = match self.splits.len() {
            1 => IVec2::new(s, s),
            2 => IVec2::new(2 * s, s),
            3 | 4 => IVec2::new(2 * s, 2 * s),
            _ => IVec2::new(3 * s, 2 * s),
        };
    }

    /// Assigns the shadow map region and lays the splits out inside it.
    ///
    /// `None` means the allocator could not serve the light, which then
    /// renders unshadowed.
    pub fn set_shadow_map(&mut self, region: Option<ShadowMapRegion>) {
        let Some(region) = region else {
            self.splits.clear();
            self.shadow_map_size = IVec2::ZERO;
            self.shadow_map = None;
            return;
        };

        let split_size = self.light.shadow.map_size.max(1) as i32;
        for (i, split) in self.splits.iter_mut().enumerate() {
            split.region = region.split(i, split_size);
            split.shadow_matrix = split
                .region
                .map_or(Mat4::IDENTITY, |r| r.uv_transform() * split.view_projection);
        }
        self.shadow_map = Some(region);
    }

    pub fn finalize_shader_parameters(&mut self, camera: &Camera) {
        let light = &*self.light;
        let mut params = LightShaderParameters {
            position: light.position(),
            direction: light.direction(),
            color: light.effective_color(),
            inv_range: if light.range > 0.0 { 1.0 / light.range } else { 0.0 },
            shadow_bias: Vec2::new(light.shadow.bias, light.shadow.normal_bias),
            shadow_intensity: light.shadow_intensity,
            specular_intensity: light.specular_intensity,
            ..Default::default()
        };

        if light.light_type == LightType::Spot {
            let cutoff = (light.fov.to_radians() * 0.5).cos();
            params.spot_cutoff = Vec2::new(cutoff, 1.0 / (1.0 - cutoff).max(f32::EPSILON));
        }

        if self.shadow_map.is_some() {
            params.shadow_matrices = self.splits.iter().map(|split| split.shadow_matrix).collect();
            if light.light_type == LightType::Directional {
                let far = camera.far.max(f32::EPSILON);
                let mut cascade_splits = [0.0; 4];
                for (out, split) in cascade_splits.iter_mut().zip(&self.splits) {
                    *out = split.z_far / far;
                }
                params.cascade_splits = Vec4::from_array(cascade_splits);
            }
        }

        self.shader_params = params;
        self.pipeline_hash = self.compute_pipeline_hash();
    }

    fn compute_pipeline_hash(&self) -> u32 {
        let mut hasher = Xxh3::new();
        hasher.update(&[
            self.light.light_type as u8,
            u8::from(self.shadow_map.is_some()),
            u8::from(self.light.is_negative()),
            self.splits.len() as u8,
        ]);
        hasher.digest() as u32
    }

    // ─── Accessors ─────────────────────────────────────────────────────

    #[inline]
    pub fn light(&self) -> &Arc<Light> {
        &self.light
    }

    /// Whether shadows were requested for this frame.
    pub fn has_shadow(&self) -> bool {
        self.has_shadow
    }

    pub fn lit_geometries(&self) -> &[Arc<dyn Drawable>] {
        &self.lit_geometries
    }

    pub fn num_splits(&self) -> usize {
        self.splits.len()
    }

    pub fn split(&self, index: usize) -> Option<&ShadowSplit> {
        self.splits.get(index)
    }

    pub fn splits(&self) -> &[ShadowSplit] {
        &self.splits
    }

    pub fn shadow_map_size(&self) -> IVec2 {
        self.shadow_map_size
    }

    pub fn shadow_map(&self) -> Option<&ShadowMapRegion> {
        self.shadow_map.as_ref()
    }

    pub fn shader_parameters(&self) -> &LightShaderParameters {
        &self.shader_params
    }

    /// Hash of the light state that selects pipeline variants.
    pub fn pipeline_hash(&self) -> u32 {
        self.pipeline_hash
    }
}
