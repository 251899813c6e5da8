//! Render Pipeline
//!
//! Frame lifecycle controller. Owns the stock scene passes, the shadow atlas
//! allocator and a [`SceneBatchCollector`], and drives one collection per
//! [`RenderPipeline::render`] call:
//!
//! 1. Invalidate pass pipeline caches if the settings hash changed
//! 2. Reset the shadow atlas
//! 3. Collect geometries and lights inside the camera frustum
//! 4. Wire passes (deferred: `deferred`; forward: `base/litbase/light` and
//!    `alpha/alpha/litalpha`; always `shadow`)
//! 5. Run the collector phases
//!
//! Draw submission is left to the caller, which reads the sorted batches
//! from the passes after `render` returns.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use glam::IVec2;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::errors::Result;
use crate::renderer::collector::batch::LightGeometry;
use crate::renderer::collector::callback::SceneBatchCollectorCallback;
use crate::renderer::collector::scene_light::SceneLight;
use crate::renderer::collector::SceneBatchCollector;
use crate::renderer::passes::{ForwardLightingScenePass, ScenePass, ShadowScenePass, UnlitScenePass};
use crate::renderer::pipeline_state::{
    DepthCompare, PipelineStateDesc, PipelineStateFactory, PipelineStateHandle,
    ScenePipelineStateContext, ScenePipelineStateKey,
};
use crate::renderer::shadow_map::{ShadowMapAllocator, ShadowMapRegion};
use crate::renderer::work_queue::WorkScheduler;
use crate::resources::{BlendMode, CullMode};
use crate::scene::{
    Camera, Drawable, DrawableFlags, FrameInfo, Light, LightImportance, LightType, SpatialIndex,
    ViewOverrideFlags,
};
use crate::settings::RenderPipelineSettings;

/// Summary of one rendered frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame_number: u64,
    pub visible_drawables: usize,
    pub visible_geometries: usize,
    pub visible_lights: usize,
    pub shadowed_lights: usize,
    pub scene_batches: usize,
    pub shadow_batches: usize,
    pub light_volume_batches: usize,
    pub shadow_map_pages: usize,
}

// ============================================================================
// Callback
// ============================================================================

/// Default collector callback: shadow policy, shadow atlas and pipeline
/// state descriptors.
pub struct PipelineCallback {
    settings: RwLock<RenderPipelineSettings>,
    factory: Arc<dyn PipelineStateFactory>,
    shadow_maps: Mutex<ShadowMapAllocator>,
    shadows_disabled: AtomicBool,
}

impl PipelineCallback {
    #[must_use]
    pub fn new(settings: RenderPipelineSettings, factory: Arc<dyn PipelineStateFactory>) -> Self {
        Self {
            settings: RwLock::new(settings),
            factory,
            shadow_maps: Mutex::new(ShadowMapAllocator::new(settings.shadow_map_page_size)),
            shadows_disabled: AtomicBool::new(false),
        }
    }

    pub fn set_settings(&self, settings: RenderPipelineSettings) {
        self.shadow_maps.lock().set_page_size(settings.shadow_map_page_size);
        *self.settings.write() = settings;
    }

    /// Releases all shadow map regions and applies per-camera overrides.
    pub fn begin_frame(&self, camera: &Camera) {
        self.shadow_maps.lock().reset();
        self.shadows_disabled.store(
            camera.view_override_flags.contains(ViewOverrideFlags::DISABLE_SHADOWS),
            Ordering::Relaxed,
        );
    }

    pub fn shadow_map_page_count(&self) -> usize {
        self.shadow_maps.lock().page_count()
    }
}

impl SceneBatchCollectorCallback for PipelineCallback {
    fn has_shadow(&self, light: &Light) -> bool {
        let draw_shadows = self.settings.read().draw_shadows;
        let within_shadow_distance =
            light.shadow_distance <= 0.0 || light.base().distance() <= light.shadow_distance;

        draw_shadows
            && !self.shadows_disabled.load(Ordering::Relaxed)
            && light.cast_shadows()
            && light.importance != LightImportance::NotImportant
            && light.shadow_intensity < 1.0
            && within_shadow_distance
    }

    fn get_temporary_shadow_map(&self, size: IVec2) -> Option<ShadowMapRegion> {
        match self.shadow_maps.lock().allocate(size) {
            Ok(region) => Some(region),
            Err(err) => {
                warn!("Shadow map allocation failed: {err}");
                None
            }
        }
    }

    fn create_pipeline_state(
        &self,
        _key: &ScenePipelineStateKey,
        ctx: &ScenePipelineStateContext<'_>,
    ) -> Option<PipelineStateHandle> {
        let settings = *self.settings.read();
        let pass = ctx.pass;
        let mut desc = PipelineStateDesc {
            pass_name: pass.name_str().to_owned(),
            defines: pass.defines.clone(),
            blend_mode: pass.blend_mode,
            cull_mode: pass.cull_mode,
            depth_write: pass.depth_write,
            geometry_type: ctx.geometry_type,
            ..Default::default()
        };
        desc.add_define(format!("PASS_{}", pass.name_str().to_uppercase()));
        if let Some(define) = ctx.geometry_type.define() {
            desc.add_define(define);
        }
        if settings.gamma_correction {
            desc.add_define("GAMMA_CORRECTION");
        }

        if let Some(light) = ctx.light {
            let light_type = light.light().light_type;
            desc.add_define(light_type.define());
            if !ctx.shadow_pass {
                desc.add_define("PERPIXEL");
                if light.shadow_map().is_some() {
                    desc.add_define("SHADOW");
                }
                if light.light().is_negative() && desc.blend_mode == BlendMode::Add {
                    desc.blend_mode = BlendMode::Subtract;
                }
            }
        }
        if ctx.num_vertex_lights > 0 {
            desc.add_define(format!("NUMVERTEXLIGHTS={}", ctx.num_vertex_lights));
        }

        desc.normalize();
        self.factory.create_pipeline_state(&desc)
    }

    fn create_light_volume_pipeline_state(
        &self,
        light: &SceneLight,
        geometry: LightGeometry,
        camera: &Camera,
    ) -> Option<PipelineStateHandle> {
        let settings = *self.settings.read();
        let source = light.light();
        let (cull_mode, depth_compare) = match source.light_type {
            LightType::Directional => (CullMode::None, DepthCompare::Always),
            // Inside the volume only back faces are in front of the camera
            LightType::Point | LightType::Spot if source.contains_point(camera.position()) => {
                (CullMode::Front, DepthCompare::GreaterEqual)
            }
            LightType::Point | LightType::Spot => (CullMode::Back, DepthCompare::LessEqual),
        };

        let mut desc = PipelineStateDesc {
            pass_name: "lightvolume".to_owned(),
            blend_mode: if source.is_negative() {
                BlendMode::Subtract
            } else {
                BlendMode::Add
            },
            cull_mode,
            depth_write: false,
            depth_compare,
            light_geometry: Some(geometry),
            ..Default::default()
        };
        desc.add_define("PASS_LIGHTVOLUME");
        desc.add_define(source.light_type.define());
        if light.shadow_map().is_some() {
            desc.add_define("SHADOW");
        }
        if settings.gamma_correction {
            desc.add_define("GAMMA_CORRECTION");
        }
        desc.normalize();
        self.factory.create_pipeline_state(&desc)
    }
}

// ============================================================================
// RenderPipeline
// ============================================================================

pub struct RenderPipeline {
    settings: RenderPipelineSettings,
    applied_hash: Option<u64>,
    collector: SceneBatchCollector,
    callback: Arc<PipelineCallback>,

    base_pass: Arc<ForwardLightingScenePass>,
    alpha_pass: Arc<ForwardLightingScenePass>,
    deferred_pass: Arc<UnlitScenePass>,
    shadow_pass: Arc<ShadowScenePass>,

    frame_number: u64,
    visible_drawables: Vec<Arc<dyn Drawable>>,
}

impl RenderPipeline {
    pub fn new(
        settings: RenderPipelineSettings,
        scheduler: Arc<dyn WorkScheduler>,
        factory: Arc<dyn PipelineStateFactory>,
    ) -> Result<Self> {
        settings.validate()?;
        crate::utils::interner::preload_pass_names();
        info!(
            "Render pipeline: {} shading, {} threads",
            if settings.deferred { "deferred" } else { "forward" },
            scheduler.thread_count()
        );

        Ok(Self {
            settings,
            applied_hash: None,
            collector: SceneBatchCollector::new(settings.collector, scheduler),
            callback: Arc::new(PipelineCallback::new(settings, factory)),
            base_pass: Arc::new(ForwardLightingScenePass::opaque("PASS_BASE")),
            alpha_pass: Arc::new(ForwardLightingScenePass::alpha("PASS_ALPHA")),
            deferred_pass: Arc::new(UnlitScenePass::new("PASS_DEFERRED", "deferred")),
            shadow_pass: Arc::new(ShadowScenePass::new("PASS_SHADOW", "shadow")),
            frame_number: 0,
            visible_drawables: Vec::new(),
        })
    }

    /// Replaces the settings. Pipeline caches are invalidated on the next
    /// frame if anything state-relevant changed.
    pub fn apply_settings(&mut self, settings: RenderPipelineSettings) -> Result<()> {
        settings.validate()?;
        self.settings = settings;
        self.collector.set_settings(settings.collector);
        self.callback.set_settings(settings);
        Ok(())
    }

    /// Collects all batches of one frame as seen from `camera`.
    pub fn render(&mut self, index: Arc<dyn SpatialIndex>, camera: &Camera, time_step: f32) -> FrameStats {
        self.frame_number += 1;

        let hash = self.settings.pipeline_hash();
        if self.applied_hash != Some(hash) {
            if self.applied_hash.is_some() {
                debug!("Pipeline settings changed; invalidating pipeline state caches");
            }
            self.applied_hash = Some(hash);
            self.invalidate_pipeline_state_caches();
        }

        self.callback.begin_frame(camera);

        self.visible_drawables.clear();
        index.collect_drawables(
            camera.frustum(),
            DrawableFlags::GEOMETRY | DrawableFlags::LIGHT,
            camera.view_mask,
            &mut self.visible_drawables,
        );

        self.collector.reset_passes();
        self.collector.set_shadow_pass(self.shadow_pass.clone());
        if self.settings.deferred {
            self.collector.add_scene_pass(self.deferred_pass.clone());
        } else {
            self.collector.add_scene_pass(self.base_pass.clone());
            self.collector.add_scene_pass(self.alpha_pass.clone());
        }

        let frame = FrameInfo {
            frame_number: self.frame_number,
            time_step,
            camera: camera.clone(),
        };
        let callback: Arc<dyn SceneBatchCollectorCallback> = self.callback.clone();
        self.collector.begin_frame(frame, index, callback);
        self.collector.process_visible_drawables(&self.visible_drawables);
        self.collector.process_visible_lights();
        self.collector.update_geometries();
        self.collector.collect_scene_batches();
        if self.settings.deferred {
            self.collector.collect_light_volume_batches();
        }

        let stats = self.frame_stats();
        debug!("{stats:?}");
        stats
    }

    fn frame_stats(&self) -> FrameStats {
        let scene_batches = if self.settings.deferred {
            self.deferred_pass.sorted_batches().len()
        } else {
            self.base_pass.sorted_base_batches().len()
                + self.base_pass.sorted_light_batches().len()
                + self.alpha_pass.sorted_batches().len()
        };
        let lights = self.collector.visible_lights();

        FrameStats {
            frame_number: self.frame_number,
            visible_drawables: self.visible_drawables.len(),
            visible_geometries: self.collector.visible_geometries().len(),
            visible_lights: lights.len(),
            shadowed_lights: lights.iter().filter(|light| light.shadow_map().is_some()).count(),
            scene_batches,
            shadow_batches: self.shadow_pass.batch_count(),
            light_volume_batches: self.collector.light_volume_batches().len(),
            shadow_map_pages: self.callback.shadow_map_page_count(),
        }
    }

    fn invalidate_pipeline_state_caches(&self) {
        // Inactive passes too, they may be wired again later
        self.base_pass.invalidate_pipeline_state_cache();
        self.alpha_pass.invalidate_pipeline_state_cache();
        self.deferred_pass.invalidate_pipeline_state_cache();
        self.shadow_pass.invalidate_pipeline_state_cache();
    }

    // ─── Accessors ─────────────────────────────────────────────────────

    pub fn settings(&self) -> &RenderPipelineSettings {
        &self.settings
    }

    pub fn collector(&self) -> &SceneBatchCollector {
        &self.collector
    }

    pub fn collector_mut(&mut self) -> &mut SceneBatchCollector {
        &mut self.collector
    }

    pub fn callback(&self) -> &Arc<PipelineCallback> {
        &self.callback
    }

    pub fn base_pass(&self) -> &Arc<ForwardLightingScenePass> {
        &self.base_pass
    }

    pub fn alpha_pass(&self) -> &Arc<ForwardLightingScenePass> {
        &self.alpha_pass
    }

    pub fn deferred_pass(&self) -> &Arc<UnlitScenePass> {
        &self.deferred_pass
    }

    pub fn shadow_pass(&self) -> &Arc<ShadowScenePass> {
        &self.shadow_pass
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Drawables inside the camera frustum in the last frame.
    pub fn visible_drawables(&self) -> &[Arc<dyn Drawable>] {
        &self.visible_drawables
    }
}
