//! Scene Batch Collector
//!
//! Turns the drawables visible from a camera into per-pass batch lists,
//! shadow caster batches and per-drawable light lists, once per frame.
//!
//! # Frame Phases
//!
//! | Phase                             | Threads            |
//! |-----------------------------------|--------------------|
//! | [`begin_frame`]                   | invoking thread    |
//! | [`process_visible_drawables`]     | parallel per chunk |
//! | [`process_visible_lights`]        | parallel per light |
//! | [`update_geometries`]             | parallel, then main|
//! | [`collect_scene_batches`]         | invoking thread    |
//! | [`collect_light_volume_batches`]  | invoking thread    |
//!
//! Every parallel section ends with a barrier before the next step starts.
//! Per-drawable state is addressed by the drawable's dense index and only
//! one task touches a given index, so per-element data needs no locking.
//!
//! # Light Identity
//!
//! [`SceneLight`]s are cached across frames by light id together with a
//! weak reference. Entries whose light has been dropped are pruned at
//! [`begin_frame`].
//!
//! [`begin_frame`]: SceneBatchCollector::begin_frame
//! [`process_visible_drawables`]: SceneBatchCollector::process_visible_drawables
//! [`process_visible_lights`]: SceneBatchCollector::process_visible_lights
//! [`update_geometries`]: SceneBatchCollector::update_geometries
//! [`collect_scene_batches`]: SceneBatchCollector::collect_scene_batches
//! [`collect_light_volume_batches`]: SceneBatchCollector::collect_light_volume_batches

pub mod batch;
pub mod callback;
pub mod drawable_data;
pub mod light_accumulator;
pub mod scene_light;
pub mod z_range;

use std::sync::{Arc, Weak};

use glam::{IVec2, Vec3};
use log::{debug, error, trace, warn};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

pub use batch::{BatchSortKey, LightGeometry, LightVolumeBatch, SceneBatch, ShadowBatch};
pub use callback::SceneBatchCollectorCallback;
pub use drawable_data::{DrawableTraits, SceneDrawableData};
pub use light_accumulator::{
    DrawableLightAccumulator, LightAccumulationContext, MAX_PIXEL_LIGHTS, MAX_VERTEX_LIGHTS,
    VertexLightCollection,
};
pub use scene_light::{LightShaderParameters, SceneLight, SceneLightProcessContext, ShadowSplit};
pub use z_range::{DrawableZRange, LARGE_EPSILON, LARGE_VALUE, SceneZRange, ZRangeEvaluator};

use crate::renderer::passes::{SceneBatchContext, ScenePass, ShadowScenePass};
use crate::renderer::work_queue::{Task, ThreadedVector, WorkScheduler, parallel_for_each};
use crate::resources::{BlendMode, Material, MaterialQuality, Pass, Technique};
use crate::scene::{
    Drawable, DrawableFlags, DrawableId, FrameInfo, Light, LightType, SourceBatch, SpatialIndex,
    UpdateGeometryType, ViewOverrideFlags,
};
use crate::settings::CollectorSettings;

/// Soft limit on registered scene passes.
pub const MAX_SCENE_PASSES: usize = 8;

struct FrameContext {
    info: FrameInfo,
    index: Arc<dyn SpatialIndex>,
    callback: Arc<dyn SceneBatchCollectorCallback>,
}

struct CachedSceneLight {
    light: Weak<Light>,
    /// `None` while the scene light is in this frame's visible list.
    scene_light: Option<SceneLight>,
}

/// Material used by source batches without one.
#[must_use]
pub fn default_material() -> Material {
    let technique = Technique::new("NoTexture")
        .with_pass(Pass::new("base"))
        .with_pass(Pass::new("litbase"))
        .with_pass(
            Pass::new("light")
                .with_blend_mode(BlendMode::Add)
                .with_depth_write(false),
        )
        .with_pass(Pass::new("shadow"))
        .with_pass(Pass::new("deferred"));
    Material::with_technique("Default", Arc::new(technique))
}

pub struct SceneBatchCollector {
    settings: CollectorSettings,
    scheduler: Arc<dyn WorkScheduler>,
    default_material: Arc<Material>,

    passes: Vec<Arc<dyn ScenePass>>,
    shadow_pass: Option<Arc<ShadowScenePass>>,
    pass_limit_warned: bool,

    frame: Option<FrameContext>,
    material_quality: MaterialQuality,
    thread_count: usize,

    // Per drawable index
    drawable_data: SceneDrawableData,
    accumulators: Vec<Mutex<DrawableLightAccumulator>>,

    scene_z_range: SceneZRange,
    visible_geometries_temp: ThreadedVector<Arc<dyn Drawable>>,
    visible_lights_temp: ThreadedVector<Arc<Light>>,
    casters_to_update: ThreadedVector<Arc<dyn Drawable>>,
    threaded_updates: ThreadedVector<Arc<dyn Drawable>>,
    main_thread_updates: ThreadedVector<Arc<dyn Drawable>>,

    visible_geometries: Vec<Arc<dyn Drawable>>,
    visible_lights: Vec<SceneLight>,
    main_light: Option<usize>,
    light_volume_batches: Vec<LightVolumeBatch>,

    light_cache: FxHashMap<DrawableId, CachedSceneLight>,
}

impl SceneBatchCollector {
    #[must_use]
    pub fn new(settings: CollectorSettings, scheduler: Arc<dyn WorkScheduler>) -> Self {
        let settings = settings.sanitized();
        let thread_count = scheduler.thread_count();
        Self {
            settings,
            scheduler,
            default_material: Arc::new(default_material()),
            passes: Vec::new(),
            shadow_pass: None,
            pass_limit_warned: false,
            frame: None,
            material_quality: settings.material_quality,
            thread_count,
            drawable_data: SceneDrawableData::default(),
            accumulators: Vec::new(),
            scene_z_range: SceneZRange::default(),
            visible_geometries_temp: ThreadedVector::new(),
            visible_lights_temp: ThreadedVector::new(),
            casters_to_update: ThreadedVector::new(),
            threaded_updates: ThreadedVector::new(),
            main_thread_updates: ThreadedVector::new(),
            visible_geometries: Vec::new(),
            visible_lights: Vec::new(),
            main_light: None,
            light_volume_batches: Vec::new(),
            light_cache: FxHashMap::default(),
        }
    }

    // ─── Configuration ─────────────────────────────────────────────────

    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: CollectorSettings) {
        self.settings = settings.sanitized();
    }

    pub fn set_max_pixel_lights(&mut self, max_pixel_lights: u32) {
        self.settings.max_pixel_lights = max_pixel_lights;
        self.settings = self.settings.sanitized();
    }

    pub fn default_material(&self) -> &Arc<Material> {
        &self.default_material
    }

    pub fn set_default_material(&mut self, material: Arc<Material>) {
        self.default_material = material;
    }

    pub fn reset_passes(&mut self) {
        self.passes.clear();
        self.shadow_pass = None;
    }

    pub fn set_shadow_pass(&mut self, shadow_pass: Arc<ShadowScenePass>) {
        self.shadow_pass = Some(shadow_pass);
    }

    /// Registers a scene pass. Passes beyond [`MAX_SCENE_PASSES`] are ignored.
    pub fn add_scene_pass(&mut self, pass: Arc<dyn ScenePass>) {
        if self.passes.len() >= MAX_SCENE_PASSES {
            if !self.pass_limit_warned {
                warn!(
                    "Scene pass limit of {MAX_SCENE_PASSES} reached; ignoring pass '{}'",
                    pass.name()
                );
                self.pass_limit_warned = true;
            }
            return;
        }
        self.passes.push(pass);
    }

    pub fn passes(&self) -> &[Arc<dyn ScenePass>] {
        &self.passes
    }

    pub fn shadow_pass(&self) -> Option<&Arc<ShadowScenePass>> {
        self.shadow_pass.as_ref()
    }

    pub fn invalidate_pipeline_state_cache(&self) {
        for pass in &self.passes {
            pass.invalidate_pipeline_state_cache();
        }
        if let Some(shadow_pass) = &self.shadow_pass {
            shadow_pass.invalidate_pipeline_state_cache();
        }
    }

    // ─── Phases ────────────────────────────────────────────────────────

    /// Resets all transient state for a new frame.
    pub fn begin_frame(
        &mut self,
        frame: FrameInfo,
        index: Arc<dyn SpatialIndex>,
        callback: Arc<dyn SceneBatchCollectorCallback>,
    ) {
        self.thread_count = self.scheduler.thread_count();
        self.material_quality = self.settings.material_quality;
        if frame
            .camera
            .view_override_flags
            .contains(ViewOverrideFlags::LOW_MATERIAL_QUALITY)
        {
            self.material_quality = MaterialQuality::Low;
        }

        let drawable_count = index.drawable_count();
        self.drawable_data.reset(drawable_count);
        self.accumulators.clear();
        self.accumulators
            .resize_with(drawable_count, || Mutex::new(DrawableLightAccumulator::default()));

        let thread_count = self.thread_count;
        self.scene_z_range.clear(thread_count);
        self.visible_geometries_temp.clear(thread_count);
        self.visible_lights_temp.clear(thread_count);
        self.casters_to_update.clear(thread_count);
        self.threaded_updates.clear(thread_count);
        self.main_thread_updates.clear(thread_count);
        self.visible_geometries.clear();
        self.main_light = None;
        self.light_volume_batches.clear();
        // Previous scene index and callback
        self.frame = None;

        for pass in &self.passes {
            pass.begin_frame(thread_count);
        }
        if let Some(shadow_pass) = &self.shadow_pass {
            shadow_pass.begin_frame(thread_count);
        }

        // Scene lights go back to the cache for reuse
        for mut scene_light in self.visible_lights.drain(..) {
            scene_light.release_frame_results();
            if let Some(entry) = self.light_cache.get_mut(&scene_light.light().id()) {
                entry.scene_light = Some(scene_light);
            }
        }
        // A cached scene light holds one reference of its own
        self.light_cache.retain(|_, entry| {
            let own_references = usize::from(entry.scene_light.is_some());
            entry.light.strong_count() > own_references
        });

        trace!(
            "Frame {} begins with {drawable_count} drawables on {thread_count} threads",
            frame.frame_number
        );
        self.frame = Some(FrameContext {
            info: frame,
            index,
            callback,
        });
    }

    /// Classifies visible drawables into geometries and lights and feeds
    /// geometry source batches to the scene passes.
    pub fn process_visible_drawables(&mut self, drawables: &[Arc<dyn Drawable>]) {
        let Some(frame) = &self.frame else {
            error!("process_visible_drawables called before begin_frame");
            return;
        };

        let evaluator = ZRangeEvaluator::new(frame.info.camera.view_matrix());
        parallel_for_each(
            &*self.scheduler,
            drawables,
            self.settings.drawable_work_threshold,
            |thread_index, _, drawable| self.process_drawable(thread_index, drawable, frame, &evaluator),
        );

        self.visible_geometries = self.visible_geometries_temp.take_all();

        for light in self.visible_lights_temp.take_all() {
            let entry = self
                .light_cache
                .entry(light.id())
                .or_insert_with(|| CachedSceneLight {
                    light: Arc::downgrade(&light),
                    scene_light: Some(SceneLight::new(light.clone())),
                });
            if let Some(scene_light) = entry.scene_light.take() {
                self.visible_lights.push(scene_light);
            }
        }

        debug!(
            "Frame {}: {} visible geometries, {} visible lights",
            frame.info.frame_number,
            self.visible_geometries.len(),
            self.visible_lights.len()
        );
    }

    fn process_drawable(
        &self,
        thread_index: usize,
        drawable: &Arc<dyn Drawable>,
        frame: &FrameContext,
        evaluator: &ZRangeEvaluator,
    ) {
        let base = drawable.base();
        let Some(index) = self.drawable_data.check_index(base.index()) else {
            return;
        };
        let already_updated = self.drawable_data.mark_updated(index);
        debug_assert!(
            !already_updated,
            "drawable {} processed twice in frame {}",
            base.id(),
            frame.info.frame_number
        );
        if already_updated {
            error!("Drawable {} processed twice in one frame; skipping", base.id());
            return;
        }

        drawable.update_batches(&frame.info);
        drawable.mark_in_view(&frame.info);

        if base.draw_distance > 0.0 && base.distance() > base.draw_distance {
            trace!("Drawable {} beyond draw distance", base.id());
            return;
        }

        let flags = base.flags();
        if flags.contains(DrawableFlags::GEOMETRY) {
            let z_range = evaluator.evaluate(&base.world_bounding_box());
            if z_range.is_valid() {
                self.drawable_data.set_z_range(index, z_range);
                self.scene_z_range.accumulate(thread_index, z_range);
            } else {
                self.drawable_data.set_z_range(index, DrawableZRange::UNBOUNDED);
            }

            base.update_cached_zone(&*frame.index);
            self.drawable_data.add_traits(index, DrawableTraits::VISIBLE_GEOMETRY);
            self.visible_geometries_temp.push(thread_index, drawable.clone());
            queue_geometry_update(
                &self.threaded_updates,
                &self.main_thread_updates,
                thread_index,
                drawable,
            );

            // Copied so passes may read the batches again
            let source_batches: SmallVec<[SourceBatch; 1]> = base.batches().clone();
            let mut forward_lit = false;
            for (source_batch_index, source) in source_batches.iter().enumerate() {
                let material = source.material.as_ref().unwrap_or(&self.default_material);
                let Some(technique) = material.find_technique(base.distance(), self.material_quality) else {
                    trace!("No technique for material '{}'", material.name);
                    continue;
                };
                for pass in &self.passes {
                    forward_lit |= pass.add_source_batch(
                        thread_index,
                        drawable,
                        source_batch_index,
                        material,
                        technique,
                    );
                }
            }
            if forward_lit {
                self.drawable_data.add_traits(index, DrawableTraits::FORWARD_LIT);
            }

            if let Some(accumulator) = self.accumulators.get(index) {
                accumulator.lock().reset();
            }
        } else if flags.contains(DrawableFlags::LIGHT) {
            let Some(light) = drawable.clone().into_light() else {
                return;
            };
            if light.effective_color() == Vec3::ZERO || light.light_mask_effective() == 0 {
                trace!("Light {} contributes nothing", light.id());
                return;
            }
            self.visible_lights_temp.push(thread_index, light);
        }
    }

    /// Finds lit geometries and shadow casters, assigns shadow maps, collects
    /// shadow batches, selects the main light and accumulates forward lights.
    pub fn process_visible_lights(&mut self) {
        let Some(frame) = &self.frame else {
            error!("process_visible_lights called before begin_frame");
            return;
        };
        let callback = &*frame.callback;
        let camera = &frame.info.camera;

        let has_shadow_pass = self.shadow_pass.is_some();
        for scene_light in &mut self.visible_lights {
            let has_shadow = has_shadow_pass && callback.has_shadow(scene_light.light());
            scene_light.begin_frame(has_shadow);
        }

        let process_ctx = SceneLightProcessContext {
            frame: &frame.info,
            index: &*frame.index,
            scene_z_range: self.scene_z_range.get(),
            visible_geometries: &self.visible_geometries,
            drawable_data: &self.drawable_data,
            casters_to_update: &self.casters_to_update,
        };
        let tasks: Vec<Task<'_>> = self
            .visible_lights
            .iter_mut()
            .map(|scene_light| {
                let ctx = &process_ctx;
                Box::new(move |thread_index: usize| {
                    scene_light.update_lit_geometries_and_shadow_casters(thread_index, ctx);
                }) as Task<'_>
            })
            .collect();
        self.scheduler.run_tasks(tasks);

        for scene_light in &mut self.visible_lights {
            scene_light.finalize_shadow_map();
        }

        // Largest shadow maps first, then by descending id
        self.visible_lights.sort_by(|lhs, rhs| {
            let lhs_size = lhs.shadow_map_size().as_vec2().length();
            let rhs_size = rhs.shadow_map_size().as_vec2().length();
            rhs_size
                .total_cmp(&lhs_size)
                .then_with(|| rhs.light().id().cmp(&lhs.light().id()))
        });

        for scene_light in &mut self.visible_lights {
            let size = scene_light.shadow_map_size();
            if size != IVec2::ZERO {
                let region = callback.get_temporary_shadow_map(size);
                if region.is_none() {
                    warn!(
                        "No shadow map of size {size} for light {}; rendering unshadowed",
                        scene_light.light().id()
                    );
                }
                scene_light.set_shadow_map(region);
            }
            scene_light.finalize_shader_parameters(camera);
        }

        let casters = self.casters_to_update.take_all();
        parallel_for_each(
            &*self.scheduler,
            &casters,
            self.settings.shadow_caster_work_threshold,
            |thread_index, _, caster| {
                caster.update_batches(&frame.info);
                caster.mark_in_view(&frame.info);
                caster.base().update_cached_zone(&*frame.index);
                queue_geometry_update(
                    &self.threaded_updates,
                    &self.main_thread_updates,
                    thread_index,
                    caster,
                );
            },
        );

        if let Some(shadow_pass) = &self.shadow_pass {
            let quality = self.material_quality;
            let default_material = &self.default_material;
            let mut tasks: Vec<Task<'_>> = Vec::new();
            for scene_light in &self.visible_lights {
                for split_index in 0..scene_light.num_splits() {
                    tasks.push(Box::new(move |thread_index: usize| {
                        shadow_pass.collect_shadow_batches(
                            thread_index,
                            quality,
                            scene_light,
                            split_index,
                            default_material,
                        );
                    }));
                }
            }
            self.scheduler.run_tasks(tasks);
            shadow_pass.finalize_shadow_batches(&self.visible_lights, camera, callback);
        }

        self.main_light = find_main_light(&self.visible_lights);

        for light_index in 0..self.visible_lights.len() {
            self.accumulate_forward_lighting(light_index);
        }

        debug!(
            "Frame {}: {} shadow casters updated, main light {:?}",
            frame.info.frame_number,
            casters.len(),
            self.main_light
        );
    }

    fn accumulate_forward_lighting(&self, light_index: usize) {
        let Some(scene_light) = self.visible_lights.get(light_index) else {
            return;
        };
        let light = scene_light.light();
        let ctx = LightAccumulationContext {
            max_pixel_lights: self.settings.max_pixel_lights,
            light_importance: light.importance,
            light_index,
        };
        let intensity_penalty = 1.0 / light.intensity_divisor;
        let is_main_light = self.main_light == Some(light_index);

        parallel_for_each(
            &*self.scheduler,
            scene_light.lit_geometries(),
            self.settings.lit_geometries_work_threshold,
            |_, _, geometry| {
                let Some(index) = self.drawable_data.check_index(geometry.base().index()) else {
                    return;
                };
                let penalty = if is_main_light {
                    -LARGE_VALUE
                } else {
                    light.distance_to(&**geometry).max(LARGE_EPSILON) * intensity_penalty
                };
                if let Some(accumulator) = self.accumulators.get(index) {
                    accumulator.lock().accumulate_light(&ctx, penalty);
                }
            },
        );
    }

    /// Runs deferred geometry updates: worker-safe ones in parallel, then
    /// main-thread ones on the invoking thread.
    pub fn update_geometries(&self) {
        let Some(frame) = &self.frame else {
            error!("update_geometries called before begin_frame");
            return;
        };

        let threaded = self.threaded_updates.take_all();
        parallel_for_each(&*self.scheduler, &threaded, 1, |_, _, drawable| {
            drawable.update_geometry(&frame.info);
        });

        let main_thread = self.main_thread_updates.take_all();
        for drawable in &main_thread {
            drawable.update_geometry(&frame.info);
        }

        trace!(
            "Updated {} threaded and {} main thread geometries",
            threaded.len(),
            main_thread.len()
        );
    }

    /// Builds and sorts the final batches of every scene pass.
    pub fn collect_scene_batches(&self) {
        let Some(frame) = &self.frame else {
            error!("collect_scene_batches called before begin_frame");
            return;
        };

        let ctx = SceneBatchContext {
            main_light: self.main_light,
            lights: &self.visible_lights,
            accumulators: &self.accumulators,
            drawable_data: &self.drawable_data,
            camera: &frame.info.camera,
            callback: &*frame.callback,
        };
        for pass in &self.passes {
            pass.collect_scene_batches(&ctx);
            pass.sort_scene_batches();
            debug!("Pass '{}': {} batches", pass.name(), pass.sorted_batches().len());
        }
    }

    /// Builds one deferred light volume batch per visible light.
    pub fn collect_light_volume_batches(&mut self) {
        let Some(frame) = &self.frame else {
            error!("collect_light_volume_batches called before begin_frame");
            return;
        };

        self.light_volume_batches.clear();
        for (light_index, scene_light) in self.visible_lights.iter().enumerate() {
            let geometry = LightGeometry::for_light_type(scene_light.light().light_type);
            let pipeline_state = frame.callback.create_light_volume_pipeline_state(
                scene_light,
                geometry,
                &frame.info.camera,
            );
            if pipeline_state.is_none() {
                warn!("No light volume pipeline state for light {}", scene_light.light().id());
            }
            self.light_volume_batches.push(LightVolumeBatch {
                light_index,
                geometry,
                pipeline_state,
            });
        }
    }

    // ─── Results ───────────────────────────────────────────────────────

    pub fn frame_info(&self) -> Option<&FrameInfo> {
        self.frame.as_ref().map(|frame| &frame.info)
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Material quality of the current frame, after view overrides.
    pub fn material_quality(&self) -> MaterialQuality {
        self.material_quality
    }

    pub fn visible_geometries(&self) -> &[Arc<dyn Drawable>] {
        &self.visible_geometries
    }

    /// Visible lights, sorted by shadow map size.
    pub fn visible_lights(&self) -> &[SceneLight] {
        &self.visible_lights
    }

    pub fn visible_light(&self, light_index: usize) -> Option<&SceneLight> {
        self.visible_lights.get(light_index)
    }

    pub fn main_light_index(&self) -> Option<usize> {
        self.main_light
    }

    pub fn main_light(&self) -> Option<&SceneLight> {
        self.main_light.and_then(|i| self.visible_lights.get(i))
    }

    pub fn light_volume_batches(&self) -> &[LightVolumeBatch] {
        &self.light_volume_batches
    }

    pub fn scene_z_range(&self) -> DrawableZRange {
        self.scene_z_range.get()
    }

    pub fn drawable_data(&self) -> &SceneDrawableData {
        &self.drawable_data
    }

    pub fn light_accumulator(&self, drawable_index: u32) -> Option<DrawableLightAccumulator> {
        self.accumulators
            .get(drawable_index as usize)
            .map(|accumulator| *accumulator.lock())
    }

    /// Vertex lights of a drawable as visible light indices.
    pub fn vertex_light_indices(&self, drawable_index: u32) -> VertexLightCollection {
        self.light_accumulator(drawable_index)
            .map_or([None; MAX_VERTEX_LIGHTS], |accumulator| accumulator.vertex_lights())
    }

    pub fn vertex_lights(&self, drawable_index: u32) -> [Option<&SceneLight>; MAX_VERTEX_LIGHTS] {
        self.vertex_light_indices(drawable_index)
            .map(|index| index.and_then(|i| self.visible_lights.get(i)))
    }

    /// Pixel lights of a drawable as visible light indices, best first.
    pub fn pixel_light_indices(&self, drawable_index: u32) -> SmallVec<[usize; MAX_PIXEL_LIGHTS]> {
        self.light_accumulator(drawable_index)
            .map(|accumulator| {
                accumulator
                    .pixel_lights()
                    .iter()
                    .map(|light| light.light_index)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn queue_geometry_update(
    threaded: &ThreadedVector<Arc<dyn Drawable>>,
    main_thread: &ThreadedVector<Arc<dyn Drawable>>,
    thread_index: usize,
    drawable: &Arc<dyn Drawable>,
) {
    match drawable.update_geometry_type() {
        UpdateGeometryType::None => {}
        UpdateGeometryType::MainThread => main_thread.push(thread_index, drawable.clone()),
        UpdateGeometryType::WorkerThread => threaded.push(thread_index, drawable.clone()),
    }
}

/// Brightest directional light by `1 / intensity_divisor`; the first wins ties.
fn find_main_light(lights: &[SceneLight]) -> Option<usize> {
    let mut best_score = 0.0;
    let mut main_light = None;
    for (index, scene_light) in lights.iter().enumerate() {
        let light = scene_light.light();
        if light.light_type != LightType::Directional {
            continue;
        }
        let score = 1.0 / light.intensity_divisor;
        if score > best_score {
            best_score = score;
            main_light = Some(index);
        }
    }
    main_light
}
