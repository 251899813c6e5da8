//! Scene Passes
//!
//! A scene pass is a named output bucket of the collector. During visibility
//! processing every resolved source batch is offered to every registered
//! pass; once lighting has been accumulated the passes turn what they kept
//! into final, sorted [`SceneBatch`] lists.
//!
//! - [`ForwardLightingScenePass`]: opaque or alpha forward rendering with
//!   per-pixel light batches
//! - [`UnlitScenePass`]: a single technique pass without lights, e.g. the
//!   deferred G-buffer pass
//! - [`ShadowScenePass`]: shadow caster batches per light split
//!
//! # Design
//! Passes are shared (`Arc<dyn ScenePass>`) between the frame driver, which
//! reads their output, and the collector, which feeds them from worker
//! threads. All methods therefore take `&self`; per-thread intake goes into
//! a [`ThreadedVector`] indexed by the worker's thread index.
//!
//! [`ThreadedVector`]: crate::renderer::work_queue::ThreadedVector

mod forward;
mod shadow;
mod unlit;

use std::sync::Arc;

use log::warn;
use parking_lot::{Mutex, RwLockReadGuard};

pub use forward::{ForwardLightingScenePass, ForwardPassKind};
pub use shadow::ShadowScenePass;
pub use unlit::UnlitScenePass;

use crate::renderer::collector::batch::{BatchSortKey, SceneBatch};
use crate::renderer::collector::callback::SceneBatchCollectorCallback;
use crate::renderer::collector::drawable_data::SceneDrawableData;
use crate::renderer::collector::light_accumulator::DrawableLightAccumulator;
use crate::renderer::collector::scene_light::SceneLight;
use crate::renderer::pipeline_state::{
    ScenePipelineStateCache, ScenePipelineStateContext, ScenePipelineStateKey,
};
use crate::resources::{Geometry, GeometryType, Material, Pass, Technique};
use crate::scene::{Camera, Drawable};

/// Everything a pass needs to turn its intake into final batches.
pub struct SceneBatchContext<'a> {
    pub main_light: Option<usize>,
    pub lights: &'a [SceneLight],
    /// Indexed by drawable index.
    pub accumulators: &'a [Mutex<DrawableLightAccumulator>],
    pub drawable_data: &'a SceneDrawableData,
    pub camera: &'a Camera,
    pub callback: &'a dyn SceneBatchCollectorCallback,
}

impl SceneBatchContext<'_> {
    /// Copy of the light accumulator of a drawable.
    pub fn accumulator(&self, drawable_index: u32) -> DrawableLightAccumulator {
        self.accumulators
            .get(drawable_index as usize)
            .map(|acc| *acc.lock())
            .unwrap_or_default()
    }
}

/// Interface of a collector output bucket.
pub trait ScenePass: Send + Sync {
    fn name(&self) -> &str;

    /// Clears last frame's intake and output.
    fn begin_frame(&self, thread_count: usize);

    /// Offers a resolved source batch. Returns `true` if the pass needs
    /// per-light data for the drawable.
    fn add_source_batch(
        &self,
        thread_index: usize,
        drawable: &Arc<dyn Drawable>,
        source_batch_index: usize,
        material: &Arc<Material>,
        technique: &Technique,
    ) -> bool;

    fn collect_scene_batches(&self, ctx: &SceneBatchContext<'_>);

    fn sort_scene_batches(&self);

    fn invalidate_pipeline_state_cache(&self);

    /// Main sorted batch list of the pass.
    fn sorted_batches(&self) -> RwLockReadGuard<'_, Vec<SceneBatch>>;
}

/// Source batch accepted by a pass, waiting for lights.
#[derive(Debug, Clone)]
pub(crate) struct PendingBatch {
    pub drawable: Arc<dyn Drawable>,
    pub source_batch_index: usize,
    pub geometry: Arc<Geometry>,
    pub geometry_type: GeometryType,
    pub material: Arc<Material>,
}

impl PendingBatch {
    /// Snapshot of source batch `source_batch_index` of `drawable`.
    pub fn new(
        drawable: &Arc<dyn Drawable>,
        source_batch_index: usize,
        material: &Arc<Material>,
    ) -> Option<Self> {
        let batches = drawable.base().batches();
        let source = batches.get(source_batch_index)?;
        Some(Self {
            drawable: drawable.clone(),
            source_batch_index,
            geometry: source.geometry.clone(),
            geometry_type: source.geometry_type,
            material: material.clone(),
        })
    }
}

/// Resolves the pipeline state of a batch and builds it.
///
/// `back_to_front` selects a pure distance sort key. Returns `None` if the
/// callback could not create a pipeline state.
pub(crate) fn create_scene_batch(
    ctx: &SceneBatchContext<'_>,
    cache: &ScenePipelineStateCache,
    pending: &PendingBatch,
    pass: &Arc<Pass>,
    light_index: Option<usize>,
    num_vertex_lights: usize,
    back_to_front: bool,
) -> Option<SceneBatch> {
    let light = light_index.and_then(|i| ctx.lights.get(i));
    let base = pending.drawable.base();
    let key = ScenePipelineStateKey {
        drawable_hash: base.pipeline_state_hash(),
        geometry_id: pending.geometry.id(),
        material_id: pending.material.id(),
        pass: pass.name(),
        light_hash: light.map_or(0, SceneLight::pipeline_hash),
        num_vertex_lights: num_vertex_lights as u8,
        geometry_type: pending.geometry_type,
    };

    let pipeline_state = cache.get_or_create(key, || {
        let state_ctx = ScenePipelineStateContext {
            drawable: &*pending.drawable,
            geometry: &pending.geometry,
            geometry_type: pending.geometry_type,
            material: &pending.material,
            pass,
            light,
            num_vertex_lights,
            shadow_pass: false,
            camera: ctx.camera,
        };
        ctx.callback.create_pipeline_state(&key, &state_ctx)
    });
    let Some(pipeline_state) = pipeline_state else {
        warn!(
            "No pipeline state for pass '{}' of material '{}'; batch skipped",
            pass.name_str(),
            pending.material.name
        );
        return None;
    };

    let distance = base.distance();
    let sort_key = if back_to_front {
        BatchSortKey::transparent(distance)
    } else {
        BatchSortKey::opaque(pipeline_state, material_sort_index(&pending.material), distance)
    };

    Some(SceneBatch {
        drawable: pending.drawable.clone(),
        drawable_index: base.index(),
        source_batch_index: pending.source_batch_index,
        geometry: pending.geometry.clone(),
        geometry_type: pending.geometry_type,
        material: pending.material.clone(),
        pass: pass.clone(),
        light_index,
        pipeline_state,
        distance,
        sort_key,
    })
}

#[inline]
pub(crate) fn material_sort_index(material: &Material) -> u32 {
    (material.id() & 0xF_FFFF) as u32
}

/// State-first ordering: pipeline and material, then geometry, then front-to-back.
pub(crate) fn sort_by_state(batches: &mut [SceneBatch]) {
    batches.sort_by_key(|b| (b.sort_key.0 >> 30, b.geometry.id(), b.sort_key));
}

/// Back-to-front ordering. Stable, so light batches stay behind their base batch.
pub(crate) fn sort_back_to_front(batches: &mut [SceneBatch]) {
    batches.sort_by_key(|b| b.sort_key);
}
