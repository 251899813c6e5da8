use std::sync::Arc;

use log::{trace, warn};
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use rustc_hash::FxHashMap;

use super::material_sort_index;
use crate::renderer::collector::batch::{BatchSortKey, ShadowBatch};
use crate::renderer::collector::callback::SceneBatchCollectorCallback;
use crate::renderer::collector::scene_light::SceneLight;
use crate::renderer::pipeline_state::{
    ScenePipelineStateCache, ScenePipelineStateContext, ScenePipelineStateKey,
};
use crate::renderer::work_queue::ThreadedVector;
use crate::resources::{Material, MaterialQuality};
use crate::scene::{Camera, DrawableId};
use crate::utils::interner::{self, Symbol};

type SplitKey = (DrawableId, usize);

/// Collects shadow caster batches for every light split.
///
/// Collection runs in parallel, one task per split, into per-thread buffers.
/// Finalization (merge, pipeline states and sorting) runs once on the
/// invoking thread.
pub struct ShadowScenePass {
    name: String,
    pass: Symbol,
    collected: ThreadedVector<(SplitKey, Vec<ShadowBatch>)>,
    batches: RwLock<FxHashMap<SplitKey, Vec<ShadowBatch>>>,
    pipeline_cache: ScenePipelineStateCache,
}

impl ShadowScenePass {
    #[must_use]
    pub fn new(name: impl Into<String>, pass: &str) -> Self {
        Self {
            name: name.into(),
            pass: interner::intern(pass),
            collected: ThreadedVector::new(),
            batches: RwLock::new(FxHashMap::default()),
            pipeline_cache: ScenePipelineStateCache::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn begin_frame(&self, thread_count: usize) {
        self.collected.clear(thread_count);
        self.batches.write().clear();
    }

    pub fn invalidate_pipeline_state_cache(&self) {
        self.pipeline_cache.invalidate();
    }

    pub fn pipeline_cache(&self) -> &ScenePipelineStateCache {
        &self.pipeline_cache
    }

    /// Resolves techniques for the casters of one split.
    pub fn collect_shadow_batches(
        &self,
        thread_index: usize,
        quality: MaterialQuality,
        light: &SceneLight,
        split_index: usize,
        default_material: &Arc<Material>,
    ) {
        let Some(split) = light.split(split_index) else {
            return;
        };

        let mut out = Vec::new();
        for caster in &split.casters {
            let distance = light.light().distance_to(&**caster);
            let base = caster.base();
            for (source_batch_index, source) in base.batches().iter().enumerate() {
                let material = source.material.as_ref().unwrap_or(default_material);
                let Some(technique) = material.find_technique(base.distance(), quality) else {
                    continue;
                };
                let Some(pass) = technique.pass(self.pass) else {
                    continue;
                };
                out.push(ShadowBatch {
                    drawable: caster.clone(),
                    source_batch_index,
                    geometry: source.geometry.clone(),
                    geometry_type: source.geometry_type,
                    material: material.clone(),
                    pass: pass.clone(),
                    pipeline_state: None,
                    distance,
                    sort_key: BatchSortKey::default(),
                });
            }
        }

        if !out.is_empty() {
            self.collected
                .push(thread_index, ((light.light().id(), split_index), out));
        }
    }

    /// Creates pipeline states and sorts every split front-to-back per state.
    /// Batches without a pipeline state are dropped.
    pub fn finalize_shadow_batches(
        &self,
        lights: &[SceneLight],
        camera: &Camera,
        callback: &dyn SceneBatchCollectorCallback,
    ) {
        let lights_by_id: FxHashMap<DrawableId, &SceneLight> =
            lights.iter().map(|light| (light.light().id(), light)).collect();

        let mut all = self.batches.write();
        all.extend(self.collected.take_all());
        for ((light_id, split_index), batches) in all.iter_mut() {
            let Some(light) = lights_by_id.get(light_id).copied() else {
                batches.clear();
                continue;
            };

            for batch in batches.iter_mut() {
                let key = ScenePipelineStateKey {
                    drawable_hash: batch.drawable.base().pipeline_state_hash(),
                    geometry_id: batch.geometry.id(),
                    material_id: batch.material.id(),
                    pass: self.pass,
                    light_hash: light.pipeline_hash(),
                    num_vertex_lights: 0,
                    geometry_type: batch.geometry_type,
                };
                batch.pipeline_state = self.pipeline_cache.get_or_create(key, || {
                    let ctx = ScenePipelineStateContext {
                        drawable: &*batch.drawable,
                        geometry: &batch.geometry,
                        geometry_type: batch.geometry_type,
                        material: &batch.material,
                        pass: &batch.pass,
                        light: Some(light),
                        num_vertex_lights: 0,
                        shadow_pass: true,
                        camera,
                    };
                    callback.create_pipeline_state(&key, &ctx)
                });
                if let Some(state) = batch.pipeline_state {
                    batch.sort_key =
                        BatchSortKey::opaque(state, material_sort_index(&batch.material), batch.distance);
                }
            }

            let before = batches.len();
            batches.retain(|batch| batch.pipeline_state.is_some());
            if batches.len() < before {
                warn!(
                    "Dropped {} shadow batches of light {light_id} split {split_index} without pipeline state",
                    before - batches.len()
                );
            }
            batches.sort_by_key(|batch| batch.sort_key);
        }

        trace!("Finalized shadow batches for {} splits", all.len());
    }

    /// Sorted batches of one split; empty if the split has none.
    pub fn sorted_shadow_batches(
        &self,
        light_id: DrawableId,
        split_index: usize,
    ) -> MappedRwLockReadGuard<'_, [ShadowBatch]> {
        RwLockReadGuard::map(self.batches.read(), |batches| {
            batches
                .get(&(light_id, split_index))
                .map_or(&[][..], Vec::as_slice)
        })
    }

    /// Total shadow batch count over all splits.
    pub fn batch_count(&self) -> usize {
        self.batches.read().values().map(Vec::len).sum()
    }
}
