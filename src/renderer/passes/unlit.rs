use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};

use super::{PendingBatch, SceneBatchContext, ScenePass, create_scene_batch, sort_back_to_front, sort_by_state};
use crate::renderer::collector::batch::SceneBatch;
use crate::renderer::pipeline_state::ScenePipelineStateCache;
use crate::renderer::work_queue::ThreadedVector;
use crate::resources::{Material, Pass, Technique};
use crate::scene::Drawable;
use crate::utils::interner::{self, Symbol};

/// Pass that draws one technique pass without per-pixel lights.
pub struct UnlitScenePass {
    name: String,
    pass: Symbol,
    intake: ThreadedVector<(PendingBatch, Arc<Pass>)>,
    batches: RwLock<Vec<SceneBatch>>,
    pipeline_cache: ScenePipelineStateCache,
}

impl UnlitScenePass {
    #[must_use]
    pub fn new(name: impl Into<String>, pass: &str) -> Self {
        Self {
            name: name.into(),
            pass: interner::intern(pass),
            intake: ThreadedVector::new(),
            batches: RwLock::new(Vec::new()),
            pipeline_cache: ScenePipelineStateCache::new(),
        }
    }

    pub fn pipeline_cache(&self) -> &ScenePipelineStateCache {
        &self.pipeline_cache
    }
}

impl ScenePass for UnlitScenePass {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin_frame(&self, thread_count: usize) {
        self.intake.clear(thread_count);
        self.batches.write().clear();
    }

    fn add_source_batch(
        &self,
        thread_index: usize,
        drawable: &Arc<dyn Drawable>,
        source_batch_index: usize,
        material: &Arc<Material>,
        technique: &Technique,
    ) -> bool {
        let Some(pass) = technique.pass(self.pass) else {
            return false;
        };
        if let Some(batch) = PendingBatch::new(drawable, source_batch_index, material) {
            self.intake.push(thread_index, (batch, pass.clone()));
        }
        false
    }

    fn collect_scene_batches(&self, ctx: &SceneBatchContext<'_>) {
        let batches = self
            .intake
            .take_all()
            .iter()
            .filter_map(|(batch, pass)| {
                let back_to_front = pass.blend_mode.is_transparent();
                create_scene_batch(ctx, &self.pipeline_cache, batch, pass, None, 0, back_to_front)
            })
            .collect();
        *self.batches.write() = batches;
    }

    fn sort_scene_batches(&self) {
        let mut batches = self.batches.write();
        if batches.first().is_some_and(|b| b.pass.blend_mode.is_transparent()) {
            sort_back_to_front(&mut batches);
        } else {
            sort_by_state(&mut batches);
        }
    }

    fn invalidate_pipeline_state_cache(&self) {
        self.pipeline_cache.invalidate();
    }

    fn sorted_batches(&self) -> RwLockReadGuard<'_, Vec<SceneBatch>> {
        self.batches.read()
    }
}
