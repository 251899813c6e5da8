use std::sync::Arc;

use log::trace;
use parking_lot::{RwLock, RwLockReadGuard};
use smallvec::SmallVec;

use super::{
    PendingBatch, SceneBatchContext, ScenePass, create_scene_batch, sort_back_to_front, sort_by_state,
};
use crate::renderer::collector::batch::SceneBatch;
use crate::renderer::collector::light_accumulator::MAX_PIXEL_LIGHTS;
use crate::renderer::pipeline_state::ScenePipelineStateCache;
use crate::renderer::work_queue::ThreadedVector;
use crate::resources::{Material, Pass, Technique};
use crate::scene::Drawable;
use crate::utils::interner::{self, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardPassKind {
    /// State-sorted, light batches kept in their own list.
    Opaque,
    /// Back-to-front, light batches interleaved with base batches.
    Alpha,
}

#[derive(Debug, Clone)]
struct ForwardIntake {
    batch: PendingBatch,
    unlit: Option<Arc<Pass>>,
    lit_base: Option<Arc<Pass>>,
    light: Option<Arc<Pass>>,
}

/// Forward lighting pass with unlit base, lit base and additive light
/// technique passes.
///
/// | Pixel lights | Batches                                              |
/// |--------------|------------------------------------------------------|
/// | none         | unlit base (or lit base without light)               |
/// | first        | lit base, or unlit base plus a light batch           |
/// | others       | one additive light batch each                        |
pub struct ForwardLightingScenePass {
    name: String,
    kind: ForwardPassKind,
    unlit_pass: Symbol,
    lit_base_pass: Symbol,
    light_pass: Symbol,

    intake: ThreadedVector<ForwardIntake>,
    base_batches: RwLock<Vec<SceneBatch>>,
    light_batches: RwLock<Vec<SceneBatch>>,
    pipeline_cache: ScenePipelineStateCache,
}

impl ForwardLightingScenePass {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: ForwardPassKind,
        unlit_pass: &str,
        lit_base_pass: &str,
        light_pass: &str,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            unlit_pass: interner::intern(unlit_pass),
            lit_base_pass: interner::intern(lit_base_pass),
            light_pass: interner::intern(light_pass),
            intake: ThreadedVector::new(),
            base_batches: RwLock::new(Vec::new()),
            light_batches: RwLock::new(Vec::new()),
            pipeline_cache: ScenePipelineStateCache::new(),
        }
    }

    /// Opaque pass over `base` / `litbase` / `light`.
    #[must_use]
    pub fn opaque(name: impl Into<String>) -> Self {
        Self::new(name, ForwardPassKind::Opaque, "base", "litbase", "light")
    }

    /// Alpha pass over `alpha` / `alpha` / `litalpha`.
    #[must_use]
    pub fn alpha(name: impl Into<String>) -> Self {
        Self::new(name, ForwardPassKind::Alpha, "alpha", "alpha", "litalpha")
    }

    pub fn kind(&self) -> ForwardPassKind {
        self.kind
    }

    /// Base batches: unlit and lit base, sorted.
    pub fn sorted_base_batches(&self) -> RwLockReadGuard<'_, Vec<SceneBatch>> {
        self.base_batches.read()
    }

    /// Additive light batches of the opaque flavour, sorted by light.
    /// Always empty for the alpha flavour.
    pub fn sorted_light_batches(&self) -> RwLockReadGuard<'_, Vec<SceneBatch>> {
        self.light_batches.read()
    }

    pub fn pipeline_cache(&self) -> &ScenePipelineStateCache {
        &self.pipeline_cache
    }

    fn collect_intake(
        &self,
        ctx: &SceneBatchContext<'_>,
        intake: &ForwardIntake,
        base_out: &mut Vec<SceneBatch>,
        light_out: &mut Vec<SceneBatch>,
    ) {
        let accumulator = ctx.accumulator(intake.batch.drawable.base().index());
        let pixel_lights: SmallVec<[usize; MAX_PIXEL_LIGHTS]> = accumulator
            .pixel_lights()
            .iter()
            .map(|light| light.light_index)
            .collect();
        let num_vertex_lights = accumulator.num_vertex_lights();
        let back_to_front = self.kind == ForwardPassKind::Alpha;
        let build = |pass: &Arc<Pass>, light_index: Option<usize>, num_vertex_lights: usize| {
            create_scene_batch(
                ctx,
                &self.pipeline_cache,
                &intake.batch,
                pass,
                light_index,
                num_vertex_lights,
                back_to_front,
            )
        };

        let Some((&first, others)) = pixel_lights.split_first() else {
            if let Some(pass) = intake.unlit.as_ref().or(intake.lit_base.as_ref()) {
                base_out.extend(build(pass, None, num_vertex_lights));
            }
            return;
        };

        if let Some(lit_base) = &intake.lit_base {
            base_out.extend(build(lit_base, Some(first), num_vertex_lights));
        } else {
            if let Some(unlit) = &intake.unlit {
                base_out.extend(build(unlit, None, num_vertex_lights));
            }
            if let Some(light) = &intake.light {
                light_out.extend(build(light, Some(first), 0));
            }
        }

        if let Some(light) = &intake.light {
            for &light_index in others {
                light_out.extend(build(light, Some(light_index), 0));
            }
        }
    }
}

impl ScenePass for ForwardLightingScenePass {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin_frame(&self, thread_count: usize) {
        self.intake.clear(thread_count);
        self.base_batches.write().clear();
        self.light_batches.write().clear();
    }

    fn add_source_batch(
        &self,
        thread_index: usize,
        drawable: &Arc<dyn Drawable>,
        source_batch_index: usize,
        material: &Arc<Material>,
        technique: &Technique,
    ) -> bool {
        let unlit = technique.pass(self.unlit_pass).cloned();
        let lit_base = technique.pass(self.lit_base_pass).cloned();
        let light = technique.pass(self.light_pass).cloned();
        if unlit.is_none() && lit_base.is_none() && light.is_none() {
            return false;
        }
        let Some(batch) = PendingBatch::new(drawable, source_batch_index, material) else {
            return false;
        };

        let is_lit = lit_base.is_some() || light.is_some();
        self.intake.push(
            thread_index,
            ForwardIntake {
                batch,
                unlit,
                lit_base,
                light,
            },
        );
        is_lit
    }

    fn collect_scene_batches(&self, ctx: &SceneBatchContext<'_>) {
        let intake = self.intake.take_all();
        let mut base_out = Vec::with_capacity(intake.len());
        let mut light_out = Vec::new();
        for item in &intake {
            self.collect_intake(ctx, item, &mut base_out, &mut light_out);
        }

        trace!(
            "Pass '{}' collected {} base and {} light batches",
            self.name,
            base_out.len(),
            light_out.len()
        );

        match self.kind {
            ForwardPassKind::Opaque => {
                *self.base_batches.write() = base_out;
                *self.light_batches.write() = light_out;
            }
            ForwardPassKind::Alpha => {
                base_out.append(&mut light_out);
                *self.base_batches.write() = base_out;
                self.light_batches.write().clear();
            }
        }
    }

    fn sort_scene_batches(&self) {
        match self.kind {
            ForwardPassKind::Opaque => {
                sort_by_state(&mut self.base_batches.write());
                self.light_batches
                    .write()
                    .sort_by_key(|b| (b.light_index, b.sort_key.0 >> 30, b.geometry.id(), b.sort_key));
            }
            // Light batches were appended after all base batches
            ForwardPassKind::Alpha => sort_back_to_front(&mut self.base_batches.write()),
        }
    }

    fn invalidate_pipeline_state_cache(&self) {
        self.pipeline_cache.invalidate();
    }

    fn sorted_batches(&self) -> RwLockReadGuard<'_, Vec<SceneBatch>> {
        self.base_batches.read()
    }
}
