use glam::IVec2;

use super::batch::LightGeometry;
use super::scene_light::SceneLight;
use crate::renderer::pipeline_state::{
    PipelineStateHandle, ScenePipelineStateContext, ScenePipelineStateKey,
};
use crate::renderer::shadow_map::ShadowMapRegion;
use crate::scene::{Camera, Light};

/// Hooks the frame driver provides to the collector and its passes.
///
/// Called from worker threads during pipeline state creation, hence `Sync`.
pub trait SceneBatchCollectorCallback: Send + Sync {
    /// Whether `light` should render shadows this frame.
    fn has_shadow(&self, light: &Light) -> bool;

    /// Shadow map region valid for the current frame, `None` if exhausted.
    fn get_temporary_shadow_map(&self, size: IVec2) -> Option<ShadowMapRegion>;

    /// Pipeline state of a scene or shadow batch on a cache miss.
    fn create_pipeline_state(
        &self,
        key: &ScenePipelineStateKey,
        ctx: &ScenePipelineStateContext<'_>,
    ) -> Option<PipelineStateHandle>;

    /// Pipeline state of a deferred light volume.
    fn create_light_volume_pipeline_state(
        &self,
        light: &SceneLight,
        geometry: LightGeometry,
        camera: &Camera,
    ) -> Option<PipelineStateHandle>;
}
