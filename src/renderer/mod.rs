//! Renderer Module
//!
//! Device-independent half of the renderer: everything between the scene
//! and draw submission.
//!
//! - [`collector`]: per-frame scene batch collection
//! - [`passes`]: scene passes that turn source batches into sorted batches
//! - [`pipeline`]: frame driver wiring passes, shadows and the collector
//! - [`pipeline_state`]: pipeline state keys, caches and descriptors
//! - [`shadow_map`]: shadow atlas allocation
//! - [`shadow_utils`]: shadow camera math
//! - [`work_queue`]: thread-indexed task execution

pub mod collector;
pub mod passes;
pub mod pipeline;
pub mod pipeline_state;
pub mod shadow_map;
pub mod shadow_utils;
pub mod work_queue;

pub use collector::{SceneBatchCollector, SceneBatchCollectorCallback};
pub use pipeline::{FrameStats, PipelineCallback, RenderPipeline};
pub use pipeline_state::{
    PipelineStateDesc, PipelineStateFactory, PipelineStateHandle, PipelineStateRegistry,
};
pub use shadow_map::{ShadowMapAllocator, ShadowMapRegion};
pub use work_queue::{InlineScheduler, RayonScheduler, WorkScheduler};
