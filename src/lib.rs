#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! Per-frame scene batch collection.
//!
//! Given the drawables visible from a camera, [`SceneBatchCollector`] decides
//! which of them are drawn, which lights affect which geometry, which lights
//! cast shadows and onto which atlas regions, and produces sorted batch
//! lists per scene pass. [`RenderPipeline`] drives it once per frame.

pub mod errors;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod settings;
pub mod utils;

pub use errors::{BatchError, Result};
pub use renderer::{
    FrameStats, InlineScheduler, PipelineStateRegistry, RayonScheduler, RenderPipeline,
    SceneBatchCollector, SceneBatchCollectorCallback,
};
pub use resources::{Geometry, Material, Pass, Technique};
pub use scene::{Camera, Drawable, Light, SceneIndex, SpatialIndex, StaticModel, Zone};
pub use settings::{CollectorSettings, RenderPipelineSettings};
pub use utils::interner;
