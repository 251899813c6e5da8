//! Scene Module
//!
//! Scene-side collaborators of the batch collector:
//! - [`Drawable`] / [`DrawableBase`]: renderable objects and lights
//! - [`Light`]: light drawable
//! - [`Zone`]: ambient / fog regions cached per drawable
//! - [`Camera`] and [`Frustum`]
//! - [`SpatialIndex`]: visibility and zone queries, with [`SceneIndex`] as
//!   the linear reference implementation

pub mod bounds;
pub mod camera;
pub mod drawable;
pub mod index;
pub mod light;
pub mod zone;

pub use bounds::BoundingBox;
pub use camera::{Camera, Frustum, ProjectionType, ViewOverrideFlags};
pub use drawable::{
    CachedDrawableZone, Drawable, DrawableBase, DrawableFlags, DrawableId, FrameInfo,
    SourceBatch, StaticModel, UpdateGeometryType,
};
pub use index::{SceneIndex, SpatialIndex};
pub use light::{Light, LightImportance, LightType, ShadowConfig};
pub use zone::Zone;
