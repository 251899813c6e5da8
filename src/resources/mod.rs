//! Resource Definitions
//!
//! Device-independent resource descriptions consumed by batch collection:
//! - [`Geometry`]: mesh identity and local bounds
//! - [`Material`]: technique list with quality / LOD selection
//! - [`Technique`] and [`Pass`]: named render passes and their fixed-function state

pub mod geometry;
pub mod material;

pub use geometry::{Geometry, GeometryType};
pub use material::{
    BlendMode, CullMode, Material, MaterialQuality, Pass, Technique, TechniqueEntry,
};
