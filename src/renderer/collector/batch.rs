//! Batch records produced by scene passes.

use std::sync::Arc;

use crate::renderer::pipeline_state::PipelineStateHandle;
use crate::resources::{Geometry, GeometryType, Material, Pass};
use crate::scene::light::LightType;
use crate::scene::Drawable;

/// 64-bit sort key for state-sorted batches.
///
/// # Bit Layout
///
/// ```text
/// [63..50] pipeline index (14 bits)
/// [49..30] material index (20 bits)
/// [29..0]  depth (30 bits)
/// ```
///
/// Opaque keys sort by state first and front-to-back within a state.
/// Transparent keys only carry the inverted depth, so they sort
/// back-to-front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BatchSortKey(pub u64);

impl BatchSortKey {
    const DEPTH_MASK: u64 = 0x3FFF_FFFF;

    fn depth_bits(depth: f32) -> u64 {
        // Positive floats order like their bit patterns
        let bits = if depth.is_sign_negative() { 0 } else { depth.to_bits() >> 2 };
        u64::from(bits) & Self::DEPTH_MASK
    }

    #[must_use]
    pub fn opaque(pipeline: PipelineStateHandle, material_index: u32, depth: f32) -> Self {
        let p_bits = (pipeline.index() as u64 & 0x3FFF) << 50;
        let m_bits = (u64::from(material_index) & 0xF_FFFF) << 30;
        Self(p_bits | m_bits | Self::depth_bits(depth))
    }

    #[must_use]
    pub fn transparent(depth: f32) -> Self {
        Self(Self::DEPTH_MASK - Self::depth_bits(depth))
    }
}

/// Final draw batch of a scene pass.
#[derive(Debug, Clone)]
pub struct SceneBatch {
    pub drawable: Arc<dyn Drawable>,
    pub drawable_index: u32,
    pub source_batch_index: usize,
    pub geometry: Arc<Geometry>,
    pub geometry_type: GeometryType,
    pub material: Arc<Material>,
    pub pass: Arc<Pass>,
    /// Per-pixel light, as an index into the visible light list.
    pub light_index: Option<usize>,
    pub pipeline_state: PipelineStateHandle,
    pub distance: f32,
    pub sort_key: BatchSortKey,
}

/// Draw batch of a shadow split.
#[derive(Debug, Clone)]
pub struct ShadowBatch {
    pub drawable: Arc<dyn Drawable>,
    pub source_batch_index: usize,
    pub geometry: Arc<Geometry>,
    pub geometry_type: GeometryType,
    pub material: Arc<Material>,
    pub pass: Arc<Pass>,
    pub pipeline_state: Option<PipelineStateHandle>,
    /// Distance from the light (zero for directional lights).
    pub distance: f32,
    pub sort_key: BatchSortKey,
}

/// Proxy geometry of a deferred light volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightGeometry {
    FullScreenQuad,
    Sphere,
    Cone,
}

impl LightGeometry {
    #[must_use]
    pub fn for_light_type(light_type: LightType) -> Self {
        match light_type {
            LightType::Directional => Self::FullScreenQuad,
            LightType::Point => Self::Sphere,
            LightType::Spot => Self::Cone,
        }
    }
}

/// Deferred light volume draw, rebuilt every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightVolumeBatch {
    pub light_index: usize,
    pub geometry: LightGeometry,
    pub pipeline_state: Option<PipelineStateHandle>,
}
