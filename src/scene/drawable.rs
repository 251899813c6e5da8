//! Drawables
//!
//! A drawable is anything the spatial index can return for a view: renderable
//! geometry or a light. Every drawable embeds a [`DrawableBase`] holding the
//! state shared by all kinds, and implements the [`Drawable`] trait for the
//! per-frame hooks.
//!
//! # Threading
//!
//! Drawables are shared as `Arc<dyn Drawable>` between the scene and the
//! collector. During a frame each drawable is processed by exactly one worker
//! at a time, so the interior mutability here (zone cache, distance, view
//! frame, pipeline state hash) is never contended. The locks exist to make
//! that sharing sound, not to arbitrate between threads.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use bitflags::bitflags;
use glam::{Affine3A, Vec3};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use smallvec::SmallVec;
use xxhash_rust::xxh3::Xxh3;

use super::bounds::BoundingBox;
use super::camera::Camera;
use super::index::SpatialIndex;
use super::light::Light;
use super::zone::Zone;
use crate::renderer::pipeline_state::PipelineStateTracker;
use crate::resources::{Geometry, GeometryType, Material};

static NEXT_DRAWABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Index value of a drawable that is not registered in a spatial index.
pub const INVALID_DRAWABLE_INDEX: u32 = u32::MAX;

/// Stable, process-unique drawable identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DrawableId(pub u64);

impl fmt::Display for DrawableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct DrawableFlags: u8 {
        const GEOMETRY = 1 << 0;
        const LIGHT    = 1 << 1;
    }
}

/// Where a drawable's deferred geometry update has to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UpdateGeometryType {
    /// Nothing to update.
    #[default]
    None,
    /// Must run on the thread that drives the frame.
    MainThread,
    /// Safe to run on any worker.
    WorkerThread,
}

/// A (geometry, material) pair owned by a drawable, before technique resolution.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub geometry: Arc<Geometry>,
    /// `None` renders with the collector's default material.
    pub material: Option<Arc<Material>>,
    pub geometry_type: GeometryType,
}

impl SourceBatch {
    #[must_use]
    pub fn new(geometry: Arc<Geometry>, material: Option<Arc<Material>>) -> Self {
        Self {
            geometry,
            material,
            geometry_type: GeometryType::Static,
        }
    }
}

/// Per-frame information handed to drawable hooks.
#[derive(Debug, Clone)]
pub struct FrameInfo {
    pub frame_number: u64,
    pub time_step: f32,
    pub camera: Camera,
}

/// Zone lookup result cached on a drawable.
///
/// The cache stays valid while the drawable's center remains closer than
/// `sqrt(cache_invalidation_distance_squared)` to `cache_position`.
#[derive(Debug, Clone)]
pub struct CachedDrawableZone {
    pub zone: Option<Arc<Zone>>,
    pub cache_position: Vec3,
    pub cache_invalidation_distance_squared: f32,
}

impl Default for CachedDrawableZone {
    /// An entry that misses on first use.
    fn default() -> Self {
        Self {
            zone: None,
            cache_position: Vec3::ZERO,
            cache_invalidation_distance_squared: -1.0,
        }
    }
}

impl CachedDrawableZone {
    #[inline]
    #[must_use]
    pub fn is_valid_at(&self, position: Vec3) -> bool {
        self.cache_position.distance_squared(position) < self.cache_invalidation_distance_squared
    }

    pub fn zone_id(&self) -> u64 {
        self.zone.as_ref().map_or(0, |zone| zone.id())
    }
}

/// State shared by every drawable kind.
#[derive(Debug)]
pub struct DrawableBase {
    id: DrawableId,
    index: AtomicU32,
    flags: DrawableFlags,

    local_bounds: BoundingBox,
    transform: RwLock<Affine3A>,
    world_bounds: RwLock<BoundingBox>,

    /// Max distance from the camera; zero or negative means unlimited.
    pub draw_distance: f32,
    pub zone_mask: u32,
    pub light_mask: u32,
    pub shadow_mask: u32,
    pub view_mask: u32,
    pub cast_shadows: bool,
    pub update_geometry_type: UpdateGeometryType,

    batches: RwLock<SmallVec<[SourceBatch; 1]>>,

    distance: AtomicU32,
    view_frame: AtomicU64,
    cached_zone: Mutex<CachedDrawableZone>,
    pipeline_state: PipelineStateTracker,
}

impl DrawableBase {
    #[must_use]
    pub fn new(flags: DrawableFlags, local_bounds: BoundingBox) -> Self {
        Self {
            id: DrawableId(NEXT_DRAWABLE_ID.fetch_add(1, Ordering::Relaxed)),
            index: AtomicU32::new(INVALID_DRAWABLE_INDEX),
            flags,
            local_bounds,
            transform: RwLock::new(Affine3A::IDENTITY),
            world_bounds: RwLock::new(local_bounds),
            draw_distance: 0.0,
            zone_mask: u32::MAX,
            light_mask: u32::MAX,
            shadow_mask: u32::MAX,
            view_mask: u32::MAX,
            cast_shadows: false,
            update_geometry_type: UpdateGeometryType::None,
            batches: RwLock::new(SmallVec::new()),
            distance: AtomicU32::new(0.0f32.to_bits()),
            view_frame: AtomicU64::new(u64::MAX),
            cached_zone: Mutex::new(CachedDrawableZone::default()),
            pipeline_state: PipelineStateTracker::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> DrawableId {
        self.id
    }

    #[inline]
    pub fn flags(&self) -> DrawableFlags {
        self.flags
    }

    /// Dense index assigned by the spatial index.
    #[inline]
    pub fn index(&self) -> u32 {
        self.index.load(Ordering::Relaxed)
    }

    pub fn set_index(&self, index: u32) {
        self.index.store(index, Ordering::Relaxed);
    }

    pub fn transform(&self) -> Affine3A {
        *self.transform.read()
    }

    pub fn set_transform(&self, transform: Affine3A) {
        *self.world_bounds.write() = self.local_bounds.transform(&transform);
        *self.transform.write() = transform;
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from(self.transform.read().translation)
    }

    pub fn local_bounding_box(&self) -> BoundingBox {
        self.local_bounds
    }

    pub fn set_local_bounding_box(&mut self, bounds: BoundingBox) {
        self.local_bounds = bounds;
        *self.world_bounds.get_mut() = bounds.transform(self.transform.get_mut());
    }

    pub fn world_bounding_box(&self) -> BoundingBox {
        *self.world_bounds.read()
    }

    pub fn batches(&self) -> RwLockReadGuard<'_, SmallVec<[SourceBatch; 1]>> {
        self.batches.read()
    }

    pub fn set_batches(&self, batches: impl IntoIterator<Item = SourceBatch>) {
        *self.batches.write() = batches.into_iter().collect();
        self.pipeline_state.mark_dirty();
    }

    /// Distance to the camera as of the last `update_batches`.
    #[inline]
    pub fn distance(&self) -> f32 {
        f32::from_bits(self.distance.load(Ordering::Relaxed))
    }

    pub fn set_distance(&self, distance: f32) {
        self.distance.store(distance.to_bits(), Ordering::Relaxed);
    }

    pub fn view_frame(&self) -> u64 {
        self.view_frame.load(Ordering::Relaxed)
    }

    pub fn mark_in_view(&self, frame_number: u64) {
        self.view_frame.store(frame_number, Ordering::Relaxed);
    }

    pub fn is_in_view(&self, frame_number: u64) -> bool {
        self.view_frame() == frame_number
    }

    pub fn cached_zone(&self) -> CachedDrawableZone {
        self.cached_zone.lock().clone()
    }

    /// Re-queries the zone if the drawable left the cached zone's safe radius.
    ///
    /// Returns `true` on a cache miss. A miss always dirties the pipeline
    /// state hash.
    pub fn update_cached_zone(&self, index: &dyn SpatialIndex) -> bool {
        let center = self.world_bounding_box().center();
        let mut cached = self.cached_zone.lock();
        let distance_squared = cached.cache_position.distance_squared(center);
        if distance_squared < cached.cache_invalidation_distance_squared {
            return false;
        }

        *cached = index.query_zone(center, self.zone_mask);
        self.pipeline_state.mark_dirty();
        true
    }

    pub fn mark_pipeline_state_dirty(&self) {
        self.pipeline_state.mark_dirty();
    }

    pub fn is_pipeline_state_dirty(&self) -> bool {
        self.pipeline_state.is_dirty()
    }

    /// Hash of the drawable state that feeds pipeline creation.
    pub fn pipeline_state_hash(&self) -> u32 {
        self.pipeline_state.get_or_update(|| {
            let mut hasher = Xxh3::new();
            hasher.update(&self.cached_zone.lock().zone_id().to_le_bytes());
            hasher.update(&self.light_mask.to_le_bytes());
            hasher.update(&[u8::from(self.cast_shadows), self.flags.bits()]);
            hasher.digest() as u32
        })
    }
}

/// Per-frame hooks of a drawable.
pub trait Drawable: Send + Sync + 'static {
    fn base(&self) -> &DrawableBase;

    /// Refreshes render batches and the distance to the camera.
    fn update_batches(&self, frame: &FrameInfo) {
        let base = self.base();
        base.set_distance(frame.camera.distance(base.world_bounding_box().center()));
    }

    fn mark_in_view(&self, frame: &FrameInfo) {
        self.base().mark_in_view(frame.frame_number);
    }

    fn update_geometry_type(&self) -> UpdateGeometryType {
        self.base().update_geometry_type
    }

    /// Deferred geometry update, run after visibility and light processing.
    fn update_geometry(&self, _frame: &FrameInfo) {}

    /// Downcasts a light drawable.
    fn into_light(self: Arc<Self>) -> Option<Arc<Light>> {
        None
    }
}

impl fmt::Debug for dyn Drawable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = self.base();
        f.debug_struct("Drawable")
            .field("id", &base.id())
            .field("index", &base.index())
            .field("flags", &base.flags())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// StaticModel
// ============================================================================

/// Plain geometry drawable.
#[derive(Debug)]
pub struct StaticModel {
    base: DrawableBase,
    geometry_updates: AtomicU32,
}

impl StaticModel {
    #[must_use]
    pub fn new(geometry: Arc<Geometry>, material: Option<Arc<Material>>) -> Self {
        let base = DrawableBase::new(DrawableFlags::GEOMETRY, geometry.bounding_box);
        base.set_batches([SourceBatch::new(geometry, material)]);
        Self {
            base,
            geometry_updates: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub fn with_transform(self, transform: Affine3A) -> Self {
        self.base.set_transform(transform);
        self
    }

    #[must_use]
    pub fn with_position(self, position: Vec3) -> Self {
        self.with_transform(Affine3A::from_translation(position))
    }

    #[must_use]
    pub fn with_draw_distance(mut self, draw_distance: f32) -> Self {
        self.base.draw_distance = draw_distance;
        self
    }

    #[must_use]
    pub fn with_cast_shadows(mut self, cast_shadows: bool) -> Self {
        self.base.cast_shadows = cast_shadows;
        self
    }

    #[must_use]
    pub fn with_light_mask(mut self, light_mask: u32) -> Self {
        self.base.light_mask = light_mask;
        self
    }

    #[must_use]
    pub fn with_zone_mask(mut self, zone_mask: u32) -> Self {
        self.base.zone_mask = zone_mask;
        self
    }

    #[must_use]
    pub fn with_view_mask(mut self, view_mask: u32) -> Self {
        self.base.view_mask = view_mask;
        self
    }

    #[must_use]
    pub fn with_update_geometry_type(mut self, update_type: UpdateGeometryType) -> Self {
        self.base.update_geometry_type = update_type;
        self
    }

    /// Appends another source batch.
    #[must_use]
    pub fn with_batch(self, batch: SourceBatch) -> Self {
        let mut batches: Vec<SourceBatch> = self.base.batches().iter().cloned().collect();
        batches.push(batch);
        self.base.set_batches(batches);
        self
    }

    /// Number of `update_geometry` calls received so far.
    pub fn geometry_update_count(&self) -> u32 {
        self.geometry_updates.load(Ordering::Relaxed)
    }
}

impl Drawable for StaticModel {
    fn base(&self) -> &DrawableBase {
        &self.base
    }

    fn update_geometry(&self, _frame: &FrameInfo) {
        self.geometry_updates.fetch_add(1, Ordering::Relaxed);
    }
}
