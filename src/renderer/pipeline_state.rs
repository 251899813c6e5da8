//! Pipeline States
//!
//! - [`PipelineStateTracker`]: lazily recomputed, invalidatable state hash
//!   carried by drawables.
//! - [`PipelineStateHandle`]: opaque handle into the device's pipeline storage.
//! - [`ScenePipelineStateCache`]: per-pass memo from the state-relevant inputs
//!   of a batch to its handle. Misses go to the collector callback, which
//!   builds a [`PipelineStateDesc`] and hands it to a [`PipelineStateFactory`].
//! - [`PipelineStateRegistry`]: deduplicating in-memory factory.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::renderer::collector::batch::LightGeometry;
use crate::renderer::collector::scene_light::SceneLight;
use crate::resources::{BlendMode, CullMode, Geometry, GeometryType, Material, Pass};
use crate::scene::{Camera, Drawable};
use crate::utils::interner::Symbol;

// ─── Tracker ────────────────────────────────────────────────────────────────

/// Lazily recomputed state hash. Zero means dirty.
#[derive(Debug, Default)]
pub struct PipelineStateTracker {
    hash: AtomicU32,
}

impl PipelineStateTracker {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hash: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn mark_dirty(&self) {
        self.hash.store(0, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.hash.load(Ordering::Relaxed) == 0
    }

    /// Returns the cached hash, recomputing it with `recalculate` when dirty.
    /// The stored hash is never zero.
    pub fn get_or_update(&self, recalculate: impl FnOnce() -> u32) -> u32 {
        let hash = self.hash.load(Ordering::Relaxed);
        if hash != 0 {
            return hash;
        }
        let hash = recalculate().max(1);
        self.hash.store(hash, Ordering::Relaxed);
        hash
    }
}

// ─── Handles ────────────────────────────────────────────────────────────────

/// Handle to a pipeline state owned by the graphics device layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineStateHandle(pub(crate) u32);

impl PipelineStateHandle {
    #[inline]
    #[must_use]
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// Raw index into the pipeline storage array.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ─── Scene cache ────────────────────────────────────────────────────────────

/// Everything about a batch that selects its pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScenePipelineStateKey {
    pub drawable_hash: u32,
    pub geometry_id: u64,
    pub material_id: u64,
    pub pass: Symbol,
    pub light_hash: u32,
    pub num_vertex_lights: u8,
    pub geometry_type: GeometryType,
}

/// Inputs available to the callback when a key misses.
pub struct ScenePipelineStateContext<'a> {
    pub drawable: &'a dyn Drawable,
    pub geometry: &'a Geometry,
    pub geometry_type: GeometryType,
    pub material: &'a Material,
    pub pass: &'a Pass,
    /// Per-pixel light of the batch, if any.
    pub light: Option<&'a SceneLight>,
    pub num_vertex_lights: usize,
    /// Rendering into a shadow map of `light`.
    pub shadow_pass: bool,
    pub camera: &'a Camera,
}

#[derive(Debug, Default)]
pub struct ScenePipelineStateCache {
    states: RwLock<FxHashMap<ScenePipelineStateKey, PipelineStateHandle>>,
}

impl ScenePipelineStateCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ScenePipelineStateKey) -> Option<PipelineStateHandle> {
        self.states.read().get(key).copied()
    }

    pub fn insert(&self, key: ScenePipelineStateKey, handle: PipelineStateHandle) {
        self.states.write().insert(key, handle);
    }

    /// Returns the cached handle or creates and caches a new one.
    pub fn get_or_create(
        &self,
        key: ScenePipelineStateKey,
        create: impl FnOnce() -> Option<PipelineStateHandle>,
    ) -> Option<PipelineStateHandle> {
        if let Some(handle) = self.get(&key) {
            return Some(handle);
        }
        let handle = create()?;
        self.insert(key, handle);
        Some(handle)
    }

    pub fn invalidate(&self) {
        self.states.write().clear();
    }

    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── Descriptors & factory ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthCompare {
    #[default]
    LessEqual,
    Always,
    GreaterEqual,
}

/// Device-independent pipeline state description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PipelineStateDesc {
    pub pass_name: String,
    /// Sorted, deduplicated shader defines.
    pub defines: Vec<String>,
    pub blend_mode: BlendMode,
    pub cull_mode: CullMode,
    pub depth_write: bool,
    pub depth_compare: DepthCompare,
    pub geometry_type: GeometryType,
    pub light_geometry: Option<LightGeometry>,
}

impl PipelineStateDesc {
    pub fn add_define(&mut self, define: impl Into<String>) {
        self.defines.push(define.into());
    }

    /// Sorts and deduplicates defines so equal states compare equal.
    pub fn normalize(&mut self) {
        self.defines.sort_unstable();
        self.defines.dedup();
    }

    pub fn has_define(&self, define: &str) -> bool {
        self.defines.iter().any(|d| d == define)
    }
}

/// Graphics device boundary for pipeline creation.
pub trait PipelineStateFactory: Send + Sync {
    /// Creates (or finds) the pipeline state; `None` if the device rejects it.
    fn create_pipeline_state(&self, desc: &PipelineStateDesc) -> Option<PipelineStateHandle>;
}

/// In-memory factory that hands out one handle per distinct descriptor.
#[derive(Debug, Default)]
pub struct PipelineStateRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    lookup: FxHashMap<PipelineStateDesc, PipelineStateHandle>,
    states: Vec<PipelineStateDesc>,
}

impl PipelineStateRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, handle: PipelineStateHandle) -> Option<PipelineStateDesc> {
        self.inner.lock().states.get(handle.index()).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PipelineStateFactory for PipelineStateRegistry {
    fn create_pipeline_state(&self, desc: &PipelineStateDesc) -> Option<PipelineStateHandle> {
        let mut inner = self.inner.lock();
        if let Some(handle) = inner.lookup.get(desc) {
            return Some(*handle);
        }
        let handle = PipelineStateHandle(inner.states.len() as u32);
        inner.states.push(desc.clone());
        inner.lookup.insert(desc.clone(), handle);
        Some(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::interner;

    #[test]
    fn tracker_never_stores_zero() {
        let tracker = PipelineStateTracker::new();
        assert!(tracker.is_dirty());
        assert_eq!(tracker.get_or_update(|| 0), 1);
        assert!(!tracker.is_dirty());
        // Clean tracker ignores the recalculation
        assert_eq!(tracker.get_or_update(|| 42), 1);
        tracker.mark_dirty();
        assert_eq!(tracker.get_or_update(|| 42), 42);
    }

    #[test]
    fn cache_invalidation_forces_recreation() {
        let cache = ScenePipelineStateCache::new();
        let key = ScenePipelineStateKey {
            drawable_hash: 1,
            geometry_id: 2,
            material_id: 3,
            pass: interner::intern("base"),
            light_hash: 0,
            num_vertex_lights: 0,
            geometry_type: GeometryType::Static,
        };
        let mut created = 0;
        cache.get_or_create(key, || {
            created += 1;
            Some(PipelineStateHandle(7))
        });
        cache.get_or_create(key, || {
            created += 1;
            Some(PipelineStateHandle(8))
        });
        assert_eq!(created, 1);
        assert_eq!(cache.get(&key), Some(PipelineStateHandle(7)));

        cache.invalidate();
        assert!(cache.is_empty());
    }

    #[test]
    fn registry_deduplicates() {
        let registry = PipelineStateRegistry::new();
        let mut desc = PipelineStateDesc {
            pass_name: "base".into(),
            ..Default::default()
        };
        desc.add_define("PERPIXEL");
        desc.add_define("DIRLIGHT");
        desc.normalize();

        let a = registry.create_pipeline_state(&desc).unwrap();
        let b = registry.create_pipeline_state(&desc.clone()).unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(a).unwrap().has_define("DIRLIGHT"));
    }
}
