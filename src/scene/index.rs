//! Spatial index of drawables and zones.
//!
//! The collector only talks to [`SpatialIndex`]. [`SceneIndex`] is a linear
//! reference implementation that is good enough for tests, tools and small
//! scenes; an octree or BVH can be plugged in behind the same trait.
//!
//! Every registered drawable gets a dense index in `0..drawable_count()`.
//! The collector sizes its per-frame arrays from `drawable_count()` and
//! addresses them with that index.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use glam::Vec3;
use log::debug;

use super::camera::Frustum;
use super::drawable::{
    CachedDrawableZone, Drawable, DrawableFlags, DrawableId, INVALID_DRAWABLE_INDEX,
};
use super::zone::Zone;
use crate::errors::{BatchError, Result};

/// Spatial queries consumed by the batch collector.
pub trait SpatialIndex: Send + Sync {
    /// Upper bound (exclusive) of drawable indices.
    fn drawable_count(&self) -> usize;

    /// Appends drawables intersecting `frustum` whose flags intersect `flags`
    /// and whose view mask intersects `view_mask`.
    fn collect_drawables(
        &self,
        frustum: &Frustum,
        flags: DrawableFlags,
        view_mask: u32,
        out: &mut Vec<Arc<dyn Drawable>>,
    );

    /// Finds the zone for a world position, together with how far the
    /// position may move before the answer can change.
    fn query_zone(&self, position: Vec3, zone_mask: u32) -> CachedDrawableZone;
}

/// Linear scene index.
pub struct SceneIndex {
    drawables: Vec<Arc<dyn Drawable>>,
    zones: Vec<Arc<Zone>>,
    default_zone: Arc<Zone>,
    zone_queries: AtomicUsize,
}

impl Default for SceneIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneIndex {
    #[must_use]
    pub fn new() -> Self {
        Self {
            drawables: Vec::new(),
            zones: Vec::new(),
            default_zone: Arc::new(Zone::unbounded()),
            zone_queries: AtomicUsize::new(0),
        }
    }

    /// Registers a drawable and returns its dense index.
    pub fn add_drawable(&mut self, drawable: Arc<dyn Drawable>) -> u32 {
        let index = self.drawables.len() as u32;
        drawable.base().set_index(index);
        self.drawables.push(drawable);
        index
    }

    /// Unregisters a drawable. The last drawable takes over its index.
    pub fn remove_drawable(&mut self, id: DrawableId) -> Result<Arc<dyn Drawable>> {
        let position = self
            .drawables
            .iter()
            .position(|d| d.base().id() == id)
            .ok_or(BatchError::DrawableNotFound { id: id.0 })?;

        let removed = self.drawables.swap_remove(position);
        removed.base().set_index(INVALID_DRAWABLE_INDEX);
        if let Some(moved) = self.drawables.get(position) {
            moved.base().set_index(position as u32);
        }
        debug!("Removed drawable {id} from scene index");
        Ok(removed)
    }

    pub fn add_zone(&mut self, zone: Zone) -> Arc<Zone> {
        let zone = Arc::new(zone);
        self.zones.push(Arc::clone(&zone));
        zone
    }

    pub fn drawables(&self) -> &[Arc<dyn Drawable>] {
        &self.drawables
    }

    pub fn zones(&self) -> &[Arc<Zone>] {
        &self.zones
    }

    pub fn default_zone(&self) -> &Arc<Zone> {
        &self.default_zone
    }

    /// Number of zone queries answered so far.
    pub fn zone_query_count(&self) -> usize {
        self.zone_queries.load(Ordering::Relaxed)
    }
}

impl SpatialIndex for SceneIndex {
    fn drawable_count(&self) -> usize {
        self.drawables.len()
    }

    fn collect_drawables(
        &self,
        frustum: &Frustum,
        flags: DrawableFlags,
        view_mask: u32,
        out: &mut Vec<Arc<dyn Drawable>>,
    ) {
        out.extend(
            self.drawables
                .iter()
                .filter(|d| {
                    let base = d.base();
                    base.flags().intersects(flags)
                        && base.view_mask & view_mask != 0
                        && frustum.intersects_box(&base.world_bounding_box())
                })
                .cloned(),
        );
    }

    fn query_zone(&self, position: Vec3, zone_mask: u32) -> CachedDrawableZone {
        self.zone_queries.fetch_add(1, Ordering::Relaxed);

        let candidates = self.zones.iter().filter(|z| z.zone_mask & zone_mask != 0);

        let mut best: Option<&Arc<Zone>> = None;
        let mut safe_distance = f32::MAX;
        for zone in candidates {
            if zone.contains(position) {
                safe_distance = safe_distance.min(zone.bounds.inner_distance_to_boundary(position));
                if best.is_none_or(|b| zone.priority > b.priority) {
                    best = Some(zone);
                }
            } else {
                safe_distance = safe_distance.min(zone.bounds.distance_to_point(position));
            }
        }

        CachedDrawableZone {
            zone: Some(Arc::clone(best.unwrap_or(&self.default_zone))),
            cache_position: position,
            cache_invalidation_distance_squared: safe_distance * safe_distance,
        }
    }
}
