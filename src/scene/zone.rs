use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec3;

use super::bounds::BoundingBox;

static NEXT_ZONE_ID: AtomicU64 = AtomicU64::new(1);

/// Lighting and fog context of a region of space.
///
/// Drawables sample the zone at their bounding box center. Where zones
/// overlap the highest `priority` wins.
#[derive(Debug, Clone)]
pub struct Zone {
    id: u64,
    pub bounds: BoundingBox,
    pub priority: i32,
    pub zone_mask: u32,
    pub ambient_color: Vec3,
    pub fog_color: Vec3,
    pub fog_start: f32,
    pub fog_end: f32,
}

impl Zone {
    #[must_use]
    pub fn new(bounds: BoundingBox) -> Self {
        Self {
            id: NEXT_ZONE_ID.fetch_add(1, Ordering::Relaxed),
            bounds,
            priority: 0,
            zone_mask: u32::MAX,
            ambient_color: Vec3::splat(0.1),
            fog_color: Vec3::ZERO,
            fog_start: 250.0,
            fog_end: 1000.0,
        }
    }

    /// Fallback zone covering all of space.
    #[must_use]
    pub fn unbounded() -> Self {
        let mut zone = Self::new(BoundingBox::infinite());
        zone.priority = i32::MIN;
        zone
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_ambient(mut self, ambient_color: Vec3) -> Self {
        self.ambient_color = ambient_color;
        self
    }

    #[must_use]
    pub fn with_zone_mask(mut self, zone_mask: u32) -> Self {
        self.zone_mask = zone_mask;
        self
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn contains(&self, point: Vec3) -> bool {
        self.bounds.contains_point(point)
    }
}
