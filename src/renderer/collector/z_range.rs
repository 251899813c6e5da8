//! View-space depth ranges.
//!
//! Depth here is measured along the camera's forward axis: positive in front
//! of the camera. Per-drawable ranges feed shadow caster culling; the merged
//! scene range focuses directional light cascades.

use std::sync::atomic::{AtomicU64, Ordering};

use glam::{Mat4, Vec3};
use parking_lot::Mutex;

use crate::scene::bounds::BoundingBox;

/// Threshold above which values are treated as unbounded.
pub const LARGE_VALUE: f32 = 100_000_000.0;

/// Smallest distance used in light penalties.
pub const LARGE_EPSILON: f32 = 0.000_05;

/// Closed depth interval. `min > max` marks an empty range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawableZRange {
    pub min: f32,
    pub max: f32,
}

impl Default for DrawableZRange {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl DrawableZRange {
    pub const EMPTY: Self = Self {
        min: f32::INFINITY,
        max: f32::NEG_INFINITY,
    };

    /// Placeholder range stored for unbounded drawables.
    pub const UNBOUNDED: Self = Self {
        min: LARGE_VALUE,
        max: LARGE_VALUE,
    };

    #[must_use]
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.min <= self.max
    }

    /// Smallest range containing both.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    #[must_use]
    pub fn intersects(&self, min: f32, max: f32) -> bool {
        self.is_valid() && self.min <= max && self.max >= min
    }

    fn pack(self) -> u64 {
        (u64::from(self.min.to_bits()) << 32) | u64::from(self.max.to_bits())
    }

    fn unpack(bits: u64) -> Self {
        Self {
            min: f32::from_bits((bits >> 32) as u32),
            max: f32::from_bits(bits as u32),
        }
    }
}

/// Depth range of a box against a fixed view matrix.
///
/// Pure and `Copy`; one evaluator is shared by every worker of a frame.
#[derive(Debug, Clone, Copy)]
pub struct ZRangeEvaluator {
    view_z: Vec3,
    abs_view_z: Vec3,
    offset: f32,
}

impl ZRangeEvaluator {
    #[must_use]
    pub fn new(view_matrix: &Mat4) -> Self {
        // Negated so that depth grows away from the camera
        let row = -view_matrix.row(2);
        let view_z = row.truncate();
        Self {
            view_z,
            abs_view_z: view_z.abs(),
            offset: row.w,
        }
    }

    /// Returns [`DrawableZRange::EMPTY`] for unbounded boxes (skyboxes and the
    /// like), which must not take part in shadow focusing.
    #[must_use]
    pub fn evaluate(&self, bounds: &BoundingBox) -> DrawableZRange {
        let edge = bounds.half_size();
        if edge.length_squared() >= LARGE_VALUE * LARGE_VALUE {
            return DrawableZRange::EMPTY;
        }

        let center_z = self.view_z.dot(bounds.center()) + self.offset;
        let edge_z = self.abs_view_z.dot(edge);
        DrawableZRange::new(center_z - edge_z, center_z + edge_z)
    }
}

/// Array of depth ranges writable from any thread, one slot per drawable.
#[derive(Debug, Default)]
pub struct AtomicZRanges {
    ranges: Vec<AtomicU64>,
}

impl AtomicZRanges {
    pub fn reset(&mut self, count: usize) {
        self.ranges.clear();
        self.ranges
            .resize_with(count, || AtomicU64::new(DrawableZRange::EMPTY.pack()));
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<DrawableZRange> {
        self.ranges
            .get(index)
            .map(|r| DrawableZRange::unpack(r.load(Ordering::Relaxed)))
    }

    pub fn set(&self, index: usize, range: DrawableZRange) {
        if let Some(slot) = self.ranges.get(index) {
            slot.store(range.pack(), Ordering::Relaxed);
        }
    }
}

/// Scene depth range accumulated per thread and merged on read.
#[derive(Debug, Default)]
pub struct SceneZRange {
    ranges: Vec<Mutex<DrawableZRange>>,
}

impl SceneZRange {
    pub fn clear(&mut self, thread_count: usize) {
        self.ranges.clear();
        self.ranges
            .resize_with(thread_count.max(1), || Mutex::new(DrawableZRange::EMPTY));
    }

    pub fn accumulate(&self, thread_index: usize, range: DrawableZRange) {
        if let Some(slot) = self.ranges.get(thread_index).or_else(|| self.ranges.first()) {
            let mut slot = slot.lock();
            *slot = slot.union(range);
        }
    }

    pub fn get(&self) -> DrawableZRange {
        self.ranges
            .iter()
            .fold(DrawableZRange::EMPTY, |acc, r| acc.union(*r.lock()))
    }
}
