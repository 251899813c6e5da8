use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use bitflags::bitflags;
use log::error;

use super::z_range::{AtomicZRanges, DrawableZRange};

bitflags! {
    /// Per-frame classification of a drawable.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct DrawableTraits: u8 {
        /// Processed as visible geometry this frame.
        const VISIBLE_GEOMETRY = 1 << 1;
        /// At least one pass needs per-light data for this drawable.
        const FORWARD_LIT      = 1 << 2;
    }
}

/// Transient per-drawable data, indexed by drawable index.
///
/// Resized to the scene's drawable count at the start of every frame. All
/// slots are atomics so workers can write disjoint indices through `&self`.
#[derive(Debug, Default)]
pub struct SceneDrawableData {
    traits: Vec<AtomicU8>,
    z_ranges: AtomicZRanges,
    is_updated: Vec<AtomicBool>,
}

impl SceneDrawableData {
    pub fn reset(&mut self, drawable_count: usize) {
        self.traits.clear();
        self.traits.resize_with(drawable_count, || AtomicU8::new(0));
        self.z_ranges.reset(drawable_count);
        self.is_updated.clear();
        self.is_updated.resize_with(drawable_count, || AtomicBool::new(false));
    }

    pub fn len(&self) -> usize {
        self.traits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traits.is_empty()
    }

    /// Validates a drawable index against the pre-sized arrays.
    ///
    /// An out-of-range index is a programming error: it asserts in debug
    /// builds and is logged and skipped in release builds.
    #[inline]
    pub fn check_index(&self, index: u32) -> Option<usize> {
        let index = index as usize;
        if index < self.len() {
            return Some(index);
        }
        debug_assert!(
            false,
            "drawable index {index} outside of per-frame data ({} drawables)",
            self.len()
        );
        error!("Drawable index {index} outside of per-frame data; skipping");
        None
    }

    pub fn traits(&self, index: usize) -> DrawableTraits {
        self.traits.get(index).map_or(DrawableTraits::empty(), |t| {
            DrawableTraits::from_bits_truncate(t.load(Ordering::Relaxed))
        })
    }

    pub fn add_traits(&self, index: usize, traits: DrawableTraits) {
        if let Some(slot) = self.traits.get(index) {
            slot.fetch_or(traits.bits(), Ordering::Relaxed);
        }
    }

    pub fn z_range(&self, index: usize) -> DrawableZRange {
        self.z_ranges.get(index).unwrap_or(DrawableZRange::EMPTY)
    }

    pub fn set_z_range(&self, index: usize, range: DrawableZRange) {
        self.z_ranges.set(index, range);
    }

    /// Sets the "updated this frame" marker, returning its previous value.
    pub fn mark_updated(&self, index: usize) -> bool {
        self.is_updated
            .get(index)
            .is_some_and(|flag| flag.swap(true, Ordering::Relaxed))
    }

    pub fn is_updated(&self, index: usize) -> bool {
        self.is_updated
            .get(index)
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}
