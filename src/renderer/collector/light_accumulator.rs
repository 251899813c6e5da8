//! Per-drawable forward light accumulation.
//!
//! Every forward-lit geometry owns one [`DrawableLightAccumulator`]. Each
//! light touching the geometry offers itself with a penalty (lower is
//! better); the accumulator keeps the best lights in a fixed array, split
//! into per-pixel slots followed by per-vertex slots.
//!
//! Ranking is by tier, then penalty, then light index:
//!
//! | Tier | Lights                                  |
//! |------|-----------------------------------------|
//! | 0    | the main light, `Important` lights      |
//! | 1    | `Auto` lights                           |
//! | 2    | `NotImportant` lights                   |
//!
//! The main light carries a penalty of `-LARGE_VALUE` and therefore always
//! takes slot 0.

use super::z_range::LARGE_VALUE;
use crate::scene::light::LightImportance;

/// Max number of vertex lights per drawable.
pub const MAX_VERTEX_LIGHTS: usize = 4;
/// Max number of pixel lights per drawable. Soft limit for the budget.
pub const MAX_PIXEL_LIGHTS: usize = 4;

const MAX_LIGHTS: usize = MAX_PIXEL_LIGHTS + MAX_VERTEX_LIGHTS;

/// Vertex lights of a drawable as indices into the visible light list.
pub type VertexLightCollection = [Option<usize>; MAX_VERTEX_LIGHTS];

/// Inputs of one accumulation step.
#[derive(Debug, Clone, Copy)]
pub struct LightAccumulationContext {
    pub max_pixel_lights: u32,
    pub light_importance: LightImportance,
    pub light_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccumulatedLight {
    pub light_index: usize,
    pub penalty: f32,
    pub importance: LightImportance,
}

impl AccumulatedLight {
    const NONE: Self = Self {
        light_index: usize::MAX,
        penalty: f32::MAX,
        importance: LightImportance::NotImportant,
    };

    fn tier(&self) -> u8 {
        if self.penalty <= -LARGE_VALUE {
            return 0;
        }
        match self.importance {
            LightImportance::Important => 0,
            LightImportance::Auto => 1,
            LightImportance::NotImportant => 2,
        }
    }

    /// Whether `self` ranks after `other` or equal to it.
    fn ranks_not_before(&self, other: &Self) -> bool {
        self.tier()
            .cmp(&other.tier())
            .then(self.penalty.total_cmp(&other.penalty))
            .then(self.light_index.cmp(&other.light_index))
            .is_ge()
    }

    /// Whether `self` is better than `other` by tier or penalty alone.
    fn strictly_better_than(&self, other: &Self) -> bool {
        self.tier()
            .cmp(&other.tier())
            .then(self.penalty.total_cmp(&other.penalty))
            .is_lt()
    }
}

/// Bounded, ranked light list of one drawable.
#[derive(Debug, Clone, Copy)]
pub struct DrawableLightAccumulator {
    lights: [AccumulatedLight; MAX_LIGHTS],
    len: usize,
    num_important: usize,
    num_auto: usize,
    first_vertex_light: usize,
}

impl Default for DrawableLightAccumulator {
    fn default() -> Self {
        Self {
            lights: [AccumulatedLight::NONE; MAX_LIGHTS],
            len: 0,
            num_important: 0,
            num_auto: 0,
            first_vertex_light: 0,
        }
    }
}

impl DrawableLightAccumulator {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Offers a light with the given penalty.
    ///
    /// The pixel slot count is `max(important, min(important + auto,
    /// max_pixel_lights))`, capped at [`MAX_PIXEL_LIGHTS`]; up to
    /// [`MAX_VERTEX_LIGHTS`] further slots follow. When every slot is taken
    /// the worst entry is evicted only by a strictly better one.
    pub fn accumulate_light(&mut self, ctx: &LightAccumulationContext, penalty: f32) {
        match ctx.light_importance {
            LightImportance::Important => self.num_important += 1,
            LightImportance::Auto => self.num_auto += 1,
            LightImportance::NotImportant => {}
        }

        let max_pixel_lights = ctx.max_pixel_lights as usize;
        self.first_vertex_light = self
            .num_important
            .max((self.num_important + self.num_auto).min(max_pixel_lights))
            .min(MAX_PIXEL_LIGHTS);
        let capacity = self.first_vertex_light + MAX_VERTEX_LIGHTS;

        let entry = AccumulatedLight {
            light_index: ctx.light_index,
            penalty,
            importance: ctx.light_importance,
        };
        let position = self.lights[..self.len].partition_point(|e| entry.ranks_not_before(e));

        if self.len < capacity {
            self.lights.copy_within(position..self.len, position + 1);
            self.lights[position] = entry;
            self.len += 1;
        } else if self.len > 0 && entry.strictly_better_than(&self.lights[self.len - 1]) {
            self.lights.copy_within(position..self.len - 1, position + 1);
            self.lights[position] = entry;
        }
    }

    /// All accepted lights, best first.
    pub fn lights(&self) -> &[AccumulatedLight] {
        &self.lights[..self.len]
    }

    pub fn pixel_lights(&self) -> &[AccumulatedLight] {
        &self.lights[..self.first_vertex_light.min(self.len)]
    }

    pub fn vertex_lights(&self) -> VertexLightCollection {
        let mut out = [None; MAX_VERTEX_LIGHTS];
        let start = self.first_vertex_light.min(self.len);
        for (slot, light) in out.iter_mut().zip(&self.lights[start..self.len]) {
            *slot = Some(light.light_index);
        }
        out
    }

    pub fn num_vertex_lights(&self) -> usize {
        self.len - self.first_vertex_light.min(self.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
