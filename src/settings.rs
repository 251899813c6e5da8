//! Render Pipeline & Batch Collector Settings
//!
//! Two layers of configuration:
//!
//! - [`CollectorSettings`]: knobs of the scene batch collector itself (light
//!   budget, parallel work thresholds, material quality).
//! - [`RenderPipelineSettings`]: the frame driver's configuration (forward vs
//!   deferred, shadows, shadow atlas size), embedding the collector settings.
//!
//! Both are plain serde structs with `#[serde(default)]`, so a settings file
//! only needs to mention what differs from the defaults:
//!
//! ```rust,ignore
//! use myth_batch::settings::RenderPipelineSettings;
//!
//! let settings = RenderPipelineSettings::from_json(r#"{
//!     "deferred": true,
//!     "collector": { "max_pixel_lights": 2 }
//! }"#)?;
//! ```
//!
//! The settings participate in pipeline state creation (shader defines,
//! blending). [`RenderPipelineSettings::pipeline_hash`] changes whenever such
//! a field changes, and the frame driver invalidates every pass cache when it
//! does.

use log::warn;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use crate::errors::{BatchError, Result};
use crate::renderer::collector::light_accumulator::MAX_PIXEL_LIGHTS;
use crate::resources::material::MaterialQuality;

// ---------------------------------------------------------------------------
// CollectorSettings
// ---------------------------------------------------------------------------

/// Configuration of [`SceneBatchCollector`](crate::renderer::collector::SceneBatchCollector).
///
/// | Field                            | Default | Meaning                                      |
/// |----------------------------------|---------|----------------------------------------------|
/// | `max_pixel_lights`               | 1       | Soft per-drawable pixel light budget         |
/// | `drawable_work_threshold`        | 1       | Min drawables per visibility task            |
/// | `lit_geometries_work_threshold`  | 1       | Min lit geometries per accumulation task     |
/// | `shadow_caster_work_threshold`   | 1       | Min shadow casters per update task           |
/// | `material_quality`               | High    | Technique quality level                      |
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorSettings {
    /// Max number of pixel lights per drawable. Important lights may exceed it.
    pub max_pixel_lights: u32,
    pub drawable_work_threshold: usize,
    pub lit_geometries_work_threshold: usize,
    pub shadow_caster_work_threshold: usize,
    pub material_quality: MaterialQuality,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            max_pixel_lights: 1,
            drawable_work_threshold: 1,
            lit_geometries_work_threshold: 1,
            shadow_caster_work_threshold: 1,
            material_quality: MaterialQuality::High,
        }
    }
}

impl CollectorSettings {
    /// Clamps soft limits and zero thresholds into their usable range.
    ///
    /// Exceeding the pixel light budget is a performance problem, not an
    /// error: the value is clamped and a warning is logged.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        if self.max_pixel_lights as usize > MAX_PIXEL_LIGHTS {
            warn!(
                "max_pixel_lights = {} exceeds the supported maximum of {MAX_PIXEL_LIGHTS}; clamping",
                self.max_pixel_lights
            );
            self.max_pixel_lights = MAX_PIXEL_LIGHTS as u32;
        }
        self.drawable_work_threshold = self.drawable_work_threshold.max(1);
        self.lit_geometries_work_threshold = self.lit_geometries_work_threshold.max(1);
        self.shadow_caster_work_threshold = self.shadow_caster_work_threshold.max(1);
        self
    }
}

// ---------------------------------------------------------------------------
// RenderPipelineSettings
// ---------------------------------------------------------------------------

/// Configuration of the frame driver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderPipelineSettings {
    /// Deferred shading: a single unlit G-buffer pass plus light volumes.
    /// Forward shading otherwise.
    pub deferred: bool,
    pub gamma_correction: bool,
    pub draw_shadows: bool,
    /// Edge length of one square shadow atlas page. Must be a power of two.
    pub shadow_map_page_size: u32,
    pub collector: CollectorSettings,
}

impl Default for RenderPipelineSettings {
    fn default() -> Self {
        Self {
            deferred: false,
            gamma_correction: false,
            draw_shadows: true,
            shadow_map_page_size: 4096,
            collector: CollectorSettings::default(),
        }
    }
}

impl RenderPipelineSettings {
    /// Parses and validates a JSON settings document.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.shadow_map_page_size == 0 || !self.shadow_map_page_size.is_power_of_two() {
            return Err(BatchError::InvalidSettingsValue(format!(
                "shadow_map_page_size must be a non-zero power of two, got {}",
                self.shadow_map_page_size
            )));
        }
        Ok(())
    }

    /// Hash of every field that influences pipeline state creation.
    #[must_use]
    pub fn pipeline_hash(&self) -> u64 {
        let c = &self.collector;
        let bytes = [
            u8::from(self.deferred),
            u8::from(self.gamma_correction),
            u8::from(self.draw_shadows),
            c.material_quality as u8,
            c.max_pixel_lights.min(u32::from(u8::MAX)) as u8,
        ];
        xxh3_64(&bytes)
    }
}
