//! Materials, Techniques and Passes
//!
//! A [`Material`] owns an ordered list of [`TechniqueEntry`] records. Each
//! entry binds a [`Technique`] to a minimum [`MaterialQuality`] and a LOD
//! distance. A technique is a set of named [`Pass`]es ("base", "litbase",
//! "light", "alpha", "shadow", ...); scene passes look up the pass names they
//! render.
//!
//! Technique resolution for a drawable happens once per source batch per
//! frame, see [`Material::find_technique`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::utils::interner::{self, Symbol};

static NEXT_MATERIAL_ID: AtomicU64 = AtomicU64::new(1);

/// Material quality level. Ordered: `Low < Medium < High`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum MaterialQuality {
    Low,
    Medium,
    #[default]
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlendMode {
    #[default]
    Replace,
    Alpha,
    PremultipliedAlpha,
    Add,
    Subtract,
}

impl BlendMode {
    #[must_use]
    pub fn is_transparent(self) -> bool {
        !matches!(self, Self::Replace)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CullMode {
    None,
    #[default]
    Back,
    Front,
}

/// One render pass of a technique.
#[derive(Debug, Clone)]
pub struct Pass {
    name: Symbol,
    pub blend_mode: BlendMode,
    pub cull_mode: CullMode,
    pub depth_write: bool,
    pub defines: Vec<String>,
}

impl Pass {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: interner::intern(name),
            blend_mode: BlendMode::Replace,
            cull_mode: CullMode::Back,
            depth_write: true,
            defines: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_blend_mode(mut self, blend_mode: BlendMode) -> Self {
        self.blend_mode = blend_mode;
        self
    }

    #[must_use]
    pub fn with_depth_write(mut self, depth_write: bool) -> Self {
        self.depth_write = depth_write;
        self
    }

    #[must_use]
    pub fn with_define(mut self, define: impl Into<String>) -> Self {
        self.defines.push(define.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> Symbol {
        self.name
    }

    #[must_use]
    pub fn name_str(&self) -> &'static str {
        interner::resolve(self.name)
    }
}

/// A named set of passes.
#[derive(Debug, Clone, Default)]
pub struct Technique {
    pub name: String,
    passes: FxHashMap<Symbol, Arc<Pass>>,
}

impl Technique {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passes: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn with_pass(mut self, pass: Pass) -> Self {
        self.passes.insert(pass.name(), Arc::new(pass));
        self
    }

    #[inline]
    #[must_use]
    pub fn pass(&self, name: Symbol) -> Option<&Arc<Pass>> {
        self.passes.get(&name)
    }

    #[inline]
    #[must_use]
    pub fn has_pass(&self, name: Symbol) -> bool {
        self.passes.contains_key(&name)
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }
}

#[derive(Debug, Clone)]
pub struct TechniqueEntry {
    pub technique: Arc<Technique>,
    /// Minimum material quality this technique requires.
    pub quality: MaterialQuality,
    /// Minimum view distance at which this technique is used.
    pub lod_distance: f32,
}

#[derive(Debug)]
pub struct Material {
    id: u64,
    pub name: String,
    techniques: Vec<TechniqueEntry>,
}

impl Material {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            techniques: Vec::new(),
        }
    }

    /// Convenience constructor for a single-technique material.
    #[must_use]
    pub fn with_technique(name: impl Into<String>, technique: Arc<Technique>) -> Self {
        let mut material = Self::new(name);
        material.add_technique(technique, MaterialQuality::Low, 0.0);
        material
    }

    /// Adds a technique entry.
    ///
    /// Entries stay sorted by descending LOD distance, then descending
    /// quality, so that resolution can stop at the first acceptable entry.
    pub fn add_technique(
        &mut self,
        technique: Arc<Technique>,
        quality: MaterialQuality,
        lod_distance: f32,
    ) {
        self.techniques.push(TechniqueEntry {
            technique,
            quality,
            lod_distance,
        });
        self.techniques.sort_by(|a, b| {
            b.lod_distance
                .total_cmp(&a.lod_distance)
                .then(b.quality.cmp(&a.quality))
        });
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn techniques(&self) -> &[TechniqueEntry] {
        &self.techniques
    }

    /// Resolves the technique for a drawable at `distance` and `quality`.
    ///
    /// Returns the first entry whose quality requirement is met and whose
    /// LOD distance has been reached. A single-entry material always
    /// resolves to that entry. When no entry qualifies the last one (the
    /// nearest, lowest-quality fallback) is used. Only a material with no
    /// techniques at all fails to resolve.
    #[must_use]
    pub fn find_technique(&self, distance: f32, quality: MaterialQuality) -> Option<&Arc<Technique>> {
        if let [single] = self.techniques.as_slice() {
            return Some(&single.technique);
        }

        self.techniques
            .iter()
            .find(|entry| quality >= entry.quality && distance >= entry.lod_distance)
            .or_else(|| self.techniques.last())
            .map(|entry| &entry.technique)
    }
}
