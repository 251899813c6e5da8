use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::scene::bounds::BoundingBox;

static NEXT_GEOMETRY_ID: AtomicU64 = AtomicU64::new(1);

/// Vertex processing flavour of a source batch.
///
/// Part of the pipeline state key: the same geometry drawn skinned and
/// static needs two different pipeline states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GeometryType {
    #[default]
    Static,
    Skinned,
    Instanced,
    Billboard,
}

impl GeometryType {
    /// Shader define selecting the vertex path, if any.
    #[must_use]
    pub fn define(self) -> Option<&'static str> {
        match self {
            Self::Static => None,
            Self::Skinned => Some("SKINNED"),
            Self::Instanced => Some("INSTANCED"),
            Self::Billboard => Some("BILLBOARD"),
        }
    }
}

/// CPU-side description of a drawable mesh.
///
/// Only what batch collection needs is kept here: a stable identity for
/// pipeline state keys and the local bounds. Vertex data lives with the
/// graphics device.
#[derive(Debug)]
pub struct Geometry {
    id: u64,
    pub name: String,
    pub bounding_box: BoundingBox,
    pub vertex_count: u32,
    pub index_count: u32,
}

impl Geometry {
    #[must_use]
    pub fn new(name: impl Into<String>, bounding_box: BoundingBox) -> Self {
        Self {
            id: NEXT_GEOMETRY_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            bounding_box,
            vertex_count: 0,
            index_count: 0,
        }
    }

    #[must_use]
    pub fn with_counts(mut self, vertex_count: u32, index_count: u32) -> Self {
        self.vertex_count = vertex_count;
        self.index_count = index_count;
        self
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn geometry_ids_are_unique() {
        let a = Geometry::new("a", BoundingBox::new(Vec3::ZERO, Vec3::ONE));
        let b = Geometry::new("b", BoundingBox::new(Vec3::ZERO, Vec3::ONE));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn only_static_geometry_has_no_define() {
        assert_eq!(GeometryType::Static.define(), None);
        assert_eq!(GeometryType::Skinned.define(), Some("SKINNED"));
    }
}
