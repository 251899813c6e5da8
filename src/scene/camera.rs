use bitflags::bitflags;
use glam::{Affine3A, Mat4, Vec3, Vec4};

use super::bounds::BoundingBox;

bitflags! {
    /// Per-camera overrides of pipeline behaviour.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ViewOverrideFlags: u8 {
        /// Force the lowest material quality for this view.
        const LOW_MATERIAL_QUALITY = 1 << 0;
        /// Never render shadows for this view.
        const DISABLE_SHADOWS      = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionType {
    Perspective,
    Orthographic,
}

/// Render camera.
///
/// View space is right-handed and looks down `-Z`. All depth values exposed
/// by the collector are measured along the camera's forward axis and are
/// therefore positive in front of the camera.
#[derive(Debug, Clone)]
pub struct Camera {
    pub projection_type: ProjectionType,
    /// Vertical field of view in radians.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    /// Half height of the orthographic view volume.
    pub ortho_size: f32,
    pub view_mask: u32,
    pub view_override_flags: ViewOverrideFlags,

    world_matrix: Affine3A,
    view_matrix: Mat4,
    projection_matrix: Mat4,
    view_projection_matrix: Mat4,
    frustum: Frustum,
}

impl Camera {
    /// `fov` is given in degrees.
    #[must_use]
    pub fn new_perspective(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut cam = Self {
            projection_type: ProjectionType::Perspective,
            fov: fov.to_radians(),
            aspect,
            near,
            far,
            ortho_size: 10.0,
            view_mask: u32::MAX,
            view_override_flags: ViewOverrideFlags::empty(),

            world_matrix: Affine3A::IDENTITY,
            view_matrix: Mat4::IDENTITY,
            projection_matrix: Mat4::IDENTITY,
            view_projection_matrix: Mat4::IDENTITY,
            frustum: Frustum::default(),
        };
        cam.update_projection_matrix();
        cam
    }

    #[must_use]
    pub fn new_orthographic(ortho_size: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut cam = Self::new_perspective(60.0, aspect, near, far);
        cam.projection_type = ProjectionType::Orthographic;
        cam.ortho_size = ortho_size;
        cam.update_projection_matrix();
        cam
    }

    pub fn update_projection_matrix(&mut self) {
        self.projection_matrix = match self.projection_type {
            // glam's perspective_rh targets [0, 1] clip depth
            ProjectionType::Perspective => {
                Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
            }
            ProjectionType::Orthographic => {
                let w = self.ortho_size * self.aspect;
                let h = self.ortho_size;
                Mat4::orthographic_rh(-w, w, -h, h, self.near, self.far)
            }
        };
        self.update_derived();
    }

    pub fn set_world_transform(&mut self, world_transform: &Affine3A) {
        self.world_matrix = *world_transform;
        self.view_matrix = Mat4::from(*world_transform).inverse();
        self.update_derived();
    }

    /// Places the camera at `eye` looking at `target`.
    pub fn look_at(&mut self, eye: Vec3, target: Vec3, up: Vec3) {
        let view = Mat4::look_at_rh(eye, target, up);
        self.world_matrix = Affine3A::from_mat4(view.inverse());
        self.view_matrix = view;
        self.update_derived();
    }

    fn update_derived(&mut self) {
        self.view_projection_matrix = self.projection_matrix * self.view_matrix;
        self.frustum = Frustum::from_matrix(self.view_projection_matrix);
    }

    #[inline]
    pub fn world_matrix(&self) -> &Affine3A { &self.world_matrix }
    #[inline]
    pub fn view_matrix(&self) -> &Mat4 { &self.view_matrix }
    #[inline]
    pub fn projection_matrix(&self) -> &Mat4 { &self.projection_matrix }
    #[inline]
    pub fn view_projection_matrix(&self) -> &Mat4 { &self.view_projection_matrix }
    #[inline]
    pub fn frustum(&self) -> &Frustum { &self.frustum }

    pub fn position(&self) -> Vec3 {
        Vec3::from(self.world_matrix.translation)
    }

    pub fn forward(&self) -> Vec3 {
        self.world_matrix.transform_vector3(-Vec3::Z).normalize_or_zero()
    }

    /// Depth of a world-space point along the view direction.
    pub fn view_depth(&self, point: Vec3) -> f32 {
        -self.view_matrix.transform_point3(point).z
    }

    /// Distance used for draw distance culling and LOD selection.
    pub fn distance(&self, point: Vec3) -> f32 {
        match self.projection_type {
            ProjectionType::Perspective => self.position().distance(point),
            ProjectionType::Orthographic => self.view_depth(point).abs(),
        }
    }

    pub fn is_orthographic(&self) -> bool {
        self.projection_type == ProjectionType::Orthographic
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Frustum {
    planes: [Vec4; 6], // Left, Right, Bottom, Top, Near, Far
}

impl Frustum {
    /// Gribb-Hartmann plane extraction for a [0, 1] depth projection.
    #[must_use]
    pub fn from_matrix(m: Mat4) -> Self {
        let rows = [m.row(0), m.row(1), m.row(2), m.row(3)];

        let mut planes = [
            rows[3] + rows[0],
            rows[3] - rows[0],
            rows[3] + rows[1],
            rows[3] - rows[1],
            rows[2],
            rows[3] - rows[2],
        ];

        for plane in &mut planes {
            let length = plane.truncate().length();
            if length > 0.0 {
                *plane /= length;
            }
        }

        Self { planes }
    }

    /// Culling frustum for shadow casters: the near plane is disabled so that
    /// casters between the light and the split volume are kept.
    #[must_use]
    pub fn from_matrix_shadow_caster(m: Mat4) -> Self {
        let mut frustum = Self::from_matrix(m);
        frustum.planes[4] = Vec4::ZERO;
        frustum
    }

    #[must_use]
    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        for plane in &self.planes {
            let dist = plane.truncate().dot(center) + plane.w;
            if dist < -radius {
                return false;
            }
        }
        true
    }

    pub fn intersects_box(&self, bounds: &BoundingBox) -> bool {
        let center = bounds.center();
        let half = bounds.half_size();
        for plane in &self.planes {
            let normal = plane.truncate();
            let dist = normal.dot(center) + plane.w;
            let radius = normal.abs().dot(half);
            if dist < -radius {
                return false;
            }
        }
        true
    }
}
