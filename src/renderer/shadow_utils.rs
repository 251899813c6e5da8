//! Shadow Utilities
//!
//! Pure math for shadow splits, kept separate from [`SceneLight`] so it can
//! be tested in isolation.
//!
//! - Cascade split distances (Practical Split Scheme)
//! - Cascade range focusing on the visible scene depth range
//! - Frustum slice corners in world space
//! - Orthographic cascade, perspective spot and cube-face point projections
//!
//! [`SceneLight`]: crate::renderer::collector::SceneLight

use glam::{Mat4, Vec3};

use crate::renderer::collector::z_range::DrawableZRange;
use crate::scene::camera::{Camera, ProjectionType};

/// Maximum cascade count per directional light.
pub const MAX_CASCADES: u32 = 4;

/// Number of faces of a point light shadow.
pub const POINT_LIGHT_FACES: usize = 6;

const SAFE_UP_THRESHOLD: f32 = 0.99;

fn safe_direction(direction: Vec3) -> Vec3 {
    direction.try_normalize().unwrap_or(Vec3::NEG_Z)
}

fn safe_up(direction: Vec3) -> Vec3 {
    if direction.y.abs() > SAFE_UP_THRESHOLD { Vec3::X } else { Vec3::Y }
}

// ============================================================================
// Cascade Splits
// ============================================================================

/// Far distances of each cascade, Practical Split Scheme.
///
/// `lambda` blends between uniform (`0.0`) and logarithmic (`1.0`)
/// distribution. The last used entry always equals `far`; unused entries
/// stay zero.
#[must_use]
pub fn compute_cascade_splits(
    cascade_count: u32,
    near: f32,
    far: f32,
    lambda: f32,
) -> [f32; MAX_CASCADES as usize] {
    let mut splits = [0.0f32; MAX_CASCADES as usize];
    let count = cascade_count.min(MAX_CASCADES) as usize;

    for (i, split) in splits.iter_mut().enumerate().take(count) {
        let p = (i + 1) as f32 / count as f32;
        let logarithmic = near * (far / near).powf(p);
        let uniform = near + (far - near) * p;
        *split = lambda * logarithmic + (1.0 - lambda) * uniform;
    }
    if count > 0 {
        splits[count - 1] = far;
    }
    splits
}

/// View depth interval covered by a directional light's cascades.
///
/// Starts from the camera clip range limited by `shadow_distance` (zero =
/// unlimited) and tightens it to the visible scene depth range when that
/// range is valid. Returns `None` when nothing visible is in range.
#[must_use]
pub fn focus_shadow_range(
    camera: &Camera,
    shadow_distance: f32,
    scene_z_range: DrawableZRange,
) -> Option<(f32, f32)> {
    let mut near = camera.near.max(0.01);
    let mut far = if shadow_distance > 0.0 {
        shadow_distance.min(camera.far)
    } else {
        camera.far
    };

    if scene_z_range.is_valid() {
        near = near.max(scene_z_range.min);
        far = far.min(scene_z_range.max);
    }

    (far > near).then_some((near, far))
}

// ============================================================================
// Frustum Corners in World Space
// ============================================================================

/// The 8 world-space corners of the camera frustum between two view depths.
#[must_use]
pub fn compute_frustum_corners_world(camera: &Camera, slice_near: f32, slice_far: f32) -> [Vec3; 8] {
    let proj = camera.projection_matrix();
    let (w_near, h_near, w_far, h_far) = match camera.projection_type {
        ProjectionType::Perspective => {
            let tan_half_fov = 1.0 / proj.y_axis.y;
            let aspect = proj.y_axis.y / proj.x_axis.x;
            let h_near = tan_half_fov * slice_near;
            let h_far = tan_half_fov * slice_far;
            (h_near * aspect, h_near, h_far * aspect, h_far)
        }
        ProjectionType::Orthographic => {
            let h = camera.ortho_size;
            let w = h * camera.aspect;
            (w, h, w, h)
        }
    };

    // RH view space: -Z is forward
    let corners_view = [
        Vec3::new(-w_near, -h_near, -slice_near),
        Vec3::new(w_near, -h_near, -slice_near),
        Vec3::new(w_near, h_near, -slice_near),
        Vec3::new(-w_near, h_near, -slice_near),
        Vec3::new(-w_far, -h_far, -slice_far),
        Vec3::new(w_far, -h_far, -slice_far),
        Vec3::new(w_far, h_far, -slice_far),
        Vec3::new(-w_far, h_far, -slice_far),
    ];

    let world = camera.world_matrix();
    corners_view.map(|c| world.transform_point3(c))
}

// ============================================================================
// Projections
// ============================================================================

/// Orthographic view-projection of one cascade.
///
/// Fits the light-space AABB of the slice corners, pulls the near plane
/// towards the light by `caster_extension` so off-screen casters still land
/// in the map, and snaps the XY bounds to the texel grid.
#[must_use]
pub fn build_cascade_vp(
    light_direction: Vec3,
    frustum_corners: &[Vec3; 8],
    shadow_map_size: u32,
    caster_extension: f32,
) -> Mat4 {
    let dir = safe_direction(light_direction);
    let center = frustum_corners.iter().copied().sum::<Vec3>() / 8.0;
    let light_view = Mat4::look_at_rh(center - dir, center, safe_up(dir));

    let mut ls_min = Vec3::splat(f32::MAX);
    let mut ls_max = Vec3::splat(f32::MIN);
    for corner in frustum_corners {
        let ls = light_view.transform_point3(*corner);
        ls_min = ls_min.min(ls);
        ls_max = ls_max.max(ls);
    }

    // In RH light view ls_max.z faces the light
    let depth = (ls_max.z - ls_min.z).max(1.0);
    ls_max.z += caster_extension.max(depth);
    ls_min.z -= depth;

    let texels = shadow_map_size.max(1) as f32;
    let texel_x = (ls_max.x - ls_min.x) / texels;
    let texel_y = (ls_max.y - ls_min.y) / texels;
    if texel_x > 0.0 {
        ls_min.x = (ls_min.x / texel_x).floor() * texel_x;
        ls_max.x = (ls_max.x / texel_x).ceil() * texel_x;
    }
    if texel_y > 0.0 {
        ls_min.y = (ls_min.y / texel_y).floor() * texel_y;
        ls_max.y = (ls_max.y / texel_y).ceil() * texel_y;
    }

    let proj = Mat4::orthographic_rh(ls_min.x, ls_max.x, ls_min.y, ls_max.y, -ls_max.z, -ls_min.z);
    proj * light_view
}

/// Perspective view-projection of a spot light. `fov` is the full cone angle in degrees.
#[must_use]
pub fn build_spot_vp(position: Vec3, direction: Vec3, fov: f32, range: f32) -> Mat4 {
    let dir = safe_direction(direction);
    let view = Mat4::look_at_rh(position, position + dir, safe_up(dir));
    let fov = fov.to_radians().clamp(0.1, std::f32::consts::PI - 0.01);
    let far = range.max(0.1);
    let near = (far * 0.01).min(0.1);
    Mat4::perspective_rh(fov, 1.0, near, far) * view
}

/// Cube-face view-projections of a point light in +X, -X, +Y, -Y, +Z, -Z order.
#[must_use]
pub fn build_point_face_vps(position: Vec3, range: f32) -> [Mat4; POINT_LIGHT_FACES] {
    const FACES: [(Vec3, Vec3); POINT_LIGHT_FACES] = [
        (Vec3::X, Vec3::NEG_Y),
        (Vec3::NEG_X, Vec3::NEG_Y),
        (Vec3::Y, Vec3::Z),
        (Vec3::NEG_Y, Vec3::NEG_Z),
        (Vec3::Z, Vec3::NEG_Y),
        (Vec3::NEG_Z, Vec3::NEG_Y),
    ];
    let far = range.max(0.1);
    let near = (far * 0.01).min(0.1);
    let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, near, far);
    FACES.map(|(forward, up)| proj * Mat4::look_at_rh(position, position + forward, up))
}
