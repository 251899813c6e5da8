//! Scene Integration Tests
//!
//! Tests for:
//! - SceneIndex: frustum, flag and view mask queries, dense index removal
//! - Drawable zone cache and pipeline state dirtiness
//! - Camera distance for perspective and orthographic views
//! - Light volumes: bounds, direction and containment

use std::sync::Arc;

use glam::{Affine3A, Vec3};
use myth_batch::resources::Geometry;
use myth_batch::scene::drawable::INVALID_DRAWABLE_INDEX;
use myth_batch::scene::{
    BoundingBox, Camera, Drawable, DrawableFlags, Light, SceneIndex, SpatialIndex, StaticModel, Zone,
};

fn cube() -> Arc<Geometry> {
    Arc::new(Geometry::new("cube", BoundingBox::new(Vec3::splat(-1.0), Vec3::ONE)))
}

fn camera() -> Camera {
    let mut camera = Camera::new_perspective(60.0, 1.0, 0.1, 100.0);
    camera.look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y);
    camera
}

fn collect(index: &SceneIndex, camera: &Camera, flags: DrawableFlags) -> Vec<Arc<dyn Drawable>> {
    let mut out = Vec::new();
    index.collect_drawables(camera.frustum(), flags, camera.view_mask, &mut out);
    out
}

fn ids(drawables: &[Arc<dyn Drawable>]) -> Vec<u64> {
    drawables.iter().map(|d| d.base().id().0).collect()
}

fn approx(a: Vec3, b: Vec3) -> bool {
    a.abs_diff_eq(b, 1e-4)
}

// ============================================================================
// SceneIndex Queries
// ============================================================================

#[test]
fn frustum_query_skips_offscreen_drawables() {
    let mut index = SceneIndex::new();
    let visible = Arc::new(StaticModel::new(cube(), None));
    let beyond_far = Arc::new(StaticModel::new(cube(), None).with_position(Vec3::new(0.0, 0.0, -200.0)));
    let to_the_side = Arc::new(StaticModel::new(cube(), None).with_position(Vec3::new(50.0, 0.0, 0.0)));
    let behind = Arc::new(StaticModel::new(cube(), None).with_position(Vec3::new(0.0, 0.0, 20.0)));
    index.add_drawable(visible.clone());
    index.add_drawable(beyond_far);
    index.add_drawable(to_the_side);
    index.add_drawable(behind);

    let found = collect(&index, &camera(), DrawableFlags::GEOMETRY);
    assert_eq!(ids(&found), [visible.base().id().0]);
}

#[test]
fn query_filters_flags_and_view_mask() {
    let mut index = SceneIndex::new();
    let model = Arc::new(StaticModel::new(cube(), None));
    let hidden = Arc::new(StaticModel::new(cube(), None).with_view_mask(0b10));
    let light = Arc::new(Light::new_point(Vec3::ONE, 1.0, 5.0));
    index.add_drawable(model.clone());
    index.add_drawable(hidden.clone());
    index.add_drawable(light.clone());

    let mut camera = camera();
    camera.view_mask = 0b01;

    assert_eq!(ids(&collect(&index, &camera, DrawableFlags::GEOMETRY)), [model.base().id().0]);
    assert_eq!(ids(&collect(&index, &camera, DrawableFlags::LIGHT)), [light.id().0]);
    assert_eq!(collect(&index, &camera, DrawableFlags::all()).len(), 2);

    camera.view_mask = u32::MAX;
    assert_eq!(collect(&index, &camera, DrawableFlags::all()).len(), 3);
}

#[test]
fn removed_drawables_are_no_longer_collected() {
    let mut index = SceneIndex::new();
    let first = Arc::new(StaticModel::new(cube(), None));
    let last = Arc::new(StaticModel::new(cube(), None).with_position(Vec3::X));
    assert_eq!(index.add_drawable(first.clone()), 0);
    assert_eq!(index.add_drawable(last.clone()), 1);

    let removed = index.remove_drawable(first.base().id()).unwrap();
    assert_eq!(removed.base().id(), first.base().id());
    assert_eq!(first.base().index(), INVALID_DRAWABLE_INDEX);
    assert_eq!(last.base().index(), 0);
    assert_eq!(index.drawable_count(), 1);
    assert_eq!(ids(&collect(&index, &camera(), DrawableFlags::GEOMETRY)), [last.base().id().0]);

    assert!(index.remove_drawable(first.base().id()).is_err());
}

// ============================================================================
// Zone Cache
// ============================================================================

#[test]
fn zone_cache_hits_within_safe_radius() {
    let mut index = SceneIndex::new();
    let zone = index.add_zone(Zone::new(BoundingBox::new(Vec3::splat(-10.0), Vec3::splat(10.0))));
    let model = StaticModel::new(cube(), None);
    let base = model.base();

    assert!(base.update_cached_zone(&index), "first lookup always misses");
    assert_eq!(base.cached_zone().zone_id(), zone.id());
    assert!(!base.update_cached_zone(&index));

    base.set_transform(Affine3A::from_translation(Vec3::new(5.0, 0.0, 0.0)));
    assert!(!base.update_cached_zone(&index));
    assert_eq!(index.zone_query_count(), 1);

    base.set_transform(Affine3A::from_translation(Vec3::new(12.0, 0.0, 0.0)));
    assert!(base.update_cached_zone(&index));
    assert_eq!(base.cached_zone().zone_id(), index.default_zone().id());
    assert_eq!(index.zone_query_count(), 2);
}

#[test]
fn zone_mask_excludes_zones() {
    let mut index = SceneIndex::new();
    index.add_zone(Zone::new(BoundingBox::new(Vec3::splat(-10.0), Vec3::splat(10.0))).with_zone_mask(0b10));
    let model = StaticModel::new(cube(), None).with_zone_mask(0b01);

    model.base().update_cached_zone(&index);
    assert_eq!(model.base().cached_zone().zone_id(), index.default_zone().id());
}

#[test]
fn zone_change_dirties_pipeline_state() {
    let mut index = SceneIndex::new();
    index.add_zone(Zone::new(BoundingBox::new(Vec3::splat(-10.0), Vec3::splat(10.0))));
    let model = StaticModel::new(cube(), None);
    let base = model.base();

    base.update_cached_zone(&index);
    let inside = base.pipeline_state_hash();
    assert_ne!(inside, 0);
    assert!(!base.is_pipeline_state_dirty());
    assert_eq!(base.pipeline_state_hash(), inside);

    base.set_transform(Affine3A::from_translation(Vec3::new(30.0, 0.0, 0.0)));
    assert!(base.update_cached_zone(&index));
    assert!(base.is_pipeline_state_dirty());
    assert_ne!(base.pipeline_state_hash(), inside);
}

#[test]
fn replacing_batches_dirties_pipeline_state() {
    let model = StaticModel::new(cube(), None);
    let base = model.base();
    base.pipeline_state_hash();
    assert!(!base.is_pipeline_state_dirty());

    base.set_batches(base.batches().iter().cloned().collect::<Vec<_>>());
    assert!(base.is_pipeline_state_dirty());
}

// ============================================================================
// Camera
// ============================================================================

#[test]
fn camera_distance_depends_on_projection() {
    let point = Vec3::new(3.0, 0.0, 0.0);

    let perspective = camera();
    assert!((perspective.distance(point) - 109.0_f32.sqrt()).abs() < 1e-4);
    assert!((perspective.view_depth(point) - 10.0).abs() < 1e-4);
    assert!(approx(perspective.forward(), Vec3::NEG_Z));

    let mut orthographic = Camera::new_orthographic(10.0, 1.0, 0.1, 100.0);
    orthographic.look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y);
    assert!(orthographic.is_orthographic());
    assert!((orthographic.distance(point) - 10.0).abs() < 1e-4);
}

// ============================================================================
// Lights
// ============================================================================

#[test]
fn point_light_bounds_follow_range() {
    let light = Light::new_point(Vec3::ONE, 1.0, 4.0).with_position(Vec3::new(1.0, 2.0, 3.0));
    let bounds = light.base().world_bounding_box();
    assert!(approx(bounds.min, Vec3::new(-3.0, -2.0, -1.0)));
    assert!(approx(bounds.max, Vec3::new(5.0, 6.0, 7.0)));

    let light = light.with_range(1.0);
    let bounds = light.base().world_bounding_box();
    assert!(approx(bounds.min, Vec3::new(0.0, 1.0, 2.0)));
    assert!(light.contains_point(Vec3::new(1.0, 2.5, 3.0)));
    assert!(!light.contains_point(Vec3::ZERO));
}

#[test]
fn directional_light_is_unbounded() {
    let light = Light::new_directional(Vec3::ONE, 1.0).with_direction(Vec3::NEG_Y);
    assert!(approx(light.direction(), Vec3::NEG_Y));
    assert!(light.contains_point(Vec3::splat(1.0e4)));
    assert!(light.base().world_bounding_box().contains_point(Vec3::splat(1.0e4)));
}

#[test]
fn spot_light_contains_only_its_cone() {
    let light = Light::new_spot(Vec3::ONE, 1.0, 10.0, 30.0);
    assert!(approx(light.direction(), Vec3::NEG_Z));
    assert!(light.contains_point(Vec3::new(0.0, 0.0, -5.0)));
    assert!(!light.contains_point(Vec3::new(0.0, 0.0, 5.0)));
    assert!(!light.contains_point(Vec3::new(0.0, 0.0, -11.0)));
    assert!(!light.contains_point(Vec3::new(5.0, 0.0, -5.0)));
}
