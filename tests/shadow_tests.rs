//! Shadow Tests
//!
//! Tests for:
//! - Cascade split computation (Practical Split Scheme)
//! - Frustum slice corners in world space
//! - Cascade, spot and point face view-projections
//! - Shadow atlas layout per light type
//! - Shadow caster collection, including casters outside the view
//! - Light ordering by shadow map size and id, per scheduler
//! - Shadow policy (disabled views, missing casters, exhausted atlas)

use std::sync::Arc;

use glam::{IVec2, Mat4, Vec3, Vec4};

use myth_batch::renderer::pipeline::RenderPipeline;
use myth_batch::renderer::pipeline_state::PipelineStateRegistry;
use myth_batch::renderer::shadow_utils::*;
use myth_batch::renderer::work_queue::{InlineScheduler, RayonScheduler, WorkScheduler};
use myth_batch::scene::{
    BoundingBox, Camera, Drawable, Light, SceneIndex, StaticModel, UpdateGeometryType,
    ViewOverrideFlags,
};
use myth_batch::resources::Geometry;
use myth_batch::settings::RenderPipelineSettings;

const EPSILON: f32 = 1e-4;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn project(vp: &Mat4, point: Vec3) -> Vec3 {
    let clip = *vp * Vec4::new(point.x, point.y, point.z, 1.0);
    clip.truncate() / clip.w
}

// ============================================================================
// compute_cascade_splits Tests
// ============================================================================

#[test]
fn cascade_splits_monotonically_increasing() {
    let splits = compute_cascade_splits(4, 0.1, 100.0, 0.5);
    for i in 1..4 {
        assert!(
            splits[i] > splits[i - 1],
            "splits[{i}]={} <= splits[{}]={}",
            splits[i],
            i - 1,
            splits[i - 1]
        );
    }
    assert!(approx(splits[3], 100.0));
}

#[test]
fn cascade_splits_lambda_0_uniform() {
    let splits = compute_cascade_splits(4, 1.0, 100.0, 0.0);
    let expected = [25.75, 50.5, 75.25, 100.0];
    for i in 0..4 {
        assert!(approx(splits[i], expected[i]), "splits[{i}]: expected {}, got {}", expected[i], splits[i]);
    }
}

#[test]
fn cascade_splits_lambda_1_logarithmic() {
    let splits = compute_cascade_splits(4, 1.0, 100.0, 1.0);
    assert!((splits[0] - 3.162).abs() < 0.01);
    assert!(approx(splits[1], 10.0));
    assert!((splits[2] - 31.62).abs() < 0.1);
    assert!(approx(splits[3], 100.0));
}

#[test]
fn cascade_splits_clamped_to_max() {
    let splits = compute_cascade_splits(10, 0.1, 100.0, 0.5);
    assert_eq!(splits.len(), MAX_CASCADES as usize);
    assert!(approx(splits[3], 100.0));
}

// ============================================================================
// compute_frustum_corners_world Tests
// ============================================================================

#[test]
fn frustum_corners_near_far_depths() {
    let camera = Camera::new_perspective(60.0, 1.0, 0.1, 100.0);
    let corners = compute_frustum_corners_world(&camera, 1.0, 10.0);

    for corner in &corners[..4] {
        assert!(approx(corner.z, -1.0), "near corner z = {}", corner.z);
    }
    for corner in &corners[4..] {
        assert!(approx(corner.z, -10.0), "far corner z = {}", corner.z);
    }
    assert!(approx(corners[0].x, -corners[1].x));
    assert!(approx(corners[2].y, -corners[1].y));
}

#[test]
fn frustum_corners_follow_camera_transform() {
    let mut camera = Camera::new_perspective(60.0, 1.0, 0.1, 100.0);
    camera.look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y);
    let corners = compute_frustum_corners_world(&camera, 5.0, 10.0);

    let far_center = corners[4..].iter().copied().sum::<Vec3>() / 4.0;
    assert!((far_center - Vec3::ZERO).length() < 1e-3);
    for corner in corners {
        assert!(approx(camera.view_depth(corner).clamp(5.0, 10.0), camera.view_depth(corner)));
    }
}

// ============================================================================
// Projection Tests
// ============================================================================

#[test]
fn cascade_vp_contains_slice() {
    let camera = Camera::new_perspective(60.0, 1.0, 0.1, 100.0);
    let corners = compute_frustum_corners_world(&camera, 1.0, 50.0);
    let vp = build_cascade_vp(Vec3::new(0.0, -1.0, -0.5), &corners, 2048, 100.0);

    assert!(vp.determinant().abs() > 1e-10);
    for corner in corners {
        let ndc = project(&vp, corner);
        assert!(ndc.x.abs() <= 1.0 + 1e-3 && ndc.y.abs() <= 1.0 + 1e-3, "corner outside: {ndc:?}");
        assert!((-1e-3..=1.0 + 1e-3).contains(&ndc.z), "corner depth outside: {ndc:?}");
    }
}

#[test]
fn spot_vp_near_point_maps_to_zero_depth() {
    let position = Vec3::new(0.0, 10.0, 0.0);
    let vp = build_spot_vp(position, Vec3::NEG_Y, 45.0, 50.0);
    assert!(vp.determinant().abs() > 1e-10);

    let ndc = project(&vp, position + Vec3::NEG_Y * 0.1);
    assert!(ndc.z.is_finite() && ndc.z.abs() < 0.1, "near point ndc z = {}", ndc.z);

    let ahead = project(&vp, position + Vec3::NEG_Y * 25.0);
    assert!(ahead.x.abs() < 1e-3 && ahead.y.abs() < 1e-3);
}

#[test]
fn point_faces_cover_each_axis() {
    let position = Vec3::new(1.0, 2.0, 3.0);
    let faces = build_point_face_vps(position, 10.0);
    let axes = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];

    for (vp, axis) in faces.iter().zip(axes) {
        let ndc = project(vp, position + axis * 5.0);
        assert!(ndc.x.abs() < 1e-3 && ndc.y.abs() < 1e-3, "axis {axis} maps to {ndc:?}");
        assert!((0.0..=1.0).contains(&ndc.z));
    }
}

// ============================================================================
// Collector Shadows
// ============================================================================

fn cube() -> Arc<Geometry> {
    Arc::new(Geometry::new("cube", BoundingBox::new(Vec3::splat(-1.0), Vec3::ONE)))
}

fn caster_at(position: Vec3) -> Arc<StaticModel> {
    Arc::new(
        StaticModel::new(cube(), None)
            .with_position(position)
            .with_cast_shadows(true),
    )
}

fn camera() -> Camera {
    let mut camera = Camera::new_perspective(60.0, 1.0, 0.1, 100.0);
    camera.look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y);
    camera
}

fn pipeline(settings: RenderPipelineSettings) -> RenderPipeline {
    pipeline_on(settings, Arc::new(InlineScheduler))
}

fn pipeline_on(settings: RenderPipelineSettings, scheduler: Arc<dyn WorkScheduler>) -> RenderPipeline {
    let _ = env_logger::builder().is_test(true).try_init();
    RenderPipeline::new(settings, scheduler, Arc::new(PipelineStateRegistry::new())).unwrap()
}

fn schedulers() -> [Arc<dyn WorkScheduler>; 2] {
    [Arc::new(InlineScheduler), Arc::new(RayonScheduler::new(3).unwrap())]
}

fn shadowed_sun() -> Arc<Light> {
    Arc::new(
        Light::new_directional(Vec3::ONE, 1.0)
            .with_direction(Vec3::NEG_Y)
            .with_cast_shadows(true),
    )
}

fn shadowed_point() -> Arc<Light> {
    Arc::new(
        Light::new_point(Vec3::ONE, 1.0, 10.0)
            .with_position(Vec3::new(0.0, 4.0, 0.0))
            .with_cast_shadows(true),
    )
}

#[test]
fn point_light_uses_six_faces() {
    let mut index = SceneIndex::new();
    index.add_drawable(caster_at(Vec3::ZERO));
    let point = shadowed_point();
    index.add_drawable(point.clone());

    let mut pipeline = pipeline(RenderPipelineSettings::default());
    let stats = pipeline.render(Arc::new(index), &camera(), 0.016);

    let light = &pipeline.collector().visible_lights()[0];
    assert_eq!(light.num_splits(), 6);
    assert_eq!(light.shadow_map_size(), IVec2::new(3072, 2048));
    let region = light.shadow_map().unwrap();
    assert_eq!(region.size(), IVec2::new(3072, 2048));
    assert!(light.splits().iter().all(|split| split.region.is_some()));
    assert_eq!(light.shader_parameters().shadow_matrices.len(), 6);

    assert_eq!(stats.shadowed_lights, 1);
    assert!(stats.shadow_batches >= 1);
    // The caster sits straight below the light
    let below = pipeline.shadow_pass().sorted_shadow_batches(point.id(), 3);
    assert_eq!(below.len(), 1);
    assert!(below[0].pipeline_state.is_some());
}

#[test]
fn directional_light_uses_cascades() {
    let mut index = SceneIndex::new();
    index.add_drawable(caster_at(Vec3::ZERO));
    index.add_drawable(shadowed_sun());

    let mut pipeline = pipeline(RenderPipelineSettings::default());
    pipeline.render(Arc::new(index), &camera(), 0.016);

    let light = &pipeline.collector().visible_lights()[0];
    assert_eq!(light.num_splits(), 4);
    assert_eq!(light.shadow_map_size(), IVec2::new(2048, 2048));

    // Cascades are focused on the visible depth range 9..11
    let splits = light.splits();
    assert!(approx(splits[0].z_near, 9.0));
    assert!(approx(splits[3].z_far, 11.0));
    let params = light.shader_parameters();
    assert!((params.cascade_splits.w - 0.11).abs() < 1e-3);
}

#[test]
fn lights_sorted_by_shadow_map_size() {
    let mut index = SceneIndex::new();
    index.add_drawable(caster_at(Vec3::ZERO));
    let sun = shadowed_sun();
    let point = shadowed_point();
    let unshadowed = Arc::new(Light::new_point(Vec3::ONE, 1.0, 10.0));
    index.add_drawable(sun.clone());
    index.add_drawable(point.clone());
    index.add_drawable(unshadowed.clone());

    let mut pipeline = pipeline(RenderPipelineSettings::default());
    pipeline.render(Arc::new(index), &camera(), 0.016);

    let order: Vec<_> = pipeline
        .collector()
        .visible_lights()
        .iter()
        .map(|light| light.light().id())
        .collect();
    assert_eq!(order, vec![point.id(), sun.id(), unshadowed.id()]);
}

#[test]
fn equal_shadow_maps_sorted_by_descending_id() {
    let mut index = SceneIndex::new();
    for x in -3..=3 {
        index.add_drawable(caster_at(Vec3::new(x as f32 * 2.0, 0.0, 0.0)));
    }
    let first_point = Arc::new(
        Light::new_point(Vec3::ONE, 1.0, 10.0)
            .with_position(Vec3::new(-2.0, 4.0, 0.0))
            .with_cast_shadows(true),
    );
    let second_point = Arc::new(
        Light::new_point(Vec3::ONE, 1.0, 10.0)
            .with_position(Vec3::new(2.0, 4.0, 0.0))
            .with_cast_shadows(true),
    );
    let unshadowed: Vec<_> = (0..4)
        .map(|i| Arc::new(Light::new_point(Vec3::ONE, 1.0, 10.0).with_position(Vec3::new(i as f32, -2.0, 0.0))))
        .collect();
    index.add_drawable(first_point.clone());
    index.add_drawable(second_point.clone());
    for light in &unshadowed {
        index.add_drawable(light.clone());
    }
    let index = Arc::new(index);

    let mut expected = vec![second_point.id(), first_point.id()];
    expected.extend(unshadowed.iter().rev().map(|light| light.id()));

    for scheduler in schedulers() {
        let mut pipeline = pipeline_on(RenderPipelineSettings::default(), scheduler);
        pipeline.render(index.clone(), &camera(), 0.016);

        let lights = pipeline.collector().visible_lights();
        assert_eq!(lights[0].shadow_map_size(), lights[1].shadow_map_size());
        assert_ne!(lights[0].shadow_map_size(), IVec2::ZERO);
        let order: Vec<_> = lights.iter().map(|light| light.light().id()).collect();
        assert_eq!(order, expected);
    }
}

#[test]
fn shadow_batches_match_across_schedulers() {
    let mut index = SceneIndex::new();
    for x in -3..=3 {
        for z in -2..=2 {
            index.add_drawable(caster_at(Vec3::new(x as f32 * 2.0, 0.0, z as f32 * 2.0)));
        }
    }
    let point = shadowed_point();
    let sun = shadowed_sun();
    index.add_drawable(point.clone());
    index.add_drawable(sun.clone());
    let index = Arc::new(index);

    let collect = |scheduler: Arc<dyn WorkScheduler>| {
        let mut pipeline = pipeline_on(RenderPipelineSettings::default(), scheduler);
        let stats = pipeline.render(index.clone(), &camera(), 0.016);
        let mut per_split = Vec::new();
        for light in [&point, &sun] {
            for split_index in 0..6 {
                let batches = pipeline.shadow_pass().sorted_shadow_batches(light.id(), split_index);
                let ids: Vec<_> = batches.iter().map(|batch| batch.drawable.base().id()).collect();
                per_split.push(ids);
            }
        }
        (stats.shadow_batches, per_split)
    };

    let [inline, threaded] = schedulers();
    let inline = collect(inline);
    assert!(inline.0 > 0);
    assert_eq!(inline, collect(threaded));
}

#[test]
fn offscreen_caster_is_updated() {
    let mut index = SceneIndex::new();
    index.add_drawable(caster_at(Vec3::ZERO));
    let offscreen = Arc::new(
        StaticModel::new(cube(), None)
            .with_position(Vec3::new(0.0, 30.0, 0.5))
            .with_cast_shadows(true)
            .with_update_geometry_type(UpdateGeometryType::WorkerThread),
    );
    index.add_drawable(offscreen.clone());
    index.add_drawable(shadowed_sun());

    let mut pipeline = pipeline(RenderPipelineSettings::default());
    pipeline.render(Arc::new(index), &camera(), 0.016);

    let collector = pipeline.collector();
    assert_eq!(collector.visible_geometries().len(), 1);
    assert!(offscreen.base().is_in_view(1));
    assert_eq!(offscreen.geometry_update_count(), 1);

    let light = &collector.visible_lights()[0];
    assert!(
        light
            .splits()
            .iter()
            .any(|split| split.casters.iter().any(|c| c.base().id() == offscreen.base().id()))
    );
}

#[test]
fn no_casters_no_shadow_map() {
    let mut index = SceneIndex::new();
    index.add_drawable(Arc::new(StaticModel::new(cube(), None)));
    index.add_drawable(shadowed_point());

    let mut pipeline = pipeline(RenderPipelineSettings::default());
    let stats = pipeline.render(Arc::new(index), &camera(), 0.016);

    let light = &pipeline.collector().visible_lights()[0];
    assert!(light.has_shadow());
    assert_eq!(light.num_splits(), 0);
    assert_eq!(light.shadow_map_size(), IVec2::ZERO);
    assert!(light.shadow_map().is_none());
    assert_eq!(stats.shadow_map_pages, 0);
}

#[test]
fn disabled_view_shadows() {
    let mut index = SceneIndex::new();
    index.add_drawable(caster_at(Vec3::ZERO));
    index.add_drawable(shadowed_point());

    let mut camera = camera();
    camera.view_override_flags = ViewOverrideFlags::DISABLE_SHADOWS;
    let mut pipeline = pipeline(RenderPipelineSettings::default());
    let stats = pipeline.render(Arc::new(index), &camera, 0.016);

    assert!(!pipeline.collector().visible_lights()[0].has_shadow());
    assert_eq!(stats.shadowed_lights, 0);
    assert_eq!(stats.shadow_batches, 0);
}

#[test]
fn exhausted_atlas_renders_unshadowed() {
    let mut index = SceneIndex::new();
    index.add_drawable(caster_at(Vec3::ZERO));
    index.add_drawable(shadowed_point());

    // 3072x2048 does not fit into a 2048 page
    let settings = RenderPipelineSettings {
        shadow_map_page_size: 2048,
        ..Default::default()
    };
    let mut pipeline = pipeline(settings);
    let stats = pipeline.render(Arc::new(index), &camera(), 0.016);

    let light = &pipeline.collector().visible_lights()[0];
    assert!(light.shadow_map().is_none());
    assert_eq!(light.num_splits(), 0);
    assert!(light.shader_parameters().shadow_matrices.is_empty());
    assert_eq!(stats.shadowed_lights, 0);
    assert_eq!(stats.shadow_batches, 0);
}
