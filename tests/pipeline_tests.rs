//! Render Pipeline Tests
//!
//! Tests for:
//! - Forward and deferred pass wiring
//! - Pipeline state descriptors built by the default callback
//! - Light volume batches and their raster state
//! - Settings validation and cache invalidation on settings change
//! - Batches dropped when the device rejects a pipeline state

use std::sync::Arc;

use glam::Vec3;

use myth_batch::renderer::collector::LightGeometry;
use myth_batch::renderer::passes::ScenePass;
use myth_batch::renderer::pipeline::RenderPipeline;
use myth_batch::renderer::pipeline_state::{
    DepthCompare, PipelineStateDesc, PipelineStateFactory, PipelineStateHandle, PipelineStateRegistry,
};
use myth_batch::renderer::work_queue::InlineScheduler;
use myth_batch::resources::{BlendMode, CullMode, Geometry};
use myth_batch::scene::{BoundingBox, Camera, Light, SceneIndex, StaticModel};
use myth_batch::settings::RenderPipelineSettings;
use myth_batch::BatchError;

fn cube() -> Arc<Geometry> {
    Arc::new(Geometry::new("cube", BoundingBox::new(Vec3::splat(-1.0), Vec3::ONE)))
}

fn camera_at(eye: Vec3) -> Camera {
    let mut camera = Camera::new_perspective(60.0, 1.0, 0.1, 100.0);
    camera.look_at(eye, Vec3::ZERO, Vec3::Y);
    camera
}

fn camera() -> Camera {
    camera_at(Vec3::new(0.0, 0.0, 10.0))
}

fn lit_scene() -> Arc<SceneIndex> {
    let mut index = SceneIndex::new();
    index.add_drawable(Arc::new(StaticModel::new(cube(), None)));
    index.add_drawable(Arc::new(
        Light::new_directional(Vec3::ONE, 1.0).with_direction(Vec3::NEG_Y),
    ));
    index.add_drawable(Arc::new(
        Light::new_point(Vec3::ONE, 1.0, 5.0).with_position(Vec3::new(2.0, 0.0, 0.0)),
    ));
    Arc::new(index)
}

fn pipeline_with(
    settings: RenderPipelineSettings,
) -> anyhow::Result<(RenderPipeline, Arc<PipelineStateRegistry>)> {
    let _ = env_logger::builder().is_test(true).try_init();
    let registry = Arc::new(PipelineStateRegistry::new());
    let pipeline = RenderPipeline::new(settings, Arc::new(InlineScheduler), registry.clone())?;
    Ok((pipeline, registry))
}

fn desc(registry: &PipelineStateRegistry, handle: PipelineStateHandle) -> PipelineStateDesc {
    registry.get(handle).expect("registered pipeline state")
}

/// Factory that rejects every descriptor.
struct RejectingFactory;

impl PipelineStateFactory for RejectingFactory {
    fn create_pipeline_state(&self, _desc: &PipelineStateDesc) -> Option<PipelineStateHandle> {
        None
    }
}

// ============================================================================
// Wiring
// ============================================================================

#[test]
fn forward_wiring() -> anyhow::Result<()> {
    let (mut pipeline, _) = pipeline_with(RenderPipelineSettings::default())?;
    let stats = pipeline.render(lit_scene(), &camera(), 0.016);

    let names: Vec<_> = pipeline
        .collector()
        .passes()
        .iter()
        .map(|pass| pass.name().to_owned())
        .collect();
    assert_eq!(names, ["PASS_BASE", "PASS_ALPHA"]);
    assert!(pipeline.collector().shadow_pass().is_some());

    assert_eq!(stats.frame_number, 1);
    assert_eq!(stats.visible_geometries, 1);
    assert_eq!(stats.visible_lights, 2);
    assert_eq!(stats.scene_batches, 1);
    assert_eq!(stats.light_volume_batches, 0);
    Ok(())
}

#[test]
fn deferred_wiring_builds_light_volumes() -> anyhow::Result<()> {
    let settings = RenderPipelineSettings {
        deferred: true,
        ..Default::default()
    };
    let (mut pipeline, registry) = pipeline_with(settings)?;
    let stats = pipeline.render(lit_scene(), &camera(), 0.016);

    assert_eq!(pipeline.collector().passes().len(), 1);
    let deferred = pipeline.deferred_pass().sorted_batches();
    assert_eq!(deferred.len(), 1);
    assert_eq!(deferred[0].pass.name_str(), "deferred");
    assert_eq!(deferred[0].light_index, None);

    assert_eq!(stats.light_volume_batches, 2);
    let collector = pipeline.collector();
    for batch in collector.light_volume_batches() {
        let light = collector.visible_light(batch.light_index).unwrap();
        assert_eq!(batch.geometry, LightGeometry::for_light_type(light.light().light_type));
        let state = desc(&registry, batch.pipeline_state.unwrap());
        assert_eq!(state.blend_mode, BlendMode::Add);
        assert!(!state.depth_write);
        assert!(state.has_define("PASS_LIGHTVOLUME"));
        assert!(state.has_define(light.light().light_type.define()));
    }
    Ok(())
}

#[test]
fn light_volume_raster_state_depends_on_camera() -> anyhow::Result<()> {
    let settings = RenderPipelineSettings {
        deferred: true,
        ..Default::default()
    };
    let mut index = SceneIndex::new();
    index.add_drawable(Arc::new(StaticModel::new(cube(), None)));
    index.add_drawable(Arc::new(Light::new_point(Vec3::ONE, 1.0, 5.0)));
    index.add_drawable(Arc::new(Light::new_directional(Vec3::ONE, -1.0)));
    let index = Arc::new(index);

    let (mut pipeline, registry) = pipeline_with(settings)?;
    let states = |pipeline: &RenderPipeline| -> Vec<(LightGeometry, PipelineStateDesc)> {
        pipeline
            .collector()
            .light_volume_batches()
            .iter()
            .map(|batch| (batch.geometry, desc(&registry, batch.pipeline_state.unwrap())))
            .collect()
    };

    // Outside the point light's range
    pipeline.render(index.clone(), &camera(), 0.016);
    for (geometry, state) in states(&pipeline) {
        match geometry {
            LightGeometry::Sphere => {
                assert_eq!(state.cull_mode, CullMode::Back);
                assert_eq!(state.depth_compare, DepthCompare::LessEqual);
                assert_eq!(state.blend_mode, BlendMode::Add);
            }
            LightGeometry::FullScreenQuad => {
                assert_eq!(state.cull_mode, CullMode::None);
                assert_eq!(state.depth_compare, DepthCompare::Always);
                assert_eq!(state.blend_mode, BlendMode::Subtract);
            }
            LightGeometry::Cone => unreachable!("no spot lights in scene"),
        }
    }

    // Inside the point light's range
    pipeline.render(index, &camera_at(Vec3::new(0.0, 0.0, 3.0)), 0.016);
    let (_, sphere) = states(&pipeline)
        .into_iter()
        .find(|(geometry, _)| *geometry == LightGeometry::Sphere)
        .unwrap();
    assert_eq!(sphere.cull_mode, CullMode::Front);
    assert_eq!(sphere.depth_compare, DepthCompare::GreaterEqual);
    Ok(())
}

// ============================================================================
// Pipeline states
// ============================================================================

#[test]
fn forward_pipeline_state_defines() -> anyhow::Result<()> {
    let settings = RenderPipelineSettings {
        gamma_correction: true,
        ..Default::default()
    };
    let (mut pipeline, registry) = pipeline_with(settings)?;
    pipeline.render(lit_scene(), &camera(), 0.016);

    let base = pipeline.base_pass().sorted_base_batches();
    assert_eq!(base.len(), 1);
    let state = desc(&registry, base[0].pipeline_state);
    assert_eq!(state.pass_name, "litbase");
    for define in ["PASS_LITBASE", "PERPIXEL", "DIRLIGHT", "NUMVERTEXLIGHTS=1", "GAMMA_CORRECTION"] {
        assert!(state.has_define(define), "missing {define} in {:?}", state.defines);
    }
    assert!(!state.has_define("SHADOW"));
    Ok(())
}

#[test]
fn settings_change_invalidates_caches() -> anyhow::Result<()> {
    let (mut pipeline, registry) = pipeline_with(RenderPipelineSettings::default())?;
    pipeline.render(lit_scene(), &camera(), 0.016);
    let before = pipeline.base_pass().sorted_base_batches()[0].pipeline_state;
    assert!(!pipeline.base_pass().pipeline_cache().is_empty());

    // Same settings: cached states are reused
    pipeline.render(lit_scene(), &camera(), 0.016);
    assert_eq!(pipeline.base_pass().sorted_base_batches()[0].pipeline_state, before);
    let registered = registry.len();

    pipeline.apply_settings(RenderPipelineSettings {
        gamma_correction: true,
        ..Default::default()
    })?;
    pipeline.render(lit_scene(), &camera(), 0.016);
    let after = pipeline.base_pass().sorted_base_batches()[0].pipeline_state;
    assert_ne!(after, before);
    assert!(desc(&registry, after).has_define("GAMMA_CORRECTION"));
    assert!(registry.len() > registered);
    Ok(())
}

#[test]
fn rejected_pipeline_states_drop_batches() {
    let mut pipeline = RenderPipeline::new(
        RenderPipelineSettings::default(),
        Arc::new(InlineScheduler),
        Arc::new(RejectingFactory),
    )
    .unwrap();
    let stats = pipeline.render(lit_scene(), &camera(), 0.016);

    assert_eq!(stats.visible_geometries, 1);
    assert_eq!(stats.scene_batches, 0);
    assert!(pipeline.base_pass().sorted_base_batches().is_empty());
}

// ============================================================================
// Settings
// ============================================================================

#[test]
fn invalid_settings_are_rejected() {
    let settings = RenderPipelineSettings {
        shadow_map_page_size: 3000,
        ..Default::default()
    };
    let result = RenderPipeline::new(
        settings,
        Arc::new(InlineScheduler),
        Arc::new(PipelineStateRegistry::new()),
    );
    assert!(matches!(result, Err(BatchError::InvalidSettingsValue(_))));

    let mut pipeline = RenderPipeline::new(
        RenderPipelineSettings::default(),
        Arc::new(InlineScheduler),
        Arc::new(PipelineStateRegistry::new()),
    )
    .unwrap();
    assert!(pipeline.apply_settings(settings).is_err());
    assert_eq!(pipeline.settings().shadow_map_page_size, 4096);
}

#[test]
fn settings_json_round_trip() -> anyhow::Result<()> {
    let settings = RenderPipelineSettings::from_json(
        r#"{ "deferred": true, "collector": { "max_pixel_lights": 2 } }"#,
    )?;
    let json = settings.to_json()?;
    assert_eq!(RenderPipelineSettings::from_json(&json)?, settings);
    assert_eq!(settings.collector.max_pixel_lights, 2);
    Ok(())
}

#[test]
fn frame_numbers_advance() -> anyhow::Result<()> {
    let (mut pipeline, _) = pipeline_with(RenderPipelineSettings::default())?;
    let scene = lit_scene();
    for expected in 1..=3 {
        let stats = pipeline.render(scene.clone(), &camera(), 0.016);
        assert_eq!(stats.frame_number, expected);
    }
    assert_eq!(pipeline.collector().frame_info().unwrap().frame_number, 3);
    Ok(())
}
