//! Proxy lifecycle through the full frame loop: creation, updates, deferred
//! destruction and draw ordering.

mod common;

use common::{
    CUBE, MATERIAL, MODEL, TEXTURE, TestHarness, content_batch, entity_payload, material_payload,
    scene_batch, texture_payload, work_count,
};
use glam::Vec3;
use render_core::EventBatchWriter;
use render_core::events::{MAX_MODEL_NODES, ModelNode, ModelPayload, Transform3x4};
use render_core::gfx::{CommandRecord, DummyCall};
use render_core::proxy::{EntityFlags, ProxyStatus};

#[test]
fn test_destroyed_mesh_outlives_frames_in_flight() {
    let mut harness = TestHarness::new();
    harness.frame_with(scene_batch(2));
    let mesh = harness.renderer.proxies().get_mesh(CUBE).clone();

    let mut batch = EventBatchWriter::new();
    batch.destroy_entity(0);
    batch.destroy_entity(1);
    batch.destroy_model(MODEL);
    batch.destroy_mesh(CUBE);
    let destroyed_at = harness.frame_with(batch);
    assert_eq!(destroyed_at.render_frame, 1);
    assert_eq!(
        harness.renderer.proxies().meshes().status(CUBE),
        ProxyStatus::Obsolete
    );

    // Frame 2 may still be waiting on frame 1's commands.
    let next = harness.frame();
    assert!(harness.backend.is_buffer_live(mesh.vertex_buffer));
    assert!(harness.backend.is_buffer_live(mesh.index_buffer));
    assert_eq!(next.destroyed, 0);

    // Frame 3 reuses frame 1's slot only after its fence.
    let reuse = harness.frame();
    assert_eq!(reuse.destroyed, 3);
    assert!(!harness.backend.is_buffer_live(mesh.vertex_buffer));
    assert!(!harness.backend.is_buffer_live(mesh.index_buffer));
    // The slot stays retired until the simulation reuses it.
    assert_eq!(
        harness.renderer.proxies().meshes().status(CUBE),
        ProxyStatus::Obsolete
    );
    harness.shutdown();
}

#[test]
fn test_texture_created_and_destroyed_in_one_batch() {
    let mut harness = TestHarness::new();
    harness.frame_with(content_batch());
    harness.backend.take_calls();

    let mut batch = EventBatchWriter::new();
    batch.create_texture(3, &texture_payload(), &[0x11; 64]);
    batch.destroy_texture(3);
    let report = harness.frame_with(batch);

    assert_eq!(report.fetch.events, 2);
    assert_eq!(report.uploads, None);
    assert!(!harness.renderer.proxies().textures().is_active(3));
    let created = harness
        .backend
        .take_calls()
        .into_iter()
        .find_map(|call| match call {
            DummyCall::CreateTexture { texture, label, .. } if label == "texture[3]" => {
                Some(texture)
            }
            _ => None,
        })
        .expect("texture 3 was created");
    assert!(harness.backend.is_texture_live(created));

    harness.frames(2);
    assert!(!harness.backend.is_texture_live(created));
    harness.shutdown();
}

#[test]
fn test_draws_sorted_by_priority_then_submission() {
    let mut harness = TestHarness::new();
    let mut batch = content_batch();
    // Model 1 uses a material drawn after the default one.
    batch.create_material(2, &material_payload(&[0, 1], TEXTURE, 5));
    let mut nodes = [ModelNode::default(); MAX_MODEL_NODES];
    nodes[0] = ModelNode {
        mesh: CUBE,
        material: 2,
    };
    batch.create_model(1, &ModelPayload { node_count: 1, nodes });
    for index in 0..8u32 {
        let mut entity = entity_payload(Vec3::new(index as f32 - 4.0, 0.0, 0.0));
        if index < 4 {
            entity.model = 1;
        }
        batch.create_entity(index, &entity);
    }
    let report = harness.frame_with(batch);
    assert_eq!(report.world.opaque.emitted, 8);

    let instances: Vec<u32> = harness
        .pass_commands("opaque", 0)
        .iter()
        .filter_map(|command| match command {
            CommandRecord::DrawIndexed { first_instance, .. } => Some(*first_instance),
            _ => None,
        })
        .collect();
    assert_eq!(instances.len(), 8);
    let (front, back) = instances.split_at(4);
    // Priority 0 entities (4..8) come first, each group in submission order.
    assert!(front.windows(2).all(|pair| pair[0] < pair[1]));
    assert!(back.windows(2).all(|pair| pair[0] < pair[1]));
    assert!(front.iter().all(|first| back.iter().all(|second| first > second)));
    harness.shutdown();
}

#[test]
fn test_entity_updates_affect_draws() {
    let mut harness = TestHarness::new();
    let report = harness.frame_with(scene_batch(3));
    assert_eq!(report.world.opaque.emitted, 3);

    let mut batch = EventBatchWriter::new();
    batch.update_entity_flags(0, EntityFlags::empty().bits());
    batch.update_entity_transform(1, &Transform3x4::from_translation(Vec3::new(0.0, 0.0, 500.0)));
    let report = harness.frame_with(batch);
    assert_eq!(report.world.opaque.visited, 2);
    assert_eq!(report.world.opaque.culled, 1);
    assert_eq!(report.world.opaque.emitted, 1);
    assert_eq!(work_count(&harness.pass_commands("opaque", report.frame_index)), 1);
    harness.shutdown();
}

#[test]
fn test_material_texture_falls_back_after_destroy() {
    let mut harness = TestHarness::new();
    harness.frame_with(scene_batch(1));
    let fallback = harness.renderer.proxies().fallback_texture_index();
    assert_ne!(harness.renderer.proxies().get_texture(TEXTURE).gpu_index, fallback);

    let mut batch = EventBatchWriter::new();
    batch.destroy_texture(TEXTURE);
    harness.frame_with(batch);
    let material = harness.renderer.proxies().get_material(MATERIAL);
    assert!(material.bind_groups.iter().all(|group| !group.is_null()));
    // Entities keep drawing with the fallback.
    let report = harness.frame();
    assert_eq!(report.world.opaque.emitted, 1);
    harness.shutdown();
}

#[test]
#[should_panic(expected = "entity index 500 out of range")]
fn test_out_of_range_index_panics() {
    let mut harness = TestHarness::new();
    let mut batch = content_batch();
    batch.create_entity(500, &entity_payload(Vec3::ZERO));
    harness.frame_with(batch);
}

#[test]
#[should_panic(expected = "created while still active")]
fn test_double_create_panics() {
    let mut harness = TestHarness::new();
    let mut batch = scene_batch(1);
    batch.create_entity(0, &entity_payload(Vec3::ONE));
    harness.frame_with(batch);
}
