//! Frame state machine tests: submission order, semaphore protocol and
//! frame slot reuse.

mod common;

use std::collections::HashMap;

use common::{TestHarness, point_light, scene_batch, work_count};
use glam::Vec3;
use render_core::events::AmbientLightPayload;
use render_core::gfx::{CommandRecord, DummyCall, LoadOp, QueueType};
use render_core::window::{MouseButton, WindowEvent};
use render_core::{BACK_BUFFER_COUNT, EventBatchWriter, FetchStats, frame_slot};
use rstest::rstest;

fn labels(slot: usize, passes: &[&str]) -> Vec<String> {
    passes.iter().map(|pass| format!("{pass}[{slot}]")).collect()
}

#[test]
fn test_submission_order() {
    let mut harness = TestHarness::new();
    let mut batch = scene_batch(4);
    batch.create_light(0, &point_light(Vec3::new(0.0, 2.0, 0.0), false));
    harness.push(batch);
    harness.frame();
    harness.backend.take_calls();

    // Second frame: nothing to upload, slot 1.
    let report = harness.frame();
    assert_eq!(report.frame_index, 1);
    assert_eq!(report.uploads, None);

    let submissions = harness.take_submissions();
    let mut first = labels(1, &["globals", "pre_depth"]);
    first.extend(labels(1, &["shadows0", "shadows1", "shadows2", "shadows3"]));
    first.extend(labels(1, &["opaque"]));
    let expected = vec![
        (QueueType::Graphics, first),
        (QueueType::Compute, labels(1, &["ssao", "particle_simulate"])),
        (
            QueueType::Graphics,
            labels(1, &["lighting", "forward", "particle_render", "physics_debug"]),
        ),
        (QueueType::Compute, labels(1, &["bloom"])),
        (QueueType::Graphics, labels(1, &["post_combine", "canvas"])),
        (QueueType::Graphics, labels(1, &["swapchain"])),
    ];
    assert_eq!(submissions, expected);
    harness.shutdown();
}

#[test]
fn test_first_frame_uploads_on_transfer_queue() {
    let mut harness = TestHarness::new();
    let report = harness.frame_with(scene_batch(2));
    assert_eq!(report.fetch, FetchStats { batches: 1, events: 10 });
    // Fallback texture, content texture, cube vertices and indices.
    assert_eq!(report.uploads, Some((2, 2)));

    let calls = harness.backend.calls();
    let transfer = calls
        .iter()
        .position(|call| matches!(call, DummyCall::Submit { queue: QueueType::Transfer, .. }))
        .expect("transfer submission");
    let copy_wait = calls
        .iter()
        .position(|call| matches!(call, DummyCall::QueueWait { queue: QueueType::Graphics, .. }))
        .expect("graphics waits for the copy");
    let first_graphics = calls
        .iter()
        .position(|call| matches!(call, DummyCall::Submit { queue: QueueType::Graphics, .. }))
        .expect("graphics submission");
    assert!(transfer < copy_wait && copy_wait < first_graphics);

    let globals = harness.pass_commands("globals", 0);
    assert!(matches!(globals.as_slice(), [CommandRecord::Barrier(barriers)] if barriers.len() == 4));
    harness.shutdown();
}

#[test]
fn test_passes_bind_global_group_themselves() {
    let mut harness = TestHarness::new();
    harness.frame_with(scene_batch(2));
    let report = harness.frame();
    let slot = report.frame_index;
    let global = harness.renderer.global_group(slot);

    let binds_global = |commands: &[CommandRecord]| {
        commands.iter().any(|command| {
            matches!(command, CommandRecord::BindGroup { set: 0, group, .. } if *group == global)
        })
    };
    assert!(!binds_global(&harness.pass_commands("globals", slot)));
    for pass in ["pre_depth", "opaque", "post_combine"] {
        assert!(binds_global(&harness.pass_commands(pass, slot)), "{pass}");
    }
    harness.shutdown();
}

#[test]
fn test_semaphore_values_are_monotonic() {
    let mut harness = TestHarness::new();
    harness.push(scene_batch(3));
    let reports = harness.frames(6);

    let frame_values: Vec<u64> = reports.iter().map(|report| report.frame_value).collect();
    assert_eq!(frame_values, vec![1, 2, 3, 4, 5, 6]);

    for (frame, report) in reports.iter().enumerate() {
        let base = 2 * frame as u64;
        assert_eq!(
            report.outputs.signals,
            vec![
                ("ssao", base + 1),
                ("ssao", base + 2),
                ("lighting", base + 1),
                ("lighting", base + 2),
            ]
        );
    }

    let mut last: HashMap<_, u64> = HashMap::new();
    for call in harness.backend.calls() {
        if let DummyCall::QueueSignal { semaphore, value, .. } = call {
            let previous = last.insert(semaphore, value).unwrap_or(0);
            assert!(value > previous, "{semaphore:?} went from {previous} to {value}");
        }
    }
    harness.shutdown();
}

#[test]
fn test_slot_reuse_waits_for_previous_frame() {
    let mut harness = TestHarness::new();
    harness.push(scene_batch(2));
    let first = harness.frame();
    harness.frame();
    harness.backend.take_calls();

    let third = harness.frame();
    assert_eq!(third.frame_index, first.frame_index);
    let frame_semaphore = harness.renderer.semaphores().frame.id();
    let calls = harness.backend.take_calls();
    assert!(matches!(
        calls.first(),
        Some(DummyCall::CpuWait { semaphore, value })
            if *semaphore == frame_semaphore && *value == first.frame_value
    ));
    harness.shutdown();
}

#[rstest]
#[case::slot_0(0)]
#[case::slot_1(1)]
fn test_recording_leaves_other_slot_untouched(#[case] slot: usize) {
    let mut harness = TestHarness::new();
    harness.push(scene_batch(2));
    harness.frames(BACK_BUFFER_COUNT);
    // Stop once the next frame records into the other slot.
    while frame_slot(harness.renderer.frames_rendered()) == slot {
        harness.frame();
    }
    let before = harness.pass_commands("opaque", slot);
    assert_eq!(work_count(&before), 2);

    let mut batch = EventBatchWriter::new();
    batch.create_entity(5, &common::entity_payload(Vec3::new(1.0, 1.0, 0.0)));
    let report = harness.frame_with(batch);
    assert_ne!(report.frame_index, slot);

    assert_eq!(harness.pass_commands("opaque", slot), before);
    assert_eq!(work_count(&harness.pass_commands("opaque", report.frame_index)), 3);
    harness.shutdown();
}

#[test]
fn test_no_lights_closes_lighting_empty() {
    let mut harness = TestHarness::new();
    let report = harness.frame_with(scene_batch(2));
    assert_eq!(report.world.lights, 0);
    assert!(harness.pass_commands("lighting", 0).is_empty());

    // Forward clears HDR instead of loading it.
    let forward = harness.pass_commands("forward", 0);
    let begin = forward.iter().find_map(|command| match command {
        CommandRecord::BeginRenderPass(desc) => Some(desc.clone()),
        _ => None,
    });
    let begin = begin.expect("forward always opens its render pass");
    assert!(matches!(begin.color[0].load, LoadOp::Clear(_)));

    // Ambient light alone is enough work for the lighting pass.
    let mut batch = EventBatchWriter::new();
    batch.set_ambient_light(&AmbientLightPayload {
        color: [0.1; 3],
        intensity: 1.0,
    });
    let report = harness.frame_with(batch);
    assert_eq!(work_count(&harness.pass_commands("lighting", report.frame_index)), 1);
    harness.shutdown();
}

#[test]
fn test_no_emitters_closes_particles_empty() {
    let mut harness = TestHarness::new();
    harness.frame_with(scene_batch(1));
    assert!(harness.pass_commands("particle_simulate", 0).is_empty());
    assert!(harness.pass_commands("particle_render", 0).is_empty());

    let mut batch = EventBatchWriter::new();
    batch.create_emitter(0, &common::emitter_payload());
    let report = harness.frame_with(batch);
    assert_eq!(report.world.live_emitters, 1);
    let slot = report.frame_index;
    assert_eq!(work_count(&harness.pass_commands("particle_simulate", slot)), 1);
    assert_eq!(work_count(&harness.pass_commands("particle_render", slot)), 1);
    harness.shutdown();
}

#[test]
fn test_missing_camera_renders_empty_view() {
    let mut harness = TestHarness::new();
    let report = harness.frame();
    assert_eq!(report.world.opaque.emitted, 0);
    assert_eq!(work_count(&harness.pass_commands("opaque", 0)), 0);
    // The swapchain composite still runs.
    assert_eq!(work_count(&harness.pass_commands("swapchain", 0)), 1);
    harness.shutdown();
}

#[test]
fn test_present_follows_frame_signal() {
    let mut harness = TestHarness::new();
    harness.frame();
    let calls = harness.backend.calls();
    let signal = calls
        .iter()
        .rposition(|call| matches!(call, DummyCall::QueueSignal { value: 1, .. }))
        .expect("frame signal");
    let present = calls
        .iter()
        .position(|call| matches!(call, DummyCall::Present { .. }))
        .expect("present");
    assert!(signal < present);
    assert_eq!(harness.renderer.frames_rendered(), 1);
    harness.shutdown();
}

#[test]
fn test_shutdown_releases_everything() {
    let mut harness = TestHarness::with_config(common::test_config().with_tool_mode(true));
    let mut batch = scene_batch(4);
    batch.create_light(0, &point_light(Vec3::ZERO, true));
    batch.create_emitter(0, &common::emitter_payload());
    harness.push(batch);
    harness.frames(3);
    let backend = harness.shutdown();
    assert_eq!(backend.live_object_count(), 0);
}

#[test]
fn test_click_copies_object_id_under_cursor() {
    let config = common::test_config().with_tool_mode(true);
    let mut harness = TestHarness::with_config(config);
    harness.frame_with(scene_batch(2));

    harness
        .renderer
        .on_window_event(&WindowEvent::CursorMoved { x: 40.0, y: 30.0 });
    harness.renderer.on_window_event(&WindowEvent::MouseButton {
        button: MouseButton::Left,
        pressed: true,
    });
    let report = harness.frame();
    let copies: Vec<(u32, u32)> = harness
        .pass_commands("object_id", report.frame_index)
        .into_iter()
        .filter_map(|command| match command {
            CommandRecord::CopyTextureToBuffer { regions, .. } => Some(regions[0].origin),
            _ => None,
        })
        .collect();
    assert_eq!(copies, vec![(40, 30)]);

    // One click, one copy.
    let report = harness.frame();
    assert!(
        !harness
            .pass_commands("object_id", report.frame_index)
            .iter()
            .any(|command| matches!(command, CommandRecord::CopyTextureToBuffer { .. }))
    );

    // The dummy backend never draws, so the pixel reads back as empty.
    harness.frames(BACK_BUFFER_COUNT);
    let object_id = harness.renderer.world().object_id().expect("tool mode");
    assert_eq!(object_id.picked_object(), None);
    harness.shutdown();
}
