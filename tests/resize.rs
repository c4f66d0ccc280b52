//! Window resize: swapchain and size-dependent targets are recreated while
//! fixed-size resources keep their gpu indices.

mod common;

use common::{TestHarness, scene_batch, test_config};
use render_core::gfx::{CommandRecord, DummyCall, Viewport};
use rstest::rstest;

/// Targets whose size follows the window.
const SIZED: &[&str] = &["depth", "hdr", "ssao", "world", "physics_debug", "bloom", "object_ids", "editor"];

/// Targets with a fixed size.
const FIXED: &[&str] = &["shadow_atlas", "shadow_data", "light_list", "canvas_quads", "particle_emitters"];

fn target_index(harness: &TestHarness, target: &str, slot: usize) -> u32 {
    harness
        .renderer
        .world()
        .targets(slot)
        .into_iter()
        .find(|(_, name, _)| *name == target)
        .map(|(_, _, index)| index)
        .unwrap_or_else(|| panic!("no target named {target}"))
}

#[rstest]
#[case::shrink((1920, 1080), (1280, 720))]
#[case::grow((640, 360), (1920, 1080))]
#[case::portrait((1280, 720), (720, 1280))]
fn test_resize_recreates_targets(#[case] from: (u32, u32), #[case] to: (u32, u32)) {
    let config = test_config()
        .with_resolution(from.0, from.1)
        .with_tool_mode(true);
    let mut harness = TestHarness::with_config(config);
    harness.push(scene_batch(2));
    harness.frames(2);

    let before: Vec<Vec<u32>> = (0..2)
        .map(|slot| {
            SIZED
                .iter()
                .chain(FIXED)
                .map(|target| target_index(&harness, target, slot))
                .collect()
        })
        .collect();
    let old_images = harness.renderer.swapchain().images().to_vec();

    harness.renderer.on_window_resize(to.0, to.1).unwrap();
    assert_eq!(harness.renderer.config().resolution, to);
    assert_eq!(harness.renderer.world().resolution(), to);
    assert_eq!(harness.renderer.swapchain().extent(), to);
    assert!(old_images.iter().all(|image| !harness.backend.is_texture_live(*image)));
    for image in harness.renderer.swapchain().images() {
        let desc = harness.backend.texture_desc(*image).unwrap();
        assert_eq!((desc.width, desc.height), to);
    }

    for (slot, old) in before.iter().enumerate() {
        for (target, old_index) in SIZED.iter().zip(old) {
            assert_ne!(target_index(&harness, target, slot), *old_index, "{target}[{slot}]");
        }
        for (target, old_index) in FIXED.iter().zip(&old[SIZED.len()..]) {
            assert_eq!(target_index(&harness, target, slot), *old_index, "{target}[{slot}]");
        }
    }

    let report = harness.frame();
    assert_eq!(report.outputs.world_index, target_index(&harness, "world", report.frame_index));
    let blit = harness.pass_commands("swapchain", report.frame_index);
    assert!(blit.contains(&CommandRecord::SetViewport(Viewport::from_dimensions(to.0, to.1))));

    let backend = harness.shutdown();
    assert_eq!(backend.live_object_count(), 0);
}

#[rstest]
#[case::zero_width(0, 720)]
#[case::zero_height(1280, 0)]
fn test_zero_size_resize_is_ignored(#[case] width: u32, #[case] height: u32) {
    let mut harness = TestHarness::new();
    harness.frame();
    let targets = harness.renderer.world().targets(0);
    harness.backend.take_calls();

    harness.renderer.on_window_resize(width, height).unwrap();
    assert_eq!(harness.renderer.config().resolution, (320, 180));
    assert_eq!(harness.renderer.world().targets(0), targets);
    assert!(harness.backend.take_calls().is_empty());
    harness.frame();
    harness.shutdown();
}

#[test]
fn test_same_size_resize_is_noop() {
    let mut harness = TestHarness::new();
    harness.frame();
    harness.backend.take_calls();
    harness.renderer.on_window_resize(320, 180).unwrap();
    assert!(
        !harness
            .backend
            .take_calls()
            .iter()
            .any(|call| matches!(call, DummyCall::WaitIdle))
    );
    harness.shutdown();
}

#[test]
fn test_resize_waits_for_frames_in_flight() {
    let mut harness = TestHarness::new();
    let reports = harness.frames(2);
    harness.backend.take_calls();
    harness.renderer.on_window_resize(640, 360).unwrap();

    let calls = harness.backend.take_calls();
    let waited: Vec<u64> = calls
        .iter()
        .filter_map(|call| match call {
            DummyCall::CpuWait { value, .. } => Some(*value),
            _ => None,
        })
        .collect();
    let mut expected: Vec<u64> = reports.iter().map(|report| report.frame_value).collect();
    expected.sort_unstable();
    let mut waited_sorted = waited.clone();
    waited_sorted.sort_unstable();
    assert_eq!(waited_sorted, expected);
    let idle = calls
        .iter()
        .position(|call| matches!(call, DummyCall::WaitIdle))
        .expect("resize idles the device");
    let first_destroy = calls
        .iter()
        .position(|call| matches!(call, DummyCall::DestroyTexture(_)))
        .expect("old targets are destroyed");
    assert!(idle < first_destroy);
    harness.shutdown();
}
