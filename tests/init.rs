//! Renderer initialization: configuration validation and rollback of every
//! stage created before a failure.

mod common;

use std::sync::Arc;

use common::{init_logger, test_config};
use render_core::gfx::DummyCall;
use render_core::{
    DummyBackend, GfxBackend, InitError, Renderer, RendererConfig, ShadowConfig, SwapchainFlags,
};
use rstest::rstest;

fn init(backend: &Arc<DummyBackend>, config: RendererConfig) -> Result<Renderer, InitError> {
    init_logger();
    let gfx: Arc<dyn GfxBackend> = backend.clone();
    Renderer::init(gfx, config)
}

#[rstest]
#[case::zero_resolution(test_config().with_resolution(0, 720))]
#[case::tearing_with_vsync(
    test_config().with_swapchain_flags(SwapchainFlags::VSYNC | SwapchainFlags::ALLOW_TEARING)
)]
#[case::tile_larger_than_atlas(test_config().with_shadow(ShadowConfig {
    atlas_size: 512,
    tile_size: 1024,
    command_buffer_count: 1,
}))]
#[case::no_bloom_mips(test_config().with_bloom_mip_count(0))]
fn test_invalid_config_creates_nothing(#[case] config: RendererConfig) {
    let backend = Arc::new(DummyBackend::new());
    let err = init(&backend, config).unwrap_err();
    assert!(matches!(err, InitError::InvalidConfig(_)), "{err}");
    assert!(backend.calls().is_empty());
}

#[rstest]
#[case::compute("bloom_upsample")]
#[case::fullscreen("lighting")]
#[case::last("swapchain_blit")]
fn test_pipeline_failure_rolls_back(#[case] pipeline: &'static str) {
    let backend = Arc::new(DummyBackend::new());
    backend.fail_pipeline(pipeline);
    let err = init(&backend, test_config()).unwrap_err();
    assert!(matches!(err, InitError::Pipeline { name, .. } if name == pipeline));
    assert_eq!(backend.live_object_count(), 0);
}

#[test]
fn test_swapchain_failure_rolls_back() {
    let backend = Arc::new(DummyBackend::new());
    backend.fail_swapchain_creation();
    let err = init(&backend, test_config()).unwrap_err();
    assert!(matches!(err, InitError::Swapchain(_)), "{err}");
    assert_eq!(backend.live_object_count(), 0);
    // Nothing reached a queue.
    assert!(
        !backend
            .calls()
            .iter()
            .any(|call| matches!(call, DummyCall::Submit { .. }))
    );
}

#[test]
fn test_retry_after_failure() {
    let backend = Arc::new(DummyBackend::new());
    backend.fail_swapchain_creation();
    assert!(init(&backend, test_config()).is_err());

    let renderer = init(&backend, test_config()).expect("second attempt");
    assert_eq!(renderer.frames_rendered(), 0);
    renderer.shutdown();
    assert_eq!(backend.live_object_count(), 0);
}

#[test]
fn test_init_error_messages() {
    let err = InitError::InvalidConfig("resolution must be non-zero, got 0x720".to_string());
    assert_eq!(
        err.to_string(),
        "Invalid renderer configuration: resolution must be non-zero, got 0x720"
    );
}
