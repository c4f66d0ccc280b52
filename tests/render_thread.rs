//! The render thread: kick-off / join control points and resizing between
//! them.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{init_logger, scene_batch, test_config};
use render_core::{
    DummyBackend, EventBatchWriter, EventStream, FrameTiming, GfxBackend, RenderThread, Renderer,
    WindowEvent,
};

fn spawn(backend: &Arc<DummyBackend>) -> (Arc<EventStream>, RenderThread) {
    init_logger();
    let gfx: Arc<dyn GfxBackend> = backend.clone();
    let renderer = Renderer::init(gfx, test_config()).expect("renderer init");
    let stream = Arc::new(EventStream::new());
    let thread = RenderThread::new(renderer, Arc::clone(&stream));
    (stream, thread)
}

/// Publish one simulation frame and wait until it was rendered.
fn step(stream: &EventStream, thread: &RenderThread, batch: EventBatchWriter) {
    let timing: &FrameTiming = thread.timing();
    stream.push_batch(batch.finish());
    let target = timing.advance_simulation();
    thread.notify();
    let deadline = Instant::now() + Duration::from_secs(10);
    while timing.render_frame() < target {
        assert!(Instant::now() < deadline, "render thread stalled");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_renders_each_simulation_frame() {
    let backend = Arc::new(DummyBackend::new());
    let (stream, mut thread) = spawn(&backend);
    thread.kick_off_render().unwrap();
    assert!(thread.is_running());
    assert!(thread.renderer().is_none());

    step(&stream, &thread, scene_batch(4));
    for _ in 0..4 {
        step(&stream, &thread, EventBatchWriter::new());
    }
    thread.join_render();
    assert!(!thread.is_running());

    let renderer = thread.renderer().expect("joined renderer");
    assert_eq!(renderer.frames_rendered(), 5);
    assert_eq!(renderer.proxies().entities().active_count(), 4);
    assert_eq!(stream.pending_batches(), 0);
    thread.shutdown();
    assert_eq!(backend.live_object_count(), 0);
}

#[test]
fn test_join_waits_for_frames_in_flight() {
    let backend = Arc::new(DummyBackend::new());
    let (stream, mut thread) = spawn(&backend);
    thread.kick_off_render().unwrap();
    step(&stream, &thread, scene_batch(1));
    step(&stream, &thread, EventBatchWriter::new());
    thread.join_render();

    let renderer = thread.renderer().expect("joined renderer");
    let frame = &renderer.semaphores().frame;
    assert_eq!(backend.semaphore_value(frame.id()), frame.last_signaled());
    thread.shutdown();
}

#[test]
fn test_resize_between_join_and_kick_off() {
    let backend = Arc::new(DummyBackend::new());
    let (stream, mut thread) = spawn(&backend);
    thread.kick_off_render().unwrap();
    step(&stream, &thread, scene_batch(2));

    thread
        .on_window_event(WindowEvent::Resized {
            width: 640,
            height: 360,
        })
        .unwrap();
    assert!(thread.is_running());
    step(&stream, &thread, EventBatchWriter::new());
    thread.join_render();

    let renderer = thread.renderer().expect("joined renderer");
    assert_eq!(renderer.swapchain().extent(), (640, 360));
    assert_eq!(renderer.frames_rendered(), 2);
    thread.shutdown();
    assert_eq!(backend.live_object_count(), 0);
}

#[test]
fn test_resize_while_joined_stays_joined() {
    let backend = Arc::new(DummyBackend::new());
    let (_stream, mut thread) = spawn(&backend);
    thread.resize(800, 600).unwrap();
    assert!(!thread.is_running());
    let renderer = thread.renderer_mut().expect("never started");
    assert_eq!(renderer.config().resolution, (800, 600));
    thread.shutdown();
}

#[test]
fn test_window_events_track_state() {
    let backend = Arc::new(DummyBackend::new());
    let (_stream, mut thread) = spawn(&backend);
    backend.take_calls();
    thread
        .on_window_event(WindowEvent::Resized {
            width: 320,
            height: 180,
        })
        .unwrap();
    assert!(backend.take_calls().is_empty());

    thread.on_window_event(WindowEvent::Focus(false)).unwrap();
    thread
        .on_window_event(WindowEvent::CursorMoved { x: 10.0, y: 12.0 })
        .unwrap();
    thread.on_window_event(WindowEvent::CloseRequested).unwrap();
    let window = thread.window();
    assert!(!window.is_focused());
    assert_eq!(window.cursor(), Some((10.0, 12.0)));
    assert!(window.should_close());
    assert_eq!(window.dimensions(), (320, 180));
    thread.shutdown();
}

#[test]
fn test_kick_off_twice_is_harmless() {
    let backend = Arc::new(DummyBackend::new());
    let (_stream, mut thread) = spawn(&backend);
    thread.kick_off_render().unwrap();
    thread.kick_off_render().unwrap();
    thread.join_render();
    thread.join_render();
    assert_eq!(thread.renderer().map(Renderer::frames_rendered), Some(0));
    thread.shutdown();
}
