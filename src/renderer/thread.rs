//! The dedicated render thread.
//!
//! The simulation thread and the render thread share only the event stream
//! and [`FrameTiming`]. [`RenderThread::kick_off_render`] and
//! [`RenderThread::join_render`] are the only cross-thread control points;
//! everything that invalidates GPU resources (resize, shutdown) runs between
//! a join and the next kick-off.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::JoinHandle;
use std::time::Duration;

use super::Renderer;
use crate::error::BackendResult;
use crate::events::EventStream;
use crate::window::{WindowEvent, WindowState};

/// How long the render thread parks when the simulation has nothing new.
const IDLE_PARK: Duration = Duration::from_millis(1);

/// Frame counters and timing shared between the simulation and render
/// threads.
#[derive(Debug, Default)]
pub struct FrameTiming {
    delta_bits: AtomicU32,
    elapsed_bits: AtomicU32,
    simulation_frame: AtomicU64,
    render_frame: AtomicU64,
}

impl FrameTiming {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the timing of the latest simulation step, in seconds.
    pub fn set_time(&self, delta: f32, elapsed: f32) {
        self.delta_bits.store(delta.to_bits(), Ordering::Relaxed);
        self.elapsed_bits.store(elapsed.to_bits(), Ordering::Relaxed);
    }

    pub fn delta_time(&self) -> f32 {
        f32::from_bits(self.delta_bits.load(Ordering::Relaxed))
    }

    pub fn elapsed_time(&self) -> f32 {
        f32::from_bits(self.elapsed_bits.load(Ordering::Relaxed))
    }

    /// Mark a simulation frame as complete. Its event batch must already be
    /// pushed.
    pub fn advance_simulation(&self) -> u64 {
        self.simulation_frame.fetch_add(1, Ordering::Release) + 1
    }

    pub fn simulation_frame(&self) -> u64 {
        self.simulation_frame.load(Ordering::Acquire)
    }

    pub fn set_render_frame(&self, frame: u64) {
        self.render_frame.store(frame, Ordering::Release);
    }

    /// Frames rendered so far.
    pub fn render_frame(&self) -> u64 {
        self.render_frame.load(Ordering::Acquire)
    }
}

/// Owns the [`Renderer`], either directly while joined or through the
/// running thread.
pub struct RenderThread {
    stream: Arc<EventStream>,
    timing: Arc<FrameTiming>,
    stop: Arc<AtomicBool>,
    idle: Option<Renderer>,
    running: Option<JoinHandle<Renderer>>,
    window_events: Option<mpsc::Sender<WindowEvent>>,
    window: WindowState,
}

impl RenderThread {
    /// Take ownership of `renderer`. The thread is not started.
    pub fn new(renderer: Renderer, stream: Arc<EventStream>) -> Self {
        let (width, height) = renderer.config().resolution;
        Self {
            stream,
            timing: Arc::clone(renderer.timing()),
            stop: Arc::new(AtomicBool::new(false)),
            idle: Some(renderer),
            running: None,
            window_events: None,
            window: WindowState::new(width, height),
        }
    }

    pub fn timing(&self) -> &Arc<FrameTiming> {
        &self.timing
    }

    /// Window state as seen through [`on_window_event`](Self::on_window_event).
    pub fn window(&self) -> &WindowState {
        &self.window
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// The renderer, while the thread is joined.
    pub fn renderer(&self) -> Option<&Renderer> {
        self.idle.as_ref()
    }

    pub fn renderer_mut(&mut self) -> Option<&mut Renderer> {
        self.idle.as_mut()
    }

    /// Start the render loop. Every new simulation frame is rendered once;
    /// several simulation frames arriving together are drained by a single
    /// render frame.
    pub fn kick_off_render(&mut self) -> std::io::Result<()> {
        let Some(mut renderer) = self.idle.take() else {
            log::warn!("Render thread is already running");
            return Ok(());
        };
        let (sender, receiver) = mpsc::channel::<WindowEvent>();
        let stream = Arc::clone(&self.stream);
        let timing = Arc::clone(&self.timing);
        let stop = Arc::clone(&self.stop);
        self.stop.store(false, Ordering::Release);

        let handle = std::thread::Builder::new()
            .name("render".to_string())
            .spawn(move || {
                crate::set_thread_name!("render");
                let mut seen = timing.simulation_frame();
                while !stop.load(Ordering::Acquire) {
                    for event in receiver.try_iter() {
                        renderer.on_window_event(&event);
                    }
                    let latest = timing.simulation_frame();
                    if latest == seen {
                        std::thread::park_timeout(IDLE_PARK);
                        continue;
                    }
                    seen = latest;
                    renderer.render_frame(&stream);
                }
                renderer
            })?;
        self.running = Some(handle);
        self.window_events = Some(sender);
        log::info!("Render thread started");
        Ok(())
    }

    /// Stop the render loop and wait until every frame in flight retired.
    ///
    /// A panic on the render thread is resumed on the caller.
    pub fn join_render(&mut self) {
        let Some(handle) = self.running.take() else {
            return;
        };
        self.stop.store(true, Ordering::Release);
        handle.thread().unpark();
        self.window_events = None;
        let renderer = match handle.join() {
            Ok(renderer) => renderer,
            Err(payload) => std::panic::resume_unwind(payload),
        };
        renderer.wait_for_frames();
        log::info!(
            "Render thread joined after {} frames",
            renderer.frames_rendered()
        );
        self.idle = Some(renderer);
    }

    /// Wake the render thread after the simulation advanced.
    pub fn notify(&self) {
        if let Some(handle) = &self.running {
            handle.thread().unpark();
        }
    }

    /// Join, resize and resume if the thread was running.
    pub fn resize(&mut self, width: u32, height: u32) -> BackendResult<()> {
        self.window.handle_event(&WindowEvent::Resized { width, height });
        self.window.clear_resize_flag();
        let was_running = self.is_running();
        self.join_render();
        let result = match self.idle.as_mut() {
            Some(renderer) => renderer.on_window_resize(width, height),
            None => Ok(()),
        };
        if was_running && let Err(err) = self.kick_off_render() {
            log::error!("Failed to restart the render thread: {err}");
        }
        result
    }

    /// Route a window event to the renderer. Size changes go through
    /// [`resize`](Self::resize); repeated sizes are dropped.
    pub fn on_window_event(&mut self, event: WindowEvent) -> BackendResult<()> {
        self.window.handle_event(&event);
        if let WindowEvent::Resized { .. } = event {
            if !self.window.was_resized() {
                return Ok(());
            }
            let (width, height) = self.window.dimensions();
            return self.resize(width, height);
        }
        match (&self.window_events, self.idle.as_mut()) {
            (Some(sender), _) => {
                if sender.send(event).is_err() {
                    log::warn!("Render thread is gone, dropping {event:?}");
                }
            }
            (None, Some(renderer)) => renderer.on_window_event(&event),
            (None, None) => {}
        }
        Ok(())
    }

    /// Join the thread and shut the renderer down.
    pub fn shutdown(mut self) {
        self.join_render();
        if let Some(renderer) = self.idle.take() {
            renderer.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_roundtrip() {
        let timing = FrameTiming::new();
        timing.set_time(0.016, 2.5);
        assert_eq!(timing.delta_time(), 0.016);
        assert_eq!(timing.elapsed_time(), 2.5);
        assert_eq!(timing.advance_simulation(), 1);
        assert_eq!(timing.advance_simulation(), 2);
        assert_eq!(timing.simulation_frame(), 2);
        assert_eq!(timing.render_frame(), 0);
    }
}
