//! Render Core - a frame-synchronized rendering core
//!
//! The simulation describes the scene as a stream of binary render events.
//! The renderer mirrors that scene in fixed-capacity proxy pools and drives a
//! fixed graph of render passes across graphics, compute and transfer queues,
//! with up to [`BACK_BUFFER_COUNT`] frames in flight.
//!
//! # Features
//! - Backend-agnostic: everything goes through the [`gfx::GfxBackend`] trait
//! - Deferred GPU destruction keyed on frames in flight
//! - Timeline-semaphore ordering between queues
//! - Bindless resource access by gpu index
//! - Dedicated render thread with explicit kick-off / join points
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use render_core::{DummyBackend, EventStream, Renderer, RendererConfig};
//!
//! let backend = Arc::new(DummyBackend::new());
//! let mut renderer = Renderer::init(backend, RendererConfig::default())?;
//! let stream = EventStream::new();
//! renderer.render_frame(&stream);
//! renderer.shutdown();
//! # Ok::<(), render_core::InitError>(())
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod gfx;
pub mod passes;
pub mod profiling;
pub mod proxy;
pub mod renderer;
pub mod scene;
pub mod sync;
pub mod upload;
pub mod window;
pub mod world_renderer;

pub use config::{
    BACK_BUFFER_COUNT, ProxyCapacities, RendererConfig, ShadowConfig, SwapchainFlags,
};
pub use error::{BackendError, BackendResult, InitError};
pub use events::{EventBatchWriter, EventStream, RenderEventType};
pub use frame::{PerFrame, frame_slot};
pub use gfx::{DummyBackend, GfxBackend};
pub use proxy::{FetchStats, ProxyManager};
pub use renderer::{FrameReport, FrameTiming, RenderThread, Renderer};
pub use window::WindowEvent;
pub use world_renderer::{WorldOutputs, WorldRenderer, WorldStats};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
