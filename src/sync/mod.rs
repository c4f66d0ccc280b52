//! Queue synchronization and resource state tracking.
//!
//! # Module Contents
//!
//! - [`SemaphoreTimeline`] - a named timeline semaphore with monotonically
//!   increasing values
//! - [`QueueSemaphores`] - the four timelines a frame uses: `frame`, `copy`,
//!   `ssao` and `lighting`
//! - [`ResourceStateTracker`] - explicit transition table for pass-owned
//!   textures and buffers
//!
//! A frame never creates a semaphore per pass. Work is batched per queue and
//! the batches rendezvous on a single value:
//!
//! | Timeline | Signaled by | Waited by |
//! |----------|-------------|-----------|
//! | `copy` | transfer, after uploads | graphics, before depth |
//! | `ssao` v0 | graphics, after opaque | compute, before SSAO |
//! | `ssao` v1 | compute, after SSAO + particle sim | graphics, before lighting |
//! | `lighting` v0 | graphics, after forward + particles | compute, before bloom |
//! | `lighting` v1 | compute, after bloom | graphics, before post-combine |
//! | `frame` | graphics, after the swapchain pass | CPU, before reusing the slot |

mod semaphore;
mod state_tracker;

pub use semaphore::{QueueSemaphores, SemaphoreTimeline};
pub use state_tracker::ResourceStateTracker;
