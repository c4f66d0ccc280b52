//! Render-side mirrors of simulation objects.
//!
//! # Module Contents
//!
//! - [`ProxyPool`] - fixed-capacity slot storage with an
//!   Inactive → Active → Obsolete lifecycle
//! - [`DestroyBuckets`] - deferred destruction of hardware handles
//! - [`ProxyManager`] - applies render events and owns every pool
//! - per-kind proxy data ([`TextureProxy`], [`MaterialProxy`], ...)
//!
//! Slot indices are allocated by the simulation and travel in event records;
//! the render side never allocates them.

mod destroy;
mod kinds;
mod manager;
mod pool;

pub use destroy::{DestroyBuckets, DestroyEntry};
pub use kinds::*;
pub use manager::{FetchStats, ProxyManager, content_pipeline_desc};
pub use pool::{ProxyPool, ProxyStatus};
