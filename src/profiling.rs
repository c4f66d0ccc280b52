//! Profiling support via Tracy.
//!
//! Enable the `profiling` feature to forward the macros below to
//! [`tracy_client`]. Without the feature every macro compiles to nothing.
//!
//! ```ignore
//! use render_core::{frame_mark, profile_scope};
//!
//! fn render() {
//!     profile_scope!("render");
//!     // ...
//!     frame_mark!();
//! }
//! ```

#[cfg(feature = "profiling")]
pub use tracy_client::{Client, frame_mark as tracy_frame_mark, span};

/// Mark the end of a frame for Tracy's frame analysis.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! frame_mark {
    () => {
        $crate::profiling::tracy_frame_mark()
    };
}

/// Mark the end of a frame (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! frame_mark {
    () => {};
}

/// Create a profiling span for the current scope.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_scope {
    ($name:expr) => {
        let _profile_span = $crate::profiling::span!($name);
    };
}

/// Create a profiling span (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_scope {
    ($name:expr) => {};
}

/// Create a profiling span named after the enclosing function.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! profile_function {
    () => {
        let _profile_span = $crate::profiling::span!();
    };
}

/// Create a function span (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! profile_function {
    () => {};
}

/// Name the current thread in the profiler.
#[macro_export]
#[cfg(feature = "profiling")]
macro_rules! set_thread_name {
    ($name:expr) => {
        if let Some(client) = $crate::profiling::Client::running() {
            client.set_thread_name($name);
        }
    };
}

/// Name the current thread (no-op when profiling disabled).
#[macro_export]
#[cfg(not(feature = "profiling"))]
macro_rules! set_thread_name {
    ($name:expr) => {};
}
