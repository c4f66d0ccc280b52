//! Opaque backend handles.
//!
//! Every handle is a `u64` newtype. Zero is reserved as the null value so that
//! `Default` produces a handle that refers to nothing.

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub(crate) u64);

        impl $name {
            /// The null handle.
            pub const NULL: Self = Self(0);

            /// Create a handle from a raw backend value.
            #[inline]
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// Raw backend value.
            #[inline]
            pub const fn raw(self) -> u64 {
                self.0
            }

            /// Whether this is the null handle.
            #[inline]
            pub const fn is_null(self) -> bool {
                self.0 == 0
            }
        }
    };
}

define_handle!(
    /// Handle to a GPU texture.
    TextureId
);
define_handle!(
    /// Handle to a GPU buffer.
    BufferId
);
define_handle!(
    /// Handle to a sampler.
    SamplerId
);
define_handle!(
    /// Handle to a bind group layout.
    BindLayoutId
);
define_handle!(
    /// Handle to a bind group.
    BindGroupId
);
define_handle!(
    /// Handle to a graphics or compute pipeline.
    PipelineId
);
define_handle!(
    /// Handle to a command buffer.
    CommandBufferId
);
define_handle!(
    /// Handle to a timeline semaphore.
    SemaphoreId
);
define_handle!(
    /// Handle to a swapchain.
    SwapchainId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handles() {
        assert!(TextureId::NULL.is_null());
        assert!(BufferId::default().is_null());
        assert!(!PipelineId::from_raw(7).is_null());
        assert_eq!(PipelineId::from_raw(7).raw(), 7);
    }

    #[test]
    fn test_handle_ordering() {
        assert!(PipelineId::from_raw(1) < PipelineId::from_raw(2));
    }
}
