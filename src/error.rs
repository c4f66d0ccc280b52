//! Error types.
//!
//! Only startup uses `Result`: backend calls that can fail while creating
//! resources return [`BackendError`], and [`Renderer::init`] folds those into
//! an [`InitError`] after rolling back whatever was already created. Per-frame
//! code treats contract violations as assertion failures instead.
//!
//! [`Renderer::init`]: crate::renderer::Renderer::init

use thiserror::Error;

/// Errors reported by a graphics backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create swapchain: {0}")]
    SwapchainCreationFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create sampler: {0}")]
    SamplerCreationFailed(String),
    #[error("Failed to create bind group: {0}")]
    BindGroupCreationFailed(String),
    #[error("Failed to create pipeline: {0}")]
    PipelineCreationFailed(String),
    #[error("Failed to compile shader: {0}")]
    ShaderCompilationFailed(String),
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Typed status returned by renderer initialization.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    #[error("Invalid renderer configuration: {0}")]
    InvalidConfig(String),
    #[error("Backend failure while creating {stage}: {source}")]
    Backend {
        stage: &'static str,
        #[source]
        source: BackendError,
    },
    #[error("Failed to create engine pipeline `{name}`: {source}")]
    Pipeline {
        name: &'static str,
        #[source]
        source: BackendError,
    },
    #[error("Failed to create swapchain: {0}")]
    Swapchain(#[source] BackendError),
}

impl InitError {
    /// Wrap a backend error raised while creating `stage`.
    pub fn backend(stage: &'static str) -> impl FnOnce(BackendError) -> Self {
        move |source| Self::Backend { stage, source }
    }
}
