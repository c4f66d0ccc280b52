//! Descriptors and command parameter types for the backend interface.

use bitflags::bitflags;

use super::handles::{BindLayoutId, BufferId, SamplerId, TextureId};
use crate::config::SwapchainFlags;

// ============================================================================
// Queues
// ============================================================================

/// Hardware queue a command buffer is recorded for and submitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueType {
    /// Graphics queue (also accepts compute and copy work).
    Graphics,
    /// Asynchronous compute queue.
    Compute,
    /// Copy-only transfer queue.
    Transfer,
}

// ============================================================================
// Textures
// ============================================================================

/// Texture format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum TextureFormat {
    R8Unorm = 0,
    R16Float = 1,
    R32Uint = 2,
    #[default]
    Rgba8Unorm = 3,
    Rgba8UnormSrgb = 4,
    Bgra8Unorm = 5,
    Rgba16Float = 6,
    Rgba32Float = 7,
    R11G11B10Float = 8,
    Depth32Float = 9,
}

impl TextureFormat {
    /// Decode a format transported as a raw integer.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::R8Unorm,
            1 => Self::R16Float,
            2 => Self::R32Uint,
            3 => Self::Rgba8Unorm,
            4 => Self::Rgba8UnormSrgb,
            5 => Self::Bgra8Unorm,
            6 => Self::Rgba16Float,
            7 => Self::Rgba32Float,
            8 => Self::R11G11B10Float,
            9 => Self::Depth32Float,
            _ => return None,
        })
    }

    /// Returns true if this is a depth format.
    pub fn is_depth(&self) -> bool {
        matches!(self, Self::Depth32Float)
    }

    /// Returns the size in bytes per pixel.
    pub fn block_size(&self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::R16Float => 2,
            Self::R32Uint
            | Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm
            | Self::R11G11B10Float
            | Self::Depth32Float => 4,
            Self::Rgba16Float => 8,
            Self::Rgba32Float => 16,
        }
    }
}

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureUsage: u32 {
        /// Texture can be copied from.
        const COPY_SRC = 1 << 0;
        /// Texture can be copied to.
        const COPY_DST = 1 << 1;
        /// Texture can be sampled in a shader.
        const SAMPLED = 1 << 2;
        /// Texture can be written as an unordered-access (storage) image.
        const STORAGE = 1 << 3;
        /// Texture can be a color render target.
        const RENDER_TARGET = 1 << 4;
        /// Texture can be a depth attachment.
        const DEPTH_STENCIL = 1 << 5;
    }
}

/// Descriptor for creating a texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub array_layers: u32,
    pub mip_levels: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    /// State the texture is in right after creation.
    pub initial_state: ResourceState,
}

impl TextureDesc {
    /// Create a 2D texture descriptor with one mip and one layer.
    pub fn new_2d(
        label: impl Into<String>,
        width: u32,
        height: u32,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            array_layers: 1,
            mip_levels: 1,
            format,
            usage,
            initial_state: ResourceState::Undefined,
        }
    }

    /// Set the mip level count.
    pub fn with_mips(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    /// Set the array layer count.
    pub fn with_layers(mut self, array_layers: u32) -> Self {
        self.array_layers = array_layers;
        self
    }

    /// Set the state the texture starts in.
    pub fn with_initial_state(mut self, state: ResourceState) -> Self {
        self.initial_state = state;
        self
    }
}

// ============================================================================
// Buffers
// ============================================================================

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
        const CONSTANT = 1 << 2;
        const STORAGE = 1 << 3;
        const COPY_SRC = 1 << 4;
        const COPY_DST = 1 << 5;
        /// CPU-visible memory, writable through `write_buffer`.
        const CPU_VISIBLE = 1 << 6;
        /// CPU-readable memory for readbacks.
        const READBACK = 1 << 7;
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferDesc {
    pub label: String,
    pub size: u64,
    pub usage: BufferUsage,
}

impl BufferDesc {
    /// Create a new buffer descriptor.
    pub fn new(label: impl Into<String>, size: u64, usage: BufferUsage) -> Self {
        Self {
            label: label.into(),
            size,
            usage,
        }
    }

    /// CPU-visible staging buffer used as a copy source.
    pub fn staging(label: impl Into<String>, size: u64) -> Self {
        Self::new(label, size, BufferUsage::CPU_VISIBLE | BufferUsage::COPY_SRC)
    }
}

// ============================================================================
// Samplers
// ============================================================================

/// Texture filtering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}

/// Texture addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    #[default]
    Repeat,
    ClampToEdge,
    MirrorRepeat,
}

/// Descriptor for creating a sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SamplerDesc {
    pub filter: FilterMode,
    pub address: AddressMode,
    pub comparison: bool,
}

// ============================================================================
// Resource states and barriers
// ============================================================================

/// Resource states a texture or buffer can be transitioned between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    #[default]
    Undefined,
    CopySrc,
    CopyDst,
    /// Readable from any shader stage.
    ShaderRead,
    RenderTarget,
    DepthWrite,
    DepthRead,
    UnorderedAccess,
    VertexBuffer,
    IndexBuffer,
    ConstantBuffer,
    Present,
}

/// A state transition recorded with `cmd_barrier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Barrier {
    Texture {
        texture: TextureId,
        from: ResourceState,
        to: ResourceState,
    },
    Buffer {
        buffer: BufferId,
        from: ResourceState,
        to: ResourceState,
    },
}

impl Barrier {
    /// Texture transition.
    pub fn texture(texture: TextureId, from: ResourceState, to: ResourceState) -> Self {
        Self::Texture { texture, from, to }
    }

    /// Buffer transition.
    pub fn buffer(buffer: BufferId, from: ResourceState, to: ResourceState) -> Self {
        Self::Buffer { buffer, from, to }
    }
}

// ============================================================================
// Render passes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp {
    Clear([f32; 4]),
    Load,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    Discard,
}

/// Color attachment of a render pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachment {
    pub texture: TextureId,
    pub load: LoadOp,
    pub store: StoreOp,
}

impl ColorAttachment {
    /// Clear to `color`, then store.
    pub fn clear(texture: TextureId, color: [f32; 4]) -> Self {
        Self {
            texture,
            load: LoadOp::Clear(color),
            store: StoreOp::Store,
        }
    }

    /// Keep existing contents, then store.
    pub fn load(texture: TextureId) -> Self {
        Self {
            texture,
            load: LoadOp::Load,
            store: StoreOp::Store,
        }
    }
}

/// Depth attachment of a render pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAttachment {
    pub texture: TextureId,
    pub load: LoadOp,
    pub store: StoreOp,
    pub read_only: bool,
}

impl DepthAttachment {
    /// Clear depth to 1.0 and write.
    pub fn clear(texture: TextureId) -> Self {
        Self {
            texture,
            load: LoadOp::Clear([1.0, 0.0, 0.0, 0.0]),
            store: StoreOp::Store,
            read_only: false,
        }
    }

    /// Test against existing depth without writing.
    pub fn read_only(texture: TextureId) -> Self {
        Self {
            texture,
            load: LoadOp::Load,
            store: StoreOp::Store,
            read_only: true,
        }
    }
}

/// Render pass descriptor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderPassDesc {
    pub label: &'static str,
    pub color: Vec<ColorAttachment>,
    pub depth: Option<DepthAttachment>,
}

/// Viewport rectangle with `[0, 1]` depth range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    /// Viewport covering `width` x `height` from the origin.
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
        }
    }
}

/// Index element size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    Uint16,
    #[default]
    Uint32,
}

impl IndexFormat {
    /// Bytes per index.
    pub fn size(self) -> u32 {
        match self {
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }
}

/// Bind point for `cmd_bind_group`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindPoint {
    Graphics,
    Compute,
}

// ============================================================================
// Pipelines
// ============================================================================

/// Where a pipeline's shader code comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShaderSource {
    /// Engine shader looked up by name in the backend's shader library.
    Engine(&'static str),
    /// Content shader identified by an asset hash.
    Asset(u64),
}

/// Depth test configuration of a graphics pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthMode {
    #[default]
    Disabled,
    /// Test less-equal and write.
    Write,
    /// Test less-equal without writing.
    ReadOnly,
    /// Test equal without writing (after a depth pre-pass).
    Equal,
}

/// Blend configuration of a graphics pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Opaque,
    Alpha,
    Additive,
}

/// Kind-specific pipeline state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Graphics {
        color_formats: Vec<TextureFormat>,
        depth_format: Option<TextureFormat>,
        depth: DepthMode,
        blend: BlendMode,
        lines: bool,
    },
    Compute,
}

/// Descriptor for creating a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineDesc {
    pub label: String,
    pub shader: ShaderSource,
    pub layout: BindLayoutId,
    pub kind: PipelineKind,
}

impl PipelineDesc {
    /// Compute pipeline descriptor.
    pub fn compute(label: impl Into<String>, shader: ShaderSource, layout: BindLayoutId) -> Self {
        Self {
            label: label.into(),
            shader,
            layout,
            kind: PipelineKind::Compute,
        }
    }

    /// Graphics pipeline descriptor.
    pub fn graphics(
        label: impl Into<String>,
        shader: ShaderSource,
        layout: BindLayoutId,
        color_formats: Vec<TextureFormat>,
        depth_format: Option<TextureFormat>,
        depth: DepthMode,
    ) -> Self {
        Self {
            label: label.into(),
            shader,
            layout,
            kind: PipelineKind::Graphics {
                color_formats,
                depth_format,
                depth,
                blend: BlendMode::Opaque,
                lines: false,
            },
        }
    }

    /// Set the blend mode (graphics pipelines only).
    pub fn with_blend(mut self, mode: BlendMode) -> Self {
        if let PipelineKind::Graphics { blend, .. } = &mut self.kind {
            *blend = mode;
        }
        self
    }

    /// Rasterize line lists (graphics pipelines only).
    pub fn with_lines(mut self) -> Self {
        if let PipelineKind::Graphics { lines, .. } = &mut self.kind {
            *lines = true;
        }
        self
    }
}

// ============================================================================
// Binding
// ============================================================================

/// Kind of a bind layout slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    ConstantBuffer,
    StorageBuffer,
    SampledTexture,
    StorageTexture,
    Sampler,
    /// Unbounded bindless array of sampled textures.
    TextureArray,
}

/// Descriptor for creating a bind layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BindLayoutDesc {
    pub label: String,
    pub bindings: Vec<BindingKind>,
    /// Bytes of push constants available to pipelines using this layout.
    pub push_constant_size: u32,
}

/// One entry of a bind group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindEntry {
    Buffer { buffer: BufferId, offset: u64, size: u64 },
    Texture(TextureId),
    Sampler(SamplerId),
}

/// Descriptor for creating or updating a bind group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindGroupDesc {
    pub label: String,
    pub layout: BindLayoutId,
    /// `(binding index, entry)` pairs.
    pub entries: Vec<(u32, BindEntry)>,
}

// ============================================================================
// Copies
// ============================================================================

/// Buffer to buffer copy region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferCopy {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

/// Buffer to texture copy of one subresource, tightly packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferTextureCopy {
    pub buffer_offset: u64,
    pub mip_level: u32,
    pub array_layer: u32,
    pub width: u32,
    pub height: u32,
    /// Texel origin inside the subresource (readbacks of single pixels).
    pub origin: (u32, u32),
}

// ============================================================================
// Swapchain
// ============================================================================

/// Descriptor for creating a swapchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwapchainDesc {
    pub width: u32,
    pub height: u32,
    pub image_count: u32,
    pub format: TextureFormat,
    pub flags: SwapchainFlags,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_roundtrip_raw() {
        for raw in 0..10 {
            let format = TextureFormat::from_raw(raw).unwrap();
            assert_eq!(format as u32, raw);
        }
        assert!(TextureFormat::from_raw(99).is_none());
    }

    #[test]
    fn test_depth_format() {
        assert!(TextureFormat::Depth32Float.is_depth());
        assert!(!TextureFormat::Rgba16Float.is_depth());
        assert_eq!(TextureFormat::Rgba16Float.block_size(), 8);
    }

    #[test]
    fn test_pipeline_builders() {
        let desc = PipelineDesc::graphics(
            "lines",
            ShaderSource::Engine("debug_lines"),
            BindLayoutId::NULL,
            vec![TextureFormat::Rgba8Unorm],
            None,
            DepthMode::ReadOnly,
        )
        .with_blend(BlendMode::Alpha)
        .with_lines();
        match desc.kind {
            PipelineKind::Graphics { blend, lines, .. } => {
                assert_eq!(blend, BlendMode::Alpha);
                assert!(lines);
            }
            PipelineKind::Compute => panic!("expected graphics pipeline"),
        }
    }
}
