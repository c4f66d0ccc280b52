//! Renderer configuration.
//!
//! Everything an external caller can tune lives in [`RendererConfig`]: the
//! swapchain flags, the base render resolution, tool mode and the fixed pool
//! capacities. The number of frames in flight is a compile-time constant,
//! [`BACK_BUFFER_COUNT`].
//!
//! # Example
//!
//! ```
//! use render_core::config::{RendererConfig, SwapchainFlags};
//!
//! let config = RendererConfig::default()
//!     .with_resolution(1920, 1080)
//!     .with_swapchain_flags(SwapchainFlags::VSYNC)
//!     .with_tool_mode(true);
//! assert!(config.validate().is_ok());
//! ```

use bitflags::bitflags;
use static_assertions::const_assert;

use crate::error::InitError;
use crate::gfx::TextureFormat;

/// Number of frames the CPU may record ahead of the GPU.
///
/// Every per-frame resource is replicated this many times and the destroy
/// ring holds `BACK_BUFFER_COUNT + 1` buckets.
pub const BACK_BUFFER_COUNT: usize = 2;

/// Number of destroy buckets in the deferred destruction ring.
pub const DESTROY_BUCKET_COUNT: usize = BACK_BUFFER_COUNT + 1;

const_assert!(BACK_BUFFER_COUNT >= 1);

/// Render target formats shared by the passes and content pipelines.
pub mod formats {
    use super::TextureFormat;

    pub const DEPTH: TextureFormat = TextureFormat::Depth32Float;
    pub const SHADOW_ATLAS: TextureFormat = TextureFormat::Depth32Float;
    /// Albedo, normal, ORM, emissive.
    pub const GBUFFER: [TextureFormat; 4] = [
        TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba16Float,
        TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba16Float,
    ];
    pub const AMBIENT_OCCLUSION: TextureFormat = TextureFormat::R8Unorm;
    pub const HDR: TextureFormat = TextureFormat::Rgba16Float;
    pub const BLOOM: TextureFormat = TextureFormat::R11G11B10Float;
    pub const LDR: TextureFormat = TextureFormat::Rgba8Unorm;
    pub const OBJECT_ID: TextureFormat = TextureFormat::R32Uint;
    pub const SWAPCHAIN: TextureFormat = TextureFormat::Bgra8Unorm;
}

bitflags! {
    /// Presentation behaviour of the swapchain.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SwapchainFlags: u32 {
        /// Wait for vertical blank before presenting.
        const VSYNC = 1 << 0;
        /// Allow tearing when presenting without vsync.
        const ALLOW_TEARING = 1 << 1;
    }
}

/// Fixed capacity of every proxy pool.
///
/// Pools never grow. Exceeding a capacity is a content/configuration error
/// and fails an assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyCapacities {
    pub textures: usize,
    pub samplers: usize,
    pub shaders: usize,
    pub materials: usize,
    pub meshes: usize,
    pub models: usize,
    pub entities: usize,
    pub mesh_instances: usize,
    pub cameras: usize,
    pub lights: usize,
    pub emitters: usize,
    pub canvas_items: usize,
}

impl Default for ProxyCapacities {
    fn default() -> Self {
        Self {
            textures: 1024,
            samplers: 64,
            shaders: 256,
            materials: 1024,
            meshes: 2048,
            models: 1024,
            entities: 16384,
            mesh_instances: 4096,
            cameras: 16,
            lights: 256,
            emitters: 256,
            canvas_items: 4096,
        }
    }
}

impl ProxyCapacities {
    /// Small capacities, handy for tests.
    pub fn small() -> Self {
        Self {
            textures: 32,
            samplers: 8,
            shaders: 16,
            materials: 32,
            meshes: 32,
            models: 32,
            entities: 128,
            mesh_instances: 32,
            cameras: 4,
            lights: 16,
            emitters: 8,
            canvas_items: 64,
        }
    }

    fn iter(&self) -> impl Iterator<Item = (&'static str, usize)> {
        [
            ("textures", self.textures),
            ("samplers", self.samplers),
            ("shaders", self.shaders),
            ("materials", self.materials),
            ("meshes", self.meshes),
            ("models", self.models),
            ("entities", self.entities),
            ("mesh_instances", self.mesh_instances),
            ("cameras", self.cameras),
            ("lights", self.lights),
            ("emitters", self.emitters),
            ("canvas_items", self.canvas_items),
        ]
        .into_iter()
    }
}

/// Shadow atlas layout and command buffer sharding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadowConfig {
    /// Width and height of the square shadow atlas.
    pub atlas_size: u32,
    /// Width and height of one shadow view tile inside the atlas.
    pub tile_size: u32,
    /// Number of command buffers shadow views are sharded across.
    pub command_buffer_count: usize,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            atlas_size: 4096,
            tile_size: 1024,
            command_buffer_count: 4,
        }
    }
}

impl ShadowConfig {
    /// Number of tiles that fit in the atlas.
    pub fn tile_count(&self) -> usize {
        let per_row = (self.atlas_size / self.tile_size) as usize;
        per_row * per_row
    }
}

/// Top-level renderer configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    /// Base render resolution (width, height).
    pub resolution: (u32, u32),
    /// Swapchain presentation flags.
    pub swapchain_flags: SwapchainFlags,
    /// Enables the object-id / outline pass and the editor target.
    pub tool_mode: bool,
    /// Proxy pool capacities.
    pub capacities: ProxyCapacities,
    /// Shadow atlas configuration.
    pub shadow: ShadowConfig,
    /// Maximum number of draw commands a single pass may emit per frame.
    pub max_draws_per_pass: usize,
    /// Size in bytes of each per-frame bump allocator.
    pub frame_arena_size: u64,
    /// Number of mips in the bloom chain.
    pub bloom_mip_count: u32,
    /// Whether the SSAO dispatches run.
    pub ssao_enabled: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            resolution: (1280, 720),
            swapchain_flags: SwapchainFlags::VSYNC,
            tool_mode: false,
            capacities: ProxyCapacities::default(),
            shadow: ShadowConfig::default(),
            max_draws_per_pass: 16 * 1024,
            frame_arena_size: 4 * 1024 * 1024,
            bloom_mip_count: 5,
            ssao_enabled: true,
        }
    }
}

impl RendererConfig {
    /// Set the base render resolution.
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = (width, height);
        self
    }

    /// Set the swapchain flags.
    pub fn with_swapchain_flags(mut self, flags: SwapchainFlags) -> Self {
        self.swapchain_flags = flags;
        self
    }

    /// Enable or disable tool mode.
    pub fn with_tool_mode(mut self, enabled: bool) -> Self {
        self.tool_mode = enabled;
        self
    }

    /// Set the proxy pool capacities.
    pub fn with_capacities(mut self, capacities: ProxyCapacities) -> Self {
        self.capacities = capacities;
        self
    }

    /// Set the shadow configuration.
    pub fn with_shadow(mut self, shadow: ShadowConfig) -> Self {
        self.shadow = shadow;
        self
    }

    /// Set the per-pass draw limit.
    pub fn with_max_draws_per_pass(mut self, max_draws: usize) -> Self {
        self.max_draws_per_pass = max_draws;
        self
    }

    /// Set the per-frame bump allocator size.
    pub fn with_frame_arena_size(mut self, size: u64) -> Self {
        self.frame_arena_size = size;
        self
    }

    /// Set the bloom mip count.
    pub fn with_bloom_mip_count(mut self, count: u32) -> Self {
        self.bloom_mip_count = count;
        self
    }

    /// Enable or disable SSAO.
    pub fn with_ssao(mut self, enabled: bool) -> Self {
        self.ssao_enabled = enabled;
        self
    }

    /// Check the configuration for values the renderer cannot work with.
    pub fn validate(&self) -> Result<(), InitError> {
        let (width, height) = self.resolution;
        if width == 0 || height == 0 {
            return Err(InitError::InvalidConfig(format!(
                "resolution must be non-zero, got {width}x{height}"
            )));
        }

        if self
            .swapchain_flags
            .contains(SwapchainFlags::VSYNC | SwapchainFlags::ALLOW_TEARING)
        {
            return Err(InitError::InvalidConfig(
                "ALLOW_TEARING cannot be combined with VSYNC".to_string(),
            ));
        }

        let shadow = &self.shadow;
        if !shadow.atlas_size.is_power_of_two() || !shadow.tile_size.is_power_of_two() {
            return Err(InitError::InvalidConfig(format!(
                "shadow atlas ({}) and tile ({}) sizes must be powers of two",
                shadow.atlas_size, shadow.tile_size
            )));
        }
        if shadow.tile_size > shadow.atlas_size {
            return Err(InitError::InvalidConfig(format!(
                "shadow tile {} does not fit in atlas {}",
                shadow.tile_size, shadow.atlas_size
            )));
        }
        if shadow.command_buffer_count == 0 {
            return Err(InitError::InvalidConfig(
                "shadow command buffer count must be at least 1".to_string(),
            ));
        }

        if let Some((name, _)) = self.capacities.iter().find(|(_, cap)| *cap == 0) {
            return Err(InitError::InvalidConfig(format!(
                "proxy capacity `{name}` must be non-zero"
            )));
        }

        if self.max_draws_per_pass == 0 || self.frame_arena_size == 0 {
            return Err(InitError::InvalidConfig(
                "draw limit and frame arena size must be non-zero".to_string(),
            ));
        }

        if self.bloom_mip_count == 0 {
            return Err(InitError::InvalidConfig(
                "bloom needs at least one mip".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(RendererConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_resolution_rejected() {
        let config = RendererConfig::default().with_resolution(0, 720);
        assert!(matches!(
            config.validate(),
            Err(InitError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_tearing_with_vsync_rejected() {
        let config = RendererConfig::default()
            .with_swapchain_flags(SwapchainFlags::VSYNC | SwapchainFlags::ALLOW_TEARING);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shadow_tile_larger_than_atlas_rejected() {
        let config = RendererConfig::default().with_shadow(ShadowConfig {
            atlas_size: 512,
            tile_size: 1024,
            command_buffer_count: 1,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let capacities = ProxyCapacities {
            lights: 0,
            ..ProxyCapacities::small()
        };
        let err = RendererConfig::default()
            .with_capacities(capacities)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("lights"));
    }

    #[test]
    fn test_shadow_tile_count() {
        let shadow = ShadowConfig {
            atlas_size: 4096,
            tile_size: 1024,
            command_buffer_count: 2,
        };
        assert_eq!(shadow.tile_count(), 16);
    }
}
