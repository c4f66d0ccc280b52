//! Engine-owned pipelines.
//!
//! Content shaders arrive through render events; the pipelines below belong
//! to the renderer itself and are created once at init. The set is passed by
//! reference to every pass constructor.

use crate::config::formats;
use crate::error::InitError;
use crate::gfx::{
    BindLayoutId, BlendMode, DepthMode, GfxBackend, PipelineDesc, PipelineId, ShaderSource,
};

/// Pipelines used by the fixed passes and the swapchain blit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineShaders {
    /// Layout every engine and content pipeline is created with.
    pub layout: BindLayoutId,
    pub ssao: PipelineId,
    pub ssao_upsample: PipelineId,
    pub lighting: PipelineId,
    pub bloom_threshold: PipelineId,
    pub bloom_downsample: PipelineId,
    pub bloom_upsample: PipelineId,
    pub particle_simulate: PipelineId,
    pub particle_render: PipelineId,
    pub physics_debug: PipelineId,
    pub outline: PipelineId,
    pub post_combine: PipelineId,
    pub canvas: PipelineId,
    pub swapchain_blit: PipelineId,
}

fn descriptors(layout: BindLayoutId) -> Vec<(&'static str, PipelineDesc)> {
    let compute = |name: &'static str| (name, PipelineDesc::compute(name, ShaderSource::Engine(name), layout));
    let fullscreen = |name: &'static str, format| {
        (
            name,
            PipelineDesc::graphics(
                name,
                ShaderSource::Engine(name),
                layout,
                vec![format],
                None,
                DepthMode::Disabled,
            ),
        )
    };
    vec![
        compute("ssao"),
        compute("ssao_upsample"),
        fullscreen("lighting", formats::HDR),
        compute("bloom_threshold"),
        compute("bloom_downsample"),
        compute("bloom_upsample"),
        compute("particle_simulate"),
        (
            "particle_render",
            PipelineDesc::graphics(
                "particle_render",
                ShaderSource::Engine("particle_render"),
                layout,
                vec![formats::HDR],
                Some(formats::DEPTH),
                DepthMode::ReadOnly,
            )
            .with_blend(BlendMode::Additive),
        ),
        (
            "physics_debug",
            PipelineDesc::graphics(
                "physics_debug",
                ShaderSource::Engine("physics_debug"),
                layout,
                vec![formats::LDR],
                Some(formats::DEPTH),
                DepthMode::ReadOnly,
            )
            .with_lines(),
        ),
        {
            let (name, desc) = fullscreen("outline", formats::LDR);
            (name, desc.with_blend(BlendMode::Alpha))
        },
        fullscreen("post_combine", formats::LDR),
        {
            let (name, desc) = fullscreen("canvas", formats::LDR);
            (name, desc.with_blend(BlendMode::Alpha))
        },
        fullscreen("swapchain_blit", formats::SWAPCHAIN),
    ]
}

impl EngineShaders {
    /// Create every engine pipeline. On failure the pipelines created so far
    /// are destroyed and the failing pipeline is named in the error.
    pub fn new(backend: &dyn GfxBackend, layout: BindLayoutId) -> Result<Self, InitError> {
        let mut created = Vec::new();
        for (name, desc) in descriptors(layout) {
            match backend.create_pipeline(&desc) {
                Ok(pipeline) => created.push(pipeline),
                Err(source) => {
                    log::error!("Engine pipeline `{name}` failed: {source}");
                    created
                        .into_iter()
                        .rev()
                        .for_each(|pipeline| backend.destroy_pipeline(pipeline));
                    return Err(InitError::Pipeline { name, source });
                }
            }
        }
        log::debug!("Created {} engine pipelines", created.len());

        let mut pipelines = created.into_iter();
        let mut next = || pipelines.next().unwrap_or(PipelineId::NULL);
        Ok(Self {
            layout,
            ssao: next(),
            ssao_upsample: next(),
            lighting: next(),
            bloom_threshold: next(),
            bloom_downsample: next(),
            bloom_upsample: next(),
            particle_simulate: next(),
            particle_render: next(),
            physics_debug: next(),
            outline: next(),
            post_combine: next(),
            canvas: next(),
            swapchain_blit: next(),
        })
    }

    fn pipelines(&self) -> [PipelineId; 13] {
        [
            self.ssao,
            self.ssao_upsample,
            self.lighting,
            self.bloom_threshold,
            self.bloom_downsample,
            self.bloom_upsample,
            self.particle_simulate,
            self.particle_render,
            self.physics_debug,
            self.outline,
            self.post_combine,
            self.canvas,
            self.swapchain_blit,
        ]
    }

    pub fn destroy(&self, backend: &dyn GfxBackend) {
        self.pipelines()
            .into_iter()
            .for_each(|pipeline| backend.destroy_pipeline(pipeline));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::{BindLayoutDesc, DummyBackend};

    #[test]
    fn test_all_pipelines_created() {
        let backend = DummyBackend::new();
        let layout = backend.create_bind_layout(&BindLayoutDesc::default()).unwrap();
        let shaders = EngineShaders::new(&backend, layout).unwrap();
        assert!(shaders.pipelines().iter().all(|p| !p.is_null()));
        assert_eq!(descriptors(layout).len(), shaders.pipelines().len());
        shaders.destroy(&backend);
        assert_eq!(backend.live_object_count(), 1);
    }

    #[test]
    fn test_failure_rolls_back() {
        let backend = DummyBackend::new();
        let layout = backend.create_bind_layout(&BindLayoutDesc::default()).unwrap();
        backend.fail_pipeline("bloom_upsample");
        let err = EngineShaders::new(&backend, layout).unwrap_err();
        assert!(matches!(err, InitError::Pipeline { name: "bloom_upsample", .. }));
        assert_eq!(backend.live_object_count(), 1);
    }
}
