use crate::cache::{IntrospectionCache, IntrospectionCacheDef};
use crate::decoder::ShaderDecoder;
use crate::stage::build_stage_introspection;
use crate::{
    IntrospectError, IntrospectResult, IntrospectionParams, PipelineIntrospection, PipelineLayout,
    ShaderContentType, ShaderStageFlags, SpecConstantMap, StageIntrospection,
};
use std::sync::Arc;

#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct ShaderIntrospectorDef {
    pub cache: IntrospectionCacheDef,
}

/// Everything needed to create a compute pipeline for a single shader
#[derive(Debug, Clone)]
pub struct ComputePipelineDef {
    pub entry_point: String,
    pub introspection: Arc<StageIntrospection>,
    pub layout: PipelineLayout,
}

/// Introspects shaders through an external decoder and caches the results by content
pub struct ShaderIntrospector<DecoderT: ShaderDecoder> {
    decoder: DecoderT,
    cache: IntrospectionCache,
}

impl<DecoderT: ShaderDecoder> ShaderIntrospector<DecoderT> {
    pub fn new(
        decoder: DecoderT,
        introspector_def: &ShaderIntrospectorDef,
    ) -> Self {
        ShaderIntrospector {
            decoder,
            cache: IntrospectionCache::new(&introspector_def.cache),
        }
    }

    pub fn decoder(&self) -> &DecoderT {
        &self.decoder
    }

    pub fn cache(&self) -> &IntrospectionCache {
        &self.cache
    }

    /// Returns the introspection of one entry point of a compiled shader. Results are shared
    /// through the cache unless `insert_to_cache` is false, in which case a result that is not
    /// already cached is built and handed back without being stored.
    #[profiling::function]
    pub fn introspect(
        &self,
        params: &IntrospectionParams,
        insert_to_cache: bool,
    ) -> IntrospectResult<Arc<StageIntrospection>> {
        let shader = params
            .shader
            .as_ref()
            .ok_or(IntrospectError::MissingBytecode)?;

        if shader.content_type != ShaderContentType::Spirv {
            return Err(IntrospectError::WrongContentType(shader.content_type));
        }

        if shader.bytecode.is_empty() {
            return Err(IntrospectError::MissingBytecode);
        }

        self.cache.get_or_build(params, insert_to_cache, || {
            let module = self
                .decoder
                .decode(&shader.bytecode, &params.entry_point, shader.stage)?;
            build_stage_introspection(params.clone(), &module)
        })
    }

    /// Introspects a compute shader and produces a layout for it. If `layout` is provided it is
    /// checked against what the shader uses and returned as is.
    pub fn create_approximate_compute_pipeline(
        &self,
        params: &IntrospectionParams,
        spec_constants: Option<&SpecConstantMap>,
        layout: Option<PipelineLayout>,
    ) -> IntrospectResult<ComputePipelineDef> {
        if params.stage() != ShaderStageFlags::COMPUTE {
            Err(format!(
                "Cannot create a compute pipeline from a {:?} shader",
                params.stage()
            ))?;
        }

        let introspection = self.introspect(params, true)?;

        let mut pipeline = PipelineIntrospection::new();
        pipeline.merge(&introspection, spec_constants)?;

        let layout = match layout {
            Some(layout) => {
                pipeline.verify_layout(&layout)?;
                layout
            }
            None => pipeline.create_pipeline_layout(),
        };

        Ok(ComputePipelineDef {
            entry_point: params.entry_point.clone(),
            introspection,
            layout,
        })
    }
}
