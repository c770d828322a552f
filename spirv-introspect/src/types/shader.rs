use super::ShaderStageFlags;
use std::sync::Arc;

#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

/// The form a shader's content is stored in. Only compiled SPIR-V can be introspected.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum ShaderContentType {
    Spirv,
    Glsl,
    Hlsl,
}

/// Owns a shader's content along with the stage it was compiled for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct ShaderModuleData {
    pub content_type: ShaderContentType,
    pub stage: ShaderStageFlags,
    /// Raw SPV bytes, no alignment or endianness requirements.
    #[cfg_attr(feature = "serde-support", serde(with = "serde_bytes"))]
    pub bytecode: Vec<u8>,
}

impl ShaderModuleData {
    pub fn new_spirv(
        stage: ShaderStageFlags,
        bytecode: Vec<u8>,
    ) -> Self {
        ShaderModuleData {
            content_type: ShaderContentType::Spirv,
            stage,
            bytecode,
        }
    }
}

/// Identifies a single entry point of a shader to introspect. Two params are equal when they name
/// the same entry point of byte-identical SPIR-V for the same stage, or both name the same entry
/// point and carry no shader.
#[derive(Debug, Clone, Default)]
pub struct IntrospectionParams {
    pub entry_point: String,
    pub shader: Option<Arc<ShaderModuleData>>,
}

impl IntrospectionParams {
    pub fn new(
        entry_point: impl Into<String>,
        shader: Arc<ShaderModuleData>,
    ) -> Self {
        IntrospectionParams {
            entry_point: entry_point.into(),
            shader: Some(shader),
        }
    }

    pub fn stage(&self) -> ShaderStageFlags {
        self.shader
            .as_ref()
            .map(|x| x.stage)
            .unwrap_or(ShaderStageFlags::NONE)
    }
}

impl PartialEq for IntrospectionParams {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        if self.entry_point != other.entry_point {
            return false;
        }

        match (&self.shader, &other.shader) {
            (Some(lhs), Some(rhs)) => {
                // Cheap checks first, the byte comparison is the definitive one
                lhs.stage == rhs.stage
                    && lhs.content_type == rhs.content_type
                    && lhs.bytecode.len() == rhs.bytecode.len()
                    && lhs.bytecode == rhs.bytecode
            }
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for IntrospectionParams {}
