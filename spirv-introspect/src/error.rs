use crate::{ShaderContentType, ShaderStageFlags};

pub type IntrospectResult<T> = Result<T, IntrospectError>;

/// The resource whose array extent references a specialization constant
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SpecConstantUser {
    Descriptor { set: u32, binding: u32 },
    PushConstants { stage: ShaderStageFlags },
}

impl core::fmt::Display for SpecConstantUser {
    fn fmt(
        &self,
        fmt: &mut core::fmt::Formatter,
    ) -> core::fmt::Result {
        match *self {
            SpecConstantUser::Descriptor { set, binding } => {
                write!(fmt, "descriptor (set={} binding={})", set, binding)
            }
            SpecConstantUser::PushConstants { stage } => {
                write!(fmt, "push constant block of stage {:?}", stage)
            }
        }
    }
}

/// Generic error that contains all the different kinds of errors that may occur when introspecting
/// shaders or merging their introspection data into a pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum IntrospectError {
    StringError(String),
    /// The introspection parameters did not reference any shader bytecode
    MissingBytecode,
    /// The shader is not in compiled binary form
    WrongContentType(ShaderContentType),
    /// The external decoder could not make sense of the bytecode
    Decode(String),
    /// The decoder produced a type shape that cannot be represented, for example a runtime-sized
    /// array that is not the last member of a storage buffer block
    UnsupportedType(String),
    /// Two stages declare the same (set, binding) incompatibly
    DescriptorConflict {
        set: u32,
        binding: u32,
        message: String,
    },
    /// A push constant block overlaps an already merged block with a different shape, or does not
    /// fit in the push constant byte budget
    PushConstantConflict {
        stage: ShaderStageFlags,
        offset: u32,
        size: u32,
        message: String,
    },
    /// An array extent is sized by a specialization constant and no value was supplied for it
    UnresolvedSpecConstant {
        user: SpecConstantUser,
        spec_id: u32,
    },
}

impl std::error::Error for IntrospectError {}

impl core::fmt::Display for IntrospectError {
    fn fmt(
        &self,
        fmt: &mut core::fmt::Formatter,
    ) -> core::fmt::Result {
        match *self {
            IntrospectError::StringError(ref e) => e.fmt(fmt),
            IntrospectError::MissingBytecode => write!(fmt, "no shader bytecode was provided"),
            IntrospectError::WrongContentType(content_type) => write!(
                fmt,
                "shader content type {:?} is not compiled SPIR-V",
                content_type
            ),
            IntrospectError::Decode(ref e) => write!(fmt, "failed to decode shader: {}", e),
            IntrospectError::UnsupportedType(ref e) => write!(fmt, "unsupported type: {}", e),
            IntrospectError::DescriptorConflict {
                set,
                binding,
                ref message,
            } => write!(
                fmt,
                "conflicting descriptor (set={} binding={}): {}",
                set, binding, message
            ),
            IntrospectError::PushConstantConflict {
                stage,
                offset,
                size,
                ref message,
            } => write!(
                fmt,
                "conflicting push constants in stage {:?} (offset={} size={}): {}",
                stage, offset, size, message
            ),
            IntrospectError::UnresolvedSpecConstant { user, spec_id } => write!(
                fmt,
                "{} is sized by specialization constant {} but no value was provided",
                user, spec_id
            ),
        }
    }
}

impl From<&str> for IntrospectError {
    fn from(str: &str) -> Self {
        IntrospectError::StringError(str.to_string())
    }
}

impl From<String> for IntrospectError {
    fn from(string: String) -> Self {
        IntrospectError::StringError(string)
    }
}
