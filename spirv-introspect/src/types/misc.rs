#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

/// Largest push constant block any stage may declare, in bytes
pub const MAX_PUSH_CONSTANTS_SIZE: u32 = 256;

/// Number of descriptor sets a pipeline layout can reference
pub const DESCRIPTOR_SET_COUNT: usize = 4;

bitflags::bitflags! {
    /// Indicates a particular stage of a shader, or set of stages in a shader. Similar to
    /// VkShaderStageFlagBits. Used as the "stage mask" of every merged resource. An empty mask
    /// means no stage has declared the resource.
    #[derive(Default)]
    #[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
    pub struct ShaderStageFlags : u32 {
        const NONE = 0;
        const VERTEX = 1;
        const TESSELLATION_CONTROL = 2;
        const TESSELLATION_EVALUATION = 4;
        const GEOMETRY = 8;
        const FRAGMENT = 16;
        const COMPUTE = 32;
        const ALL_GRAPHICS = 0x1F;
        const ALL = 0x7FFF_FFFF;
    }
}

/// Contains all the individual stages
pub const ALL_SHADER_STAGE_FLAGS: [ShaderStageFlags; 6] = [
    ShaderStageFlags::VERTEX,
    ShaderStageFlags::TESSELLATION_CONTROL,
    ShaderStageFlags::TESSELLATION_EVALUATION,
    ShaderStageFlags::GEOMETRY,
    ShaderStageFlags::FRAGMENT,
    ShaderStageFlags::COMPUTE,
];

impl ShaderStageFlags {
    /// True if exactly one stage bit is set
    pub fn is_single_stage(self) -> bool {
        ALL_SHADER_STAGE_FLAGS.contains(&self)
    }
}

/// The kind of a descriptor binding
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum DescriptorType {
    Sampler,
    CombinedImageSampler,
    SampledImage,
    StorageImage,
    UniformTexelBuffer,
    StorageTexelBuffer,
    UniformBuffer,
    StorageBuffer,
    InputAttachment,
}

impl DescriptorType {
    /// Buffer-backed descriptors carry a memory block type
    pub fn is_buffer_block(self) -> bool {
        matches!(
            self,
            DescriptorType::UniformBuffer | DescriptorType::StorageBuffer
        )
    }
}

/// Scalar type of a variable, or `UnknownOrStruct` for aggregates and opaque types
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum VarType {
    UnknownOrStruct = 0,
    U64,
    I64,
    U32,
    I32,
    U16,
    I16,
    U8,
    I8,
    F64,
    F32,
    F16,
}

impl Default for VarType {
    fn default() -> Self {
        VarType::UnknownOrStruct
    }
}

impl VarType {
    pub fn from_u8(value: u8) -> VarType {
        match value {
            1 => VarType::U64,
            2 => VarType::I64,
            3 => VarType::U32,
            4 => VarType::I32,
            5 => VarType::U16,
            6 => VarType::I16,
            7 => VarType::U8,
            8 => VarType::I8,
            9 => VarType::F64,
            10 => VarType::F32,
            11 => VarType::F16,
            _ => VarType::UnknownOrStruct,
        }
    }

    /// Size of one scalar of this type in bytes, 0 for structs and unknown types
    pub fn scalar_size(self) -> u32 {
        match self {
            VarType::UnknownOrStruct => 0,
            VarType::U64 | VarType::I64 | VarType::F64 => 8,
            VarType::U32 | VarType::I32 | VarType::F32 => 4,
            VarType::U16 | VarType::I16 | VarType::F16 => 2,
            VarType::U8 | VarType::I8 => 1,
        }
    }
}

/// Dimensionality of an image a descriptor binds
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum ImageViewType {
    Dim1D,
    Dim2D,
    Dim3D,
    Cube,
    Dim1DArray,
    Dim2DArray,
    CubeArray,
}

impl Default for ImageViewType {
    fn default() -> Self {
        ImageViewType::Dim2D
    }
}

/// Read/write restrictions declared on storage descriptors
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct DescriptorAccess {
    pub readonly: bool,
    pub writeonly: bool,
}

/// Default value of a specialization constant as declared in the shader
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum SpecConstantValue {
    Bool(bool),
    U64(u64),
    I64(i64),
    U32(u32),
    I32(i32),
    F64(f64),
    F32(f32),
}

impl SpecConstantValue {
    /// Interprets the value as an array extent. Only non-negative integers qualify.
    pub fn as_array_extent(self) -> Option<u32> {
        match self {
            SpecConstantValue::U32(x) => Some(x),
            SpecConstantValue::I32(x) if x >= 0 => Some(x as u32),
            SpecConstantValue::U64(x) if x <= u32::MAX as u64 => Some(x as u32),
            SpecConstantValue::I64(x) if x >= 0 && x <= u32::MAX as i64 => Some(x as u32),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_stage() {
        assert!(ShaderStageFlags::COMPUTE.is_single_stage());
        assert!(!(ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT).is_single_stage());
        assert!(!ShaderStageFlags::NONE.is_single_stage());
        assert!(ShaderStageFlags::ALL_GRAPHICS.contains(ShaderStageFlags::GEOMETRY));
        assert!(!ShaderStageFlags::ALL_GRAPHICS.contains(ShaderStageFlags::COMPUTE));
    }

    #[test]
    fn test_var_type_packing() {
        for var_type in [VarType::UnknownOrStruct, VarType::U64, VarType::F16, VarType::I8].iter() {
            assert_eq!(VarType::from_u8(*var_type as u8), *var_type);
        }
        assert_eq!(VarType::from_u8(200), VarType::UnknownOrStruct);
        assert_eq!(VarType::F64.scalar_size(), 8);
        assert_eq!(VarType::F16.scalar_size(), 2);
        assert_eq!(VarType::UnknownOrStruct.scalar_size(), 0);
    }

    #[test]
    fn test_spec_constant_as_array_extent() {
        assert_eq!(SpecConstantValue::U32(8).as_array_extent(), Some(8));
        assert_eq!(SpecConstantValue::I32(8).as_array_extent(), Some(8));
        assert_eq!(SpecConstantValue::I32(-1).as_array_extent(), None);
        assert_eq!(SpecConstantValue::U64(1 << 40).as_array_extent(), None);
        assert_eq!(SpecConstantValue::F32(8.0).as_array_extent(), None);
        assert_eq!(SpecConstantValue::Bool(true).as_array_extent(), None);
        assert!(DescriptorType::StorageBuffer.is_buffer_block());
        assert!(!DescriptorType::StorageImage.is_buffer_block());
    }
}
