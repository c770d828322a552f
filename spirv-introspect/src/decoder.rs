//! The seam to the external bytecode decoder. The decoder walks SPIR-V and reports what an entry
//! point declares as plain records; everything past this module only ever sees these records.

use crate::{
    DescriptorAccess, DescriptorType, ImageViewType, IntrospectError, IntrospectResult,
    ShaderStageFlags, SpecConstantValue, VarType,
};
use fnv::FnvHashMap;

#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

/// Index into `DecodedModule::types`
pub type DecodedTypeId = u32;

/// One array dimension, either a literal length or the id of the specialization constant that
/// provides it. A literal 0 means the dimension is runtime-sized.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum DecodedArrayDim {
    Literal(u32),
    SpecConstant(u32),
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct DecodedMember {
    pub type_id: DecodedTypeId,
    pub name: Option<String>,
    /// Byte offset of the member within its parent struct
    pub offset: u32,
    /// Byte size of the whole member, including every array element
    pub size: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct DecodedType {
    pub name: Option<String>,
    pub base_type: VarType,
    /// Number of rows (vector size), 1 for scalars
    pub vec_size: u32,
    /// Number of columns, 1 for scalars and vectors
    pub columns: u32,
    pub row_major: bool,
    pub matrix_stride: u32,
    /// Array dimensions, innermost first. `var[Z][Y][X]` is reported as `[X, Y, Z]`.
    pub array: Vec<DecodedArrayDim>,
    /// Stride between elements of the outermost array dimension
    pub array_stride: u32,
    pub members: Vec<DecodedMember>,
    pub restrict: bool,
    pub aliased: bool,
}

impl DecodedType {
    pub fn scalar(base_type: VarType) -> Self {
        DecodedType {
            base_type,
            vec_size: 1,
            columns: 1,
            ..Default::default()
        }
    }

    pub fn is_struct(&self) -> bool {
        !self.members.is_empty()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct DecodedImage {
    pub view_type: ImageViewType,
    pub shadow: bool,
    pub multisample: bool,
    /// SPIR-V image format enumerant, `None` when the shader uses an unknown format
    pub format: Option<u32>,
}

/// A descriptor binding declared by the entry point
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct DecodedResource {
    pub name: Option<String>,
    pub descriptor_type: DescriptorType,
    pub set: u32,
    pub binding: u32,
    /// Descriptor array dimensions, innermost first. Empty if the binding is not an array.
    pub array: Vec<DecodedArrayDim>,
    /// Block type for uniform and storage buffers
    pub type_id: Option<DecodedTypeId>,
    pub image: Option<DecodedImage>,
    pub access: DescriptorAccess,
    pub input_attachment_index: u32,
    pub restrict: bool,
    pub aliased: bool,
}

impl DecodedResource {
    pub fn new(
        descriptor_type: DescriptorType,
        set: u32,
        binding: u32,
    ) -> Self {
        DecodedResource {
            name: None,
            descriptor_type,
            set,
            binding,
            array: Vec::default(),
            type_id: None,
            image: None,
            access: Default::default(),
            input_attachment_index: 0,
            restrict: false,
            aliased: false,
        }
    }
}

/// A stage input or output variable
#[derive(Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct DecodedInterface {
    pub name: Option<String>,
    pub location: u32,
    /// Number of array elements, 1 if not an array
    pub elements: u32,
    pub base_type: VarType,
    /// Dual-source blending index, only meaningful for fragment outputs
    pub color_index: u8,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct DecodedSpecConstant {
    pub id: u32,
    pub name: Option<String>,
    pub base_type: VarType,
    pub default_value: SpecConstantValue,
    pub byte_size: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct DecodedPushConstantBlock {
    pub name: Option<String>,
    pub type_id: DecodedTypeId,
}

/// Everything the decoder reports for one entry point
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct DecodedModule {
    pub entry_point: String,
    pub stage: ShaderStageFlags,
    pub spec_constants: Vec<DecodedSpecConstant>,
    pub inputs: Vec<DecodedInterface>,
    pub outputs: Vec<DecodedInterface>,
    pub push_constants: Option<DecodedPushConstantBlock>,
    pub resources: Vec<DecodedResource>,
    pub types: Vec<DecodedType>,
}

impl DecodedModule {
    pub fn new(
        entry_point: impl Into<String>,
        stage: ShaderStageFlags,
    ) -> Self {
        DecodedModule {
            entry_point: entry_point.into(),
            stage,
            spec_constants: Vec::default(),
            inputs: Vec::default(),
            outputs: Vec::default(),
            push_constants: None,
            resources: Vec::default(),
            types: Vec::default(),
        }
    }

    /// Appends a type to the type table and returns its id
    pub fn add_type(
        &mut self,
        ty: DecodedType,
    ) -> DecodedTypeId {
        self.types.push(ty);
        (self.types.len() - 1) as DecodedTypeId
    }

    pub fn get_type(
        &self,
        type_id: DecodedTypeId,
    ) -> IntrospectResult<&DecodedType> {
        self.types.get(type_id as usize).ok_or_else(|| {
            IntrospectError::Decode(format!(
                "type id {} is out of range ({} types)",
                type_id,
                self.types.len()
            ))
        })
    }
}

/// Turns shader bytecode into decoded records. Must be deterministic: decoding the same bytecode,
/// entry point and stage twice yields equal modules.
pub trait ShaderDecoder: Send + Sync {
    fn decode(
        &self,
        bytecode: &[u8],
        entry_point: &str,
        stage: ShaderStageFlags,
    ) -> IntrospectResult<DecodedModule>;
}

#[derive(PartialEq, Eq, Hash)]
struct PredecodedKey {
    bytecode: Vec<u8>,
    entry_point: String,
    stage: ShaderStageFlags,
}

/// A decoder backed by modules that were decoded ahead of time (for example by an offline shader
/// processor) and registered against the bytecode they came from
#[derive(Default)]
pub struct PredecodedShaders {
    modules: FnvHashMap<PredecodedKey, DecodedModule>,
}

impl PredecodedShaders {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert(
        &mut self,
        bytecode: Vec<u8>,
        module: DecodedModule,
    ) {
        let key = PredecodedKey {
            bytecode,
            entry_point: module.entry_point.clone(),
            stage: module.stage,
        };
        self.modules.insert(key, module);
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl ShaderDecoder for PredecodedShaders {
    fn decode(
        &self,
        bytecode: &[u8],
        entry_point: &str,
        stage: ShaderStageFlags,
    ) -> IntrospectResult<DecodedModule> {
        let key = PredecodedKey {
            bytecode: bytecode.to_vec(),
            entry_point: entry_point.to_string(),
            stage,
        };

        self.modules.get(&key).cloned().ok_or_else(|| {
            IntrospectError::Decode(format!(
                "no decoded module registered for entry point {} in stage {:?}",
                entry_point, stage
            ))
        })
    }
}
