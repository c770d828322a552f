mod type_node;
pub use type_node::*;

mod builder;
pub(crate) use builder::build_stage_introspection;

use crate::{
    DescriptorAccess, DescriptorType, ImageViewType, IntrospectionParams, ShaderStageFlags,
    SpecConstantValue, VarType, DESCRIPTOR_SET_COUNT,
};
use spirv_introspect_base::{BasedOffset, BasedSpan, FrozenByteArena};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct InputInterface {
    pub location: u32,
    /// Number of array elements, 1 if not an array
    pub elements: u32,
    pub base_type: VarType,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct OutputInterface {
    pub location: u32,
    pub elements: u32,
    pub base_type: VarType,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FragmentOutputInterface {
    pub location: u32,
    pub elements: u32,
    pub base_type: VarType,
    /// For dual source blending
    pub color_index: u8,
}

/// Outputs of a stage. Fragment shaders carry a color index per output, all other stages use the
/// generic form. Never both.
#[derive(Clone, Debug, PartialEq)]
pub enum StageOutputs {
    Fragment(Vec<FragmentOutputInterface>),
    Generic(Vec<OutputInterface>),
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SpecConstant {
    pub id: u32,
    pub name: BasedSpan<u8>,
    pub var_type: VarType,
    pub default_value: SpecConstantValue,
    pub byte_size: u32,
}

/// The stage's push constant block. A block may be declared but empty, in which case `size` is 0.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct PushConstantInfo {
    pub name: BasedSpan<u8>,
    pub offset: u32,
    pub size: u32,
    pub block: BasedOffset<TypeNode>,
}

impl PushConstantInfo {
    pub fn present(&self) -> bool {
        self.block.is_valid()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct ImageInfo {
    pub view_type: ImageViewType,
    pub shadow: bool,
}

/// Descriptor-kind-specific data of a binding
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DescriptorPayload {
    Sampler,
    CombinedImageSampler {
        image: ImageInfo,
        multisample: bool,
    },
    SampledImage {
        image: ImageInfo,
        multisample: bool,
    },
    StorageImage {
        access: DescriptorAccess,
        image: ImageInfo,
        /// `None` means the shader uses the StoreWithoutFormat or LoadWithoutFormat capability
        format: Option<u32>,
    },
    UniformTexelBuffer,
    StorageTexelBuffer {
        access: DescriptorAccess,
    },
    UniformBuffer {
        block: BasedOffset<TypeNode>,
        size: u32,
    },
    StorageBuffer {
        access: DescriptorAccess,
        block: BasedOffset<TypeNode>,
        /// Size of the block if its last member is a runtime-sized array with no elements. Equal
        /// to the full size otherwise.
        size_without_last_member: u32,
    },
    InputAttachment {
        index: u32,
    },
}

impl DescriptorPayload {
    pub fn descriptor_type(&self) -> DescriptorType {
        match self {
            DescriptorPayload::Sampler => DescriptorType::Sampler,
            DescriptorPayload::CombinedImageSampler { .. } => DescriptorType::CombinedImageSampler,
            DescriptorPayload::SampledImage { .. } => DescriptorType::SampledImage,
            DescriptorPayload::StorageImage { .. } => DescriptorType::StorageImage,
            DescriptorPayload::UniformTexelBuffer => DescriptorType::UniformTexelBuffer,
            DescriptorPayload::StorageTexelBuffer { .. } => DescriptorType::StorageTexelBuffer,
            DescriptorPayload::UniformBuffer { .. } => DescriptorType::UniformBuffer,
            DescriptorPayload::StorageBuffer { .. } => DescriptorType::StorageBuffer,
            DescriptorPayload::InputAttachment { .. } => DescriptorType::InputAttachment,
        }
    }

    pub fn block(&self) -> Option<BasedOffset<TypeNode>> {
        match *self {
            DescriptorPayload::UniformBuffer { block, .. } => Some(block),
            DescriptorPayload::StorageBuffer { block, .. } => Some(block),
            _ => None,
        }
    }
}

/// A descriptor binding as declared by one stage
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DescriptorVarInfo {
    pub binding: u32,
    /// For uniform and storage buffers this is the block name
    pub name: BasedSpan<u8>,
    /// Descriptor array extents, innermost first. Empty if the binding is not an array.
    pub count: BasedSpan<ArrayExtent>,
    pub restrict: bool,
    pub aliased: bool,
    pub payload: DescriptorPayload,
}

impl DescriptorVarInfo {
    pub fn descriptor_type(&self) -> DescriptorType {
        self.payload.descriptor_type()
    }

    pub fn is_array(&self) -> bool {
        !self.count.is_empty()
    }
}

/// Everything one entry point of a shader declares as its external interface.
///
/// Built once per (bytecode, entry point, stage) and immutable afterwards. Variable-length data
/// (names, array extents, type trees) lives in a frozen arena owned by this struct; the handles in
/// the public records are resolved through the accessor methods here.
#[derive(Debug, PartialEq)]
pub struct StageIntrospection {
    params: IntrospectionParams,
    stage: ShaderStageFlags,
    /// Sorted by id
    spec_constants: Vec<SpecConstant>,
    /// Sorted by location
    inputs: Vec<InputInterface>,
    /// Sorted by location
    outputs: StageOutputs,
    push_constants: PushConstantInfo,
    /// Each set is sorted by binding
    descriptor_set_bindings: [Vec<DescriptorVarInfo>; DESCRIPTOR_SET_COUNT],
    arena: FrozenByteArena,
}

impl StageIntrospection {
    pub fn params(&self) -> &IntrospectionParams {
        &self.params
    }

    pub fn stage(&self) -> ShaderStageFlags {
        self.stage
    }

    pub fn spec_constants(&self) -> &[SpecConstant] {
        &self.spec_constants
    }

    pub fn inputs(&self) -> &[InputInterface] {
        &self.inputs
    }

    pub fn push_constants(&self) -> &PushConstantInfo {
        &self.push_constants
    }

    pub fn descriptor_set_bindings(
        &self,
        set: u32,
    ) -> &[DescriptorVarInfo] {
        match self.descriptor_set_bindings.get(set as usize) {
            Some(bindings) => bindings,
            None => {
                log::error!(
                    "Requested descriptor set {} but only {} sets exist",
                    set,
                    DESCRIPTOR_SET_COUNT
                );
                &[]
            }
        }
    }

    pub fn find_binding(
        &self,
        set: u32,
        binding: u32,
    ) -> Option<&DescriptorVarInfo> {
        let bindings = self.descriptor_set_bindings(set);
        bindings
            .binary_search_by_key(&binding, |x| x.binding)
            .ok()
            .map(|index| &bindings[index])
    }

    /// Outputs of a fragment stage. Returns an empty slice (and logs) for any other stage.
    pub fn fragment_outputs(&self) -> &[FragmentOutputInterface] {
        match &self.outputs {
            StageOutputs::Fragment(outputs) => outputs,
            StageOutputs::Generic(_) => {
                log::error!(
                    "Requested fragment outputs of a {:?} stage",
                    self.stage
                );
                &[]
            }
        }
    }

    /// Outputs of a non-fragment stage. Returns an empty slice (and logs) for fragment stages.
    pub fn outputs(&self) -> &[OutputInterface] {
        match &self.outputs {
            StageOutputs::Generic(outputs) if self.stage != ShaderStageFlags::NONE => outputs,
            _ => {
                log::error!(
                    "Requested generic outputs of a {:?} stage",
                    self.stage
                );
                &[]
            }
        }
    }

    pub fn stage_outputs(&self) -> &StageOutputs {
        &self.outputs
    }

    /// Resolves a name stored in this introspection's arena. Empty names resolve to `None`.
    pub fn name(
        &self,
        span: BasedSpan<u8>,
    ) -> Option<&str> {
        if span.is_empty() {
            None
        } else {
            Some(self.arena.str(span))
        }
    }

    pub fn extents(
        &self,
        span: BasedSpan<ArrayExtent>,
    ) -> &[ArrayExtent] {
        self.arena.slice(span)
    }

    pub fn type_view(
        &self,
        offset: BasedOffset<TypeNode>,
    ) -> Option<TypeView> {
        TypeView::new(self.arena.bytes(), offset)
    }

    /// Type of the block backing a uniform or storage buffer binding
    pub fn block_type(
        &self,
        binding: &DescriptorVarInfo,
    ) -> Option<TypeView> {
        binding
            .payload
            .block()
            .and_then(|block| self.type_view(block))
    }

    pub fn push_constant_type(&self) -> Option<TypeView> {
        self.type_view(self.push_constants.block)
    }

    /// Size of a storage buffer binding when its runtime-sized last member (if any) holds
    /// `last_member_element_count` elements. `None` for non storage buffer bindings or if the size
    /// does not fit in a `u64`.
    pub fn storage_buffer_runtime_size(
        &self,
        binding: &DescriptorVarInfo,
        last_member_element_count: u64,
    ) -> Option<u64> {
        match binding.payload {
            DescriptorPayload::StorageBuffer {
                block,
                size_without_last_member,
                ..
            } => {
                let ty = self.type_view(block)?;
                let size = size_without_last_member as u64;
                if ty.is_last_member_runtime_sized() {
                    let last = ty.member(ty.member_count() - 1)?;
                    last_member_element_count
                        .checked_mul(last.stride() as u64)
                        .and_then(|x| x.checked_add(size))
                } else {
                    Some(size)
                }
            }
            _ => None,
        }
    }

    pub fn arena(&self) -> &FrozenByteArena {
        &self.arena
    }
}
