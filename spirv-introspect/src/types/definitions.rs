use super::{DescriptorType, ShaderStageFlags, DESCRIPTOR_SET_COUNT};
use fnv::FnvHashMap;

#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

/// Values for specialization constants, keyed by constant id. Used to resolve array extents that
/// are sized by a specialization constant.
pub type SpecConstantMap = FnvHashMap<u32, u32>;

/// A contiguous range of push constant bytes and the stages that access it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct PushConstantRange {
    pub stage_flags: ShaderStageFlags,
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct DescriptorSetLayoutBinding {
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    /// Number of descriptors. 0 when `runtime_sized` is set.
    pub descriptor_count: u32,
    /// The binding is a runtime-sized descriptor array (needs a variable descriptor count)
    pub runtime_sized: bool,
    pub stage_flags: ShaderStageFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct DescriptorSetLayout {
    /// Sorted by binding index
    pub bindings: Vec<DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayout {
    pub fn new() -> Self {
        DescriptorSetLayout {
            bindings: Default::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn find_binding(
        &self,
        binding: u32,
    ) -> Option<&DescriptorSetLayoutBinding> {
        self.bindings.iter().find(|x| x.binding == binding)
    }
}

/// Describes every resource a pipeline accesses: one descriptor set layout per set index and the
/// push constant ranges
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct PipelineLayout {
    pub descriptor_set_layouts: [DescriptorSetLayout; DESCRIPTOR_SET_COUNT],
    pub push_constant_ranges: Vec<PushConstantRange>,
}

impl PipelineLayout {
    pub fn new() -> Self {
        Default::default()
    }
}
