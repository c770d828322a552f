use crate::{
    ArrayExtent, DescriptorSetLayout, DescriptorSetLayoutBinding, DescriptorType,
    DescriptorVarInfo, IntrospectError, IntrospectResult, PipelineLayout, PushConstantRange,
    ShaderStageFlags, SpecConstantMap, SpecConstantUser, StageIntrospection,
    DESCRIPTOR_SET_COUNT, MAX_PUSH_CONSTANTS_SIZE,
};
use fnv::FnvHashMap;

/// A descriptor binding after merging every stage that declares it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineDescriptorInfo {
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    /// Total number of descriptors, the product of all array extents. 1 if not an array, 0 if
    /// runtime-sized.
    pub count: u32,
    pub is_array: bool,
    pub runtime_sized: bool,
    /// Which shader stages use the binding
    pub stage_flags: ShaderStageFlags,
}

impl PipelineDescriptorInfo {
    fn verify_compatible_across_stages(
        &self,
        other: &Self,
        set: u32,
    ) -> IntrospectResult<()> {
        let conflict = |message: String| IntrospectError::DescriptorConflict {
            set,
            binding: self.binding,
            message,
        };

        if self.descriptor_type != other.descriptor_type {
            return Err(conflict(format!(
                "Pipeline is using shaders in different stages with different descriptor_type {:?} and {:?}",
                self.descriptor_type, other.descriptor_type
            )));
        }

        if self.is_array != other.is_array {
            return Err(conflict(format!(
                "Pipeline is using shaders in different stages with different is_array {} and {}",
                self.is_array, other.is_array
            )));
        }

        if self.runtime_sized != other.runtime_sized {
            return Err(conflict(format!(
                "Pipeline is using shaders in different stages with different runtime_sized {} and {}",
                self.runtime_sized, other.runtime_sized
            )));
        }

        if self.count != other.count {
            return Err(conflict(format!(
                "Pipeline is using shaders in different stages with different count {} and {}",
                self.count, other.count
            )));
        }

        Ok(())
    }

    fn layout_binding(&self) -> DescriptorSetLayoutBinding {
        DescriptorSetLayoutBinding {
            binding: self.binding,
            descriptor_type: self.descriptor_type,
            descriptor_count: self.count,
            runtime_sized: self.runtime_sized,
            stage_flags: self.stage_flags,
        }
    }
}

// A push constant block as declared by the stages merged so far. Blocks that overlap must have
// the same offset, size and memory layout.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MergedPushConstantBlock {
    offset: u32,
    size: u32,
    layout_signature: Vec<u32>,
    stage_flags: ShaderStageFlags,
}

impl MergedPushConstantBlock {
    fn overlaps(
        &self,
        offset: u32,
        size: u32,
    ) -> bool {
        self.offset < offset + size && offset < self.offset + self.size
    }
}

enum PushConstantCommit {
    None,
    AddStage(usize),
    Insert(MergedPushConstantBlock),
}

// Everything a merge will change, computed up front so that a failing merge changes nothing
struct StagedMerge {
    stage: ShaderStageFlags,
    push_constants: PushConstantCommit,
    bindings: Vec<(usize, PipelineDescriptorInfo)>,
}

/// Accumulates the resources used by the stages of one pipeline and produces the layout the
/// pipeline needs.
///
/// Each merge either applies completely or, on error, leaves the state exactly as it was.
#[derive(Debug, Clone)]
pub struct PipelineIntrospection {
    // An empty mask means no merged stage declares the byte
    push_constant_bytes: [ShaderStageFlags; MAX_PUSH_CONSTANTS_SIZE as usize],
    push_constant_blocks: Vec<MergedPushConstantBlock>,
    descriptor_set_bindings: [FnvHashMap<u32, PipelineDescriptorInfo>; DESCRIPTOR_SET_COUNT],
    highest_binding_numbers: [Option<u32>; DESCRIPTOR_SET_COUNT],
    shader_stages: ShaderStageFlags,
}

impl Default for PipelineIntrospection {
    fn default() -> Self {
        PipelineIntrospection {
            push_constant_bytes: [ShaderStageFlags::empty(); MAX_PUSH_CONSTANTS_SIZE as usize],
            push_constant_blocks: Default::default(),
            descriptor_set_bindings: Default::default(),
            highest_binding_numbers: Default::default(),
            shader_stages: ShaderStageFlags::empty(),
        }
    }
}

impl PipelineIntrospection {
    pub fn new() -> Self {
        Default::default()
    }

    /// Union of every stage merged so far
    pub fn shader_stages(&self) -> ShaderStageFlags {
        self.shader_stages
    }

    /// Stages that declare push constant byte `offset`. Empty if no stage does.
    pub fn push_constant_stage_flags(
        &self,
        offset: u32,
    ) -> ShaderStageFlags {
        self.push_constant_bytes
            .get(offset as usize)
            .copied()
            .unwrap_or_else(ShaderStageFlags::empty)
    }

    pub fn find_binding(
        &self,
        set: u32,
        binding: u32,
    ) -> Option<&PipelineDescriptorInfo> {
        self.descriptor_set_bindings
            .get(set as usize)
            .and_then(|bindings| bindings.get(&binding))
    }

    pub fn binding_count(
        &self,
        set: u32,
    ) -> usize {
        self.descriptor_set_bindings
            .get(set as usize)
            .map(|x| x.len())
            .unwrap_or(0)
    }

    /// Highest binding index used in `set`, `None` if the set is unused
    pub fn highest_binding_number(
        &self,
        set: u32,
    ) -> Option<u32> {
        self.highest_binding_numbers
            .get(set as usize)
            .copied()
            .flatten()
    }

    /// Adds the resources of one stage. Array extents sized by specialization constants are
    /// resolved with `spec_constants`, falling back to the default the stage declares for the
    /// constant. Without a map such bindings cannot be merged.
    #[profiling::function]
    pub fn merge(
        &mut self,
        stage: &StageIntrospection,
        spec_constants: Option<&SpecConstantMap>,
    ) -> IntrospectResult<()> {
        log::trace!("Merge {:?} stage into PipelineIntrospection", stage.stage());
        let staged = self.stage_merge(stage, spec_constants).map_err(|e| {
            log::error!("Failed to merge {:?} stage: {}", stage.stage(), e);
            e
        })?;
        self.commit(staged);
        Ok(())
    }

    fn stage_merge(
        &self,
        stage: &StageIntrospection,
        spec_constants: Option<&SpecConstantMap>,
    ) -> IntrospectResult<StagedMerge> {
        let shader_stage = stage.stage();
        if !shader_stage.is_single_stage() {
            Err(format!(
                "Can only merge introspection of a single shader stage, found {:?}",
                shader_stage
            ))?;
        }

        let push_constants = self.stage_push_constants(stage, spec_constants)?;

        let mut bindings = Vec::default();
        for set in 0..DESCRIPTOR_SET_COUNT {
            for descriptor in stage.descriptor_set_bindings(set as u32) {
                let incoming =
                    resolve_descriptor(stage, set as u32, descriptor, spec_constants)?;
                log::trace!(
                    "    Descriptor {:?} (set={} binding={}) from stage {:?}",
                    stage.name(descriptor.name),
                    set,
                    descriptor.binding,
                    shader_stage
                );

                if let Some(existing) = self.descriptor_set_bindings[set].get(&descriptor.binding) {
                    existing.verify_compatible_across_stages(&incoming, set as u32)?;
                    log::trace!(
                        "      Already used in stages {:?} and is compatible, adding stage {:?}",
                        existing.stage_flags,
                        shader_stage
                    );
                } else {
                    log::trace!(
                        "      Descriptor not yet used, adding it for stage {:?}",
                        shader_stage
                    );
                }

                bindings.push((set, incoming));
            }
        }

        Ok(StagedMerge {
            stage: shader_stage,
            push_constants,
            bindings,
        })
    }

    fn stage_push_constants(
        &self,
        stage: &StageIntrospection,
        spec_constants: Option<&SpecConstantMap>,
    ) -> IntrospectResult<PushConstantCommit> {
        let info = stage.push_constants();
        if !info.present() || info.size == 0 {
            return Ok(PushConstantCommit::None);
        }

        let conflict = |message: String| IntrospectError::PushConstantConflict {
            stage: stage.stage(),
            offset: info.offset,
            size: info.size,
            message,
        };

        let end = info.offset as u64 + info.size as u64;
        if end > MAX_PUSH_CONSTANTS_SIZE as u64 {
            return Err(conflict(format!(
                "Push constant block ends at byte {} but at most {} bytes are available",
                end,
                MAX_PUSH_CONSTANTS_SIZE
            )));
        }

        // Extents are compared by value, so a spec constant resolving to N matches a literal N
        let user = SpecConstantUser::PushConstants {
            stage: stage.stage(),
        };
        let layout_signature = match stage.push_constant_type() {
            Some(block) => block.layout_signature_with(|extent| {
                resolve_extent(stage, user, extent, spec_constants)
            })?,
            None => Vec::default(),
        };

        let mut matching = None;
        for (index, block) in self.push_constant_blocks.iter().enumerate() {
            if !block.overlaps(info.offset, info.size) {
                continue;
            }

            if block.offset != info.offset || block.size != info.size {
                return Err(conflict(format!(
                    "Push constant block overlaps a block at offset {} size {} declared by stages {:?}",
                    block.offset, block.size, block.stage_flags
                )));
            }

            if block.layout_signature != layout_signature {
                return Err(conflict(format!(
                    "Push constant block has a different memory layout than the block declared by stages {:?}",
                    block.stage_flags
                )));
            }

            matching = Some(index);
        }

        Ok(match matching {
            Some(index) => PushConstantCommit::AddStage(index),
            None => PushConstantCommit::Insert(MergedPushConstantBlock {
                offset: info.offset,
                size: info.size,
                layout_signature,
                stage_flags: ShaderStageFlags::empty(),
            }),
        })
    }

    fn commit(
        &mut self,
        staged: StagedMerge,
    ) {
        let stage = staged.stage;

        let block = match staged.push_constants {
            PushConstantCommit::None => None,
            PushConstantCommit::AddStage(index) => Some(&mut self.push_constant_blocks[index]),
            PushConstantCommit::Insert(block) => {
                self.push_constant_blocks.push(block);
                self.push_constant_blocks.last_mut()
            }
        };

        if let Some(block) = block {
            block.stage_flags |= stage;
            let range = block.offset as usize..(block.offset + block.size) as usize;
            for byte in &mut self.push_constant_bytes[range] {
                *byte |= stage;
            }
        }

        for (set, mut incoming) in staged.bindings {
            let binding = incoming.binding;
            self.descriptor_set_bindings[set]
                .entry(binding)
                .and_modify(|existing| existing.stage_flags |= stage)
                .or_insert_with(|| {
                    incoming.stage_flags = stage;
                    incoming
                });

            let highest = &mut self.highest_binding_numbers[set];
            *highest = Some(highest.map_or(binding, |x| x.max(binding)));
        }

        self.shader_stages |= stage;
    }

    /// One range per maximal run of bytes used by the same set of stages
    pub fn create_push_constant_ranges(&self) -> Vec<PushConstantRange> {
        let mut ranges: Vec<PushConstantRange> = Vec::default();
        for (offset, stage_flags) in self.push_constant_bytes.iter().enumerate() {
            if stage_flags.is_empty() {
                continue;
            }

            match ranges.last_mut() {
                Some(last)
                    if last.stage_flags == *stage_flags
                        && last.offset + last.size == offset as u32 =>
                {
                    last.size += 1
                }
                _ => ranges.push(PushConstantRange {
                    stage_flags: *stage_flags,
                    offset: offset as u32,
                    size: 1,
                }),
            }
        }

        ranges
    }

    pub fn create_descriptor_set_layout(
        &self,
        set: u32,
    ) -> DescriptorSetLayout {
        let bindings = match self.descriptor_set_bindings.get(set as usize) {
            Some(bindings) => bindings,
            None => {
                log::error!(
                    "Requested descriptor set layout {} but only {} sets exist",
                    set,
                    DESCRIPTOR_SET_COUNT
                );
                return DescriptorSetLayout::new();
            }
        };

        let mut layout_bindings: Vec<_> = bindings.values().map(|x| x.layout_binding()).collect();
        layout_bindings.sort_by_key(|x| x.binding);
        DescriptorSetLayout {
            bindings: layout_bindings,
        }
    }

    pub fn create_pipeline_layout(&self) -> PipelineLayout {
        let mut layout = PipelineLayout::new();
        for (set, set_layout) in layout.descriptor_set_layouts.iter_mut().enumerate() {
            *set_layout = self.create_descriptor_set_layout(set as u32);
        }
        layout.push_constant_ranges = self.create_push_constant_ranges();
        layout
    }

    /// Checks that a caller-provided layout can serve every resource merged so far. The layout
    /// may declare more than what is used.
    pub fn verify_layout(
        &self,
        layout: &PipelineLayout,
    ) -> IntrospectResult<()> {
        for (set, bindings) in self.descriptor_set_bindings.iter().enumerate() {
            let set_layout = &layout.descriptor_set_layouts[set];
            for used in bindings.values() {
                let conflict = |message: String| IntrospectError::DescriptorConflict {
                    set: set as u32,
                    binding: used.binding,
                    message,
                };

                let provided = set_layout
                    .find_binding(used.binding)
                    .ok_or_else(|| conflict("Binding is missing from the layout".to_string()))?;

                if provided.descriptor_type != used.descriptor_type {
                    return Err(conflict(format!(
                        "Layout declares descriptor_type {:?} but shaders use {:?}",
                        provided.descriptor_type, used.descriptor_type
                    )));
                }

                if !provided.stage_flags.contains(used.stage_flags) {
                    return Err(conflict(format!(
                        "Layout makes the binding visible to stages {:?} but it is used by {:?}",
                        provided.stage_flags, used.stage_flags
                    )));
                }

                let count_compatible = if used.runtime_sized {
                    provided.runtime_sized
                } else {
                    !provided.runtime_sized && provided.descriptor_count >= used.count
                };

                if !count_compatible {
                    return Err(conflict(format!(
                        "Layout declares {} descriptors (runtime_sized={}) but shaders use {} (runtime_sized={})",
                        provided.descriptor_count,
                        provided.runtime_sized,
                        used.count,
                        used.runtime_sized
                    )));
                }
            }
        }

        for provided in &layout.push_constant_ranges {
            if provided.offset.checked_add(provided.size).is_none() {
                return Err(IntrospectError::PushConstantConflict {
                    stage: provided.stage_flags,
                    offset: provided.offset,
                    size: provided.size,
                    message: "Layout declares a push constant range that ends past the addressable range"
                        .to_string(),
                });
            }
        }

        for range in self.create_push_constant_ranges() {
            for offset in range.offset..range.offset + range.size {
                let provided = layout
                    .push_constant_ranges
                    .iter()
                    .filter(|x| x.offset <= offset && offset < x.offset + x.size)
                    .fold(ShaderStageFlags::empty(), |acc, x| acc | x.stage_flags);

                if !provided.contains(range.stage_flags) {
                    return Err(IntrospectError::PushConstantConflict {
                        stage: range.stage_flags - provided,
                        offset: range.offset,
                        size: range.size,
                        message: format!(
                            "Layout does not make push constant byte {} visible to stages {:?}",
                            offset,
                            range.stage_flags - provided
                        ),
                    });
                }
            }
        }

        Ok(())
    }
}

// Value of one array extent with specialization constants substituted. Runtime-sized extents
// stay 0.
fn resolve_extent(
    stage: &StageIntrospection,
    user: SpecConstantUser,
    extent: ArrayExtent,
    spec_constants: Option<&SpecConstantMap>,
) -> IntrospectResult<u32> {
    let spec_id = match extent.spec_constant_id() {
        Some(spec_id) => spec_id,
        None => return Ok(extent.literal_count().unwrap_or(0)),
    };

    let unresolved = IntrospectError::UnresolvedSpecConstant { user, spec_id };

    let spec_constants = spec_constants.ok_or_else(|| unresolved.clone())?;
    let value = match spec_constants.get(&spec_id) {
        Some(value) => *value,
        None => stage
            .spec_constants()
            .binary_search_by_key(&spec_id, |x| x.id)
            .ok()
            .and_then(|index| stage.spec_constants()[index].default_value.as_array_extent())
            .ok_or(unresolved)?,
    };

    if value == 0 {
        Err(IntrospectError::UnsupportedType(format!(
            "Array extent of {} is specialization constant {} which is 0",
            user, spec_id
        )))?;
    }

    Ok(value)
}

fn resolve_descriptor(
    stage: &StageIntrospection,
    set: u32,
    descriptor: &DescriptorVarInfo,
    spec_constants: Option<&SpecConstantMap>,
) -> IntrospectResult<PipelineDescriptorInfo> {
    let binding = descriptor.binding;
    let extents = stage.extents(descriptor.count);

    let mut count = 1u32;
    let mut runtime_sized = false;
    for extent in extents {
        if extent.is_runtime_sized() {
            runtime_sized = true;
            continue;
        }

        let user = SpecConstantUser::Descriptor { set, binding };
        let value = resolve_extent(stage, user, *extent, spec_constants)?;
        count = count.checked_mul(value).ok_or_else(|| {
            IntrospectError::UnsupportedType(format!(
                "Descriptor count of (set={} binding={}) overflows",
                set, binding
            ))
        })?;
    }

    Ok(PipelineDescriptorInfo {
        binding,
        descriptor_type: descriptor.descriptor_type(),
        count: if runtime_sized { 0 } else { count },
        is_array: !extents.is_empty(),
        runtime_sized,
        stage_flags: ShaderStageFlags::empty(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{DecodedArrayDim, DecodedModule, DecodedPushConstantBlock, DecodedType};
    use crate::test_fixtures::*;
    use crate::{SpecConstantValue, VarType};

    fn fragment_push_constants_at(offset: u32) -> DecodedModule {
        let mut module = DecodedModule::new("main", ShaderStageFlags::FRAGMENT);
        add_mat4_push_constants(&mut module, offset);
        module
    }

    // Push constant block `{ float values[dim]; }`
    fn float_array_push_constants(
        stage: ShaderStageFlags,
        dim: DecodedArrayDim,
    ) -> DecodedModule {
        let mut module = DecodedModule::new("main", stage);
        let values = add_array(&mut module, DecodedType::scalar(VarType::F32), vec![dim], 4);
        let block = add_struct(&mut module, "Values", vec![("values", values, 0, 16)]);
        module.push_constants = Some(DecodedPushConstantBlock {
            name: None,
            type_id: block,
        });
        module
    }

    fn textures_sized_by_spec_constant(default_value: Option<u32>) -> DecodedModule {
        let mut module = DecodedModule::new("main", ShaderStageFlags::FRAGMENT);
        let mut textures = sampled_texture(0, 2);
        textures.array = vec![DecodedArrayDim::SpecConstant(7)];
        module.resources.push(textures);
        if let Some(default_value) = default_value {
            module
                .spec_constants
                .push(crate::decoder::DecodedSpecConstant {
                    id: 7,
                    name: Some("TEXTURE_COUNT".to_string()),
                    base_type: VarType::U32,
                    default_value: SpecConstantValue::U32(default_value),
                    byte_size: 4,
                });
        }
        module
    }

    #[test]
    fn test_shared_push_constant_block() {
        init_logging();
        let mut pipeline = PipelineIntrospection::new();
        pipeline.merge(&introspect(vertex_module(), 1), None).unwrap();
        pipeline.merge(&introspect(fragment_module(), 2), None).unwrap();

        assert_eq!(
            pipeline.create_push_constant_ranges(),
            vec![PushConstantRange {
                stage_flags: ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT,
                offset: 0,
                size: 64,
            }]
        );
        assert_eq!(
            pipeline.shader_stages(),
            ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT
        );
        assert_eq!(
            pipeline.push_constant_stage_flags(64),
            ShaderStageFlags::empty()
        );
    }

    #[test]
    fn test_bindings_accumulate_stages() {
        let mut pipeline = PipelineIntrospection::new();
        pipeline.merge(&introspect(vertex_module(), 1), None).unwrap();
        pipeline.merge(&introspect(fragment_module(), 2), None).unwrap();

        let ubo = pipeline.find_binding(0, 0).unwrap();
        assert_eq!(ubo.descriptor_type, DescriptorType::UniformBuffer);
        assert_eq!(
            ubo.stage_flags,
            ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT
        );

        let texture = pipeline.find_binding(1, 0).unwrap();
        assert_eq!(texture.stage_flags, ShaderStageFlags::FRAGMENT);
        assert_eq!(texture.count, 1);
        assert!(!texture.is_array);

        assert_eq!(pipeline.highest_binding_number(0), Some(0));
        assert_eq!(pipeline.highest_binding_number(1), Some(0));
        assert_eq!(pipeline.highest_binding_number(2), None);
        assert_eq!(pipeline.binding_count(0), 1);
    }

    #[test]
    fn test_compute_storage_image_layout() {
        let mut pipeline = PipelineIntrospection::new();
        pipeline.merge(&introspect(compute_module(), 1), None).unwrap();

        assert_eq!(
            pipeline.create_descriptor_set_layout(0),
            DescriptorSetLayout {
                bindings: vec![DescriptorSetLayoutBinding {
                    binding: 3,
                    descriptor_type: DescriptorType::StorageImage,
                    descriptor_count: 1,
                    runtime_sized: false,
                    stage_flags: ShaderStageFlags::COMPUTE,
                }]
            }
        );
        assert_eq!(pipeline.highest_binding_number(0), Some(3));
        assert!(pipeline.create_descriptor_set_layout(1).is_empty());
        assert!(pipeline.create_descriptor_set_layout(9).is_empty());
        assert!(pipeline.create_push_constant_ranges().is_empty());
    }

    #[test]
    fn test_descriptor_kind_conflict_changes_nothing() {
        let mut pipeline = PipelineIntrospection::new();
        pipeline.merge(&introspect(vertex_module(), 1), None).unwrap();
        let before = pipeline.create_pipeline_layout();

        // Disjoint push constants and a new set would be fine on their own
        let mut module = fragment_push_constants_at(64);
        module.resources.push(sampled_texture(2, 0));
        let ssbo = runtime_sized_storage_buffer(&mut module, 0, 0);
        module.resources.push(ssbo);

        match pipeline.merge(&introspect(module, 2), None) {
            Err(IntrospectError::DescriptorConflict { set, binding, .. }) => {
                assert_eq!((set, binding), (0, 0));
            }
            result => panic!("expected DescriptorConflict, got {:?}", result),
        }

        assert_eq!(pipeline.create_pipeline_layout(), before);
        assert_eq!(pipeline.shader_stages(), ShaderStageFlags::VERTEX);
        assert_eq!(pipeline.highest_binding_number(2), None);
    }

    #[test]
    fn test_array_count_conflict() {
        let mut pipeline = PipelineIntrospection::new();
        let mut module = DecodedModule::new("main", ShaderStageFlags::VERTEX);
        let mut textures = sampled_texture(0, 0);
        textures.array = vec![DecodedArrayDim::Literal(4)];
        module.resources.push(textures);
        pipeline.merge(&introspect(module, 1), None).unwrap();

        let mut module = DecodedModule::new("main", ShaderStageFlags::FRAGMENT);
        module.resources.push(sampled_texture(0, 0));
        assert!(matches!(
            pipeline.merge(&introspect(module, 2), None),
            Err(IntrospectError::DescriptorConflict { .. })
        ));

        let mut module = DecodedModule::new("main", ShaderStageFlags::FRAGMENT);
        let mut textures = sampled_texture(0, 0);
        textures.array = vec![DecodedArrayDim::Literal(2), DecodedArrayDim::Literal(2)];
        module.resources.push(textures);
        pipeline.merge(&introspect(module, 3), None).unwrap();
        assert_eq!(pipeline.find_binding(0, 0).unwrap().count, 4);
    }

    #[test]
    fn test_spec_constant_sized_array() {
        let introspection = introspect(textures_sized_by_spec_constant(None), 1);

        let mut pipeline = PipelineIntrospection::new();
        assert_eq!(
            pipeline.merge(&introspection, None),
            Err(IntrospectError::UnresolvedSpecConstant {
                user: SpecConstantUser::Descriptor { set: 0, binding: 2 },
                spec_id: 7,
            })
        );
        assert_eq!(pipeline.binding_count(0), 0);

        // No value supplied and no declared default
        let empty = SpecConstantMap::default();
        assert!(pipeline.merge(&introspection, Some(&empty)).is_err());

        let mut spec_constants = SpecConstantMap::default();
        spec_constants.insert(7, 8);
        pipeline.merge(&introspection, Some(&spec_constants)).unwrap();
        let binding = pipeline.find_binding(0, 2).unwrap();
        assert_eq!(binding.count, 8);
        assert!(binding.is_array);
    }

    #[test]
    fn test_spec_constant_default_value() {
        let introspection = introspect(textures_sized_by_spec_constant(Some(4)), 1);

        let mut pipeline = PipelineIntrospection::new();
        assert!(pipeline.merge(&introspection, None).is_err());
        pipeline
            .merge(&introspection, Some(&SpecConstantMap::default()))
            .unwrap();
        assert_eq!(pipeline.find_binding(0, 2).unwrap().count, 4);

        // A supplied value takes precedence over the default
        let mut spec_constants = SpecConstantMap::default();
        spec_constants.insert(7, 5);
        let mut pipeline = PipelineIntrospection::new();
        pipeline.merge(&introspection, Some(&spec_constants)).unwrap();
        assert_eq!(pipeline.find_binding(0, 2).unwrap().count, 5);
    }

    #[test]
    fn test_runtime_sized_descriptor_array() {
        let mut module = DecodedModule::new("main", ShaderStageFlags::FRAGMENT);
        let mut textures = sampled_texture(0, 0);
        textures.array = vec![DecodedArrayDim::Literal(0)];
        module.resources.push(textures);

        let mut pipeline = PipelineIntrospection::new();
        pipeline.merge(&introspect(module, 1), None).unwrap();

        let binding = pipeline.find_binding(0, 0).unwrap();
        assert!(binding.runtime_sized);
        assert!(binding.is_array);
        assert_eq!(binding.count, 0);

        let layout = pipeline.create_descriptor_set_layout(0);
        assert!(layout.bindings[0].runtime_sized);
        assert_eq!(layout.bindings[0].descriptor_count, 0);
    }

    #[test]
    fn test_partial_push_constant_overlap_conflicts() {
        let mut pipeline = PipelineIntrospection::new();
        pipeline.merge(&introspect(vertex_module(), 1), None).unwrap();
        let before = pipeline.create_push_constant_ranges();

        match pipeline.merge(&introspect(fragment_push_constants_at(32), 2), None) {
            Err(IntrospectError::PushConstantConflict {
                stage,
                offset,
                size,
                ..
            }) => {
                assert_eq!(stage, ShaderStageFlags::FRAGMENT);
                assert_eq!((offset, size), (32, 64));
            }
            result => panic!("expected PushConstantConflict, got {:?}", result),
        }

        assert_eq!(pipeline.create_push_constant_ranges(), before);
    }

    #[test]
    fn test_same_range_different_layout_conflicts() {
        let mut pipeline = PipelineIntrospection::new();
        pipeline.merge(&introspect(vertex_module(), 1), None).unwrap();

        let mut module = DecodedModule::new("main", ShaderStageFlags::FRAGMENT);
        let vec4 = add_vec(&mut module, VarType::F32, 4);
        let block = add_struct(
            &mut module,
            "Colors",
            vec![
                ("a", vec4, 0, 16),
                ("b", vec4, 16, 16),
                ("c", vec4, 32, 16),
                ("d", vec4, 48, 16),
            ],
        );
        module.push_constants = Some(DecodedPushConstantBlock {
            name: None,
            type_id: block,
        });

        assert!(matches!(
            pipeline.merge(&introspect(module, 2), None),
            Err(IntrospectError::PushConstantConflict { .. })
        ));
    }

    #[test]
    fn test_push_constant_names_do_not_matter() {
        let mut pipeline = PipelineIntrospection::new();
        pipeline.merge(&introspect(vertex_module(), 1), None).unwrap();

        let mut module = fragment_push_constants_at(0);
        let block = module.push_constants.as_ref().unwrap().type_id;
        module.types[block as usize].name = Some("Renamed".to_string());
        module.types[block as usize].members[0].name = Some("model_view".to_string());
        pipeline.merge(&introspect(module, 2), None).unwrap();

        assert_eq!(pipeline.create_push_constant_ranges().len(), 1);
    }

    #[test]
    fn test_push_constants_sized_by_spec_constant() {
        let vertex = introspect(
            float_array_push_constants(ShaderStageFlags::VERTEX, DecodedArrayDim::SpecConstant(3)),
            1,
        );
        let fragment = introspect(
            float_array_push_constants(ShaderStageFlags::FRAGMENT, DecodedArrayDim::Literal(4)),
            2,
        );

        let mut pipeline = PipelineIntrospection::new();
        assert_eq!(
            pipeline.merge(&vertex, None),
            Err(IntrospectError::UnresolvedSpecConstant {
                user: SpecConstantUser::PushConstants {
                    stage: ShaderStageFlags::VERTEX
                },
                spec_id: 3,
            })
        );
        assert!(pipeline.shader_stages().is_empty());
        assert!(pipeline.create_push_constant_ranges().is_empty());

        let mut spec_constants = SpecConstantMap::default();
        spec_constants.insert(3, 4);
        pipeline.merge(&vertex, Some(&spec_constants)).unwrap();
        pipeline.merge(&fragment, Some(&spec_constants)).unwrap();
        assert_eq!(
            pipeline.create_push_constant_ranges(),
            vec![PushConstantRange {
                stage_flags: ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT,
                offset: 0,
                size: 16,
            }]
        );

        // The same block with a different element count is a different layout
        spec_constants.insert(3, 5);
        let mut pipeline = PipelineIntrospection::new();
        pipeline.merge(&vertex, Some(&spec_constants)).unwrap();
        assert!(matches!(
            pipeline.merge(&fragment, Some(&spec_constants)),
            Err(IntrospectError::PushConstantConflict { .. })
        ));
    }

    #[test]
    fn test_disjoint_push_constant_blocks() {
        let mut pipeline = PipelineIntrospection::new();
        pipeline.merge(&introspect(vertex_module(), 1), None).unwrap();
        pipeline
            .merge(&introspect(fragment_push_constants_at(64), 2), None)
            .unwrap();

        assert_eq!(
            pipeline.create_push_constant_ranges(),
            vec![
                PushConstantRange {
                    stage_flags: ShaderStageFlags::VERTEX,
                    offset: 0,
                    size: 64,
                },
                PushConstantRange {
                    stage_flags: ShaderStageFlags::FRAGMENT,
                    offset: 64,
                    size: 64,
                },
            ]
        );
    }

    #[test]
    fn test_push_constants_past_limit() {
        let mut pipeline = PipelineIntrospection::new();
        assert!(matches!(
            pipeline.merge(&introspect(fragment_push_constants_at(224), 1), None),
            Err(IntrospectError::PushConstantConflict { .. })
        ));
        assert!(pipeline.create_push_constant_ranges().is_empty());
        assert!(pipeline.shader_stages().is_empty());

        pipeline
            .merge(&introspect(fragment_push_constants_at(192), 2), None)
            .unwrap();
        assert_eq!(pipeline.push_constant_stage_flags(255), ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_synthesis_is_repeatable() {
        let mut pipeline = PipelineIntrospection::new();
        pipeline.merge(&introspect(vertex_module(), 1), None).unwrap();
        pipeline.merge(&introspect(fragment_module(), 2), None).unwrap();

        let layout = pipeline.create_pipeline_layout();
        assert_eq!(layout, pipeline.create_pipeline_layout());
        assert_eq!(layout.push_constant_ranges.len(), 1);
        assert_eq!(layout.descriptor_set_layouts[0].bindings.len(), 1);
        assert_eq!(layout.descriptor_set_layouts[1].bindings.len(), 1);
        assert!(layout.descriptor_set_layouts[2].is_empty());
    }

    #[test]
    fn test_verify_layout() {
        let mut pipeline = PipelineIntrospection::new();
        pipeline.merge(&introspect(vertex_module(), 1), None).unwrap();
        pipeline.merge(&introspect(fragment_module(), 2), None).unwrap();

        let layout = pipeline.create_pipeline_layout();
        pipeline.verify_layout(&layout).unwrap();

        // Extra bindings and wider visibility are fine
        let mut wider = layout.clone();
        wider.descriptor_set_layouts[0].bindings[0].stage_flags = ShaderStageFlags::ALL;
        wider.descriptor_set_layouts[3]
            .bindings
            .push(DescriptorSetLayoutBinding {
                binding: 0,
                descriptor_type: DescriptorType::Sampler,
                descriptor_count: 1,
                runtime_sized: false,
                stage_flags: ShaderStageFlags::ALL,
            });
        pipeline.verify_layout(&wider).unwrap();

        let mut missing = layout.clone();
        missing.descriptor_set_layouts[1].bindings.clear();
        assert!(matches!(
            pipeline.verify_layout(&missing),
            Err(IntrospectError::DescriptorConflict { set: 1, binding: 0, .. })
        ));

        let mut wrong_type = layout.clone();
        wrong_type.descriptor_set_layouts[0].bindings[0].descriptor_type =
            DescriptorType::StorageBuffer;
        assert!(pipeline.verify_layout(&wrong_type).is_err());

        let mut narrow = layout.clone();
        narrow.descriptor_set_layouts[0].bindings[0].stage_flags = ShaderStageFlags::VERTEX;
        assert!(pipeline.verify_layout(&narrow).is_err());

        let mut no_push_constants = layout;
        no_push_constants.push_constant_ranges[0].stage_flags = ShaderStageFlags::VERTEX;
        assert!(matches!(
            pipeline.verify_layout(&no_push_constants),
            Err(IntrospectError::PushConstantConflict { .. })
        ));
    }

    #[test]
    fn test_verify_layout_range_past_addressable_end() {
        let mut pipeline = PipelineIntrospection::new();
        pipeline.merge(&introspect(vertex_module(), 1), None).unwrap();

        let mut layout = pipeline.create_pipeline_layout();
        layout.push_constant_ranges.push(PushConstantRange {
            stage_flags: ShaderStageFlags::VERTEX,
            offset: u32::MAX,
            size: 4,
        });
        match pipeline.verify_layout(&layout) {
            Err(IntrospectError::PushConstantConflict { offset, size, .. }) => {
                assert_eq!((offset, size), (u32::MAX, 4));
            }
            result => panic!("expected PushConstantConflict, got {:?}", result),
        }
    }
}
