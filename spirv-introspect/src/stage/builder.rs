use super::*;
use crate::decoder::{
    DecodedArrayDim, DecodedInterface, DecodedModule, DecodedResource, DecodedType, DecodedTypeId,
};
use crate::{IntrospectError, IntrospectResult};
use fnv::{FnvHashMap, FnvHashSet};
use spirv_introspect_base::ByteArena;

fn convert_extents(
    dims: &[DecodedArrayDim],
    context: &dyn Fn() -> String,
) -> IntrospectResult<Vec<ArrayExtent>> {
    let mut extents = Vec::with_capacity(dims.len());
    for (index, dim) in dims.iter().enumerate() {
        let extent = match *dim {
            DecodedArrayDim::Literal(count) => ArrayExtent::literal(count),
            DecodedArrayDim::SpecConstant(spec_id) => ArrayExtent::spec_constant(spec_id),
        }
        .ok_or_else(|| {
            IntrospectError::UnsupportedType(format!(
                "{}: array dimension {:?} is out of range",
                context(),
                dim
            ))
        })?;

        // Only the outermost dimension may be runtime-sized
        if extent.is_runtime_sized() && index + 1 != dims.len() {
            return Err(IntrospectError::UnsupportedType(format!(
                "{}: only the outermost array dimension may be runtime-sized",
                context()
            )));
        }

        extents.push(extent);
    }

    Ok(extents)
}

fn type_context(
    type_id: DecodedTypeId,
    ty: &DecodedType,
) -> String {
    format!(
        "type {} ({})",
        type_id,
        ty.name.as_deref().unwrap_or("<unnamed>")
    )
}

// Byte size of a struct as declared, which is the end of its furthest member
fn declared_struct_size(
    type_id: DecodedTypeId,
    ty: &DecodedType,
) -> IntrospectResult<u32> {
    let mut size = 0;
    for (index, member) in ty.members.iter().enumerate() {
        let end = member.offset.checked_add(member.size).ok_or_else(|| {
            IntrospectError::UnsupportedType(format!(
                "{}: member {} (offset={} size={}) ends past the addressable range",
                type_context(type_id, ty),
                index,
                member.offset,
                member.size
            ))
        })?;
        size = size.max(end);
    }

    Ok(size)
}

struct BuildFrame {
    type_id: DecodedTypeId,
    node: BasedOffset<TypeNode>,
    next_member: usize,
}

/// Materializes decoder type records as `TypeNode`s in the arena. Each decoded type id becomes a
/// single node, so a type referenced from several places is shared.
struct TypeGraphBuilder<'a> {
    module: &'a DecodedModule,
    arena: &'a mut ByteArena,
    built: FnvHashMap<DecodedTypeId, BasedOffset<TypeNode>>,
    in_progress: FnvHashSet<DecodedTypeId>,
}

impl<'a> TypeGraphBuilder<'a> {
    fn new(
        module: &'a DecodedModule,
        arena: &'a mut ByteArena,
    ) -> Self {
        TypeGraphBuilder {
            module,
            arena,
            built: Default::default(),
            in_progress: Default::default(),
        }
    }

    // Allocates the node and everything it owns directly (member slots, name, extents) before any
    // member is visited. The member slots are filled in as members are resolved.
    fn allocate_node(
        &mut self,
        type_id: DecodedTypeId,
    ) -> IntrospectResult<BasedOffset<TypeNode>> {
        let module = self.module;
        let ty = module.get_type(type_id)?;

        let info = if ty.is_struct() {
            TypeInfo::new(VarType::UnknownOrStruct, 1, 1, ty.row_major, 0)
        } else {
            if !(1..=4).contains(&ty.vec_size) || !(1..=4).contains(&ty.columns) {
                return Err(IntrospectError::UnsupportedType(format!(
                    "{}: {}x{} is not a valid scalar, vector or matrix shape",
                    type_context(type_id, ty),
                    ty.vec_size,
                    ty.columns
                )));
            }

            if ty.matrix_stride > u16::MAX as u32 {
                return Err(IntrospectError::UnsupportedType(format!(
                    "{}: matrix stride {} is too large",
                    type_context(type_id, ty),
                    ty.matrix_stride
                )));
            }

            TypeInfo::new(
                ty.base_type,
                ty.vec_size as u8,
                ty.columns as u8,
                ty.row_major,
                ty.matrix_stride as u16,
            )
        }
        .with_decorations(ty.restrict, ty.aliased);

        let extents = convert_extents(&ty.array, &|| type_context(type_id, ty))?;

        let members = self.arena.alloc::<MemberInfo>(ty.members.len());
        let type_name = ty
            .name
            .as_deref()
            .map(|name| self.arena.push_str(name))
            .unwrap_or_default();
        let extents = self.arena.push_slice(&extents);
        let node = self.arena.push(TypeNode {
            type_name,
            extents,
            info,
            members,
        });

        self.built.insert(type_id, node);
        Ok(node)
    }

    /// Depth-first, with an explicit stack
    fn build(
        &mut self,
        root_type_id: DecodedTypeId,
    ) -> IntrospectResult<BasedOffset<TypeNode>> {
        if let Some(node) = self.built.get(&root_type_id) {
            return Ok(*node);
        }

        let module = self.module;
        let root = self.allocate_node(root_type_id)?;
        self.in_progress.insert(root_type_id);

        let mut stack = vec![BuildFrame {
            type_id: root_type_id,
            node: root,
            next_member: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            let parent_type_id = frame.type_id;
            let parent_node = frame.node;
            let parent = module.get_type(parent_type_id)?;

            if frame.next_member == parent.members.len() {
                self.in_progress.remove(&parent_type_id);
                stack.pop();
                continue;
            }

            let member_index = frame.next_member;
            frame.next_member += 1;

            let member = &parent.members[member_index];
            let member_type = module.get_type(member.type_id)?;

            let (child, visit_child) = match self.built.get(&member.type_id).copied() {
                Some(_) if self.in_progress.contains(&member.type_id) => {
                    return Err(IntrospectError::UnsupportedType(format!(
                        "{}: member {} refers back to a type that contains it",
                        type_context(parent_type_id, parent),
                        member_index
                    )));
                }
                Some(node) => (node, false),
                None => (self.allocate_node(member.type_id)?, true),
            };

            let name = member
                .name
                .as_deref()
                .map(|name| self.arena.push_str(name))
                .unwrap_or_default();

            let stride = if member_type.array.is_empty() {
                0
            } else {
                member_type.array_stride
            };

            // Re-resolve the parent, the allocations above may have moved the arena's storage
            let parent_members = self
                .arena
                .get(parent_node)
                .map(|x| x.members)
                .unwrap_or_default();
            self.arena.slice_mut(parent_members)[member_index] = MemberInfo {
                ty: child,
                name,
                size: member.size,
                offset: member.offset,
                stride,
            };

            if visit_child {
                self.in_progress.insert(member.type_id);
                stack.push(BuildFrame {
                    type_id: member.type_id,
                    node: child,
                    next_member: 0,
                });
            }
        }

        Ok(root)
    }
}

// Runtime-sized arrays are only legal as the last member of a storage buffer block. Types are
// shared between blocks so this is checked per block, after the block's tree is built.
fn validate_block(
    bytes: &[u8],
    block: BasedOffset<TypeNode>,
    allow_runtime_sized_tail: bool,
    context: &str,
) -> IntrospectResult<()> {
    let root = TypeView::new(bytes, block).ok_or("block type was not built")?;
    if root.is_runtime_sized_array() {
        return Err(IntrospectError::UnsupportedType(format!(
            "{}: the block type itself is a runtime-sized array",
            context
        )));
    }

    // Runtime-sized members are only legal in the root, so a nested type shared by several
    // members needs to be checked once
    let mut visited = FnvHashSet::default();
    let mut stack = vec![(root, true)];
    while let Some((ty, is_root)) = stack.pop() {
        let member_count = ty.member_count();
        for (index, member) in ty.members().enumerate() {
            let member_type = member.ty().ok_or("member type was not built")?;
            if member_type.is_runtime_sized_array() {
                let is_tail = is_root && index + 1 == member_count;
                if !(allow_runtime_sized_tail && is_tail) {
                    return Err(IntrospectError::UnsupportedType(format!(
                        "{}: member {} ({}) is a runtime-sized array but is not the last member of a storage buffer block",
                        context,
                        index,
                        member.name().unwrap_or("<unnamed>")
                    )));
                }
            }

            if visited.insert(member_type.offset()) {
                stack.push((member_type, false));
            }
        }
    }

    Ok(())
}

fn build_payload(
    builder: &mut TypeGraphBuilder,
    resource: &DecodedResource,
    context: &str,
) -> IntrospectResult<DescriptorPayload> {
    let image_info = || {
        let image = resource.image.unwrap_or_default();
        (
            ImageInfo {
                view_type: image.view_type,
                shadow: image.shadow,
            },
            image,
        )
    };

    Ok(match resource.descriptor_type {
        DescriptorType::Sampler => DescriptorPayload::Sampler,
        DescriptorType::CombinedImageSampler => {
            let (image, decoded) = image_info();
            DescriptorPayload::CombinedImageSampler {
                image,
                multisample: decoded.multisample,
            }
        }
        DescriptorType::SampledImage => {
            let (image, decoded) = image_info();
            DescriptorPayload::SampledImage {
                image,
                multisample: decoded.multisample,
            }
        }
        DescriptorType::StorageImage => {
            let (image, decoded) = image_info();
            DescriptorPayload::StorageImage {
                access: resource.access,
                image,
                format: decoded.format,
            }
        }
        DescriptorType::UniformTexelBuffer => DescriptorPayload::UniformTexelBuffer,
        DescriptorType::StorageTexelBuffer => DescriptorPayload::StorageTexelBuffer {
            access: resource.access,
        },
        DescriptorType::UniformBuffer | DescriptorType::StorageBuffer => {
            let type_id = resource.type_id.ok_or_else(|| {
                IntrospectError::Decode(format!("{}: buffer has no block type", context))
            })?;

            let block = builder.build(type_id)?;
            let is_storage = resource.descriptor_type == DescriptorType::StorageBuffer;
            validate_block(builder.arena.bytes(), block, is_storage, context)?;

            let decoded = builder.module.get_type(type_id)?;
            let size = declared_struct_size(type_id, decoded)?;

            if is_storage {
                let view = TypeView::new(builder.arena.bytes(), block)
                    .ok_or("block type was not built")?;
                let size_without_last_member = if view.is_last_member_runtime_sized() {
                    decoded.members.last().map(|x| x.offset).unwrap_or(0)
                } else {
                    size
                };

                DescriptorPayload::StorageBuffer {
                    access: resource.access,
                    block,
                    size_without_last_member,
                }
            } else {
                DescriptorPayload::UniformBuffer { block, size }
            }
        }
        DescriptorType::InputAttachment => DescriptorPayload::InputAttachment {
            index: resource.input_attachment_index,
        },
    })
}

fn sorted_interfaces(decoded: &[DecodedInterface]) -> Vec<&DecodedInterface> {
    let mut interfaces: Vec<_> = decoded.iter().collect();
    interfaces.sort_by_key(|x| x.location);
    interfaces
}

/// Walks everything the decoder reported for one entry point and assembles the finished, immutable
/// introspection. Fails without producing anything if any type shape is unsupported.
#[profiling::function]
pub(crate) fn build_stage_introspection(
    params: IntrospectionParams,
    module: &DecodedModule,
) -> IntrospectResult<StageIntrospection> {
    let stage = params.stage();
    if module.stage != stage {
        return Err(IntrospectError::Decode(format!(
            "decoder reported stage {:?} for a {:?} shader",
            module.stage, stage
        )));
    }

    let mut arena = ByteArena::new();

    //
    // Specialization constants
    //
    let mut spec_constants = Vec::with_capacity(module.spec_constants.len());
    for decoded in &module.spec_constants {
        spec_constants.push(SpecConstant {
            id: decoded.id,
            name: decoded
                .name
                .as_deref()
                .map(|x| arena.push_str(x))
                .unwrap_or_default(),
            var_type: decoded.base_type,
            default_value: decoded.default_value,
            byte_size: decoded.byte_size,
        });
    }
    spec_constants.sort_by_key(|x| x.id);

    //
    // Stage inputs/outputs
    //
    let inputs = sorted_interfaces(&module.inputs)
        .into_iter()
        .map(|x| InputInterface {
            location: x.location,
            elements: x.elements,
            base_type: x.base_type,
        })
        .collect();

    let outputs = if stage == ShaderStageFlags::FRAGMENT {
        StageOutputs::Fragment(
            sorted_interfaces(&module.outputs)
                .into_iter()
                .map(|x| FragmentOutputInterface {
                    location: x.location,
                    elements: x.elements,
                    base_type: x.base_type,
                    color_index: x.color_index,
                })
                .collect(),
        )
    } else {
        StageOutputs::Generic(
            sorted_interfaces(&module.outputs)
                .into_iter()
                .map(|x| OutputInterface {
                    location: x.location,
                    elements: x.elements,
                    base_type: x.base_type,
                })
                .collect(),
        )
    };

    let mut builder = TypeGraphBuilder::new(module, &mut arena);

    //
    // Push constants
    //
    let mut push_constants = PushConstantInfo::default();
    if let Some(decoded) = &module.push_constants {
        let context = format!(
            "push constant block {}",
            decoded.name.as_deref().unwrap_or("<unnamed>")
        );
        let block = builder.build(decoded.type_id)?;
        validate_block(builder.arena.bytes(), block, false, &context)?;

        let decoded_type = module.get_type(decoded.type_id)?;
        let offset = decoded_type
            .members
            .iter()
            .map(|x| x.offset)
            .min()
            .unwrap_or(0);
        let end = declared_struct_size(decoded.type_id, decoded_type)?;

        push_constants = PushConstantInfo {
            name: decoded
                .name
                .as_deref()
                .map(|x| builder.arena.push_str(x))
                .unwrap_or_default(),
            offset,
            size: end - offset,
            block,
        };

        if log::log_enabled!(log::Level::Trace) {
            if let Some(view) = TypeView::new(builder.arena.bytes(), block) {
                log::trace!("{}:\n{:?}", context, view);
            }
        }
    }

    //
    // Descriptors
    //
    let mut descriptor_set_bindings: [Vec<DescriptorVarInfo>; DESCRIPTOR_SET_COUNT] =
        Default::default();
    for resource in &module.resources {
        let context = format!(
            "descriptor {} (set={} binding={})",
            resource.name.as_deref().unwrap_or("<unnamed>"),
            resource.set,
            resource.binding
        );

        let set_bindings = descriptor_set_bindings
            .get_mut(resource.set as usize)
            .ok_or_else(|| {
                IntrospectError::UnsupportedType(format!(
                    "{}: set index must be less than {}",
                    context, DESCRIPTOR_SET_COUNT
                ))
            })?;

        if set_bindings.iter().any(|x| x.binding == resource.binding) {
            return Err(IntrospectError::Decode(format!(
                "{}: binding is declared more than once",
                context
            )));
        }

        let extents = convert_extents(&resource.array, &|| context.clone())?;
        let payload = build_payload(&mut builder, resource, &context)?;

        if log::log_enabled!(log::Level::Trace) {
            if let Some(view) = payload
                .block()
                .and_then(|block| TypeView::new(builder.arena.bytes(), block))
            {
                log::trace!("{}:\n{:?}", context, view);
            }
        }

        let name = resource
            .name
            .as_deref()
            .map(|x| builder.arena.push_str(x))
            .unwrap_or_default();
        let count = builder.arena.push_slice(&extents);

        set_bindings.push(DescriptorVarInfo {
            binding: resource.binding,
            name,
            count,
            restrict: resource.restrict,
            aliased: resource.aliased,
            payload,
        });
    }

    for set_bindings in &mut descriptor_set_bindings {
        set_bindings.sort_by_key(|x| x.binding);
    }

    log::debug!(
        "Introspected entry point {} ({:?}): {} spec constants, {} bindings, {} bytes of reflection data",
        params.entry_point,
        stage,
        spec_constants.len(),
        descriptor_set_bindings.iter().map(|x| x.len()).sum::<usize>(),
        arena.len()
    );

    Ok(StageIntrospection {
        params,
        stage,
        spec_constants,
        inputs,
        outputs,
        push_constants,
        descriptor_set_bindings,
        arena: arena.freeze(),
    })
}
