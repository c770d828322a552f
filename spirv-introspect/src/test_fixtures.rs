//! Hand-built decoder output used across the unit tests

use crate::decoder::{
    DecodedArrayDim, DecodedImage, DecodedMember, DecodedModule, DecodedPushConstantBlock,
    DecodedResource, DecodedType, DecodedTypeId, PredecodedShaders,
};
use crate::*;
use log::LevelFilter;
use std::sync::Arc;

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .is_test(true)
        .filter_level(LevelFilter::Debug)
        .try_init();
}

/// Fake SPIR-V, only ever used as a key
pub fn fake_bytecode(seed: u8) -> Vec<u8> {
    vec![0x03, 0x02, 0x23, 0x07, seed, seed, seed, seed]
}

pub fn params(
    stage: ShaderStageFlags,
    bytecode: Vec<u8>,
    entry_point: &str,
) -> IntrospectionParams {
    IntrospectionParams::new(
        entry_point,
        Arc::new(ShaderModuleData::new_spirv(stage, bytecode)),
    )
}

pub fn add_vec(
    module: &mut DecodedModule,
    base_type: VarType,
    vec_size: u32,
) -> DecodedTypeId {
    module.add_type(DecodedType {
        vec_size,
        ..DecodedType::scalar(base_type)
    })
}

pub fn add_mat4(module: &mut DecodedModule) -> DecodedTypeId {
    module.add_type(DecodedType {
        vec_size: 4,
        columns: 4,
        matrix_stride: 16,
        ..DecodedType::scalar(VarType::F32)
    })
}

pub fn add_array(
    module: &mut DecodedModule,
    element: DecodedType,
    dims: Vec<DecodedArrayDim>,
    array_stride: u32,
) -> DecodedTypeId {
    module.add_type(DecodedType {
        array: dims,
        array_stride,
        ..element
    })
}

pub fn add_struct(
    module: &mut DecodedModule,
    name: &str,
    members: Vec<(&str, DecodedTypeId, u32, u32)>,
) -> DecodedTypeId {
    let members = members
        .into_iter()
        .map(|(name, type_id, offset, size)| DecodedMember {
            type_id,
            name: Some(name.to_string()),
            offset,
            size,
        })
        .collect();

    module.add_type(DecodedType {
        name: Some(name.to_string()),
        members,
        ..Default::default()
    })
}

/// Push constant block `{ mat4 transform; }` covering [offset, offset + 64)
pub fn add_mat4_push_constants(
    module: &mut DecodedModule,
    offset: u32,
) {
    let mat4 = add_mat4(module);
    let block = add_struct(
        module,
        "PushConstants",
        vec![("transform", mat4, offset, 64)],
    );
    module.push_constants = Some(DecodedPushConstantBlock {
        name: Some("push_constants".to_string()),
        type_id: block,
    });
}

pub fn uniform_buffer(
    module: &mut DecodedModule,
    set: u32,
    binding: u32,
) -> DecodedResource {
    let vec4 = add_vec(module, VarType::F32, 4);
    let block = add_struct(module, "PerView", vec![("color", vec4, 0, 16)]);
    DecodedResource {
        name: Some("per_view".to_string()),
        type_id: Some(block),
        ..DecodedResource::new(DescriptorType::UniformBuffer, set, binding)
    }
}

pub fn storage_image(
    set: u32,
    binding: u32,
) -> DecodedResource {
    DecodedResource {
        name: Some("output_image".to_string()),
        image: Some(DecodedImage {
            format: Some(1),
            ..Default::default()
        }),
        access: DescriptorAccess {
            readonly: false,
            writeonly: true,
        },
        ..DecodedResource::new(DescriptorType::StorageImage, set, binding)
    }
}

pub fn sampled_texture(
    set: u32,
    binding: u32,
) -> DecodedResource {
    DecodedResource {
        name: Some("albedo".to_string()),
        image: Some(DecodedImage::default()),
        ..DecodedResource::new(DescriptorType::CombinedImageSampler, set, binding)
    }
}

/// Storage buffer `{ uint count; vec4 particles[]; }`
pub fn runtime_sized_storage_buffer(
    module: &mut DecodedModule,
    set: u32,
    binding: u32,
) -> DecodedResource {
    let count = module.add_type(DecodedType::scalar(VarType::U32));
    let particles = add_array(
        module,
        DecodedType {
            vec_size: 4,
            ..DecodedType::scalar(VarType::F32)
        },
        vec![DecodedArrayDim::Literal(0)],
        16,
    );
    let block = add_struct(
        module,
        "Particles",
        vec![("count", count, 0, 4), ("particles", particles, 16, 0)],
    );
    DecodedResource {
        name: Some("particles".to_string()),
        type_id: Some(block),
        ..DecodedResource::new(DescriptorType::StorageBuffer, set, binding)
    }
}

/// Vertex shader with a mat4 push constant block at offset 0 and a uniform buffer at (0, 0)
pub fn vertex_module() -> DecodedModule {
    let mut module = DecodedModule::new("main", ShaderStageFlags::VERTEX);
    add_mat4_push_constants(&mut module, 0);
    let ubo = uniform_buffer(&mut module, 0, 0);
    module.resources.push(ubo);
    module
}

/// Fragment shader with a mat4 push constant block at offset 0, the same uniform buffer at (0, 0)
/// and a texture at (1, 0)
pub fn fragment_module() -> DecodedModule {
    let mut module = DecodedModule::new("main", ShaderStageFlags::FRAGMENT);
    add_mat4_push_constants(&mut module, 0);
    let ubo = uniform_buffer(&mut module, 0, 0);
    module.resources.push(ubo);
    module.resources.push(sampled_texture(1, 0));
    module
}

/// Compute shader writing a storage image at (0, 3)
pub fn compute_module() -> DecodedModule {
    let mut module = DecodedModule::new("main", ShaderStageFlags::COMPUTE);
    module.resources.push(storage_image(0, 3));
    module
}

/// Registers `module` with a decoder and returns params that decode to it
pub fn register(
    decoder: &mut PredecodedShaders,
    module: DecodedModule,
    seed: u8,
) -> IntrospectionParams {
    let bytecode = fake_bytecode(seed);
    let params = params(module.stage, bytecode.clone(), &module.entry_point);
    decoder.insert(bytecode, module);
    params
}

/// Builds the introspection directly, bypassing the cache
pub fn introspect(
    module: DecodedModule,
    seed: u8,
) -> Arc<StageIntrospection> {
    let params = params(module.stage, fake_bytecode(seed), &module.entry_point);
    Arc::new(crate::stage::build_stage_introspection(params, &module).unwrap())
}
