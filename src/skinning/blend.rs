use glam::{Mat4, Vec3};

use super::gpu::{self, buffer_binding, storage_entry, storage_texture_entry, uniform_entry};
use super::morph::{MorphBuffers, Slot};
use super::packing::{OutputPlanes, SkinnedVertex, PLANE_FORMATS};
use crate::math::DualQuat;
use crate::mesh::VertexRecord;

const SHADER: &str = include_str!("../../shaders/dq_blend.wgsl");

const MIN_AXIS_LENGTH: f32 = 1e-6;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BlendParams {
    pub bulge_strength: f32,
    pub vertex_count: u32,
    pub plane_width: u32,
    pub _padding: u32,
}

/// Deforms one vertex record. `skinned` and `directions` are indexed by joint.
///
/// Bulge compensation pushes the position along the part of the deformed
/// normal perpendicular to the blended bone direction. The push scales with
/// the record's coefficient, `bulge_strength` and how far the influencing
/// bones diverge; a rigidly weighted vertex is never displaced.
pub fn skin_vertex(
    record: &VertexRecord,
    skinned: &[DualQuat],
    directions: &[Vec3],
    bulge_strength: f32,
) -> SkinnedVertex {
    let mut inputs = [(DualQuat::IDENTITY, 0.0); 4];
    let mut direction = Vec3::ZERO;
    let mut total_weight = 0.0;
    for slot in 0..4 {
        let weight = record.weights[slot];
        if weight == 0.0 {
            continue;
        }
        let joint = record.joints[slot] as usize;
        let (Some(dq), Some(bone_direction)) = (skinned.get(joint), directions.get(joint)) else {
            continue;
        };
        inputs[slot] = (*dq, weight);
        direction += *bone_direction * weight;
        total_weight += weight;
    }

    let mut position = record.position();
    let mut normal = record.normal();
    let tangent = record.tangent();
    let mut tangent_xyz = tangent.truncate();

    if inputs.iter().any(|(_, weight)| *weight != 0.0) {
        let blended = DualQuat::blend(&inputs);
        position = blended.transform_point(position);
        normal = blended.transform_vector(normal);
        tangent_xyz = blended.transform_vector(tangent_xyz);

        if bulge_strength > 0.0 && total_weight > 0.0 {
            position += bulge_offset(
                normal,
                direction / total_weight,
                record.compensation * bulge_strength,
            );
        }
    }

    SkinnedVertex {
        position,
        normal,
        tangent: tangent_xyz.extend(tangent.w),
    }
}

/// Classic linear blend skinning of the same record, for comparison.
pub fn skin_vertex_linear(record: &VertexRecord, skinned: &[DualQuat]) -> SkinnedVertex {
    let mut matrix = Mat4::ZERO;
    let mut total_weight = 0.0;
    for (joint, weight) in record.joints.iter().zip(record.weights) {
        if weight == 0.0 {
            continue;
        }
        if let Some(dq) = skinned.get(*joint as usize) {
            matrix += dq.to_rigid().to_matrix() * weight;
            total_weight += weight;
        }
    }
    if total_weight == 0.0 {
        matrix = Mat4::IDENTITY;
    }

    let tangent = record.tangent();
    SkinnedVertex {
        position: matrix.transform_point3(record.position()),
        normal: matrix.transform_vector3(record.normal()),
        tangent: matrix
            .transform_vector3(tangent.truncate())
            .extend(tangent.w),
    }
}

fn bulge_offset(normal: Vec3, mean_direction: Vec3, amount: f32) -> Vec3 {
    let coherence = mean_direction.length();
    if coherence <= MIN_AXIS_LENGTH {
        return Vec3::ZERO;
    }
    let bend = (1.0 - coherence).clamp(0.0, 1.0);
    let axis = mean_direction / coherence;
    let radial = normal - axis * normal.dot(axis);
    let radial_length = radial.length();
    if radial_length <= MIN_AXIS_LENGTH {
        return Vec3::ZERO;
    }
    (radial / radial_length) * (amount * bend)
}

pub struct BlendKernel {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl BlendKernel {
    pub fn new(device: &wgpu::Device) -> Self {
        let source = format!("{}\n{}", super::DQ_COMMON, SHADER);
        let (pipeline, bind_group_layout) = gpu::create_compute_pipeline(
            device,
            "DQ Blend",
            source,
            &[
                // @binding(0) params: BlendParams
                uniform_entry(0),
                // @binding(1) records: array<VertexRecord>
                storage_entry(1, true),
                // @binding(2) skinned_dual_quats: array<DualQuat>
                storage_entry(2, true),
                // @binding(3) bone_directions: array<vec4<f32>>
                storage_entry(3, true),
                // @binding(4..6) output planes
                storage_texture_entry(4, PLANE_FORMATS[0]),
                storage_texture_entry(5, PLANE_FORMATS[1]),
                storage_texture_entry(6, PLANE_FORMATS[2]),
            ],
        );
        Self {
            pipeline,
            bind_group_layout,
        }
    }

    /// One bind group per record slot the blend can read from, so switching
    /// the morph result between frames never rebuilds anything.
    pub fn bind(
        &self,
        device: &wgpu::Device,
        params: &wgpu::Buffer,
        records: &MorphBuffers<wgpu::Buffer>,
        skinned_dual_quats: &wgpu::Buffer,
        bone_directions: &wgpu::Buffer,
        planes: &OutputPlanes,
    ) -> MorphBuffers<wgpu::BindGroup> {
        let [position, normal, tangent] = planes.views();
        let create = |slot: Slot| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("DQ Blend Bind Group ({:?})", slot)),
                layout: &self.bind_group_layout,
                entries: &[
                    buffer_binding(0, params),
                    buffer_binding(1, records.get(slot)),
                    buffer_binding(2, skinned_dual_quats),
                    buffer_binding(3, bone_directions),
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: wgpu::BindingResource::TextureView(position),
                    },
                    wgpu::BindGroupEntry {
                        binding: 5,
                        resource: wgpu::BindingResource::TextureView(normal),
                    },
                    wgpu::BindGroupEntry {
                        binding: 6,
                        resource: wgpu::BindingResource::TextureView(tangent),
                    },
                ],
            })
        };
        MorphBuffers {
            base: create(Slot::Base),
            scratch: [create(Slot::Scratch(0)), create(Slot::Scratch(1))],
        }
    }

    pub fn dispatch(&self, pass: &mut wgpu::ComputePass, bind_group: &wgpu::BindGroup, vertex_count: u32) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(gpu::workgroup_count(vertex_count), 1, 1);
    }
}
