use glam::Vec3;
use wgpu::util::DeviceExt;

use super::gpu::{self, buffer_binding, storage_entry, uniform_entry};
use crate::math::{DualQuat, RigidTransform};
use crate::mesh::{GpuDualQuat, GpuRigidTransform};

const SHADER: &str = include_str!("../../shaders/bone_dq.wgsl");

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BoneParams {
    pub world_to_local: GpuRigidTransform,
    pub bone_orientation: [f32; 4],
    pub joint_count: u32,
    pub _padding: [u32; 3],
}

impl BoneParams {
    pub fn new(world_to_local: RigidTransform, bone_orientation: Vec3, joint_count: usize) -> Self {
        Self {
            world_to_local: world_to_local.into(),
            bone_orientation: bone_orientation.extend(0.0).to_array(),
            joint_count: joint_count as u32,
            _padding: [0; 3],
        }
    }
}

/// Skinning dual quaternion and posed bulge direction for one joint.
///
/// The local pose is `world_to_local ⊗ world`; the result appends the
/// inverse bind pose so it maps bind-pose vertices straight to the posed mesh.
/// The direction rotates `bone_orientation` by the local pose rotation, which
/// equals the skinned rotation applied to the bind-pose bone direction.
pub fn skin_joint(
    world: &RigidTransform,
    world_to_local: &RigidTransform,
    inverse_bind: &DualQuat,
    bone_orientation: Vec3,
) -> (DualQuat, Vec3) {
    let local = DualQuat::from_transform(world_to_local).mul(&DualQuat::from_transform(world));
    let skinned = local.mul(inverse_bind);
    (skinned, local.real * bone_orientation)
}

/// Per-bind joint buffers. `skinned_dual_quats` and `bone_directions` are
/// written here and read by the blend kernel.
pub struct JointBuffers {
    pub params: wgpu::Buffer,
    pub poses: wgpu::Buffer,
    pub bind_dual_quats: wgpu::Buffer,
    pub skinned_dual_quats: wgpu::Buffer,
    pub bone_directions: wgpu::Buffer,
    pub joint_count: usize,
}

impl JointBuffers {
    pub fn new(device: &wgpu::Device, bind_poses: &[RigidTransform]) -> Self {
        let joint_count = bind_poses.len();
        let bind_dual_quats: Vec<GpuDualQuat> = bind_poses
            .iter()
            .map(|pose| DualQuat::from_transform(pose).into())
            .collect();

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Bone Params Buffer"),
            size: std::mem::size_of::<BoneParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let poses = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Joint Pose Buffer"),
            size: (joint_count * std::mem::size_of::<GpuRigidTransform>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_dual_quats = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Bind Dual Quat Buffer"),
            contents: bytemuck::cast_slice(&bind_dual_quats),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let skinned_dual_quats = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Skinned Dual Quat Buffer"),
            size: (joint_count * std::mem::size_of::<GpuDualQuat>()) as u64,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });
        let bone_directions = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Bone Direction Buffer"),
            size: (joint_count * std::mem::size_of::<[f32; 4]>()) as u64,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        Self {
            params,
            poses,
            bind_dual_quats,
            skinned_dual_quats,
            bone_directions,
            joint_count,
        }
    }

    pub fn destroy(&self) {
        self.params.destroy();
        self.poses.destroy();
        self.bind_dual_quats.destroy();
        self.skinned_dual_quats.destroy();
        self.bone_directions.destroy();
    }
}

pub struct BoneDqKernel {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl BoneDqKernel {
    pub fn new(device: &wgpu::Device) -> Self {
        let source = format!("{}\n{}", super::DQ_COMMON, SHADER);
        let (pipeline, bind_group_layout) = gpu::create_compute_pipeline(
            device,
            "Bone DQ",
            source,
            &[
                // @binding(0) params: BoneParams
                uniform_entry(0),
                // @binding(1) pose_transforms: array<RigidTransform>
                storage_entry(1, true),
                // @binding(2) bind_dual_quats: array<DualQuat>
                storage_entry(2, true),
                // @binding(3) skinned_dual_quats: array<DualQuat>
                storage_entry(3, false),
                // @binding(4) bone_directions: array<vec4<f32>>
                storage_entry(4, false),
            ],
        );
        Self {
            pipeline,
            bind_group_layout,
        }
    }

    pub fn bind(&self, device: &wgpu::Device, buffers: &JointBuffers) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bone DQ Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                buffer_binding(0, &buffers.params),
                buffer_binding(1, &buffers.poses),
                buffer_binding(2, &buffers.bind_dual_quats),
                buffer_binding(3, &buffers.skinned_dual_quats),
                buffer_binding(4, &buffers.bone_directions),
            ],
        })
    }

    pub fn dispatch(&self, pass: &mut wgpu::ComputePass, bind_group: &wgpu::BindGroup, joint_count: usize) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(gpu::workgroup_count(joint_count as u32), 1, 1);
    }
}
