//! GPU-side record layouts. Every struct here is mirrored field-for-field by a
//! WGSL struct in `shaders/`; vec3 data is widened to vec4 so the storage
//! buffer stride stays a multiple of 16 bytes.

use glam::{Vec3, Vec4};

/// Per-vertex skinning input, also the element type of the shape
/// accumulation scratch buffers.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VertexRecord {
    pub position: [f32; 4],
    pub normal: [f32; 4],
    pub tangent: [f32; 4], // w = bitangent handedness
    pub joints: [u32; 4],
    pub weights: [f32; 4],
    pub compensation: f32,
    pub _padding: [f32; 3],
}

impl VertexRecord {
    pub fn new(position: Vec3, normal: Vec3, tangent: Vec4, influences: &BoneWeights) -> Self {
        Self {
            position: position.extend(1.0).to_array(),
            normal: normal.extend(0.0).to_array(),
            tangent: tangent.to_array(),
            joints: influences.joints,
            weights: influences.weights,
            compensation: 0.0,
            _padding: [0.0; 3],
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec4::from_array(self.position).truncate()
    }

    pub fn normal(&self) -> Vec3 {
        Vec4::from_array(self.normal).truncate()
    }

    pub fn tangent(&self) -> Vec4 {
        Vec4::from_array(self.tangent)
    }

    /// First slot with a non-zero weight; slot 0 when every weight is zero.
    pub fn primary_joint(&self) -> u32 {
        self.weights
            .iter()
            .position(|w| *w != 0.0)
            .map(|slot| self.joints[slot])
            .unwrap_or(self.joints[0])
    }
}

/// Up to four joint influences. Weights need not sum to one; zero-weight
/// slots are ignored by every kernel.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct BoneWeights {
    pub joints: [u32; 4],
    pub weights: [f32; 4],
}

impl BoneWeights {
    pub fn single(joint: u32) -> Self {
        Self {
            joints: [joint, 0, 0, 0],
            weights: [1.0, 0.0, 0.0, 0.0],
        }
    }

    pub fn influences(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.joints
            .iter()
            .copied()
            .zip(self.weights.iter().copied())
            .filter(|(_, weight)| *weight != 0.0)
    }
}

/// One shape target's offset for one vertex.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MorphDelta {
    pub position: [f32; 4],
    pub normal: [f32; 4],
    pub tangent: [f32; 4],
}

impl MorphDelta {
    pub fn new(position: Vec3, normal: Vec3, tangent: Vec3) -> Self {
        Self {
            position: position.extend(0.0).to_array(),
            normal: normal.extend(0.0).to_array(),
            tangent: tangent.extend(0.0).to_array(),
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuDualQuat {
    pub real: [f32; 4],
    pub dual: [f32; 4],
}

impl From<crate::math::DualQuat> for GpuDualQuat {
    fn from(dq: crate::math::DualQuat) -> Self {
        let [real, dual] = dq.to_gpu();
        Self { real, dual }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuRigidTransform {
    pub rotation: [f32; 4],
    pub translation: [f32; 4],
}

impl From<crate::math::RigidTransform> for GpuRigidTransform {
    fn from(transform: crate::math::RigidTransform) -> Self {
        Self {
            rotation: transform.rotation.to_array(),
            translation: transform.translation.extend(0.0).to_array(),
        }
    }
}
