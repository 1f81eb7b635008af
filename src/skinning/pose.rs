use crate::math::RigidTransform;
use crate::mesh::GpuRigidTransform;
use crate::{Result, SkinningError};

/// Collects one frame of joint poses into the layout the bone kernel reads.
///
/// The staging vector is reused across frames so steady-state sampling does
/// not allocate.
#[derive(Debug)]
pub struct PoseSampler {
    joint_count: usize,
    staged: Vec<GpuRigidTransform>,
}

/// A validated frame of pose input.
#[derive(Debug)]
pub struct SampledPose<'a> {
    pub joints: &'a [GpuRigidTransform],
    pub world_to_local: RigidTransform,
}

impl PoseSampler {
    pub fn new(joint_count: usize) -> Self {
        Self {
            joint_count,
            staged: Vec::with_capacity(joint_count),
        }
    }

    pub fn joint_count(&self) -> usize {
        self.joint_count
    }

    /// `joint_world` holds each joint's current world transform in bind
    /// order; `instance_world` places the skinned mesh instance in the world.
    pub fn sample(
        &mut self,
        joint_world: &[RigidTransform],
        instance_world: &RigidTransform,
    ) -> Result<SampledPose<'_>> {
        if joint_world.len() != self.joint_count {
            return Err(SkinningError::JointCountMismatch {
                expected: self.joint_count,
                actual: joint_world.len(),
            });
        }

        self.staged.clear();
        self.staged
            .extend(joint_world.iter().copied().map(GpuRigidTransform::from));

        Ok(SampledPose {
            joints: &self.staged,
            world_to_local: instance_world.inverse(),
        })
    }
}
