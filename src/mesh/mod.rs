mod loader;
mod vertex;

pub use vertex::{BoneWeights, GpuDualQuat, GpuRigidTransform, MorphDelta, VertexRecord};

use glam::{Quat, Vec3, Vec4};

use crate::math::RigidTransform;
use crate::{Result, SkinningError};

/// Axis-aligned box in mesh-local space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    pub fn from_points(points: &[Vec3]) -> Self {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for point in points {
            min = min.min(*point);
            max = max.max(*point);
        }
        if points.is_empty() {
            return Self::from_center_half_extents(Vec3::ZERO, Vec3::ZERO);
        }
        Self { min, max }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }
}

/// A named shape target. `deltas` is `None` when the target is declared by the
/// asset but its per-vertex data was never captured.
#[derive(Debug, Clone)]
pub struct BlendShape {
    pub name: String,
    pub deltas: Option<Vec<MorphDelta>>,
}

/// Everything the pipeline captures at bind time. Owned by the asset layer;
/// the pipeline copies what it needs into GPU buffers.
#[derive(Debug, Clone, Default)]
pub struct SourceMesh {
    pub name: String,
    pub positions: Vec<Vec3>,
    /// Empty means "no normals"; the kernels then see zero vectors.
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
    pub bone_weights: Vec<BoneWeights>,
    /// Per-joint inverse bind transform (mesh space to joint space).
    pub bind_poses: Vec<RigidTransform>,
    pub shapes: Vec<BlendShape>,
    pub local_bounds: Option<Aabb>,
}

impl SourceMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn joint_count(&self) -> usize {
        self.bind_poses.len()
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    pub fn bounds(&self) -> Aabb {
        self.local_bounds
            .unwrap_or_else(|| Aabb::from_points(&self.positions))
    }

    pub fn validate(&self) -> Result<()> {
        let vertex_count = self.vertex_count();
        if vertex_count == 0 {
            return Err(SkinningError::InvalidMesh(format!(
                "mesh '{}' has no vertices",
                self.name
            )));
        }
        if self.bind_poses.is_empty() {
            return Err(SkinningError::InvalidMesh(format!(
                "mesh '{}' has no bind poses",
                self.name
            )));
        }
        for (attribute, len) in [
            ("normals", self.normals.len()),
            ("tangents", self.tangents.len()),
        ] {
            if len != 0 && len != vertex_count {
                return Err(SkinningError::InvalidMesh(format!(
                    "{} {} for {} vertices",
                    len, attribute, vertex_count
                )));
            }
        }
        if self.bone_weights.len() != vertex_count {
            return Err(SkinningError::InvalidMesh(format!(
                "{} bone weight records for {} vertices",
                self.bone_weights.len(),
                vertex_count
            )));
        }
        let joint_count = self.joint_count() as u32;
        for (vertex, influences) in self.bone_weights.iter().enumerate() {
            if let Some((joint, _)) = influences.influences().find(|(j, _)| *j >= joint_count) {
                return Err(SkinningError::InvalidMesh(format!(
                    "vertex {} references joint {} but only {} joints exist",
                    vertex, joint, joint_count
                )));
            }
        }
        for (index, shape) in self.shapes.iter().enumerate() {
            if let Some(deltas) = &shape.deltas {
                if deltas.len() != vertex_count {
                    return Err(SkinningError::InvalidMesh(format!(
                        "shape {} ('{}') has {} deltas for {} vertices",
                        index,
                        shape.name,
                        deltas.len(),
                        vertex_count
                    )));
                }
            }
        }
        Ok(())
    }

    /// Builds the immutable per-vertex records, including the bulge
    /// coefficient for `bone_orientation`.
    pub fn vertex_records(&self, bone_orientation: Vec3) -> Vec<VertexRecord> {
        let mut records: Vec<VertexRecord> = (0..self.vertex_count())
            .map(|i| {
                VertexRecord::new(
                    self.positions[i],
                    self.normals.get(i).copied().unwrap_or(Vec3::ZERO),
                    self.tangents.get(i).copied().unwrap_or(Vec4::ZERO),
                    &self.bone_weights[i],
                )
            })
            .collect();
        update_compensation(&mut records, &self.bind_poses, bone_orientation);
        records
    }

    /// Two joints along +X with three two-vertex cross-sections: x = 0 rigid to
    /// joint 0, x = 1 split evenly across the joint, x = 2 rigid to joint 1.
    /// Carries one shape target, "flare", widening the far cross-section.
    pub fn strip() -> Self {
        let half_width = 0.5;
        let mut positions = Vec::new();
        let mut bone_weights = Vec::new();
        for section in 0..3 {
            let x = section as f32;
            for side in [1.0, -1.0] {
                positions.push(Vec3::new(x, side * half_width, 0.0));
                bone_weights.push(match section {
                    0 => BoneWeights::single(0),
                    1 => BoneWeights {
                        joints: [0, 1, 0, 0],
                        weights: [0.5, 0.5, 0.0, 0.0],
                    },
                    _ => BoneWeights::single(1),
                });
            }
        }
        let vertex_count = positions.len();
        let flare = positions
            .iter()
            .map(|p| {
                let offset = if p.x > 1.5 { p.y * 0.5 } else { 0.0 };
                MorphDelta::new(Vec3::new(0.0, offset, 0.0), Vec3::ZERO, Vec3::ZERO)
            })
            .collect();

        Self {
            name: "strip".to_string(),
            positions,
            normals: vec![Vec3::Z; vertex_count],
            tangents: vec![Vec4::new(1.0, 0.0, 0.0, 1.0); vertex_count],
            bone_weights,
            bind_poses: vec![
                RigidTransform::IDENTITY,
                RigidTransform::from_translation(Vec3::new(-1.0, 0.0, 0.0)),
            ],
            shapes: vec![BlendShape {
                name: "flare".to_string(),
                deltas: Some(flare),
            }],
            local_bounds: None,
        }
    }

    /// World poses for the strip's joints with joint 1 bent by `angle`
    /// radians about +Z.
    pub fn strip_pose(angle: f32) -> Vec<RigidTransform> {
        vec![
            RigidTransform::IDENTITY,
            RigidTransform::new(Quat::from_rotation_z(angle), Vec3::new(1.0, 0.0, 0.0)),
        ]
    }
}

/// Distance from each vertex to its primary joint's bone axis in the bind
/// pose. Only the first influencing joint is considered.
pub fn update_compensation(
    records: &mut [VertexRecord],
    bind_poses: &[RigidTransform],
    bone_orientation: Vec3,
) {
    for record in records.iter_mut() {
        let joint = record.primary_joint() as usize;
        record.compensation = bind_poses
            .get(joint)
            .map(|inverse_bind| {
                compensation_coefficient(record.position(), inverse_bind, bone_orientation)
            })
            .unwrap_or(0.0);
    }
}

pub fn compensation_coefficient(
    position: Vec3,
    inverse_bind: &RigidTransform,
    bone_orientation: Vec3,
) -> f32 {
    let joint = inverse_bind.inverse();
    let bone_direction = joint.rotation * bone_orientation;
    let to_bone = joint.translation - position;
    to_bone.cross(bone_direction).length()
}

#[cfg(test)]
mod tests;
