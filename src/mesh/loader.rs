use std::path::Path;

use anyhow::{anyhow, Context, Result};
use glam::{Mat4, Vec3, Vec4};

use super::{Aabb, BlendShape, BoneWeights, MorphDelta, SourceMesh};
use crate::math::RigidTransform;

impl SourceMesh {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .unwrap_or("");

        match extension.to_lowercase().as_str() {
            "glb" | "gltf" => Self::load_gltf(path),
            _ => Err(anyhow!("Unsupported mesh format: {}", extension)),
        }
    }

    /// Imports the first primitive of the first node that carries both a mesh
    /// and a skin.
    fn load_gltf(path: &Path) -> Result<Self> {
        let (document, buffers, _images) = gltf::import(path)
            .with_context(|| format!("Failed to import {}", path.display()))?;

        let (mesh, skin) = document
            .nodes()
            .find_map(|node| Some((node.mesh()?, node.skin()?)))
            .ok_or_else(|| anyhow!("{} contains no skinned mesh", path.display()))?;
        let primitive = mesh
            .primitives()
            .next()
            .ok_or_else(|| anyhow!("Mesh has no primitives"))?;
        let primitive_count = mesh.primitives().count();
        if primitive_count > 1 {
            log::warn!(
                "Mesh '{}' has {} primitives, only the first is skinned",
                mesh.name().unwrap_or("unnamed"),
                primitive_count
            );
        }

        let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

        let positions: Vec<Vec3> = reader
            .read_positions()
            .ok_or_else(|| anyhow!("Primitive has no positions"))?
            .map(Vec3::from)
            .collect();
        let normals: Vec<Vec3> = reader
            .read_normals()
            .map(|iter| iter.map(Vec3::from).collect())
            .unwrap_or_default();
        let tangents: Vec<Vec4> = reader
            .read_tangents()
            .map(|iter| iter.map(Vec4::from).collect())
            .unwrap_or_default();

        let joints: Vec<[u16; 4]> = reader
            .read_joints(0)
            .ok_or_else(|| anyhow!("Primitive has no JOINTS_0 attribute"))?
            .into_u16()
            .collect();
        let weights: Vec<[f32; 4]> = reader
            .read_weights(0)
            .ok_or_else(|| anyhow!("Primitive has no WEIGHTS_0 attribute"))?
            .into_f32()
            .collect();
        let bone_weights = joints
            .iter()
            .zip(weights.iter())
            .map(|(joints, weights)| BoneWeights {
                joints: joints.map(u32::from),
                weights: *weights,
            })
            .collect();

        let joint_count = skin.joints().count();
        let skin_reader = skin.reader(|buffer| Some(&buffers[buffer.index()]));
        let bind_poses: Vec<RigidTransform> = match skin_reader.read_inverse_bind_matrices() {
            Some(matrices) => matrices
                .map(|m| RigidTransform::from_matrix(&Mat4::from_cols_array_2d(&m)))
                .collect(),
            None => vec![RigidTransform::IDENTITY; joint_count],
        };

        let shapes = reader
            .read_morph_targets()
            .enumerate()
            .map(|(index, (position_deltas, normal_deltas, tangent_deltas))| {
                let position_deltas: Vec<[f32; 3]> =
                    position_deltas.map(|iter| iter.collect()).unwrap_or_default();
                let normal_deltas: Vec<[f32; 3]> =
                    normal_deltas.map(|iter| iter.collect()).unwrap_or_default();
                let tangent_deltas: Vec<[f32; 3]> =
                    tangent_deltas.map(|iter| iter.collect()).unwrap_or_default();
                let deltas = (0..positions.len())
                    .map(|i| {
                        let get = |values: &[[f32; 3]]| {
                            values.get(i).copied().map(Vec3::from).unwrap_or(Vec3::ZERO)
                        };
                        MorphDelta::new(
                            get(&position_deltas),
                            get(&normal_deltas),
                            get(&tangent_deltas),
                        )
                    })
                    .collect();
                BlendShape {
                    name: format!("target_{}", index),
                    deltas: Some(deltas),
                }
            })
            .collect();

        let bounds = primitive.bounding_box();
        let local_bounds = Aabb {
            min: Vec3::from(bounds.min),
            max: Vec3::from(bounds.max),
        };

        let source = Self {
            name: mesh.name().unwrap_or("unnamed").to_string(),
            positions,
            normals,
            tangents,
            bone_weights,
            bind_poses,
            shapes,
            local_bounds: Some(local_bounds),
        };
        log::info!(
            "Loaded skinned mesh '{}': {} vertices, {} joints, {} shapes",
            source.name,
            source.vertex_count(),
            source.joint_count(),
            source.shape_count()
        );
        Ok(source)
    }
}
