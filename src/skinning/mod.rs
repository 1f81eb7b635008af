//! The three-stage compute pipeline and its lifecycle.
//!
//! A frame runs the bone kernel (joint poses to skinning dual quaternions),
//! the shape accumulator (only when weights or base records changed) and the
//! blend kernel, in one command encoder. The blend kernel writes into the
//! output planes that [`Skinner::output`] hands to a renderer.

pub mod blend;
pub mod bone_dq;
mod gpu;
pub mod morph;
pub mod packing;
mod pose;

pub use gpu::{GpuContext, WORKGROUP_SIZE};
pub use morph::SHAPE_WEIGHT_SCALE;
pub use packing::{PlaneLayout, ShaderConstants, SkinnedPlanes, SkinnedVertex, DEFAULT_PLANE_WIDTH};
pub use pose::{PoseSampler, SampledPose};

use glam::Vec3;

use crate::math::{DualQuat, RigidTransform};
use crate::mesh::{self, Aabb, SourceMesh, VertexRecord};
use crate::{Result, SkinningError};

use blend::{BlendKernel, BlendParams};
use bone_dq::{BoneDqKernel, BoneParams, JointBuffers};
use morph::{MorphBuffers, MorphKernel, ShapeBuffers, Slot};
use packing::OutputPlanes;

const DQ_COMMON: &str = include_str!("../../shaders/dq_common.wgsl");

/// Half-extent of the bounds reported when culling is disabled.
pub const UNCULLED_EXTENT: f32 = 1.0e8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkinnerConfig {
    /// Bind-space axis bones point along. Unit length.
    pub bone_orientation: Vec3,
    /// Global bulge strength in [0, 1].
    pub bulge_compensation: f32,
    pub frustum_culling: bool,
    pub plane_width: u32,
}

impl Default for SkinnerConfig {
    fn default() -> Self {
        Self {
            bone_orientation: Vec3::Y,
            bulge_compensation: 0.0,
            frustum_culling: true,
            plane_width: DEFAULT_PLANE_WIDTH,
        }
    }
}

impl SkinnerConfig {
    pub fn with_bone_orientation(mut self, axis: Vec3) -> Self {
        self.bone_orientation = axis;
        self
    }

    pub fn with_bulge_compensation(mut self, strength: f32) -> Self {
        self.bulge_compensation = clamp_bulge(strength);
        self
    }

    pub fn with_frustum_culling(mut self, enabled: bool) -> Self {
        self.frustum_culling = enabled;
        self
    }

    pub fn with_plane_width(mut self, width: u32) -> Self {
        self.plane_width = width;
        self
    }
}

fn clamp_bulge(strength: f32) -> f32 {
    if strength.is_nan() {
        0.0
    } else {
        strength.clamp(0.0, 1.0)
    }
}

fn normalize_orientation(axis: Vec3) -> Result<Vec3> {
    axis.try_normalize()
        .ok_or(SkinningError::InvalidOperation("bone orientation must be a non-zero vector"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkinnerState {
    Uninitialized,
    /// Buffers captured, no frame dispatched yet.
    Bound,
    Active,
    Unbound,
}

/// Where shape weights live while no mesh is bound: the externally owned
/// pre-bind mesh representation.
pub trait ShapeWeightStore {
    fn shape_count(&self) -> usize;
    fn weight(&self, index: usize) -> Option<f32>;
    /// Returns false when `index` is out of range.
    fn set_weight(&mut self, index: usize, weight: f32) -> bool;
}

/// A plain vector of weights for callers without a pre-bind representation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticShapeWeights(pub Vec<f32>);

impl ShapeWeightStore for StaticShapeWeights {
    fn shape_count(&self) -> usize {
        self.0.len()
    }

    fn weight(&self, index: usize) -> Option<f32> {
        self.0.get(index).copied()
    }

    fn set_weight(&mut self, index: usize, weight: f32) -> bool {
        match self.0.get_mut(index) {
            Some(slot) => {
                *slot = weight;
                true
            }
            None => false,
        }
    }
}

/// Returned by [`Skinner::bind`]. Holding one means the skinner now owns
/// deformation of the mesh and the caller's own skinning path can stand down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BindReceipt {
    pub vertex_count: usize,
    pub joint_count: usize,
    pub shape_count: usize,
    pub layout: PlaneLayout,
    pub bounds: Aabb,
}

struct Kernels {
    bone: BoneDqKernel,
    morph: MorphKernel,
    blend: BlendKernel,
}

/// GPU and host state for one bound mesh. Dropping it releases every buffer.
struct BoundMesh {
    vertex_count: u32,
    bind_poses: Vec<RigidTransform>,
    base_records: Vec<VertexRecord>,
    local_bounds: Aabb,
    weights: Vec<f32>,
    sampler: PoseSampler,
    joints: JointBuffers,
    bone_bind_group: wgpu::BindGroup,
    shapes: ShapeBuffers,
    blend_params: wgpu::Buffer,
    blend_bind_groups: MorphBuffers<wgpu::BindGroup>,
    planes: OutputPlanes,
    /// Slot holding the last accumulation result.
    accumulated: Slot,
    morphs_dirty: bool,
}

impl BoundMesh {
    fn new(
        device: &wgpu::Device,
        kernels: &Kernels,
        source: &SourceMesh,
        base_records: Vec<VertexRecord>,
        weights: Vec<f32>,
        plane_width: u32,
    ) -> Self {
        let vertex_count = base_records.len() as u32;
        let layout = PlaneLayout::new(vertex_count, plane_width);

        let joints = JointBuffers::new(device, &source.bind_poses);
        let bone_bind_group = kernels.bone.bind(device, &joints);

        let shape_deltas: Vec<_> = source.shapes.iter().map(|shape| shape.deltas.as_deref()).collect();
        let shapes = ShapeBuffers::new(device, &base_records, &shape_deltas);

        let blend_params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Blend Params Buffer"),
            size: std::mem::size_of::<BlendParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let planes = OutputPlanes::new(device, layout);
        let blend_bind_groups = kernels.blend.bind(
            device,
            &blend_params,
            &shapes.records,
            &joints.skinned_dual_quats,
            &joints.bone_directions,
            &planes,
        );

        log::debug!(
            "Allocated {} bytes of vertex records x3, {} joints, {} shape buffers, {}x{} planes",
            std::mem::size_of_val(base_records.as_slice()),
            joints.joint_count,
            shapes.deltas.iter().flatten().count(),
            layout.width,
            layout.height
        );

        Self {
            vertex_count,
            bind_poses: source.bind_poses.clone(),
            base_records,
            local_bounds: source.bounds(),
            weights,
            sampler: PoseSampler::new(source.joint_count()),
            joints,
            bone_bind_group,
            shapes,
            blend_params,
            blend_bind_groups,
            planes,
            accumulated: Slot::Base,
            morphs_dirty: true,
        }
    }
}

impl Drop for BoundMesh {
    fn drop(&mut self) {
        self.joints.destroy();
        self.shapes.destroy();
        self.blend_params.destroy();
        self.planes.destroy();
    }
}

/// Dual-quaternion skinning pipeline for one mesh instance.
pub struct Skinner {
    context: GpuContext,
    config: SkinnerConfig,
    kernels: Kernels,
    state: SkinnerState,
    bound: Option<BoundMesh>,
    pre_bind: Box<dyn ShapeWeightStore>,
    frames: u64,
}

impl Skinner {
    /// Compiles the three kernels. `pre_bind` serves shape weights until a
    /// mesh is bound and seeds the bound weights.
    pub fn new(
        context: GpuContext,
        config: SkinnerConfig,
        pre_bind: Box<dyn ShapeWeightStore>,
    ) -> Result<Self> {
        let config = SkinnerConfig {
            bone_orientation: normalize_orientation(config.bone_orientation)?,
            bulge_compensation: clamp_bulge(config.bulge_compensation),
            ..config
        };
        let kernels = context.scoped("Creating skinning pipelines", || Kernels {
            bone: BoneDqKernel::new(&context.device),
            morph: MorphKernel::new(&context.device),
            blend: BlendKernel::new(&context.device),
        })?;

        Ok(Self {
            context,
            config,
            kernels,
            state: SkinnerState::Uninitialized,
            bound: None,
            pre_bind,
            frames: 0,
        })
    }

    pub fn state(&self) -> SkinnerState {
        self.state
    }

    pub fn config(&self) -> &SkinnerConfig {
        &self.config
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Captures `source` and allocates every buffer. Any previously bound mesh
    /// is released first; an invalid mesh is rejected before anything changes.
    pub fn bind(&mut self, source: &SourceMesh) -> Result<BindReceipt> {
        source.validate()?;

        if self.bound.is_some() {
            self.unbind();
        }

        let base_records = source.vertex_records(self.config.bone_orientation);
        let weights = self.seed_weights(source.shape_count());
        let device = &self.context.device;
        let kernels = &self.kernels;
        let plane_width = self.config.plane_width;
        let bound = self.context.scoped("Binding mesh", || {
            BoundMesh::new(device, kernels, source, base_records, weights, plane_width)
        })?;

        let receipt = BindReceipt {
            vertex_count: source.vertex_count(),
            joint_count: source.joint_count(),
            shape_count: source.shape_count(),
            layout: bound.planes.layout(),
            bounds: self.culling_bounds(bound.local_bounds),
        };
        log::info!(
            "Bound mesh '{}': {} vertices, {} joints, {} shapes",
            source.name,
            receipt.vertex_count,
            receipt.joint_count,
            receipt.shape_count
        );

        self.bound = Some(bound);
        self.state = SkinnerState::Bound;
        Ok(receipt)
    }

    /// Releases all buffers. Current weights are handed back to the pre-bind
    /// store when its shape count still matches.
    pub fn unbind(&mut self) {
        let Some(bound) = self.bound.take() else {
            return;
        };
        if self.pre_bind.shape_count() == bound.weights.len() {
            for (index, weight) in bound.weights.iter().enumerate() {
                self.pre_bind.set_weight(index, *weight);
            }
        }
        drop(bound);
        self.state = SkinnerState::Unbound;
        log::info!("Unbound mesh, GPU buffers released");
    }

    fn seed_weights(&self, shape_count: usize) -> Vec<f32> {
        let store_count = self.pre_bind.shape_count();
        if store_count != shape_count {
            if store_count != 0 {
                log::warn!(
                    "Pre-bind weights cover {} shapes, mesh has {}; starting from zero",
                    store_count,
                    shape_count
                );
            }
            return vec![0.0; shape_count];
        }
        (0..shape_count)
            .map(|index| self.pre_bind.weight(index).unwrap_or(0.0))
            .collect()
    }

    /// Runs one frame. `joint_world` holds every joint's world transform in
    /// bind order; `instance_world` places the mesh instance. On error the
    /// previous output stays in the planes.
    pub fn frame(&mut self, joint_world: &[RigidTransform], instance_world: &RigidTransform) -> Result<()> {
        let bound = self
            .bound
            .as_mut()
            .ok_or(SkinningError::InvalidOperation("frame requires a bound mesh"))?;

        let pose = match bound.sampler.sample(joint_world, instance_world) {
            Ok(pose) => pose,
            Err(err) => {
                log::warn!("Skipping frame: {}", err);
                return Err(err);
            }
        };
        let morph_plan = if bound.morphs_dirty {
            Some(morph::plan_passes(&bound.weights, |shape| bound.shapes.has_delta(shape))?)
        } else {
            None
        };

        let device = &self.context.device;
        let queue = &self.context.queue;
        let kernels = &self.kernels;
        let config = &self.config;

        let source = self.context.scoped("Skinning frame", || -> Result<Slot> {
            let joint_count = bound.joints.joint_count;
            queue.write_buffer(&bound.joints.poses, 0, bytemuck::cast_slice(pose.joints));
            queue.write_buffer(
                &bound.joints.params,
                0,
                bytemuck::bytes_of(&BoneParams::new(pose.world_to_local, config.bone_orientation, joint_count)),
            );
            queue.write_buffer(
                &bound.blend_params,
                0,
                bytemuck::bytes_of(&BlendParams {
                    bulge_strength: config.bulge_compensation,
                    vertex_count: bound.vertex_count,
                    plane_width: bound.planes.layout().width,
                    _padding: 0,
                }),
            );

            let (morph_bind_groups, source) = match &morph_plan {
                Some((passes, result)) => (
                    kernels.morph.prepare(device, queue, &bound.shapes, passes)?,
                    *result,
                ),
                None => (Vec::new(), bound.accumulated),
            };

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Skinning Frame Encoder"),
            });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("Bone DQ Pass"),
                    timestamp_writes: None,
                });
                kernels.bone.dispatch(&mut pass, &bound.bone_bind_group, joint_count);
            }
            if !morph_bind_groups.is_empty() {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("Morph Accumulation Pass"),
                    timestamp_writes: None,
                });
                kernels.morph.dispatch(&mut pass, &morph_bind_groups, bound.vertex_count);
            }
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("DQ Blend Pass"),
                    timestamp_writes: None,
                });
                kernels
                    .blend
                    .dispatch(&mut pass, bound.blend_bind_groups.get(source), bound.vertex_count);
            }
            queue.submit(Some(encoder.finish()));

            log::debug!(
                "Dispatched frame: {} joints, {} morph passes, {} vertices from {:?}",
                joint_count,
                morph_bind_groups.len(),
                bound.vertex_count,
                source
            );
            Ok(source)
        })??;

        bound.accumulated = source;
        bound.morphs_dirty = false;
        self.state = SkinnerState::Active;
        self.frames += 1;
        Ok(())
    }

    /// Planes and shader constants for the renderer. Available once a frame
    /// has completed.
    pub fn output(&self) -> Result<SkinnedPlanes<'_>> {
        self.active()
            .map(|bound| bound.planes.skinned_planes())
    }

    /// Copies the current output back to the host. Blocks until the GPU is idle.
    pub fn read_output(&self) -> Result<Vec<SkinnedVertex>> {
        let bound = self.active()?;
        bound
            .planes
            .read_back(&self.context.device, &self.context.queue, bound.vertex_count)
    }

    fn active(&self) -> Result<&BoundMesh> {
        match (&self.bound, self.state) {
            (Some(bound), SkinnerState::Active) => Ok(bound),
            _ => Err(SkinningError::InvalidOperation("no frame has been skinned yet")),
        }
    }

    pub fn shape_count(&self) -> usize {
        match &self.bound {
            Some(bound) => bound.weights.len(),
            None => self.pre_bind.shape_count(),
        }
    }

    pub fn blend_shape_weights(&self) -> Vec<f32> {
        match &self.bound {
            Some(bound) => bound.weights.clone(),
            None => (0..self.pre_bind.shape_count())
                .map(|index| self.pre_bind.weight(index).unwrap_or(0.0))
                .collect(),
        }
    }

    pub fn set_blend_shape_weights(&mut self, weights: &[f32]) -> Result<()> {
        let expected = self.shape_count();
        if weights.len() != expected {
            return Err(SkinningError::WeightCountMismatch {
                expected,
                actual: weights.len(),
            });
        }
        match &mut self.bound {
            Some(bound) => {
                bound.weights.copy_from_slice(weights);
                bound.morphs_dirty = true;
            }
            None => {
                log::debug!("Forwarding {} shape weights to pre-bind store", weights.len());
                for (index, weight) in weights.iter().enumerate() {
                    self.pre_bind.set_weight(index, *weight);
                }
            }
        }
        Ok(())
    }

    pub fn blend_shape_weight(&self, index: usize) -> Result<f32> {
        let out_of_range = SkinningError::ShapeIndexOutOfRange {
            index,
            count: self.shape_count(),
        };
        match &self.bound {
            Some(bound) => bound.weights.get(index).copied().ok_or(out_of_range),
            None => self.pre_bind.weight(index).ok_or(out_of_range),
        }
    }

    pub fn set_blend_shape_weight(&mut self, index: usize, weight: f32) -> Result<()> {
        let count = self.shape_count();
        if index >= count {
            return Err(SkinningError::ShapeIndexOutOfRange { index, count });
        }
        match &mut self.bound {
            Some(bound) => {
                bound.weights[index] = weight;
                bound.morphs_dirty = true;
            }
            None => {
                self.pre_bind.set_weight(index, weight);
            }
        }
        Ok(())
    }

    pub fn bone_orientation(&self) -> Vec3 {
        self.config.bone_orientation
    }

    /// Normalizes `axis`, recomputes every compensation coefficient and
    /// re-uploads the base records. Takes effect next frame.
    pub fn set_bone_orientation(&mut self, axis: Vec3) -> Result<()> {
        self.config.bone_orientation = normalize_orientation(axis)?;
        self.refresh_compensation()
    }

    pub fn refresh_compensation(&mut self) -> Result<()> {
        let Some(bound) = self.bound.as_mut() else {
            return Ok(());
        };
        mesh::update_compensation(&mut bound.base_records, &bound.bind_poses, self.config.bone_orientation);
        let queue = &self.context.queue;
        self.context.scoped("Uploading compensation coefficients", || {
            queue.write_buffer(
                &bound.shapes.records.base,
                0,
                bytemuck::cast_slice(&bound.base_records),
            );
        })?;
        bound.morphs_dirty = true;
        Ok(())
    }

    pub fn bulge_compensation(&self) -> f32 {
        self.config.bulge_compensation
    }

    /// Clamped to [0, 1]; NaN disables compensation.
    pub fn set_bulge_compensation(&mut self, strength: f32) {
        self.config.bulge_compensation = clamp_bulge(strength);
    }

    pub fn frustum_culling(&self) -> bool {
        self.config.frustum_culling
    }

    pub fn set_frustum_culling(&mut self, enabled: bool) {
        self.config.frustum_culling = enabled;
    }

    /// Bounds the host engine should cull against.
    pub fn bounds(&self) -> Result<Aabb> {
        self.bound
            .as_ref()
            .map(|bound| self.culling_bounds(bound.local_bounds))
            .ok_or(SkinningError::InvalidOperation("bounds require a bound mesh"))
    }

    fn culling_bounds(&self, local_bounds: Aabb) -> Aabb {
        if self.config.frustum_culling {
            local_bounds
        } else {
            Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(UNCULLED_EXTENT))
        }
    }
}

/// Runs the whole pipeline on the host with the same kernels the GPU mirrors.
pub fn skin_on_host(
    source: &SourceMesh,
    weights: &[f32],
    config: &SkinnerConfig,
    joint_world: &[RigidTransform],
    instance_world: &RigidTransform,
) -> Result<Vec<SkinnedVertex>> {
    source.validate()?;
    if weights.len() != source.shape_count() {
        return Err(SkinningError::WeightCountMismatch {
            expected: source.shape_count(),
            actual: weights.len(),
        });
    }
    let orientation = normalize_orientation(config.bone_orientation)?;

    let mut sampler = PoseSampler::new(source.joint_count());
    let pose = sampler.sample(joint_world, instance_world)?;
    let (skinned, directions): (Vec<DualQuat>, Vec<Vec3>) = joint_world
        .iter()
        .zip(&source.bind_poses)
        .map(|(world, inverse_bind)| {
            bone_dq::skin_joint(
                world,
                &pose.world_to_local,
                &DualQuat::from_transform(inverse_bind),
                orientation,
            )
        })
        .unzip();

    let base = source.vertex_records(orientation);
    let mut buffers = MorphBuffers {
        scratch: [Vec::new(), Vec::new()],
        base,
    };
    let deltas: Vec<_> = source.shapes.iter().map(|shape| shape.deltas.clone()).collect();
    let slot = morph::accumulate(&mut buffers, &deltas, weights)?;

    Ok(buffers
        .get(slot)
        .iter()
        .map(|record| {
            blend::skin_vertex(
                record,
                &skinned,
                &directions,
                clamp_bulge(config.bulge_compensation),
            )
        })
        .collect())
}
