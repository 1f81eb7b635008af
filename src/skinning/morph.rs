//! Shape-target accumulation.
//!
//! Active targets are applied one after another, each pass reading the
//! previous pass's output. The base records are never written; two scratch
//! buffers alternate as destinations. [`plan_passes`] decides the order and
//! the buffer routing once, and both the GPU encoder and the host
//! [`accumulate`] follow the same plan.

use wgpu::util::DeviceExt;

use super::gpu::{self, buffer_binding, storage_entry, uniform_entry};
use crate::mesh::{MorphDelta, VertexRecord};
use crate::{Result, SkinningError};

const SHADER: &str = include_str!("../../shaders/apply_morph.wgsl");

/// Public weights are percentages; a weight of 100 applies a target fully.
pub const SHAPE_WEIGHT_SCALE: f32 = 100.0;

/// A record buffer a pass can read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Base,
    Scratch(usize),
}

/// Source/target bookkeeping across scratch buffers 0 and 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingPong {
    source: Slot,
    target: usize,
}

impl Default for PingPong {
    fn default() -> Self {
        Self::new()
    }
}

impl PingPong {
    pub fn new() -> Self {
        Self {
            source: Slot::Base,
            target: 0,
        }
    }

    pub fn current_source(&self) -> Slot {
        self.source
    }

    pub fn target(&self) -> usize {
        self.target
    }

    /// The buffer just written becomes the next source.
    pub fn swap(&mut self) {
        self.source = Slot::Scratch(self.target);
        self.target ^= 1;
    }
}

/// The base records and the two scratch copies, whatever they live in.
#[derive(Debug)]
pub struct MorphBuffers<B> {
    pub base: B,
    pub scratch: [B; 2],
}

impl<B> MorphBuffers<B> {
    pub fn get(&self, slot: Slot) -> &B {
        match slot {
            Slot::Base => &self.base,
            Slot::Scratch(index) => &self.scratch[index],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MorphPass {
    pub shape: usize,
    /// Already divided by [`SHAPE_WEIGHT_SCALE`].
    pub weight: f32,
    pub source: Slot,
    pub target: usize,
}

/// Passes for every non-zero weight in index order, plus the slot holding
/// the final result. With no active targets the result is [`Slot::Base`].
pub fn plan_passes(
    weights: &[f32],
    has_delta: impl Fn(usize) -> bool,
) -> Result<(Vec<MorphPass>, Slot)> {
    let mut ping_pong = PingPong::new();
    let mut passes = Vec::new();

    for (shape, weight) in weights.iter().copied().enumerate() {
        if weight == 0.0 {
            continue;
        }
        if !has_delta(shape) {
            return Err(SkinningError::MissingShapeDelta { index: shape });
        }
        passes.push(MorphPass {
            shape,
            weight: weight / SHAPE_WEIGHT_SCALE,
            source: ping_pong.current_source(),
            target: ping_pong.target(),
        });
        ping_pong.swap();
    }

    Ok((passes, ping_pong.current_source()))
}

pub fn apply_shape(source: &VertexRecord, delta: &MorphDelta, weight: f32) -> VertexRecord {
    let offset = |value: [f32; 4], delta: [f32; 4]| {
        [
            value[0] + delta[0] * weight,
            value[1] + delta[1] * weight,
            value[2] + delta[2] * weight,
            value[3],
        ]
    };
    VertexRecord {
        position: offset(source.position, delta.position),
        normal: offset(source.normal, delta.normal),
        tangent: offset(source.tangent, delta.tangent),
        ..*source
    }
}

/// Host accumulation over `buffers`, following [`plan_passes`]. Returns the
/// slot holding the morphed records.
pub fn accumulate(
    buffers: &mut MorphBuffers<Vec<VertexRecord>>,
    deltas: &[Option<Vec<MorphDelta>>],
    weights: &[f32],
) -> Result<Slot> {
    let (passes, result) = plan_passes(weights, |shape| {
        deltas.get(shape).map_or(false, Option::is_some)
    })?;

    for pass in passes {
        let Some(Some(shape_deltas)) = deltas.get(pass.shape) else {
            return Err(SkinningError::MissingShapeDelta { index: pass.shape });
        };
        let mut target = std::mem::take(&mut buffers.scratch[pass.target]);
        target.clear();
        target.extend(
            buffers
                .get(pass.source)
                .iter()
                .zip(shape_deltas)
                .map(|(record, delta)| apply_shape(record, delta, pass.weight)),
        );
        buffers.scratch[pass.target] = target;
    }

    Ok(result)
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MorphParams {
    pub weight: f32,
    pub vertex_count: u32,
    pub _padding: [u32; 2],
}

/// GPU copies of the records and every captured shape target. Each target
/// gets its own params buffer so several passes can share one submission.
pub struct ShapeBuffers {
    pub records: MorphBuffers<wgpu::Buffer>,
    pub deltas: Vec<Option<wgpu::Buffer>>,
    pub params: Vec<Option<wgpu::Buffer>>,
    pub vertex_count: u32,
}

impl ShapeBuffers {
    pub fn new(
        device: &wgpu::Device,
        records: &[VertexRecord],
        shapes: &[Option<&[MorphDelta]>],
    ) -> Self {
        let record_bytes = std::mem::size_of_val(records) as u64;
        let base = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Base Vertex Record Buffer"),
            contents: bytemuck::cast_slice(records),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });
        let scratch = [0, 1].map(|index| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("Morph Scratch Buffer {}", index)),
                size: record_bytes,
                usage: wgpu::BufferUsages::STORAGE,
                mapped_at_creation: false,
            })
        });

        let deltas = shapes
            .iter()
            .enumerate()
            .map(|(index, deltas)| {
                deltas.map(|deltas| {
                    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(&format!("Shape Delta Buffer {}", index)),
                        contents: bytemuck::cast_slice(deltas),
                        usage: wgpu::BufferUsages::STORAGE,
                    })
                })
            })
            .collect();
        let params = shapes
            .iter()
            .map(|deltas| {
                deltas.map(|_| {
                    device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some("Morph Params Buffer"),
                        size: std::mem::size_of::<MorphParams>() as u64,
                        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    })
                })
            })
            .collect();

        Self {
            records: MorphBuffers { base, scratch },
            deltas,
            params,
            vertex_count: records.len() as u32,
        }
    }

    pub fn has_delta(&self, shape: usize) -> bool {
        matches!(self.deltas.get(shape), Some(Some(_)))
    }

    pub fn destroy(&self) {
        self.records.base.destroy();
        for buffer in &self.records.scratch {
            buffer.destroy();
        }
        for buffer in self.deltas.iter().chain(self.params.iter()).flatten() {
            buffer.destroy();
        }
    }
}

pub struct MorphKernel {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl MorphKernel {
    pub fn new(device: &wgpu::Device) -> Self {
        let source = format!("{}\n{}", super::DQ_COMMON, SHADER);
        let (pipeline, bind_group_layout) = gpu::create_compute_pipeline(
            device,
            "Apply Morph",
            source,
            &[
                // @binding(0) params: MorphParams
                uniform_entry(0),
                // @binding(1) src_records: array<VertexRecord>
                storage_entry(1, true),
                // @binding(2) dst_records: array<VertexRecord>
                storage_entry(2, false),
                // @binding(3) deltas: array<MorphDelta>
                storage_entry(3, true),
            ],
        );
        Self {
            pipeline,
            bind_group_layout,
        }
    }

    /// Uploads each pass's weight and builds its bind group. Must run before
    /// the compute pass that records the dispatches.
    pub fn prepare(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        buffers: &ShapeBuffers,
        passes: &[MorphPass],
    ) -> Result<Vec<wgpu::BindGroup>> {
        passes
            .iter()
            .map(|pass| {
                let (Some(Some(deltas)), Some(Some(params))) =
                    (buffers.deltas.get(pass.shape), buffers.params.get(pass.shape))
                else {
                    return Err(SkinningError::MissingShapeDelta { index: pass.shape });
                };
                queue.write_buffer(
                    params,
                    0,
                    bytemuck::bytes_of(&MorphParams {
                        weight: pass.weight,
                        vertex_count: buffers.vertex_count,
                        _padding: [0; 2],
                    }),
                );
                Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Apply Morph Bind Group"),
                    layout: &self.bind_group_layout,
                    entries: &[
                        buffer_binding(0, params),
                        buffer_binding(1, buffers.records.get(pass.source)),
                        buffer_binding(2, &buffers.records.scratch[pass.target]),
                        buffer_binding(3, deltas),
                    ],
                }))
            })
            .collect()
    }

    pub fn dispatch(&self, pass: &mut wgpu::ComputePass, bind_groups: &[wgpu::BindGroup], vertex_count: u32) {
        pass.set_pipeline(&self.pipeline);
        for bind_group in bind_groups {
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(gpu::workgroup_count(vertex_count), 1, 1);
        }
    }
}
