//! Output plane layout and readback.
//!
//! Every plane is `Rgba32Float`; downlevel adapters refuse storage binding
//! on `Rg32Float`.
//!
//! Vertex `i` lives at texel `(i % width, i / width)` of three float planes:
//!
//! | plane | format        | channels                         |
//! |-------|---------------|----------------------------------|
//! | 0     | `Rgba32Float` | position.xyz, normal.x           |
//! | 1     | `Rgba32Float` | normal.yz, tangent.xy            |
//! | 2     | `Rgba32Float` | tangent.z, tangent.w, unused     |

use glam::{Vec3, Vec4};

use crate::Result;

pub const DEFAULT_PLANE_WIDTH: u32 = 1024;

pub const PLANE_FORMATS: [wgpu::TextureFormat; 3] = [
    wgpu::TextureFormat::Rgba32Float,
    wgpu::TextureFormat::Rgba32Float,
    wgpu::TextureFormat::Rgba32Float,
];

const PLANE_CHANNELS: usize = 4;

/// A deformed vertex as the renderer sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkinnedVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tangent: Vec4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    pub width: u32,
    pub height: u32,
}

impl PlaneLayout {
    pub fn new(vertex_count: u32, width: u32) -> Self {
        let width = width.max(1);
        Self {
            width,
            height: vertex_count.div_ceil(width).max(1),
        }
    }

    pub fn texel(&self, index: u32) -> (u32, u32) {
        (index % self.width, index / self.width)
    }

    pub fn index(&self, x: u32, y: u32) -> u32 {
        y * self.width + x
    }

    pub fn capacity(&self) -> u32 {
        self.width * self.height
    }

    pub fn constants(&self) -> ShaderConstants {
        ShaderConstants {
            plane_width: self.width,
            plane_height: self.height,
            _padding: [0; 2],
        }
    }
}

/// Uniform a vertex shader needs to address the planes by vertex index.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShaderConstants {
    pub plane_width: u32,
    pub plane_height: u32,
    pub _padding: [u32; 2],
}

/// Borrowed view of the current output for binding into a render pass.
pub struct SkinnedPlanes<'a> {
    pub views: [&'a wgpu::TextureView; 3],
    pub constants: ShaderConstants,
}

pub fn pack(vertex: &SkinnedVertex) -> ([f32; 4], [f32; 4], [f32; 4]) {
    let SkinnedVertex {
        position: p,
        normal: n,
        tangent: t,
    } = *vertex;
    ([p.x, p.y, p.z, n.x], [n.y, n.z, t.x, t.y], [t.z, t.w, 0.0, 0.0])
}

pub fn unpack(position: [f32; 4], normal: [f32; 4], tangent: [f32; 4]) -> SkinnedVertex {
    SkinnedVertex {
        position: Vec3::new(position[0], position[1], position[2]),
        normal: Vec3::new(position[3], normal[0], normal[1]),
        tangent: Vec4::new(normal[2], normal[3], tangent[0], tangent[1]),
    }
}

fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * (PLANE_CHANNELS * std::mem::size_of::<f32>()) as u32;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

pub struct OutputPlanes {
    textures: [wgpu::Texture; 3],
    views: [wgpu::TextureView; 3],
    layout: PlaneLayout,
}

impl OutputPlanes {
    pub fn new(device: &wgpu::Device, layout: PlaneLayout) -> Self {
        let textures = [0, 1, 2].map(|plane| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&format!("Skinned Plane {}", plane)),
                size: wgpu::Extent3d {
                    width: layout.width,
                    height: layout.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: PLANE_FORMATS[plane],
                usage: wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        });
        let views = [0, 1, 2].map(|plane| textures[plane].create_view(&wgpu::TextureViewDescriptor::default()));

        Self {
            textures,
            views,
            layout,
        }
    }

    pub fn layout(&self) -> PlaneLayout {
        self.layout
    }

    pub fn views(&self) -> &[wgpu::TextureView; 3] {
        &self.views
    }

    pub fn skinned_planes(&self) -> SkinnedPlanes<'_> {
        let [position, normal, tangent] = &self.views;
        SkinnedPlanes {
            views: [position, normal, tangent],
            constants: self.layout.constants(),
        }
    }

    /// Copies all three planes back to the host and unpacks the first
    /// `vertex_count` texels. Blocks until the GPU is idle.
    pub fn read_back(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        vertex_count: u32,
    ) -> Result<Vec<SkinnedVertex>> {
        let PlaneLayout { width, height } = self.layout;
        let row_bytes = padded_bytes_per_row(width);

        let staging = [0, 1, 2].map(|plane| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("Skinned Plane {} Readback", plane)),
                size: (row_bytes * height) as u64,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            })
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Skinned Plane Readback Encoder"),
        });
        for plane in 0..3 {
            encoder.copy_texture_to_buffer(
                self.textures[plane].as_image_copy(),
                wgpu::ImageCopyBuffer {
                    buffer: &staging[plane],
                    layout: wgpu::ImageDataLayout {
                        offset: 0,
                        bytes_per_row: Some(row_bytes),
                        rows_per_image: Some(height),
                    },
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }
        queue.submit(Some(encoder.finish()));

        let (sender, receiver) = std::sync::mpsc::channel();
        for buffer in &staging {
            let sender = sender.clone();
            buffer
                .slice(..)
                .map_async(wgpu::MapMode::Read, move |result| {
                    let _ = sender.send(result);
                });
        }
        drop(sender);
        let _ = device.poll(wgpu::Maintain::Wait);
        for result in receiver.iter() {
            result?;
        }

        let planes: Vec<Vec<f32>> = (0..3)
            .map(|plane| {
                let mapped = staging[plane].slice(..).get_mapped_range();
                let row_floats = width as usize * PLANE_CHANNELS;
                let mut texels = Vec::with_capacity(row_floats * height as usize);
                for row in mapped.chunks_exact(row_bytes as usize) {
                    texels.extend(
                        row[..row_floats * std::mem::size_of::<f32>()]
                            .chunks_exact(4)
                            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]])),
                    );
                }
                texels
            })
            .collect();
        for buffer in &staging {
            buffer.unmap();
        }

        Ok((0..vertex_count as usize)
            .map(|i| {
                let texel = |plane: usize| {
                    let t = &planes[plane][i * PLANE_CHANNELS..(i + 1) * PLANE_CHANNELS];
                    [t[0], t[1], t[2], t[3]]
                };
                unpack(texel(0), texel(1), texel(2))
            })
            .collect())
    }

    pub fn destroy(&self) {
        for texture in &self.textures {
            texture.destroy();
        }
    }
}
