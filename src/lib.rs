//! Dual-quaternion skinning on wgpu compute.
//!
//! Per frame the [`Skinner`] converts joint poses into dual quaternions, folds
//! active blend shapes into the vertex records, blends up to four joint dual
//! quaternions per vertex and writes position/normal/tangent into three
//! float textures a renderer samples by vertex index.

pub mod math;
pub mod mesh;
pub mod skinning;

pub use math::{DualQuat, RigidTransform};
pub use mesh::{Aabb, BlendShape, BoneWeights, SourceMesh};
pub use skinning::{
    BindReceipt, GpuContext, PlaneLayout, ShaderConstants, ShapeWeightStore, SkinnedPlanes,
    SkinnedVertex, Skinner, SkinnerConfig, SkinnerState, StaticShapeWeights,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SkinningError {
    #[error("expected {expected} blend shape weights, got {actual}")]
    WeightCountMismatch { expected: usize, actual: usize },

    #[error("blend shape index {index} out of range ({count} shapes)")]
    ShapeIndexOutOfRange { index: usize, count: usize },

    #[error("blend shape {index} has a non-zero weight but no captured delta data")]
    MissingShapeDelta { index: usize },

    #[error("skeleton supplied {actual} joint poses, bind pose has {expected}")]
    JointCountMismatch { expected: usize, actual: usize },

    #[error("invalid mesh: {0}")]
    InvalidMesh(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("no compatible GPU adapter found")]
    NoAdapter,

    #[error("failed to create device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("output readback failed: {0}")]
    Readback(#[from] wgpu::BufferAsyncError),
}

pub type Result<T> = std::result::Result<T, SkinningError>;
