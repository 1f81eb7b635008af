use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use dq_skinning::skinning::{blend, bone_dq};
use dq_skinning::{
    DualQuat, GpuContext, RigidTransform, Skinner, SkinnerConfig, SourceMesh, StaticShapeWeights,
};
use glam::{Quat, Vec3};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    fn vector(self) -> Vec3 {
        match self {
            Axis::X => Vec3::X,
            Axis::Y => Vec3::Y,
            Axis::Z => Vec3::Z,
        }
    }
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bend applied to joint 1 about Z, in degrees
    #[arg(long, default_value_t = 90.0)]
    angle: f32,

    /// Bulge compensation strength in [0, 1]
    #[arg(long, default_value_t = 0.0)]
    bulge: f32,

    /// Axis bones point along in the bind pose
    #[arg(long, value_enum, default_value_t = Axis::X)]
    axis: Axis,

    /// Skinned glTF/GLB file; the built-in two-joint strip when omitted
    #[arg(long)]
    mesh: Option<PathBuf>,

    /// Number of frames to reach the full bend
    #[arg(long, default_value_t = 1)]
    frames: u32,

    /// Also skin with linear blending and report the difference
    #[arg(long)]
    linear: bool,
}

/// Rest pose with joint 1 rotated by `angle` radians in place.
fn bent_pose(source: &SourceMesh, angle: f32) -> Vec<RigidTransform> {
    source
        .bind_poses
        .iter()
        .enumerate()
        .map(|(joint, inverse_bind)| {
            let rest = inverse_bind.inverse();
            if joint == 1 {
                RigidTransform::new(rest.rotation * Quat::from_rotation_z(angle), rest.translation)
            } else {
                rest
            }
        })
        .collect()
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let source = match &args.mesh {
        Some(path) => SourceMesh::load(path)?,
        None => SourceMesh::strip(),
    };
    let is_strip = args.mesh.is_none();

    let context = GpuContext::headless().context("Failed to set up a GPU device")?;
    let config = SkinnerConfig::default()
        .with_bone_orientation(args.axis.vector())
        .with_bulge_compensation(args.bulge);
    let mut skinner = Skinner::new(context, config, Box::new(StaticShapeWeights::default()))?;

    let receipt = skinner.bind(&source)?;
    log::info!(
        "Output planes {}x{}, bounds {:?} .. {:?}",
        receipt.layout.width,
        receipt.layout.height,
        receipt.bounds.min,
        receipt.bounds.max
    );

    let frames = args.frames.max(1);
    let mut pose = Vec::new();
    for frame in 1..=frames {
        let angle = args.angle.to_radians() * frame as f32 / frames as f32;
        pose = bent_pose(&source, angle);
        skinner.frame(&pose, &RigidTransform::IDENTITY)?;
        log::debug!("Frame {}: bend {:.1} degrees", frame, angle.to_degrees());
    }

    let skinned = skinner.read_output()?;
    if is_strip {
        log::info!(
            "Dual quaternion cross-section at the joint: {:.4} (rest 1.0)",
            skinned[2].position.distance(skinned[3].position)
        );
    }

    if args.linear {
        let joints: Vec<DualQuat> = pose
            .iter()
            .zip(&source.bind_poses)
            .map(|(world, inverse_bind)| {
                bone_dq::skin_joint(
                    world,
                    &RigidTransform::IDENTITY,
                    &DualQuat::from_transform(inverse_bind),
                    skinner.bone_orientation(),
                )
                .0
            })
            .collect();
        let linear: Vec<_> = source
            .vertex_records(skinner.bone_orientation())
            .iter()
            .map(|record| blend::skin_vertex_linear(record, &joints))
            .collect();

        if is_strip {
            log::info!(
                "Linear blend cross-section at the joint: {:.4}",
                linear[2].position.distance(linear[3].position)
            );
        }
        let max_deviation = skinned
            .iter()
            .zip(&linear)
            .map(|(dual, linear)| dual.position.distance(linear.position))
            .fold(0.0_f32, f32::max);
        log::info!("Largest dual/linear position difference: {:.4}", max_deviation);
    }

    skinner.unbind();
    Ok(())
}
