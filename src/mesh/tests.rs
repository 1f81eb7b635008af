use super::*;
use approx::assert_abs_diff_eq;
use assert_fs::prelude::*;
use glam::Mat4;

#[test]
fn test_vertex_record_size() {
    assert_eq!(
        std::mem::size_of::<VertexRecord>(),
        96, // 5 * 16 (vec4 fields) + 4 (compensation) + 12 (padding)
        "VertexRecord must match the WGSL VertexRecord stride"
    );
    assert_eq!(std::mem::size_of::<MorphDelta>(), 48);
    assert_eq!(std::mem::size_of::<GpuDualQuat>(), 32);
    assert_eq!(std::mem::size_of::<GpuRigidTransform>(), 32);
}

#[test]
fn test_strip_is_valid() {
    let strip = SourceMesh::strip();
    strip.validate().unwrap();
    assert_eq!(strip.vertex_count(), 6);
    assert_eq!(strip.joint_count(), 2);
    assert_eq!(strip.shape_count(), 1);
}

#[test]
fn test_validate_rejects_out_of_range_joint() {
    let mut strip = SourceMesh::strip();
    strip.bone_weights[0] = BoneWeights::single(7);
    let err = strip.validate().unwrap_err();
    assert!(err.to_string().contains("joint 7"), "{}", err);
}

#[test]
fn test_validate_ignores_zero_weight_slots() {
    let mut strip = SourceMesh::strip();
    strip.bone_weights[0] = BoneWeights {
        joints: [0, 99, 99, 99],
        weights: [1.0, 0.0, 0.0, 0.0],
    };
    strip.validate().unwrap();
}

#[test]
fn test_validate_rejects_attribute_mismatch() {
    let mut strip = SourceMesh::strip();
    strip.normals.pop();
    assert!(matches!(strip.validate(), Err(SkinningError::InvalidMesh(_))));

    let mut strip = SourceMesh::strip();
    strip.shapes[0].deltas.as_mut().unwrap().pop();
    assert!(matches!(strip.validate(), Err(SkinningError::InvalidMesh(_))));

    let empty = SourceMesh::default();
    assert!(matches!(empty.validate(), Err(SkinningError::InvalidMesh(_))));
}

#[test]
fn test_compensation_is_distance_to_bone_axis() {
    // Joint at the origin with an identity bind pose, bone pointing along +X.
    let coefficient =
        compensation_coefficient(Vec3::new(3.0, 2.0, 0.0), &RigidTransform::IDENTITY, Vec3::X);
    assert_abs_diff_eq!(coefficient, 2.0, epsilon = 1e-6);

    // Same vertex, joint moved to x = 1 and rotated so +Y maps to +X.
    let joint = RigidTransform::new(
        Quat::from_rotation_z(-std::f32::consts::FRAC_PI_2),
        Vec3::new(1.0, 0.0, 0.0),
    );
    let coefficient = compensation_coefficient(Vec3::new(3.0, 2.0, 0.0), &joint.inverse(), Vec3::Y);
    assert_abs_diff_eq!(coefficient, 2.0, epsilon = 1e-5);
}

#[test]
fn test_vertex_records_use_primary_joint() {
    let strip = SourceMesh::strip();
    let records = strip.vertex_records(Vec3::X);
    // Every strip vertex sits half a unit off the X axis both joints lie on.
    for record in &records {
        assert_abs_diff_eq!(record.compensation, 0.5, epsilon = 1e-6);
    }

    // Orienting bones along Y measures distance along X instead.
    let records = strip.vertex_records(Vec3::Y);
    assert_abs_diff_eq!(records[0].compensation, 0.0, epsilon = 1e-6);
    assert_abs_diff_eq!(records[4].compensation, 1.0, epsilon = 1e-6);
}

#[test]
fn test_primary_joint_skips_zero_weight_slots() {
    let record = VertexRecord::new(
        Vec3::ZERO,
        Vec3::Z,
        Vec4::ZERO,
        &BoneWeights {
            joints: [4, 2, 0, 0],
            weights: [0.0, 1.0, 0.0, 0.0],
        },
    );
    assert_eq!(record.primary_joint(), 2);
}

#[test]
fn test_bounds_fall_back_to_positions() {
    let strip = SourceMesh::strip();
    let bounds = strip.bounds();
    assert_eq!(bounds.min, Vec3::new(0.0, -0.5, 0.0));
    assert_eq!(bounds.max, Vec3::new(2.0, 0.5, 0.0));
}

#[test]
fn test_unsupported_format() {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child("mesh.fbx");
    file.touch().unwrap();

    let result = SourceMesh::load(file.path());
    assert!(result.is_err());
    if let Err(e) = result {
        assert!(e.to_string().contains("Unsupported mesh format"));
    }
}

#[test]
fn test_load_corrupt_gltf_fails() {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child("broken.gltf");
    file.write_str("{ not json").unwrap();

    assert!(SourceMesh::load(file.path()).is_err());
}

fn le_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

const FIXTURE_GLTF: &str = r#"{
  "asset": { "version": "2.0" },
  "scene": 0,
  "scenes": [{ "nodes": [0, 1] }],
  "nodes": [
    { "name": "body", "mesh": 0, "skin": 0 },
    { "name": "root", "children": [2] },
    { "name": "tip", "translation": [1.0, 0.0, 0.0] }
  ],
  "meshes": [{
    "name": "fixture",
    "primitives": [{
      "attributes": { "POSITION": 0, "JOINTS_0": 1, "WEIGHTS_0": 2 },
      "targets": [{ "POSITION": 4 }]
    }]
  }],
  "skins": [{ "inverseBindMatrices": 3, "joints": [1, 2] }],
  "buffers": [{ "uri": "mesh.bin", "byteLength": 272 }],
  "bufferViews": [
    { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
    { "buffer": 0, "byteOffset": 36, "byteLength": 24 },
    { "buffer": 0, "byteOffset": 60, "byteLength": 48 },
    { "buffer": 0, "byteOffset": 108, "byteLength": 128 },
    { "buffer": 0, "byteOffset": 236, "byteLength": 36 }
  ],
  "accessors": [
    { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
      "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
    { "bufferView": 1, "componentType": 5123, "count": 3, "type": "VEC4" },
    { "bufferView": 2, "componentType": 5126, "count": 3, "type": "VEC4" },
    { "bufferView": 3, "componentType": 5126, "count": 2, "type": "MAT4" },
    { "bufferView": 4, "componentType": 5126, "count": 3, "type": "VEC3",
      "min": [0.0, 0.0, 0.0], "max": [0.0, 0.5, 0.0] }
  ]
}"#;

#[test]
fn test_load_gltf_skin_and_morph_target() {
    let mut data = le_bytes(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
    data.extend(
        [0u16, 0, 0, 0, 1, 0, 0, 0, 0, 1, 0, 0]
            .iter()
            .flat_map(|j| j.to_le_bytes()),
    );
    data.extend(le_bytes(&[
        1.0, 0.0, 0.0, 0.0, //
        1.0, 0.0, 0.0, 0.0, //
        0.5, 0.5, 0.0, 0.0,
    ]));
    data.extend(le_bytes(&Mat4::IDENTITY.to_cols_array()));
    data.extend(le_bytes(
        &Mat4::from_translation(Vec3::new(-1.0, 0.0, 0.0)).to_cols_array(),
    ));
    data.extend(le_bytes(&[0.0, 0.0, 0.0, 0.0, 0.5, 0.0, 0.0, 0.0, 0.0]));
    assert_eq!(data.len(), 272);

    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("mesh.bin").write_binary(&data).unwrap();
    let file = temp.child("mesh.gltf");
    file.write_str(FIXTURE_GLTF).unwrap();

    let mesh = SourceMesh::load(file.path()).unwrap();
    assert_eq!(mesh.name, "fixture");
    assert_eq!(mesh.vertex_count(), 3);
    assert_eq!(mesh.joint_count(), 2);
    assert_eq!(mesh.shape_count(), 1);
    assert!(mesh.normals.is_empty());
    assert!(mesh.validate().is_ok());

    assert_abs_diff_eq!(mesh.bind_poses[0].translation, Vec3::ZERO, epsilon = 1e-6);
    assert_abs_diff_eq!(
        mesh.bind_poses[1].translation,
        Vec3::new(-1.0, 0.0, 0.0),
        epsilon = 1e-6
    );

    assert_eq!(mesh.bone_weights[1].joints, [1, 0, 0, 0]);
    assert_eq!(mesh.bone_weights[2].joints, [0, 1, 0, 0]);
    assert_eq!(mesh.bone_weights[2].weights, [0.5, 0.5, 0.0, 0.0]);

    let shape = &mesh.shapes[0];
    assert_eq!(shape.name, "target_0");
    let deltas = shape.deltas.as_ref().unwrap();
    assert_eq!(deltas.len(), 3);
    assert_eq!(deltas[1].position, [0.0, 0.5, 0.0, 0.0]);
    assert_eq!(deltas[0].position, [0.0; 4]);

    let bounds = mesh.bounds();
    assert_eq!(bounds.min, Vec3::ZERO);
    assert_eq!(bounds.max, Vec3::new(1.0, 1.0, 0.0));
}
