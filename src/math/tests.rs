use super::*;
use approx::assert_abs_diff_eq;
use glam::{Mat4, Quat, Vec3};
use std::f32::consts::{FRAC_PI_2, FRAC_PI_3, PI};

fn sample_transforms() -> Vec<RigidTransform> {
    vec![
        RigidTransform::IDENTITY,
        RigidTransform::from_translation(Vec3::new(1.0, -2.0, 3.5)),
        RigidTransform::new(Quat::from_rotation_z(FRAC_PI_2), Vec3::new(0.0, 1.0, 0.0)),
        RigidTransform::new(
            Quat::from_axis_angle(Vec3::new(1.0, 1.0, 0.0).normalize(), 2.5),
            Vec3::new(-4.0, 0.25, 10.0),
        ),
        RigidTransform::new(Quat::from_rotation_x(PI - 0.01), Vec3::new(0.5, 0.5, -0.5)),
    ]
}

#[test]
fn test_from_rigid_round_trip() {
    for transform in sample_transforms() {
        let recovered = DualQuat::from_transform(&transform).to_rigid();
        assert!(
            recovered.rotation.dot(transform.rotation).abs() > 1.0 - 1e-5,
            "rotation mismatch: {:?} vs {:?}",
            recovered.rotation,
            transform.rotation
        );
        assert_abs_diff_eq!(recovered.translation, transform.translation, epsilon = 1e-4);
    }
}

#[test]
fn test_blend_single_input_is_identity() {
    for transform in sample_transforms() {
        let dq = DualQuat::from_transform(&transform);
        let blended = DualQuat::blend(&[(dq, 1.0)]);
        assert_abs_diff_eq!(blended.real, dq.real, epsilon = 1e-6);
        assert_abs_diff_eq!(blended.dual, dq.dual, epsilon = 1e-6);
    }
}

#[test]
fn test_blend_is_representation_invariant() {
    let dq = DualQuat::from_rigid(Quat::from_rotation_y(FRAC_PI_3), Vec3::new(2.0, 0.0, -1.0));
    let negated = dq.negate();

    let same = DualQuat::blend(&[(dq, 0.5), (dq, 0.5)]);
    let mixed = DualQuat::blend(&[(dq, 0.5), (negated, 0.5)]);

    assert_abs_diff_eq!(same.real, mixed.real, epsilon = 1e-6);
    assert_abs_diff_eq!(same.dual, mixed.dual, epsilon = 1e-6);
}

#[test]
fn test_antipodality_fix_only_flips_opposite_hemisphere() {
    let reference = DualQuat::from_rigid(Quat::from_rotation_z(0.3), Vec3::X);
    let near = DualQuat::from_rigid(Quat::from_rotation_z(0.5), Vec3::Y);

    assert_eq!(DualQuat::antipodality_fix(&reference, &near), near);
    assert_eq!(DualQuat::antipodality_fix(&reference, &near.negate()), near);
}

#[test]
fn test_blend_skips_zero_weights() {
    let a = DualQuat::from_rigid(Quat::from_rotation_x(1.0), Vec3::new(0.0, 3.0, 0.0));
    let b = DualQuat::from_rigid(Quat::from_rotation_y(2.0), Vec3::new(5.0, 0.0, 0.0));

    // Zero-weight first slot must not become the hemisphere reference.
    let blended = DualQuat::blend(&[(b.negate(), 0.0), (a, 1.0)]);
    assert_abs_diff_eq!(blended.real, a.real, epsilon = 1e-6);

    assert_eq!(DualQuat::blend(&[(a, 0.0), (b, 0.0)]), DualQuat::IDENTITY);
    assert_eq!(DualQuat::blend(&[]), DualQuat::IDENTITY);
}

#[test]
fn test_blend_normalizes_unnormalized_weights() {
    let dq = DualQuat::from_rigid(Quat::from_rotation_z(0.7), Vec3::new(1.0, 2.0, 3.0));
    let blended = DualQuat::blend(&[(dq, 0.2), (dq, 0.2)]);
    assert_abs_diff_eq!(blended.real.length(), 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(blended.translation(), Vec3::new(1.0, 2.0, 3.0), epsilon = 1e-5);
}

#[test]
fn test_blend_halfway_rotation() {
    let a = DualQuat::from_rigid(Quat::IDENTITY, Vec3::ZERO);
    let b = DualQuat::from_rigid(Quat::from_rotation_z(FRAC_PI_2), Vec3::ZERO);
    let mid = DualQuat::blend(&[(a, 0.5), (b, 0.5)]);
    let expected = Quat::from_rotation_z(FRAC_PI_2 * 0.5);
    assert!(mid.real.dot(expected).abs() > 1.0 - 1e-5);
}

#[test]
fn test_mul_matches_rigid_composition() {
    let transforms = sample_transforms();
    for a in &transforms {
        for b in &transforms {
            let composed = DualQuat::from_transform(a).mul(&DualQuat::from_transform(b));
            let expected = *a * *b;
            let point = Vec3::new(0.3, -1.2, 2.0);
            assert_abs_diff_eq!(
                composed.transform_point(point),
                expected.transform_point(point),
                epsilon = 1e-4
            );
        }
    }
}

#[test]
fn test_transform_point_matches_matrix() {
    for transform in sample_transforms() {
        let dq = DualQuat::from_transform(&transform);
        let point = Vec3::new(1.0, 2.0, 3.0);
        assert_abs_diff_eq!(
            dq.transform_point(point),
            transform.to_matrix().transform_point3(point),
            epsilon = 1e-4
        );
    }
}

#[test]
fn test_rigid_inverse() {
    for transform in sample_transforms() {
        let round_trip = transform * transform.inverse();
        assert_abs_diff_eq!(round_trip.translation, Vec3::ZERO, epsilon = 1e-4);
        assert!(round_trip.rotation.dot(Quat::IDENTITY).abs() > 1.0 - 1e-5);
    }
}

#[test]
fn test_rigid_from_matrix_drops_scale() {
    let matrix = Mat4::from_scale_rotation_translation(
        Vec3::splat(2.0),
        Quat::from_rotation_y(0.4),
        Vec3::new(1.0, 0.0, -1.0),
    );
    let rigid = RigidTransform::from_matrix(&matrix);
    assert!(rigid.rotation.dot(Quat::from_rotation_y(0.4)).abs() > 1.0 - 1e-5);
    assert_abs_diff_eq!(rigid.translation, Vec3::new(1.0, 0.0, -1.0), epsilon = 1e-5);
}
