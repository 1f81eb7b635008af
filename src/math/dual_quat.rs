//! Unit dual quaternions for rigid blending.
//!
//! `real` holds the rotation, `dual` holds `0.5 * t * real` where `t` is the
//! translation as a pure quaternion. The WGSL kernels in `shaders/dq_common.wgsl`
//! implement the same operations on `vec4<f32>` pairs.

use glam::{Quat, Vec3};

use super::RigidTransform;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DualQuat {
    pub real: Quat,
    pub dual: Quat,
}

impl Default for DualQuat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl DualQuat {
    pub const IDENTITY: Self = Self {
        real: Quat::IDENTITY,
        dual: Quat::from_xyzw(0.0, 0.0, 0.0, 0.0),
    };

    pub fn from_rigid(rotation: Quat, translation: Vec3) -> Self {
        let real = rotation.normalize();
        let t = Quat::from_xyzw(translation.x, translation.y, translation.z, 0.0);
        Self {
            real,
            dual: (t * real) * 0.5,
        }
    }

    pub fn from_transform(transform: &RigidTransform) -> Self {
        Self::from_rigid(transform.rotation, transform.translation)
    }

    pub fn translation(&self) -> Vec3 {
        let t = (self.dual * self.real.conjugate()) * 2.0;
        Vec3::new(t.x, t.y, t.z)
    }

    pub fn to_rigid(&self) -> RigidTransform {
        let normalized = self.normalize();
        RigidTransform::new(normalized.real, normalized.translation())
    }

    /// `self ⊗ rhs`: applies `rhs` first.
    pub fn mul(&self, rhs: &Self) -> Self {
        Self {
            real: self.real * rhs.real,
            dual: self.real * rhs.dual + self.dual * rhs.real,
        }
    }

    pub fn conjugate(&self) -> Self {
        Self {
            real: self.real.conjugate(),
            dual: self.dual.conjugate(),
        }
    }

    /// Divides both parts by the magnitude of the real part.
    pub fn normalize(&self) -> Self {
        let length = self.real.length();
        if length <= f32::EPSILON {
            return *self;
        }
        Self {
            real: self.real / length,
            dual: self.dual / length,
        }
    }

    pub fn scale(&self, factor: f32) -> Self {
        Self {
            real: self.real * factor,
            dual: self.dual * factor,
        }
    }

    pub fn negate(&self) -> Self {
        Self {
            real: -self.real,
            dual: -self.dual,
        }
    }

    /// Flips `candidate` into the hemisphere of `reference` so that summing
    /// them blends rather than cancels.
    pub fn antipodality_fix(reference: &Self, candidate: &Self) -> Self {
        if reference.real.dot(candidate.real) < 0.0 {
            candidate.negate()
        } else {
            *candidate
        }
    }

    /// Weighted blend with sign correction against the first non-zero-weight
    /// input. Returns identity when every weight is zero.
    pub fn blend(inputs: &[(DualQuat, f32)]) -> Self {
        let mut reference: Option<DualQuat> = None;
        let mut real = Quat::from_xyzw(0.0, 0.0, 0.0, 0.0);
        let mut dual = Quat::from_xyzw(0.0, 0.0, 0.0, 0.0);

        for (dq, weight) in inputs {
            if *weight == 0.0 {
                continue;
            }
            let reference = *reference.get_or_insert(*dq);
            let fixed = Self::antipodality_fix(&reference, dq);
            real = real + fixed.real * *weight;
            dual = dual + fixed.dual * *weight;
        }

        if reference.is_none() {
            return Self::IDENTITY;
        }
        Self { real, dual }.normalize()
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.real * point + self.translation()
    }

    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.real * vector
    }

    pub fn to_gpu(&self) -> [[f32; 4]; 2] {
        [self.real.to_array(), self.dual.to_array()]
    }
}

impl From<RigidTransform> for DualQuat {
    fn from(transform: RigidTransform) -> Self {
        Self::from_transform(&transform)
    }
}
