mod dual_quat;
mod rigid;

pub use dual_quat::DualQuat;
pub use rigid::RigidTransform;

#[cfg(test)]
mod tests;
