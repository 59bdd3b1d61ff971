//! Math type aliases and helper functions.
//!
//! Scene transforms are always f32.

pub use nalgebra;

/// 3D vector (f32).
pub type Vec3 = nalgebra::Vector3<f32>;

/// Quaternion (f32). Stored as `[x, y, z, w]` in memory.
/// Use [`quat_from_xyzw`] or `Quaternion::new(w, x, y, z)` to construct.
pub type Quat = nalgebra::Quaternion<f32>;

/// The identity quaternion (no rotation).
pub fn quat_identity() -> Quat {
    Quat::identity()
}

/// Build a quaternion from individual `[x, y, z, w]` components.
pub fn quat_from_xyzw(x: f32, y: f32, z: f32, w: f32) -> Quat {
    Quat::new(w, x, y, z)
}

/// Build a rotation quaternion from Euler angles in degrees.
///
/// Angles are `(roll, pitch, yaw)` applied in nalgebra's intrinsic
/// z-y-x convention. This is the convention scene text files use for
/// `rotation x y z;` lines.
pub fn quat_from_euler_deg(angles: Vec3) -> Quat {
    nalgebra::UnitQuaternion::from_euler_angles(
        angles.x.to_radians(),
        angles.y.to_radians(),
        angles.z.to_radians(),
    )
    .into_inner()
}

/// Decompose a rotation quaternion into Euler angles in degrees.
///
/// Inverse of [`quat_from_euler_deg`] up to floating point error and
/// angle-representation ambiguity near gimbal lock.
pub fn quat_to_euler_deg(q: &Quat) -> Vec3 {
    let (roll, pitch, yaw) = nalgebra::UnitQuaternion::from_quaternion(*q).euler_angles();
    Vec3::new(roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees())
}
