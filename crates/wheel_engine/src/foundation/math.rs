//! Math types and the per-frame transform used by the default pipeline

pub use nalgebra::{Matrix4, Point3, Vector3};

/// 3D vector type
pub type Vec3 = Vector3<f32>;
/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Degrees per second the model spins around +Z
pub const MODEL_SPIN_DEG_PER_SEC: f32 = 90.0;

/// Camera eye position, looking at the origin
pub const EYE: [f32; 3] = [2.0, 2.0, 2.0];

/// Vertical field of view of the default camera, in degrees
pub const FOV_Y_DEG: f32 = 45.0;

/// Near clip plane
pub const Z_NEAR: f32 = 0.1;
/// Far clip plane
pub const Z_FAR: f32 = 10.0;

/// Model matrix after `seconds` of spinning
pub fn model_at(seconds: f32) -> Mat4 {
    let angle = (seconds * MODEL_SPIN_DEG_PER_SEC).to_radians();
    Mat4::new_rotation(Vec3::z() * angle)
}

/// View matrix of the default camera (+Z up)
pub fn view() -> Mat4 {
    Mat4::look_at_rh(
        &Point3::new(EYE[0], EYE[1], EYE[2]),
        &Point3::origin(),
        &Vec3::z(),
    )
}

/// Perspective projection for the given aspect ratio
///
/// Y is flipped because Vulkan's clip space points Y down.
pub fn projection(aspect: f32) -> Mat4 {
    let mut proj = Mat4::new_perspective(aspect, FOV_Y_DEG.to_radians(), Z_NEAR, Z_FAR);
    proj[(1, 1)] *= -1.0;
    proj
}
