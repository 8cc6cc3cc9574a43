//! Coordinate and unit conversion between GEO space and engine space.
//!
//! GEO geometry is right-handed and stores lengths at [`POSITION_SCALE`]
//! times the engine's unit; engine space here is left-handed. Positions
//! mirror across the X axis and rescale, directions only mirror (and come
//! back normalized), and rotations mirror by negating the Y and Z
//! imaginary parts. Every conversion is its own inverse up to the scale
//! factor.

use glam::{Quat, Vec3};

/// Engine-to-GEO unit scale.
pub const POSITION_SCALE: f32 = 100.0;

pub fn to_engine_position(p: Vec3) -> Vec3 {
    Vec3::new(-p.x, p.y, p.z) / POSITION_SCALE
}

pub fn to_houdini_position(p: Vec3) -> Vec3 {
    Vec3::new(-p.x, p.y, p.z) * POSITION_SCALE
}

pub fn to_engine_distance(d: f32) -> f32 {
    d / POSITION_SCALE
}

pub fn to_houdini_distance(d: f32) -> f32 {
    d * POSITION_SCALE
}

pub fn to_engine_direction(d: Vec3) -> Vec3 {
    Vec3::new(-d.x, d.y, d.z).normalize_or_zero()
}

pub fn to_houdini_direction(d: Vec3) -> Vec3 {
    Vec3::new(-d.x, d.y, d.z).normalize_or_zero()
}

pub fn to_engine_rotation(q: Quat) -> Quat {
    Quat::from_xyzw(q.x, -q.y, -q.z, q.w)
}

pub fn to_houdini_rotation(q: Quat) -> Quat {
    Quat::from_xyzw(q.x, -q.y, -q.z, q.w)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn test_position_roundtrip() {
        let p = Vec3::new(1.5, -2.0, 3.25);
        assert!(approx(to_houdini_position(to_engine_position(p)), p));
        assert_eq!(to_houdini_position(p), Vec3::new(-150.0, -200.0, 325.0));
    }

    #[test]
    fn test_position_scale_direction() {
        // GEO values shrink on the way into the engine and grow on the
        // way back out.
        assert_eq!(
            to_engine_position(Vec3::new(1.0, 2.0, 3.0)),
            Vec3::new(-0.01, 0.02, 0.03)
        );
        assert_eq!(
            to_houdini_position(Vec3::new(1.0, 0.0, 0.0)),
            Vec3::new(-100.0, 0.0, 0.0)
        );
    }

    #[test]
    fn test_distance_roundtrip() {
        assert_eq!(to_houdini_distance(2.5), 250.0);
        assert_eq!(to_engine_distance(250.0), 2.5);
        assert_eq!(to_engine_distance(to_houdini_distance(2.5)), 2.5);
    }

    #[test]
    fn test_direction_is_mirrored_and_normalized() {
        let d = to_engine_direction(Vec3::new(3.0, 0.0, 4.0));
        assert!(approx(d, Vec3::new(-0.6, 0.0, 0.8)));
        assert!(approx(to_houdini_direction(d), Vec3::new(0.6, 0.0, -0.8).normalize()));
    }

    #[test]
    fn test_zero_direction_stays_zero() {
        assert_eq!(to_engine_direction(Vec3::ZERO), Vec3::ZERO);
    }

    #[test]
    fn test_rotation_roundtrip() {
        let q = Quat::from_euler(glam::EulerRot::XYZ, 0.3, -1.1, 0.7);
        let back = to_houdini_rotation(to_engine_rotation(q));
        assert!((back.x - q.x).abs() < 1e-6);
        assert!((back.y - q.y).abs() < 1e-6);
        assert!((back.z - q.z).abs() < 1e-6);
        assert!((back.w - q.w).abs() < 1e-6);
    }

    #[test]
    fn test_rotation_commutes_with_direction_mirror() {
        // Mirroring then rotating must match rotating then mirroring.
        let q = Quat::from_euler(glam::EulerRot::XYZ, 0.4, 0.9, -0.2);
        let v = Vec3::new(1.0, 2.0, -0.5).normalize();

        let a = to_engine_rotation(q) * to_engine_direction(v);
        let b = to_engine_direction(q * v);
        assert!(approx(a, b));
    }
}
