// src/vector_math.rs - 3D vector helpers shared by the angle calculator
use nalgebra::Vector3;

use crate::landmarks::PoseLandmark;

pub type Vector3D = Vector3<f64>;

pub fn midpoint_3d(a: &Vector3D, b: &Vector3D) -> Vector3D {
    (a + b) / 2.0
}

pub fn subtract_3d(a: &Vector3D, b: &Vector3D) -> Vector3D {
    a - b
}

/// Unit vector in the direction of `v`.
///
/// A zero vector is returned unchanged. Callers must read that as "no
/// direction", never as a measured axis.
pub fn normalize(v: &Vector3D) -> Vector3D {
    let mag = magnitude(v);
    if mag == 0.0 {
        return *v;
    }
    v / mag
}

/// Right-hand rule.
pub fn cross_product(a: &Vector3D, b: &Vector3D) -> Vector3D {
    a.cross(b)
}

pub fn dot_product(a: &Vector3D, b: &Vector3D) -> f64 {
    a.dot(b)
}

pub fn magnitude(v: &Vector3D) -> f64 {
    v.norm()
}

/// Angle between two vectors in degrees, always within [0, 180].
///
/// Returns 0 when either vector has zero length (undetermined, not a
/// measured zero).
pub fn angle_between_vectors(a: &Vector3D, b: &Vector3D) -> f64 {
    let mag_a = magnitude(a);
    let mag_b = magnitude(b);

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    // acos is undefined outside [-1, 1]; rounding can land just past it
    let cos_angle = (dot_product(a, b) / (mag_a * mag_b)).clamp(-1.0, 1.0);
    cos_angle.acos().to_degrees()
}

/// Projects `v` onto the plane with unit normal `normal` and normalizes the result.
///
/// `normal` is used as given; it must already be unit length.
pub fn project_vector_onto_plane(v: &Vector3D, normal: &Vector3D) -> Vector3D {
    let along_normal = normal * dot_product(v, normal);
    normalize(&(v - along_normal))
}

pub fn landmark_vector(landmark: &PoseLandmark) -> Vector3D {
    Vector3D::new(landmark.x, landmark.y, landmark.z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_midpoint_and_subtract() {
        let a = Vector3D::new(1.0, 2.0, 3.0);
        let b = Vector3D::new(3.0, 4.0, -1.0);

        assert_eq!(midpoint_3d(&a, &b), Vector3D::new(2.0, 3.0, 1.0));
        assert_eq!(subtract_3d(&a, &b), Vector3D::new(-2.0, -2.0, 4.0));
    }

    #[test]
    fn test_normalize_unit_length() {
        let v = Vector3D::new(3.0, -4.0, 12.0);
        assert_abs_diff_eq!(magnitude(&normalize(&v)), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_normalize_zero_vector_unchanged() {
        let zero = Vector3D::zeros();
        assert_eq!(normalize(&zero), zero);
    }

    #[test]
    fn test_cross_product_right_handed() {
        let x = Vector3D::x();
        let y = Vector3D::y();
        assert_eq!(cross_product(&x, &y), Vector3D::z());
        assert_eq!(cross_product(&y, &x), -Vector3D::z());
    }

    #[test]
    fn test_angle_identity_and_opposite() {
        let a = Vector3D::new(0.3, -1.2, 0.7);
        assert_abs_diff_eq!(angle_between_vectors(&a, &a), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(angle_between_vectors(&a, &-a), 180.0, epsilon = 1e-6);
    }

    #[test]
    fn test_angle_right_angle() {
        let angle = angle_between_vectors(&Vector3D::x(), &Vector3D::new(0.0, 5.0, 0.0));
        assert_abs_diff_eq!(angle, 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_angle_stays_in_range() {
        let samples = [
            Vector3D::new(1.0, 0.0, 0.0),
            Vector3D::new(-0.5, 0.2, 0.9),
            Vector3D::new(1e-7, 1e-7, -1e-7),
            Vector3D::new(1e6, -3e5, 2.0),
            Vector3D::new(-1.0, -1.0, -1.0),
        ];

        for a in &samples {
            for b in &samples {
                let angle = angle_between_vectors(a, b);
                assert!((0.0..=180.0).contains(&angle), "angle {} out of range", angle);
            }
        }
    }

    #[test]
    fn test_angle_with_zero_vector_is_zero() {
        let a = Vector3D::new(1.0, 2.0, 3.0);
        assert_eq!(angle_between_vectors(&a, &Vector3D::zeros()), 0.0);
        assert_eq!(angle_between_vectors(&Vector3D::zeros(), &a), 0.0);
    }

    #[test]
    fn test_projection_removes_normal_component() {
        let v = Vector3D::new(1.0, 1.0, 1.0);
        let projected = project_vector_onto_plane(&v, &Vector3D::z());

        assert_abs_diff_eq!(projected.z, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(magnitude(&projected), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_projection_of_parallel_vector_is_zero() {
        let projected = project_vector_onto_plane(&Vector3D::new(0.0, 0.0, 2.0), &Vector3D::z());
        assert_eq!(projected, Vector3D::zeros());
    }
}
