//! Plane fitting over a local neighborhood.

use nalgebra::{Matrix3, RealField, Vector3, Vector4};

use crate::{point::Point, point_cloud::PointCloudRef};

/// Fits a plane to a covariance matrix and the centroid it was taken
/// around.
///
/// Returns `(nx, ny, nz, d)` with the normal being the eigenvector of the
/// smallest eigenvalue, and the surface curvature `λ_min / Σλ` in `[0, 1]`.
pub fn solve_plane_parameters<T: RealField + Copy>(
    cov: &Matrix3<T>,
    centroid: &Vector4<T>,
) -> (Vector4<T>, T) {
    let eigen = cov.symmetric_eigen();
    let values = eigen.eigenvalues.map(|v| v.max(T::zero()));
    let index = (1..3).fold(0, |min, i| if values[i] < values[min] { i } else { min });

    let normal = eigen.eigenvectors.column(index).into_owned();
    let sum = values[0] + values[1] + values[2];
    let curvature = if sum > T::zero() {
        (values[index] / sum).min(T::one())
    } else {
        T::zero()
    };

    let d = -normal.dot(&centroid.xyz());
    (Vector4::new(normal.x, normal.y, normal.z, d), curvature)
}

/// The plane parameters and curvature of a neighborhood, or `None` if it has
/// fewer than 3 finite points.
pub fn compute_point_normal<P: Point>(
    neighbors: &PointCloudRef<P>,
) -> Option<(Vector4<P::Data>, P::Data)> {
    let (centroid, num) = neighbors.centroid_coords();
    if num < 3 {
        return None;
    }
    let centroid = centroid?;
    let cov = neighbors.cov_matrix_norm(&centroid)?;
    Some(solve_plane_parameters(&cov, &centroid))
}

/// Negates `plane` (normal and offset) if its normal faces away from
/// `viewpoint` as seen from `point`.
pub fn flip_normal_towards_viewpoint<T: RealField + Copy>(
    point: &Vector4<T>,
    viewpoint: &Vector3<T>,
    plane: &mut Vector4<T>,
) {
    let vp = viewpoint - point.xyz();
    if vp.dot(&plane.xyz()) < T::zero() {
        *plane = -*plane;
    }
}

/// A unit vector orthogonal to `v`, chosen deterministically: `v` is
/// orthogonalized against the z axis unless it is (nearly) parallel to it,
/// in which case the x axis is used.
pub fn unit_orthogonal<T: RealField + Copy>(v: &Vector3<T>) -> Vector3<T> {
    let eps = T::default_epsilon();
    if v.x.abs() > eps * v.z.abs() || v.y.abs() > eps * v.z.abs() {
        let inv = (v.x * v.x + v.y * v.y).sqrt().recip();
        Vector3::new(-v.y * inv, v.x * inv, T::zero())
    } else {
        let inv = (v.y * v.y + v.z * v.z).sqrt().recip();
        Vector3::new(T::zero(), -v.z * inv, v.y * inv)
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use approx::assert_relative_eq;

    use super::*;
    use crate::{point::Point3, point_cloud::PointCloud};

    #[test]
    fn test_plane_parameters() {
        let cloud = (0..5)
            .flat_map(|x| (0..5).map(move |y| Point3::new(x as f32, y as f32, 2.)))
            .collect::<PointCloud<_>>();
        let (plane, curvature) = compute_point_normal(&cloud.as_ref()).unwrap();

        assert_relative_eq!(plane.z.abs(), 1., epsilon = 1e-6);
        assert_relative_eq!(plane.w, -2. * plane.z, epsilon = 1e-5);
        assert_relative_eq!(curvature, 0., epsilon = 1e-6);

        let mut flipped = plane;
        flip_normal_towards_viewpoint(&Vector4::new(0., 0., 2., 1.), &Vector3::zeros(), &mut flipped);
        assert_relative_eq!(flipped.z, -1., epsilon = 1e-6);
        assert_relative_eq!(flipped.w, 2., epsilon = 1e-5);
    }

    #[test]
    fn test_too_few_points() {
        let cloud = PointCloud::from_vec(vec![Point3::new(0., 0., 0.), Point3::new(1., 0., 0.)], 2);
        assert!(compute_point_normal(&cloud.as_ref()).is_none());

        let cloud = PointCloud::from_vec(
            vec![
                Point3::new(0., 0., 0.),
                Point3::new(1., 0., 0.),
                Point3::new(f32::NAN, 0., 0.),
            ],
            3,
        );
        assert!(compute_point_normal(&cloud.select(Cow::Owned(vec![0, 1, 2]))).is_none());
    }

    #[test]
    fn test_curvature_of_isotropic_cloud() {
        let cloud = [
            [1., 0., 0.],
            [-1., 0., 0.],
            [0., 1., 0.],
            [0., -1., 0.],
            [0., 0., 1.],
            [0., 0., -1.],
        ]
        .into_iter()
        .map(|[x, y, z]| Point3::new(x, y, z))
        .collect::<PointCloud<_>>();
        let (_, curvature) = compute_point_normal(&cloud.as_ref()).unwrap();
        assert_relative_eq!(curvature, 1. / 3., epsilon = 1e-5);
    }

    #[test]
    fn test_unit_orthogonal() {
        for v in [
            Vector3::new(0., 0., 1.),
            Vector3::new(1., 0., 0.),
            Vector3::new(0.3, -0.4, 0.866),
        ] {
            let u = unit_orthogonal(&v);
            assert_relative_eq!(u.norm(), 1., epsilon = 1e-6);
            assert_relative_eq!(u.dot(&v), 0., epsilon = 1e-6);
        }
    }
}
