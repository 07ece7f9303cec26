use nalgebra::{convert, Vector3};
use pcf_common::{
    feature::{Feature, Neighborhood},
    point::Point,
};

use crate::nan;

/// The three rotation invariants of the second order central moments of a
/// neighborhood.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MomentInvariant;

impl MomentInvariant {
    fn invariants<P: Point>(n: &Neighborhood<P>) -> Option<Vector3<P::Data>> {
        let centroid = n.as_point_cloud_ref().centroid_coords().0?.xyz();

        // (μ200, μ020, μ002) and (μ011, μ101, μ110)
        let mut sqr = Vector3::zeros();
        let mut dot = Vector3::zeros();
        for index in n.indices() {
            let diff = n.surface[index].xyz() - centroid;
            sqr += diff.component_mul(&diff);
            dot += diff.yzx().component_mul(&diff.zxy());
        }

        let j1 = sqr.sum();
        let j2 = sqr.dot(&sqr.yzx()) - dot.dot(&dot);
        let j3 = sqr.product() + dot.product() * convert(2.) - sqr.dot(&dot.component_mul(&dot));
        Some(Vector3::new(j1, j2, j3))
    }
}

impl<P: Point> Feature<P> for MomentInvariant {
    const NAME: &'static str = "MomentInvariant";

    type Output = Vector3<P::Data>;
    type Scratch = ();

    fn invalid(&self) -> Vector3<P::Data> {
        Vector3::repeat(nan())
    }

    fn compute_point(&self, n: &Neighborhood<P>, _: &mut ()) -> Option<Vector3<P::Data>> {
        Self::invariants(n)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;
    use pcf_common::{point::Point3, point_cloud::PointCloud};
    use pcf_search::KdTreeSearch;

    use super::*;
    use crate::Estimation;

    fn compute(cloud: &PointCloud<Point3>) -> PointCloud<Vector3<f32>> {
        let search = KdTreeSearch;
        Estimation::new()
            .with_input(cloud)
            .with_search_method(&search)
            .with_k_search(cloud.len())
            .compute(&MomentInvariant)
            .unwrap()
    }

    #[test]
    fn test_known_values() {
        // Centered at the origin: μ200 = 4, μ020 = 16, the rest 0.
        let cloud = [[1., 2., 0.], [-1., -2., 0.], [1., -2., 0.], [-1., 2., 0.]]
            .into_iter()
            .map(|[x, y, z]| Point3::new(x, y, z + 5.))
            .collect::<PointCloud<_>>();
        let output = compute(&cloud);
        assert_relative_eq!(output[0], Vector3::new(20., 64., 0.), epsilon = 1e-4);
    }

    #[test]
    fn test_rotation_invariance() {
        let cloud = [[0.3, 1., -2.], [1.5, 0.2, 0.4], [-0.7, 2., 1.], [0.1, -1., 0.5], [2., 2., 2.]]
            .into_iter()
            .map(|[x, y, z]| Point3::new(x, y, z))
            .collect::<PointCloud<_>>();
        let rotation = Rotation3::from_euler_angles(0.3, -1.1, 2.);
        let rotated = cloud
            .iter()
            .map(|p| p.with_coords((rotation * p.xyz()).push(1.)))
            .collect::<PointCloud<_>>();

        let a = compute(&cloud);
        let b = compute(&rotated);
        assert_relative_eq!(a[0], b[0], epsilon = 1e-3, max_relative = 1e-3);
    }

    #[test]
    fn test_coincident_points() {
        let cloud = PointCloud::from_vec(vec![Point3::new(1., 1., 1.); 4], 4);
        let output = compute(&cloud);
        assert_eq!(output[2], Vector3::zeros());
    }
}
