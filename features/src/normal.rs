use std::marker::PhantomData;

use nalgebra::{Vector3, Vector4};
use num::Zero;
use pcf_common::{
    feature::{Feature, Neighborhood},
    normal::{compute_point_normal, flip_normal_towards_viewpoint},
    point::{Normal, Point},
};

use crate::nan;

/// Surface normals and curvatures by plane fitting, oriented towards a
/// viewpoint.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NormalEstimation<O: Normal> {
    pub viewpoint: Vector3<O::Data>,
    _marker: PhantomData<fn() -> O>,
}

impl<O: Normal> NormalEstimation<O> {
    pub fn new(viewpoint: Vector3<O::Data>) -> Self {
        NormalEstimation {
            viewpoint,
            _marker: PhantomData,
        }
    }
}

impl<O: Normal> Default for NormalEstimation<O> {
    fn default() -> Self {
        Self::new(Vector3::zeros())
    }
}

impl<P, O> Feature<P> for NormalEstimation<O>
where
    P: Point,
    O: Normal<Data = P::Data>,
{
    const NAME: &'static str = "NormalEstimation";

    type Output = O;
    type Scratch = ();

    fn invalid(&self) -> O {
        let nan = nan();
        { O::default() }
            .with_normal(Vector4::new(nan, nan, nan, P::Data::zero()))
            .with_curvature(nan)
    }

    fn compute_point(&self, n: &Neighborhood<P>, _: &mut ()) -> Option<O> {
        let (mut plane, curvature) = compute_point_normal(&n.as_point_cloud_ref())?;
        flip_normal_towards_viewpoint(n.pivot.coords(), &self.viewpoint, &mut plane);

        let normal = Vector4::new(plane.x, plane.y, plane.z, P::Data::zero());
        Some(O::default().with_normal(normal).with_curvature(curvature))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use pcf_common::{
        point::{Data, Normal3, Point3},
        point_cloud::PointCloud,
    };
    use pcf_search::KdTreeSearch;

    use super::*;
    use crate::Estimation;

    #[test]
    fn test_planar_normals() {
        // z = 0.2x - 0.1y + 3
        let cloud = (0..10)
            .flat_map(|x| (0..10).map(move |y| (x as f32 * 0.1, y as f32 * 0.1)))
            .map(|(x, y)| Point3::new(x, y, 0.2 * x - 0.1 * y + 3.))
            .collect::<PointCloud<_>>();
        let search = KdTreeSearch;

        let normals = Estimation::new()
            .with_input(&cloud)
            .with_search_method(&search)
            .with_k_search(10)
            .compute(&NormalEstimation::<Normal3>::default())
            .unwrap();
        assert_eq!(normals.len(), 100);

        let expected = Vector3::new(-0.2f32, 0.1, 1.).normalize();
        for (point, record) in cloud.iter().zip(normals.iter()) {
            let normal = record.normal().xyz();
            // Oriented towards the origin, below the plane.
            assert!(normal.dot(&(-point.xyz())) >= 0.);
            assert_relative_eq!(normal, -expected, epsilon = 1e-4);
            assert!(record.curvature() >= 0. && record.curvature() <= 1e-4);
        }
    }

    #[test]
    fn test_viewpoint_and_sparse_points() {
        let cloud = PointCloud::from_vec(
            vec![
                Point3::new(0., 0., 0.),
                Point3::new(1., 0., 0.),
                Point3::new(0., 1., 0.),
                Point3::new(1., 1., 0.),
                Point3::new(50., 50., 50.),
            ],
            5,
        );
        let search = KdTreeSearch;
        let estimation = NormalEstimation::<Normal3>::new(Vector3::new(0., 0., -10.));

        let normals = Estimation::new()
            .with_input(&cloud)
            .with_search_method(&search)
            .with_radius_search(2.)
            .compute(&estimation)
            .unwrap();

        for normal in normals.iter().take(4) {
            assert_relative_eq!(normal.normal.z, -1., epsilon = 1e-6);
            assert_eq!(normal.normal.w, 0.);
        }
        assert!(!normals[4].is_finite());
        assert!(normals[4].curvature.is_nan());
        assert!(!normals.is_dense());
    }
}
