use std::cmp::Ordering;

use nalgebra::{convert, ComplexField, Matrix3, RealField, Vector3};
use pcf_common::{
    error::{Error, Result},
    feature::{Feature, Neighborhood},
    point::{Data, Normal, Point},
    point_cloud::PointCloud,
};

use crate::{check_len, nan};

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PrincipalCurvatures<T: RealField> {
    /// The direction of maximum curvature, in the tangent plane.
    pub direction: Vector3<T>,
    pub pc1: T,
    pub pc2: T,
}

impl<T: RealField> Data for PrincipalCurvatures<T> {
    fn is_finite(&self) -> bool {
        self.direction.iter().all(|v| v.is_finite()) && self.pc1.is_finite() && self.pc2.is_finite()
    }
}

/// Principal curvatures from the spread of neighbor normals projected onto
/// the tangent plane of the query normal.
#[derive(Debug, Clone, PartialEq)]
pub struct PrincipalCurvaturesEstimation<'a, N: Normal> {
    pub normals: Option<&'a PointCloud<N>>,
}

impl<'a, N: Normal> PrincipalCurvaturesEstimation<'a, N> {
    pub fn new() -> Self {
        PrincipalCurvaturesEstimation { normals: None }
    }

    pub fn with_normals(mut self, normals: &'a PointCloud<N>) -> Self {
        self.normals = Some(normals);
        self
    }
}

impl<'a, N: Normal> Default for PrincipalCurvaturesEstimation<'a, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, P, N> Feature<P> for PrincipalCurvaturesEstimation<'a, N>
where
    P: Point,
    N: Normal<Data = P::Data>,
{
    const NAME: &'static str = "PrincipalCurvaturesEstimation";

    type Output = PrincipalCurvatures<P::Data>;
    type Scratch = Vec<Vector3<P::Data>>;

    fn check(&self, surface: &PointCloud<P>, _: Option<P::Data>) -> Result<()> {
        let normals = { self.normals }.ok_or(Error::MissingNormals(<Self as Feature<P>>::NAME))?;
        check_len("normals", surface.len(), normals.len())
    }

    fn invalid(&self) -> Self::Output {
        PrincipalCurvatures {
            direction: Vector3::repeat(nan()),
            pc1: nan(),
            pc2: nan(),
        }
    }

    fn compute_point(
        &self,
        n: &Neighborhood<P>,
        projected: &mut Vec<Vector3<P::Data>>,
    ) -> Option<Self::Output> {
        let normals = self.normals?;
        let normal = normals[n.pivot_index?].normal().xyz();
        if !normal.iter().all(|v| v.is_finite()) {
            return None;
        }
        let projection = Matrix3::identity() - normal * normal.transpose();

        projected.clear();
        projected.extend(
            { n.indices() }
                .map(|i| normals[i].normal().xyz())
                .filter(|normal| normal.iter().all(|v| v.is_finite()))
                .map(|normal| projection * normal),
        );
        if projected.is_empty() {
            return None;
        }

        let num = convert::<_, P::Data>(projected.len() as f64);
        let centroid = projected.iter().fold(Vector3::zeros(), |acc, v| acc + v) / num;
        let cov = projected.iter().fold(Matrix3::zeros(), |acc, v| {
            let d = v - centroid;
            acc + d * d.transpose()
        });

        let eigen = cov.symmetric_eigen();
        let mut order = [0, 1, 2];
        order.sort_by(|&a, &b| {
            { eigen.eigenvalues[b].partial_cmp(&eigen.eigenvalues[a]) }.unwrap_or(Ordering::Equal)
        });

        Some(PrincipalCurvatures {
            direction: eigen.eigenvectors.column(order[0]).into_owned(),
            pc1: eigen.eigenvalues[order[0]] / num,
            pc2: eigen.eigenvalues[order[1]] / num,
        })
    }
}
