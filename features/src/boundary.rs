use std::cmp::Ordering;

use nalgebra::{ComplexField, RealField, Vector3};
use pcf_common::{
    error::{Error, Result},
    feature::{Feature, Neighborhood},
    normal::unit_orthogonal,
    point::{Normal, Point},
    point_cloud::PointCloud,
};

use crate::check_len;

/// Marks points whose neighbors leave an angular gap wider than
/// `angle_threshold` around the normal.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryEstimation<'a, N: Normal> {
    pub angle_threshold: N::Data,
    pub normals: Option<&'a PointCloud<N>>,
}

impl<'a, N: Normal> BoundaryEstimation<'a, N> {
    pub fn new(angle_threshold: N::Data) -> Self {
        BoundaryEstimation {
            angle_threshold,
            normals: None,
        }
    }

    pub fn with_normals(mut self, normals: &'a PointCloud<N>) -> Self {
        self.normals = Some(normals);
        self
    }
}

impl<'a, N: Normal> Default for BoundaryEstimation<'a, N> {
    fn default() -> Self {
        Self::new(N::Data::frac_pi_2())
    }
}

/// The largest angle between consecutive directions of `deltas` in the plane
/// spanned by `u` and `v`, wrapping around at `2π`.
fn max_angle_gap<T: RealField + Copy>(
    deltas: impl Iterator<Item = Vector3<T>>,
    [u, v]: &[Vector3<T>; 2],
) -> Option<T> {
    let mut angles = { deltas.filter(|delta| *delta != Vector3::zeros()) }
        .map(|delta| v.dot(&delta).atan2(u.dot(&delta)))
        .collect::<Vec<_>>();
    if angles.is_empty() {
        return None;
    }
    angles.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let gap = { angles.windows(2) }.fold(T::zero(), |acc, w| (w[1] - w[0]).max(acc));
    let (first, last) = (angles[0], angles[angles.len() - 1]);
    Some(gap.max(T::two_pi() - last + first))
}

impl<'a, P, N> Feature<P> for BoundaryEstimation<'a, N>
where
    P: Point,
    N: Normal<Data = P::Data>,
{
    const NAME: &'static str = "BoundaryEstimation";

    type Output = bool;
    type Scratch = ();

    fn check(&self, surface: &PointCloud<P>, _: Option<P::Data>) -> Result<()> {
        let normals = self.normals.ok_or(Error::MissingNormals(
            <Self as Feature<P>>::NAME,
        ))?;
        check_len("normals", surface.len(), normals.len())
    }

    fn invalid(&self) -> bool {
        false
    }

    fn compute_point(&self, n: &Neighborhood<P>, _: &mut ()) -> Option<bool> {
        let normals = self.normals?;
        if n.len() < 3 {
            return None;
        }
        let normal = normals[n.pivot_index?].normal().xyz();
        if !normal.iter().all(|v| v.is_finite()) {
            return None;
        }

        let u = unit_orthogonal(&normal);
        let v = normal.cross(&u);
        let pivot = n.pivot.xyz();
        let deltas = n.indices().map(|i| n.surface[i].xyz() - pivot);
        let gap = max_angle_gap(deltas, &[u, v])?;
        Some(gap > self.angle_threshold)
    }
}
