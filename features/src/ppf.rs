use nalgebra::{RealField, Rotation3, Vector3};
use pcf_common::{
    error::{Error, Result},
    feature::{Feature, Neighborhood},
    point::{Data, Normal, Point},
    point_cloud::PointCloud,
};

use crate::{check_len, compute_pair_features, nan, Estimation};

/// A point pair feature: the pair features of a reference point and a
/// model point, plus the angle that aligns the model point after moving the
/// reference onto the origin with its normal along x.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ppf<T> {
    pub f1: T,
    pub f2: T,
    pub f3: T,
    pub f4: T,
    pub alpha_m: T,
}

impl<T: RealField> Ppf<T> {
    fn nan() -> Self {
        Ppf {
            f1: nan(),
            f2: nan(),
            f3: nan(),
            f4: nan(),
            alpha_m: nan(),
        }
    }
}

impl<T: RealField> Data for Ppf<T> {
    fn is_finite(&self) -> bool {
        [&self.f1, &self.f2, &self.f3, &self.f4, &self.alpha_m]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Point pair features of every processed point against every surface
/// point.
#[derive(Debug, Clone, PartialEq)]
pub struct PpfEstimation<'a, N> {
    pub normals: Option<&'a PointCloud<N>>,
}

impl<'a, N> PpfEstimation<'a, N> {
    pub fn new() -> Self {
        PpfEstimation { normals: None }
    }

    pub fn with_normals(mut self, normals: &'a PointCloud<N>) -> Self {
        self.normals = Some(normals);
        self
    }
}

impl<'a, N> Default for PpfEstimation<'a, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, N: Normal> PpfEstimation<'a, N> {
    /// Computes the pairs of `estimation` as one cloud with a row of
    /// `surface.len()` records per processed point.
    pub fn compute_pairs<P>(&self, estimation: &Estimation<P>) -> Result<PointCloud<Ppf<N::Data>>>
    where
        P: Point<Data = N::Data>,
    {
        let rows = estimation.compute(self)?;
        let width = estimation.search_surface().map_or(0, |surface| surface.len());

        let mut storage = Vec::with_capacity(rows.len() * width);
        for row in rows.into_vec() {
            if row.len() == width {
                storage.extend(row);
            } else {
                storage.extend(std::iter::repeat(Ppf::nan()).take(width));
            }
        }
        Ok(PointCloud::from_vec(storage, width))
    }
}

/// The angle of `model` about the x axis once `reference` sits on the origin
/// with `normal` turned onto x.
fn alpha_m<T: RealField + Copy>(reference: &Vector3<T>, normal: &Vector3<T>, model: &Vector3<T>) -> T {
    let rotation = Rotation3::rotation_between(normal, &Vector3::x())
        .unwrap_or_else(|| Rotation3::from_axis_angle(&Vector3::y_axis(), T::pi()));
    let moved = rotation * (model - reference);

    let angle = (-moved.z).atan2(moved.y);
    if angle.sin() * moved.z < T::zero() {
        angle
    } else {
        -angle
    }
}

impl<'a, P, N> Feature<P> for PpfEstimation<'a, N>
where
    P: Point,
    N: Normal<Data = P::Data>,
{
    const NAME: &'static str = "PpfEstimation";
    const NEEDS_SEARCH: bool = false;

    /// One record per surface point.
    type Output = Vec<Ppf<P::Data>>;
    type Scratch = ();

    fn check(&self, surface: &PointCloud<P>, _: Option<P::Data>) -> Result<()> {
        let normals = { self.normals }.ok_or(Error::MissingNormals(<Self as Feature<P>>::NAME))?;
        check_len("normals", surface.len(), normals.len())
    }

    fn invalid(&self) -> Vec<Ppf<P::Data>> {
        Vec::new()
    }

    fn compute_point(&self, n: &Neighborhood<P>, _: &mut ()) -> Option<Vec<Ppf<P::Data>>> {
        let normals = self.normals?;
        let i = n.pivot_index?;
        let (p1, n1) = (n.surface[i].xyz(), normals[i].normal().xyz());

        let row = { n.surface.iter().zip(normals.iter()).enumerate() }
            .map(|(j, (point, normal))| {
                if j == i {
                    return Ppf::nan();
                }
                let (p2, n2) = (point.xyz(), normal.normal().xyz());
                match compute_pair_features([&p1, &n1], [&p2, &n2]) {
                    Some(pair) => Ppf {
                        f1: pair.theta,
                        f2: pair.alpha,
                        f3: pair.phi,
                        f4: pair.distance,
                        alpha_m: alpha_m(&p1, &n1, &p2),
                    },
                    None => Ppf::nan(),
                }
            })
            .collect();
        Some(row)
    }
}
