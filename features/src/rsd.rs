use nalgebra::{convert, ComplexField, DMatrix, RealField};
use num::{One, ToPrimitive, Zero};
use pcf_common::{
    error::{Error, Result},
    feature::{Feature, Neighborhood},
    point::{Data, Normal, Point},
    point_cloud::PointCloud,
};

use crate::{check_len, nan, to_f64};

/// The smallest and largest radius of curvature around a point.
#[derive(Debug, Clone, PartialEq)]
pub struct PrincipalRadii<T: RealField> {
    pub r_min: T,
    pub r_max: T,
    /// Neighbor counts by distance bin (rows) and normal angle bin
    /// (columns), if requested.
    pub histogram: Option<DMatrix<T>>,
}

impl<T: RealField> Data for PrincipalRadii<T> {
    fn is_finite(&self) -> bool {
        self.r_min.is_finite() && self.r_max.is_finite()
    }
}

/// Radius-based surface descriptor: fits the radii of the circles that best
/// explain how fast neighbor normals turn away from the query normal with
/// distance.
///
/// Flat regions saturate at `plane_radius`.
#[derive(Debug, Clone, PartialEq)]
pub struct RsdEstimation<'a, N: Normal> {
    pub nr_subdivisions: usize,
    pub plane_radius: N::Data,
    pub save_histograms: bool,
    pub normals: Option<&'a PointCloud<N>>,
}

impl<'a, N: Normal> RsdEstimation<'a, N> {
    pub fn new(nr_subdivisions: usize, plane_radius: N::Data) -> Self {
        RsdEstimation {
            nr_subdivisions,
            plane_radius,
            save_histograms: false,
            normals: None,
        }
    }

    pub fn with_normals(mut self, normals: &'a PointCloud<N>) -> Self {
        self.normals = Some(normals);
        self
    }

    pub fn with_save_histograms(mut self, save_histograms: bool) -> Self {
        self.save_histograms = save_histograms;
        self
    }
}

impl<'a, N: Normal> Default for RsdEstimation<'a, N> {
    fn default() -> Self {
        Self::new(5, convert(0.2))
    }
}

/// Least-squares radius of the line `distance = radius * angle` through the
/// given `(angle, distance)` samples, saturating at `limit`.
fn fit_radius<T: RealField + Copy>(samples: impl Iterator<Item = (T, T)>, limit: T) -> T {
    let (aa, ad) = samples.fold((T::zero(), T::zero()), |(aa, ad), (angle, distance)| {
        (aa + angle * angle, ad + angle * distance)
    });
    if aa == T::zero() {
        limit
    } else {
        (ad / aa).min(limit)
    }
}

impl<'a, P, N> Feature<P> for RsdEstimation<'a, N>
where
    P: Point,
    N: Normal<Data = P::Data>,
{
    const NAME: &'static str = "RsdEstimation";

    type Output = PrincipalRadii<P::Data>;
    type Scratch = Vec<Option<(P::Data, P::Data)>>;

    fn check(&self, surface: &PointCloud<P>, radius: Option<P::Data>) -> Result<()> {
        if self.nr_subdivisions == 0 {
            return Err(Error::InvalidParameter("RSD needs at least 1 subdivision".into()));
        }
        if !(self.plane_radius > P::Data::zero()) {
            return Err(Error::InvalidParameter(format!(
                "plane radius {} is not positive",
                to_f64(self.plane_radius)
            )));
        }
        if radius.is_none() {
            return Err(Error::InvalidParameter("RSD needs a radius search".into()));
        }
        let normals = { self.normals }.ok_or(Error::MissingNormals(<Self as Feature<P>>::NAME))?;
        check_len("normals", surface.len(), normals.len())
    }

    fn invalid(&self) -> PrincipalRadii<P::Data> {
        PrincipalRadii {
            r_min: nan(),
            r_max: nan(),
            histogram: None,
        }
    }

    fn compute_point(
        &self,
        n: &Neighborhood<P>,
        angles: &mut Vec<Option<(P::Data, P::Data)>>,
    ) -> Option<PrincipalRadii<P::Data>> {
        let normals = self.normals?;
        if n.len() < 2 {
            return None;
        }
        let reference = n.pivot_index?;
        let normal = normals[reference].normal().xyz();
        let max_distance = n.radius()?;

        let nr = self.nr_subdivisions;
        let real = |v: f64| convert::<_, P::Data>(v);
        let (zero, one) = (P::Data::zero(), P::Data::one());

        // The reference point itself opens the first distance bin.
        angles.clear();
        angles.resize(nr, None);
        angles[0] = Some((zero, zero));
        let mut histogram = self.save_histograms.then(|| DMatrix::zeros(nr, nr));

        for &(index, distance) in n.neighbors {
            if index == reference {
                continue;
            }
            let cos = normals[index].normal().xyz().dot(&normal);
            let angle = cos.clamp(-one, one).acos();
            if !angle.is_finite() {
                continue;
            }
            let angle = if angle > P::Data::frac_pi_2() {
                P::Data::pi() - angle
            } else {
                angle
            };

            let distance = distance.sqrt();
            let bin_d = { distance / max_distance * real(nr as f64) }.to_usize().unwrap_or(0).min(nr - 1);
            angles[bin_d] = Some(match angles[bin_d] {
                Some((min, max)) => (min.min(angle), max.max(angle)),
                None => (angle, angle),
            });

            if let Some(histogram) = &mut histogram {
                let bin_a = { angle / P::Data::frac_pi_2() * real(nr as f64) }.to_usize().unwrap_or(0).min(nr - 1);
                histogram[(bin_d, bin_a)] += one;
            }
        }

        let bin_size = max_distance / real(nr as f64);
        let angles = &*angles;
        let samples = move || {
            { angles.iter().enumerate() }.filter_map(move |(bin, range)| {
                range.map(|range| (range, (real(bin as f64) + real(0.5)) * bin_size))
            })
        };
        let min_radius = fit_radius(samples().map(|((min, _), d)| (min, d)), self.plane_radius);
        let max_radius = fit_radius(samples().map(|((_, max), d)| (max, d)), self.plane_radius);

        // Corrects the systematic error of the fit at 5 subdivisions.
        let (a, b) = (min_radius * real(1.1), max_radius * real(0.9));
        Some(PrincipalRadii {
            r_min: a.min(b),
            r_max: a.max(b),
            histogram,
        })
    }
}
