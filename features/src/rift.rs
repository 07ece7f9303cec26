use nalgebra::{convert, ComplexField, DVector, RealField, Vector3};
use num::{One, Zero};
use pcf_common::{
    error::{Error, Result},
    feature::{Feature, Neighborhood},
    point::Point,
    point_cloud::PointCloud,
};

use crate::{check_len, epsilon, nan, to_f64};

/// Rotation invariant feature transform: a histogram of the neighbors'
/// distance against the angle between their intensity gradient and the
/// outward radial direction, weighted by gradient magnitude.
///
/// The record is laid out gradient-major, `gradient * distance_bins +
/// distance`, and L2-normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct RiftEstimation<'a, T> {
    pub distance_bins: usize,
    pub gradient_bins: usize,
    pub gradients: Option<&'a PointCloud<Vector3<T>>>,
}

impl<'a, T> RiftEstimation<'a, T> {
    pub fn new(distance_bins: usize, gradient_bins: usize) -> Self {
        RiftEstimation {
            distance_bins,
            gradient_bins,
            gradients: None,
        }
    }

    pub fn with_gradients(mut self, gradients: &'a PointCloud<Vector3<T>>) -> Self {
        self.gradients = Some(gradients);
        self
    }
}

impl<'a, T> Default for RiftEstimation<'a, T> {
    fn default() -> Self {
        Self::new(4, 8)
    }
}

impl<'a, P: Point> Feature<P> for RiftEstimation<'a, P::Data> {
    const NAME: &'static str = "RiftEstimation";

    type Output = DVector<P::Data>;
    type Scratch = ();

    fn check(&self, surface: &PointCloud<P>, radius: Option<P::Data>) -> Result<()> {
        if self.distance_bins == 0 || self.gradient_bins == 0 {
            return Err(Error::InvalidParameter(format!(
                "RIFT needs at least 1 bin per axis, got {}x{}",
                self.distance_bins, self.gradient_bins
            )));
        }
        if radius.is_none() {
            return Err(Error::InvalidParameter("RIFT needs a radius search".into()));
        }
        let gradients = { self.gradients }.ok_or(Error::MissingGradients(<Self as Feature<P>>::NAME))?;
        check_len("gradients", surface.len(), gradients.len())
    }

    fn invalid(&self) -> DVector<P::Data> {
        DVector::repeat(self.distance_bins * self.gradient_bins, nan())
    }

    fn compute_point(&self, n: &Neighborhood<P>, _: &mut ()) -> Option<DVector<P::Data>> {
        let gradients = self.gradients?;
        let radius = n.radius()? + epsilon::<P::Data>();
        let (nd, ng) = (self.distance_bins, self.gradient_bins);
        let real = |v: f64| convert::<_, P::Data>(v);
        let pivot = n.pivot.xyz();

        let mut histogram = DVector::zeros(nd * ng);
        for &(index, distance) in n.neighbors {
            let gradient = &gradients[index];
            let magnitude = gradient.norm();

            let direction = (n.surface[index].xyz() - pivot).normalize();
            let cos = gradient.dot(&direction) / magnitude;
            let angle = cos.clamp(-P::Data::one(), P::Data::one()).acos();
            let angle = if angle.is_finite() { angle } else { P::Data::zero() };

            let d = real(nd as f64) * distance.sqrt() / radius;
            let g = real(ng as f64) * angle / (P::Data::pi() + epsilon::<P::Data>());
            let (df, gf) = (to_f64(d), to_f64(g));

            let d_range = (df - 1.).ceil().max(0.) as usize..=((df + 1.).floor() as usize).min(nd - 1);
            for di in d_range {
                let dw = P::Data::one() - (d - real(di as f64)).abs();
                for gi in (gf - 1.).ceil() as isize..=(gf + 1.).floor() as isize {
                    let gw = P::Data::one() - (g - real(gi as f64)).abs();
                    let wrapped = gi.rem_euclid(ng as isize) as usize;
                    histogram[wrapped * nd + di] += dw * gw * magnitude;
                }
            }
        }

        let norm = histogram.norm();
        if norm > P::Data::zero() {
            histogram /= norm;
        }
        Some(histogram)
    }
}
