use std::ops::RangeInclusive;

use nalgebra::{convert, ComplexField, DVector, Matrix3, RealField, Vector3};
use num::{One, ToPrimitive, Zero};
use pcf_common::{
    error::{Error, Result},
    feature::{Feature, Neighborhood},
    point::{Normal, PointIntensity},
    point_cloud::PointCloud,
};

use crate::{bin, check_len, epsilon, nan, to_f64};

/// The intensity gradient of every point, fitted over its neighborhood by
/// least squares and projected onto the tangent plane of its normal.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityGradientEstimation<'a, N> {
    pub normals: Option<&'a PointCloud<N>>,
}

impl<'a, N> IntensityGradientEstimation<'a, N> {
    pub fn new() -> Self {
        IntensityGradientEstimation { normals: None }
    }

    pub fn with_normals(mut self, normals: &'a PointCloud<N>) -> Self {
        self.normals = Some(normals);
        self
    }
}

impl<'a, N> Default for IntensityGradientEstimation<'a, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Solves `A x = b` through the eigen decomposition of the symmetric `A`,
/// dropping the directions whose eigenvalue vanishes relative to the
/// largest.
fn pseudo_solve<T: RealField + Copy>(a: Matrix3<T>, b: &Vector3<T>) -> Vector3<T> {
    let eigen = a.symmetric_eigen();
    let max = eigen.eigenvalues.iter().fold(T::zero(), |acc, &v| acc.max(v));
    let threshold = max * T::default_epsilon();

    let mut x = Vector3::zeros();
    for (i, &value) in eigen.eigenvalues.iter().enumerate() {
        if value > threshold {
            let v = eigen.eigenvectors.column(i);
            x += v * (v.dot(b) / value);
        }
    }
    x
}

impl<'a, P, N> Feature<P> for IntensityGradientEstimation<'a, N>
where
    P: PointIntensity,
    N: Normal<Data = P::Data>,
{
    const NAME: &'static str = "IntensityGradientEstimation";

    type Output = Vector3<P::Data>;
    type Scratch = ();

    fn check(&self, surface: &PointCloud<P>, _: Option<P::Data>) -> Result<()> {
        let normals = { self.normals }.ok_or(Error::MissingNormals(<Self as Feature<P>>::NAME))?;
        check_len("normals", surface.len(), normals.len())
    }

    fn invalid(&self) -> Vector3<P::Data> {
        Vector3::repeat(nan())
    }

    fn compute_point(&self, n: &Neighborhood<P>, _: &mut ()) -> Option<Vector3<P::Data>> {
        let normals = self.normals?;
        if n.len() < 3 {
            return None;
        }
        let normal = normals[n.pivot_index?].normal().xyz();
        if !normal.iter().all(|v| v.is_finite()) {
            return None;
        }

        let count: P::Data = convert(n.len() as f64);
        let (sum, intensity) = n.indices().map(|i| &n.surface[i]).fold(
            (Vector3::zeros(), P::Data::zero()),
            |(sum, intensity), p| (sum + p.xyz(), intensity + p.intensity()),
        );
        let (centroid, intensity) = (sum / count, intensity / count);

        let mut a = Matrix3::zeros();
        let mut b = Vector3::zeros();
        for p in n.indices().map(|i| &n.surface[i]) {
            let delta = p.xyz() - centroid;
            a += delta * delta.transpose();
            b += delta * (p.intensity() - intensity);
        }

        let gradient = pseudo_solve(a, &b);
        Some(gradient - normal * normal.dot(&gradient))
    }
}

/// Intensity-domain spin images: a soft 2-D histogram of the neighbors'
/// distance to the query point against their normalized intensity.
///
/// The record is laid out distance-major, `distance * intensity_bins +
/// intensity`.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensitySpinEstimation<T> {
    pub distance_bins: usize,
    pub intensity_bins: usize,
    /// The standard deviation of the Gaussian spread of every neighbor, in
    /// bins; 0 bins every neighbor into a single cell.
    pub sigma: T,
}

impl<T> IntensitySpinEstimation<T> {
    pub fn new(distance_bins: usize, intensity_bins: usize, sigma: T) -> Self {
        IntensitySpinEstimation {
            distance_bins,
            intensity_bins,
            sigma,
        }
    }
}

impl<T: RealField> Default for IntensitySpinEstimation<T> {
    fn default() -> Self {
        Self::new(4, 16, T::one())
    }
}

/// The bin range of `value` under a spread of `extent` bins, clipped to
/// `bins`.
fn window<T: RealField + ToPrimitive + Copy>(value: T, extent: T, bins: usize) -> RangeInclusive<usize> {
    let start = (value - extent).floor().to_usize().unwrap_or(0);
    let end = (value + extent).ceil().to_usize().unwrap_or(0).min(bins - 1);
    start..=end
}

impl<P: PointIntensity> Feature<P> for IntensitySpinEstimation<P::Data> {
    const NAME: &'static str = "IntensitySpinEstimation";

    type Output = DVector<P::Data>;
    type Scratch = ();

    fn check(&self, _: &PointCloud<P>, radius: Option<P::Data>) -> Result<()> {
        if self.distance_bins == 0 || self.intensity_bins == 0 {
            return Err(Error::InvalidParameter(format!(
                "intensity spin images need at least 1 bin per axis, got {}x{}",
                self.distance_bins, self.intensity_bins
            )));
        }
        if !(self.sigma >= P::Data::zero()) {
            return Err(Error::InvalidParameter(format!(
                "negative spread {}",
                to_f64(self.sigma)
            )));
        }
        match radius {
            Some(_) => Ok(()),
            None => Err(Error::InvalidParameter(
                "intensity spin images need a radius search".into(),
            )),
        }
    }

    fn invalid(&self) -> DVector<P::Data> {
        DVector::repeat(self.distance_bins * self.intensity_bins, nan())
    }

    fn compute_point(&self, n: &Neighborhood<P>, _: &mut ()) -> Option<DVector<P::Data>> {
        let radius = n.radius()? + epsilon::<P::Data>();
        let (nd, ni) = (self.distance_bins, self.intensity_bins);

        let mut intensities = n.indices().map(|i| n.surface[i].intensity());
        let first = intensities.next()?;
        let (min, max) = intensities.fold((first, first), |(min, max), v| (min.min(v), max.max(v)));
        let range = max - min + epsilon::<P::Data>();

        let mut histogram = DVector::zeros(nd * ni);
        if self.sigma == P::Data::zero() {
            for &(index, distance) in n.neighbors {
                let d = bin(distance.sqrt() / radius, nd);
                let i = bin((n.surface[index].intensity() - min) / range, ni);
                histogram[d * ni + i] += P::Data::one();
            }
            return Some(histogram);
        }

        let real = |v: usize| convert::<_, P::Data>(v as f64);
        let extent = self.sigma * convert::<_, P::Data>(3.);
        let factor = (self.sigma * self.sigma * convert::<_, P::Data>(2.)).recip();
        for &(index, distance) in n.neighbors {
            let d = distance.sqrt() / radius * real(nd);
            let i = (n.surface[index].intensity() - min) / range * real(ni);

            for di in window(d, extent, nd) {
                let dd = d - real(di);
                for ii in window(i, extent, ni) {
                    let id = i - real(ii);
                    histogram[di * ni + ii] += (-(dd * dd + id * id) * factor).exp();
                }
            }
        }
        Some(histogram)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use pcf_common::point::{Normal3, Point3I};
    use pcf_search::KdTreeSearch;

    use super::*;
    use crate::{Estimation, NormalEstimation};

    /// A cap of the sphere of radius 20 over the integer grid, carrying two
    /// Gaussian intensity blobs.
    fn intensity_cap() -> PointCloud<Point3I> {
        (-10..=10)
            .flat_map(|x| (-10..=10).map(move |y| (x as f32, y as f32)))
            .map(|(x, y)| {
                let z = (400. - x * x - y * y).sqrt();
                let intensity = (-((x - 3.).powi(2) + (y + 2.).powi(2)) / 50.).exp()
                    + (-((x + 5.).powi(2) + (y - 5.).powi(2)) / 8.).exp();
                Point3I::new(x, y, z, intensity)
            })
            .collect()
    }

    #[test]
    fn test_pseudo_solve() {
        let a = Matrix3::new(2., 0., 0., 0., 4., 0., 0., 0., 0.);
        let x = pseudo_solve(a, &Vector3::new(2., 2., 5.));
        assert_abs_diff_eq!(x, Vector3::new(1., 0.5, 0.), epsilon = 1e-12);
    }

    #[test]
    fn test_gradient_of_quadratic_field() {
        let mut points = Vec::new();
        let mut x = -5.0f32;
        while x <= 5. {
            let mut y = -5.0f32;
            while y <= 5. {
                let (xf, yf) = (x as f64, y as f64);
                let z = (0.1 * xf.powi(2) + 0.5 * yf + 1.) as f32;
                let intensity = (0.1 * xf.powi(3) + 0.2 * yf.powi(2) + z as f64 + 20000.) as f32;
                points.push(Point3I::new(x, y, z, intensity));
                y += 0.1;
            }
            x += 0.1;
        }
        let cloud = PointCloud::from_iter(points);

        let search = KdTreeSearch;
        let estimation = Estimation::new()
            .with_input(&cloud)
            .with_search_method(&search)
            .with_radius_search(0.25);
        let normals = estimation
            .compute(&NormalEstimation::<Normal3>::default())
            .unwrap();
        let gradients = estimation
            .compute(&IntensityGradientEstimation::new().with_normals(&normals))
            .unwrap();

        for (p, gradient) in cloud.iter().zip(gradients.iter()) {
            let normal = Vector3::new(-0.2 * p.coords.x, -0.5, 1.).normalize();
            let raw = Vector3::new(0.3 * p.coords.x.powi(2), 0.4 * p.coords.y, 1.);
            let expected = raw - normal * normal.dot(&raw);
            assert_abs_diff_eq!(*gradient, expected, epsilon = 0.11);
        }
    }

    #[test]
    fn test_gradient_needs_normals() {
        let cloud = intensity_cap();
        let search = KdTreeSearch;
        let result = Estimation::new()
            .with_input(&cloud)
            .with_search_method(&search)
            .with_k_search(5)
            .compute(&IntensityGradientEstimation::<Normal3>::new());
        assert!(matches!(result, Err(Error::MissingNormals(_))));
    }

    #[test]
    fn test_intensity_spin() {
        let cloud = intensity_cap();
        let search = KdTreeSearch;
        let output = Estimation::new()
            .with_input(&cloud)
            .with_search_method(&search)
            .with_radius_search(10.)
            .with_indices(vec![220])
            .compute(&IntensitySpinEstimation::new(4, 5, 1.))
            .unwrap();

        let expected = [
            2.4387, 9.4737, 21.3232, 28.3025, 22.5639, //
            13.2426, 35.7026, 60.0755, 66.9240, 50.4225, //
            42.7086, 83.5818, 105.4513, 97.8454, 67.3801, //
            75.7127, 119.4726, 120.9649, 93.4829, 55.4045,
        ];
        assert_eq!(output[0].len(), expected.len());
        for (&value, &expected) in output[0].iter().zip(expected.iter()) {
            assert_abs_diff_eq!(value, expected, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_hard_binning_counts_neighbors() {
        let cloud = intensity_cap();
        let search = KdTreeSearch;
        let estimation = Estimation::new()
            .with_input(&cloud)
            .with_search_method(&search)
            .with_radius_search(5.)
            .with_indices(vec![0, 220, 440]);
        let output = estimation
            .compute(&IntensitySpinEstimation::new(3, 4, 0.))
            .unwrap();
        assert_eq!(output.len(), 3);
        for (record, &index) in output.iter().zip([0usize, 220, 440].iter()) {
            let pivot = cloud[index].coords;
            let inside = { cloud.iter() }
                .filter(|p| (p.coords - pivot).norm_squared() <= 25.)
                .count();
            assert_eq!(record.sum(), inside as f32);
        }
    }

    #[test]
    fn test_requires_radius() {
        let cloud = intensity_cap();
        let search = KdTreeSearch;
        let result = Estimation::new()
            .with_input(&cloud)
            .with_search_method(&search)
            .with_k_search(5)
            .compute(&IntensitySpinEstimation::default());
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }
}
