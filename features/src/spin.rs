use nalgebra::{convert, ComplexField, DMatrix, DVector, RealField, Vector3};
use num::{One, ToPrimitive, Zero};
use pcf_common::{
    error::{Error, Result},
    feature::{Feature, Neighborhood},
    point::{Normal, Point},
    point_cloud::PointCloud,
};

use crate::{check_len, nan, to_f64};

bitflags::bitflags! {
    /// Selects the grid topology and the accumulated quantity of a spin
    /// image.
    #[derive(Default)]
    pub struct SpinImageFlags: u8 {
        /// Bins by (distance, elevation angle) instead of the (radial,
        /// axial) distances of a cylinder.
        const RADIAL =  0b01;
        /// Averages the angle between normals instead of counting points.
        const ANGULAR = 0b10;
    }
}

/// Spin images: a 2-D histogram of the neighbors in the cylindrical (or
/// spherical) frame around a rotation axis through the query point.
///
/// The record holds `image_width + 1` rows of `2 * image_width + 1`
/// columns, row by row. Rows step away from the axis; columns step along it,
/// the middle one lying in the tangent plane.
#[derive(Debug, Clone, PartialEq)]
pub struct SpinImageEstimation<'a, N: Normal> {
    pub image_width: usize,
    /// Neighbors whose normal makes a larger angle with the query normal are
    /// skipped; 0 keeps every neighbor.
    pub support_angle_cos: N::Data,
    /// Queries with fewer neighbors produce the invalid record.
    pub min_neighbors: usize,
    pub flags: SpinImageFlags,
    /// A fixed rotation axis; the query normal when `None`.
    pub rotation_axis: Option<Vector3<N::Data>>,
    pub normals: Option<&'a PointCloud<N>>,
}

impl<'a, N: Normal> SpinImageEstimation<'a, N> {
    pub fn new(image_width: usize, support_angle_cos: N::Data, min_neighbors: usize) -> Self {
        SpinImageEstimation {
            image_width,
            support_angle_cos,
            min_neighbors,
            flags: SpinImageFlags::empty(),
            rotation_axis: None,
            normals: None,
        }
    }

    pub fn with_normals(mut self, normals: &'a PointCloud<N>) -> Self {
        self.normals = Some(normals);
        self
    }

    pub fn with_flags(mut self, flags: SpinImageFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Spins around `axis`, scaled to unit length.
    pub fn with_rotation_axis(mut self, axis: Vector3<N::Data>) -> Self {
        self.rotation_axis = Some(axis.normalize());
        self
    }

    fn len(&self) -> usize {
        (self.image_width + 1) * (2 * self.image_width + 1)
    }
}

impl<'a, N: Normal> Default for SpinImageEstimation<'a, N> {
    fn default() -> Self {
        Self::new(8, N::Data::zero(), 16)
    }
}

/// Whether `cos`, a dot product of unit vectors, is plausible, tolerating
/// single-precision rounding.
fn unit_cos<T: RealField + Copy>(cos: T) -> Option<T> {
    let limit = convert::<_, T>(1. + 10. * f32::EPSILON as f64);
    (cos.abs() <= limit).then(|| cos.clamp(-T::one(), T::one()))
}

impl<'a, P, N> Feature<P> for SpinImageEstimation<'a, N>
where
    P: Point,
    N: Normal<Data = P::Data>,
{
    const NAME: &'static str = "SpinImageEstimation";

    type Output = DVector<P::Data>;
    type Scratch = ();

    fn check(&self, surface: &PointCloud<P>, radius: Option<P::Data>) -> Result<()> {
        if self.image_width == 0 {
            return Err(Error::InvalidParameter("spin images need a positive width".into()));
        }
        if !(self.support_angle_cos >= P::Data::zero() && self.support_angle_cos <= P::Data::one()) {
            return Err(Error::InvalidParameter(format!(
                "support angle cosine {} out of [0, 1]",
                to_f64(self.support_angle_cos)
            )));
        }
        if let Some(axis) = self.rotation_axis {
            let norm = axis.norm();
            if !(norm.is_finite() && (norm - P::Data::one()).abs() <= convert(1e-3)) {
                return Err(Error::InvalidParameter(format!(
                    "rotation axis of length {} is not a unit vector",
                    to_f64(norm)
                )));
            }
        }
        if radius.is_none() {
            return Err(Error::InvalidParameter("spin images need a radius search".into()));
        }
        let normals = { self.normals }.ok_or(Error::MissingNormals(<Self as Feature<P>>::NAME))?;
        check_len("normals", surface.len(), normals.len())
    }

    fn invalid(&self) -> DVector<P::Data> {
        DVector::repeat(self.len(), nan())
    }

    fn compute_point(&self, n: &Neighborhood<P>, _: &mut ()) -> Option<DVector<P::Data>> {
        let normals = self.normals?;
        if n.len() < self.min_neighbors {
            return None;
        }
        let w = self.image_width;
        let radial = self.flags.contains(SpinImageFlags::RADIAL);
        let angular = self.flags.contains(SpinImageFlags::ANGULAR);
        let uses_normals = angular || self.support_angle_cos > P::Data::zero();

        let origin_normal = { n.pivot_index.map(|i| normals[i].normal().xyz()) }
            .filter(|normal| normal.iter().all(|v| v.is_finite()));
        let axis = self.rotation_axis.or(origin_normal)?;
        if uses_normals && origin_normal.is_none() {
            return None;
        }

        let real = |v: f64| convert::<_, P::Data>(v);
        let radius = n.radius()?;
        let bin_size = if radial {
            radius / real(w as f64)
        } else {
            radius / real(w as f64) / real(2.).sqrt()
        };
        let extent = bin_size * real(w as f64);
        let beta_bin_size = if radial {
            P::Data::frac_pi_2() / real(w as f64)
        } else {
            bin_size
        };

        let mut counts = DMatrix::<P::Data>::zeros(w + 1, 2 * w + 1);
        let mut angles = DMatrix::<P::Data>::zeros(w + 1, 2 * w + 1);
        let pivot = n.pivot.xyz();
        for &(index, _) in n.neighbors {
            let mut between = P::Data::zero();
            if let (true, Some(origin)) = (uses_normals, origin_normal) {
                let normal = normals[index].normal().xyz();
                if !normal.iter().all(|v| v.is_finite()) {
                    continue;
                }
                let cos = unit_cos(origin.dot(&normal))?;
                if cos.abs() < self.support_angle_cos {
                    continue;
                }
                between = cos.abs().acos();
            }

            let direction = n.surface[index].xyz() - pivot;
            let norm = direction.norm();
            if norm < real(10. * f64::EPSILON) {
                continue;
            }
            let cos_axis = unit_cos(direction.dot(&axis) / norm)?;

            let (mut alpha, mut beta) = if radial {
                (norm, cos_axis.asin())
            } else {
                let beta = norm * cos_axis;
                let alpha = norm * (P::Data::one() - cos_axis * cos_axis).sqrt();
                if beta.abs() >= extent || alpha >= extent {
                    continue;
                }
                (alpha, beta)
            };

            let mut alpha_bin = (alpha / bin_size).floor().to_usize().unwrap_or(0).min(w);
            let beta_index = (beta / beta_bin_size).floor().to_isize().unwrap_or(0) + w as isize;
            let mut beta_bin = beta_index.clamp(0, 2 * w as isize) as usize;
            if alpha_bin == w {
                alpha_bin -= 1;
                alpha = bin_size * real(w as f64);
            }
            if beta_bin == 2 * w {
                beta_bin -= 1;
                beta = beta_bin_size * real(w as f64);
            }

            let a = alpha / bin_size - real(alpha_bin as f64);
            let b = beta / beta_bin_size - (real(beta_bin as f64) - real(w as f64));
            let one = P::Data::one();
            let corners = [
                (alpha_bin, beta_bin, (one - a) * (one - b)),
                (alpha_bin + 1, beta_bin, a * (one - b)),
                (alpha_bin, beta_bin + 1, (one - a) * b),
                (alpha_bin + 1, beta_bin + 1, a * b),
            ];
            for (row, col, weight) in corners {
                counts[(row, col)] += weight;
                if angular {
                    angles[(row, col)] += weight * between;
                }
            }
        }

        let image = if angular {
            let eps = real(f64::EPSILON);
            angles.zip_map(&counts, |angle, count| angle / (count + eps))
        } else {
            let sum = counts.sum();
            if n.len() > 1 && sum > P::Data::zero() {
                counts / sum
            } else {
                counts
            }
        };
        Some(DVector::from_iterator(self.len(), image.transpose().iter().copied()))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use pcf_common::point::{Normal3, Point3};
    use pcf_search::KdTreeSearch;

    use super::*;
    use crate::Estimation;

    fn plane() -> (PointCloud<Point3>, PointCloud<Normal3>) {
        let cloud = (0..15)
            .flat_map(|x| (0..15).map(move |y| Point3::new(x as f32 * 0.1, y as f32 * 0.1, 0.)))
            .collect::<PointCloud<_>>();
        let normals = PointCloud::from_vec(vec![Normal3::new(0., 0., 1., 0.); cloud.len()], cloud.len());
        (cloud, normals)
    }

    fn column(record: &DVector<f32>, width: usize, col: usize) -> f32 {
        (0..=width).map(|row| record[row * (2 * width + 1) + col]).sum()
    }

    #[test]
    fn test_plane_lies_in_middle_column() {
        let (cloud, normals) = plane();
        let search = KdTreeSearch;
        let estimation = Estimation::new()
            .with_input(&cloud)
            .with_search_method(&search)
            .with_radius_search(0.5)
            .with_indices(vec![112]);

        for flags in [SpinImageFlags::empty(), SpinImageFlags::RADIAL] {
            let spin = SpinImageEstimation::default()
                .with_normals(&normals)
                .with_flags(flags);
            let output = estimation.compute(&spin).unwrap();
            let record = &output[0];
            assert_eq!(record.len(), 9 * 17);
            assert_abs_diff_eq!(record.sum(), 1., epsilon = 1e-5);
            assert_abs_diff_eq!(column(record, 8, 8), 1., epsilon = 1e-5);
        }
    }

    #[test]
    fn test_angular_on_plane_is_zero() {
        let (cloud, normals) = plane();
        let search = KdTreeSearch;
        let output = Estimation::new()
            .with_input(&cloud)
            .with_search_method(&search)
            .with_radius_search(0.5)
            .with_indices(vec![112])
            .compute(
                &SpinImageEstimation::default()
                    .with_normals(&normals)
                    .with_flags(SpinImageFlags::ANGULAR),
            )
            .unwrap();
        assert!(output[0].iter().all(|&v| v == 0.));
    }

    #[test]
    fn test_support_angle_and_axis() {
        let (cloud, mut normals) = plane();
        // Tilt the normals of the upper half out of the support cone.
        for i in 0..cloud.len() {
            if cloud[i].coords.y > 0.75 {
                normals[i] = Normal3::new(1., 0., 0., 0.);
            }
        }
        let search = KdTreeSearch;
        let estimation = Estimation::new()
            .with_input(&cloud)
            .with_search_method(&search)
            .with_radius_search(0.5)
            .with_indices(vec![112]);

        let all = estimation
            .compute(&SpinImageEstimation::default().with_normals(&normals))
            .unwrap();
        let supported = estimation
            .compute(&SpinImageEstimation::new(8, 0.5, 16).with_normals(&normals))
            .unwrap();
        assert_ne!(all[0], supported[0]);
        assert_abs_diff_eq!(supported[0].sum(), 1., epsilon = 1e-5);

        // Spinning around an in-plane axis spreads the plane over the columns.
        let tilted = estimation
            .compute(
                &SpinImageEstimation::default()
                    .with_normals(&normals)
                    .with_rotation_axis(Vector3::x()),
            )
            .unwrap();
        assert!(column(&tilted[0], 8, 8) < 0.5);
    }

    #[test]
    fn test_neighbor_without_normal_is_skipped() {
        let (cloud, mut normals) = plane();
        normals[113] = Normal3::new(f32::NAN, f32::NAN, f32::NAN, f32::NAN);
        let search = KdTreeSearch;
        let output = Estimation::new()
            .with_input(&cloud)
            .with_search_method(&search)
            .with_radius_search(0.5)
            .with_indices(vec![112])
            .compute(&SpinImageEstimation::new(8, 0.5, 16).with_normals(&normals))
            .unwrap();
        let record = &output[0];
        assert!(record.iter().all(|v| v.is_finite()), "{record:?}");
        assert_abs_diff_eq!(record.sum(), 1., epsilon = 1e-5);
        assert_abs_diff_eq!(column(record, 8, 8), 1., epsilon = 1e-5);
    }

    #[test]
    fn test_rotation_axis_is_normalized() {
        let (cloud, normals) = plane();
        let search = KdTreeSearch;
        let estimation = Estimation::new()
            .with_input(&cloud)
            .with_search_method(&search)
            .with_radius_search(0.5)
            .with_indices(vec![112]);
        let spin = SpinImageEstimation::default().with_normals(&normals);

        let unit = estimation.compute(&spin.clone().with_rotation_axis(Vector3::x())).unwrap();
        let long = estimation
            .compute(&spin.clone().with_rotation_axis(Vector3::new(3., 0., 0.)))
            .unwrap();
        assert_eq!(unit[0], long[0]);

        let zero = estimation.compute(&spin.clone().with_rotation_axis(Vector3::zeros()));
        assert!(matches!(zero, Err(Error::InvalidParameter(_))));

        let mut raw = spin;
        raw.rotation_axis = Some(Vector3::new(0., 0., 2.));
        assert!(matches!(estimation.compute(&raw), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_too_few_neighbors() {
        let (cloud, normals) = plane();
        let search = KdTreeSearch;
        let output = Estimation::new()
            .with_input(&cloud)
            .with_search_method(&search)
            .with_radius_search(0.15)
            .compute(&SpinImageEstimation::default().with_normals(&normals))
            .unwrap();
        assert!(output.iter().all(|record| record.iter().all(|v| v.is_nan())));

        let result = Estimation::new()
            .with_input(&cloud)
            .with_search_method(&search)
            .with_k_search(20)
            .compute(&SpinImageEstimation::default().with_normals(&normals));
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }
}
