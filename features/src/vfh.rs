use log::debug;
use nalgebra::{convert, ComplexField, DVector, RealField, Vector3};
use num::{One, ToPrimitive, Zero};
use pcf_common::{
    error::{Error, Result},
    point::{Normal, Point},
    point_cloud::PointCloud,
};

use crate::{bin, check_len, compute_pair_features, nan, Estimation};

/// Viewpoint feature histogram: the pair features of every processed point
/// against the centroid, plus a histogram of the angle between each normal
/// and the direction from the viewpoint to the centroid.
///
/// The single record holds the `theta`, `alpha`, `phi` and distance blocks
/// of `bins` followed by the `viewpoint_bins` block.
#[derive(Debug, Clone, PartialEq)]
pub struct VfhEstimation<'a, N: Normal> {
    pub bins: [usize; 4],
    pub viewpoint_bins: usize,
    pub viewpoint: Vector3<N::Data>,
    /// Replaces the centroid of the processed points.
    pub centroid: Option<Vector3<N::Data>>,
    /// Replaces the mean of the processed normals.
    pub centroid_normal: Option<Vector3<N::Data>>,
    /// Scales the pair blocks to 100 over `len - 1` points and the viewpoint
    /// block to 100 over `len` points; raw counts otherwise.
    pub normalize_bins: bool,
    /// Bins distances relative to the farthest point instead of in steps of
    /// 0.01 units.
    pub normalize_distances: bool,
    /// Votes into the distance block, which stays empty otherwise.
    pub size_component: bool,
    pub normals: Option<&'a PointCloud<N>>,
}

impl<'a, N: Normal> VfhEstimation<'a, N> {
    pub fn new(bins: [usize; 4], viewpoint_bins: usize) -> Self {
        VfhEstimation {
            bins,
            viewpoint_bins,
            viewpoint: Vector3::zeros(),
            centroid: None,
            centroid_normal: None,
            normalize_bins: true,
            normalize_distances: false,
            size_component: false,
            normals: None,
        }
    }

    pub fn with_normals(mut self, normals: &'a PointCloud<N>) -> Self {
        self.normals = Some(normals);
        self
    }

    pub fn with_viewpoint(mut self, viewpoint: Vector3<N::Data>) -> Self {
        self.viewpoint = viewpoint;
        self
    }

    pub fn with_centroid(mut self, centroid: Vector3<N::Data>, normal: Vector3<N::Data>) -> Self {
        self.centroid = Some(centroid);
        self.centroid_normal = Some(normal);
        self
    }

    pub fn len(&self) -> usize {
        self.bins.iter().sum::<usize>() + self.viewpoint_bins
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a, N: Normal> Default for VfhEstimation<'a, N> {
    fn default() -> Self {
        Self::new([45; 4], 128)
    }
}

impl<'a, N: Normal> VfhEstimation<'a, N> {
    /// Describes the processed points of `estimation` as a whole. Normals
    /// are aligned with the input cloud; no search method is needed.
    pub fn compute<P>(&self, estimation: &Estimation<P>) -> Result<PointCloud<DVector<N::Data>>>
    where
        P: Point<Data = N::Data>,
    {
        if self.bins.contains(&0) || self.viewpoint_bins == 0 {
            return Err(Error::InvalidParameter(format!(
                "VFH bins must be positive, got {:?} and {}",
                self.bins, self.viewpoint_bins
            )));
        }
        let config = estimation.resolve(false)?;
        let normals = self.normals.ok_or(Error::MissingNormals("VfhEstimation"))?;
        check_len("normals", config.input.len(), normals.len())?;

        let points = { config.indices.iter() }
            .map(|&i| (config.input[i].xyz(), normals[i].normal().xyz()))
            .filter(|(point, _)| point.iter().all(|v| v.is_finite()))
            .collect::<Vec<_>>();
        debug!("VfhEstimation: describing {} points", points.len());

        let record = self
            .describe(&points)
            .unwrap_or_else(|| DVector::repeat(self.len(), nan()));
        Ok(PointCloud::from_vec(vec![record], 1))
    }

    fn describe(&self, points: &[(Vector3<N::Data>, Vector3<N::Data>)]) -> Option<DVector<N::Data>> {
        let real = |v: f64| convert::<_, N::Data>(v);
        let (zero, one) = (N::Data::zero(), N::Data::one());
        let finite = |v: &Vector3<N::Data>| v.iter().all(|x| x.is_finite());
        if points.is_empty() {
            return None;
        }

        let centroid = match self.centroid {
            Some(centroid) => centroid,
            None => points.iter().fold(Vector3::zeros(), |sum, (p, _)| sum + p) / real(points.len() as f64),
        };
        let centroid_normal = match self.centroid_normal {
            Some(normal) => normal,
            None => { points.iter() }
                .map(|(_, n)| n)
                .filter(|&n| finite(n))
                .fold(Vector3::zeros(), |sum, n| sum + n),
        }
        .try_normalize(zero)?;

        let [b0, b1, b2, b3] = self.bins;
        let mut histogram = DVector::zeros(self.len());

        let pair_incr = if self.normalize_bins {
            real(100.) / real(points.len().saturating_sub(1).max(1) as f64)
        } else {
            one
        };
        let size_incr = if self.size_component { pair_incr } else { zero };
        let max_distance = if self.normalize_distances {
            { points.iter() }
                .map(|(p, _)| (p - centroid).norm())
                .fold(zero, |max, d| max.max(d))
        } else {
            one
        };

        for (point, normal) in points {
            let pair = match compute_pair_features([&centroid, &centroid_normal], [point, normal]) {
                Some(pair) => pair,
                None => continue,
            };
            let [f0, f1, f2] = pair.bins([b0, b1, b2]);
            histogram[f0] += pair_incr;
            histogram[b0 + f1] += pair_incr;
            histogram[b0 + b1 + f2] += pair_incr;

            let f3 = if self.normalize_distances {
                bin(pair.distance / max_distance, b3)
            } else {
                { pair.distance * real(100.) }.round().to_usize().unwrap_or(0).min(b3 - 1)
            };
            histogram[b0 + b1 + b2 + f3] += size_incr;
        }

        let direction = (self.viewpoint - centroid).normalize();
        let viewpoint_incr = if self.normalize_bins {
            real(100.) / real(points.len() as f64)
        } else {
            one
        };
        let offset = b0 + b1 + b2 + b3;
        for (_, normal) in points.iter().filter(|(_, n)| finite(n)) {
            let ratio = (normal.dot(&direction) + one) * real(0.5);
            histogram[offset + bin(ratio, self.viewpoint_bins)] += viewpoint_incr;
        }
        Some(histogram)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use pcf_common::point::{Normal3, Point3};

    use super::*;

    /// A 10 × 10 grid whose centroid lies between grid points.
    fn plane() -> (PointCloud<Point3>, PointCloud<Normal3>) {
        let cloud = (0..10)
            .flat_map(|x| (0..10).map(move |y| Point3::new(x as f32 * 0.1, y as f32 * 0.1, 0.)))
            .collect::<PointCloud<_>>();
        let normals = PointCloud::from_vec(vec![Normal3::new(0., 0., 1., 0.); cloud.len()], cloud.len());
        (cloud, normals)
    }

    fn block(record: &DVector<f32>, start: usize, len: usize) -> f32 {
        record.rows(start, len).sum()
    }

    #[test]
    fn test_layout_and_normalization() {
        let (cloud, normals) = plane();
        let vfh = VfhEstimation::default()
            .with_normals(&normals)
            .with_viewpoint(Vector3::new(0.45, 0.45, 10.));
        let output = vfh.compute(&Estimation::new().with_input(&cloud)).unwrap();
        assert_eq!(output.len(), 1);

        let record = &output[0];
        assert_eq!(record.len(), 308);
        // Every point pairs with the centroid.
        let pairs = 100. * 100. / 99.;
        for start in [0, 45, 90] {
            assert_relative_eq!(block(record, start, 45), pairs, epsilon = 1e-3);
        }
        assert_eq!(block(record, 135, 45), 0.);
        // All normals face the viewpoint.
        assert_relative_eq!(block(record, 180, 128), 100., epsilon = 1e-3);
        assert_relative_eq!(record[307], 100., epsilon = 1e-3);
    }

    #[test]
    fn test_size_component() {
        let (cloud, normals) = plane();
        let estimation = Estimation::new().with_input(&cloud);
        let mut vfh = VfhEstimation::default().with_normals(&normals);
        vfh.size_component = true;
        let absolute = vfh.compute(&estimation).unwrap();
        assert_relative_eq!(block(&absolute[0], 135, 45), 100. * 100. / 99., epsilon = 1e-3);

        vfh.normalize_distances = true;
        let relative = vfh.compute(&estimation).unwrap();
        assert_relative_eq!(block(&relative[0], 135, 45), 100. * 100. / 99., epsilon = 1e-3);
        // The four corners are the farthest points.
        assert_relative_eq!(relative[0][179], 4. * 100. / 99., epsilon = 1e-3);

        vfh.normalize_bins = false;
        let raw = vfh.compute(&estimation).unwrap();
        assert_eq!(block(&raw[0], 0, 45), 100.);
        assert_eq!(block(&raw[0], 180, 128), 100.);
    }

    #[test]
    fn test_indices_match_sub_cloud() {
        let (cloud, normals) = plane();
        let indices = (0..100).filter(|i| i % 3 != 0).collect::<Vec<_>>();
        let vfh = VfhEstimation::default().with_normals(&normals);
        let subset = vfh
            .compute(&Estimation::new().with_input(&cloud).with_indices(&indices[..]))
            .unwrap();

        let sub = cloud.create_sub(&indices, indices.len());
        let sub_normals = normals.create_sub(&indices, indices.len());
        let copied = VfhEstimation::default()
            .with_normals(&sub_normals)
            .compute(&Estimation::new().with_input(&sub).with_search_surface(&cloud))
            .unwrap();
        assert_eq!(subset, copied);
    }

    #[test]
    fn test_invalid_input() {
        let (cloud, normals) = plane();
        let estimation = Estimation::new().with_input(&cloud);

        let result = VfhEstimation::<Normal3>::default().compute(&estimation);
        assert!(matches!(result, Err(Error::MissingNormals(_))));
        let result = VfhEstimation::new([45, 45, 0, 45], 128)
            .with_normals(&normals)
            .compute(&estimation);
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        let short = normals.create_sub(&[0, 1], 2);
        let result = VfhEstimation::default().with_normals(&short).compute(&estimation);
        assert!(matches!(result, Err(Error::SizeMismatch { .. })));

        // Normals cancelling out leave no centroid normal.
        let flipped = PointCloud::from_iter(
            (0..100).map(|i| Normal3::new(0., 0., if i % 2 == 0 { 1. } else { -1. }, 0.)),
        );
        let output = VfhEstimation::default().with_normals(&flipped).compute(&estimation).unwrap();
        assert!(output[0].iter().all(|v| v.is_nan()));
    }
}
