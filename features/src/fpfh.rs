use std::collections::HashMap;

use nalgebra::{convert, ComplexField, DVector};
use num::{One, Zero};
use pcf_common::{
    error::{Error, Result},
    feature::{Feature, Neighborhood},
    point::{Normal, Point},
    point_cloud::PointCloud,
};

use crate::{check_len, nan, pfh::compute_pair_features};

/// Per-worker state: the neighbor buffer of secondary queries and the SPFH
/// of every surface point computed so far.
pub struct FpfhScratch<T> {
    buffer: Vec<(usize, T)>,
    spfh: HashMap<usize, DVector<T>>,
}

impl<T> Default for FpfhScratch<T> {
    fn default() -> Self {
        FpfhScratch {
            buffer: Vec::new(),
            spfh: HashMap::new(),
        }
    }
}

/// Fast point feature histograms: three independent histograms of the
/// query-to-neighbor pair features, blended with the neighbors' own ones.
#[derive(Debug, Clone, PartialEq)]
pub struct FpfhEstimation<'a, N> {
    pub bins: [usize; 3],
    pub normals: Option<&'a PointCloud<N>>,
}

impl<'a, N> FpfhEstimation<'a, N> {
    pub fn new(bins: [usize; 3]) -> Self {
        FpfhEstimation {
            bins,
            normals: None,
        }
    }

    pub fn with_normals(mut self, normals: &'a PointCloud<N>) -> Self {
        self.normals = Some(normals);
        self
    }

    fn len(&self) -> usize {
        self.bins.iter().sum()
    }
}

impl<'a, N> Default for FpfhEstimation<'a, N> {
    fn default() -> Self {
        Self::new([11; 3])
    }
}

impl<'a, N: Normal> FpfhEstimation<'a, N> {
    /// The simplified PFH of surface point `index` against `neighbors`, each
    /// block summing to 100 over the valid pairs.
    fn spfh<P: Point<Data = N::Data>>(
        &self,
        surface: &PointCloud<P>,
        normals: &PointCloud<N>,
        index: usize,
        neighbors: &[(usize, P::Data)],
    ) -> DVector<P::Data> {
        let [b0, b1, _] = self.bins;
        let mut histogram = DVector::zeros(self.len());
        let (p1, n1) = (surface[index].xyz(), normals[index].normal().xyz());

        let mut valid = 0usize;
        for &(j, _) in neighbors.iter().filter(|&&(j, _)| j != index) {
            let (p2, n2) = (surface[j].xyz(), normals[j].normal().xyz());
            let pair = match compute_pair_features([&p1, &n1], [&p2, &n2]) {
                Some(pair) => pair,
                None => continue,
            };
            let [f0, f1, f2] = pair.bins(self.bins);
            histogram[f0] += P::Data::one();
            histogram[b0 + f1] += P::Data::one();
            histogram[b0 + b1 + f2] += P::Data::one();
            valid += 1;
        }

        if valid > 0 {
            histogram *= convert::<_, P::Data>(100. / valid as f64);
        }
        histogram
    }
}

impl<'a, P, N> Feature<P> for FpfhEstimation<'a, N>
where
    P: Point,
    N: Normal<Data = P::Data>,
{
    const NAME: &'static str = "FpfhEstimation";

    type Output = DVector<P::Data>;
    type Scratch = FpfhScratch<P::Data>;

    fn check(&self, surface: &PointCloud<P>, _: Option<P::Data>) -> Result<()> {
        if self.bins.contains(&0) {
            return Err(Error::InvalidParameter(format!(
                "FPFH bins must be positive, got {:?}",
                self.bins
            )));
        }
        let normals = { self.normals }.ok_or(Error::MissingNormals(<Self as Feature<P>>::NAME))?;
        check_len("normals", surface.len(), normals.len())
    }

    fn invalid(&self) -> DVector<P::Data> {
        DVector::repeat(self.len(), nan())
    }

    fn compute_point(
        &self,
        n: &Neighborhood<P>,
        scratch: &mut FpfhScratch<P::Data>,
    ) -> Option<DVector<P::Data>> {
        let normals = self.normals?;
        let pivot_index = n.pivot_index?;

        let spfh = |index: usize, scratch: &mut FpfhScratch<P::Data>| {
            if let Some(histogram) = scratch.spfh.get(&index) {
                return histogram.clone();
            }
            let histogram = if index == pivot_index {
                self.spfh(n.surface, normals, index, n.neighbors)
            } else {
                n.search_around(index, &mut scratch.buffer);
                self.spfh(n.surface, normals, index, &scratch.buffer)
            };
            scratch.spfh.insert(index, histogram.clone());
            histogram
        };

        let mut blended = DVector::zeros(self.len());
        let mut weight_sum = P::Data::zero();
        for &(index, distance) in n.neighbors {
            if index == pivot_index || distance == P::Data::zero() {
                continue;
            }
            let weight = distance.sqrt().recip();
            blended += spfh(index, scratch) * weight;
            weight_sum += weight;
        }

        let mut histogram = spfh(pivot_index, scratch);
        if weight_sum > P::Data::zero() {
            histogram += blended / weight_sum;
        }

        let mut start = 0;
        for &len in &self.bins {
            let mut block = histogram.rows_mut(start, len);
            let sum = block.sum();
            if sum == P::Data::zero() {
                return None;
            }
            block *= convert::<_, P::Data>(100.) / sum;
            start += len;
        }
        Some(histogram)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use pcf_common::point::{Normal3, Point3};
    use pcf_search::KdTreeSearch;

    use super::*;
    use crate::{Estimation, NormalEstimation};

    fn saddle() -> PointCloud<Point3> {
        (0..20)
            .flat_map(|x| (0..20).map(move |y| (x as f32 * 0.1 - 1., y as f32 * 0.1 - 1.)))
            .map(|(x, y)| Point3::new(x, y, x * x - y * y))
            .collect()
    }

    #[test]
    fn test_blocks_sum_to_100() {
        let cloud = saddle();
        let search = KdTreeSearch;
        let estimation = Estimation::new()
            .with_input(&cloud)
            .with_search_method(&search)
            .with_radius_search(0.25);
        let normals = estimation
            .compute(&NormalEstimation::<Normal3>::default())
            .unwrap();

        let output = estimation
            .compute(&FpfhEstimation::default().with_normals(&normals))
            .unwrap();
        assert_eq!(output.len(), 400);
        for histogram in output.iter() {
            assert_eq!(histogram.len(), 33);
            for block in 0..3 {
                assert_relative_eq!(histogram.rows(block * 11, 11).sum(), 100., epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn test_subset_matches_full_run() {
        let cloud = saddle();
        let search = KdTreeSearch;
        let estimation = Estimation::new()
            .with_input(&cloud)
            .with_search_method(&search)
            .with_k_search(8);
        let normals = estimation
            .compute(&NormalEstimation::<Normal3>::default())
            .unwrap();
        let fpfh = FpfhEstimation::new([5, 6, 7]).with_normals(&normals);
        let all = estimation.compute(&fpfh).unwrap();
        assert_eq!(all[0].len(), 18);

        let indices = [399, 17, 200];
        let some = estimation.with_indices(&indices[..]).compute(&fpfh).unwrap();
        assert_eq!(some.len(), 3);
        for (record, &index) in some.iter().zip(indices.iter()) {
            for (a, b) in record.iter().zip(all[index].iter()) {
                assert!(a == b || (a.is_nan() && b.is_nan()));
            }
        }
    }
}
