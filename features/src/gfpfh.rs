use log::{debug, warn};
use nalgebra::{convert, DVector, RealField};
use pcf_common::{
    error::{Error, Result},
    point::{Centroid, CentroidBuilder, PointLabel},
    point_cloud::PointCloud,
};
use pcf_octree::OcTreePcAdjacency;
use petgraph::visit::EdgeRef;

use crate::Estimation;

/// Global fast point feature histogram: how often each pair of labels meets
/// across adjacent voxels of the labeled cloud.
///
/// Labels run from 1 to `classes`; every voxel takes the most frequent label
/// of its points. The single record is a `classes × classes` symmetric
/// matrix stored row by row, counting each adjacent voxel pair once in both
/// orders.
#[derive(Debug, Clone, PartialEq)]
pub struct GfpfhEstimation<T> {
    pub leaf_size: T,
    pub classes: u32,
}

impl<T> GfpfhEstimation<T> {
    pub fn new(leaf_size: T, classes: u32) -> Self {
        GfpfhEstimation { leaf_size, classes }
    }
}

impl<T: RealField> Default for GfpfhEstimation<T> {
    fn default() -> Self {
        Self::new(convert(0.01), 16)
    }
}

impl<T: RealField + Copy> GfpfhEstimation<T> {
    /// Describes the processed points of `estimation` as a whole. No search
    /// method is needed.
    pub fn compute<P>(&self, estimation: &Estimation<P>) -> Result<PointCloud<DVector<T>>>
    where
        P: PointLabel<Data = T> + Centroid,
        P::Accumulator: Default + Clone,
    {
        if self.classes == 0 {
            return Err(Error::InvalidParameter("GFPFH needs at least 1 class".into()));
        }
        let config = estimation.resolve(false)?;
        let sub;
        let cloud = match estimation.indices() {
            Some(indices) => {
                sub = config.input.create_sub(indices, indices.len());
                &sub
            }
            None => config.input,
        };

        let tree = OcTreePcAdjacency::from_point_cloud(
            cloud,
            self.leaf_size,
            |leaf: &mut CentroidBuilder<P>, point| leaf.accumulate(point),
        )?;
        let graph = tree.adjacent_graph();

        let classes = self.classes as usize;
        let labels = { graph.node_weights() }
            .map(|key| {
                let centroid = tree.get(key)?.data.clone().compute()?;
                let label = centroid.label() as usize;
                (1..=classes).contains(&label).then(|| label - 1)
            })
            .collect::<Vec<_>>();

        let unlabeled = labels.iter().filter(|label| label.is_none()).count();
        if unlabeled > 0 {
            warn!(
                "GfpfhEstimation: {unlabeled} of {} voxels have a label outside 1..={classes}",
                labels.len()
            );
        }
        debug!(
            "GfpfhEstimation: {} voxels, {} adjacencies",
            graph.node_count(),
            graph.edge_count()
        );

        let mut histogram = DVector::zeros(classes * classes);
        for edge in graph.edge_references() {
            if let (Some(a), Some(b)) = (labels[edge.source().index()], labels[edge.target().index()]) {
                histogram[a * classes + b] += T::one();
                histogram[b * classes + a] += T::one();
            }
        }
        Ok(PointCloud::from_vec(vec![histogram], 1))
    }
}

#[cfg(test)]
mod tests {
    use pcf_common::point::Point3L;

    use super::*;

    /// The surface of the unit cube labeled by face, with a square hole in
    /// the top face.
    fn cube_with_hole() -> PointCloud<Point3L> {
        let steps = (0..=20).map(|i| i as f32 * 0.05).collect::<Vec<_>>();
        let mut points = Vec::new();
        for &u in &steps {
            for &v in &steps {
                points.push(Point3L::new(u, v, 0., 1));
                if !(0.3..=0.7).contains(&u) || !(0.3..=0.7).contains(&v) {
                    points.push(Point3L::new(u, v, 1., 2));
                }
                points.push(Point3L::new(u, 0., v, 3));
                points.push(Point3L::new(u, 1., v, 4));
                points.push(Point3L::new(0., u, v, 5));
                points.push(Point3L::new(1., u, v, 6));
            }
        }
        PointCloud::from_iter(points)
    }

    #[test]
    fn test_deterministic_symmetric_histogram() {
        let cloud = cube_with_hole();
        let estimation = Estimation::new().with_input(&cloud);
        let gfpfh = GfpfhEstimation::new(0.1, 8);

        let output = gfpfh.compute(&estimation).unwrap();
        assert_eq!(output.len(), 1);
        assert_eq!(output[0].len(), 64);
        assert_eq!(output, gfpfh.compute(&estimation).unwrap());

        let histogram = &output[0];
        assert!(histogram.sum() > 0.);
        for a in 0..8 {
            for b in 0..8 {
                assert_eq!(histogram[a * 8 + b], histogram[b * 8 + a]);
            }
        }
        // Labels 7 and 8 never occur.
        assert!((0..8).all(|i| histogram[6 * 8 + i] == 0. && histogram[7 * 8 + i] == 0.));
        // The bottom and top faces are a whole voxel layer apart.
        assert_eq!(histogram[1], 0.);
    }

    #[test]
    fn test_indices_and_labels() {
        let cloud = cube_with_hole();
        let bottom = { cloud.iter().enumerate() }
            .filter(|(_, p)| p.label == 1)
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        let output = GfpfhEstimation::new(0.1, 4)
            .compute(&Estimation::new().with_input(&cloud).with_indices(&bottom[..]))
            .unwrap();
        // A lone face only meets itself.
        let histogram = &output[0];
        assert!(histogram[0] > 0.);
        assert_eq!(histogram.sum(), histogram[0]);

        // Labels beyond the class count are ignored.
        let output = GfpfhEstimation::new(0.1, 1)
            .compute(&Estimation::new().with_input(&cloud))
            .unwrap();
        assert_eq!(output[0].len(), 1);

        let result = GfpfhEstimation::new(0.1, 0).compute(&Estimation::new().with_input(&cloud));
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        let result = GfpfhEstimation::<f32>::new(0.1, 4).compute(&Estimation::<Point3L>::new());
        assert!(matches!(result, Err(Error::MissingInput)));
    }
}
