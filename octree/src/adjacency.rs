use std::{collections::HashMap, ops::Deref};

use nalgebra::RealField;
use pcf_common::{error::Result, point::Point, point_cloud::PointCloud};
use petgraph::prelude::UnGraph;

use crate::OcTreePc;

#[derive(Debug, Default, Clone)]
pub struct Leaf<L> {
    pub data: L,
    /// The number of points that fell into the voxel.
    pub num: usize,
}

/// A voxelized cloud whose occupied leaves know their 26-connected
/// neighbors.
#[derive(Debug, Clone)]
pub struct OcTreePcAdjacency<L, T> {
    inner: OcTreePc<Leaf<L>, T>,
}

impl<L: Default, T: RealField + Copy> OcTreePcAdjacency<L, T> {
    pub fn from_point_cloud<P, F>(
        point_cloud: &PointCloud<P>,
        resolution: T,
        mut accumulate: F,
    ) -> Result<Self>
    where
        P: Point<Data = T>,
        F: FnMut(&mut L, &P),
    {
        let inner = OcTreePc::from_point_cloud(point_cloud, resolution, |leaf: &mut Leaf<L>, _, point| {
            leaf.num += 1;
            accumulate(&mut leaf.data, point);
        })?;
        Ok(OcTreePcAdjacency { inner })
    }
}

impl<L, T: RealField + Copy> OcTreePcAdjacency<L, T> {
    /// Keys of the occupied leaves touching `key` by a face, edge or corner.
    pub fn neighbors(&self, key: &[usize; 3]) -> Vec<[usize; 3]> {
        let max_key = self.inner.max_key();
        let range = |k: usize| k.saturating_sub(1)..=(k + 1).min(max_key);

        let mut ret = Vec::new();
        for x in range(key[0]) {
            for y in range(key[1]) {
                for z in range(key[2]) {
                    let other = [x, y, z];
                    if &other != key && self.inner.get(&other).is_some() {
                        ret.push(other);
                    }
                }
            }
        }
        ret
    }

    /// One vertex per occupied leaf in iteration order, edges between
    /// adjacent leaves weighted by the distance of their centers.
    pub fn adjacent_graph(&self) -> UnGraph<[usize; 3], T> {
        let mut map = HashMap::new();
        let mut graph = UnGraph::default();

        for (key, _) in self.inner.iter() {
            map.insert(key, graph.add_node(key));
        }

        for (key, _) in self.inner.iter() {
            let vert = map[&key];
            for neighbor in self.neighbors(&key) {
                let other = map[&neighbor];
                if vert < other {
                    let distance =
                        (self.inner.center(&neighbor) - self.inner.center(&key)).norm();
                    graph.add_edge(vert, other, distance);
                }
            }
        }

        graph
    }
}

impl<L, T> Deref for OcTreePcAdjacency<L, T> {
    type Target = OcTreePc<Leaf<L>, T>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use pcf_common::point::Point3;

    use super::*;

    #[test]
    fn test_adjacency() {
        let cloud = [[0., 0., 0.], [1.5, 0., 0.], [1.2, 1.1, 1.1], [3.5, 3.5, 3.5], [0.2, 0.2, 0.2]]
            .into_iter()
            .map(|[x, y, z]| Point3::new(x, y, z))
            .collect::<PointCloud<_>>();
        let tree = OcTreePcAdjacency::<(), f32>::from_point_cloud(&cloud, 1., |_, _| {}).unwrap();

        assert_eq!(tree.len(), 4);
        assert_eq!(tree.get(&[0, 0, 0]).map(|leaf| leaf.num), Some(2));
        assert_eq!(tree.neighbors(&[0, 0, 0]), vec![[1, 0, 0], [1, 1, 1]]);
        assert!(tree.neighbors(&[3, 3, 3]).is_empty());

        let graph = tree.adjacent_graph();
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 3);
        let weights = graph.edge_weights().copied().collect::<Vec<_>>();
        assert!(weights.contains(&1.));
        assert!(weights.iter().any(|&w| (w - 3f32.sqrt()).abs() < 1e-6));
    }
}
