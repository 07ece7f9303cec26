//! An exact k-d tree over the finite points of a cloud.

mod node;
mod result;

use nalgebra::{ComplexField, Vector4};
use pcf_common::{
    point::Point,
    point_cloud::PointCloud,
    search::{Search, SearchType},
};

use self::node::Node;
pub use self::result::*;

pub struct KdTree<'a, P: Point> {
    coords: Vec<&'a Vector4<P::Data>>,
    indices: Vec<usize>,
    nodes: Vec<Node<P::Data>>,
    root: Option<usize>,
}

impl<'a, P: Point> KdTree<'a, P> {
    pub fn new(point_cloud: &'a PointCloud<P>) -> Self {
        let coords = point_cloud.iter().map(|p| p.coords()).collect::<Vec<_>>();
        let mut indices = { point_cloud.iter().enumerate() }
            .filter(|(_, p)| point_cloud.is_dense() || p.is_finite())
            .map(|(index, _)| index)
            .collect::<Vec<_>>();

        let mut nodes = Vec::new();
        let root = (!indices.is_empty()).then(|| node::build(&mut nodes, &coords, &mut indices, 0));
        KdTree {
            coords,
            indices,
            nodes,
            root,
        }
    }

    /// The number of points indexed by the tree.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn search_with(&self, pivot: &Vector4<P::Data>, result: &mut impl ResultSet<P::Data>) {
        if let Some(root) = self.root {
            node::search(&self.nodes, root, &self.coords, &self.indices, pivot, result)
        }
    }
}

impl<'a, P: Point> Search<P> for KdTree<'a, P> {
    fn search(
        &self,
        pivot: &Vector4<P::Data>,
        ty: SearchType<P::Data>,
        result: &mut Vec<(usize, P::Data)>,
    ) {
        result.clear();
        if !pivot.xyz().iter().all(|v| v.is_finite()) {
            return;
        }
        match ty {
            SearchType::Knn(num) => {
                let mut rs = KnnResultSet::new(num);
                self.search_with(pivot, &mut rs);
                result.extend(rs.into_sorted_vec());
            }
            SearchType::Radius(radius) => {
                let mut rs = RadiusResultSet::new(radius);
                self.search_with(pivot, &mut rs);
                result.extend(rs.into_sorted_vec());
            }
        }
    }
}
