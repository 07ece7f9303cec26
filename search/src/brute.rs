use nalgebra::{ComplexField, Vector4};
use pcf_common::{
    point::Point,
    point_cloud::PointCloud,
    search::{Search, SearchType},
};
use pcf_kdtree::{KnnResultSet, RadiusResultSet, ResultSet};

/// Scans every point of the cloud. Exact by construction, used as the
/// reference the tree is checked against.
pub struct BruteForce<'a, P> {
    point_cloud: &'a PointCloud<P>,
}

impl<'a, P: Point> BruteForce<'a, P> {
    pub fn new(point_cloud: &'a PointCloud<P>) -> Self {
        BruteForce { point_cloud }
    }

    fn scan(&self, pivot: &Vector4<P::Data>, result: &mut impl ResultSet<P::Data>) {
        let dense = self.point_cloud.is_dense();
        for (index, point) in self.point_cloud.iter().enumerate() {
            if dense || point.is_finite() {
                result.push((point.xyz() - pivot.xyz()).norm_squared(), index);
            }
        }
    }
}

impl<'a, P: Point> Search<P> for BruteForce<'a, P> {
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
                self.scan(pivot, &mut rs);
                result.extend(rs.into_sorted_vec());
            }
            SearchType::Radius(radius) => {
                let mut rs = RadiusResultSet::new(radius);
                self.scan(pivot, &mut rs);
                result.extend(rs.into_sorted_vec());
            }
        }
    }
}
