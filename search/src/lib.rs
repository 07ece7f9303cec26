//! Search methods binding a neighbor query structure to a surface cloud.

mod brute;

use pcf_common::{
    point::Point,
    point_cloud::PointCloud,
    search::{Search, SearchMethod},
};
pub use pcf_kdtree::*;

pub use self::brute::*;

/// Builds a [`KdTree`] over the surface.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct KdTreeSearch;

impl<P: Point> SearchMethod<P> for KdTreeSearch {
    fn build<'a>(&self, surface: &'a PointCloud<P>) -> Box<dyn Search<P> + 'a> {
        Box::new(KdTree::new(surface))
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct BruteForceSearch;

impl<P: Point> SearchMethod<P> for BruteForceSearch {
    fn build<'a>(&self, surface: &'a PointCloud<P>) -> Box<dyn Search<P> + 'a> {
        Box::new(BruteForce::new(surface))
    }
}
