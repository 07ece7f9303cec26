use std::borrow::Cow;

use crate::{
    error::Result,
    point::{Data, Point},
    point_cloud::{PointCloud, PointCloudRef},
    search::{Search, SearchType},
};

/// Everything a descriptor sees while computing the record of one query
/// point.
pub struct Neighborhood<'a, P: Point> {
    pub surface: &'a PointCloud<P>,
    /// The search bound to `surface`, if the descriptor asked for one.
    pub search: Option<&'a dyn Search<P>>,
    pub search_type: Option<SearchType<P::Data>>,
    /// How far the descriptor's support extends: the search radius, or the
    /// configured radius when K drives the search.
    pub support_radius: Option<P::Data>,
    pub pivot: &'a P,
    /// The surface point coincident with `pivot`, if any.
    pub pivot_index: Option<usize>,
    pub neighbors: &'a [(usize, P::Data)],
}

impl<'a, P: Point> Neighborhood<'a, P> {
    #[inline]
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    #[inline]
    pub fn radius(&self) -> Option<P::Data> {
        self.support_radius
    }

    #[inline]
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.neighbors.iter().map(|&(index, _)| index)
    }

    pub fn as_point_cloud_ref(&self) -> PointCloudRef<'a, P> {
        let indices = self.indices().collect::<Vec<_>>();
        PointCloudRef::new(self.surface, Some(Cow::Owned(indices)))
    }

    /// Runs the same kind of query around another surface point.
    pub fn search_around(&self, index: usize, result: &mut Vec<(usize, P::Data)>) {
        result.clear();
        if let (Some(search), Some(ty)) = (self.search, self.search_type) {
            search.search(self.surface[index].coords(), ty, result);
        }
    }

    /// Collects the surface points within `radius` of another surface point.
    pub fn search_radius_around(&self, index: usize, radius: P::Data, result: &mut Vec<(usize, P::Data)>) {
        result.clear();
        if let Some(search) = self.search {
            search.search(self.surface[index].coords(), SearchType::Radius(radius), result);
        }
    }
}

/// A per-point local descriptor.
///
/// The estimator resolves the neighborhood of every processed point and
/// hands it to [`Feature::compute_point`]; `None` stands for the invalid
/// record.
pub trait Feature<P: Point>: Sync {
    const NAME: &'static str;
    /// Whether neighborhoods are searched at all.
    const NEEDS_SEARCH: bool = true;

    type Output: Data + Send + Sync;
    /// State kept by each worker across the points it processes.
    type Scratch: Default + Send;

    /// Validates side inputs against the resolved search surface and support
    /// radius.
    fn check(&self, _surface: &PointCloud<P>, _radius: Option<P::Data>) -> Result<()> {
        Ok(())
    }

    fn invalid(&self) -> Self::Output;

    fn compute_point(
        &self,
        neighborhood: &Neighborhood<P>,
        scratch: &mut Self::Scratch,
    ) -> Option<Self::Output>;
}
