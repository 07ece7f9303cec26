use std::cmp::Ordering;

use nalgebra::{RealField, Vector4};

use crate::{point::Point, point_cloud::PointCloud};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SearchType<T> {
    Knn(usize),
    Radius(T),
}

impl<T: Copy> SearchType<T> {
    #[inline]
    pub fn radius(&self) -> Option<T> {
        match *self {
            SearchType::Knn(_) => None,
            SearchType::Radius(radius) => Some(radius),
        }
    }
}

/// A neighbor query service bound to one cloud.
///
/// Results are `(index, squared distance)` pairs sorted by distance and then
/// by index. Non-finite points of the cloud are never returned, and a radius
/// query includes points lying exactly on the sphere.
pub trait Search<P: Point>: Sync {
    fn search(
        &self,
        pivot: &Vector4<P::Data>,
        ty: SearchType<P::Data>,
        result: &mut Vec<(usize, P::Data)>,
    );
}

/// Builds a [`Search`] over a surface cloud.
pub trait SearchMethod<P: Point>: Sync {
    fn build<'a>(&self, surface: &'a PointCloud<P>) -> Box<dyn Search<P> + 'a>;
}

#[inline]
pub fn result_cmp<T: RealField>(a: &(usize, T), b: &(usize, T)) -> Ordering {
    a.1.partial_cmp(&b.1)
        .unwrap_or(Ordering::Equal)
        .then(a.0.cmp(&b.0))
}

pub fn sort_results<T: RealField>(result: &mut [(usize, T)]) {
    result.sort_unstable_by(result_cmp)
}
