mod reference;

use std::{
    borrow::Cow,
    ops::{Deref, Index, IndexMut},
};

use nalgebra::Vector4;

pub use self::reference::PointCloudRef;
use crate::point::{Data, Point};

/// An ordered point sequence, optionally organized as `width * height`.
///
/// The dense flag states that no point is invalid. It is computed when a
/// cloud is built from a vector and otherwise only changes through
/// [`PointCloud::recompute_dense`] or the conservative merge in
/// [`PointCloud::concat`].
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud<P> {
    storage: Vec<P>,
    width: usize,
    dense: bool,
}

impl<P> PointCloud<P> {
    #[inline]
    pub fn new() -> Self {
        PointCloud {
            storage: Vec::new(),
            width: 0,
            dense: true,
        }
    }

    /// Builds a cloud without inspecting the points.
    ///
    /// # Panics
    ///
    /// Panics if the length of `storage` is not divisible by `width`.
    #[inline]
    pub fn from_parts(storage: Vec<P>, width: usize, dense: bool) -> Self {
        assert!(
            valid_width(storage.len(), width),
            "The length of the vector must be divisible by width"
        );
        PointCloud {
            storage,
            width,
            dense,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.storage.len() / self.width
        }
    }

    #[inline]
    pub fn index(&self, index: usize) -> [usize; 2] {
        [index % self.width, index / self.width]
    }

    #[inline]
    pub fn is_organized(&self) -> bool {
        self.height() > 1
    }

    #[inline]
    pub fn is_dense(&self) -> bool {
        self.dense
    }

    #[inline]
    pub fn into_vec(self) -> Vec<P> {
        self.storage
    }

    #[inline]
    pub fn select<'a>(&'a self, indices: Cow<'a, [usize]>) -> PointCloudRef<'a, P> {
        PointCloudRef::new(self, Some(indices))
    }

    #[inline]
    pub fn as_ref(&self) -> PointCloudRef<'_, P> {
        PointCloudRef::new(self, None)
    }
}

fn valid_width(len: usize, width: usize) -> bool {
    if width == 0 {
        len == 0
    } else {
        len % width == 0
    }
}

impl<P: Clone> PointCloud<P> {
    pub fn try_create_sub(&self, indices: &[usize], width: usize) -> Option<Self> {
        (valid_width(indices.len(), width) && indices.iter().all(|&i| i < self.len())).then(|| {
            PointCloud {
                storage: { indices.iter() }
                    .map(|&index| self.storage[index].clone())
                    .collect(),
                width,
                dense: self.dense,
            }
        })
    }

    /// Copies the selected points; the sub cloud keeps the parent's flag.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of bounds or `indices` is not divisible by
    /// `width`.
    #[inline]
    pub fn create_sub(&self, indices: &[usize], width: usize) -> Self {
        self.try_create_sub(indices, width)
            .expect("Invalid indices or width for the sub cloud")
    }

    /// Appends `other` as an unorganized tail. Density is `false` if either
    /// side is not known to be dense.
    pub fn concat(&mut self, other: &PointCloud<P>) {
        self.storage.extend_from_slice(&other.storage);
        self.width = self.storage.len();
        self.dense &= other.dense;
    }
}

impl<P: Data> PointCloud<P> {
    pub fn try_from_vec(storage: Vec<P>, width: usize) -> Result<Self, Vec<P>> {
        if valid_width(storage.len(), width) {
            let dense = storage.iter().all(|p| p.is_finite());
            Ok(PointCloud {
                storage,
                width,
                dense,
            })
        } else {
            Err(storage)
        }
    }

    /// # Panics
    ///
    /// Panics if the length of `storage` is not divisible by `width`.
    #[inline]
    pub fn from_vec(storage: Vec<P>, width: usize) -> Self {
        PointCloud::try_from_vec(storage, width)
            .unwrap_or_else(|_| panic!("The length of the vector must be divisible by width"))
    }

    pub fn recompute_dense(&mut self) -> bool {
        self.dense = self.storage.iter().all(|p| p.is_finite());
        self.dense
    }

    pub fn map<F, R>(&self, f: F) -> PointCloud<R>
    where
        F: FnMut(&P) -> R,
        R: Data,
    {
        let iter = self.storage.iter().map(f);
        PointCloud::from_vec(iter.collect(), self.width)
    }
}

impl<P: Point> PointCloud<P> {
    pub fn finite_bound(&self) -> Option<(Vector4<P::Data>, Vector4<P::Data>)> {
        let mut iter = self.storage.iter().filter(|p| self.dense || p.is_finite());
        let first = iter.next()?.coords();
        Some(iter.fold((*first, *first), |(min, max), p| {
            (min.inf(p.coords()), max.sup(p.coords()))
        }))
    }
}

impl<P: Data> FromIterator<P> for PointCloud<P> {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        let storage = iter.into_iter().collect::<Vec<_>>();
        let width = storage.len();
        PointCloud::from_vec(storage, width)
    }
}

impl<P> Deref for PointCloud<P> {
    type Target = [P];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.storage
    }
}

impl<P> Index<usize> for PointCloud<P> {
    type Output = P;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.storage[index]
    }
}

impl<P> IndexMut<usize> for PointCloud<P> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.storage[index]
    }
}

impl<P> Index<(usize, usize)> for PointCloud<P> {
    type Output = P;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &Self::Output {
        &self.storage[y * self.width + x]
    }
}

impl<P> Default for PointCloud<P> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
