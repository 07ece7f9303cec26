use std::{borrow::Cow, ops::Index};

use nalgebra::{convert, one, Matrix3, Vector4};

use super::PointCloud;
use crate::point::{Centroid, CentroidBuilder, Data, Point};

/// A cloud viewed through an optional index list.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloudRef<'a, P> {
    inner: &'a PointCloud<P>,
    indices: Option<Cow<'a, [usize]>>,
}

impl<'a, P> PointCloudRef<'a, P> {
    #[inline]
    pub fn new(inner: &'a PointCloud<P>, indices: Option<Cow<'a, [usize]>>) -> Self {
        PointCloudRef { inner, indices }
    }

    #[inline]
    pub fn point_cloud(&self) -> &'a PointCloud<P> {
        self.inner
    }

    #[inline]
    pub fn indices(&self) -> Option<&[usize]> {
        self.indices.as_deref()
    }

    #[inline]
    pub fn len(&self) -> usize {
        match &self.indices {
            Some(indices) => indices.len(),
            None => self.inner.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a P> + '_ {
        let inner = self.inner;
        (0..self.len()).map(move |i| match &self.indices {
            Some(indices) => &inner[indices[i]],
            None => &inner[i],
        })
    }
}

impl<'a, P: Data> PointCloudRef<'a, P> {
    fn finite_iter(&self) -> impl Iterator<Item = &'a P> + '_ {
        let dense = self.inner.is_dense();
        self.iter().filter(move |p| dense || p.is_finite())
    }
}

impl<'a, P> Index<usize> for PointCloudRef<'a, P> {
    type Output = P;

    fn index(&self, index: usize) -> &Self::Output {
        match self.indices.as_ref() {
            Some(indices) => &self.inner[indices[index]],
            None => &self.inner[index],
        }
    }
}

impl<'a, P: Point> PointCloudRef<'a, P> {
    /// The mean position of the finite points with `w = 1`, and how many
    /// points were used.
    pub fn centroid_coords(&self) -> (Option<Vector4<P::Data>>, usize) {
        let (sum, num) = self
            .finite_iter()
            .fold((Vector4::zeros(), 0), |(sum, num), point| {
                (sum + point.coords(), num + 1)
            });
        if num == 0 {
            return (None, 0);
        }
        let mut centroid = sum / convert::<_, P::Data>(num as f64);
        centroid.w = one();
        (Some(centroid), num)
    }

    /// The scatter matrix of the finite points around `centroid`.
    pub fn cov_matrix(&self, centroid: &Vector4<P::Data>) -> (Option<Matrix3<P::Data>>, usize) {
        let (cov, num) = self
            .finite_iter()
            .fold((Matrix3::zeros(), 0), |(cov, num), point| {
                let d = (point.coords() - centroid).xyz();
                (cov + d * d.transpose(), num + 1)
            });
        ((num > 0).then_some(cov), num)
    }

    /// [`Self::cov_matrix`] divided by the number of points.
    pub fn cov_matrix_norm(&self, centroid: &Vector4<P::Data>) -> Option<Matrix3<P::Data>> {
        let (cov, num) = self.cov_matrix(centroid);
        cov.map(|cov| cov / convert::<_, P::Data>(num as f64))
    }

    /// The centroid and the normalized covariance matrix, or `None` if no
    /// point is finite.
    pub fn centroid_and_cov_matrix(&self) -> Option<(Vector4<P::Data>, Matrix3<P::Data>)> {
        let centroid = self.centroid_coords().0?;
        let cov = self.cov_matrix_norm(&centroid)?;
        Some((centroid, cov))
    }

    pub fn centroid(&self) -> Option<P>
    where
        P: Centroid,
        P::Accumulator: Default,
    {
        let mut builder = CentroidBuilder::default();
        self.finite_iter().for_each(|point| builder.accumulate(point));
        builder.compute()
    }
}
