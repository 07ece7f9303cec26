use std::ops::{Deref, DerefMut};

use nalgebra::{convert, try_convert, RealField, Vector4};
use pcf_common::{
    error::{Error, Result},
    point::Point,
    point_cloud::PointCloud,
};

use crate::OcTree;

/// An [`OcTree`] voxelizing space with cubes of side `resolution`, keyed
/// from the minimum corner of a bounding box.
#[derive(Debug, Clone)]
pub struct OcTreePc<L, T> {
    pub(crate) inner: OcTree<L>,
    resolution: T,
    origin: Vector4<T>,
}

/// The smallest depth whose keys reach `max_key`.
fn depth_for(max_key: usize) -> usize {
    ((usize::BITS - max_key.leading_zeros()) as usize).max(1)
}

impl<L, T: RealField + Copy> OcTreePc<L, T> {
    /// An empty tree covering `bound` (minimum and maximum corners).
    pub fn new(resolution: T, bound: (Vector4<T>, Vector4<T>)) -> Result<Self> {
        if !(resolution > T::zero() && resolution.is_finite()) {
            return Err(Error::InvalidParameter(format!(
                "octree resolution must be positive, got {resolution:?}"
            )));
        }
        let (min, max) = bound;
        let extent = ((max - min) / resolution).xyz().max();
        let max_key = try_convert::<T, f64>(extent.floor())
            .filter(|v| v.is_finite() && *v >= 0. && *v < (1u64 << 40) as f64)
            .ok_or_else(|| {
                Error::InvalidParameter(format!(
                    "octree bound {min:?} to {max:?} is too large for resolution {resolution:?}"
                ))
            })? as usize;

        Ok(OcTreePc {
            inner: OcTree::new(depth_for(max_key)),
            resolution,
            origin: Vector4::new(min.x, min.y, min.z, T::one()),
        })
    }

    /// Voxelizes the finite points of `point_cloud`, feeding each one to the
    /// leaf of its voxel.
    pub fn from_point_cloud<P, F>(
        point_cloud: &PointCloud<P>,
        resolution: T,
        mut accumulate: F,
    ) -> Result<Self>
    where
        P: Point<Data = T>,
        L: Default,
        F: FnMut(&mut L, usize, &P),
    {
        let bound = { point_cloud.finite_bound() }
            .unwrap_or_else(|| (Vector4::zeros(), Vector4::zeros()));
        let mut tree = Self::new(resolution, bound)?;
        for (index, point) in point_cloud.iter().enumerate() {
            if !point.is_finite() {
                continue;
            }
            if let Some(key) = tree.coords_to_key(point.coords()) {
                let leaf = tree.inner.get_or_insert_with(&key, Default::default);
                accumulate(leaf, index, point);
            }
        }
        Ok(tree)
    }

    pub fn resolution(&self) -> T {
        self.resolution
    }

    /// The key of the voxel containing `coords`, `None` outside the tree.
    pub fn coords_to_key(&self, coords: &Vector4<T>) -> Option<[usize; 3]> {
        let max_key = self.inner.max_key() as f64;
        let mut key = [0; 3];
        for (k, (c, o)) in key.iter_mut().zip(coords.iter().zip(self.origin.iter())) {
            let v = try_convert::<T, f64>(((*c - *o) / self.resolution).floor())?;
            if !(0. ..=max_key).contains(&v) {
                return None;
            }
            *k = v as usize;
        }
        Some(key)
    }

    /// The minimum corner of the voxel at `key`.
    pub fn key_to_coords(&self, key: &[usize; 3]) -> Vector4<T> {
        let offset = Vector4::new(
            convert::<_, T>(key[0] as f64),
            convert(key[1] as f64),
            convert(key[2] as f64),
            T::zero(),
        );
        self.origin + offset * self.resolution
    }

    pub fn center(&self, key: &[usize; 3]) -> Vector4<T> {
        let half = self.resolution * convert(0.5);
        let mut ret = self.key_to_coords(key).map(|v| v + half);
        ret.w = T::one();
        ret
    }
}

impl<L, T> Deref for OcTreePc<L, T> {
    type Target = OcTree<L>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<L, T> DerefMut for OcTreePc<L, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use pcf_common::point::Point3;

    use super::*;

    #[test]
    fn test_depth() {
        assert_eq!(depth_for(0), 1);
        assert_eq!(depth_for(1), 1);
        assert_eq!(depth_for(2), 2);
        assert_eq!(depth_for(7), 3);
        assert_eq!(depth_for(8), 4);
    }

    #[test]
    fn test_voxelize() {
        let cloud = PointCloud::from_vec(
            vec![
                Point3::new(0., 0., 0.),
                Point3::new(0.5, 0.5, 0.5),
                Point3::new(3.5, 0., 0.),
                Point3::new(f32::NAN, 0., 0.),
                Point3::new(1., 2., 3.9),
            ],
            5,
        );
        let tree = OcTreePc::<Vec<usize>, _>::from_point_cloud(&cloud, 1., |leaf, index, _| {
            leaf.push(index)
        })
        .unwrap();

        assert_eq!(tree.depth(), 2);
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.get(&[0, 0, 0]), Some(&vec![0, 1]));
        assert_eq!(tree.get(&[3, 0, 0]), Some(&vec![2]));
        assert_eq!(tree.get(&[1, 2, 3]), Some(&vec![4]));

        let center = tree.center(&[1, 2, 3]);
        assert_eq!(center, Vector4::new(1.5, 2.5, 3.5, 1.));
        assert_eq!(tree.coords_to_key(&Vector4::new(-0.1, 0., 0., 1.)), None);
    }

    #[test]
    fn test_invalid_resolution() {
        let cloud = PointCloud::from_vec(vec![Point3::new(0., 0., 0.)], 1);
        let ret = OcTreePc::<(), f32>::from_point_cloud(&cloud, 0., |_, _, _| {});
        assert!(matches!(ret, Err(Error::InvalidParameter(_))));
    }
}
