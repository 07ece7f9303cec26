//! Local surface descriptors over point clouds.
//!
//! Every descriptor implements [`Feature`] and runs through the same
//! [`Estimation`] driver, sequentially or on a worker pool.

mod base;
mod boundary;
mod curvature;
mod fpfh;
mod gfpfh;
mod intensity;
mod moment;
mod normal;
mod pfh;
mod ppf;
mod rift;
mod rsd;
mod shape_context;
mod shot;
mod spin;
mod vfh;

use nalgebra::{convert, RealField};
use num::ToPrimitive;
pub use pcf_common::feature::{Feature, Neighborhood};
use pcf_common::error::{Error, Result};

pub use self::{
    base::Estimation,
    boundary::BoundaryEstimation,
    curvature::{PrincipalCurvatures, PrincipalCurvaturesEstimation},
    fpfh::FpfhEstimation,
    gfpfh::GfpfhEstimation,
    intensity::{IntensityGradientEstimation, IntensitySpinEstimation},
    moment::MomentInvariant,
    normal::NormalEstimation,
    pfh::{compute_pair_features, PairCache, PairFeatures, PfhEstimation},
    ppf::{Ppf, PpfEstimation},
    rift::RiftEstimation,
    rsd::{PrincipalRadii, RsdEstimation},
    shape_context::{ShapeContext, ShapeContext3DEstimation, ShapeContextBins, UniqueShapeContext},
    shot::{ShotColorEstimation, ShotEstimation},
    spin::{SpinImageEstimation, SpinImageFlags},
    vfh::VfhEstimation,
};

#[inline]
pub(crate) fn nan<T: RealField>() -> T {
    convert(f64::NAN)
}

#[inline]
pub(crate) fn epsilon<T: RealField>() -> T {
    T::default_epsilon()
}

/// The bin of `ratio` (nominally in `[0, 1)`) among `bins` bins, clamped to
/// the valid range.
pub(crate) fn bin<T: RealField + ToPrimitive + Copy>(ratio: T, bins: usize) -> usize {
    let scaled = (ratio * convert::<_, T>(bins as f64)).floor();
    scaled.to_usize().unwrap_or(0).min(bins.saturating_sub(1))
}

#[inline]
pub(crate) fn to_f64<T: ToPrimitive>(value: T) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::SizeMismatch {
            what,
            expected,
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin() {
        assert_eq!(bin(0.0f32, 5), 0);
        assert_eq!(bin(0.39f32, 5), 1);
        assert_eq!(bin(1.0f32, 5), 4);
        assert_eq!(bin(-0.1f32, 5), 0);
        assert_eq!(bin(f32::NAN, 5), 0);
    }
}
