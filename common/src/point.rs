#[macro_use]
mod macros;
mod centroid;

use core::fmt::Debug;

use nalgebra::{DMatrix, DVector, RealField, Vector3, Vector4};
use num::ToPrimitive;

pub use self::centroid::{Centroid, CentroidBuilder};

pub trait Data: Debug + Clone + PartialEq {
    fn is_finite(&self) -> bool;
}

pub trait Point: Data + Copy + Default + Send + Sync {
    type Data: RealField + ToPrimitive + Copy + Send + Sync;

    fn coords(&self) -> &Vector4<Self::Data>;

    fn coords_mut(&mut self) -> &mut Vector4<Self::Data>;
    #[inline]
    fn with_coords(mut self, coords: Vector4<Self::Data>) -> Self {
        *self.coords_mut() = coords;
        self
    }

    #[inline]
    fn xyz(&self) -> Vector3<Self::Data> {
        self.coords().xyz()
    }
}

/// Packed as `0xAARRGGBB`.
pub trait PointRgba: Point {
    fn rgba(&self) -> u32;

    fn set_rgba(&mut self, rgba: u32);
    #[inline]
    fn with_rgba(mut self, rgba: u32) -> Self {
        self.set_rgba(rgba);
        self
    }

    #[inline]
    fn rgb_array(&self) -> [u8; 3] {
        let rgba = self.rgba();
        [(rgba >> 16) as u8, (rgba >> 8) as u8, rgba as u8]
    }
}

pub trait Normal: Data + Copy + Default + Send + Sync {
    type Data: RealField + ToPrimitive + Copy + Send + Sync;

    fn normal(&self) -> &Vector4<Self::Data>;

    fn normal_mut(&mut self) -> &mut Vector4<Self::Data>;
    #[inline]
    fn with_normal(mut self, normal: Vector4<Self::Data>) -> Self {
        *self.normal_mut() = normal;
        self
    }

    fn curvature(&self) -> Self::Data;

    fn set_curvature(&mut self, curvature: Self::Data);
    #[inline]
    fn with_curvature(mut self, curvature: Self::Data) -> Self {
        self.set_curvature(curvature);
        self
    }
}

pub trait PointIntensity: Point {
    fn intensity(&self) -> Self::Data;

    fn set_intensity(&mut self, intensity: Self::Data);
    #[inline]
    fn with_intensity(mut self, intensity: Self::Data) -> Self {
        self.set_intensity(intensity);
        self
    }
}

pub trait PointLabel: Point {
    fn label(&self) -> u32;

    fn set_label(&mut self, label: u32);
    #[inline]
    fn with_label(mut self, label: u32) -> Self {
        self.set_label(label);
        self
    }
}

define_points! {
    pub struct Point3 {}

    pub struct Point3I { intensity: f32 }

    pub struct Point3Rgba { rgba: u32 }

    pub struct Point3L { label: u32 }
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Normal3 {
    pub normal: Vector4<f32>,
    pub curvature: f32,
}

impl Normal3 {
    pub fn new(x: f32, y: f32, z: f32, curvature: f32) -> Self {
        Normal3 {
            normal: Vector4::new(x, y, z, 0.),
            curvature,
        }
    }
}

impl Data for Normal3 {
    fn is_finite(&self) -> bool {
        self.normal.xyz().iter().all(|v| v.is_finite()) && self.curvature.is_finite()
    }
}

impl Normal for Normal3 {
    type Data = f32;

    fn normal(&self) -> &Vector4<f32> {
        &self.normal
    }

    fn normal_mut(&mut self) -> &mut Vector4<f32> {
        &mut self.normal
    }

    fn curvature(&self) -> f32 {
        self.curvature
    }

    fn set_curvature(&mut self, curvature: f32) {
        self.curvature = curvature
    }
}

impl Data for bool {
    fn is_finite(&self) -> bool {
        true
    }
}

impl<T: RealField> Data for Vector3<T> {
    fn is_finite(&self) -> bool {
        self.iter().all(|v| v.is_finite())
    }
}

impl<T: RealField> Data for DVector<T> {
    fn is_finite(&self) -> bool {
        self.iter().all(|v| v.is_finite())
    }
}

impl<T: RealField> Data for DMatrix<T> {
    fn is_finite(&self) -> bool {
        self.iter().all(|v| v.is_finite())
    }
}

impl<D: Data> Data for Vec<D> {
    fn is_finite(&self) -> bool {
        self.iter().all(Data::is_finite)
    }
}
