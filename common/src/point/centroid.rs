use std::collections::BTreeMap;

use nalgebra::Vector3;

use super::{Point, Point3, Point3I, Point3L, Point3Rgba};

pub trait Centroid {
    type Accumulator;

    fn default_builder() -> CentroidBuilder<Self>
    where
        Self: Sized,
        Self::Accumulator: Default,
    {
        CentroidBuilder::default()
    }

    fn accumulate(&self, accum: &mut Self::Accumulator);

    fn compute(accum: Self::Accumulator, num: usize) -> Self;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CentroidBuilder<T: Centroid> {
    accum: T::Accumulator,
    num: usize,
}

impl<T: Centroid> Default for CentroidBuilder<T>
where
    T::Accumulator: Default,
{
    fn default() -> Self {
        Self::new(T::Accumulator::default())
    }
}

impl<T: Centroid> CentroidBuilder<T> {
    pub fn new(accum: T::Accumulator) -> Self {
        CentroidBuilder { accum, num: 0 }
    }

    pub fn accumulate(&mut self, obj: &T) {
        obj.accumulate(&mut self.accum);
        self.num += 1;
    }

    pub fn num(&self) -> usize {
        self.num
    }

    pub fn compute(self) -> Option<T> {
        (self.num > 0).then(|| T::compute(self.accum, self.num))
    }
}

fn mean(sum: Vector3<f32>, num: usize) -> Point3 {
    let c = sum / num as f32;
    Point3::new(c.x, c.y, c.z)
}

impl Centroid for Point3 {
    type Accumulator = Vector3<f32>;

    fn accumulate(&self, accum: &mut Self::Accumulator) {
        *accum += self.xyz();
    }

    fn compute(accum: Self::Accumulator, num: usize) -> Self {
        mean(accum, num)
    }
}

impl Centroid for Point3I {
    type Accumulator = (Vector3<f32>, f32);

    fn accumulate(&self, accum: &mut Self::Accumulator) {
        accum.0 += self.xyz();
        accum.1 += self.intensity;
    }

    fn compute((coords, intensity): Self::Accumulator, num: usize) -> Self {
        Point3I {
            coords: mean(coords, num).coords,
            intensity: intensity / num as f32,
        }
    }
}

impl Centroid for Point3Rgba {
    type Accumulator = (Vector3<f32>, [f32; 4]);

    fn accumulate(&self, accum: &mut Self::Accumulator) {
        accum.0 += self.xyz();
        for (i, channel) in accum.1.iter_mut().enumerate() {
            *channel += ((self.rgba >> (i * 8)) & 0xff) as f32;
        }
    }

    fn compute((coords, channels): Self::Accumulator, num: usize) -> Self {
        let rgba = { channels.iter().enumerate() }
            .fold(0, |acc, (i, &c)| acc | (((c / num as f32) as u32) << (i * 8)));
        Point3Rgba {
            coords: mean(coords, num).coords,
            rgba,
        }
    }
}

/// The label of the centroid is the most frequent one; ties go to the
/// smallest label.
impl Centroid for Point3L {
    type Accumulator = (Vector3<f32>, BTreeMap<u32, usize>);

    fn accumulate(&self, accum: &mut Self::Accumulator) {
        accum.0 += self.xyz();
        *accum.1.entry(self.label).or_default() += 1;
    }

    fn compute((coords, labels): Self::Accumulator, num: usize) -> Self {
        let (label, _) = labels.into_iter().fold((0, 0), |(label, count), (l, c)| {
            if c > count {
                (l, c)
            } else {
                (label, count)
            }
        });
        Point3L {
            coords: mean(coords, num).coords,
            label,
        }
    }
}
