use nalgebra::{convert, ComplexField, DVector, RealField, Vector3};
use num::{One, ToPrimitive, Zero};
use pcf_common::{
    error::{Error, Result},
    feature::{Feature, Neighborhood},
    normal::unit_orthogonal,
    point::{Data, Normal, Point},
    point_cloud::PointCloud,
    search::SearchType,
};

use crate::{check_len, nan, shot::local_reference_frame, to_f64};

/// The cells of a shape context: the support sphere split into azimuth ×
/// elevation × radial cells, the radial edges spaced logarithmically from
/// `min_radius` to the support radius.
///
/// Histograms are laid out azimuth-major, radial-minor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeContextBins<T> {
    pub azimuth: usize,
    pub elevation: usize,
    pub radial: usize,
    /// The outer edge of the first radial shell.
    pub min_radius: T,
    /// Each vote is divided by the number of surface points within this
    /// radius of the neighbor; 0 leaves votes undivided.
    pub point_density_radius: T,
}

impl<T: RealField> Default for ShapeContextBins<T> {
    fn default() -> Self {
        ShapeContextBins {
            azimuth: 12,
            elevation: 11,
            radial: 15,
            min_radius: convert(0.1),
            point_density_radius: T::zero(),
        }
    }
}

impl<T: RealField + ToPrimitive + Copy> ShapeContextBins<T> {
    pub fn len(&self) -> usize {
        self.azimuth * self.elevation * self.radial
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self, name: &'static str, radius: Option<T>) -> Result<()> {
        if self.is_empty() {
            return Err(Error::InvalidParameter(format!("{name} needs positive bin counts")));
        }
        let radius = radius.ok_or_else(|| Error::InvalidParameter(format!("{name} needs a radius search")))?;
        if !(self.min_radius > T::zero() && self.min_radius < radius) {
            return Err(Error::InvalidParameter(format!(
                "{name}: minimal radius {} is not within (0, {})",
                to_f64(self.min_radius),
                to_f64(radius)
            )));
        }
        if !(self.point_density_radius >= T::zero()) {
            return Err(Error::InvalidParameter(format!(
                "{name}: point density radius {} is negative",
                to_f64(self.point_density_radius)
            )));
        }
        Ok(())
    }

    /// The `radial + 1` shell edges, from `min_radius` to exactly `radius`.
    fn radial_edges(&self, radius: T) -> Vec<T> {
        let start = self.min_radius.ln();
        let step = (radius / self.min_radius).ln() / convert(self.radial as f64);
        { 0..=self.radial }
            .map(|j| {
                if j == self.radial {
                    radius
                } else {
                    (start + step * convert(j as f64)).exp()
                }
            })
            .collect()
    }

    /// The inverse volume of every cell.
    fn inverse_volumes(&self, edges: &[T]) -> Vec<T> {
        let elevation = T::pi() / convert(self.elevation as f64);
        let azimuth = T::two_pi() / convert(self.azimuth as f64);
        let three = convert::<_, T>(3.);

        let mut volumes = Vec::with_capacity(self.len());
        for _ in 0..self.azimuth {
            for k in 0..self.elevation {
                let band = (elevation * convert(k as f64)).cos() - (elevation * convert((k + 1) as f64)).cos();
                for j in 0..self.radial {
                    let shell = edges[j + 1].powi(3) - edges[j].powi(3);
                    volumes.push(three / (shell * band * azimuth));
                }
            }
        }
        volumes
    }
}

/// A shape context record: the frame the histogram is laid out in and the
/// density-weighted cell votes.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeContext<T: RealField> {
    /// The x, y and z axes.
    pub frame: [Vector3<T>; 3],
    pub histogram: DVector<T>,
}

impl<T: RealField> ShapeContext<T> {
    fn nan(len: usize) -> Self {
        ShapeContext {
            frame: [Vector3::repeat(nan()), Vector3::repeat(nan()), Vector3::repeat(nan())],
            histogram: DVector::repeat(len, nan()),
        }
    }
}

impl<T: RealField> Data for ShapeContext<T> {
    fn is_finite(&self) -> bool {
        self.frame.iter().all(Data::is_finite) && Data::is_finite(&self.histogram)
    }
}

/// Per-worker buffers, plus the cell geometry of the current support radius.
pub struct ShapeContextScratch<T> {
    edges: Vec<T>,
    volumes: Vec<T>,
    density: Vec<(usize, T)>,
    local: Vec<(usize, T)>,
    deltas: Vec<Vector3<T>>,
}

impl<T> Default for ShapeContextScratch<T> {
    fn default() -> Self {
        ShapeContextScratch {
            edges: Vec::new(),
            volumes: Vec::new(),
            density: Vec::new(),
            local: Vec::new(),
            deltas: Vec::new(),
        }
    }
}

/// Votes every neighbor of `n` within `radius` into the cells around the
/// frame's z axis, azimuth measured from its x axis.
fn accumulate<P: Point>(
    bins: &ShapeContextBins<P::Data>,
    n: &Neighborhood<P>,
    radius: P::Data,
    frame: &[Vector3<P::Data>; 3],
    scratch: &mut ShapeContextScratch<P::Data>,
) -> DVector<P::Data> {
    if scratch.volumes.is_empty() {
        scratch.edges = bins.radial_edges(radius);
        scratch.volumes = bins.inverse_volumes(&scratch.edges);
    }
    let (zero, one) = (P::Data::zero(), P::Data::one());
    let elevation = P::Data::pi() / convert(bins.elevation as f64);
    let azimuth = P::Data::two_pi() / convert(bins.azimuth as f64);
    let [x, _, z] = frame;
    let pivot = n.pivot.xyz();

    let mut histogram = DVector::zeros(bins.len());
    for &(index, distance) in n.neighbors {
        if distance == zero {
            continue;
        }
        let r = distance.sqrt();
        if r > radius {
            continue;
        }
        let delta = n.surface[index].xyz() - pivot;

        let projected = (delta - z * z.dot(&delta)).normalize();
        let cross = x.cross(&projected);
        let mut phi = cross.norm().atan2(x.dot(&projected));
        if cross.dot(z) < zero {
            phi = P::Data::two_pi() - phi;
        }
        let theta = (z.dot(&delta) / r).clamp(-one, one).acos();

        let j = scratch.edges[1..].iter().position(|&edge| r <= edge).unwrap_or(0);
        let k = (1..=bins.elevation)
            .position(|b| theta <= elevation * convert(b as f64))
            .unwrap_or(0);
        let l = (1..=bins.azimuth)
            .position(|b| phi <= azimuth * convert(b as f64))
            .unwrap_or(0);

        let density = if bins.point_density_radius > zero {
            n.search_radius_around(index, bins.point_density_radius, &mut scratch.density);
            scratch.density.len()
        } else {
            1
        };
        if density == 0 {
            continue;
        }

        let cell = (l * bins.elevation + k) * bins.radial + j;
        histogram[cell] += scratch.volumes[cell] / convert(density as f64);
    }
    histogram
}

/// 3D shape contexts: the shape context around the query normal, azimuth
/// measured from a fixed direction orthogonal to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeContext3DEstimation<'a, N: Normal> {
    pub bins: ShapeContextBins<N::Data>,
    pub normals: Option<&'a PointCloud<N>>,
}

impl<'a, N: Normal> ShapeContext3DEstimation<'a, N> {
    pub fn new(bins: ShapeContextBins<N::Data>) -> Self {
        ShapeContext3DEstimation { bins, normals: None }
    }

    pub fn with_normals(mut self, normals: &'a PointCloud<N>) -> Self {
        self.normals = Some(normals);
        self
    }
}

impl<'a, N: Normal> Default for ShapeContext3DEstimation<'a, N> {
    fn default() -> Self {
        Self::new(ShapeContextBins::default())
    }
}

impl<'a, P, N> Feature<P> for ShapeContext3DEstimation<'a, N>
where
    P: Point,
    N: Normal<Data = P::Data>,
{
    const NAME: &'static str = "ShapeContext3DEstimation";

    type Output = ShapeContext<P::Data>;
    type Scratch = ShapeContextScratch<P::Data>;

    fn check(&self, surface: &PointCloud<P>, radius: Option<P::Data>) -> Result<()> {
        self.bins.check(<Self as Feature<P>>::NAME, radius)?;
        let normals = { self.normals }.ok_or(Error::MissingNormals(<Self as Feature<P>>::NAME))?;
        check_len("normals", surface.len(), normals.len())
    }

    fn invalid(&self) -> ShapeContext<P::Data> {
        ShapeContext::nan(self.bins.len())
    }

    fn compute_point(
        &self,
        n: &Neighborhood<P>,
        scratch: &mut ShapeContextScratch<P::Data>,
    ) -> Option<ShapeContext<P::Data>> {
        let normals = self.normals?;
        let radius = n.radius()?;
        let z = normals[n.pivot_index?].normal().xyz();
        if !z.iter().all(|v| v.is_finite()) {
            return None;
        }
        let x = unit_orthogonal(&z);
        let frame = [x, z.cross(&x), z];

        let histogram = accumulate(&self.bins, n, radius, &frame, scratch);
        Some(ShapeContext { frame, histogram })
    }
}

/// Unique shape contexts: the shape context laid out in the SHOT reference
/// frame of the query point, so no azimuth rotation is left to resolve.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueShapeContext<T> {
    pub bins: ShapeContextBins<T>,
    /// The radius the reference frame is fitted over; the support radius
    /// when `None`.
    pub local_radius: Option<T>,
}

impl<T> UniqueShapeContext<T> {
    pub fn new(bins: ShapeContextBins<T>) -> Self {
        UniqueShapeContext {
            bins,
            local_radius: None,
        }
    }

    pub fn with_local_radius(mut self, local_radius: T) -> Self {
        self.local_radius = Some(local_radius);
        self
    }
}

impl<T: RealField> Default for UniqueShapeContext<T> {
    fn default() -> Self {
        Self::new(ShapeContextBins::default())
    }
}

impl<P: Point> Feature<P> for UniqueShapeContext<P::Data> {
    const NAME: &'static str = "UniqueShapeContext";

    type Output = ShapeContext<P::Data>;
    type Scratch = ShapeContextScratch<P::Data>;

    fn check(&self, _: &PointCloud<P>, radius: Option<P::Data>) -> Result<()> {
        self.bins.check(<Self as Feature<P>>::NAME, radius)?;
        match self.local_radius {
            Some(local) if !(local > P::Data::zero()) => Err(Error::InvalidParameter(format!(
                "local radius {} is not positive",
                to_f64(local)
            ))),
            _ => Ok(()),
        }
    }

    fn invalid(&self) -> ShapeContext<P::Data> {
        ShapeContext::nan(self.bins.len())
    }

    fn compute_point(
        &self,
        n: &Neighborhood<P>,
        scratch: &mut ShapeContextScratch<P::Data>,
    ) -> Option<ShapeContext<P::Data>> {
        let radius = n.radius()?;
        let local = self.local_radius.unwrap_or(radius);

        let frame = if local == radius {
            local_reference_frame(n, radius, &mut scratch.deltas)?
        } else {
            let search = n.search?;
            scratch.local.clear();
            search.search(n.pivot.coords(), SearchType::Radius(local), &mut scratch.local);
            let around = Neighborhood {
                search_type: Some(SearchType::Radius(local)),
                support_radius: Some(local),
                neighbors: &scratch.local,
                ..*n
            };
            local_reference_frame(&around, local, &mut scratch.deltas)?
        };

        let histogram = accumulate(&self.bins, n, radius, &frame, scratch);
        Some(ShapeContext { frame, histogram })
    }
}
