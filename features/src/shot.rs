use nalgebra::{convert, ComplexField, DVector, RealField, Vector3};
use num::{One, ToPrimitive, Zero};
use pcf_common::{
    error::{Error, Result},
    feature::{Feature, Neighborhood},
    point::{Normal, Point, PointRgba},
    point_cloud::PointCloud,
};

use crate::{check_len, nan};

/// 8 azimuth × 2 elevation × 2 radial divisions of the support sphere.
const SECTORS: usize = 32;
const MIN_NEIGHBORS: usize = 5;

/// Per-worker buffers.
pub struct ShotScratch<T> {
    deltas: Vec<Vector3<T>>,
    shape: Vec<T>,
    color: Vec<T>,
}

impl<T> Default for ShotScratch<T> {
    fn default() -> Self {
        ShotScratch {
            deltas: Vec::new(),
            shape: Vec::new(),
            color: Vec::new(),
        }
    }
}

/// Flips `axis` to the side holding most of `deltas`, falling back to the
/// 5 deltas around the median on a tie.
fn disambiguate<T: RealField + Copy>(axis: Vector3<T>, deltas: &[Vector3<T>]) -> Vector3<T> {
    let len = deltas.len();
    let plus = deltas.iter().filter(|d| d.dot(&axis) >= T::zero()).count();
    let keep = match (2 * plus).cmp(&len) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => {
            let median = len / 2;
            let votes = { deltas[median - 2..=median + 2].iter() }
                .filter(|d| d.dot(&axis) > T::zero())
                .count();
            votes >= 3
        }
    };
    if keep {
        axis
    } else {
        -axis
    }
}

/// The local reference frame `[x, y, z]` of the query point: the principal
/// axes of its neighbors' covariance, weighted by `radius - distance`, with
/// signs fixed by majority.
///
/// `deltas` is filled with the offsets of the non-coincident neighbors.
pub(crate) fn local_reference_frame<P: Point>(
    n: &Neighborhood<P>,
    radius: P::Data,
    deltas: &mut Vec<Vector3<P::Data>>,
) -> Option<[Vector3<P::Data>; 3]> {
    let center = n.pivot.xyz();
    deltas.clear();

    let mut cov = nalgebra::Matrix3::zeros();
    let mut sum = P::Data::zero();
    for &(index, distance) in n.neighbors {
        let delta = n.surface[index].xyz() - center;
        if delta == Vector3::zeros() {
            continue;
        }
        let weight = radius - distance.sqrt();
        cov += delta * delta.transpose() * weight;
        sum += weight;
        deltas.push(delta);
    }
    if deltas.len() < MIN_NEIGHBORS {
        return None;
    }

    let eigen = (cov / sum).symmetric_eigen();
    if !eigen.eigenvalues.iter().all(|v| v.is_finite()) {
        return None;
    }
    let values = eigen.eigenvalues.as_slice();
    let (min, max) = (0..3).fold((0, 0), |(min, max), i| {
        (
            if values[i] < values[min] { i } else { min },
            if values[i] > values[max] { i } else { max },
        )
    });

    let x = disambiguate(eigen.eigenvectors.column(max).into_owned(), deltas);
    let z = disambiguate(eigen.eigenvectors.column(min).into_owned(), deltas);
    Some([x, z.cross(&x), z])
}

/// The spatial sector of a neighbor and its interpolation weights.
struct Sector<T> {
    index: usize,
    weight: T,
    adjacent: [Option<(usize, T)>; 3],
}

/// Locates `local`, the neighbor offset in the reference frame, among the
/// sectors and spreads its vote over the adjacent radial shell, elevation
/// half and azimuth slice.
fn sector<T: RealField + Copy>(local: Vector3<T>, distance: T, radius: T) -> Sector<T> {
    let (zero, one) = (T::zero(), T::one());
    let tiny = convert::<_, T>(1e-30);
    let flush = |v: T| if v.abs() < tiny { zero } else { v };
    let (x, y, z) = (flush(local.x), flush(local.y), flush(local.z));

    let bit4 = y > zero || (y == zero && x < zero);
    let bit3 = if x > zero || (x == zero && y > zero) {
        !bit4
    } else {
        bit4
    };
    let mut index = (bit4 as usize) * 16 + (bit3 as usize) * 8;
    index += if x * y > zero || x == zero {
        if x.abs() >= y.abs() {
            0
        } else {
            4
        }
    } else if x.abs() > y.abs() {
        4
    } else {
        0
    };
    if z > zero {
        index += 1;
    }
    let half = radius * convert(0.5);
    if distance > half {
        index += 2;
    }

    let mut weight = zero;
    let mut adjacent = [None; 3];

    if distance > half {
        let shell = radius * convert(0.75);
        let d = (distance - shell) / half;
        if distance > shell {
            weight += one - d;
        } else {
            weight += one + d;
            adjacent[0] = Some((index ^ 2, -d));
        }
    } else {
        let shell = radius * convert(0.25);
        let d = (distance - shell) / half;
        if distance < shell {
            weight += one + d;
        } else {
            weight += one - d;
            adjacent[0] = Some((index ^ 2, d));
        }
    }

    let (q, h) = (T::frac_pi_4(), T::frac_pi_2());
    let inclination = (z / distance).clamp(-one, one).acos();
    if inclination > h || (inclination == h && z <= zero) {
        let d = (inclination - q * convert(3.)) / h;
        if inclination > q * convert(3.) {
            weight += one - d;
        } else {
            weight += one + d;
            adjacent[1] = Some((index ^ 1, -d));
        }
    } else {
        let d = (inclination - q) / h;
        if inclination < q {
            weight += one + d;
        } else {
            weight += one - d;
            adjacent[1] = Some((index ^ 1, d));
        }
    }

    if y != zero || x != zero {
        let start = -T::pi() * convert(7. / 8.);
        let center = start + q * convert((index >> 2) as f64);
        let half_slice = convert::<_, T>(0.5);
        let d = ((y.atan2(x) - center) / q).clamp(-half_slice, half_slice);
        if d > zero {
            weight += one - d;
            adjacent[2] = Some(((index + 4) % SECTORS, d));
        } else {
            weight += one + d;
            adjacent[2] = Some(((index + SECTORS - 4) % SECTORS, -d));
        }
    }

    Sector {
        index,
        weight,
        adjacent,
    }
}

/// One histogram block: `bins + 1` cells per sector starting at `offset`,
/// fed by the per-neighbor bin coordinates in `distances`.
struct Channel<'c, T> {
    bins: usize,
    offset: usize,
    distances: &'c [T],
}

fn describe<P: Point>(
    n: &Neighborhood<P>,
    frame: &[Vector3<P::Data>; 3],
    radius: P::Data,
    channels: &[Channel<P::Data>],
    len: usize,
) -> DVector<P::Data> {
    let one = P::Data::one();
    let mut histogram = DVector::zeros(len);
    let pivot = n.pivot.xyz();

    for (i, &(index, distance)) in n.neighbors.iter().enumerate() {
        if !channels.iter().all(|c| c.distances[i].is_finite()) {
            continue;
        }
        let distance = distance.sqrt();
        if distance.abs() < convert(1e-15) {
            continue;
        }
        let delta = n.surface[index].xyz() - pivot;
        let local = Vector3::new(frame[0].dot(&delta), frame[1].dot(&delta), frame[2].dot(&delta));
        let sector = sector(local, distance, radius);

        for channel in channels {
            let stride = channel.bins + 1;
            let at = |sector: usize, bin: usize| channel.offset + sector * stride + bin;

            let value = channel.distances[i];
            let step = { value + convert(0.5) }.floor().to_usize().unwrap_or(0).min(channel.bins);
            let frac = value - convert(step as f64);

            histogram[at(sector.index, step)] += sector.weight + one - frac.abs();
            if frac > P::Data::zero() {
                histogram[at(sector.index, (step + 1) % channel.bins)] += frac;
            } else {
                histogram[at(sector.index, (step + channel.bins - 1) % channel.bins)] -= frac;
            }
            for &(adjacent, weight) in sector.adjacent.iter().flatten() {
                histogram[at(adjacent, step)] += weight;
            }
        }
    }

    let norm = histogram.norm();
    if norm > P::Data::zero() {
        histogram /= norm;
    }
    histogram
}

/// The shape bin coordinate of every neighbor: the cosine between its normal
/// and the frame's z axis, scaled to `[0, bins]`; NaN for invalid normals.
fn shape_distances<P: Point, N: Normal<Data = P::Data>>(
    n: &Neighborhood<P>,
    normals: &PointCloud<N>,
    z: &Vector3<P::Data>,
    bins: usize,
    out: &mut Vec<P::Data>,
) {
    let one = P::Data::one();
    out.clear();
    out.extend(n.indices().map(|index| {
        let normal = normals[index].normal().xyz();
        if normal.iter().all(|v| v.is_finite()) {
            let cos = normal.dot(z).clamp(-one, one);
            (one + cos) * convert(bins as f64 / 2.)
        } else {
            nan()
        }
    }));
}

/// Signatures of histograms of orientations.
#[derive(Debug, Clone, PartialEq)]
pub struct ShotEstimation<'a, N> {
    pub shape_bins: usize,
    pub normals: Option<&'a PointCloud<N>>,
}

impl<'a, N> ShotEstimation<'a, N> {
    pub fn new(shape_bins: usize) -> Self {
        ShotEstimation {
            shape_bins,
            normals: None,
        }
    }

    pub fn with_normals(mut self, normals: &'a PointCloud<N>) -> Self {
        self.normals = Some(normals);
        self
    }

    fn len(&self) -> usize {
        SECTORS * (self.shape_bins + 1)
    }
}

impl<'a, N> Default for ShotEstimation<'a, N> {
    fn default() -> Self {
        Self::new(10)
    }
}

fn check_common<P: Point, N>(
    name: &'static str,
    bins: &[usize],
    normals: Option<&PointCloud<N>>,
    surface: &PointCloud<P>,
    radius: Option<P::Data>,
) -> Result<()> {
    if bins.contains(&0) {
        return Err(Error::InvalidParameter(format!("{name} needs positive bin counts")));
    }
    if radius.is_none() {
        return Err(Error::InvalidParameter(format!("{name} needs a radius search")));
    }
    let normals = normals.ok_or(Error::MissingNormals(name))?;
    check_len("normals", surface.len(), normals.len())
}

impl<'a, P, N> Feature<P> for ShotEstimation<'a, N>
where
    P: Point,
    N: Normal<Data = P::Data>,
{
    const NAME: &'static str = "ShotEstimation";

    type Output = DVector<P::Data>;
    type Scratch = ShotScratch<P::Data>;

    fn check(&self, surface: &PointCloud<P>, radius: Option<P::Data>) -> Result<()> {
        check_common(<Self as Feature<P>>::NAME, &[self.shape_bins], self.normals, surface, radius)
    }

    fn invalid(&self) -> DVector<P::Data> {
        DVector::repeat(self.len(), nan())
    }

    fn compute_point(
        &self,
        n: &Neighborhood<P>,
        scratch: &mut ShotScratch<P::Data>,
    ) -> Option<DVector<P::Data>> {
        let normals = self.normals?;
        let radius = n.radius()?;
        if n.len() < MIN_NEIGHBORS {
            return None;
        }
        let frame = local_reference_frame(n, radius, &mut scratch.deltas)?;

        shape_distances(n, normals, &frame[2], self.shape_bins, &mut scratch.shape);
        let channels = [Channel {
            bins: self.shape_bins,
            offset: 0,
            distances: &scratch.shape,
        }];
        Some(describe(n, &frame, radius, &channels, self.len()))
    }
}

/// CIE L*a*b* of an sRGB color under D65, scaled to `L ∈ [0, 1]` and
/// `a, b ∈ [-1, 1]`.
fn rgb_to_lab(rgb: [u8; 3]) -> Vector3<f64> {
    let [r, g, b] = rgb.map(|c| {
        let c = c as f64 / 255.;
        if c > 0.04045 {
            ((c + 0.055) / 1.055).powf(2.4)
        } else {
            c / 12.92
        }
    });
    let x = (0.412453 * r + 0.357580 * g + 0.180423 * b) / 0.950456;
    let y = 0.212671 * r + 0.715160 * g + 0.072169 * b;
    let z = (0.019334 * r + 0.119193 * g + 0.950227 * b) / 1.088754;

    let f = |t: f64| {
        if t > 0.008856 {
            t.cbrt()
        } else {
            7.787 * t + 16. / 116.
        }
    };
    let l = if y > 0.008856 {
        116. * y.cbrt() - 16.
    } else {
        903.3 * y
    };
    Vector3::new(l / 100., 500. * (f(x) - f(y)) / 120., 200. * (f(y) - f(z)) / 120.)
}

/// SHOT with an appended block of color differences to the query point.
#[derive(Debug, Clone, PartialEq)]
pub struct ShotColorEstimation<'a, N> {
    pub shape_bins: usize,
    pub color_bins: usize,
    pub normals: Option<&'a PointCloud<N>>,
}

impl<'a, N> ShotColorEstimation<'a, N> {
    pub fn new(shape_bins: usize, color_bins: usize) -> Self {
        ShotColorEstimation {
            shape_bins,
            color_bins,
            normals: None,
        }
    }

    pub fn with_normals(mut self, normals: &'a PointCloud<N>) -> Self {
        self.normals = Some(normals);
        self
    }

    fn shape_len(&self) -> usize {
        SECTORS * (self.shape_bins + 1)
    }

    fn len(&self) -> usize {
        self.shape_len() + SECTORS * (self.color_bins + 1)
    }
}

impl<'a, N> Default for ShotColorEstimation<'a, N> {
    fn default() -> Self {
        Self::new(10, 30)
    }
}

impl<'a, P, N> Feature<P> for ShotColorEstimation<'a, N>
where
    P: PointRgba,
    N: Normal<Data = P::Data>,
{
    const NAME: &'static str = "ShotColorEstimation";

    type Output = DVector<P::Data>;
    type Scratch = ShotScratch<P::Data>;

    fn check(&self, surface: &PointCloud<P>, radius: Option<P::Data>) -> Result<()> {
        check_common(
            <Self as Feature<P>>::NAME,
            &[self.shape_bins, self.color_bins],
            self.normals,
            surface,
            radius,
        )
    }

    fn invalid(&self) -> DVector<P::Data> {
        DVector::repeat(self.len(), nan())
    }

    fn compute_point(
        &self,
        n: &Neighborhood<P>,
        scratch: &mut ShotScratch<P::Data>,
    ) -> Option<DVector<P::Data>> {
        let normals = self.normals?;
        let radius = n.radius()?;
        if n.len() < MIN_NEIGHBORS {
            return None;
        }
        let frame = local_reference_frame(n, radius, &mut scratch.deltas)?;
        shape_distances(n, normals, &frame[2], self.shape_bins, &mut scratch.shape);

        let reference = rgb_to_lab(n.pivot.rgb_array());
        scratch.color.clear();
        scratch.color.extend(n.indices().map(|index| {
            let lab = rgb_to_lab(n.surface[index].rgb_array());
            let diff = (lab - reference).abs();
            let distance = ((diff.x + (diff.y + diff.z) / 2.) / 3.).clamp(0., 1.);
            convert::<_, P::Data>(distance * self.color_bins as f64)
        }));

        let channels = [
            Channel {
                bins: self.shape_bins,
                offset: 0,
                distances: &scratch.shape,
            },
            Channel {
                bins: self.color_bins,
                offset: self.shape_len(),
                distances: &scratch.color,
            },
        ];
        Some(describe(n, &frame, radius, &channels, self.len()))
    }
}
