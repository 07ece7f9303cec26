use std::collections::{HashMap, VecDeque};

use nalgebra::{convert, DVector, RealField, Vector3};
use num::{One, ToPrimitive};
use pcf_common::{
    error::{Error, Result},
    feature::{Feature, Neighborhood},
    point::{Normal, Point},
    point_cloud::PointCloud,
};

use crate::{bin, check_len, nan};

/// The Darboux frame features of a point pair.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PairFeatures<T> {
    /// The angle of the second normal around the frame, in `[-π, π]`.
    pub theta: T,
    /// `v · n2`, in `[-1, 1]`.
    pub alpha: T,
    /// `u · d / |d|`, in `[-1, 1]`.
    pub phi: T,
    pub distance: T,
}

/// Builds the frame on whichever point's normal makes the smaller angle
/// with the connecting line, so both orders of a pair agree.
///
/// Returns `None` for coincident points, non-finite inputs or a normal
/// parallel to the connecting line.
pub fn compute_pair_features<T: RealField + Copy>(
    [p1, n1]: [&Vector3<T>; 2],
    [p2, n2]: [&Vector3<T>; 2],
) -> Option<PairFeatures<T>> {
    let finite = |v: &Vector3<T>| v.iter().all(|x| x.is_finite());
    if !(finite(p1) && finite(n1) && finite(p2) && finite(n2)) {
        return None;
    }

    let mut delta = p2 - p1;
    let distance = delta.norm();
    if distance == T::zero() {
        return None;
    }

    let angle1 = n1.dot(&delta) / distance;
    let angle2 = n2.dot(&delta) / distance;
    let (u, n2, phi) = if angle1.abs().acos() > angle2.abs().acos() {
        delta = -delta;
        (n2, n1, -angle2)
    } else {
        (n1, n2, angle1)
    };

    let v = delta.cross(u);
    let v_norm = v.norm();
    if v_norm == T::zero() {
        return None;
    }
    let v = v / v_norm;
    let w = u.cross(&v);

    Some(PairFeatures {
        theta: w.dot(n2).atan2(u.dot(n2)),
        alpha: v.dot(n2),
        phi,
        distance,
    })
}

impl<T: RealField + ToPrimitive + Copy> PairFeatures<T> {
    /// The bins of `theta`, `alpha` and `phi`.
    pub(crate) fn bins(&self, [b0, b1, b2]: [usize; 3]) -> [usize; 3] {
        let half: T = convert(0.5);
        [
            bin((self.theta + T::pi()) / T::two_pi(), b0),
            bin((self.alpha + T::one()) * half, b1),
            bin((self.phi + T::one()) * half, b2),
        ]
    }
}

/// Per-worker pair cache, keyed by the ordered surface index pair and
/// evicted in insertion order.
#[derive(Debug)]
pub struct PairCache<T> {
    map: HashMap<(usize, usize), Option<PairFeatures<T>>>,
    keys: VecDeque<(usize, usize)>,
}

impl<T> Default for PairCache<T> {
    fn default() -> Self {
        PairCache {
            map: HashMap::new(),
            keys: VecDeque::new(),
        }
    }
}

/// Point feature histograms: every pair of the neighborhood binned jointly
/// into `subdivision³` bins summing to 100.
#[derive(Debug, Clone, PartialEq)]
pub struct PfhEstimation<'a, N> {
    pub subdivision: usize,
    /// The capacity of each worker's pair cache, 0 to disable it.
    pub cache_size: usize,
    pub normals: Option<&'a PointCloud<N>>,
}

impl<'a, N> PfhEstimation<'a, N> {
    pub fn new(subdivision: usize) -> Self {
        PfhEstimation {
            subdivision,
            cache_size: 0,
            normals: None,
        }
    }

    pub fn with_normals(mut self, normals: &'a PointCloud<N>) -> Self {
        self.normals = Some(normals);
        self
    }

    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }
}

impl<'a, N> Default for PfhEstimation<'a, N> {
    fn default() -> Self {
        Self::new(5)
    }
}

impl<'a, N: Normal> PfhEstimation<'a, N> {
    fn pair<P: Point<Data = N::Data>>(
        &self,
        surface: &PointCloud<P>,
        normals: &PointCloud<N>,
        key: (usize, usize),
        cache: &mut PairCache<N::Data>,
    ) -> Option<PairFeatures<N::Data>> {
        if self.cache_size > 0 {
            if let Some(&pair) = cache.map.get(&key) {
                return pair;
            }
        }

        let (i, j) = key;
        let pair = compute_pair_features(
            [&surface[i].xyz(), &normals[i].normal().xyz()],
            [&surface[j].xyz(), &normals[j].normal().xyz()],
        );

        if self.cache_size > 0 {
            cache.map.insert(key, pair);
            cache.keys.push_back(key);
            if cache.keys.len() > self.cache_size {
                if let Some(old) = cache.keys.pop_front() {
                    cache.map.remove(&old);
                }
            }
        }
        pair
    }
}

impl<'a, P, N> Feature<P> for PfhEstimation<'a, N>
where
    P: Point,
    N: Normal<Data = P::Data>,
{
    const NAME: &'static str = "PfhEstimation";

    type Output = DVector<P::Data>;
    type Scratch = PairCache<P::Data>;

    fn check(&self, surface: &PointCloud<P>, _: Option<P::Data>) -> Result<()> {
        if self.subdivision == 0 {
            return Err(Error::InvalidParameter("PFH needs at least 1 subdivision".into()));
        }
        let normals = { self.normals }.ok_or(Error::MissingNormals(<Self as Feature<P>>::NAME))?;
        check_len("normals", surface.len(), normals.len())
    }

    fn invalid(&self) -> DVector<P::Data> {
        DVector::repeat(self.subdivision.pow(3), nan())
    }

    fn compute_point(
        &self,
        n: &Neighborhood<P>,
        cache: &mut PairCache<P::Data>,
    ) -> Option<DVector<P::Data>> {
        let normals = self.normals?;
        if n.len() < 2 {
            return None;
        }

        let s = self.subdivision;
        let mut histogram = DVector::zeros(s * s * s);
        let mut valid = 0usize;
        for (count, &(i, _)) in n.neighbors.iter().enumerate() {
            for &(j, _) in &n.neighbors[..count] {
                let key = (i.min(j), i.max(j));
                let pair = match self.pair(n.surface, normals, key, cache) {
                    Some(pair) => pair,
                    None => continue,
                };
                let [f0, f1, f2] = pair.bins([s; 3]);
                histogram[f0 + f1 * s + f2 * s * s] += P::Data::one();
                valid += 1;
            }
        }
        if valid == 0 {
            return None;
        }

        histogram *= convert::<_, P::Data>(100. / valid as f64);
        Some(histogram)
    }
}
