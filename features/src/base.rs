use std::borrow::Cow;

use log::debug;
use num::Zero;
use pcf_common::{
    error::{Error, Result},
    feature::{Feature, Neighborhood},
    point::{Data, Point},
    point_cloud::PointCloud,
    search::{Search, SearchMethod, SearchType},
};
use rayon::{prelude::*, ThreadPoolBuilder};

/// Drives a [`Feature`] over the processed points of an input cloud.
///
/// The input, the optional index subset and the optional search surface are
/// independent borrowed handles. Each call to [`Estimation::compute`]
/// resolves them into an immutable configuration before any output is
/// produced, so the same estimation can be reconfigured and recomputed.
pub struct Estimation<'a, P: Point> {
    input: Option<&'a PointCloud<P>>,
    indices: Option<Cow<'a, [usize]>>,
    surface: Option<&'a PointCloud<P>>,
    search: Option<&'a dyn SearchMethod<P>>,
    k: usize,
    radius: Option<P::Data>,
    threads: Option<isize>,
}

impl<'a, P: Point> Default for Estimation<'a, P> {
    fn default() -> Self {
        Estimation {
            input: None,
            indices: None,
            surface: None,
            search: None,
            k: 0,
            radius: None,
            threads: None,
        }
    }
}

pub(crate) struct Config<'a, 'b, P: Point> {
    pub(crate) input: &'a PointCloud<P>,
    pub(crate) indices: Cow<'b, [usize]>,
    pub(crate) surface: &'a PointCloud<P>,
    pub(crate) search_type: Option<SearchType<P::Data>>,
    /// The configured radius, kept when K drives the search.
    pub(crate) support_radius: Option<P::Data>,
}

impl<'a, P: Point> Estimation<'a, P> {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn input(&self) -> Option<&'a PointCloud<P>> {
        self.input
    }

    pub fn set_input(&mut self, input: &'a PointCloud<P>) {
        self.input = Some(input)
    }

    pub fn with_input(mut self, input: &'a PointCloud<P>) -> Self {
        self.set_input(input);
        self
    }

    pub fn indices(&self) -> Option<&[usize]> {
        self.indices.as_deref()
    }

    /// Restricts the processed points. Indices refer to the input cloud.
    pub fn set_indices(&mut self, indices: impl Into<Cow<'a, [usize]>>) {
        self.indices = Some(indices.into())
    }

    pub fn with_indices(mut self, indices: impl Into<Cow<'a, [usize]>>) -> Self {
        self.set_indices(indices);
        self
    }

    pub fn clear_indices(&mut self) {
        self.indices = None
    }

    /// The cloud neighbors are searched in. Defaults to the input.
    pub fn search_surface(&self) -> Option<&'a PointCloud<P>> {
        self.surface.or(self.input)
    }

    pub fn set_search_surface(&mut self, surface: &'a PointCloud<P>) {
        self.surface = Some(surface)
    }

    pub fn with_search_surface(mut self, surface: &'a PointCloud<P>) -> Self {
        self.set_search_surface(surface);
        self
    }

    pub fn set_search_method(&mut self, search: &'a dyn SearchMethod<P>) {
        self.search = Some(search)
    }

    pub fn with_search_method(mut self, search: &'a dyn SearchMethod<P>) -> Self {
        self.set_search_method(search);
        self
    }

    pub fn k_search(&self) -> usize {
        self.k
    }

    /// `0` leaves K unset.
    pub fn set_k_search(&mut self, k: usize) {
        self.k = k
    }

    pub fn with_k_search(mut self, k: usize) -> Self {
        self.set_k_search(k);
        self
    }

    pub fn radius_search(&self) -> Option<P::Data> {
        self.radius
    }

    /// A non-positive radius leaves it unset.
    pub fn set_radius_search(&mut self, radius: P::Data) {
        self.radius = (radius > P::Data::zero()).then_some(radius)
    }

    pub fn with_radius_search(mut self, radius: P::Data) -> Self {
        self.set_radius_search(radius);
        self
    }

    /// Runs on a pool of `threads` workers, all hardware threads if it is not
    /// positive.
    pub fn set_threads(&mut self, threads: isize) {
        self.threads = Some(threads)
    }

    pub fn with_threads(mut self, threads: isize) -> Self {
        self.set_threads(threads);
        self
    }

    /// Back to running on the calling thread.
    pub fn clear_threads(&mut self) {
        self.threads = None
    }

    pub(crate) fn resolve(&self, needs_search: bool) -> Result<Config<'a, '_, P>> {
        let input = self.input.ok_or(Error::MissingInput)?;
        let surface = self.surface.unwrap_or(input);

        let search_type = if needs_search {
            if self.search.is_none() {
                return Err(Error::MissingSearchMethod);
            }
            Some(match (self.k, self.radius) {
                (0, None) => return Err(Error::MissingSearchParameter),
                (0, Some(radius)) => SearchType::Radius(radius),
                (k, radius) => {
                    if let Some(radius) = radius {
                        debug!("both K = {k} and radius = {radius} are set, using K with the radius as support");
                    }
                    SearchType::Knn(k)
                }
            })
        } else {
            None
        };

        let indices = match &self.indices {
            Some(indices) => {
                if let Some(&index) = indices.iter().find(|&&index| index >= input.len()) {
                    return Err(Error::IndexOutOfBounds {
                        index,
                        len: input.len(),
                    });
                }
                Cow::Borrowed(&**indices)
            }
            None => Cow::Owned((0..input.len()).collect()),
        };

        Ok(Config {
            input,
            indices,
            surface,
            search_type,
            support_radius: search_type.and(self.radius),
        })
    }

    /// Computes one record per processed point, in index order.
    ///
    /// The output is organized like the input when no index subset is set.
    pub fn compute<F: Feature<P>>(&self, feature: &F) -> Result<PointCloud<F::Output>> {
        let config = self.resolve(F::NEEDS_SEARCH)?;
        feature.check(config.surface, config.support_radius)?;

        let search = match (config.search_type, self.search) {
            (Some(_), Some(method)) => Some(method.build(config.surface)),
            _ => None,
        };
        let search = search.as_deref();

        debug!(
            "{}: computing {} points over a surface of {} points",
            F::NAME,
            config.indices.len(),
            config.surface.len()
        );

        let mut storage = vec![feature.invalid(); config.indices.len()];
        let point = |index: usize, buffer: &mut Vec<_>, scratch: &mut F::Scratch| {
            compute_point(feature, &config, search, index, buffer, scratch)
        };

        match self.threads {
            None => {
                let mut buffer = Vec::new();
                let mut scratch = F::Scratch::default();
                for (slot, &index) in storage.iter_mut().zip(config.indices.iter()) {
                    if let Some(record) = point(index, &mut buffer, &mut scratch) {
                        *slot = record;
                    }
                }
            }
            Some(threads) => {
                let pool = ThreadPoolBuilder::new()
                    .num_threads(threads.max(0) as usize)
                    .build()
                    .map_err(|err| Error::InvalidParameter(err.to_string()))?;
                pool.install(|| {
                    storage
                        .par_iter_mut()
                        .zip(config.indices.par_iter())
                        .for_each_init(
                            || (Vec::new(), F::Scratch::default()),
                            |(buffer, scratch), (slot, &index)| {
                                if let Some(record) = point(index, buffer, scratch) {
                                    *slot = record;
                                }
                            },
                        )
                });
            }
        }

        let invalid = storage.iter().filter(|record| !record.is_finite()).count();
        if invalid > 0 {
            debug!("{}: {invalid} of {} records are invalid", F::NAME, storage.len());
        }

        let width = match self.indices {
            Some(_) => storage.len(),
            None => config.input.width(),
        };
        Ok(PointCloud::from_vec(storage, width))
    }

    /// Like [`Estimation::compute`], leaving `output` untouched on failure.
    pub fn compute_into<F: Feature<P>>(
        &self,
        feature: &F,
        output: &mut PointCloud<F::Output>,
    ) -> Result<()> {
        *output = self.compute(feature)?;
        Ok(())
    }
}

fn compute_point<P: Point, F: Feature<P>>(
    feature: &F,
    config: &Config<P>,
    search: Option<&dyn Search<P>>,
    index: usize,
    buffer: &mut Vec<(usize, P::Data)>,
    scratch: &mut F::Scratch,
) -> Option<F::Output> {
    let pivot = &config.input[index];
    if !pivot.is_finite() {
        return None;
    }

    buffer.clear();
    let pivot_index = match (search, config.search_type) {
        (Some(search), Some(ty)) => {
            search.search(pivot.coords(), ty, buffer);
            if buffer.is_empty() {
                return None;
            }
            { buffer.iter() }
                .take_while(|&&(_, distance)| distance == P::Data::zero())
                .find(|&&(i, _)| config.surface[i].xyz() == pivot.xyz())
                .map(|&(i, _)| i)
        }
        _ => { config.surface.iter() }.position(|point| point.xyz() == pivot.xyz()),
    };

    let neighborhood = Neighborhood {
        surface: config.surface,
        search,
        search_type: config.search_type,
        support_radius: config.support_radius,
        pivot,
        pivot_index,
        neighbors: &buffer[..],
    };
    feature.compute_point(&neighborhood, scratch)
}
