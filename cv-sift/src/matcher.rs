use crate::descriptor::SiftDescriptor;
use crate::error::{Result, SiftError};
use crate::params::{DistanceFn, MatcherParams};
use float_ord::FloatOrd;
use log::debug;
use std::fmt;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// A correspondence between descriptor `a` of the first set and its nearest
/// neighbour `b` in the second set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiftMatch<'a> {
    pub a: &'a SiftDescriptor,
    pub b: &'a SiftDescriptor,
    pub index_a: usize,
    pub index_b: usize,
    pub distance: f32,
}

/// A [`SiftMatch`] that also reports the runner-up the ratio test was
/// evaluated against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiftMatch3<'a> {
    pub a: &'a SiftDescriptor,
    pub b: &'a SiftDescriptor,
    /// Second nearest neighbour of `a`; `None` if the second set holds a single descriptor.
    pub second: Option<&'a SiftDescriptor>,
    pub index_a: usize,
    pub index_b: usize,
    pub index_second: Option<usize>,
    pub distance: f32,
    /// Distance to `second`, infinite when there is none.
    pub second_distance: f32,
}

impl<'a> SiftMatch3<'a> {
    /// Nearest over second nearest distance; zero when there is no runner-up.
    pub fn ratio(&self) -> f32 {
        self.distance / self.second_distance
    }
}

impl<'a> From<SiftMatch3<'a>> for SiftMatch<'a> {
    fn from(m: SiftMatch3<'a>) -> Self {
        SiftMatch {
            a: m.a,
            b: m.b,
            index_a: m.index_a,
            index_b: m.index_b,
            distance: m.distance,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Neighbours {
    best: (usize, f32),
    second: Option<(usize, f32)>,
}

/// Nearest and second nearest entries of `set`; ties keep the lower index.
fn two_nearest(query: &[f32], set: &[SiftDescriptor], distance: DistanceFn) -> Option<Neighbours> {
    let mut best: Option<(usize, f32)> = None;
    let mut second: Option<(usize, f32)> = None;
    for (j, candidate) in set.iter().enumerate() {
        let d = distance(query, &candidate.features);
        match best {
            Some((_, best_d)) if d >= best_d => {
                if second.map_or(true, |(_, second_d)| d < second_d) {
                    second = Some((j, d));
                }
            }
            _ => {
                second = best;
                best = Some((j, d));
            }
        }
    }

    best.map(|best| Neighbours { best, second })
}

fn nearest(query: &[f32], set: &[SiftDescriptor], distance: DistanceFn) -> Option<usize> {
    set.iter()
        .enumerate()
        .min_by_key(|(_, candidate)| FloatOrd(distance(query, &candidate.features)))
        .map(|(j, _)| j)
}

/// Distances are only meaningful between vectors of one layout, so every
/// descriptor must carry `expected` features.
fn check_lengths(
    set: &'static str,
    descriptors: &[SiftDescriptor],
    expected: usize,
) -> Result<()> {
    match descriptors.iter().position(|d| d.features.len() != expected) {
        Some(index) => Err(SiftError::DescriptorLengthMismatch {
            set,
            index,
            expected,
            found: descriptors[index].features.len(),
        }),
        None => Ok(()),
    }
}

/// Pairs descriptors of two images by nearest-neighbour search with the
/// distance ratio test.
#[derive(Clone)]
pub struct SiftMatcher {
    params: MatcherParams,
    distance: DistanceFn,
}

impl fmt::Debug for SiftMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiftMatcher")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Default for SiftMatcher {
    fn default() -> Self {
        let params = MatcherParams::default();
        SiftMatcher {
            distance: params.distance_norm.distance_fn(),
            params,
        }
    }
}

impl SiftMatcher {
    pub fn new(params: MatcherParams) -> Result<Self> {
        params.validate()?;
        Ok(SiftMatcher {
            distance: params.distance_norm.distance_fn(),
            params,
        })
    }

    /// Replaces the norm selected in the parameters by an arbitrary distance.
    pub fn with_distance_fn(mut self, distance: DistanceFn) -> Self {
        self.distance = distance;
        self
    }

    pub fn params(&self) -> &MatcherParams {
        &self.params
    }

    /// Matches every descriptor of `a` against `b`, ordered by ascending distance.
    pub fn match_descriptors<'a>(
        &self,
        a: &'a [SiftDescriptor],
        b: &'a [SiftDescriptor],
    ) -> Result<Vec<SiftMatch<'a>>> {
        Ok(self
            .match_descriptors_detailed(a, b)?
            .into_iter()
            .map(SiftMatch::from)
            .collect())
    }

    /// Like [`match_descriptors`](Self::match_descriptors) but keeps the
    /// second nearest neighbour of every accepted match.
    pub fn match_descriptors_detailed<'a>(
        &self,
        a: &'a [SiftDescriptor],
        b: &'a [SiftDescriptor],
    ) -> Result<Vec<SiftMatch3<'a>>> {
        if a.is_empty() {
            return Err(SiftError::EmptyDescriptorSet("A"));
        }
        if b.is_empty() {
            return Err(SiftError::EmptyDescriptorSet("B"));
        }
        let expected = a[0].features.len();
        check_lengths("A", a, expected)?;
        check_lengths("B", b, expected)?;

        #[cfg(feature = "rayon")]
        let found: Vec<_> = a
            .par_iter()
            .enumerate()
            .map(|(i, query)| self.match_one(i, query, a, b))
            .collect();
        #[cfg(not(feature = "rayon"))]
        let found: Vec<_> = a
            .iter()
            .enumerate()
            .map(|(i, query)| self.match_one(i, query, a, b))
            .collect();

        let mut matches: Vec<_> = found.into_iter().flatten().collect();
        matches.sort_by_key(|m| FloatOrd(m.distance));

        debug!(
            "matched {} of {} descriptors against {} (ratio {}, symmetric {})",
            matches.len(),
            a.len(),
            b.len(),
            self.params.ratio_threshold,
            self.params.symmetric
        );

        Ok(matches)
    }

    fn match_one<'a>(
        &self,
        index_a: usize,
        query: &'a SiftDescriptor,
        a: &'a [SiftDescriptor],
        b: &'a [SiftDescriptor],
    ) -> Option<SiftMatch3<'a>> {
        let neighbours = two_nearest(&query.features, b, self.distance)?;
        let (index_b, distance) = neighbours.best;
        let second_distance = neighbours.second.map_or(f32::INFINITY, |(_, d)| d);

        if !(distance < self.params.ratio_threshold * second_distance) {
            return None;
        }

        // cross-check: the query must be the nearest neighbour of its match
        if self.params.symmetric
            && nearest(&b[index_b].features, a, self.distance) != Some(index_a)
        {
            return None;
        }

        Some(SiftMatch3 {
            a: query,
            b: &b[index_b],
            second: neighbours.second.map(|(j, _)| &b[j]),
            index_a,
            index_b,
            index_second: neighbours.second.map(|(j, _)| j),
            distance,
            second_distance,
        })
    }
}
