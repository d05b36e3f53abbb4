mod localization;
mod orientation_histogram;

pub(crate) use orientation_histogram::wrap_angle;
use orientation_histogram::{calc_orientation_histogram, dominant_orientations};

use crate::params::SiftParams;
use crate::pyramid::{DifferenceOfGaussians, Gaussian, Octave, Pyramid};
use crate::KeyPoint;
use float_ord::FloatOrd;
use localization::{localize, Extremum, Rejection};
use log::debug;
use std::collections::HashSet;
use std::ops::AddAssign;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Counters describing what happened to the candidates of one detection run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectionStats {
    /// Samples that passed the contrast pre-filter and the 26-neighbour test.
    pub candidates: usize,
    /// Refined keypoints that survived every rejection stage.
    pub keypoints: usize,
    /// Candidates that converged onto an already accepted sample.
    pub duplicates: usize,
    pub singular: usize,
    pub out_of_bounds: usize,
    pub not_converged: usize,
    pub low_contrast: usize,
    pub edge_response: usize,
    /// Descriptors emitted, one per keypoint orientation.
    pub descriptors: usize,
}

impl DetectionStats {
    fn record(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::Singular => self.singular += 1,
            Rejection::OutOfBounds => self.out_of_bounds += 1,
            Rejection::NotConverged => self.not_converged += 1,
            Rejection::LowContrast => self.low_contrast += 1,
            Rejection::EdgeResponse => self.edge_response += 1,
        }
    }

    /// Total number of candidates discarded by localization or rejection.
    pub fn rejected(&self) -> usize {
        self.singular
            + self.out_of_bounds
            + self.not_converged
            + self.low_contrast
            + self.edge_response
    }
}

impl AddAssign for DetectionStats {
    fn add_assign(&mut self, rhs: Self) {
        self.candidates += rhs.candidates;
        self.keypoints += rhs.keypoints;
        self.duplicates += rhs.duplicates;
        self.singular += rhs.singular;
        self.out_of_bounds += rhs.out_of_bounds;
        self.not_converged += rhs.not_converged;
        self.low_contrast += rhs.low_contrast;
        self.edge_response += rhs.edge_response;
        self.descriptors += rhs.descriptors;
    }
}

/// Strict 26-neighbour test: positive samples must exceed, negative samples
/// must undercut every neighbour in the 3x3x3 cube.
#[inline]
fn is_extremum(
    octave: &Octave<DifferenceOfGaussians>,
    value: f32,
    layer: u32,
    x: u32,
    y: u32,
) -> bool {
    let is_max = value > 0.;
    for i in layer - 1..=layer + 1 {
        for k in y - 1..=y + 1 {
            for j in x - 1..=x + 1 {
                if i == layer && k == y && j == x {
                    continue;
                }
                let neighbour = octave.get_pixel(j, k, i);
                if (is_max && neighbour >= value) || (!is_max && neighbour <= value) {
                    return false;
                }
            }
        }
    }

    true
}

fn keypoint_from_extremum(
    octave: &Octave<DifferenceOfGaussians>,
    e: &Extremum,
    k: f32,
) -> KeyPoint {
    let scale = octave.pixel_scale();
    let (dx, dy, di) = (e.offset[0], e.offset[1], e.offset[2]);
    KeyPoint {
        point: ((e.x as f32 + dx) * scale, (e.y as f32 + dy) * scale),
        response: e.response,
        sigma: octave.sigma(e.level as usize) * k.powf(di),
        octave: octave.index(),
        level: e.level,
        offset: (dx, dy, di),
        location: (e.x, e.y),
        refinement_steps: e.steps,
    }
}

fn scan_octave(
    octave: &Octave<DifferenceOfGaussians>,
    params: &SiftParams,
) -> (Vec<KeyPoint>, DetectionStats) {
    let prelim_contr_thr = 0.5 * params.contrast_threshold / octave.num_octave_layers() as f32;
    let k = params.scale_factor();
    let border = params.image_border;

    let mut keypoints = Vec::new();
    let mut stats = DetectionStats::default();
    let mut accepted = HashSet::new();

    for (i, layer) in octave.enumerate_middle() {
        let height = layer.height();
        let width = layer.width();

        for y in border..height.saturating_sub(border) {
            for x in border..width.saturating_sub(border) {
                let value = layer.get_pixel(x, y).0[0];
                if value.abs() < prelim_contr_thr {
                    continue;
                }
                if !is_extremum(octave, value, i, x, y) {
                    continue;
                }
                stats.candidates += 1;

                match localize(octave, x, y, i, params) {
                    Ok(e) => {
                        if !accepted.insert((e.level, e.x, e.y)) {
                            stats.duplicates += 1;
                            continue;
                        }
                        keypoints.push(keypoint_from_extremum(octave, &e, k));
                    }
                    Err(rejection) => stats.record(rejection),
                }
            }
        }
    }

    stats.keypoints = keypoints.len();
    debug!(
        "octave {}: {} candidates, {} keypoints, {} rejected, {} duplicates",
        octave.index(),
        stats.candidates,
        stats.keypoints,
        stats.rejected(),
        stats.duplicates
    );

    (keypoints, stats)
}

/// Scans every DoG octave for scale-space extrema and refines them into
/// keypoints, ordered by descending absolute response.
pub(crate) fn find_scale_space_extrema(
    pyramid: &Pyramid<DifferenceOfGaussians>,
    params: &SiftParams,
) -> (Vec<KeyPoint>, DetectionStats) {
    #[cfg(feature = "rayon")]
    let per_octave: Vec<_> = pyramid
        .octaves()
        .par_iter()
        .map(|octave| scan_octave(octave, params))
        .collect();
    #[cfg(not(feature = "rayon"))]
    let per_octave: Vec<_> = pyramid
        .octaves()
        .iter()
        .map(|octave| scan_octave(octave, params))
        .collect();

    let mut keypoints = Vec::new();
    let mut stats = DetectionStats::default();
    for (octave_keypoints, octave_stats) in per_octave {
        keypoints.extend(octave_keypoints);
        stats += octave_stats;
    }

    keypoints.sort_by_key(|kp| FloatOrd(-kp.response.abs()));

    (keypoints, stats)
}

/// Dominant gradient orientations around `keypoint`, sampled on the Gaussian
/// level it was detected at.
pub(crate) fn assign_orientations(
    gaussian_octave: &Octave<Gaussian>,
    keypoint: &KeyPoint,
    params: &SiftParams,
) -> Vec<f32> {
    let scl_octv = keypoint.octave_sigma();
    let (x, y) = keypoint.location;

    let hist = calc_orientation_histogram(
        &gaussian_octave[keypoint.level],
        x,
        y,
        (params.orientation_radius_factor * scl_octv).round() as i32,
        params.orientation_sigma_factor * scl_octv,
        params.orientation_histogram_bins,
    );

    dominant_orientations(&hist, params.orientation_peak_fraction)
}
