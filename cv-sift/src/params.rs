//! Tunable parameters of the detector and the matcher.
//!
//! Defaults follow Lowe's paper and assume image intensities in `[0, 1]`.
//! With the `serde` feature both parameter sets can be read from partial
//! configuration files; missing fields keep their defaults.

use crate::error::{Result, SiftError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters of scale-space construction, keypoint detection, orientation
/// assignment and descriptor synthesis.
///
/// There is no separate scale factor setting: the sigma step between levels
/// is always `2^(1 / levels_per_octave)` (see [`SiftParams::scale_factor`]),
/// which keeps level `levels_per_octave` of every octave at exactly twice the
/// octave's base sigma, the level the next octave is decimated from.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct SiftParams {
    /// Number of octaves in the pyramid.
    pub octave_count: usize,
    /// Scale steps per octave (`P`). Each Gaussian octave holds `P + 3` levels.
    pub levels_per_octave: usize,
    /// Absolute sigma of the first level of the first octave.
    pub initial_sigma: f32,
    /// Blur already present in the input image.
    pub assumed_blur: f32,
    /// Minimum absolute DoG response, divided by `levels_per_octave` before use.
    pub contrast_threshold: f32,
    /// Maximum ratio `r` between principal curvatures; edge-like keypoints
    /// with `tr² / det > (r + 1)² / r` are rejected.
    pub curvature_ratio_threshold: f32,
    /// Cap on the number of quadratic fits during localization.
    pub max_interpolation_steps: usize,
    /// Margin, in octave pixels, excluded from the extrema scan.
    pub image_border: u32,
    pub orientation_histogram_bins: usize,
    /// Peaks at or above this fraction of the highest peak become orientations.
    pub orientation_peak_fraction: f32,
    /// Gaussian window sigma of the orientation histogram, in keypoint sigmas.
    pub orientation_sigma_factor: f32,
    /// Radius of the orientation histogram region, in keypoint sigmas.
    pub orientation_radius_factor: f32,
    /// Number of descriptor cells per side.
    pub descriptor_grid_size: usize,
    pub descriptor_histogram_bins: usize,
    /// Width of one descriptor cell, in keypoint sigmas.
    pub descriptor_scale_factor: f32,
    /// Ceiling applied to the unit-length descriptor before renormalization.
    pub descriptor_clip_threshold: f32,
}

impl Default for SiftParams {
    fn default() -> Self {
        SiftParams {
            octave_count: 4,
            levels_per_octave: 3,
            initial_sigma: 1.6,
            assumed_blur: 0.5,
            contrast_threshold: 0.04,
            curvature_ratio_threshold: 10.0,
            max_interpolation_steps: 5,
            image_border: 5,
            orientation_histogram_bins: 36,
            orientation_peak_fraction: 0.8,
            orientation_sigma_factor: 1.5,
            orientation_radius_factor: 4.5,
            descriptor_grid_size: 4,
            descriptor_histogram_bins: 8,
            descriptor_scale_factor: 3.0,
            descriptor_clip_threshold: 0.2,
        }
    }
}

impl SiftParams {
    /// Multiplicative sigma step between consecutive levels of an octave.
    ///
    /// Derived from `levels_per_octave` so that `P` steps exactly double the
    /// scale and every octave starts at twice the sigma of the previous one.
    pub fn scale_factor(&self) -> f32 {
        2f32.powf(1.0 / self.levels_per_octave as f32)
    }

    /// Length of the feature vector produced for every descriptor.
    pub fn descriptor_len(&self) -> usize {
        self.descriptor_grid_size * self.descriptor_grid_size * self.descriptor_histogram_bins
    }

    /// Smallest width or height, in pixels, the coarsest octave may have.
    pub fn min_octave_size(&self) -> u32 {
        2 * self.image_border + 1
    }

    pub fn validate(&self) -> Result<()> {
        if self.octave_count == 0 {
            return Err(SiftError::invalid("octave_count", "must be at least 1"));
        }
        if self.octave_count > 16 {
            return Err(SiftError::invalid("octave_count", "must not exceed 16"));
        }
        if self.levels_per_octave == 0 {
            return Err(SiftError::invalid("levels_per_octave", "must be at least 1"));
        }
        positive("initial_sigma", self.initial_sigma)?;
        if !self.assumed_blur.is_finite() || self.assumed_blur < 0.0 {
            return Err(SiftError::invalid(
                "assumed_blur",
                format!("must be finite and non-negative, got {}", self.assumed_blur),
            ));
        }
        if !self.contrast_threshold.is_finite() || self.contrast_threshold < 0.0 {
            return Err(SiftError::invalid(
                "contrast_threshold",
                format!("must be finite and non-negative, got {}", self.contrast_threshold),
            ));
        }
        if !self.curvature_ratio_threshold.is_finite() || self.curvature_ratio_threshold < 1.0 {
            return Err(SiftError::invalid(
                "curvature_ratio_threshold",
                format!("must be at least 1, got {}", self.curvature_ratio_threshold),
            ));
        }
        if self.max_interpolation_steps == 0 {
            return Err(SiftError::invalid(
                "max_interpolation_steps",
                "must be at least 1",
            ));
        }
        if self.image_border == 0 {
            return Err(SiftError::invalid(
                "image_border",
                "must be at least 1 so that every scanned sample has neighbours",
            ));
        }
        if self.orientation_histogram_bins < 3 {
            return Err(SiftError::invalid(
                "orientation_histogram_bins",
                "must be at least 3",
            ));
        }
        fraction("orientation_peak_fraction", self.orientation_peak_fraction)?;
        positive("orientation_sigma_factor", self.orientation_sigma_factor)?;
        positive("orientation_radius_factor", self.orientation_radius_factor)?;
        if self.descriptor_grid_size == 0 {
            return Err(SiftError::invalid("descriptor_grid_size", "must be at least 1"));
        }
        if self.descriptor_histogram_bins == 0 {
            return Err(SiftError::invalid(
                "descriptor_histogram_bins",
                "must be at least 1",
            ));
        }
        positive("descriptor_scale_factor", self.descriptor_scale_factor)?;
        fraction("descriptor_clip_threshold", self.descriptor_clip_threshold)?;
        Ok(())
    }
}

/// Distance between two feature vectors.
///
/// Plain function pointers keep the matcher free of generics; any function
/// with this signature can be injected with
/// [`SiftMatcher::with_distance_fn`](crate::SiftMatcher::with_distance_fn).
pub type DistanceFn = fn(&[f32], &[f32]) -> f32;

/// Norm used to compare descriptor vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum DistanceNorm {
    L1,
    #[default]
    L2,
    Linf,
}

impl DistanceNorm {
    pub fn distance_fn(self) -> DistanceFn {
        match self {
            DistanceNorm::L1 => l1_distance,
            DistanceNorm::L2 => l2_distance,
            DistanceNorm::Linf => linf_distance,
        }
    }

    #[inline]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        (self.distance_fn())(a, b)
    }
}

pub fn l1_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

pub fn linf_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f32::max)
}

/// Parameters of [`SiftMatcher`](crate::SiftMatcher).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct MatcherParams {
    pub distance_norm: DistanceNorm,
    /// A match is accepted only if `nearest < ratio_threshold * second_nearest`.
    pub ratio_threshold: f32,
    /// Additionally require the query to be the nearest neighbour of its match.
    pub symmetric: bool,
}

impl Default for MatcherParams {
    fn default() -> Self {
        MatcherParams {
            distance_norm: DistanceNorm::L2,
            ratio_threshold: 0.8,
            symmetric: false,
        }
    }
}

impl MatcherParams {
    pub fn validate(&self) -> Result<()> {
        fraction("ratio_threshold", self.ratio_threshold)
    }
}

fn positive(name: &'static str, value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SiftError::invalid(
            name,
            format!("must be finite and positive, got {value}"),
        ))
    }
}

fn fraction(name: &'static str, value: f32) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(SiftError::invalid(
            name,
            format!("must lie in (0, 1], got {value}"),
        ))
    }
}
