//! Scale-invariant feature detection, description and matching.
//!
//! The pipeline follows Lowe's SIFT: a Gaussian scale space is built from the
//! input, extrema of the difference-of-Gaussians are refined to sub-pixel and
//! sub-scale accuracy, filtered for contrast and edge response, assigned one or
//! more dominant orientations and described by 4x4 gradient histograms.
//! [`SiftMatcher`] pairs the descriptors of two images with the ratio test.
//!
//! ```no_run
//! use cv_sift::{SiftDetector, SiftMatcher};
//!
//! let detector = SiftDetector::default();
//! let a = detector.extract(&image::open("a.png").unwrap()).unwrap();
//! let b = detector.extract(&image::open("b.png").unwrap()).unwrap();
//! for m in SiftMatcher::default().match_descriptors(&a, &b).unwrap() {
//!     println!("({}, {}) -> ({}, {})", m.a.x, m.a.y, m.b.x, m.b.y);
//! }
//! ```

mod descriptor;
mod error;
mod matcher;
mod params;
mod pyramid;
mod scale_space_extrema;

pub use descriptor::SiftDescriptor;
pub use error::{Result, SiftError};
pub use matcher::{SiftMatch, SiftMatch3, SiftMatcher};
pub use params::{
    l1_distance, l2_distance, linf_distance, DistanceFn, DistanceNorm, MatcherParams, SiftParams,
};
pub use pyramid::{DifferenceOfGaussians, Gaussian, Octave, Pyramid};
pub use scale_space_extrema::DetectionStats;

use descriptor::describe;
use scale_space_extrema::{assign_orientations, find_scale_space_extrema};

use image::{DynamicImage, ImageBuffer, Luma};
use log::debug;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub type GrayImageBuffer = ImageBuffer<Luma<f32>, Vec<f32>>;

/// A refined scale-space extremum.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KeyPoint {
    /// The horizontal coordinate in a coordinate system is
    /// defined s.t. +x faces right and starts from the left
    /// side of the image.
    /// the vertical coordinate in a coordinate system is defined
    /// s.t. +y faces toward the bottom of an image and starts
    /// from the top of the image.
    pub point: (f32, f32),
    /// Interpolated DoG value; negative for dark blobs on bright ground.
    pub response: f32,

    /// Absolute sigma in input image pixels.
    pub sigma: f32,

    pub octave: usize,
    /// DoG level the localization converged at, in `1..=levels_per_octave`.
    pub level: u32,
    /// Sub-pixel and sub-level offset `(dx, dy, dlevel)` from `location` and `level`.
    pub offset: (f32, f32, f32),
    /// Sample position inside the octave.
    pub location: (u32, u32),
    /// Number of quadratic fits the localization needed.
    pub refinement_steps: usize,
}

impl KeyPoint {
    /// Sigma measured in pixels of the keypoint's octave.
    pub fn octave_sigma(&self) -> f32 {
        self.sigma / (1u32 << self.octave) as f32
    }
}

/// Everything produced by one run of the detector.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Refined keypoints ordered by descending absolute response.
    pub keypoints: Vec<KeyPoint>,
    /// Descriptors in keypoint order, one per dominant orientation.
    pub descriptors: Vec<SiftDescriptor>,
    pub stats: DetectionStats,
}

#[derive(Debug, Clone, Default)]
pub struct SiftDetector {
    params: SiftParams,
}

impl SiftDetector {
    pub fn new(params: SiftParams) -> Result<Self> {
        params.validate()?;
        Ok(SiftDetector { params })
    }

    pub fn params(&self) -> &SiftParams {
        &self.params
    }

    /// Converts `image` to grayscale in `[0, 1]` and extracts its descriptors.
    pub fn extract(&self, image: &DynamicImage) -> Result<Vec<SiftDescriptor>> {
        self.extract_luma(&image.to_luma32f())
    }

    pub fn extract_luma(&self, image: &GrayImageBuffer) -> Result<Vec<SiftDescriptor>> {
        Ok(self.detect(image)?.descriptors)
    }

    /// Runs the full pipeline and keeps the intermediate keypoints and counters.
    ///
    /// Fails only if the image cannot hold the configured number of octaves;
    /// an image without features yields an empty [`Detection`].
    pub fn detect(&self, image: &GrayImageBuffer) -> Result<Detection> {
        let gaussian_pyramid = Pyramid::build_gaussian(image, &self.params)?;
        let dog_pyramid = gaussian_pyramid.derive_difference_of_gaussians();

        let (keypoints, mut stats) = find_scale_space_extrema(&dog_pyramid, &self.params);
        let descriptors = self.describe_keypoints(&gaussian_pyramid, &keypoints);
        stats.descriptors = descriptors.len();

        debug!(
            "{}x{} image: {} keypoints, {} descriptors ({} candidates, {} rejected)",
            image.width(),
            image.height(),
            keypoints.len(),
            descriptors.len(),
            stats.candidates,
            stats.rejected()
        );

        Ok(Detection {
            keypoints,
            descriptors,
            stats,
        })
    }

    fn describe_keypoints(
        &self,
        gaussian_pyramid: &Pyramid<Gaussian>,
        keypoints: &[KeyPoint],
    ) -> Vec<SiftDescriptor> {
        let describe_one = |kp: &KeyPoint| -> Vec<SiftDescriptor> {
            let octave = gaussian_pyramid.octave(kp.octave);
            assign_orientations(octave, kp, &self.params)
                .into_iter()
                .filter_map(|angle| describe(octave, kp, angle, &self.params))
                .collect()
        };

        #[cfg(feature = "rayon")]
        let per_keypoint: Vec<_> = keypoints.par_iter().map(describe_one).collect();
        #[cfg(not(feature = "rayon"))]
        let per_keypoint: Vec<_> = keypoints.iter().map(describe_one).collect();

        per_keypoint.into_iter().flatten().collect()
    }
}
