use crate::error::{Result, SiftError};
use crate::params::SiftParams;
use crate::GrayImageBuffer;
use image::{ImageBuffer, Luma};
use imageproc::filter::separable_filter_equal;
use log::debug;
use std::marker::PhantomData;

// use type-state pattern to segregate gaussian pyramid from DoG pyramid
pub struct Gaussian;
pub struct DifferenceOfGaussians;

/// Images sharing one resolution, ordered by increasing blur.
///
/// `sigmas[i]` is the absolute blur of image `i` measured in pixels of the
/// input image. For a DoG octave it is the sigma of the lower of the two
/// Gaussian levels that were subtracted.
pub struct Octave<T> {
    images: Vec<GrayImageBuffer>,
    sigmas: Vec<f32>,
    index: usize,
    _kind: PhantomData<T>,
}

impl<T> Octave<T> {
    pub(crate) fn from_parts(index: usize, images: Vec<GrayImageBuffer>, sigmas: Vec<f32>) -> Self {
        debug_assert_eq!(images.len(), sigmas.len());
        Self {
            images,
            sigmas,
            index,
            _kind: PhantomData,
        }
    }

    /// Position of this octave in the pyramid; octave `o` is downsampled by `2^o`.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Factor converting octave pixel coordinates to input image coordinates.
    #[inline]
    pub fn pixel_scale(&self) -> f32 {
        (1u32 << self.index) as f32
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<GrayImageBuffer> {
        self.images.iter()
    }

    /// Same as [`iter`](Self::iter) but skips the first and last images
    #[inline]
    pub fn enumerate_middle(&self) -> impl Iterator<Item = (u32, &GrayImageBuffer)> {
        self.images
            .iter()
            .enumerate()
            .skip(1)
            .take(self.images.len().saturating_sub(2))
            .map(|(i, img)| (i as u32, img))
    }

    #[inline]
    pub fn get_pixel(&self, x: u32, y: u32, i: u32) -> f32 {
        self.images[i as usize].get_pixel(x, y).0[0]
    }

    /// Absolute sigma of image `i`, in input image pixels.
    #[inline]
    pub fn sigma(&self, i: usize) -> f32 {
        self.sigmas[i]
    }

    #[inline]
    pub fn sigmas(&self) -> &[f32] {
        &self.sigmas
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.images[0].width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.images[0].height()
    }
}

impl<T> std::ops::Index<usize> for Octave<T> {
    type Output = GrayImageBuffer;

    fn index(&self, index: usize) -> &Self::Output {
        &self.images[index]
    }
}

impl<T> std::ops::Index<u32> for Octave<T> {
    type Output = GrayImageBuffer;

    fn index(&self, index: u32) -> &Self::Output {
        &self.images[index as usize]
    }
}

impl Octave<Gaussian> {
    /// Blurs `base` (already at octave-local sigma `sig_local[0]`) step by step.
    fn build_gaussian(
        index: usize,
        base: GrayImageBuffer,
        increments: &[f32],
        sig_local: &[f32],
    ) -> Self {
        let mut images = Vec::with_capacity(increments.len());
        images.push(base);
        for i in 1..increments.len() {
            let next = gaussian_blur(&images[i - 1], increments[i]);
            images.push(next);
        }

        let scale = (1u32 << index) as f32;
        let sigmas = sig_local.iter().map(|s| s * scale).collect();
        Self::from_parts(index, images, sigmas)
    }

    /// Octave-local sigmas of all `P + 3` levels together with the incremental
    /// blur needed to reach each level from the previous one.
    ///
    /// ```ignore
    /// sig_total[i]² = sig_total[i - 1]² + sig_increment[i]²
    /// ```
    ///
    /// Blurring incrementally keeps the kernels small; the result matches a
    /// direct blur of the octave base up to rounding.
    fn precompute_gaussian_sigmas(sigma: f32, num_octave_layers: usize) -> (Vec<f32>, Vec<f32>) {
        let k = 2f32.powf(1f32 / num_octave_layers as f32);
        let mut total = Vec::with_capacity(num_octave_layers + 3);
        let mut increments = Vec::with_capacity(num_octave_layers + 3);

        total.push(sigma);
        increments.push(0.0);
        for i in 1..num_octave_layers + 3 {
            let sig_prev = k.powi(i as i32 - 1) * sigma;
            let sig_total = sig_prev * k;
            total.push(sig_total);
            increments.push((sig_total.powi(2) - sig_prev.powi(2)).sqrt());
        }

        (total, increments)
    }

    pub fn derive_difference_of_gaussians(&self) -> Octave<DifferenceOfGaussians> {
        let mut images = Vec::with_capacity(self.images.len() - 1);
        for i in 1..self.images.len() {
            let dog = imageproc::map::map_colors2(&self.images[i], &self.images[i - 1], |a, b| {
                Luma([a[0] - b[0]])
            });
            images.push(dog);
        }
        let sigmas = self.sigmas[..self.sigmas.len() - 1].to_vec();
        Octave::from_parts(self.index, images, sigmas)
    }

    pub fn num_octave_layers(&self) -> usize {
        self.images.len() - 3
    }
}

impl Octave<DifferenceOfGaussians> {
    pub fn num_octave_layers(&self) -> usize {
        self.images.len() - 2
    }
}

pub struct Pyramid<T>(Vec<Octave<T>>, PhantomData<T>);

impl Pyramid<Gaussian> {
    /// Builds the Gaussian scale space of `image`.
    ///
    /// Fails with [`SiftError::ImageTooSmall`] if the coarsest octave would be
    /// narrower than [`SiftParams::min_octave_size`] in either direction.
    pub fn build_gaussian(image: &GrayImageBuffer, params: &SiftParams) -> Result<Self> {
        params.validate()?;
        let num_octaves = params.octave_count;
        let num_octave_layers = params.levels_per_octave;

        let (width, height) = image.dimensions();
        let min_size = params.min_octave_size();
        let shift = (num_octaves - 1) as u32;
        if (width >> shift) < min_size || (height >> shift) < min_size {
            return Err(SiftError::ImageTooSmall {
                width,
                height,
                octaves: num_octaves,
                min_size,
            });
        }

        let (sig_local, increments) =
            Octave::<Gaussian>::precompute_gaussian_sigmas(params.initial_sigma, num_octave_layers);

        let sig_diff = (params.initial_sigma.powi(2) - params.assumed_blur.powi(2))
            .max(0.0)
            .sqrt();
        let mut base = gaussian_blur(image, sig_diff);

        let mut pyramid = Vec::with_capacity(num_octaves);
        for o in 0..num_octaves {
            let octave = Octave::<Gaussian>::build_gaussian(o, base, &increments, &sig_local);
            debug!(
                "gaussian octave {}: {}x{}, sigma {:.3}..{:.3}",
                o,
                octave.width(),
                octave.height(),
                octave.sigma(0),
                octave.sigma(octave.len() - 1)
            );

            // level P carries twice the base sigma and seeds the next octave
            base = decimate(&octave[num_octave_layers]);
            pyramid.push(octave);
        }

        Ok(Self(pyramid, PhantomData))
    }

    pub fn derive_difference_of_gaussians(&self) -> Pyramid<DifferenceOfGaussians> {
        let mut result = Vec::with_capacity(self.0.len());
        for octave in &self.0 {
            result.push(octave.derive_difference_of_gaussians());
        }
        Pyramid(result, PhantomData)
    }

    pub fn num_octave_layers(&self) -> usize {
        self.0[0].num_octave_layers()
    }
}

impl Pyramid<DifferenceOfGaussians> {
    pub fn num_octave_layers(&self) -> usize {
        self.0[0].num_octave_layers()
    }
}

impl<T> Pyramid<T> {
    pub fn num_octaves(&self) -> usize {
        self.0.len()
    }

    pub fn octave(&self, index: usize) -> &Octave<T> {
        &self.0[index]
    }

    pub fn iter(&self) -> std::slice::Iter<Octave<T>> {
        self.0.iter()
    }

    pub(crate) fn octaves(&self) -> &[Octave<T>] {
        &self.0
    }
}

/// Sampled Gaussian of standard deviation `sigma`, truncated at `ceil(3 sigma)`
/// and normalized to unit sum.
pub(crate) fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil().max(1.0) as usize;
    let expf_scale = -1.0 / (2.0 * sigma * sigma);
    let mut kernel: Vec<f32> = (0..=2 * radius)
        .map(|i| {
            let d = i as f32 - radius as f32;
            (d * d * expf_scale).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}

/// Separable Gaussian blur with replicated borders. A non-positive sigma
/// returns a copy.
pub(crate) fn gaussian_blur(image: &GrayImageBuffer, sigma: f32) -> GrayImageBuffer {
    if sigma <= f32::EPSILON {
        return image.clone();
    }
    separable_filter_equal(image, &gaussian_kernel(sigma))
}

/// Keeps every second sample in both directions.
pub(crate) fn decimate(image: &GrayImageBuffer) -> GrayImageBuffer {
    let (width, height) = (image.width() / 2, image.height() / 2);
    ImageBuffer::from_fn(width, height, |x, y| *image.get_pixel(2 * x, 2 * y))
}
