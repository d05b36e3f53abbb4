use crate::params::SiftParams;
use crate::pyramid::{Gaussian, Octave};
use crate::scale_space_extrema::wrap_angle;
use crate::{GrayImageBuffer, KeyPoint};
use std::f32::consts::{SQRT_2, TAU};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An oriented keypoint together with its gradient-histogram feature vector.
///
/// Positional fields are copied from the [`KeyPoint`] it was computed for;
/// a keypoint with several dominant orientations yields several descriptors
/// that differ only in `orientation` and `features`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SiftDescriptor {
    /// Horizontal position in input image pixels.
    pub x: f32,
    /// Vertical position in input image pixels, growing downwards.
    pub y: f32,
    /// Absolute sigma of the keypoint, in input image pixels.
    pub scale: f32,
    /// Dominant gradient direction `atan2(dy, dx)` in radians, within `[0, 2π)`.
    pub orientation: f32,
    /// Interpolated DoG response of the keypoint.
    pub response: f32,
    pub octave: usize,
    /// Unit-length, non-negative feature vector.
    pub features: Vec<f32>,
}

impl SiftDescriptor {
    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Computes the descriptor of `keypoint` for one of its orientations.
///
/// Returns `None` when the sampled region carries no gradient at all.
pub(crate) fn describe(
    gaussian_octave: &Octave<Gaussian>,
    keypoint: &KeyPoint,
    orientation: f32,
    params: &SiftParams,
) -> Option<SiftDescriptor> {
    let (x, y) = keypoint.location;
    let features = calc_sift_descriptor(
        &gaussian_octave[keypoint.level],
        x,
        y,
        orientation,
        keypoint.octave_sigma(),
        params,
    )?;

    Some(SiftDescriptor {
        x: keypoint.point.0,
        y: keypoint.point.1,
        scale: keypoint.sigma,
        orientation,
        response: keypoint.response,
        octave: keypoint.octave,
        features,
    })
}

/// Gradient histograms over a `grid x grid` array of cells of width
/// `descriptor_scale_factor * scl_octv`, laid out in the frame rotated by
/// `ori`. Each sample is spread over the two nearest rows, columns and
/// orientation bins.
pub(crate) fn calc_sift_descriptor(
    img: &GrayImageBuffer,
    x: u32,
    y: u32,
    ori: f32,
    scl_octv: f32,
    params: &SiftParams,
) -> Option<Vec<f32>> {
    let d = params.descriptor_grid_size;
    let n = params.descriptor_histogram_bins;
    let (width, height) = (img.width() as i32, img.height() as i32);

    let bins_per_rad = n as f32 / TAU;
    // window sigma is half the grid width
    let exp_scale = -1. / (d * d) as f32 * 2.;
    let hist_width = params.descriptor_scale_factor * scl_octv;
    let radius = (hist_width * SQRT_2 * (d as f32 + 1.) * 0.5).round();
    // no point in sampling beyond the image diagonal
    let radius = radius.min(((width * width + height * height) as f32).sqrt()) as i32;

    let (sin_t, cos_t) = ori.sin_cos();
    let (sin_t, cos_t) = (sin_t / hist_width, cos_t / hist_width);

    // one extra cell on each side and one extra orientation bin for wrap-around
    let row_stride = (d + 2) * (n + 2);
    let col_stride = n + 2;
    let mut hist = vec![0f32; (d + 2) * row_stride];

    let half = d as f32 / 2. - 0.5;
    for i in -radius..=radius {
        let r = y as i32 + i;
        if r <= 0 || r >= height - 1 {
            continue;
        }
        for j in -radius..=radius {
            let c = x as i32 + j;
            if c <= 0 || c >= width - 1 {
                continue;
            }

            // rotate the sample offset into the keypoint frame
            let x_rot = j as f32 * cos_t + i as f32 * sin_t;
            let y_rot = -(j as f32) * sin_t + i as f32 * cos_t;
            let rbin = y_rot + half;
            let cbin = x_rot + half;
            if rbin <= -1. || rbin >= d as f32 || cbin <= -1. || cbin >= d as f32 {
                continue;
            }

            let (r, c) = (r as u32, c as u32);
            let dx = img.get_pixel(c + 1, r).0[0] - img.get_pixel(c - 1, r).0[0];
            let dy = img.get_pixel(c, r + 1).0[0] - img.get_pixel(c, r - 1).0[0];

            let grad_ori = wrap_angle(dy.atan2(dx) - ori);
            let weight = ((x_rot * x_rot + y_rot * y_rot) * exp_scale).exp();
            let mag = (dx * dx + dy * dy).sqrt() * weight;
            let obin = grad_ori * bins_per_rad;

            let (r0, c0, o0) = (rbin.floor(), cbin.floor(), obin.floor());
            let (rbin, cbin, obin) = (rbin - r0, cbin - c0, obin - o0);
            let o0 = (o0 as i32).rem_euclid(n as i32) as usize;

            // trilinear interpolation
            let v_r1 = mag * rbin;
            let v_r0 = mag - v_r1;
            let v_rc11 = v_r1 * cbin;
            let v_rc10 = v_r1 - v_rc11;
            let v_rc01 = v_r0 * cbin;
            let v_rc00 = v_r0 - v_rc01;
            let v_rco111 = v_rc11 * obin;
            let v_rco110 = v_rc11 - v_rco111;
            let v_rco101 = v_rc10 * obin;
            let v_rco100 = v_rc10 - v_rco101;
            let v_rco011 = v_rc01 * obin;
            let v_rco010 = v_rc01 - v_rco011;
            let v_rco001 = v_rc00 * obin;
            let v_rco000 = v_rc00 - v_rco001;

            let idx = (r0 as i32 + 1) as usize * row_stride
                + (c0 as i32 + 1) as usize * col_stride
                + o0;
            hist[idx] += v_rco000;
            hist[idx + 1] += v_rco001;
            hist[idx + col_stride] += v_rco010;
            hist[idx + col_stride + 1] += v_rco011;
            hist[idx + row_stride] += v_rco100;
            hist[idx + row_stride + 1] += v_rco101;
            hist[idx + row_stride + col_stride] += v_rco110;
            hist[idx + row_stride + col_stride + 1] += v_rco111;
        }
    }

    // finalize histogram, since the orientation histograms are circular
    let mut dst = Vec::with_capacity(d * d * n);
    for i in 0..d {
        for j in 0..d {
            let idx = (i + 1) * row_stride + (j + 1) * col_stride;
            hist[idx] += hist[idx + n];
            hist[idx + 1] += hist[idx + n + 1];
            dst.extend_from_slice(&hist[idx..idx + n]);
        }
    }

    normalize_clip_renormalize(&mut dst, params.descriptor_clip_threshold)?;
    Some(dst)
}

/// L2-normalizes `features`, caps every component at `clip` and normalizes
/// again. Fails on vectors without energy.
fn normalize_clip_renormalize(features: &mut [f32], clip: f32) -> Option<()> {
    let norm = l2_norm(features);
    if !norm.is_finite() || norm <= 0. {
        return None;
    }
    features.iter_mut().for_each(|v| *v = (*v / norm).min(clip));

    let norm = l2_norm(features);
    if norm <= 0. {
        return None;
    }
    features.iter_mut().for_each(|v| *v /= norm);
    Some(())
}

#[inline]
fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}
