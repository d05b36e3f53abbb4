use crate::GrayImageBuffer;
use float_ord::FloatOrd;
use std::f32::consts::TAU;

/// Maps an angle in radians to `[0, 2π)`.
#[inline]
pub(crate) fn wrap_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid may round up to exactly 2π for tiny negative inputs
    if wrapped >= TAU {
        0.
    } else {
        wrapped
    }
}

/// Gradient orientation histogram of the square region of `radius` around
/// `(x, y)`, weighted by gradient magnitude and a Gaussian of `sigma`, then
/// circularly smoothed with `[1, 4, 6, 4, 1] / 16`.
pub(crate) fn calc_orientation_histogram(
    img: &GrayImageBuffer,
    x: u32,
    y: u32,
    radius: i32,
    sigma: f32,
    bins: usize,
) -> Vec<f32> {
    let len = (radius * 2 + 1).pow(2) as usize;

    let expf_scale = -1. / (2. * sigma * sigma);

    let mut x_vals = Vec::with_capacity(len);
    let mut y_vals = Vec::with_capacity(len);
    let mut w_vals = Vec::with_capacity(len);

    for j in -radius..=radius {
        let y = y as i32 + j;
        if y <= 0 || y >= img.height() as i32 - 1 {
            continue;
        }
        let y = y as u32;
        for i in -radius..=radius {
            let x = x as i32 + i;
            if x <= 0 || x >= img.width() as i32 - 1 {
                continue;
            }
            let x = x as u32;

            let dx = img.get_pixel(x + 1, y).0[0] - img.get_pixel(x - 1, y).0[0];
            let dy = img.get_pixel(x, y + 1).0[0] - img.get_pixel(x, y - 1).0[0];

            x_vals.push(dx);
            y_vals.push(dy);
            w_vals.push(((i * i + j * j) as f32 * expf_scale).exp());
        }
    }

    // 2 extra bins in the beginning and end
    let mut temphist = vec![0f32; bins + 4];
    for ((&dx, &dy), &w) in x_vals.iter().zip(y_vals.iter()).zip(w_vals.iter()) {
        let mag = (dx * dx + dy * dy).sqrt();
        let ori = dy.atan2(dx);
        let bin = ((ori / TAU * bins as f32).round() as i32).rem_euclid(bins as i32);
        temphist[bin as usize + 2] += mag * w;
    }

    // smooth the histogram
    temphist[1] = temphist[bins + 1];
    temphist[0] = temphist[bins];
    temphist[bins + 2] = temphist[2];
    temphist[bins + 3] = temphist[3];

    (2..bins + 2)
        .map(|i| {
            (temphist[i - 2] + temphist[i + 2]) * (1. / 16.)
                + (temphist[i - 1] + temphist[i + 1]) * (4. / 16.)
                + temphist[i] * (6. / 16.)
        })
        .collect()
}

/// Orientations, in radians within `[0, 2π)`, of all circular local maxima
/// of `hist` that reach `peak_fraction` of the global maximum. Each peak is
/// refined by fitting a parabola through it and its two neighbours.
pub(crate) fn dominant_orientations(hist: &[f32], peak_fraction: f32) -> Vec<f32> {
    let n = hist.len();
    let Some(histogram_max) = hist.iter().copied().map(FloatOrd).max() else {
        return Vec::new();
    };
    if histogram_max.0 <= 0. {
        return Vec::new();
    }
    let magnitude_threshold = histogram_max.0 * peak_fraction;

    let mut angles = Vec::new();
    for j in 0..n {
        // circular neighbours
        let l = if j > 0 { j - 1 } else { n - 1 };
        let r = if j < n - 1 { j + 1 } else { 0 };

        if hist[j] > hist[l] && hist[j] > hist[r] && hist[j] >= magnitude_threshold {
            // see https://www.desmos.com/calculator/ipec8bpjeo
            let bin = j as f32 + 0.5 * (hist[l] - hist[r]) / (hist[l] - 2. * hist[j] + hist[r]);
            angles.push(wrap_angle(bin * TAU / n as f32));
        }
    }

    angles
}
