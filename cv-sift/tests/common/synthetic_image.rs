use cv_sift::GrayImageBuffer;
use image::{ImageBuffer, Luma};

/// Isotropic Gaussian bump of standard deviation `sigma` on a constant
/// background, plus an optional horizontal intensity ramp.
pub fn gaussian_blob(
    size: u32,
    center: (f32, f32),
    sigma: f32,
    background: f32,
    amplitude: f32,
    slope: f32,
) -> GrayImageBuffer {
    ImageBuffer::from_fn(size, size, |x, y| {
        let dx = x as f32 - center.0;
        let dy = y as f32 - center.1;
        let bump = amplitude * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
        Luma([background + slope * x as f32 + bump])
    })
}

/// Vertical step between `low` (left of `edge_x`) and `high`.
pub fn step_edge(width: u32, height: u32, edge_x: f32, low: f32, high: f32) -> GrayImageBuffer {
    ImageBuffer::from_fn(width, height, |x, _| {
        Luma([if (x as f32) < edge_x { low } else { high }])
    })
}

/// [`step_edge`] with a faint Gaussian bump of the given amplitude and sigma
/// centred on the edge halfway down the image.
pub fn bumped_step_edge(
    width: u32,
    height: u32,
    edge_x: f32,
    low: f32,
    high: f32,
    bump: (f32, f32),
) -> GrayImageBuffer {
    let (amplitude, sigma) = bump;
    let cy = height as f32 / 2.0;
    ImageBuffer::from_fn(width, height, |x, y| {
        let dx = x as f32 - edge_x;
        let dy = y as f32 - cy;
        let step = if (x as f32) < edge_x { low } else { high };
        Luma([step + amplitude * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp()])
    })
}

/// 64-bit LCG; plenty for scattering test blobs deterministically.
struct Lcg(u64);

impl Lcg {
    const A: u64 = 6364136223846793005;
    const C: u64 = 1442695040888963407;

    fn new(seed: u64) -> Self {
        Lcg(seed.wrapping_mul(Self::A).wrapping_add(Self::C))
    }

    fn next_f64(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(Self::A).wrapping_add(Self::C);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }

    fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }
}

#[derive(Debug, Clone, Copy)]
struct EllipticalBlob {
    center: (f64, f64),
    sigma_u: f64,
    sigma_v: f64,
    angle: f64,
    amplitude: f64,
}

/// Random elliptical bright and dark blobs, rendered analytically so that
/// rotated and rescaled views carry no resampling artifacts.
pub struct BlobField {
    blobs: Vec<EllipticalBlob>,
    background: f64,
}

impl BlobField {
    /// Scatters `count` blobs with centres uniformly in `[lo, hi)²`.
    pub fn random(seed: u64, count: usize, lo: f64, hi: f64) -> Self {
        let mut rng = Lcg::new(seed);
        let blobs = (0..count)
            .map(|_| {
                let center = (rng.range(lo, hi), rng.range(lo, hi));
                let sigma_u = rng.range(2.0, 6.0);
                let sigma_v = sigma_u * rng.range(0.5, 1.0);
                let angle = rng.range(0.0, std::f64::consts::PI);
                let magnitude = rng.range(0.1, 0.35);
                let amplitude = if rng.next_f64() < 0.5 { magnitude } else { -magnitude };
                EllipticalBlob {
                    center,
                    sigma_u,
                    sigma_v,
                    angle,
                    amplitude,
                }
            })
            .collect();

        BlobField {
            blobs,
            background: 0.5,
        }
    }

    /// Renders a `size x size` view of the field rotated by `angle` radians
    /// and magnified by `scale` about the image centre.
    pub fn render(&self, size: u32, angle: f64, scale: f64) -> GrayImageBuffer {
        let c = (size - 1) as f64 / 2.0;
        let (sa, ca) = angle.sin_cos();
        let blobs: Vec<_> = self
            .blobs
            .iter()
            .map(|b| (b, b.angle.sin_cos()))
            .collect();

        ImageBuffer::from_fn(size, size, |x, y| {
            let (dx, dy) = (x as f64 - c, y as f64 - c);
            // inverse transform back into field coordinates
            let wx = (ca * dx + sa * dy) / scale + c;
            let wy = (-sa * dx + ca * dy) / scale + c;

            let mut v = self.background;
            for (b, (st, ct)) in &blobs {
                let (px, py) = (wx - b.center.0, wy - b.center.1);
                if px.abs() > 18.0 || py.abs() > 18.0 {
                    continue;
                }
                let u = ct * px + st * py;
                let w = -st * px + ct * py;
                let q = u * u / (b.sigma_u * b.sigma_u) + w * w / (b.sigma_v * b.sigma_v);
                v += b.amplitude * (-0.5 * q).exp();
            }
            Luma([v as f32])
        })
    }
}
