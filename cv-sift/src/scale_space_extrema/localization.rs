use crate::params::SiftParams;
use crate::pyramid::{DifferenceOfGaussians, Octave};
use nalgebra::{Matrix2, Matrix3, Vector3};

/// Why a candidate extremum did not become a keypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejection {
    /// The 3x3 Hessian could not be inverted or produced a non-finite offset.
    Singular,
    /// Refinement moved the sample outside the scannable region.
    OutOfBounds,
    NotConverged,
    LowContrast,
    /// Saddle point or ridge: principal curvatures too different.
    EdgeResponse,
}

/// A candidate that survived refinement and rejection, in octave coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Extremum {
    pub x: u32,
    pub y: u32,
    pub level: u32,
    /// Sub-pixel and sub-level offset from `(x, y, level)`, each below 0.5 in magnitude.
    pub offset: Vector3<f32>,
    /// Interpolated DoG value at the offset.
    pub response: f32,
    /// Number of linear solves performed.
    pub steps: usize,
}

/// Computes the partial derivatives in x, y, and scale of a pixel in the DoG scale space pyramid.
#[inline]
fn deriv_3d(octave: &Octave<DifferenceOfGaussians>, x: u32, y: u32, i: u32) -> Vector3<f32> {
    let dx = 0.5 * (octave.get_pixel(x + 1, y, i) - octave.get_pixel(x - 1, y, i));
    let dy = 0.5 * (octave.get_pixel(x, y + 1, i) - octave.get_pixel(x, y - 1, i));
    let di = 0.5 * (octave.get_pixel(x, y, i + 1) - octave.get_pixel(x, y, i - 1));

    Vector3::new(dx, dy, di)
}

/// Computes the 3D Hessian matrix for a pixel in the DoG scale space pyramid.
///
/// ```ignore
/// / Ixx  Ixy  Ixi \
/// | Ixy  Iyy  Iyi |
/// \ Ixi  Iyi  Iii /
///```
#[inline]
fn hessian_3d(octave: &Octave<DifferenceOfGaussians>, x: u32, y: u32, i: u32) -> Matrix3<f32> {
    let v = octave.get_pixel(x, y, i);
    let dxx = octave.get_pixel(x + 1, y, i) - 2. * v + octave.get_pixel(x - 1, y, i);
    let dyy = octave.get_pixel(x, y + 1, i) - 2. * v + octave.get_pixel(x, y - 1, i);
    let dii = octave.get_pixel(x, y, i + 1) - 2. * v + octave.get_pixel(x, y, i - 1);

    let dxy = 0.25
        * (octave.get_pixel(x + 1, y + 1, i)
            - octave.get_pixel(x - 1, y + 1, i)
            - octave.get_pixel(x + 1, y - 1, i)
            + octave.get_pixel(x - 1, y - 1, i));
    let dxi = 0.25
        * (octave.get_pixel(x + 1, y, i + 1)
            - octave.get_pixel(x - 1, y, i + 1)
            - octave.get_pixel(x + 1, y, i - 1)
            + octave.get_pixel(x - 1, y, i - 1));
    let dyi = 0.25
        * (octave.get_pixel(x, y + 1, i + 1)
            - octave.get_pixel(x, y - 1, i + 1)
            - octave.get_pixel(x, y + 1, i - 1)
            + octave.get_pixel(x, y - 1, i - 1));

    Matrix3::new(dxx, dxy, dxi, dxy, dyy, dyi, dxi, dyi, dii)
}

/// Spatial part of the Hessian, used by the edge test.
///
/// ```ignore
/// / Ixx  Ixy \
/// \ Ixy  Iyy /
/// ```
#[inline]
fn hessian_2d(octave: &Octave<DifferenceOfGaussians>, x: u32, y: u32, i: u32) -> Matrix2<f32> {
    let d = octave.get_pixel(x, y, i);
    let dxx = octave.get_pixel(x + 1, y, i) - 2. * d + octave.get_pixel(x - 1, y, i);
    let dyy = octave.get_pixel(x, y + 1, i) - 2. * d + octave.get_pixel(x, y - 1, i);
    let dxy = 0.25
        * (octave.get_pixel(x + 1, y + 1, i)
            - octave.get_pixel(x - 1, y + 1, i)
            - octave.get_pixel(x + 1, y - 1, i)
            + octave.get_pixel(x - 1, y - 1, i));

    Matrix2::new(dxx, dxy, dxy, dyy)
}

/// Interpolates a scale-space extremum's location and scale to subpixel
/// accuracy, then rejects low contrast and edge-like responses.
/// Based on Section 4 of Lowe's paper.
///
/// The quadratic model is refitted around a shifted sample whenever any
/// offset component reaches 0.5, for at most `max_interpolation_steps`
/// solves in total.
pub(crate) fn localize(
    octave: &Octave<DifferenceOfGaussians>,
    mut x: u32,
    mut y: u32,
    mut i: u32,
    params: &SiftParams,
) -> Result<Extremum, Rejection> {
    let border = params.image_border as f32;
    let x_end = octave.width() as f32 - border;
    let y_end = octave.height() as f32 - border;
    let num_octave_layers = octave.num_octave_layers() as f32;

    let mut steps = 0;
    let offset = loop {
        let g = deriv_3d(octave, x, y, i);
        let h = hessian_3d(octave, x, y, i);

        let offset = h.lu().solve(&(-g)).ok_or(Rejection::Singular)?;
        if !offset.iter().all(|v| v.is_finite()) {
            return Err(Rejection::Singular);
        }
        steps += 1;

        if offset.iter().all(|v| v.abs() < 0.5) {
            break offset;
        }
        if steps >= params.max_interpolation_steps {
            return Err(Rejection::NotConverged);
        }

        // work in f32 so that huge offsets cannot overflow the sample indices
        let nx = x as f32 + offset[0].round();
        let ny = y as f32 + offset[1].round();
        let ni = i as f32 + offset[2].round();
        if !(border..x_end).contains(&nx)
            || !(border..y_end).contains(&ny)
            || !(1.0..=num_octave_layers).contains(&ni)
        {
            return Err(Rejection::OutOfBounds);
        }

        x = nx as u32;
        y = ny as u32;
        i = ni as u32;
    };

    // reject features with low contrast
    let g = deriv_3d(octave, x, y, i);
    let response = octave.get_pixel(x, y, i) + 0.5 * g.dot(&offset);
    if response.abs() < params.contrast_threshold / num_octave_layers {
        return Err(Rejection::LowContrast);
    }

    // reject features which are too edge-like
    let h = hessian_2d(octave, x, y, i);
    let trace = h.trace();
    let det = h.determinant();
    let r = params.curvature_ratio_threshold;

    // negative determinant -> curvatures have different signs
    if det <= 0. || trace * trace / det > (r + 1.).powi(2) / r {
        return Err(Rejection::EdgeResponse);
    }

    Ok(Extremum {
        x,
        y,
        level: i,
        offset,
        response,
        steps,
    })
}
