//! Grayscale image operations used by the normalizer.
//!
//! These kernels are deliberately simple and deterministic: the same input
//! always yields the same output, which downstream embedding consumers
//! depend on.

use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::Rng;

/// Pixels darker than this count as ink when estimating orientation.
const FOREGROUND_THRESHOLD: u8 = 128;

/// Deskew is a no-op below this many foreground pixels (fails open).
const MIN_FOREGROUND_PIXELS: usize = 4;

/// Rotate image content counterclockwise by `degrees` about the center.
///
/// Bilinear sampling with edge replication, so deskewing never introduces
/// black borders that would read as ink.
pub(crate) fn rotate(img: &GrayImage, degrees: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    let theta = degrees.to_radians();
    let (sin, cos) = theta.sin_cos();
    let cx = (w as f32 - 1.0) / 2.0;
    let cy = (h as f32 - 1.0) / 2.0;

    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            // Inverse-map the output pixel into the source image.
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let sx = cos * dx + sin * dy + cx;
            let sy = -sin * dx + cos * dy + cy;
            out.put_pixel(x, y, Luma([sample_bilinear(img, sx, sy)]));
        }
    }
    out
}

fn sample_bilinear(img: &GrayImage, x: f32, y: f32) -> u8 {
    let (w, h) = img.dimensions();
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p = |xx: u32, yy: u32| f32::from(img.get_pixel(xx, yy)[0]);
    let top = p(x0, y0) * (1.0 - fx) + p(x1, y0) * fx;
    let bottom = p(x0, y1) * (1.0 - fx) + p(x1, y1) * fx;
    (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8
}

/// Estimate the dominant stroke orientation from foreground (ink) pixel
/// coordinates and rotate to correct it.
///
/// Orientation comes from the second central moments of the ink pixels.
/// With fewer than [`MIN_FOREGROUND_PIXELS`] ink pixels there is nothing
/// to estimate and the image is returned unchanged.
pub(crate) fn deskew(img: &GrayImage) -> GrayImage {
    let mut count = 0usize;
    let mut sum_x = 0.0f64;
    let mut sum_y = 0.0f64;
    for (x, y, p) in img.enumerate_pixels() {
        if p[0] < FOREGROUND_THRESHOLD {
            count += 1;
            sum_x += f64::from(x);
            sum_y += f64::from(y);
        }
    }
    if count < MIN_FOREGROUND_PIXELS {
        return img.clone();
    }

    let mean_x = sum_x / count as f64;
    let mean_y = sum_y / count as f64;
    let mut mu20 = 0.0f64;
    let mut mu02 = 0.0f64;
    let mut mu11 = 0.0f64;
    for (x, y, p) in img.enumerate_pixels() {
        if p[0] < FOREGROUND_THRESHOLD {
            let dx = f64::from(x) - mean_x;
            let dy = f64::from(y) - mean_y;
            mu20 += dx * dx;
            mu02 += dy * dy;
            mu11 += dx * dy;
        }
    }

    let angle = 0.5 * (2.0 * mu11).atan2(mu20 - mu02);
    let mut degrees = angle.to_degrees();
    // Text lines are roughly horizontal; fold steep axes back so a tall
    // stroke cluster doesn't trigger a near-90-degree correction.
    if degrees > 45.0 {
        degrees -= 90.0;
    } else if degrees < -45.0 {
        degrees += 90.0;
    }
    if degrees.abs() < 0.1 {
        return img.clone();
    }
    rotate(img, -degrees as f32)
}

/// 3x3 median filter with clamped borders.
pub(crate) fn median3(img: &GrayImage) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut window = [0u8; 9];
            let mut i = 0;
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let sx = (i64::from(x) + dx).clamp(0, i64::from(w) - 1) as u32;
                    let sy = (i64::from(y) + dy).clamp(0, i64::from(h) - 1) as u32;
                    window[i] = img.get_pixel(sx, sy)[0];
                    i += 1;
                }
            }
            window.sort_unstable();
            out.put_pixel(x, y, Luma([window[4]]));
        }
    }
    out
}

/// Scale contrast about the image mean: `(v - mean) * factor + mean`.
pub(crate) fn adjust_contrast(img: &GrayImage, factor: f32) -> GrayImage {
    let total: f64 = img.pixels().map(|p| f64::from(p[0])).sum();
    let mean = (total / f64::from(img.width() * img.height())) as f32;

    let mut out = img.clone();
    for p in out.pixels_mut() {
        let v = (f32::from(p[0]) - mean) * factor + mean;
        p[0] = v.round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Scale brightness by a multiplicative factor.
pub(crate) fn adjust_brightness(img: &GrayImage, factor: f32) -> GrayImage {
    let mut out = img.clone();
    for p in out.pixels_mut() {
        let v = f32::from(p[0]) * factor;
        p[0] = v.round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Stochastic training-time perturbations, driven by the caller's seeded rng.
///
/// With p=0.5 a small rotation in ±5°, with p=0.3 a brightness jitter in
/// [0.8, 1.2]. Never called in inference mode.
pub(crate) fn augment(img: &GrayImage, rng: &mut StdRng) -> GrayImage {
    let mut out = img.clone();
    if rng.gen::<f32>() < 0.5 {
        let degrees = rng.gen_range(-5.0f32..5.0);
        out = rotate(&out, degrees);
    }
    if rng.gen::<f32>() < 0.3 {
        let factor = rng.gen_range(0.8f32..1.2);
        out = adjust_brightness(&out, factor);
    }
    out
}
