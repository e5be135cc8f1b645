//! Circle-finding primitives.
//!
//! A primitive consumes a grayscale image plus the resolved tuning values and
//! yields one entry per candidate, laid out as `[x, y, radius, ...]`. Entries
//! are not validated here; the detector drops short ones.

use crate::detection::config::DetectionConfig;
use image::GrayImage;

pub trait CirclePrimitive: Send + Sync {
    fn find_circles(&self, gray: &GrayImage, config: &DetectionConfig) -> Vec<Vec<f32>>;
}

/// CPU Hough-gradient circle finder.
///
/// Edge pixels from a Canny pass (`param1` is the upper hysteresis threshold,
/// half of it the lower one) vote along their Sobel gradient in both
/// directions for every radius in `[min_radius, max_radius]`, with
/// `max_radius` capped at the longer image side. Accumulator cells are `dp`
/// pixels wide, at least one. Local maxima with more than `param2` votes
/// become centres, strongest first, and any centre within `min_dist` of an
/// accepted one is dropped. The radius is the densest one-pixel bin of
/// centre-to-edge distances.
#[derive(Debug, Clone, Copy, Default)]
pub struct HoughGradient;

impl CirclePrimitive for HoughGradient {
    fn find_circles(&self, gray: &GrayImage, config: &DetectionConfig) -> Vec<Vec<f32>> {
        let (w, h) = gray.dimensions();
        if w < 3 || h < 3 || !(config.dp > 0.0) {
            return Vec::new();
        }

        let longest = w.max(h) as f32;
        let min_r = config.min_radius.max(1) as f32;
        let max_r = if config.max_radius <= 0 {
            longest / 2.0
        } else {
            (config.max_radius as f32).min(longest)
        };
        if max_r < min_r {
            return Vec::new();
        }

        let high = (config.param1 as f32).max(1.0);
        let edges = imageproc::edges::canny(gray, high / 2.0, high);
        let gx = imageproc::gradients::horizontal_sobel(gray);
        let gy = imageproc::gradients::vertical_sobel(gray);

        // accumulator is never finer than the image
        let dp = (config.dp as f32).max(1.0);
        let inv_dp = 1.0 / dp;
        let acc_w = ((w as f32 * inv_dp).ceil() as usize).max(1);
        let acc_h = ((h as f32 * inv_dp).ceil() as usize).max(1);
        let mut accum = vec![0u32; acc_w * acc_h];
        let mut edge_points = Vec::new();

        for y in 0..h {
            for x in 0..w {
                if edges.get_pixel(x, y)[0] == 0 {
                    continue;
                }
                let dx = gx.get_pixel(x, y)[0] as f32;
                let dy = gy.get_pixel(x, y)[0] as f32;
                let mag = (dx * dx + dy * dy).sqrt();
                if mag < 1e-3 {
                    continue;
                }
                edge_points.push((x as f32, y as f32));
                let (ux, uy) = (dx / mag, dy / mag);

                for sign in [-1.0f32, 1.0] {
                    // one vote per cell per ray, even when dp > 1
                    let mut last = usize::MAX;
                    let mut r = min_r;
                    while r <= max_r {
                        let cx = x as f32 + sign * ux * r;
                        let cy = y as f32 + sign * uy * r;
                        if cx < 0.0 || cy < 0.0 || cx >= w as f32 || cy >= h as f32 {
                            break;
                        }
                        let ax = ((cx * inv_dp) as usize).min(acc_w - 1);
                        let ay = ((cy * inv_dp) as usize).min(acc_h - 1);
                        let idx = ay * acc_w + ax;
                        if idx != last {
                            accum[idx] += 1;
                            last = idx;
                        }
                        r += 1.0;
                    }
                }
            }
        }

        let mut centres = Vec::new();
        for ay in 1..acc_h.saturating_sub(1) {
            for ax in 1..acc_w.saturating_sub(1) {
                let idx = ay * acc_w + ax;
                let votes = accum[idx];
                if (votes as f64) <= config.param2 {
                    continue;
                }
                if votes > accum[idx - 1]
                    && votes >= accum[idx + 1]
                    && votes > accum[idx - acc_w]
                    && votes >= accum[idx + acc_w]
                {
                    centres.push((votes, ax, ay));
                }
            }
        }
        centres.sort_by(|a, b| b.0.cmp(&a.0));

        let min_dist_sq = (config.min_dist.max(0.0) as f32).powi(2);
        let bins = (max_r - min_r).floor() as usize + 1;
        let mut found: Vec<Vec<f32>> = Vec::new();

        for (_, ax, ay) in centres {
            let cx = (ax as f32 + 0.5) * dp;
            let cy = (ay as f32 + 0.5) * dp;
            let crowded = found
                .iter()
                .any(|c| (c[0] - cx).powi(2) + (c[1] - cy).powi(2) < min_dist_sq);
            if crowded {
                continue;
            }

            let mut histogram = vec![0u32; bins];
            for &(ex, ey) in &edge_points {
                let d = ((ex - cx).powi(2) + (ey - cy).powi(2)).sqrt();
                if d >= min_r && d <= max_r {
                    let bin = ((d - min_r) as usize).min(bins - 1);
                    histogram[bin] += 1;
                }
            }
            let best = histogram
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)));
            if let Some((bin, &count)) = best {
                if count > 0 {
                    found.push(vec![cx, cy, min_r + bin as f32 + 0.5]);
                }
            }
        }

        found
    }
}
