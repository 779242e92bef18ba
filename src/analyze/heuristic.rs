//! Cheap image-property quality signal.
//!
//! Starts at 0.5 and applies independent additive adjustments for
//! resolution, aspect ratio, sharpness (Laplacian variance) and colour spread
//! (std-dev of raw RGB bytes). Undecodable input scores 0.3.

use image::{DynamicImage, GenericImageView};

pub const HEURISTIC_BASE: f32 = 0.5;
pub const HEURISTIC_UNDECODABLE: f32 = 0.3;

/// Measured properties of one image. Kept separate from the rule table so the
/// metrics can be logged and tested on their own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageStats {
    pub width: u32,
    pub height: u32,
    pub laplacian_var: f64,
    pub color_std: f64,
}

impl ImageStats {
    pub fn measure(img: &DynamicImage) -> Self {
        let (width, height) = img.dimensions();
        let gray = img.to_luma8();
        let rgb = img.to_rgb8();
        Self {
            width,
            height,
            laplacian_var: laplacian_variance(gray.as_raw(), width as usize, height as usize),
            color_std: std_dev(rgb.as_raw()),
        }
    }

    pub fn pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn aspect(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        f64::from(self.width) / f64::from(self.height)
    }
}

/// Heuristic score of raw bytes; 0.3 when the bytes are not a decodable image.
pub fn heuristic_score(bytes: &[u8]) -> f32 {
    match image::load_from_memory(bytes) {
        Ok(img) => heuristic_score_image(&img),
        Err(e) => {
            tracing::debug!(error = %e, "heuristic: undecodable image");
            HEURISTIC_UNDECODABLE
        }
    }
}

pub fn heuristic_score_image(img: &DynamicImage) -> f32 {
    score_stats(&ImageStats::measure(img))
}

/// Rule table over measured stats.
pub fn score_stats(s: &ImageStats) -> f32 {
    let mut score = HEURISTIC_BASE;

    let px = s.pixels();
    if px >= 1920 * 1080 {
        score += 0.15;
    } else if px >= 1280 * 720 {
        score += 0.10;
    } else if px < 400 * 400 {
        score -= 0.20;
    }

    let aspect = s.aspect();
    if (0.8..=1.5).contains(&aspect) {
        score += 0.05;
    } else if !(0.5..=3.0).contains(&aspect) {
        score -= 0.10;
    }

    if s.laplacian_var > 500.0 {
        score += 0.10;
    } else if s.laplacian_var < 100.0 {
        score -= 0.15;
    }

    if s.color_std > 50.0 {
        score += 0.05;
    } else if s.color_std < 20.0 {
        score -= 0.10;
    }

    score.clamp(0.0, 1.0)
}

// Mirror index into [0, n) without repeating the edge pixel (gfedcb|abcdefgh|gfedcba).
fn reflect101(i: isize, n: usize) -> usize {
    if n <= 1 {
        return 0;
    }
    let n = n as isize;
    let period = 2 * (n - 1);
    let mut m = i.rem_euclid(period);
    if m >= n {
        m = period - m;
    }
    m as usize
}

/// Population variance of the 4-neighbour Laplacian over an 8-bit grayscale plane.
pub fn laplacian_variance(gray: &[u8], width: usize, height: usize) -> f64 {
    if width == 0 || height == 0 || gray.len() < width * height {
        return 0.0;
    }
    let at = |x: isize, y: isize| -> f64 {
        let xx = reflect101(x, width);
        let yy = reflect101(y, height);
        f64::from(gray[yy * width + xx])
    };

    let n = (width * height) as f64;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for y in 0..height as isize {
        for x in 0..width as isize {
            let v = at(x, y - 1) + at(x - 1, y) + at(x + 1, y) + at(x, y + 1) - 4.0 * at(x, y);
            sum += v;
            sum_sq += v * v;
        }
    }
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

/// Population standard deviation of raw byte values.
pub fn std_dev(values: &[u8]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|&v| {
            let d = f64::from(v) - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    var.sqrt()
}
