//! Color statistics: illumination, saturation, contrast, and top colors.
//!
//! Numeric output is stable for a given input's pixels.

use image::DynamicImage;
use std::collections::HashMap;

/// Quantization step used by [`top_colors`]: `round(255 / 5)`.
const TOP_COLOR_ROUND_TO: f64 = 51.0;

/// Average brightness, blending the HSV value channel with mean RGB brightness.
/// Returns 0 (dark) to 100 (bright).
pub fn illumination(img: &DynamicImage) -> f64 {
    let rgb = img.to_rgb8();
    let n = rgb.pixels().len() as f64;
    let mut value_sum = 0.0f64;
    let mut r_sum = 0.0f64;
    let mut g_sum = 0.0f64;
    let mut b_sum = 0.0f64;
    for p in rgb.pixels() {
        let [r, g, b] = [p.0[0] as f64, p.0[1] as f64, p.0[2] as f64];
        let max = r.max(g).max(b);
        value_sum += max;
        r_sum += r;
        g_sum += g;
        b_sum += b;
    }
    let value = value_sum / n / 255.0 * 100.0;
    let brightness = (r_sum / n + g_sum / n + b_sum / n) / 3.0 / 255.0 * 100.0;
    round2((value + value + brightness) / 3.0)
}

/// Average HSV saturation. Returns 0 (grayscale) to 100 (vibrant).
pub fn saturation(img: &DynamicImage) -> f64 {
    let rgb = img.to_rgb8();
    let n = rgb.pixels().len() as f64;
    let mut sat_sum = 0.0f64;
    for p in rgb.pixels() {
        let [r, g, b] = [p.0[0] as f64, p.0[1] as f64, p.0[2] as f64];
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let s = if max == 0.0 { 0.0 } else { (max - min) / max * 255.0 };
        sat_sum += s;
    }
    round2(sat_sum / n / 255.0 * 100.0)
}

/// Intensity range of the middle 90% of grayscale pixel values (5th to 95th
/// percentile), a contrast proxy that ignores outliers.
pub fn contrast(img: &DynamicImage) -> f64 {
    let gray = img.to_luma8();
    let mut values: Vec<u8> = gray.pixels().map(|p| p.0[0]).collect();
    values.sort_unstable();
    let p05 = percentile(&values, 5.0);
    let p95 = percentile(&values, 95.0);
    round2((p95 - p05) / 255.0 * 100.0)
}

fn percentile(sorted: &[u8], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = pct / 100.0 * (sorted.len() as f64 - 1.0);
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo] as f64
    } else {
        let frac = rank - lo as f64;
        sorted[lo] as f64 * (1.0 - frac) + sorted[hi] as f64 * frac
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn closest_color(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let snap = |c: u8| -> u8 {
        let rounded = ((c as f64 / TOP_COLOR_ROUND_TO).round() * TOP_COLOR_ROUND_TO) as i32;
        if rounded > 250 { 255 } else { rounded.clamp(0, 255) as u8 }
    };
    (snap(r), snap(g), snap(b))
}

/// Dominant colors exceeding `cut` percent of total pixels, as `"#rrggbb=pct"`
/// strings in first-encounter order (matches the Python `Counter` iteration
/// order, which is insertion order).
pub fn top_colors(img: &DynamicImage, cut: f64) -> Vec<String> {
    let rgb = img.to_rgb8();
    let total = rgb.pixels().len() as f64;
    let mut counts: HashMap<(u8, u8, u8), u64> = HashMap::new();
    let mut order: Vec<(u8, u8, u8)> = Vec::new();
    for p in rgb.pixels() {
        let key = closest_color(p.0[0], p.0[1], p.0[2]);
        let entry = counts.entry(key).or_insert_with(|| {
            order.push(key);
            0
        });
        *entry += 1;
    }
    order
        .into_iter()
        .filter_map(|key| {
            let count = counts[&key];
            let pct = (count as f64 / total * 100.0 * 10.0).round() / 10.0;
            if pct >= cut {
                Some(format!("#{:02x}{:02x}{:02x}={:.1}", key.0, key.1, key.2, pct))
            } else {
                None
            }
        })
        .collect()
}
