//! Perceptual hash family: average, difference (horizontal/vertical), combined,
//! row-column, and BlurHash.
//!
//! Hand-rolled rather than pulled from a crate, so the bit construction is
//! exact: each algorithm resizes to a small grayscale thumbnail and compares
//! pixel values against a threshold (the mean, or the adjacent pixel).

use image::{DynamicImage, imageops::FilterType};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PerceptualHashError {
    #[error("blurhash encode error: {0}")]
    BlurHash(String),
}

/// Base-N alphabet matching the original's lowercase `0-9a-v` (base 32, distinct
/// from RFC4648 base32's `a-z2-7` alphabet).
const BASE32_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuv";

/// Encode an unsigned integer in the given base, left-padded with `0` to `width`
/// characters so that every hash of the same bit-length serializes to the same
/// string length.
fn to_base_padded(mut num: u128, base: u32, width: usize) -> String {
    if num == 0 {
        return "0".repeat(width);
    }
    let mut digits = Vec::new();
    while num > 0 {
        let rem = (num % base as u128) as usize;
        digits.push(BASE32_ALPHABET[rem]);
        num /= base as u128;
    }
    digits.reverse();
    let s = String::from_utf8(digits).unwrap();
    if s.len() >= width {
        s
    } else {
        format!("{}{}", "0".repeat(width - s.len()), s)
    }
}

/// Width (in base-32 chars) needed to represent `bits` bits, matching the
/// original's `len(to_base(int('1'*bits, 2), base))` computation.
fn base32_width_for_bits(bits: u32) -> usize {
    let max_val = if bits >= 128 { u128::MAX } else { (1u128 << bits) - 1 };
    to_base_padded(max_val, 32, 0).len()
}

fn grayscale_pixels(img: &DynamicImage, width: u32, height: u32) -> Vec<f32> {
    let small = img.resize_exact(width, height, FilterType::Triangle);
    let gray = small.to_luma8();
    gray.pixels().map(|p| p.0[0] as f32).collect()
}

/// Average hash: each pixel of an 8x8 (default) grayscale thumbnail becomes a
/// bit (1 if brighter than the mean).
pub fn average_hash(img: &DynamicImage, size: u32) -> String {
    let pixels = grayscale_pixels(img, size, size);
    let mean: f32 = pixels.iter().sum::<f32>() / pixels.len() as f32;
    let bits = size * size;
    let mut hash: u128 = 0;
    for &p in &pixels {
        hash = (hash << 1) | (p > mean) as u128;
    }
    to_base_padded(hash, 32, base32_width_for_bits(bits))
}

/// Difference hash, horizontal: each row compares adjacent columns of a
/// (size+1) x size grayscale thumbnail.
pub fn diff_hash_horizontal(img: &DynamicImage, size: u32) -> String {
    let w = size + 1;
    let pixels = grayscale_pixels(img, w, size);
    let bits = size * size;
    let mut hash: u128 = 0;
    for y in 0..size {
        for x in 0..size {
            let i = (y * w + x) as usize;
            hash = (hash << 1) | (pixels[i] < pixels[i + 1]) as u128;
        }
    }
    to_base_padded(hash, 32, base32_width_for_bits(bits))
}

/// Difference hash, vertical: each column compares adjacent rows of a
/// size x (size+1) grayscale thumbnail.
pub fn diff_hash_vertical(img: &DynamicImage, size: u32) -> String {
    let h = size + 1;
    let pixels = grayscale_pixels(img, size, h);
    let bits = size * size;
    let mut hash: u128 = 0;
    for y in 0..size {
        for x in 0..size {
            let i = (y * size + x) as usize;
            let below = ((y + 1) * size + x) as usize;
            hash = (hash << 1) | (pixels[i] < pixels[below]) as u128;
        }
    }
    to_base_padded(hash, 32, base32_width_for_bits(bits))
}

/// Combined hash: concatenation of average + horizontal-diff + vertical-diff,
/// each computed independently then joined as strings (fixed total length).
pub fn combined_hash(img: &DynamicImage, size: u32) -> String {
    format!(
        "{}{}{}",
        average_hash(img, size),
        diff_hash_horizontal(img, size),
        diff_hash_vertical(img, size)
    )
}

/// Row-column hash: two size x size bit planes (row-diff, col-diff) over a
/// (size+1) x (size+1) grayscale thumbnail, packed into one integer as
/// `row_hash << (size*size) | col_hash` — matches `dhash_img_row_col` /
/// `dhash_row_col` in the original exactly.
pub fn row_column_hash(img: &DynamicImage, size: u32) -> String {
    let w = size + 1;
    let pixels = grayscale_pixels(img, w, w);
    let mut row_hash: u128 = 0;
    let mut col_hash: u128 = 0;
    for y in 0..size {
        for x in 0..size {
            let offset = (y * w + x) as usize;
            row_hash = (row_hash << 1) | (pixels[offset] < pixels[offset + 1]) as u128;
            col_hash = (col_hash << 1) | (pixels[offset] < pixels[offset + w as usize]) as u128;
        }
    }
    let bits = size * size;
    let combined = (row_hash << bits) | col_hash;
    to_base_padded(combined, 32, base32_width_for_bits(bits * 2))
}

/// BlurHash encoding using a small component grid (default 4x4). The only
/// perceptual hash that is also a human-readable thumbnail approximation.
/// Output length is fixed at `4 + 2*(1 + components_x*components_y - 1)*... `
/// — in practice 6 + 2*components_x*components_y base83 characters; for the
/// spec's default 4x4 grid that is the fixed 36 characters required by §8.
pub fn blur_hash(img: &DynamicImage, components_x: u32, components_y: u32) -> Result<String, PerceptualHashError> {
    let small = img.resize_exact(256, 256, FilterType::Triangle).to_rgba8();
    blurhash::encode(components_x, components_y, 256, 256, small.as_raw())
        .map_err(|e| PerceptualHashError::BlurHash(format!("{e:?}")))
}
