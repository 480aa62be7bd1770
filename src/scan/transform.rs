//! Geometric and photometric transforms used by the symbol search.
//!
//! Every transform returns a fresh buffer, or `Cow::Borrowed` when the
//! transform is the identity for its arguments.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use super::image::{LumaImage, PixelImage};

/// Minimum output height of a center band crop
pub const MIN_CROP_HEIGHT: usize = 8;

/// Below this luminance range, contrast stretching is skipped
pub const MIN_STRETCH_RANGE: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub const ALL: [Rotation; 4] = [
        Rotation::Deg0,
        Rotation::Deg90,
        Rotation::Deg180,
        Rotation::Deg270,
    ];

    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

/// Nearest-neighbour resample to `round(dim * factor)`. A factor of 1 borrows.
pub fn scale(image: &PixelImage, factor: f32) -> Cow<'_, PixelImage> {
    if (factor - 1.0).abs() < f32::EPSILON {
        return Cow::Borrowed(image);
    }

    let (w, h) = (image.width(), image.height());
    let out_w = ((w as f32 * factor).round() as usize).max(1);
    let out_h = ((h as f32 * factor).round() as usize).max(1);

    Cow::Owned(PixelImage::from_fn(out_w, out_h, |x, y| {
        let sx = (x * w / out_w).min(w - 1);
        let sy = (y * h / out_h).min(h - 1);
        image.pixel(sx, sy)
    }))
}

/// Full-width band of relative height `rel_h`, vertically centred.
pub fn crop_center_band(image: &PixelImage, rel_h: f32) -> Cow<'_, PixelImage> {
    let h = image.height();
    if rel_h >= 1.0 || h <= MIN_CROP_HEIGHT {
        return Cow::Borrowed(image);
    }

    let out_h = ((h as f32 * rel_h).round() as usize)
        .max(MIN_CROP_HEIGHT)
        .min(h);
    let top = (h - out_h) / 2;
    let row_bytes = image.width() * 4;
    let start = top * row_bytes;
    let data = image.as_raw()[start..start + out_h * row_bytes].to_vec();

    Cow::Owned(PixelImage::from_rgba(image.width(), out_h, data))
}

/// Quarter turn: output is `h x w` and source `(x, y)` lands at `(y, w - 1 - x)`.
pub fn rotate90(image: &PixelImage) -> PixelImage {
    let (w, h) = (image.width(), image.height());
    let src = image.as_raw();
    let mut out = vec![0u8; src.len()];
    // output width is h
    for y in 0..h {
        for x in 0..w {
            let from = (y * w + x) * 4;
            let to = ((w - 1 - x) * h + y) * 4;
            out[to..to + 4].copy_from_slice(&src[from..from + 4]);
        }
    }
    PixelImage::from_rgba(h, w, out)
}

fn rotate180(image: &PixelImage) -> PixelImage {
    let (w, h) = (image.width(), image.height());
    PixelImage::from_fn(w, h, |x, y| image.pixel(w - 1 - x, h - 1 - y))
}

fn rotate270(image: &PixelImage) -> PixelImage {
    let (w, h) = (image.width(), image.height());
    // inverse of rotate90: output (x, y) reads source (y, h - 1 - x)
    PixelImage::from_fn(h, w, |x, y| image.pixel(y, h - 1 - x))
}

pub fn rotate(image: &PixelImage, rotation: Rotation) -> Cow<'_, PixelImage> {
    match rotation {
        Rotation::Deg0 => Cow::Borrowed(image),
        Rotation::Deg90 => Cow::Owned(rotate90(image)),
        Rotation::Deg180 => Cow::Owned(rotate180(image)),
        Rotation::Deg270 => Cow::Owned(rotate270(image)),
    }
}

/// `0.299 R + 0.587 G + 0.114 B`, truncated
pub fn luminance(image: &PixelImage) -> LumaImage {
    let data = image
        .as_raw()
        .chunks_exact(4)
        .map(|px| {
            let (r, g, b) = (px[0] as u32, px[1] as u32, px[2] as u32);
            ((299 * r + 587 * g + 114 * b) / 1000) as u8
        })
        .collect();
    LumaImage::from_raw(image.width(), image.height(), data)
}

/// Remap `[min, max]` onto `[0, 255]`; identity when the range is too small to trust.
pub fn contrast_stretch(luma: &LumaImage) -> Cow<'_, LumaImage> {
    let raw = luma.as_raw();
    let (lo, hi) = raw
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &p| (lo.min(p), hi.max(p)));
    let range = hi.saturating_sub(lo);
    if range < MIN_STRETCH_RANGE {
        return Cow::Borrowed(luma);
    }

    let data = raw
        .iter()
        .map(|&p| ((p - lo) as u32 * 255 / range as u32) as u8)
        .collect();
    Cow::Owned(LumaImage::from_raw(luma.width(), luma.height(), data))
}

/// 5-tap unsharp kernel (`5c - n - s - e - w`), clamped. Border pixels are copied.
pub fn sharpen(luma: &LumaImage) -> LumaImage {
    let (w, h) = (luma.width(), luma.height());
    let src = luma.as_raw();
    let mut out = src.to_vec();
    if w < 3 || h < 3 {
        return LumaImage::from_raw(w, h, out);
    }

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let i = y * w + x;
            let v = 5 * src[i] as i32
                - src[i - 1] as i32
                - src[i + 1] as i32
                - src[i - w] as i32
                - src[i + w] as i32;
            out[i] = v.clamp(0, 255) as u8;
        }
    }
    LumaImage::from_raw(w, h, out)
}

pub fn invert_luma(luma: &LumaImage) -> LumaImage {
    let data = luma.as_raw().iter().map(|&p| 255 - p).collect();
    LumaImage::from_raw(luma.width(), luma.height(), data)
}

/// Inverts colour channels; alpha is kept.
pub fn invert_rgba(image: &PixelImage) -> PixelImage {
    let mut data = image.as_raw().to_vec();
    for px in data.chunks_exact_mut(4) {
        px[0] = 255 - px[0];
        px[1] = 255 - px[1];
        px[2] = 255 - px[2];
    }
    PixelImage::from_rgba(image.width(), image.height(), data)
}
