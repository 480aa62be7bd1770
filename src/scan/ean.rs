//! EAN-13 / UPC-A scanline reader.
//!
//! A handful of rows are run-length encoded and matched against the guard and
//! digit patterns. Each row is read left-to-right and right-to-left, so a
//! quarter-turn set of {0, 90, 180} covers every orientation.

use super::image::Bitmap;
use super::reader::{Recognition, SymbolFormat, SymbolReader};
use super::transform::Rotation;

/// Widths (space, bar, space, bar) of the odd-parity left-hand digits.
/// Right-hand digits share the widths with bar/space swapped; even-parity
/// left digits are these widths reversed.
const L_PATTERNS: [[u8; 4]; 10] = [
    [3, 2, 1, 1],
    [2, 2, 2, 1],
    [2, 1, 2, 2],
    [1, 4, 1, 1],
    [1, 1, 3, 2],
    [1, 2, 3, 1],
    [1, 1, 1, 4],
    [1, 3, 1, 2],
    [1, 2, 1, 3],
    [3, 1, 1, 2],
];

/// Parity of the six left digits (bit set = even/G) keyed by the implied first digit
const FIRST_DIGIT_PARITY: [u8; 10] = [
    0b000000, 0b001011, 0b001101, 0b001110, 0b010011, 0b011001, 0b011100, 0b010101, 0b010110,
    0b011010,
];

/// start guard + 6 digits + middle guard + 6 digits + end guard
const SYMBOL_RUNS: usize = 3 + 24 + 5 + 24 + 3;

/// Relative rows sampled per bitmap
const SCAN_ROWS: [f32; 5] = [0.5, 0.35, 0.65, 0.2, 0.8];

/// Mean absolute per-module deviation tolerated when matching a digit
const MAX_DIGIT_VARIANCE: f32 = 0.38;

const LINEAR_ROTATIONS: [Rotation; 3] = [Rotation::Deg0, Rotation::Deg90, Rotation::Deg180];

#[derive(Debug, Default, Clone, Copy)]
pub struct Ean13Reader;

impl SymbolReader for Ean13Reader {
    fn format(&self) -> SymbolFormat {
        SymbolFormat::Ean13
    }

    fn rotations(&self) -> &[Rotation] {
        &LINEAR_ROTATIONS
    }

    fn read(&self, bitmap: &Bitmap) -> Recognition {
        if bitmap.width() < SYMBOL_RUNS || bitmap.height() == 0 {
            return Recognition::NotFound;
        }

        for rel in SCAN_ROWS {
            let y = ((bitmap.height() - 1) as f32 * rel).round() as usize;
            let mut runs = run_lengths(bitmap.row(y));
            if let Some(code) = decode_runs(&runs, false) {
                return Recognition::Found(code);
            }
            runs.reverse();
            if let Some(code) = decode_runs(&runs, true) {
                return Recognition::Found(code);
            }
        }
        Recognition::NotFound
    }
}

/// `(dark, width)` runs along a row
fn run_lengths(row: &[bool]) -> Vec<(bool, usize)> {
    let mut runs: Vec<(bool, usize)> = Vec::new();
    for &dark in row {
        match runs.last_mut() {
            Some((color, width)) if *color == dark => *width += 1,
            _ => runs.push((dark, 1)),
        }
    }
    runs
}

/// `reversed` runs come from a right-to-left read; matched windows are flipped
/// back into symbol order before decoding.
fn decode_runs(runs: &[(bool, usize)], reversed: bool) -> Option<String> {
    if runs.len() < SYMBOL_RUNS {
        return None;
    }

    // a candidate start guard is a bar preceded by a light run (the quiet zone)
    for start in 1..=runs.len() - SYMBOL_RUNS {
        if !runs[start].0 || runs[start - 1].0 {
            continue;
        }
        let mut window: Vec<f32> = runs[start..start + SYMBOL_RUNS]
            .iter()
            .map(|&(_, w)| w as f32)
            .collect();
        if reversed {
            window.reverse();
        }
        let module = (window[0] + window[1] + window[2]) / 3.0;
        // quiet zone should be a few modules wide at least
        if (runs[start - 1].1 as f32) < module * 3.0 {
            continue;
        }
        if let Some(code) = decode_window(&window) {
            return Some(code);
        }
    }
    None
}

fn decode_window(widths: &[f32]) -> Option<String> {
    if !is_guard(&widths[0..3]) || !is_guard(&widths[27..32]) || !is_guard(&widths[56..59]) {
        return None;
    }

    let mut digits = [0u8; 13];
    let mut parity = 0u8;

    for i in 0..6 {
        let runs = &widths[3 + i * 4..7 + i * 4];
        let (digit, even) = match_left_digit(runs)?;
        digits[i + 1] = digit;
        if even {
            parity |= 1 << (5 - i);
        }
    }
    for i in 0..6 {
        let runs = &widths[32 + i * 4..36 + i * 4];
        digits[i + 7] = match_digit(runs, false)?.0;
    }

    digits[0] = FIRST_DIGIT_PARITY.iter().position(|&p| p == parity)? as u8;

    if !checksum_ok(&digits) {
        return None;
    }

    // a leading zero is a UPC-A symbol; report its native 12 digits
    let digits = if digits[0] == 0 { &digits[1..] } else { &digits[..] };
    Some(digits.iter().map(|d| char::from(b'0' + d)).collect())
}

/// Guard runs are all one module wide
fn is_guard(runs: &[f32]) -> bool {
    let module = runs.iter().sum::<f32>() / runs.len() as f32;
    runs.iter().all(|&w| (w - module).abs() <= module * 0.5 + 0.5)
}

fn match_left_digit(runs: &[f32]) -> Option<(u8, bool)> {
    let odd = match_digit(runs, false);
    let even = match_digit(runs, true);
    match (odd, even) {
        (Some((d, a)), Some((e, b))) => Some(if a <= b { (d, false) } else { (e, true) }),
        (Some((d, _)), None) => Some((d, false)),
        (None, Some((e, _))) => Some((e, true)),
        (None, None) => None,
    }
}

/// Best digit for four runs spanning seven modules, with its variance
fn match_digit(runs: &[f32], reversed: bool) -> Option<(u8, f32)> {
    let total: f32 = runs.iter().sum();
    if total <= 0.0 {
        return None;
    }
    let unit = total / 7.0;

    let mut best: Option<(u8, f32)> = None;
    for (digit, pattern) in L_PATTERNS.iter().enumerate() {
        let variance = (0..4)
            .map(|k| {
                let expected = if reversed { pattern[3 - k] } else { pattern[k] } as f32;
                (runs[k] / unit - expected).abs()
            })
            .sum::<f32>()
            / 4.0;
        if variance <= MAX_DIGIT_VARIANCE && best.map_or(true, |(_, v)| variance < v) {
            best = Some((digit as u8, variance));
        }
    }
    best
}

fn checksum_ok(digits: &[u8; 13]) -> bool {
    let sum: u32 = digits[..12]
        .iter()
        .enumerate()
        .map(|(i, &d)| d as u32 * if i % 2 == 0 { 1 } else { 3 })
        .sum();
    (10 - sum % 10) % 10 == digits[12] as u32
}

/// Module pattern (`true` = bar) for a 13-digit code, without quiet zones.
/// Used to render test symbols.
pub fn encode_modules(code: &str) -> Option<Vec<bool>> {
    let digits: Vec<u8> = code
        .bytes()
        .map(|b| b.checked_sub(b'0').filter(|d| *d <= 9))
        .collect::<Option<_>>()?;
    if digits.len() != 13 {
        return None;
    }

    fn push_runs(widths: &[u8], first_dark: bool, out: &mut Vec<bool>) {
        let mut dark = first_dark;
        for &w in widths {
            out.extend(std::iter::repeat(dark).take(w as usize));
            dark = !dark;
        }
    }

    let mut modules = Vec::with_capacity(95);

    push_runs(&[1, 1, 1], true, &mut modules);
    let parity = FIRST_DIGIT_PARITY[digits[0] as usize];
    for i in 0..6 {
        let mut widths = L_PATTERNS[digits[i + 1] as usize];
        if parity & (1 << (5 - i)) != 0 {
            widths.reverse();
        }
        push_runs(&widths, false, &mut modules);
    }
    push_runs(&[1, 1, 1, 1, 1], false, &mut modules);
    for i in 0..6 {
        push_runs(&L_PATTERNS[digits[i + 7] as usize], true, &mut modules);
    }
    push_runs(&[1, 1, 1], true, &mut modules);
    Some(modules)
}
