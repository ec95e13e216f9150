// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Pixel Averaging Kernel
//!
//! Reference implementation of the averaging contract shared by every
//! backend:
//! - the centre is truncated toward zero to integer pixel coordinates
//! - the window is `[cx - r, cx + r] x [cy - r, cy + r]`, clipped to the frame
//! - R, G and B are averaged over the in-bounds pixels; alpha is always 1.0
//! - a window with no in-bounds pixel has no value
//!
//! Sums accumulate in `f64` so large windows do not drift.

use crate::{Color, Frame};

/// Inclusive pixel bounds of a clipped sample window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Window {
    pub fn width(&self) -> u32 {
        self.x1 - self.x0 + 1
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0 + 1
    }

    pub fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }
}

/// Clip the window around `center` to a `width x height` frame
///
/// Returns `None` when no pixel of the window lies inside the frame.
pub fn clip_window(width: u32, height: u32, center: (f32, f32), radius: i32) -> Option<Window> {
    if width == 0 || height == 0 {
        return None;
    }
    // `as` saturates, and NaN maps to 0
    let cx = center.0 as i32 as i64;
    let cy = center.1 as i32 as i64;
    let r = radius.max(0) as i64;

    let x0 = (cx - r).max(0);
    let y0 = (cy - r).max(0);
    let x1 = (cx + r).min(width as i64 - 1);
    let y1 = (cy + r).min(height as i64 - 1);

    if x0 > x1 || y0 > y1 {
        return None;
    }
    Some(Window {
        x0: x0 as u32,
        y0: y0 as u32,
        x1: x1 as u32,
        y1: y1 as u32,
    })
}

/// Mean colour of the window around `center`
pub fn average_region(frame: &Frame, center: (f32, f32), radius: i32) -> Option<Color> {
    let window = clip_window(frame.width(), frame.height(), center, radius)?;

    let mut sum = [0.0f64; 3];
    for y in window.y0..=window.y1 {
        for x in window.x0..=window.x1 {
            let p = frame.get_pixel(x, y).0;
            sum[0] += p[0] as f64;
            sum[1] += p[1] as f64;
            sum[2] += p[2] as f64;
        }
    }
    let count = window.pixel_count() as f64;
    Some(Color::rgb(
        (sum[0] / count) as f32,
        (sum[1] / count) as f32,
        (sum[2] / count) as f32,
    ))
}

/// Copy the in-bounds pixels of the window, alpha forced to 1.0
///
/// Row-major order. Empty when the window misses the frame.
pub fn extract_region(frame: &Frame, center: (f32, f32), radius: i32) -> Vec<[f32; 4]> {
    let Some(window) = clip_window(frame.width(), frame.height(), center, radius) else {
        return Vec::new();
    };

    let mut samples = Vec::with_capacity(window.pixel_count());
    for y in window.y0..=window.y1 {
        for x in window.x0..=window.x1 {
            let p = frame.get_pixel(x, y).0;
            samples.push([p[0], p[1], p[2], 1.0]);
        }
    }
    samples
}

/// Mean of a list of RGBA samples; `None` for an empty list
pub fn average_samples(samples: &[[f32; 4]]) -> Option<Color> {
    if samples.is_empty() {
        return None;
    }
    let mut sum = [0.0f64; 3];
    for s in samples {
        sum[0] += s[0] as f64;
        sum[1] += s[1] as f64;
        sum[2] += s[2] as f64;
    }
    let count = samples.len() as f64;
    Some(Color::rgb(
        (sum[0] / count) as f32,
        (sum[1] / count) as f32,
        (sum[2] / count) as f32,
    ))
}

/// Perceived brightness of `color`
pub fn luminance(color: &Color) -> f32 {
    color.luminance()
}
