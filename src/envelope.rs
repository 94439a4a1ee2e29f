// syn.tone -- tone generation and a minimal audio container
// Copyright (C) 2021  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Fading the edges of a buffer in and out to avoid clicks.
//!
//! Both fades use the rising half of a cosine, `(1 - cos t) / 2` for `t` in `[0, π]`,
//! sampled at `length` points. A fade longer than the buffer is cut to the buffer:
//! only the part of the ramp that overlaps the buffer is applied.

use std::f64::consts::PI;

use crate::wave::SoundBuffer;

/// Value of the rising ramp of `length` points at `index`.
fn ramp(index: usize, length: usize) -> f64 {
    if length < 2 {
        return 0.0;
    }
    let t = PI * index as f64 / (length - 1) as f64;
    (1.0 - t.cos()) * 0.5
}

/// The rising ramp of `length` points, from 0 to 1.
///
/// ```
/// use syn_tone::envelope::curve;
///
/// assert_eq!(curve(0), Vec::<f64>::new());
/// assert_eq!(curve(1), vec![0.0]);
/// let c = curve(3);
/// assert_eq!((c[0], c[2]), (0.0, 1.0));
/// assert!((c[1] - 0.5).abs() < 1e-12);
/// ```
pub fn curve(length: usize) -> Vec<f64> {
    (0..length).map(|i| ramp(i, length)).collect()
}

/// Factor of the fade-out at position `index` of a trailing window of `window` samples,
/// for a ramp of `length` points.
fn fade_out_factor(index: usize, window: usize, length: usize) -> f64 {
    ramp(window - 1 - index, length)
}

pub(crate) fn fade_out_samples(samples: &mut [f64], length: usize) {
    let window = length.min(samples.len());
    let start = samples.len() - window;
    for (i, s) in samples[start..].iter_mut().enumerate() {
        *s *= fade_out_factor(i, window, length);
    }
}

/// Fade in the first `length` samples of `buffer`.
///
/// ```
/// use syn_tone::envelope::fade_in;
/// use syn_tone::wave::SoundBuffer;
///
/// let mut buf = SoundBuffer::I16(vec![1000; 5]);
/// fade_in(&mut buf, 3);
/// assert_eq!(buf, SoundBuffer::I16(vec![0, 500, 1000, 1000, 1000]));
/// ```
pub fn fade_in(buffer: &mut SoundBuffer, length: usize) -> &mut SoundBuffer {
    let window = length.min(buffer.len());
    buffer.map_amplitudes(|i, a| if i < window { a * ramp(i, length) } else { a });
    buffer
}

/// Fade out the last `length` samples of `buffer`.
///
/// ```
/// use syn_tone::envelope::fade_out;
/// use syn_tone::wave::SoundBuffer;
///
/// let mut buf = SoundBuffer::I16(vec![1000; 5]);
/// fade_out(&mut buf, 3);
/// assert_eq!(buf, SoundBuffer::I16(vec![1000, 1000, 1000, 500, 0]));
/// ```
pub fn fade_out(buffer: &mut SoundBuffer, length: usize) -> &mut SoundBuffer {
    let window = length.min(buffer.len());
    let start = buffer.len() - window;
    buffer.map_amplitudes(|i, a| {
        if i >= start {
            a * fade_out_factor(i - start, window, length)
        } else {
            a
        }
    });
    buffer
}

pub fn fade_in_out(buffer: &mut SoundBuffer, fade_in_length: usize, fade_out_length: usize) -> &mut SoundBuffer {
    fade_in(buffer, fade_in_length);
    fade_out(buffer, fade_out_length)
}

/// Number of whole samples in `secs` seconds. Negative durations are empty.
pub fn seconds_to_samples(secs: f64, sample_rate: u32) -> usize {
    (secs * sample_rate as f64).max(0.0).floor() as usize
}

pub fn fade_in_secs(buffer: &mut SoundBuffer, secs: f64, sample_rate: u32) -> &mut SoundBuffer {
    fade_in(buffer, seconds_to_samples(secs, sample_rate))
}

pub fn fade_out_secs(buffer: &mut SoundBuffer, secs: f64, sample_rate: u32) -> &mut SoundBuffer {
    fade_out(buffer, seconds_to_samples(secs, sample_rate))
}

pub fn fade_in_out_secs(
    buffer: &mut SoundBuffer,
    fade_in_secs: f64,
    fade_out_secs: f64,
    sample_rate: u32,
) -> &mut SoundBuffer {
    fade_in_out(
        buffer,
        seconds_to_samples(fade_in_secs, sample_rate),
        seconds_to_samples(fade_out_secs, sample_rate),
    )
}
