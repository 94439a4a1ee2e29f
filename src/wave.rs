// syn.tone -- tone generation and a minimal audio container
// Copyright (C) 2021  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! This is the namespace for all parts dealing with data in sampled waves.

use std::fmt;
use std::str::FromStr;

use snafu::Snafu;

/// The in-memory representation of a single sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// 8-bit unsigned, centered around 128.
    U8,
    /// 16-bit signed.
    I16,
    /// 32-bit floating point in the range [-1, 1].
    F32,
}

impl SampleFormat {
    /// The largest amplitude a sample can have in this format, measured from the center.
    ///
    /// Integer formats keep their range symmetric, so the most negative
    /// integer value is never produced by generation or mixing.
    ///
    /// ```
    /// use syn_tone::wave::SampleFormat;
    ///
    /// assert_eq!(SampleFormat::F32.max_amplitude(), 1.0);
    /// assert_eq!(SampleFormat::I16.max_amplitude(), 32767.0);
    /// assert_eq!(SampleFormat::U8.max_amplitude(), 127.0);
    /// ```
    pub fn max_amplitude(self) -> f64 {
        match self {
            SampleFormat::U8 => 127.0,
            SampleFormat::I16 => i16::MAX as f64,
            SampleFormat::F32 => 1.0,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::I16 => 2,
            SampleFormat::F32 => 4,
        }
    }

    pub fn is_integer(self) -> bool {
        self != SampleFormat::F32
    }

    pub fn name(self) -> &'static str {
        match self {
            SampleFormat::U8 => "uint8",
            SampleFormat::I16 => "int16",
            SampleFormat::F32 => "float32",
        }
    }
}

impl Default for SampleFormat {
    fn default() -> Self {
        SampleFormat::F32
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum ParseFormatError {
    #[snafu(display("Unknown sample format {:?}, expected one of uint8, int16, float32", name))]
    UnknownFormat { name: String },
}

impl FromStr for SampleFormat {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "u8" | "uint8" => Ok(SampleFormat::U8),
            "i16" | "s16" | "int16" => Ok(SampleFormat::I16),
            "f32" | "float32" => Ok(SampleFormat::F32),
            _ => Err(ParseFormatError::UnknownFormat { name: s.to_string() }),
        }
    }
}

/// A mono (or already interleaved) buffer of samples in one of the supported formats.
#[derive(Debug, Clone, PartialEq)]
pub enum SoundBuffer {
    U8(Vec<u8>),
    I16(Vec<i16>),
    F32(Vec<f32>),
}

/// How several buffers are combined into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixMode {
    /// Divide the sum by the number of buffers, keeping the result in the range of the inputs.
    Average,
    /// Keep the relative loudness of the inputs, clamping where the sum leaves the format's range.
    Sum,
}

impl Default for MixMode {
    fn default() -> Self {
        MixMode::Average
    }
}

impl SoundBuffer {
    pub fn silence(format: SampleFormat, sample_count: usize) -> Self {
        match format {
            SampleFormat::U8 => SoundBuffer::U8(vec![128; sample_count]),
            SampleFormat::I16 => SoundBuffer::I16(vec![0; sample_count]),
            SampleFormat::F32 => SoundBuffer::F32(vec![0.0; sample_count]),
        }
    }

    /// Build a buffer from signed amplitudes measured in units of the target format.
    /// Values outside the format's range are clamped, integer formats are rounded.
    ///
    /// ```
    /// use syn_tone::wave::*;
    ///
    /// let buf = SoundBuffer::from_amplitudes(SampleFormat::U8, vec![0.0, 200.0, -1.4]);
    /// assert_eq!(buf, SoundBuffer::U8(vec![128, 255, 127]));
    /// ```
    pub fn from_amplitudes<I: IntoIterator<Item = f64>>(format: SampleFormat, amplitudes: I) -> Self {
        let max = format.max_amplitude();
        let clamped = amplitudes.into_iter().map(move |a| a.max(-max).min(max));
        match format {
            SampleFormat::U8 => SoundBuffer::U8(clamped.map(|a| (a.round() + 128.0) as u8).collect()),
            SampleFormat::I16 => SoundBuffer::I16(clamped.map(|a| a.round() as i16).collect()),
            SampleFormat::F32 => SoundBuffer::F32(clamped.map(|a| a as f32).collect()),
        }
    }

    pub fn format(&self) -> SampleFormat {
        match self {
            SoundBuffer::U8(_) => SampleFormat::U8,
            SoundBuffer::I16(_) => SampleFormat::I16,
            SoundBuffer::F32(_) => SampleFormat::F32,
        }
    }

    /// Size of the buffer in samples.
    pub fn len(&self) -> usize {
        match self {
            SoundBuffer::U8(s) => s.len(),
            SoundBuffer::I16(s) => s.len(),
            SoundBuffer::F32(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the buffer in bytes.
    pub fn byte_len(&self) -> usize {
        self.len() * self.format().bytes_per_sample()
    }

    /// The signed amplitude of every sample, in units of the buffer's format.
    pub fn amplitudes(&self) -> Vec<f64> {
        match self {
            SoundBuffer::U8(s) => s.iter().map(|&x| x as f64 - 128.0).collect(),
            SoundBuffer::I16(s) => s.iter().map(|&x| x as f64).collect(),
            SoundBuffer::F32(s) => s.iter().map(|&x| x as f64).collect(),
        }
    }

    /// The largest absolute amplitude in the buffer.
    pub fn peak(&self) -> f64 {
        self.amplitudes().into_iter().map(f64::abs).fold(0.0, f64::max)
    }

    /// Rewrite every sample through `f`, which receives the sample index and its amplitude.
    /// The result is clamped to the format's range again.
    pub fn map_amplitudes<F: FnMut(usize, f64) -> f64>(&mut self, mut f: F) {
        let format = self.format();
        let mapped: Vec<f64> = self
            .amplitudes()
            .into_iter()
            .enumerate()
            .map(|(i, a)| f(i, a))
            .collect();
        *self = SoundBuffer::from_amplitudes(format, mapped);
    }

    pub fn truncate(&mut self, len: usize) {
        match self {
            SoundBuffer::U8(s) => s.truncate(len),
            SoundBuffer::I16(s) => s.truncate(len),
            SoundBuffer::F32(s) => s.truncate(len),
        }
    }

    /// Append the samples of another buffer, converting them to this buffer's format first.
    pub fn extend_from(&mut self, other: &SoundBuffer) {
        let other = other.convert(self.format());
        match (self, other) {
            (SoundBuffer::U8(s), SoundBuffer::U8(o)) => s.extend(o),
            (SoundBuffer::I16(s), SoundBuffer::I16(o)) => s.extend(o),
            (SoundBuffer::F32(s), SoundBuffer::F32(o)) => s.extend(o),
            _ => unreachable!("converted to the same format"),
        }
    }

    /// Rescale the buffer into another sample format, keeping its relative loudness.
    ///
    /// ```
    /// use syn_tone::wave::*;
    ///
    /// let buf = SoundBuffer::F32(vec![0.0, 1.0, -0.5]);
    /// assert_eq!(buf.convert(SampleFormat::I16), SoundBuffer::I16(vec![0, 32767, -16384]));
    /// ```
    pub fn convert(&self, format: SampleFormat) -> SoundBuffer {
        if format == self.format() {
            return self.clone();
        }
        let scale = format.max_amplitude() / self.format().max_amplitude();
        SoundBuffer::from_amplitudes(format, self.amplitudes().into_iter().map(|a| a * scale))
    }

    /// The raw little-endian bytes of all samples.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.byte_len());
        match self {
            SoundBuffer::U8(s) => bytes.extend_from_slice(s),
            SoundBuffer::I16(s) => s.iter().for_each(|x| bytes.extend_from_slice(&x.to_le_bytes())),
            SoundBuffer::F32(s) => s.iter().for_each(|x| bytes.extend_from_slice(&x.to_le_bytes())),
        }
        bytes
    }
}

/// Combine several buffers sample by sample.
///
/// All buffers are cut to the length of the shortest one and converted to the format of the first.
/// Returns `None` if there is nothing to mix.
///
/// ```
/// use syn_tone::wave::*;
///
/// let a = SoundBuffer::I16(vec![100, 200, 300]);
/// let b = SoundBuffer::I16(vec![300, 0]);
/// assert_eq!(mix(&[a.clone(), b.clone()], MixMode::Average), Some(SoundBuffer::I16(vec![200, 100])));
/// assert_eq!(mix(&[a, b], MixMode::Sum), Some(SoundBuffer::I16(vec![400, 200])));
/// ```
pub fn mix(buffers: &[SoundBuffer], mode: MixMode) -> Option<SoundBuffer> {
    let first = buffers.first()?;
    let format = first.format();
    let len = buffers.iter().map(SoundBuffer::len).min().unwrap_or(0);

    let mut sum = vec![0.0; len];
    for buffer in buffers {
        let amplitudes = buffer.convert(format).amplitudes();
        for (total, a) in sum.iter_mut().zip(amplitudes) {
            *total += a;
        }
    }

    if mode == MixMode::Average {
        let count = buffers.len() as f64;
        sum.iter_mut().for_each(|s| *s /= count);
    }
    Some(SoundBuffer::from_amplitudes(format, sum))
}
