// syn.tone -- tone generation and a minimal audio container
// Copyright (C) 2021  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Oscillators turning a frequency and a duration into a buffer of samples.

use std::f64::consts::{FRAC_2_PI, PI, TAU};
use std::fmt;
use std::str::FromStr;

use log::trace;
use snafu::{ensure, Snafu};

use crate::cache::{CachedShape, WaveCache, WaveRequest};
use crate::envelope;
use crate::wave::{SampleFormat, SoundBuffer};

/// Harmonics above this frequency are not summed by the band-limited oscillators.
pub const AUDIBLE_LIMIT: f64 = 20_000.0;

/// Upper bound of [`harmonic_count`], reached at 20 Hz.
pub const MAX_HARMONICS: usize = 1000;

pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Default exponent of the harmonic weights of [`Synth::smooth_saw`].
pub const DEFAULT_SMOOTHNESS: f64 = 2.5;

/// (ratio, weight) pairs making up the organ timbre.
const ORGAN_PARTIALS: [(f64, f64); 7] = [
    (1.0, 1.0),
    (2.0, 0.9),
    (4.0, 1.0),
    (6.0, 0.6),
    (16.0, 0.7),
    (20.0, 0.5),
    (24.0, 0.3),
];
const ORGAN_GAIN: f64 = 0.334;

/// (ratio, weight) pairs making up the mallet timbre.
const MALLET_PARTIALS: [(f64, f64); 4] = [(1.0, 1.0), (10.0, 0.75), (20.0, 0.5), (30.0, 0.25)];
const MALLET_GAIN: f64 = 0.25;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum WaveShape {
    Sine,
    /// Square wave evaluated in closed form.
    Square,
    /// Triangle wave evaluated in closed form.
    Triangle,
    /// Rising sawtooth evaluated in closed form.
    Sawtooth,
    /// Square wave summed from its odd harmonics up to the audible limit.
    BandLimitedSquare,
    /// Triangle wave summed from its odd harmonics up to the audible limit.
    BandLimitedTriangle,
    /// Sawtooth summed from all harmonics up to the audible limit.
    BandLimitedSawtooth,
    Organ,
    /// A percussive tone that fades out over its whole duration.
    Mallet,
}

impl WaveShape {
    pub const ALL: [WaveShape; 9] = [
        WaveShape::Sine,
        WaveShape::Square,
        WaveShape::Triangle,
        WaveShape::Sawtooth,
        WaveShape::BandLimitedSquare,
        WaveShape::BandLimitedTriangle,
        WaveShape::BandLimitedSawtooth,
        WaveShape::Organ,
        WaveShape::Mallet,
    ];

    pub fn name(self) -> &'static str {
        match self {
            WaveShape::Sine => "sine",
            WaveShape::Square => "square",
            WaveShape::Triangle => "triangle",
            WaveShape::Sawtooth => "saw",
            WaveShape::BandLimitedSquare => "bl-square",
            WaveShape::BandLimitedTriangle => "bl-triangle",
            WaveShape::BandLimitedSawtooth => "bl-saw",
            WaveShape::Organ => "organ",
            WaveShape::Mallet => "mallet",
        }
    }

    /// Compute `sample_count` samples of this shape at unit amplitude.
    pub fn render(self, frequency: f64, sample_rate: u32, sample_count: usize) -> Vec<f64> {
        let angles = (0..sample_count).map(|i| TAU * frequency * i as f64 / sample_rate as f64);
        match self {
            WaveShape::Sine => angles.map(f64::sin).collect(),
            WaveShape::Square => angles.map(|x| sign(x.sin())).collect(),
            WaveShape::Triangle => angles.map(|x| FRAC_2_PI * x.sin().asin()).collect(),
            WaveShape::Sawtooth => (0..sample_count)
                .map(|i| {
                    // half a period ahead, so that the wave rises through zero at t = 0
                    let phase = frequency * i as f64 / sample_rate as f64 + 0.5;
                    2.0 * (phase - phase.floor() - 0.5)
                })
                .collect(),
            WaveShape::BandLimitedSquare => {
                let weight = |k: usize| if k % 2 == 1 { Some(1.0 / k as f64) } else { None };
                additive(angles, harmonic_count(frequency), weight, 4.0 / PI)
            }
            WaveShape::BandLimitedTriangle => {
                let weight = |k: usize| {
                    if k % 2 == 1 {
                        let sign = if (k / 2) % 2 == 0 { 1.0 } else { -1.0 };
                        Some(sign / (k * k) as f64)
                    } else {
                        None
                    }
                };
                additive(angles, harmonic_count(frequency), weight, 8.0 / (PI * PI))
            }
            WaveShape::BandLimitedSawtooth => {
                additive(angles, harmonic_count(frequency), |k| Some(alternating(k) / k as f64), FRAC_2_PI)
            }
            WaveShape::Organ => partials(angles, &ORGAN_PARTIALS, ORGAN_GAIN),
            WaveShape::Mallet => {
                let mut samples = partials(angles, &MALLET_PARTIALS, MALLET_GAIN);
                let len = samples.len();
                envelope::fade_out_samples(&mut samples, len);
                samples
            }
        }
    }
}

impl fmt::Display for WaveShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum ParseShapeError {
    #[snafu(display("Unknown wave shape {:?}, expected one of {}", name, shape_names()))]
    UnknownShape { name: String },
}

fn shape_names() -> String {
    let names: Vec<_> = WaveShape::ALL.iter().map(|s| s.name()).collect();
    names.join(", ")
}

impl FromStr for WaveShape {
    type Err = ParseShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        WaveShape::ALL
            .iter()
            .copied()
            .find(|shape| shape.name() == lower)
            .ok_or(ParseShapeError::UnknownShape { name: s.to_string() })
    }
}

/// Number of harmonic indices (exclusive upper bound) summed for a fundamental.
/// The fundamental itself is always included. Fundamentals below the audible range
/// get no more harmonics than the lowest audible one.
///
/// ```
/// use syn_tone::oscillator::{harmonic_count, MAX_HARMONICS};
///
/// assert_eq!(harmonic_count(440.0), 46);
/// assert_eq!(harmonic_count(20_000.0), 2);
/// assert_eq!(harmonic_count(1e-15), MAX_HARMONICS);
/// ```
pub fn harmonic_count(frequency: f64) -> usize {
    let count = (AUDIBLE_LIMIT / frequency).ceil().min(MAX_HARMONICS as f64);
    (count as usize).max(2)
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// `+1` for odd harmonics, `-1` for even ones.
fn alternating(k: usize) -> f64 {
    if k % 2 == 1 {
        1.0
    } else {
        -1.0
    }
}

/// Sum `weight(k) * sin(k x)` over the harmonics `1 <= k < count` that have a weight.
fn additive<I, W>(angles: I, count: usize, weight: W, gain: f64) -> Vec<f64>
where
    I: Iterator<Item = f64>,
    W: Fn(usize) -> Option<f64>,
{
    let weights: Vec<(f64, f64)> = (1..count)
        .filter_map(|k| weight(k).map(|w| (k as f64, w)))
        .collect();
    trace!("summing {} harmonics", weights.len());
    angles
        .map(|x| gain * weights.iter().map(|(k, w)| w * (x * k).sin()).sum::<f64>())
        .collect()
}

fn partials<I: Iterator<Item = f64>>(angles: I, table: &[(f64, f64)], gain: f64) -> Vec<f64> {
    angles
        .map(|x| gain * table.iter().map(|(ratio, w)| w * (x * ratio).sin()).sum::<f64>())
        .collect()
}

#[derive(Debug, PartialEq, Snafu)]
pub enum SynthError {
    #[snafu(display("Frequency must be a positive number, given frequency: {}", frequency))]
    InvalidFrequency { frequency: f64 },
    #[snafu(display("Duration must be a positive number of seconds, given duration: {}", duration))]
    InvalidDuration { duration: f64 },
    #[snafu(display(
        "Amplitude must be within ±{max} for {}, given amplitude: {}",
        format,
        amplitude,
        max = format.max_amplitude()
    ))]
    AmplitudeOutOfRange { amplitude: f64, format: SampleFormat },
}

/// The synthesis entry point: renders wave shapes in one sample format at a fixed sample rate,
/// remembering the unit-amplitude shape of every request it has computed.
#[derive(Debug)]
pub struct Synth {
    sample_rate: u32,
    format: SampleFormat,
    cache: WaveCache,
}

impl Default for Synth {
    fn default() -> Self {
        Synth::new(DEFAULT_SAMPLE_RATE, SampleFormat::default())
    }
}

impl Synth {
    pub fn new(sample_rate: u32, format: SampleFormat) -> Self {
        Self {
            sample_rate,
            format,
            cache: WaveCache::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// Switch the format of all buffers generated from now on.
    /// Cached shapes of the old format are kept, as they are keyed by format.
    pub fn set_format(&mut self, format: SampleFormat) {
        self.format = format;
    }

    pub fn cache(&self) -> &WaveCache {
        &self.cache
    }

    /// Number of samples covering `duration` seconds.
    pub fn sample_count(&self, duration: f64) -> usize {
        (duration * self.sample_rate as f64).round() as usize
    }

    fn request(&self, shape: WaveShape, frequency: f64, duration: f64) -> Result<WaveRequest, SynthError> {
        ensure!(frequency > 0.0 && frequency.is_finite(), InvalidFrequency { frequency });
        ensure!(duration > 0.0 && duration.is_finite(), InvalidDuration { duration });
        WaveRequest::new(shape, frequency, duration, self.format)
            .ok_or(SynthError::InvalidFrequency { frequency })
    }

    fn check_amplitude(&self, amplitude: f64) -> Result<(), SynthError> {
        ensure!(
            amplitude.abs() <= self.format.max_amplitude(),
            AmplitudeOutOfRange {
                amplitude,
                format: self.format
            }
        );
        Ok(())
    }

    /// The unit-amplitude shape for a request, computed at most once per distinct request.
    pub fn unit_shape(&self, shape: WaveShape, frequency: f64, duration: f64) -> Result<CachedShape, SynthError> {
        let request = self.request(shape, frequency, duration)?;
        let sample_count = self.sample_count(duration);
        let sample_rate = self.sample_rate;
        Ok(self
            .cache
            .get_or_insert_with(request, || shape.render(frequency, sample_rate, sample_count)))
    }

    /// Generate `duration` seconds of `shape` at `frequency` Hz.
    ///
    /// The amplitude is measured in units of the synth's sample format,
    /// the result is clamped to `[-amplitude, amplitude]`.
    ///
    /// ```
    /// use syn_tone::oscillator::*;
    /// use syn_tone::wave::*;
    ///
    /// let synth = Synth::new(8000, SampleFormat::I16);
    /// let buf = synth.generate(WaveShape::Sine, 2000.0, 0.001, 1000.0).unwrap();
    /// assert_eq!(buf, SoundBuffer::I16(vec![0, 1000, 0, -1000, 0, 1000, 0, -1000]));
    /// assert!(synth.generate(WaveShape::Sine, 0.0, 1.0, 1000.0).is_err());
    /// ```
    pub fn generate(
        &self,
        shape: WaveShape,
        frequency: f64,
        duration: f64,
        amplitude: f64,
    ) -> Result<SoundBuffer, SynthError> {
        self.check_amplitude(amplitude)?;
        let unit = self.unit_shape(shape, frequency, duration)?;
        Ok(self.scale(&unit, amplitude))
    }

    /// A sawtooth without the sharp edges: the harmonic series of the sawtooth with
    /// weights falling off as `1 / k^smoothness`. Not cached, as the smoothness is not part of the request.
    pub fn smooth_saw(
        &self,
        frequency: f64,
        duration: f64,
        amplitude: f64,
        smoothness: f64,
    ) -> Result<SoundBuffer, SynthError> {
        self.check_amplitude(amplitude)?;
        self.request(WaveShape::BandLimitedSawtooth, frequency, duration)?;
        let sample_rate = self.sample_rate as f64;
        let angles = (0..self.sample_count(duration)).map(|i| TAU * frequency * i as f64 / sample_rate);
        let samples = additive(
            angles,
            harmonic_count(frequency),
            |k| Some(alternating(k) / (k as f64).powf(smoothness)),
            FRAC_2_PI,
        );
        Ok(self.scale(&samples, amplitude))
    }

    fn scale(&self, unit: &[f64], amplitude: f64) -> SoundBuffer {
        let limit = amplitude.abs();
        SoundBuffer::from_amplitudes(
            self.format,
            unit.iter().map(|s| (s * amplitude).max(-limit).min(limit)),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn max_difference(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
    }

    fn mean_difference(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum::<f64>() / a.len() as f64
    }

    #[test]
    fn sample_count_is_rounded_duration() {
        let synth = Synth::new(48_000, SampleFormat::F32);
        for &shape in WaveShape::ALL.iter() {
            for &(frequency, duration) in &[(440.0, 0.01), (1000.0, 0.123_456), (55.5, 0.000_01), (3000.0, 0.02501)] {
                let buf = synth.generate(shape, frequency, duration, 0.5).unwrap();
                assert_eq!(buf.len(), (duration * 48_000.0f64).round() as usize, "{} {}", shape, duration);
            }
        }
    }

    #[test]
    fn rejects_bad_frequencies() {
        let synth = Synth::default();
        for &frequency in &[0.0, -440.0, f64::NAN, f64::INFINITY] {
            match synth.generate(WaveShape::Sine, frequency, 1.0, 0.5) {
                Err(SynthError::InvalidFrequency { .. }) => {}
                other => panic!("expected invalid frequency for {}, got {:?}", frequency, other),
            }
        }
        assert_eq!(synth.cache().len(), 0);
    }

    #[test]
    fn rejects_bad_durations_and_amplitudes() {
        let synth = Synth::new(48_000, SampleFormat::I16);
        assert_eq!(
            synth.generate(WaveShape::Sine, 440.0, 0.0, 1.0),
            Err(SynthError::InvalidDuration { duration: 0.0 })
        );
        assert_eq!(
            synth.generate(WaveShape::Sine, 440.0, 1.0, 40_000.0),
            Err(SynthError::AmplitudeOutOfRange {
                amplitude: 40_000.0,
                format: SampleFormat::I16
            })
        );
    }

    #[test]
    fn subsonic_fundamentals_are_capped() {
        assert_eq!(harmonic_count(20.0), MAX_HARMONICS);
        assert_eq!(harmonic_count(1e-3), MAX_HARMONICS);
        assert_eq!(harmonic_count(f64::MIN_POSITIVE), MAX_HARMONICS);
        assert_eq!(harmonic_count(40.0), 500);

        let synth = Synth::new(8000, SampleFormat::F32);
        let buf = synth.generate(WaveShape::BandLimitedSquare, 1e-9, 0.001, 0.5).unwrap();
        assert_eq!(buf.len(), 8);
        assert!(buf.peak() <= 0.5);
        let buf = synth.smooth_saw(1e-9, 0.001, 0.5, DEFAULT_SMOOTHNESS).unwrap();
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn closed_form_triangle_matches_harmonics() {
        for &frequency in &[20.0, 55.0, 261.63, 440.0, 1000.0, 2000.0] {
            let exact = WaveShape::BandLimitedTriangle.render(frequency, 48_000, 2400);
            let fast = WaveShape::Triangle.render(frequency, 48_000, 2400);
            let diff = max_difference(&exact, &fast);
            assert!(diff < 0.05, "{} Hz differs by {}", frequency, diff);
        }
    }

    #[test]
    fn closed_form_square_and_saw_match_harmonics() {
        // Pointwise the band-limited waves differ near the jumps, on average they agree.
        for &frequency in &[20.0, 55.0, 110.0, 261.63, 440.0] {
            for &(exact_shape, fast_shape) in &[
                (WaveShape::BandLimitedSquare, WaveShape::Square),
                (WaveShape::BandLimitedSawtooth, WaveShape::Sawtooth),
            ] {
                let exact = exact_shape.render(frequency, 48_000, 2400);
                let fast = fast_shape.render(frequency, 48_000, 2400);
                let diff = mean_difference(&exact, &fast);
                assert!(diff < 0.05, "{} at {} Hz differs by {}", fast_shape, frequency, diff);
            }
        }
    }

    /// Distance of sample `i` to the nearest jump of `shape`, in periods.
    fn distance_to_jump(shape: WaveShape, frequency: f64, i: usize) -> f64 {
        let phase = frequency * i as f64 / 48_000.0;
        match shape {
            WaveShape::Square => (2.0 * phase - (2.0 * phase).round()).abs() / 2.0,
            _ => (phase - 0.5 - (phase - 0.5).round()).abs(),
        }
    }

    #[test]
    fn closed_form_square_and_saw_match_away_from_jumps() {
        for &frequency in &[20.0, 55.0, 110.0, 261.63, 440.0, 1000.0, 1500.0, 2000.0] {
            // only a handful of harmonics are left above 1 kHz, so their ripple spans the whole period
            let tolerance = if frequency <= 1000.0 { 0.05 } else { 0.07 };
            for &(exact_shape, fast_shape) in &[
                (WaveShape::BandLimitedSquare, WaveShape::Square),
                (WaveShape::BandLimitedSawtooth, WaveShape::Sawtooth),
            ] {
                let exact = exact_shape.render(frequency, 48_000, 2400);
                let fast = fast_shape.render(frequency, 48_000, 2400);
                let checked: Vec<usize> = (0..2400)
                    .filter(|&i| distance_to_jump(fast_shape, frequency, i) >= 0.15)
                    .collect();
                assert!(checked.len() > 2400 / 4, "{} at {} Hz", fast_shape, frequency);
                let diff = checked
                    .iter()
                    .map(|&i| (exact[i] - fast[i]).abs())
                    .fold(0.0, f64::max);
                assert!(diff < tolerance, "{} at {} Hz differs by {}", fast_shape, frequency, diff);
            }
        }
    }

    #[test]
    fn sawtooth_rises_through_zero() {
        let saw = WaveShape::Sawtooth.render(100.0, 1000, 6);
        let expected = [0.0, 0.2, 0.4, 0.6, 0.8, -1.0];
        assert!(max_difference(&saw, &expected) < 1e-9, "{:?}", saw);
    }

    #[test]
    fn square_is_signum_of_sine() {
        let square = WaveShape::Square.render(1000.0, 8000, 8);
        assert_eq!(square[0], 0.0);
        assert_eq!(&square[1..4], &[1.0, 1.0, 1.0]);
        assert_eq!(&square[5..8], &[-1.0, -1.0, -1.0]);
    }

    #[test]
    fn mallet_fades_out() {
        let mallet = WaveShape::Mallet.render(440.0, 48_000, 4800);
        assert_eq!(*mallet.last().unwrap(), 0.0);
        let head = mallet[..480].iter().map(|x| x.abs()).fold(0.0, f64::max);
        let tail = mallet[4320..].iter().map(|x| x.abs()).fold(0.0, f64::max);
        assert!(tail < head / 10.0);
    }

    #[test]
    fn output_stays_within_amplitude() {
        let synth = Synth::new(48_000, SampleFormat::I16);
        for &shape in WaveShape::ALL.iter() {
            let buf = synth.generate(shape, 110.0, 0.05, 12_000.0).unwrap();
            assert!(buf.peak() <= 12_000.0, "{} peaks at {}", shape, buf.peak());
        }
        let buf = synth.smooth_saw(110.0, 0.05, 12_000.0, DEFAULT_SMOOTHNESS).unwrap();
        assert!(buf.peak() <= 12_000.0);
        assert!(buf.peak() > 1_000.0);
    }

    #[test]
    fn unsigned_samples_are_centered() {
        let synth = Synth::new(8000, SampleFormat::U8);
        let buf = synth.generate(WaveShape::Sine, 2000.0, 0.0005, 100.0).unwrap();
        assert_eq!(buf, SoundBuffer::U8(vec![128, 228, 128, 28]));
    }

    #[test]
    fn parse_shapes() {
        assert_eq!("Organ".parse(), Ok(WaveShape::Organ));
        assert_eq!("bl-saw".parse(), Ok(WaveShape::BandLimitedSawtooth));
        assert!("noise".parse::<WaveShape>().is_err());
    }
}
