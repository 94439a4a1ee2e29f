// syn.tone -- tone generation and a minimal audio container
// Copyright (C) 2021  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Turning note names, lengths and volumes into sound.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, trace};
use snafu::{ensure, ResultExt, Snafu};

use crate::oscillator::{Synth, SynthError, WaveShape, DEFAULT_SAMPLE_RATE};
use crate::tuning::{NoteTable, Tuning, TuningError};
use crate::wave::{self, MixMode, SampleFormat, SoundBuffer};

/// Token standing for a pause instead of a note.
pub const REST: &str = "r";

#[derive(Debug, PartialEq, Snafu)]
pub enum ComposeError {
    #[snafu(display("Could not synthesize note: {}", source))]
    Synthesis { source: SynthError },
    #[snafu(display("{}", source))]
    Notes { source: TuningError },
    #[snafu(display("Volume must be within 0 and {}, given volume: {}", max, volume))]
    VolumeOutOfRange { volume: f64, max: f64 },
    #[snafu(display("Invalid note length {:?}, expected a number of beats or seconds like 0.5s", spec))]
    InvalidLength { spec: String },
    #[snafu(display("Tempo must be a positive number of beats per minute, given tempo: {}", tempo))]
    InvalidTempo { tempo: f64 },
    #[snafu(display("Fraction must be within 0 and 1, given fraction: {}", fraction))]
    InvalidFraction { fraction: f64 },
    #[snafu(display("Nothing to mix"))]
    NothingToMix,
}

/// How long a note lasts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteLength {
    /// Relative to the tempo.
    Beats(f64),
    Seconds(f64),
}

impl NoteLength {
    /// Length in seconds at `tempo` beats per minute.
    pub fn seconds(self, tempo: f64) -> f64 {
        match self {
            NoteLength::Beats(beats) => 60.0 / tempo * beats,
            NoteLength::Seconds(secs) => secs,
        }
    }
}

impl fmt::Display for NoteLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteLength::Beats(beats) => write!(f, "{}", beats),
            NoteLength::Seconds(secs) => write!(f, "{}s", secs),
        }
    }
}

/// A bare number counts beats, a number followed by `s` counts seconds.
///
/// ```
/// use syn_tone::composer::NoteLength;
///
/// assert_eq!("1.5".parse(), Ok(NoteLength::Beats(1.5)));
/// assert_eq!("0.25S".parse(), Ok(NoteLength::Seconds(0.25)));
/// assert!("s".parse::<NoteLength>().is_err());
/// ```
impl FromStr for NoteLength {
    type Err = ComposeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = s.trim();
        let invalid = || ComposeError::InvalidLength { spec: s.to_string() };
        match spec.strip_suffix(|c| c == 's' || c == 'S') {
            Some(secs) => secs.parse().map(NoteLength::Seconds).map_err(|_| invalid()),
            None => spec.parse().map(NoteLength::Beats).map_err(|_| invalid()),
        }
    }
}

/// Everything a composer is configured with.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub sample_rate: u32,
    pub format: SampleFormat,
    /// Beats per minute.
    pub tempo: f64,
    pub tuning: Tuning,
    /// Length of notes that don't specify their own.
    pub default_length: NoteLength,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            sample_rate: DEFAULT_SAMPLE_RATE,
            format: SampleFormat::default(),
            tempo: 60.0,
            tuning: Tuning::default(),
            default_length: NoteLength::Seconds(1.0),
        }
    }
}

/// Plays notes and chords by name.
///
/// ```
/// use syn_tone::composer::*;
/// use syn_tone::oscillator::WaveShape;
/// use syn_tone::wave::MixMode;
///
/// let composer = Composer::new(Settings::default()).unwrap();
/// let note = composer.generate_note("A4", WaveShape::Sine, Some(NoteLength::Seconds(0.5)), None).unwrap();
/// assert_eq!(note.len(), 24000);
/// let chord = composer
///     .generate_chord(&["C4", "E4", "G4"], WaveShape::Triangle, None, Some(0.9), MixMode::Average)
///     .unwrap();
/// assert!(chord.peak() <= 0.9);
/// ```
#[derive(Debug)]
pub struct Composer {
    synth: Synth,
    table: RwLock<Arc<NoteTable>>,
    tempo: f64,
    default_length: NoteLength,
}

impl Composer {
    pub fn new(settings: Settings) -> Result<Self, ComposeError> {
        ensure!(
            settings.tempo > 0.0 && settings.tempo.is_finite(),
            InvalidTempo { tempo: settings.tempo }
        );
        let table = NoteTable::generate(settings.tuning).context(Notes)?;
        Ok(Self {
            synth: Synth::new(settings.sample_rate, settings.format),
            table: RwLock::new(Arc::new(table)),
            tempo: settings.tempo,
            default_length: settings.default_length,
        })
    }

    pub fn synth(&self) -> &Synth {
        &self.synth
    }

    pub fn format(&self) -> SampleFormat {
        self.synth.format()
    }

    pub fn sample_rate(&self) -> u32 {
        self.synth.sample_rate()
    }

    /// The current note table. Later retuning does not affect the returned table.
    pub fn note_table(&self) -> Arc<NoteTable> {
        Arc::clone(&self.table.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn set_tempo(&mut self, tempo: f64) -> Result<(), ComposeError> {
        ensure!(tempo > 0.0 && tempo.is_finite(), InvalidTempo { tempo });
        self.tempo = tempo;
        Ok(())
    }

    /// Replace the note table by one for `tuning`.
    ///
    /// The new table is built completely before it replaces the old one, so concurrent
    /// lookups see either table but never a mix. If building fails, the old table stays.
    pub fn set_tuning(&self, tuning: Tuning) -> Result<(), ComposeError> {
        let table = Arc::new(NoteTable::generate(tuning).context(Notes)?);
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = table;
        debug!(
            "retuned to {} tones per octave at {} Hz",
            tuning.tones_per_octave, tuning.reference_frequency
        );
        Ok(())
    }

    /// Move the reference "A4" to `reference_frequency`, keeping the number of tones per octave.
    pub fn retune(&self, reference_frequency: f64) -> Result<(), ComposeError> {
        let tuning = Tuning {
            reference_frequency,
            ..self.note_table().tuning()
        };
        self.set_tuning(tuning)
    }

    /// Frequency of a note token: either a number of Hz or a note name like `c#4`.
    pub fn resolve_note(&self, token: &str) -> Result<f64, ComposeError> {
        let token = token.trim();
        if let Ok(frequency) = token.parse::<f64>() {
            return Ok(frequency);
        }
        self.note_table().lookup(token).context(Notes)
    }

    /// The amplitude for a requested volume, half of the format's range by default.
    pub fn volume(&self, volume: Option<f64>) -> Result<f64, ComposeError> {
        let max = self.format().max_amplitude();
        match volume {
            None => Ok(max / 2.0),
            Some(volume) => {
                ensure!(volume >= 0.0 && volume <= max, VolumeOutOfRange { volume, max });
                Ok(volume)
            }
        }
    }

    /// Length in seconds, with the default length filling in.
    pub fn seconds(&self, length: Option<NoteLength>) -> f64 {
        length.unwrap_or(self.default_length).seconds(self.tempo)
    }

    /// Play a single note. The token [`REST`] produces silence.
    pub fn generate_note(
        &self,
        token: &str,
        shape: WaveShape,
        length: Option<NoteLength>,
        volume: Option<f64>,
    ) -> Result<SoundBuffer, ComposeError> {
        let duration = self.seconds(length);
        let amplitude = self.volume(volume)?;
        if token.trim().eq_ignore_ascii_case(REST) {
            if !(duration > 0.0 && duration.is_finite()) {
                return Err(SynthError::InvalidDuration { duration }).context(Synthesis);
            }
            return Ok(SoundBuffer::silence(self.format(), self.synth.sample_count(duration)));
        }
        let frequency = self.resolve_note(token)?;
        trace!("note {} at {} Hz for {} s", token, frequency, duration);
        self.synth
            .generate(shape, frequency, duration, amplitude)
            .context(Synthesis)
    }

    /// Play several notes at once.
    ///
    /// Every note is generated at the full volume. With [`MixMode::Average`] the sum is divided
    /// by the number of notes, with [`MixMode::Sum`] it is only clamped to the format's range.
    pub fn generate_chord<S: AsRef<str>>(
        &self,
        tokens: &[S],
        shape: WaveShape,
        length: Option<NoteLength>,
        volume: Option<f64>,
        mode: MixMode,
    ) -> Result<SoundBuffer, ComposeError> {
        ensure!(!tokens.is_empty(), NothingToMix);
        let notes = tokens
            .iter()
            .map(|token| self.generate_note(token.as_ref(), shape, length, volume))
            .collect::<Result<Vec<_>, _>>()?;
        self.mix(&notes, mode)
    }

    /// Mix arbitrary buffers into one in the composer's format.
    pub fn mix(&self, buffers: &[SoundBuffer], mode: MixMode) -> Result<SoundBuffer, ComposeError> {
        let mixed = wave::mix(buffers, mode).ok_or(ComposeError::NothingToMix)?;
        Ok(mixed.convert(self.format()))
    }

    /// Keep the leading `play_fraction` of the buffer and silence the rest.
    pub fn staccato(&self, buffer: &SoundBuffer, play_fraction: f64) -> Result<SoundBuffer, ComposeError> {
        ensure!(
            play_fraction >= 0.0 && play_fraction <= 1.0,
            InvalidFraction { fraction: play_fraction }
        );
        let played = (buffer.len() as f64 * play_fraction).round() as usize;
        let mut result = buffer.clone();
        result.truncate(played);
        result.extend_from(&SoundBuffer::silence(buffer.format(), buffer.len() - played));
        Ok(result)
    }
}
