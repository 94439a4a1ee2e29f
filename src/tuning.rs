// syn.tone -- tone generation and a minimal audio container
// Copyright (C) 2021  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

use std::collections::HashMap;
use std::fmt;

use log::debug;
use snafu::{ensure, Snafu};

/// Notes below this frequency are left out of the table.
pub const LOWEST_FREQUENCY: f64 = 20.0;
/// Table generation stops at the first note above this frequency.
pub const HIGHEST_FREQUENCY: f64 = 20_000.0;
/// The octave number given to the reference frequency.
pub const REFERENCE_OCTAVE: i32 = 4;

/// Letters followed directly by the next letter, without a sharp in between.
const WITHOUT_SHARP: [char; 2] = ['B', 'E'];

#[derive(Debug, PartialEq, Snafu)]
pub enum TuningError {
    #[snafu(display("Reference frequency must be a positive number, given frequency: {}", frequency))]
    InvalidReference { frequency: f64 },
    #[snafu(display(
        "Cannot name {} tones per octave, there are names for 1 to {} tones",
        tones,
        available
    ))]
    InvalidTonesPerOctave { tones: usize, available: usize },
    #[snafu(display("There is no note named {:?}", name))]
    UnknownNote { name: String },
}

/// Defines the tuning of an instrument by dividing every octave into `tones_per_octave`
/// equal steps, anchored at the note "A" of octave 4 sounding at `reference_frequency`.
///
/// # Examples
///
/// ```
/// use syn_tone::tuning::*;
/// assert_eq!(Tuning::default().reference_frequency, 440.0);
/// assert_eq!(Tuning::default().semitone(), 2.0f64.powf(1.0 / 12.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuning {
    pub tones_per_octave: usize,
    pub reference_frequency: f64,
}

/// Default concert tuning, where A4 corresponds to 440 Hz.
impl Default for Tuning {
    fn default() -> Self {
        Tuning {
            tones_per_octave: 12,
            reference_frequency: 440.0,
        }
    }
}

impl Tuning {
    /// Frequency ratio between two neighbouring tones.
    pub fn semitone(&self) -> f64 {
        2.0f64.powf(1.0 / self.tones_per_octave as f64)
    }

    /// Names of the tones of one octave, starting at the reference "A".
    ///
    /// ```
    /// use syn_tone::tuning::*;
    ///
    /// let names = Tuning::default().note_names().unwrap();
    /// assert_eq!(names.join(" "), "A A# B C C# D D# E F F# G G#");
    /// ```
    pub fn note_names(&self) -> Result<Vec<String>, TuningError> {
        let mut names = Vec::new();
        for letter in (b'A'..=b'Z').map(char::from) {
            names.push(letter.to_string());
            if !WITHOUT_SHARP.contains(&letter) {
                names.push(format!("{}#", letter));
            }
        }
        ensure!(
            self.tones_per_octave >= 1 && self.tones_per_octave <= names.len(),
            InvalidTonesPerOctave {
                tones: self.tones_per_octave,
                available: names.len()
            }
        );
        names.truncate(self.tones_per_octave);
        Ok(names)
    }

    /// Fold the reference down to the lowest octave that is still audible.
    /// Returns the folded frequency and the number of octaves it was moved down.
    fn base(&self) -> (f64, i32) {
        let mut base = self.reference_frequency;
        let mut octaves = 0;
        while base / 2.0 >= LOWEST_FREQUENCY {
            base /= 2.0;
            octaves += 1;
        }
        (base, octaves)
    }
}

/// Bring a note name into the form used as a table key.
pub fn canonical_name(name: &str) -> String {
    name.trim().to_uppercase()
}

/// All audible notes of a tuning, by name.
///
/// ```
/// use syn_tone::tuning::*;
///
/// let table = NoteTable::generate(Tuning::default()).unwrap();
/// assert_eq!(table.lookup("A4"), Ok(440.0));
/// assert_eq!(table.lookup("a5"), Ok(880.0));
/// assert!(table.lookup("H2").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct NoteTable {
    tuning: Tuning,
    /// In ascending order of (octave, tone).
    notes: Vec<(String, f64)>,
    index: HashMap<String, usize>,
}

impl NoteTable {
    pub fn generate(tuning: Tuning) -> Result<NoteTable, TuningError> {
        let reference = tuning.reference_frequency;
        ensure!(
            reference > 0.0 && reference.is_finite(),
            InvalidReference { frequency: reference }
        );
        let names = tuning.note_names()?;
        let semitone = tuning.semitone();
        let (base, folded) = tuning.base();

        let mut table = NoteTable {
            tuning,
            notes: Vec::new(),
            index: HashMap::new(),
        };
        'octaves: for octave in 0.. {
            for (step, name) in names.iter().enumerate() {
                let frequency = base * semitone.powi(step as i32) * 2.0f64.powi(octave);
                if frequency > HIGHEST_FREQUENCY {
                    break 'octaves;
                }
                if frequency >= LOWEST_FREQUENCY {
                    let label = octave + REFERENCE_OCTAVE - folded;
                    table.insert(&format!("{}{}", name, label), frequency);
                }
            }
        }
        debug!(
            "generated {} notes for {} tones per octave at {} Hz",
            table.len(),
            tuning.tones_per_octave,
            reference
        );
        Ok(table)
    }

    fn insert(&mut self, name: &str, frequency: f64) {
        let name = canonical_name(name);
        self.index.insert(name.clone(), self.notes.len());
        self.notes.push((name, frequency));
    }

    pub fn tuning(&self) -> Tuning {
        self.tuning
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.index
            .get(&canonical_name(name))
            .map(|&i| self.notes[i].1)
    }

    /// Frequency of the note called `name`, ignoring case.
    pub fn lookup(&self, name: &str) -> Result<f64, TuningError> {
        self.get(name)
            .ok_or_else(|| TuningError::UnknownNote { name: name.to_string() })
    }

    /// All notes from lowest to highest.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.notes.iter().map(|(name, f)| (name.as_str(), *f))
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

impl fmt::Display for NoteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, frequency) in self.iter() {
            writeln!(f, "{:<5} {:>10.3}", name, frequency)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use expect_test::expect;

    fn table(tones_per_octave: usize, reference_frequency: f64) -> NoteTable {
        NoteTable::generate(Tuning {
            tones_per_octave,
            reference_frequency,
        })
        .unwrap()
    }

    #[test]
    fn concert_pitch() {
        let t = table(12, 440.0);
        assert_eq!(t.get("A4"), Some(440.0));
        assert_eq!(t.get("A0"), Some(27.5));
        assert_eq!(t.get("A#4"), Some(440.0 * 2.0f64.powf(1.0 / 12.0)));
        assert!((t.get("c#4").unwrap() - 554.365).abs() < 1e-3);
        // no enharmonic duplicates
        assert_eq!(t.get("B#4"), None);
        assert_eq!(t.get("E#4"), None);
    }

    #[test]
    fn audible_range() {
        for &(tones, reference) in &[(12, 440.0), (12, 432.0), (19, 440.0), (5, 1000.0), (12, 15.0), (24, 30_000.0)] {
            let t = table(tones, reference);
            assert!(!t.is_empty());
            let frequencies: Vec<f64> = t.iter().map(|(_, f)| f).collect();
            assert!(frequencies.iter().all(|&f| f >= LOWEST_FREQUENCY && f <= HIGHEST_FREQUENCY));
            assert!(frequencies.windows(2).all(|w| w[0] < w[1]), "{} {}", tones, reference);
        }
    }

    #[test]
    fn lowest_and_highest_notes() {
        let t = table(12, 440.0);
        let (lowest, _) = t.iter().next().unwrap();
        let (highest, _) = t.iter().last().unwrap();
        assert_eq!(lowest, "A0");
        assert_eq!(highest, "D#9");
        assert_eq!(t.len(), 115);
    }

    #[test]
    fn case_insensitive() {
        let t = table(12, 440.0);
        assert_eq!(t.lookup("g#3"), t.lookup("G#3"));
        assert_eq!(
            t.lookup("X4"),
            Err(TuningError::UnknownNote {
                name: "X4".to_string()
            })
        );
    }

    #[test]
    fn retuned_reference_is_exact() {
        assert_eq!(table(12, 432.0).get("A4"), Some(432.0));
        assert_eq!(table(7, 440.0).get("A4"), Some(440.0));
    }

    #[test]
    fn invalid_tunings() {
        assert_eq!(
            NoteTable::generate(Tuning {
                tones_per_octave: 0,
                reference_frequency: 440.0
            })
            .unwrap_err(),
            TuningError::InvalidTonesPerOctave { tones: 0, available: 50 }
        );
        assert!(NoteTable::generate(Tuning {
            tones_per_octave: 51,
            reference_frequency: 440.0
        })
        .is_err());
        assert!(NoteTable::generate(Tuning {
            tones_per_octave: 12,
            reference_frequency: -1.0
        })
        .is_err());
    }

    #[test]
    fn non_standard_names() {
        let names = Tuning {
            tones_per_octave: 5,
            reference_frequency: 440.0,
        }
        .note_names()
        .unwrap();
        assert_eq!(names, vec!["A", "A#", "B", "C", "C#"]);
    }

    #[test]
    fn two_tone_table() {
        let t = table(2, 440.0);
        expect![[r#"
            A0        27.500
            A#0       38.891
            A1        55.000
            A#1       77.782
            A2       110.000
            A#2      155.563
            A3       220.000
            A#3      311.127
            A4       440.000
            A#4      622.254
            A5       880.000
            A#5     1244.508
            A6      1760.000
            A#6     2489.016
            A7      3520.000
            A#7     4978.032
            A8      7040.000
            A#8     9956.063
            A9     14080.000
            A#9    19912.127
        "#]]
        .assert_eq(&t.to_string());
    }
}
