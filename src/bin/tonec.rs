// syn.tone -- tone generation and a minimal audio container
// Copyright (C) 2021  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! `tonec` - generates notes and chords, and converts between sound files.

use std::error::Error;
use std::path::{Path, PathBuf};

use log::info;
use structopt::StructOpt;

use syn_tone::composer::{Composer, NoteLength, Settings};
use syn_tone::container::{ContainerFormat, Descriptor};
use syn_tone::envelope;
use syn_tone::file;
use syn_tone::oscillator::WaveShape;
use syn_tone::output::Device;
use syn_tone::tuning::{NoteTable, Tuning};
use syn_tone::wave::{MixMode, SampleFormat, SoundBuffer};

#[derive(Debug, StructOpt)]
#[structopt(name = "tonec", about = "Generating tones and chords")]
struct Opt {
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: usize,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Generate a single note.
    Note {
        /// Note name like c#4, a frequency in Hz, or r for a rest.
        note: String,
        #[structopt(flatten)]
        synth: SynthOpt,
    },
    /// Generate several notes at once.
    Chord {
        notes: Vec<String>,
        /// Keep the loudness of every note instead of averaging them.
        #[structopt(long)]
        sum: bool,
        #[structopt(flatten)]
        synth: SynthOpt,
    },
    /// List the notes of a tuning with their frequencies.
    Table {
        #[structopt(long, default_value = "12")]
        tones: usize,
        #[structopt(long, default_value = "440")]
        reference: f64,
    },
    /// Show the header of a sound file.
    Info {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
    },
    /// Convert between .tone containers and WAV files.
    Convert {
        #[structopt(parse(from_os_str))]
        source: PathBuf,
        #[structopt(parse(from_os_str))]
        target: PathBuf,
        /// Sample format of the target: uint8, int16 or float32. The source format is kept if not given.
        #[structopt(long)]
        format: Option<SampleFormat>,
    },
    /// Play a sound file through sox.
    Play {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
    },
    /// Record from the default input through sox.
    Record {
        /// Recording length in seconds.
        #[structopt(long, default_value = "5")]
        secs: f64,
        #[structopt(long, default_value = "48000")]
        rate: u32,
        #[structopt(long, default_value = "int16")]
        format: SampleFormat,
        #[structopt(parse(from_os_str))]
        output: PathBuf,
    },
}

#[derive(Debug, StructOpt)]
struct SynthOpt {
    /// Sample rate in Hz.
    #[structopt(long, default_value = "48000")]
    rate: u32,
    /// Sample format: uint8, int16 or float32.
    #[structopt(long, default_value = "float32")]
    format: SampleFormat,
    /// Beats per minute.
    #[structopt(long, default_value = "60")]
    tempo: f64,
    /// Number of tones per octave.
    #[structopt(long, default_value = "12")]
    tones: usize,
    /// Frequency of A4 in Hz.
    #[structopt(long, default_value = "440")]
    reference: f64,
    #[structopt(short, long, default_value = "sine")]
    wave: WaveShape,
    /// Number of beats, or seconds when followed by s.
    #[structopt(short, long)]
    duration: Option<NoteLength>,
    /// Amplitude in units of the sample format. Half of the maximum if not given.
    #[structopt(long)]
    volume: Option<f64>,
    /// Seconds of fading in and out.
    #[structopt(long, default_value = "0")]
    fade: f64,
    /// Output file (.tone or .wav). The sound is played directly if not given.
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,
}

impl SynthOpt {
    fn composer(&self) -> Result<Composer, Box<dyn Error>> {
        let settings = Settings {
            sample_rate: self.rate,
            format: self.format,
            tempo: self.tempo,
            tuning: Tuning {
                tones_per_octave: self.tones,
                reference_frequency: self.reference,
            },
            ..Settings::default()
        };
        Ok(Composer::new(settings)?)
    }

    fn emit(&self, mut buffer: SoundBuffer) -> Result<(), Box<dyn Error>> {
        envelope::fade_in_out_secs(&mut buffer, self.fade, self.fade, self.rate);
        match &self.output {
            Some(path) => {
                file::write_audio_file(path, &buffer, &file::mono_descriptor(&buffer, self.rate))?;
                info!("wrote {} samples to {}", buffer.len(), path.display());
            }
            None => Device::default().play_buffer(&buffer, self.rate)?,
        }
        Ok(())
    }
}

fn play_file(path: &Path) -> Result<(), Box<dyn Error>> {
    let (buffer, descriptor) = file::read_audio_file(path)?;
    info!("playing {} ({})", path.display(), descriptor);
    let format = ContainerFormat::from(buffer.format());
    let descriptor = Descriptor::new(descriptor.sample_rate, format, descriptor.channels);
    Device::default().with_output(&descriptor, |stream| {
        syn_tone::output::write_chunked(stream, &buffer.to_le_bytes()).map(|_| ())
    })?;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let opt = Opt::from_args();

    let level = match opt.verbose {
        0 => log::Level::Info,
        1 => log::Level::Debug,
        _ => log::Level::Trace,
    };
    simple_logger::init_with_level(level)?;

    match opt.command {
        Command::Note { note, synth } => {
            let composer = synth.composer()?;
            let buffer = composer.generate_note(&note, synth.wave, synth.duration, synth.volume)?;
            synth.emit(buffer)?;
        }
        Command::Chord { notes, sum, synth } => {
            let composer = synth.composer()?;
            let mode = if sum { MixMode::Sum } else { MixMode::Average };
            let buffer = composer.generate_chord(&notes, synth.wave, synth.duration, synth.volume, mode)?;
            synth.emit(buffer)?;
        }
        Command::Table { tones, reference } => {
            let table = NoteTable::generate(Tuning {
                tones_per_octave: tones,
                reference_frequency: reference,
            })?;
            print!("{}", table);
        }
        Command::Info { file } => {
            let (buffer, descriptor) = file::read_audio_file(&file)?;
            let frames = buffer.len() / descriptor.channels.max(1) as usize;
            println!("{}: {}", file.display(), descriptor);
            println!(
                "{} samples, {:.3} s",
                buffer.len(),
                frames as f64 / descriptor.sample_rate.max(1) as f64
            );
        }
        Command::Convert { source, target, format } => {
            let descriptor = file::convert(&source, &target, format)?;
            info!("converted {} to {} ({})", source.display(), target.display(), descriptor);
        }
        Command::Play { file } => play_file(&file)?,
        Command::Record {
            secs,
            rate,
            format,
            output,
        } => {
            let descriptor = Descriptor::new(rate, format.into(), 1);
            let buffer = Device::default().record(secs, &descriptor)?;
            file::write_audio_file(&output, &buffer, &descriptor)?;
            info!("recorded {} samples to {}", buffer.len(), output.display());
        }
    }
    Ok(())
}
