// syn.tone -- tone generation and a minimal audio container
// Copyright (C) 2021  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Reading and writing sound files.
//!
//! Two kinds of files are understood, chosen by extension: containers (`.tone`)
//! and uncompressed WAV files (`.wav`).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use hound::{WavReader, WavSpec, WavWriter};
use log::debug;
use snafu::{ResultExt, Snafu};

use crate::container::{self, CodecError, ContainerFormat, Descriptor};
use crate::wave::{SampleFormat, SoundBuffer};

pub const CONTAINER_EXTENSION: &str = "tone";
pub const WAV_EXTENSION: &str = "wav";

#[derive(Debug, Snafu)]
pub enum FileError {
    #[snafu(display("Could not read {}: {}", path.display(), source))]
    ReadFile { path: PathBuf, source: io::Error },
    #[snafu(display("Could not write {}: {}", path.display(), source))]
    WriteFile { path: PathBuf, source: io::Error },
    #[snafu(display("Invalid container {}: {}", path.display(), source))]
    Container { path: PathBuf, source: CodecError },
    #[snafu(display("Invalid WAV file {}: {}", path.display(), source))]
    Wav { path: PathBuf, source: hound::Error },
    #[snafu(display(
        "Cannot handle {}-bit {} samples in {}",
        bits,
        if *float { "float" } else { "integer" },
        path.display()
    ))]
    UnsupportedWav { path: PathBuf, bits: u16, float: bool },
    #[snafu(display(
        "Unsupported file type of {}, expected a .{} or .{} file",
        path.display(),
        CONTAINER_EXTENSION,
        WAV_EXTENSION
    ))]
    UnsupportedFile { path: PathBuf },
}

pub type Result<T, E = FileError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Container,
    Wav,
}

fn file_kind(path: &Path) -> Result<FileKind> {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase());
    match extension.as_deref() {
        Some(CONTAINER_EXTENSION) => Ok(FileKind::Container),
        Some(WAV_EXTENSION) => Ok(FileKind::Wav),
        _ => UnsupportedFile { path }.fail(),
    }
}

pub fn read_container(path: &Path) -> Result<(SoundBuffer, Descriptor)> {
    let bytes = fs::read(path).context(ReadFile { path })?;
    let decoded = container::decode(&bytes).context(Container { path })?;
    debug!("read {} samples from {}", decoded.0.len(), path.display());
    Ok(decoded)
}

pub fn write_container(path: &Path, buffer: &SoundBuffer, descriptor: &Descriptor) -> Result<()> {
    let bytes = container::encode(buffer, descriptor.sample_rate, descriptor.format, descriptor.channels)
        .context(Container { path })?;
    fs::write(path, bytes).context(WriteFile { path })?;
    debug!("wrote {} samples to {}", buffer.len(), path.display());
    Ok(())
}

/// Read a WAV file.
///
/// 8-bit and 16-bit integer files are read as they are, 24-bit and 32-bit integer files
/// are converted to float samples. The descriptor names the encoding of the file.
pub fn read_wav(path: &Path) -> Result<(SoundBuffer, Descriptor)> {
    let mut reader = WavReader::open(path).context(Wav { path })?;
    let spec = reader.spec();
    let float = spec.sample_format == hound::SampleFormat::Float;

    let (buffer, format) = match (float, spec.bits_per_sample) {
        (false, 8) => {
            let samples = reader
                .samples::<i8>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .context(Wav { path })?;
            let samples = samples.into_iter().map(|s| (s as i16 + 128) as u8).collect();
            (SoundBuffer::U8(samples), ContainerFormat::U8)
        }
        (false, 16) => {
            let samples = reader
                .samples::<i16>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .context(Wav { path })?;
            (SoundBuffer::I16(samples), ContainerFormat::I16)
        }
        (false, bits @ 24) | (false, bits @ 32) => {
            let half = 2.0f64.powi(bits as i32 - 1);
            let samples = reader
                .samples::<i32>()
                .map(|s| s.map(|s| (s as f64 / half) as f32))
                .collect::<std::result::Result<Vec<_>, _>>()
                .context(Wav { path })?;
            let format = if bits == 24 {
                ContainerFormat::I24
            } else {
                ContainerFormat::F32
            };
            (SoundBuffer::F32(samples), format)
        }
        (true, 32) => {
            let samples = reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .context(Wav { path })?;
            (SoundBuffer::F32(samples), ContainerFormat::F32)
        }
        (float, bits) => return UnsupportedWav { path, bits, float }.fail(),
    };

    debug!("read {} samples from {}", buffer.len(), path.display());
    Ok((buffer, Descriptor::new(spec.sample_rate, format, spec.channels)))
}

/// Write a WAV file with the encoding named by `descriptor`.
///
/// The same rules as for containers apply: the buffer must already be in the
/// descriptor's format, except for 24-bit files.
pub fn write_wav(path: &Path, buffer: &SoundBuffer, descriptor: &Descriptor) -> Result<()> {
    container::check_frames(buffer.len(), descriptor.channels).context(Container { path })?;
    container::check_format(buffer, descriptor.format).context(Container { path })?;
    let (bits, sample_format) = match descriptor.format {
        ContainerFormat::U8 => (8, hound::SampleFormat::Int),
        ContainerFormat::I16 => (16, hound::SampleFormat::Int),
        ContainerFormat::I24 => (24, hound::SampleFormat::Int),
        ContainerFormat::F32 => (32, hound::SampleFormat::Float),
    };
    let spec = WavSpec {
        channels: descriptor.channels,
        sample_rate: descriptor.sample_rate,
        bits_per_sample: bits,
        sample_format,
    };
    let mut writer = WavWriter::create(path, spec).context(Wav { path })?;

    match (descriptor.format, buffer) {
        (ContainerFormat::I24, _) => {
            for x in container::float_signal(buffer) {
                writer.write_sample(container::quantize_i24(x)).context(Wav { path })?;
            }
        }
        (_, SoundBuffer::U8(samples)) => {
            for &s in samples {
                writer.write_sample((s as i16 - 128) as i8).context(Wav { path })?;
            }
        }
        (_, SoundBuffer::I16(samples)) => {
            for &s in samples {
                writer.write_sample(s).context(Wav { path })?;
            }
        }
        (_, SoundBuffer::F32(samples)) => {
            for &s in samples {
                writer.write_sample(s).context(Wav { path })?;
            }
        }
    }
    writer.finalize().context(Wav { path })?;
    debug!("wrote {} samples to {}", buffer.len(), path.display());
    Ok(())
}

/// Read a container or WAV file, depending on its extension.
pub fn read_audio_file(path: &Path) -> Result<(SoundBuffer, Descriptor)> {
    match file_kind(path)? {
        FileKind::Container => read_container(path),
        FileKind::Wav => read_wav(path),
    }
}

/// Write a container or WAV file, depending on its extension.
pub fn write_audio_file(path: &Path, buffer: &SoundBuffer, descriptor: &Descriptor) -> Result<()> {
    match file_kind(path)? {
        FileKind::Container => write_container(path, buffer, descriptor),
        FileKind::Wav => write_wav(path, buffer, descriptor),
    }
}

/// Copy the samples of `source` into `target`, converting between containers and WAV files
/// as their extensions demand.
///
/// Without a `format` the encoding of the source is kept. Otherwise the samples are
/// quantized to or restored from the integer format. Returns the descriptor of the target.
pub fn convert(source: &Path, target: &Path, format: Option<SampleFormat>) -> Result<Descriptor> {
    file_kind(target)?;
    let (buffer, descriptor) = read_audio_file(source)?;
    let (buffer, descriptor) = match format {
        Some(format) => {
            let buffer = container::recode(&buffer, format).context(Container { path: source })?;
            let descriptor = Descriptor::new(descriptor.sample_rate, format.into(), descriptor.channels);
            (buffer, descriptor)
        }
        None => (buffer, descriptor),
    };
    write_audio_file(target, &buffer, &descriptor)?;
    Ok(descriptor)
}

/// The descriptor for storing a mono buffer in its own format.
pub fn mono_descriptor(buffer: &SoundBuffer, sample_rate: u32) -> Descriptor {
    Descriptor::new(sample_rate, buffer.format().into(), 1)
}
