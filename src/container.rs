// syn.tone -- tone generation and a minimal audio container
// Copyright (C) 2021  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! A minimal container for raw sample data.
//!
//! A container is an 8-byte header followed by the samples, all little-endian:
//!
//! | bytes    | content                |
//! |----------|------------------------|
//! | `[0, 4)` | sample rate, `u32`     |
//! | `[4, 6)` | format code, `u16`     |
//! | `[6, 8)` | channel count, `u16`   |
//! | `[8, ..)`| interleaved samples    |
//!
//! There is no checksum and no version field.

use std::fmt;

use log::trace;
use snafu::{ensure, Snafu};

use crate::wave::{SampleFormat, SoundBuffer};

pub const HEADER_LEN: usize = 8;

/// Sample encodings a container can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    U8 = 1,
    I16 = 2,
    /// Packed 3-byte signed samples. Containers can be written in this format, but not read.
    I24 = 3,
    F32 = 4,
}

impl ContainerFormat {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(ContainerFormat::U8),
            2 => Some(ContainerFormat::I16),
            3 => Some(ContainerFormat::I24),
            4 => Some(ContainerFormat::F32),
            _ => None,
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            ContainerFormat::U8 => 1,
            ContainerFormat::I16 => 2,
            ContainerFormat::I24 => 3,
            ContainerFormat::F32 => 4,
        }
    }

    /// The in-memory format holding samples of this encoding, if there is one.
    pub fn sample_format(self) -> Option<SampleFormat> {
        match self {
            ContainerFormat::U8 => Some(SampleFormat::U8),
            ContainerFormat::I16 => Some(SampleFormat::I16),
            ContainerFormat::I24 => None,
            ContainerFormat::F32 => Some(SampleFormat::F32),
        }
    }
}

impl From<SampleFormat> for ContainerFormat {
    fn from(format: SampleFormat) -> Self {
        match format {
            SampleFormat::U8 => ContainerFormat::U8,
            SampleFormat::I16 => ContainerFormat::I16,
            SampleFormat::F32 => ContainerFormat::F32,
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sample_format() {
            Some(format) => fmt::Display::fmt(&format, f),
            None => f.write_str("int24"),
        }
    }
}

#[derive(Debug, PartialEq, Snafu)]
pub enum CodecError {
    #[snafu(display("Container is {} bytes long, but the header alone needs {}", len, HEADER_LEN))]
    TruncatedHeader { len: usize },
    #[snafu(display("Unknown container format code {}", code))]
    UnknownFormat { code: u16 },
    #[snafu(display("Containers in {} format can be written, but not read", format))]
    WriteOnlyFormat { format: ContainerFormat },
    #[snafu(display("Payload of {} bytes is not a multiple of the sample width {}", len, width))]
    MisalignedPayload { len: usize, width: usize },
    #[snafu(display("Cannot store a {} buffer in a {} container", buffer, format))]
    FormatMismatch { buffer: SampleFormat, format: ContainerFormat },
    #[snafu(display("A container needs at least one channel"))]
    NoChannels,
    #[snafu(display("{} samples do not split into frames of {} channels", samples, channels))]
    PartialFrame { samples: usize, channels: u16 },
    #[snafu(display("Expected an integer sample format, given format: {}", format))]
    NotIntegerFormat { format: SampleFormat },
    #[snafu(display("Expected a signal in an integer sample format, given format: {}", format))]
    NotIntegerSignal { format: SampleFormat },
}

/// What the header of a container says about its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub sample_rate: u32,
    pub format: ContainerFormat,
    pub channels: u16,
}

impl Descriptor {
    pub fn new(sample_rate: u32, format: ContainerFormat, channels: u16) -> Self {
        Self {
            sample_rate,
            format,
            channels,
        }
    }

    pub fn header(&self) -> [u8; HEADER_LEN] {
        let mut header = [0; HEADER_LEN];
        header[0..4].copy_from_slice(&self.sample_rate.to_le_bytes());
        header[4..6].copy_from_slice(&self.format.code().to_le_bytes());
        header[6..8].copy_from_slice(&self.channels.to_le_bytes());
        header
    }

    /// Parse the header at the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        ensure!(bytes.len() >= HEADER_LEN, TruncatedHeader { len: bytes.len() });
        let sample_rate = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let code = u16::from_le_bytes([bytes[4], bytes[5]]);
        let channels = u16::from_le_bytes([bytes[6], bytes[7]]);
        let format = ContainerFormat::from_code(code).ok_or(CodecError::UnknownFormat { code })?;
        Ok(Self::new(sample_rate, format, channels))
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {}, {} channel(s)",
            self.sample_rate, self.format, self.channels
        )
    }
}

/// Build a complete container holding `buffer`.
///
/// The buffer must already be in `format`, except for 24-bit containers,
/// which accept buffers of every format.
///
/// ```
/// use syn_tone::container::*;
/// use syn_tone::wave::SoundBuffer;
///
/// let bytes = encode(&SoundBuffer::U8(vec![128, 255]), 8000, ContainerFormat::U8, 1).unwrap();
/// assert_eq!(bytes, vec![0x40, 0x1F, 0, 0, 1, 0, 1, 0, 128, 255]);
/// ```
pub fn encode(
    buffer: &SoundBuffer,
    sample_rate: u32,
    format: ContainerFormat,
    channels: u16,
) -> Result<Vec<u8>, CodecError> {
    check_frames(buffer.len(), channels)?;
    check_format(buffer, format)?;
    let payload = match format {
        ContainerFormat::I24 => pack_i24(&float_signal(buffer)),
        _ => buffer.to_le_bytes(),
    };
    let descriptor = Descriptor::new(sample_rate, format, channels);
    trace!("encoding {} samples as {}", buffer.len(), descriptor);

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&descriptor.header());
    bytes.extend(payload);
    Ok(bytes)
}

/// Interleaved samples must fill whole frames, so every channel has the same length.
pub fn check_frames(samples: usize, channels: u16) -> Result<(), CodecError> {
    ensure!(channels > 0, NoChannels);
    ensure!(
        samples % channels as usize == 0,
        PartialFrame { samples, channels }
    );
    Ok(())
}

/// Check that `buffer` can be stored as `format` without converting it first.
pub fn check_format(buffer: &SoundBuffer, format: ContainerFormat) -> Result<(), CodecError> {
    if let Some(sample_format) = format.sample_format() {
        ensure!(
            sample_format == buffer.format(),
            FormatMismatch {
                buffer: buffer.format(),
                format
            }
        );
    }
    Ok(())
}

/// Split a container into its samples and its header.
pub fn decode(bytes: &[u8]) -> Result<(SoundBuffer, Descriptor), CodecError> {
    let descriptor = Descriptor::parse(bytes)?;
    let format = descriptor
        .format
        .sample_format()
        .ok_or(CodecError::WriteOnlyFormat {
            format: descriptor.format,
        })?;
    let buffer = decode_payload(&bytes[HEADER_LEN..], format)?;
    check_frames(buffer.len(), descriptor.channels)?;
    trace!("decoded {} samples as {}", buffer.len(), descriptor);
    Ok((buffer, descriptor))
}

/// Interpret raw little-endian bytes as samples of `format`.
pub fn decode_payload(bytes: &[u8], format: SampleFormat) -> Result<SoundBuffer, CodecError> {
    let width = format.bytes_per_sample();
    ensure!(
        bytes.len() % width == 0,
        MisalignedPayload {
            len: bytes.len(),
            width
        }
    );
    Ok(match format {
        SampleFormat::U8 => SoundBuffer::U8(bytes.to_vec()),
        SampleFormat::I16 => SoundBuffer::I16(
            bytes
                .chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]]))
                .collect(),
        ),
        SampleFormat::F32 => SoundBuffer::F32(
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
    })
}

/// Smallest value, zero level and half range of an integer format.
fn pcm_range(format: SampleFormat) -> Result<(f64, f64, f64), CodecError> {
    let (min, bits) = match format {
        SampleFormat::U8 => (0.0, 8),
        SampleFormat::I16 => (i16::MIN as f64, 16),
        SampleFormat::F32 => return Err(CodecError::NotIntegerFormat { format }),
    };
    let half = 2.0f64.powi(bits - 1);
    Ok((min, min + half, half))
}

/// Quantize a float signal in `[-1, 1]` to an integer format.
///
/// Uses the full integer range: `-1` maps to the smallest value, and values above
/// the largest representable level are clamped.
///
/// ```
/// use syn_tone::container::float_to_pcm;
/// use syn_tone::wave::{SampleFormat, SoundBuffer};
///
/// let pcm = float_to_pcm(&[-1.0, 0.0, 0.5, 1.0], SampleFormat::I16).unwrap();
/// assert_eq!(pcm, SoundBuffer::I16(vec![-32768, 0, 16384, 32767]));
/// let pcm = float_to_pcm(&[-1.0, 0.0, 1.0], SampleFormat::U8).unwrap();
/// assert_eq!(pcm, SoundBuffer::U8(vec![0, 128, 255]));
/// ```
pub fn float_to_pcm(signal: &[f32], format: SampleFormat) -> Result<SoundBuffer, CodecError> {
    let (min, offset, half) = pcm_range(format)?;
    let max = min + 2.0 * half - 1.0;
    let quantized = signal
        .iter()
        .map(move |&x| (x as f64 * half + offset).round().max(min).min(max));
    Ok(match format {
        SampleFormat::U8 => SoundBuffer::U8(quantized.map(|x| x as u8).collect()),
        SampleFormat::I16 => SoundBuffer::I16(quantized.map(|x| x as i16).collect()),
        SampleFormat::F32 => unreachable!("rejected by pcm_range"),
    })
}

/// The inverse of [`float_to_pcm`], up to quantization.
pub fn pcm_to_float(signal: &SoundBuffer) -> Result<Vec<f32>, CodecError> {
    let format = signal.format();
    ensure!(format.is_integer(), NotIntegerSignal { format });
    let (_, offset, half) = pcm_range(format)?;
    let raw: Vec<f64> = match signal {
        SoundBuffer::U8(s) => s.iter().map(|&x| x as f64).collect(),
        SoundBuffer::I16(s) => s.iter().map(|&x| x as f64).collect(),
        SoundBuffer::F32(_) => Vec::new(),
    };
    Ok(raw.into_iter().map(|x| ((x - offset) / half) as f32).collect())
}

/// Re-encode `buffer` in `format`, going through the float signal between formats.
///
/// ```
/// use syn_tone::container::recode;
/// use syn_tone::wave::{SampleFormat, SoundBuffer};
///
/// let pcm = recode(&SoundBuffer::F32(vec![0.5, -1.0]), SampleFormat::I16).unwrap();
/// assert_eq!(pcm, SoundBuffer::I16(vec![16384, -32768]));
/// let bytes = recode(&pcm, SampleFormat::U8).unwrap();
/// assert_eq!(bytes, SoundBuffer::U8(vec![192, 0]));
/// ```
pub fn recode(buffer: &SoundBuffer, format: SampleFormat) -> Result<SoundBuffer, CodecError> {
    if buffer.format() == format {
        return Ok(buffer.clone());
    }
    let signal = float_signal(buffer);
    match format {
        SampleFormat::F32 => Ok(SoundBuffer::F32(signal)),
        _ => float_to_pcm(&signal, format),
    }
}

/// Any buffer as a float signal, without quantizing float buffers again.
pub(crate) fn float_signal(buffer: &SoundBuffer) -> Vec<f32> {
    match buffer {
        SoundBuffer::F32(s) => s.clone(),
        other => pcm_to_float(other).unwrap_or_default(),
    }
}

/// Quantize a float sample to a signed 24-bit integer.
pub(crate) fn quantize_i24(x: f32) -> i32 {
    const HALF: f64 = 8_388_608.0;
    (x as f64 * HALF).round().max(-HALF).min(HALF - 1.0) as i32
}

fn pack_i24(signal: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(signal.len() * 3);
    for &x in signal {
        bytes.extend_from_slice(&quantize_i24(x).to_le_bytes()[..3]);
    }
    bytes
}

#[cfg(test)]
mod test {
    use super::*;
    use expect_test::expect;

    #[test]
    fn known_bytes() {
        let buffer = SoundBuffer::I16(vec![0, 16384, -16384, 32767]);
        let bytes = encode(&buffer, 48_000, ContainerFormat::I16, 1).unwrap();
        assert_eq!(
            bytes,
            vec![
                0x80, 0xBB, 0x00, 0x00, 0x02, 0x00, 0x01, 0x00, // header
                0x00, 0x00, 0x00, 0x40, 0x00, 0xC0, 0xFF, 0x7F,
            ]
        );
        let (decoded, descriptor) = decode(&bytes).unwrap();
        assert_eq!(decoded, buffer);
        assert_eq!(descriptor, Descriptor::new(48_000, ContainerFormat::I16, 1));
    }

    #[test]
    fn exact_round_trips() {
        let buffers = vec![
            SoundBuffer::U8(vec![0, 17, 128, 255]),
            SoundBuffer::I16(vec![i16::MIN, -1, 0, 1, 2, i16::MAX]),
            SoundBuffer::F32(vec![-1.0, 0.25, 1.0e-7, 1.0]),
        ];
        for buffer in buffers {
            let format = ContainerFormat::from(buffer.format());
            let bytes = encode(&buffer, 22_050, format, 2).unwrap();
            assert_eq!(bytes.len(), HEADER_LEN + buffer.byte_len());
            let (decoded, descriptor) = decode(&bytes).unwrap();
            assert_eq!(decoded, buffer);
            assert_eq!(descriptor.channels, 2);
            assert_eq!(descriptor.sample_rate, 22_050);
        }
    }

    #[test]
    fn empty_payload() {
        let bytes = encode(&SoundBuffer::F32(vec![]), 44_100, ContainerFormat::F32, 1).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(decode(&bytes).unwrap().0, SoundBuffer::F32(vec![]));
    }

    #[test]
    fn header_errors() {
        assert_eq!(decode(&[0x80, 0xBB]), Err(CodecError::TruncatedHeader { len: 2 }));
        assert_eq!(
            decode(&[0x80, 0xBB, 0, 0, 9, 0, 1, 0]),
            Err(CodecError::UnknownFormat { code: 9 })
        );
        assert_eq!(
            decode(&[0x80, 0xBB, 0, 0, 3, 0, 1, 0, 0, 0, 0]),
            Err(CodecError::WriteOnlyFormat {
                format: ContainerFormat::I24
            })
        );
        assert_eq!(
            decode(&[0x80, 0xBB, 0, 0, 2, 0, 1, 0, 0, 0, 0]),
            Err(CodecError::MisalignedPayload { len: 3, width: 2 })
        );
    }

    #[test]
    fn encode_errors() {
        let buffer = SoundBuffer::I16(vec![1]);
        assert_eq!(
            encode(&buffer, 8000, ContainerFormat::F32, 1),
            Err(CodecError::FormatMismatch {
                buffer: SampleFormat::I16,
                format: ContainerFormat::F32
            })
        );
        assert_eq!(encode(&buffer, 8000, ContainerFormat::I16, 0), Err(CodecError::NoChannels));
    }

    #[test]
    fn frames_must_be_complete() {
        let stereo = SoundBuffer::I16(vec![1, 2, 3]);
        assert_eq!(
            encode(&stereo, 8000, ContainerFormat::I16, 2),
            Err(CodecError::PartialFrame { samples: 3, channels: 2 })
        );
        // three int16 samples declared as stereo
        let bytes = [0x40, 0x1F, 0, 0, 2, 0, 2, 0, 1, 0, 2, 0, 3, 0];
        assert_eq!(decode(&bytes), Err(CodecError::PartialFrame { samples: 3, channels: 2 }));
        assert_eq!(decode(&[0x40, 0x1F, 0, 0, 2, 0, 0, 0, 1, 0]), Err(CodecError::NoChannels));
        assert!(decode(&[0x40, 0x1F, 0, 0, 2, 0, 3, 0, 1, 0, 2, 0, 3, 0]).is_ok());
    }

    #[test]
    fn packed_24_bit() {
        let float = SoundBuffer::F32(vec![0.0, 0.5, -1.0, 1.0]);
        let bytes = encode(&float, 8000, ContainerFormat::I24, 1).unwrap();
        assert_eq!(
            &bytes[HEADER_LEN..],
            &[0, 0, 0, 0x00, 0x00, 0x40, 0x00, 0x00, 0x80, 0xFF, 0xFF, 0x7F]
        );
        let int = SoundBuffer::I16(vec![16384]);
        let bytes = encode(&int, 8000, ContainerFormat::I24, 1).unwrap();
        assert_eq!(&bytes[HEADER_LEN..], &[0x00, 0x00, 0x40]);
    }

    #[test]
    fn pcm_round_trip_within_one_step() {
        let signal: Vec<f32> = (0..=200).map(|i| i as f32 / 100.0 - 1.0).collect();
        for &(format, step) in &[(SampleFormat::U8, 1.0 / 128.0), (SampleFormat::I16, 1.0 / 32768.0)] {
            let restored = pcm_to_float(&float_to_pcm(&signal, format).unwrap()).unwrap();
            assert_eq!(restored.len(), signal.len());
            for (x, y) in signal.iter().zip(&restored) {
                assert!((x - y).abs() <= step, "{}: {} became {}", format, x, y);
            }
        }
    }

    #[test]
    fn pcm_clamps_out_of_range() {
        let pcm = float_to_pcm(&[-3.0, 3.0], SampleFormat::U8).unwrap();
        assert_eq!(pcm, SoundBuffer::U8(vec![0, 255]));
        assert_eq!(
            float_to_pcm(&[0.0], SampleFormat::F32),
            Err(CodecError::NotIntegerFormat {
                format: SampleFormat::F32
            })
        );
        assert_eq!(
            pcm_to_float(&SoundBuffer::F32(vec![0.0])),
            Err(CodecError::NotIntegerSignal {
                format: SampleFormat::F32
            })
        );
    }

    #[test]
    fn descriptor_dump() {
        let descriptor = Descriptor::parse(&[0x44, 0xAC, 0, 0, 4, 0, 2, 0]).unwrap();
        expect![[r#"
            Descriptor {
                sample_rate: 44100,
                format: F32,
                channels: 2,
            }
        "#]]
        .assert_eq(&format!("{:#?}\n", descriptor));
        assert_eq!(descriptor.to_string(), "44100 Hz, float32, 2 channel(s)");
    }
}
