// syn.tone -- tone generation and a minimal audio container
// Copyright (C) 2021  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Easy interface for playing and recording raw samples using sox subprocesses.
//!
//! A stream owns its subprocess. Dropping the stream closes the pipe and waits
//! for the subprocess, so a device is released on every exit path.

use std::io::{self, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use log::{debug, warn};

use crate::container::{self, ContainerFormat, Descriptor};
use crate::envelope::seconds_to_samples;
use crate::wave::SoundBuffer;

/// The sox file type describing raw samples in `format`.
pub fn sox_type(format: ContainerFormat) -> &'static str {
    match format {
        ContainerFormat::U8 => "u8",
        ContainerFormat::I16 => "s16",
        ContainerFormat::I24 => "s24",
        ContainerFormat::F32 => "f32",
    }
}

/// Arguments telling sox that the standard stream carries samples as described.
///
/// ```
/// use syn_tone::container::{ContainerFormat, Descriptor};
/// use syn_tone::output::sox::sox_args;
///
/// let args = sox_args(&Descriptor::new(48000, ContainerFormat::I16, 1));
/// assert_eq!(args.join(" "), "-q --channels 1 --rate 48000 --type s16 --endian little -");
/// ```
pub fn sox_args(descriptor: &Descriptor) -> Vec<String> {
    vec![
        "-q".to_string(),
        "--channels".to_string(),
        descriptor.channels.to_string(),
        "--rate".to_string(),
        descriptor.sample_rate.to_string(),
        "--type".to_string(),
        sox_type(descriptor.format).to_string(),
        "--endian".to_string(),
        "little".to_string(),
        "-".to_string(),
    ]
}

fn broken_pipe(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, format!("{} is already closed", what))
}

/// The programs used for playback and recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    play_program: String,
    record_program: String,
}

impl Default for Device {
    fn default() -> Self {
        Self::new("play", "rec")
    }
}

impl Device {
    pub fn new(play_program: &str, record_program: &str) -> Self {
        Self {
            play_program: play_program.to_string(),
            record_program: record_program.to_string(),
        }
    }

    pub fn open_output(&self, descriptor: &Descriptor) -> io::Result<OutputStream> {
        debug!("starting {} for {}", self.play_program, descriptor);
        let mut child = Command::new(&self.play_program)
            .args(sox_args(descriptor))
            .stdin(Stdio::piped())
            .spawn()?;
        let stdin = child.stdin.take();
        Ok(OutputStream {
            descriptor: *descriptor,
            child: Some(child),
            stdin,
        })
    }

    pub fn open_input(&self, descriptor: &Descriptor) -> io::Result<InputStream> {
        debug!("starting {} for {}", self.record_program, descriptor);
        let mut child = Command::new(&self.record_program)
            .args(sox_args(descriptor))
            .stdout(Stdio::piped())
            .spawn()?;
        let stdout = child.stdout.take();
        Ok(InputStream {
            descriptor: *descriptor,
            child: Some(child),
            stdout,
        })
    }

    /// Run `callback` with an open output stream, closing it afterwards.
    ///
    /// The stream is closed even if the callback fails. The callback's error takes precedence.
    pub fn with_output<R, F: FnOnce(&mut OutputStream) -> io::Result<R>>(
        &self,
        descriptor: &Descriptor,
        callback: F,
    ) -> io::Result<R> {
        let mut stream = self.open_output(descriptor)?;
        let result = callback(&mut stream);
        let closed = stream.close();
        let value = result?;
        closed?;
        Ok(value)
    }

    /// Play a mono buffer at `sample_rate`, in chunks of [`super::CHUNK_BYTES`].
    pub fn play_buffer(&self, buffer: &SoundBuffer, sample_rate: u32) -> io::Result<()> {
        let descriptor = Descriptor::new(sample_rate, buffer.format().into(), 1);
        let bytes = buffer.to_le_bytes();
        self.with_output(&descriptor, |stream| {
            let chunks = super::write_chunked(stream, &bytes)?;
            debug!("played {} samples in {} chunks", buffer.len(), chunks);
            Ok(())
        })
    }

    /// Record `secs` seconds of audio.
    pub fn record(&self, secs: f64, descriptor: &Descriptor) -> io::Result<SoundBuffer> {
        let format = descriptor.format.sample_format().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot record {} samples", descriptor.format),
            )
        })?;
        let samples = seconds_to_samples(secs, descriptor.sample_rate) * descriptor.channels as usize;
        let mut stream = self.open_input(descriptor)?;
        let bytes = stream.read(samples);
        stream.close()?;
        let bytes = bytes?;
        container::decode_payload(&bytes, format)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
    }
}

/// Samples written here are played by the subprocess.
#[derive(Debug)]
pub struct OutputStream {
    descriptor: Descriptor,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
}

impl OutputStream {
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Close the pipe and wait until everything written has been played.
    pub fn close(mut self) -> io::Result<()> {
        self.release()
    }

    fn release(&mut self) -> io::Result<()> {
        drop(self.stdin.take());
        match self.child.take() {
            Some(mut child) => {
                let status = child.wait()?;
                debug!("player exited with {}", status);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.stdin.as_mut() {
            Some(stdin) => stdin.write(buf),
            None => Err(broken_pipe("output stream")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.stdin.as_mut() {
            Some(stdin) => stdin.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!("failed to release output stream: {}", err);
        }
    }
}

/// Samples recorded by the subprocess.
#[derive(Debug)]
pub struct InputStream {
    descriptor: Descriptor,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
}

impl InputStream {
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Read the raw bytes of up to `samples` samples.
    /// Returns fewer if the recording ends early.
    pub fn read(&mut self, samples: usize) -> io::Result<Vec<u8>> {
        let stdout = self.stdout.as_mut().ok_or_else(|| broken_pipe("input stream"))?;
        let len = samples * self.descriptor.format.bytes_per_sample();
        let mut bytes = Vec::with_capacity(len);
        stdout.take(len as u64).read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Stop recording.
    pub fn close(mut self) -> io::Result<()> {
        self.release()
    }

    fn release(&mut self) -> io::Result<()> {
        drop(self.stdout.take());
        match self.child.take() {
            Some(mut child) => {
                // the recorder runs until stopped
                if let Err(err) = child.kill() {
                    debug!("recorder already stopped: {}", err);
                }
                child.wait()?;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for InputStream {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!("failed to release input stream: {}", err);
        }
    }
}
