// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::info;

use super::decode::decode_file;
use super::error::SampleError;
use crate::audio::Frame;

/// Size of one encoded frame in an embedded data blob: two little-endian f32s.
const BYTES_PER_FRAME: usize = 2 * std::mem::size_of::<f32>();

/// Immutable decoded audio. Shared between every snapshot of a sample and never
/// mutated once published to the audio thread.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    frames: Vec<Frame>,
    sample_rate: u32,
    /// The file this buffer was decoded from. None for embedded or generated data.
    source: Option<PathBuf>,
}

impl SampleBuffer {
    /// Creates a buffer from already decoded frames.
    pub fn new(frames: Vec<Frame>, sample_rate: u32) -> Self {
        Self {
            frames,
            sample_rate,
            source: None,
        }
    }

    /// An empty buffer. Everything rendered from it is silence.
    pub fn empty(sample_rate: u32) -> Self {
        Self::new(Vec::new(), sample_rate)
    }

    /// Decodes the given file into memory.
    pub fn from_file(path: &Path) -> Result<Self, SampleError> {
        let decoded = decode_file(path)?;
        let buffer = Self {
            frames: decoded.frames,
            sample_rate: decoded.sample_rate,
            source: Some(path.to_path_buf()),
        };

        info!(
            path = ?path,
            frames = buffer.len(),
            sample_rate = buffer.sample_rate,
            duration_ms = buffer.duration().as_millis(),
            "Sample decoded"
        );
        Ok(buffer)
    }

    /// Decodes an embedded blob: base64 of interleaved little-endian f32 stereo frames.
    pub fn from_base64(data: &str, sample_rate: u32) -> Result<Self, SampleError> {
        let bytes = STANDARD.decode(data.trim())?;
        if bytes.len() % BYTES_PER_FRAME != 0 {
            return Err(SampleError::MalformedData(format!(
                "{} bytes is not a whole number of frames",
                bytes.len()
            )));
        }

        let frames = bytes
            .chunks_exact(BYTES_PER_FRAME)
            .map(|chunk| {
                let left = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                let right = f32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
                [left, right]
            })
            .collect();
        Ok(Self::new(frames, sample_rate))
    }

    /// Encodes the frames in the embedded blob format.
    pub fn to_base64(&self) -> String {
        let mut bytes = Vec::with_capacity(self.frames.len() * BYTES_PER_FRAME);
        for frame in &self.frames {
            bytes.extend_from_slice(&frame[0].to_le_bytes());
            bytes.extend_from_slice(&frame[1].to_le_bytes());
        }
        STANDARD.encode(bytes)
    }

    /// The decoded frames.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Total number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The rate the frames were recorded at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The file this buffer was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Length of the buffer at its own sample rate.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames.len() as f64 / self.sample_rate as f64)
    }
}
