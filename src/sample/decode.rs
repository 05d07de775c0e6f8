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

//! Whole-file decoding of audio files into stereo frames.
//!
//! Decoding always happens on a control thread. The audio thread only ever sees the
//! finished frame vector.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer as DecodedSamples;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

use super::error::SampleError;
use crate::audio::Frame;

/// Decoded audio: stereo frames plus the rate they were recorded at.
pub struct Decoded {
    pub frames: Vec<Frame>,
    pub sample_rate: u32,
}

/// Decodes an entire file (WAV, FLAC, MP3, OGG and anything else symphonia knows).
/// Mono sources are duplicated to both channels, extra channels beyond two are dropped.
pub fn decode_file(path: &Path) -> Result<Decoded, SampleError> {
    let file = File::open(path).map_err(|e| {
        SampleError::IoError(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let file_path = path.to_string_lossy().to_string();
    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| SampleError::DecodeFailed(format!("'{}': {}", file_path, e)))?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SampleError::DecodeFailed(format!("'{}': no audio track", file_path)))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let sample_rate = params.sample_rate.ok_or_else(|| {
        SampleError::DecodeFailed(format!("'{}': sample rate not specified", file_path))
    })?;

    let mut decoder = get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| SampleError::DecodeFailed(format!("'{}': {}", file_path, e)))?;

    let mut frames: Vec<Frame> = match params.n_frames {
        Some(n) => Vec::with_capacity(n as usize),
        None => Vec::new(),
    };
    let mut scratch: Option<DecodedSamples<f32>> = None;

    while let Some(packet) = read_next_packet(format_reader.as_mut(), decoder.as_mut())? {
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                // A single corrupt packet is skipped rather than failing the load.
                debug!(path = file_path, err = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(SampleError::AudioError(e)),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        if channels == 0 {
            continue;
        }

        let needed = decoded.capacity() as u64;
        if scratch
            .as_ref()
            .is_none_or(|samples| (samples.capacity() as u64) < needed * channels as u64)
        {
            scratch = Some(DecodedSamples::<f32>::new(needed, spec));
        }
        let Some(samples) = scratch.as_mut() else {
            continue;
        };
        samples.copy_interleaved_ref(decoded);

        for chunk in samples.samples().chunks_exact(channels) {
            let left = chunk[0];
            let right = if channels > 1 { chunk[1] } else { chunk[0] };
            frames.push([left, right]);
        }
    }

    Ok(Decoded {
        frames,
        sample_rate,
    })
}

/// Reads the next packet. Returns `Ok(None)` at end of stream. Decoders that need
/// a reset get one and reading continues.
fn read_next_packet(
    format_reader: &mut dyn FormatReader,
    decoder: &mut dyn Decoder,
) -> Result<Option<Packet>, SampleError> {
    loop {
        match format_reader.next_packet() {
            Ok(packet) => return Ok(Some(packet)),
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None)
            }
            // Some formats report a decode error at the end of the stream.
            Err(SymphoniaError::DecodeError(_)) => return Ok(None),
            Err(e) => return Err(SampleError::AudioError(e)),
        }
    }
}
