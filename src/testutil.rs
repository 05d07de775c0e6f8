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

use std::{
    error::Error,
    path::Path,
    thread,
    time::{Duration, Instant},
};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::sample::SampleBuffer;

/// Writes a 32-bit float WAV file. `channels` holds one vector per channel, all of
/// the same length.
pub fn write_wav(
    path: &Path,
    channels: &[Vec<f32>],
    sample_rate: u32,
) -> Result<(), Box<dyn Error>> {
    let num_channels = channels.len();
    assert!(num_channels <= u16::MAX.into(), "Too many channels!");
    let frames = channels.first().map(|c| c.len()).unwrap_or(0);
    assert!(
        channels.iter().all(|c| c.len() == frames),
        "Channels must have the same length"
    );

    let mut writer = WavWriter::create(
        path,
        WavSpec {
            channels: num_channels as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    )?;

    for frame in 0..frames {
        for channel in channels {
            writer.write_sample(channel[frame])?;
        }
    }
    writer.finalize()?;

    Ok(())
}

/// A buffer whose frame `i` is `[i, -i]`, so rendered output maps straight back to
/// source indices.
pub fn ramp_buffer(frames: usize, sample_rate: u32) -> SampleBuffer {
    SampleBuffer::new(
        (0..frames).map(|i| [i as f32, -(i as f32)]).collect(),
        sample_rate,
    )
}

/// A buffer holding a constant value on both channels.
pub fn constant_buffer(frames: usize, value: f32, sample_rate: u32) -> SampleBuffer {
    SampleBuffer::new(vec![[value, value]; frames], sample_rate)
}

/// Root mean square of the left channel.
pub fn rms_left(frames: &[[f32; 2]]) -> f32 {
    if frames.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = frames.iter().map(|f| f[0] * f[0]).sum();
    (sum_squares / frames.len() as f32).sqrt()
}

/// Wait for the given predicate to return true or fail.
#[inline]
pub fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let start = Instant::now();
    let tick = Duration::from_millis(5);
    let timeout = Duration::from_secs(3);

    loop {
        if start.elapsed() > timeout {
            panic!("{}", error_msg);
        }
        if predicate() {
            return;
        }
        thread::sleep(tick);
    }
}
