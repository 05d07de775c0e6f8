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
use super::format::SampleFormat;

/// Errors raised while opening or driving an output device. None of these are
/// produced on the audio thread itself.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported bit depth {bits} for {format} samples")]
    UnsupportedBitDepth { format: SampleFormat, bits: u16 },

    #[error("Sample rate must be greater than 0")]
    InvalidSampleRate,

    #[error("No output device found with name {0}")]
    DeviceNotFound(String),

    #[error("Device {device} has no output channels")]
    NoOutputChannels { device: String },

    #[error("Output thread exited unexpectedly")]
    OutputThreadGone,

    #[error("The mixer is no longer accepting commands")]
    MixerGone,

    #[error("Host unavailable: {0}")]
    HostUnavailable(#[from] cpal::HostUnavailable),

    #[error("Unable to list devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("Unable to read device name: {0}")]
    DeviceName(#[from] cpal::DeviceNameError),

    #[error("Unable to query output configurations: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("Unable to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Unable to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("Unable to pause output stream: {0}")]
    PauseStream(#[from] cpal::PauseStreamError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
