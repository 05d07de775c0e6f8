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
use std::{any::Any, fmt, sync::Arc};

use crate::config;

pub mod callback;
pub mod context;
pub mod cpal;
pub mod error;
pub mod format;
pub mod mixer;
pub mod mock;
pub mod thread_priority;

pub use context::EngineContext;
pub use error::AudioError;
pub use format::{SampleFormat, TargetFormat};

/// One stereo frame: left, right.
pub type Frame = [f32; 2];

/// The engine always renders stereo.
pub const DEFAULT_CHANNELS: u16 = 2;

/// Something that produces the engine's output one period at a time.
pub trait PeriodSource: Send {
    /// Fills `dst` with the next period and returns the number of frames produced.
    /// Zero means the engine has nothing to give.
    fn next_buffer(&mut self, dst: &mut [Frame]) -> usize;
}

/// An output device pulling periods from the engine.
pub trait Device: Any + fmt::Display + std::marker::Send + std::marker::Sync {
    /// Starts (or resumes) pulling audio. Calling it while running is a no-op.
    fn start_processing(&self) -> Result<(), AudioError>;

    /// Stops pulling audio. Once this returns, no callback touches the engine until
    /// processing is started again. Calling it while stopped is a no-op.
    fn stop_processing(&self) -> Result<(), AudioError>;

    /// Re-applies the engine's quality settings (processing rate) to the device.
    fn apply_quality_settings(&self) -> Result<(), AudioError>;

    /// Whether the callback is currently pulling from the engine.
    fn is_running(&self) -> bool;

    /// The device's output sample rate.
    fn sample_rate(&self) -> u32;

    /// The number of output channels.
    fn channels(&self) -> u16;

    /// Callbacks that emitted silence because a control thread held the device lock.
    fn contended_callbacks(&self) -> u64;

    /// True once the engine returned nothing and the callback stopped pulling. Cleared
    /// by the next start.
    fn is_pseudo_stopped(&self) -> bool;

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Device>, Box<dyn std::error::Error>>;
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<cpal::DeviceInfo>, AudioError> {
    cpal::list_devices()
}

/// Opens the configured device, pulling from `source`.
pub fn get_device(
    config: &config::Audio,
    context: Arc<EngineContext>,
    source: Box<dyn PeriodSource>,
) -> Result<Arc<dyn Device>, AudioError> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(device, context, source)));
    };

    Ok(Arc::new(cpal::Device::get(config, context, source)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silence;

    impl PeriodSource for Silence {
        fn next_buffer(&mut self, dst: &mut [Frame]) -> usize {
            dst.fill([0.0; 2]);
            dst.len()
        }
    }

    #[test]
    fn test_get_mock_device() {
        let config = config::Audio::new("mock-device");
        let device = get_device(
            &config,
            Arc::new(EngineContext::default()),
            Box::new(Silence),
        )
        .unwrap();
        assert!(device.to_mock().is_ok());
        assert_eq!(device.to_string(), "mock-device (Mock)");
    }
}
