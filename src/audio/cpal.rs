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
use std::{fmt, sync::Arc, thread};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use tracing::{error, info, span, warn, Level};

use super::callback::DeviceCore;
use super::context::EngineContext;
use super::error::AudioError;
use super::format::{sample_to_s16, SampleFormat};
use super::thread_priority::CallbackPriority;
use super::{PeriodSource, DEFAULT_CHANNELS};
use crate::config;

/// Name that selects the host's default output device.
const DEFAULT_DEVICE_NAME: &str = "default";

/// What `list_devices` reports about an output device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub host: String,
    pub max_channels: u16,
    pub default_sample_rate: Option<u32>,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name, self.max_channels, self.host
        )?;
        if let Some(rate) = self.default_sample_rate {
            write!(f, " [{} Hz]", rate)?;
        }
        Ok(())
    }
}

/// Commands for the thread that owns the cpal stream.
enum StreamCommand {
    Play,
    Pause,
    Shutdown,
}

/// An output device backed by a cpal stream. The stream lives on its own thread
/// (it is not `Send` on every platform) and is driven through a command channel.
pub struct Device {
    name: String,
    host_id: cpal::HostId,
    channels: u16,
    sample_rate: u32,
    core: Arc<DeviceCore>,
    commands: Sender<StreamCommand>,
    acks: Receiver<Result<(), AudioError>>,
    output_thread: Option<thread::JoinHandle<()>>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.channels,
            self.host_id.name()
        )
    }
}

/// Lists cpal output devices across all hosts.
pub fn list_devices() -> Result<Vec<DeviceInfo>, AudioError> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    let mut devices = Vec::new();
    for host_id in cpal::available_hosts() {
        let host_devices = match cpal::host_from_id(host_id)?.devices() {
            Ok(host_devices) => host_devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };

        for device in host_devices {
            let max_channels = max_output_channels(&device);
            if max_channels == 0 {
                continue;
            }
            devices.push(DeviceInfo {
                name: device.name()?,
                host: host_id.name().to_string(),
                max_channels,
                default_sample_rate: device
                    .default_output_config()
                    .ok()
                    .map(|config| config.sample_rate().0),
            });
        }
    }

    devices.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(devices)
}

fn max_output_channels(device: &cpal::Device) -> u16 {
    match device.supported_output_configs() {
        Ok(configs) => configs.map(|config| config.channels()).max().unwrap_or(0),
        Err(_) => 0,
    }
}

/// Finds an output device by name. "default" picks the default host's default device.
fn find_device(name: &str) -> Result<(cpal::Device, cpal::HostId), AudioError> {
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    if name == DEFAULT_DEVICE_NAME {
        let host = cpal::default_host();
        return host
            .default_output_device()
            .map(|device| (device, host.id()))
            .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()));
    }

    for host_id in cpal::available_hosts() {
        let Ok(devices) = cpal::host_from_id(host_id)?.devices() else {
            continue;
        };
        for device in devices {
            if device.name().is_ok_and(|device_name| device_name.trim() == name) {
                return Ok((device, host_id));
            }
        }
    }
    Err(AudioError::DeviceNotFound(name.to_string()))
}

impl Device {
    /// Opens the named device and builds a paused output stream pulling from `source`.
    pub fn get(
        config: &config::Audio,
        context: Arc<EngineContext>,
        source: Box<dyn PeriodSource>,
    ) -> Result<Device, AudioError> {
        let span = span!(Level::INFO, "open device (cpal)");
        let _enter = span.enter();

        let (device, host_id) = find_device(config.device())?;
        let name = device.name()?;
        let max_channels = max_output_channels(&device);
        if max_channels == 0 {
            return Err(AudioError::NoOutputChannels { device: name });
        }
        let channels = max_channels.min(DEFAULT_CHANNELS);
        let target_format = context.target_format().clone();

        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(target_format.sample_rate),
            buffer_size: match config.stream_buffer_frames() {
                Some(frames) => cpal::BufferSize::Fixed(frames),
                None => cpal::BufferSize::Default,
            },
        };

        let core = Arc::new(DeviceCore::new(context, source));
        let priority = CallbackPriority::new(config.thread_priority(), config.realtime());
        let (command_tx, command_rx) = crossbeam_channel::unbounded::<StreamCommand>();
        let (ack_tx, ack_rx) = crossbeam_channel::bounded::<Result<(), AudioError>>(1);

        let sample_rate = stream_config.sample_rate.0;
        let output_thread = {
            let core = core.clone();
            thread::Builder::new()
                .name("audio-output".to_string())
                .spawn(move || {
                    let stream = match build_stream(
                        &device,
                        &stream_config,
                        core,
                        &target_format,
                        priority,
                    ) {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = ack_tx.send(Err(e));
                            return;
                        }
                    };
                    // Streams may start playing as soon as they are built.
                    let paused = stream.pause().map_err(AudioError::from);
                    if ack_tx.send(paused).is_err() {
                        return;
                    }

                    while let Ok(command) = command_rx.recv() {
                        let result = match command {
                            StreamCommand::Play => stream.play().map_err(AudioError::from),
                            StreamCommand::Pause => stream.pause().map_err(AudioError::from),
                            StreamCommand::Shutdown => break,
                        };
                        if ack_tx.send(result).is_err() {
                            break;
                        }
                    }
                    info!("Output stream closed");
                })?
        };

        // Wait for the stream to be built before handing the device out.
        ack_rx.recv().map_err(|_| AudioError::OutputThreadGone)??;

        info!(
            device = name,
            host = host_id.name(),
            channels,
            sample_rate,
            "Opened output device"
        );

        Ok(Device {
            name,
            host_id,
            channels,
            sample_rate,
            core,
            commands: command_tx,
            acks: ack_rx,
            output_thread: Some(output_thread),
        })
    }

    fn send(&self, command: StreamCommand) -> Result<(), AudioError> {
        self.commands
            .send(command)
            .map_err(|_| AudioError::OutputThreadGone)?;
        self.acks.recv().map_err(|_| AudioError::OutputThreadGone)?
    }
}

/// Builds the output stream for the target format. Integer and float buffers share
/// the same callback core and differ only in the per-sample conversion.
fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    core: Arc<DeviceCore>,
    target_format: &super::TargetFormat,
    priority: CallbackPriority,
) -> Result<cpal::Stream, AudioError> {
    let channels = config.channels as usize;
    match (target_format.sample_format, target_format.bits_per_sample) {
        (SampleFormat::Float, _) => {
            build_typed_stream::<f32, _>(device, config, core, channels, priority, |s| s)
        }
        (SampleFormat::Int, 16) => {
            let swap = target_format.swap_endian;
            build_typed_stream::<i16, _>(device, config, core, channels, priority, move |s| {
                sample_to_s16(s, swap)
            })
        }
        (SampleFormat::Int, _) => build_typed_stream::<i32, _>(
            device,
            config,
            core,
            channels,
            priority,
            <i32 as cpal::FromSample<f32>>::from_sample_,
        ),
    }
}

fn build_typed_stream<T, F>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    core: Arc<DeviceCore>,
    channels: usize,
    mut priority: CallbackPriority,
    convert: F,
) -> Result<cpal::Stream, AudioError>
where
    T: cpal::SizedSample,
    F: Fn(f32) -> T + Send + 'static,
{
    Ok(device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            priority.apply_once();
            core.fill(data, channels, &convert);
        },
        |err| error!("CPAL output stream error: {}", err),
        None,
    )?)
}

impl super::Device for Device {
    fn start_processing(&self) -> Result<(), AudioError> {
        let span = span!(Level::INFO, "start processing (cpal)");
        let _enter = span.enter();

        self.core
            .set_running(true, || self.send(StreamCommand::Play))?;
        info!(device = self.name, "Processing started");
        Ok(())
    }

    fn stop_processing(&self) -> Result<(), AudioError> {
        let span = span!(Level::INFO, "stop processing (cpal)");
        let _enter = span.enter();

        if self.core.is_pseudo_stopped() {
            info!(device = self.name, "Engine had already run dry");
        }
        self.core
            .set_running(false, || self.send(StreamCommand::Pause))?;
        info!(
            device = self.name,
            contended = self.core.contended(),
            "Processing stopped"
        );
        Ok(())
    }

    fn apply_quality_settings(&self) -> Result<(), AudioError> {
        // The stream rate is fixed once built. Keep the engine rendering at it.
        let context = self.core.context();
        if context.processing_rate() != self.sample_rate {
            warn!(
                device = self.name,
                requested = context.processing_rate(),
                actual = self.sample_rate,
                "Device cannot change rate while open, keeping the stream rate"
            );
        }
        context.set_processing_rate(self.sample_rate);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.core.is_running()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn contended_callbacks(&self) -> u64 {
        self.core.contended()
    }

    fn is_pseudo_stopped(&self) -> bool {
        self.core.is_pseudo_stopped()
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<super::mock::Device>, Box<dyn std::error::Error>> {
        Err("not a mock".into())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // Stop the callback from touching the engine, then tear the stream down.
        self.core.set_running(false, || ());
        let _ = self.commands.send(StreamCommand::Shutdown);
        if let Some(thread) = self.output_thread.take() {
            let _ = thread.join();
        }
    }
}
