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
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use duration_string::DurationString;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sampleplay::audio::mixer::NoteMixer;
use sampleplay::audio::{self, EngineContext};
use sampleplay::config;
use sampleplay::effect::EffectChain;
use sampleplay::sample::SampleBuffer;
use sampleplay::sampler::Sampler;

/// Key used for the note the play command triggers.
const PLAY_KEY: u8 = 69;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A real-time sample player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Decodes a sample and prints its properties.
    Info {
        /// The path to the sample file.
        path: String,
    },
    /// Plays one note of the configured sample through the audio interface.
    Play {
        /// The path to the player config.
        player_path: String,
        /// The note frequency in Hz.
        #[arg(short, long, default_value_t = 440.0)]
        frequency: f32,
        /// How long to hold the note, e.g. 2s or 500ms.
        #[arg(short, long, default_value = "2s")]
        duration: String,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Info { path } => {
            let buffer = SampleBuffer::from_file(Path::new(&path))?;
            println!("{}:", path);
            println!("- frames: {}", buffer.len());
            println!("- sample rate: {} Hz", buffer.sample_rate());
            println!("- duration: {:.3}s", buffer.duration().as_secs_f64());
        }
        Commands::Play {
            player_path,
            frequency,
            duration,
        } => {
            let duration: Duration = DurationString::from_string(duration)?.into();
            play(Path::new(&player_path), frequency, duration)?;
        }
    }

    Ok(())
}

/// Opens the configured device and holds one note for `duration`.
fn play(player_path: &Path, frequency: f32, duration: Duration) -> Result<(), Box<dyn Error>> {
    let player = config::Player::deserialize(player_path)?;
    let context = Arc::new(EngineContext::from_config(player.audio())?);

    let (sampler, errors) = Sampler::from_settings(context.clone(), player.sampler());
    for e in errors {
        warn!(err = %e, "Sampler setting not applied");
    }
    let sampler = Arc::new(sampler);

    let effects = EffectChain::from_config(player.master_effects());
    let (mixer, handle) = NoteMixer::new(
        context.clone(),
        sampler.clone(),
        effects,
        player.max_notes(),
    );
    let device = audio::get_device(player.audio(), context.clone(), Box::new(mixer))?;
    device.apply_quality_settings()?;

    info!(
        device = %device,
        frequency,
        beat_len = sampler.beat_len(frequency),
        "Playing note"
    );
    handle.note_on(PLAY_KEY, frequency)?;
    device.start_processing()?;
    thread::sleep(duration);
    handle.note_off(PLAY_KEY)?;
    device.stop_processing()?;

    if sampler.resample_failures() > 0 {
        warn!(
            failures = sampler.resample_failures(),
            "Some periods were silenced by resampler failures"
        );
    }
    info!(
        periods = context.periods(),
        contended = device.contended_callbacks(),
        pseudo_stopped = device.is_pseudo_stopped(),
        retired_resamplers = handle.collect_retired(),
        "Done"
    );
    Ok(())
}
