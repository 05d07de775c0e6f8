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
use std::path::Path;

use config::{Config, File};
use serde::Deserialize;

use super::audio::Audio;
use super::effect::GainEffect;
use super::error::ConfigError;
use super::sampler::SamplerSettings;

/// The configuration for the sample player.
#[derive(Deserialize, Clone, Debug)]
pub struct Player {
    /// The audio output configuration.
    audio: Audio,
    /// The sampler instrument.
    #[serde(default)]
    sampler: SamplerSettings,
    /// Inserts on the master output, in processing order.
    #[serde(default)]
    master_effects: Vec<GainEffect>,
    /// Maximum simultaneous notes.
    max_notes: Option<usize>,
}

/// Default polyphony.
pub const DEFAULT_MAX_NOTES: usize = 32;

impl Player {
    /// Parse the player configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Player, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Player>()?)
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn sampler(&self) -> &SamplerSettings {
        &self.sampler
    }

    pub fn master_effects(&self) -> &[GainEffect] {
        &self.master_effects
    }

    pub fn max_notes(&self) -> usize {
        self.max_notes.unwrap_or(DEFAULT_MAX_NOTES).max(1)
    }
}
