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
use std::path::PathBuf;

use crate::config::ConfigError;
use crate::sample::SampleError;

/// Problems found while applying sampler settings. Loading carries on past each one.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Sample not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to load sample: {0}")]
    Sample(#[from] SampleError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
