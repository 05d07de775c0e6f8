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

//! Sample loading.
//!
//! Files are decoded entirely into memory on the control thread. The audio thread only
//! ever sees the finished, shared buffer. Nothing is cached: every load reads the file
//! as it is on disk now, and a replaced buffer is freed once the last note holding its
//! snapshot lets go.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::sample::{SampleBuffer, SampleError};

/// Decodes sample files and embedded sample data into shared buffers.
#[derive(Debug, Default)]
pub struct SampleLoader {
    /// Buffers decoded so far, for logging.
    loads: u64,
}

impl SampleLoader {
    /// Creates a new sample loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a file.
    pub fn load(&mut self, path: &Path) -> Result<Arc<SampleBuffer>, SampleError> {
        let buffer = SampleBuffer::from_file(path)?;
        self.loads += 1;
        info!(
            path = ?path,
            frames = buffer.len(),
            memory_kb = std::mem::size_of_val(buffer.frames()) / 1024,
            loads = self.loads,
            "Loaded sample into memory"
        );
        Ok(Arc::new(buffer))
    }

    /// Decodes embedded sample data.
    pub fn load_embedded(
        &mut self,
        data: &str,
        sample_rate: u32,
    ) -> Result<Arc<SampleBuffer>, SampleError> {
        let buffer = SampleBuffer::from_base64(data, sample_rate)?;
        self.loads += 1;
        info!(
            frames = buffer.len(),
            sample_rate, "Loaded embedded sample data"
        );
        Ok(Arc::new(buffer))
    }

    /// Buffers decoded by this loader.
    pub fn loads(&self) -> u64 {
        self.loads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_wav;

    #[test]
    fn test_every_load_reads_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, &[vec![0.5; 100], vec![-0.5; 100]], 44100).unwrap();

        let mut loader = SampleLoader::new();
        let first = loader.load(&path).unwrap();
        assert_eq!(first.len(), 100);

        write_wav(&path, &[vec![0.25; 300], vec![-0.25; 300]], 44100).unwrap();
        let second = loader.load(&path).unwrap();
        assert_eq!(second.len(), 300);
        assert_eq!(second.frames()[0], [0.25, -0.25]);
        assert_eq!(first.len(), 100);
        assert_eq!(loader.loads(), 2);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let mut loader = SampleLoader::new();
        assert!(loader.load(Path::new("/nonexistent/sample.wav")).is_err());
        assert_eq!(loader.loads(), 0);
    }

    #[test]
    fn test_load_embedded() {
        let mut loader = SampleLoader::new();
        let encoded = SampleBuffer::new(vec![[0.25, -0.25]; 4], 22050).to_base64();
        let buffer = loader.load_embedded(&encoded, 22050).unwrap();
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.sample_rate(), 22050);
        assert!(loader.load_embedded("not base64!", 22050).is_err());
    }
}
