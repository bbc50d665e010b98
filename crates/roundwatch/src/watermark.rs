// Copyright 2025 RISC Zero, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Watermark persistence: the single non-negative integer that makes
//! delivery exactly-once across restarts. Read once at the start of a poll,
//! written once after its transactions have been processed.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

pub type WatermarkError = Box<dyn std::error::Error + Send + Sync>;

pub trait WatermarkStore: Send + Sync {
    fn get(&self) -> Result<u64, WatermarkError>;
    fn set(&self, watermark: u64) -> Result<(), WatermarkError>;
}

/// Keeps the watermark in memory. Suitable for tests and for processes that
/// deliberately restart from the tip.
#[derive(Debug, Default)]
pub struct InMemoryWatermark(AtomicU64);

impl InMemoryWatermark {
    pub fn new(initial: u64) -> Self {
        InMemoryWatermark(AtomicU64::new(initial))
    }
}

impl WatermarkStore for InMemoryWatermark {
    fn get(&self) -> Result<u64, WatermarkError> {
        Ok(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, watermark: u64) -> Result<(), WatermarkError> {
        self.0.store(watermark, Ordering::SeqCst);
        Ok(())
    }
}

/// Persists the watermark as a decimal integer in a file. A missing file
/// reads as zero.
#[derive(Clone, Debug)]
pub struct FileWatermark {
    path: PathBuf,
}

impl FileWatermark {
    pub fn new(path: PathBuf) -> Self {
        FileWatermark { path }
    }
}

impl WatermarkStore for FileWatermark {
    fn get(&self) -> Result<u64, WatermarkError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents.trim().parse()?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, watermark: u64) -> Result<(), WatermarkError> {
        // Replace atomically via rename.
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, watermark.to_string())?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_round_trips() {
        let store = InMemoryWatermark::new(7);
        assert_eq!(store.get().unwrap(), 7);
        store.set(42).unwrap();
        assert_eq!(store.get().unwrap(), 42);
    }

    #[test]
    fn file_watermark_reads_missing_as_zero_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileWatermark::new(dir.path().join("watermark"));
        assert_eq!(store.get().unwrap(), 0);
        store.set(1234).unwrap();
        assert_eq!(store.get().unwrap(), 1234);

        let reopened = FileWatermark::new(dir.path().join("watermark"));
        assert_eq!(reopened.get().unwrap(), 1234);
    }

    #[test]
    fn file_watermark_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watermark");
        fs::write(&path, "not-a-number").unwrap();
        assert!(FileWatermark::new(path).get().is_err());
    }
}
