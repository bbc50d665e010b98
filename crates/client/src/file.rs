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

//! File-backed block providers: a directory of gzip-compressed raw blocks
//! that can stand in for a node (replay, tests) or act as a cache in front
//! of one.

use crate::error::ClientError;
use crate::{Algod, NodeStatus};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

fn block_path(dir: &Path, round: u64) -> PathBuf {
    dir.join(format!("{round}.msgpack.gz"))
}

fn read_block_file(path: &Path) -> Result<Option<Vec<u8>>, ClientError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let mut bytes = Vec::new();
    GzDecoder::new(file).read_to_end(&mut bytes)?;
    Ok(Some(bytes))
}

fn write_block_file(path: &Path, bytes: &[u8]) -> Result<(), ClientError> {
    let mut encoder = GzEncoder::new(File::create(path)?, Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()?;
    Ok(())
}

fn highest_stored_round(dir: &Path) -> Result<Option<u64>, ClientError> {
    let mut highest = None;
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(round_str) = name.strip_suffix(".msgpack.gz") else {
            continue;
        };
        if let Ok(round) = round_str.parse::<u64>() {
            highest = Some(highest.map_or(round, |h: u64| h.max(round)));
        }
    }
    Ok(highest)
}

/// Serves previously stored blocks from a directory. The reported tip is
/// the highest stored round.
#[derive(Clone, Debug)]
pub struct FileAlgod {
    dir: PathBuf,
}

impl FileAlgod {
    pub fn new(dir: PathBuf) -> Result<Self, ClientError> {
        fs::create_dir_all(&dir)?;
        Ok(FileAlgod { dir })
    }
}

#[async_trait]
impl Algod for FileAlgod {
    async fn status(&self) -> Result<NodeStatus, ClientError> {
        let last_round = highest_stored_round(&self.dir)?.unwrap_or(0);
        Ok(NodeStatus { last_round })
    }

    async fn block_raw(&self, round: u64) -> Result<Vec<u8>, ClientError> {
        read_block_file(&block_path(&self.dir, round))?
            .ok_or(ClientError::BlockNotAvailable(round))
    }

    async fn status_after_block(&self, _round: u64) -> Result<NodeStatus, ClientError> {
        // Nothing ever arrives in a static directory; report the tip.
        self.status().await
    }
}

/// Fills a block directory through an inner client, serving repeat requests
/// from disk.
pub struct CachingAlgod<A> {
    dir: PathBuf,
    inner: A,
}

impl<A: Algod> CachingAlgod<A> {
    pub fn new(dir: PathBuf, inner: A) -> Result<Self, ClientError> {
        fs::create_dir_all(&dir)?;
        Ok(CachingAlgod { dir, inner })
    }
}

#[async_trait]
impl<A: Algod> Algod for CachingAlgod<A> {
    async fn status(&self) -> Result<NodeStatus, ClientError> {
        self.inner.status().await
    }

    async fn block_raw(&self, round: u64) -> Result<Vec<u8>, ClientError> {
        let path = block_path(&self.dir, round);
        if let Some(bytes) = read_block_file(&path)? {
            debug!("serving block {round} from cache");
            return Ok(bytes);
        }
        let bytes = self.inner.block_raw(round).await?;
        write_block_file(&path, &bytes)?;
        Ok(bytes)
    }

    async fn status_after_block(&self, round: u64) -> Result<NodeStatus, ClientError> {
        self.inner.status_after_block(round).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roundwatch_core::block::{encode_block, Block, BlockData};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn block_bytes(round: u64) -> Vec<u8> {
        let data = BlockData {
            block: Block {
                rnd: round,
                gen: "testnet-v1.0".to_string(),
                ..Default::default()
            },
            cert: None,
        };
        encode_block(&data).unwrap()
    }

    #[tokio::test]
    async fn file_algod_serves_stored_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let algod = FileAlgod::new(dir.path().to_path_buf()).unwrap();

        write_block_file(&block_path(dir.path(), 5), &block_bytes(5)).unwrap();
        write_block_file(&block_path(dir.path(), 7), &block_bytes(7)).unwrap();

        assert_eq!(algod.status().await.unwrap().last_round, 7);
        let bytes = algod.block_raw(5).await.unwrap();
        assert_eq!(bytes, block_bytes(5));
        assert!(matches!(
            algod.block_raw(6).await,
            Err(ClientError::BlockNotAvailable(6))
        ));
    }

    struct CountingAlgod {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Algod for CountingAlgod {
        async fn status(&self) -> Result<NodeStatus, ClientError> {
            Ok(NodeStatus { last_round: 9 })
        }

        async fn block_raw(&self, round: u64) -> Result<Vec<u8>, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(block_bytes(round))
        }

        async fn status_after_block(&self, _round: u64) -> Result<NodeStatus, ClientError> {
            self.status().await
        }
    }

    #[tokio::test]
    async fn caching_algod_hits_the_network_once_per_round() {
        let dir = tempfile::tempdir().unwrap();
        let algod = CachingAlgod::new(
            dir.path().to_path_buf(),
            CountingAlgod {
                calls: AtomicUsize::new(0),
            },
        )
        .unwrap();

        let first = algod.block_raw(3).await.unwrap();
        let second = algod.block_raw(3).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(algod.inner.calls.load(Ordering::SeqCst), 1);

        // The stored block is readable by a plain file provider.
        let file_algod = FileAlgod::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(file_algod.block_raw(3).await.unwrap(), first);
    }
}
