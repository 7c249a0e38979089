use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::{DEFAULT_CHUNK_SIZE, TransferError};

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
pub fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads a local file in fixed-size chunks.
pub struct ChunkReader {
    file: tokio::fs::File,
    buf: Vec<u8>,
    offset: u64,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
    pub async fn open(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file = tokio::fs::File::open(path).await?;
        let file_size = file.metadata().await?.len();
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Ok(Self {
            file,
            buf: vec![0u8; chunk_size],
            offset: 0,
            file_size,
        })
    }

    /// Reads the next chunk. Returns `None` at EOF.
    ///
    /// A chunk may be shorter than the chunk size when the file ends
    /// or the read is interrupted early.
    pub async fn next_chunk(&mut self) -> Result<Option<&[u8]>, TransferError> {
        let n = self.file.read(&mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }
        self.offset += n as u64;
        Ok(Some(&self.buf[..n]))
    }

    /// Bytes read so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// File size in bytes when opened.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn remaining(&self) -> u64 {
        self.file_size.saturating_sub(self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_checksum_is_sha256_hex() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("homebrew.js");
        std::fs::write(&path, b"hello").unwrap();

        assert_eq!(
            calculate_file_checksum(&path).unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn file_checksum_spans_read_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.elf");
        let b = dir.path().join("b.elf");
        let mut data = vec![0xabu8; 20_000];
        std::fs::write(&a, &data).unwrap();
        data[19_999] = 0xac;
        std::fs::write(&b, &data).unwrap();

        assert_ne!(
            calculate_file_checksum(&a).unwrap(),
            calculate_file_checksum(&b).unwrap()
        );
    }

    #[tokio::test]
    async fn reads_file_in_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("homebrew.js");
        let data: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let mut reader = ChunkReader::open(&path, 1024).await.unwrap();
        assert_eq!(reader.file_size(), 2500);

        let mut collected = Vec::new();
        let mut chunks = 0;
        while let Some(chunk) = reader.next_chunk().await.unwrap() {
            assert!(chunk.len() <= 1024);
            collected.extend_from_slice(chunk);
            chunks += 1;
        }
        assert_eq!(collected, data);
        assert!(chunks >= 3);
        assert_eq!(reader.offset(), 2500);
        assert_eq!(reader.remaining(), 0);
    }

    #[tokio::test]
    async fn zero_chunk_size_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, vec![1u8; DEFAULT_CHUNK_SIZE + 10]).unwrap();

        let mut reader = ChunkReader::open(&path, 0).await.unwrap();
        let first = reader.next_chunk().await.unwrap().unwrap().len();
        assert!(first <= DEFAULT_CHUNK_SIZE);
        assert!(first > 0);
    }
}
