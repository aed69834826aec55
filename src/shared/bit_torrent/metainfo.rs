//! Torrent descriptors ("metainfo") and chunk arithmetic.
//!
//! A [`Metainfo`] is everything a peer needs to download and verify one
//! file: the torrent identity, the tracker cluster members it was
//! registered with, the chunk size, the file size, and one SHA-1 digest per
//! chunk. The on-disk representation is `bincode`; any reversible encoding
//! would do, but the chunk hashes must survive byte-identical because the
//! download engine compares them against the tracker's copy.
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{Read, SeekFrom};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use super::info_hash::InfoHash;

/// Errors building, loading or storing a descriptor.
#[derive(Error, Debug)]
pub enum Error {
    #[error("descriptor I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("descriptor encoding failed: {0}")]
    Codec(#[from] bincode::Error),
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,
}

/// A torrent identity: human-readable name plus whole-file SHA-1.
///
/// Equality is structural; the pair is the key of the cluster's torrent
/// registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TorrentId {
    pub name: String,
    pub info_hash: InfoHash,
}

impl fmt::Display for TorrentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.info_hash)
    }
}

/// One chunk of one torrent.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkId {
    pub torrent: TorrentId,
    pub index: u32,
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.torrent, self.index)
    }
}

/// Raw 20-byte SHA-1 digest of one chunk's content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkHash(pub [u8; 20]);

impl ChunkHash {
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha1::digest(bytes).into())
    }
}

impl fmt::Display for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A deserialized torrent descriptor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metainfo {
    pub id: TorrentId,
    /// The tracker cluster this torrent is registered with. The set (order
    /// does not matter) must equal the cluster membership for a create to
    /// be admitted.
    pub tracker_nodes: Vec<String>,
    /// SHA-1 digest per chunk index, defined on exactly `[0, chunk_count)`.
    pub chunk_hashes: BTreeMap<u32, ChunkHash>,
    pub chunk_size: u64,
    pub file_size: u64,
}

impl Metainfo {
    /// Number of chunks the file splits into: `ceil(file_size / chunk_size)`.
    #[must_use]
    pub fn chunk_count(&self) -> u32 {
        u32::try_from(self.file_size.div_ceil(self.chunk_size)).unwrap_or(u32::MAX)
    }

    /// Whether `index` names a chunk of this file.
    #[must_use]
    pub fn in_range(&self, index: u32) -> bool {
        index < self.chunk_count()
    }

    #[must_use]
    pub fn chunk_hash(&self, index: u32) -> Option<ChunkHash> {
        self.chunk_hashes.get(&index).copied()
    }

    /// Byte offset and length of a chunk. The final chunk may be short.
    #[must_use]
    pub fn chunk_range(&self, index: u32) -> (u64, usize) {
        let offset = u64::from(index) * self.chunk_size;
        let len = self.chunk_size.min(self.file_size - offset);
        (offset, usize::try_from(len).expect("chunk size fits in memory"))
    }

    /// Builds a descriptor for a local file: hashes the whole file for the
    /// torrent identity and every chunk for the per-chunk digests.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the chunk size is zero or the file cannot be
    /// read.
    pub fn generate(
        name: &str,
        path: &Path,
        chunk_size: u64,
        tracker_nodes: Vec<String>,
    ) -> Result<Self, Error> {
        if chunk_size == 0 {
            return Err(Error::ZeroChunkSize);
        }

        let mut file = fs::File::open(path)?;
        let file_size = file.metadata()?.len();

        let mut whole = Sha1::new();
        let mut chunk_hashes = BTreeMap::new();
        let mut buf = vec![0u8; usize::try_from(chunk_size).expect("chunk size fits in memory")];
        let mut index: u32 = 0;
        loop {
            let n = read_up_to(&mut file, &mut buf)?;
            if n == 0 {
                break;
            }
            whole.update(&buf[..n]);
            chunk_hashes.insert(index, ChunkHash::of(&buf[..n]));
            index += 1;
        }

        Ok(Self {
            id: TorrentId {
                name: name.to_owned(),
                info_hash: InfoHash(whole.finalize().into()),
            },
            tracker_nodes,
            chunk_hashes,
            chunk_size,
            file_size,
        })
    }

    /// Loads a descriptor from its on-disk `bincode` form.
    ///
    /// # Errors
    ///
    /// Will return `Err` on I/O or decoding failure.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let bytes = fs::read(path)?;
        Ok(bincode::deserialize(&bytes)?)
    }

    /// Stores the descriptor in its on-disk `bincode` form.
    ///
    /// # Errors
    ///
    /// Will return `Err` on I/O or encoding failure.
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let bytes = bincode::serialize(self)?;
        fs::write(path, bytes)?;
        Ok(())
    }
}

/// Reads one chunk of the backing file.
///
/// # Errors
///
/// Will return `Err` if the file is shorter than the descriptor claims or
/// the read fails.
pub async fn read_chunk(
    file: &mut tokio::fs::File,
    metainfo: &Metainfo,
    index: u32,
) -> std::io::Result<Vec<u8>> {
    let (offset, len) = metainfo.chunk_range(index);
    file.seek(SeekFrom::Start(offset)).await?;
    let mut chunk = vec![0u8; len];
    file.read_exact(&mut chunk).await?;
    Ok(chunk)
}

/// Writes one downloaded chunk at its offset in the backing file.
///
/// # Errors
///
/// Will return `Err` if the seek or the write fails.
pub async fn write_chunk(
    file: &mut tokio::fs::File,
    metainfo: &Metainfo,
    index: u32,
    chunk: &[u8],
) -> std::io::Result<()> {
    let (offset, _) = metainfo.chunk_range(index);
    file.seek(SeekFrom::Start(offset)).await?;
    file.write_all(chunk).await?;
    Ok(())
}

// `Read::read` may return short counts; chunk hashing needs full buffers
// except at end of file.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
