//! A torrent's `InfoHash`: the SHA-1 digest of the shared file's content.
//!
//! Together with a human-readable name it uniquely identifies a torrent
//! across the cluster. Infohashes are displayed as 40-char hex strings but
//! internally they are a 20-byte array.
use std::fmt;
use std::io::Read;
use std::panic::Location;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use thiserror::Error;

const INFO_HASH_BYTES_LEN: usize = 20;

/// SHA-1 content hash identifying a torrent's file.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
pub struct InfoHash(pub [u8; INFO_HASH_BYTES_LEN]);

impl InfoHash {
    /// Hashes a complete in-memory buffer.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha1::digest(bytes).into())
    }

    /// Hashes everything a reader yields, without buffering the whole file.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the reader fails.
    pub fn of_reader<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let mut hasher = Sha1::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hasher.finalize().into()))
    }

    #[must_use]
    pub fn bytes(&self) -> [u8; INFO_HASH_BYTES_LEN] {
        self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Errors returned when parsing an [`InfoHash`] from its hex representation.
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("not a 40-char hex string, {location}")]
    InvalidLength { location: &'static Location<'static> },
    #[error("invalid hex digit `{digit}`, {location}")]
    InvalidHexDigit {
        digit: char,
        location: &'static Location<'static>,
    },
}

impl FromStr for InfoHash {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != INFO_HASH_BYTES_LEN * 2 {
            return Err(ConversionError::InvalidLength {
                location: Location::caller(),
            });
        }
        let mut out = [0u8; INFO_HASH_BYTES_LEN];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex = std::str::from_utf8(chunk).map_err(|_| ConversionError::InvalidHexDigit {
                digit: '?',
                location: Location::caller(),
            })?;
            out[i] = u8::from_str_radix(hex, 16).map_err(|_| ConversionError::InvalidHexDigit {
                digit: hex.chars().next().unwrap_or('?'),
                location: Location::caller(),
            })?;
        }
        Ok(Self(out))
    }
}
