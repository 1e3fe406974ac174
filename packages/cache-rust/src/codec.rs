//! Transparent serialize-and-compress codec for stored values.
//!
//! On store, values are serialized to `MsgPack` and, when they clear the
//! configured size threshold, compressed with gzip or deflate. Compression
//! is only kept when it actually wins: a result that is not strictly
//! smaller than the raw encoding is discarded and the value is stored
//! plain. On read, the transformation is reversed. Callers and hooks only
//! ever see the logical value.

use std::io::{Read, Write};
use std::str::FromStr;

use bytes::Bytes;
use flate2::read::{DeflateDecoder, GzDecoder};
use flate2::write::{DeflateEncoder, GzEncoder};
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::CompressionConfig;
use crate::entry::CompressionInfo;
use crate::error::{CacheError, CacheResult};

/// Supported compression algorithms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompressionAlgorithm {
    /// No compression; values are always stored plain.
    #[default]
    None,
    /// Gzip (RFC 1952).
    Gzip,
    /// Raw deflate (RFC 1951).
    Deflate,
}

impl CompressionAlgorithm {
    /// Stable lowercase name, also accepted by [`FromStr`].
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
        }
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "gzip" => Ok(Self::Gzip),
            "deflate" => Ok(Self::Deflate),
            other => Err(CacheError::Config(format!(
                "unknown compression algorithm: {other}"
            ))),
        }
    }
}

/// Serialize-and-compress codec configured by [`CompressionConfig`].
#[derive(Debug, Clone)]
pub struct Codec {
    config: CompressionConfig,
}

impl Codec {
    /// Creates a codec from the given configuration.
    #[must_use]
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    /// Whether this codec can ever produce a compressed payload.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.config.enabled && self.config.algorithm != CompressionAlgorithm::None
    }

    /// Serializes and compresses `value` if it is worth it.
    ///
    /// Returns `None` when the value should be stored plain: compression is
    /// disabled, the serialized form is below the threshold, or compression
    /// failed to make it strictly smaller.
    pub fn encode<V: Serialize>(&self, value: &V) -> CacheResult<Option<(Bytes, CompressionInfo)>> {
        if !self.is_active() {
            return Ok(None);
        }

        let raw = rmp_serde::to_vec(value).map_err(CacheError::codec)?;
        if raw.len() < self.config.min_size {
            return Ok(None);
        }

        let compressed = compress(&raw, self.config.algorithm, self.config.level)?;
        if compressed.len() >= raw.len() {
            return Ok(None);
        }

        let info = CompressionInfo {
            algorithm: self.config.algorithm,
            original_size: raw.len() as u64,
            compressed_size: compressed.len() as u64,
        };
        Ok(Some((Bytes::from(compressed), info)))
    }

    /// Decompresses and deserializes a payload produced by [`encode`](Self::encode).
    pub fn decode<V: DeserializeOwned>(
        &self,
        bytes: &[u8],
        info: &CompressionInfo,
    ) -> CacheResult<V> {
        let raw = decompress(bytes, info.algorithm)?;
        rmp_serde::from_slice(&raw).map_err(CacheError::codec)
    }
}

fn compress(raw: &[u8], algorithm: CompressionAlgorithm, level: u32) -> CacheResult<Vec<u8>> {
    let level = Compression::new(level.min(9));
    match algorithm {
        CompressionAlgorithm::None => Ok(raw.to_vec()),
        CompressionAlgorithm::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), level);
            encoder.write_all(raw).map_err(CacheError::codec)?;
            encoder.finish().map_err(CacheError::codec)
        }
        CompressionAlgorithm::Deflate => {
            let mut encoder = DeflateEncoder::new(Vec::new(), level);
            encoder.write_all(raw).map_err(CacheError::codec)?;
            encoder.finish().map_err(CacheError::codec)
        }
    }
}

fn decompress(bytes: &[u8], algorithm: CompressionAlgorithm) -> CacheResult<Vec<u8>> {
    let mut raw = Vec::new();
    match algorithm {
        CompressionAlgorithm::None => raw.extend_from_slice(bytes),
        CompressionAlgorithm::Gzip => {
            GzDecoder::new(bytes)
                .read_to_end(&mut raw)
                .map_err(CacheError::codec)?;
        }
        CompressionAlgorithm::Deflate => {
            DeflateDecoder::new(bytes)
                .read_to_end(&mut raw)
                .map_err(CacheError::codec)?;
        }
    }
    Ok(raw)
}
