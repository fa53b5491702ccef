//! (De)compression support for tree files.

use crate::error::TransformerError;

use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use std::io::{Read, Write};
use std::path::Path;

/// Compression algorithm
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Compression {
    /// Gzip
    Gzip,
    /// Zlib
    Zlib,
}

impl Compression {
    /// Returns the compression implied by a file extension, if any.
    ///
    /// `.gz` selects gzip and `.zlib` selects zlib.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|extension| extension.to_str()) {
            Some("gz") => Some(Compression::Gzip),
            Some("zlib") => Some(Compression::Zlib),
            _ => None,
        }
    }
}

/// Decompresses some data and returns the uncompressed data.
///
/// # Arguments
///
/// * `compression`: Compression algorithm
/// * `data`: Compressed data
pub fn decompress(compression: Compression, data: &[u8]) -> Result<Vec<u8>, TransformerError> {
    // The uncompressed data is at least as large as the compressed data.
    let mut buf = Vec::with_capacity(data.len());
    match compression {
        Compression::Gzip => GzDecoder::new(data).read_to_end(&mut buf)?,
        Compression::Zlib => ZlibDecoder::new(data).read_to_end(&mut buf)?,
    };
    Ok(buf)
}

/// Compresses some data and returns the compressed data.
///
/// # Arguments
///
/// * `compression`: Compression algorithm
/// * `data`: Uncompressed data
pub fn compress(compression: Compression, data: &[u8]) -> Result<Vec<u8>, TransformerError> {
    let level = flate2::Compression::default();
    let compressed = match compression {
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), level);
            encoder.write_all(data)?;
            encoder.finish()?
        }
        Compression::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), level);
            encoder.write_all(data)?;
            encoder.finish()?
        }
    };
    Ok(compressed)
}
