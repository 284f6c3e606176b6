//! Byte-level codecs for persisted chunks.
//!
//! Every [`CompressionMethod`] maps to a stateless [`Compressor`]. The method
//! tag is stored in artifacts, so the discriminants are stable.

mod flate;
mod huffman;

#[cfg(test)]
mod compression_test;

use thiserror::Error;

use crate::types::encoding::DecodeError;

pub use flate::{DeflateCompressor, GzipCompressor};
pub use huffman::{BUFFER_SIZE, HuffmanCode, HuffmanCompressor};

#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("deflate stream error")]
    Io(#[from] std::io::Error),
    #[error("huffman header is unreadable")]
    Header(#[from] DecodeError),
    #[error("huffman header is malformed: {0}")]
    BadHeader(&'static str),
    #[error("huffman stream ended before the end marker")]
    Truncated,
    #[error("unknown compression method {0}")]
    UnknownMethod(u8),
}

pub trait Compressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError>;
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    /// Raw deflate; usually the smallest output.
    Deflate = 0,
    /// Deflate inside a gzip container.
    Gzip = 1,
    Huffman = 2,
    /// Huffman coding followed by deflate.
    #[default]
    HuffmanDeflate = 3,
}

impl CompressionMethod {
    pub const ALL: [CompressionMethod; 4] = [
        CompressionMethod::Deflate,
        CompressionMethod::Gzip,
        CompressionMethod::Huffman,
        CompressionMethod::HuffmanDeflate,
    ];

    pub fn from_u8(byte: u8) -> Result<Self, CompressionError> {
        Self::ALL
            .get(byte as usize)
            .copied()
            .ok_or(CompressionError::UnknownMethod(byte))
    }

    pub fn name(self) -> &'static str {
        match self {
            CompressionMethod::Deflate => "deflate",
            CompressionMethod::Gzip => "gzip",
            CompressionMethod::Huffman => "huffman",
            CompressionMethod::HuffmanDeflate => "huffman-deflate",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    pub fn compressor(self) -> Box<dyn Compressor> {
        match self {
            CompressionMethod::Deflate => Box::new(DeflateCompressor),
            CompressionMethod::Gzip => Box::new(GzipCompressor),
            CompressionMethod::Huffman => Box::new(HuffmanCompressor),
            CompressionMethod::HuffmanDeflate => {
                Box::new(Chained(HuffmanCompressor, DeflateCompressor))
            }
        }
    }
}

impl core::fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Applies `A` then `B` when compressing, and the reverse when decompressing.
struct Chained<A, B>(A, B);

impl<A: Compressor, B: Compressor> Compressor for Chained<A, B> {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        self.1.compress(&self.0.compress(data)?)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        self.0.decompress(&self.1.decompress(data)?)
    }
}
