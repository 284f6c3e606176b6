//! Static Huffman coder over bytes.
//!
//! Stream layout:
//!
//! ```text
//! [varint: n] ([u8: symbol][varint: frequency])*n  [bitstream]
//! ```
//!
//! The bitstream holds the code of every input byte followed by the code of
//! an end marker, most significant bit first, zero-padded to a whole byte.
//! The decoder rebuilds the tree from the frequency table, so both sides
//! must break weight ties the same way: by node creation order.

use core::cmp::Reverse;
use std::collections::BinaryHeap;

use tracing::debug;

use super::{CompressionError, Compressor};
use crate::types::encoding::{Reader, write_varint};

/// Bytes buffered by the bit writer before they are flushed to the output.
pub const BUFFER_SIZE: usize = 4096;

/// End-of-stream marker, one past the last byte value.
const END_MARKER: u16 = 256;

#[derive(Debug, Clone, Copy)]
enum Node {
    Leaf(u16),
    Internal { left: usize, right: usize },
}

/// A Huffman tree together with the code table derived from it.
#[derive(Debug, Clone)]
pub struct HuffmanCode {
    nodes: Vec<Node>,
    root: usize,
    /// Indexed by symbol; empty for symbols absent from the input.
    codes: Vec<Vec<bool>>,
}

impl HuffmanCode {
    /// Builds the code for the given byte frequencies. The end marker is
    /// always added with weight 1.
    pub fn build(frequencies: &[u64; 256]) -> Self {
        let mut nodes = Vec::new();
        let mut heap = BinaryHeap::new();
        for (symbol, &weight) in frequencies.iter().enumerate() {
            if weight > 0 {
                heap.push(Reverse((weight, nodes.len())));
                nodes.push(Node::Leaf(symbol as u16));
            }
        }
        let marker = nodes.len();
        heap.push(Reverse((1, marker)));
        nodes.push(Node::Leaf(END_MARKER));

        let root = loop {
            match (heap.pop(), heap.pop()) {
                (Some(Reverse((wa, left))), Some(Reverse((wb, right)))) => {
                    heap.push(Reverse((wa.saturating_add(wb), nodes.len())));
                    nodes.push(Node::Internal { left, right });
                }
                (Some(Reverse((_, last))), None) => break last,
                (None, _) => break marker,
            }
        };

        let mut codes = vec![Vec::new(); END_MARKER as usize + 1];
        let mut pending = vec![(root, Vec::new())];
        while let Some((id, prefix)) = pending.pop() {
            match nodes[id] {
                Node::Leaf(symbol) => codes[symbol as usize] = prefix,
                Node::Internal { left, right } => {
                    let mut right_code = prefix.clone();
                    right_code.push(true);
                    let mut left_code = prefix;
                    left_code.push(false);
                    pending.push((right, right_code));
                    pending.push((left, left_code));
                }
            }
        }

        HuffmanCode { nodes, root, codes }
    }

    pub fn from_data(data: &[u8]) -> Self {
        Self::build(&frequencies(data))
    }

    /// Code of a byte, or of the end marker for `256`.
    pub fn code(&self, symbol: u16) -> Option<&[bool]> {
        let code = self.codes.get(symbol as usize)?;
        let present = !code.is_empty() || (symbol == END_MARKER && self.is_marker_only());
        present.then_some(code.as_slice())
    }

    /// Symbols with a code, in ascending order.
    pub fn symbols(&self) -> impl Iterator<Item = u16> + '_ {
        (0..=END_MARKER).filter(|s| self.code(*s).is_some())
    }

    /// True for the tree of an empty input, whose only leaf is the marker.
    fn is_marker_only(&self) -> bool {
        matches!(self.nodes[self.root], Node::Leaf(_))
    }

    fn encode_into(&self, data: &[u8], out: &mut Vec<u8>) {
        let mut writer = BitWriter::new(out);
        for &byte in data {
            writer.write_code(&self.codes[byte as usize]);
        }
        writer.write_code(&self.codes[END_MARKER as usize]);
        writer.finish();
    }

    /// Walks the tree bit by bit until the end marker.
    fn decode(&self, bits: &[u8], expected: usize) -> Result<Vec<u8>, CompressionError> {
        let mut out = Vec::with_capacity(expected.min(bits.len().saturating_mul(8)));
        if self.is_marker_only() {
            return Ok(out);
        }
        let mut node = self.root;
        for &byte in bits {
            for shift in (0..8).rev() {
                let bit = (byte >> shift) & 1 == 1;
                node = match self.nodes[node] {
                    Node::Internal { left, right } => {
                        if bit {
                            right
                        } else {
                            left
                        }
                    }
                    Node::Leaf(_) => node,
                };
                if let Node::Leaf(symbol) = self.nodes[node] {
                    if symbol == END_MARKER {
                        return Ok(out);
                    }
                    out.push(symbol as u8);
                    node = self.root;
                }
            }
        }
        Err(CompressionError::Truncated)
    }
}

fn frequencies(data: &[u8]) -> [u64; 256] {
    let mut table = [0u64; 256];
    for &byte in data {
        table[byte as usize] += 1;
    }
    table
}

/// MSB-first bit packer with an internal byte buffer.
struct BitWriter<'o> {
    out: &'o mut Vec<u8>,
    buffer: Vec<u8>,
    current: u8,
    filled: u8,
}

impl<'o> BitWriter<'o> {
    fn new(out: &'o mut Vec<u8>) -> Self {
        BitWriter {
            out,
            buffer: Vec::with_capacity(BUFFER_SIZE),
            current: 0,
            filled: 0,
        }
    }

    fn write_code(&mut self, code: &[bool]) {
        for &bit in code {
            self.current = (self.current << 1) | bit as u8;
            self.filled += 1;
            if self.filled == 8 {
                self.push_byte();
            }
        }
    }

    fn push_byte(&mut self) {
        self.buffer.push(self.current);
        self.current = 0;
        self.filled = 0;
        if self.buffer.len() == BUFFER_SIZE {
            self.out.extend_from_slice(&self.buffer);
            self.buffer.clear();
        }
    }

    fn finish(mut self) {
        if self.filled > 0 {
            self.current <<= 8 - self.filled;
            self.push_byte();
        }
        self.out.extend_from_slice(&self.buffer);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HuffmanCompressor;

impl Compressor for HuffmanCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let table = frequencies(data);
        let code = HuffmanCode::build(&table);

        let mut out = Vec::new();
        let present: Vec<(usize, u64)> = table
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, weight)| *weight > 0)
            .collect();
        write_varint(&mut out, present.len() as u64);
        for (symbol, weight) in present {
            out.push(symbol as u8);
            write_varint(&mut out, weight);
        }
        let header = out.len();
        code.encode_into(data, &mut out);
        debug!(input = data.len(), header, output = out.len(), "huffman encoded");
        Ok(out)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let mut reader = Reader::new(data);
        let count = reader.read_len()?;
        if count > 256 {
            return Err(CompressionError::BadHeader("more than 256 symbols"));
        }
        let mut table = [0u64; 256];
        let mut expected: u64 = 0;
        for _ in 0..count {
            let symbol = reader.read_u8()? as usize;
            let weight = reader.read_varint()?;
            if weight == 0 || table[symbol] != 0 {
                return Err(CompressionError::BadHeader("zero or repeated frequency"));
            }
            table[symbol] = weight;
            expected = expected
                .checked_add(weight)
                .ok_or(CompressionError::BadHeader("frequencies overflow"))?;
        }
        // Every tree weight is bounded by the total, end marker included.
        if expected == u64::MAX {
            return Err(CompressionError::BadHeader("frequencies overflow"));
        }
        let bits = reader.read_slice(reader.remaining())?;
        let code = HuffmanCode::build(&table);
        let out = code.decode(bits, usize::try_from(expected).unwrap_or(usize::MAX))?;
        if out.len() as u64 != expected {
            return Err(CompressionError::BadHeader("length does not match frequencies"));
        }
        Ok(out)
    }
}
