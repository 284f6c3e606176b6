use pretty_assertions::assert_eq;

use super::*;

/// Deterministic pseudo-random bytes (xorshift).
fn noise(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect()
}

fn samples() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("empty", Vec::new()),
        ("single byte", vec![0x2A]),
        ("repeated run", vec![b'a'; 10_000]),
        ("text", b"the quick brown fox jumps over the lazy dog ".repeat(40)),
        ("noise", noise(3000, 7)),
        ("one buffer", noise(BUFFER_SIZE, 11)),
        ("two buffers", noise(BUFFER_SIZE * 2, 13)),
        ("buffer plus one", noise(BUFFER_SIZE + 1, 17)),
        ("skewed multi-buffer", {
            let mut data = vec![0u8; BUFFER_SIZE * 3 - 7];
            data.extend(noise(500, 19));
            data
        }),
    ]
}

#[test]
fn test_round_trip_every_method() {
    crate::test_utils::init_test_logging();
    for method in CompressionMethod::ALL {
        let compressor = method.compressor();
        for (name, data) in samples() {
            let packed = compressor.compress(&data).unwrap();
            let unpacked = compressor.decompress(&packed).unwrap();
            assert_eq!(unpacked, data, "{method} on {name}");
        }
    }
}

#[test]
fn test_huffman_codes_are_prefix_free() {
    let code = HuffmanCode::from_data(b"abracadabra, alakazam");
    let symbols: Vec<u16> = code.symbols().collect();
    assert!(symbols.contains(&256));
    for &a in &symbols {
        for &b in &symbols {
            if a == b {
                continue;
            }
            let (ca, cb) = (code.code(a).unwrap(), code.code(b).unwrap());
            assert!(!cb.starts_with(ca), "{a} is a prefix of {b}");
        }
    }
}

#[test]
fn test_huffman_frequent_symbols_get_short_codes() {
    let mut data = vec![b'e'; 1000];
    data.extend_from_slice(b"xyz");
    let code = HuffmanCode::from_data(&data);
    assert_eq!(code.code(u16::from(b'e')).unwrap().len(), 1);
    assert!(code.code(u16::from(b'x')).unwrap().len() > 1);
    assert_eq!(code.code(u16::from(b'q')), None);
}

#[test]
fn test_huffman_single_distinct_byte_terminates() {
    let data = vec![b'z'; 13];
    let packed = HuffmanCompressor.compress(&data).unwrap();
    // Header: one symbol, `z`, frequency 13; then 14 one-bit codes.
    assert_eq!(&packed[..3], &[1, b'z', 13]);
    assert_eq!(packed.len(), 3 + 2);
    assert_eq!(HuffmanCompressor.decompress(&packed).unwrap(), data);
}

#[test]
fn test_huffman_empty_input_is_header_only() {
    let packed = HuffmanCompressor.compress(&[]).unwrap();
    assert_eq!(packed, vec![0]);
    assert_eq!(HuffmanCompressor.decompress(&packed).unwrap(), Vec::<u8>::new());
}

#[test]
fn test_huffman_skewed_input_shrinks() {
    let mut data = vec![0u8; 8000];
    data.extend(noise(64, 3));
    let packed = HuffmanCompressor.compress(&data).unwrap();
    assert!(packed.len() < data.len() / 4, "{} bytes", packed.len());
}

#[test]
fn test_huffman_truncated_stream() {
    let data = b"hello huffman".to_vec();
    let mut packed = HuffmanCompressor.compress(&data).unwrap();
    packed.truncate(packed.len() - 3);
    assert!(HuffmanCompressor.decompress(&packed).is_err());
}

#[test]
fn test_huffman_rejects_repeated_symbol() {
    let header = [2, b'a', 1, b'a', 1];
    assert!(matches!(
        HuffmanCompressor.decompress(&header),
        Err(CompressionError::BadHeader(_))
    ));
}

#[test]
fn test_huffman_rejects_overflowing_frequencies() {
    let mut single = vec![1, b'a'];
    crate::types::encoding::write_varint(&mut single, u64::MAX);
    single.push(0);

    let mut pair = vec![2, b'a'];
    crate::types::encoding::write_varint(&mut pair, u64::MAX / 2 + 1);
    pair.push(b'b');
    crate::types::encoding::write_varint(&mut pair, u64::MAX / 2 + 1);
    pair.push(0);

    for header in [single, pair] {
        assert!(matches!(
            HuffmanCompressor.decompress(&header),
            Err(CompressionError::BadHeader(_))
        ));
    }
}

#[test]
fn test_method_tags_are_stable() {
    assert_eq!(CompressionMethod::default(), CompressionMethod::HuffmanDeflate);
    for method in CompressionMethod::ALL {
        assert_eq!(CompressionMethod::from_u8(method as u8).unwrap(), method);
        assert_eq!(CompressionMethod::from_name(method.name()), Some(method));
    }
    assert!(matches!(
        CompressionMethod::from_u8(9),
        Err(CompressionError::UnknownMethod(9))
    ));
}

#[test]
fn test_gzip_adds_container_overhead() {
    let data = noise(2048, 23);
    let deflate = DeflateCompressor.compress(&data).unwrap();
    let gzip = GzipCompressor.compress(&data).unwrap();
    assert!(gzip.len() > deflate.len());
    assert_eq!(&gzip[..2], &[0x1F, 0x8B]);
}
