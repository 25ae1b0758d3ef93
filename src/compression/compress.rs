use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::core::error::{Error, ErrorKind, Result};

/// zlib-deflate, used for the raw document text kept in the store metadata.
/// The format is part of the index descriptor contract, so this stays zlib
/// even though the snapshot file uses lz4.
pub fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data)?;
    Ok(enc.finish()?)
}

pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| Error::new(ErrorKind::StoreCorrupt, format!("zlib: {}", e)))?;
    Ok(out)
}

/// lz4 with a prepended size, used for the store snapshot payload where
/// speed matters more than ratio.
pub fn lz4_compress(data: &[u8]) -> Vec<u8> {
    lz4_flex::compress_prepend_size(data)
}

pub fn lz4_decompress(data: &[u8]) -> Result<Vec<u8>> {
    lz4_flex::decompress_size_prepended(data)
        .map_err(|e| Error::new(ErrorKind::StoreCorrupt, format!("lz4: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zlib_roundtrip() {
        let text = "some document text, repeated. some document text, repeated.";
        let packed = deflate(text.as_bytes()).unwrap();
        assert_eq!(inflate(&packed).unwrap(), text.as_bytes());
    }

    #[test]
    fn test_lz4_roundtrip() {
        let data = vec![7u8; 10000];
        let packed = lz4_compress(&data);
        assert!(packed.len() < data.len());
        assert_eq!(lz4_decompress(&packed).unwrap(), data);
    }

    #[test]
    fn test_corrupt_input() {
        assert!(inflate(b"not zlib").is_err());
        assert!(lz4_decompress(b"xx").is_err());
    }
}
