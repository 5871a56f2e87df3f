//! Inflate capability for compressed binary frames

use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use std::io::Read;

use crate::{Error, Result};

/// Something that can turn a compressed buffer back into bytes
pub trait Inflate: Send + Sync {
    fn inflate(&self, data: &[u8]) -> Result<Vec<u8>>;
}

impl<F> Inflate for F
where
    F: Fn(&[u8]) -> Result<Vec<u8>> + Send + Sync,
{
    fn inflate(&self, data: &[u8]) -> Result<Vec<u8>> {
        self(data)
    }
}

/// flate2-backed inflater
///
/// Gzip when the buffer starts with the gzip magic, zlib otherwise, raw
/// deflate as the last resort.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZlibInflater;

impl ZlibInflater {
    pub fn new() -> Self {
        Self
    }
}

fn read_all<R: Read>(mut reader: R) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}

impl Inflate for ZlibInflater {
    fn inflate(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.starts_with(&[0x1f, 0x8b]) {
            return read_all(GzDecoder::new(data)).map_err(|e| Error::Inflate(e.to_string()));
        }

        read_all(ZlibDecoder::new(data))
            .or_else(|_| read_all(DeflateDecoder::new(data)))
            .map_err(|e| Error::Inflate(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{GzEncoder, ZlibEncoder};
    use flate2::Compression;
    use std::io::Write;

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_inflate_zlib() {
        let out = ZlibInflater.inflate(&zlib(b"{\"a\":1}")).unwrap();
        assert_eq!(out, b"{\"a\":1}");
    }

    #[test]
    fn test_inflate_gzip() {
        let out = ZlibInflater.inflate(&gzip(b"hello")).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_inflate_garbage_fails() {
        assert!(ZlibInflater.inflate(&[0x1f, 0x8b, 0x00]).is_err());
    }

    #[test]
    fn test_closure_is_inflate() {
        let upper = |data: &[u8]| -> Result<Vec<u8>> { Ok(data.to_ascii_uppercase()) };
        assert_eq!(upper.inflate(b"ab").unwrap(), b"AB");
    }
}
