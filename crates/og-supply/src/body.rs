//! Lazy body byte streams
//!
//! Bodies are described by `og_common::Body` and materialized here only when
//! the bytes are actually written to the wire. Every reader is restartable so
//! a retried request re-sends identical content.

use bytes::{Bytes, BytesMut};
use og_common::{Body, DataType};
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use std::io::{self, Read};

/// A restartable reader over a body's bytes
pub struct BodyReader {
    body: Body,
    remaining: u64,
    rng: Option<SmallRng>,
    /// Read offset into custom content
    offset: usize,
}

impl BodyReader {
    pub fn new(body: Body) -> Self {
        let rng = body.seed.map(SmallRng::seed_from_u64);
        let remaining = body.size;
        Self {
            body,
            remaining,
            rng,
            offset: 0,
        }
    }

    /// Total size of the stream in bytes
    pub fn size(&self) -> u64 {
        self.body.size
    }

    /// Rewind to the start of the stream
    pub fn restart(&mut self) {
        self.remaining = self.body.size;
        self.offset = 0;
        self.rng = self.body.seed.map(SmallRng::seed_from_u64);
    }
}

impl Read for BodyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len().min(self.remaining as usize);
        let out = &mut buf[..len];

        match self.body.data_type {
            DataType::None => return Ok(0),
            DataType::Zeroes => out.fill(0),
            DataType::Random | DataType::Existing => {
                let rng = self
                    .rng
                    .as_mut()
                    .ok_or_else(|| io::Error::other("random body without a seed"))?;
                rng.fill_bytes(out);
            }
            DataType::Custom => {
                let content = self
                    .body
                    .content
                    .as_ref()
                    .ok_or_else(|| io::Error::other("custom body without content"))?;
                out.copy_from_slice(&content[self.offset..self.offset + len]);
                self.offset += len;
            }
        }

        self.remaining -= len as u64;
        Ok(len)
    }
}

/// Materialize a body into a single buffer
///
/// Used for hashing and for requests small enough to buffer whole.
pub fn materialize(body: &Body) -> Bytes {
    if body.is_empty() {
        return Bytes::new();
    }
    if let Some(content) = &body.content {
        return content.clone();
    }
    let mut reader = BodyReader::new(body.clone());
    let mut buf = BytesMut::zeroed(body.size as usize);
    let mut filled = 0usize;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            // BodyReader never returns transient errors
            Err(_) => break,
        }
    }
    buf.truncate(filled);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use og_common::Body;

    #[test]
    fn test_zeroes_stream() {
        let bytes = materialize(&Body::zeroes(64));
        assert_eq!(bytes.len(), 64);
        assert!(bytes.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_random_stream_deterministic() {
        let first = materialize(&Body::random(1024, 42));
        let second = materialize(&Body::random(1024, 42));
        assert_eq!(first, second);
        let other_seed = materialize(&Body::random(1024, 43));
        assert_ne!(first, other_seed);
    }

    #[test]
    fn test_restart_replays_content() {
        let mut reader = BodyReader::new(Body::random(256, 9));
        let mut first = vec![0u8; 256];
        reader.read_exact(&mut first).unwrap();
        reader.restart();
        let mut second = vec![0u8; 256];
        reader.read_exact(&mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_custom_stream() {
        let bytes = materialize(&Body::custom(b"hello".to_vec()));
        assert_eq!(&bytes[..], b"hello");
    }

    #[test]
    fn test_partial_reads_cover_stream() {
        let mut reader = BodyReader::new(Body::zeroes(10));
        let mut buf = [0u8; 3];
        let mut total = 0;
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            total += n;
        }
        assert_eq!(total, 10);
    }
}
