//! On-disk record format
//!
//! Each record is an 18-byte fixed-width tuple:
//!
//! ```text
//! +------------+----------------+------------------+
//! |  name[8]   | shards (u16)   | size (u64, BE)   |
//! +------------+----------------+------------------+
//! ```
//!
//! The name field holds the raw bytes of the 16-hex-character object name.
//! Records append into segment files named `<prefix>-<index>.bin`, each
//! capped at 64 MiB.

use bytes::{Buf, BufMut};
use og_common::{Error, ObjectName, Result};

/// Size of one record in bytes
pub const RECORD_SIZE: usize = 18;

/// Records per segment (64 MiB / 18, rounded down)
pub const RECORDS_PER_SEGMENT: u64 = (64 * 1024 * 1024) / RECORD_SIZE as u64;

/// Byte size of a full segment
pub const SEGMENT_SIZE: u64 = RECORDS_PER_SEGMENT * RECORD_SIZE as u64;

/// One entry of the object population
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectRecord {
    pub name: ObjectName,
    /// Shard count the object was written with
    pub shards: u16,
    /// Object size in bytes
    pub size: u64,
}

impl ObjectRecord {
    pub fn new(name: ObjectName, shards: u16, size: u64) -> Self {
        Self { name, shards, size }
    }

    /// Serialize to the fixed wire form
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        let mut cursor = &mut buf[..];
        cursor.put_slice(self.name.as_bytes());
        cursor.put_u16(self.shards);
        cursor.put_u64(self.size);
        buf
    }

    /// Parse the fixed wire form
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < RECORD_SIZE {
            return Err(Error::StoreCorrupt(format!(
                "record too short: {} bytes",
                data.len()
            )));
        }
        let mut buf = data;
        let mut name = [0u8; 8];
        buf.copy_to_slice(&mut name);
        let shards = buf.get_u16();
        let size = buf.get_u64();
        Ok(Self {
            name: ObjectName::from_bytes(name),
            shards,
            size,
        })
    }
}
