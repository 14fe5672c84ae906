//! Partial writer surface: the *shape* of writes for superblocks and V2
//! object headers, not a full format-round-trip writer (full write
//! conformance with the reference library is an explicit non-goal). Only
//! 8-byte offsets and lengths are supported, matching the distilled spec's
//! reduced writer surface.
//!
//! Symbol-table, link, and attribute-info messages already carry their
//! `encode` counterparts next to their decoders ([`crate::symbol_table`],
//! [`crate::link`], [`crate::attribute`]); this module covers the two
//! larger structures, the superblock and the V2 object header, that tie
//! encoded messages together.

use crate::checksum::crc32;
use crate::error::{Error, Result};
use crate::superblock::SIGNATURE;

/// Serializes a V0 superblock: a 96-byte block with the embedded root
/// symbol-table entry (name offset, object header address, cache type,
/// reserved, scratch) at its conventional byte 56 offset, and the cached
/// root B-tree/heap addresses the reader substitutes when the object-header
/// address is zero.
pub fn write_v0_superblock(
    base_address: u64,
    root_group_address: u64,
    root_btree_address: u64,
    root_heap_address: u64,
) -> Vec<u8> {
    let mut out = vec![0u8; 96];
    out[0..8].copy_from_slice(&SIGNATURE);
    out[8] = 0; // version
    out[9] = 0; // free-space version
    out[10] = 0; // root group symbol table version
    out[13] = 8; // offset size
    out[14] = 8; // length size
    out[24..32].copy_from_slice(&base_address.to_le_bytes());
    // Embedded root symbol-table entry begins at byte 56: link name offset
    // (8, unused for the root entry), object header address (8).
    out[56..64].copy_from_slice(&0u64.to_le_bytes());
    out[64..72].copy_from_slice(&root_group_address.to_le_bytes());
    out[80..88].copy_from_slice(&root_btree_address.to_le_bytes());
    out[88..96].copy_from_slice(&root_heap_address.to_le_bytes());
    out
}

/// Serializes a V2 superblock: a 48-byte block with a CRC32 over the first
/// 44 bytes appended as the trailing 4. Only 8-byte offsets/lengths.
pub fn write_v2_superblock(
    base_address: u64,
    super_extension_address: u64,
    eof_address: u64,
    root_group_address: u64,
) -> Vec<u8> {
    let mut out = vec![0u8; 48];
    out[0..8].copy_from_slice(&SIGNATURE);
    out[8] = 2; // version
    out[9] = 0; // endianness: little
    out[10] = 8; // offset size
    out[11] = 0; // reserved
    out[12..20].copy_from_slice(&base_address.to_le_bytes());
    out[20..28].copy_from_slice(&super_extension_address.to_le_bytes());
    out[28..36].copy_from_slice(&eof_address.to_le_bytes());
    out[36..44].copy_from_slice(&root_group_address.to_le_bytes());
    let checksum = crc32(&out[0..44]);
    out[44..48].copy_from_slice(&checksum.to_le_bytes());
    out
}

/// A single V2 object header message pending serialization: its type code,
/// per-message flags, and encoded payload.
#[derive(Debug, Clone)]
struct PendingMessage {
    type_code: u8,
    flags: u8,
    payload: Vec<u8>,
}

/// Builds a V2 object header in memory, message by message, then serializes
/// it once the caller is done appending. Mirrors the read side's flag-driven
/// prologue: `flags` selects the chunk-size field width the same way it
/// selects which optional prologue fields the reader consumes.
pub struct ObjectHeaderWriterV2 {
    flags: u8,
    messages: Vec<PendingMessage>,
}

impl ObjectHeaderWriterV2 {
    pub fn new(flags: u8) -> Self {
        ObjectHeaderWriterV2 {
            flags,
            messages: Vec::new(),
        }
    }

    fn chunk_size_width(&self) -> usize {
        1usize << (self.flags & 0x3)
    }

    fn max_chunk_size(&self) -> u64 {
        match self.chunk_size_width() {
            1 => u8::MAX as u64,
            2 => u16::MAX as u64,
            4 => u32::MAX as u64,
            _ => u64::MAX,
        }
    }

    /// Appends a message, rejecting it if the running total would overflow
    /// the chunk-size field width this header was constructed with.
    pub fn add_message(&mut self, type_code: u8, flags: u8, payload: Vec<u8>) -> Result<()> {
        let projected: u64 = self.encoded_body_len() as u64 + 4 + payload.len() as u64;
        if projected > self.max_chunk_size() {
            return Err(Error::overflow("v2 object header chunk size"));
        }
        self.messages.push(PendingMessage {
            type_code,
            flags,
            payload,
        });
        Ok(())
    }

    fn encoded_body_len(&self) -> usize {
        self.messages
            .iter()
            .map(|m| 4 + m.payload.len())
            .sum::<usize>()
    }

    /// Serializes the full V2 object header: `"OHDR"` signature, version,
    /// flags, chunk-size field, then each message's 4-byte prologue and
    /// payload in append order.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"OHDR");
        out.push(2); // version
        out.push(self.flags);

        let body_len = self.encoded_body_len() as u64;
        let width = self.chunk_size_width();
        out.extend_from_slice(&body_len.to_le_bytes()[..width]);

        for message in &self.messages {
            out.push(message.type_code);
            out.extend_from_slice(&(message.payload.len() as u16).to_le_bytes());
            out.push(message.flags);
            out.extend_from_slice(&message.payload);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::superblock::Superblock;
    use crate::byte_source::SliceSource;

    #[test]
    fn v2_superblock_round_trips_through_reader() {
        let bytes = write_v2_superblock(0, 0x200, 0x1000, 0x48);
        let source = SliceSource::new(&bytes);
        let sb = Superblock::read(&source).unwrap();
        assert_eq!(sb.version, 2);
        assert_eq!(sb.root_group_address, 0x48);
        assert_eq!(sb.super_extension_address, 0x200);
    }

    #[test]
    fn v0_superblock_round_trips_through_reader() {
        let bytes = write_v0_superblock(0, 0x60, 0x80, 0x90);
        let source = SliceSource::new(&bytes);
        let sb = Superblock::read(&source).unwrap();
        assert_eq!(sb.version, 0);
        assert_eq!(sb.root_group_address, 0x60);
    }

    #[test]
    fn object_header_writer_serializes_appended_messages() {
        let mut writer = ObjectHeaderWriterV2::new(0);
        writer.add_message(0x01, 0, vec![1, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        let bytes = writer.serialize();
        assert_eq!(&bytes[0..4], b"OHDR");
        assert_eq!(bytes[4], 2);
    }

    #[test]
    fn object_header_writer_rejects_overflowing_chunk_size() {
        let mut writer = ObjectHeaderWriterV2::new(0); // 1-byte chunk size field, max 255
        let big_payload = vec![0u8; 300];
        assert!(writer.add_message(0x01, 0, big_payload).is_err());
    }
}
