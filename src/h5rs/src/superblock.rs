//! Superblock codec: versions 0, 2, 3, and 4.

use crate::byte_source::ByteSource;
use crate::checksum::{crc32, fletcher32};
use crate::error::{Error, Result};
use crate::primitives::{is_undefined_address, read_address, require_len, Endianness};

pub const SIGNATURE: [u8; 8] = [0x89, 0x48, 0x44, 0x46, 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    None,
    Crc32,
    Fletcher32,
}

#[derive(Debug, Clone)]
pub struct Superblock {
    pub version: u8,
    pub endianness: Endianness,
    pub offset_size: u8,
    pub length_size: u8,
    pub base_address: u64,
    pub super_extension_address: u64,
    pub root_group_address: u64,
    pub root_btree_address: Option<u64>,
    pub root_heap_address: Option<u64>,
    pub checksum_algorithm: ChecksumAlgorithm,
}

impl Superblock {
    /// Reads and validates the 128-byte superblock region at file offset 0.
    pub fn read(source: &dyn ByteSource) -> Result<Self> {
        let mut header = vec![0u8; 128];
        let n = source.read_at(&mut header, 0)?;
        header.truncate(n);
        require_len(&header, 9, "superblock signature+version", 0)?;

        if header[0..8] != SIGNATURE {
            return Err(Error::format(0, "bad HDF5 signature"));
        }

        let version = header[8];
        match version {
            0 => Self::read_v0(&header),
            2 | 3 => Self::read_v2_or_later(&header, version),
            4 => Self::read_v4(&header),
            other => Err(Error::format(0, format!("unsupported superblock version {other}"))),
        }
    }

    fn read_v0(header: &[u8]) -> Result<Self> {
        require_len(header, 96, "v0 superblock", 0)?;
        let offset_size = header[13];
        let length_size = header[14];
        let endianness = Endianness::Little;

        let base_address = read_address(&header[24..], offset_size, endianness)?;

        // Byte 64: root object header address, embedded in the 40-byte
        // symbol-table entry that begins at byte 56. A zero here means the
        // file uses the symbol-table-only form; the root B-tree/heap
        // addresses at bytes 80/88 substitute.
        let root_group_address = read_address(&header[64..], offset_size, endianness)?;
        let root_btree_address = read_address(&header[80..], offset_size, endianness)?;
        let root_heap_address = read_address(&header[88..], offset_size, endianness)?;

        let root_group_address = if root_group_address == 0 {
            root_btree_address
        } else {
            root_group_address
        };

        Ok(Superblock {
            version: 0,
            endianness,
            offset_size,
            length_size,
            base_address,
            super_extension_address: u64::MAX,
            root_group_address,
            root_btree_address: Some(root_btree_address),
            root_heap_address: Some(root_heap_address),
            checksum_algorithm: ChecksumAlgorithm::None,
        })
    }

    fn decode_sizes(byte: u8) -> (u8, u8) {
        const VALID_DIRECT: [u8; 4] = [1, 2, 4, 8];
        if VALID_DIRECT.contains(&byte) {
            (byte, byte)
        } else {
            let codes = [1u8, 2, 4, 8];
            let offset_code = (byte & 0x0F) as usize;
            let length_code = ((byte >> 4) & 0x0F) as usize;
            (
                codes.get(offset_code).copied().unwrap_or(8),
                codes.get(length_code).copied().unwrap_or(8),
            )
        }
    }

    fn read_v2_or_later(header: &[u8], version: u8) -> Result<Self> {
        require_len(header, 48, "v2 superblock", 0)?;
        let endianness = if header[9] & 0x1 == 0 {
            Endianness::Little
        } else {
            Endianness::Big
        };
        let (offset_size, length_size) = Self::decode_sizes(header[10]);

        let os = offset_size as usize;
        let mut cursor = 12usize;
        let base_address = read_address(&header[cursor..], offset_size, endianness)?;
        cursor += os;
        let super_extension_address = read_address(&header[cursor..], offset_size, endianness)?;
        cursor += os;
        let _eof_address = read_address(&header[cursor..], offset_size, endianness)?;
        cursor += os;
        let root_group_address = read_address(&header[cursor..], offset_size, endianness)?;

        Ok(Superblock {
            version,
            endianness,
            offset_size,
            length_size,
            base_address,
            super_extension_address,
            root_group_address,
            root_btree_address: None,
            root_heap_address: None,
            checksum_algorithm: ChecksumAlgorithm::None,
        })
    }

    fn read_v4(header: &[u8]) -> Result<Self> {
        let mut base = Self::read_v2_or_later(header, 4)?;

        let os = base.offset_size as usize;
        let mut cursor = 12usize + os * 4;
        require_len(header, cursor + 4, "v4 checksum region", 0)?;

        let algo_code = header[cursor];
        base.checksum_algorithm = match algo_code {
            0 => ChecksumAlgorithm::None,
            1 => ChecksumAlgorithm::Crc32,
            2 => ChecksumAlgorithm::Fletcher32,
            other => return Err(Error::format(0, format!("unknown checksum algorithm {other}"))),
        };
        cursor += 4; // algo byte + 3 reserved

        let stored = u32::from_le_bytes(header[cursor..cursor + 4].try_into().unwrap());
        let computed = match base.checksum_algorithm {
            ChecksumAlgorithm::None => stored,
            ChecksumAlgorithm::Crc32 => crc32(&header[8..48]),
            ChecksumAlgorithm::Fletcher32 => fletcher32(&header[8..48]),
        };
        if stored != computed {
            return Err(Error::format(0, "v4 superblock checksum mismatch"));
        }

        if is_undefined_address(base.super_extension_address, base.offset_size) {
            return Err(Error::format(0, "undefined v4 super extension address"));
        }

        Ok(base)
    }
}
