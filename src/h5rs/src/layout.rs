//! Data-layout message decoder (type code 0x08, canonical; see the design
//! notes for the legacy 0x05 alias some files carry).

use crate::error::{Error, Result};
use crate::primitives::{read_address, require_len, Endianness};

#[derive(Debug, Clone)]
pub enum Layout {
    Compact { data: Vec<u8> },
    Contiguous { address: u64, size: u64 },
    Chunked { btree_address: u64, chunk_dims: Vec<u32> },
}

impl Layout {
    pub fn decode(bytes: &[u8], offset_size: u8, offset: u64) -> Result<Self> {
        require_len(bytes, 2, "layout header", offset)?;
        let version = bytes[0];
        if version != 3 && version != 4 {
            return Err(Error::format(
                offset,
                format!("unsupported data layout version {version}"),
            ));
        }
        let class = bytes[1];
        let mut rest = &bytes[2..];

        match class {
            0 => {
                // Compact: 2-byte size, then inline bytes.
                require_len(rest, 2, "compact layout size", offset)?;
                let size = u16::from_le_bytes(rest[0..2].try_into().unwrap()) as usize;
                rest = &rest[2..];
                require_len(rest, size, "compact layout data", offset)?;
                Ok(Layout::Compact {
                    data: rest[..size].to_vec(),
                })
            }
            1 => {
                let os = offset_size as usize;
                require_len(rest, os, "contiguous layout address", offset)?;
                let address = read_address(rest, offset_size, Endianness::Little)?;
                rest = &rest[os..];
                require_len(rest, 8, "contiguous layout size", offset)?;
                let size = u64::from_le_bytes(rest[0..8].try_into().unwrap());
                Ok(Layout::Contiguous { address, size })
            }
            2 => {
                require_len(rest, 1, "chunked layout dimensionality", offset)?;
                let dimensionality = rest[0] as usize;
                rest = &rest[1..];
                let os = offset_size as usize;
                require_len(rest, os, "chunked layout btree address", offset)?;
                let btree_address = read_address(rest, offset_size, Endianness::Little)?;
                rest = &rest[os..];
                let mut chunk_dims = Vec::with_capacity(dimensionality);
                for _ in 0..dimensionality {
                    require_len(rest, 4, "chunk dimension", offset)?;
                    chunk_dims.push(u32::from_le_bytes(rest[0..4].try_into().unwrap()));
                    rest = &rest[4..];
                }
                Ok(Layout::Chunked {
                    btree_address,
                    chunk_dims,
                })
            }
            3 => Err(Error::unsupported("virtual dataset layout")),
            other => Err(Error::format(offset, format!("unknown layout class {other}"))),
        }
    }
}
