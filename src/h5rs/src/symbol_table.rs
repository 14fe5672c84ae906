//! Symbol Table message (type code 0x11): the V0-era group representation,
//! a pointer to the group's name B-tree and local heap. Its presence in an
//! object header's message list is one of the signals [`crate::object_header`]
//! uses to classify the header as a group.

use crate::error::Result;
use crate::primitives::{read_address, require_len, Endianness};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolTableMessage {
    pub btree_address: u64,
    pub heap_address: u64,
}

impl SymbolTableMessage {
    pub fn decode(bytes: &[u8], offset_size: u8, offset: u64) -> Result<Self> {
        let os = offset_size as usize;
        require_len(bytes, 2 * os, "symbol table message", offset)?;
        let btree_address = read_address(bytes, offset_size, Endianness::Little)?;
        let heap_address = read_address(&bytes[os..], offset_size, Endianness::Little)?;
        Ok(SymbolTableMessage {
            btree_address,
            heap_address,
        })
    }

    pub fn encode(&self, offset_size: u8) -> Vec<u8> {
        let os = offset_size as usize;
        let mut out = Vec::with_capacity(2 * os);
        out.extend_from_slice(&self.btree_address.to_le_bytes()[..os]);
        out.extend_from_slice(&self.heap_address.to_le_bytes()[..os]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let msg = SymbolTableMessage {
            btree_address: 0x100,
            heap_address: 0x200,
        };
        let bytes = msg.encode(8);
        let decoded = SymbolTableMessage::decode(&bytes, 8, 0).unwrap();
        assert_eq!(decoded, msg);
    }
}
