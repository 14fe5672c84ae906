//! Attribute message (0x0C) and attribute-info message (0x0F) decoders.
//!
//! Dense attribute storage (fractal heap + B-tree v2) is not traversed.
//! Per the design notes' resolved open question, the header records
//! whether dense storage is *present* so a caller can tell "none" apart
//! from "present but unread" instead of a silent empty attribute list.

use crate::dataspace::Dataspace;
use crate::datatype::Datatype;
use crate::error::{Error, Result};
use crate::primitives::{is_undefined_address, read_address, require_len, Endianness};

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub datatype: Datatype,
    pub dataspace: Dataspace,
    pub raw_value: Vec<u8>,
}

impl Attribute {
    pub fn decode(bytes: &[u8], offset: u64) -> Result<Self> {
        require_len(bytes, 8, "attribute header", offset)?;
        let version = bytes[0];
        let flags = bytes[1];
        let name_size = u16::from_le_bytes(bytes[2..4].try_into().unwrap()) as usize;
        let datatype_size = u16::from_le_bytes(bytes[4..6].try_into().unwrap()) as usize;
        let dataspace_size = u16::from_le_bytes(bytes[6..8].try_into().unwrap()) as usize;

        let mut cursor = 8usize;
        if version >= 3 {
            require_len(bytes, cursor + 1, "attribute charset", offset)?;
            cursor += 1; // name character set, not interpreted further
        }
        let _ = flags;

        require_len(bytes, cursor + name_size, "attribute name", offset)?;
        let name_bytes = &bytes[cursor..cursor + name_size];
        let nul_pos = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
        let name = String::from_utf8_lossy(&name_bytes[..nul_pos]).into_owned();
        cursor += if version == 1 {
            ((name_size + 7) / 8) * 8
        } else {
            name_size
        };

        require_len(bytes, cursor + datatype_size, "attribute datatype", offset)?;
        let datatype = Datatype::decode(&bytes[cursor..cursor + datatype_size], offset)?;
        cursor += if version == 1 {
            ((datatype_size + 7) / 8) * 8
        } else {
            datatype_size
        };

        require_len(bytes, cursor + dataspace_size, "attribute dataspace", offset)?;
        let dataspace = Dataspace::decode(&bytes[cursor..cursor + dataspace_size], offset)?;
        cursor += if version == 1 {
            ((dataspace_size + 7) / 8) * 8
        } else {
            dataspace_size
        };

        let raw_value = bytes.get(cursor..).unwrap_or(&[]).to_vec();

        Ok(Attribute {
            name,
            datatype,
            dataspace,
            raw_value,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AttributeInfo {
    pub fractal_heap_address: Option<u64>,
    pub name_index_btree_address: Option<u64>,
    pub creation_order_btree_address: Option<u64>,
}

impl AttributeInfo {
    pub fn decode(bytes: &[u8], offset_size: u8, offset: u64) -> Result<Self> {
        require_len(bytes, 2, "attribute info header", offset)?;
        let flags = bytes[1];
        let mut cursor = 2usize;
        if flags & 0x1 != 0 {
            require_len(bytes, cursor + 2, "attribute info max creation index", offset)?;
            cursor += 2;
        }

        let os = offset_size as usize;
        require_len(bytes, cursor + os, "fractal heap address", offset)?;
        let fractal_heap_raw = read_address(&bytes[cursor..], offset_size, Endianness::Little)?;
        cursor += os;

        require_len(bytes, cursor + os, "name index btree address", offset)?;
        let name_index_raw = read_address(&bytes[cursor..], offset_size, Endianness::Little)?;
        cursor += os;

        let creation_order_btree_address = if flags & 0x2 != 0 {
            require_len(bytes, cursor + os, "creation order btree address", offset)?;
            let raw = read_address(&bytes[cursor..], offset_size, Endianness::Little)?;
            if is_undefined_address(raw, offset_size) {
                None
            } else {
                Some(raw)
            }
        } else {
            None
        };

        let fractal_heap_address = if is_undefined_address(fractal_heap_raw, offset_size) {
            None
        } else {
            Some(fractal_heap_raw)
        };
        let name_index_btree_address = if is_undefined_address(name_index_raw, offset_size) {
            None
        } else {
            Some(name_index_raw)
        };

        Ok(AttributeInfo {
            fractal_heap_address,
            name_index_btree_address,
            creation_order_btree_address,
        })
    }

    /// Encodes this info message without a max-creation-index field
    /// (flag bit 0 clear); creation-order B-tree address is written iff set.
    pub fn encode(&self, offset_size: u8) -> Vec<u8> {
        let os = offset_size as usize;
        let undefined = |addr: Option<u64>| addr.unwrap_or(u64::MAX);
        let flags = if self.creation_order_btree_address.is_some() {
            0x2
        } else {
            0x0
        };
        let mut out = vec![0u8, flags];
        out.extend_from_slice(&undefined(self.fractal_heap_address).to_le_bytes()[..os]);
        out.extend_from_slice(&undefined(self.name_index_btree_address).to_le_bytes()[..os]);
        if let Some(addr) = self.creation_order_btree_address {
            out.extend_from_slice(&addr.to_le_bytes()[..os]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_scalar_int32_attribute() {
        let name = b"test_int\0";
        let mut datatype_bytes = vec![0x10u8, 0, 0, 0];
        datatype_bytes.extend_from_slice(&4u32.to_le_bytes());
        let dataspace_bytes = [1u8, 0, 0, 0, 0, 0, 0, 0];

        let mut bytes = vec![1u8, 0];
        bytes.extend_from_slice(&(name.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&(datatype_bytes.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&(dataspace_bytes.len() as u16).to_le_bytes());

        let name_padded_len = ((name.len() + 7) / 8) * 8;
        let mut name_field = name.to_vec();
        name_field.resize(name_padded_len, 0);
        bytes.extend_from_slice(&name_field);

        let datatype_padded_len = ((datatype_bytes.len() + 7) / 8) * 8;
        let mut datatype_field = datatype_bytes.clone();
        datatype_field.resize(datatype_padded_len, 0);
        bytes.extend_from_slice(&datatype_field);

        let dataspace_padded_len = ((dataspace_bytes.len() + 7) / 8) * 8;
        let mut dataspace_field = dataspace_bytes.to_vec();
        dataspace_field.resize(dataspace_padded_len, 0);
        bytes.extend_from_slice(&dataspace_field);

        bytes.extend_from_slice(&42i32.to_le_bytes());

        let attr = Attribute::decode(&bytes, 0).unwrap();
        assert_eq!(attr.name, "test_int");
        assert!(attr.datatype.is_fixed_int(4));
        assert_eq!(attr.raw_value, 42i32.to_le_bytes());
    }

    #[test]
    fn attribute_info_reports_dense_presence() {
        let mut bytes = vec![0u8, 0x02]; // version 0, flags: creation order index present
        bytes.extend_from_slice(&0x1000u64.to_le_bytes());
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        bytes.extend_from_slice(&0x2000u64.to_le_bytes());
        let info = AttributeInfo::decode(&bytes, 8, 0).unwrap();
        assert_eq!(info.fractal_heap_address, Some(0x1000));
        assert_eq!(info.name_index_btree_address, None);
        assert_eq!(info.creation_order_btree_address, Some(0x2000));
    }

    #[test]
    fn attribute_info_encode_decode_round_trips() {
        let info = AttributeInfo {
            fractal_heap_address: Some(0x1000),
            name_index_btree_address: None,
            creation_order_btree_address: Some(0x2000),
        };
        let bytes = info.encode(8);
        let decoded = AttributeInfo::decode(&bytes, 8, 0).unwrap();
        assert_eq!(decoded.fractal_heap_address, info.fractal_heap_address);
        assert_eq!(decoded.name_index_btree_address, info.name_index_btree_address);
        assert_eq!(
            decoded.creation_order_btree_address,
            info.creation_order_btree_address
        );
    }
}
