//! Global heap reader: resolves `(heap address, object index)` pairs used
//! by variable-length string descriptors.
//!
//! Neither the distilled spec's attribute path nor its dataset-read path
//! spells out this component's internal layout, but both reference it; the
//! design notes resolve that by implementing one small reader shared by
//! both call sites, grounded on the same "signature, length-prefixed
//! records" shape the rest of this crate's metadata containers use.

use crate::byte_source::ByteSource;
use crate::error::{Error, Result};
use crate::primitives::{read_uint, require_len, Endianness};

pub const SIGNATURE: [u8; 4] = *b"GCOL";

/// Reads object `index` out of the global heap collection rooted at
/// `collection_address`. `length_size` is the superblock's configured
/// length-field width (collection and object sizes are length-wide, not
/// offset-wide).
pub fn read_object(
    source: &dyn ByteSource,
    collection_address: u64,
    length_size: u8,
    index: u32,
) -> Result<Vec<u8>> {
    let ls = length_size as usize;
    let mut prologue = vec![0u8; 8 + ls];
    source.read_exact_at(&mut prologue, collection_address)?;
    require_len(&prologue, 4, "global heap signature", collection_address)?;
    if prologue[0..4] != SIGNATURE {
        return Err(Error::format(collection_address, "bad global heap signature"));
    }

    let collection_size = read_uint(&prologue[8..8 + ls], Endianness::Little)?;
    let mut collection = vec![0u8; collection_size as usize];
    source.read_exact_at(&mut collection, collection_address)?;

    let header_len = 8 + ls;
    let mut pos = header_len;
    // Entry: 2-byte object index, 2-byte reference count, 4 reserved bytes,
    // length_size-wide object size, then the object bytes padded to an
    // 8-byte boundary. Index 0 marks the collection's free space and ends
    // the scan.
    while pos + 8 + ls <= collection.len() {
        let obj_index = u16::from_le_bytes(collection[pos..pos + 2].try_into().unwrap());
        if obj_index == 0 {
            break;
        }
        let size_pos = pos + 8;
        let obj_size = read_uint(&collection[size_pos..size_pos + ls], Endianness::Little)? as usize;
        let data_start = size_pos + ls;
        require_len(&collection[data_start..], obj_size, "global heap object", collection_address)?;

        if obj_index as u32 == index {
            return Ok(collection[data_start..data_start + obj_size].to_vec());
        }

        let padded = ((obj_size + 7) / 8) * 8;
        pos = data_start + padded;
    }

    Err(Error::format(
        collection_address,
        format!("global heap object index {index} not found"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_source::SliceSource;

    fn collection_with_one_object(payload: &[u8]) -> Vec<u8> {
        let padded_len = ((payload.len() + 7) / 8) * 8;
        let mut entry = vec![0u8; 8 + 8]; // index(2) refcount(2) reserved(4) size(8)
        entry[0..2].copy_from_slice(&1u16.to_le_bytes());
        entry[2..4].copy_from_slice(&1u16.to_le_bytes());
        entry[8..16].copy_from_slice(&(payload.len() as u64).to_le_bytes());
        let mut body = entry;
        body.extend_from_slice(payload);
        body.resize(body.len() - payload.len() + padded_len, 0);

        let collection_size = (8 + 8 + body.len()) as u64;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&SIGNATURE);
        bytes.extend_from_slice(&[0u8; 4]); // version + 3 reserved
        bytes.extend_from_slice(&collection_size.to_le_bytes());
        bytes.extend_from_slice(&body);
        bytes
    }

    #[test]
    fn resolves_object_by_index() {
        let bytes = collection_with_one_object(b"hello world");
        let source = SliceSource::new(&bytes);
        let obj = read_object(&source, 0, 8, 1).unwrap();
        assert_eq!(obj, b"hello world");
    }

    #[test]
    fn missing_index_errors() {
        let bytes = collection_with_one_object(b"hello world");
        let source = SliceSource::new(&bytes);
        assert!(read_object(&source, 0, 8, 2).is_err());
    }
}
