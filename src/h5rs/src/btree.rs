//! B-tree v1 (chunk index) decoder and traversal.
//!
//! Recursive-descent over `(offset_size, ndims, chunk_dims)` as the shared
//! traversal context, consulted at every node to size keys, children, and
//! coordinate scaling.

use crate::byte_source::ByteSource;
use crate::error::{Error, Result};
use crate::primitives::{read_address, require_len, Endianness};

pub const SIGNATURE: [u8; 4] = *b"TREE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkKey {
    pub num_bytes: u32,
    pub filter_mask: u32,
    /// Scaled coordinates: byte offset divided by the corresponding chunk
    /// dimension.
    pub scaled_coords: Vec<u64>,
}

#[derive(Debug, Clone)]
pub struct ChunkEntry {
    pub key: ChunkKey,
    pub address: u64,
}

struct Node {
    level: u8,
    keys: Vec<ChunkKey>,
    children: Vec<u64>,
}

fn parse_node(
    source: &dyn ByteSource,
    address: u64,
    offset_size: u8,
    ndims: usize,
    chunk_dims: &[u32],
) -> Result<Node> {
    let mut prologue = vec![0u8; 8 + 2 * offset_size as usize];
    source.read_exact_at(&mut prologue, address)?;
    require_len(&prologue, 4, "btree signature", address)?;
    if prologue[0..4] != SIGNATURE {
        return Err(Error::format(address, "bad B-tree v1 signature"));
    }
    let node_type = prologue[4];
    if node_type != 1 {
        return Err(Error::format(address, "expected raw-data chunk B-tree node"));
    }
    let level = prologue[5];
    let entries_used = u16::from_le_bytes(prologue[6..8].try_into().unwrap()) as usize;

    let key_size = 8 + ndims * 8;
    let os = offset_size as usize;
    let entries_len = (entries_used + 1) * key_size + entries_used * os;
    let mut entries = vec![0u8; entries_len];
    source.read_exact_at(&mut entries, address + 8 + 2 * os as u64)?;

    let mut keys = Vec::with_capacity(entries_used + 1);
    let mut children = Vec::with_capacity(entries_used);
    let mut pos = 0usize;

    for i in 0..=entries_used {
        require_len(&entries[pos..], key_size, "chunk key", address)?;
        let key_bytes = &entries[pos..pos + key_size];
        let num_bytes = u32::from_le_bytes(key_bytes[0..4].try_into().unwrap());
        let filter_mask = u32::from_le_bytes(key_bytes[4..8].try_into().unwrap());
        let mut scaled_coords = Vec::with_capacity(ndims);
        for d in 0..ndims {
            let raw = u64::from_le_bytes(
                key_bytes[8 + d * 8..8 + d * 8 + 8].try_into().unwrap(),
            );
            let dim = chunk_dims.get(d).copied().unwrap_or(0);
            if dim == 0 {
                return Err(Error::format(address, "chunk dimension is zero"));
            }
            scaled_coords.push(raw / dim as u64);
        }
        keys.push(ChunkKey {
            num_bytes,
            filter_mask,
            scaled_coords,
        });
        pos += key_size;

        if i < entries_used {
            require_len(&entries[pos..], os, "child pointer", address)?;
            let child = read_address(&entries[pos..], offset_size, Endianness::Little)?;
            children.push(child);
            pos += os;
        }
    }

    Ok(Node {
        level,
        keys,
        children,
    })
}

/// Point-lookup of the chunk covering `scaled_coords`; returns the chunk
/// data address if present.
pub fn lookup(
    source: &dyn ByteSource,
    root_address: u64,
    offset_size: u8,
    chunk_dims: &[u32],
    scaled_coords: &[u64],
) -> Result<Option<u64>> {
    let ndims = chunk_dims.len();
    let mut address = root_address;
    loop {
        let node = parse_node(source, address, offset_size, ndims, chunk_dims)?;
        let child_index = find_child_index(&node, scaled_coords);
        if child_index >= node.children.len() {
            return Ok(None);
        }
        if node.level == 0 {
            return Ok(Some(node.children[child_index]));
        }
        address = node.children[child_index];
    }
}

fn find_child_index(node: &Node, scaled_coords: &[u64]) -> usize {
    for i in 0..node.children.len() {
        if scaled_coords < node.keys[i + 1].scaled_coords.as_slice() {
            return i;
        }
    }
    node.children.len()
}

/// Collects every chunk entry reachable from `root_address`.
pub fn collect_all(
    source: &dyn ByteSource,
    root_address: u64,
    offset_size: u8,
    chunk_dims: &[u32],
) -> Result<Vec<ChunkEntry>> {
    let ndims = chunk_dims.len();
    let mut out = Vec::new();
    collect_recursive(source, root_address, offset_size, ndims, chunk_dims, &mut out)?;
    Ok(out)
}

fn collect_recursive(
    source: &dyn ByteSource,
    address: u64,
    offset_size: u8,
    ndims: usize,
    chunk_dims: &[u32],
    out: &mut Vec<ChunkEntry>,
) -> Result<()> {
    let node = parse_node(source, address, offset_size, ndims, chunk_dims)?;
    for (i, child) in node.children.iter().enumerate() {
        if node.level == 0 {
            out.push(ChunkEntry {
                key: node.keys[i].clone(),
                address: *child,
            });
        } else {
            collect_recursive(source, *child, offset_size, ndims, chunk_dims, out)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_source::SliceSource;

    fn leaf_node(chunk_dims: &[u32], entries: &[([u64; 2], u32, u64)]) -> Vec<u8> {
        let offset_size = 8u8;
        let ndims = chunk_dims.len();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&SIGNATURE);
        bytes.push(1); // node_type: raw data chunks
        bytes.push(0); // level: leaf
        bytes.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&u64::MAX.to_le_bytes()); // left sibling
        bytes.extend_from_slice(&u64::MAX.to_le_bytes()); // right sibling

        for (coords, _, _) in entries {
            bytes.extend_from_slice(&0u32.to_le_bytes()); // nbytes (key i, unused here)
            bytes.extend_from_slice(&0u32.to_le_bytes());
            for (d, c) in coords.iter().enumerate() {
                bytes.extend_from_slice(&(c * chunk_dims[d] as u64).to_le_bytes());
            }
        }
        // trailing "end" key (all zero coords, used by convention)
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        for _ in 0..ndims {
            bytes.extend_from_slice(&0u64.to_le_bytes());
        }

        for (_, nbytes, addr) in entries {
            let _ = nbytes;
            bytes.extend_from_slice(&addr.to_le_bytes());
        }
        let _ = offset_size;
        bytes
    }

    #[test]
    fn parses_leaf_chunk_coordinates() {
        let chunk_dims = [10u32, 20];
        let entries = [([0u64, 0], 100u32, 0x1000u64), ([0, 1], 100, 0x2000), ([1, 0], 100, 0x3000)];
        let bytes = leaf_node(&chunk_dims, &entries);
        let source = SliceSource::new(&bytes);
        let all = collect_all(&source, 0, 8, &chunk_dims).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].key.scaled_coords, vec![0, 0]);
        assert_eq!(all[1].key.scaled_coords, vec![0, 1]);
        assert_eq!(all[2].key.scaled_coords, vec![1, 0]);
        assert_eq!(all[0].address, 0x1000);
    }

    #[test]
    fn rejects_zero_chunk_dimension() {
        let chunk_dims = [0u32, 20];
        let entries = [([0u64, 0], 100u32, 0x1000u64)];
        let bytes = leaf_node(&[10, 20], &entries);
        let source = SliceSource::new(&bytes);
        assert!(collect_all(&source, 0, 8, &chunk_dims).is_err());
    }
}
