//! Dataset read orchestrator: from an object header's typed messages,
//! selects the compact/contiguous/chunked path, drives B-tree traversal and
//! filter application, reassembles the N-D chunk layout into a flat buffer,
//! and converts raw element bytes into a host-typed sequence.
//!
//! This is the component the rest of the crate exists to feed: primitives
//! (byte decode), the message table (datatype/dataspace/layout/filter), and
//! the B-tree all come together here exactly once per dataset read.

use crate::btree;
use crate::datatype::{Datatype, DatatypeClass};
use crate::dataspace::Dataspace;
use crate::error::{Error, Result};
use crate::filter::FilterPipeline;
use crate::global_heap;
use crate::layout::Layout;
use crate::message::{require_message_payload, Message, MessageType};
use crate::object_header::ObjectHeader;
use crate::primitives::{
    read_uint, safe_multiply, validate_buffer_size, BufferPool, Endianness, ReadLimits,
};
use crate::superblock::Superblock;
use crate::byte_source::ByteSource;

/// The decoded, but not yet materialized, shape of a dataset: its element
/// type, rank/extent, and storage class.
#[derive(Debug, Clone)]
pub struct DatasetMetadata {
    pub datatype: Datatype,
    pub dataspace: Dataspace,
    pub layout: Layout,
    pub filter_pipeline: Option<FilterPipeline>,
}

impl DatasetMetadata {
    /// Scans `header`'s messages once for the datatype, dataspace, layout,
    /// and optional filter-pipeline payloads. Missing datatype, dataspace,
    /// or layout is a hard error; a dataset cannot be read without them.
    pub fn from_header(header: &ObjectHeader, offset_size: u8) -> Result<Self> {
        find(header, offset_size)
    }
}

fn find(header: &ObjectHeader, offset_size: u8) -> Result<DatasetMetadata> {
    let datatype_payload = require_message_payload(&header.messages, MessageType::Datatype)?;
    let datatype = Datatype::decode(datatype_payload, message_offset(&header.messages, MessageType::Datatype))?;

    let dataspace_payload = require_message_payload(&header.messages, MessageType::Dataspace)?;
    let dataspace = Dataspace::decode(
        dataspace_payload,
        message_offset(&header.messages, MessageType::Dataspace),
    )?;

    let layout_payload = require_message_payload(&header.messages, MessageType::DataLayout)?;
    let layout = Layout::decode(
        layout_payload,
        offset_size,
        message_offset(&header.messages, MessageType::DataLayout),
    )?;

    let filter_pipeline = header
        .messages
        .iter()
        .find(|m| m.is(MessageType::FilterPipeline))
        .map(|m| FilterPipeline::decode(&m.payload, m.offset))
        .transpose()?;

    Ok(DatasetMetadata {
        datatype,
        dataspace,
        layout,
        filter_pipeline,
    })
}

fn message_offset(messages: &[Message], message_type: MessageType) -> u64 {
    messages
        .iter()
        .find(|m| m.is(message_type))
        .map(|m| m.offset)
        .unwrap_or(0)
}

/// A dataset's materialized contents: a homogeneous float64 sequence for
/// numeric element types, or a string sequence for fixed and variable-length
/// string element types.
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetValues {
    Float64(Vec<f64>),
    Strings(Vec<String>),
}

/// Reads a dataset's full contents, given its already-parsed object header
/// and the file's superblock.
pub fn read_dataset(
    source: &dyn ByteSource,
    header: &ObjectHeader,
    superblock: &Superblock,
    limits: &ReadLimits,
) -> Result<DatasetValues> {
    let metadata = DatasetMetadata::from_header(header, superblock.offset_size)?;
    let total_elements = metadata.dataspace.total_elements();

    if total_elements == 0 {
        return Ok(if metadata.datatype.is_fixed_string() || metadata.datatype.is_vlen_string() {
            DatasetValues::Strings(Vec::new())
        } else {
            DatasetValues::Float64(Vec::new())
        });
    }

    let pool = BufferPool::new();
    let raw = read_raw_bytes(source, &metadata, superblock, limits, &pool)?;
    convert(source, &raw, &metadata.datatype, total_elements, superblock)
}

fn read_raw_bytes(
    source: &dyn ByteSource,
    metadata: &DatasetMetadata,
    superblock: &Superblock,
    limits: &ReadLimits,
    pool: &BufferPool,
) -> Result<Vec<u8>> {
    match &metadata.layout {
        Layout::Compact { data } => Ok(data.clone()),
        Layout::Contiguous { address, size } => {
            validate_buffer_size(*size, limits.max_dataset_size, "contiguous dataset")?;
            let mut buf = vec![0u8; *size as usize];
            source.read_exact_at(&mut buf, *address)?;
            Ok(buf)
        }
        Layout::Chunked {
            btree_address,
            chunk_dims,
        } => read_chunked(
            source,
            *btree_address,
            chunk_dims,
            &metadata.dataspace,
            metadata.datatype.size as u64,
            &metadata.filter_pipeline,
            superblock,
            limits,
            pool,
        ),
    }
}

fn read_chunked(
    source: &dyn ByteSource,
    btree_address: u64,
    chunk_dims_raw: &[u32],
    dataspace: &Dataspace,
    element_size: u64,
    filter_pipeline: &Option<FilterPipeline>,
    superblock: &Superblock,
    limits: &ReadLimits,
    pool: &BufferPool,
) -> Result<Vec<u8>> {
    let rank = dataspace.dimensions.len();
    // The chunk-dim array may carry one extra trailing entry (the element
    // byte size); truncate to the dataspace's rank for coordinate math.
    let chunk_dims: Vec<u32> = chunk_dims_raw.iter().take(rank).copied().collect();
    if chunk_dims.len() != rank {
        return Err(Error::format(
            0,
            "chunk dimensionality does not cover dataspace rank",
        ));
    }

    let total_elements = dataspace.total_elements();
    let total_bytes = safe_multiply(total_elements, element_size, "dataset buffer size")?;
    validate_buffer_size(total_bytes, limits.max_dataset_size, "dataset")?;
    let mut out = vec![0u8; total_bytes as usize];

    let entries = btree::collect_all(source, btree_address, superblock.offset_size, &chunk_dims)?;
    for entry in entries {
        validate_buffer_size(entry.key.num_bytes as u64, limits.max_chunk_size, "chunk")?;
        // Scratch space for the as-stored (possibly filtered) chunk bytes is
        // borrowed from the pool and returned on every exit path, including
        // the `?` below, since `raw`'s drop runs regardless.
        let mut raw = pool.acquire(entry.key.num_bytes as usize);
        source.read_exact_at(&mut raw, entry.address)?;
        match filter_pipeline {
            Some(pipeline) => {
                let decoded = pipeline.apply(raw.to_vec())?;
                copy_chunk_into(
                    &decoded,
                    &entry.key.scaled_coords,
                    &chunk_dims,
                    &dataspace.dimensions,
                    element_size,
                    &mut out,
                )?;
            }
            None => {
                copy_chunk_into(
                    &raw,
                    &entry.key.scaled_coords,
                    &chunk_dims,
                    &dataspace.dimensions,
                    element_size,
                    &mut out,
                )?;
            }
        }
    }

    Ok(out)
}

fn row_major_strides(dims: &[u64]) -> Vec<u64> {
    let mut strides = vec![1u64; dims.len()];
    for i in (0..dims.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * dims[i + 1];
    }
    strides
}

/// Copies one decoded chunk into its N-D position in `out`. Per-dimension
/// copy lengths are `min(chunk_dim[i], dataset_dim[i] - coord[i]*chunk_dim[i])`
/// so chunks that overhang the dataset boundary only contribute their live
/// portion. Walked iteratively over an indices array (all but the innermost
/// axis) rather than recursively, so rank is not bounded by stack depth.
fn copy_chunk_into(
    chunk_data: &[u8],
    scaled_coords: &[u64],
    chunk_dims: &[u32],
    dataset_dims: &[u64],
    element_size: u64,
    out: &mut [u8],
) -> Result<()> {
    let ndims = chunk_dims.len();
    if ndims == 0 {
        require_bytes(chunk_data, element_size as usize)?;
        require_bytes(out, element_size as usize)?;
        out[..element_size as usize].copy_from_slice(&chunk_data[..element_size as usize]);
        return Ok(());
    }

    let mut copy_len = vec![0u64; ndims];
    for i in 0..ndims {
        let start = scaled_coords[i] * chunk_dims[i] as u64;
        if start >= dataset_dims[i] {
            return Ok(());
        }
        copy_len[i] = (dataset_dims[i] - start).min(chunk_dims[i] as u64);
    }

    let chunk_dims_u64: Vec<u64> = chunk_dims.iter().map(|&d| d as u64).collect();
    let chunk_strides = row_major_strides(&chunk_dims_u64);
    let dataset_strides = row_major_strides(dataset_dims);

    let outer = ndims - 1;
    let mut idx = vec![0u64; outer];
    let run_elements = copy_len[outer];
    let run_bytes = (run_elements * element_size) as usize;

    loop {
        let mut chunk_elem_offset = 0u64;
        let mut dataset_elem_offset = 0u64;
        for d in 0..outer {
            chunk_elem_offset += idx[d] * chunk_strides[d];
            dataset_elem_offset += (scaled_coords[d] * chunk_dims[d] as u64 + idx[d]) * dataset_strides[d];
        }
        dataset_elem_offset += scaled_coords[outer] * chunk_dims[outer] as u64 * dataset_strides[outer];

        let chunk_byte_off = (chunk_elem_offset * element_size) as usize;
        let dataset_byte_off = (dataset_elem_offset * element_size) as usize;

        require_bytes(&chunk_data[chunk_byte_off..], run_bytes)?;
        require_bytes(&out[dataset_byte_off..], run_bytes)?;
        out[dataset_byte_off..dataset_byte_off + run_bytes]
            .copy_from_slice(&chunk_data[chunk_byte_off..chunk_byte_off + run_bytes]);

        if !advance(&mut idx, &copy_len[..outer]) {
            break;
        }
    }

    Ok(())
}

/// Odometer-style increment over `idx` bounded by `limits`; returns `false`
/// once every combination has been visited.
fn advance(idx: &mut [u64], limits: &[u64]) -> bool {
    for d in (0..idx.len()).rev() {
        idx[d] += 1;
        if idx[d] < limits[d] {
            return true;
        }
        idx[d] = 0;
    }
    false
}

fn require_bytes(bytes: &[u8], needed: usize) -> Result<()> {
    if bytes.len() < needed {
        return Err(Error::truncation("chunk copy", 0, needed as u64, bytes.len() as u64));
    }
    Ok(())
}

fn convert(
    source: &dyn ByteSource,
    raw: &[u8],
    datatype: &Datatype,
    count: u64,
    superblock: &Superblock,
) -> Result<DatasetValues> {
    if datatype.is_fixed_string() {
        return Ok(DatasetValues::Strings(convert_fixed_strings(raw, datatype, count)?));
    }
    if datatype.is_vlen_string() {
        return Ok(DatasetValues::Strings(convert_vlen_strings(
            source, raw, count, superblock,
        )?));
    }
    Ok(DatasetValues::Float64(convert_numeric(raw, datatype, count)?))
}

fn convert_fixed_strings(raw: &[u8], datatype: &Datatype, count: u64) -> Result<Vec<String>> {
    let size = datatype.size as usize;
    let padding = datatype.bitfield.string_padding();
    let mut out = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        require_bytes(&raw[i * size..], size)?;
        let slice = &raw[i * size..i * size + size];
        out.push(trim_fixed_string(slice, padding));
    }
    Ok(out)
}

fn trim_fixed_string(slice: &[u8], padding: crate::datatype::StringPadding) -> String {
    use crate::datatype::StringPadding;
    let trimmed = match padding {
        StringPadding::NullTerminated => {
            let end = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
            &slice[..end]
        }
        StringPadding::NullPadded => {
            let end = slice.iter().rposition(|&b| b != 0).map(|p| p + 1).unwrap_or(0);
            &slice[..end]
        }
        StringPadding::SpacePadded => {
            let end = slice.iter().rposition(|&b| b != b' ').map(|p| p + 1).unwrap_or(0);
            &slice[..end]
        }
    };
    String::from_utf8_lossy(trimmed).into_owned()
}

/// Variable-length string descriptor layout: a 4-byte length (unused here;
/// the global heap object carries its own size), an `offset_size`-wide
/// global-heap collection address, and a 4-byte object index within it.
fn convert_vlen_strings(
    source: &dyn ByteSource,
    raw: &[u8],
    count: u64,
    superblock: &Superblock,
) -> Result<Vec<String>> {
    let os = superblock.offset_size as usize;
    let elem_size = 4 + os + 4;
    let mut out = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        require_bytes(&raw[i * elem_size..], elem_size)?;
        let elem = &raw[i * elem_size..i * elem_size + elem_size];
        let heap_address = read_uint(&elem[4..4 + os], Endianness::Little)?;
        let index = u32::from_le_bytes(elem[4 + os..4 + os + 4].try_into().unwrap());
        let bytes = global_heap::read_object(source, heap_address, superblock.length_size, index)?;
        out.push(String::from_utf8_lossy(&bytes).into_owned());
    }
    Ok(out)
}

fn convert_numeric(raw: &[u8], datatype: &Datatype, count: u64) -> Result<Vec<f64>> {
    let size = datatype.size as usize;
    let endianness = datatype.bitfield.endianness();
    let mut out = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        require_bytes(&raw[i * size..], size)?;
        let slice = &raw[i * size..i * size + size];
        out.push(convert_one(slice, datatype, endianness)?);
    }
    Ok(out)
}

fn convert_one(slice: &[u8], datatype: &Datatype, endianness: Endianness) -> Result<f64> {
    match datatype.class {
        DatatypeClass::Fixed => {
            let bits = read_uint(slice, endianness)?;
            if datatype.bitfield.is_signed() {
                let width_bits = slice.len() * 8;
                let signed = sign_extend(bits, width_bits);
                Ok(signed as f64)
            } else {
                Ok(bits as f64)
            }
        }
        DatatypeClass::Float if datatype.size == 8 => {
            let bits = read_uint(slice, endianness)?;
            Ok(f64::from_bits(bits))
        }
        DatatypeClass::Float if datatype.size == 4 => {
            let bits = read_uint(slice, endianness)? as u32;
            Ok(f32::from_bits(bits) as f64)
        }
        DatatypeClass::Float if datatype.is_bfloat16() => {
            let bits = read_uint(slice, endianness)? as u16;
            Ok(crate::microfloat::bf16_bits_to_f32(bits) as f64)
        }
        DatatypeClass::Float if datatype.is_fp8_e4m3() => {
            Ok(crate::microfloat::e4m3_to_f32(slice[0]) as f64)
        }
        DatatypeClass::Float if datatype.is_fp8_e5m2() => {
            Ok(crate::microfloat::e5m2_to_f32(slice[0]) as f64)
        }
        other => Err(Error::unsupported(format!(
            "element conversion for datatype class {other:?} size {}",
            datatype.size
        ))),
    }
}

fn sign_extend(bits: u64, width_bits: usize) -> i64 {
    if width_bits >= 64 {
        return bits as i64;
    }
    let shift = 64 - width_bits;
    ((bits << shift) as i64) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_source::SliceSource;
    use crate::datatype::ClassBitfield;

    fn int32_datatype() -> Datatype {
        Datatype {
            class: DatatypeClass::Fixed,
            version: 1,
            bitfield: ClassBitfield(0b1000), // signed, little-endian
            size: 4,
            members: vec![],
        }
    }

    fn float64_datatype() -> Datatype {
        Datatype {
            class: DatatypeClass::Float,
            version: 1,
            bitfield: ClassBitfield(0),
            size: 8,
            members: vec![],
        }
    }

    #[test]
    fn converts_signed_int32_with_sign_extension() {
        let raw = (-5i32).to_le_bytes();
        let values = convert_numeric(&raw, &int32_datatype(), 1).unwrap();
        assert_eq!(values, vec![-5.0]);
    }

    #[test]
    fn converts_float64_identity() {
        let raw = 3.5f64.to_le_bytes();
        let values = convert_numeric(&raw, &float64_datatype(), 1).unwrap();
        assert_eq!(values, vec![3.5]);
    }

    #[test]
    fn converts_bfloat16_element() {
        let datatype = Datatype {
            class: DatatypeClass::Float,
            version: 1,
            bitfield: ClassBitfield(0),
            size: 2,
            members: vec![],
        };
        let bits = crate::microfloat::f32_to_bf16_bits(3.5);
        let values = convert_numeric(&bits.to_le_bytes(), &datatype, 1).unwrap();
        assert_eq!(values, vec![3.5]);
    }

    #[test]
    fn converts_fp8_e4m3_element() {
        let datatype = Datatype {
            class: DatatypeClass::Float,
            version: 1,
            bitfield: ClassBitfield(0), // subtype bits 4-7 == 0 -> E4M3
            size: 1,
            members: vec![],
        };
        let values = convert_numeric(&[0b0_0000_000], &datatype, 1).unwrap();
        assert_eq!(values, vec![0.0]);
    }

    #[test]
    fn converts_fp8_e5m2_element() {
        let datatype = Datatype {
            class: DatatypeClass::Float,
            version: 1,
            bitfield: ClassBitfield(0x10), // subtype bits 4-7 nonzero -> E5M2
            size: 1,
            members: vec![],
        };
        let values = convert_numeric(&[0b0_11111_00], &datatype, 1).unwrap();
        assert_eq!(values, vec![f64::INFINITY]);
    }

    #[test]
    fn chunk_copy_handles_partial_boundary_chunk() {
        // dataset_dims=[5,7], chunk_dims=[3,3], chunk at scaled (1,2):
        // covers rows 3..6 (clamped to 3..5), cols 6..9 (clamped to 6..7).
        let dataset_dims = vec![5u64, 7];
        let chunk_dims = [3u32, 3];
        let chunk_data: Vec<u8> = vec![1, 2, 3, 4, 5, 6, 7, 8, 9];
        let element_size = 1u64;
        let mut out = vec![0u8; 5 * 7];

        copy_chunk_into(&chunk_data, &[1, 2], &chunk_dims, &dataset_dims, element_size, &mut out)
            .unwrap();

        let strides = row_major_strides(&dataset_dims);
        let at = |r: u64, c: u64| out[(r * strides[0] + c * strides[1]) as usize];
        assert_eq!(at(3, 6), 1);
        assert_eq!(at(4, 6), 4);
    }

    #[test]
    fn fixed_string_trims_by_padding_rule() {
        use crate::datatype::StringPadding;
        assert_eq!(trim_fixed_string(b"abc\0\0\0", StringPadding::NullTerminated), "abc");
        assert_eq!(trim_fixed_string(b"abc\0\0\0", StringPadding::NullPadded), "abc");
        assert_eq!(trim_fixed_string(b"abc   ", StringPadding::SpacePadded), "abc");
    }

    #[test]
    fn vlen_string_resolves_through_global_heap() {
        // Build a tiny global heap with one object "hi", referenced by a
        // vlen descriptor at heap address 0, index 1.
        let payload = b"hi";
        let padded_len = ((payload.len() + 7) / 8) * 8;
        let mut entry = vec![0u8; 16];
        entry[0..2].copy_from_slice(&1u16.to_le_bytes());
        entry[8..16].copy_from_slice(&(payload.len() as u64).to_le_bytes());
        let mut body = entry;
        body.extend_from_slice(payload);
        body.resize(16 + padded_len, 0);
        let collection_size = (16 + body.len()) as u64;
        let mut heap_bytes = Vec::new();
        heap_bytes.extend_from_slice(b"GCOL");
        heap_bytes.extend_from_slice(&[0u8; 4]);
        heap_bytes.extend_from_slice(&collection_size.to_le_bytes());
        heap_bytes.extend_from_slice(&body);

        let source = SliceSource::new(&heap_bytes);
        let superblock = crate::superblock::Superblock {
            version: 2,
            endianness: Endianness::Little,
            offset_size: 8,
            length_size: 8,
            base_address: 0,
            super_extension_address: u64::MAX,
            root_group_address: 0,
            root_btree_address: None,
            root_heap_address: None,
            checksum_algorithm: crate::superblock::ChecksumAlgorithm::None,
        };

        let mut descriptor = vec![0u8; 16]; // length(4) + heap addr(8) + index(4)
        descriptor[4..12].copy_from_slice(&0u64.to_le_bytes());
        descriptor[12..16].copy_from_slice(&1u32.to_le_bytes());

        let strings = convert_vlen_strings(&source, &descriptor, 1, &superblock).unwrap();
        assert_eq!(strings, vec!["hi".to_string()]);
    }
}
