//! A pure, CGo-free reader (and partial writer) for the HDF5 hierarchical
//! scientific-data container format: superblock recognition, object-header
//! message decoding, B-tree v1 chunk indexing, filter pipelines, and
//! conversion of chunked/contiguous/compact storage into host-typed
//! buffers.
//!
//! The dense-attribute path (fractal heap + B-tree v2 iteration), virtual
//! datasets, variable-length sequences (non-string), SZIP, and full write
//! conformance with the reference library are out of scope; see each
//! module's doc comment for the specific boundary.

pub mod attribute;
pub mod btree;
pub mod byte_source;
pub mod checksum;
pub mod dataset;
pub mod dataspace;
pub mod datatype;
pub mod error;
pub mod filter;
pub mod global_heap;
pub mod layout;
pub mod link;
pub mod message;
pub mod microfloat;
pub mod object_header;
pub mod primitives;
pub mod superblock;
pub mod symbol_table;
pub mod writer;

pub use attribute::{Attribute, AttributeInfo};
pub use btree::{collect_all as btree_collect_all, lookup as btree_lookup, ChunkEntry, ChunkKey};
pub use byte_source::{ByteSource, FileSource, SliceSource};
pub use dataset::{read_dataset, DatasetMetadata, DatasetValues};
pub use dataspace::{Dataspace, DataspaceType};
pub use datatype::{ClassBitfield, CompoundMember, Datatype, DatatypeClass, StringPadding};
pub use error::{Error, Result};
pub use filter::{FilterDescriptor, FilterPipeline};
pub use layout::Layout;
pub use link::{Link, LinkValue};
pub use message::{Message, MessageType};
pub use object_header::{ObjectHeader, ObjectType};
pub use primitives::{BufferPool, Endianness, PooledBuffer, ReadLimits};
pub use superblock::{ChecksumAlgorithm, Superblock};
pub use symbol_table::SymbolTableMessage;

/// Opens the file-wide superblock from `source`, per §6's "open a
/// superblock from a byte source" contract.
pub fn open_superblock(source: &dyn ByteSource) -> Result<Superblock> {
    Superblock::read(source)
}

/// Reads the object header at `address`: its typed message list, classified
/// object type, and discovered compact attributes. `offset_size` comes from
/// the file's superblock.
pub fn read_object_header(
    source: &dyn ByteSource,
    address: u64,
    offset_size: u8,
) -> Result<ObjectHeader> {
    ObjectHeader::read(source, address, offset_size)
}
