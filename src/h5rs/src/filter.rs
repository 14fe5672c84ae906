//! Filter pipeline message (type code 0x0B) and chunk-read application.
//!
//! Deflate is decoded with `flate2`'s zlib decoder rather than a hand-rolled
//! inflate, the same way a dedicated compression crate gets reached for
//! elsewhere in this crate.

use crate::checksum::fletcher32;
use crate::error::{Error, Result};
use crate::primitives::require_len;
use std::io::Read;
use tracing::warn;

pub const FILTER_DEFLATE: u16 = 1;
pub const FILTER_SHUFFLE: u16 = 2;
pub const FILTER_FLETCHER32: u16 = 3;
pub const FILTER_SZIP: u16 = 4;

#[derive(Debug, Clone)]
pub struct FilterDescriptor {
    pub id: u16,
    pub flags: u16,
    pub client_data: Vec<u32>,
}

impl FilterDescriptor {
    pub fn is_optional(&self) -> bool {
        self.flags & 0x1 != 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterPipeline {
    pub filters: Vec<FilterDescriptor>,
}

impl FilterPipeline {
    pub fn decode(bytes: &[u8], offset: u64) -> Result<Self> {
        require_len(bytes, 2, "filter pipeline header", offset)?;
        let version = bytes[0];
        let num_filters = bytes[1] as usize;
        let mut rest = if version == 1 {
            require_len(bytes, 4, "filter pipeline v1 header", offset)?;
            &bytes[4..]
        } else {
            &bytes[2..]
        };

        let mut filters = Vec::with_capacity(num_filters);
        for _ in 0..num_filters {
            require_len(rest, 2, "filter id", offset)?;
            let id = u16::from_le_bytes(rest[0..2].try_into().unwrap());
            rest = &rest[2..];

            let mut name_len = 0usize;
            if version == 1 || id >= 256 {
                require_len(rest, 2, "filter name length", offset)?;
                name_len = u16::from_le_bytes(rest[0..2].try_into().unwrap()) as usize;
                rest = &rest[2..];
            }

            require_len(rest, 2, "filter flags", offset)?;
            let flags = u16::from_le_bytes(rest[0..2].try_into().unwrap());
            rest = &rest[2..];

            require_len(rest, 2, "filter client data count", offset)?;
            let data_count = u16::from_le_bytes(rest[0..2].try_into().unwrap()) as usize;
            rest = &rest[2..];

            if name_len > 0 {
                let padded = ((name_len + 7) / 8) * 8;
                require_len(rest, padded, "filter name", offset)?;
                rest = &rest[padded..];
            }

            let mut client_data = Vec::with_capacity(data_count);
            for _ in 0..data_count {
                require_len(rest, 4, "filter client data", offset)?;
                client_data.push(u32::from_le_bytes(rest[0..4].try_into().unwrap()));
                rest = &rest[4..];
            }
            if version == 1 && data_count % 2 == 1 {
                // Padded to a multiple of 4 bytes in version 1.
                require_len(rest, 4, "filter client data padding", offset)?;
                rest = &rest[4..];
            }

            filters.push(FilterDescriptor {
                id,
                flags,
                client_data,
            });
        }

        Ok(FilterPipeline { filters })
    }

    /// Applies the pipeline in reverse of its write order, as required on
    /// read.
    pub fn apply(&self, mut data: Vec<u8>) -> Result<Vec<u8>> {
        for filter in self.filters.iter().rev() {
            data = match apply_one(filter, data) {
                Ok(decoded) => decoded,
                Err(err) if filter.is_optional() => {
                    warn!(filter_id = filter.id, error = %err, "bypassing optional filter");
                    continue;
                }
                Err(err) => return Err(err),
            };
        }
        Ok(data)
    }
}

fn apply_one(filter: &FilterDescriptor, data: Vec<u8>) -> Result<Vec<u8>> {
    match filter.id {
        FILTER_DEFLATE => inflate_zlib(&data),
        FILTER_SHUFFLE => unshuffle(&data, filter.client_data.first().copied().unwrap_or(1)),
        FILTER_FLETCHER32 => verify_and_strip_fletcher32(&data),
        FILTER_SZIP => Err(Error::unsupported("SZIP filter")),
        other => Err(Error::unsupported(format!("filter id {other}"))),
    }
}

fn inflate_zlib(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Inverse of the write-side byte-interleave: element `i`'s byte `j` lives
/// at position `j * n + i` in the shuffled buffer, where `n` is the element
/// count.
fn unshuffle(data: &[u8], element_size: u32) -> Result<Vec<u8>> {
    let element_size = element_size as usize;
    if element_size == 0 || data.len() % element_size != 0 {
        return Err(Error::format(
            0,
            format!(
                "shuffle input length {} not a multiple of element size {}",
                data.len(),
                element_size
            ),
        ));
    }
    let n = data.len() / element_size;
    let mut out = vec![0u8; data.len()];
    for i in 0..n {
        for j in 0..element_size {
            out[i * element_size + j] = data[j * n + i];
        }
    }
    Ok(out)
}

fn verify_and_strip_fletcher32(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 4 {
        return Err(Error::truncation("fletcher32 chunk", 0, 4, data.len() as u64));
    }
    let (payload, checksum_bytes) = data.split_at(data.len() - 4);
    let stored = u32::from_le_bytes(checksum_bytes.try_into().unwrap());
    let computed = fletcher32(payload);
    if stored != computed {
        return Err(Error::format(
            0,
            format!("fletcher32 mismatch: stored {stored:#x}, computed {computed:#x}"),
        ));
    }
    Ok(payload.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shuffle_is_an_involution() {
        let original = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        let element_size = 2u32;
        // Build the shuffled form by hand (forward transform) and confirm
        // unshuffle recovers the original.
        let n = original.len() / element_size as usize;
        let mut shuffled = vec![0u8; original.len()];
        for i in 0..n {
            for j in 0..element_size as usize {
                shuffled[j * n + i] = original[i * element_size as usize + j];
            }
        }
        let recovered = unshuffle(&shuffled, element_size).unwrap();
        assert_eq!(recovered, original);
    }

    #[test]
    fn fletcher32_strips_valid_checksum() {
        let payload = b"abcde".to_vec();
        let checksum = fletcher32(&payload);
        let mut chunk = payload.clone();
        chunk.extend_from_slice(&checksum.to_le_bytes());
        let result = verify_and_strip_fletcher32(&chunk).unwrap();
        assert_eq!(result, payload);
    }

    #[test]
    fn fletcher32_rejects_corruption() {
        let payload = b"abcde".to_vec();
        let mut chunk = payload;
        chunk.extend_from_slice(&0u32.to_le_bytes());
        assert!(verify_and_strip_fletcher32(&chunk).is_err());
    }

    #[test]
    fn optional_filter_failure_is_bypassed() {
        let pipeline = FilterPipeline {
            filters: vec![FilterDescriptor {
                id: FILTER_SZIP,
                flags: 1,
                client_data: vec![],
            }],
        };
        let data = vec![1, 2, 3];
        let result = pipeline.apply(data.clone()).unwrap();
        assert_eq!(result, data);
    }

    #[test]
    fn required_filter_failure_aborts() {
        let pipeline = FilterPipeline {
            filters: vec![FilterDescriptor {
                id: FILTER_SZIP,
                flags: 0,
                client_data: vec![],
            }],
        };
        assert!(pipeline.apply(vec![1, 2, 3]).is_err());
    }
}
