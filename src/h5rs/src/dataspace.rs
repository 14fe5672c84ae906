//! Dataspace message decoder (type code 0x01).

use crate::error::{Error, Result};
use crate::primitives::require_len;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataspaceType {
    Scalar,
    Simple,
    Null,
}

#[derive(Debug, Clone)]
pub struct Dataspace {
    pub space_type: DataspaceType,
    pub dimensions: Vec<u64>,
    pub max_dimensions: Option<Vec<u64>>,
}

impl Dataspace {
    pub fn total_elements(&self) -> u64 {
        match self.space_type {
            DataspaceType::Null => 0,
            DataspaceType::Scalar => 1,
            DataspaceType::Simple => self.dimensions.iter().product(),
        }
    }

    pub fn decode(bytes: &[u8], offset: u64) -> Result<Self> {
        require_len(bytes, 1, "dataspace version", offset)?;
        let version = bytes[0];

        let (dimensionality, flags, space_type, header_len): (u8, u8, u8, usize) = match version {
            1 => {
                require_len(bytes, 8, "dataspace v1 header", offset)?;
                let dimensionality = bytes[1];
                let flags = bytes[2];
                // bytes[3..8] reserved
                let space_type = if dimensionality == 0 { 0 } else { 1 };
                (dimensionality, flags, space_type, 8)
            }
            2 => {
                require_len(bytes, 4, "dataspace v2 header", offset)?;
                let dimensionality = bytes[1];
                let flags = bytes[2];
                let space_type = bytes[3];
                (dimensionality, flags, space_type, 4)
            }
            other => {
                return Err(Error::format(
                    offset,
                    format!("unsupported dataspace version {other}"),
                ))
            }
        };

        let space_type = match space_type {
            0 => DataspaceType::Scalar,
            1 => DataspaceType::Simple,
            2 => DataspaceType::Null,
            other => {
                return Err(Error::format(
                    offset,
                    format!("unknown dataspace type {other}"),
                ))
            }
        };

        let rest = &bytes[header_len..];
        let has_max_dims = flags & 0x1 != 0;
        let dim_count = dimensionality as usize;

        let width = detect_dimension_width(rest, dim_count, has_max_dims, offset)?;

        let mut cursor = rest;
        let dimensions = read_dims(&mut cursor, dim_count, width, offset)?;
        let max_dimensions = if has_max_dims {
            Some(read_dims(&mut cursor, dim_count, width, offset)?)
        } else {
            None
        };

        Ok(Dataspace {
            space_type,
            dimensions,
            max_dimensions,
        })
    }
}

/// Version-1 dataspace encodings in the wild use either 4- or 8-byte
/// per-dimension widths with no explicit tag; this auto-detects by checking
/// which width's implied length actually fits the remaining buffer,
/// preferring 8 when both would fit. Fragile by nature; real files depend
/// on this heuristic, so it is kept rather than replaced with a stricter
/// check that would reject them.
fn detect_dimension_width(
    rest: &[u8],
    dim_count: usize,
    has_max_dims: bool,
    offset: u64,
) -> Result<usize> {
    if dim_count == 0 {
        return Ok(8);
    }
    let multiplier = if has_max_dims { 2 } else { 1 };
    let needed8 = dim_count * multiplier * 8;
    let needed4 = dim_count * multiplier * 4;
    if rest.len() >= needed8 {
        Ok(8)
    } else if rest.len() >= needed4 {
        Ok(4)
    } else {
        Err(Error::truncation(
            "dataspace dimensions",
            offset,
            needed4 as u64,
            rest.len() as u64,
        ))
    }
}

fn read_dims(cursor: &mut &[u8], count: usize, width: usize, offset: u64) -> Result<Vec<u64>> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        require_len(cursor, width, "dataspace dimension", offset)?;
        let value = match width {
            4 => u32::from_le_bytes(cursor[..4].try_into().unwrap()) as u64,
            8 => u64::from_le_bytes(cursor[..8].try_into().unwrap()),
            _ => unreachable!("width is always 4 or 8"),
        };
        out.push(value);
        *cursor = &cursor[width..];
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_has_one_element() {
        let bytes = [1u8, 0, 0, 0, 0, 0, 0, 0];
        let ds = Dataspace::decode(&bytes, 0).unwrap();
        assert_eq!(ds.space_type, DataspaceType::Scalar);
        assert_eq!(ds.total_elements(), 1);
    }

    #[test]
    fn simple_two_dims_product() {
        let mut bytes = vec![1u8, 2, 0, 0, 0, 0, 0, 0];
        bytes.extend_from_slice(&5u64.to_le_bytes());
        bytes.extend_from_slice(&7u64.to_le_bytes());
        let ds = Dataspace::decode(&bytes, 0).unwrap();
        assert_eq!(ds.dimensions, vec![5, 7]);
        assert_eq!(ds.total_elements(), 35);
    }

    #[test]
    fn null_space_has_zero_elements() {
        let bytes = [2u8, 0, 2, 0];
        let ds = Dataspace::decode(&bytes, 0).unwrap();
        assert_eq!(ds.space_type, DataspaceType::Null);
        assert_eq!(ds.total_elements(), 0);
    }
}
