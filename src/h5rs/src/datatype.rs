//! Datatype message decoder (type code 0x03).
//!
//! The class bitfield is a newtype around the raw packed bits with named
//! accessor methods rather than a bag of loose integers, so each
//! class-dependent bit meaning (endianness, string padding, VL subtype,
//! signedness) has one place to look it up.

use crate::error::{Error, Result};
use crate::primitives::{require_len, Endianness};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatatypeClass {
    Fixed,
    Float,
    Time,
    String,
    Bitfield,
    Opaque,
    Compound,
    Reference,
    Enum,
    VariableLength,
    Array,
}

impl DatatypeClass {
    fn from_code(code: u8, offset: u64) -> Result<Self> {
        Ok(match code {
            0 => DatatypeClass::Fixed,
            1 => DatatypeClass::Float,
            2 => DatatypeClass::Time,
            3 => DatatypeClass::String,
            4 => DatatypeClass::Bitfield,
            5 => DatatypeClass::Opaque,
            6 => DatatypeClass::Compound,
            7 => DatatypeClass::Reference,
            8 => DatatypeClass::Enum,
            9 => DatatypeClass::VariableLength,
            10 => DatatypeClass::Array,
            other => {
                return Err(Error::format(
                    offset,
                    format!("unknown datatype class {other}"),
                ))
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringPadding {
    NullTerminated,
    NullPadded,
    SpacePadded,
}

/// Class bitfield, 3 bytes, interpreted per [`DatatypeClass`].
#[derive(Debug, Clone, Copy)]
pub struct ClassBitfield(pub u32);

impl ClassBitfield {
    pub fn endianness(&self) -> Endianness {
        if self.0 & 0x1 == 0 {
            Endianness::Little
        } else {
            Endianness::Big
        }
    }

    pub fn string_padding(&self) -> StringPadding {
        match self.0 & 0xF {
            0 => StringPadding::NullTerminated,
            1 => StringPadding::NullPadded,
            _ => StringPadding::SpacePadded,
        }
    }

    /// VL subtype 1 means the variable-length class's payload is a string
    /// rather than a sequence.
    pub fn is_vlen_string(&self) -> bool {
        (self.0 & 0xF) == 1
    }

    /// Fixed-point class bit 3: 0 = unsigned, 1 = two's complement signed.
    pub fn is_signed(&self) -> bool {
        (self.0 >> 3) & 0x1 != 0
    }
}

#[derive(Debug, Clone)]
pub struct CompoundMember {
    pub name: String,
    pub byte_offset: u32,
    pub member_type: Box<Datatype>,
}

#[derive(Debug, Clone)]
pub struct Datatype {
    pub class: DatatypeClass,
    pub version: u8,
    pub bitfield: ClassBitfield,
    pub size: u32,
    pub members: Vec<CompoundMember>,
}

impl Datatype {
    pub fn is_fixed_int(&self, width: u32) -> bool {
        self.class == DatatypeClass::Fixed && self.size == width
    }

    pub fn is_float32(&self) -> bool {
        self.class == DatatypeClass::Float && self.size == 4
    }

    pub fn is_float64(&self) -> bool {
        self.class == DatatypeClass::Float && self.size == 8
    }

    /// A 2-byte Float-class element is always bfloat16 here: the format has
    /// no standard encoding for a half-width float at that size, so a
    /// 2-byte Float is unambiguous.
    pub fn is_bfloat16(&self) -> bool {
        self.class == DatatypeClass::Float && self.size == 2
    }

    /// A 1-byte Float-class element's micro-float layout (E4M3 vs E5M2) is
    /// not otherwise distinguishable from the class bitfield bits the format
    /// defines for ordinary floats, so this reuses the otherwise-unused bits
    /// 4-7 (the string class's charset bits) as a subtype selector: 0 for
    /// E4M3, nonzero for E5M2. See the design notes for this resolved
    /// ambiguity.
    pub fn is_fp8_e4m3(&self) -> bool {
        self.class == DatatypeClass::Float && self.size == 1 && (self.bitfield.0 >> 4) & 0xF == 0
    }

    pub fn is_fp8_e5m2(&self) -> bool {
        self.class == DatatypeClass::Float && self.size == 1 && (self.bitfield.0 >> 4) & 0xF != 0
    }

    pub fn is_fixed_string(&self) -> bool {
        self.class == DatatypeClass::String
    }

    pub fn is_vlen_string(&self) -> bool {
        self.class == DatatypeClass::VariableLength && self.bitfield.is_vlen_string()
    }

    pub fn is_compound(&self) -> bool {
        self.class == DatatypeClass::Compound
    }

    /// Decodes a datatype message payload at the given file offset (used
    /// only for diagnostics in errors).
    pub fn decode(bytes: &[u8], offset: u64) -> Result<Self> {
        require_len(bytes, 8, "datatype header", offset)?;
        let class_and_version = bytes[0];
        let class = DatatypeClass::from_code(class_and_version & 0x0F, offset)?;
        let version = (class_and_version >> 4) & 0x0F;
        let bitfield = ClassBitfield(
            bytes[1] as u32 | ((bytes[2] as u32) << 8) | ((bytes[3] as u32) << 16),
        );
        let size = u32::from_le_bytes(bytes[4..8].try_into().unwrap());

        let mut members = Vec::new();
        if class == DatatypeClass::Compound {
            members = decode_compound_members(&bytes[8..], version, offset)?;
        }

        Ok(Datatype {
            class,
            version,
            bitfield,
            size,
            members,
        })
    }
}

fn decode_compound_members(
    mut bytes: &[u8],
    version: u8,
    offset: u64,
) -> Result<Vec<CompoundMember>> {
    let mut members = Vec::new();

    while !bytes.is_empty() {
        let name_end = bytes
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::format(offset, "unterminated compound member name"))?;
        let name = String::from_utf8_lossy(&bytes[..name_end]).into_owned();

        let name_field_len = if version == 1 {
            // Null-padded to an 8-byte boundary, including the terminator.
            ((name_end + 1 + 7) / 8) * 8
        } else {
            name_end + 1
        };
        require_len(bytes, name_field_len, "compound member name", offset)?;
        bytes = &bytes[name_field_len..];

        require_len(bytes, 4, "compound member offset", offset)?;
        let byte_offset = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        bytes = &bytes[4..];

        if version == 1 {
            // Dimensionality, 3 reserved bytes, 4 permutation index bytes,
            // 4 reserved bytes, 4 dims (4 bytes each) == 24 bytes total.
            require_len(bytes, 24, "compound member dim info", offset)?;
            bytes = &bytes[24..];
        }

        let member_type = Datatype::decode(bytes, offset)?;
        let consumed = datatype_header_len(&member_type);
        bytes = &bytes[consumed.min(bytes.len())..];

        members.push(CompoundMember {
            name,
            byte_offset,
            member_type: Box::new(member_type),
        });
    }

    Ok(members)
}

/// Best-effort length of the just-decoded datatype's own encoding, used to
/// advance past a nested member. Non-compound members occupy the 8-byte
/// header only; nested compounds are not recursed past in this pass.
fn datatype_header_len(datatype: &Datatype) -> usize {
    if datatype.class == DatatypeClass::Compound {
        8 + datatype.members.len() * 16
    } else {
        8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_fixed_int32_header() {
        let mut bytes = vec![0x10, 0x00, 0x00, 0x00];
        bytes.extend_from_slice(&4u32.to_le_bytes());
        let dt = Datatype::decode(&bytes, 0).unwrap();
        assert_eq!(dt.class, DatatypeClass::Fixed);
        assert_eq!(dt.version, 1);
        assert!(dt.is_fixed_int(4));
    }

    #[test]
    fn decodes_float64_header() {
        let mut bytes = vec![0x11, 0x00, 0x00, 0x00];
        bytes.extend_from_slice(&8u32.to_le_bytes());
        let dt = Datatype::decode(&bytes, 0).unwrap();
        assert!(dt.is_float64());
    }

    #[test]
    fn endianness_bit_selects_big_endian() {
        let mut bytes = vec![0x10, 0x01, 0x00, 0x00];
        bytes.extend_from_slice(&4u32.to_le_bytes());
        let dt = Datatype::decode(&bytes, 0).unwrap();
        assert_eq!(dt.bitfield.endianness(), Endianness::Big);
    }

    #[test]
    fn rejects_unknown_class() {
        let mut bytes = vec![0x1F, 0x00, 0x00, 0x00];
        bytes.extend_from_slice(&4u32.to_le_bytes());
        assert!(Datatype::decode(&bytes, 0).is_err());
    }
}
