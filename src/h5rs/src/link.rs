//! Link message decoder and encoder (type code 0x06).

use crate::error::{Error, Result};
use crate::primitives::{read_address, require_len, Endianness};

#[derive(Debug, Clone)]
pub enum LinkValue {
    Hard { object_header_address: u64 },
    Soft { path: String },
    External { filename: String, object_path: String },
}

#[derive(Debug, Clone)]
pub struct Link {
    pub name: String,
    pub creation_order: Option<u64>,
    pub value: LinkValue,
}

impl Link {
    pub fn decode(bytes: &[u8], offset_size: u8, offset: u64) -> Result<Self> {
        require_len(bytes, 2, "link header", offset)?;
        let version = bytes[0];
        if version != 1 {
            return Err(Error::format(offset, format!("unsupported link version {version}")));
        }
        let flags = bytes[1];
        let mut cursor = 2usize;

        let link_type = if flags & 0x08 != 0 {
            require_len(bytes, cursor + 1, "link type", offset)?;
            let t = bytes[cursor];
            cursor += 1;
            t
        } else {
            0 // hard
        };

        let creation_order = if flags & 0x04 != 0 {
            require_len(bytes, cursor + 8, "link creation order", offset)?;
            let value = u64::from_le_bytes(bytes[cursor..cursor + 8].try_into().unwrap());
            cursor += 8;
            Some(value)
        } else {
            None
        };

        if flags & 0x10 != 0 {
            require_len(bytes, cursor + 1, "link charset", offset)?;
            cursor += 1;
        }

        let length_size: usize = match flags & 0x03 {
            0 => 1,
            1 => 2,
            2 => 4,
            _ => 8,
        };
        require_len(bytes, cursor + length_size, "link name length", offset)?;
        let name_len =
            crate::primitives::read_uint(&bytes[cursor..cursor + length_size], Endianness::Little)?
                as usize;
        cursor += length_size;

        require_len(bytes, cursor + name_len, "link name", offset)?;
        let name = String::from_utf8_lossy(&bytes[cursor..cursor + name_len]).into_owned();
        cursor += name_len;

        let value = match link_type {
            0 => {
                let os = offset_size as usize;
                require_len(bytes, cursor + os, "hard link value", offset)?;
                let address = read_address(&bytes[cursor..], offset_size, Endianness::Little)?;
                LinkValue::Hard {
                    object_header_address: address,
                }
            }
            1 => {
                require_len(bytes, cursor + 2, "soft link length", offset)?;
                let len = u16::from_le_bytes(bytes[cursor..cursor + 2].try_into().unwrap()) as usize;
                cursor += 2;
                require_len(bytes, cursor + len, "soft link path", offset)?;
                LinkValue::Soft {
                    path: String::from_utf8_lossy(&bytes[cursor..cursor + len]).into_owned(),
                }
            }
            64 => {
                require_len(bytes, cursor + 2, "external link filename length", offset)?;
                let filename_len =
                    u16::from_le_bytes(bytes[cursor..cursor + 2].try_into().unwrap()) as usize;
                cursor += 2;
                require_len(bytes, cursor + filename_len, "external link filename", offset)?;
                let filename =
                    String::from_utf8_lossy(&bytes[cursor..cursor + filename_len]).into_owned();
                cursor += filename_len;

                require_len(bytes, cursor + 2, "external link path length", offset)?;
                let path_len =
                    u16::from_le_bytes(bytes[cursor..cursor + 2].try_into().unwrap()) as usize;
                cursor += 2;
                require_len(bytes, cursor + path_len, "external link path", offset)?;
                let object_path =
                    String::from_utf8_lossy(&bytes[cursor..cursor + path_len]).into_owned();
                LinkValue::External {
                    filename,
                    object_path,
                }
            }
            other => return Err(Error::format(offset, format!("unknown link type {other}"))),
        };

        Ok(Link {
            name,
            creation_order,
            value,
        })
    }

    /// Encodes this link in the flag-minimal form: 1-byte name length, link
    /// type always present, creation order present iff set, no charset.
    pub fn encode(&self, offset_size: u8) -> Vec<u8> {
        let mut flags = 0b0000_1000u8; // link-type field present
        if self.creation_order.is_some() {
            flags |= 0b0000_0100;
        }
        let mut out = vec![1u8, flags];

        let link_type = match &self.value {
            LinkValue::Hard { .. } => 0u8,
            LinkValue::Soft { .. } => 1u8,
            LinkValue::External { .. } => 64u8,
        };
        out.push(link_type);

        if let Some(order) = self.creation_order {
            out.extend_from_slice(&order.to_le_bytes());
        }

        out.push(self.name.len() as u8);
        out.extend_from_slice(self.name.as_bytes());

        match &self.value {
            LinkValue::Hard {
                object_header_address,
            } => {
                let os = offset_size as usize;
                out.extend_from_slice(&object_header_address.to_le_bytes()[..os]);
            }
            LinkValue::Soft { path } => {
                out.extend_from_slice(&(path.len() as u16).to_le_bytes());
                out.extend_from_slice(path.as_bytes());
            }
            LinkValue::External {
                filename,
                object_path,
            } => {
                out.extend_from_slice(&(filename.len() as u16).to_le_bytes());
                out.extend_from_slice(filename.as_bytes());
                out.extend_from_slice(&(object_path.len() as u16).to_le_bytes());
                out.extend_from_slice(object_path.as_bytes());
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_hard_link() {
        let mut bytes = vec![1u8, 0]; // version, flags: 1-byte length, no type/order/charset
        bytes.push(4); // name length
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&0x500u64.to_le_bytes());
        let link = Link::decode(&bytes, 8, 0).unwrap();
        assert_eq!(link.name, "data");
        match link.value {
            LinkValue::Hard { object_header_address } => assert_eq!(object_header_address, 0x500),
            _ => panic!("expected hard link"),
        }
    }

    #[test]
    fn decodes_soft_link() {
        let mut bytes = vec![1u8, 0b0000_1000]; // link type field present
        bytes.push(1); // soft link type
        bytes.push(4); // name length
        bytes.extend_from_slice(b"link");
        bytes.extend_from_slice(&5u16.to_le_bytes());
        bytes.extend_from_slice(b"/path");
        let link = Link::decode(&bytes, 8, 0).unwrap();
        match link.value {
            LinkValue::Soft { path } => assert_eq!(path, "/path"),
            _ => panic!("expected soft link"),
        }
    }

    #[test]
    fn encode_decode_round_trips_soft_link() {
        let link = Link {
            name: "alias".to_string(),
            creation_order: Some(7),
            value: LinkValue::Soft {
                path: "/data/x".to_string(),
            },
        };
        let bytes = link.encode(8);
        let decoded = Link::decode(&bytes, 8, 0).unwrap();
        assert_eq!(decoded.name, link.name);
        assert_eq!(decoded.creation_order, link.creation_order);
        match decoded.value {
            LinkValue::Soft { path } => assert_eq!(path, "/data/x"),
            _ => panic!("expected soft link"),
        }
    }
}
