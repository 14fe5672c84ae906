//! Header message type codes, tabulated as one closed enum rather than the
//! scattered, duplicate-declaring constants the design notes describe
//! (`Name` at both 11 and 13, `DataLayout` at both 5 and 8). Canonicalized
//! here on the values consistent with the file format and the rest of the
//! decode path: Data Layout is 0x08, Name is 0x0D.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Nil,
    Dataspace,
    LinkInfo,
    Datatype,
    FillValueOld,
    FillValue,
    Link,
    DataLayout,
    FilterPipeline,
    Attribute,
    Name,
    AttributeInfo,
    Continuation,
    SymbolTable,
}

impl MessageType {
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0x00 => MessageType::Nil,
            0x01 => MessageType::Dataspace,
            0x02 => MessageType::LinkInfo,
            0x03 => MessageType::Datatype,
            0x04 => MessageType::FillValueOld,
            0x05 => MessageType::FillValue,
            0x06 => MessageType::Link,
            0x08 => MessageType::DataLayout,
            0x0B => MessageType::FilterPipeline,
            0x0C => MessageType::Attribute,
            0x0D => MessageType::Name,
            0x0F => MessageType::AttributeInfo,
            0x10 => MessageType::Continuation,
            0x11 => MessageType::SymbolTable,
            _ => return None,
        })
    }

    pub fn code(self) -> u16 {
        match self {
            MessageType::Nil => 0x00,
            MessageType::Dataspace => 0x01,
            MessageType::LinkInfo => 0x02,
            MessageType::Datatype => 0x03,
            MessageType::FillValueOld => 0x04,
            MessageType::FillValue => 0x05,
            MessageType::Link => 0x06,
            MessageType::DataLayout => 0x08,
            MessageType::FilterPipeline => 0x0B,
            MessageType::Attribute => 0x0C,
            MessageType::Name => 0x0D,
            MessageType::AttributeInfo => 0x0F,
            MessageType::Continuation => 0x10,
            MessageType::SymbolTable => 0x11,
        }
    }
}

/// One decoded header message: its type code (unrecognized codes are kept
/// as `None` rather than rejected, since a reader must tolerate message
/// types it does not understand), raw payload, and originating file offset.
#[derive(Debug, Clone)]
pub struct Message {
    pub raw_type: u16,
    pub message_type: Option<MessageType>,
    pub payload: Vec<u8>,
    pub offset: u64,
}

impl Message {
    pub fn is(&self, message_type: MessageType) -> bool {
        self.message_type == Some(message_type)
    }
}

pub fn require_message_payload(messages: &[Message], message_type: MessageType) -> Result<&[u8]> {
    messages
        .iter()
        .find(|m| m.is(message_type))
        .map(|m| m.payload.as_slice())
        .ok_or_else(|| Error::format(0, format!("missing required message {message_type:?}")))
}
