//! Crate-wide error taxonomy.
//!
//! Every fallible decode in this crate returns [`Error`]; there is no
//! `panic!`/`unwrap()` on attacker-controlled file content anywhere in the
//! read path. Best-effort sites (skipped attributes, bypassed optional
//! filters, deferred dense storage) do not produce an `Error` at all; they
//! log via `tracing::warn!` and fall back, per the propagation policy in the
//! design notes.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("format error at offset {offset}: {message}")]
    Format { offset: u64, message: String },

    #[error("truncated {label} at offset {offset}: need {needed} bytes, have {available}")]
    Truncation {
        label: &'static str,
        offset: u64,
        needed: u64,
        available: u64,
    },

    #[error("overflow computing {label}")]
    Overflow { label: &'static str },

    #[error("unsupported: {feature}")]
    Unsupported { feature: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn format(offset: u64, message: impl Into<String>) -> Self {
        Error::Format {
            offset,
            message: message.into(),
        }
    }

    pub fn truncation(label: &'static str, offset: u64, needed: u64, available: u64) -> Self {
        Error::Truncation {
            label,
            offset,
            needed,
            available,
        }
    }

    pub fn overflow(label: &'static str) -> Self {
        Error::Overflow { label }
    }

    pub fn unsupported(feature: impl Into<String>) -> Self {
        Error::Unsupported {
            feature: feature.into(),
        }
    }
}
