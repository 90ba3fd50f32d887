use pbcore::EscapeError;
use thiserror::Error;

use crate::proto::PayloadType;

/// Malformed stream content, fatal for the fetch it happened in.
///
/// `ordinal` is the position of the offending record within the response,
/// blank records included, counting from 0.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("record {ordinal}: {source}")]
    Escape {
        ordinal: u64,
        #[source]
        source: EscapeError,
    },
    #[error("record {ordinal}: malformed header: {source}")]
    Header {
        ordinal: u64,
        #[source]
        source: prost::DecodeError,
    },
    #[error("record {ordinal}: sample before any header")]
    MissingHeader { ordinal: u64 },
    #[error("record {ordinal}: unknown payload type {code}")]
    UnknownType { ordinal: u64, code: i32 },
    #[error("record {ordinal}: year {year} out of range")]
    Year { ordinal: u64, year: i32 },
    #[error("record {ordinal}: failed to decode {typ:?} sample: {source}")]
    Sample {
        ordinal: u64,
        typ: PayloadType,
        #[source]
        source: prost::DecodeError,
    },
}

impl ProtocolError {
    pub fn ordinal(&self) -> u64 {
        match self {
            ProtocolError::Escape { ordinal, .. }
            | ProtocolError::Header { ordinal, .. }
            | ProtocolError::MissingHeader { ordinal }
            | ProtocolError::UnknownType { ordinal, .. }
            | ProtocolError::Year { ordinal, .. }
            | ProtocolError::Sample { ordinal, .. } => *ordinal,
        }
    }
}
