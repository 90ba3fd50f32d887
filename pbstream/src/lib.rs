//! PB stream format: the escaped, newline separated protocol buffer records
//! served by the archiver appliance and stored in its archive files.
//!
//! A stream is a [`proto::PayloadInfo`] header followed by samples whose
//! message shape is selected by the header's type. A blank record closes a
//! section; the next record is a fresh header (type or year changed).
//!
//! ```text
//! PayloadInfo \n sample \n sample \n \n PayloadInfo \n sample \n ...
//! ```
pub mod decode;
pub mod error;
pub mod proto;
pub mod receiver;
pub mod verify;
pub mod writer;

pub use decode::{decode, Batch, DecodeContext, Meta, Values};
pub use error::ProtocolError;
pub use proto::{PayloadInfo, PayloadType};
pub use receiver::{PbReceiver, ReceiveError};
pub use verify::{verify_file, verify_stream, Timestamp, TimestampError, Verified, VerifyError};
pub use writer::PbWriter;

pub use pbcore::framer::DEFAULT_THRESHOLD;
