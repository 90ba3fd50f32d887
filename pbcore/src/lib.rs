//! Byte level plumbing for the PB stream format.
//!
//! A PB stream is a sequence of records, each terminated by a single `\n`
//! (0x0A). The bytes of a record are escaped so that the delimiter, the
//! carriage return and the escape byte itself never appear literally inside
//! it (see [`escape`]). Records are cut out of the incoming bytes by the
//! [`framer`] which never looks at the escaped content, so an escape sequence
//! can't be split by a record boundary.
pub mod escape;
pub mod framer;

pub use escape::{escape, unescape, EscapeError};
pub use framer::{LineFramer, LineReader, Lines};

/// Record delimiter
pub const NEWLINE: u8 = b'\n';
