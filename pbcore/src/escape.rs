//! Two byte escape sequences for the reserved bytes of the PB stream
//!
//! | Literal | Escaped     |
//! | ------: | ----------- |
//! | `0x1B`  | `0x1B 0x01` |
//! | `0x0A`  | `0x1B 0x02` |
//! | `0x0D`  | `0x1B 0x03` |
//!
//! Any other byte following `0x1B` is invalid.
use std::borrow::Cow;

use thiserror::Error;

pub const ESCAPE: u8 = 0x1B;
pub const NEWLINE: u8 = 0x0A;
pub const CARRIAGE_RETURN: u8 = 0x0D;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EscapeError {
    #[error("undefined escape sequence 0x1b {byte:#04x} at offset {offset}")]
    Undefined { byte: u8, offset: usize },
    #[error("escape byte at end of record")]
    Truncated,
}

/// Reverse [`escape`] on one complete record.
///
/// Records without any escape byte are returned as is.
pub fn unescape(data: &[u8]) -> Result<Cow<'_, [u8]>, EscapeError> {
    let first = match data.iter().position(|b| *b == ESCAPE) {
        None => return Ok(Cow::Borrowed(data)),
        Some(x) => x,
    };

    let mut out = Vec::with_capacity(data.len());
    out.extend_from_slice(&data[..first]);

    let mut i = first;
    while i < data.len() {
        let b = data[i];
        if b != ESCAPE {
            out.push(b);
            i += 1;
            continue;
        }

        let ctrl = *data.get(i + 1).ok_or(EscapeError::Truncated)?;
        out.push(match ctrl {
            1 => ESCAPE,
            2 => NEWLINE,
            3 => CARRIAGE_RETURN,
            byte => return Err(EscapeError::Undefined { byte, offset: i }),
        });
        i += 2;
    }

    Ok(Cow::Owned(out))
}

pub fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 16);
    for b in data {
        match *b {
            ESCAPE => out.extend_from_slice(&[ESCAPE, 1]),
            NEWLINE => out.extend_from_slice(&[ESCAPE, 2]),
            CARRIAGE_RETURN => out.extend_from_slice(&[ESCAPE, 3]),
            x => out.push(x),
        }
    }
    out
}

#[cfg(test)]
mod test_escape {
    use super::*;

    #[test]
    fn plain_is_borrowed() {
        let data = b"hello world";
        match unescape(data).unwrap() {
            Cow::Borrowed(x) => assert_eq!(x, data),
            Cow::Owned(_) => panic!("should not have copied"),
        }
    }

    #[test]
    fn each_sequence() {
        assert_eq!(&unescape(&[0x1B, 0x01]).unwrap()[..], &[0x1B]);
        assert_eq!(&unescape(&[0x1B, 0x02]).unwrap()[..], &[0x0A]);
        assert_eq!(&unescape(&[0x1B, 0x03]).unwrap()[..], &[0x0D]);
    }

    #[test]
    fn mixed() {
        let data = [b'a', 0x1B, 0x02, b'b', 0x1B, 0x01, 0x1B, 0x03, b'c'];
        assert_eq!(
            &unescape(&data).unwrap()[..],
            &[b'a', 0x0A, b'b', 0x1B, 0x0D, b'c']
        );
    }

    #[test]
    fn escaped_output_has_no_reserved_bytes() {
        let data: Vec<u8> = (0..=255).collect();
        let enc = escape(&data);

        assert!(!enc.contains(&NEWLINE));
        assert!(!enc.contains(&CARRIAGE_RETURN));
        assert_eq!(enc.len(), 256 + 3);
    }

    #[test]
    fn round_trip() {
        let samples: Vec<Vec<u8>> = vec![
            vec![],
            vec![0x1B],
            vec![0x1B, 0x1B, 0x01],
            vec![0x0A, 0x0A, 0x0D],
            (0..=255).collect(),
            (0..=255).rev().cycle().take(4096).collect(),
        ];
        for x in samples {
            assert_eq!(&unescape(&escape(&x)).unwrap()[..], &x[..]);
        }
    }

    #[test]
    fn undefined_control() {
        assert_eq!(
            unescape(&[b'x', 0x1B, 0x00]).unwrap_err(),
            EscapeError::Undefined { byte: 0, offset: 1 }
        );
        assert_eq!(
            unescape(&[0x1B, 0x04]).unwrap_err(),
            EscapeError::Undefined { byte: 4, offset: 0 }
        );
    }

    #[test]
    fn trailing_escape() {
        assert_eq!(unescape(&[b'x', 0x1B]).unwrap_err(), EscapeError::Truncated);
    }
}
