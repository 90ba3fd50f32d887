//! Offline integrity check of an archive file.
//!
//! The header is always read and checked in full since it anchors the type
//! and channel identity of the file. The samples are only checked near the
//! end of the file: [`find_position`] walks backward from the end in
//! [`BLOCK_SIZE`] blocks counting delimiters, so a multi-gigabyte archive costs
//! a handful of reads.
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::str::FromStr;

use log::{debug, info};
use pbcore::{unescape, EscapeError, LineReader, NEWLINE};
use prost::Message;
use thiserror::Error;

use crate::decode::decode_stamp;
use crate::error::ProtocolError;
use crate::proto::{PayloadInfo, PayloadType};

pub const BLOCK_SIZE: u64 = 2048;

// Full records wanted in the tail, plus one partial
const TAIL_RECORDS: usize = 3;

/// Position of a sample within its year, ordered by seconds then nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub secondsintoyear: u32,
    pub nano: u32,
}

impl Timestamp {
    pub fn new(secondsintoyear: u32, nano: u32) -> Self {
        Timestamp {
            secondsintoyear,
            nano,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.secondsintoyear, self.nano)
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("bad timestamp '{0}', expected SEC[.FRACTION]")]
pub struct TimestampError(String);

fn digits(s: &str) -> Option<&str> {
    (!s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())).then_some(s)
}

/// `SEC` or `SEC.FRACTION`, digits past nanoseconds are dropped
impl FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || TimestampError(s.to_string());
        let (sec, frac) = s.split_once('.').unwrap_or((s, "0"));

        let sec: u32 = digits(sec).and_then(|x| x.parse().ok()).ok_or_else(bad)?;
        let frac = digits(frac).ok_or_else(bad)?;

        let frac = &frac[..frac.len().min(9)];
        let nano: u32 = frac.parse().map_err(|_| bad())?;
        let scale = 10u32.pow(9 - frac.len() as u32);
        Ok(Timestamp::new(sec, nano * scale))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verified {
    pub year: i32,
    pub payload_type: PayloadType,
    /// `None` when no sample was found in the tail
    pub last_timestamp: Option<Timestamp>,
}

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("no records in stream")]
    EmptyStream,
    #[error("reading header: {0}")]
    Header(#[source] ProtocolError),
    #[error("type mismatch in header, expected {expected:?} found {found:?}")]
    TypeMismatch {
        expected: PayloadType,
        found: PayloadType,
    },
    #[error("PV name mismatch in header, expected {expected} found {found}. Probably two PVs are bound to the same destination file")]
    NameMismatch { expected: String, found: String },
    #[error("year mismatch in header, expected {expected} found {found}")]
    YearMismatch { expected: i32, found: i32 },
    #[error("offset {offset}: {source}")]
    Escape {
        offset: u64,
        #[source]
        source: EscapeError,
    },
    #[error("offset {offset}: failed to decode sample: {source}")]
    Sample {
        offset: u64,
        #[source]
        source: prost::DecodeError,
    },
    #[error("offset {offset}: found sample at {found} newer than {bound}")]
    NewerSample {
        offset: u64,
        found: Timestamp,
        bound: Timestamp,
    },
}

impl VerifyError {
    /// Identity or bound failures, as opposed to unreadable content
    pub fn is_bounds(&self) -> bool {
        matches!(
            self,
            VerifyError::TypeMismatch { .. }
                | VerifyError::NameMismatch { .. }
                | VerifyError::YearMismatch { .. }
                | VerifyError::NewerSample { .. }
        )
    }
}

pub fn verify_file<P: AsRef<Path>>(
    path: P,
    typ: Option<PayloadType>,
    pv_name: Option<&str>,
    year: Option<i32>,
    upper_bound: Option<Timestamp>,
) -> Result<Verified, VerifyError> {
    let path = path.as_ref();
    info!("verify {}", path.display());

    let mut file = File::open(path)?;
    verify_stream(&mut file, typ, pv_name, year, upper_bound)
}

/// Check the header against the expected identity, then check the samples
/// at the end of the stream against `upper_bound`.
pub fn verify_stream<R: Read + Seek>(
    stream: &mut R,
    typ: Option<PayloadType>,
    pv_name: Option<&str>,
    year: Option<i32>,
    upper_bound: Option<Timestamp>,
) -> Result<Verified, VerifyError> {
    stream.seek(SeekFrom::Start(0))?;
    let header = read_header(&mut *stream)?;

    let found = header.payload_type().map_err(|_| {
        VerifyError::Header(ProtocolError::UnknownType {
            ordinal: 0,
            code: header.r#type,
        })
    })?;

    if let Some(expected) = typ {
        if found != expected {
            return Err(VerifyError::TypeMismatch { expected, found });
        }
    }
    if let Some(expected) = pv_name {
        if header.pvname != expected {
            return Err(VerifyError::NameMismatch {
                expected: expected.to_string(),
                found: header.pvname,
            });
        }
    }
    if let Some(expected) = year {
        if header.year != expected {
            return Err(VerifyError::YearMismatch {
                expected,
                found: header.year,
            });
        }
    }

    let pos = find_position(stream)?;
    debug!("{}: checking samples from offset {}", header.pvname, pos);
    stream.seek(SeekFrom::Start(pos))?;

    let mut offset = pos;
    let mut last_timestamp = None;

    for line in LineReader::new(&mut *stream) {
        let line = line?;
        let at = offset;
        offset += line.len() as u64 + 1;

        if line.is_empty() {
            continue;
        }

        let data = unescape(&line).map_err(|source| VerifyError::Escape { offset: at, source })?;
        let stamp = decode_stamp(found, &data).map_err(|source| VerifyError::Sample { offset: at, source })?;

        let ts = Timestamp::new(stamp.secondsintoyear, stamp.nano);
        if let Some(bound) = upper_bound {
            if ts > bound {
                return Err(VerifyError::NewerSample {
                    offset: at,
                    found: ts,
                    bound,
                });
            }
        }
        last_timestamp = Some(ts);
    }

    Ok(Verified {
        year: header.year,
        payload_type: found,
        last_timestamp,
    })
}

fn read_header<R: Read>(stream: R) -> Result<PayloadInfo, VerifyError> {
    let raw = match LineReader::new(stream).next() {
        None => return Err(VerifyError::EmptyStream),
        Some(x) => x?,
    };
    if raw.is_empty() {
        return Err(VerifyError::Header(ProtocolError::MissingHeader { ordinal: 0 }));
    }

    let data = unescape(&raw)
        .map_err(|source| VerifyError::Header(ProtocolError::Escape { ordinal: 0, source }))?;

    PayloadInfo::decode(&data[..])
        .map_err(|source| VerifyError::Header(ProtocolError::Header { ordinal: 0, source }))
}

/// Find the start of one of the last few records.
///
/// Reads backward from the end until `TAIL_RECORDS + 1` delimiters are seen
/// or the start is reached, then moves past the next delimiter so the
/// position is at a record boundary. At the start of the stream that skips the
/// header.
pub fn find_position<R: Read + Seek>(stream: &mut R) -> std::io::Result<u64> {
    let end = stream.seek(SeekFrom::End(0))?;

    let mut block = vec![0u8; BLOCK_SIZE as usize];
    let mut pos = end;
    let mut count = 0;
    // Byte after the first delimiter at or after `pos`
    let mut boundary = end;

    while count <= TAIL_RECORDS && pos > 0 {
        let len = BLOCK_SIZE.min(pos);
        pos -= len;

        let buf = &mut block[..len as usize];
        stream.seek(SeekFrom::Start(pos))?;
        stream.read_exact(buf)?;

        count += buf.iter().filter(|b| **b == NEWLINE).count();
        if let Some(first) = buf.iter().position(|b| *b == NEWLINE) {
            boundary = pos + first as u64 + 1;
        }
    }

    Ok(boundary)
}

#[cfg(test)]
mod test_verify {
    use super::*;
    use crate::proto::{ScalarDouble, VectorInt};
    use crate::writer::PbWriter;
    use std::io::{Cursor, Write};

    fn archive(header: &PayloadInfo, samples: &[(u32, u32)]) -> Cursor<Vec<u8>> {
        let mut writer = PbWriter::new(Cursor::new(Vec::new()));
        writer.write_header(header).unwrap();
        for (sec, nano) in samples.iter() {
            writer
                .write_sample(&ScalarDouble {
                    secondsintoyear: *sec,
                    nano: *nano,
                    val: 1.0,
                    ..Default::default()
                })
                .unwrap();
        }
        writer.into_inner()
    }

    fn big_archive() -> Cursor<Vec<u8>> {
        // Last sample at (100, 0)
        let samples: Vec<(u32, u32)> = (1..=10000).map(|i| (i / 100, 0)).collect();
        archive(&PayloadInfo::new(PayloadType::ScalarDouble, "Y", 2021), &samples)
    }

    #[test]
    fn last_sample_within_bound() {
        let mut data = big_archive();
        let res = verify_stream(
            &mut data,
            Some(PayloadType::ScalarDouble),
            Some("Y"),
            Some(2021),
            Some(Timestamp::new(200, 0)),
        )
        .unwrap();

        assert_eq!(res.year, 2021);
        assert_eq!(res.last_timestamp, Some(Timestamp::new(100, 0)));
    }

    #[test]
    fn last_sample_past_bound() {
        let mut data = big_archive();
        let err = verify_stream(&mut data, None, None, None, Some(Timestamp::new(50, 0))).unwrap_err();

        assert!(matches!(err, VerifyError::NewerSample { .. }));
        assert!(err.is_bounds());
    }

    #[test]
    fn tail_is_small() {
        let mut data = big_archive();
        let len = data.get_ref().len() as u64;
        let pos = find_position(&mut data).unwrap();

        assert!(pos > 0);
        assert!(len - pos <= 2 * BLOCK_SIZE);
        // A record boundary
        assert_eq!(data.get_ref()[pos as usize - 1], NEWLINE);
    }

    #[test]
    fn no_bound() {
        let mut data = big_archive();
        let res = verify_stream(&mut data, None, None, None, None).unwrap();
        assert_eq!(res.last_timestamp, Some(Timestamp::new(100, 0)));
    }

    #[test]
    fn empty() {
        let mut data = Cursor::new(Vec::new());
        let err = verify_stream(&mut data, None, None, None, None).unwrap_err();

        assert!(matches!(err, VerifyError::EmptyStream));
        assert!(!err.is_bounds());
    }

    #[test]
    fn header_only() {
        let mut data = archive(&PayloadInfo::new(PayloadType::ScalarDouble, "Y", 2021), &[]);
        let res = verify_stream(&mut data, None, Some("Y"), None, None).unwrap();

        assert_eq!(res.last_timestamp, None);
        assert_eq!(res.payload_type, PayloadType::ScalarDouble);
    }

    #[test]
    fn small_file_reads_from_start() {
        let mut data = archive(
            &PayloadInfo::new(PayloadType::ScalarDouble, "Y", 2021),
            &[(1, 0), (2, 0)],
        );

        let pos = find_position(&mut data).unwrap();
        // Just past the header
        assert_eq!(data.get_ref()[pos as usize - 1], NEWLINE);
        assert_eq!(
            data.get_ref()[..pos as usize].iter().filter(|b| **b == NEWLINE).count(),
            1
        );

        let res = verify_stream(&mut data, None, None, None, None).unwrap();
        assert_eq!(res.last_timestamp, Some(Timestamp::new(2, 0)));
    }

    #[test]
    fn nanoseconds_break_ties() {
        let mut data = archive(
            &PayloadInfo::new(PayloadType::ScalarDouble, "Y", 2021),
            &[(5, 10), (5, 20)],
        );

        assert!(verify_stream(&mut data, None, None, None, Some(Timestamp::new(5, 20))).is_ok());
        assert!(verify_stream(&mut data, None, None, None, Some(Timestamp::new(5, 19))).is_err());
    }

    #[test]
    fn identity_mismatch() {
        let mut data = archive(&PayloadInfo::new(PayloadType::ScalarDouble, "Y", 2021), &[(1, 0)]);

        let err = verify_stream(&mut data, Some(PayloadType::ScalarInt), None, None, None).unwrap_err();
        assert!(matches!(err, VerifyError::TypeMismatch { .. }));

        let err = verify_stream(&mut data, None, Some("Z"), None, None).unwrap_err();
        assert!(matches!(err, VerifyError::NameMismatch { .. }));

        let err = verify_stream(&mut data, None, None, Some(2020), None).unwrap_err();
        assert!(matches!(err, VerifyError::YearMismatch { expected: 2020, found: 2021 }));
        assert!(err.is_bounds());
    }

    #[test]
    fn bad_header() {
        let mut data = Cursor::new(vec![0xff, 0xff, NEWLINE]);
        let err = verify_stream(&mut data, None, None, None, None).unwrap_err();

        assert!(matches!(err, VerifyError::Header(_)));
        assert!(!err.is_bounds());
    }

    #[test]
    fn bad_tail_sample() {
        let mut data = archive(&PayloadInfo::new(PayloadType::ScalarDouble, "Y", 2021), &[(1, 0)]);
        data.seek(SeekFrom::End(0)).unwrap();
        data.write_all(&[0xff, NEWLINE]).unwrap();

        let err = verify_stream(&mut data, None, None, None, None).unwrap_err();
        assert!(matches!(err, VerifyError::Sample { .. }));
    }

    #[test]
    fn vector_file_on_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        {
            let mut writer = PbWriter::new(file.as_file_mut());
            writer
                .write_header(&PayloadInfo::new(PayloadType::WaveformInt, "V", 2019))
                .unwrap();
            for i in 0..500u32 {
                writer
                    .write_sample(&VectorInt {
                        secondsintoyear: i * 60,
                        nano: 0,
                        val: (0..i as i32 % 17).collect(),
                        ..Default::default()
                    })
                    .unwrap();
            }
            writer.flush().unwrap();
        }

        let res = verify_file(
            file.path(),
            Some(PayloadType::WaveformInt),
            Some("V"),
            Some(2019),
            None,
        )
        .unwrap();
        assert_eq!(res.last_timestamp, Some(Timestamp::new(499 * 60, 0)));
    }

    #[test]
    fn timestamp_parse() {
        assert_eq!("100".parse::<Timestamp>().unwrap(), Timestamp::new(100, 0));
        assert_eq!("100.5".parse::<Timestamp>().unwrap(), Timestamp::new(100, 500_000_000));
        assert_eq!("100.000000007".parse::<Timestamp>().unwrap(), Timestamp::new(100, 7));
        assert!("100.".parse::<Timestamp>().is_err());
        assert!("x".parse::<Timestamp>().is_err());
        assert!("1.+5".parse::<Timestamp>().is_err());
        assert!("1.-5".parse::<Timestamp>().is_err());
        assert!("+1.5".parse::<Timestamp>().is_err());
        assert!("1.5x".parse::<Timestamp>().is_err());
        assert_eq!("1.1234567891".parse::<Timestamp>().unwrap(), Timestamp::new(1, 123_456_789));
        assert_eq!(Timestamp::new(1, 5).to_string(), "1.000000005");
    }
}
