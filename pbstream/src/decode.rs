//! Turning records into columnar batches.
//!
//! [`decode`] takes the records of one drained region and a [`DecodeContext`]
//! that lives for the whole response, so a section can straddle several calls.
//! Every maximal run of samples between blank records becomes one [`Batch`].
use std::borrow::Cow;

use bytes::Bytes;
use log::{debug, info, warn};
use prost::Message;
use time::{Date, Month};

use pbcore::unescape;

use crate::error::ProtocolError;
use crate::proto::{
    PayloadInfo, PayloadType, Sample, ScalarByte, ScalarDouble, ScalarEnum, ScalarFloat,
    ScalarInt, ScalarShort, ScalarString, Stamp, V4GenericBytes, VectorChar, VectorDouble,
    VectorEnum, VectorFloat, VectorInt, VectorShort, VectorString,
};

/// Per sample metadata, `sec` is absolute POSIX seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
    pub severity: i32,
    pub status: i32,
    pub sec: i64,
    pub ns: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    String(Vec<String>),
    Short(Vec<i16>),
    Float(Vec<f32>),
    Enum(Vec<i16>),
    Byte(Vec<i8>),
    Int(Vec<i32>),
    Double(Vec<f64>),
    VectorString(Vec<Vec<String>>),
    VectorShort(Vec<Vec<i16>>),
    VectorFloat(Vec<Vec<f32>>),
    VectorEnum(Vec<Vec<i16>>),
    VectorByte(Vec<Vec<i8>>),
    VectorInt(Vec<Vec<i32>>),
    VectorDouble(Vec<Vec<f64>>),
    GenericBytes(Vec<Vec<u8>>),
}

macro_rules! each_column {
    ($values:expr, $col:ident => $body:expr) => {
        match $values {
            Values::String($col) => $body,
            Values::Short($col) => $body,
            Values::Float($col) => $body,
            Values::Enum($col) => $body,
            Values::Byte($col) => $body,
            Values::Int($col) => $body,
            Values::Double($col) => $body,
            Values::VectorString($col) => $body,
            Values::VectorShort($col) => $body,
            Values::VectorFloat($col) => $body,
            Values::VectorEnum($col) => $body,
            Values::VectorByte($col) => $body,
            Values::VectorInt($col) => $body,
            Values::VectorDouble($col) => $body,
            Values::GenericBytes($col) => $body,
        }
    };
}

impl Values {
    pub fn len(&self) -> usize {
        each_column!(self, col => col.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parallel value and metadata columns of one run of same typed samples
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub values: Values,
    pub meta: Vec<Meta>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.meta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }
}

/// POSIX time of Jan 1 00:00:00 UTC of `year`
pub fn year_epoch(year: i32) -> Option<i64> {
    Date::from_calendar_date(year, Month::January, 1)
        .ok()
        .map(|d| d.midnight().assume_utc().unix_timestamp())
}

#[derive(Debug, Clone)]
struct Section {
    header: PayloadInfo,
    typ: PayloadType,
    epoch: i64,
    end: i64,
}

/// Decode state of one response
#[derive(Debug)]
pub struct DecodeContext {
    section: Option<Section>,
    count: u64,
    limit: Option<u64>,
    ordinal: u64,
    // Stream start or a blank record was just seen
    expect_header: bool,
    last: Option<(i64, u32)>,
}

impl DecodeContext {
    /// A limit of `Some(0)` is the same as no limit
    pub fn new(limit: Option<u64>) -> Self {
        DecodeContext {
            section: None,
            count: 0,
            limit: limit.filter(|x| *x > 0),
            ordinal: 0,
            expect_header: true,
            last: None,
        }
    }

    pub fn header(&self) -> Option<&PayloadInfo> {
        self.section.as_ref().map(|s| &s.header)
    }

    pub fn payload_type(&self) -> Option<PayloadType> {
        self.section.as_ref().map(|s| s.typ)
    }

    pub fn year_epoch(&self) -> Option<i64> {
        self.section.as_ref().map(|s| s.epoch)
    }

    /// Samples decoded so far
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn limit_reached(&self) -> bool {
        self.limit.is_some_and(|x| self.count >= x)
    }

    /// Records seen so far, blank ones included
    pub fn records(&self) -> u64 {
        self.ordinal
    }

    // Leaves the context untouched on error
    fn set_header(&mut self, header: PayloadInfo, ordinal: u64) -> Result<(), ProtocolError> {
        let typ = header.payload_type().map_err(|_| ProtocolError::UnknownType {
            ordinal,
            code: header.r#type,
        })?;
        let epoch = year_epoch(header.year).ok_or(ProtocolError::Year {
            ordinal,
            year: header.year,
        })?;
        let end = header
            .year
            .checked_add(1)
            .and_then(year_epoch)
            .unwrap_or(i64::MAX);

        match &self.section {
            Some(old) if old.header == header => {
                debug!("record {}: same header for {}", ordinal, header.pvname)
            }
            Some(old) => info!(
                "record {}: {} changed from {:?}/{} to {:?}/{}",
                ordinal, header.pvname, old.typ, old.header.year, typ, header.year
            ),
            None => debug!(
                "record {}: header {} {:?} year {}",
                ordinal, header.pvname, typ, header.year
            ),
        }

        self.section = Some(Section {
            header,
            typ,
            epoch,
            end,
        });
        Ok(())
    }

    // Room left under the limit for n more samples
    fn room(&self, n: usize) -> usize {
        match self.limit {
            None => n,
            Some(limit) => usize::try_from(limit.saturating_sub(self.count))
                .unwrap_or(usize::MAX)
                .min(n),
        }
    }

    fn flush_part(&mut self, part: &mut Vec<Record>, out: &mut Vec<Batch>) -> Result<(), ProtocolError> {
        let first = match part.first() {
            None => return Ok(()),
            Some(x) => x.ordinal,
        };
        let typ = match &self.section {
            Some(s) => s.typ,
            None => return Err(ProtocolError::MissingHeader { ordinal: first }),
        };

        let batch = (codec_for(typ).part)(&part[..], typ, self)?;
        if batch.len() < part.len() {
            debug!(
                "record {}: dropping {} samples past the limit",
                first,
                part.len() - batch.len()
            );
        }
        part.clear();

        if batch.is_empty() {
            return Ok(());
        }
        self.check(&batch);
        out.push(batch);
        Ok(())
    }

    // Data quality, never fatal
    fn check(&mut self, batch: &Batch) {
        let (epoch, end) = match &self.section {
            Some(s) => (s.epoch, s.end),
            None => return,
        };

        let outside = batch
            .meta
            .iter()
            .filter(|m| m.sec < epoch || m.sec >= end)
            .count();

        let mut backwards = 0;
        for m in batch.meta.iter() {
            let stamp = (m.sec, m.ns);
            if self.last.is_some_and(|last| stamp < last) {
                backwards += 1;
            }
            self.last = Some(stamp);
        }

        if let Some(s) = &self.section {
            if outside > 0 {
                warn!(
                    "{}: {} samples outside of year {}",
                    s.header.pvname, outside, s.header.year
                );
            }
            if backwards > 0 {
                warn!("{}: {} samples went back in time", s.header.pvname, backwards);
            }
        }
    }
}

struct Record {
    ordinal: u64,
    data: Bytes,
}

type PartFn = fn(&[Record], PayloadType, &mut DecodeContext) -> Result<Batch, ProtocolError>;
type StampFn = fn(&[u8]) -> Result<Stamp, prost::DecodeError>;

struct Codec {
    part: PartFn,
    stamp: StampFn,
}

const fn codec<M: Sample>() -> Codec {
    Codec {
        part: decode_part::<M>,
        stamp: decode_stamp_of::<M>,
    }
}

// Indexed by type code
static CODECS: [Codec; 15] = [
    codec::<ScalarString>(),
    codec::<ScalarShort>(),
    codec::<ScalarFloat>(),
    codec::<ScalarEnum>(),
    codec::<ScalarByte>(),
    codec::<ScalarInt>(),
    codec::<ScalarDouble>(),
    codec::<VectorString>(),
    codec::<VectorShort>(),
    codec::<VectorFloat>(),
    codec::<VectorEnum>(),
    codec::<VectorChar>(),
    codec::<VectorInt>(),
    codec::<VectorDouble>(),
    codec::<V4GenericBytes>(),
];

fn codec_for(typ: PayloadType) -> &'static Codec {
    &CODECS[typ as usize]
}

fn decode_part<M: Sample>(
    records: &[Record],
    typ: PayloadType,
    ctx: &mut DecodeContext,
) -> Result<Batch, ProtocolError> {
    let take = ctx.room(records.len());
    let epoch = ctx.year_epoch().unwrap_or(0);

    let mut values = Vec::with_capacity(take);
    let mut meta = Vec::with_capacity(take);

    for rec in records[..take].iter() {
        let sample = M::decode(&rec.data[..]).map_err(|source| ProtocolError::Sample {
            ordinal: rec.ordinal,
            typ,
            source,
        })?;

        let stamp = sample.stamp();
        meta.push(Meta {
            severity: stamp.severity,
            status: stamp.status,
            sec: epoch + i64::from(stamp.secondsintoyear),
            ns: stamp.nano,
        });
        values.push(sample.into_value());
    }
    ctx.count += take as u64;

    Ok(Batch {
        values: M::column(values),
        meta,
    })
}

fn decode_stamp_of<M: Sample>(data: &[u8]) -> Result<Stamp, prost::DecodeError> {
    M::decode(data).map(|x| x.stamp())
}

/// Decode only the timestamp and alarm fields of an unescaped sample
pub fn decode_stamp(typ: PayloadType, data: &[u8]) -> Result<Stamp, prost::DecodeError> {
    (codec_for(typ).stamp)(data)
}

/// Decode a run of still escaped records.
///
/// A blank record ends the current section and the record after it is taken
/// as the next header. When that record doesn't parse as a header but one is
/// already active, it is kept as a sample of the active type with a warning.
pub fn decode<I>(records: I, ctx: &mut DecodeContext) -> Result<Vec<Batch>, ProtocolError>
where
    I: IntoIterator<Item = Bytes>,
{
    let mut batches = vec![];
    let mut part: Vec<Record> = vec![];

    for raw in records {
        let ordinal = ctx.ordinal;
        ctx.ordinal += 1;

        if raw.is_empty() {
            if part.is_empty() && !ctx.expect_header {
                debug!("record {}: header without samples", ordinal);
            }
            ctx.flush_part(&mut part, &mut batches)?;
            ctx.expect_header = true;
            continue;
        }

        let data = match unescape(&raw) {
            Ok(Cow::Borrowed(_)) => raw.clone(),
            Ok(Cow::Owned(x)) => Bytes::from(x),
            Err(source) => return Err(ProtocolError::Escape { ordinal, source }),
        };

        if ctx.expect_header {
            ctx.expect_header = false;

            // Only a record that isn't a header at all may be a sample,
            // a header with a bad type or year is fatal
            match PayloadInfo::decode(&data[..]) {
                Ok(header) => {
                    ctx.set_header(header, ordinal)?;
                    continue;
                }
                Err(source) => {
                    let e = ProtocolError::Header { ordinal, source };
                    if ctx.section.is_none() {
                        return Err(e);
                    }
                    warn!("{}, keeping it as a sample", e);
                }
            }
        }

        part.push(Record { ordinal, data });
    }

    ctx.flush_part(&mut part, &mut batches)?;
    Ok(batches)
}
