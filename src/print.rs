use std::fmt::Debug;
use std::io::{self, Write};

use pbstream::{Batch, Meta, Values};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub fn severity(code: i32) -> &'static str {
    match code {
        0 => "",
        1 => "MINOR",
        2 => "MAJOR",
        3 => "INVALID",
        _ => "<unknown>",
    }
}

pub fn status(code: i32) -> String {
    if code == 0 {
        String::new()
    } else {
        code.to_string()
    }
}

pub fn stamp(meta: &Meta) -> String {
    let nanos = i128::from(meta.sec) * 1_000_000_000 + i128::from(meta.ns);
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| format!("{}.{:09}", meta.sec, meta.ns))
}

fn list<T: Debug>(x: &[T]) -> String {
    format!("{:?}", x)
}

/// Row `i` of a value column
pub fn value(values: &Values, i: usize) -> String {
    match values {
        Values::String(x) => x[i].clone(),
        Values::Short(x) => x[i].to_string(),
        Values::Float(x) => x[i].to_string(),
        Values::Enum(x) => x[i].to_string(),
        Values::Byte(x) => x[i].to_string(),
        Values::Int(x) => x[i].to_string(),
        Values::Double(x) => x[i].to_string(),
        Values::VectorString(x) => list(&x[i]),
        Values::VectorShort(x) => list(&x[i]),
        Values::VectorFloat(x) => list(&x[i]),
        Values::VectorEnum(x) => list(&x[i]),
        Values::VectorByte(x) => list(&x[i]),
        Values::VectorInt(x) => list(&x[i]),
        Values::VectorDouble(x) => list(&x[i]),
        Values::GenericBytes(x) => list(&x[i]),
    }
}

/// One line per sample: time, value, severity, status
pub fn batch<W: Write>(out: &mut W, batch: &Batch) -> io::Result<()> {
    for (i, meta) in batch.meta.iter().enumerate() {
        writeln!(
            out,
            "{} {} {} {}",
            stamp(meta),
            value(&batch.values, i),
            severity(meta.severity),
            status(meta.status)
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod test_print {
    use super::*;

    fn meta(sec: i64, severity: i32, status: i32) -> Meta {
        Meta {
            severity,
            status,
            sec,
            ns: 5000,
        }
    }

    #[test]
    fn names() {
        assert_eq!(severity(0), "");
        assert_eq!(severity(2), "MAJOR");
        assert_eq!(severity(9), "<unknown>");
        assert_eq!(status(0), "");
        assert_eq!(status(3), "3");
    }

    #[test]
    fn lines() {
        let b = Batch {
            values: Values::VectorInt(vec![vec![1, 2], vec![]]),
            meta: vec![meta(1577836800, 0, 0), meta(1577836801, 1, 7)],
        };

        let mut out = vec![];
        batch(&mut out, &b).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "2020-01-01T00:00:00.000005Z [1, 2]  \n2020-01-01T00:00:01.000005Z [] MINOR 7\n"
        );
    }

    #[test]
    fn scalars() {
        assert_eq!(value(&Values::Double(vec![1.5]), 0), "1.5");
        assert_eq!(value(&Values::String(vec!["on".into()]), 0), "on");
        assert_eq!(value(&Values::Byte(vec![-3]), 0), "-3");
    }
}
