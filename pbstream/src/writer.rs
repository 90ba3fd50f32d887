use std::io::{Error, Write};

use pbcore::{escape, NEWLINE};
use prost::Message;

use crate::proto::{PayloadInfo, Sample};

/// Writes PB stream records, the format of both the appliance responses
/// and its archive files.
pub struct PbWriter<W: Write> {
    inner: W,
}

impl<W: Write> PbWriter<W> {
    pub fn new(writer: W) -> Self {
        PbWriter { inner: writer }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    // Escaped record + delimiter
    fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        let data = escape(data);
        self.inner.write_all(&data)?;
        self.inner.write_all(&[NEWLINE])?;

        Ok(data.len() + 1)
    }

    pub fn write_header(&mut self, header: &PayloadInfo) -> Result<usize, Error> {
        self.write(&header.encode_to_vec())
    }

    pub fn write_sample<M: Sample>(&mut self, sample: &M) -> Result<usize, Error> {
        self.write(&sample.encode_to_vec())
    }

    /// Blank record, a header must follow
    pub fn write_separator(&mut self) -> Result<usize, Error> {
        self.inner.write_all(&[NEWLINE])?;
        Ok(1)
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        self.inner.flush()
    }
}
