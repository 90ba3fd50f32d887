use std::error::Error as StdError;

use log::{debug, error};
use pbcore::framer::{LineFramer, DEFAULT_THRESHOLD};
use pbcore::Lines;
use thiserror::Error;

use crate::decode::{decode, Batch, DecodeContext};
use crate::error::ProtocolError;

#[derive(Error, Debug)]
pub enum ReceiveError {
    #[error("{name}: {source}")]
    Protocol {
        name: String,
        #[source]
        source: ProtocolError,
    },
    #[error("{name}: connection lost after {delivered} samples: {source}")]
    Interrupted {
        name: String,
        delivered: u64,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

/// Incrementally decode a PB stream response.
///
/// Bytes are accumulated until the threshold is crossed, then every complete
/// record is decoded and each resulting batch handed to the callback in
/// stream order. Only the trailing partial record is held back.
pub struct PbReceiver<F: FnMut(Batch)> {
    name: String,
    framer: LineFramer,
    ctx: DecodeContext,
    callback: F,
}

impl<F: FnMut(Batch)> PbReceiver<F> {
    pub fn new(name: impl Into<String>, limit: Option<u64>, callback: F) -> Self {
        PbReceiver {
            name: name.into(),
            framer: LineFramer::new(DEFAULT_THRESHOLD),
            ctx: DecodeContext::new(limit),
            callback,
        }
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.framer = LineFramer::new(threshold);
        self
    }

    /// Samples delivered so far
    pub fn count(&self) -> u64 {
        self.ctx.count()
    }

    pub fn context(&self) -> &DecodeContext {
        &self.ctx
    }

    pub fn on_bytes(&mut self, chunk: &[u8]) -> Result<(), ReceiveError> {
        self.framer.push(chunk);
        if self.framer.is_ready() {
            let lines = self.framer.drain();
            self.process(lines)?;
        }
        Ok(())
    }

    /// End of the response, anything still held is a final record
    pub fn on_complete(mut self) -> Result<u64, ReceiveError> {
        let lines = self.framer.flush();
        self.process(lines)?;

        debug!("All available samples received for {}", self.name);
        Ok(self.ctx.count())
    }

    /// The response broke off.
    ///
    /// The appliance closes the connection once it has sent `limit` samples,
    /// so that case resolves with the count instead of an error.
    pub fn on_error<E>(mut self, cause: E) -> Result<u64, ReceiveError>
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        let lines = self.framer.drain();
        self.process(lines)?;

        if self.ctx.limit_reached() {
            debug!("Lost connection to {} after data count reached", self.name);
            return Ok(self.ctx.count());
        }

        let source = cause.into();
        error!("Connection lost while reading {} ({})", self.name, source);
        Err(ReceiveError::Interrupted {
            name: self.name,
            delivered: self.ctx.count(),
            source,
        })
    }

    fn process(&mut self, lines: Lines) -> Result<(), ReceiveError> {
        if lines.is_empty() {
            return Ok(());
        }

        let batches = decode(lines, &mut self.ctx).map_err(|source| ReceiveError::Protocol {
            name: self.name.clone(),
            source,
        })?;

        for batch in batches {
            debug!("pushing {} samples: {}", batch.len(), self.name);
            (self.callback)(batch);
        }
        Ok(())
    }
}
