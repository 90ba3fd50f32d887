//! Client for the Archiver Appliance retrieval and management interfaces.
//!
//! The info URL names the two other endpoints, it is fetched on first use and
//! kept for a while. Any unexpected status from a later request drops it so
//! the next call asks again.
pub mod error;
pub mod info;

pub use error::ApplError;
pub use info::ApplianceInfo;

use std::sync::Mutex;
use std::time::{Duration, Instant};

use http::StatusCode;
use log::{debug, info};
use pbstream::{Batch, PbReceiver, DEFAULT_THRESHOLD};
use reqwest::{Client, Response};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Appliance {
    client: Client,
    info_url: String,
    ttl: Duration,
    rx_buf_size: usize,
    cache: Mutex<Option<(Instant, ApplianceInfo)>>,
}

impl Appliance {
    pub fn new(info_url: impl Into<String>, ttl: Duration) -> Result<Self, ApplError> {
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;

        Ok(Appliance {
            client,
            info_url: info_url.into(),
            ttl,
            rx_buf_size: DEFAULT_THRESHOLD,
            cache: Mutex::new(None),
        })
    }

    /// Bytes held before a data reply is decoded
    pub fn with_rx_buf_size(mut self, size: usize) -> Self {
        self.rx_buf_size = size;
        self
    }

    pub fn info_url(&self) -> &str {
        &self.info_url
    }

    pub async fn info(&self) -> Result<ApplianceInfo, ApplError> {
        if let Some(info) = self.cached() {
            return Ok(info);
        }

        debug!("Query: {}", self.info_url);
        let response = self.client.get(&self.info_url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ApplError::NotAnAppliance);
        }
        let response = self.check(response)?;

        let body = response.bytes().await?;
        let info: ApplianceInfo = serde_json::from_slice(&body)?;

        info!("Appliance info");
        for (k, v) in info.entries() {
            info!(" {}: {}", k, v);
        }

        *self.lock() = Some((Instant::now(), info.clone()));
        Ok(info)
    }

    /// Names of every channel matching the regular expression
    pub async fn search(&self, pattern: &str) -> Result<Vec<String>, ApplError> {
        let url = self.info().await?.search_url();

        debug!("Query: {} regex={}", url, pattern);
        let response = self
            .client
            .get(&url)
            .query(&[("regex", pattern)])
            .send()
            .await?;
        let response = self.check(response)?;

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Stream the samples of `pv` between `start` and `end` into `callback`.
    ///
    /// At most `count` samples are delivered, `None` or `Some(0)` for all of
    /// them. Returns the number delivered. Dropping the future closes the
    /// connection and no further batches are delivered.
    pub async fn fetch<F>(
        &self,
        pv: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
        count: Option<u64>,
        callback: F,
    ) -> Result<u64, ApplError>
    where
        F: FnMut(Batch),
    {
        let url = self.info().await?.data_url();
        let query = [
            ("pv", pv.to_string()),
            ("from", start.format(&Rfc3339)?),
            ("to", end.format(&Rfc3339)?),
            ("donotchunk", "true".to_string()),
        ];

        debug!("Query: {} {:?}", url, query);
        let response = self.client.get(&url).query(&query).send().await?;
        let mut response = self.check(response)?;

        let mut rx = PbReceiver::new(pv, count, callback).with_threshold(self.rx_buf_size);
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => rx.on_bytes(&chunk)?,
                Ok(None) => return Ok(rx.on_complete()?),
                Err(e) => return Ok(rx.on_error(e)?),
            }
        }
    }

    /// Drop the cached info
    pub fn invalidate(&self) {
        *self.lock() = None;
    }

    fn check(&self, response: Response) -> Result<Response, ApplError> {
        if response.status() != StatusCode::OK {
            // The server may have changed on us
            self.invalidate();
            return Err(ApplError::Status {
                code: response.status().as_u16(),
                url: response.url().to_string(),
            });
        }
        Ok(response)
    }

    fn cached(&self) -> Option<ApplianceInfo> {
        match &*self.lock() {
            Some((at, info)) if at.elapsed() < self.ttl => Some(info.clone()),
            _ => None,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<(Instant, ApplianceInfo)>> {
        // The cache is always left whole, a poisoned lock is still usable
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}
