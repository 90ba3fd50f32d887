use pbstream::ReceiveError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApplError {
    #[error("not an Archiver Appliance")]
    NotAnAppliance,
    #[error("{code}: {url}")]
    Status { code: u16, url: String },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("malformed reply: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bad time range: {0}")]
    Time(#[from] time::error::Format),
    #[error(transparent)]
    Receive(#[from] ReceiveError),
}
