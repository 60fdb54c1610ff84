//! Composes a [`Transport`] fetch with the size-limiting and digest-checking
//! `Read` adapters in [`crate::io`] (C8 feeding C4/C5).

use crate::error::{self, Result};
use crate::io::{DigestRead, MaxSizeRead};
use crate::transport::Transport;
use std::io::Read;
use url::Url;

pub(crate) fn fetch_max_size(
    transport: &dyn Transport,
    url: Url,
    max_size: u64,
) -> Result<Box<dyn Read + Send>> {
    let read = transport.fetch(url.clone())?;
    Ok(Box::new(MaxSizeRead::new(read, url, max_size)))
}

pub(crate) fn fetch_sha256(
    transport: &dyn Transport,
    url: Url,
    max_size: u64,
    sha256: [u8; 32],
    path: impl Into<String>,
) -> Result<Box<dyn Read + Send>> {
    let read = fetch_max_size(transport, url, max_size)?;
    Ok(Box::new(DigestRead::sha256(read, sha256, path)))
}

/// Fetch an entire response body, enforcing `max_size` while streaming.
pub(crate) fn fetch_max_size_to_vec(transport: &dyn Transport, url: Url, max_size: u64) -> Result<Vec<u8>> {
    let mut read = fetch_max_size(transport, url.clone(), max_size)?;
    let mut buf = Vec::new();
    read.read_to_end(&mut buf)
        .map_err(|e| error::Error::FetchFailed {
            source: crate::transport::TransportError::new(
                crate::transport::TransportErrorKind::Other,
                url.as_str(),
                e,
            ),
        })?;
    Ok(buf)
}
