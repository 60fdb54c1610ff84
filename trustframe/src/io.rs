//! Sync `Read` adapters composed around a [`Transport`](crate::transport::Transport)
//! stream: one enforces a byte ceiling while streaming, the other checks a
//! running SHA-256 digest against an expected value once the wrapped reader
//! reaches EOF. Both fail mid-stream rather than buffering the whole
//! response, so an oversized or tampered response is caught without holding
//! it all in memory first.

use crate::error;
use aws_lc_rs::digest::{Context, SHA256};
use std::io::{self, Read};
use url::Url;

/// Wraps a `Read`, erroring once more than `max_size` bytes have been read.
pub(crate) struct MaxSizeRead<R> {
    inner: R,
    url: Url,
    max_size: u64,
    read_so_far: u64,
}

impl<R: Read> MaxSizeRead<R> {
    pub(crate) fn new(inner: R, url: Url, max_size: u64) -> Self {
        Self {
            inner,
            url,
            max_size,
            read_so_far: 0,
        }
    }
}

impl<R: Read> Read for MaxSizeRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read_so_far += n as u64;
        if self.read_so_far > self.max_size {
            return Err(io::Error::other(
                error::OversizedResponseSnafu {
                    url: self.url.clone(),
                    limit: self.max_size,
                }
                .build(),
            ));
        }
        Ok(n)
    }
}

/// Wraps a `Read`, computing a running SHA-256 digest and comparing it to
/// `expected` once the underlying reader reports EOF. `path` is carried only
/// for the error message.
pub(crate) struct DigestRead<R> {
    inner: R,
    context: Context,
    expected: [u8; 32],
    path: String,
    checked: bool,
}

impl<R: Read> DigestRead<R> {
    pub(crate) fn sha256(inner: R, expected: [u8; 32], path: impl Into<String>) -> Self {
        Self {
            inner,
            context: Context::new(&SHA256),
            expected,
            path: path.into(),
            checked: false,
        }
    }
}

impl<R: Read> Read for DigestRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            if !self.checked {
                self.checked = true;
                let digest = self.context.clone().finish();
                if digest.as_ref() != self.expected {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        error::TargetHashMismatchSnafu {
                            path: self.path.clone(),
                            expected: hex::encode(self.expected),
                            got: hex::encode(digest.as_ref()),
                        }
                        .build(),
                    ));
                }
            }
            return Ok(0);
        }
        self.context.update(&buf[..n]);
        Ok(n)
    }
}
