//! Length-prefixed framing for feeding a sink from a byte stream.
//!
//! ```text
//! +----------------+---------------------+
//! | len: u32 (BE)  | payload: [u8; len]  |
//! +----------------+---------------------+
//! ```
//!
//! A zero-length frame is valid and yields an empty item.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::DEFAULT_MAX_FRAME_LEN;
use crate::error::FrameError;

const LEN_PREFIX: usize = 4;

/// Splits an async byte stream into raw frames.
pub struct FrameReader<R> {
    inner: R,
    max_len: usize,
    frames_read: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_len(inner, DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_len(inner: R, max_len: usize) -> Self {
        Self {
            inner,
            max_len,
            frames_read: 0,
        }
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` on a clean end of stream, i.e. EOF before any byte
    /// of a length prefix. EOF anywhere inside a frame is [`FrameError::Truncated`].
    pub async fn next_frame(&mut self) -> Result<Option<Bytes>, FrameError> {
        let mut prefix = [0u8; LEN_PREFIX];
        let got = read_full(&mut self.inner, &mut prefix).await?;
        if got == 0 {
            return Ok(None);
        }
        if got < LEN_PREFIX {
            return Err(FrameError::Truncated {
                expected: LEN_PREFIX,
                got,
            });
        }

        let len = u32::from_be_bytes(prefix) as usize;
        if len > self.max_len {
            return Err(FrameError::TooLarge {
                len,
                max: self.max_len,
            });
        }

        let mut payload = vec![0u8; len];
        let got = read_full(&mut self.inner, &mut payload).await?;
        if got < len {
            return Err(FrameError::Truncated { expected: len, got });
        }

        self.frames_read += 1;
        Ok(Some(Bytes::from(payload)))
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Write one length-prefixed frame. Does not flush.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), FrameError> {
    let len: u32 = payload.len().try_into().map_err(|_| FrameError::TooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    Ok(())
}

/// Fill `buf` as far as the stream allows; returns how many bytes landed.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
