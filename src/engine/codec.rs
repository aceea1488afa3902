//! Newline record codec for engine stdio.
//!
//! Engine stdout is framed into `\n`-terminated records and engine stdin
//! receives one `\n`-terminated record per inbound message. Records are raw
//! bytes: signaling payloads are forwarded verbatim and need not be UTF-8.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use natty::engine::codec::RecordCodec;
//!
//! let records = FramedRead::new(child_stdout, RecordCodec::new());
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, Encoder};
use tracing::debug;

use crate::{AppError, Result};

/// Default maximum record length: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Newline-delimited record codec with a bounded record length.
///
/// Delegates framing to [`AnyDelimiterCodec`] seeking and writing `\n`.
///
/// # Decoder
///
/// Yields each record without its trailing `\n`; any other byte, including a
/// preceding `\r`, is kept. A record longer than the configured limit fails
/// with [`AppError::Io`]`("line too long: …")` instead of growing the buffer.
/// At end of stream an unterminated trailing fragment is discarded.
///
/// # Encoder
///
/// Writes `item` followed by a single `\n`.
#[derive(Debug)]
pub struct RecordCodec(AnyDelimiterCodec);

impl RecordCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a codec that rejects records longer than `max_length` bytes.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self(AnyDelimiterCodec::new_with_max_length(
            b"\n".to_vec(),
            b"\n".to_vec(),
            max_length,
        ))
    }

    /// Configured record length limit.
    #[must_use]
    pub fn max_length(&self) -> usize {
        self.0.max_length()
    }
}

impl Default for RecordCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for RecordCodec {
    type Item = Bytes;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        let max_length = self.max_length();
        self.0
            .decode(src)
            .map_err(|err| map_codec_error(err, max_length))
    }

    /// Unlike [`AnyDelimiterCodec::decode_eof`], drops an unterminated
    /// trailing fragment instead of yielding it as a record.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if let Some(record) = self.decode(src)? {
            return Ok(Some(record));
        }
        if !src.is_empty() {
            debug!(
                bytes = src.len(),
                "discarding unterminated record at end of stream"
            );
            src.clear();
            // The inner codec remembers how far it scanned the old buffer.
            *self = Self::with_max_length(self.max_length());
        }
        Ok(None)
    }
}

impl Encoder<Bytes> for RecordCodec {
    type Error = AppError;

    // AnyDelimiterCodec only encodes `AsRef<str>` items; records are raw bytes.
    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(item.len() + 1);
        dst.put(item);
        dst.put_u8(b'\n');
        Ok(())
    }
}

// ── Private helper ────────────────────────────────────────────────────────────

/// Map an [`AnyDelimiterCodecError`] to an [`AppError`].
fn map_codec_error(err: AnyDelimiterCodecError, max_length: usize) -> AppError {
    match err {
        AnyDelimiterCodecError::MaxChunkLengthExceeded => {
            AppError::Io(format!("line too long: exceeded {max_length} bytes"))
        }
        AnyDelimiterCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
