//! Frame encoding and decoding
//!
//! Outbound envelopes are always JSON text. Inbound frames are JSON text, or
//! binary chunks of a zlib stream that spans the whole connection when
//! compression was requested.

use flate2::{Decompress, FlushDecompress, Status};

use super::{GatewayEnvelope, GatewayMessage};
use crate::error::CodecError;
use crate::transport::Frame;

/// Marker ending every complete message in a zlib-stream connection
const ZLIB_SUFFIX: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

/// Per-connection codec
///
/// Holds the inflate context, so it must be replaced (or `reset`) whenever a
/// new socket is opened.
#[derive(Debug)]
pub struct Codec {
    inflater: Option<ZlibStream>,
}

impl Codec {
    #[must_use]
    pub fn new(compress: bool) -> Self {
        Self {
            inflater: compress.then(ZlibStream::new),
        }
    }

    /// Drop any buffered bytes and start a fresh inflate context
    pub fn reset(&mut self) {
        if let Some(inflater) = &mut self.inflater {
            *inflater = ZlibStream::new();
        }
    }

    /// Encode an outbound message as a text frame
    pub fn encode(message: &GatewayMessage) -> Result<Frame, CodecError> {
        message
            .to_json()
            .map(Frame::Text)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Decode a text frame
    pub fn decode_text(&self, text: &str) -> Result<GatewayEnvelope, CodecError> {
        GatewayEnvelope::from_json(text)
    }

    /// Decode a binary frame
    ///
    /// Returns `Ok(None)` while a compressed message is still incomplete.
    pub fn decode_binary(&mut self, bytes: &[u8]) -> Result<Option<GatewayEnvelope>, CodecError> {
        match &mut self.inflater {
            Some(inflater) => match inflater.push(bytes)? {
                Some(json) => GatewayEnvelope::from_slice(&json).map(Some),
                None => Ok(None),
            },
            None => GatewayEnvelope::from_slice(bytes).map(Some),
        }
    }
}

/// Connection-wide zlib inflate context
struct ZlibStream {
    inflater: Decompress,
    buffer: Vec<u8>,
}

impl std::fmt::Debug for ZlibStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZlibStream")
            .field("total_in", &self.inflater.total_in())
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

impl ZlibStream {
    fn new() -> Self {
        Self {
            inflater: Decompress::new(true),
            buffer: Vec::new(),
        }
    }

    /// Buffer a chunk; inflate once the buffer ends with the sync-flush marker
    fn push(&mut self, chunk: &[u8]) -> Result<Option<Vec<u8>>, CodecError> {
        self.buffer.extend_from_slice(chunk);
        if !self.buffer.ends_with(&ZLIB_SUFFIX) {
            return Ok(None);
        }

        let mut out = Vec::with_capacity(self.buffer.len().saturating_mul(4).max(1024));
        let mut offset = 0;
        loop {
            let before_in = self.inflater.total_in();
            let before_out = self.inflater.total_out();
            let status = match self.inflater.decompress_vec(
                &self.buffer[offset..],
                &mut out,
                FlushDecompress::Sync,
            ) {
                Ok(status) => status,
                Err(e) => {
                    self.buffer.clear();
                    return Err(CodecError::Decompress(e.to_string()));
                }
            };
            let consumed = usize::try_from(self.inflater.total_in() - before_in)
                .map_err(|e| CodecError::Decompress(e.to_string()))?;
            let produced = self.inflater.total_out() - before_out;
            offset += consumed;

            if status == Status::StreamEnd {
                break;
            }
            if out.len() < out.capacity() {
                // output had room, so everything available for this input is out
                if offset >= self.buffer.len() {
                    break;
                }
                if consumed == 0 && produced == 0 {
                    self.buffer.clear();
                    return Err(CodecError::Decompress("inflate stalled".to_string()));
                }
            } else {
                out.reserve(out.capacity());
            }
        }

        self.buffer.clear();
        Ok(Some(out))
    }
}
