//! Message framing for the wire protocol.
//!
//! Every frame is a 4-byte big-endian unsigned length followed by exactly
//! that many payload bytes. A zero-length payload is a valid frame and is
//! distinct from end-of-stream.

use crate::error::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Maximum frame payload size representable by the length header.
pub const MAX_FRAME_SIZE: usize = u32::MAX as usize;

/// Frame header size (4-byte big-endian payload length).
pub const FRAME_HEADER_SIZE: usize = 4;

/// Codec for encoding/decoding length-prefixed frames.
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    /// Create a new frame codec.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Create a codec with a custom max frame size.
    #[must_use]
    pub const fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(
        &mut self,
        buf: &mut BytesMut,
    ) -> std::result::Result<Option<Self::Item>, Self::Error> {
        // Need the full header before the payload length is known
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        // Parse header without consuming
        let mut header = &buf[..FRAME_HEADER_SIZE];
        let payload_len = header.get_u32() as usize;

        // Validate frame size
        if payload_len > self.max_frame_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                ProtocolError::FrameTooLarge {
                    size: payload_len,
                    max: self.max_frame_size,
                },
            ));
        }

        // Check if we have the full frame
        let frame_len = FRAME_HEADER_SIZE + payload_len;
        if buf.len() < frame_len {
            // Reserve space for the full frame
            buf.reserve(frame_len - buf.len());
            return Ok(None);
        }

        // Consume header and payload
        buf.advance(FRAME_HEADER_SIZE);
        Ok(Some(buf.split_to(payload_len).freeze()))
    }

    fn decode_eof(
        &mut self,
        buf: &mut BytesMut,
    ) -> std::result::Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            // A clean close lands exactly on a frame boundary; anything left
            // over means the peer died mid-frame.
            None if buf.is_empty() => Ok(None),
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                ProtocolError::TruncatedFrame,
            )),
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = io::Error;

    fn encode(
        &mut self,
        payload: Bytes,
        buf: &mut BytesMut,
    ) -> std::result::Result<(), Self::Error> {
        let payload_len = payload.len();

        // Validate frame size
        if payload_len > self.max_frame_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                ProtocolError::FrameTooLarge {
                    size: payload_len,
                    max: self.max_frame_size,
                },
            ));
        }

        // Write header then payload
        buf.reserve(FRAME_HEADER_SIZE + payload_len);
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u32(payload_len as u32);
        buf.put(payload);

        Ok(())
    }
}
