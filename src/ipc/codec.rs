//! Length-prefixed frame codec.
//!
//! A frame is a 4-byte big-endian payload length followed by that many
//! bytes of UTF-8 s-expression text.

use std::fmt;

/// Size of the length prefix.
pub const HEADER_LEN: usize = 4;

/// Largest payload a peer may announce (1 MiB).
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// A frame the decoder refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The header announced more than `MAX_FRAME_LEN` bytes. The stream
    /// cannot be resynchronized after this.
    TooLarge(usize),
    /// The payload was complete but not UTF-8. The frame is consumed and
    /// decoding can continue with the next one.
    InvalidUtf8 { valid_up_to: usize },
}

impl FrameError {
    /// Whether the connection must be closed after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::TooLarge(_))
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge(len) => {
                write!(f, "frame of {len} bytes exceeds limit of {MAX_FRAME_LEN}")
            }
            Self::InvalidUtf8 { valid_up_to } => {
                write!(f, "payload is not valid UTF-8 (byte {valid_up_to})")
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// Encode a payload as one frame.
pub fn encode(payload: &str) -> Vec<u8> {
    let bytes = payload.as_bytes();
    let mut out = Vec::with_capacity(HEADER_LEN + bytes.len());
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
    out
}

/// Incremental decoder over a byte stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the socket.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet decoded.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Announced length of the next frame, once its header has arrived.
    fn announced_len(&self) -> Option<usize> {
        let header: [u8; HEADER_LEN] = self.buf.get(..HEADER_LEN)?.try_into().ok()?;
        Some(u32::from_be_bytes(header) as usize)
    }

    /// Decode the next complete frame.
    ///
    /// `Ok(None)` means more bytes are needed. An oversize header is
    /// reported as soon as it arrives, without waiting for the payload,
    /// and the buffer is discarded.
    pub fn next_frame(&mut self) -> Result<Option<String>, FrameError> {
        let Some(len) = self.announced_len() else {
            return Ok(None);
        };
        if len > MAX_FRAME_LEN {
            self.buf.clear();
            return Err(FrameError::TooLarge(len));
        }
        let total = HEADER_LEN + len;
        if self.buf.len() < total {
            return Ok(None);
        }

        let payload: Vec<u8> = self.buf.drain(..total).skip(HEADER_LEN).collect();
        String::from_utf8(payload).map(Some).map_err(|e| FrameError::InvalidUtf8 {
            valid_up_to: e.utf8_error().valid_up_to(),
        })
    }
}
