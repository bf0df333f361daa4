//! Frame encoding and decoding for the RLPx wire format.
//!
//! A frame is the unit the multiplexer writes to the wire:
//!
//! ```text
//! header(16) ‖ header-mac(16) ‖ body(padded to 16) ‖ body-mac(16)
//! ```
//!
//! The header is `body-size(3, big endian) ‖ rlp-list ‖ zero padding`, where
//! the list is `[protocol-id]`, `[protocol-id, sequence-id]` or, for the
//! first frame of a chunked packet, `[protocol-id, sequence-id,
//! total-packet-size]`. The body is `rlp(cmd-id) ‖ payload` (no command id
//! on continuation frames), zero padded to a 16-byte boundary.
//!
//! Packets whose frame would exceed the protocol window are split by
//! [`chunk`] into one `Chunked0` frame followed by `ChunkedN` frames that
//! share a sequence id.

use crate::cipher::FrameCipher;
use crate::error::{FrameError, MultiplexerError};
use crate::{HEADER_SIZE, MAC_SIZE, PADDING};
use bytes::Bytes;
use rlp::{Rlp, RlpStream};

/// Largest body size the 3-byte header field can carry
pub const MAX_BODY_SIZE: usize = (1 << 24) - 1;

/// Largest `total-packet-size` a chunked-0 header can carry
pub const MAX_TOTAL_PAYLOAD_SIZE: usize = u32::MAX as usize;

/// Fixed bytes per frame besides the body
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + MAC_SIZE + MAC_SIZE;

/// Frame kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Complete packet in one frame
    Normal,
    /// First frame of a chunked packet
    Chunked0,
    /// Continuation frame of a chunked packet
    ChunkedN,
}

/// Round up to the next multiple of the padding unit.
#[must_use]
pub const fn ceil16(n: usize) -> usize {
    n.div_ceil(PADDING) * PADDING
}

/// Zero-pad `data` to a 16-byte boundary.
#[must_use]
pub fn rzpad16(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ceil16(data.len()));
    out.extend_from_slice(data);
    out.resize(ceil16(data.len()), 0);
    out
}

/// Encode a body size as the 3-byte big-endian header prefix.
///
/// # Errors
///
/// Returns [`FrameError::BodyTooLarge`] if the size needs more than 24 bits.
pub fn encode_body_size(size: usize) -> Result<[u8; 3], FrameError> {
    if size > MAX_BODY_SIZE {
        return Err(FrameError::BodyTooLarge(size));
    }
    let be = (size as u32).to_be_bytes();
    Ok([be[1], be[2], be[3]])
}

/// Read the body size from a decrypted header.
#[must_use]
pub fn decode_body_size(header: &[u8; HEADER_SIZE]) -> usize {
    usize::from(header[0]) << 16 | usize::from(header[1]) << 8 | usize::from(header[2])
}

/// One wire frame, before encryption.
///
/// The payload is a cheap [`Bytes`] slice of the packet payload, so chunking
/// a large packet does not copy it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    protocol_id: u16,
    cmd_id: u8,
    sequence_id: Option<u16>,
    frame_type: FrameType,
    payload: Bytes,
    total_payload_size: Option<usize>,
}

impl Frame {
    /// A frame carrying a complete packet.
    #[must_use]
    pub fn normal(protocol_id: u16, cmd_id: u8, payload: Bytes, sequence_id: Option<u16>) -> Self {
        Self {
            protocol_id,
            cmd_id,
            sequence_id,
            frame_type: FrameType::Normal,
            payload,
            total_payload_size: None,
        }
    }

    /// Protocol id
    #[must_use]
    pub fn protocol_id(&self) -> u16 {
        self.protocol_id
    }

    /// Command id (meaningless for `ChunkedN`)
    #[must_use]
    pub fn cmd_id(&self) -> u8 {
        self.cmd_id
    }

    /// Sequence id
    #[must_use]
    pub fn sequence_id(&self) -> Option<u16> {
        self.sequence_id
    }

    /// Frame kind
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    /// Payload slice carried by this frame
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Full unpadded body size of the chunked packet (`Chunked0` only)
    #[must_use]
    pub fn total_payload_size(&self) -> Option<usize> {
        self.total_payload_size
    }

    /// RLP-encoded command id, empty for continuation frames.
    #[must_use]
    pub fn enc_cmd_id(&self) -> Vec<u8> {
        match self.frame_type {
            FrameType::ChunkedN => Vec::new(),
            FrameType::Normal | FrameType::Chunked0 => rlp::encode(&self.cmd_id).to_vec(),
        }
    }

    fn enc_cmd_len(&self) -> usize {
        match self.frame_type {
            FrameType::ChunkedN => 0,
            // 0x81 ‖ byte above 0x7f, single byte otherwise (0x80 for zero)
            FrameType::Normal | FrameType::Chunked0 => {
                if self.cmd_id >= 0x80 { 2 } else { 1 }
            }
        }
    }

    /// Unpadded body size: encoded command id plus payload.
    #[must_use]
    pub fn body_size(&self) -> usize {
        self.enc_cmd_len() + self.payload.len()
    }

    /// Body size rounded up to the padding unit.
    #[must_use]
    pub fn padded_body_size(&self) -> usize {
        ceil16(self.body_size())
    }

    /// Total bytes this frame occupies on the wire.
    #[must_use]
    pub fn frame_size(&self) -> usize {
        FRAME_OVERHEAD + self.padded_body_size()
    }

    /// Build the 16-byte header.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::BodyTooLarge`] for a body over 24 bits and
    /// [`FrameError::InvalidHeader`] if a chunked frame lacks a sequence id or
    /// the list does not fit.
    pub fn header(&self) -> Result<[u8; HEADER_SIZE], FrameError> {
        let size = encode_body_size(self.body_size())?;

        let stream = match (self.frame_type, self.sequence_id) {
            (FrameType::Chunked0, Some(sid)) => {
                let total = self
                    .total_payload_size
                    .ok_or(FrameError::InvalidHeader("chunked-0 frame without total size"))?;
                if total > MAX_TOTAL_PAYLOAD_SIZE {
                    return Err(FrameError::InvalidHeader("total payload size exceeds 32 bits"));
                }
                let mut s = RlpStream::new_list(3);
                s.append(&self.protocol_id).append(&sid).append(&(total as u64));
                s
            }
            (FrameType::Chunked0 | FrameType::ChunkedN, None) => {
                return Err(FrameError::InvalidHeader("chunked frame without sequence id"));
            }
            (_, Some(sid)) => {
                let mut s = RlpStream::new_list(2);
                s.append(&self.protocol_id).append(&sid);
                s
            }
            (_, None) => {
                let mut s = RlpStream::new_list(1);
                s.append(&self.protocol_id);
                s
            }
        };
        let header_data = stream.out();

        if 3 + header_data.len() > HEADER_SIZE {
            return Err(FrameError::InvalidHeader("header data too long"));
        }

        let mut header = [0u8; HEADER_SIZE];
        header[..3].copy_from_slice(&size);
        header[3..3 + header_data.len()].copy_from_slice(&header_data);
        Ok(header)
    }

    /// Build the padded body.
    #[must_use]
    pub fn body(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(self.padded_body_size());
        body.extend_from_slice(&self.enc_cmd_id());
        body.extend_from_slice(&self.payload);
        body.resize(self.padded_body_size(), 0);
        body
    }

    /// Encode the frame for the wire through `cipher`.
    ///
    /// # Errors
    ///
    /// Propagates header construction and cipher failures; returns
    /// [`FrameError::Format`] if the cipher output has the wrong length.
    pub fn encode<C: FrameCipher + ?Sized>(&self, cipher: &mut C) -> crate::Result<Vec<u8>> {
        let header = self.header()?;
        let body = self.body();
        let bytes = cipher.encrypt_frame(&header, &body)?;
        if bytes.len() != self.frame_size() {
            return Err(FrameError::Format("encoded frame has unexpected size").into());
        }
        Ok(bytes)
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Frame({:?}, len={}, protocol={} sid={:?})",
            self.frame_type,
            self.frame_size(),
            self.protocol_id,
            self.sequence_id
        )
    }
}

/// Split a packet into frames that each fit `window_size`.
///
/// A packet that fits is returned as a single `Normal` frame. Otherwise the
/// first frame is `Chunked0` (carrying the command id and the full body size)
/// and the rest are `ChunkedN`; every frame except the last fills the window
/// exactly.
///
/// # Errors
///
/// - [`FrameError::InvalidWindowSize`] if the window is not a multiple of 16
///   or too small to carry payload
/// - [`FrameError::InvalidHeader`] if chunking is needed without a sequence id
/// - [`FrameError::FrameTooLarge`] if a produced frame exceeds the window
pub fn chunk(
    protocol_id: u16,
    cmd_id: u8,
    payload: Bytes,
    sequence_id: Option<u16>,
    window_size: usize,
) -> Result<Vec<Frame>, FrameError> {
    if window_size % PADDING != 0 || window_size < FRAME_OVERHEAD + PADDING {
        return Err(FrameError::InvalidWindowSize(window_size));
    }

    let single = Frame::normal(protocol_id, cmd_id, payload, sequence_id);
    if single.frame_size() <= window_size {
        return Ok(vec![single]);
    }

    let sid = sequence_id.ok_or(FrameError::InvalidHeader("chunked frame without sequence id"))?;
    let capacity = window_size - FRAME_OVERHEAD;
    let total = single.body_size();
    let enc_len = single.enc_cmd_len();
    let mut rest = single.payload;

    let first_len = capacity.saturating_sub(enc_len).min(rest.len());
    let mut frames = Vec::with_capacity(1 + (rest.len() - first_len).div_ceil(capacity));
    frames.push(Frame {
        protocol_id,
        cmd_id,
        sequence_id: Some(sid),
        frame_type: FrameType::Chunked0,
        payload: rest.split_to(first_len),
        total_payload_size: Some(total),
    });

    while !rest.is_empty() {
        let take = capacity.min(rest.len());
        frames.push(Frame {
            protocol_id,
            cmd_id,
            sequence_id: Some(sid),
            frame_type: FrameType::ChunkedN,
            payload: rest.split_to(take),
            total_payload_size: None,
        });
    }

    for frame in &frames {
        if frame.frame_size() > window_size {
            return Err(FrameError::FrameTooLarge {
                size: frame.frame_size(),
                window: window_size,
            });
        }
    }

    Ok(frames)
}

/// Parsed contents of a decrypted header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Unpadded body size
    pub body_size: usize,
    /// Protocol id
    pub protocol_id: u16,
    /// Sequence id, if present
    pub sequence_id: Option<u16>,
    /// Full body size of a chunked packet (`Chunked0` only)
    pub total_payload_size: Option<usize>,
}

impl FrameHeader {
    /// Parse a decrypted header.
    ///
    /// Trailing zero padding after the RLP list is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`MultiplexerError::InvalidHeader`] for malformed RLP or an
    /// unexpected list length.
    pub fn parse(header: &[u8; HEADER_SIZE]) -> Result<Self, MultiplexerError> {
        let data = &header[3..];
        let info = Rlp::new(data)
            .payload_info()
            .map_err(|_| MultiplexerError::InvalidHeader("invalid rlp data"))?;
        let end = info.header_len + info.value_len;
        if end > data.len() {
            return Err(MultiplexerError::InvalidHeader("header list truncated"));
        }

        let list = Rlp::new(&data[..end]);
        if !list.is_list() {
            return Err(MultiplexerError::InvalidHeader("header data is not a list"));
        }
        let count = list
            .item_count()
            .map_err(|_| MultiplexerError::InvalidHeader("invalid rlp data"))?;
        if !(1..=3).contains(&count) {
            return Err(MultiplexerError::InvalidHeader("unexpected header list length"));
        }

        let protocol_id: u16 = list
            .val_at(0)
            .map_err(|_| MultiplexerError::InvalidHeader("invalid protocol id"))?;
        let sequence_id = if count > 1 {
            Some(
                list.val_at::<u16>(1)
                    .map_err(|_| MultiplexerError::InvalidHeader("invalid sequence id"))?,
            )
        } else {
            None
        };
        let total_payload_size = if count == 3 {
            let total: u32 = list
                .val_at(2)
                .map_err(|_| MultiplexerError::InvalidHeader("invalid total payload size"))?;
            Some(total as usize)
        } else {
            None
        };

        Ok(Self {
            body_size: decode_body_size(header),
            protocol_id,
            sequence_id,
            total_payload_size,
        })
    }

    /// Whether this header opens a chunked packet
    #[must_use]
    pub fn is_chunked_0(&self) -> bool {
        self.total_payload_size.is_some()
    }

    /// Bytes the full frame occupies on the wire.
    #[must_use]
    pub fn frame_size(&self) -> usize {
        FRAME_OVERHEAD + ceil16(self.body_size)
    }
}

/// Split a decrypted `Normal`/`Chunked0` body into command id and payload.
///
/// Returns the command id and the length of its encoding.
///
/// # Errors
///
/// Returns [`MultiplexerError::InvalidBody`] if the body does not start with
/// a valid single-byte RLP integer.
pub fn decode_cmd_id(body: &[u8]) -> Result<(u8, usize), MultiplexerError> {
    let info = Rlp::new(body)
        .payload_info()
        .map_err(|_| MultiplexerError::InvalidBody("missing command id"))?;
    let len = info.header_len + info.value_len;
    if len > body.len() {
        return Err(MultiplexerError::InvalidBody("command id truncated"));
    }
    let cmd_id: u8 = Rlp::new(&body[..len])
        .as_val()
        .map_err(|_| MultiplexerError::InvalidBody("invalid command id"))?;
    Ok((cmd_id, len))
}
