//! Fair sub-protocol multiplexing over one framed session.
//!
//! Every registered protocol owns three frame queues: priority, normal and
//! chunked. Protocols are served round robin; each turn drains up to the
//! protocol window (the total window divided among active protocols) from
//! that protocol's queues, alternating between them so that priority and
//! normal frames are not starved by a large chunked transfer.
//!
//! Frames are queued unencrypted and only encoded when handed out in
//! [`pop_all_frames_as_bytes`](Multiplexer::pop_all_frames_as_bytes) or
//! [`encode_frame`](Multiplexer::encode_frame), since the session cipher is
//! a stream and must see frames in wire order.
//!
//! The decode side accepts arbitrary byte slices, buffers partial frames and
//! reassembles chunked packets per `(protocol_id, sequence_id)`.

use crate::cipher::{FrameCipher, PlainFrameCipher};
use crate::config::{MIN_WINDOW_SIZE, MultiplexerConfig};
use crate::error::{FrameError, MultiplexerError};
use crate::frame::{self, Frame, FrameHeader, ceil16, decode_body_size, decode_cmd_id};
use crate::packet::Packet;
use crate::{HEADER_SIZE, MAC_SIZE, PADDING};
use bytes::{Buf, Bytes, BytesMut};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, trace, warn};

/// Chunked packets a single protocol may be reassembling at once
pub const MAX_CHUNK_BUFFERS: usize = 16;

/// Partially received chunked packet
#[derive(Debug)]
struct ChunkBuffer {
    packet: Packet,
    data: BytesMut,
}

impl ChunkBuffer {
    fn remaining(&self) -> usize {
        self.packet.total_payload_size.unwrap_or(0) - self.data.len()
    }
}

#[derive(Debug, Default)]
struct ProtocolState {
    priority: VecDeque<Frame>,
    normal: VecDeque<Frame>,
    chunked: VecDeque<Frame>,
    next_sequence: u16,
    chunk_buffers: HashMap<u16, ChunkBuffer>,
}

impl ProtocolState {
    fn is_active(&self) -> bool {
        !(self.priority.is_empty() && self.normal.is_empty() && self.chunked.is_empty())
    }

    fn queue(&mut self, index: usize) -> &mut VecDeque<Frame> {
        match index {
            0 => &mut self.priority,
            1 => &mut self.normal,
            _ => &mut self.chunked,
        }
    }
}

/// Frame scheduler and packet reassembler for one connection.
///
/// Generic over the [`FrameCipher`] used to encode and decode frames; the
/// default [`PlainFrameCipher`] writes zero MACs.
#[derive(Debug)]
pub struct Multiplexer<C: FrameCipher = PlainFrameCipher> {
    config: MultiplexerConfig,
    cipher: C,
    order: Vec<u16>,
    protocols: HashMap<u16, ProtocolState>,
    last_protocol: Option<u16>,
    decode_buffer: BytesMut,
    cached_header: Option<[u8; HEADER_SIZE]>,
}

impl Multiplexer<PlainFrameCipher> {
    /// Multiplexer with unencrypted framing.
    #[must_use]
    pub fn new(config: MultiplexerConfig) -> Self {
        Self::with_cipher(config, PlainFrameCipher)
    }
}

impl<C: FrameCipher> Multiplexer<C> {
    /// Multiplexer that encodes and decodes frames through `cipher`.
    #[must_use]
    pub fn with_cipher(config: MultiplexerConfig, cipher: C) -> Self {
        Self {
            config,
            cipher,
            order: Vec::new(),
            protocols: HashMap::new(),
            last_protocol: None,
            decode_buffer: BytesMut::new(),
            cached_header: None,
        }
    }

    /// Active limits
    #[must_use]
    pub fn config(&self) -> &MultiplexerConfig {
        &self.config
    }

    /// Bound frame cipher
    #[must_use]
    pub fn cipher(&self) -> &C {
        &self.cipher
    }

    /// Bound frame cipher, mutably
    pub fn cipher_mut(&mut self) -> &mut C {
        &mut self.cipher
    }

    // ------------------------------------------------------------------
    // Protocol registry
    // ------------------------------------------------------------------

    /// Register a sub-protocol. It joins the end of the round-robin order and
    /// becomes the cursor position.
    ///
    /// # Errors
    ///
    /// Returns [`MultiplexerError::DuplicateProtocol`] if `id` is known.
    pub fn add_protocol(&mut self, id: u16) -> Result<(), MultiplexerError> {
        if self.protocols.contains_key(&id) {
            return Err(MultiplexerError::DuplicateProtocol(id));
        }
        self.protocols.insert(id, ProtocolState::default());
        self.order.push(id);
        self.last_protocol = Some(id);
        debug!("protocol {} added", id);
        Ok(())
    }

    /// Registered protocol ids in round-robin order
    #[must_use]
    pub fn protocols(&self) -> &[u16] {
        &self.order
    }

    /// Whether `id` has queued frames
    #[must_use]
    pub fn is_active_protocol(&self, id: u16) -> bool {
        self.protocols.get(&id).is_some_and(ProtocolState::is_active)
    }

    /// Number of protocols with queued frames
    #[must_use]
    pub fn num_active_protocols(&self) -> usize {
        self.protocols.values().filter(|p| p.is_active()).count()
    }

    /// Per-protocol byte budget, rounded down to the padding unit.
    ///
    /// With `Some(id)` for a protocol that is not active yet, the budget is
    /// computed as if it already were.
    #[must_use]
    pub fn protocol_window_size(&self, id: Option<u16>) -> usize {
        let active = self.num_active_protocols();
        let size = match id {
            Some(id) if !self.is_active_protocol(id) => self.config.max_window_size / (1 + active),
            _ => self.config.max_window_size / active.max(1),
        };
        size - size % PADDING
    }

    /// Advance the round-robin cursor and return the protocol it lands on.
    pub fn next_protocol(&mut self) -> Option<u16> {
        let position = self
            .last_protocol
            .and_then(|last| self.order.iter().position(|&id| id == last));
        let next = match position {
            Some(i) if i + 1 < self.order.len() => self.order[i + 1],
            _ => *self.order.first()?,
        };
        self.last_protocol = Some(next);
        Some(next)
    }

    // ------------------------------------------------------------------
    // Send path
    // ------------------------------------------------------------------

    /// Frame a packet and queue its frames.
    ///
    /// The packet gets the protocol's next sequence id and is chunked to
    /// the protocol window. A prioritized packet must produce a single frame
    /// no larger than `max_priority_frame_size`.
    ///
    /// # Errors
    ///
    /// - [`MultiplexerError::UnknownProtocol`] for an unregistered protocol
    /// - [`FrameError::PayloadTooLarge`] above `max_payload_size`
    /// - [`FrameError::PriorityFrame`] for an oversized priority packet
    /// - chunking failures from [`frame::chunk`]
    pub fn add_packet(&mut self, packet: Packet) -> crate::Result<()> {
        let window = self
            .protocol_window_size(Some(packet.protocol_id))
            .max(MIN_WINDOW_SIZE);
        let limit = self.config.max_payload_size;
        let max_priority = self.config.max_priority_frame_size;

        let state = self
            .protocols
            .get_mut(&packet.protocol_id)
            .ok_or(MultiplexerError::UnknownProtocol(packet.protocol_id))?;

        if packet.len() > limit {
            return Err(FrameError::PayloadTooLarge {
                size: packet.len(),
                limit,
            }
            .into());
        }

        let sequence_id = state.next_sequence;
        let frames = frame::chunk(
            packet.protocol_id,
            packet.cmd_id,
            packet.payload,
            Some(sequence_id),
            window,
        )?;

        if packet.prioritize {
            let [single] = <[Frame; 1]>::try_from(frames)
                .map_err(|_| FrameError::PriorityFrame("priority packet must fit one frame"))?;
            if single.frame_size() > max_priority {
                return Err(FrameError::PriorityFrame("frame too large for priority packet").into());
            }
            state.priority.push_back(single);
        } else if frames.len() == 1 {
            state.normal.extend(frames);
        } else {
            trace!(
                "packet on protocol {} split into {} frames (sid {})",
                packet.protocol_id,
                frames.len(),
                sequence_id
            );
            state.chunked.extend(frames);
        }

        state.next_sequence = sequence_id.wrapping_add(1);
        Ok(())
    }

    /// Drain up to one protocol window of frames from `id`.
    ///
    /// Each pass takes at most one frame from each of the priority, normal
    /// and chunked queues, and at most two in total. A head frame larger
    /// than the remaining budget is left for a later call, unless nothing
    /// has been taken yet in this call.
    pub fn pop_frames_for_protocol(&mut self, id: u16) -> Vec<Frame> {
        let window = self.protocol_window_size(None);
        let Some(state) = self.protocols.get_mut(&id) else {
            return Vec::new();
        };

        let mut frames = Vec::new();
        let mut size = 0;

        while size < window {
            let mut added = 0;

            for index in 0..3 {
                let queue = state.queue(index);
                if let Some(head) = queue.front() {
                    let frame_size = head.frame_size();
                    if size + frame_size <= window || frames.is_empty() {
                        if let Some(frame) = queue.pop_front() {
                            frames.push(frame);
                            size += frame_size;
                            added += 1;
                        }
                    }
                }
                if added == 2 {
                    break;
                }
            }

            if added == 0 {
                break;
            }
        }

        frames
    }

    /// Frames of the next protocol (in round-robin order) that has any.
    pub fn pop_frames(&mut self) -> Vec<Frame> {
        let Some(start) = self.next_protocol() else {
            return Vec::new();
        };
        let Some(index) = self.order.iter().position(|&id| id == start) else {
            return Vec::new();
        };

        let rotation: Vec<u16> = self.order[index..]
            .iter()
            .chain(&self.order[..index])
            .copied()
            .collect();
        for id in rotation {
            let frames = self.pop_frames_for_protocol(id);
            if !frames.is_empty() {
                return frames;
            }
        }
        Vec::new()
    }

    /// Drain every queued frame in scheduling order.
    pub fn pop_all_frames(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        loop {
            let popped = self.pop_frames();
            if popped.is_empty() {
                return frames;
            }
            frames.extend(popped);
        }
    }

    /// Encode one frame through the bound cipher.
    ///
    /// # Errors
    ///
    /// Propagates cipher and header failures.
    pub fn encode_frame(&mut self, frame: &Frame) -> crate::Result<Vec<u8>> {
        frame.encode(&mut self.cipher)
    }

    /// Drain and encode every queued frame into one byte string.
    ///
    /// # Errors
    ///
    /// Propagates cipher and header failures.
    pub fn pop_all_frames_as_bytes(&mut self) -> crate::Result<Vec<u8>> {
        let frames = self.pop_all_frames();
        let mut out = Vec::with_capacity(frames.iter().map(Frame::frame_size).sum());
        for frame in &frames {
            out.extend_from_slice(&self.encode_frame(frame)?);
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Receive path
    // ------------------------------------------------------------------

    /// Bytes buffered but not yet decoded
    #[must_use]
    pub fn decode_buffer_len(&self) -> usize {
        self.decode_buffer.len()
    }

    /// Append `data` and decode every complete frame now buffered.
    ///
    /// Returns the packets completed by those frames; an incomplete frame
    /// stays buffered for the next call.
    ///
    /// # Errors
    ///
    /// Any error leaves the stream unusable:
    /// - [`SessionError::Authentication`](crate::SessionError::Authentication)
    ///   on a MAC mismatch
    /// - [`MultiplexerError`] for malformed headers/bodies, unknown protocols
    ///   or chunk bookkeeping violations
    pub fn decode(&mut self, data: &[u8]) -> crate::Result<Vec<Packet>> {
        self.decode_buffer.extend_from_slice(data);
        let mut packets = Vec::new();

        loop {
            let header = match self.cached_header {
                Some(header) => header,
                None => {
                    if self.decode_buffer.len() < HEADER_SIZE + MAC_SIZE {
                        break;
                    }
                    let header = self.cipher.decrypt_header(&self.decode_buffer)?;
                    self.cached_header = Some(header);
                    header
                }
            };

            let body_size = decode_body_size(&header);
            let required = HEADER_SIZE + MAC_SIZE + ceil16(body_size) + MAC_SIZE;
            if self.decode_buffer.len() < required {
                break;
            }

            let body = self
                .cipher
                .decrypt_body(&self.decode_buffer[HEADER_SIZE + MAC_SIZE..required], body_size)?;
            self.cached_header = None;
            self.decode_buffer.advance(required);

            if let Some(packet) = self.decode_frame(&header, body)? {
                packets.push(packet);
            }
        }

        Ok(packets)
    }

    fn decode_frame(&mut self, header: &[u8; HEADER_SIZE], body: Vec<u8>) -> Result<Option<Packet>, MultiplexerError> {
        let header = FrameHeader::parse(header).inspect_err(|e| warn!("dropping frame: {}", e))?;
        let protocol_id = header.protocol_id;
        let limit = self.config.max_payload_size;
        let window = self.protocol_window_size(None);

        let state = self
            .protocols
            .get_mut(&protocol_id)
            .ok_or(MultiplexerError::UnknownProtocol(protocol_id))?;

        if let Some(sequence_id) = header.sequence_id {
            if let Some(buffer) = state.chunk_buffers.get_mut(&sequence_id) {
                if header.is_chunked_0() {
                    return Err(MultiplexerError::DuplicateChunk {
                        protocol_id,
                        sequence_id,
                    });
                }
                if body.len() > buffer.remaining() {
                    return Err(MultiplexerError::ChunkOverflow {
                        protocol_id,
                        sequence_id,
                    });
                }

                buffer.data.extend_from_slice(&body);
                if buffer.remaining() > 0 {
                    return Ok(None);
                }

                let Some(ChunkBuffer { mut packet, data }) = state.chunk_buffers.remove(&sequence_id) else {
                    return Ok(None);
                };
                packet.payload = data.freeze();
                packet.total_payload_size = None;
                trace!(
                    "chunked packet complete on protocol {} (sid {}, {} bytes)",
                    protocol_id,
                    sequence_id,
                    packet.len()
                );
                return Ok(Some(packet));
            }
        }

        let (cmd_id, cmd_len) = decode_cmd_id(&body)?;
        let payload = Bytes::from(body).slice(cmd_len..);

        let Some(total) = header.total_payload_size else {
            return Ok(Some(Packet::new(protocol_id, cmd_id, payload)));
        };

        let total = total
            .checked_sub(cmd_len)
            .filter(|&total| total >= payload.len())
            .ok_or(MultiplexerError::InvalidBody("total payload size smaller than initial chunk"))?;
        if total > limit {
            return Err(MultiplexerError::PayloadTooLarge { size: total, limit });
        }
        if total == payload.len() {
            return Ok(Some(Packet::new(protocol_id, cmd_id, payload)));
        }

        let sequence_id = header
            .sequence_id
            .ok_or(MultiplexerError::InvalidHeader("chunked-0 frame without sequence id"))?;

        if state.chunk_buffers.len() >= MAX_CHUNK_BUFFERS {
            return Err(MultiplexerError::TooManyChunkBuffers {
                protocol_id,
                limit: MAX_CHUNK_BUFFERS,
            });
        }

        // grows as chunks arrive; the declared total is only a claim
        let mut data = BytesMut::with_capacity(total.min(window));
        data.extend_from_slice(&payload);
        let packet = Packet {
            total_payload_size: Some(total),
            ..Packet::new(protocol_id, cmd_id, Bytes::new())
        };
        trace!(
            "chunked packet started on protocol {} (sid {}, {} of {} bytes)",
            protocol_id,
            sequence_id,
            data.len(),
            total
        );
        state.chunk_buffers.insert(sequence_id, ChunkBuffer { packet, data });
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::frame::FrameType;

    fn mux() -> Multiplexer {
        let mut mux = Multiplexer::new(MultiplexerConfig::default());
        for id in [0, 1, 2] {
            mux.add_protocol(id).unwrap();
        }
        mux
    }

    #[test]
    fn test_frame() {
        let mut mux = mux();
        let packet0 = Packet::new(0, 0, vec![b'x'; 100]);
        mux.add_packet(packet0.clone()).unwrap();

        let frames = mux.pop_frames();
        assert_eq!(frames.len(), 1);

        let frame = &frames[0];
        let message = mux.encode_frame(frame).unwrap();
        assert_eq!(frame.frame_size(), message.len());

        let expected = ceil16(16 + 16 + frame.enc_cmd_id().len() + 100 + 16);
        assert_eq!(frame.frame_size(), expected);
        let body_start = 32 + frame.enc_cmd_id().len();
        assert_eq!(&message[body_start..body_start + 100], &packet0.payload[..]);

        let packets = mux.decode(&message).unwrap();
        assert_eq!(mux.decode_buffer_len(), 0);
        assert_eq!(packets, vec![packet0]);
    }

    #[test]
    fn test_chunked() {
        let mut mux = mux();
        let mut payload = vec![0u8; 8192 * 2];
        payload.push(b'x');
        let packet1 = Packet::new(1, 0, payload);

        mux.add_packet(packet1.clone()).unwrap();
        let frames = mux.pop_all_frames();
        let carried: usize = frames.iter().map(|f| f.payload().len()).sum();
        assert_eq!(carried, packet1.len());
        assert_eq!(frames[0].frame_type(), FrameType::Chunked0);

        let all_frames_length: usize = frames.iter().map(Frame::frame_size).sum();
        mux.add_packet(packet1.clone()).unwrap();
        let message = mux.pop_all_frames_as_bytes().unwrap();
        assert_eq!(message.len(), all_frames_length);

        let packets = mux.decode(&message).unwrap();
        assert_eq!(mux.decode_buffer_len(), 0);
        assert_eq!(packets, vec![packet1]);
    }

    #[test]
    fn test_chunked_big() {
        let mut mux = mux();
        let packet = Packet::new(0, 0, vec![0u8; 10 * 1024 * 1024]);
        mux.add_packet(packet.clone()).unwrap();

        let frames = mux.pop_all_frames();
        let mut packets = Vec::new();
        for frame in &frames {
            let bytes = mux.encode_frame(frame).unwrap();
            packets = mux.decode(&bytes).unwrap();
            if !packets.is_empty() {
                break;
            }
        }

        assert_eq!(mux.decode_buffer_len(), 0);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0], packet);
    }

    #[test]
    fn test_remain() {
        let mut mux = mux();
        let packet1 = Packet::new(1, 0, vec![0u8; 100]);
        mux.add_packet(packet1.clone()).unwrap();
        let mut message = mux.pop_all_frames_as_bytes().unwrap();

        let tail = message[..50].to_vec();
        message.extend_from_slice(&tail);
        let packets = mux.decode(&message).unwrap();

        assert_eq!(packets, vec![packet1]);
        assert_eq!(mux.decode_buffer_len(), tail.len());

        // Shifting by one byte leaves the stream misaligned
        assert!(mux.decode(&message[1..]).is_err());
    }

    #[test]
    fn test_round_robin_cursor() {
        let mut mux = mux();
        assert_eq!(mux.next_protocol(), Some(0));
        assert_eq!(mux.next_protocol(), Some(1));
        assert_eq!(mux.next_protocol(), Some(2));
        assert_eq!(mux.next_protocol(), Some(0));

        assert!(Multiplexer::new(MultiplexerConfig::default()).next_protocol().is_none());
    }

    #[test]
    fn test_multiplexer_scheduling() {
        let mut mux = mux();
        for _ in 0..4 {
            mux.next_protocol();
        }

        assert!(mux.pop_frames().is_empty());
        assert_eq!(mux.num_active_protocols(), 0);

        let packet0 = Packet::new(0, 0, vec![b'x'; 100]);
        mux.add_packet(packet0.clone()).unwrap();
        assert_eq!(mux.num_active_protocols(), 1);

        let frames = mux.pop_frames();
        assert_eq!(frames.len(), 1);

        mux.add_packet(packet0.clone()).unwrap();
        let message = mux.pop_all_frames_as_bytes().unwrap();
        assert_eq!(mux.decode(&message).unwrap(), vec![packet0.clone()]);
        assert!(mux.pop_frames().is_empty());

        // big packet
        let packet1 = Packet::new(1, 0, vec![0u8; 8192 * 2]);
        mux.add_packet(packet1.clone()).unwrap();
        let message = mux.pop_all_frames_as_bytes().unwrap();
        assert_eq!(mux.decode(&message).unwrap(), vec![packet1.clone()]);

        // mixed packet types
        let packet2 = Packet::priority(0, 0, vec![0u8; 200]);
        mux.add_packet(packet1.clone()).unwrap();
        mux.add_packet(packet0.clone()).unwrap();
        mux.add_packet(packet2.clone()).unwrap();
        let message = mux.pop_all_frames_as_bytes().unwrap();
        assert_eq!(
            mux.decode(&message).unwrap(),
            vec![packet2.clone(), packet0.clone(), packet1.clone()]
        );

        // packets on different protocols
        let packet3 = Packet::new(1, 0, vec![0u8; 3000]);
        mux.add_packet(packet1.clone()).unwrap();
        mux.add_packet(packet0.clone()).unwrap();
        mux.add_packet(packet2.clone()).unwrap();
        mux.add_packet(packet3.clone()).unwrap();
        mux.add_packet(packet3.clone()).unwrap();
        mux.add_packet(packet3.clone()).unwrap();
        assert_eq!(mux.next_protocol(), Some(0));

        // next with data is protocol 1 with packet3
        let message = mux.pop_all_frames_as_bytes().unwrap();
        assert_eq!(
            mux.decode(&message).unwrap(),
            vec![
                packet3.clone(),
                packet2,
                packet0,
                packet3.clone(),
                packet3,
                packet1
            ]
        );
    }

    #[test]
    fn test_protocol_window_size() {
        let mut mux = mux();
        assert_eq!(mux.protocol_window_size(None), 8192);
        assert_eq!(mux.protocol_window_size(Some(0)), 8192);

        mux.add_packet(Packet::new(0, 0, vec![0u8; 10])).unwrap();
        assert_eq!(mux.protocol_window_size(None), 8192);
        assert_eq!(mux.protocol_window_size(Some(0)), 8192);
        assert_eq!(mux.protocol_window_size(Some(1)), 4096);

        mux.add_packet(Packet::new(1, 0, vec![0u8; 10])).unwrap();
        mux.add_packet(Packet::new(2, 0, vec![0u8; 10])).unwrap();
        // 8192 / 3 rounded down to 16
        assert_eq!(mux.protocol_window_size(None), 2720);
    }

    #[test]
    fn test_sequence_ids_increment() {
        let mut mux = mux();
        for _ in 0..3 {
            mux.add_packet(Packet::new(2, 1, vec![1u8; 4])).unwrap();
        }
        let sids: Vec<_> = mux.pop_all_frames().iter().map(Frame::sequence_id).collect();
        assert_eq!(sids, vec![Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn test_duplicate_protocol_rejected() {
        let mut mux = mux();
        assert_eq!(mux.add_protocol(1), Err(MultiplexerError::DuplicateProtocol(1)));
        assert_eq!(mux.protocols(), &[0, 1, 2]);
    }

    #[test]
    fn test_unknown_protocol() {
        let mut mux = mux();
        assert!(matches!(
            mux.add_packet(Packet::new(9, 0, vec![1u8])),
            Err(Error::Multiplexer(MultiplexerError::UnknownProtocol(9)))
        ));

        let mut other = Multiplexer::new(MultiplexerConfig::default());
        other.add_protocol(9).unwrap();
        other.add_packet(Packet::new(9, 0, vec![1u8])).unwrap();
        let message = other.pop_all_frames_as_bytes().unwrap();
        assert!(matches!(
            mux.decode(&message),
            Err(Error::Multiplexer(MultiplexerError::UnknownProtocol(9)))
        ));
    }

    #[test]
    fn test_priority_packet_limits() {
        let mut mux = mux();
        assert!(matches!(
            mux.add_packet(Packet::priority(0, 0, vec![0u8; 2000])),
            Err(Error::Frame(FrameError::PriorityFrame(_)))
        ));
        mux.add_packet(Packet::priority(0, 0, vec![0u8; 900])).unwrap();
    }

    #[test]
    fn test_payload_limit_on_send() {
        let config = MultiplexerConfig {
            max_payload_size: 1000,
            ..Default::default()
        };
        let mut mux = Multiplexer::new(config);
        mux.add_protocol(0).unwrap();
        assert!(matches!(
            mux.add_packet(Packet::new(0, 0, vec![0u8; 1001])),
            Err(Error::Frame(FrameError::PayloadTooLarge { size: 1001, limit: 1000 }))
        ));
    }

    #[test]
    fn test_payload_limit_on_reassembly() {
        let mut sender = mux();
        sender.add_packet(Packet::new(0, 0, vec![0u8; 20_000])).unwrap();
        let message = sender.pop_all_frames_as_bytes().unwrap();

        let mut receiver = Multiplexer::new(MultiplexerConfig {
            max_payload_size: 10_000,
            ..Default::default()
        });
        receiver.add_protocol(0).unwrap();
        assert!(matches!(
            receiver.decode(&message),
            Err(Error::Multiplexer(MultiplexerError::PayloadTooLarge { .. }))
        ));
    }

    #[test]
    fn test_duplicate_chunk_0_rejected() {
        let frames = frame::chunk(0, 0, Bytes::from(vec![0u8; 500]), Some(7), 256).unwrap();
        let mut mux = mux();
        let mut cipher = PlainFrameCipher;
        let first = frames[0].encode(&mut cipher).unwrap();

        assert!(mux.decode(&first).unwrap().is_empty());
        assert!(matches!(
            mux.decode(&first),
            Err(Error::Multiplexer(MultiplexerError::DuplicateChunk {
                protocol_id: 0,
                sequence_id: 7
            }))
        ));
    }

    #[test]
    fn test_chunk_overflow_rejected() {
        let mut cipher = PlainFrameCipher;
        let frames = frame::chunk(0, 0, Bytes::from(vec![0u8; 300]), Some(1), 256).unwrap();
        let extra = frame::chunk(0, 0, Bytes::from(vec![0u8; 1000]), Some(1), 256).unwrap();

        let mut mux = mux();
        mux.decode(&frames[0].encode(&mut cipher).unwrap()).unwrap();
        // 208 continuation bytes against 93 still expected
        assert!(matches!(
            mux.decode(&extra[1].encode(&mut cipher).unwrap()),
            Err(Error::Multiplexer(MultiplexerError::ChunkOverflow { .. }))
        ));
    }

    /// Chunked-0 frame on protocol 0 declaring `total` bytes but carrying one
    fn chunked_0_claim(sequence_id: u16, total: u64) -> Vec<u8> {
        let mut list = rlp::RlpStream::new_list(3);
        list.append(&0u16).append(&sequence_id).append(&total);
        let header_data = list.out();

        let mut header = [0u8; HEADER_SIZE];
        header[..3].copy_from_slice(&frame::encode_body_size(2).unwrap());
        header[3..3 + header_data.len()].copy_from_slice(&header_data);
        PlainFrameCipher
            .encrypt_frame(&header, &frame::rzpad16(&[0x80, 0x01]))
            .unwrap()
    }

    #[test]
    fn test_declared_total_does_not_reserve_memory() {
        let mut mux = mux();
        assert!(mux.decode(&chunked_0_claim(3, 10 << 20)).unwrap().is_empty());

        let buffer = &mux.protocols[&0].chunk_buffers[&3];
        assert_eq!(buffer.remaining(), (10 << 20) - 2);
        assert!(buffer.data.capacity() < 64 * 1024);
    }

    #[test]
    fn test_open_chunk_buffers_are_capped() {
        let mut mux = mux();
        let mut wire = Vec::new();
        for sid in 0..MAX_CHUNK_BUFFERS {
            wire.extend(chunked_0_claim(u16::try_from(sid).unwrap(), 1 << 20));
        }
        assert!(mux.decode(&wire).unwrap().is_empty());

        let extra = chunked_0_claim(u16::try_from(MAX_CHUNK_BUFFERS).unwrap(), 1 << 20);
        assert!(matches!(
            mux.decode(&extra),
            Err(Error::Multiplexer(MultiplexerError::TooManyChunkBuffers {
                protocol_id: 0,
                limit: MAX_CHUNK_BUFFERS
            }))
        ));
    }

    #[test]
    fn test_interleaved_chunked_packets() {
        let mut mux = mux();
        let a = Packet::new(0, 3, vec![0xaa; 20_000]);
        let b = Packet::new(1, 4, vec![0xbb; 20_000]);
        mux.add_packet(a.clone()).unwrap();
        mux.add_packet(b.clone()).unwrap();

        let message = mux.pop_all_frames_as_bytes().unwrap();
        let mut packets = Vec::new();
        for piece in message.chunks(999) {
            packets.extend(mux.decode(piece).unwrap());
        }
        assert_eq!(packets.len(), 2);
        assert!(packets.contains(&a));
        assert!(packets.contains(&b));
        assert_eq!(mux.decode_buffer_len(), 0);
    }
}
