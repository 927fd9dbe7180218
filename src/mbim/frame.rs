//! MBIM wire framing: headers, outbound fragmentation, inbound reassembly.
//!
//! Every MBIM control transfer starts with a 12-byte header:
//!
//! ```text
//! [u32 LE MessageType] [u32 LE MessageLength] [u32 LE TransactionId]
//! ```
//!
//! `COMMAND_MSG`, `COMMAND_DONE` and `INDICATE_STATUS_MSG` can be split
//! across several transfers and carry an 8-byte fragment header right after
//! it:
//!
//! ```text
//! [u32 LE TotalFragments] [u32 LE CurrentFragment]
//! ```
//!
//! ## Outbound
//!
//! Commands whose full frame fits in the negotiated max control transfer go
//! out as one fragment (`1/0`). Larger commands are split into as many
//! fragments as needed, each repeating the 20-byte header and carrying the
//! next slice of the command body. `OPEN` and `CLOSE` are never fragmented.
//!
//! ## Inbound
//!
//! [`decode_frames`] splits a receive buffer into whole transfers and
//! [`Reassembler`] rebuilds function messages from them. A chain that cannot
//! be completed (a fragment out of order, a new fragment 0 arriving early)
//! is dropped and reported as a [`LostChain`] so that whoever waits on it
//! can be told.

// Rust guideline compliant 2026-02

use std::fmt::Write as _;

use uuid::Uuid;

use super::message::MbimMessage;
use super::services::CommandCode;
use super::status::Status;
use crate::constants::RECEIVE_BUFFER_SIZE;

/// Length of the message header.
pub const HEADER_LEN: usize = 12;
/// Length of the message header plus fragment header.
pub const FRAGMENTED_HEADER_LEN: usize = 20;

// ─── Message types ─────────────────────────────────────────────────────────

/// MBIM message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// `MBIM_OPEN_MSG`.
    Open,
    /// `MBIM_CLOSE_MSG`.
    Close,
    /// `MBIM_COMMAND_MSG`.
    Command,
    /// `MBIM_HOST_ERROR_MSG`.
    HostError,
    /// `MBIM_OPEN_DONE`.
    OpenDone,
    /// `MBIM_CLOSE_DONE`.
    CloseDone,
    /// `MBIM_COMMAND_DONE`.
    CommandDone,
    /// `MBIM_FUNCTION_ERROR_MSG`.
    FunctionError,
    /// `MBIM_INDICATE_STATUS_MSG`.
    IndicateStatus,
    /// Anything else.
    Unknown(u32),
}

impl MessageType {
    /// Decode a wire message type.
    pub fn from_u32(value: u32) -> Self {
        match value {
            0x0000_0001 => Self::Open,
            0x0000_0002 => Self::Close,
            0x0000_0003 => Self::Command,
            0x0000_0004 => Self::HostError,
            0x8000_0001 => Self::OpenDone,
            0x8000_0002 => Self::CloseDone,
            0x8000_0003 => Self::CommandDone,
            0x8000_0004 => Self::FunctionError,
            0x8000_0007 => Self::IndicateStatus,
            other => Self::Unknown(other),
        }
    }

    /// Wire value.
    pub fn as_u32(self) -> u32 {
        match self {
            Self::Open => 0x0000_0001,
            Self::Close => 0x0000_0002,
            Self::Command => 0x0000_0003,
            Self::HostError => 0x0000_0004,
            Self::OpenDone => 0x8000_0001,
            Self::CloseDone => 0x8000_0002,
            Self::CommandDone => 0x8000_0003,
            Self::FunctionError => 0x8000_0004,
            Self::IndicateStatus => 0x8000_0007,
            Self::Unknown(other) => other,
        }
    }

    /// Whether frames of this type carry a fragment header.
    pub fn is_fragmented(self) -> bool {
        matches!(self, Self::Command | Self::CommandDone | Self::IndicateStatus)
    }
}

/// Why a frame could not be built or parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Max control transfer leaves no room for a command body.
    TransferTooSmall(u32),
    /// Declared `MessageLength` is impossible; the stream is out of sync.
    BadLength(u32),
    /// A fragmented type shorter than its fragment header.
    Truncated {
        /// Frame type.
        message_type: MessageType,
        /// Declared length.
        length: u32,
    },
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransferTooSmall(max) => {
                write!(f, "max control transfer {max} cannot carry a command fragment")
            }
            Self::BadLength(len) => write!(f, "impossible message length {len}"),
            Self::Truncated {
                message_type,
                length,
            } => write!(f, "{message_type:?} frame of {length} bytes has no fragment header"),
        }
    }
}

impl std::error::Error for FrameError {}

// ─── Frames ────────────────────────────────────────────────────────────────

fn u32_at(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// One inbound transfer with its headers parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message type.
    pub message_type: MessageType,
    /// Transaction id.
    pub transaction_id: u32,
    /// `(total, current)` for fragmented types.
    pub fragment: Option<(u32, u32)>,
    /// Bytes after the headers.
    pub data: Vec<u8>,
}

impl Frame {
    /// Parse one complete transfer.
    ///
    /// Input shorter than the 12-byte header is rejected with
    /// [`FrameError::BadLength`].
    pub fn parse(raw: &[u8]) -> Result<Self, FrameError> {
        if raw.len() < HEADER_LEN {
            return Err(FrameError::BadLength(raw.len() as u32));
        }
        let length = u32_at(raw, 4);
        let message_type = MessageType::from_u32(u32_at(raw, 0));
        let transaction_id = u32_at(raw, 8);
        if message_type.is_fragmented() {
            if raw.len() < FRAGMENTED_HEADER_LEN {
                return Err(FrameError::Truncated {
                    message_type,
                    length,
                });
            }
            Ok(Self {
                message_type,
                transaction_id,
                fragment: Some((u32_at(raw, 12), u32_at(raw, 16))),
                data: raw[FRAGMENTED_HEADER_LEN..].to_vec(),
            })
        } else {
            Ok(Self {
                message_type,
                transaction_id,
                fragment: None,
                data: raw[HEADER_LEN..].to_vec(),
            })
        }
    }
}

/// Output of [`decode_frames`].
#[derive(Debug, Default)]
pub struct Decoded {
    /// Complete, well-formed frames in arrival order.
    pub frames: Vec<Frame>,
    /// Leading bytes of the input that were used up.
    pub consumed: usize,
    /// Frames that were consumed but dropped, or a desync that flushed the input.
    pub errors: Vec<FrameError>,
}

/// Split `input` into complete frames.
///
/// Stops at the first incomplete frame, leaving it unconsumed. A header
/// declaring a length below 12 bytes or beyond the receive buffer means the
/// stream is out of sync; all of `input` is consumed and the error reported.
pub fn decode_frames(input: &[u8]) -> Decoded {
    let mut out = Decoded::default();
    while input.len() - out.consumed >= HEADER_LEN {
        let rest = &input[out.consumed..];
        let length = u32_at(rest, 4);
        let len = length as usize;
        if len < HEADER_LEN || len > RECEIVE_BUFFER_SIZE {
            out.errors.push(FrameError::BadLength(length));
            out.consumed = input.len();
            break;
        }
        if rest.len() < len {
            break;
        }
        match Frame::parse(&rest[..len]) {
            Ok(frame) => out.frames.push(frame),
            Err(e) => out.errors.push(e),
        }
        out.consumed += len;
    }
    out
}

fn push_header(buf: &mut Vec<u8>, message_type: MessageType, length: usize, transaction_id: u32) {
    buf.extend_from_slice(&message_type.as_u32().to_le_bytes());
    buf.extend_from_slice(&(length as u32).to_le_bytes());
    buf.extend_from_slice(&transaction_id.to_le_bytes());
}

/// Serialize `message` into one or more transfers stamped with `transaction_id`.
pub fn encode_message(
    message: &MbimMessage,
    transaction_id: u32,
    max_control_transfer: u32,
) -> Result<Vec<Vec<u8>>, FrameError> {
    match message {
        MbimMessage::Open {
            max_control_transfer: advertised,
        } => {
            let mut buf = Vec::with_capacity(HEADER_LEN + 4);
            push_header(&mut buf, MessageType::Open, HEADER_LEN + 4, transaction_id);
            buf.extend_from_slice(&advertised.to_le_bytes());
            Ok(vec![buf])
        }
        MbimMessage::Close => {
            let mut buf = Vec::with_capacity(HEADER_LEN);
            push_header(&mut buf, MessageType::Close, HEADER_LEN, transaction_id);
            Ok(vec![buf])
        }
        MbimMessage::Command(command) => {
            let max = max_control_transfer as usize;
            if max <= FRAGMENTED_HEADER_LEN {
                return Err(FrameError::TransferTooSmall(max_control_transfer));
            }
            let body = command.body();
            let chunks: Vec<&[u8]> = body.chunks(max - FRAGMENTED_HEADER_LEN).collect();
            let total = chunks.len() as u32;

            Ok(chunks
                .iter()
                .enumerate()
                .map(|(current, chunk)| {
                    let len = FRAGMENTED_HEADER_LEN + chunk.len();
                    let mut buf = Vec::with_capacity(len);
                    push_header(&mut buf, MessageType::Command, len, transaction_id);
                    buf.extend_from_slice(&total.to_le_bytes());
                    buf.extend_from_slice(&(current as u32).to_le_bytes());
                    buf.extend_from_slice(chunk);
                    buf
                })
                .collect())
        }
    }
}

// ─── Function messages ─────────────────────────────────────────────────────

/// A complete device-to-host message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionMessage {
    /// Message type.
    pub message_type: MessageType,
    /// Transaction id (0 for unsolicited indications).
    pub transaction_id: u32,
    /// Payload after the headers, reassembled across fragments.
    pub payload: Vec<u8>,
}

/// Borrowed view of a `COMMAND_DONE` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDone<'a> {
    /// Device service UUID.
    pub service: Uuid,
    /// Command identifier.
    pub cid: u32,
    /// Completion status.
    pub status: Status,
    /// Information buffer.
    pub information: &'a [u8],
}

/// Borrowed view of an `INDICATE_STATUS_MSG` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indication<'a> {
    /// Device service UUID.
    pub service: Uuid,
    /// Command identifier.
    pub cid: u32,
    /// Information buffer.
    pub information: &'a [u8],
}

fn uuid_at(buf: &[u8], off: usize) -> Option<Uuid> {
    buf.get(off..off + 16).and_then(|b| Uuid::from_slice(b).ok())
}

fn info_slice(buf: &[u8], len_off: usize) -> Option<&[u8]> {
    let len = u32_at(buf.get(len_off..len_off + 4)?, 0) as usize;
    let start = len_off + 4;
    // Clamp to what actually arrived.
    Some(&buf[start..buf.len().min(start + len)])
}

impl FunctionMessage {
    /// Status word for `OPEN_DONE`, `CLOSE_DONE`, `FUNCTION_ERROR_MSG` and `COMMAND_DONE`.
    pub fn status(&self) -> Option<Status> {
        let off = match self.message_type {
            MessageType::OpenDone | MessageType::CloseDone | MessageType::FunctionError => 0,
            MessageType::CommandDone => 20,
            _ => return None,
        };
        let word = self.payload.get(off..off + 4)?;
        Some(Status::from_u32(u32_at(word, 0)))
    }

    /// View as `COMMAND_DONE`.
    pub fn command_done(&self) -> Option<CommandDone<'_>> {
        if self.message_type != MessageType::CommandDone || self.payload.len() < 28 {
            return None;
        }
        Some(CommandDone {
            service: uuid_at(&self.payload, 0)?,
            cid: u32_at(&self.payload, 16),
            status: Status::from_u32(u32_at(&self.payload, 20)),
            information: info_slice(&self.payload, 24)?,
        })
    }

    /// View as `INDICATE_STATUS_MSG`.
    pub fn indication(&self) -> Option<Indication<'_>> {
        if self.message_type != MessageType::IndicateStatus || self.payload.len() < 24 {
            return None;
        }
        Some(Indication {
            service: uuid_at(&self.payload, 0)?,
            cid: u32_at(&self.payload, 16),
            information: info_slice(&self.payload, 20)?,
        })
    }

    /// Command code addressed by a `COMMAND_DONE` or indication payload.
    pub fn command_code(&self) -> Option<CommandCode> {
        if !self.message_type.is_fragmented() || self.payload.len() < 20 {
            return None;
        }
        CommandCode::lookup(&uuid_at(&self.payload, 0)?, u32_at(&self.payload, 16))
    }
}

// ─── Reassembly ────────────────────────────────────────────────────────────

/// A fragment chain that was dropped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LostChain {
    /// Type of the dropped chain.
    pub message_type: MessageType,
    /// Transaction id of the dropped chain.
    pub transaction_id: u32,
    /// Fragments that had arrived.
    pub fragments: usize,
}

/// Result of feeding one frame to the [`Reassembler`].
#[derive(Debug, Default)]
pub struct Reassembled {
    /// A message completed by this frame.
    pub message: Option<FunctionMessage>,
    /// Chains dropped while handling this frame.
    pub lost: Vec<LostChain>,
}

/// Rebuilds function messages from inbound frames.
///
/// Holds at most one partial chain. Non-fragmented types pass straight
/// through without disturbing it.
#[derive(Debug, Default)]
pub struct Reassembler {
    chain: Vec<Frame>,
}

impl Reassembler {
    /// Create an empty reassembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fragments of the chain currently in progress.
    pub fn pending_fragments(&self) -> usize {
        self.chain.len()
    }

    /// Drop the chain in progress, if any.
    pub fn clear(&mut self) -> Option<LostChain> {
        let head = self.chain.first()?;
        let lost = LostChain {
            message_type: head.message_type,
            transaction_id: head.transaction_id,
            fragments: self.chain.len(),
        };
        self.chain.clear();
        Some(lost)
    }

    fn lose_frame(frame: &Frame, out: &mut Reassembled) {
        let already = out
            .lost
            .iter()
            .any(|l| l.transaction_id == frame.transaction_id && l.message_type == frame.message_type);
        if !already {
            out.lost.push(LostChain {
                message_type: frame.message_type,
                transaction_id: frame.transaction_id,
                fragments: 1,
            });
        }
    }

    /// Feed one frame.
    pub fn push(&mut self, frame: Frame) -> Reassembled {
        let mut out = Reassembled::default();

        let Some((total, current)) = frame.fragment else {
            out.message = Some(FunctionMessage {
                message_type: frame.message_type,
                transaction_id: frame.transaction_id,
                payload: frame.data,
            });
            return out;
        };

        // A total of 0 is malformed but carries a whole message.
        if total <= 1 {
            out.lost.extend(self.clear());
            out.message = Some(FunctionMessage {
                message_type: frame.message_type,
                transaction_id: frame.transaction_id,
                payload: frame.data,
            });
            return out;
        }

        if current == 0 && total > 1 {
            out.lost.extend(self.clear());
            self.chain.push(frame);
            return out;
        }

        let continues = self.chain.first().is_some_and(|head| {
            head.transaction_id == frame.transaction_id
                && head.message_type == frame.message_type
                && head.fragment == Some((total, 0))
        }) && current as usize == self.chain.len();

        if !continues {
            out.lost.extend(self.clear());
            Self::lose_frame(&frame, &mut out);
            return out;
        }

        self.chain.push(frame);
        if self.chain.len() == total as usize {
            let chain = std::mem::take(&mut self.chain);
            let head_type = chain[0].message_type;
            let head_tid = chain[0].transaction_id;
            let payload = chain.into_iter().flat_map(|f| f.data).collect();
            out.message = Some(FunctionMessage {
                message_type: head_type,
                transaction_id: head_tid,
                payload,
            });
        }
        out
    }
}

/// Space-separated hex rendering for debug logs.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mbim::message::{self, ActivationCommand, ConnectRequest};
    use crate::mbim::services::Service;

    fn raw_frame(
        message_type: MessageType,
        tid: u32,
        fragment: Option<(u32, u32)>,
        data: &[u8],
    ) -> Vec<u8> {
        let hdr = if fragment.is_some() { 20 } else { 12 };
        let mut buf = Vec::new();
        push_header(&mut buf, message_type, hdr + data.len(), tid);
        if let Some((total, current)) = fragment {
            buf.extend_from_slice(&total.to_le_bytes());
            buf.extend_from_slice(&current.to_le_bytes());
        }
        buf.extend_from_slice(data);
        buf
    }

    fn frag(tid: u32, total: u32, current: u32, data: &[u8]) -> Frame {
        Frame::parse(&raw_frame(MessageType::CommandDone, tid, Some((total, current)), data)).unwrap()
    }

    #[test]
    fn open_and_close_frames() {
        let open = encode_message(&message::open(4096), 1, 4096).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(
            open[0],
            [1u32, 16, 1, 4096]
                .iter()
                .flat_map(|w| w.to_le_bytes())
                .collect::<Vec<u8>>()
        );

        let close = encode_message(&message::close(), 9, 4096).unwrap();
        assert_eq!(close[0], [2u32, 12, 9].iter().flat_map(|w| w.to_le_bytes()).collect::<Vec<u8>>());
    }

    #[test]
    fn set_connect_is_one_fragment_with_exact_length() {
        let req = ConnectRequest::internet(ActivationCommand::Activate, Some(b"internet".as_slice()));
        let msg = message::set_connect(&req).unwrap();
        let frames = encode_message(&msg, 7, 4096).unwrap();
        assert_eq!(frames.len(), 1);

        let f = &frames[0];
        assert_eq!(u32_at(f, 0), 3);
        assert_eq!(u32_at(f, 4) as usize, f.len());
        assert_eq!(u32_at(f, 8), 7);
        assert_eq!((u32_at(f, 12), u32_at(f, 16)), (1, 0));
        assert_eq!(&f[20..36], Service::BasicConnect.uuid().as_bytes());
        assert_eq!(u32_at(f, 36), 12);
        assert_eq!(u32_at(f, 40), 1);
        let info_len = u32_at(f, 44) as usize;
        assert_eq!(f.len(), 48 + info_len);

        // Back through the inbound path: decode, then reassemble.
        let decoded = decode_frames(f);
        assert_eq!(decoded.consumed, f.len());
        assert!(decoded.errors.is_empty());
        let [frame]: [Frame; 1] = decoded.frames.try_into().unwrap();
        let out = Reassembler::new().push(frame);
        assert!(out.lost.is_empty());
        let rebuilt = out.message.unwrap();
        assert_eq!(rebuilt.message_type, MessageType::Command);
        assert_eq!(rebuilt.transaction_id, 7);
        assert_eq!(rebuilt.payload, f[20..]);

        // Offsets in the information buffer index into the string region.
        let info = &rebuilt.payload[28..];
        assert_eq!(info.len(), info_len);
        let apn_off = u32_at(info, 8) as usize;
        let apn_len = u32_at(info, 12) as usize;
        assert_eq!(&info[apn_off..apn_off + apn_len], message::encode_utf16le("apn", b"internet").unwrap());
        assert_eq!((u32_at(info, 16), u32_at(info, 20)), (0, 0));
        assert_eq!((u32_at(info, 24), u32_at(info, 28)), (0, 0));
    }

    #[test]
    fn parse_rejects_input_shorter_than_header() {
        assert_eq!(Frame::parse(&[]), Err(FrameError::BadLength(0)));
        assert_eq!(Frame::parse(&[1, 0, 0, 0, 12, 0]), Err(FrameError::BadLength(6)));
    }

    #[test]
    fn oversized_command_is_split_across_fragments() {
        let msg = message::set_subscribe_list(&message::default_subscriptions());
        let MbimMessage::Command(cmd) = &msg else { unreachable!() };
        let body = cmd.body();

        let frames = encode_message(&msg, 3, 64).unwrap();
        let expected = body.len().div_ceil(44);
        assert_eq!(frames.len(), expected);

        let mut rebuilt = Vec::new();
        for (i, f) in frames.iter().enumerate() {
            assert!(f.len() <= 64);
            assert_eq!(u32_at(f, 4) as usize, f.len());
            assert_eq!(u32_at(f, 8), 3);
            assert_eq!(u32_at(f, 12) as usize, expected);
            assert_eq!(u32_at(f, 16) as usize, i);
            rebuilt.extend_from_slice(&f[20..]);
        }
        assert_eq!(rebuilt, body);
    }

    #[test]
    fn tiny_max_transfer_is_rejected() {
        let err = encode_message(&message::query_device_capabilities(), 1, 20).unwrap_err();
        assert_eq!(err, FrameError::TransferTooSmall(20));
    }

    #[test]
    fn decode_waits_for_complete_frame() {
        let raw = raw_frame(MessageType::OpenDone, 1, None, &0u32.to_le_bytes());
        let partial = decode_frames(&raw[..10]);
        assert!(partial.frames.is_empty());
        assert_eq!(partial.consumed, 0);

        let partial = decode_frames(&raw[..15]);
        assert!(partial.frames.is_empty());
        assert_eq!(partial.consumed, 0);

        let mut two = raw.clone();
        two.extend_from_slice(&raw);
        two.extend_from_slice(&raw[..5]);
        let decoded = decode_frames(&two);
        assert_eq!(decoded.frames.len(), 2);
        assert_eq!(decoded.consumed, 2 * raw.len());
        assert!(decoded.errors.is_empty());
    }

    #[test]
    fn impossible_length_flushes_input() {
        let mut raw = raw_frame(MessageType::OpenDone, 1, None, &[0; 4]);
        raw[4..8].copy_from_slice(&4u32.to_le_bytes());
        raw.extend_from_slice(&[0xaa; 20]);
        let decoded = decode_frames(&raw);
        assert!(decoded.frames.is_empty());
        assert_eq!(decoded.consumed, raw.len());
        assert_eq!(decoded.errors, vec![FrameError::BadLength(4)]);
    }

    #[test]
    fn truncated_fragmented_frame_is_dropped() {
        let mut raw = Vec::new();
        push_header(&mut raw, MessageType::CommandDone, 16, 1);
        raw.extend_from_slice(&[0; 4]);
        let decoded = decode_frames(&raw);
        assert!(decoded.frames.is_empty());
        assert_eq!(decoded.consumed, 16);
        assert_eq!(decoded.errors.len(), 1);
    }

    #[test]
    fn single_fragment_completes_immediately() {
        let mut r = Reassembler::new();
        let out = r.push(frag(4, 1, 0, b"abc"));
        let msg = out.message.unwrap();
        assert_eq!(msg.transaction_id, 4);
        assert_eq!(msg.payload, b"abc");
        assert!(out.lost.is_empty());
    }

    #[test]
    fn zero_total_fragments_is_treated_as_complete() {
        let mut r = Reassembler::new();
        r.push(frag(3, 2, 0, b"a"));
        let out = r.push(frag(4, 0, 0, b"whole"));
        let msg = out.message.unwrap();
        assert_eq!(msg.transaction_id, 4);
        assert_eq!(msg.payload, b"whole");
        assert_eq!(out.lost.len(), 1);
        assert_eq!(out.lost[0].transaction_id, 3);
        assert_eq!(r.pending_fragments(), 0);
    }

    #[test]
    fn three_fragments_in_order_concatenate() {
        let mut r = Reassembler::new();
        assert!(r.push(frag(5, 3, 0, b"one-")).message.is_none());
        assert!(r.push(frag(5, 3, 1, b"two-")).message.is_none());
        assert_eq!(r.pending_fragments(), 2);
        let out = r.push(frag(5, 3, 2, b"three"));
        let msg = out.message.unwrap();
        assert_eq!(msg.message_type, MessageType::CommandDone);
        assert_eq!(msg.transaction_id, 5);
        assert_eq!(msg.payload, b"one-two-three");
        assert_eq!(r.pending_fragments(), 0);
    }

    #[test]
    fn out_of_order_fragments_produce_nothing() {
        let mut r = Reassembler::new();
        let mut messages = 0;
        let mut lost = Vec::new();
        for current in [0, 2, 1] {
            let out = r.push(frag(6, 3, current, b"xx"));
            messages += usize::from(out.message.is_some());
            lost.extend(out.lost);
        }
        assert_eq!(messages, 0);
        assert_eq!(r.pending_fragments(), 0);
        assert!(lost.iter().all(|l| l.transaction_id == 6));
        assert_eq!(lost[0].fragments, 1);
    }

    #[test]
    fn new_fragment_zero_drops_previous_chain() {
        let mut r = Reassembler::new();
        r.push(frag(7, 2, 0, b"a"));
        let out = r.push(frag(8, 2, 0, b"b"));
        assert_eq!(
            out.lost,
            vec![LostChain {
                message_type: MessageType::CommandDone,
                transaction_id: 7,
                fragments: 1
            }]
        );
        let done = r.push(frag(8, 2, 1, b"c")).message.unwrap();
        assert_eq!(done.payload, b"bc");
    }

    #[test]
    fn continuation_from_other_transaction_is_rejected() {
        let mut r = Reassembler::new();
        r.push(frag(1, 2, 0, b"a"));
        let out = r.push(frag(2, 2, 1, b"b"));
        assert!(out.message.is_none());
        let tids: Vec<u32> = out.lost.iter().map(|l| l.transaction_id).collect();
        assert_eq!(tids, vec![1, 2]);
    }

    #[test]
    fn unfragmented_types_pass_through_without_touching_chain() {
        let mut r = Reassembler::new();
        r.push(frag(9, 2, 0, b"a"));
        let raw = raw_frame(MessageType::OpenDone, 1, None, &0u32.to_le_bytes());
        let out = r.push(Frame::parse(&raw).unwrap());
        assert_eq!(out.message.unwrap().status(), Some(Status::Success));
        assert_eq!(r.pending_fragments(), 1);
    }

    #[test]
    fn command_done_view() {
        let mut payload = Service::BasicConnect.uuid().as_bytes().to_vec();
        payload.extend_from_slice(&12u32.to_le_bytes());
        payload.extend_from_slice(&2u32.to_le_bytes());
        payload.extend_from_slice(&3u32.to_le_bytes());
        payload.extend_from_slice(b"xyz");
        let msg = FunctionMessage {
            message_type: MessageType::CommandDone,
            transaction_id: 1,
            payload,
        };
        let done = msg.command_done().unwrap();
        assert_eq!(done.cid, 12);
        assert_eq!(done.status, Status::Failure);
        assert_eq!(done.information, b"xyz");
        assert_eq!(msg.status(), Some(Status::Failure));
        assert_eq!(msg.command_code(), Some(CommandCode::Connect));
        assert!(msg.indication().is_none());
    }

    #[test]
    fn hex_dump_format() {
        assert_eq!(hex_dump(&[0x01, 0xab, 0x00]), "01 ab 00");
        assert_eq!(hex_dump(&[]), "");
    }
}
