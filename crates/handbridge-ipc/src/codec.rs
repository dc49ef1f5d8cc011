//! Message encoding and decoding for IPC
//!
//! Every message is a fixed 16-byte little-endian [`MessageHeader`] followed
//! by a bincode payload. Payloads use the legacy bincode configuration so
//! that fixed-width integers keep their natural size on the wire.

use serde::{Serialize, de::DeserializeOwned};

use crate::DEFAULT_MAX_MESSAGE_SIZE;
use crate::error::{IpcError, IpcResult};
use crate::protocol::{Opcode, ReplyStatus};

/// First two bytes of every message (`"HB"`).
pub const MAGIC: u16 = 0x4248;

/// Message flags
pub mod message_flags {
    /// The sender waits for a reply
    pub const REPLY_REQUESTED: u8 = 0x01;
}

/// Direction of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Client to driver
    Request = 1,
    /// Driver to client
    Reply = 2,
}

impl MessageKind {
    fn from_byte(byte: u8) -> IpcResult<Self> {
        match byte {
            1 => Ok(MessageKind::Request),
            2 => Ok(MessageKind::Reply),
            other => Err(IpcError::Decoding(format!("unknown message kind {other}"))),
        }
    }
}

/// Wire message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Request or reply
    pub kind: MessageKind,
    /// Bit set of [`message_flags`]
    pub flags: u8,
    /// Correlates a reply with its request; never 0 for client requests
    pub request_id: u32,
    /// Id assigned by the driver at connect time (0 before that)
    pub client_id: u32,
    /// Raw [`Opcode`] value
    pub opcode: u16,
    /// Raw [`ReplyStatus`] value (0 in requests)
    pub status: i16,
}

impl MessageHeader {
    /// Header size in bytes
    pub const SIZE: usize = 16;

    /// Create a request header
    pub fn request(opcode: Opcode, request_id: u32, client_id: u32, reply_requested: bool) -> Self {
        Self {
            kind: MessageKind::Request,
            flags: if reply_requested {
                message_flags::REPLY_REQUESTED
            } else {
                0
            },
            request_id,
            client_id,
            opcode: opcode.code(),
            status: ReplyStatus::Ok.code(),
        }
    }

    /// Create the reply header for `request` carrying `status`
    pub fn reply_to(request: &MessageHeader, status: ReplyStatus) -> Self {
        Self {
            kind: MessageKind::Reply,
            flags: 0,
            request_id: request.request_id,
            client_id: request.client_id,
            opcode: request.opcode,
            status: status.code(),
        }
    }

    /// Encode the header to bytes
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buffer = [0u8; Self::SIZE];
        buffer[0..2].copy_from_slice(&MAGIC.to_le_bytes());
        buffer[2] = self.kind as u8;
        buffer[3] = self.flags;
        buffer[4..8].copy_from_slice(&self.request_id.to_le_bytes());
        buffer[8..12].copy_from_slice(&self.client_id.to_le_bytes());
        buffer[12..14].copy_from_slice(&self.opcode.to_le_bytes());
        buffer[14..16].copy_from_slice(&self.status.to_le_bytes());
        buffer
    }

    /// Decode a header from the first [`MessageHeader::SIZE`] bytes
    pub fn decode(bytes: &[u8]) -> IpcResult<Self> {
        let b: [u8; Self::SIZE] = bytes
            .get(..Self::SIZE)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| {
                IpcError::Decoding("Insufficient bytes for message header".to_string())
            })?;

        let magic = u16::from_le_bytes([b[0], b[1]]);
        if magic != MAGIC {
            return Err(IpcError::Decoding(format!("bad magic {magic:#06x}")));
        }

        Ok(Self {
            kind: MessageKind::from_byte(b[2])?,
            flags: b[3],
            request_id: u32::from_le_bytes([b[4], b[5], b[6], b[7]]),
            client_id: u32::from_le_bytes([b[8], b[9], b[10], b[11]]),
            opcode: u16::from_le_bytes([b[12], b[13]]),
            status: i16::from_le_bytes([b[14], b[15]]),
        })
    }

    /// Check if a flag is set
    pub fn has_flag(&self, flag: u8) -> bool {
        (self.flags & flag) != 0
    }

    /// Whether the sender is waiting for a reply
    pub fn reply_requested(&self) -> bool {
        self.has_flag(message_flags::REPLY_REQUESTED)
    }
}

/// A decoded message: header plus still-encoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Header
    pub header: MessageHeader,
    /// Bincode payload bytes
    pub payload: Vec<u8>,
}

impl Message {
    /// Decode the payload as `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> IpcResult<T> {
        decode_payload(&self.payload)
    }

    /// Parsed opcode.
    pub fn opcode(&self) -> IpcResult<Opcode> {
        Opcode::try_from(self.header.opcode)
    }

    /// Raw status code.
    pub fn status(&self) -> i16 {
        self.header.status
    }
}

/// Message codec for encoding and decoding IPC messages
#[derive(Debug, Clone, Copy)]
pub struct MessageCodec {
    /// Maximum message size in bytes, header included
    max_message_size: usize,
}

impl MessageCodec {
    /// Create a new codec with default settings
    pub fn new() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Create a codec with custom max message size
    pub fn with_max_size(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    /// Get the maximum message size
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Check if a message size is valid
    pub fn is_valid_size(&self, size: usize) -> bool {
        size >= MessageHeader::SIZE && size <= self.max_message_size
    }

    /// Encode a header and payload into one message
    pub fn encode<P: Serialize + ?Sized>(
        &self,
        header: &MessageHeader,
        payload: &P,
    ) -> IpcResult<Vec<u8>> {
        let body = encode_payload(payload)?;
        let total = MessageHeader::SIZE + body.len();
        if !self.is_valid_size(total) {
            return Err(IpcError::Encoding(format!(
                "Message size {} exceeds maximum {}",
                total, self.max_message_size
            )));
        }

        let mut buffer = Vec::with_capacity(total);
        buffer.extend_from_slice(&header.encode());
        buffer.extend_from_slice(&body);
        Ok(buffer)
    }

    /// Split a message into header and payload
    pub fn decode(&self, bytes: &[u8]) -> IpcResult<Message> {
        if !self.is_valid_size(bytes.len()) {
            return Err(IpcError::Decoding(format!(
                "Message size {} outside 16..={}",
                bytes.len(),
                self.max_message_size
            )));
        }

        let header = MessageHeader::decode(bytes)?;
        let payload = bytes.get(MessageHeader::SIZE..).unwrap_or_default().to_vec();
        Ok(Message { header, payload })
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn config() -> impl bincode::config::Config {
    bincode::config::legacy()
}

/// Serialize a payload with the wire configuration.
pub fn encode_payload<P: Serialize + ?Sized>(payload: &P) -> IpcResult<Vec<u8>> {
    bincode::serde::encode_to_vec(payload, config()).map_err(|e| IpcError::Encoding(e.to_string()))
}

/// Deserialize a payload, rejecting trailing bytes.
pub fn decode_payload<T: DeserializeOwned>(bytes: &[u8]) -> IpcResult<T> {
    let (value, used) = bincode::serde::decode_from_slice(bytes, config())
        .map_err(|e| IpcError::Decoding(e.to_string()))?;
    if used != bytes.len() {
        return Err(IpcError::Decoding(format!(
            "trailing bytes: used {used} of {}",
            bytes.len()
        )));
    }
    Ok(value)
}
