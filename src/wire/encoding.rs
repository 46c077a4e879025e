use prost::{bytes::BufMut, Message};

use super::{proto::Envelope, BusError, BytesBus, ConversionError, MessageBus};
use crate::messages::PeerMessage;

/// Size of the big-endian length prefix of every frame.
const LENGTH_PREFIX: usize = 4;

/// Wraps a [BytesBus], framing each message as a length-prefixed protobuf
/// [Envelope].
#[derive(Debug)]
pub struct ProtoBufEncodingLayer<B: BytesBus> {
    pub bus: B,
}

impl<B: BytesBus> ProtoBufEncodingLayer<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }
}

/// Frame `msg`: a u32 length followed by the encoded envelope.
pub fn encode(msg: &PeerMessage) -> Result<Vec<u8>, ConversionError> {
    let envelope = Envelope::from(msg);
    let len = envelope.encoded_len();
    let prefix = u32::try_from(len).or(Err(ConversionError::TooLarge(len)))?;

    let mut buf = Vec::with_capacity(LENGTH_PREFIX + len);
    buf.put_slice(&prefix.to_be_bytes());
    envelope.encode(&mut buf)?;
    Ok(buf)
}

/// Parse one frame produced by [encode].
pub fn decode(frame: &[u8]) -> Result<PeerMessage, ConversionError> {
    if frame.len() < LENGTH_PREFIX {
        return Err(ConversionError::Frame);
    }
    let (prefix, payload) = frame.split_at(LENGTH_PREFIX);
    let mut len = [0u8; LENGTH_PREFIX];
    len.copy_from_slice(prefix);
    if u32::from_be_bytes(len) as usize != payload.len() {
        return Err(ConversionError::Frame);
    }
    Envelope::decode(payload)?.try_into()
}

impl<B: BytesBus> MessageBus for ProtoBufEncodingLayer<B> {
    fn send(&self, msg: PeerMessage) -> Result<(), BusError> {
        let buf = encode(&msg).map_err(|e| BusError::Encoding(e.to_string()))?;
        self.bus.send(&msg.to(), &buf)
    }
}
