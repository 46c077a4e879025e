mod convert;
mod encoding;
pub mod proto;

use core::fmt::Debug;

use thiserror::Error;

pub use encoding::{decode, encode, ProtoBufEncodingLayer};

use crate::{abiencode::types::Address, channel::ChannelError, messages::PeerMessage};

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("unknown protocol {0}")]
    InvalidProtocol(i32),
    #[error("unknown outcome type {0}")]
    InvalidOutcomeType(i32),
    #[error("unknown commitment kind {0}")]
    InvalidCommitmentKind(i32),
    #[error("field has the wrong number of bytes")]
    ByteLengthMismatch,
    #[error("channels have exactly two participants")]
    ParticipantSizeMismatch,
    #[error("required field is missing")]
    ExpectedSome,
    #[error("identity hash does not match the proposal")]
    IdentityMismatch,
    #[error("invalid channel data: {0}")]
    Channel(#[from] ChannelError),
    #[error("frame length does not match its payload")]
    Frame,
    #[error("message of {0} bytes does not fit a frame")]
    TooLarge(usize),
    #[error(transparent)]
    Decode(#[from] prost::DecodeError),
    #[error(transparent)]
    Encode(#[from] prost::EncodeError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("peer {0} is unreachable")]
    Unreachable(Address),
    #[error("message could not be encoded: {0}")]
    Encoding(String),
    #[error("bus is closed")]
    Closed,
}

/// Transport of raw frames to a peer.
pub trait BytesBus: Debug + Send + Sync {
    fn send(&self, to: &Address, msg: &[u8]) -> Result<(), BusError>;
}

/// Transport of peer messages. The destination is the message's recipient.
///
/// Delivery may drop or duplicate messages. Implementations must
/// not block; replies come back through the node's `on_message`.
pub trait MessageBus: Debug + Send + Sync {
    fn send(&self, msg: PeerMessage) -> Result<(), BusError>;
}
