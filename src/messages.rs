mod event;
mod params;

pub use event::{Event, EventData, EventName};
pub use params::{
    AppUpdateParams, ChannelParams, ProposeProtocolParams, ProtocolParams, TakeActionParams,
};

use crate::{
    abiencode::types::{Address, Hash, Signature},
    channel::StateChannel,
    store::{CommitmentKey, SignedCommitment},
};

/// Sequence number of messages that are not part of a protocol run. They are
/// dropped by the dispatcher.
pub const UNASSIGNED_SEQ_NO: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProtocolName {
    Setup,
    Propose,
    Install,
    Uninstall,
    TakeAction,
    Sync,
}

impl ProtocolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolName::Setup => "setup",
            ProtocolName::Propose => "propose",
            ProtocolName::Install => "install",
            ProtocolName::Uninstall => "uninstall",
            ProtocolName::TakeAction => "takeAction",
            ProtocolName::Sync => "sync",
        }
    }
}

impl core::fmt::Display for ProtocolName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn of a protocol run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolMessage {
    pub process_id: Hash,
    pub seq: i32,
    pub from: Address,
    pub to: Address,
    pub params: ProtocolParams,
    /// Signatures of the sender over the commitments of this protocol, in the
    /// protocol's fixed commitment order.
    pub signatures: Vec<Signature>,
    /// Only used by sync, which exchanges whole channels.
    pub channel: Option<Box<StateChannel>>,
    /// Signed commitments accompanying `channel` that cannot be rebuilt from
    /// its signatures alone.
    pub commitments: Vec<(CommitmentKey, SignedCommitment)>,
}

impl ProtocolMessage {
    pub fn protocol(&self) -> ProtocolName {
        self.params.protocol()
    }

    /// The reply to this message, sent back by its recipient.
    pub fn reply(&self, signatures: Vec<Signature>) -> Self {
        ProtocolMessage {
            process_id: self.process_id,
            seq: self.seq + 1,
            from: self.to,
            to: self.from,
            params: self.params.clone(),
            signatures,
            channel: None,
            commitments: Vec::new(),
        }
    }
}

/// Messages exchanged between the two parties of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerMessage {
    Protocol(ProtocolMessage),
    /// Sent by a responder that refused a protocol run, so the initiator can
    /// abort immediately. `stale` is set when the refusal was a counter
    /// conflict that a sync resolves.
    ProtocolRejected {
        process_id: Hash,
        protocol: ProtocolName,
        from: Address,
        to: Address,
        reason: String,
        stale: bool,
    },
    /// The sender dropped a pending proposal.
    ProposalRejected {
        from: Address,
        to: Address,
        multisig_address: Address,
        app_identity_hash: Hash,
    },
}

impl PeerMessage {
    pub fn from(&self) -> Address {
        match self {
            PeerMessage::Protocol(msg) => msg.from,
            PeerMessage::ProtocolRejected { from, .. } | PeerMessage::ProposalRejected { from, .. } => {
                *from
            }
        }
    }

    pub fn to(&self) -> Address {
        match self {
            PeerMessage::Protocol(msg) => msg.to,
            PeerMessage::ProtocolRejected { to, .. } | PeerMessage::ProposalRejected { to, .. } => *to,
        }
    }
}
