use super::ProtocolName;
use crate::{
    abiencode::{
        types::{Address, Hash},
        Value,
    },
    channel::AppProposal,
};

/// Fields every protocol carries: who runs it on which channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelParams {
    pub initiator_identifier: Address,
    pub responder_identifier: Address,
    pub multisig_address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposeProtocolParams {
    pub channel: ChannelParams,
    /// The proposal as computed by the initiator, including the sequence
    /// number and identity hash it derived. The responder recomputes both.
    pub proposal: AppProposal,
}

/// Install and uninstall: the app and the free balance version after the
/// run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppUpdateParams {
    pub channel: ChannelParams,
    pub app_identity_hash: Hash,
    pub free_balance_version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TakeActionParams {
    pub channel: ChannelParams,
    pub app_identity_hash: Hash,
    pub action: Value,
    /// App version after the action.
    pub version_number: u64,
}

/// Protocol specific parameters. The variant determines the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolParams {
    Setup(ChannelParams),
    Propose(ProposeProtocolParams),
    Install(AppUpdateParams),
    Uninstall(AppUpdateParams),
    TakeAction(TakeActionParams),
    Sync(ChannelParams),
}

impl ProtocolParams {
    pub fn protocol(&self) -> ProtocolName {
        match self {
            ProtocolParams::Setup(_) => ProtocolName::Setup,
            ProtocolParams::Propose(_) => ProtocolName::Propose,
            ProtocolParams::Install(_) => ProtocolName::Install,
            ProtocolParams::Uninstall(_) => ProtocolName::Uninstall,
            ProtocolParams::TakeAction(_) => ProtocolName::TakeAction,
            ProtocolParams::Sync(_) => ProtocolName::Sync,
        }
    }

    pub fn channel(&self) -> &ChannelParams {
        match self {
            ProtocolParams::Setup(c) | ProtocolParams::Sync(c) => c,
            ProtocolParams::Propose(p) => &p.channel,
            ProtocolParams::Install(p) | ProtocolParams::Uninstall(p) => &p.channel,
            ProtocolParams::TakeAction(p) => &p.channel,
        }
    }

    /// App resource the run touches, if any.
    pub fn app_identity_hash(&self) -> Option<Hash> {
        match self {
            ProtocolParams::Install(p) | ProtocolParams::Uninstall(p) => Some(p.app_identity_hash),
            ProtocolParams::TakeAction(p) => Some(p.app_identity_hash),
            ProtocolParams::Propose(p) => Some(p.proposal.identity_hash),
            ProtocolParams::Setup(_) | ProtocolParams::Sync(_) => None,
        }
    }
}
