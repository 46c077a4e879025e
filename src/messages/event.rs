use crate::{
    abiencode::{
        types::{Address, Hash},
        Value,
    },
    channel::{AppProposal, StateChannel},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    CreateChannel,
    ProposeInstall,
    Install,
    Uninstall,
    UpdateState,
    Sync,
    RejectInstall,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::CreateChannel => "CREATE_CHANNEL_EVENT",
            EventName::ProposeInstall => "PROPOSE_INSTALL_EVENT",
            EventName::Install => "INSTALL_EVENT",
            EventName::Uninstall => "UNINSTALL_EVENT",
            EventName::UpdateState => "UPDATE_STATE_EVENT",
            EventName::Sync => "SYNC_EVENT",
            EventName::RejectInstall => "REJECT_INSTALL_EVENT",
        }
    }
}

/// Domain event published once per completed protocol run (or rejected
/// proposal).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Identifier of the party that initiated the run.
    pub from: Address,
    pub data: EventData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventData {
    CreateChannel {
        multisig_address: Address,
        owners: [Address; 2],
        counterparty: Address,
    },
    ProposeInstall {
        multisig_address: Address,
        proposal: Box<AppProposal>,
    },
    Install {
        multisig_address: Address,
        app_identity_hash: Hash,
    },
    Uninstall {
        multisig_address: Address,
        app_identity_hash: Hash,
    },
    UpdateState {
        multisig_address: Address,
        app_identity_hash: Hash,
        new_state: Value,
        action: Value,
        version_number: u64,
    },
    Sync {
        multisig_address: Address,
        channel: Box<StateChannel>,
    },
    RejectInstall {
        multisig_address: Address,
        app_identity_hash: Hash,
    },
}

impl Event {
    pub fn name(&self) -> EventName {
        match self.data {
            EventData::CreateChannel { .. } => EventName::CreateChannel,
            EventData::ProposeInstall { .. } => EventName::ProposeInstall,
            EventData::Install { .. } => EventName::Install,
            EventData::Uninstall { .. } => EventName::Uninstall,
            EventData::UpdateState { .. } => EventName::UpdateState,
            EventData::Sync { .. } => EventName::Sync,
            EventData::RejectInstall { .. } => EventName::RejectInstall,
        }
    }

    /// The app the event is about, if any.
    pub fn app_identity_hash(&self) -> Option<Hash> {
        match &self.data {
            EventData::ProposeInstall { proposal, .. } => Some(proposal.identity_hash),
            EventData::Install { app_identity_hash, .. }
            | EventData::Uninstall { app_identity_hash, .. }
            | EventData::UpdateState { app_identity_hash, .. }
            | EventData::RejectInstall { app_identity_hash, .. } => Some(*app_identity_hash),
            EventData::CreateChannel { .. } | EventData::Sync { .. } => None,
        }
    }

    pub fn multisig_address(&self) -> Address {
        match &self.data {
            EventData::CreateChannel { multisig_address, .. }
            | EventData::ProposeInstall { multisig_address, .. }
            | EventData::Install { multisig_address, .. }
            | EventData::Uninstall { multisig_address, .. }
            | EventData::UpdateState { multisig_address, .. }
            | EventData::Sync { multisig_address, .. }
            | EventData::RejectInstall { multisig_address, .. } => *multisig_address,
        }
    }
}
