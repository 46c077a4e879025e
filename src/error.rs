//! Errors surfaced to RPC callers.
//!
//! Every variant maps to a stable, machine readable [code](NodeError::code)
//! so callers need not parse messages.

use thiserror::Error;

use crate::{
    abiencode::{self, types::Address},
    app::AppError,
    chain::ChainError,
    channel::ChannelError,
    commitment::CommitmentError,
    lock::LockError,
    protocol::ProtocolError,
    store::StoreError,
    wire::{BusError, ConversionError},
};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    App(#[from] AppError),
    #[error(transparent)]
    Commitment(#[from] CommitmentError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("encoding failed: {0}")]
    Encoding(#[from] abiencode::Error),
    #[error("no channel with multisig address {0}")]
    ChannelNotFound(Address),
    #[error("deposit apps are uninstalled by the deposit flow, use rescind deposit rights")]
    UseRescindDepositRights,
    #[error("a deposit of asset {0} into this channel is already in progress")]
    DepositInProgress(Address),
    #[error("invalid parameters: {0}")]
    InvalidParams(&'static str),
}

impl NodeError {
    /// Stable identifier of the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            NodeError::Protocol(e) => protocol_code(e),
            NodeError::Lock(LockError::Timeout(_)) => "LOCK_TIMEOUT",
            NodeError::Lock(LockError::Poisoned) => "LOCK_FAILURE",
            NodeError::Store(_) => "STORE_FAILURE",
            NodeError::Chain(_) => "CHAIN_FAILURE",
            NodeError::Channel(e) => channel_code(e),
            NodeError::App(e) => app_code(e),
            NodeError::Commitment(e) => commitment_code(e),
            NodeError::Conversion(ConversionError::InvalidProtocol(_)) => "INVALID_PROTOCOL",
            NodeError::Conversion(_) => "MALFORMED_MESSAGE",
            NodeError::Bus(_) => "TRANSPORT_FAILURE",
            NodeError::Encoding(_) => "ENCODING_ERROR",
            NodeError::ChannelNotFound(_) => "CHANNEL_NOT_FOUND",
            NodeError::UseRescindDepositRights => "USE_RESCIND_DEPOSIT_RIGHTS",
            NodeError::DepositInProgress(_) => "DEPOSIT_IN_PROGRESS",
            NodeError::InvalidParams(_) => "INVALID_PARAMS",
        }
    }
}

fn protocol_code(e: &ProtocolError) -> &'static str {
    match e {
        ProtocolError::Channel(e) => channel_code(e),
        ProtocolError::App(e) => app_code(e),
        ProtocolError::Commitment(e) => commitment_code(e),
        ProtocolError::Store(_) => "STORE_FAILURE",
        ProtocolError::Chain(_) => "CHAIN_FAILURE",
        ProtocolError::Bus(_) => "TRANSPORT_FAILURE",
        ProtocolError::ChannelNotFound(_) => "CHANNEL_NOT_FOUND",
        ProtocolError::ChannelExists(_) => "CHANNEL_EXISTS",
        ProtocolError::UnexpectedMessage(_) => "UNEXPECTED_MESSAGE",
        ProtocolError::CommitmentMismatch(_) => "COMMITMENT_MISMATCH",
        ProtocolError::Timeout { .. } => "TIMEOUT",
        ProtocolError::CounterpartyRejected(_) => "COUNTERPARTY_REJECTED",
        ProtocolError::PolicyRejected(_) => "POLICY_REJECTED",
        ProtocolError::StaleState => "STALE_STATE",
        ProtocolError::MultisigMismatch => "MULTISIG_MISMATCH",
        ProtocolError::DepositInProgress(_) => "DEPOSIT_IN_PROGRESS",
    }
}

fn channel_code(e: &ChannelError) -> &'static str {
    match e {
        ChannelError::IdenticalIdentifiers => "IDENTICAL_IDENTIFIERS",
        ChannelError::MalformedIdentifier => "MALFORMED_IDENTIFIER",
        ChannelError::NotAParticipant(_) => "NOT_A_PARTICIPANT",
        ChannelError::AppAlreadyInstalled(_) => "APP_ALREADY_INSTALLED",
        ChannelError::AppNotInstalled(_) => "APP_NOT_INSTALLED",
        ChannelError::ProposalNotFound(_) => "PROPOSAL_NOT_FOUND",
        ChannelError::DuplicateProposal(_) => "DUPLICATE_PROPOSAL",
        ChannelError::InsufficientFreeBalance { .. } => "INSUFFICIENT_FREE_BALANCE",
        ChannelError::CannotUninstallFreeBalance => "CANNOT_UNINSTALL_FREE_BALANCE",
        ChannelError::InvalidVersion { .. } => "INVALID_VERSION",
        ChannelError::InvalidProposal(_) => "INVALID_PROPOSAL",
        ChannelError::InvalidOutcome(_) => "INVALID_OUTCOME",
        ChannelError::InvalidFreeBalance => "INVALID_FREE_BALANCE",
        ChannelError::Overflow => "OVERFLOW",
        ChannelError::App(e) => app_code(e),
        ChannelError::Encoding(_) => "ENCODING_ERROR",
    }
}

fn app_code(e: &AppError) -> &'static str {
    match e {
        AppError::StateObjectNotEncodable(_) => "STATE_OBJECT_NOT_ENCODABLE",
        AppError::InvalidAction(_) => "INVALID_ACTION",
        AppError::NoAppLogic(_) => "NO_APP_LOGIC",
        AppError::InvalidEncoding(_) => "INVALID_ENCODING",
    }
}

fn commitment_code(e: &CommitmentError) -> &'static str {
    match e {
        CommitmentError::InvalidSignature(_) | CommitmentError::SignatureCount { .. } => {
            "INVALID_SIGNATURE"
        }
        _ => "COMMITMENT_ERROR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{abiencode::types::Hash, lock::LockKey, messages::ProtocolName};

    #[test]
    fn codes_see_through_wrapping() {
        let wrapped: NodeError =
            ProtocolError::from(ChannelError::AppNotInstalled(Hash::ZERO)).into();
        assert_eq!(wrapped.code(), "APP_NOT_INSTALLED");

        let timeout: NodeError = ProtocolError::Timeout {
            protocol: ProtocolName::Install,
            seq: 2,
        }
        .into();
        assert_eq!(timeout.code(), "TIMEOUT");
        assert_eq!(timeout.to_string(), "install timed out waiting for turn 2");

        let lock: NodeError = LockError::Timeout(LockKey::Channel(Address::ZERO)).into();
        assert_eq!(lock.code(), "LOCK_TIMEOUT");
        assert_eq!(NodeError::UseRescindDepositRights.code(), "USE_RESCIND_DEPOSIT_RIGHTS");
    }
}
