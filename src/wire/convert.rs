use std::collections::BTreeMap;
use std::sync::Arc;

use super::{
    proto::{
        envelope, value_msg, AppInstanceRecord, ChannelRecord, CommitmentEntry, CommitmentRecord,
        Envelope, ProposalRecord, ProposalRejectedMsg, ProtocolMsg, ProtocolParamsMsg,
        ProtocolRejectedMsg, ValueList, ValueMsg,
    },
    ConversionError,
};
use crate::{
    abiencode::{
        types::{Address, Hash, Signature, U256},
        Value,
    },
    channel::{
        AbiEncodings, AppInstance, AppProposal, ChannelAddresses, ChannelError, OutcomeType,
        ProposeParams, StateChannel,
    },
    messages::{
        AppUpdateParams, ChannelParams, PeerMessage, ProposeProtocolParams, ProtocolMessage,
        ProtocolName, ProtocolParams, TakeActionParams,
    },
    store::{CommitmentKey, SignedCommitment},
};

fn fixed<const N: usize>(bytes: Vec<u8>) -> Result<[u8; N], ConversionError> {
    bytes
        .try_into()
        .or(Err(ConversionError::ByteLengthMismatch))
}

pub(crate) fn address(bytes: Vec<u8>) -> Result<Address, ConversionError> {
    Ok(Address(fixed(bytes)?))
}

pub(crate) fn hash(bytes: Vec<u8>) -> Result<Hash, ConversionError> {
    Ok(Hash(fixed(bytes)?))
}

fn uint(bytes: Vec<u8>) -> Result<U256, ConversionError> {
    Ok(U256::from_big_endian(&fixed::<32>(bytes)?))
}

pub(crate) fn signatures(sigs: Vec<Vec<u8>>) -> Result<Vec<Signature>, ConversionError> {
    sigs.into_iter()
        .map(|s| Ok(Signature(fixed(s)?)))
        .collect()
}

pub(crate) fn signature_bytes(sigs: &[Signature]) -> Vec<Vec<u8>> {
    sigs.iter().map(|s| s.0.to_vec()).collect()
}

fn uint_bytes(v: U256) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

impl From<ProtocolName> for i32 {
    fn from(value: ProtocolName) -> Self {
        match value {
            ProtocolName::Setup => 1,
            ProtocolName::Propose => 2,
            ProtocolName::Install => 3,
            ProtocolName::Uninstall => 4,
            ProtocolName::TakeAction => 5,
            ProtocolName::Sync => 6,
        }
    }
}

impl TryFrom<i32> for ProtocolName {
    type Error = ConversionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => ProtocolName::Setup,
            2 => ProtocolName::Propose,
            3 => ProtocolName::Install,
            4 => ProtocolName::Uninstall,
            5 => ProtocolName::TakeAction,
            6 => ProtocolName::Sync,
            _ => return Err(ConversionError::InvalidProtocol(value)),
        })
    }
}

impl From<OutcomeType> for i32 {
    fn from(value: OutcomeType) -> Self {
        match value {
            OutcomeType::TwoPartyFixedOutcome => 1,
            OutcomeType::SingleAssetTwoPartyCoinTransfer => 2,
            OutcomeType::MultiAssetMultiPartyCoinTransfer => 3,
        }
    }
}

impl TryFrom<i32> for OutcomeType {
    type Error = ConversionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => OutcomeType::TwoPartyFixedOutcome,
            2 => OutcomeType::SingleAssetTwoPartyCoinTransfer,
            3 => OutcomeType::MultiAssetMultiPartyCoinTransfer,
            _ => return Err(ConversionError::InvalidOutcomeType(value)),
        })
    }
}

impl From<&Value> for ValueMsg {
    fn from(value: &Value) -> Self {
        let kind = match value {
            Value::Address(a) => value_msg::Kind::Address(a.0.to_vec()),
            Value::Uint(u) => value_msg::Kind::Uint(uint_bytes(*u)),
            Value::Int(i) => value_msg::Kind::Int(i.to_be_bytes().to_vec()),
            Value::Bool(b) => value_msg::Kind::Bool(*b),
            Value::FixedBytes(b) => value_msg::Kind::FixedBytes(b.clone()),
            Value::Bytes(b) => value_msg::Kind::Bytes(b.clone()),
            Value::String(s) => value_msg::Kind::String(s.clone()),
            Value::Array(items) => value_msg::Kind::Array(ValueList {
                items: items.iter().map(Into::into).collect(),
            }),
            Value::Tuple(items) => value_msg::Kind::Tuple(ValueList {
                items: items.iter().map(Into::into).collect(),
            }),
        };
        ValueMsg { kind: Some(kind) }
    }
}

impl TryFrom<ValueMsg> for Value {
    type Error = ConversionError;

    fn try_from(value: ValueMsg) -> Result<Self, Self::Error> {
        let items = |list: ValueList| -> Result<Vec<Value>, ConversionError> {
            list.items.into_iter().map(Value::try_from).collect()
        };
        Ok(match value.kind.ok_or(ConversionError::ExpectedSome)? {
            value_msg::Kind::Address(a) => Value::Address(address(a)?),
            value_msg::Kind::Uint(u) => Value::Uint(uint(u)?),
            value_msg::Kind::Int(i) => Value::Int(i128::from_be_bytes(fixed(i)?)),
            value_msg::Kind::Bool(b) => Value::Bool(b),
            value_msg::Kind::FixedBytes(b) if b.len() <= 32 => Value::FixedBytes(b),
            value_msg::Kind::FixedBytes(_) => return Err(ConversionError::ByteLengthMismatch),
            value_msg::Kind::Bytes(b) => Value::Bytes(b),
            value_msg::Kind::String(s) => Value::String(s),
            value_msg::Kind::Array(list) => Value::Array(items(list)?),
            value_msg::Kind::Tuple(list) => Value::Tuple(items(list)?),
        })
    }
}

impl From<&AppProposal> for ProposalRecord {
    fn from(value: &AppProposal) -> Self {
        Self {
            identity_hash: value.identity_hash.0.to_vec(),
            multisig_address: value.multisig_address.0.to_vec(),
            app_seq_no: value.app_seq_no,
            initiator_identifier: value.initiator_identifier.0.to_vec(),
            responder_identifier: value.responder_identifier.0.to_vec(),
            app_definition: value.app_definition.0.to_vec(),
            state_encoding: value.abi_encodings.state_encoding.clone(),
            action_encoding: value.abi_encodings.action_encoding.clone(),
            initiator_deposit: uint_bytes(value.initiator_deposit),
            initiator_deposit_asset_id: value.initiator_deposit_asset_id.0.to_vec(),
            responder_deposit: uint_bytes(value.responder_deposit),
            responder_deposit_asset_id: value.responder_deposit_asset_id.0.to_vec(),
            default_timeout: uint_bytes(value.default_timeout),
            state_timeout: uint_bytes(value.state_timeout),
            initial_state: Some((&value.initial_state).into()),
            outcome_type: value.outcome_type.into(),
            signatures: signature_bytes(&value.signatures),
        }
    }
}

/// Rebuilds the proposal from its parameters, so the identity hash is
/// recomputed rather than trusted.
impl TryFrom<ProposalRecord> for AppProposal {
    type Error = ConversionError;

    fn try_from(value: ProposalRecord) -> Result<Self, Self::Error> {
        let claimed = hash(value.identity_hash)?;
        let params = ProposeParams {
            initiator_identifier: address(value.initiator_identifier)?,
            responder_identifier: address(value.responder_identifier)?,
            app_definition: address(value.app_definition)?,
            abi_encodings: AbiEncodings {
                state_encoding: value.state_encoding,
                action_encoding: value.action_encoding,
            },
            initiator_deposit: uint(value.initiator_deposit)?,
            initiator_deposit_asset_id: address(value.initiator_deposit_asset_id)?,
            responder_deposit: uint(value.responder_deposit)?,
            responder_deposit_asset_id: address(value.responder_deposit_asset_id)?,
            default_timeout: uint(value.default_timeout)?,
            state_timeout: uint(value.state_timeout)?,
            initial_state: value
                .initial_state
                .ok_or(ConversionError::ExpectedSome)?
                .try_into()?,
            outcome_type: value.outcome_type.try_into()?,
        };
        let mut proposal =
            AppProposal::new(address(value.multisig_address)?, value.app_seq_no, params)?;
        if proposal.identity_hash != claimed {
            return Err(ConversionError::IdentityMismatch);
        }
        proposal.signatures = signatures(value.signatures)?;
        Ok(proposal)
    }
}

impl From<&AppInstance> for AppInstanceRecord {
    fn from(value: &AppInstance) -> Self {
        Self {
            proposal: Some((&value.proposal).into()),
            latest_state: Some((&value.latest_state).into()),
            latest_version_number: value.latest_version_number,
            latest_action: value.latest_action.as_ref().map(Into::into),
            signatures: signature_bytes(&value.signatures),
        }
    }
}

impl TryFrom<AppInstanceRecord> for AppInstance {
    type Error = ConversionError;

    fn try_from(value: AppInstanceRecord) -> Result<Self, Self::Error> {
        let proposal: AppProposal = value
            .proposal
            .ok_or(ConversionError::ExpectedSome)?
            .try_into()?;
        let app = AppInstance {
            latest_state: value
                .latest_state
                .ok_or(ConversionError::ExpectedSome)?
                .try_into()?,
            latest_version_number: value.latest_version_number,
            latest_action: value.latest_action.map(Value::try_from).transpose()?,
            signatures: signatures(value.signatures)?,
            ..AppInstance::from_proposal(proposal)
        };
        app.encode_state().map_err(ChannelError::from)?;
        Ok(app)
    }
}

impl From<&StateChannel> for ChannelRecord {
    fn from(value: &StateChannel) -> Self {
        Self {
            multisig_address: value.multisig_address.0.to_vec(),
            proxy_factory: value.addresses.proxy_factory.0.to_vec(),
            multisig_mastercopy: value.addresses.multisig_mastercopy.0.to_vec(),
            user_identifiers: value
                .user_identifiers
                .iter()
                .map(|a| a.0.to_vec())
                .collect(),
            free_balance: Some(AppInstanceRecord::from(&*value.free_balance)),
            app_instances: value
                .app_instances
                .values()
                .map(|a| AppInstanceRecord::from(&**a))
                .collect(),
            proposed_app_instances: value
                .proposed_app_instances
                .values()
                .map(|p| ProposalRecord::from(&**p))
                .collect(),
            num_proposed_apps: value.num_proposed_apps,
        }
    }
}

impl TryFrom<ChannelRecord> for StateChannel {
    type Error = ConversionError;

    fn try_from(value: ChannelRecord) -> Result<Self, Self::Error> {
        let ids: [Vec<u8>; 2] = value
            .user_identifiers
            .try_into()
            .or(Err(ConversionError::ParticipantSizeMismatch))?;
        let [initiator, responder] = ids;

        let mut app_instances = BTreeMap::new();
        for record in value.app_instances {
            let app = AppInstance::try_from(record)?;
            app_instances.insert(app.identity_hash(), Arc::new(app));
        }
        let mut proposed_app_instances = BTreeMap::new();
        for record in value.proposed_app_instances {
            let proposal = AppProposal::try_from(record)?;
            proposed_app_instances.insert(proposal.identity_hash, Arc::new(proposal));
        }

        let channel = StateChannel {
            multisig_address: address(value.multisig_address)?,
            addresses: ChannelAddresses {
                proxy_factory: address(value.proxy_factory)?,
                multisig_mastercopy: address(value.multisig_mastercopy)?,
            },
            user_identifiers: [address(initiator)?, address(responder)?],
            free_balance: Arc::new(
                value
                    .free_balance
                    .ok_or(ConversionError::ExpectedSome)?
                    .try_into()?,
            ),
            app_instances,
            proposed_app_instances,
            num_proposed_apps: value.num_proposed_apps,
        };
        channel.free_balance()?;
        Ok(channel)
    }
}

fn channel_params(value: &ChannelParams) -> ProtocolParamsMsg {
    ProtocolParamsMsg {
        initiator_identifier: value.initiator_identifier.0.to_vec(),
        responder_identifier: value.responder_identifier.0.to_vec(),
        multisig_address: value.multisig_address.0.to_vec(),
        ..Default::default()
    }
}

impl From<&ProtocolParams> for ProtocolParamsMsg {
    fn from(value: &ProtocolParams) -> Self {
        let base = channel_params(value.channel());
        match value {
            ProtocolParams::Setup(_) | ProtocolParams::Sync(_) => base,
            ProtocolParams::Propose(p) => ProtocolParamsMsg {
                app_identity_hash: p.proposal.identity_hash.0.to_vec(),
                proposal: Some((&p.proposal).into()),
                ..base
            },
            ProtocolParams::Install(p) | ProtocolParams::Uninstall(p) => ProtocolParamsMsg {
                app_identity_hash: p.app_identity_hash.0.to_vec(),
                free_balance_version: p.free_balance_version,
                ..base
            },
            ProtocolParams::TakeAction(p) => ProtocolParamsMsg {
                app_identity_hash: p.app_identity_hash.0.to_vec(),
                version_number: p.version_number,
                action: Some((&p.action).into()),
                ..base
            },
        }
    }
}

fn params_from_msg(
    protocol: ProtocolName,
    value: ProtocolParamsMsg,
) -> Result<ProtocolParams, ConversionError> {
    let channel = ChannelParams {
        initiator_identifier: address(value.initiator_identifier)?,
        responder_identifier: address(value.responder_identifier)?,
        multisig_address: address(value.multisig_address)?,
    };
    Ok(match protocol {
        ProtocolName::Setup => ProtocolParams::Setup(channel),
        ProtocolName::Sync => ProtocolParams::Sync(channel),
        ProtocolName::Propose => ProtocolParams::Propose(ProposeProtocolParams {
            channel,
            proposal: value
                .proposal
                .ok_or(ConversionError::ExpectedSome)?
                .try_into()?,
        }),
        ProtocolName::Install | ProtocolName::Uninstall => {
            let params = AppUpdateParams {
                channel,
                app_identity_hash: hash(value.app_identity_hash)?,
                free_balance_version: value.free_balance_version,
            };
            if protocol == ProtocolName::Install {
                ProtocolParams::Install(params)
            } else {
                ProtocolParams::Uninstall(params)
            }
        }
        ProtocolName::TakeAction => ProtocolParams::TakeAction(TakeActionParams {
            channel,
            app_identity_hash: hash(value.app_identity_hash)?,
            action: value.action.ok_or(ConversionError::ExpectedSome)?.try_into()?,
            version_number: value.version_number,
        }),
    })
}

fn commitment_entry((key, commitment): &(CommitmentKey, SignedCommitment)) -> CommitmentEntry {
    let (kind, key) = match key {
        CommitmentKey::Setup(multisig) => (0, multisig.0.to_vec()),
        CommitmentKey::ConditionalTransaction(app) => (1, app.0.to_vec()),
        CommitmentKey::SetState(app) => (2, app.0.to_vec()),
    };
    CommitmentEntry {
        kind,
        key,
        commitment: Some(CommitmentRecord {
            encoded: commitment.encoded.clone(),
            signatures: signature_bytes(&commitment.signatures),
        }),
    }
}

fn commitment_from_entry(
    entry: CommitmentEntry,
) -> Result<(CommitmentKey, SignedCommitment), ConversionError> {
    let key = match entry.kind {
        0 => CommitmentKey::Setup(address(entry.key)?),
        1 => CommitmentKey::ConditionalTransaction(hash(entry.key)?),
        2 => CommitmentKey::SetState(hash(entry.key)?),
        kind => return Err(ConversionError::InvalidCommitmentKind(kind)),
    };
    let record = entry.commitment.ok_or(ConversionError::ExpectedSome)?;
    Ok((
        key,
        SignedCommitment {
            encoded: record.encoded,
            signatures: signatures(record.signatures)?,
        },
    ))
}

impl From<&ProtocolMessage> for ProtocolMsg {
    fn from(value: &ProtocolMessage) -> Self {
        Self {
            process_id: value.process_id.0.to_vec(),
            protocol: value.protocol().into(),
            seq: value.seq,
            from: value.from.0.to_vec(),
            to: value.to.0.to_vec(),
            params: Some((&value.params).into()),
            signatures: signature_bytes(&value.signatures),
            channel: value.channel.as_deref().map(Into::into),
            commitments: value.commitments.iter().map(commitment_entry).collect(),
        }
    }
}

impl TryFrom<ProtocolMsg> for ProtocolMessage {
    type Error = ConversionError;

    fn try_from(value: ProtocolMsg) -> Result<Self, Self::Error> {
        let protocol = ProtocolName::try_from(value.protocol)?;
        Ok(ProtocolMessage {
            process_id: hash(value.process_id)?,
            seq: value.seq,
            from: address(value.from)?,
            to: address(value.to)?,
            params: params_from_msg(
                protocol,
                value.params.ok_or(ConversionError::ExpectedSome)?,
            )?,
            signatures: signatures(value.signatures)?,
            channel: value
                .channel
                .map(|c| StateChannel::try_from(c).map(Box::new))
                .transpose()?,
            commitments: value
                .commitments
                .into_iter()
                .map(commitment_from_entry)
                .collect::<Result<_, _>>()?,
        })
    }
}

impl From<&PeerMessage> for Envelope {
    fn from(value: &PeerMessage) -> Self {
        let msg = match value {
            PeerMessage::Protocol(msg) => envelope::Msg::Protocol(msg.into()),
            PeerMessage::ProtocolRejected {
                process_id,
                protocol,
                from,
                to,
                reason,
                stale,
            } => envelope::Msg::ProtocolRejected(ProtocolRejectedMsg {
                process_id: process_id.0.to_vec(),
                protocol: (*protocol).into(),
                from: from.0.to_vec(),
                to: to.0.to_vec(),
                reason: reason.clone(),
                stale: *stale,
            }),
            PeerMessage::ProposalRejected {
                from,
                to,
                multisig_address,
                app_identity_hash,
            } => envelope::Msg::ProposalRejected(ProposalRejectedMsg {
                from: from.0.to_vec(),
                to: to.0.to_vec(),
                multisig_address: multisig_address.0.to_vec(),
                app_identity_hash: app_identity_hash.0.to_vec(),
            }),
        };
        Envelope { msg: Some(msg) }
    }
}

impl TryFrom<Envelope> for PeerMessage {
    type Error = ConversionError;

    fn try_from(value: Envelope) -> Result<Self, Self::Error> {
        Ok(match value.msg.ok_or(ConversionError::ExpectedSome)? {
            envelope::Msg::Protocol(msg) => PeerMessage::Protocol(msg.try_into()?),
            envelope::Msg::ProtocolRejected(msg) => PeerMessage::ProtocolRejected {
                process_id: hash(msg.process_id)?,
                protocol: msg.protocol.try_into()?,
                from: address(msg.from)?,
                to: address(msg.to)?,
                reason: msg.reason,
                stale: msg.stale,
            },
            envelope::Msg::ProposalRejected(msg) => PeerMessage::ProposalRejected {
                from: address(msg.from)?,
                to: address(msg.to)?,
                multisig_address: address(msg.multisig_address)?,
                app_identity_hash: hash(msg.app_identity_hash)?,
            },
        })
    }
}
