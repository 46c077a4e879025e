use std::collections::BTreeMap;

use serde::Serialize;

use super::{ChannelError, Credits};
use crate::{
    abiencode::{
        self, as_dyn_array,
        types::{Address, Hash, Signature, U256},
        AbiType, Value,
    },
    app::AppError,
};

/// Which interpreter turns the app's outcome into free balance credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeType {
    TwoPartyFixedOutcome,
    SingleAssetTwoPartyCoinTransfer,
    MultiAssetMultiPartyCoinTransfer,
}

impl OutcomeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeType::TwoPartyFixedOutcome => "TWO_PARTY_FIXED_OUTCOME",
            OutcomeType::SingleAssetTwoPartyCoinTransfer => "SINGLE_ASSET_TWO_PARTY_COIN_TRANSFER",
            OutcomeType::MultiAssetMultiPartyCoinTransfer => {
                "MULTI_ASSET_MULTI_PARTY_COIN_TRANSFER"
            }
        }
    }
}

/// State and action schemas, as Solidity type strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiEncodings {
    pub state_encoding: String,
    pub action_encoding: Option<String>,
}

impl AbiEncodings {
    pub fn state_type(&self) -> Result<AbiType, AppError> {
        self.state_encoding
            .parse()
            .map_err(|e: abiencode::Error| AppError::InvalidEncoding(e.to_string()))
    }

    /// `None` for apps without actions.
    pub fn action_type(&self) -> Result<Option<AbiType>, AppError> {
        self.action_encoding
            .as_deref()
            .map(|s| {
                s.parse()
                    .map_err(|e: abiencode::Error| AppError::InvalidEncoding(e.to_string()))
            })
            .transpose()
    }
}

/// What the proposer of an app chooses. The channel adds the sequence number
/// and identity hash when the proposal is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposeParams {
    pub initiator_identifier: Address,
    pub responder_identifier: Address,
    pub app_definition: Address,
    pub abi_encodings: AbiEncodings,
    pub initiator_deposit: U256,
    pub initiator_deposit_asset_id: Address,
    pub responder_deposit: U256,
    pub responder_deposit_asset_id: Address,
    pub default_timeout: U256,
    pub state_timeout: U256,
    pub initial_state: Value,
    pub outcome_type: OutcomeType,
}

/// Fields an app instance's identity hash is computed from.
#[derive(Serialize, Debug)]
pub struct AppIdentity {
    pub multisig_address: Address,
    pub channel_nonce: U256,
    #[serde(with = "as_dyn_array")]
    pub participants: [Address; 2],
    pub app_definition: Address,
    pub default_timeout: U256,
}

impl AppIdentity {
    pub fn identity_hash(&self) -> Result<Hash, abiencode::Error> {
        abiencode::to_hash(self)
    }
}

/// A pending (proposed but not yet installed) app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppProposal {
    pub identity_hash: Hash,
    pub multisig_address: Address,
    pub app_seq_no: u64,
    pub initiator_identifier: Address,
    pub responder_identifier: Address,
    pub app_definition: Address,
    pub abi_encodings: AbiEncodings,
    pub initiator_deposit: U256,
    pub initiator_deposit_asset_id: Address,
    pub responder_deposit: U256,
    pub responder_deposit_asset_id: Address,
    pub default_timeout: U256,
    pub state_timeout: U256,
    pub initial_state: Value,
    pub outcome_type: OutcomeType,
    /// Signatures of the initial state's set-state commitment, in owner order.
    pub signatures: Vec<Signature>,
}

impl AppProposal {
    pub fn new(
        multisig_address: Address,
        app_seq_no: u64,
        params: ProposeParams,
    ) -> Result<Self, ChannelError> {
        let mut proposal = AppProposal {
            identity_hash: Hash::ZERO,
            multisig_address,
            app_seq_no,
            initiator_identifier: params.initiator_identifier,
            responder_identifier: params.responder_identifier,
            app_definition: params.app_definition,
            abi_encodings: params.abi_encodings,
            initiator_deposit: params.initiator_deposit,
            initiator_deposit_asset_id: params.initiator_deposit_asset_id,
            responder_deposit: params.responder_deposit,
            responder_deposit_asset_id: params.responder_deposit_asset_id,
            default_timeout: params.default_timeout,
            state_timeout: params.state_timeout,
            initial_state: params.initial_state,
            outcome_type: params.outcome_type,
            signatures: Vec::new(),
        };
        proposal.validate()?;
        proposal.identity_hash = proposal.identity().identity_hash()?;
        Ok(proposal)
    }

    /// The parameters the proposal was made from.
    pub fn params(&self) -> ProposeParams {
        ProposeParams {
            initiator_identifier: self.initiator_identifier,
            responder_identifier: self.responder_identifier,
            app_definition: self.app_definition,
            abi_encodings: self.abi_encodings.clone(),
            initiator_deposit: self.initiator_deposit,
            initiator_deposit_asset_id: self.initiator_deposit_asset_id,
            responder_deposit: self.responder_deposit,
            responder_deposit_asset_id: self.responder_deposit_asset_id,
            default_timeout: self.default_timeout,
            state_timeout: self.state_timeout,
            initial_state: self.initial_state.clone(),
            outcome_type: self.outcome_type,
        }
    }

    pub fn identity(&self) -> AppIdentity {
        AppIdentity {
            multisig_address: self.multisig_address,
            channel_nonce: self.app_seq_no.into(),
            participants: [self.initiator_identifier, self.responder_identifier],
            app_definition: self.app_definition,
            default_timeout: self.default_timeout,
        }
    }

    fn validate(&self) -> Result<(), ChannelError> {
        if self.initiator_identifier == self.responder_identifier {
            return Err(ChannelError::IdenticalIdentifiers);
        }
        let state_type = self.abi_encodings.state_type()?;
        state_type
            .check(&self.initial_state)
            .map_err(|e| AppError::StateObjectNotEncodable(e.to_string()))?;
        self.abi_encodings.action_type()?;
        if self
            .initiator_deposit
            .checked_add(self.responder_deposit)
            .is_none()
        {
            return Err(ChannelError::InvalidProposal("deposits overflow"));
        }

        match self.outcome_type {
            OutcomeType::TwoPartyFixedOutcome | OutcomeType::SingleAssetTwoPartyCoinTransfer
                if self.initiator_deposit_asset_id != self.responder_deposit_asset_id =>
            {
                Err(ChannelError::InvalidProposal(
                    "two party outcomes require a single deposit asset",
                ))
            }
            _ => Ok(()),
        }
    }

    /// Deposits per asset and party, i.e. what installing takes out of the
    /// free balance.
    pub fn deposits(&self) -> Credits {
        let mut deposits: Credits = BTreeMap::new();
        for (asset, party, amount) in [
            (
                self.initiator_deposit_asset_id,
                self.initiator_identifier,
                self.initiator_deposit,
            ),
            (
                self.responder_deposit_asset_id,
                self.responder_identifier,
                self.responder_deposit,
            ),
        ] {
            let entry = deposits
                .entry(asset)
                .or_default()
                .entry(party)
                .or_insert_with(U256::zero);
            *entry += amount;
        }
        deposits
    }

    /// Total deposit per asset.
    pub fn deposit_totals(&self) -> BTreeMap<Address, U256> {
        self.deposits()
            .into_iter()
            .map(|(asset, parties)| {
                let total = parties.values().fold(U256::zero(), |acc, v| acc + *v);
                (asset, total)
            })
            .collect()
    }
}
