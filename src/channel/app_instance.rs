use std::collections::BTreeMap;

use serde::Serialize;

use super::{AppProposal, ChannelError, OutcomeType};
use crate::{
    abiencode::{
        self, as_dyn_array, keccak256,
        types::{Address, Hash, Signature, U256},
        Value,
    },
    app::{AppError, AppLogic},
};

/// Interpreter parameters, one variant per [OutcomeType].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpreterParams {
    TwoPartyFixed {
        player_addrs: [Address; 2],
        amount: U256,
        token: Address,
    },
    SingleAssetTwoParty {
        limit: U256,
        token: Address,
    },
    MultiAssetMultiParty {
        limits: Vec<U256>,
        tokens: Vec<Address>,
    },
}

#[derive(Serialize)]
struct TwoPartyFixedParams {
    #[serde(with = "as_dyn_array")]
    player_addrs: [Address; 2],
    amount: U256,
    token: Address,
}

#[derive(Serialize)]
struct SingleAssetParams {
    limit: U256,
    token: Address,
}

#[derive(Serialize)]
struct MultiAssetParams<'a> {
    limits: &'a [U256],
    tokens: &'a [Address],
}

impl InterpreterParams {
    fn for_proposal(proposal: &AppProposal) -> Self {
        let totals = proposal.deposit_totals();
        match proposal.outcome_type {
            OutcomeType::TwoPartyFixedOutcome => InterpreterParams::TwoPartyFixed {
                player_addrs: [
                    proposal.initiator_identifier,
                    proposal.responder_identifier,
                ],
                amount: totals.values().fold(U256::zero(), |a, v| a + *v),
                token: proposal.initiator_deposit_asset_id,
            },
            OutcomeType::SingleAssetTwoPartyCoinTransfer => InterpreterParams::SingleAssetTwoParty {
                limit: totals.values().fold(U256::zero(), |a, v| a + *v),
                token: proposal.initiator_deposit_asset_id,
            },
            OutcomeType::MultiAssetMultiPartyCoinTransfer => {
                InterpreterParams::MultiAssetMultiParty {
                    tokens: totals.keys().copied().collect(),
                    limits: totals.values().copied().collect(),
                }
            }
        }
    }

    /// ABI encoding, as passed to the interpreter on-chain.
    pub fn encode(&self) -> Result<Vec<u8>, abiencode::Error> {
        let value = match self {
            InterpreterParams::TwoPartyFixed {
                player_addrs,
                amount,
                token,
            } => abiencode::to_value(&TwoPartyFixedParams {
                player_addrs: *player_addrs,
                amount: *amount,
                token: *token,
            })?,
            InterpreterParams::SingleAssetTwoParty { limit, token } => {
                abiencode::to_value(&SingleAssetParams {
                    limit: *limit,
                    token: *token,
                })?
            }
            InterpreterParams::MultiAssetMultiParty { limits, tokens } => {
                abiencode::to_value(&MultiAssetParams { limits, tokens })?
            }
        };
        abiencode::encode(&value)
    }
}

/// An installed app.
///
/// The proposal it was installed from is kept as is, only the state fields
/// change over the app's life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInstance {
    pub proposal: AppProposal,
    pub latest_state: Value,
    pub latest_version_number: u64,
    pub latest_action: Option<Value>,
    pub interpreter_params: InterpreterParams,
    /// Signatures of the latest set-state commitment, in owner order.
    pub signatures: Vec<Signature>,
}

impl AppInstance {
    pub fn from_proposal(proposal: AppProposal) -> Self {
        AppInstance {
            interpreter_params: InterpreterParams::for_proposal(&proposal),
            latest_state: proposal.initial_state.clone(),
            latest_version_number: 1,
            latest_action: None,
            signatures: proposal.signatures.clone(),
            proposal,
        }
    }

    pub fn identity_hash(&self) -> Hash {
        self.proposal.identity_hash
    }

    pub fn app_definition(&self) -> Address {
        self.proposal.app_definition
    }

    pub fn multisig_address(&self) -> Address {
        self.proposal.multisig_address
    }

    pub fn outcome_type(&self) -> OutcomeType {
        self.proposal.outcome_type
    }

    pub fn state_timeout(&self) -> U256 {
        self.proposal.state_timeout
    }

    /// Participants sorted ascending (the order signatures are kept in).
    pub fn owners(&self) -> [Address; 2] {
        super::sorted_pair(
            self.proposal.initiator_identifier,
            self.proposal.responder_identifier,
        )
    }

    /// ABI encoding of the latest state, checked against the declared schema.
    pub fn encode_state(&self) -> Result<Vec<u8>, AppError> {
        encode_state(&self.proposal.abi_encodings.state_encoding, &self.latest_state)
    }

    pub fn state_hash(&self) -> Result<Hash, AppError> {
        Ok(keccak256(&self.encode_state()?))
    }

    /// Compute the state following `action`, without changing `self`.
    pub fn apply_action(&self, logic: &dyn AppLogic, action: &Value) -> Result<Value, AppError> {
        let action_type = self
            .proposal
            .abi_encodings
            .action_type()?
            .ok_or_else(|| AppError::InvalidAction("app does not take actions".to_owned()))?;
        action_type
            .check(action)
            .map_err(|e| AppError::InvalidAction(e.to_string()))?;

        let new_state = logic.apply_action(&self.latest_state, action)?;
        encode_state(&self.proposal.abi_encodings.state_encoding, &new_state)?;
        Ok(new_state)
    }

    /// New instance at `version`, which must directly follow the current one.
    pub fn with_state(
        &self,
        state: Value,
        action: Option<Value>,
        version: u64,
    ) -> Result<Self, ChannelError> {
        let expected = self.latest_version_number + 1;
        if version != expected {
            return Err(ChannelError::InvalidVersion {
                expected,
                got: version,
            });
        }
        encode_state(&self.proposal.abi_encodings.state_encoding, &state)?;
        Ok(AppInstance {
            latest_state: state,
            latest_version_number: version,
            latest_action: action,
            signatures: Vec::new(),
            ..self.clone()
        })
    }

    pub fn with_signatures(&self, signatures: Vec<Signature>) -> Self {
        AppInstance {
            signatures,
            ..self.clone()
        }
    }

    /// Deposits per asset, as locked by the install.
    pub fn deposit_totals(&self) -> BTreeMap<Address, U256> {
        self.proposal.deposit_totals()
    }
}

pub(crate) fn encode_state(encoding: &str, state: &Value) -> Result<Vec<u8>, AppError> {
    let ty: abiencode::AbiType = encoding
        .parse()
        .map_err(|e: abiencode::Error| AppError::InvalidEncoding(e.to_string()))?;
    ty.check(state)
        .and_then(|_| abiencode::encode(state))
        .map_err(|e| AppError::StateObjectNotEncodable(e.to_string()))
}
