//! Commitments: the canonical artifacts both parties sign.
//!
//! Every commitment is a plain struct serialized with the ABI encoder, its
//! signing hash is `keccak256(abi.encode(commitment))`, signed in the Ethereum
//! signed message format. Owners are always sorted ascending and signatures
//! are kept in owner order, so both peers compute identical bytes from
//! equivalent inputs.

use serde::Serialize;
use thiserror::Error;

use crate::{
    abiencode::{
        self, as_bytes, as_dyn_array,
        types::{Address, Hash, Signature, U256},
    },
    app::AppError,
    channel::{AppInstance, OutcomeType, StateChannel},
    config::NetworkContext,
    sig::{self, Signer},
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommitmentError {
    #[error("encoding failed: {0}")]
    Encoding(#[from] abiencode::Error),
    #[error(transparent)]
    App(#[from] AppError),
    #[error("signing failed")]
    Signing,
    #[error("invalid signature, expected signer {0}")]
    InvalidSignature(Address),
    #[error("expected {expected} signatures, got {got}")]
    SignatureCount { expected: usize, got: usize },
}

impl From<sig::Error> for CommitmentError {
    fn from(_: sig::Error) -> Self {
        CommitmentError::Signing
    }
}

// Distinguishes commitment kinds that would otherwise encode the same way.
const SETUP: u8 = 1;
const CONDITIONAL_TRANSACTION: u8 = 2;
const SET_STATE: u8 = 3;
const WITHDRAW: u8 = 4;

pub trait Commitment: Serialize {
    fn encode(&self) -> Result<Vec<u8>, CommitmentError> {
        Ok(abiencode::encode(&abiencode::to_value(self)?)?)
    }

    /// The hash both owners sign.
    fn hash_to_sign(&self) -> Result<Hash, CommitmentError> {
        Ok(abiencode::keccak256(&self.encode()?))
    }

    fn sign(&self, signer: &Signer) -> Result<Signature, CommitmentError> {
        Ok(signer.sign_eth(self.hash_to_sign()?)?)
    }
}

/// Installs the free balance as the multisig's first conditional transaction.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SetupCommitment {
    kind: u8,
    pub multisig_address: Address,
    #[serde(with = "as_dyn_array")]
    pub owners: [Address; 2],
    pub free_balance_identity_hash: Hash,
}

impl Commitment for SetupCommitment {}

impl SetupCommitment {
    pub fn new(channel: &StateChannel) -> Self {
        SetupCommitment {
            kind: SETUP,
            multisig_address: channel.multisig_address,
            owners: channel.owners(),
            free_balance_identity_hash: channel.free_balance.identity_hash(),
        }
    }
}

/// Signs off `app_state_hash` as the state of the app at `version_number`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SetStateCommitment {
    kind: u8,
    pub app_identity_hash: Hash,
    pub app_state_hash: Hash,
    pub version_number: U256,
    pub state_timeout: U256,
}

impl Commitment for SetStateCommitment {}

impl SetStateCommitment {
    /// Commitment to the latest state of `app`.
    pub fn new(app: &AppInstance) -> Result<Self, CommitmentError> {
        Ok(SetStateCommitment {
            kind: SET_STATE,
            app_identity_hash: app.identity_hash(),
            app_state_hash: app.state_hash()?,
            version_number: app.latest_version_number.into(),
            state_timeout: app.state_timeout(),
        })
    }
}

/// Makes the multisig pay out according to the app's outcome, through the
/// interpreter matching its outcome type.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ConditionalTransactionCommitment {
    kind: u8,
    pub multisig_address: Address,
    #[serde(with = "as_dyn_array")]
    pub owners: [Address; 2],
    pub delegate_target: Address,
    pub app_identity_hash: Hash,
    pub free_balance_identity_hash: Hash,
    pub interpreter_address: Address,
    #[serde(with = "as_bytes")]
    pub interpreter_params: Vec<u8>,
}

impl Commitment for ConditionalTransactionCommitment {}

impl ConditionalTransactionCommitment {
    pub fn new(
        network: &NetworkContext,
        channel: &StateChannel,
        app: &AppInstance,
    ) -> Result<Self, CommitmentError> {
        let interpreter_address = match app.outcome_type() {
            OutcomeType::TwoPartyFixedOutcome => network.two_party_fixed_outcome_interpreter,
            OutcomeType::SingleAssetTwoPartyCoinTransfer => {
                network.single_asset_two_party_coin_transfer_interpreter
            }
            OutcomeType::MultiAssetMultiPartyCoinTransfer => {
                network.multi_asset_multi_party_coin_transfer_interpreter
            }
        };
        Ok(ConditionalTransactionCommitment {
            kind: CONDITIONAL_TRANSACTION,
            multisig_address: channel.multisig_address,
            owners: channel.owners(),
            delegate_target: network.conditional_transaction_delegate_target,
            app_identity_hash: app.identity_hash(),
            free_balance_identity_hash: channel.free_balance.identity_hash(),
            interpreter_address,
            interpreter_params: app.interpreter_params.encode()?,
        })
    }
}

/// Authorizes moving `amount` of `asset` from the multisig to `recipient`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct WithdrawCommitment {
    kind: u8,
    pub multisig_address: Address,
    #[serde(with = "as_dyn_array")]
    pub owners: [Address; 2],
    pub recipient: Address,
    pub asset: Address,
    pub amount: U256,
    pub nonce: U256,
}

impl Commitment for WithdrawCommitment {}

impl WithdrawCommitment {
    pub fn new(
        channel: &StateChannel,
        recipient: Address,
        asset: Address,
        amount: U256,
        nonce: U256,
    ) -> Self {
        WithdrawCommitment {
            kind: WITHDRAW,
            multisig_address: channel.multisig_address,
            owners: channel.owners(),
            recipient,
            asset,
            amount,
            nonce,
        }
    }
}

/// Put the two signatures in owner order.
pub fn order_signatures(
    owners: [Address; 2],
    me: Address,
    mine: Signature,
    theirs: Signature,
) -> Vec<Signature> {
    if owners[0] == me {
        vec![mine, theirs]
    } else {
        vec![theirs, mine]
    }
}

/// Check that `signatures[i]` was made by `owners[i]` over `hash`.
pub fn verify_signatures(
    hash: Hash,
    owners: [Address; 2],
    signatures: &[Signature],
) -> Result<(), CommitmentError> {
    if signatures.len() != owners.len() {
        return Err(CommitmentError::SignatureCount {
            expected: owners.len(),
            got: signatures.len(),
        });
    }
    for (owner, sig) in owners.iter().zip(signatures) {
        if !sig::verify(hash, *sig, *owner) {
            return Err(CommitmentError::InvalidSignature(*owner));
        }
    }
    Ok(())
}

/// Check a single signature of `signer` over `hash`.
pub fn verify_signature(hash: Hash, signature: Signature, signer: Address) -> Result<(), CommitmentError> {
    if sig::verify(hash, signature, signer) {
        Ok(())
    } else {
        Err(CommitmentError::InvalidSignature(signer))
    }
}
