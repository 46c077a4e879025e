//! Persistence of channels and commitments.
//!
//! The backend is a plain path/value store with atomic multi-entry writes.
//! [StoreService] lays out the paths:
//!
//! ```text
//! {prefix}/{owner}/channel/{multisig}                -> ChannelRecord
//! {prefix}/{owner}/channelByOwners/{low}/{high}      -> multisig address
//! {prefix}/{owner}/appInstance/{identity hash}       -> multisig address
//! {prefix}/{owner}/setupCommitment/{multisig}        -> CommitmentRecord
//! {prefix}/{owner}/conditionalCommitment/{app hash}  -> CommitmentRecord
//! {prefix}/{owner}/setStateCommitment/{app hash}     -> CommitmentRecord
//! ```

mod memory;

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use prost::Message;
use thiserror::Error;

pub use memory::MemoryStore;

use crate::{
    abiencode::types::{Address, Hash, Signature},
    channel::{sorted_pair, StateChannel},
    commitment::{Commitment, CommitmentError},
    wire::{
        proto::{ChannelRecord, CommitmentRecord},
        ConversionError,
    },
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend failed: {0}")]
    Backend(String),
    #[error("stored record is corrupt: {0}")]
    Corrupt(#[from] ConversionError),
    #[error("stored record is corrupt: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Key-value backend.
#[async_trait]
pub trait Store: Debug + Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write all entries or none of them. `None` removes the path.
    async fn set(&self, entries: Vec<(String, Option<Vec<u8>>)>) -> Result<(), StoreError>;
}

/// Where a commitment is filed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitmentKey {
    Setup(Address),
    ConditionalTransaction(Hash),
    SetState(Hash),
}

/// Encoded commitment with the signatures collected for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCommitment {
    pub encoded: Vec<u8>,
    pub signatures: Vec<Signature>,
}

impl SignedCommitment {
    pub fn new<C: Commitment>(commitment: &C, signatures: Vec<Signature>) -> Result<Self, CommitmentError> {
        Ok(Self {
            encoded: commitment.encode()?,
            signatures,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StoreService {
    store: Arc<dyn Store>,
    root: String,
}

impl StoreService {
    /// Paths of `owner` under `prefix`.
    pub fn new(store: Arc<dyn Store>, prefix: &str, owner: Address) -> Self {
        Self {
            store,
            root: format!("{prefix}/{owner}"),
        }
    }

    fn channel_path(&self, multisig: &Address) -> String {
        format!("{}/channel/{multisig}", self.root)
    }

    fn owners_path(&self, a: Address, b: Address) -> String {
        let [low, high] = sorted_pair(a, b);
        format!("{}/channelByOwners/{low}/{high}", self.root)
    }

    fn app_path(&self, identity_hash: &Hash) -> String {
        format!("{}/appInstance/{identity_hash}", self.root)
    }

    fn commitment_path(&self, key: &CommitmentKey) -> String {
        match key {
            CommitmentKey::Setup(multisig) => format!("{}/setupCommitment/{multisig}", self.root),
            CommitmentKey::ConditionalTransaction(app) => {
                format!("{}/conditionalCommitment/{app}", self.root)
            }
            CommitmentKey::SetState(app) => format!("{}/setStateCommitment/{app}", self.root),
        }
    }

    pub async fn get_channel(&self, multisig: &Address) -> Result<Option<StateChannel>, StoreError> {
        match self.store.get(&self.channel_path(multisig)).await? {
            Some(bytes) => Ok(Some(ChannelRecord::decode(bytes.as_slice())?.try_into()?)),
            None => Ok(None),
        }
    }

    async fn get_indexed(&self, path: &str) -> Result<Option<StateChannel>, StoreError> {
        match self.store.get(path).await? {
            Some(bytes) => {
                let multisig = Address::try_from(bytes.as_slice())
                    .or(Err(ConversionError::ByteLengthMismatch))?;
                self.get_channel(&multisig).await
            }
            None => Ok(None),
        }
    }

    pub async fn get_channel_by_owners(
        &self,
        a: Address,
        b: Address,
    ) -> Result<Option<StateChannel>, StoreError> {
        self.get_indexed(&self.owners_path(a, b)).await
    }

    /// The channel an app was proposed in. The app itself may since have been
    /// uninstalled.
    pub async fn get_channel_by_app(&self, identity_hash: &Hash) -> Result<Option<StateChannel>, StoreError> {
        self.get_indexed(&self.app_path(identity_hash)).await
    }

    /// Persist `channel` together with `commitments` in one atomic write.
    pub async fn save(
        &self,
        channel: &StateChannel,
        commitments: &[(CommitmentKey, SignedCommitment)],
    ) -> Result<(), StoreError> {
        let multisig = channel.multisig_address;
        let [a, b] = channel.user_identifiers;

        let mut entries = vec![
            (
                self.channel_path(&multisig),
                Some(ChannelRecord::from(channel).encode_to_vec()),
            ),
            (self.owners_path(a, b), Some(multisig.0.to_vec())),
        ];
        entries.extend(
            channel
                .app_instances
                .keys()
                .chain(channel.proposed_app_instances.keys())
                .map(|hash| (self.app_path(hash), Some(multisig.0.to_vec()))),
        );
        entries.extend(commitments.iter().map(|(key, c)| {
            let record = CommitmentRecord {
                encoded: c.encoded.clone(),
                signatures: c.signatures.iter().map(|s| s.0.to_vec()).collect(),
            };
            (self.commitment_path(key), Some(record.encode_to_vec()))
        }));

        self.store.set(entries).await
    }

    pub async fn get_commitment(&self, key: &CommitmentKey) -> Result<Option<SignedCommitment>, StoreError> {
        match self.store.get(&self.commitment_path(key)).await? {
            Some(bytes) => {
                let record = CommitmentRecord::decode(bytes.as_slice())?;
                let signatures = record
                    .signatures
                    .into_iter()
                    .map(|s| {
                        Signature::try_from(s.as_slice()).or(Err(ConversionError::ByteLengthMismatch))
                    })
                    .collect::<Result<_, _>>()?;
                Ok(Some(SignedCommitment {
                    encoded: record.encoded,
                    signatures,
                }))
            }
            None => Ok(None),
        }
    }
}
