//! Blockchain collaborator.
//!
//! The node never talks to a chain directly; deployment and deposits go
//! through a [ChainService] supplied by the embedder.

use std::fmt::Debug;

use async_trait::async_trait;
use thiserror::Error;

use crate::abiencode::types::{Address, Hash, U256};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("transaction failed: {0}")]
    Transaction(String),
    #[error("chain unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ChainService: Debug + Send + Sync {
    /// Owners of the deployed multisig, empty if it is not deployed yet.
    async fn get_multisig_owners(&self, multisig: &Address) -> Result<Vec<Address>, ChainError>;

    /// Deploy the multisig through the proxy factory. Returns the transaction
    /// hash.
    async fn deploy_multisig(&self, multisig: &Address, owners: [Address; 2]) -> Result<Hash, ChainError>;

    /// Transfer `amount` of `asset` from the node's account into the multisig.
    async fn deposit(&self, multisig: &Address, asset: &Address, amount: U256) -> Result<Hash, ChainError>;

    /// On-chain holdings of the multisig.
    async fn balance_of(&self, multisig: &Address, asset: &Address) -> Result<U256, ChainError>;
}
