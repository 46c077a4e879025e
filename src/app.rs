//! Application logic collaborator.
//!
//! The node does not interpret app states itself. State transitions and
//! outcomes are delegated to an [AppLogic] registered for the app definition
//! address. Both parties of a channel must register equivalent logic,
//! otherwise their independently computed states (and thus their commitments)
//! diverge and the protocol aborts.

pub mod deposit;

use std::{collections::HashMap, fmt::Debug, sync::Arc};

use thiserror::Error;

use crate::abiencode::{
    types::{Address, U256},
    Value,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("state object is not encodable: {0}")]
    StateObjectNotEncodable(String),
    #[error("invalid action: {0}")]
    InvalidAction(String),
    #[error("no app logic registered for {0}")]
    NoAppLogic(Address),
    #[error("invalid abi encoding: {0}")]
    InvalidEncoding(String),
}

/// Outcome of the two party fixed outcome interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoPartyFixedOutcome {
    SendToAddrOne,
    SendToAddrTwo,
    SplitAndSendToBothAddrs,
}

/// What an app's final state resolves to, in the shape its outcome type
/// demands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    TwoPartyFixed(TwoPartyFixedOutcome),
    /// Single asset transfers `(to, amount)`.
    CoinTransfers(Vec<(Address, U256)>),
    /// Transfers per asset, in the order of the app's deposit assets.
    MultiAssetCoinTransfers(Vec<Vec<(Address, U256)>>),
}

pub trait AppLogic: Debug + Send + Sync {
    /// Pure state transition. Must be deterministic.
    fn apply_action(&self, state: &Value, action: &Value) -> Result<Value, AppError>;

    fn compute_outcome(&self, state: &Value) -> Result<Outcome, AppError>;
}

/// App logic per app definition address.
#[derive(Debug, Default, Clone)]
pub struct AppRegistry {
    apps: HashMap<Address, Arc<dyn AppLogic>>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, app_definition: Address, logic: Arc<dyn AppLogic>) {
        self.apps.insert(app_definition, logic);
    }

    pub fn with(mut self, app_definition: Address, logic: Arc<dyn AppLogic>) -> Self {
        self.register(app_definition, logic);
        self
    }

    pub fn get(&self, app_definition: &Address) -> Result<&Arc<dyn AppLogic>, AppError> {
        self.apps
            .get(app_definition)
            .ok_or(AppError::NoAppLogic(*app_definition))
    }
}
