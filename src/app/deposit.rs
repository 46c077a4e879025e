//! The deposit app.
//!
//! Installed around an on-chain deposit into the multisig. Its state records
//! the multisig's holdings before the deposit (`threshold`); on uninstall
//! everything above the threshold is credited to `recipient`. Both parties
//! read the on-chain balance themselves, so the node interprets this app
//! without registered [AppLogic](super::AppLogic).

use std::collections::BTreeMap;

use serde::Serialize;

use super::AppError;
use crate::{
    abiencode::{
        self,
        types::{Address, U256},
        Value,
    },
    channel::Credits,
};

pub const DEPOSIT_STATE_ENCODING: &str =
    "tuple(address recipient, address assetId, uint256 threshold)";

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositState {
    pub recipient: Address,
    pub asset_id: Address,
    pub threshold: U256,
}

impl DepositState {
    pub fn to_value(&self) -> Result<Value, abiencode::Error> {
        abiencode::to_value(self)
    }

    pub fn from_value(value: &Value) -> Result<Self, AppError> {
        let field = |i| value.field(i);
        match (
            field(0).and_then(Value::as_address),
            field(1).and_then(Value::as_address),
            field(2).and_then(Value::as_uint),
        ) {
            (Some(recipient), Some(asset_id), Some(threshold)) => Ok(DepositState {
                recipient,
                asset_id,
                threshold,
            }),
            _ => Err(AppError::StateObjectNotEncodable(
                "not a deposit app state".to_owned(),
            )),
        }
    }

    /// Free balance credits once the multisig holds `balance` of the asset.
    pub fn credits(&self, balance: U256) -> Credits {
        BTreeMap::from([(
            self.asset_id,
            BTreeMap::from([(self.recipient, balance.saturating_sub(self.threshold))]),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credits_above_threshold() {
        let state = DepositState {
            recipient: Address([1; 20]),
            asset_id: Address::ZERO,
            threshold: 10.into(),
        };
        let value = state.to_value().unwrap();
        DEPOSIT_STATE_ENCODING
            .parse::<abiencode::AbiType>()
            .unwrap()
            .check(&value)
            .unwrap();
        assert_eq!(DepositState::from_value(&value).unwrap(), state);

        assert_eq!(state.credits(15.into())[&Address::ZERO][&Address([1; 20])], 5.into());
        // A balance that dropped meanwhile credits nothing.
        assert_eq!(state.credits(3.into())[&Address::ZERO][&Address([1; 20])], 0.into());
    }

    #[test]
    fn rejects_other_states() {
        assert!(DepositState::from_value(&Value::Tuple(vec![Value::Bool(true)])).is_err());
    }
}
