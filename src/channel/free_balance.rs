//! The free balance: each party's unencumbered balance per asset, plus the set
//! of apps currently holding deposits.
//!
//! It is stored as the state of a regular app instance, so it is versioned
//! and signed like any other app.

use std::collections::{BTreeMap, BTreeSet};

use super::ChannelError;
use crate::abiencode::{
    types::{Address, Hash, U256},
    Value,
};

pub const FREE_BALANCE_STATE_ENCODING: &str = "tuple(address[] tokenAddresses, tuple(address to, uint256 amount)[][] balances, bytes32[] activeApps)";

/// The asset every channel starts with (the chain's native currency).
pub const CONVENTION_FOR_ETH_ASSET_ID: Address = Address::ZERO;

/// Amounts per asset and party.
pub type Credits = BTreeMap<Address, BTreeMap<Address, U256>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeBalance {
    owners: [Address; 2],
    balances: Credits,
    active_apps: BTreeSet<Hash>,
}

impl FreeBalance {
    /// Zero balances in the native asset.
    pub fn new(owners: [Address; 2]) -> Self {
        let mut fb = FreeBalance {
            owners,
            balances: BTreeMap::new(),
            active_apps: BTreeSet::new(),
        };
        fb.ensure_asset(CONVENTION_FOR_ETH_ASSET_ID);
        fb
    }

    fn ensure_asset(&mut self, asset: Address) -> &mut BTreeMap<Address, U256> {
        let owners = self.owners;
        self.balances.entry(asset).or_insert_with(|| {
            owners
                .iter()
                .map(|owner| (*owner, U256::zero()))
                .collect()
        })
    }

    pub fn balance(&self, asset: &Address, party: &Address) -> U256 {
        self.balances
            .get(asset)
            .and_then(|b| b.get(party))
            .copied()
            .unwrap_or_default()
    }

    pub fn balances(&self) -> &Credits {
        &self.balances
    }

    /// Balances of one asset, zero for both owners if the asset is unknown.
    pub fn balances_of(&self, asset: &Address) -> BTreeMap<Address, U256> {
        match self.balances.get(asset) {
            Some(b) => b.clone(),
            None => self.owners.iter().map(|o| (*o, U256::zero())).collect(),
        }
    }

    pub fn total(&self, asset: &Address) -> U256 {
        self.balances
            .get(asset)
            .map(|b| b.values().fold(U256::zero(), |a, v| a.saturating_add(*v)))
            .unwrap_or_default()
    }

    pub fn active_apps(&self) -> &BTreeSet<Hash> {
        &self.active_apps
    }

    pub(crate) fn debit(&mut self, credits: &Credits) -> Result<(), ChannelError> {
        // Check everything first so a failure leaves self untouched.
        for (asset, parties) in credits {
            for (party, amount) in parties {
                let available = self.balance(asset, party);
                if available < *amount {
                    return Err(ChannelError::InsufficientFreeBalance {
                        party: *party,
                        asset: *asset,
                        available,
                        required: *amount,
                    });
                }
            }
        }
        for (asset, parties) in credits {
            let balances = self.ensure_asset(*asset);
            for (party, amount) in parties {
                let entry = balances.entry(*party).or_default();
                *entry -= *amount;
            }
        }
        Ok(())
    }

    pub(crate) fn credit(&mut self, credits: &Credits) -> Result<(), ChannelError> {
        for (asset, parties) in credits {
            for (party, amount) in parties {
                if !self.owners.contains(party) {
                    return Err(ChannelError::NotAParticipant(*party));
                }
                if self.balance(asset, party).checked_add(*amount).is_none() {
                    return Err(ChannelError::Overflow);
                }
            }
        }
        for (asset, parties) in credits {
            let balances = self.ensure_asset(*asset);
            for (party, amount) in parties {
                let entry = balances.entry(*party).or_default();
                *entry += *amount;
            }
        }
        Ok(())
    }

    pub(crate) fn activate(&mut self, app: Hash) {
        self.active_apps.insert(app);
    }

    pub(crate) fn deactivate(&mut self, app: &Hash) {
        self.active_apps.remove(app);
    }

    /// The app state value, in [FREE_BALANCE_STATE_ENCODING].
    pub fn to_value(&self) -> Value {
        let tokens = self.balances.keys().map(|a| Value::Address(*a)).collect();
        let balances = self
            .balances
            .values()
            .map(|parties| {
                Value::Array(
                    parties
                        .iter()
                        .map(|(to, amount)| {
                            Value::Tuple(vec![Value::Address(*to), Value::Uint(*amount)])
                        })
                        .collect(),
                )
            })
            .collect();
        let active = self
            .active_apps
            .iter()
            .map(|h| Value::FixedBytes(h.0.to_vec()))
            .collect();
        Value::Tuple(vec![
            Value::Array(tokens),
            Value::Array(balances),
            Value::Array(active),
        ])
    }

    pub fn from_value(owners: [Address; 2], value: &Value) -> Result<Self, ChannelError> {
        let malformed = || ChannelError::InvalidFreeBalance;
        let tokens = value.field(0).and_then(Value::as_items).ok_or_else(malformed)?;
        let balances = value.field(1).and_then(Value::as_items).ok_or_else(malformed)?;
        let active = value.field(2).and_then(Value::as_items).ok_or_else(malformed)?;
        if tokens.len() != balances.len() {
            return Err(malformed());
        }

        let mut fb = FreeBalance {
            owners,
            balances: BTreeMap::new(),
            active_apps: BTreeSet::new(),
        };
        for (token, entries) in tokens.iter().zip(balances) {
            let token = token.as_address().ok_or_else(malformed)?;
            let mut parties = BTreeMap::new();
            for entry in entries.as_items().ok_or_else(malformed)? {
                let to = entry.field(0).and_then(Value::as_address).ok_or_else(malformed)?;
                let amount = entry.field(1).and_then(Value::as_uint).ok_or_else(malformed)?;
                parties.insert(to, amount);
            }
            fb.balances.insert(token, parties);
        }
        for app in active {
            match app {
                Value::FixedBytes(b) => {
                    let hash = Hash::try_from(&b[..]).map_err(|_| malformed())?;
                    fb.active_apps.insert(hash);
                }
                _ => return Err(malformed()),
            }
        }
        Ok(fb)
    }
}
