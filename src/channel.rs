//! The channel model.
//!
//! [StateChannel] is an immutable value: every transformation returns a new
//! channel and leaves the old one intact, so a reader holding an older value
//! keeps seeing a consistent snapshot. App instances are shared between
//! versions behind [Arc]s.

mod app_instance;
mod free_balance;
pub mod interpreter;
mod proposal;

use std::{collections::BTreeMap, sync::Arc};

use serde::Serialize;
use thiserror::Error;

use crate::{
    abiencode::{
        self, as_dyn_array,
        types::{Address, Hash, Signature, U256},
    },
    app::AppError,
    config::NetworkContext,
};

pub use app_instance::{AppInstance, InterpreterParams};
pub use free_balance::{Credits, FreeBalance, CONVENTION_FOR_ETH_ASSET_ID, FREE_BALANCE_STATE_ENCODING};
pub use proposal::{AbiEncodings, AppIdentity, AppProposal, OutcomeType, ProposeParams};

/// Timeout of the free balance app, in blocks.
pub const FREE_BALANCE_DEFAULT_TIMEOUT: u64 = 172_800;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel participants must have different identifiers")]
    IdenticalIdentifiers,
    #[error("malformed identifier or address")]
    MalformedIdentifier,
    #[error("{0} is not a participant of the channel")]
    NotAParticipant(Address),
    #[error("app {0} is already installed")]
    AppAlreadyInstalled(Hash),
    #[error("app {0} is not installed")]
    AppNotInstalled(Hash),
    #[error("no proposal for app {0}")]
    ProposalNotFound(Hash),
    #[error("app {0} has already been proposed")]
    DuplicateProposal(Hash),
    #[error("insufficient free balance: {party} has {available} of asset {asset}, needs {required}")]
    InsufficientFreeBalance {
        party: Address,
        asset: Address,
        available: U256,
        required: U256,
    },
    #[error("the free balance app cannot be uninstalled")]
    CannotUninstallFreeBalance,
    #[error("invalid version number, expected {expected} got {got}")]
    InvalidVersion { expected: u64, got: u64 },
    #[error("invalid proposal: {0}")]
    InvalidProposal(&'static str),
    #[error("invalid outcome: {0}")]
    InvalidOutcome(&'static str),
    #[error("free balance state is malformed")]
    InvalidFreeBalance,
    #[error("amount overflow")]
    Overflow,
    #[error(transparent)]
    App(#[from] AppError),
    #[error("encoding failed: {0}")]
    Encoding(#[from] abiencode::Error),
}

/// Ascending byte order, used wherever two-party order matters.
pub fn sorted_pair(a: Address, b: Address) -> [Address; 2] {
    if a <= b {
        [a, b]
    } else {
        [b, a]
    }
}

#[derive(Serialize)]
struct MultisigSalt {
    proxy_factory: Address,
    multisig_mastercopy: Address,
    #[serde(with = "as_dyn_array")]
    owners: [Address; 2],
}

/// The counterfactual address of the multisig owned by `a` and `b`.
pub fn derive_multisig_address(
    network: &NetworkContext,
    a: Address,
    b: Address,
) -> Result<Address, ChannelError> {
    let hash = abiencode::to_hash(&MultisigSalt {
        proxy_factory: network.proxy_factory,
        multisig_mastercopy: network.multisig_mastercopy,
        owners: sorted_pair(a, b),
    })?;
    Ok(Address::try_from(&hash.0[12..])?)
}

/// Contract addresses fixed at channel creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelAddresses {
    pub proxy_factory: Address,
    pub multisig_mastercopy: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChannel {
    pub multisig_address: Address,
    pub addresses: ChannelAddresses,
    /// Initiator and responder of the setup protocol, in that order.
    pub user_identifiers: [Address; 2],
    pub free_balance: Arc<AppInstance>,
    pub app_instances: BTreeMap<Hash, Arc<AppInstance>>,
    pub proposed_app_instances: BTreeMap<Hash, Arc<AppProposal>>,
    pub num_proposed_apps: u64,
}

impl StateChannel {
    /// A fresh channel: no apps, zero native-asset balances.
    pub fn setup(
        network: &NetworkContext,
        multisig_address: Address,
        initiator: Address,
        responder: Address,
    ) -> Result<Self, ChannelError> {
        if initiator == responder {
            return Err(ChannelError::IdenticalIdentifiers);
        }
        if initiator.is_zero() || responder.is_zero() || multisig_address.is_zero() {
            return Err(ChannelError::MalformedIdentifier);
        }

        let owners = sorted_pair(initiator, responder);
        let fb = FreeBalance::new(owners);
        let proposal = AppProposal::new(
            multisig_address,
            0,
            ProposeParams {
                initiator_identifier: owners[0],
                responder_identifier: owners[1],
                app_definition: network.identity_app,
                abi_encodings: AbiEncodings {
                    state_encoding: FREE_BALANCE_STATE_ENCODING.to_owned(),
                    action_encoding: None,
                },
                initiator_deposit: U256::zero(),
                initiator_deposit_asset_id: CONVENTION_FOR_ETH_ASSET_ID,
                responder_deposit: U256::zero(),
                responder_deposit_asset_id: CONVENTION_FOR_ETH_ASSET_ID,
                default_timeout: FREE_BALANCE_DEFAULT_TIMEOUT.into(),
                state_timeout: U256::zero(),
                initial_state: fb.to_value(),
                outcome_type: OutcomeType::MultiAssetMultiPartyCoinTransfer,
            },
        )?;

        Ok(StateChannel {
            multisig_address,
            addresses: ChannelAddresses {
                proxy_factory: network.proxy_factory,
                multisig_mastercopy: network.multisig_mastercopy,
            },
            user_identifiers: [initiator, responder],
            free_balance: Arc::new(AppInstance::from_proposal(proposal)),
            app_instances: BTreeMap::new(),
            proposed_app_instances: BTreeMap::new(),
            num_proposed_apps: 0,
        })
    }

    /// Identifiers sorted ascending.
    pub fn owners(&self) -> [Address; 2] {
        sorted_pair(self.user_identifiers[0], self.user_identifiers[1])
    }

    pub fn is_participant(&self, who: &Address) -> bool {
        self.user_identifiers.contains(who)
    }

    pub fn counterparty_of(&self, me: &Address) -> Result<Address, ChannelError> {
        match self.user_identifiers {
            [a, b] if a == *me => Ok(b),
            [a, b] if b == *me => Ok(a),
            _ => Err(ChannelError::NotAParticipant(*me)),
        }
    }

    pub fn free_balance_app(&self) -> &AppInstance {
        &self.free_balance
    }

    pub fn free_balance(&self) -> Result<FreeBalance, ChannelError> {
        FreeBalance::from_value(self.owners(), &self.free_balance.latest_state)
    }

    pub fn free_balance_version(&self) -> u64 {
        self.free_balance.latest_version_number
    }

    pub fn get_app(&self, identity_hash: &Hash) -> Result<&Arc<AppInstance>, ChannelError> {
        self.app_instances
            .get(identity_hash)
            .ok_or(ChannelError::AppNotInstalled(*identity_hash))
    }

    pub fn get_proposal(&self, identity_hash: &Hash) -> Result<&Arc<AppProposal>, ChannelError> {
        self.proposed_app_instances
            .get(identity_hash)
            .ok_or(ChannelError::ProposalNotFound(*identity_hash))
    }

    /// Total of `asset` locked in installed apps.
    pub fn deposits_in_apps(&self, asset: &Address) -> U256 {
        self.app_instances
            .values()
            .filter_map(|app| app.deposit_totals().get(asset).copied())
            .fold(U256::zero(), |a, v| a.saturating_add(v))
    }

    /// `(num_proposed_apps, free balance version, sum of app versions)`,
    /// compared lexicographically to decide which of two copies is newer.
    pub fn freshness(&self) -> (u64, u64, u64) {
        (
            self.num_proposed_apps,
            self.free_balance_version(),
            self.app_instances
                .values()
                .map(|a| a.latest_version_number)
                .sum(),
        )
    }

    /// Add a proposal, assigning it the next app sequence number.
    pub fn propose_app(&self, params: ProposeParams) -> Result<(StateChannel, AppProposal), ChannelError> {
        for id in [&params.initiator_identifier, &params.responder_identifier] {
            if !self.is_participant(id) {
                return Err(ChannelError::NotAParticipant(*id));
            }
        }
        if params.app_definition == self.free_balance.app_definition() {
            return Err(ChannelError::InvalidProposal(
                "the free balance app cannot be proposed",
            ));
        }

        let proposal = AppProposal::new(self.multisig_address, self.num_proposed_apps, params)?;
        let hash = proposal.identity_hash;
        if self.proposed_app_instances.contains_key(&hash) {
            return Err(ChannelError::DuplicateProposal(hash));
        }
        if self.app_instances.contains_key(&hash) {
            return Err(ChannelError::AppAlreadyInstalled(hash));
        }

        let mut channel = self.clone();
        channel
            .proposed_app_instances
            .insert(hash, Arc::new(proposal.clone()));
        channel.num_proposed_apps += 1;
        Ok((channel, proposal))
    }

    pub fn with_proposal_signatures(
        &self,
        identity_hash: &Hash,
        signatures: Vec<Signature>,
    ) -> Result<StateChannel, ChannelError> {
        let mut proposal = (**self.get_proposal(identity_hash)?).clone();
        proposal.signatures = signatures;
        let mut channel = self.clone();
        channel
            .proposed_app_instances
            .insert(*identity_hash, Arc::new(proposal));
        Ok(channel)
    }

    /// Drop a pending proposal. The proposal counter is not rolled back.
    pub fn remove_proposal(&self, identity_hash: &Hash) -> Result<StateChannel, ChannelError> {
        self.get_proposal(identity_hash)?;
        let mut channel = self.clone();
        channel.proposed_app_instances.remove(identity_hash);
        Ok(channel)
    }

    /// Install `proposal`, taking `decrements` out of the free balance.
    ///
    /// Bumps the free balance version; its signatures have to be added with
    /// [with_free_balance_signatures][Self::with_free_balance_signatures].
    pub fn install_app(&self, proposal: &AppProposal, decrements: &Credits) -> Result<StateChannel, ChannelError> {
        let hash = proposal.identity_hash;
        if self.app_instances.contains_key(&hash) {
            return Err(ChannelError::AppAlreadyInstalled(hash));
        }
        if proposal.multisig_address != self.multisig_address {
            return Err(ChannelError::InvalidProposal("proposal belongs to another channel"));
        }

        let mut fb = self.free_balance()?;
        fb.debit(decrements)?;
        fb.activate(hash);

        let mut channel = self.with_free_balance(fb)?;
        channel.proposed_app_instances.remove(&hash);
        channel
            .app_instances
            .insert(hash, Arc::new(AppInstance::from_proposal(proposal.clone())));
        Ok(channel)
    }

    /// Remove the app and add `credits` to the free balance.
    pub fn uninstall_app(&self, identity_hash: &Hash, credits: &Credits) -> Result<StateChannel, ChannelError> {
        if *identity_hash == self.free_balance.identity_hash() {
            return Err(ChannelError::CannotUninstallFreeBalance);
        }
        self.get_app(identity_hash)?;

        let mut fb = self.free_balance()?;
        fb.credit(credits)?;
        fb.deactivate(identity_hash);

        let mut channel = self.with_free_balance(fb)?;
        channel.app_instances.remove(identity_hash);
        Ok(channel)
    }

    fn with_free_balance(&self, fb: FreeBalance) -> Result<StateChannel, ChannelError> {
        let version = self.free_balance_version() + 1;
        let mut channel = self.clone();
        channel.free_balance = Arc::new(self.free_balance.with_state(fb.to_value(), None, version)?);
        Ok(channel)
    }

    pub fn with_free_balance_signatures(&self, signatures: Vec<Signature>) -> StateChannel {
        let mut channel = self.clone();
        channel.free_balance = Arc::new(self.free_balance.with_signatures(signatures));
        channel
    }

    /// Replace the state of an installed app. `version` must follow the
    /// current version directly.
    pub fn set_app_state(
        &self,
        identity_hash: &Hash,
        state: abiencode::Value,
        action: Option<abiencode::Value>,
        version: u64,
    ) -> Result<StateChannel, ChannelError> {
        let app = self.get_app(identity_hash)?.with_state(state, action, version)?;
        let mut channel = self.clone();
        channel.app_instances.insert(*identity_hash, Arc::new(app));
        Ok(channel)
    }

    pub fn with_app_signatures(
        &self,
        identity_hash: &Hash,
        signatures: Vec<Signature>,
    ) -> Result<StateChannel, ChannelError> {
        let app = self.get_app(identity_hash)?.with_signatures(signatures);
        let mut channel = self.clone();
        channel.app_instances.insert(*identity_hash, Arc::new(app));
        Ok(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abiencode::Value;

    fn network() -> NetworkContext {
        NetworkContext {
            proxy_factory: Address([0xf0; 20]),
            multisig_mastercopy: Address([0xf1; 20]),
            identity_app: Address([0xf2; 20]),
            ..Default::default()
        }
    }

    const ALICE: Address = Address([0xaa; 20]);
    const BOB: Address = Address([0x0b; 20]);

    fn channel() -> StateChannel {
        let multisig = derive_multisig_address(&network(), ALICE, BOB).unwrap();
        StateChannel::setup(&network(), multisig, ALICE, BOB).unwrap()
    }

    fn funded(amount: u64) -> StateChannel {
        let ch = channel();
        let mut fb = ch.free_balance().unwrap();
        let credits = BTreeMap::from([(
            Address::ZERO,
            BTreeMap::from([(ALICE, U256::from(amount)), (BOB, U256::from(amount))]),
        )]);
        fb.credit(&credits).unwrap();
        ch.with_free_balance(fb).unwrap()
    }

    fn params(deposit: u64) -> ProposeParams {
        ProposeParams {
            initiator_identifier: ALICE,
            responder_identifier: BOB,
            app_definition: Address([0x11; 20]),
            abi_encodings: AbiEncodings {
                state_encoding: "tuple(uint256 counter)".to_owned(),
                action_encoding: Some("tuple(uint256 increment)".to_owned()),
            },
            initiator_deposit: deposit.into(),
            initiator_deposit_asset_id: Address::ZERO,
            responder_deposit: deposit.into(),
            responder_deposit_asset_id: Address::ZERO,
            default_timeout: 100.into(),
            state_timeout: 10.into(),
            initial_state: Value::Tuple(vec![Value::Uint(0.into())]),
            outcome_type: OutcomeType::TwoPartyFixedOutcome,
        }
    }

    #[test]
    fn setup() {
        let ch = channel();
        assert_eq!(ch.owners(), [BOB, ALICE]);
        assert_eq!(ch.num_proposed_apps, 0);
        assert!(ch.app_instances.is_empty());
        assert_eq!(ch.free_balance_version(), 1);
        let fb = ch.free_balance().unwrap();
        assert_eq!(fb.balance(&Address::ZERO, &ALICE), U256::zero());
        assert!(fb.active_apps().is_empty());

        let network = network();
        assert_eq!(
            StateChannel::setup(&network, Address([1; 20]), ALICE, ALICE),
            Err(ChannelError::IdenticalIdentifiers)
        );
        assert_eq!(
            StateChannel::setup(&network, Address([1; 20]), ALICE, Address::ZERO),
            Err(ChannelError::MalformedIdentifier)
        );
    }

    #[test]
    fn multisig_address_is_order_independent() {
        assert_eq!(
            derive_multisig_address(&network(), ALICE, BOB).unwrap(),
            derive_multisig_address(&network(), BOB, ALICE).unwrap()
        );
    }

    #[test]
    fn propose_assigns_sequence_numbers() {
        let ch = funded(5);
        let (ch1, p1) = ch.propose_app(params(1)).unwrap();
        assert_eq!(p1.app_seq_no, 0);
        assert_eq!(ch1.num_proposed_apps, 1);
        // The old value is untouched.
        assert_eq!(ch.num_proposed_apps, 0);
        assert!(ch.proposed_app_instances.is_empty());

        let (ch2, p2) = ch1.propose_app(params(1)).unwrap();
        assert_eq!(p2.app_seq_no, 1);
        assert_ne!(p1.identity_hash, p2.identity_hash);

        // Rejecting does not roll the counter back.
        let ch3 = ch2.remove_proposal(&p2.identity_hash).unwrap();
        assert_eq!(ch3.num_proposed_apps, 2);
        assert_eq!(
            ch3.remove_proposal(&p2.identity_hash),
            Err(ChannelError::ProposalNotFound(p2.identity_hash))
        );
    }

    #[test]
    fn propose_rejects_bad_state() {
        let mut p = params(1);
        p.initial_state = Value::Bool(true);
        assert!(matches!(
            channel().propose_app(p),
            Err(ChannelError::App(AppError::StateObjectNotEncodable(_)))
        ));

        let mut stranger = params(1);
        stranger.responder_identifier = Address([0x33; 20]);
        assert_eq!(
            channel().propose_app(stranger),
            Err(ChannelError::NotAParticipant(Address([0x33; 20])))
        );
    }

    #[test]
    fn install_uninstall_round_trip() {
        let ch = funded(5);
        let (proposed, p) = ch.propose_app(params(2)).unwrap();
        let installed = proposed.install_app(&p, &p.deposits()).unwrap();

        let fb = installed.free_balance().unwrap();
        assert_eq!(fb.balance(&Address::ZERO, &ALICE), 3.into());
        assert_eq!(fb.balance(&Address::ZERO, &BOB), 3.into());
        assert!(fb.active_apps().contains(&p.identity_hash));
        assert!(installed.proposed_app_instances.is_empty());
        assert_eq!(installed.free_balance_version(), ch.free_balance_version() + 1);
        assert_eq!(installed.deposits_in_apps(&Address::ZERO), 4.into());
        assert_eq!(
            installed.install_app(&p, &p.deposits()),
            Err(ChannelError::AppAlreadyInstalled(p.identity_hash))
        );

        let uninstalled = installed
            .uninstall_app(&p.identity_hash, &p.deposits())
            .unwrap();
        assert_eq!(
            uninstalled.free_balance().unwrap().balances(),
            ch.free_balance().unwrap().balances()
        );
        assert!(uninstalled.app_instances.is_empty());
        assert_eq!(
            uninstalled.uninstall_app(&p.identity_hash, &p.deposits()),
            Err(ChannelError::AppNotInstalled(p.identity_hash))
        );
        assert_eq!(
            uninstalled.uninstall_app(&ch.free_balance.identity_hash(), &Credits::new()),
            Err(ChannelError::CannotUninstallFreeBalance)
        );
    }

    #[test]
    fn install_requires_free_balance() {
        let ch = funded(1);
        let (proposed, p) = ch.propose_app(params(2)).unwrap();
        assert!(matches!(
            proposed.install_app(&p, &p.deposits()),
            Err(ChannelError::InsufficientFreeBalance { .. })
        ));
    }

    #[test]
    fn app_versions_increase_by_one() {
        let ch = funded(5);
        let (proposed, p) = ch.propose_app(params(1)).unwrap();
        let installed = proposed.install_app(&p, &p.deposits()).unwrap();
        let hash = p.identity_hash;
        let state = Value::Tuple(vec![Value::Uint(1.into())]);

        assert_eq!(
            installed.set_app_state(&hash, state.clone(), None, 3),
            Err(ChannelError::InvalidVersion { expected: 2, got: 3 })
        );
        let updated = installed.set_app_state(&hash, state, None, 2).unwrap();
        assert_eq!(updated.get_app(&hash).unwrap().latest_version_number, 2);
        assert!(updated.freshness() > installed.freshness());
    }
}
