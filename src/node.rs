//! The node.
//!
//! A [Node] owns one party's view of all its channels. Local requests enter
//! through the methods below (or [Node::dispatch]), peer messages through
//! [Node::on_message]. Every state-changing operation runs under the locks of
//! the resources it touches and publishes one [Event] once the new state is
//! persisted.

mod router;
pub mod rpc;

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt::Debug,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

pub use rpc::{MethodName, MethodParams, MethodResult, RpcRequest, RpcResponse};

use crate::{
    abiencode::{
        types::{Address, Hash, Signature, U256},
        Value,
    },
    app::{
        deposit::{DepositState, DEPOSIT_STATE_ENCODING},
        AppRegistry,
    },
    chain::ChainService,
    channel::{
        derive_multisig_address, sorted_pair, AbiEncodings, AppInstance, AppProposal, ChannelError,
        OutcomeType, ProposeParams, StateChannel,
    },
    commitment::{Commitment, WithdrawCommitment},
    config::NodeConfig,
    error::NodeError,
    lock::{LockCoordinator, LockKey},
    messages::{Event, EventData, PeerMessage, ProtocolMessage},
    protocol::{self, Completed, Context, Initiate, ProtocolError, ProtocolIo},
    sig::Signer,
    store::{CommitmentKey, SignedCommitment, Store, StoreService},
    wire::MessageBus,
};

/// Decides whether an app may be uninstalled. Consulted by both parties; a
/// refusal aborts the run.
pub trait UninstallPolicy: Debug + Send + Sync {
    /// `Err` carries the reason reported to the counterparty.
    fn check_uninstall(&self, channel: &StateChannel, app: &AppInstance) -> Result<(), String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl UninstallPolicy for AllowAll {
    fn check_uninstall(&self, _: &StateChannel, _: &AppInstance) -> Result<(), String> {
        Ok(())
    }
}

/// A run waiting for the counterparty's turn.
#[derive(Debug)]
struct Waiting {
    counterparty: Address,
    reply: oneshot::Sender<Result<ProtocolMessage, ProtocolError>>,
}

#[derive(Debug)]
struct NodeInner {
    config: NodeConfig,
    signer: Signer,
    store: StoreService,
    bus: Arc<dyn MessageBus>,
    chain: Arc<dyn ChainService>,
    registry: AppRegistry,
    policy: Arc<dyn UninstallPolicy>,
    locks: LockCoordinator,
    events: broadcast::Sender<Event>,
    pending: Mutex<HashMap<Hash, Waiting>>,
    // (multisig, asset) pairs with a deposit flow underway.
    deposits: Mutex<HashSet<(Address, Address)>>,
}

impl NodeInner {
    fn me(&self) -> Address {
        self.signer.address()
    }

    fn context<'a>(&'a self, io: &'a dyn ProtocolIo) -> Context<'a> {
        Context {
            signer: &self.signer,
            network: &self.config.network,
            registry: &self.registry,
            store: &self.store,
            chain: &*self.chain,
            policy: &*self.policy,
            io,
        }
    }

    fn publish(&self, event: Event) {
        let name = event.name();
        if self.events.send(event).is_err() {
            debug!(event = name.as_str(), "no event subscribers");
        }
    }

    async fn channel(&self, multisig: &Address) -> Result<StateChannel, NodeError> {
        self.store
            .get_channel(multisig)
            .await?
            .ok_or(NodeError::ChannelNotFound(*multisig))
    }
}

pub struct NodeBuilder {
    config: NodeConfig,
    signer: Signer,
    store: Arc<dyn Store>,
    bus: Arc<dyn MessageBus>,
    chain: Arc<dyn ChainService>,
    registry: AppRegistry,
    policy: Arc<dyn UninstallPolicy>,
}

impl NodeBuilder {
    pub fn registry(mut self, registry: AppRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn uninstall_policy(mut self, policy: Arc<dyn UninstallPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> Node {
        let me = self.signer.address();
        let (events, _) = broadcast::channel(self.config.event_capacity.max(1));
        info!(address = %me, "node started");
        Node {
            inner: Arc::new(NodeInner {
                store: StoreService::new(self.store, &self.config.store_prefix, me),
                locks: LockCoordinator::new(self.config.lock_timeout()),
                config: self.config,
                signer: self.signer,
                bus: self.bus,
                chain: self.chain,
                registry: self.registry,
                policy: self.policy,
                events,
                pending: Mutex::new(HashMap::new()),
                deposits: Mutex::new(HashSet::new()),
            }),
        }
    }
}

/// Cheap to clone; clones share all state.
#[derive(Debug, Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

fn app_keys(multisig: Address, identity_hash: Hash) -> [LockKey; 2] {
    [LockKey::Channel(multisig), LockKey::App(identity_hash)]
}

/// Marks a deposit flow as running until dropped.
struct DepositSlot<'a> {
    deposits: &'a Mutex<HashSet<(Address, Address)>>,
    key: (Address, Address),
}

impl<'a> DepositSlot<'a> {
    fn claim(
        deposits: &'a Mutex<HashSet<(Address, Address)>>,
        multisig: Address,
        asset: Address,
    ) -> Result<Self, NodeError> {
        let key = (multisig, asset);
        if !deposits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key)
        {
            return Err(NodeError::DepositInProgress(asset));
        }
        Ok(DepositSlot { deposits, key })
    }
}

impl Drop for DepositSlot<'_> {
    fn drop(&mut self) {
        self.deposits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl Node {
    pub fn builder(
        config: NodeConfig,
        signer: Signer,
        store: Arc<dyn Store>,
        bus: Arc<dyn MessageBus>,
        chain: Arc<dyn ChainService>,
    ) -> NodeBuilder {
        NodeBuilder {
            config,
            signer,
            store,
            bus,
            chain,
            registry: AppRegistry::new(),
            policy: Arc::new(AllowAll),
        }
    }

    /// This party's identifier.
    pub fn address(&self) -> Address {
        self.inner.me()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    /// Events of every run completed from now on, initiated or responded to.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    /// Run `request` as the initiator while holding `keys`.
    async fn run(
        &self,
        keys: impl IntoIterator<Item = LockKey>,
        request: Initiate,
    ) -> Result<Completed, NodeError> {
        let inner = &*self.inner;
        let _locks = inner.locks.acquire(keys).await?;
        let io = router::NodeIo::new(inner);
        let completed = protocol::initiate(&inner.context(&io), request).await?;
        inner.publish(completed.event.clone());
        Ok(completed)
    }

    /// Multisig of the channel `identity_hash` was proposed in.
    async fn locate_app(&self, identity_hash: Hash, missing: ChannelError) -> Result<Address, NodeError> {
        match self.inner.store.get_channel_by_app(&identity_hash).await? {
            Some(channel) => Ok(channel.multisig_address),
            None => Err(missing.into()),
        }
    }

    fn is_deposit_app(&self, app: &AppInstance) -> bool {
        let deposit_app = self.inner.config.network.deposit_app;
        !deposit_app.is_zero() && app.app_definition() == deposit_app
    }

    /// Open a channel with `counterparty`. Returns its multisig address.
    pub async fn create_channel(&self, counterparty: Address) -> Result<Address, NodeError> {
        let multisig =
            derive_multisig_address(&self.inner.config.network, self.address(), counterparty)?;
        self.run([LockKey::Channel(multisig)], Initiate::Setup { counterparty })
            .await?;
        Ok(multisig)
    }

    /// Propose an app. Returns the proposal's identity hash.
    pub async fn propose_install(
        &self,
        multisig_address: Address,
        params: ProposeParams,
    ) -> Result<Hash, NodeError> {
        let completed = self
            .run(
                [LockKey::Channel(multisig_address)],
                Initiate::Propose {
                    multisig_address,
                    params,
                },
            )
            .await?;
        completed
            .event
            .app_identity_hash()
            .ok_or(ProtocolError::UnexpectedMessage("proposal run completed without an app").into())
    }

    pub async fn install(&self, app_identity_hash: Hash) -> Result<AppInstance, NodeError> {
        let multisig = self
            .locate_app(app_identity_hash, ChannelError::ProposalNotFound(app_identity_hash))
            .await?;
        let completed = self
            .run(
                app_keys(multisig, app_identity_hash),
                Initiate::Install { app_identity_hash },
            )
            .await?;
        Ok((**completed.channel.get_app(&app_identity_hash)?).clone())
    }

    /// Drop a proposal without installing it and tell the counterparty.
    pub async fn reject_install(&self, app_identity_hash: Hash) -> Result<(), NodeError> {
        let inner = &*self.inner;
        let me = inner.me();
        let multisig = self
            .locate_app(app_identity_hash, ChannelError::ProposalNotFound(app_identity_hash))
            .await?;
        let _locks = inner.locks.acquire(app_keys(multisig, app_identity_hash)).await?;

        let channel = inner.channel(&multisig).await?;
        let rejected = channel.remove_proposal(&app_identity_hash)?;
        inner.store.save(&rejected, &[]).await?;

        let notice = PeerMessage::ProposalRejected {
            from: me,
            to: channel.counterparty_of(&me)?,
            multisig_address: multisig,
            app_identity_hash,
        };
        if let Err(error) = inner.bus.send(notice) {
            // The counterparty keeps the proposal; it cannot be installed
            // without our signatures.
            warn!(%error, app = %app_identity_hash, "could not notify counterparty of rejection");
        }
        inner.publish(Event {
            from: me,
            data: EventData::RejectInstall {
                multisig_address: multisig,
                app_identity_hash,
            },
        });
        Ok(())
    }

    /// Apply `action` to an installed app. Returns the new state.
    pub async fn take_action(&self, app_identity_hash: Hash, action: Value) -> Result<Value, NodeError> {
        let multisig = self
            .locate_app(app_identity_hash, ChannelError::AppNotInstalled(app_identity_hash))
            .await?;
        let completed = self
            .run(
                app_keys(multisig, app_identity_hash),
                Initiate::TakeAction {
                    app_identity_hash,
                    action,
                },
            )
            .await?;
        Ok(completed.channel.get_app(&app_identity_hash)?.latest_state.clone())
    }

    /// Uninstall an app, crediting its outcome to the free balance. Deposit
    /// apps are refused; the deposit flow removes them itself.
    pub async fn uninstall(&self, app_identity_hash: Hash) -> Result<(), NodeError> {
        let channel = self
            .inner
            .store
            .get_channel_by_app(&app_identity_hash)
            .await?
            .ok_or(ChannelError::AppNotInstalled(app_identity_hash))?;
        if self.is_deposit_app(channel.get_app(&app_identity_hash)?) {
            return Err(NodeError::UseRescindDepositRights);
        }
        self.uninstall_app(channel.multisig_address, app_identity_hash).await
    }

    async fn uninstall_app(&self, multisig: Address, app_identity_hash: Hash) -> Result<(), NodeError> {
        self.run(
            app_keys(multisig, app_identity_hash),
            Initiate::Uninstall { app_identity_hash },
        )
        .await?;
        Ok(())
    }

    /// Exchange channel copies with the counterparty and keep the fresher.
    pub async fn sync(&self, multisig_address: Address) -> Result<StateChannel, NodeError> {
        let completed = self
            .run(
                [LockKey::Channel(multisig_address)],
                Initiate::Sync { multisig_address },
            )
            .await?;
        Ok(completed.channel)
    }

    pub async fn get_state_channel(&self, multisig: Address) -> Result<StateChannel, NodeError> {
        self.inner.channel(&multisig).await
    }

    pub async fn get_app_instances(&self, multisig: Address) -> Result<Vec<AppInstance>, NodeError> {
        let channel = self.inner.channel(&multisig).await?;
        Ok(channel.app_instances.values().map(|a| (**a).clone()).collect())
    }

    pub async fn get_app_instance(&self, app_identity_hash: Hash) -> Result<AppInstance, NodeError> {
        let channel = self
            .inner
            .store
            .get_channel_by_app(&app_identity_hash)
            .await?
            .ok_or(ChannelError::AppNotInstalled(app_identity_hash))?;
        Ok((**channel.get_app(&app_identity_hash)?).clone())
    }

    pub async fn get_proposed_app_instances(&self, multisig: Address) -> Result<Vec<AppProposal>, NodeError> {
        let channel = self.inner.channel(&multisig).await?;
        Ok(channel
            .proposed_app_instances
            .values()
            .map(|p| (**p).clone())
            .collect())
    }

    /// Free balance of both owners in `asset`.
    pub async fn get_free_balance_state(
        &self,
        multisig: Address,
        asset: Address,
    ) -> Result<BTreeMap<Address, U256>, NodeError> {
        let channel = self.inner.channel(&multisig).await?;
        Ok(channel.free_balance()?.balances_of(&asset))
    }

    pub async fn get_commitment(&self, key: CommitmentKey) -> Result<Option<SignedCommitment>, NodeError> {
        Ok(self.inner.store.get_commitment(&key).await?)
    }

    /// Deploy the channel's multisig. Returns the transaction hash, or
    /// [Hash::ZERO] if it is already deployed.
    pub async fn deploy_state_deposit_holder(&self, multisig: Address) -> Result<Hash, NodeError> {
        let inner = &*self.inner;
        let channel = inner.channel(&multisig).await?;
        let owners = inner.chain.get_multisig_owners(&multisig).await?;
        if !owners.is_empty() {
            if owners.len() != 2 || sorted_pair(owners[0], owners[1]) != channel.owners() {
                return Err(ProtocolError::MultisigMismatch.into());
            }
            info!(%multisig, "multisig already deployed");
            return Ok(Hash::ZERO);
        }
        let tx = inner.chain.deploy_multisig(&multisig, channel.owners()).await?;
        info!(%multisig, %tx, "multisig deployed");
        Ok(tx)
    }

    /// Move `amount` of `asset` into the multisig and credit it to this
    /// party's free balance.
    ///
    /// Wraps the on-chain transfer in a deposit app: installed before the
    /// transfer with the current holdings as threshold, uninstalled after it
    /// so whatever arrived above the threshold is credited. Returns the
    /// transfer's transaction hash.
    pub async fn deposit(&self, multisig: Address, asset: Address, amount: U256) -> Result<Hash, NodeError> {
        let inner = &*self.inner;
        let deposit_app = inner.config.network.deposit_app;
        if deposit_app.is_zero() {
            return Err(NodeError::InvalidParams("no deposit app configured"));
        }
        let _slot = DepositSlot::claim(&inner.deposits, multisig, asset)?;
        // A deposit app for the asset already in the channel is refused by
        // the propose run, under the channel lock.
        let channel = inner.channel(&multisig).await?;

        let me = inner.me();
        let state = DepositState {
            recipient: me,
            asset_id: asset,
            threshold: inner.chain.balance_of(&multisig, &asset).await?,
        };
        let params = ProposeParams {
            initiator_identifier: me,
            responder_identifier: channel.counterparty_of(&me)?,
            app_definition: deposit_app,
            abi_encodings: AbiEncodings {
                state_encoding: DEPOSIT_STATE_ENCODING.to_owned(),
                action_encoding: None,
            },
            initiator_deposit: U256::zero(),
            initiator_deposit_asset_id: asset,
            responder_deposit: U256::zero(),
            responder_deposit_asset_id: asset,
            default_timeout: U256::zero(),
            state_timeout: U256::zero(),
            initial_state: state.to_value()?,
            outcome_type: OutcomeType::SingleAssetTwoPartyCoinTransfer,
        };
        let app = self.propose_install(multisig, params).await?;
        self.install(app).await?;

        info!(%multisig, %asset, %amount, "depositing");
        let tx = inner.chain.deposit(&multisig, &asset, amount).await;
        // Uninstall even if the transfer failed; nothing above the threshold
        // is credited then.
        self.uninstall_app(multisig, app).await?;
        Ok(tx?)
    }

    /// Sign a withdrawal of `amount` of `asset` from the multisig to
    /// `recipient`. Only valid on-chain once the counterparty signed it too.
    pub async fn withdrawal_commitment(
        &self,
        multisig: Address,
        recipient: Address,
        asset: Address,
        amount: U256,
        nonce: U256,
    ) -> Result<(WithdrawCommitment, Signature), NodeError> {
        let channel = self.inner.channel(&multisig).await?;
        let commitment = WithdrawCommitment::new(&channel, recipient, asset, amount, nonce);
        let signature = commitment.sign(&self.inner.signer)?;
        Ok((commitment, signature))
    }
}
