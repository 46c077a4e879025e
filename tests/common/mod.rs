//! Two nodes wired together in memory.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicU8, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use rand::{rngs::StdRng, SeedableRng};
use statechannel::{
    abiencode::{
        types::{Address, Hash, U256},
        Value,
    },
    app::{AppError, AppLogic, AppRegistry, Outcome, TwoPartyFixedOutcome},
    chain::{ChainError, ChainService},
    channel::{AbiEncodings, AppInstance, OutcomeType, ProposeParams, StateChannel},
    config::{NetworkContext, NodeConfig},
    messages::{Event, PeerMessage},
    node::{Node, NodeBuilder, UninstallPolicy},
    sig::Signer,
    store::MemoryStore,
    wire::{BusError, BytesBus, MessageBus, ProtoBufEncodingLayer},
};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

pub const ETH: Address = Address::ZERO;
pub const COUNTER_APP: Address = Address([0xc0; 20]);
pub const DEPOSIT_APP: Address = Address([0xd0; 20]);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config() -> NodeConfig {
    NodeConfig {
        protocol_timeout_ms: 500,
        lock_timeout_ms: 2_000,
        network: NetworkContext {
            proxy_factory: Address([0xf0; 20]),
            multisig_mastercopy: Address([0xaa; 20]),
            identity_app: Address([0x1d; 20]),
            deposit_app: DEPOSIT_APP,
            ..NetworkContext::default()
        },
        ..NodeConfig::default()
    }
}

/// Counts up by the action's increment; the whole pot goes to the first
/// player.
#[derive(Debug)]
pub struct CounterApp;

impl AppLogic for CounterApp {
    fn apply_action(&self, state: &Value, action: &Value) -> Result<Value, AppError> {
        let counter = state
            .field(0)
            .and_then(Value::as_uint)
            .ok_or_else(|| AppError::StateObjectNotEncodable("missing counter".to_owned()))?;
        let increment = action
            .field(0)
            .and_then(Value::as_uint)
            .ok_or_else(|| AppError::InvalidAction("missing increment".to_owned()))?;
        if increment.is_zero() {
            return Err(AppError::InvalidAction("increment must be positive".to_owned()));
        }
        Ok(Value::Tuple(vec![Value::Uint(counter + increment)]))
    }

    fn compute_outcome(&self, _: &Value) -> Result<Outcome, AppError> {
        Ok(Outcome::TwoPartyFixed(TwoPartyFixedOutcome::SendToAddrOne))
    }
}

pub fn counter_params(initiator: Address, responder: Address, deposits: (u64, u64)) -> ProposeParams {
    ProposeParams {
        initiator_identifier: initiator,
        responder_identifier: responder,
        app_definition: COUNTER_APP,
        abi_encodings: AbiEncodings {
            state_encoding: "tuple(uint256 counter)".to_owned(),
            action_encoding: Some("tuple(uint256 increment)".to_owned()),
        },
        initiator_deposit: deposits.0.into(),
        initiator_deposit_asset_id: ETH,
        responder_deposit: deposits.1.into(),
        responder_deposit_asset_id: ETH,
        default_timeout: 100.into(),
        state_timeout: 10.into(),
        initial_state: Value::Tuple(vec![Value::Uint(U256::zero())]),
        outcome_type: OutcomeType::TwoPartyFixedOutcome,
    }
}

pub fn increment(by: u64) -> Value {
    Value::Tuple(vec![Value::Uint(by.into())])
}

/// Refuses to uninstall apps of one definition.
#[derive(Debug)]
pub struct RefuseUninstall(pub Address);

impl UninstallPolicy for RefuseUninstall {
    fn check_uninstall(&self, _: &StateChannel, app: &AppInstance) -> Result<(), String> {
        if app.app_definition() == self.0 {
            Err("app is still in play".to_owned())
        } else {
            Ok(())
        }
    }
}

/// Shared chain: multisig holdings and deployments.
#[derive(Debug, Default)]
pub struct MockChain {
    balances: Mutex<HashMap<(Address, Address), U256>>,
    owners: Mutex<HashMap<Address, Vec<Address>>>,
    tx_counter: AtomicU8,
}

impl MockChain {
    fn next_tx(&self) -> Hash {
        Hash([self.tx_counter.fetch_add(1, Ordering::SeqCst).wrapping_add(1); 32])
    }
}

#[async_trait]
impl ChainService for MockChain {
    async fn get_multisig_owners(&self, multisig: &Address) -> Result<Vec<Address>, ChainError> {
        Ok(self
            .owners
            .lock()
            .unwrap()
            .get(multisig)
            .cloned()
            .unwrap_or_default())
    }

    async fn deploy_multisig(&self, multisig: &Address, owners: [Address; 2]) -> Result<Hash, ChainError> {
        self.owners.lock().unwrap().insert(*multisig, owners.to_vec());
        Ok(self.next_tx())
    }

    async fn deposit(&self, multisig: &Address, asset: &Address, amount: U256) -> Result<Hash, ChainError> {
        *self
            .balances
            .lock()
            .unwrap()
            .entry((*multisig, *asset))
            .or_default() += amount;
        Ok(self.next_tx())
    }

    async fn balance_of(&self, multisig: &Address, asset: &Address) -> Result<U256, ChainError> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&(*multisig, *asset))
            .copied()
            .unwrap_or_default())
    }
}

/// Delivers messages between registered nodes, each on its own task.
#[derive(Debug, Default)]
pub struct Hub {
    nodes: Mutex<HashMap<Address, Node>>,
    muted: Mutex<HashSet<Address>>,
    drop_next_reply_to: Mutex<Option<Address>>,
    duplicate: AtomicBool,
}

impl Hub {
    fn register(&self, node: Node) {
        self.nodes.lock().unwrap().insert(node.address(), node);
    }

    fn node(&self, to: &Address) -> Result<Node, BusError> {
        self.nodes
            .lock()
            .unwrap()
            .get(to)
            .cloned()
            .ok_or(BusError::Unreachable(*to))
    }

    /// Drop everything sent to `who`.
    pub fn mute(&self, who: Address) {
        self.muted.lock().unwrap().insert(who);
    }

    pub fn unmute(&self, who: Address) {
        self.muted.lock().unwrap().remove(&who);
    }

    /// Drop the next second turn sent to `who`.
    pub fn drop_next_reply_to(&self, who: Address) {
        *self.drop_next_reply_to.lock().unwrap() = Some(who);
    }

    /// Deliver every message twice.
    pub fn duplicate_all(&self) {
        self.duplicate.store(true, Ordering::SeqCst);
    }

    fn should_drop(&self, msg: &PeerMessage) -> bool {
        if self.muted.lock().unwrap().contains(&msg.to()) {
            return true;
        }
        let mut drop_reply = self.drop_next_reply_to.lock().unwrap();
        match (msg, *drop_reply) {
            (PeerMessage::Protocol(m), Some(who)) if m.seq == 2 && m.to == who => {
                *drop_reply = None;
                true
            }
            _ => false,
        }
    }

    fn copies(&self) -> usize {
        if self.duplicate.load(Ordering::SeqCst) {
            2
        } else {
            1
        }
    }
}

#[derive(Debug, Clone)]
pub struct HubBus(Arc<Hub>);

impl MessageBus for HubBus {
    fn send(&self, msg: PeerMessage) -> Result<(), BusError> {
        if self.0.should_drop(&msg) {
            return Ok(());
        }
        let node = self.0.node(&msg.to())?;
        for _ in 0..self.0.copies() {
            let (node, msg) = (node.clone(), msg.clone());
            tokio::spawn(async move { node.on_message(msg).await });
        }
        Ok(())
    }
}

/// Same hub, but every message crosses it as a protobuf frame.
#[derive(Debug, Clone)]
pub struct FrameBus(Arc<Hub>);

impl BytesBus for FrameBus {
    fn send(&self, to: &Address, msg: &[u8]) -> Result<(), BusError> {
        let node = self.0.node(to)?;
        let frame = msg.to_vec();
        tokio::spawn(async move {
            let _ = node.on_frame(&frame).await;
        });
        Ok(())
    }
}

pub struct Pair {
    pub hub: Arc<Hub>,
    pub chain: Arc<MockChain>,
    pub alice: Node,
    pub bob: Node,
    pub bob_store: Arc<MemoryStore>,
}

fn signer(seed: u64) -> Signer {
    Signer::new(&mut StdRng::seed_from_u64(seed))
}

fn registry() -> AppRegistry {
    AppRegistry::new().with(COUNTER_APP, Arc::new(CounterApp))
}

impl Pair {
    pub fn new() -> Self {
        Self::build(config(), false, |b| b)
    }

    /// Messages go through the protobuf encoding layer.
    pub fn framed() -> Self {
        Self::build(config(), true, |b| b)
    }

    pub fn with_config(config: NodeConfig) -> Self {
        Self::build(config, false, |b| b)
    }

    /// `customize_bob` adjusts the second node only.
    pub fn with_bob(config: NodeConfig, customize_bob: impl FnOnce(NodeBuilder) -> NodeBuilder) -> Self {
        Self::build(config, false, customize_bob)
    }

    fn build(
        config: NodeConfig,
        framed: bool,
        customize_bob: impl FnOnce(NodeBuilder) -> NodeBuilder,
    ) -> Self {
        init_tracing();
        let hub = Arc::new(Hub::default());
        let chain = Arc::new(MockChain::default());
        let bus: Arc<dyn MessageBus> = if framed {
            Arc::new(ProtoBufEncodingLayer::new(FrameBus(hub.clone())))
        } else {
            Arc::new(HubBus(hub.clone()))
        };

        let bob_store = Arc::new(MemoryStore::new());
        let builder = |seed, store: Arc<MemoryStore>| {
            Node::builder(config.clone(), signer(seed), store, bus.clone(), chain.clone())
                .registry(registry())
        };
        let alice = builder(1, Arc::new(MemoryStore::new())).build();
        let bob = customize_bob(builder(2, bob_store.clone())).build();
        hub.register(alice.clone());
        hub.register(bob.clone());
        Pair {
            hub,
            chain,
            alice,
            bob,
            bob_store,
        }
    }

    pub async fn open(&self) -> Address {
        self.alice.create_channel(self.bob.address()).await.unwrap()
    }

    /// A channel where each party deposited the given ETH amounts.
    pub async fn open_funded(&self, alice: u64, bob: u64) -> Address {
        let multisig = self.open().await;
        if alice > 0 {
            self.alice.deposit(multisig, ETH, alice.into()).await.unwrap();
        }
        if bob > 0 {
            self.bob.deposit(multisig, ETH, bob.into()).await.unwrap();
        }
        multisig
    }

    /// ETH free balances of (alice, bob), as seen by `node`.
    pub async fn balances(&self, node: &Node, multisig: Address) -> (U256, U256) {
        let fb = node.get_free_balance_state(multisig, ETH).await.unwrap();
        (fb[&self.alice.address()], fb[&self.bob.address()])
    }

    /// Both nodes hold the same channel.
    pub async fn assert_in_sync(&self, multisig: Address) {
        let ours = self.alice.get_state_channel(multisig).await.unwrap();
        let theirs = self.bob.get_state_channel(multisig).await.unwrap();
        assert_eq!(ours, theirs);
    }
}

pub async fn next_event(events: &mut broadcast::Receiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("no event within 2s")
        .expect("event channel closed")
}

/// Let spawned deliveries run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
