//! Protocol state machines.
//!
//! Every protocol is a two-turn exchange: the initiator signs the commitments
//! of the transition it proposes and sends them with `seq == 1`, the
//! responder recomputes the same commitments from its own state, checks the
//! signatures, countersigns, persists and answers with `seq == 2`. The
//! initiator persists only after verifying the reply, so an aborted run leaves
//! its channel untouched.

mod install;
mod propose;
mod setup;
mod sync;
mod take_action;
mod uninstall;

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

pub use sync::verify_channel;
pub use uninstall::uninstall_credits;

use crate::{
    abiencode::{
        types::{Address, Hash, Signature},
        Value,
    },
    app::{AppError, AppRegistry},
    chain::{ChainError, ChainService},
    channel::{ChannelError, ProposeParams, StateChannel},
    commitment::{verify_signature, CommitmentError},
    config::NetworkContext,
    messages::{ChannelParams, Event, ProtocolMessage, ProtocolName, ProtocolParams},
    node::UninstallPolicy,
    sig::Signer,
    store::{CommitmentKey, StoreError, StoreService},
    wire::BusError,
};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    App(#[from] AppError),
    #[error(transparent)]
    Commitment(#[from] CommitmentError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("no channel with multisig address {0}")]
    ChannelNotFound(Address),
    #[error("a channel with multisig address {0} already exists")]
    ChannelExists(Address),
    #[error("unexpected message: {0}")]
    UnexpectedMessage(&'static str),
    #[error("counterparty signature does not match the {0} commitment")]
    CommitmentMismatch(&'static str),
    #[error("{protocol} timed out waiting for turn {seq}")]
    Timeout { protocol: ProtocolName, seq: i32 },
    #[error("counterparty rejected the protocol: {0}")]
    CounterpartyRejected(String),
    #[error("uninstall refused: {0}")]
    PolicyRejected(String),
    #[error("channel state diverged from the counterparty, sync required")]
    StaleState,
    #[error("multisig address does not match the channel owners")]
    MultisigMismatch,
    #[error("a deposit of asset {0} into this channel is already in progress")]
    DepositInProgress(Address),
}

/// How a run talks to the counterparty.
#[async_trait]
pub trait ProtocolIo: Send + Sync {
    /// Send the initiator's turn and wait for the counterparty's reply.
    async fn request(&self, msg: ProtocolMessage) -> Result<ProtocolMessage, ProtocolError>;

    /// Send the responder's turn.
    fn reply(&self, msg: ProtocolMessage) -> Result<(), ProtocolError>;
}

/// Everything a protocol run needs from the node.
pub struct Context<'a> {
    pub signer: &'a Signer,
    pub network: &'a NetworkContext,
    pub registry: &'a AppRegistry,
    pub store: &'a StoreService,
    pub chain: &'a dyn ChainService,
    pub policy: &'a dyn UninstallPolicy,
    pub io: &'a dyn ProtocolIo,
}

impl Context<'_> {
    pub fn me(&self) -> Address {
        self.signer.address()
    }

    fn sign(&self, hash: Hash) -> Result<Signature, ProtocolError> {
        Ok(self.signer.sign_eth(hash).map_err(CommitmentError::from)?)
    }

    async fn channel(&self, multisig: &Address) -> Result<StateChannel, ProtocolError> {
        self.store
            .get_channel(multisig)
            .await?
            .ok_or(ProtocolError::ChannelNotFound(*multisig))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    AwaitingCounterparty { seq: i32 },
    Validating,
    Committing,
    Done,
    Aborted,
}

/// Tracks the turns of one run, for logging.
#[derive(Debug)]
pub struct ProtocolRun {
    pub protocol: ProtocolName,
    pub process_id: Hash,
    pub role: Role,
    pub state: RunState,
}

impl ProtocolRun {
    pub fn new(protocol: ProtocolName, process_id: Hash, role: Role) -> Self {
        ProtocolRun {
            protocol,
            process_id,
            role,
            state: RunState::Idle,
        }
    }

    pub fn advance(&mut self, state: RunState) {
        debug!(
            protocol = %self.protocol,
            process_id = %self.process_id,
            role = ?self.role,
            from = ?self.state,
            to = ?state,
            "protocol turn"
        );
        self.state = state;
    }

    fn seq(&self) -> i32 {
        match (self.role, self.state) {
            (_, RunState::AwaitingCounterparty { seq }) => seq,
            (Role::Initiator, _) => 1,
            (Role::Responder, _) => 2,
        }
    }

    fn abort(&mut self, error: &ProtocolError) {
        warn!(
            protocol = %self.protocol,
            seq = self.seq(),
            process_id = %self.process_id,
            role = ?self.role,
            %error,
            "protocol aborted"
        );
        self.state = RunState::Aborted;
    }
}

/// Result of a completed run: the persisted channel and the event to
/// publish.
#[derive(Debug, Clone)]
pub struct Completed {
    pub channel: StateChannel,
    pub event: Event,
}

/// Locally requested protocol runs.
#[derive(Debug, Clone)]
pub enum Initiate {
    Setup { counterparty: Address },
    Propose { multisig_address: Address, params: ProposeParams },
    Install { app_identity_hash: Hash },
    Uninstall { app_identity_hash: Hash },
    TakeAction { app_identity_hash: Hash, action: Value },
    Sync { multisig_address: Address },
}

impl Initiate {
    pub fn protocol(&self) -> ProtocolName {
        match self {
            Initiate::Setup { .. } => ProtocolName::Setup,
            Initiate::Propose { .. } => ProtocolName::Propose,
            Initiate::Install { .. } => ProtocolName::Install,
            Initiate::Uninstall { .. } => ProtocolName::Uninstall,
            Initiate::TakeAction { .. } => ProtocolName::TakeAction,
            Initiate::Sync { .. } => ProtocolName::Sync,
        }
    }
}

/// Run `request` as the initiator. Locks must already be held.
pub async fn initiate(ctx: &Context<'_>, request: Initiate) -> Result<Completed, ProtocolError> {
    let process_id: Hash = rand::thread_rng().gen();
    let mut run = ProtocolRun::new(request.protocol(), process_id, Role::Initiator);

    let result = match request {
        Initiate::Setup { counterparty } => setup::initiate(ctx, &mut run, counterparty).await,
        Initiate::Propose {
            multisig_address,
            params,
        } => propose::initiate(ctx, &mut run, multisig_address, params).await,
        Initiate::Install { app_identity_hash } => {
            install::initiate(ctx, &mut run, app_identity_hash).await
        }
        Initiate::Uninstall { app_identity_hash } => {
            uninstall::initiate(ctx, &mut run, app_identity_hash).await
        }
        Initiate::TakeAction {
            app_identity_hash,
            action,
        } => take_action::initiate(ctx, &mut run, app_identity_hash, action).await,
        Initiate::Sync { multisig_address } => sync::initiate(ctx, &mut run, multisig_address).await,
    };
    finish(&mut run, result)
}

/// Handle the initiator's turn. `Ok(None)` means the message was a duplicate
/// of an already processed turn and has been ignored.
pub async fn respond(ctx: &Context<'_>, msg: ProtocolMessage) -> Result<Option<Completed>, ProtocolError> {
    let mut run = ProtocolRun::new(msg.protocol(), msg.process_id, Role::Responder);
    if msg.seq != 1 {
        let err = ProtocolError::UnexpectedMessage("responders only handle the first turn");
        run.abort(&err);
        return Err(err);
    }
    if let Err(err) = check_addressing(ctx, &msg) {
        run.abort(&err);
        return Err(err);
    }
    run.advance(RunState::Validating);

    let result = match &msg.params {
        ProtocolParams::Setup(p) => setup::respond(ctx, &mut run, &msg, p).await,
        ProtocolParams::Propose(p) => propose::respond(ctx, &mut run, &msg, p).await,
        ProtocolParams::Install(p) => install::respond(ctx, &mut run, &msg, p).await,
        ProtocolParams::Uninstall(p) => uninstall::respond(ctx, &mut run, &msg, p).await,
        ProtocolParams::TakeAction(p) => take_action::respond(ctx, &mut run, &msg, p).await,
        ProtocolParams::Sync(p) => sync::respond(ctx, &mut run, &msg, p).await.map(Some),
    };
    match result {
        Ok(None) => {
            debug!(
                protocol = %run.protocol,
                process_id = %run.process_id,
                "duplicate message ignored"
            );
            Ok(None)
        }
        Ok(Some(completed)) => {
            run.advance(RunState::Done);
            Ok(Some(completed))
        }
        Err(err) => {
            run.abort(&err);
            Err(err)
        }
    }
}

fn finish(run: &mut ProtocolRun, result: Result<Completed, ProtocolError>) -> Result<Completed, ProtocolError> {
    match result {
        Ok(completed) => {
            run.advance(RunState::Done);
            Ok(completed)
        }
        Err(err) => {
            run.abort(&err);
            Err(err)
        }
    }
}

/// The message must come from the initiator named in its params and be
/// addressed to us as the responder.
fn check_addressing(ctx: &Context<'_>, msg: &ProtocolMessage) -> Result<(), ProtocolError> {
    let params = msg.params.channel();
    if msg.to != ctx.me() || params.responder_identifier != ctx.me() {
        return Err(ProtocolError::UnexpectedMessage("not addressed to this node"));
    }
    if msg.from != params.initiator_identifier {
        return Err(ProtocolError::UnexpectedMessage(
            "sender is not the protocol initiator",
        ));
    }
    Ok(())
}

/// The responder's channel must be the one the params refer to, shared with
/// the initiator.
fn check_channel(channel: &StateChannel, params: &ChannelParams) -> Result<(), ProtocolError> {
    for id in [&params.initiator_identifier, &params.responder_identifier] {
        if !channel.is_participant(id) {
            return Err(ChannelError::NotAParticipant(*id).into());
        }
    }
    Ok(())
}

fn channel_params(ctx: &Context<'_>, channel: &StateChannel) -> Result<ChannelParams, ProtocolError> {
    Ok(ChannelParams {
        initiator_identifier: ctx.me(),
        responder_identifier: channel.counterparty_of(&ctx.me())?,
        multisig_address: channel.multisig_address,
    })
}

/// First turn of a run.
fn first_turn(
    ctx: &Context<'_>,
    run: &ProtocolRun,
    params: ProtocolParams,
    signatures: Vec<Signature>,
) -> ProtocolMessage {
    ProtocolMessage {
        process_id: run.process_id,
        seq: 1,
        from: ctx.me(),
        to: params.channel().responder_identifier,
        params,
        signatures,
        channel: None,
        commitments: Vec::new(),
    }
}

/// Send the first turn and wait for the reply, checking it belongs to this
/// run and carries `expected` signatures.
async fn exchange(
    ctx: &Context<'_>,
    run: &mut ProtocolRun,
    msg: ProtocolMessage,
    expected: usize,
) -> Result<ProtocolMessage, ProtocolError> {
    let counterparty = msg.to;
    run.advance(RunState::AwaitingCounterparty { seq: 2 });
    let reply = ctx.io.request(msg).await?;
    run.advance(RunState::Validating);

    if reply.process_id != run.process_id || reply.seq != 2 || reply.from != counterparty {
        return Err(ProtocolError::UnexpectedMessage("reply does not belong to this run"));
    }
    if reply.signatures.len() != expected {
        return Err(CommitmentError::SignatureCount {
            expected,
            got: reply.signatures.len(),
        }
        .into());
    }
    Ok(reply)
}

/// Check the counterparty's signature over a locally recomputed commitment.
fn check_signature(
    hash: Hash,
    signature: Signature,
    signer: Address,
    what: &'static str,
) -> Result<(), ProtocolError> {
    verify_signature(hash, signature, signer).map_err(|_| ProtocolError::CommitmentMismatch(what))
}

/// Signatures of the initiator's turn, checked for count.
fn received_signatures(msg: &ProtocolMessage, expected: usize) -> Result<&[Signature], ProtocolError> {
    if msg.signatures.len() != expected {
        return Err(CommitmentError::SignatureCount {
            expected,
            got: msg.signatures.len(),
        }
        .into());
    }
    Ok(&msg.signatures)
}

/// A first turn whose counter is not ahead of ours is either a replay of a
/// run we already committed, recognised by the initiator's signature at
/// `index` being part of the persisted commitment under `key`, or a
/// conflicting transition that needs a sync.
async fn check_replay(
    ctx: &Context<'_>,
    msg: &ProtocolMessage,
    key: CommitmentKey,
    index: usize,
) -> Result<Option<Completed>, ProtocolError> {
    let signature = match msg.signatures.get(index) {
        Some(signature) => signature,
        None => return Err(ProtocolError::StaleState),
    };
    match ctx.store.get_commitment(&key).await? {
        Some(committed) if committed.signatures.contains(signature) => {
            debug!(protocol = %msg.protocol(), process_id = %msg.process_id, "ignoring replayed turn");
            Ok(None)
        }
        _ => Err(ProtocolError::StaleState),
    }
}
