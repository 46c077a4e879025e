//! Routing of incoming peer messages.
//!
//! First turns start a responder run under the same locks an initiator
//! would take; second turns and rejections complete the run that is waiting
//! for them.

use std::sync::PoisonError;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::{app_keys, Node, NodeInner, Waiting};
use crate::{
    abiencode::types::{Address, Hash},
    channel::ChannelError,
    error::NodeError,
    lock::LockKey,
    messages::{Event, EventData, PeerMessage, ProtocolMessage, ProtocolParams, UNASSIGNED_SEQ_NO},
    protocol::{self, ProtocolError, ProtocolIo},
    wire,
};

/// Locks a run on `params` needs.
fn run_keys(params: &ProtocolParams) -> Vec<LockKey> {
    let multisig = params.channel().multisig_address;
    match params {
        ProtocolParams::Install(p) | ProtocolParams::Uninstall(p) => {
            app_keys(multisig, p.app_identity_hash).to_vec()
        }
        ProtocolParams::TakeAction(p) => app_keys(multisig, p.app_identity_hash).to_vec(),
        ProtocolParams::Setup(_) | ProtocolParams::Propose(_) | ProtocolParams::Sync(_) => {
            vec![LockKey::Channel(multisig)]
        }
    }
}

/// [ProtocolIo] over the node's message bus.
pub(super) struct NodeIo<'a> {
    node: &'a NodeInner,
}

impl<'a> NodeIo<'a> {
    pub(super) fn new(node: &'a NodeInner) -> Self {
        NodeIo { node }
    }

    fn forget(&self, process_id: &Hash) {
        self.node
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(process_id);
    }
}

#[async_trait]
impl ProtocolIo for NodeIo<'_> {
    async fn request(&self, msg: ProtocolMessage) -> Result<ProtocolMessage, ProtocolError> {
        let process_id = msg.process_id;
        let protocol = msg.protocol();
        let (tx, rx) = oneshot::channel();
        self.node
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                process_id,
                Waiting {
                    counterparty: msg.to,
                    reply: tx,
                },
            );

        if let Err(e) = self.node.bus.send(PeerMessage::Protocol(msg)) {
            self.forget(&process_id);
            return Err(e.into());
        }

        let reply = tokio::time::timeout(self.node.config.protocol_timeout(), rx).await;
        self.forget(&process_id);
        match reply {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) | Err(_) => Err(ProtocolError::Timeout { protocol, seq: 2 }),
        }
    }

    fn reply(&self, msg: ProtocolMessage) -> Result<(), ProtocolError> {
        Ok(self.node.bus.send(PeerMessage::Protocol(msg))?)
    }
}

impl NodeInner {
    /// Hand `reply` to the run waiting on `process_id`, if `from` is the
    /// peer it waits for.
    fn resolve(&self, process_id: Hash, from: Address, reply: Result<ProtocolMessage, ProtocolError>) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        match pending.get(&process_id) {
            Some(waiting) if waiting.counterparty == from => {
                if let Some(waiting) = pending.remove(&process_id) {
                    if waiting.reply.send(reply).is_err() {
                        debug!(%process_id, "run gave up before its reply arrived");
                    }
                }
            }
            Some(_) => warn!(%process_id, %from, "reply from a peer the run does not wait for"),
            None => debug!(%process_id, "no run waiting, dropping reply"),
        }
    }
}

impl Node {
    /// Decode and route one frame received from the transport.
    pub async fn on_frame(&self, frame: &[u8]) -> Result<(), NodeError> {
        let msg = wire::decode(frame).map_err(|error| {
            warn!(%error, "dropping undecodable frame");
            error
        })?;
        self.on_message(msg).await;
        Ok(())
    }

    /// Route one message received from a peer. Failures are logged and, for
    /// first turns, reported back to the initiator.
    pub async fn on_message(&self, msg: PeerMessage) {
        let inner = &*self.inner;
        if msg.to() != inner.me() {
            warn!(to = %msg.to(), "dropping message addressed to another node");
            return;
        }
        match msg {
            PeerMessage::Protocol(m) if m.seq == UNASSIGNED_SEQ_NO => {
                debug!(protocol = %m.protocol(), process_id = %m.process_id, "dropping message without sequence number");
            }
            PeerMessage::Protocol(m) if m.seq == 1 => self.handle_request(m).await,
            PeerMessage::Protocol(m) if m.seq == 2 => inner.resolve(m.process_id, m.from, Ok(m)),
            PeerMessage::Protocol(m) => {
                warn!(protocol = %m.protocol(), seq = m.seq, "dropping message with unknown sequence number");
            }
            PeerMessage::ProtocolRejected {
                process_id,
                protocol,
                from,
                reason,
                stale,
                ..
            } => {
                debug!(%protocol, %process_id, %reason, stale, "counterparty rejected run");
                let error = if stale {
                    ProtocolError::StaleState
                } else {
                    ProtocolError::CounterpartyRejected(reason)
                };
                inner.resolve(process_id, from, Err(error));
            }
            PeerMessage::ProposalRejected {
                from,
                multisig_address,
                app_identity_hash,
                ..
            } => {
                if let Err(error) = self
                    .handle_proposal_rejected(from, multisig_address, app_identity_hash)
                    .await
                {
                    warn!(%error, app = %app_identity_hash, "could not apply proposal rejection");
                }
            }
        }
    }

    async fn handle_request(&self, msg: ProtocolMessage) {
        let inner = &*self.inner;
        let (process_id, protocol, initiator) = (msg.process_id, msg.protocol(), msg.from);
        let keys = run_keys(&msg.params);

        let result: Result<(), NodeError> = async {
            let _locks = inner.locks.acquire(keys).await?;
            let io = NodeIo::new(inner);
            if let Some(completed) = protocol::respond(&inner.context(&io), msg).await? {
                inner.publish(completed.event);
            }
            Ok(())
        }
        .await;

        if let Err(error) = result {
            let stale = matches!(error, NodeError::Protocol(ProtocolError::StaleState));
            let rejection = PeerMessage::ProtocolRejected {
                process_id,
                protocol,
                from: inner.me(),
                to: initiator,
                reason: error.to_string(),
                stale,
            };
            if let Err(error) = inner.bus.send(rejection) {
                warn!(%protocol, %process_id, %error, "could not report rejection");
            }
        }
    }

    async fn handle_proposal_rejected(
        &self,
        from: Address,
        multisig: Address,
        app_identity_hash: Hash,
    ) -> Result<(), NodeError> {
        let inner = &*self.inner;
        let _locks = inner.locks.acquire(app_keys(multisig, app_identity_hash)).await?;

        let channel = inner.channel(&multisig).await?;
        if !channel.is_participant(&from) {
            return Err(ChannelError::NotAParticipant(from).into());
        }
        if !channel.proposed_app_instances.contains_key(&app_identity_hash) {
            debug!(app = %app_identity_hash, "rejected proposal is already gone");
            return Ok(());
        }
        let rejected = channel.remove_proposal(&app_identity_hash)?;
        inner.store.save(&rejected, &[]).await?;
        inner.publish(Event {
            from,
            data: EventData::RejectInstall {
                multisig_address: multisig,
                app_identity_hash,
            },
        });
        Ok(())
    }
}
