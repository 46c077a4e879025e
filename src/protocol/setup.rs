use super::{
    check_signature, exchange, first_turn, received_signatures, Completed, Context, ProtocolError,
    ProtocolRun, RunState,
};
use crate::{
    abiencode::types::{Address, Signature},
    channel::{derive_multisig_address, StateChannel},
    commitment::{order_signatures, Commitment, SetStateCommitment, SetupCommitment},
    messages::{ChannelParams, Event, EventData, ProtocolMessage, ProtocolParams},
    store::{CommitmentKey, SignedCommitment},
};

/// The two commitments of a fresh channel.
struct SetupCommitments {
    setup: SetupCommitment,
    free_balance: SetStateCommitment,
}

impl SetupCommitments {
    fn new(channel: &StateChannel) -> Result<Self, ProtocolError> {
        Ok(Self {
            setup: SetupCommitment::new(channel),
            free_balance: SetStateCommitment::new(&channel.free_balance)?,
        })
    }
}

pub(super) async fn initiate(
    ctx: &Context<'_>,
    run: &mut ProtocolRun,
    counterparty: Address,
) -> Result<Completed, ProtocolError> {
    let me = ctx.me();
    let multisig = derive_multisig_address(ctx.network, me, counterparty)?;
    if ctx.store.get_channel(&multisig).await?.is_some() {
        return Err(ProtocolError::ChannelExists(multisig));
    }

    let channel = StateChannel::setup(ctx.network, multisig, me, counterparty)?;
    let commitments = SetupCommitments::new(&channel)?;
    let setup_hash = commitments.setup.hash_to_sign()?;
    let fb_hash = commitments.free_balance.hash_to_sign()?;
    let my_setup = ctx.sign(setup_hash)?;
    let my_fb = ctx.sign(fb_hash)?;

    let params = ProtocolParams::Setup(ChannelParams {
        initiator_identifier: me,
        responder_identifier: counterparty,
        multisig_address: multisig,
    });
    let msg = first_turn(ctx, run, params, vec![my_setup, my_fb]);
    let reply = exchange(ctx, run, msg, 2).await?;

    check_signature(setup_hash, reply.signatures[0], counterparty, "setup")?;
    check_signature(fb_hash, reply.signatures[1], counterparty, "free balance")?;

    run.advance(RunState::Committing);
    let channel = commit(
        ctx,
        channel,
        &commitments,
        (my_setup, reply.signatures[0]),
        (my_fb, reply.signatures[1]),
    )
    .await?;

    Ok(Completed {
        event: Event {
            from: me,
            data: EventData::CreateChannel {
                multisig_address: multisig,
                owners: channel.owners(),
                counterparty,
            },
        },
        channel,
    })
}

pub(super) async fn respond(
    ctx: &Context<'_>,
    run: &mut ProtocolRun,
    msg: &ProtocolMessage,
    params: &ChannelParams,
) -> Result<Option<Completed>, ProtocolError> {
    let me = ctx.me();
    let initiator = params.initiator_identifier;
    if ctx
        .store
        .get_channel(&params.multisig_address)
        .await?
        .is_some()
    {
        return Ok(None);
    }
    if derive_multisig_address(ctx.network, initiator, me)? != params.multisig_address {
        return Err(ProtocolError::MultisigMismatch);
    }

    let channel = StateChannel::setup(ctx.network, params.multisig_address, initiator, me)?;
    let commitments = SetupCommitments::new(&channel)?;
    let setup_hash = commitments.setup.hash_to_sign()?;
    let fb_hash = commitments.free_balance.hash_to_sign()?;

    let theirs = received_signatures(msg, 2)?;
    check_signature(setup_hash, theirs[0], initiator, "setup")?;
    check_signature(fb_hash, theirs[1], initiator, "free balance")?;

    let my_setup = ctx.sign(setup_hash)?;
    let my_fb = ctx.sign(fb_hash)?;

    run.advance(RunState::Committing);
    let channel = commit(
        ctx,
        channel,
        &commitments,
        (my_setup, theirs[0]),
        (my_fb, theirs[1]),
    )
    .await?;
    ctx.io.reply(msg.reply(vec![my_setup, my_fb]))?;

    Ok(Some(Completed {
        event: Event {
            from: initiator,
            data: EventData::CreateChannel {
                multisig_address: channel.multisig_address,
                owners: channel.owners(),
                counterparty: initiator,
            },
        },
        channel,
    }))
}

/// Persist the channel and both commitments, signatures in owner order.
async fn commit(
    ctx: &Context<'_>,
    channel: StateChannel,
    commitments: &SetupCommitments,
    (my_setup, their_setup): (Signature, Signature),
    (my_fb, their_fb): (Signature, Signature),
) -> Result<StateChannel, ProtocolError> {
    let owners = channel.owners();
    let me = ctx.me();
    let setup_sigs = order_signatures(owners, me, my_setup, their_setup);
    let fb_sigs = order_signatures(owners, me, my_fb, their_fb);

    let channel = channel.with_free_balance_signatures(fb_sigs.clone());
    ctx.store
        .save(
            &channel,
            &[
                (
                    CommitmentKey::Setup(channel.multisig_address),
                    SignedCommitment::new(&commitments.setup, setup_sigs)?,
                ),
                (
                    CommitmentKey::SetState(channel.free_balance.identity_hash()),
                    SignedCommitment::new(&commitments.free_balance, fb_sigs)?,
                ),
            ],
        )
        .await?;
    Ok(channel)
}
