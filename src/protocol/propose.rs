use std::cmp::Ordering;

use super::{
    channel_params, check_channel, check_replay, check_signature, exchange, first_turn,
    received_signatures, Completed, Context, ProtocolError, ProtocolRun, RunState,
};
use crate::{
    abiencode::{
        types::{Address, Hash, Signature},
        Value,
    },
    app::deposit::DepositState,
    channel::{AppInstance, AppProposal, ChannelError, ProposeParams, StateChannel},
    commitment::{order_signatures, Commitment, SetStateCommitment},
    messages::{
        Event, EventData, ProposeProtocolParams, ProtocolMessage, ProtocolParams,
    },
    store::{CommitmentKey, SignedCommitment},
};

/// Set-state commitment of the proposed app's initial state.
fn initial_state_commitment(proposal: &AppProposal) -> Result<SetStateCommitment, ProtocolError> {
    Ok(SetStateCommitment::new(&AppInstance::from_proposal(
        proposal.clone(),
    ))?)
}

/// A channel holds at most one deposit app per asset, pending or installed.
fn check_deposit_asset(
    ctx: &Context<'_>,
    channel: &StateChannel,
    app_definition: Address,
    initial_state: &Value,
) -> Result<(), ProtocolError> {
    let deposit_app = ctx.network.deposit_app;
    if deposit_app.is_zero() || app_definition != deposit_app {
        return Ok(());
    }
    let asset = DepositState::from_value(initial_state)?.asset_id;
    let taken = channel
        .app_instances
        .values()
        .map(|app| (app.app_definition(), &app.latest_state))
        .chain(
            channel
                .proposed_app_instances
                .values()
                .map(|p| (p.app_definition, &p.initial_state)),
        )
        .any(|(definition, state)| {
            definition == deposit_app
                && DepositState::from_value(state).map_or(false, |s| s.asset_id == asset)
        });
    if taken {
        return Err(ProtocolError::DepositInProgress(asset));
    }
    Ok(())
}

pub(super) async fn initiate(
    ctx: &Context<'_>,
    run: &mut ProtocolRun,
    multisig: Address,
    params: ProposeParams,
) -> Result<Completed, ProtocolError> {
    let me = ctx.me();
    if params.initiator_identifier != me {
        return Err(ChannelError::InvalidProposal("the proposer must be the initiator").into());
    }
    let channel = ctx.channel(&multisig).await?;
    check_deposit_asset(ctx, &channel, params.app_definition, &params.initial_state)?;
    let (proposed, proposal) = channel.propose_app(params)?;

    let commitment = initial_state_commitment(&proposal)?;
    let hash = commitment.hash_to_sign()?;
    let mine = ctx.sign(hash)?;

    let msg = first_turn(
        ctx,
        run,
        ProtocolParams::Propose(ProposeProtocolParams {
            channel: channel_params(ctx, &channel)?,
            proposal: proposal.clone(),
        }),
        vec![mine],
    );
    let reply = exchange(ctx, run, msg, 1).await?;
    let counterparty = reply.from;
    check_signature(hash, reply.signatures[0], counterparty, "initial state")?;

    run.advance(RunState::Committing);
    let channel = commit(
        ctx,
        proposed,
        proposal.identity_hash,
        &commitment,
        mine,
        reply.signatures[0],
    )
    .await?;

    Ok(Completed {
        event: propose_event(me, &channel, &proposal.identity_hash)?,
        channel,
    })
}

pub(super) async fn respond(
    ctx: &Context<'_>,
    run: &mut ProtocolRun,
    msg: &ProtocolMessage,
    params: &ProposeProtocolParams,
) -> Result<Option<Completed>, ProtocolError> {
    let initiator = params.channel.initiator_identifier;
    let channel = ctx.channel(&params.channel.multisig_address).await?;
    check_channel(&channel, &params.channel)?;

    let received = &params.proposal;
    match received.app_seq_no.cmp(&channel.num_proposed_apps) {
        Ordering::Less => {
            let key = CommitmentKey::SetState(received.identity_hash);
            return check_replay(ctx, msg, key, 0).await;
        }
        Ordering::Greater => return Err(ProtocolError::StaleState),
        Ordering::Equal => {}
    }
    if received.initiator_identifier != initiator {
        return Err(ChannelError::InvalidProposal("the proposer must be the initiator").into());
    }
    check_deposit_asset(ctx, &channel, received.app_definition, &received.initial_state)?;

    // Rebuild the proposal from our own channel, it has to come out
    // identical.
    let (proposed, proposal) = channel.propose_app(received.params())?;
    if proposal.identity_hash != received.identity_hash {
        return Err(ProtocolError::CommitmentMismatch("app identity"));
    }

    let commitment = initial_state_commitment(&proposal)?;
    let hash = commitment.hash_to_sign()?;
    let theirs = received_signatures(msg, 1)?[0];
    check_signature(hash, theirs, initiator, "initial state")?;
    let mine = ctx.sign(hash)?;

    run.advance(RunState::Committing);
    let channel = commit(ctx, proposed, proposal.identity_hash, &commitment, mine, theirs).await?;
    ctx.io.reply(msg.reply(vec![mine]))?;

    Ok(Some(Completed {
        event: propose_event(initiator, &channel, &proposal.identity_hash)?,
        channel,
    }))
}

async fn commit(
    ctx: &Context<'_>,
    channel: StateChannel,
    identity_hash: Hash,
    commitment: &SetStateCommitment,
    mine: Signature,
    theirs: Signature,
) -> Result<StateChannel, ProtocolError> {
    let sigs = order_signatures(channel.owners(), ctx.me(), mine, theirs);
    let channel = channel.with_proposal_signatures(&identity_hash, sigs.clone())?;
    ctx.store
        .save(
            &channel,
            &[(
                CommitmentKey::SetState(identity_hash),
                SignedCommitment::new(commitment, sigs)?,
            )],
        )
        .await?;
    Ok(channel)
}

fn propose_event(from: Address, channel: &StateChannel, identity_hash: &Hash) -> Result<Event, ProtocolError> {
    Ok(Event {
        from,
        data: EventData::ProposeInstall {
            multisig_address: channel.multisig_address,
            proposal: Box::new((**channel.get_proposal(identity_hash)?).clone()),
        },
    })
}
