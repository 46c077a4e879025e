use std::sync::Arc;

use super::{
    channel_params, check_channel, check_replay, check_signature, exchange, first_turn,
    received_signatures, Completed, Context, ProtocolError, ProtocolRun, RunState,
};
use crate::{
    abiencode::types::{Address, Hash, Signature},
    app::deposit::DepositState,
    channel::{interpreter::compute_credits, AppInstance, ChannelError, Credits, StateChannel},
    commitment::{order_signatures, Commitment, SetStateCommitment},
    messages::{AppUpdateParams, Event, EventData, ProtocolMessage, ProtocolParams},
    store::{CommitmentKey, SignedCommitment},
};

/// What uninstalling `app` adds to the free balance.
///
/// Deposit apps credit whatever the multisig received on-chain above the
/// recorded threshold. Every other app goes through its registered logic and
/// the interpreter of its outcome type.
pub async fn uninstall_credits(ctx: &Context<'_>, app: &AppInstance) -> Result<Credits, ProtocolError> {
    let deposit_app = ctx.network.deposit_app;
    if !deposit_app.is_zero() && app.app_definition() == deposit_app {
        let state = DepositState::from_value(&app.latest_state)?;
        let balance = ctx
            .chain
            .balance_of(&app.multisig_address(), &state.asset_id)
            .await?;
        return Ok(state.credits(balance));
    }

    let outcome = ctx
        .registry
        .get(&app.app_definition())?
        .compute_outcome(&app.latest_state)?;
    Ok(compute_credits(app, &outcome)?)
}

fn check_policy(ctx: &Context<'_>, channel: &StateChannel, app: &AppInstance) -> Result<(), ProtocolError> {
    ctx.policy
        .check_uninstall(channel, app)
        .map_err(ProtocolError::PolicyRejected)
}

async fn uninstall(
    ctx: &Context<'_>,
    channel: &StateChannel,
    identity_hash: &Hash,
) -> Result<(StateChannel, SetStateCommitment), ProtocolError> {
    let app: Arc<AppInstance> = channel.get_app(identity_hash)?.clone();
    check_policy(ctx, channel, &app)?;
    let credits = uninstall_credits(ctx, &app).await?;
    let uninstalled = channel.uninstall_app(identity_hash, &credits)?;
    let commitment = SetStateCommitment::new(&uninstalled.free_balance)?;
    Ok((uninstalled, commitment))
}

pub(super) async fn initiate(
    ctx: &Context<'_>,
    run: &mut ProtocolRun,
    identity_hash: Hash,
) -> Result<Completed, ProtocolError> {
    let me = ctx.me();
    let channel = ctx
        .store
        .get_channel_by_app(&identity_hash)
        .await?
        .ok_or(ChannelError::AppNotInstalled(identity_hash))?;
    let (uninstalled, commitment) = uninstall(ctx, &channel, &identity_hash).await?;
    let hash = commitment.hash_to_sign()?;
    let mine = ctx.sign(hash)?;

    let msg = first_turn(
        ctx,
        run,
        ProtocolParams::Uninstall(AppUpdateParams {
            channel: channel_params(ctx, &channel)?,
            app_identity_hash: identity_hash,
            free_balance_version: uninstalled.free_balance_version(),
        }),
        vec![mine],
    );
    let reply = exchange(ctx, run, msg, 1).await?;
    check_signature(hash, reply.signatures[0], reply.from, "free balance")?;

    run.advance(RunState::Committing);
    let channel = commit(ctx, uninstalled, &commitment, mine, reply.signatures[0]).await?;
    Ok(Completed {
        event: uninstall_event(me, &channel, identity_hash),
        channel,
    })
}

pub(super) async fn respond(
    ctx: &Context<'_>,
    run: &mut ProtocolRun,
    msg: &ProtocolMessage,
    params: &AppUpdateParams,
) -> Result<Option<Completed>, ProtocolError> {
    let initiator = params.channel.initiator_identifier;
    let channel = ctx.channel(&params.channel.multisig_address).await?;
    check_channel(&channel, &params.channel)?;

    let current = channel.free_balance_version();
    if current >= params.free_balance_version {
        let key = CommitmentKey::SetState(channel.free_balance.identity_hash());
        return check_replay(ctx, msg, key, 0).await;
    }
    if current + 1 != params.free_balance_version {
        return Err(ProtocolError::StaleState);
    }

    let (uninstalled, commitment) = uninstall(ctx, &channel, &params.app_identity_hash).await?;
    let hash = commitment.hash_to_sign()?;
    let theirs = received_signatures(msg, 1)?[0];
    check_signature(hash, theirs, initiator, "free balance")?;
    let mine = ctx.sign(hash)?;

    run.advance(RunState::Committing);
    let channel = commit(ctx, uninstalled, &commitment, mine, theirs).await?;
    ctx.io.reply(msg.reply(vec![mine]))?;

    Ok(Some(Completed {
        event: uninstall_event(initiator, &channel, params.app_identity_hash),
        channel,
    }))
}

async fn commit(
    ctx: &Context<'_>,
    channel: StateChannel,
    commitment: &SetStateCommitment,
    mine: Signature,
    theirs: Signature,
) -> Result<StateChannel, ProtocolError> {
    let sigs = order_signatures(channel.owners(), ctx.me(), mine, theirs);
    let channel = channel.with_free_balance_signatures(sigs.clone());
    ctx.store
        .save(
            &channel,
            &[(
                CommitmentKey::SetState(channel.free_balance.identity_hash()),
                SignedCommitment::new(commitment, sigs)?,
            )],
        )
        .await?;
    Ok(channel)
}

fn uninstall_event(from: Address, channel: &StateChannel, identity_hash: Hash) -> Event {
    Event {
        from,
        data: EventData::Uninstall {
            multisig_address: channel.multisig_address,
            app_identity_hash: identity_hash,
        },
    }
}
