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
    channel::{ChannelError, StateChannel},
    commitment::{order_signatures, Commitment, SetStateCommitment},
    messages::{Event, EventData, ProtocolMessage, ProtocolParams, TakeActionParams},
    store::{CommitmentKey, SignedCommitment},
};

/// Apply `action` with the app's registered logic.
fn apply(
    ctx: &Context<'_>,
    channel: &StateChannel,
    identity_hash: &Hash,
    action: &Value,
) -> Result<(StateChannel, SetStateCommitment), ProtocolError> {
    let app = channel.get_app(identity_hash)?;
    let logic = ctx.registry.get(&app.app_definition())?;
    let new_state = app.apply_action(&**logic, action)?;
    let updated = channel.set_app_state(
        identity_hash,
        new_state,
        Some(action.clone()),
        app.latest_version_number + 1,
    )?;
    let commitment = SetStateCommitment::new(updated.get_app(identity_hash)?)?;
    Ok((updated, commitment))
}

pub(super) async fn initiate(
    ctx: &Context<'_>,
    run: &mut ProtocolRun,
    identity_hash: Hash,
    action: Value,
) -> Result<Completed, ProtocolError> {
    let me = ctx.me();
    let channel = ctx
        .store
        .get_channel_by_app(&identity_hash)
        .await?
        .ok_or(ChannelError::AppNotInstalled(identity_hash))?;
    let (updated, commitment) = apply(ctx, &channel, &identity_hash, &action)?;
    let hash = commitment.hash_to_sign()?;
    let mine = ctx.sign(hash)?;
    let version_number = updated.get_app(&identity_hash)?.latest_version_number;

    let msg = first_turn(
        ctx,
        run,
        ProtocolParams::TakeAction(TakeActionParams {
            channel: channel_params(ctx, &channel)?,
            app_identity_hash: identity_hash,
            action: action.clone(),
            version_number,
        }),
        vec![mine],
    );
    let reply = exchange(ctx, run, msg, 1).await?;
    check_signature(hash, reply.signatures[0], reply.from, "app state")?;

    run.advance(RunState::Committing);
    let channel = commit(ctx, updated, identity_hash, &commitment, mine, reply.signatures[0]).await?;
    Ok(Completed {
        event: update_event(me, &channel, identity_hash, action)?,
        channel,
    })
}

pub(super) async fn respond(
    ctx: &Context<'_>,
    run: &mut ProtocolRun,
    msg: &ProtocolMessage,
    params: &TakeActionParams,
) -> Result<Option<Completed>, ProtocolError> {
    let initiator = params.channel.initiator_identifier;
    let channel = ctx.channel(&params.channel.multisig_address).await?;
    check_channel(&channel, &params.channel)?;
    let app_hash = params.app_identity_hash;

    let current = channel.get_app(&app_hash)?.latest_version_number;
    match (current + 1).cmp(&params.version_number) {
        Ordering::Greater => {
            return check_replay(ctx, msg, CommitmentKey::SetState(app_hash), 0).await;
        }
        Ordering::Less => return Err(ProtocolError::StaleState),
        Ordering::Equal => {}
    }

    let (updated, commitment) = apply(ctx, &channel, &app_hash, &params.action)?;
    let hash = commitment.hash_to_sign()?;
    let theirs = received_signatures(msg, 1)?[0];
    check_signature(hash, theirs, initiator, "app state")?;
    let mine = ctx.sign(hash)?;

    run.advance(RunState::Committing);
    let channel = commit(ctx, updated, app_hash, &commitment, mine, theirs).await?;
    ctx.io.reply(msg.reply(vec![mine]))?;

    Ok(Some(Completed {
        event: update_event(initiator, &channel, app_hash, params.action.clone())?,
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
    let channel = channel.with_app_signatures(&identity_hash, sigs.clone())?;
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

fn update_event(
    from: Address,
    channel: &StateChannel,
    identity_hash: Hash,
    action: Value,
) -> Result<Event, ProtocolError> {
    let app = channel.get_app(&identity_hash)?;
    Ok(Event {
        from,
        data: EventData::UpdateState {
            multisig_address: channel.multisig_address,
            app_identity_hash: identity_hash,
            new_state: app.latest_state.clone(),
            action,
            version_number: app.latest_version_number,
        },
    })
}
