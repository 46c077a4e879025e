use super::{
    channel_params, check_channel, check_replay, check_signature, exchange, first_turn,
    received_signatures, Completed, Context, ProtocolError, ProtocolRun, RunState,
};
use crate::{
    abiencode::types::{Address, Hash, Signature},
    channel::{ChannelError, StateChannel},
    commitment::{order_signatures, Commitment, ConditionalTransactionCommitment, SetStateCommitment},
    messages::{AppUpdateParams, Event, EventData, ProtocolMessage, ProtocolParams},
    store::{CommitmentKey, SignedCommitment},
};

struct InstallCommitments {
    conditional: ConditionalTransactionCommitment,
    free_balance: SetStateCommitment,
}

/// Install the pending proposal into `channel`, building the commitments of
/// the result.
fn install(
    ctx: &Context<'_>,
    channel: &StateChannel,
    identity_hash: &Hash,
) -> Result<(StateChannel, InstallCommitments), ProtocolError> {
    let proposal = channel.get_proposal(identity_hash)?;
    let installed = channel.install_app(proposal, &proposal.deposits())?;
    let commitments = InstallCommitments {
        conditional: ConditionalTransactionCommitment::new(
            ctx.network,
            &installed,
            installed.get_app(identity_hash)?,
        )?,
        free_balance: SetStateCommitment::new(&installed.free_balance)?,
    };
    Ok((installed, commitments))
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
        .ok_or(ChannelError::ProposalNotFound(identity_hash))?;
    let (installed, commitments) = install(ctx, &channel, &identity_hash)?;

    let conditional_hash = commitments.conditional.hash_to_sign()?;
    let fb_hash = commitments.free_balance.hash_to_sign()?;
    let mine = [ctx.sign(conditional_hash)?, ctx.sign(fb_hash)?];

    let msg = first_turn(
        ctx,
        run,
        ProtocolParams::Install(AppUpdateParams {
            channel: channel_params(ctx, &channel)?,
            app_identity_hash: identity_hash,
            free_balance_version: installed.free_balance_version(),
        }),
        mine.to_vec(),
    );
    let reply = exchange(ctx, run, msg, 2).await?;
    let counterparty = reply.from;
    check_signature(conditional_hash, reply.signatures[0], counterparty, "conditional transaction")?;
    check_signature(fb_hash, reply.signatures[1], counterparty, "free balance")?;

    run.advance(RunState::Committing);
    let theirs = [reply.signatures[0], reply.signatures[1]];
    let channel = commit(ctx, installed, identity_hash, &commitments, mine, theirs).await?;

    Ok(Completed {
        event: install_event(me, &channel, identity_hash),
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
        let key = CommitmentKey::ConditionalTransaction(params.app_identity_hash);
        return check_replay(ctx, msg, key, 0).await;
    }
    if current + 1 != params.free_balance_version {
        return Err(ProtocolError::StaleState);
    }

    let (installed, commitments) = install(ctx, &channel, &params.app_identity_hash)?;
    let conditional_hash = commitments.conditional.hash_to_sign()?;
    let fb_hash = commitments.free_balance.hash_to_sign()?;

    let received = received_signatures(msg, 2)?;
    let theirs = [received[0], received[1]];
    check_signature(conditional_hash, theirs[0], initiator, "conditional transaction")?;
    check_signature(fb_hash, theirs[1], initiator, "free balance")?;
    let mine = [ctx.sign(conditional_hash)?, ctx.sign(fb_hash)?];

    run.advance(RunState::Committing);
    let channel = commit(
        ctx,
        installed,
        params.app_identity_hash,
        &commitments,
        mine,
        theirs,
    )
    .await?;
    ctx.io.reply(msg.reply(mine.to_vec()))?;

    Ok(Some(Completed {
        event: install_event(initiator, &channel, params.app_identity_hash),
        channel,
    }))
}

async fn commit(
    ctx: &Context<'_>,
    channel: StateChannel,
    identity_hash: Hash,
    commitments: &InstallCommitments,
    [my_conditional, my_fb]: [Signature; 2],
    [their_conditional, their_fb]: [Signature; 2],
) -> Result<StateChannel, ProtocolError> {
    let owners = channel.owners();
    let me = ctx.me();
    let conditional_sigs = order_signatures(owners, me, my_conditional, their_conditional);
    let fb_sigs = order_signatures(owners, me, my_fb, their_fb);

    let channel = channel.with_free_balance_signatures(fb_sigs.clone());
    ctx.store
        .save(
            &channel,
            &[
                (
                    CommitmentKey::ConditionalTransaction(identity_hash),
                    SignedCommitment::new(&commitments.conditional, conditional_sigs)?,
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

fn install_event(from: Address, channel: &StateChannel, identity_hash: Hash) -> Event {
    Event {
        from,
        data: EventData::Install {
            multisig_address: channel.multisig_address,
            app_identity_hash: identity_hash,
        },
    }
}
