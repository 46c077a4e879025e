use super::{
    channel_params, check_channel, exchange, first_turn, Completed, Context, ProtocolError,
    ProtocolRun, RunState,
};
use crate::{
    abiencode::{keccak256, types::Address},
    channel::{derive_multisig_address, AppInstance, StateChannel},
    commitment::{
        verify_signatures, Commitment, ConditionalTransactionCommitment, SetStateCommitment,
        SetupCommitment,
    },
    config::NetworkContext,
    messages::{ChannelParams, Event, EventData, ProtocolMessage, ProtocolParams},
    store::{CommitmentKey, SignedCommitment},
};

/// Check that every state in `channel` carries valid signatures of both
/// owners, and that the multisig belongs to them.
pub fn verify_channel(network: &NetworkContext, channel: &StateChannel) -> Result<(), ProtocolError> {
    let [a, b] = channel.user_identifiers;
    if derive_multisig_address(network, a, b)? != channel.multisig_address {
        return Err(ProtocolError::MultisigMismatch);
    }
    channel.free_balance()?;

    let owners = channel.owners();
    let check = |app: &AppInstance| -> Result<(), ProtocolError> {
        let hash = SetStateCommitment::new(app)?.hash_to_sign()?;
        verify_signatures(hash, owners, &app.signatures)?;
        Ok(())
    };
    check(&*channel.free_balance)?;
    for app in channel.app_instances.values() {
        check(&**app)?;
    }
    for proposal in channel.proposed_app_instances.values() {
        check(&AppInstance::from_proposal((**proposal).clone()))?;
    }
    Ok(())
}

/// The signed set-state commitments held in `channel`.
fn commitments(channel: &StateChannel) -> Result<Vec<(CommitmentKey, SignedCommitment)>, ProtocolError> {
    let proposals: Vec<AppInstance> = channel
        .proposed_app_instances
        .values()
        .map(|p| AppInstance::from_proposal((**p).clone()))
        .collect();
    std::iter::once(&*channel.free_balance)
        .chain(channel.app_instances.values().map(|a| &**a))
        .chain(proposals.iter())
        .map(|app| -> Result<_, ProtocolError> {
            Ok((
                CommitmentKey::SetState(app.identity_hash()),
                SignedCommitment::new(&SetStateCommitment::new(app)?, app.signatures.clone())?,
            ))
        })
        .collect()
}

/// Keys of the commitments that only exist as separately signed records:
/// the setup commitment and one conditional transaction per installed app.
fn standalone_keys(channel: &StateChannel) -> impl Iterator<Item = CommitmentKey> + '_ {
    std::iter::once(CommitmentKey::Setup(channel.multisig_address)).chain(
        channel
            .app_instances
            .keys()
            .map(|hash| CommitmentKey::ConditionalTransaction(*hash)),
    )
}

/// Our stored standalone commitments of `channel`, sent along with it.
async fn stored_commitments(
    ctx: &Context<'_>,
    channel: &StateChannel,
) -> Result<Vec<(CommitmentKey, SignedCommitment)>, ProtocolError> {
    let mut found = Vec::new();
    for key in standalone_keys(channel) {
        if let Some(commitment) = ctx.store.get_commitment(&key).await? {
            found.push((key, commitment));
        }
    }
    Ok(found)
}

/// Check the standalone commitments received with `channel` against the
/// ones rebuilt from it. Each one must be present, either received or
/// already in our store.
async fn check_commitments(
    ctx: &Context<'_>,
    channel: &StateChannel,
    received: &[(CommitmentKey, SignedCommitment)],
) -> Result<(), ProtocolError> {
    let owners = channel.owners();
    for (key, commitment) in received {
        let expected = match key {
            CommitmentKey::Setup(multisig) if *multisig == channel.multisig_address => {
                SetupCommitment::new(channel).encode()?
            }
            CommitmentKey::ConditionalTransaction(hash) => {
                ConditionalTransactionCommitment::new(ctx.network, channel, channel.get_app(hash)?)?
                    .encode()?
            }
            _ => {
                return Err(ProtocolError::UnexpectedMessage(
                    "synced commitment does not belong to the channel",
                ))
            }
        };
        if commitment.encoded != expected {
            return Err(ProtocolError::CommitmentMismatch("synced"));
        }
        verify_signatures(keccak256(&commitment.encoded), owners, &commitment.signatures)?;
    }

    for key in standalone_keys(channel) {
        if !received.iter().any(|(k, _)| *k == key) && ctx.store.get_commitment(&key).await?.is_none() {
            return Err(ProtocolError::UnexpectedMessage(
                "synced channel lacks a signed commitment",
            ));
        }
    }
    Ok(())
}

/// Adopt `channel` with its set-state commitments and the checked
/// standalone commitments received with it.
async fn persist(
    ctx: &Context<'_>,
    channel: &StateChannel,
    received: &[(CommitmentKey, SignedCommitment)],
) -> Result<(), ProtocolError> {
    check_commitments(ctx, channel, received).await?;
    let mut all = commitments(channel)?;
    all.extend(received.iter().cloned());
    ctx.store.save(channel, &all).await?;
    Ok(())
}

/// `theirs` must describe the same channel between the same parties.
fn check_same_channel(theirs: &StateChannel, params: &ChannelParams) -> Result<(), ProtocolError> {
    if theirs.multisig_address != params.multisig_address {
        return Err(ProtocolError::UnexpectedMessage("synced channel has another multisig"));
    }
    check_channel(theirs, params)
}

fn sync_event(from: Address, channel: &StateChannel) -> Event {
    Event {
        from,
        data: EventData::Sync {
            multisig_address: channel.multisig_address,
            channel: Box::new(channel.clone()),
        },
    }
}

pub(super) async fn initiate(
    ctx: &Context<'_>,
    run: &mut ProtocolRun,
    multisig: Address,
) -> Result<Completed, ProtocolError> {
    let ours = ctx.channel(&multisig).await?;
    let params = channel_params(ctx, &ours)?;

    let mut msg = first_turn(ctx, run, ProtocolParams::Sync(params), vec![]);
    msg.channel = Some(Box::new(ours.clone()));
    msg.commitments = stored_commitments(ctx, &ours).await?;
    let reply = exchange(ctx, run, msg, 0).await?;
    let theirs = reply
        .channel
        .ok_or(ProtocolError::UnexpectedMessage("sync reply without a channel"))?;
    check_same_channel(&theirs, &params)?;
    verify_channel(ctx.network, &theirs)?;

    run.advance(RunState::Committing);
    let channel = if theirs.freshness() > ours.freshness() {
        persist(ctx, &theirs, &reply.commitments).await?;
        *theirs
    } else {
        ours
    };
    Ok(Completed {
        event: sync_event(ctx.me(), &channel),
        channel,
    })
}

pub(super) async fn respond(
    ctx: &Context<'_>,
    run: &mut ProtocolRun,
    msg: &ProtocolMessage,
    params: &ChannelParams,
) -> Result<Completed, ProtocolError> {
    let theirs = msg
        .channel
        .as_deref()
        .ok_or(ProtocolError::UnexpectedMessage("sync request without a channel"))?;
    check_same_channel(theirs, params)?;
    verify_channel(ctx.network, theirs)?;

    run.advance(RunState::Committing);
    let local = ctx.store.get_channel(&params.multisig_address).await?;
    let channel = match local {
        Some(ours) if ours.freshness() >= theirs.freshness() => ours,
        _ => {
            persist(ctx, theirs, &msg.commitments).await?;
            theirs.clone()
        }
    };

    let mut reply = msg.reply(vec![]);
    reply.commitments = stored_commitments(ctx, &channel).await?;
    reply.channel = Some(Box::new(channel.clone()));
    ctx.io.reply(reply)?;

    Ok(Completed {
        event: sync_event(params.initiator_identifier, &channel),
        channel,
    })
}
