//! Outcome interpreters: turn an app's [Outcome] into free balance credits.

use std::collections::BTreeMap;

use super::{AppInstance, ChannelError, Credits, InterpreterParams};
use crate::{
    abiencode::types::{Address, U256},
    app::{Outcome, TwoPartyFixedOutcome},
};

fn add(credits: &mut Credits, asset: Address, to: Address, amount: U256) -> Result<(), ChannelError> {
    let entry = credits
        .entry(asset)
        .or_default()
        .entry(to)
        .or_insert_with(U256::zero);
    *entry = entry.checked_add(amount).ok_or(ChannelError::Overflow)?;
    Ok(())
}

fn sum(transfers: &[(Address, U256)]) -> Result<U256, ChannelError> {
    transfers.iter().try_fold(U256::zero(), |acc, (_, amount)| {
        acc.checked_add(*amount).ok_or(ChannelError::Overflow)
    })
}

/// Credits resulting from `outcome`. They always add up to exactly what was
/// deposited into the app, per asset.
pub fn compute_credits(app: &AppInstance, outcome: &Outcome) -> Result<Credits, ChannelError> {
    let mut credits = BTreeMap::new();
    match (&app.interpreter_params, outcome) {
        (
            InterpreterParams::TwoPartyFixed {
                player_addrs,
                amount,
                token,
            },
            Outcome::TwoPartyFixed(fixed),
        ) => match fixed {
            TwoPartyFixedOutcome::SendToAddrOne => add(&mut credits, *token, player_addrs[0], *amount)?,
            TwoPartyFixedOutcome::SendToAddrTwo => add(&mut credits, *token, player_addrs[1], *amount)?,
            TwoPartyFixedOutcome::SplitAndSendToBothAddrs => {
                let half = *amount / 2;
                // An odd remainder goes to the first player.
                add(&mut credits, *token, player_addrs[0], *amount - half)?;
                add(&mut credits, *token, player_addrs[1], half)?;
            }
        },
        (InterpreterParams::SingleAssetTwoParty { limit, token }, Outcome::CoinTransfers(transfers)) => {
            if transfers.len() > 2 || sum(transfers)? != *limit {
                return Err(ChannelError::InvalidOutcome(
                    "transfers must distribute exactly the deposits",
                ));
            }
            for (to, amount) in transfers {
                add(&mut credits, *token, *to, *amount)?;
            }
        }
        (
            InterpreterParams::MultiAssetMultiParty { limits, tokens },
            Outcome::MultiAssetCoinTransfers(per_asset),
        ) => {
            if per_asset.len() != tokens.len() {
                return Err(ChannelError::InvalidOutcome("one transfer list per asset expected"));
            }
            for ((token, limit), transfers) in tokens.iter().zip(limits).zip(per_asset) {
                if sum(transfers)? != *limit {
                    return Err(ChannelError::InvalidOutcome(
                        "transfers must distribute exactly the deposits",
                    ));
                }
                for (to, amount) in transfers {
                    add(&mut credits, *token, *to, *amount)?;
                }
            }
        }
        _ => {
            return Err(ChannelError::InvalidOutcome(
                "outcome does not match the app's outcome type",
            ))
        }
    }

    let owners = app.owners();
    for parties in credits.values() {
        if let Some(stranger) = parties.keys().find(|p| !owners.contains(p)) {
            return Err(ChannelError::NotAParticipant(*stranger));
        }
    }
    Ok(credits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{AbiEncodings, AppProposal, OutcomeType, ProposeParams};
    use crate::abiencode::Value;

    fn app(outcome_type: OutcomeType, asset_b: Address) -> AppInstance {
        let params = ProposeParams {
            initiator_identifier: Address([1; 20]),
            responder_identifier: Address([2; 20]),
            app_definition: Address([3; 20]),
            abi_encodings: AbiEncodings {
                state_encoding: "tuple(uint256 x)".to_owned(),
                action_encoding: None,
            },
            initiator_deposit: 3.into(),
            initiator_deposit_asset_id: Address::ZERO,
            responder_deposit: 2.into(),
            responder_deposit_asset_id: asset_b,
            default_timeout: 100.into(),
            state_timeout: 10.into(),
            initial_state: Value::Tuple(vec![Value::Uint(0.into())]),
            outcome_type,
        };
        AppInstance::from_proposal(AppProposal::new(Address([4; 20]), 1, params).unwrap())
    }

    #[test]
    fn two_party_fixed() {
        let app = app(OutcomeType::TwoPartyFixedOutcome, Address::ZERO);
        let credits = compute_credits(
            &app,
            &Outcome::TwoPartyFixed(TwoPartyFixedOutcome::SendToAddrTwo),
        )
        .unwrap();
        assert_eq!(credits[&Address::ZERO][&Address([2; 20])], 5.into());
        assert_eq!(credits[&Address::ZERO].len(), 1);

        let split = compute_credits(
            &app,
            &Outcome::TwoPartyFixed(TwoPartyFixedOutcome::SplitAndSendToBothAddrs),
        )
        .unwrap();
        assert_eq!(split[&Address::ZERO][&Address([1; 20])], 3.into());
        assert_eq!(split[&Address::ZERO][&Address([2; 20])], 2.into());
    }

    #[test]
    fn coin_transfers_must_match_deposits() {
        let app = app(OutcomeType::SingleAssetTwoPartyCoinTransfer, Address::ZERO);
        let too_much = Outcome::CoinTransfers(vec![(Address([1; 20]), 6.into())]);
        assert!(matches!(
            compute_credits(&app, &too_much),
            Err(ChannelError::InvalidOutcome(_))
        ));

        let stranger = Outcome::CoinTransfers(vec![(Address([9; 20]), 5.into())]);
        assert_eq!(
            compute_credits(&app, &stranger),
            Err(ChannelError::NotAParticipant(Address([9; 20])))
        );

        let wrong_kind = Outcome::TwoPartyFixed(TwoPartyFixedOutcome::SendToAddrOne);
        assert!(compute_credits(&app, &wrong_kind).is_err());
    }

    #[test]
    fn multi_asset() {
        let token = Address([8; 20]);
        let app = app(OutcomeType::MultiAssetMultiPartyCoinTransfer, token);
        // Tokens are ordered by address: ZERO first.
        let outcome = Outcome::MultiAssetCoinTransfers(vec![
            vec![(Address([2; 20]), 3.into())],
            vec![(Address([1; 20]), 2.into())],
        ]);
        let credits = compute_credits(&app, &outcome).unwrap();
        assert_eq!(credits[&Address::ZERO][&Address([2; 20])], 3.into());
        assert_eq!(credits[&token][&Address([1; 20])], 2.into());
    }
}
