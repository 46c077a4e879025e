mod common;

use common::*;
use statechannel::{
    abiencode::{
        keccak256,
        types::{Address, Hash},
    },
    app::deposit::{DepositState, DEPOSIT_STATE_ENCODING},
    channel::{AbiEncodings, OutcomeType, ProposeParams},
    commitment::{verify_signature, verify_signatures, Commitment},
    messages::{EventData, EventName},
    node::{MethodParams, MethodResult, RpcRequest},
    store::CommitmentKey,
    U256,
};

#[tokio::test]
async fn setup_creates_the_same_channel_on_both_sides() {
    let pair = Pair::new();
    let mut bob_events = pair.bob.subscribe();

    let multisig = pair.open().await;
    pair.assert_in_sync(multisig).await;

    let event = next_event(&mut bob_events).await;
    assert_eq!(event.from, pair.alice.address());
    match event.data {
        EventData::CreateChannel {
            multisig_address,
            counterparty,
            ..
        } => {
            assert_eq!(multisig_address, multisig);
            assert_eq!(counterparty, pair.alice.address());
        }
        other => panic!("unexpected event {:?}", other),
    }

    // Both hold the same fully signed setup commitment.
    let channel = pair.alice.get_state_channel(multisig).await.unwrap();
    let ours = pair
        .alice
        .get_commitment(CommitmentKey::Setup(multisig))
        .await
        .unwrap()
        .unwrap();
    let theirs = pair
        .bob
        .get_commitment(CommitmentKey::Setup(multisig))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ours, theirs);
    verify_signatures(keccak256(&ours.encoded), channel.owners(), &ours.signatures).unwrap();

    assert_eq!(
        pair.balances(&pair.bob, multisig).await,
        (U256::zero(), U256::zero())
    );
}

#[tokio::test]
async fn second_setup_is_refused() {
    let pair = Pair::new();
    pair.open().await;
    let err = pair
        .alice
        .create_channel(pair.bob.address())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CHANNEL_EXISTS");
}

#[tokio::test]
async fn deposits_are_credited_to_the_depositor() {
    let pair = Pair::new();
    let multisig = pair.open_funded(10, 5).await;

    assert_eq!(pair.balances(&pair.alice, multisig).await, (10.into(), 5.into()));
    pair.assert_in_sync(multisig).await;
    assert!(pair.alice.get_app_instances(multisig).await.unwrap().is_empty());
}

#[tokio::test]
async fn fixed_outcome_app_lifecycle() {
    let pair = Pair::new();
    let (alice, bob) = (pair.alice.address(), pair.bob.address());
    let multisig = pair.open_funded(10, 5).await;
    let mut bob_events = pair.bob.subscribe();

    let app = pair
        .alice
        .propose_install(multisig, counter_params(alice, bob, (2, 3)))
        .await
        .unwrap();
    let proposals = pair.bob.get_proposed_app_instances(multisig).await.unwrap();
    assert_eq!(proposals.len(), 1);
    assert_eq!(proposals[0].identity_hash, app);

    // Either party may install.
    let installed = pair.bob.install(app).await.unwrap();
    assert_eq!(installed.identity_hash(), app);
    assert_eq!(pair.balances(&pair.alice, multisig).await, (8.into(), 2.into()));
    pair.assert_in_sync(multisig).await;

    let version = installed.latest_version_number;
    let state = pair.alice.take_action(app, increment(2)).await.unwrap();
    assert_eq!(state, increment(2));
    let state = pair.bob.take_action(app, increment(3)).await.unwrap();
    assert_eq!(state, increment(5));
    let current = pair.alice.get_app_instance(app).await.unwrap();
    assert_eq!(current.latest_version_number, version + 2);
    assert_eq!(current.latest_action, Some(increment(3)));
    pair.assert_in_sync(multisig).await;

    // The whole pot goes to the proposer.
    pair.alice.uninstall(app).await.unwrap();
    assert_eq!(pair.balances(&pair.bob, multisig).await, (13.into(), 2.into()));
    assert!(pair.bob.get_app_instances(multisig).await.unwrap().is_empty());
    pair.assert_in_sync(multisig).await;

    let mut names = Vec::new();
    for _ in 0..5 {
        names.push(next_event(&mut bob_events).await.name());
    }
    assert_eq!(
        names,
        [
            EventName::ProposeInstall,
            EventName::Install,
            EventName::UpdateState,
            EventName::UpdateState,
            EventName::Uninstall,
        ]
    );
}

#[tokio::test]
async fn free_balance_is_conserved() {
    let pair = Pair::new();
    let (alice, bob) = (pair.alice.address(), pair.bob.address());
    let multisig = pair.open_funded(10, 5).await;

    let locked = |deposits: (u64, u64)| U256::from(deposits.0 + deposits.1);
    let total = |(a, b): (U256, U256)| a + b;

    let deposits = (4, 1);
    let app = pair
        .alice
        .propose_install(multisig, counter_params(alice, bob, deposits))
        .await
        .unwrap();
    pair.alice.install(app).await.unwrap();
    assert_eq!(
        total(pair.balances(&pair.alice, multisig).await) + locked(deposits),
        15.into()
    );

    pair.alice.take_action(app, increment(1)).await.unwrap();
    pair.bob.uninstall(app).await.unwrap();
    assert_eq!(total(pair.balances(&pair.bob, multisig).await), 15.into());
}

#[tokio::test]
async fn install_without_funds_fails() {
    let pair = Pair::new();
    let (alice, bob) = (pair.alice.address(), pair.bob.address());
    let multisig = pair.open_funded(1, 0).await;

    let app = pair
        .alice
        .propose_install(multisig, counter_params(alice, bob, (2, 0)))
        .await
        .unwrap();
    let err = pair.alice.install(app).await.unwrap_err();
    assert_eq!(err.code(), "INSUFFICIENT_FREE_BALANCE");
    // Still pending on both sides.
    assert_eq!(pair.bob.get_proposed_app_instances(multisig).await.unwrap().len(), 1);
    pair.assert_in_sync(multisig).await;
}

#[tokio::test]
async fn reject_install_removes_the_proposal_on_both_sides() {
    let pair = Pair::new();
    let (alice, bob) = (pair.alice.address(), pair.bob.address());
    let multisig = pair.open().await;

    let app = pair
        .alice
        .propose_install(multisig, counter_params(alice, bob, (0, 0)))
        .await
        .unwrap();
    let mut alice_events = pair.alice.subscribe();
    let mut bob_events = pair.bob.subscribe();

    pair.bob.reject_install(app).await.unwrap();
    assert_eq!(next_event(&mut bob_events).await.name(), EventName::RejectInstall);
    let event = next_event(&mut alice_events).await;
    assert_eq!(event.name(), EventName::RejectInstall);
    assert_eq!(event.from, bob);
    assert_eq!(event.app_identity_hash(), Some(app));

    for node in [&pair.alice, &pair.bob] {
        let channel = node.get_state_channel(multisig).await.unwrap();
        assert!(channel.proposed_app_instances.is_empty());
        // The counter is not rolled back.
        assert_eq!(channel.num_proposed_apps, 1);
    }

    let err = pair.alice.install(app).await.unwrap_err();
    assert_eq!(err.code(), "PROPOSAL_NOT_FOUND");
}

fn deposit_app_params(initiator: Address, responder: Address) -> ProposeParams {
    let state = DepositState {
        recipient: initiator,
        asset_id: ETH,
        threshold: U256::zero(),
    };
    ProposeParams {
        initiator_identifier: initiator,
        responder_identifier: responder,
        app_definition: DEPOSIT_APP,
        abi_encodings: AbiEncodings {
            state_encoding: DEPOSIT_STATE_ENCODING.to_owned(),
            action_encoding: None,
        },
        initiator_deposit: U256::zero(),
        initiator_deposit_asset_id: ETH,
        responder_deposit: U256::zero(),
        responder_deposit_asset_id: ETH,
        default_timeout: U256::zero(),
        state_timeout: U256::zero(),
        initial_state: state.to_value().unwrap(),
        outcome_type: OutcomeType::SingleAssetTwoPartyCoinTransfer,
    }
}

#[tokio::test]
async fn deposit_apps_cannot_be_uninstalled_directly() {
    let pair = Pair::new();
    let (alice, bob) = (pair.alice.address(), pair.bob.address());
    let multisig = pair.open().await;

    let app = pair
        .alice
        .propose_install(multisig, deposit_app_params(alice, bob))
        .await
        .unwrap();
    pair.alice.install(app).await.unwrap();

    let response = pair
        .bob
        .dispatch(RpcRequest {
            id: 7,
            params: MethodParams::Uninstall {
                app_identity_hash: app,
            },
        })
        .await;
    assert_eq!(response.id, 7);
    assert_eq!(response.result.unwrap_err().code(), "USE_RESCIND_DEPOSIT_RIGHTS");

    // A deposit for the same asset would collide with the installed app.
    let err = pair.alice.deposit(multisig, ETH, 1.into()).await.unwrap_err();
    assert_eq!(err.code(), "DEPOSIT_IN_PROGRESS");
}

#[tokio::test]
async fn one_deposit_app_per_asset() {
    let pair = Pair::new();
    let (alice, bob) = (pair.alice.address(), pair.bob.address());
    let multisig = pair.open().await;

    // A pending proposal already holds the asset.
    let app = pair
        .alice
        .propose_install(multisig, deposit_app_params(alice, bob))
        .await
        .unwrap();
    let err = pair.bob.deposit(multisig, ETH, 1.into()).await.unwrap_err();
    assert_eq!(err.code(), "DEPOSIT_IN_PROGRESS");
    let err = pair
        .bob
        .propose_install(multisig, deposit_app_params(bob, alice))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "DEPOSIT_IN_PROGRESS");
    pair.assert_in_sync(multisig).await;

    // Once it is gone the asset is free again.
    pair.bob.reject_install(app).await.unwrap();
    settle().await;
    pair.bob.deposit(multisig, ETH, 1.into()).await.unwrap();
    assert_eq!(pair.balances(&pair.alice, multisig).await, (U256::zero(), 1.into()));
    pair.assert_in_sync(multisig).await;
}

#[tokio::test]
async fn deploy_is_skipped_once_deployed() {
    let pair = Pair::new();
    let multisig = pair.open().await;

    let tx = pair.alice.deploy_state_deposit_holder(multisig).await.unwrap();
    assert_ne!(tx, Hash::ZERO);
    let again = pair.bob.deploy_state_deposit_holder(multisig).await.unwrap();
    assert_eq!(again, Hash::ZERO);
}

#[tokio::test]
async fn withdrawal_commitment_is_signed_by_the_caller() {
    let pair = Pair::new();
    let multisig = pair.open_funded(3, 0).await;
    let alice = pair.alice.address();

    let (commitment, signature) = pair
        .alice
        .withdrawal_commitment(multisig, alice, ETH, 3.into(), 1.into())
        .await
        .unwrap();
    assert_eq!(commitment.amount, 3.into());
    verify_signature(commitment.hash_to_sign().unwrap(), signature, alice).unwrap();
}

#[tokio::test]
async fn rpc_dispatch() {
    let pair = Pair::new();
    let bob = pair.bob.address();

    let response = pair
        .alice
        .dispatch(RpcRequest {
            id: 1,
            params: MethodParams::CreateChannel { counterparty: bob },
        })
        .await;
    let multisig = match response.result.unwrap() {
        MethodResult::CreateChannel { multisig_address } => multisig_address,
        other => panic!("unexpected result {:?}", other),
    };

    let response = pair
        .bob
        .dispatch(RpcRequest {
            id: 2,
            params: MethodParams::GetFreeBalanceState {
                multisig_address: multisig,
                asset: ETH,
            },
        })
        .await;
    match response.result.unwrap() {
        MethodResult::GetFreeBalanceState(balances) => {
            assert_eq!(balances.len(), 2);
            assert!(balances.values().all(|b| b.is_zero()));
        }
        other => panic!("unexpected result {:?}", other),
    }

    let response = pair
        .alice
        .dispatch(RpcRequest {
            id: 3,
            params: MethodParams::TakeAction {
                app_identity_hash: Hash([9; 32]),
                action: increment(1),
            },
        })
        .await;
    assert_eq!(response.result.unwrap_err().code(), "APP_NOT_INSTALLED");
}
