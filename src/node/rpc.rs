//! Request/response surface of the node.

use std::{collections::BTreeMap, str::FromStr};

use tracing::{debug, warn};

use super::Node;
use crate::{
    abiencode::{
        types::{Address, Hash, U256},
        Value,
    },
    channel::{AppInstance, AppProposal, ProposeParams, StateChannel},
    error::NodeError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodName {
    CreateChannel,
    ProposeInstall,
    Install,
    RejectInstall,
    TakeAction,
    Uninstall,
    GetAppInstances,
    GetAppInstance,
    GetProposedAppInstances,
    GetFreeBalanceState,
    GetStateChannel,
    DeployStateDepositHolder,
    Deposit,
    Sync,
}

const METHODS: [MethodName; 14] = [
    MethodName::CreateChannel,
    MethodName::ProposeInstall,
    MethodName::Install,
    MethodName::RejectInstall,
    MethodName::TakeAction,
    MethodName::Uninstall,
    MethodName::GetAppInstances,
    MethodName::GetAppInstance,
    MethodName::GetProposedAppInstances,
    MethodName::GetFreeBalanceState,
    MethodName::GetStateChannel,
    MethodName::DeployStateDepositHolder,
    MethodName::Deposit,
    MethodName::Sync,
];

impl MethodName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodName::CreateChannel => "create-channel",
            MethodName::ProposeInstall => "propose-install",
            MethodName::Install => "install",
            MethodName::RejectInstall => "reject-install",
            MethodName::TakeAction => "take-action",
            MethodName::Uninstall => "uninstall",
            MethodName::GetAppInstances => "get-app-instances",
            MethodName::GetAppInstance => "get-app-instance",
            MethodName::GetProposedAppInstances => "get-proposed-app-instances",
            MethodName::GetFreeBalanceState => "get-free-balance-state",
            MethodName::GetStateChannel => "get-state-channel",
            MethodName::DeployStateDepositHolder => "deploy-state-deposit-holder",
            MethodName::Deposit => "deposit",
            MethodName::Sync => "sync",
        }
    }
}

impl core::fmt::Display for MethodName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MethodName {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        METHODS
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or(NodeError::InvalidParams("unknown method"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodParams {
    CreateChannel {
        counterparty: Address,
    },
    ProposeInstall {
        multisig_address: Address,
        params: ProposeParams,
    },
    Install {
        app_identity_hash: Hash,
    },
    RejectInstall {
        app_identity_hash: Hash,
    },
    TakeAction {
        app_identity_hash: Hash,
        action: Value,
    },
    Uninstall {
        app_identity_hash: Hash,
    },
    GetAppInstances {
        multisig_address: Address,
    },
    GetAppInstance {
        app_identity_hash: Hash,
    },
    GetProposedAppInstances {
        multisig_address: Address,
    },
    GetFreeBalanceState {
        multisig_address: Address,
        asset: Address,
    },
    GetStateChannel {
        multisig_address: Address,
    },
    DeployStateDepositHolder {
        multisig_address: Address,
    },
    Deposit {
        multisig_address: Address,
        asset: Address,
        amount: U256,
    },
    Sync {
        multisig_address: Address,
    },
}

impl MethodParams {
    pub fn method(&self) -> MethodName {
        match self {
            MethodParams::CreateChannel { .. } => MethodName::CreateChannel,
            MethodParams::ProposeInstall { .. } => MethodName::ProposeInstall,
            MethodParams::Install { .. } => MethodName::Install,
            MethodParams::RejectInstall { .. } => MethodName::RejectInstall,
            MethodParams::TakeAction { .. } => MethodName::TakeAction,
            MethodParams::Uninstall { .. } => MethodName::Uninstall,
            MethodParams::GetAppInstances { .. } => MethodName::GetAppInstances,
            MethodParams::GetAppInstance { .. } => MethodName::GetAppInstance,
            MethodParams::GetProposedAppInstances { .. } => MethodName::GetProposedAppInstances,
            MethodParams::GetFreeBalanceState { .. } => MethodName::GetFreeBalanceState,
            MethodParams::GetStateChannel { .. } => MethodName::GetStateChannel,
            MethodParams::DeployStateDepositHolder { .. } => MethodName::DeployStateDepositHolder,
            MethodParams::Deposit { .. } => MethodName::Deposit,
            MethodParams::Sync { .. } => MethodName::Sync,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodResult {
    CreateChannel { multisig_address: Address },
    ProposeInstall { app_identity_hash: Hash },
    Install { app_instance: Box<AppInstance> },
    RejectInstall,
    TakeAction { new_state: Value },
    Uninstall,
    GetAppInstances(Vec<AppInstance>),
    GetAppInstance(Box<AppInstance>),
    GetProposedAppInstances(Vec<AppProposal>),
    GetFreeBalanceState(BTreeMap<Address, U256>),
    GetStateChannel(Box<StateChannel>),
    DeployStateDepositHolder { transaction_hash: Hash },
    Deposit { transaction_hash: Hash },
    Sync(Box<StateChannel>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcRequest {
    pub id: u64,
    pub params: MethodParams,
}

#[derive(Debug)]
pub struct RpcResponse {
    pub id: u64,
    pub result: Result<MethodResult, NodeError>,
}

impl Node {
    /// Serve one RPC request.
    pub async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let id = request.id;
        let method = request.params.method();
        debug!(id, %method, "rpc call");

        let result = self.call(request.params).await;
        if let Err(error) = &result {
            warn!(id, %method, code = error.code(), %error, "rpc call failed");
        }
        RpcResponse { id, result }
    }

    async fn call(&self, params: MethodParams) -> Result<MethodResult, NodeError> {
        Ok(match params {
            MethodParams::CreateChannel { counterparty } => MethodResult::CreateChannel {
                multisig_address: self.create_channel(counterparty).await?,
            },
            MethodParams::ProposeInstall {
                multisig_address,
                params,
            } => MethodResult::ProposeInstall {
                app_identity_hash: self.propose_install(multisig_address, params).await?,
            },
            MethodParams::Install { app_identity_hash } => MethodResult::Install {
                app_instance: Box::new(self.install(app_identity_hash).await?),
            },
            MethodParams::RejectInstall { app_identity_hash } => {
                self.reject_install(app_identity_hash).await?;
                MethodResult::RejectInstall
            }
            MethodParams::TakeAction {
                app_identity_hash,
                action,
            } => MethodResult::TakeAction {
                new_state: self.take_action(app_identity_hash, action).await?,
            },
            MethodParams::Uninstall { app_identity_hash } => {
                self.uninstall(app_identity_hash).await?;
                MethodResult::Uninstall
            }
            MethodParams::GetAppInstances { multisig_address } => {
                MethodResult::GetAppInstances(self.get_app_instances(multisig_address).await?)
            }
            MethodParams::GetAppInstance { app_identity_hash } => {
                MethodResult::GetAppInstance(Box::new(self.get_app_instance(app_identity_hash).await?))
            }
            MethodParams::GetProposedAppInstances { multisig_address } => {
                MethodResult::GetProposedAppInstances(
                    self.get_proposed_app_instances(multisig_address).await?,
                )
            }
            MethodParams::GetFreeBalanceState {
                multisig_address,
                asset,
            } => MethodResult::GetFreeBalanceState(
                self.get_free_balance_state(multisig_address, asset).await?,
            ),
            MethodParams::GetStateChannel { multisig_address } => {
                MethodResult::GetStateChannel(Box::new(self.get_state_channel(multisig_address).await?))
            }
            MethodParams::DeployStateDepositHolder { multisig_address } => {
                MethodResult::DeployStateDepositHolder {
                    transaction_hash: self.deploy_state_deposit_holder(multisig_address).await?,
                }
            }
            MethodParams::Deposit {
                multisig_address,
                asset,
                amount,
            } => MethodResult::Deposit {
                transaction_hash: self.deposit(multisig_address, asset, amount).await?,
            },
            MethodParams::Sync { multisig_address } => {
                MethodResult::Sync(Box::new(self.sync(multisig_address).await?))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names() {
        for method in METHODS {
            assert_eq!(method.as_str().parse::<MethodName>().unwrap(), method);
        }
        assert_eq!(
            "propose-install".parse::<MethodName>().unwrap(),
            MethodName::ProposeInstall
        );
        let err = "install-everything".parse::<MethodName>().unwrap_err();
        assert_eq!(err.code(), "INVALID_PARAMS");
    }
}
