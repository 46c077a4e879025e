//! Protobuf wire types.
//!
//! Fixed size values (addresses, hashes, signatures, 256 bit integers) travel
//! as big-endian byte strings of their exact length.

#[derive(Clone, PartialEq, prost::Message)]
pub struct Envelope {
    #[prost(oneof = "envelope::Msg", tags = "1, 2, 3")]
    pub msg: Option<envelope::Msg>,
}

pub mod envelope {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Msg {
        #[prost(message, tag = "1")]
        Protocol(super::ProtocolMsg),
        #[prost(message, tag = "2")]
        ProtocolRejected(super::ProtocolRejectedMsg),
        #[prost(message, tag = "3")]
        ProposalRejected(super::ProposalRejectedMsg),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ProtocolMsg {
    #[prost(bytes = "vec", tag = "1")]
    pub process_id: Vec<u8>,
    #[prost(int32, tag = "2")]
    pub protocol: i32,
    #[prost(int32, tag = "3")]
    pub seq: i32,
    #[prost(bytes = "vec", tag = "4")]
    pub from: Vec<u8>,
    #[prost(bytes = "vec", tag = "5")]
    pub to: Vec<u8>,
    #[prost(message, optional, tag = "6")]
    pub params: Option<ProtocolParamsMsg>,
    #[prost(bytes = "vec", repeated, tag = "7")]
    pub signatures: Vec<Vec<u8>>,
    #[prost(message, optional, tag = "8")]
    pub channel: Option<ChannelRecord>,
    #[prost(message, repeated, tag = "9")]
    pub commitments: Vec<CommitmentEntry>,
}

/// A signed commitment and the key it is filed under. `kind` is 0 for setup,
/// 1 for conditional transaction and 2 for set-state commitments, `key` the
/// multisig address or app identity hash.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CommitmentEntry {
    #[prost(int32, tag = "1")]
    pub kind: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub key: Vec<u8>,
    #[prost(message, optional, tag = "3")]
    pub commitment: Option<CommitmentRecord>,
}

/// Union of all protocol parameters. Which fields are set depends on the
/// protocol of the enclosing message.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ProtocolParamsMsg {
    #[prost(bytes = "vec", tag = "1")]
    pub initiator_identifier: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub responder_identifier: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub multisig_address: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub app_identity_hash: Vec<u8>,
    #[prost(uint64, tag = "5")]
    pub free_balance_version: u64,
    #[prost(uint64, tag = "6")]
    pub version_number: u64,
    #[prost(message, optional, tag = "7")]
    pub action: Option<ValueMsg>,
    #[prost(message, optional, tag = "8")]
    pub proposal: Option<ProposalRecord>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ProtocolRejectedMsg {
    #[prost(bytes = "vec", tag = "1")]
    pub process_id: Vec<u8>,
    #[prost(int32, tag = "2")]
    pub protocol: i32,
    #[prost(bytes = "vec", tag = "3")]
    pub from: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub to: Vec<u8>,
    #[prost(string, tag = "5")]
    pub reason: String,
    #[prost(bool, tag = "6")]
    pub stale: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ProposalRejectedMsg {
    #[prost(bytes = "vec", tag = "1")]
    pub from: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub to: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub multisig_address: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub app_identity_hash: Vec<u8>,
}

/// Self-describing ABI value.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ValueMsg {
    #[prost(oneof = "value_msg::Kind", tags = "1, 2, 3, 4, 5, 6, 7, 8, 9")]
    pub kind: Option<value_msg::Kind>,
}

pub mod value_msg {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Kind {
        #[prost(bytes, tag = "1")]
        Address(Vec<u8>),
        #[prost(bytes, tag = "2")]
        Uint(Vec<u8>),
        /// 16 bytes, two's complement.
        #[prost(bytes, tag = "3")]
        Int(Vec<u8>),
        #[prost(bool, tag = "4")]
        Bool(bool),
        #[prost(bytes, tag = "5")]
        FixedBytes(Vec<u8>),
        #[prost(bytes, tag = "6")]
        Bytes(Vec<u8>),
        #[prost(string, tag = "7")]
        String(String),
        #[prost(message, tag = "8")]
        Array(super::ValueList),
        #[prost(message, tag = "9")]
        Tuple(super::ValueList),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ValueList {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<ValueMsg>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ProposalRecord {
    #[prost(bytes = "vec", tag = "1")]
    pub identity_hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub multisig_address: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub app_seq_no: u64,
    #[prost(bytes = "vec", tag = "4")]
    pub initiator_identifier: Vec<u8>,
    #[prost(bytes = "vec", tag = "5")]
    pub responder_identifier: Vec<u8>,
    #[prost(bytes = "vec", tag = "6")]
    pub app_definition: Vec<u8>,
    #[prost(string, tag = "7")]
    pub state_encoding: String,
    #[prost(string, optional, tag = "8")]
    pub action_encoding: Option<String>,
    #[prost(bytes = "vec", tag = "9")]
    pub initiator_deposit: Vec<u8>,
    #[prost(bytes = "vec", tag = "10")]
    pub initiator_deposit_asset_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "11")]
    pub responder_deposit: Vec<u8>,
    #[prost(bytes = "vec", tag = "12")]
    pub responder_deposit_asset_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "13")]
    pub default_timeout: Vec<u8>,
    #[prost(bytes = "vec", tag = "14")]
    pub state_timeout: Vec<u8>,
    #[prost(message, optional, tag = "15")]
    pub initial_state: Option<ValueMsg>,
    #[prost(int32, tag = "16")]
    pub outcome_type: i32,
    #[prost(bytes = "vec", repeated, tag = "17")]
    pub signatures: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AppInstanceRecord {
    #[prost(message, optional, tag = "1")]
    pub proposal: Option<ProposalRecord>,
    #[prost(message, optional, tag = "2")]
    pub latest_state: Option<ValueMsg>,
    #[prost(uint64, tag = "3")]
    pub latest_version_number: u64,
    #[prost(message, optional, tag = "4")]
    pub latest_action: Option<ValueMsg>,
    #[prost(bytes = "vec", repeated, tag = "5")]
    pub signatures: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ChannelRecord {
    #[prost(bytes = "vec", tag = "1")]
    pub multisig_address: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub proxy_factory: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub multisig_mastercopy: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "4")]
    pub user_identifiers: Vec<Vec<u8>>,
    #[prost(message, optional, tag = "5")]
    pub free_balance: Option<AppInstanceRecord>,
    #[prost(message, repeated, tag = "6")]
    pub app_instances: Vec<AppInstanceRecord>,
    #[prost(message, repeated, tag = "7")]
    pub proposed_app_instances: Vec<ProposalRecord>,
    #[prost(uint64, tag = "8")]
    pub num_proposed_apps: u64,
}

/// An encoded commitment together with the owners' signatures.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CommitmentRecord {
    #[prost(bytes = "vec", tag = "1")]
    pub encoded: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub signatures: Vec<Vec<u8>>,
}
