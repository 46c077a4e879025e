//! A two-party state channel node.
//!
//! Parties lock funds in a shared multisig once ([node::Node::create_channel],
//! [node::Node::deposit]) and from then on install, update and uninstall
//! applications off-chain by exchanging signed commitments. Every state both
//! parties signed can be enforced on-chain.

pub mod abiencode {
    mod decode;
    mod encode;
    mod error;
    mod hashing;
    mod schema;
    mod ser;
    mod value;

    pub mod as_bytes;
    pub mod as_dyn_array;
    pub mod types;

    pub use decode::decode;
    pub use encode::{encode, encode_params};
    pub use error::{Error, Result};
    pub use hashing::{keccak256, to_hash};
    pub use schema::{AbiType, TupleField};
    pub use ser::{to_value, Serializer};
    pub use value::Value;

    #[cfg(test)]
    mod tests;
}
pub mod sig;

pub mod app;
pub mod chain;
pub mod channel;
pub mod commitment;
pub mod config;
pub mod error;
pub mod lock;
pub mod messages;
pub mod node;
pub mod protocol;
pub mod store;
pub mod wire;

pub use abiencode::types::{Address, Hash, Signature, U256};
pub use error::NodeError;
pub use node::Node;
