//! Dynamically typed ABI values.
//!
//! App states and actions are not known at compile time, the node only knows
//! their schema string. [Value] is the tree both of them are stored in, and
//! also what the serde [Serializer][super::Serializer] produces for
//! statically typed structs.

use serde::{
    ser::{SerializeSeq, SerializeTuple},
    Serialize,
};

use super::{
    as_bytes,
    types::{Address, U256},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Address(Address),
    Uint(U256),
    Int(i128),
    Bool(bool),
    /// `bytes1` to `bytes32`, left aligned in its slot.
    FixedBytes(Vec<u8>),
    Bytes(Vec<u8>),
    String(String),
    /// Dynamic length array `T[]`.
    Array(Vec<Value>),
    /// Structs and fixed-size arrays `T[N]`, which are encoded the same way.
    Tuple(Vec<Value>),
}

impl Value {
    pub fn is_dynamic(&self) -> bool {
        match self {
            Value::Bytes(_) | Value::String(_) | Value::Array(_) => true,
            Value::Tuple(items) => items.iter().any(Value::is_dynamic),
            _ => false,
        }
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            Value::Address(a) => Some(*a),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<U256> {
        match self {
            Value::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Items of a tuple or of an array of either kind.
    pub fn as_items(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) | Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Field `index` of a tuple.
    pub fn field(&self, index: usize) -> Option<&Value> {
        match self {
            Value::Tuple(items) => items.get(index),
            _ => None,
        }
    }
}

impl From<Address> for Value {
    fn from(a: Address) -> Self {
        Value::Address(a)
    }
}

impl From<U256> for Value {
    fn from(v: U256) -> Self {
        Value::Uint(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(v.into())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Value::Address(a) => a.serialize(serializer),
            Value::Uint(v) => v.serialize(serializer),
            Value::Int(v) => serializer.serialize_i128(*v),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::FixedBytes(b) => serializer.serialize_bytes(b),
            Value::Bytes(b) => as_bytes::serialize(b, serializer),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(items) => {
                let mut s = serializer.serialize_seq(Some(items.len()))?;
                for e in items {
                    s.serialize_element(e)?;
                }
                s.end()
            }
            Value::Tuple(items) => {
                let mut s = serializer.serialize_tuple(items.len())?;
                for e in items {
                    s.serialize_element(e)?;
                }
                s.end()
            }
        }
    }
}
