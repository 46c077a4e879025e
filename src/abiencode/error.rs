//! Error type and Return values used by the ABI encoder, decoder and schema
//! parser.

use serde::ser;
use thiserror::Error;

/// Represents all possible errors that can happen while converting between
/// Rust values, [Value][super::Value] trees and ABI bytes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The struct contains a type that is not directly representable in
    /// Solidity types.
    ///
    /// For example floating point numbers, enums and maps. We don't pick an
    /// arbitrary representation for them, as that would force a specific
    /// layout on the Solidity side.
    #[error("type is not representable in abi encoding: {0}")]
    TypeNotRepresentable(&'static str),
    /// Although the type is representable in Solidity (currently only used for
    /// `char`), the Serializer currently does not implement this functionality.
    #[error("type is not yet implemented: {0}")]
    TypeNotYetSupported(&'static str),
    #[error("fixed-size bytes can hold at most 32 bytes, got {0}")]
    FixedBytesTooLong(usize),
    #[error("invalid abi type {0:?}")]
    InvalidSchema(String),
    #[error("value does not match abi type {0}")]
    SchemaMismatch(String),
    #[error("abi data ended unexpectedly")]
    UnexpectedEnd,
    #[error("invalid abi data: {0}")]
    InvalidData(&'static str),
    #[error("invalid hex for {0}")]
    InvalidHex(&'static str),
    #[error("invalid byte length for {0}")]
    InvalidLength(&'static str),
    #[error("{0}")]
    Custom(String),
}

impl ser::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: core::fmt::Display,
    {
        Error::Custom(msg.to_string())
    }
}

/// Alias for `Result` using the [Error] of this module.
pub type Result<T> = core::result::Result<T, Error>;
