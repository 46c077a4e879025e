use super::{encode, ser::to_value, types::Hash, Error};

use serde::Serialize;
use sha3::{Digest, Keccak256};

/// Keccak-256 of raw bytes.
pub fn keccak256(data: &[u8]) -> Hash {
    Hash(Keccak256::digest(data).into())
}

/// `keccak256(abi.encode(value))`.
pub fn to_hash<T>(value: &T) -> Result<Hash, Error>
where
    T: Serialize + ?Sized,
{
    let bytes = encode(&to_value(value)?)?;
    Ok(keccak256(&bytes))
}
