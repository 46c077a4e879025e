//! Handles the creation and verification of (Ethereum) Signatures.

use crate::abiencode::types::{Address, Hash, Signature};
use sha3::{Digest, Keccak256};

mod k256;
pub use self::k256::{recover_signer, Error, Signer};

#[cfg(test)]
mod tests;

/// Add the `\x19Ethereum Signed Message\n<length>` prefix to hash.
///
/// This is the format expected by the Solidity contracts.
fn hash_to_eth_signed_msg_hash(hash: Hash) -> Hash {
    // Packed encoding => We can't use the serializer
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n32");
    hasher.update(hash.0);
    Hash(hasher.finalize().into())
}

/// Whether `sig` is a signature of `expected` over `hash`.
pub fn verify(hash: Hash, sig: Signature, expected: Address) -> bool {
    matches!(recover_signer(hash, sig), Ok(addr) if addr == expected)
}
