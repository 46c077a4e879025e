use super::{recover_signer, verify, Signer};
use crate::abiencode::{self, as_bytes, types::Address};
use crate::Hash;
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;

fn data() -> Hash {
    /*
    ```solidity
    function verify_sig(address signer, bytes memory sig) public pure {
        bytes memory d;
        d = "\xa1\xa2\xa3\xa4";
        require(Sig.verify(abi.encode(d), sig, signer), "invalid signature");
    }
    ```
    */

    #[derive(Serialize, Debug)]
    #[serde(transparent)]
    struct Bytes {
        #[serde(with = "as_bytes")]
        value: [u8; 4],
    }
    let d = Bytes {
        value: [0xa1, 0xa2, 0xa3, 0xa4],
    };

    abiencode::to_hash(&d).unwrap()
}

#[test]
fn known_key_address() {
    // Key from the web3.js account documentation, do not use!
    let secret: [u8; 32] =
        hex::decode("4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318")
            .unwrap()
            .try_into()
            .unwrap();
    let signer = Signer::from_secret_bytes(&secret).unwrap();
    let expected: Address = "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23".parse().unwrap();
    assert_eq!(signer.address(), expected);
}

#[test]
fn sign_and_recover() {
    // Do not use that on any real device, this is just for testing.
    let mut rng = StdRng::seed_from_u64(0);
    let signer = Signer::new(&mut rng);
    let msg = data();
    let sig = signer.sign_eth(msg).unwrap();

    assert!(sig.0[64] == 27 || sig.0[64] == 28);
    assert_eq!(recover_signer(msg, sig).unwrap(), signer.address());
    assert!(verify(msg, sig, signer.address()));
}

#[test]
fn signing_is_deterministic() {
    let mut rng = StdRng::seed_from_u64(1);
    let signer = Signer::new(&mut rng);
    assert_eq!(signer.sign_eth(data()).unwrap(), signer.sign_eth(data()).unwrap());
}

#[test]
fn wrong_signer_or_message() {
    let mut rng = StdRng::seed_from_u64(0);
    let alice = Signer::new(&mut rng);
    let bob = Signer::new(&mut rng);
    let sig = alice.sign_eth(data()).unwrap();

    assert!(!verify(data(), sig, bob.address()));
    assert!(!verify(Hash([7; 32]), sig, alice.address()));

    let mut broken = sig;
    broken.0[64] = 3;
    assert!(recover_signer(data(), broken).is_err());
}
