//! The cryptographic interface consumed by the core: signing, verification,
//! and digesting. Key generation and the signature scheme itself are an
//! external collaborator per the protocol's scope — this module only pins
//! down the types and the thin operations the engines call.

use {
    solana_keypair::Keypair,
    solana_pubkey::Pubkey,
    solana_signature::Signature,
    solana_signer::Signer,
};

/// A 32-byte collision-resistant digest of a message's canonical encoding.
pub type Digest = solana_hash::Hash;

/// Hash an arbitrary byte string into a [`Digest`].
///
/// Used to compute message digests (over the canonical wire encoding minus
/// the signature) and value/block hashes.
pub fn digest(bytes: &[u8]) -> Digest {
    solana_sha256_hasher::hashv(&[bytes])
}

/// Sign `bytes` with `signing_key`, producing the signature carried on a
/// message.
pub fn sign(signing_key: &Keypair, bytes: &[u8]) -> Signature {
    signing_key.sign_message(bytes)
}

/// Verify that `signature` is valid over `bytes` under `verify_key`.
pub fn verify(verify_key: &Pubkey, bytes: &[u8], signature: &Signature) -> bool {
    signature.verify(verify_key.as_ref(), bytes)
}
