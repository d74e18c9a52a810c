use pallas::crypto::key::ed25519;

use super::TxHash;

/// Anything that can sign a transaction body hash with an Ed25519 key.
///
/// Signers that cannot hand out key material (hardware wallets,
/// co-signers) skip this trait and feed their finished signatures in
/// through [`crate::BuiltTransaction::add_signature`] instead.
pub trait Ed25519Signer {
    fn public_key(&self) -> ed25519::PublicKey;
    fn sign_tx_hash(&self, hash: &TxHash) -> ed25519::Signature;
}

impl Ed25519Signer for ed25519::SecretKey {
    fn public_key(&self) -> ed25519::PublicKey {
        self.public_key()
    }

    fn sign_tx_hash(&self, hash: &TxHash) -> ed25519::Signature {
        self.sign(hash.as_ref())
    }
}
