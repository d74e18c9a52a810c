use std::collections::HashMap;

use pallas::ledger::primitives::conway::{Tx, VKeyWitness};
use pallas::ledger::primitives::{Fragment, NonEmptySet};

use super::TxBuilderError;
use crate::primitives::{Ed25519Signer, PublicKey, Signature, TxHash};

/// A fully assembled transaction: its body hash, its serialized bytes and
/// the signatures collected so far.
///
/// Independent of the builder that produced it; the builder can be mutated
/// or rebuilt without affecting a transaction already in hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltTransaction {
    pub hash: TxHash,
    pub bytes: Vec<u8>,
    pub signatures: Option<HashMap<PublicKey, Signature>>,
}

impl BuiltTransaction {
    /// Sign the transaction body hash and append the verification-key
    /// witness.
    pub fn sign<K: Ed25519Signer>(self, signing_key: &K) -> Result<Self, TxBuilderError> {
        let pubkey: [u8; 32] = signing_key
            .public_key()
            .as_ref()
            .try_into()
            .map_err(|_| TxBuilderError::MalformedKey)?;

        let signature: [u8; 64] = signing_key
            .sign_tx_hash(&self.hash)
            .as_ref()
            .try_into()
            .map_err(|_| TxBuilderError::MalformedKey)?;

        self.add_signature(pubkey, signature)
    }

    /// Append a signature produced elsewhere (hardware wallet, co-signer).
    pub fn add_signature(
        mut self,
        pubkey: [u8; 32],
        signature: [u8; 64],
    ) -> Result<Self, TxBuilderError> {
        self.signatures
            .get_or_insert_with(HashMap::new)
            .insert(pubkey.into(), signature.into());

        let mut tx =
            Tx::decode_fragment(&self.bytes).map_err(|_| TxBuilderError::CorruptedTxBytes)?;

        let mut vkey_witnesses = tx
            .transaction_witness_set
            .vkeywitness
            .as_ref()
            .map(|witnesses| witnesses.clone().to_vec())
            .unwrap_or_default();

        vkey_witnesses.push(VKeyWitness {
            vkey: pubkey.to_vec().into(),
            signature: signature.to_vec().into(),
        });

        tx.transaction_witness_set.vkeywitness =
            Some(NonEmptySet::from_vec(vkey_witnesses).unwrap());

        let bytes = tx.encode_fragment().unwrap();
        self.bytes = bytes;

        Ok(self)
    }

    pub fn cbor_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}
