pub use pallas::codec::utils::Bytes;
pub use pallas::crypto::hash::Hash;
pub use pallas::ledger::addresses::Address;

use pallas::crypto::hash::Hasher;
use pallas::ledger::addresses::ShelleyPaymentPart;

mod input;
mod output;
mod script;
mod signer;
mod value;

pub use input::*;
pub use output::*;
pub use script::*;
pub use signer::*;
pub use value::*;

pub type TxHash = Hash<32>;
pub type PubKeyHash = Hash<28>;
pub type ScriptHash = Hash<28>;
pub type PolicyId = ScriptHash;
pub type DatumHash = Hash<32>;
pub type AssetName = Bytes;

pub type PublicKey = Hash<32>;
pub type Signature = Hash<64>;

/// Blake2b-256 digest of a datum's CBOR encoding.
pub fn datum_hash(data: &[u8]) -> DatumHash {
    Hasher::<256>::hash(data)
}

/// Payment-part key hash of an address, when it is key-locked.
pub fn payment_key_hash(address: &Address) -> Option<PubKeyHash> {
    match address {
        Address::Shelley(shelley) => match shelley.payment() {
            ShelleyPaymentPart::Key(hash) => Some(*hash),
            ShelleyPaymentPart::Script(_) => None,
        },
        _ => None,
    }
}
