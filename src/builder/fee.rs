//! Fee and minimum-deposit formulas parameterized by protocol parameters.

use num::{BigRational, ToPrimitive as _};

use crate::context::ProtocolParams;
use crate::primitives::{MultiAsset, Value};

/// Words a utxo entry occupies before its value is counted.
const UTXO_ENTRY_SIZE_WITHOUT_VAL: u64 = 27;

/// Minimum fee for a transaction of `tx_byte_len` serialized bytes that
/// consumes the given Plutus budget: linear in the size, plus the priced
/// execution units rounded up to a whole lovelace.
pub fn fee(pparams: &ProtocolParams, tx_byte_len: u64, ex_steps: u64, ex_mem: u64) -> u64 {
    let size_fee = tx_byte_len * pparams.min_fee_coefficient + pparams.min_fee_constant;

    let script_fee = BigRational::from_integer(ex_steps.into()) * pparams.price_step.clone()
        + BigRational::from_integer(ex_mem.into()) * pparams.price_mem.clone();

    let total = BigRational::from_integer(size_fee.into()) + script_fee.ceil();
    total
        .to_integer()
        .to_u64()
        .expect("fee does not fit in u64")
}

/// Largest fee any transaction can be charged under these parameters; seeds
/// the first change pass so the exact fee always fits afterwards.
pub fn max_tx_fee(pparams: &ProtocolParams) -> u64 {
    fee(
        pparams,
        pparams.max_tx_size as u64,
        pparams.max_tx_ex_steps,
        pparams.max_tx_ex_mem,
    )
}

/// Words occupied by a token bundle: every asset costs twelve bytes plus
/// its name, every policy its 28-byte hash, rounded up to 8-byte words on
/// top of a fixed map overhead.
fn bundle_size(multi_asset: &MultiAsset) -> u64 {
    let num_policies = multi_asset.len() as u64;
    let mut num_assets = 0u64;
    let mut name_len = 0u64;
    for (_, assets) in multi_asset.iter() {
        num_assets += assets.len() as u64;
        for (name, _) in assets.iter() {
            name_len += name.len() as u64;
        }
    }

    let byte_len = num_assets * 12 + name_len + num_policies * 28;
    6 + byte_len.div_ceil(8)
}

/// Protocol minimum deposit for an output carrying `amount`.
///
/// Pure-ADA outputs pay the flat `min_utxo`; multi-asset outputs pay per
/// word of their token bundle. Independent of the coin field, so the
/// deposit a change bucket was computed against never moves when the fee
/// pass rewrites coin values.
pub fn min_lovelace(amount: &Value, pparams: &ProtocolParams) -> u64 {
    if amount.multi_asset.is_empty() {
        return pparams.min_utxo;
    }

    (UTXO_ENTRY_SIZE_WITHOUT_VAL + bundle_size(&amount.multi_asset)) * pparams.coins_per_utxo_word
}
