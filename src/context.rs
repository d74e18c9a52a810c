//! Read-only view of the chain consumed by the builder.

use num::BigRational;
use pallas::ledger::addresses::Address;

use crate::primitives::Utxo;

/// Protocol parameters that drive fee calculation and output sizing.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolParams {
    /// Fee per serialized transaction byte.
    pub min_fee_coefficient: u64,
    /// Flat fee component.
    pub min_fee_constant: u64,
    pub max_tx_size: u32,
    /// Ceiling on the serialized size of a single output's value.
    pub max_val_size: u32,
    pub max_tx_ex_mem: u64,
    pub max_tx_ex_steps: u64,
    /// Lovelace per Plutus memory unit.
    pub price_mem: BigRational,
    /// Lovelace per Plutus cpu step.
    pub price_step: BigRational,
    /// Deposit per 8-byte word of a multi-asset utxo entry.
    pub coins_per_utxo_word: u64,
    /// Flat deposit for a pure-ADA output.
    pub min_utxo: u64,
}

impl ProtocolParams {
    /// The mainnet constants. Production callers should prefer whatever
    /// their chain context reports; this preset exists for tests and
    /// offline estimation.
    pub fn mainnet() -> Self {
        Self {
            min_fee_coefficient: 44,
            min_fee_constant: 155_381,
            max_tx_size: 16_384,
            max_val_size: 5_000,
            max_tx_ex_mem: 14_000_000,
            max_tx_ex_steps: 10_000_000_000,
            price_mem: BigRational::new(577.into(), 10_000.into()),
            price_step: BigRational::new(721.into(), 10_000_000.into()),
            coins_per_utxo_word: 34_482,
            min_utxo: 1_000_000,
        }
    }
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self::mainnet()
    }
}

/// Where the builder learns about the chain: protocol parameters and the
/// UTxOs sitting at an address.
///
/// The builder performs no I/O of its own; `utxos` is its only suspension
/// point and may block. A context shared between builders must be
/// thread-safe on its own account, the builder only ever reads from it.
pub trait ChainContext {
    fn protocol_param(&self) -> &ProtocolParams;

    /// UTxOs currently spendable from `address`. Failures propagate out of
    /// [`crate::TransactionBuilder::build`] untouched.
    fn utxos(&self, address: &Address) -> anyhow::Result<Vec<Utxo>>;
}
