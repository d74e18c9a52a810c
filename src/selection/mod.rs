//! UTxO selection strategies.
//!
//! The builder computes the demand its declared inputs leave unfulfilled
//! and hands it to each registered selector in turn; the first one to
//! succeed decides which UTxOs join the transaction.

use crate::builder::TxBuilderError;
use crate::context::ChainContext;
use crate::primitives::{Utxo, Value};

mod largest_first;
mod random_improve;

pub use largest_first::LargestFirstSelector;
pub use random_improve::RandomImproveMultiAsset;

/// Picks UTxOs out of a candidate pool to cover a requested amount.
///
/// Implementations budget headroom for the worst-case fee on top of the
/// request, since the exact fee is only known after selection. A selector
/// that cannot cover the request fails with
/// [`TxBuilderError::UtxoSelection`]; the builder treats that as "try the
/// next selector" and anything else as fatal.
pub trait UtxoSelector {
    /// Select from `utxos` until `requested` is covered. Returns the
    /// selected UTxOs and the change left over after the request and the
    /// fee headroom.
    fn select(
        &self,
        utxos: &[Utxo],
        requested: &Value,
        context: &dyn ChainContext,
    ) -> Result<(Vec<Utxo>, Value), TxBuilderError>;
}
