//! Declarative Cardano transaction builder.
//!
//! Intent is accumulated through [`TransactionBuilder`]: outputs to produce,
//! script invocations, assets to mint, addresses funds may be drawn from.
//! [`TransactionBuilder::build`] then resolves the remaining demand through
//! the registered UTxO selectors, packs multi-asset change into outputs that
//! fit the protocol's value-size ceiling, fits the fee against the exact
//! serialized size of the transaction, and assembles a canonically ordered
//! transaction ready for signing.

pub mod builder;
pub mod context;
pub mod primitives;
pub mod selection;

pub use builder::{BuiltTransaction, TransactionBuilder, TxBuilderError};
pub use context::{ChainContext, ProtocolParams};
pub use primitives::{Asset, Input, MultiAsset, Output, Utxo, Value};
pub use selection::{LargestFirstSelector, RandomImproveMultiAsset, UtxoSelector};
