use super::{Output, TxHash};

/// Reference to a transaction output: the id of the transaction that
/// produced it and the output's position within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Input {
    pub transaction_id: TxHash,
    pub index: u64,
}

impl Input {
    pub fn new(transaction_id: TxHash, index: u64) -> Self {
        Self {
            transaction_id,
            index,
        }
    }
}

/// An unspent transaction output: the reference that spends it plus the
/// output it resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub input: Input,
    pub output: Output,
}

impl Utxo {
    pub fn new(input: Input, output: Output) -> Self {
        Self { input, output }
    }
}
