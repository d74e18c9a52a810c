/// Errors surfaced while declaring or building a transaction.
#[derive(Debug, thiserror::Error)]
pub enum TxBuilderError {
    /// A declarative call violated one of its preconditions.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The declared inputs cannot cover the outputs plus fee, or the
    /// transaction outgrew a protocol limit.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),
    /// Change cannot fund the minimum lovelace of its own outputs.
    #[error("insufficient utxo balance: {0}")]
    InsufficientUtxoBalance(String),
    /// A selector could not cover the request, or every registered
    /// selector failed over the candidate pool.
    #[error("utxo selection failed: {0}")]
    UtxoSelection(String),
    /// The builder state contradicts itself.
    #[error("conflicting builder state: {0}")]
    Conflict(String),
    /// Provided bytes could not be decoded into a datum
    #[error("could not decode datum bytes")]
    MalformedDatum,
    /// Provided bytes could not be decoded into auxiliary data
    #[error("could not decode auxiliary data bytes")]
    MalformedAuxiliaryData,
    /// Transaction bytes in a built transaction could not be decoded
    #[error("corrupted transaction bytes in built transaction")]
    CorruptedTxBytes,
    /// Public key generated from a signing key was of unexpected length
    #[error("public key for signing key is malformed")]
    MalformedKey,
    /// Failure raised by the chain context while fetching UTxOs.
    #[error(transparent)]
    ChainContext(#[from] anyhow::Error),
}
