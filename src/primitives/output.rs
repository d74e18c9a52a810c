use pallas::ledger::addresses::Address;
use pallas::ledger::primitives::conway::{
    DatumOption, PostAlonzoTransactionOutput, TransactionOutput,
};

use super::{DatumHash, Value};
use crate::builder::TxBuilderError;

/// A transaction output under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub address: Address,
    pub amount: Value,
    pub datum_hash: Option<DatumHash>,
}

impl Output {
    pub fn new(address: Address, amount: Value) -> Self {
        Self {
            address,
            amount,
            datum_hash: None,
        }
    }

    pub fn with_datum_hash(mut self, datum_hash: DatumHash) -> Self {
        self.datum_hash = Some(datum_hash);
        self
    }

    pub fn build_conway(&self) -> Result<TransactionOutput<'_>, TxBuilderError> {
        let value = self.amount.build_conway()?;

        let datum_option = self.datum_hash.map(DatumOption::Hash);

        Ok(TransactionOutput::PostAlonzo(
            PostAlonzoTransactionOutput {
                address: self.address.to_vec().into(),
                value,
                datum_option: datum_option.map(|x| x.into()),
                script_ref: None,
            }
            .into(),
        ))
    }
}
