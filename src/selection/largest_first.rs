use super::UtxoSelector;
use crate::builder::fee::{max_tx_fee, min_lovelace};
use crate::builder::TxBuilderError;
use crate::context::ChainContext;
use crate::primitives::{Utxo, Value};

/// Deterministic fallback: keep taking the candidate with the most
/// lovelace until the request is covered and the change left over can pay
/// its own minimum deposit.
pub struct LargestFirstSelector;

impl UtxoSelector for LargestFirstSelector {
    fn select(
        &self,
        utxos: &[Utxo],
        requested: &Value,
        context: &dyn ChainContext,
    ) -> Result<(Vec<Utxo>, Value), TxBuilderError> {
        let pparams = context.protocol_param();

        let mut available = utxos.to_vec();
        available.sort_by_key(|utxo| utxo.output.amount.coin);

        let mut total_requested = requested.clone();
        total_requested.coin += max_tx_fee(pparams) as i64;

        let mut selected = Vec::new();
        let mut selected_amount = Value::default();

        while !total_requested.covered_by(&selected_amount) {
            let utxo = take_largest(&mut available)?;
            selected_amount += utxo.output.amount.clone();
            selected.push(utxo);
        }

        let mut change = residual(&selected_amount, &total_requested);
        while change.coin < min_lovelace(&change, pparams) as i64 {
            let utxo = take_largest(&mut available)?;
            selected_amount += utxo.output.amount.clone();
            selected.push(utxo);
            change = residual(&selected_amount, &total_requested);
        }

        Ok((selected, change))
    }
}

fn take_largest(available: &mut Vec<Utxo>) -> Result<Utxo, TxBuilderError> {
    available
        .pop()
        .ok_or_else(|| TxBuilderError::UtxoSelection("utxo balance insufficient".into()))
}

fn residual(selected_amount: &Value, total_requested: &Value) -> Value {
    let mut change = selected_amount.clone() - total_requested.clone();
    change.multi_asset = change.multi_asset.filter(|_, _, quantity| quantity > 0);
    change
}
